use serde::{de::DeserializeOwned, Serialize};

use shared::error::ClientError;

use crate::{expect_success, RemoteClient};

const SINGLE_ROW_ACCEPT: &str = "application/vnd.pgrst.object+json";

/// Builder over the remote table surface: equality / greater-than-or-equal
/// filters, ordering, row limit, single-row assertion, insert and update.
pub struct TableQuery<'a> {
    client: &'a RemoteClient,
    table: String,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<u32>,
}

impl<'a> TableQuery<'a> {
    pub(crate) fn new(client: &'a RemoteClient, table: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    pub fn gte(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.filters
            .push((column.to_string(), format!("gte.{value}")));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order = Some(format!("{column}.{direction}"));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.client.base_url(), self.table)
    }

    fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        params.push((
            "select".to_string(),
            self.select.clone().unwrap_or_else(|| "*".to_string()),
        ));
        params.extend(self.filters.iter().cloned());
        if let Some(order) = &self.order {
            params.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, ClientError> {
        let response = self
            .client
            .authed(self.client.http().get(self.endpoint()))
            .query(&self.params())
            .send()
            .await
            .map_err(ClientError::network)?;
        expect_success(response)
            .await?
            .json()
            .await
            .map_err(ClientError::network)
    }

    /// Single-row assertion; anything but exactly one matching row is a
    /// remote error.
    pub async fn fetch_one<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let response = self
            .client
            .authed(self.client.http().get(self.endpoint()))
            .query(&self.params())
            .header(reqwest::header::ACCEPT, SINGLE_ROW_ACCEPT)
            .send()
            .await
            .map_err(ClientError::network)?;
        expect_success(response)
            .await?
            .json()
            .await
            .map_err(ClientError::network)
    }

    /// Inserts one row and returns the stored representation.
    pub async fn insert_returning<T, R>(self, row: &T) -> Result<R, ClientError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .authed(self.client.http().post(self.endpoint()))
            .query(&self.params())
            .header("Prefer", "return=representation")
            .header(reqwest::header::ACCEPT, SINGLE_ROW_ACCEPT)
            .json(row)
            .send()
            .await
            .map_err(ClientError::network)?;
        expect_success(response)
            .await?
            .json()
            .await
            .map_err(ClientError::network)
    }

    /// Updates the filtered rows without asking for them back.
    pub async fn update<T>(self, changes: &T) -> Result<(), ClientError>
    where
        T: Serialize + ?Sized,
    {
        let response = self
            .client
            .authed(self.client.http().patch(self.endpoint()))
            .query(&self.params())
            .header("Prefer", "return=minimal")
            .json(changes)
            .send()
            .await
            .map_err(ClientError::network)?;
        expect_success(response).await?;
        Ok(())
    }

    /// Updates the filtered row and returns the stored representation;
    /// asserts exactly one row matched.
    pub async fn update_returning<T, R>(self, changes: &T) -> Result<R, ClientError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .authed(self.client.http().patch(self.endpoint()))
            .query(&self.params())
            .header("Prefer", "return=representation")
            .header(reqwest::header::ACCEPT, SINGLE_ROW_ACCEPT)
            .json(changes)
            .send()
            .await
            .map_err(ClientError::network)?;
        expect_success(response)
            .await?
            .json()
            .await
            .map_err(ClientError::network)
    }
}
