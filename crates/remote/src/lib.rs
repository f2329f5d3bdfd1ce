use std::sync::RwLock;

use serde::Deserialize;
use shared::error::ClientError;

pub mod auth;
pub mod object_store;
pub mod query;

pub use auth::AuthApi;
pub use object_store::Bucket;
pub use query::TableQuery;

/// HTTP client for the backend-as-a-service. Constructed once and handed to
/// the façade; every request carries the project key, plus the signed-in
/// user's bearer token when one is held.
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn from(&self, table: &str) -> TableQuery<'_> {
        TableQuery::new(self, table)
    }

    pub fn storage_from(&self, bucket: &str) -> Bucket<'_> {
        Bucket::new(self, bucket)
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().expect("access token lock") = token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().expect("access token lock").clone()
    }

    /// Bearer credential for the next call: the user token when signed in,
    /// the project key otherwise.
    fn bearer(&self) -> String {
        self.access_token().unwrap_or_else(|| self.anon_key.clone())
    }

    pub(crate) fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Error envelope shapes used by the remote surfaces; the first populated
/// message field wins.
#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    message: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    error: Option<String>,
}

impl RemoteErrorBody {
    fn into_message(self) -> Option<String> {
        self.message
            .or(self.error_description)
            .or(self.msg)
            .or(self.error)
    }
}

/// Unwraps the remote `{data, error}` contract: success passes the response
/// through, failure becomes `ClientError::Remote` with the service message.
pub(crate) async fn expect_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<RemoteErrorBody>(&body)
        .ok()
        .and_then(RemoteErrorBody::into_message)
        .unwrap_or_else(|| format!("remote call failed with status {status}"));
    Err(ClientError::Remote(message))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
