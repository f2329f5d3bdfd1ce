use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use shared::{
    domain::UserId,
    error::ClientError,
    protocol::{Session, UserAccount},
};

use crate::{expect_success, RemoteClient};

/// Auth surface of the remote service: sign-up, password sign-in, sign-out,
/// and current-user lookup against the token held by the client.
pub struct AuthApi<'a> {
    client: &'a RemoteClient,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct SignUpMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordGrantRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: UserId,
    email: String,
    #[serde(default)]
    user_metadata: WireUserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct WireUserMetadata {
    display_name: Option<String>,
    full_name: Option<String>,
}

impl WireUser {
    fn into_account(self) -> UserAccount {
        UserAccount {
            id: self.id,
            email: self.email,
            display_name: self
                .user_metadata
                .display_name
                .or(self.user_metadata.full_name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: WireUser,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a RemoteClient) -> Self {
        Self { client }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserAccount, ClientError> {
        let response = self
            .client
            .authed(
                self.client
                    .http()
                    .post(format!("{}/auth/v1/signup", self.client.base_url())),
            )
            .json(&SignUpRequest {
                email,
                password,
                data: SignUpMetadata { display_name },
            })
            .send()
            .await
            .map_err(ClientError::network)?;
        let user: WireUser = expect_success(response)
            .await?
            .json()
            .await
            .map_err(ClientError::network)?;
        Ok(user.into_account())
    }

    /// Exchanges credentials for a session and arms the client with the
    /// resulting bearer token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let response = self
            .client
            .authed(self.client.http().post(format!(
                "{}/auth/v1/token?grant_type=password",
                self.client.base_url()
            )))
            .json(&PasswordGrantRequest { email, password })
            .send()
            .await
            .map_err(ClientError::network)?;
        let token: TokenResponse = expect_success(response)
            .await?
            .json()
            .await
            .map_err(ClientError::network)?;

        let session = Session {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
            user: token.user.into_account(),
        };
        self.client.set_access_token(Some(token.access_token));
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    /// Revokes the remote session. The locally held token is dropped no
    /// matter what the remote call reports.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let result = match self
            .client
            .authed(
                self.client
                    .http()
                    .post(format!("{}/auth/v1/logout", self.client.base_url())),
            )
            .send()
            .await
        {
            Ok(response) => expect_success(response).await.map(|_| ()),
            Err(err) => Err(ClientError::network(err)),
        };
        self.client.set_access_token(None);
        result
    }

    /// Resolves the user behind the held token; `None` when the token is
    /// missing, expired, or rejected.
    pub async fn user(&self) -> Result<Option<UserAccount>, ClientError> {
        if self.client.access_token().is_none() {
            return Ok(None);
        }

        let response = self
            .client
            .authed(
                self.client
                    .http()
                    .get(format!("{}/auth/v1/user", self.client.base_url())),
            )
            .send()
            .await
            .map_err(ClientError::network)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(None);
        }

        let user: WireUser = expect_success(response)
            .await?
            .json()
            .await
            .map_err(ClientError::network)?;
        Ok(Some(user.into_account()))
    }
}
