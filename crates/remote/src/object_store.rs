use shared::error::ClientError;
use tracing::info;

use crate::{expect_success, RemoteClient};

/// One bucket of the remote object store.
pub struct Bucket<'a> {
    client: &'a RemoteClient,
    bucket: String,
}

impl<'a> Bucket<'a> {
    pub(crate) fn new(client: &'a RemoteClient, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Uploads raw bytes under `path`. With `upsert` an existing object at
    /// the same path is replaced.
    pub async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        upsert: bool,
    ) -> Result<(), ClientError> {
        let mut request = self.client.authed(self.client.http().post(format!(
            "{}/storage/v1/object/{}/{path}",
            self.client.base_url(),
            self.bucket
        )));
        request = request.header("x-upsert", if upsert { "true" } else { "false" });
        if let Some(content_type) = content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = request
            .body(bytes)
            .send()
            .await
            .map_err(ClientError::network)?;
        expect_success(response).await?;
        info!(bucket = %self.bucket, path, "object uploaded");
        Ok(())
    }

    /// Public URL for an object; no request is made.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{path}",
            self.client.base_url(),
            self.bucket
        )
    }
}
