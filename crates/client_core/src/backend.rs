use serde::Serialize;
use tracing::info;

use shared::{
    domain::{AlertId, AlertSeverity, CameraSourceType, JunctionId, ReportKind},
    error::ClientError,
    protocol::{Alert, Session},
};

/// REST client for the secondary backend: email-triggered alerts, CSV
/// report generation, and video-source switching. Every call here is
/// subordinate to a primary operation and reported as `Network` on failure
/// so the caller can apply the swallow policy.
pub struct BackendApi {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct AlertNotification<'a> {
    junction_id: JunctionId,
    alert_id: AlertId,
    #[serde(skip_serializing_if = "Option::is_none")]
    camera_index: Option<i32>,
    alert_type: &'a str,
    severity: AlertSeverity,
    title: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct VideoSourceRequest<'a> {
    feed_id: i32,
    source_type: CameraSourceType,
    source_url: &'a str,
}

impl BackendApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn with_session(
        request: reqwest::RequestBuilder,
        session: Option<&Session>,
    ) -> reqwest::RequestBuilder {
        match session {
            Some(session) => request
                .bearer_auth(&session.access_token)
                .header("X-User-ID", session.user.id.to_string()),
            None => request,
        }
    }

    /// Asks the backend to send the alert email for an already-stored alert.
    pub async fn send_alert_email(
        &self,
        alert: &Alert,
        session: Option<&Session>,
    ) -> Result<(), ClientError> {
        let request = self
            .http
            .post(format!("{}/api/v1/alerts", self.base_url));
        let response = Self::with_session(request, session)
            .json(&AlertNotification {
                junction_id: alert.junction_id,
                alert_id: alert.id,
                camera_index: alert.camera_index,
                alert_type: &alert.alert_type,
                severity: alert.severity,
                title: &alert.title,
                description: &alert.description,
            })
            .send()
            .await
            .map_err(ClientError::network)?;

        if !response.status().is_success() {
            return Err(ClientError::network(format!(
                "alert notification rejected with status {}",
                response.status()
            )));
        }
        info!(alert_id = %alert.id, "alert notification delivered");
        Ok(())
    }

    /// Fetches the generated CSV for a junction as raw bytes.
    pub async fn download_report(
        &self,
        junction_id: JunctionId,
        report_type: ReportKind,
        days: i64,
        session: Option<&Session>,
    ) -> Result<Vec<u8>, ClientError> {
        let request = self
            .http
            .get(format!(
                "{}/api/v1/reports/{junction_id}/download",
                self.base_url
            ))
            .query(&[
                ("type", report_type.as_str().to_string()),
                ("days", days.to_string()),
            ]);
        let response = Self::with_session(request, session)
            .send()
            .await
            .map_err(ClientError::network)?;

        if !response.status().is_success() {
            return Err(ClientError::Remote(format!(
                "report download failed with status {}",
                response.status()
            )));
        }
        Ok(response
            .bytes()
            .await
            .map_err(ClientError::network)?
            .to_vec())
    }

    /// Tells the analysis backend to switch a feed to a new video source.
    pub async fn set_video_source(
        &self,
        feed_id: i32,
        source_type: CameraSourceType,
        source_url: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let response = self
            .http
            .post(format!("{}/set_video_source", self.base_url))
            .json(&VideoSourceRequest {
                feed_id,
                source_type,
                source_url,
            })
            .send()
            .await
            .map_err(ClientError::network)?;

        if !response.status().is_success() {
            return Err(ClientError::network(format!(
                "video source switch rejected with status {}",
                response.status()
            )));
        }
        response.json().await.map_err(ClientError::network)
    }
}
