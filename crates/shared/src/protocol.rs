use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AlertId, AlertSeverity, CameraId, CameraSourceType, CongestionLevel, JunctionId,
    JunctionStatus, ReportId, ReportKind, SampleId, UserId,
};

/// Identity record mirrored into the local cache alongside the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Bearer credential issued by the remote auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: UserAccount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_alerts_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial profile write; absent fields are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_alerts_enabled: Option<bool>,
}

/// Display settings projected out of the profile and cached locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub dark_mode: bool,
    pub email_alerts_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            email_alerts_enabled: true,
        }
    }
}

impl Settings {
    /// Projection rule: dark mode defaults off, email alerts default on
    /// unless the profile explicitly disabled them.
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            dark_mode: profile.dark_mode.unwrap_or(false),
            email_alerts_enabled: profile.email_alerts_enabled != Some(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    pub junction_id: JunctionId,
    pub camera_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<CameraSourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

/// Junction row as stored remotely. Coordinates arrive as strings and are
/// only parsed when assembling map data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    pub id: JunctionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    pub latitude: String,
    pub longitude: String,
    pub status: JunctionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector_name: Option<String>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub id: SampleId,
    pub junction_id: JunctionId,
    pub camera_index: i32,
    pub vehicle_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congestion_level: Option<CongestionLevel>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub junction_id: JunctionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_index: Option<i32>,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied alert fields; unset fields get the fixed defaults
/// (`manual`, medium severity, "Traffic Alert" title).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<AlertSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficReport {
    pub id: ReportId,
    pub junction_id: JunctionId,
    pub report_type: ReportKind,
    pub report_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_vehicles: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_hour: Option<String>,
}

/// One display record per junction: the junction merged with its most
/// recent traffic sample, coordinates parsed to numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapJunction {
    pub id: JunctionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub status: JunctionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector_name: Option<String>,
    pub cameras: Vec<Camera>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_traffic: Option<TrafficSample>,
}
