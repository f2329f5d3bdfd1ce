use std::{path::Path, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use cache::Cache;
use realtime::{ChangeFeedConnector, ChannelSpec};
use remote::RemoteClient;
use shared::{
    domain::{AlertSeverity, CameraSourceType, JunctionId, UserId},
    error::{ClientError, Result},
    protocol::{
        Alert, Junction, MapJunction, NewAlert, Profile, ProfileChanges, Session, Settings,
        TrafficReport, TrafficSample, UserAccount,
    },
};

pub mod backend;
pub mod config;
pub mod feed;
pub mod subscription;

pub use backend::BackendApi;
pub use config::{load_config, ClientConfig};
pub use shared::domain::ReportKind;
pub use subscription::Subscription;

const TRAFFIC_SAMPLE_LIMIT: u32 = 10;
const DEFAULT_ALERT_LIMIT: u32 = 50;
const DEFAULT_ALERT_TYPE: &str = "manual";
const DEFAULT_ALERT_TITLE: &str = "Traffic Alert";
const PROTECTED_PATH_PREFIX: &str = "/afterlogin/";
const AVATAR_BUCKET: &str = "avatars";

/// Receives dark-mode changes so the embedding shell can restyle itself.
pub trait ThemeSink: Send + Sync {
    fn apply_dark_mode(&self, enabled: bool);
}

pub struct NoopThemeSink;

impl ThemeSink for NoopThemeSink {
    fn apply_dark_mode(&self, _enabled: bool) {}
}

/// What `bootstrap` found: the signed-in user (if any) and the settings it
/// applied. The caller decides where to route from here.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub user: Option<UserAccount>,
    pub settings: Option<Settings>,
}

/// True for paths inside the area reserved for signed-in users.
pub fn is_protected_path(path: &str) -> bool {
    path.contains(PROTECTED_PATH_PREFIX)
}

/// One call per UI intent against the traffic platform. Every operation
/// resolves to `Result<_, ClientError>`; nothing panics or leaks a foreign
/// error type across this boundary.
pub struct TrackClient {
    remote: Arc<RemoteClient>,
    backend: Arc<BackendApi>,
    cache: Arc<Cache>,
    feed: Arc<dyn ChangeFeedConnector>,
    theme: Arc<dyn ThemeSink>,
}

#[derive(Debug, Serialize)]
struct AlertInsert<'a> {
    junction_id: JunctionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    camera_index: Option<i32>,
    alert_type: &'a str,
    severity: AlertSeverity,
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<UserId>,
}

#[derive(Debug, Serialize)]
struct CameraSourceChanges<'a> {
    source_type: CameraSourceType,
    source_url: &'a str,
    is_active: bool,
    last_active: DateTime<Utc>,
}

impl TrackClient {
    /// Builds a client wired to the real remote services described by
    /// `config`.
    pub async fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let remote = Arc::new(RemoteClient::new(&config.remote_url, &config.anon_key));
        let backend = Arc::new(BackendApi::new(&config.backend_url));
        let cache = Arc::new(Cache::open(&config.cache_url).await?);
        let feed = Arc::new(feed::WsChangeFeedConnector::new(
            &config.remote_url,
            &config.anon_key,
        ));
        Ok(Self::with_dependencies(
            remote,
            backend,
            cache,
            feed,
            Arc::new(NoopThemeSink),
        ))
    }

    pub fn with_dependencies(
        remote: Arc<RemoteClient>,
        backend: Arc<BackendApi>,
        cache: Arc<Cache>,
        feed: Arc<dyn ChangeFeedConnector>,
        theme: Arc<dyn ThemeSink>,
    ) -> Self {
        Self {
            remote,
            backend,
            cache,
            feed,
            theme,
        }
    }

    // ---- auth ----

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserAccount> {
        self.remote.auth().sign_up(email, password, display_name).await
    }

    /// Signs in and mirrors session and user into the local cache. Nothing
    /// is cached when the credentials are rejected.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.remote.auth().sign_in(email, password).await?;
        self.cache
            .put_session(&session)
            .await
            .map_err(ClientError::cache)?;
        self.cache
            .put_user(&session.user)
            .await
            .map_err(ClientError::cache)?;
        Ok(session)
    }

    /// Signs out remotely and clears the cached session, user, settings,
    /// and dark-mode flag. Local cleanup happens even when the remote call
    /// fails; the remote error is still surfaced.
    pub async fn sign_out(&self) -> Result<()> {
        let remote_result = self.remote.auth().sign_out().await;

        if let Err(err) = self.cache.clear_auth_state().await {
            warn!("failed to clear cached auth state on sign-out: {err}");
            if remote_result.is_ok() {
                return Err(ClientError::cache(err));
            }
        }

        remote_result
    }

    pub async fn current_user(&self) -> Result<Option<UserAccount>> {
        self.remote.auth().user().await
    }

    pub async fn is_authenticated(&self) -> bool {
        match self.current_user().await {
            Ok(user) => user.is_some(),
            Err(err) => {
                warn!("current-user lookup failed: {err}");
                false
            }
        }
    }

    /// The cached session, if any. This is the fast local read; it is not
    /// revalidated against the remote service.
    pub async fn session(&self) -> Result<Option<Session>> {
        self.cache.session().await.map_err(ClientError::cache)
    }

    async fn require_user(&self) -> Result<UserAccount> {
        self.current_user()
            .await?
            .ok_or(ClientError::NotAuthenticated)
    }

    // ---- profile ----

    pub async fn profile(&self) -> Result<Profile> {
        let user = self.require_user().await?;
        self.remote
            .from("profiles")
            .select("*")
            .eq("id", user.id)
            .fetch_one()
            .await
    }

    pub async fn update_profile(&self, changes: &ProfileChanges) -> Result<Profile> {
        let user = self.require_user().await?;
        self.remote
            .from("profiles")
            .eq("id", user.id)
            .update_returning(changes)
            .await
    }

    /// Stores the avatar bytes under a path derived from the user id and
    /// records the public URL on the profile. The profile write is
    /// best-effort: the object is already live once the upload succeeds.
    pub async fn upload_avatar(
        &self,
        bytes: Vec<u8>,
        file_ext: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let user = self.require_user().await?;
        let path = format!("{AVATAR_BUCKET}/{}.{file_ext}", user.id);
        let bucket = self.remote.storage_from(AVATAR_BUCKET);
        bucket.upload(&path, bytes, content_type, true).await?;
        let avatar_url = bucket.public_url(&path);

        if let Err(err) = self
            .update_profile(&ProfileChanges {
                avatar_url: Some(avatar_url.clone()),
                ..Default::default()
            })
            .await
        {
            warn!("avatar uploaded but profile update failed: {err}");
        }
        Ok(avatar_url)
    }

    // ---- settings ----

    /// Cache-first settings read. A cached value is returned without any
    /// remote call; otherwise the settings are derived from the profile and
    /// cached as a side effect. Without a profile the defaults apply.
    pub async fn settings(&self) -> Result<Settings> {
        match self.cache.settings().await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(err) => warn!("settings cache read failed; deriving from profile: {err}"),
        }

        match self.profile().await {
            Ok(profile) => {
                let settings = Settings::from_profile(&profile);
                if let Err(err) = self.cache.put_settings(&settings).await {
                    warn!("failed to cache derived settings: {err}");
                }
                Ok(settings)
            }
            Err(err) => {
                info!("no profile available ({err}); using default settings");
                Ok(Settings::default())
            }
        }
    }

    /// Writes the settings to the remote profile first; the cache follows
    /// only a confirmed remote write.
    pub async fn update_settings(&self, settings: Settings) -> Result<Profile> {
        let profile = self
            .update_profile(&ProfileChanges {
                dark_mode: Some(settings.dark_mode),
                email_alerts_enabled: Some(settings.email_alerts_enabled),
                ..Default::default()
            })
            .await?;
        self.cache
            .put_settings(&settings)
            .await
            .map_err(ClientError::cache)?;
        Ok(profile)
    }

    pub async fn set_dark_mode(&self, enabled: bool) -> Result<()> {
        let mut settings = self.settings().await?;
        settings.dark_mode = enabled;
        self.update_settings(settings).await?;
        self.apply_dark_mode(enabled).await;
        Ok(())
    }

    pub async fn set_email_alerts(&self, enabled: bool) -> Result<()> {
        let mut settings = self.settings().await?;
        settings.email_alerts_enabled = enabled;
        self.update_settings(settings).await?;
        Ok(())
    }

    /// Mirrors the dark-mode flag for plain-string consumers and notifies
    /// the theme sink.
    pub async fn apply_dark_mode(&self, enabled: bool) {
        if let Err(err) = self.cache.set_dark_mode_flag(enabled).await {
            warn!("failed to mirror dark-mode flag: {err}");
        }
        self.theme.apply_dark_mode(enabled);
    }

    // ---- junctions & traffic ----

    /// Active junctions with their cameras embedded.
    pub async fn junctions(&self) -> Result<Vec<Junction>> {
        self.remote
            .from("junctions")
            .select("*, cameras(*)")
            .eq("status", "active")
            .fetch()
            .await
    }

    /// Most recent samples for a junction, optionally narrowed to one
    /// camera.
    pub async fn traffic_data(
        &self,
        junction_id: JunctionId,
        camera_index: Option<i32>,
    ) -> Result<Vec<TrafficSample>> {
        let mut query = self
            .remote
            .from("traffic_data")
            .select("*")
            .eq("junction_id", junction_id)
            .order("timestamp", false)
            .limit(TRAFFIC_SAMPLE_LIMIT);
        if let Some(camera_index) = camera_index {
            query = query.eq("camera_index", camera_index);
        }
        query.fetch().await
    }

    /// Samples over the trailing window, oldest first.
    pub async fn traffic_history(
        &self,
        junction_id: JunctionId,
        hours: i64,
    ) -> Result<Vec<TrafficSample>> {
        let since = Utc::now() - Duration::hours(hours);
        self.remote
            .from("traffic_data")
            .select("*")
            .eq("junction_id", junction_id)
            .gte("timestamp", since.to_rfc3339())
            .order("timestamp", true)
            .fetch()
            .await
    }

    pub async fn subscribe_traffic(
        &self,
        junction_id: JunctionId,
    ) -> Result<Subscription<TrafficSample>> {
        self.subscribe_inserts(format!("traffic_{junction_id}"), "traffic_data", junction_id)
            .await
    }

    pub async fn subscribe_alerts(&self, junction_id: JunctionId) -> Result<Subscription<Alert>> {
        self.subscribe_inserts(format!("alerts_{junction_id}"), "alerts", junction_id)
            .await
    }

    async fn subscribe_inserts<T: serde::de::DeserializeOwned>(
        &self,
        topic: String,
        table: &str,
        junction_id: JunctionId,
    ) -> Result<Subscription<T>> {
        let spec = ChannelSpec::inserts(topic, table, Some(format!("junction_id=eq.{junction_id}")));
        let feed = self
            .feed
            .subscribe(spec)
            .await
            .map_err(ClientError::network)?;
        Ok(Subscription::new(feed))
    }

    // ---- alerts ----

    pub async fn alerts(&self, junction_id: JunctionId, limit: Option<u32>) -> Result<Vec<Alert>> {
        self.remote
            .from("alerts")
            .select("*")
            .eq("junction_id", junction_id)
            .order("created_at", false)
            .limit(limit.unwrap_or(DEFAULT_ALERT_LIMIT))
            .fetch()
            .await
    }

    /// Inserts the alert, then — only when the effective settings have email
    /// alerts enabled — asks the secondary backend to send the notification
    /// email for it. The notification is best-effort: its failure never
    /// affects the stored alert or the reported outcome.
    pub async fn create_alert(&self, junction_id: JunctionId, draft: NewAlert) -> Result<Alert> {
        let created_by = match self.current_user().await {
            Ok(user) => user.map(|user| user.id),
            Err(err) => {
                warn!("alert author lookup failed: {err}");
                None
            }
        };

        let row = AlertInsert {
            junction_id,
            camera_index: draft.camera_index,
            alert_type: draft.alert_type.as_deref().unwrap_or(DEFAULT_ALERT_TYPE),
            severity: draft.severity.unwrap_or(AlertSeverity::Medium),
            title: draft.title.as_deref().unwrap_or(DEFAULT_ALERT_TITLE),
            description: draft.description.as_deref().unwrap_or(""),
            created_by,
        };
        let alert: Alert = self.remote.from("alerts").insert_returning(&row).await?;

        let email_enabled = match self.settings().await {
            Ok(settings) => settings.email_alerts_enabled,
            Err(err) => {
                warn!("settings lookup failed before alert notification: {err}");
                Settings::default().email_alerts_enabled
            }
        };
        if email_enabled {
            let session = self.session().await.unwrap_or(None);
            if let Err(err) = self
                .backend
                .send_alert_email(&alert, session.as_ref())
                .await
            {
                warn!(alert_id = %alert.id, "alert stored but email notification failed: {err}");
            }
        }

        Ok(alert)
    }

    // ---- map ----

    /// Display records for the map: every active junction merged with its
    /// most recent traffic sample. The per-junction lookups run
    /// concurrently; a junction without samples (or whose lookup fails)
    /// carries no sample rather than failing the assembly.
    pub async fn map_data(&self) -> Result<Vec<MapJunction>> {
        let junctions = self.junctions().await?;

        let lookups = junctions.into_iter().map(|junction| async move {
            let latest = match self.traffic_data(junction.id, None).await {
                Ok(samples) => samples.into_iter().next(),
                Err(err) => {
                    warn!(junction_id = %junction.id, "latest traffic lookup failed: {err}");
                    None
                }
            };
            merge_map_junction(junction, latest)
        });

        Ok(join_all(lookups).await)
    }

    // ---- reports ----

    /// Stored report rows for the trailing window, newest first.
    pub async fn reports(
        &self,
        junction_id: JunctionId,
        report_type: ReportKind,
        days: i64,
    ) -> Result<Vec<TrafficReport>> {
        let since = (Utc::now() - Duration::days(days)).date_naive();
        self.remote
            .from("traffic_reports")
            .select("*")
            .eq("junction_id", junction_id)
            .eq("report_type", report_type.as_str())
            .gte("report_date", since)
            .order("report_date", false)
            .fetch()
            .await
    }

    /// Fetches the generated CSV from the secondary backend and writes it
    /// to `dest`.
    pub async fn download_report(
        &self,
        junction_id: JunctionId,
        report_type: ReportKind,
        days: i64,
        dest: &Path,
    ) -> Result<()> {
        let session = self.session().await.unwrap_or(None);
        let bytes = self
            .backend
            .download_report(junction_id, report_type, days, session.as_ref())
            .await?;
        tokio::fs::write(dest, &bytes).await.map_err(ClientError::io)?;
        info!(junction_id = %junction_id, dest = %dest.display(), "report saved");
        Ok(())
    }

    // ---- video ----

    /// Points a camera at a new video source and nudges the analysis
    /// backend to switch feeds. The nudge is best-effort; the stored camera
    /// row is already authoritative.
    pub async fn update_camera_source(
        &self,
        junction_id: JunctionId,
        camera_index: i32,
        source_type: CameraSourceType,
        source_url: &str,
    ) -> Result<()> {
        self.remote
            .from("cameras")
            .eq("junction_id", junction_id)
            .eq("camera_index", camera_index)
            .update(&CameraSourceChanges {
                source_type,
                source_url,
                is_active: true,
                last_active: Utc::now(),
            })
            .await?;

        if let Err(err) = self
            .backend
            .set_video_source(camera_index, source_type, source_url)
            .await
        {
            warn!(
                junction_id = %junction_id,
                camera_index, "camera source stored but feed notify failed: {err}"
            );
        }

        Ok(())
    }

    // ---- initialization ----

    /// Library entry point: restores a cached session if one exists, checks
    /// who is signed in, and applies their display settings. Returns what it
    /// found so the caller can route unauthenticated users away from the
    /// protected area.
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        match self.cache.session().await {
            Ok(Some(session)) => self.remote.set_access_token(Some(session.access_token)),
            Ok(None) => {}
            Err(err) => warn!("cached session read failed during bootstrap: {err}"),
        }

        let user = match self.current_user().await {
            Ok(user) => user,
            Err(err) => {
                warn!("session check failed during bootstrap: {err}");
                None
            }
        };

        let Some(user) = user else {
            info!("no user signed in");
            return Ok(BootstrapOutcome {
                user: None,
                settings: None,
            });
        };

        info!(email = %user.email, "user signed in");
        let settings = self.settings().await.unwrap_or_default();
        self.apply_dark_mode(settings.dark_mode).await;
        Ok(BootstrapOutcome {
            user: Some(user),
            settings: Some(settings),
        })
    }
}

fn merge_map_junction(junction: Junction, latest_traffic: Option<TrafficSample>) -> MapJunction {
    MapJunction {
        id: junction.id,
        name: junction.name,
        location_name: junction.location_name,
        latitude: junction.latitude.parse().unwrap_or(f64::NAN),
        longitude: junction.longitude.parse().unwrap_or(f64::NAN),
        status: junction.status,
        inspector_name: junction.inspector_name,
        cameras: junction.cameras,
        latest_traffic,
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
