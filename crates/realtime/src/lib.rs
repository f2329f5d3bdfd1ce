use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The only change kind the façade subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Insert,
}

/// Scoped channel description: a topic name plus the table binding and row
/// filter applied by the remote change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub topic: String,
    pub schema: String,
    pub table: String,
    pub event: EventKind,
    pub filter: Option<String>,
}

impl ChannelSpec {
    /// Row-insert binding against `schema.table`, optionally filtered.
    pub fn inserts(
        topic: impl Into<String>,
        table: impl Into<String>,
        filter: Option<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            schema: "public".to_string(),
            table: table.into(),
            event: EventKind::Insert,
            filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    RowInserted {
        table: String,
        row: serde_json::Value,
    },
}

/// A live subscription to one scoped channel. Events arrive in remote
/// arrival order; dispose is the only teardown path.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    fn subscribe_events(&self) -> broadcast::Receiver<ChangeEvent>;
    async fn dispose(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ChangeFeedConnector: Send + Sync {
    async fn subscribe(
        &self,
        spec: ChannelSpec,
    ) -> anyhow::Result<std::sync::Arc<dyn ChangeFeed>>;
}

pub struct MissingChangeFeedConnector;

#[async_trait]
impl ChangeFeedConnector for MissingChangeFeedConnector {
    async fn subscribe(
        &self,
        spec: ChannelSpec,
    ) -> anyhow::Result<std::sync::Arc<dyn ChangeFeed>> {
        Err(anyhow::anyhow!(
            "change feed is unavailable for topic {}",
            spec.topic
        ))
    }
}
