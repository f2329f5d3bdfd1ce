use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{
    net::TcpStream,
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};
use url::Url;

use realtime::{ChangeEvent, ChangeFeed, ChangeFeedConnector, ChannelSpec, EventKind};

const EVENT_BUFFER: usize = 256;
const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const HEARTBEAT_TOPIC: &str = "phoenix";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Joins scoped channels over the remote change-feed websocket and pumps
/// row-insert notifications into a broadcast channel per subscription.
pub struct WsChangeFeedConnector {
    remote_url: String,
    anon_key: String,
}

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    topic: &'a str,
    event: &'a str,
    payload: serde_json::Value,
    #[serde(rename = "ref")]
    frame_ref: String,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl WsChangeFeedConnector {
    pub fn new(remote_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    fn websocket_url(&self) -> Result<String> {
        let ws_base = if let Some(rest) = self.remote_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.remote_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(anyhow!("remote url must start with http:// or https://"));
        };
        let ws_url = format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.anon_key
        );
        Url::parse(&ws_url).with_context(|| format!("invalid change-feed url: {ws_url}"))?;
        Ok(ws_url)
    }
}

fn join_payload(spec: &ChannelSpec) -> serde_json::Value {
    let event_name = match spec.event {
        EventKind::Insert => "INSERT",
    };
    let mut binding = json!({
        "event": event_name,
        "schema": spec.schema,
        "table": spec.table,
    });
    if let Some(filter) = &spec.filter {
        binding["filter"] = json!(filter);
    }
    json!({ "config": { "postgres_changes": [binding] } })
}

fn decode_row_insert(payload: &serde_json::Value, fallback_table: &str) -> Option<ChangeEvent> {
    let data = payload.get("data").unwrap_or(payload);
    let change_type = data.get("type").and_then(|v| v.as_str()).unwrap_or("INSERT");
    if change_type != "INSERT" {
        return None;
    }
    let row = data.get("record").or_else(|| data.get("new"))?.clone();
    let table = data
        .get("table")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback_table)
        .to_string();
    Some(ChangeEvent::RowInserted { table, row })
}

struct WsChangeFeed {
    topic: String,
    writer: Arc<Mutex<WsSink>>,
    events: broadcast::Sender<ChangeEvent>,
    frame_counter: AtomicU64,
    tasks: Vec<JoinHandle<()>>,
}

impl WsChangeFeed {
    fn next_ref(&self) -> String {
        (self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

#[async_trait]
impl ChangeFeedConnector for WsChangeFeedConnector {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Arc<dyn ChangeFeed>> {
        let ws_url = self.websocket_url()?;
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect change feed: {ws_url}"))?;
        let (mut write, mut read) = ws_stream.split();

        let topic = format!("realtime:{}", spec.topic);
        let join = OutboundFrame {
            topic: &topic,
            event: "phx_join",
            payload: join_payload(&spec),
            frame_ref: "1".to_string(),
        };
        write
            .send(Message::Text(serde_json::to_string(&join)?))
            .await
            .context("failed to join change-feed channel")?;
        info!(topic = %topic, table = %spec.table, "change-feed channel joined");

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let writer = Arc::new(Mutex::new(write));

        let reader_events = events.clone();
        let reader_topic = topic.clone();
        let fallback_table = spec.table.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<InboundFrame>(&text) {
                        Ok(frame) => {
                            if frame.topic != reader_topic {
                                continue;
                            }
                            match frame.event.as_str() {
                                "postgres_changes" => {
                                    if let Some(event) =
                                        decode_row_insert(&frame.payload, &fallback_table)
                                    {
                                        let _ = reader_events.send(event);
                                    }
                                }
                                "phx_reply" => {
                                    let status = frame
                                        .payload
                                        .get("status")
                                        .and_then(|v| v.as_str())
                                        .unwrap_or("unknown");
                                    if status != "ok" {
                                        warn!(topic = %reader_topic, status, "change-feed join reply not ok");
                                    }
                                }
                                "phx_error" => {
                                    warn!(topic = %reader_topic, "change-feed channel errored")
                                }
                                _ => {}
                            }
                        }
                        Err(err) => warn!("invalid change-feed frame: {err}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("change-feed receive failed: {err}");
                        break;
                    }
                }
            }
        });

        let heartbeat_writer = Arc::clone(&writer);
        let heartbeat_task = tokio::spawn(async move {
            let mut counter: u64 = 0;
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                counter += 1;
                let frame = OutboundFrame {
                    topic: HEARTBEAT_TOPIC,
                    event: "heartbeat",
                    payload: json!({}),
                    frame_ref: format!("hb-{counter}"),
                };
                let Ok(text) = serde_json::to_string(&frame) else {
                    continue;
                };
                if heartbeat_writer
                    .lock()
                    .await
                    .send(Message::Text(text))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Arc::new(WsChangeFeed {
            topic,
            writer,
            events,
            frame_counter: AtomicU64::new(1),
            tasks: vec![reader_task, heartbeat_task],
        }) as Arc<dyn ChangeFeed>)
    }
}

#[async_trait]
impl ChangeFeed for WsChangeFeed {
    fn subscribe_events(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    async fn dispose(&self) -> Result<()> {
        let leave = OutboundFrame {
            topic: &self.topic,
            event: "phx_leave",
            payload: json!({}),
            frame_ref: self.next_ref(),
        };
        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer
                .send(Message::Text(serde_json::to_string(&leave)?))
                .await
            {
                warn!(topic = %self.topic, "failed to send leave frame: {err}");
            }
            let _ = writer.close().await;
        }
        for task in &self.tasks {
            task.abort();
        }
        info!(topic = %self.topic, "change-feed channel disposed");
        Ok(())
    }
}
