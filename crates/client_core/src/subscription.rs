use std::{marker::PhantomData, sync::Arc};

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use realtime::{ChangeEvent, ChangeFeed};
use shared::error::{ClientError, Result};

/// Typed view over one live channel. Ownership and teardown are explicit:
/// the caller drives `next` (or `stream`) and calls `dispose` to leave the
/// remote channel; nothing is cleaned up implicitly.
pub struct Subscription<T> {
    feed: Arc<dyn ChangeFeed>,
    rx: broadcast::Receiver<ChangeEvent>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    pub(crate) fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        let rx = feed.subscribe_events();
        Self {
            feed,
            rx,
            _marker: PhantomData,
        }
    }

    /// Next inserted row, decoded; `None` once the channel is gone. Rows
    /// that fail to decode are dropped with a warning.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(ChangeEvent::RowInserted { row, .. }) => {
                    match serde_json::from_value(row) {
                        Ok(decoded) => return Some(decoded),
                        Err(err) => warn!("dropping undecodable change-feed row: {err}"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change-feed receiver lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The same events as an async stream, starting from the call; lag and
    /// decode failures are skipped.
    pub fn stream(&self) -> impl futures::Stream<Item = T> {
        BroadcastStream::new(self.feed.subscribe_events()).filter_map(|event| async move {
            match event {
                Ok(ChangeEvent::RowInserted { row, .. }) => serde_json::from_value(row).ok(),
                Err(_) => None,
            }
        })
    }

    /// Leaves the remote channel and tears the local pump down.
    pub async fn dispose(self) -> Result<()> {
        self.feed.dispose().await.map_err(ClientError::network)
    }
}
