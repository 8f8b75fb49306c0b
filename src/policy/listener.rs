//! Push-based invalidation over a Redis channel.
//!
//! A publisher sends `<marker>:<version>` after changing the rule store; every
//! subscribed instance records the version and reloads at once instead of
//! waiting out its poll interval.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use redis::AsyncCommands;
use tokio::task::JoinHandle;

use crate::policy::errors::PolicyError;
use crate::policy::loader::LoadReport;
use crate::policy::polling::VersionPollingService;

pub const DEFAULT_CHANNEL: &str = "policy:changes";
pub const DEFAULT_RELOAD_MARKER: &str = "reload";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Version carried by a well-formed `<marker>:<version>` message.
pub fn parse_reload_message(payload: &str, marker: &str) -> Option<i64> {
    let (prefix, version) = payload.trim().split_once(':')?;
    if prefix != marker {
        return None;
    }
    let version = version.trim();
    let digits = version.strip_prefix('-').unwrap_or(version);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    version.parse().ok()
}

pub fn reload_message(marker: &str, version: i64) -> String {
    format!("{marker}:{version}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Ignored,
    Reloaded { version: i64, report: LoadReport },
    /// The version was recorded but the reload failed
    Failed { version: i64 },
}

pub struct InvalidationListener {
    polling: Arc<VersionPollingService>,
    channel: String,
    marker: String,
}

impl InvalidationListener {
    pub fn new(
        polling: Arc<VersionPollingService>,
        channel: impl Into<String>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            polling,
            channel: channel.into(),
            marker: marker.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Handle one inbound message. Never fails: each message stands alone.
    pub async fn handle_message(&self, payload: &str) -> MessageOutcome {
        tracing::debug!(channel = %self.channel, payload, "Received policy message");

        let Some(version) = parse_reload_message(payload, &self.marker) else {
            tracing::debug!(payload, "Ignoring unknown message");
            return MessageOutcome::Ignored;
        };

        tracing::info!(version, channel = %self.channel, "Processing policy reload event");
        self.polling.set_cached_version(version);

        let engine = self.polling.engine().clone();
        match self.polling.loader().load_policies(engine.as_ref()).await {
            Ok(report) => {
                tracing::info!(version, rules = report.loaded, "Policy reload completed");
                MessageOutcome::Reloaded { version, report }
            }
            Err(e) => {
                tracing::error!(version, error = %e, "Failed to process policy reload message, ignoring");
                MessageOutcome::Failed { version }
            }
        }
    }

    /// Subscribe and process messages forever, reconnecting when the
    /// connection drops.
    pub async fn run(self: Arc<Self>, client: redis::Client) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.subscribe(&client).await {
                Ok(mut pubsub) => {
                    backoff = INITIAL_BACKOFF;
                    tracing::info!(channel = %self.channel, "Subscribed to policy change channel");

                    let mut messages = pubsub.on_message();
                    while let Some(msg) = messages.next().await {
                        match msg.get_payload::<String>() {
                            Ok(payload) => {
                                self.handle_message(&payload).await;
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "Ignoring non-text message");
                            }
                        }
                    }
                    tracing::warn!(channel = %self.channel, "Policy change subscription ended");
                }
                Err(e) => {
                    tracing::error!(channel = %self.channel, error = %e, "Failed to subscribe to policy change channel");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    pub fn spawn(self: Arc<Self>, client: redis::Client) -> JoinHandle<()> {
        tokio::spawn(self.run(client))
    }

    async fn subscribe(&self, client: &redis::Client) -> Result<redis::aio::PubSub, PolicyError> {
        let mut pubsub = client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(&self.channel).await?;
        Ok(pubsub)
    }
}

/// Broadcast a reload notification. Returns the number of receivers.
pub async fn publish_reload(
    client: &redis::Client,
    channel: &str,
    marker: &str,
    version: i64,
) -> Result<usize, PolicyError> {
    let mut conn = client.get_async_connection().await?;
    let receivers: usize = conn.publish(channel, reload_message(marker, version)).await?;
    tracing::info!(channel, version, receivers, "Published policy reload");
    Ok(receivers)
}
