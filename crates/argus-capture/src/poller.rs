//! Remote collector polling.
//!
//! A [`RemotePoller`] pulls batches from a companion collector endpoint
//! on a fixed cadence and merges them into the local store. Ids already
//! seen are skipped, so repeated polls of the same backlog are harmless.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use argus_core::Event;

use crate::coordinator::CaptureCoordinator;

/// How often the collector is polled unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Response envelope of the collector's events endpoint.
#[derive(Debug, Deserialize)]
struct EventsEnvelope {
    #[serde(default)]
    events: Vec<Event>,
}

/// Pulls captured events from a remote collector.
pub struct RemotePoller {
    coordinator: Arc<CaptureCoordinator>,
    client: reqwest::Client,
    base_url: String,
    interval: Duration,
}

impl RemotePoller {
    pub fn new(
        coordinator: Arc<CaptureCoordinator>,
        base_url: impl Into<String>,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Argus/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            coordinator,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls the collector forever. Failures are logged and retried on
    /// the next tick.
    pub fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            info!(url = %self.base_url, interval = ?self.interval, "polling remote collector");
            loop {
                tokio::time::sleep(self.interval).await;
                match self.poll_once().await {
                    Ok(0) => {}
                    Ok(added) => debug!(added, "merged polled events"),
                    Err(error) => debug!(%error, "poll failed"),
                }
            }
        });
    }

    /// Fetches one batch and merges it. Returns how many events were new.
    pub async fn poll_once(&self) -> reqwest::Result<usize> {
        let url = format!("{}/events", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let envelope: EventsEnvelope = response.json().await?;
        Ok(self.coordinator.merge_events(envelope.events))
    }

    /// Asks the collector to drop its backlog. Best effort.
    pub async fn clear_remote(&self) -> bool {
        let url = format!("{}/clear", self.base_url);
        let result = self
            .client
            .post(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(_) => true,
            Err(error) => {
                debug!(%error, "failed to clear remote collector");
                false
            }
        }
    }
}
