//! Background connectivity monitor and list polling.
//!
//! Every tick runs a health check and publishes the result. While the
//! backend is reachable the configured entry list is re-fetched and
//! published too; once it is lost, polling pauses (status `MockMode`) until
//! the next successful check.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{EntryQuery, Page};
use crate::dashboard::Dashboard;
use crate::entry::Entry;
use crate::resilient::{DataSource, Fetched};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectivityStatus {
    /// No check has completed yet.
    Unknown,
    Connected { latency_ms: Option<u64> },
    /// Displayed data may be cached or simulated.
    MockMode { reason: String },
}

impl ConnectivityStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityStatus::Connected { .. })
    }
}

pub struct MonitorHandle {
    pub status: watch::Receiver<ConnectivityStatus>,
    /// Latest polled entry list; only ever holds backend data.
    pub entries: watch::Receiver<Option<Page<Entry>>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the loop and wait for it to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "monitor task ended abnormally");
        }
    }
}

/// Start the monitor. It stops when `cancel` (or the dashboard's own token)
/// is cancelled.
pub fn spawn_monitor(
    dashboard: Arc<Dashboard>,
    query: EntryQuery,
    cancel: CancellationToken,
) -> MonitorHandle {
    let (status_tx, status_rx) = watch::channel(ConnectivityStatus::Unknown);
    let (entries_tx, entries_rx) = watch::channel(None);
    let loop_cancel = cancel.clone();
    let shutdown = dashboard.cancel_token();
    let period = dashboard.config().poll_interval();

    let task = tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "connectivity monitor started");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut was_connected: Option<bool> = None;

        loop {
            tokio::select! {
                _ = loop_cancel.cancelled() => break,
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let health = dashboard.check_health().await;
            if !health.success {
                let reason = health.error.unwrap_or_else(|| "backend unreachable".into());
                if was_connected != Some(false) {
                    info!(%reason, "backend unreachable; polling paused");
                }
                was_connected = Some(false);
                status_tx.send_replace(ConnectivityStatus::MockMode { reason });
                continue;
            }

            if was_connected == Some(false) {
                info!("backend reachable again; polling resumed");
            }
            was_connected = Some(true);
            status_tx.send_replace(ConnectivityStatus::Connected {
                latency_ms: health.latency_ms,
            });

            if dashboard.session().is_err() {
                continue;
            }
            match dashboard.list_entries(&query).await {
                Ok(Fetched {
                    data,
                    source: DataSource::Remote,
                }) => {
                    debug!(count = data.items.len(), "entry list refreshed");
                    entries_tx.send_replace(Some(data));
                }
                Ok(fetched) => {
                    was_connected = Some(false);
                    status_tx.send_replace(ConnectivityStatus::MockMode {
                        reason: format!("entry list served from {:?}", fetched.source).to_lowercase(),
                    });
                }
                Err(e) => warn!(error = %e, "entry list refresh failed"),
            }
        }

        info!("connectivity monitor stopped");
    });

    MonitorHandle {
        status: status_rx,
        entries: entries_rx,
        cancel,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::db::LocalCache;
    use crate::resilient::RetryPolicy;
    use crate::session::tests::session;
    use crate::session::Role;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dashboard(base_url: &str) -> Arc<Dashboard> {
        let config = ClientConfig {
            retry: RetryPolicy {
                attempts: 1,
                backoff: Duration::from_millis(1),
                attempt_timeout: Duration::from_secs(2),
            },
            poll_interval_secs: 1,
            ..ClientConfig::new(base_url)
        };
        let d = Dashboard::new(
            config,
            LocalCache::in_memory().unwrap(),
            Box::new(MemoryStore::default()),
        )
        .unwrap();
        d.sign_in(session(Role::Admin)).unwrap();
        Arc::new(d)
    }

    #[tokio::test]
    async fn publishes_connected_status_and_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "e1", "stationId": "st-1" }], "total": 1
            })))
            .mount(&server)
            .await;

        let mut handle = spawn_monitor(
            dashboard(&server.uri()),
            EntryQuery::default(),
            CancellationToken::new(),
        );
        tokio::time::timeout(Duration::from_secs(5), handle.entries.wait_for(Option::is_some))
            .await
            .expect("entries published in time")
            .expect("sender alive");
        assert!(handle.status.borrow().is_connected());
        handle.stop().await;
    }

    #[tokio::test]
    async fn lost_backend_switches_to_mock_mode() {
        let mut handle = spawn_monitor(
            dashboard("http://127.0.0.1:9"),
            EntryQuery::default(),
            CancellationToken::new(),
        );
        tokio::time::timeout(
            Duration::from_secs(10),
            handle
                .status
                .wait_for(|s| matches!(s, ConnectivityStatus::MockMode { .. })),
        )
        .await
        .expect("status published in time")
        .expect("sender alive");
        assert!(handle.entries.borrow().is_none());
        handle.stop().await;
    }

    #[tokio::test]
    async fn dashboard_shutdown_stops_the_loop() {
        let d = dashboard("http://127.0.0.1:9");
        let handle = spawn_monitor(d.clone(), EntryQuery::default(), CancellationToken::new());
        d.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle.task)
            .await
            .expect("loop exits")
            .expect("no panic");
    }
}
