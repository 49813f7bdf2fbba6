//! Status Sync Service
//!
//! Re-polls the provider for every video that has not reached a terminal
//! state, so rows converge even when nobody keeps the status page open.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::api::common::utils::timeout_query;
use crate::api::v1::generation::record_status;
use crate::api::v1::entities::videos;
use crate::errors::AppError;
use crate::InnerState;

/// Rows checked per tick, oldest update first.
const BATCH_SIZE: i64 = 25;
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub checked: usize,
    pub finished: usize,
    pub failed: usize,
}

pub struct StatusSyncService {
    inner: InnerState,
}

impl StatusSyncService {
    pub fn new(inner: InnerState) -> Self {
        Self { inner }
    }

    /// Runs forever, one pass per `period`.
    pub async fn run(self, period: Duration) {
        info!(period_secs = period.as_secs(), "Starting status sync");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.sync_once().await {
                Ok(report) if report.checked > 0 => info!(
                    checked = report.checked,
                    finished = report.finished,
                    failed = report.failed,
                    "Status sync pass complete"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Status sync pass failed"),
            }
        }
    }

    pub async fn sync_once(&self) -> Result<SyncReport, AppError> {
        let pending = videos::list_in_flight(&self.inner.db, BATCH_SIZE).await?;
        let mut report = SyncReport::default();

        for video in pending {
            report.checked += 1;
            let outcome = timeout_query(POLL_TIMEOUT, async {
                let status = self.inner.heygen.video_status(&video.id).await?;
                record_status(&self.inner, &video.id, &status).await?;
                Ok(status.status)
            })
            .await;

            match outcome {
                Ok(status) if status.is_terminal() => {
                    report.finished += 1;
                    metrics::counter!("videos_finished_total", "status" => status.to_string()).increment(1);
                }
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(video_id = %video.id, error = %e, "Could not refresh video status");
                }
            }
        }

        Ok(report)
    }
}
