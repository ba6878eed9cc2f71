// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily driver for batch matching and midnight cleanup.
//!
//! Neither job is fatal: a failed pass is logged and the next day's tick
//! retries. The loop only exits when its [`CancellationToken`] fires.

use std::sync::Arc;

use chrono::{DateTime, Local, LocalResult, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tandem_core::{ChatStore, MarkerStore, TandemError};
use tandem_scoring::ScoringEngine;

use crate::engine::MatchEngine;

/// The next instant strictly after `now` at which the local wall clock in
/// `now`'s timezone reads `at`. A time skipped by a DST gap resolves to the
/// first valid instant after it.
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Utc> {
    let tz = now.timezone();
    let now_utc = now.with_timezone(&Utc);
    let mut day = now.date_naive();
    for _ in 0..3 {
        let mut naive = day.and_time(at);
        let candidate = loop {
            match tz.from_local_datetime(&naive) {
                LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => {
                    break t.with_timezone(&Utc);
                }
                LocalResult::None => naive += chrono::Duration::minutes(15),
            }
        };
        if candidate > now_utc {
            return candidate;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    now_utc + chrono::Duration::days(1)
}

/// Outcome of one midnight cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub sessions_ended: usize,
    pub markers_purged: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Batch,
    Cleanup,
}

/// Runs batch matching and cleanup at fixed local wall-clock times.
pub struct DailyScheduler {
    matcher: Arc<MatchEngine>,
    scoring: ScoringEngine,
    store: Arc<dyn ChatStore>,
    markers: Arc<dyn MarkerStore>,
    batch_at: NaiveTime,
    cleanup_at: NaiveTime,
}

impl DailyScheduler {
    pub fn new(
        matcher: Arc<MatchEngine>,
        scoring: ScoringEngine,
        store: Arc<dyn ChatStore>,
        markers: Arc<dyn MarkerStore>,
        batch_at: NaiveTime,
        cleanup_at: NaiveTime,
    ) -> Self {
        Self {
            matcher,
            scoring,
            store,
            markers,
            batch_at,
            cleanup_at,
        }
    }

    /// Force-end every active session, penalize silent participants, and
    /// score both sides of each ended session. Expired markers are purged last.
    pub async fn midnight_cleanup(&self) -> Result<CleanupReport, TandemError> {
        let ended = self.store.end_all_active().await?;
        for session in &ended {
            self.scoring.apply_inactivity_penalty(&session.id).await;
            for user in session.participants() {
                self.scoring.compute_session_score(user, &session.id).await;
            }
        }

        let markers_purged = match self.markers.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "marker purge failed");
                0
            }
        };

        let report = CleanupReport {
            sessions_ended: ended.len(),
            markers_purged,
        };
        info!(
            sessions_ended = report.sessions_ended,
            markers_purged = report.markers_purged,
            "midnight cleanup complete"
        );
        Ok(report)
    }

    fn next_jobs(&self, now: &DateTime<Local>) -> (DateTime<Utc>, Vec<Job>) {
        let batch = next_occurrence(now, self.batch_at);
        let cleanup = next_occurrence(now, self.cleanup_at);
        if batch == cleanup {
            (cleanup, vec![Job::Cleanup, Job::Batch])
        } else if cleanup < batch {
            (cleanup, vec![Job::Cleanup])
        } else {
            (batch, vec![Job::Batch])
        }
    }

    async fn run_job(&self, job: Job) {
        match job {
            Job::Batch => {
                if let Err(e) = self.matcher.run_batch_matching().await {
                    error!(error = %e, "batch matching aborted");
                }
            }
            Job::Cleanup => {
                if let Err(e) = self.midnight_cleanup().await {
                    error!(error = %e, "midnight cleanup aborted");
                }
            }
        }
    }

    /// Runs until `cancel` fires. A job already in progress runs to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(batch_at = %self.batch_at, cleanup_at = %self.cleanup_at, "scheduler running");
        loop {
            let (due, jobs) = self.next_jobs(&Local::now());
            let wait = (due - Utc::now()).to_std().unwrap_or_default();
            debug!(due = %due, ?jobs, "next scheduled run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    for job in jobs {
                        self.run_job(job).await;
                    }
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }
    }
}
