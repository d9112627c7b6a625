use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime};
use dispatch_engine::{Allocator, EngineError};
use dispatch_models::{AllocationReport, ScheduleConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::SchedulerError;
use crate::schedule::next_fire_after;

/// Longest single sleep between wall-clock checks, so clock changes and
/// suspend/resume are noticed well before the fire time.
const MAX_NAP: Duration = Duration::from_secs(15 * 60);

/// Drives the daily allocation pass and accepts out-of-band triggers.
pub struct Scheduler {
    allocator: Arc<Allocator>,
    config: ScheduleConfig,
    fire_time: NaiveTime,
    cancel: CancellationToken,
    fired: AtomicU64,
}

impl Scheduler {
    pub fn new(allocator: Arc<Allocator>, config: ScheduleConfig) -> Result<Self, SchedulerError> {
        let fire_time = config.fire_time().ok_or_else(|| {
            SchedulerError::Config(format!(
                "invalid schedule time {:02}:{:02}",
                config.hour, config.minute
            ))
        })?;
        Ok(Self {
            allocator,
            config,
            fire_time,
            cancel: CancellationToken::new(),
            fired: AtomicU64::new(0),
        })
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scheduled passes started so far, successful or not.
    pub fn fired_passes(&self) -> u64 {
        self.fired.load(Ordering::Acquire)
    }

    pub fn next_fire(&self) -> DateTime<Local> {
        next_fire_after(&Local::now(), self.fire_time)
    }

    /// Run an allocation pass now. Waits for an in-flight pass for at most
    /// the configured trigger wait. The daily schedule is unaffected.
    pub async fn trigger_now(&self) -> Result<AllocationReport, EngineError> {
        info!("Manual allocation triggered");
        self.allocator
            .allocate_within(self.allocator.trigger_wait())
            .await
    }

    /// Run until cancelled. A pass that has started always runs to
    /// completion; shutdown also waits for any manual pass in flight.
    pub async fn run(&self) {
        if self.config.enabled {
            info!(
                at = %self.fire_time.format("%H:%M"),
                run_on_startup = self.config.run_on_startup,
                "Allocation scheduler starting"
            );
            self.schedule_loop().await;
        } else {
            info!("Allocation schedule disabled; accepting manual triggers only");
            self.cancel.cancelled().await;
        }

        self.allocator.wait_idle().await;
        info!("Allocation scheduler stopped");
    }

    async fn schedule_loop(&self) {
        if self.config.run_on_startup && !self.cancel.is_cancelled() {
            self.run_scheduled_pass().await;
        }

        loop {
            let next = self.next_fire();
            info!(next = %next, "Next allocation pass scheduled");
            if !self.sleep_until(next).await {
                info!("Allocation scheduler shutting down");
                break;
            }
            self.run_scheduled_pass().await;
        }
    }

    /// Returns false if cancelled before `at`.
    async fn sleep_until(&self, at: DateTime<Local>) -> bool {
        loop {
            let remaining = match (at - Local::now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining,
                _ => return true,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(remaining.min(MAX_NAP)) => {}
            }
        }
    }

    async fn run_scheduled_pass(&self) {
        self.fired.fetch_add(1, Ordering::AcqRel);
        info!("Running scheduled allocation pass");
        match self.allocator.allocate().await {
            Ok(report) => {
                info!(
                    run_id = %report.run_id,
                    assigned = report.assigned_count(),
                    deferred = report.deferred_order_ids.len(),
                    "Scheduled allocation pass complete"
                );
            }
            Err(e) => {
                error!(error = %e, "Scheduled allocation pass failed");
            }
        }
    }
}
