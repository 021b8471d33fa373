use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};

use super::types::{CycleReport, CycleStepDurations, DriverState, RefreshRequest};
use super::{PollState, lock};
use crate::api;
use crate::logging::{StructuredLogger, get_logger};

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl super::AlfenDevice {
    /// Drive one update cycle.
    ///
    /// Returns true when a cycle is already running (the trigger is dropped)
    /// and while the session is held logged out. False means the login step
    /// failed.
    pub async fn async_update(&self) -> bool {
        if self.keep_logout() {
            return true;
        }
        let Ok(mut poll) = self.poll.try_lock() else {
            self.logger
                .debug("Update cycle already in progress, skipping trigger");
            return true;
        };
        self.run_cycle(&mut poll).await
    }

    async fn run_cycle(&self, poll: &mut PollState) -> bool {
        let started = Instant::now();
        let started_at = chrono::Utc::now();
        let mut steps = CycleStepDurations::default();
        self.logger.debug("Starting update cycle");

        if !self.is_logged_in() {
            let step = Instant::now();
            let login_timeout = self.session_config.login_timeout();
            let logged_in = matches!(timeout(login_timeout, self.login()).await, Ok(true));
            steps.login_ms = Some(elapsed_ms(step));
            if !logged_in {
                lock(&self.session).mark_unauthenticated();
                self.logger.warn(&format!(
                    "Update cycle FAILED (login failed) after {:.2}s",
                    started.elapsed().as_secs_f64()
                ));
                self.record_cycle(CycleReport {
                    success: false,
                    started_at,
                    duration_ms: elapsed_ms(started),
                    categories: Vec::new(),
                    rotation_index: poll.rotation.index(),
                    steps,
                });
                return false;
            }
        }

        let step = Instant::now();
        if self.drain_pending_writes().await {
            steps.writes_ms = Some(elapsed_ms(step));
        }

        if self.bootstrap_pending() {
            let step = Instant::now();
            let categories = self.static_categories();
            self.logger.info(&format!(
                "Loading {} static categories: {:?}",
                categories.len(),
                categories
            ));
            let merged = self.fetch_categories(&categories).await;
            self.bootstrap_pending.store(false, Ordering::SeqCst);
            steps.bootstrap_ms = Some(elapsed_ms(step));
            self.logger
                .debug(&format!("Static bootstrap merged {} properties", merged));
        }

        let options = self.options();
        let step = Instant::now();
        poll.rotation
            .set_categories_per_cycle(options.categories_per_cycle);
        let batch = poll.rotation.next_batch(&options.rotating_categories());
        if !batch.is_empty() {
            self.fetch_categories(&batch).await;
            steps.rotate_ms = Some(elapsed_ms(step));
        }

        if options.is_enabled(api::CAT_LOGS) {
            poll.log_counter = poll.log_counter.wrapping_add(1);
            if poll.log_counter % options.log_every_cycles.max(1) == 0 {
                let step = Instant::now();
                self.fetch_logs(&mut poll.logs).await;
                steps.logs_ms = Some(elapsed_ms(step));
            }
        }

        if options.is_enabled(api::CAT_TRANSACTIONS) {
            poll.transaction_counter = poll.transaction_counter.wrapping_add(1);
            if poll.transaction_counter % options.transactions_every_cycles.max(1) == 0 {
                let step = Instant::now();
                self.fetch_transactions(&mut poll.scanner).await;
                steps.transactions_ms = Some(elapsed_ms(step));
            }
        }

        self.logger.info(&format!(
            "Update cycle completed in {:.2}s (categories: {:?})",
            started.elapsed().as_secs_f64(),
            batch
        ));
        self.record_cycle(CycleReport {
            success: true,
            started_at,
            duration_ms: elapsed_ms(started),
            categories: batch,
            rotation_index: poll.rotation.index(),
            steps,
        });
        true
    }

    fn record_cycle(&self, report: CycleReport) {
        *lock(&self.last_cycle) = Some(report);
    }
}

/// Schedules update cycles for one device.
///
/// Cycles run on the scan interval and whenever a [`RefreshRequest`] arrives;
/// requests that pile up while a cycle runs collapse into a single cycle.
pub struct Poller {
    device: Arc<super::AlfenDevice>,
    refresh_rx: mpsc::UnboundedReceiver<RefreshRequest>,
    state: watch::Sender<DriverState>,
    logger: StructuredLogger,
    total_cycles: u64,
    failed_cycles: u64,
    consecutive_failures: u32,
}

impl Poller {
    pub fn new(
        device: Arc<super::AlfenDevice>,
        refresh_rx: mpsc::UnboundedReceiver<RefreshRequest>,
    ) -> Self {
        let (state, _) = watch::channel(DriverState::Initializing);
        Self {
            device,
            refresh_rx,
            state,
            logger: get_logger("poller"),
            total_cycles: 0,
            failed_cycles: 0,
            consecutive_failures: 0,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    pub fn device(&self) -> &Arc<super::AlfenDevice> {
        &self.device
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one cycle under the overall cycle timeout.
    ///
    /// The first cycles, until the static bootstrap completes, get the longer
    /// bootstrap timeout. A timed-out cycle leaves the session logged out.
    pub async fn refresh(&mut self) -> bool {
        let options = self.device.options();
        let limit = if self.device.bootstrap_pending() {
            options.bootstrap_timeout()
        } else {
            options.cycle_timeout()
        };

        let ok = match timeout(limit, self.device.async_update()).await {
            Ok(ok) => ok,
            Err(_) => {
                self.logger.warn(&format!(
                    "Update cycle timed out after {}s, forcing re-login",
                    limit.as_secs()
                ));
                self.device.mark_unauthenticated();
                false
            }
        };

        self.total_cycles = self.total_cycles.saturating_add(1);
        if ok {
            self.consecutive_failures = 0;
            self.state.send_replace(DriverState::Running);
        } else {
            self.failed_cycles = self.failed_cycles.saturating_add(1);
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.state.send_replace(DriverState::Error(format!(
                "{} consecutive failed update cycles",
                self.consecutive_failures
            )));
        }
        ok
    }

    /// Main loop, until `shutdown_rx` yields or closes
    pub async fn run(mut self, mut shutdown_rx: mpsc::UnboundedReceiver<()>) {
        let scan_interval = self.device.options().scan_interval();
        self.logger.info(&format!(
            "Starting poller for {} every {}s",
            self.device.log_id(),
            scan_interval.as_secs()
        ));

        let mut ticker = interval(scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                Some(request) = self.refresh_rx.recv() => {
                    let mut coalesced = 0;
                    while self.refresh_rx.try_recv().is_ok() {
                        coalesced += 1;
                    }
                    self.logger.debug(&format!(
                        "Refresh requested ({:?}, {} more coalesced)",
                        request, coalesced
                    ));
                    self.refresh().await;
                }
                _ = shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send_replace(DriverState::ShuttingDown);
    }
}
