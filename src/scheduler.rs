//! Background jobs: the one-shot conversion batch and the auto-claim sweep.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::ledger::{ConversionSummary, Ledger, LedgerError};
use crate::types::Timestamp;

/// How often the conversion instant is checked
const CONVERSION_POLL: Duration = Duration::from_secs(30);

fn conversion_marker(instant: Timestamp) -> String {
    format!("conversion:{instant}")
}

/// Run the conversion batch for `instant` if it is due and has not run yet.
///
/// The marker is written only after the batch finishes; a crash mid-batch
/// re-runs it, and per-user conversion records keep that safe.
///
/// # Errors
/// Returns error on storage failure
pub fn run_conversion_if_due(
    ledger: &Ledger,
    instant: Timestamp,
) -> Result<Option<ConversionSummary>, LedgerError> {
    if ledger.now() < instant {
        return Ok(None);
    }
    let marker = conversion_marker(instant);
    if ledger.store().meta(&marker)?.is_some() {
        return Ok(None);
    }

    info!(batch_instant = instant, "conversion batch starting");
    let summary = ledger.run_conversion(instant)?;
    ledger.store().set_meta(&marker, &ledger.now().to_be_bytes())?;
    ledger.store().flush()?;
    Ok(Some(summary))
}

/// Timed jobs over one ledger
#[derive(Clone, Debug)]
pub struct Scheduler {
    ledger: Ledger,
    conversion_at: Option<Timestamp>,
    sweep_interval: Duration,
}

impl Scheduler {
    /// Create a scheduler
    #[must_use]
    pub const fn new(ledger: Ledger, conversion_at: Option<Timestamp>, sweep_interval: Duration) -> Self {
        Self {
            ledger,
            conversion_at,
            sweep_interval,
        }
    }

    /// Check the conversion instant once
    pub async fn conversion_tick(&self) -> Result<Option<ConversionSummary>, LedgerError> {
        let Some(instant) = self.conversion_at else {
            return Ok(None);
        };
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || run_conversion_if_due(&ledger, instant))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "conversion task panicked");
                Ok(None)
            })
    }

    /// Run one auto-claim sweep
    pub async fn sweep_tick(&self) -> Result<usize, LedgerError> {
        let ledger = self.ledger.clone();
        tokio::task::spawn_blocking(move || ledger.sweep_auto_claims())
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "auto-claim sweep panicked");
                Ok(0)
            })
    }

    /// Run on the current runtime until the returned handle is stopped
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        SchedulerHandle {
            shutdown,
            task: tokio::spawn(self.run(rx)),
        }
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut conversion = tokio::time::interval(CONVERSION_POLL);
        conversion.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            conversion_at = ?self.conversion_at,
            sweep_secs = self.sweep_interval.as_secs(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    match self.sweep_tick().await {
                        Ok(0) => {}
                        Ok(n) => debug!(claims = n, "auto-claim sweep"),
                        Err(e) => error!(error = %e, "auto-claim sweep failed"),
                    }
                }
                _ = conversion.tick() => {
                    if let Err(e) = self.conversion_tick().await {
                        error!(error = %e, "conversion batch failed; will retry");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// A running scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the loop to exit.
    ///
    /// Returns false if the loop had already gone away or ended abnormally.
    pub async fn stop(self) -> bool {
        let mut clean = true;
        if let Err(e) = self.shutdown.send(true) {
            warn!(error = %e, "scheduler was not running at shutdown");
            clean = false;
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "scheduler task ended abnormally");
            clean = false;
        }
        clean
    }
}
