//! Background compaction of the bucket stores.
//!
//! One named OS thread per bucket. It wakes every `interval`, compacts each
//! store whose reclaimable share reaches `discard_ratio`, logs failures and
//! goes back to sleep. The loop ends only when the handle is shut down.

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use objst_common::{MaintenanceConfig, Result};
use objst_store::{CompactionOutcome, KvStore};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// A store taking part in maintenance, with a label for logs
pub(crate) type NamedStore = (&'static str, Arc<KvStore>);

/// Outcome of one maintenance cycle, per store
#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(&'static str, Result<CompactionOutcome>)>,
}

impl CycleReport {
    /// Number of stores whose compaction failed
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_err()).count()
    }
}

/// Run one compaction pass over `stores`. Errors are collected, never fatal.
pub(crate) fn run_cycle(stores: &[NamedStore], discard_ratio: f64) -> CycleReport {
    let mut report = CycleReport::default();
    for (label, store) in stores {
        let outcome: Result<CompactionOutcome> = store.compact(discard_ratio).map_err(Into::into);
        match &outcome {
            Ok(CompactionOutcome::Compacted { ratio }) => {
                info!("Compacted {} store (reclaimable {:.2})", label, ratio);
            }
            Ok(CompactionOutcome::Busy) => {
                debug!("{} store busy, compaction deferred", label);
            }
            Ok(other) => debug!("{} store: {:?}", label, other),
            Err(e) => error!("Compaction of {} store failed: {}", label, e),
        }
        report.outcomes.push((label, outcome));
    }
    report
}

/// Handle to a running maintenance thread.
///
/// Dropping the handle stops the thread and waits for it.
pub struct MaintenanceHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Start the maintenance thread
    pub(crate) fn spawn(stores: Vec<NamedStore>, config: &MaintenanceConfig) -> Result<Self> {
        let (tx, rx) = bounded::<()>(1);
        let interval = config.interval();
        let discard_ratio = config.discard_ratio;

        let thread = thread::Builder::new()
            .name("objst-maintenance".into())
            .spawn(move || {
                info!(
                    "Maintenance thread started (every {:?}, discard ratio {})",
                    interval, discard_ratio
                );
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let report = run_cycle(&stores, discard_ratio);
                            if report.failures() > 0 {
                                error!(
                                    "Maintenance cycle finished with {} failed stores",
                                    report.failures()
                                );
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Maintenance thread stopped");
            })?;

        Ok(Self {
            shutdown: Some(tx),
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for the current cycle to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Disconnecting wakes the thread
        drop(self.shutdown.take());
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            error!("Maintenance thread panicked");
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
