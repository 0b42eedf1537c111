// crates/server/src/jobs/kick.rs
//! Best-effort wake-ups for idle worker loops.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

/// One `Notify` per job type.
///
/// `notify_one` stores a single permit when no loop is waiting, so a kick
/// sent while every loop is busy still shortens the next idle wait. Extra
/// kicks coalesce. Nothing depends on a kick arriving: loops also wake on
/// their poll timer.
#[derive(Default)]
pub struct KickRegistry {
    signals: RwLock<HashMap<String, Arc<Notify>>>,
}

impl KickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The signal for `job_type`, created on first use.
    pub fn signal(&self, job_type: &str) -> Arc<Notify> {
        if let Ok(signals) = self.signals.read() {
            if let Some(notify) = signals.get(job_type) {
                return notify.clone();
            }
        }
        let mut signals = match self.signals.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("RwLock poisoned writing kick signals");
                poisoned.into_inner()
            }
        };
        signals
            .entry(job_type.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wake one idle loop serving `job_type`.
    pub fn kick(&self, job_type: &str) {
        tracing::trace!(job_type, "kick");
        self.signal(job_type).notify_one();
    }

    /// Wake one idle loop of every known type.
    pub fn kick_all(&self) {
        match self.signals.read() {
            Ok(signals) => signals.values().for_each(|n| n.notify_one()),
            Err(e) => tracing::error!("RwLock poisoned reading kick signals: {e}"),
        }
    }
}
