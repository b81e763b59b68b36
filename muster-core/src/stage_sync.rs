use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CoordinationError, Result};

#[derive(Clone, Debug)]
enum HostOutcome {
    Done,
    Failed,
}

#[derive(Default)]
struct SyncState {
    /// stage name -> host -> outcome
    stages: BTreeMap<String, BTreeMap<String, HostOutcome>>,
    /// First failure reported anywhere; fans out to every waiter.
    failure: Option<CoordinationError>,
    aborted: Option<String>,
}

/// Barrier that blocks callers until every expected host has reported a
/// named stage. A failure from any host, or an abort, wakes all waiters
/// promptly instead of letting each one wait out its own timeout. Waiters
/// hold no lock but this barrier's own while blocked.
#[derive(Default)]
pub struct StageSync {
    state: Mutex<SyncState>,
    cv: Condvar,
}

impl StageSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `host` finished `stage`, successfully or with an error.
    pub fn report(&self, host: &str, stage: &str, error: Option<&str>) {
        let mut st = self.state.lock().unwrap();
        let outcome = match error {
            None => {
                debug!(host, stage, "host reached stage");
                HostOutcome::Done
            }
            Some(message) => {
                warn!(host, stage, message, "host reported stage failure");
                let failure = CoordinationError::HostFailure {
                    host: host.to_string(),
                    stage: stage.to_string(),
                    message: message.to_string(),
                };
                st.failure.get_or_insert(failure);
                HostOutcome::Failed
            }
        };
        st.stages.entry(stage.to_string()).or_default().insert(host.to_string(), outcome);
        drop(st);
        self.cv.notify_all();
    }

    /// Cancels all outstanding waits.
    pub fn abort(&self, reason: &str) {
        let mut st = self.state.lock().unwrap();
        if st.aborted.is_none() {
            warn!(reason, "stage synchronization aborted");
            st.aborted = Some(reason.to_string());
        }
        drop(st);
        self.cv.notify_all();
    }

    /// Blocks until every host in `expected` has reported `stage`, any host
    /// reports a failure, the barrier is aborted, or `timeout` elapses.
    pub fn wait(&self, stage: &str, expected: &[String], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock().unwrap();
        loop {
            if let Some(reason) = &st.aborted {
                return Err(CoordinationError::Aborted { reason: reason.clone() });
            }
            if let Some(failure) = &st.failure {
                return Err(failure.clone());
            }
            let reported = st.stages.get(stage);
            let missing: Vec<String> = expected
                .iter()
                .filter(|host| reported.map_or(true, |m| !m.contains_key(*host)))
                .cloned()
                .collect();
            if missing.is_empty() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CoordinationError::StageTimeout {
                    stage: stage.to_string(),
                    missing_hosts: missing,
                });
            }
            let (guard, _timed_out) = self.cv.wait_timeout(st, deadline - now).unwrap();
            st = guard;
        }
    }
}
