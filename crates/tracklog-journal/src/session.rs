//! Playback session state and timing loop
//!
//! One session drives one background thread. The thread and the controlling
//! handle share a `Mutex<SessionState>` and wake each other through a
//! `Condvar`: the loop sleeps until the next record is due or a control call
//! signals it, whichever comes first.
//!
//! Timing model: `anchor` is the wall-clock instant at which the log
//! timestamp `anchor_time` is (or was) replayed. A record stamped `t` is due
//! at `anchor + (t - anchor_time) / rate`. Pausing shifts `anchor` forward by
//! the paused duration; seeking and stepping re-base both values.
//!
//! Publishing happens outside the state lock but inside a separate gate.
//! `pause`, `seek`, `step` and `stop` take the gate first, so they wait for
//! an in-flight publish to finish. Once one of them returns, no record taken
//! before it can still reach the bus. A subscriber that calls back into the
//! session from inside a publish skips the gate.

use crate::config::PlaybackConfig;
use crate::playback::PlaybackState;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use tracklog_core::{Bus, MessageRecord, NANOS_PER_SEC};
use tracklog_db::RecordCursor;

/// Fire times further out than this are clamped (the log spans centuries)
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub(crate) struct SessionState {
    pub(crate) phase: PlaybackState,
    cursor: RecordCursor,
    anchor: Instant,
    anchor_time: i64,
    paused_at: Option<Instant>,
    published: u64,
    publish_failures: u64,
    consecutive_failures: u32,
    failed: bool,
}

impl SessionState {
    /// Wall-clock instant at which a record stamped `time_nanos` is due
    fn fire_time(&self, time_nanos: i64, rate: f64) -> Instant {
        let offset = time_nanos.saturating_sub(self.anchor_time).max(0);
        let scaled = Duration::try_from_secs_f64(offset as f64 / NANOS_PER_SEC as f64 / rate)
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT);
        self.anchor + scaled
    }

    fn is_due(&self, time_nanos: i64, rate: f64) -> bool {
        Instant::now() >= self.fire_time(time_nanos, rate)
    }

    fn rebase(&mut self, time_nanos: i64) {
        let now = Instant::now();
        self.anchor = now;
        self.anchor_time = time_nanos;
        if self.phase == PlaybackState::Paused {
            self.paused_at = Some(now);
        }
    }
}

pub(crate) struct Session {
    state: Mutex<SessionState>,
    signal: Condvar,
    /// Held for the whole of a publish
    gate: Mutex<()>,
    /// Thread currently inside a publish, if any
    publisher: Mutex<Option<ThreadId>>,
    bus: Arc<dyn Bus>,
    rate: f64,
    max_publish_failures: u32,
}

impl Session {
    pub(crate) fn new(bus: Arc<dyn Bus>, config: &PlaybackConfig, cursor: RecordCursor) -> Self {
        let origin = cursor.first_time().unwrap_or(0);
        Self {
            state: Mutex::new(SessionState {
                phase: PlaybackState::Starting,
                cursor,
                anchor: Instant::now(),
                anchor_time: origin,
                paused_at: None,
                published: 0,
                publish_failures: 0,
                consecutive_failures: 0,
                failed: false,
            }),
            signal: Condvar::new(),
            gate: Mutex::new(()),
            publisher: Mutex::new(None),
            bus,
            rate: config.rate,
            max_publish_failures: config.max_publish_failures,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for any in-flight publish; `None` when called from inside one
    fn gate(&self) -> Option<MutexGuard<'_, ()>> {
        let current = thread::current().id();
        let publisher = *self.publisher.lock().unwrap_or_else(PoisonError::into_inner);
        if publisher == Some(current) {
            return None;
        }
        Some(self.gate.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// `Starting -> Playing`, anchoring the replay origin to now
    pub(crate) fn begin(&self) {
        let mut state = self.lock();
        if state.phase == PlaybackState::Starting {
            state.anchor = Instant::now();
            state.phase = PlaybackState::Playing;
            self.signal.notify_all();
        }
    }

    /// Timing loop, run on the session thread until the session stops
    pub(crate) fn run(self: Arc<Self>) {
        while self.wait_until_due() {
            let _gate = self.gate();
            // A control call may have run while we waited for the gate
            let next = {
                let mut state = self.lock();
                match state.cursor.peek_time() {
                    Some(t) if state.phase == PlaybackState::Playing && state.is_due(t, self.rate) => {
                        state.cursor.next()
                    }
                    _ => None,
                }
            };
            if let Some(next) = next {
                self.deliver(next);
            }
        }
        debug!("playback thread exiting");
    }

    /// Block until the next record is due
    ///
    /// Returns `false` once the session is stopped or the cursor is exhausted.
    fn wait_until_due(&self) -> bool {
        let mut state = self.lock();
        loop {
            match state.phase {
                PlaybackState::Stopped => return false,
                PlaybackState::Idle | PlaybackState::Starting | PlaybackState::Paused => {
                    state = self
                        .signal
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                    continue;
                }
                PlaybackState::Playing => {}
            }

            let Some(time_nanos) = state.cursor.peek_time() else {
                debug!(published = state.published, "playback finished");
                state.phase = PlaybackState::Stopped;
                self.signal.notify_all();
                return false;
            };

            let due = state.fire_time(time_nanos, self.rate);
            let now = Instant::now();
            if now >= due {
                return true;
            }
            state = self
                .signal
                .wait_timeout(state, due - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Publish one record taken off the cursor. Caller holds the gate.
    fn deliver(&self, next: tracklog_db::Result<MessageRecord>) {
        let result = match next {
            Ok(record) => {
                let current = thread::current().id();
                let outer = self
                    .publisher
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(current);
                let published = self.bus.publish(&record.to_raw());
                *self.publisher.lock().unwrap_or_else(PoisonError::into_inner) = outer;
                published.map_err(|e| {
                    warn!(topic = %record.topic.name, seq = record.seq, error = %e, "publish failed, skipping record");
                })
            }
            Err(e) => {
                warn!(error = %e, "cannot read record, skipping");
                Err(())
            }
        };

        let mut state = self.lock();
        match result {
            Ok(()) => {
                state.published += 1;
                state.consecutive_failures = 0;
            }
            Err(()) => {
                state.publish_failures += 1;
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.max_publish_failures {
                    error!(
                        failures = state.consecutive_failures,
                        "too many consecutive publish failures, stopping playback"
                    );
                    state.failed = true;
                    state.phase = PlaybackState::Stopped;
                }
            }
        }
        self.signal.notify_all();
    }

    pub(crate) fn pause(&self) -> bool {
        let _gate = self.gate();
        let mut state = self.lock();
        if state.phase != PlaybackState::Playing {
            return false;
        }
        state.phase = PlaybackState::Paused;
        state.paused_at = Some(Instant::now());
        self.signal.notify_all();
        true
    }

    pub(crate) fn resume(&self) -> bool {
        let mut state = self.lock();
        if state.phase != PlaybackState::Paused {
            return false;
        }
        if let Some(paused_at) = state.paused_at.take() {
            state.anchor += paused_at.elapsed();
        }
        state.phase = PlaybackState::Playing;
        self.signal.notify_all();
        true
    }

    pub(crate) fn seek(&self, time_nanos: i64) -> bool {
        let _gate = self.gate();
        let mut state = self.lock();
        if !matches!(state.phase, PlaybackState::Playing | PlaybackState::Paused) {
            return false;
        }
        let position = state.cursor.seek(time_nanos);
        state.rebase(time_nanos);
        debug!(time_nanos, position, "seek");
        self.signal.notify_all();
        true
    }

    pub(crate) fn step(&self) -> bool {
        let _gate = self.gate();
        let next = {
            let mut state = self.lock();
            if state.phase != PlaybackState::Paused {
                return false;
            }
            let Some(time_nanos) = state.cursor.peek_time() else {
                return false;
            };
            state.rebase(time_nanos);
            state.cursor.next()
        };
        if let Some(next) = next {
            self.deliver(next);
        }
        true
    }

    /// Returns `false` if the session was already stopped
    pub(crate) fn stop(&self) -> bool {
        let _gate = self.gate();
        let mut state = self.lock();
        if state.phase == PlaybackState::Stopped {
            return false;
        }
        state.phase = PlaybackState::Stopped;
        self.signal.notify_all();
        true
    }

    pub(crate) fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .signal
            .wait_timeout_while(state, timeout, |s| s.phase != PlaybackState::Stopped)
            .unwrap_or_else(PoisonError::into_inner);
        state.phase == PlaybackState::Stopped
    }

    pub(crate) fn stats(&self) -> SessionStats {
        let state = self.lock();
        SessionStats {
            published: state.published,
            publish_failures: state.publish_failures,
            remaining: state.cursor.remaining(),
            next_time: state.cursor.peek_time(),
            failed: state.failed,
        }
    }
}

/// Counters for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Records published successfully
    pub published: u64,
    /// Records skipped because publishing failed
    pub publish_failures: u64,
    /// Records not yet replayed
    pub remaining: usize,
    /// Timestamp of the next record to replay
    pub next_time: Option<i64>,
    /// Whether the session gave up after repeated publish failures
    pub failed: bool,
}
