//! Timing-faithful playback of a topic log onto a bus

use crate::config::PlaybackConfig;
use crate::session::{Session, SessionStats};
use crate::Result;
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracklog_core::Bus;
use tracklog_db::{LogStore, QueryOptions, TopicSelector};

/// State of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Selecting topics, nothing started
    Idle,
    /// Session created, timing thread not yet released
    Starting,
    /// Replaying records on schedule
    Playing,
    /// Clock frozen, cursor kept
    Paused,
    /// Finished, stopped or failed; cannot be resumed
    Stopped,
}

/// Playback controller
///
/// Collects a topic selection against the log's catalog, then starts a
/// session that republishes the selected records with their recorded gaps:
/// - `add_topic` / `add_topic_pattern` while idle
/// - `start` returns a [`PlaybackHandle`] or `None` when there is nothing to play
/// - the handle pauses, resumes, seeks, steps and stops
///
/// A controller starts at most one session; create a new one to replay again.
pub struct Playback {
    store: Arc<LogStore>,
    bus: Arc<dyn Bus>,
    config: PlaybackConfig,
    selector: TopicSelector,
    started: bool,
}

impl Playback {
    /// Create a controller over an open log
    pub fn new(store: Arc<LogStore>, bus: Arc<dyn Bus>) -> Self {
        Self {
            store,
            bus,
            config: PlaybackConfig::default(),
            selector: TopicSelector::new(),
            started: false,
        }
    }

    /// Open the log at `path` (or `:memory:`) and create a controller over it
    pub fn open(path: impl AsRef<Path>, bus: Arc<dyn Bus>) -> Result<Self> {
        let store = LogStore::open(path)?;
        Ok(Self::new(Arc::new(store), bus))
    }

    /// Replace the playback settings
    pub fn with_config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Current settings
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// The log being replayed
    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// Whether a session was started from this controller
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Topics selected so far
    pub fn selection(&self) -> &TopicSelector {
        &self.selector
    }

    /// Select a topic by exact name
    ///
    /// Returns `false` if the log has no such topic or a session was already
    /// started.
    pub fn add_topic(&mut self, name: &str) -> bool {
        if self.started {
            debug!(topic = name, "selection is closed once playback started");
            return false;
        }
        self.selector.add_from_store(&self.store, name)
    }

    /// Select every logged topic whose whole name matches `pattern`
    ///
    /// Returns the number of matching topics, or `-1` when the log has no
    /// topic catalog to search or a session was already started.
    pub fn add_topic_pattern(&mut self, pattern: &Regex) -> i64 {
        if self.started {
            debug!(pattern = pattern.as_str(), "selection is closed once playback started");
            return -1;
        }
        self.selector.add_pattern_from_store(&self.store, pattern)
    }

    /// Start replaying the selected topics
    ///
    /// Returns `None`, changing nothing, when the log has no topics, nothing
    /// is selected, the settings are invalid, or a session was already
    /// started.
    pub fn start(&mut self) -> Option<PlaybackHandle> {
        if self.started {
            debug!("playback already started");
            return None;
        }
        if let Err(e) = self.config.validate() {
            warn!(error = %e, "refusing to start playback");
            return None;
        }

        let catalog = match self.store.topics() {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "cannot read topic catalog");
                return None;
            }
        };
        if catalog.is_empty() {
            debug!(store = self.store.location(), "log has no topics to play");
            return None;
        }
        if self.selector.is_empty() {
            debug!("no topics selected");
            return None;
        }

        let options = QueryOptions {
            topics: self.selector.selection().clone(),
            range: self.config.range,
        };
        let cursor = match self.store.query(&options) {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, "cannot read log records");
                return None;
            }
        };

        for topic in catalog.iter().filter(|t| self.selector.contains(&t.name)) {
            if let Err(e) = self.bus.advertise(&topic.name, &topic.type_name) {
                warn!(topic = %topic, error = %e, "cannot advertise topic");
            }
        }

        let records = cursor.len();
        let session = Arc::new(Session::new(self.bus.clone(), &self.config, cursor));
        let worker = {
            let session = session.clone();
            thread::Builder::new()
                .name("tracklog-playback".to_string())
                .spawn(move || session.run())
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                warn!(error = %e, "cannot spawn playback thread");
                return None;
            }
        };

        session.begin();
        self.started = true;
        info!(
            topics = self.selector.len(),
            records,
            rate = self.config.rate,
            "playback started"
        );
        Some(PlaybackHandle {
            session,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("store", &self.store.location())
            .field("selected", &self.selector.len())
            .field("started", &self.started)
            .finish()
    }
}

/// Handle to a running playback session
///
/// Owns the timing thread: [`stop`](PlaybackHandle::stop), or dropping the
/// handle, stops the session and joins the thread.
///
/// `pause`, `seek`, `step` and `stop` wait for a publish already in progress.
/// After one returns, the bus sees no record that the session took before it.
pub struct PlaybackHandle {
    session: Arc<Session>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackHandle {
    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.session.lock().phase
    }

    /// Freeze the replay clock. Only valid while playing.
    pub fn pause(&self) -> bool {
        self.session.pause()
    }

    /// Continue after a pause, keeping the remaining gaps intact
    pub fn resume(&self) -> bool {
        self.session.resume()
    }

    /// Jump to the first record at or after `time_nanos`
    ///
    /// Valid while playing or paused. Gaps are measured from `time_nanos`
    /// afterwards.
    pub fn seek(&self, time_nanos: i64) -> bool {
        self.session.seek(time_nanos)
    }

    /// Publish exactly the next record. Only valid while paused.
    ///
    /// Returns `false` when not paused or nothing is left to replay.
    pub fn step(&self) -> bool {
        self.session.step()
    }

    /// Stop the session and join the timing thread
    ///
    /// Safe to call repeatedly; later calls do nothing.
    pub fn stop(&self) {
        if self.session.stop() {
            debug!("playback stopped");
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            // A bus callback running on the timing thread may stop its own
            // session; joining there would deadlock.
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("playback thread panicked");
            }
        }
    }

    /// Block until the session stops on its own or `timeout` elapses
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        self.session.wait_until_stopped(timeout)
    }

    /// Whether the session is stopped
    pub fn is_finished(&self) -> bool {
        self.state() == PlaybackState::Stopped
    }

    /// Session counters
    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// Records published so far
    pub fn published(&self) -> u64 {
        self.stats().published
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Recorder;
    use std::time::Instant;
    use tracklog_core::{Callback, MemoryBus, RawMessage, SubscriptionId, Topic, TimeRange};

    const MS: i64 = 1_000_000;

    type Received = Arc<Mutex<Vec<(Instant, RawMessage)>>>;

    fn store_with(records: &[(&str, i64, &[u8])]) -> Arc<LogStore> {
        let store = LogStore::in_memory().unwrap();
        for (name, time, payload) in records {
            store
                .append(&Topic::new(*name, "msgs.StringMsg"), *time, payload)
                .unwrap();
        }
        Arc::new(store)
    }

    fn listen(bus: &MemoryBus, topics: &[&str]) -> Received {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        for topic in topics {
            let sink = received.clone();
            let callback: Callback = Arc::new(move |msg: &RawMessage| {
                sink.lock().unwrap().push((Instant::now(), msg.clone()));
            });
            bus.subscribe(topic, callback).unwrap();
        }
        received
    }

    fn wait_for(received: &Received, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while received.lock().unwrap().len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(received.lock().unwrap().len() >= count, "timed out waiting for records");
    }

    fn payloads(received: &Received) -> Vec<Vec<u8>> {
        received
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.payload.clone())
            .collect()
    }

    #[test]
    fn test_empty_memory_log() {
        let bus = Arc::new(MemoryBus::new());
        let mut playback = Playback::open(":memory:", bus).unwrap();
        assert!(playback.start().is_none());
        assert!(!playback.add_topic("/foo/bar"));
        assert_eq!(playback.add_topic_pattern(&Regex::new(".*").unwrap()), -1);
        assert!(playback.start().is_none());
        assert!(!playback.is_started());
    }

    #[test]
    fn test_unreadable_log_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tlog");
        std::fs::write(&path, vec![0x5a; 8192]).unwrap();
        let result = Playback::open(&path, Arc::new(MemoryBus::new()));
        assert!(matches!(
            result,
            Err(crate::Error::Store(tracklog_db::Error::CannotOpen { .. }))
        ));
    }

    #[test]
    fn test_start_needs_selection() {
        let store = store_with(&[("/a", 0, b"x")]);
        let mut playback = Playback::new(store, Arc::new(MemoryBus::new()));
        assert!(playback.start().is_none());
        assert_eq!(playback.add_topic_pattern(&Regex::new("/b.*").unwrap()), 0);
        assert!(playback.start().is_none());
        assert!(playback.add_topic("/a"));
        assert!(playback.start().is_some());
    }

    #[test]
    fn test_selection_closed_after_start() {
        let store = store_with(&[("/a", 0, b"x"), ("/b", 0, b"y")]);
        let mut playback = Playback::new(store, Arc::new(MemoryBus::new()));
        assert!(playback.add_topic("/a"));
        let handle = playback.start().unwrap();

        assert!(!playback.add_topic("/b"));
        assert_eq!(playback.add_topic_pattern(&Regex::new(".*").unwrap()), -1);
        assert!(playback.start().is_none());
        assert_eq!(playback.selection().len(), 1);
        handle.stop();
    }

    #[test]
    fn test_round_trip_through_recorder() {
        let live = Arc::new(MemoryBus::new());
        live.advertise("/chatter", "msgs.StringMsg").unwrap();
        let store = Arc::new(LogStore::in_memory().unwrap());

        let mut recorder = Recorder::new(store.clone(), live.clone());
        assert!(recorder.add_topic("/chatter"));
        let recording = recorder.start().unwrap();
        live.publish(&RawMessage::new("/chatter", "msgs.StringMsg", b"P".to_vec()))
            .unwrap();
        recording.stop();

        let replay_bus = Arc::new(MemoryBus::new());
        let received = listen(&replay_bus, &["/chatter"]);
        let mut playback = Playback::new(store, replay_bus.clone());
        assert!(playback.add_topic("/chatter"));
        let handle = playback.start().unwrap();
        assert!(handle.wait_until_finished(Duration::from_secs(5)));

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let msg = &received[0].1;
        assert_eq!(msg.topic, "/chatter");
        assert_eq!(msg.type_name, "msgs.StringMsg");
        assert_eq!(msg.payload, b"P");
        assert_eq!(handle.published(), 1);
    }

    #[test]
    fn test_interleaves_by_timestamp() {
        let store = store_with(&[
            ("/a", 0, b"a0"),
            ("/a", 20 * MS, b"a20"),
            ("/b", 10 * MS, b"b10"),
            ("/b", 30 * MS, b"b30"),
        ]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/a", "/b"]);
        let mut playback = Playback::new(store, bus.clone());
        assert_eq!(playback.add_topic_pattern(&Regex::new("/[ab]").unwrap()), 2);

        let handle = playback.start().unwrap();
        assert!(handle.wait_until_finished(Duration::from_secs(5)));
        assert_eq!(
            payloads(&received),
            vec![b"a0".to_vec(), b"b10".to_vec(), b"a20".to_vec(), b"b30".to_vec()]
        );
    }

    #[test]
    fn test_timing_fidelity() {
        let store = store_with(&[("/t", 1_000 * MS, b"first"), ("/t", 1_500 * MS, b"second")]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone());
        playback.add_topic("/t");

        let handle = playback.start().unwrap();
        assert!(handle.wait_until_finished(Duration::from_secs(5)));

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        let gap = received[1].0 - received[0].0;
        assert!(gap >= Duration::from_millis(490), "gap too short: {gap:?}");
        assert!(gap <= Duration::from_millis(600), "gap too long: {gap:?}");
    }

    #[test]
    fn test_rate_scales_gaps() {
        let store = store_with(&[("/t", 0, b"first"), ("/t", 400 * MS, b"second")]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone())
            .with_config(PlaybackConfig::default().with_rate(2.0));
        playback.add_topic("/t");

        let handle = playback.start().unwrap();
        assert!(handle.wait_until_finished(Duration::from_secs(5)));

        let received = received.lock().unwrap();
        let gap = received[1].0 - received[0].0;
        assert!(gap >= Duration::from_millis(190), "gap too short: {gap:?}");
        assert!(gap < Duration::from_millis(350), "gap too long: {gap:?}");
    }

    #[test]
    fn test_time_range_config() {
        let store = store_with(&[("/t", 0, b"0"), ("/t", MS, b"1"), ("/t", 2 * MS, b"2")]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone())
            .with_config(PlaybackConfig::default().with_range(TimeRange::starting_at(MS)));
        playback.add_topic("/t");

        let handle = playback.start().unwrap();
        assert!(handle.wait_until_finished(Duration::from_secs(5)));
        assert_eq!(payloads(&received), vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn test_stop_twice() {
        let store = store_with(&[("/t", 0, b"a"), ("/t", 60_000 * MS, b"b")]);
        let mut playback = Playback::new(store, Arc::new(MemoryBus::new()));
        playback.add_topic("/t");
        let handle = playback.start().unwrap();

        handle.stop();
        assert_eq!(handle.state(), PlaybackState::Stopped);
        let stats = handle.stats();
        handle.stop();
        assert_eq!(handle.stats(), stats);
        assert!(!handle.resume());
        assert!(!handle.seek(0));
    }

    #[test]
    fn test_stop_wakes_sleeping_loop() {
        let store = store_with(&[("/t", 0, b"a"), ("/t", 60_000 * MS, b"b")]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone());
        playback.add_topic("/t");
        let handle = playback.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while received.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.pause());
        assert_eq!(handle.state(), PlaybackState::Paused);

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(payloads(&received), vec![b"a".to_vec()]);
    }

    #[test]
    fn test_seek_publishes_later_records_only() {
        let records: Vec<(&str, i64, Vec<u8>)> =
            (0..10).map(|i| ("/t", i * 50 * MS, vec![i as u8])).collect();
        let borrowed: Vec<(&str, i64, &[u8])> = records
            .iter()
            .map(|(n, t, p)| (*n, *t, p.as_slice()))
            .collect();
        let store = store_with(&borrowed);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone());
        playback.add_topic("/t");
        let handle = playback.start().unwrap();

        assert!(handle.pause());
        thread::sleep(Duration::from_millis(20));
        assert!(handle.seek(250 * MS));
        received.lock().unwrap().clear();
        assert!(handle.resume());
        assert!(handle.wait_until_finished(Duration::from_secs(5)));

        let got: Vec<u8> = payloads(&received).into_iter().map(|p| p[0]).collect();
        assert_eq!(got, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_step_while_paused() {
        let store = store_with(&[
            ("/t", 0, b"0"),
            ("/t", 10_000 * MS, b"1"),
            ("/t", 20_000 * MS, b"2"),
        ]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone());
        playback.add_topic("/t");
        let handle = playback.start().unwrap();

        assert!(!handle.step());
        assert!(handle.pause());
        assert!(handle.seek(10_000 * MS));
        thread::sleep(Duration::from_millis(20));
        received.lock().unwrap().clear();

        assert!(handle.step());
        assert_eq!(payloads(&received), vec![b"1".to_vec()]);
        assert_eq!(handle.state(), PlaybackState::Paused);

        assert!(handle.step());
        assert!(!handle.step());
        assert_eq!(payloads(&received), vec![b"1".to_vec(), b"2".to_vec()]);

        assert!(handle.resume());
        assert!(handle.wait_until_finished(Duration::from_secs(5)));
    }

    #[test]
    fn test_pause_preserves_remaining_gap() {
        let store = store_with(&[("/t", 0, b"first"), ("/t", 400 * MS, b"second")]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone());
        playback.add_topic("/t");
        let handle = playback.start().unwrap();

        wait_for(&received, 1);
        thread::sleep(Duration::from_millis(100));
        assert!(handle.pause());
        thread::sleep(Duration::from_millis(200));
        assert_eq!(received.lock().unwrap().len(), 1);
        assert!(handle.resume());
        assert!(handle.wait_until_finished(Duration::from_secs(5)));

        // 100ms played, 200ms paused, 300ms left to play
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        let gap = received[1].0 - received[0].0;
        assert!(gap >= Duration::from_millis(590), "gap too short: {gap:?}");
        assert!(gap <= Duration::from_millis(750), "gap too long: {gap:?}");
    }

    #[test]
    fn test_seek_while_playing() {
        let store = store_with(&[
            ("/t", 0, b"0"),
            ("/t", 500 * MS, b"1"),
            ("/t", 1_000 * MS, b"2"),
            ("/t", 1_300 * MS, b"3"),
        ]);
        let bus = Arc::new(MemoryBus::new());
        let received = listen(&bus, &["/t"]);
        let mut playback = Playback::new(store, bus.clone());
        playback.add_topic("/t");
        let handle = playback.start().unwrap();

        wait_for(&received, 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.state(), PlaybackState::Playing);
        let sought = Instant::now();
        assert!(handle.seek(1_000 * MS));
        let before_seek = received.lock().unwrap().len();
        assert_eq!(handle.state(), PlaybackState::Playing);
        assert!(handle.wait_until_finished(Duration::from_secs(5)));

        let received = received.lock().unwrap();
        let after: Vec<&[u8]> = received[before_seek..]
            .iter()
            .map(|(_, m)| m.payload.as_slice())
            .collect();
        assert_eq!(after, vec![b"2".as_slice(), b"3".as_slice()]);

        // The target record plays at once, later ones keep their gaps
        let first_at = received[before_seek].0;
        let second_at = received[before_seek + 1].0;
        assert!(first_at - sought < Duration::from_millis(100));
        let gap = second_at - first_at;
        assert!(gap >= Duration::from_millis(290), "gap too short: {gap:?}");
        assert!(gap <= Duration::from_millis(400), "gap too long: {gap:?}");
    }

    #[test]
    fn test_drop_releases_thread() {
        let store = store_with(&[("/t", 0, b"a"), ("/t", 60_000 * MS, b"b")]);
        let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
        let mut playback = Playback::new(store, bus.clone());
        playback.add_topic("/t");

        let before = Arc::strong_count(&bus);
        let handle = playback.start().unwrap();
        assert!(Arc::strong_count(&bus) > before);
        drop(handle);
        assert_eq!(Arc::strong_count(&bus), before);
    }

    struct FailingBus;

    impl Bus for FailingBus {
        fn advertise(&self, _topic: &str, _type_name: &str) -> tracklog_core::Result<()> {
            Ok(())
        }

        fn publish(&self, msg: &RawMessage) -> tracklog_core::Result<()> {
            Err(tracklog_core::Error::NotAdvertised(msg.topic.clone()))
        }

        fn subscribe(&self, _topic: &str, _cb: Callback) -> tracklog_core::Result<SubscriptionId> {
            Ok(SubscriptionId(0))
        }

        fn unsubscribe(&self, _id: SubscriptionId) -> bool {
            true
        }

        fn topic_list(&self) -> Vec<Topic> {
            Vec::new()
        }
    }

    #[test]
    fn test_repeated_publish_failures_stop_session() {
        let store = store_with(&[
            ("/t", 0, b"0"),
            ("/t", 0, b"1"),
            ("/t", 0, b"2"),
            ("/t", 0, b"3"),
            ("/t", 0, b"4"),
        ]);
        let config = PlaybackConfig {
            max_publish_failures: 3,
            ..PlaybackConfig::default()
        };
        let mut playback = Playback::new(store, Arc::new(FailingBus)).with_config(config);
        playback.add_topic("/t");
        let handle = playback.start().unwrap();

        assert!(handle.wait_until_finished(Duration::from_secs(5)));
        let stats = handle.stats();
        assert!(stats.failed);
        assert_eq!(stats.publish_failures, 3);
        assert_eq!(stats.published, 0);
        assert_eq!(stats.remaining, 2);
    }

    #[test]
    fn test_invalid_config_refuses_start() {
        let store = store_with(&[("/t", 0, b"a")]);
        let mut playback = Playback::new(store, Arc::new(MemoryBus::new()))
            .with_config(PlaybackConfig::default().with_rate(0.0));
        playback.add_topic("/t");
        assert!(playback.start().is_none());
        assert!(!playback.is_started());
    }
}
