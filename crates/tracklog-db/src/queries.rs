//! Time-ordered queries over the log.
//!
//! A query collects the keys of every matching row inside one read
//! transaction and hands back a [`RecordCursor`] over that snapshot. Records
//! appended after the query returns are never observed by the cursor; query
//! again to see them.

use crate::error::{Error, Result};
use crate::models::*;
use crate::store::LogStore;
use native_db::transaction::RTransaction;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracklog_core::{MessageRecord, TimeRange, Topic};

/// Which records a query returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Topic names to include. Names missing from the catalog are ignored.
    pub topics: BTreeSet<String>,
    /// Timestamp window, inclusive on both ends.
    pub range: TimeRange,
}

impl QueryOptions {
    /// Create empty options (no topics, unbounded range).
    pub fn new() -> Self {
        Self::default()
    }

    /// Include one topic.
    pub fn topic(mut self, name: impl Into<String>) -> Self {
        self.topics.insert(name.into());
        self
    }

    /// Include several topics.
    pub fn topics<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(names.into_iter().map(Into::into));
        self
    }

    /// Restrict to a time window.
    pub fn range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }
}

/// Position of one record in a query snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordKey {
    time_nanos: i64,
    seq: u64,
    /// Index into the cursor's topic table.
    topic: usize,
}

/// Cursor over a query snapshot, ordered by timestamp then insertion order.
///
/// The snapshot holds record keys only. Each payload is read by sequence
/// number when the cursor reaches it; records are never rewritten, so a
/// fetch always returns what the query saw.
///
/// Besides plain iteration the cursor can be repositioned, which is what
/// playback uses for seeking.
#[derive(Debug, Clone)]
pub struct RecordCursor {
    store: Arc<LogStore>,
    topics: Vec<Topic>,
    keys: Vec<RecordKey>,
    position: usize,
}

impl RecordCursor {
    fn new(store: Arc<LogStore>, topics: Vec<Topic>, mut keys: Vec<RecordKey>) -> Self {
        keys.sort_by_key(|k| (k.time_nanos, k.seq));
        Self {
            store,
            topics,
            keys,
            position: 0,
        }
    }

    /// Total records in the snapshot.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the snapshot holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Records not yet consumed.
    pub fn remaining(&self) -> usize {
        self.keys.len() - self.position
    }

    /// Index of the next record.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Timestamp of the next record, without consuming it.
    pub fn peek_time(&self) -> Option<i64> {
        self.keys.get(self.position).map(|k| k.time_nanos)
    }

    /// Timestamp of the first record in the snapshot.
    pub fn first_time(&self) -> Option<i64> {
        self.keys.first().map(|k| k.time_nanos)
    }

    /// Timestamp of the last record in the snapshot.
    pub fn last_time(&self) -> Option<i64> {
        self.keys.last().map(|k| k.time_nanos)
    }

    /// Move to the first record at or after `time_nanos`.
    ///
    /// Returns the new position; equal to `len()` when every record is older.
    pub fn seek(&mut self, time_nanos: i64) -> usize {
        self.position = self.keys.partition_point(|k| k.time_nanos < time_nanos);
        self.position
    }

    /// Go back to the first record.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    fn fetch(&self, key: RecordKey) -> Result<MessageRecord> {
        let r = self.store.db.r_transaction()?;
        let stored: Option<StoredMessage> = r.get().primary(key.seq)?;
        let stored =
            stored.ok_or_else(|| Error::Database(format!("record {} disappeared", key.seq)))?;
        Ok(stored.into_record(self.topics[key.topic].clone()))
    }
}

impl Iterator for RecordCursor {
    type Item = Result<MessageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = *self.keys.get(self.position)?;
        self.position += 1;
        Some(self.fetch(key))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RecordCursor {}

impl LogStore {
    /// Read the records of the given topics in timestamp order.
    ///
    /// Each call takes a fresh snapshot of record keys; payloads are read as
    /// the cursor advances. An empty cursor is returned when no topic matches
    /// or no record falls in the range.
    pub fn query(self: &Arc<Self>, options: &QueryOptions) -> Result<RecordCursor> {
        let mut topics = Vec::new();
        let mut keys = Vec::new();
        if options.topics.is_empty() || options.range.is_empty() {
            return Ok(RecordCursor::new(self.clone(), topics, keys));
        }

        let r = self.db.r_transaction()?;
        for name in &options.topics {
            let stored: Option<StoredTopic> = r.get().primary(name.clone())?;
            let Some(topic) = stored.map(|s| s.to_topic()) else {
                continue;
            };
            let index = topics.len();
            topics.push(topic);
            self.scan_topic(&r, name, |stored| {
                if options.range.contains(stored.time_nanos) {
                    keys.push(RecordKey {
                        time_nanos: stored.time_nanos,
                        seq: stored.seq,
                        topic: index,
                    });
                }
            })?;
        }
        Ok(RecordCursor::new(self.clone(), topics, keys))
    }

    /// Visit every stored row of exactly one topic.
    fn scan_topic<F>(&self, r: &RTransaction<'_>, name: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(StoredMessage),
    {
        let scan = r
            .scan()
            .secondary::<StoredMessage>(StoredMessageKey::topic)?;
        // start_with is a prefix match: "/a" also yields "/ab"
        for stored in scan.start_with(name)? {
            let stored = stored.map_err(|e| Error::Database(e.to_string()))?;
            if stored.topic == name {
                visit(stored);
            }
        }
        Ok(())
    }

    /// Number of records in the store.
    pub fn message_count(&self) -> Result<usize> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredMessage>()?;
        let iter = scan.all()?;
        Ok(iter.count())
    }

    /// Number of records on one topic.
    pub fn count_for_topic(&self, name: &str) -> Result<usize> {
        let r = self.db.r_transaction()?;
        let mut count = 0;
        self.scan_topic(&r, name, |_| count += 1)?;
        Ok(count)
    }

    /// First and last timestamp recorded on the given topics.
    pub fn time_bounds(&self, topics: &BTreeSet<String>) -> Result<Option<(i64, i64)>> {
        let r = self.db.r_transaction()?;
        let mut bounds: Option<(i64, i64)> = None;
        for name in topics {
            self.scan_topic(&r, name, |stored| {
                let t = stored.time_nanos;
                bounds = Some(bounds.map_or((t, t), |(lo, hi)| (lo.min(t), hi.max(t))));
            })?;
        }
        Ok(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> Arc<LogStore> {
        let store = Arc::new(LogStore::in_memory().unwrap());
        let a = Topic::new("/a", "msgs.Int32");
        let b = Topic::new("/b", "msgs.StringMsg");
        // Out of order across topics, tie at t=20
        store.append(&a, 30, b"a30").unwrap();
        store.append(&b, 10, b"b10").unwrap();
        store.append(&a, 20, b"a20").unwrap();
        store.append(&b, 20, b"b20").unwrap();
        store.append(&b, 40, b"b40").unwrap();
        store
    }

    fn payloads(cursor: RecordCursor) -> Vec<String> {
        cursor
            .map(|r| String::from_utf8(r.unwrap().payload).unwrap())
            .collect()
    }

    #[test]
    fn test_time_order_across_topics() {
        let store = sample_store();
        let cursor = store
            .query(&QueryOptions::new().topics(["/a", "/b"]))
            .unwrap();
        assert_eq!(cursor.len(), 5);
        assert_eq!(payloads(cursor), vec!["b10", "a20", "b20", "a30", "b40"]);
    }

    #[test]
    fn test_records_carry_topic_type() {
        let store = sample_store();
        let mut cursor = store.query(&QueryOptions::new().topic("/b")).unwrap();
        let first = cursor.next().unwrap().unwrap();
        assert_eq!(first.topic, Topic::new("/b", "msgs.StringMsg"));
        assert_eq!(first.time_nanos, 10);
    }

    #[test]
    fn test_range_filter() {
        let store = sample_store();
        let options = QueryOptions::new()
            .topics(["/a", "/b"])
            .range(TimeRange::between(20, 30));
        assert_eq!(
            payloads(store.query(&options).unwrap()),
            vec!["a20", "b20", "a30"]
        );

        let empty = options.range(TimeRange::between(31, 30));
        assert!(store.query(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_topics_yield_nothing() {
        let store = sample_store();
        assert!(store.query(&QueryOptions::new()).unwrap().is_empty());
        assert!(store
            .query(&QueryOptions::new().topic("/missing"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_prefix_topics_are_not_mixed() {
        let store = Arc::new(LogStore::in_memory().unwrap());
        store
            .append(&Topic::new("/foo", "msgs.Int32"), 1, b"foo")
            .unwrap();
        store
            .append(&Topic::new("/foobar", "msgs.Int32"), 2, b"foobar")
            .unwrap();

        let cursor = store.query(&QueryOptions::new().topic("/foo")).unwrap();
        assert_eq!(payloads(cursor), vec!["foo"]);
        assert_eq!(store.count_for_topic("/foo").unwrap(), 1);
        assert_eq!(store.count_for_topic("/foobar").unwrap(), 1);
    }

    #[test]
    fn test_queries_are_restartable() {
        let store = sample_store();
        let options = QueryOptions::new().topic("/a");
        let first = payloads(store.query(&options).unwrap());
        let second = payloads(store.query(&options).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_cursor_snapshot_isolation() {
        let store = sample_store();
        let cursor = store.query(&QueryOptions::new().topic("/a")).unwrap();

        store
            .append(&Topic::new("/a", "msgs.Int32"), 25, b"late")
            .unwrap();

        assert_eq!(payloads(cursor), vec!["a20", "a30"]);
        let fresh = store.query(&QueryOptions::new().topic("/a")).unwrap();
        assert_eq!(payloads(fresh), vec!["a20", "late", "a30"]);
    }

    #[test]
    fn test_cursor_seek() {
        let store = sample_store();
        let mut cursor = store
            .query(&QueryOptions::new().topics(["/a", "/b"]))
            .unwrap();

        assert_eq!(cursor.seek(20), 1);
        assert_eq!(cursor.peek_time(), Some(20));
        assert_eq!(cursor.remaining(), 4);
        assert_eq!(cursor.next().unwrap().unwrap().payload, b"a20");

        assert_eq!(cursor.seek(35), 4);
        assert_eq!(cursor.seek(100), 5);
        assert_eq!(cursor.peek_time(), None);
        assert!(cursor.next().is_none());

        cursor.rewind();
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_counts_and_bounds() {
        let store = sample_store();
        assert_eq!(store.message_count().unwrap(), 5);

        let all: BTreeSet<String> = ["/a", "/b"].into_iter().map(String::from).collect();
        assert_eq!(store.time_bounds(&all).unwrap(), Some((10, 40)));

        let a: BTreeSet<String> = BTreeSet::from(["/a".to_string()]);
        assert_eq!(store.time_bounds(&a).unwrap(), Some((20, 30)));

        let none: BTreeSet<String> = BTreeSet::new();
        assert_eq!(store.time_bounds(&none).unwrap(), None);
    }

    #[test]
    fn test_cursor_reads_payloads_on_advance() {
        let store = sample_store();
        let mut cursor = store
            .query(&QueryOptions::new().topics(["/a", "/b"]))
            .unwrap();
        assert_eq!(cursor.len(), 5);
        assert_eq!(cursor.first_time(), Some(10));
        assert_eq!(cursor.last_time(), Some(40));

        // Clones share the key snapshot but advance independently
        let mut other = cursor.clone();
        assert_eq!(cursor.next().unwrap().unwrap().seq, 1);
        assert_eq!(cursor.remaining(), 4);
        assert_eq!(other.remaining(), 5);
        assert_eq!(other.nth(4).unwrap().unwrap().payload, b"b40");
        assert_eq!(other.size_hint(), (0, Some(0)));
    }
}
