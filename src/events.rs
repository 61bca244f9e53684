//! Bounded event ring.
//!
//! Any component can record a notable event; the ring keeps the most
//! recent 20 and is flushed to persistent storage as a self-describing
//! JSON array during emergency shutdown. Persistence is best-effort —
//! a failed flush never fails the control loop.

use crate::app::ports::StoragePort;
use log::warn;
use serde::Serialize;

const RING_CAPACITY: usize = 20;

const EVLOG_NAMESPACE: &str = "steamloco";
const EVLOG_KEY: &str = "evlog";

/// Event discriminants. The serialised names are part of the log-file
/// contract consumed by external tooling — never rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Boot,
    Shutdown,
    Estop,
    BleCvUpdate,
    BleCvRejected,
    LoopOverrun,
    SensorDegraded,
    SensorRecovered,
    DegradedEntered,
    DegradedRecovered,
    ServoFault,
    PersistFault,
}

/// One ring record: when, what, and a short free-text detail.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub t: u32,
    pub kind: EventKind,
    pub detail: heapless::String<64>,
}

/// Circular buffer of the most recent events, oldest dropped first.
pub struct EventRing {
    ring: heapless::Deque<EventRecord, RING_CAPACITY>,
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRing {
    pub fn new() -> Self {
        Self {
            ring: heapless::Deque::new(),
        }
    }

    /// Record an event, evicting the oldest entry when full.
    pub fn record(&mut self, t: u32, kind: EventKind, detail: &str) {
        if self.ring.is_full() {
            let _ = self.ring.pop_front();
        }
        let mut d = heapless::String::new();
        for ch in detail.chars() {
            if d.push(ch).is_err() {
                break;
            }
        }
        let _ = self.ring.push_back(EventRecord { t, kind, detail: d });
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Iterate oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.ring.iter()
    }

    /// Append the ring to the persistent event log, best-effort.
    ///
    /// Existing log content is retained: the new records are spliced
    /// into the stored JSON array. Any failure is logged and swallowed.
    pub fn flush(&self, storage: &mut dyn StoragePort) {
        if self.ring.is_empty() {
            return;
        }
        let Ok(mut fresh) = serde_json::to_vec(&self.ring.iter().collect::<Vec<_>>()) else {
            warn!("event ring flush: serialise failed");
            return;
        };

        let mut buf = [0u8; 4096];
        let merged = match storage.read(EVLOG_NAMESPACE, EVLOG_KEY, &mut buf) {
            Ok(len) if len > 2 && buf[0] == b'[' && buf[len - 1] == b']' => {
                // "[old]" + "[new]" → "[old,new]"
                let mut out = Vec::with_capacity(len + fresh.len());
                out.extend_from_slice(&buf[..len - 1]);
                out.push(b',');
                out.extend_from_slice(&fresh[1..]);
                out
            }
            _ => core::mem::take(&mut fresh),
        };

        if storage.write(EVLOG_NAMESPACE, EVLOG_KEY, &merged).is_err() {
            warn!("event ring flush: storage write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{StorageError, StoragePort};
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MemStorage {
        data: RefCell<HashMap<String, Vec<u8>>>,
        fail_writes: bool,
    }

    impl MemStorage {
        fn new() -> Self {
            Self {
                data: RefCell::new(HashMap::new()),
                fail_writes: false,
            }
        }
    }

    impl StoragePort for MemStorage {
        fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
            let k = format!("{ns}::{key}");
            match self.data.borrow().get(&k) {
                Some(v) => {
                    let len = v.len().min(buf.len());
                    buf[..len].copy_from_slice(&v[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
            if self.fail_writes {
                return Err(StorageError::IoError);
            }
            self.data
                .borrow_mut()
                .insert(format!("{ns}::{key}"), data.to_vec());
            Ok(())
        }

        fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
            self.data.borrow_mut().remove(&format!("{ns}::{key}"));
            Ok(())
        }

        fn exists(&self, ns: &str, key: &str) -> bool {
            self.data.borrow().contains_key(&format!("{ns}::{key}"))
        }
    }

    #[test]
    fn ring_caps_at_twenty_drop_oldest() {
        let mut ring = EventRing::new();
        for i in 0..25u32 {
            ring.record(i, EventKind::LoopOverrun, "x");
        }
        assert_eq!(ring.len(), 20);
        assert_eq!(ring.iter().next().unwrap().t, 5);
        assert_eq!(ring.iter().last().unwrap().t, 24);
    }

    #[test]
    fn detail_is_truncated_to_capacity() {
        let mut ring = EventRing::new();
        let long = "d".repeat(200);
        ring.record(0, EventKind::ServoFault, &long);
        assert!(ring.iter().next().unwrap().detail.len() <= 64);
    }

    #[test]
    fn flush_writes_json_array() {
        let mut ring = EventRing::new();
        ring.record(100, EventKind::Shutdown, "DRY_BOIL");
        let mut storage = MemStorage::new();
        ring.flush(&mut storage);

        let mut buf = [0u8; 4096];
        let len = storage.read(EVLOG_NAMESPACE, EVLOG_KEY, &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        let arr = parsed.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["t"], 100);
        assert_eq!(arr[0]["kind"], "SHUTDOWN");
        assert_eq!(arr[0]["detail"], "DRY_BOIL");
    }

    #[test]
    fn flush_appends_to_existing_log() {
        let mut storage = MemStorage::new();

        let mut first = EventRing::new();
        first.record(1, EventKind::Boot, "");
        first.flush(&mut storage);

        let mut second = EventRing::new();
        second.record(2, EventKind::Shutdown, "LOGIC_HOT");
        second.flush(&mut storage);

        let mut buf = [0u8; 4096];
        let len = storage.read(EVLOG_NAMESPACE, EVLOG_KEY, &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn flush_failure_is_swallowed() {
        let mut ring = EventRing::new();
        ring.record(0, EventKind::Boot, "");
        let mut storage = MemStorage::new();
        storage.fail_writes = true;
        ring.flush(&mut storage); // must not panic
    }
}
