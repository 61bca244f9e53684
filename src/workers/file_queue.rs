//! Prioritised persistent-write queue.
//!
//! Storage writes from the control path are deferred here and drained at
//! most one per tick with a 100 ms minimum gap (flash-wear cap). Two
//! priority classes: LOW writes are dropped when the queue is full;
//! HIGH writes evict the oldest LOW to make room, so safety-relevant
//! records survive congestion.

use crate::app::ports::StoragePort;
use log::warn;

const CAPACITY: usize = 5;

/// Minimum gap between storage writes.
const MIN_GAP_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePriority {
    High,
    Low,
}

#[derive(Debug, Clone)]
pub struct WriteJob {
    pub priority: WritePriority,
    pub namespace: &'static str,
    pub key: &'static str,
    pub payload: std::vec::Vec<u8>,
}

pub struct FileWriteQueue {
    queue: heapless::Deque<WriteJob, CAPACITY>,
    last_write_ms: Option<u32>,
}

impl Default for FileWriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWriteQueue {
    pub fn new() -> Self {
        Self {
            queue: heapless::Deque::new(),
            last_write_ms: None,
        }
    }

    /// Queue a write. Returns `false` if the job was dropped (LOW on a
    /// full queue, or HIGH on a queue full of HIGH).
    pub fn enqueue(&mut self, job: WriteJob) -> bool {
        if self.queue.is_full() {
            match job.priority {
                WritePriority::Low => {
                    warn!("file-write queue full — LOW job dropped");
                    return false;
                }
                WritePriority::High => {
                    // Evict the oldest LOW job to make room.
                    let Some(pos) = self
                        .queue
                        .iter()
                        .position(|j| j.priority == WritePriority::Low)
                    else {
                        warn!("file-write queue full of HIGH jobs — dropped");
                        return false;
                    };
                    let mut keep: heapless::Deque<WriteJob, CAPACITY> = heapless::Deque::new();
                    for (i, j) in self.queue.iter().enumerate() {
                        if i != pos {
                            let _ = keep.push_back(j.clone());
                        }
                    }
                    self.queue = keep;
                }
            }
        }
        self.queue.push_back(job).is_ok()
    }

    /// Write at most one queued job if the gap has elapsed. Storage
    /// failure drops the job and reports it; it never propagates.
    pub fn tick(&mut self, now_ms: u32, storage: &mut dyn StoragePort) -> Result<(), ()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        if let Some(last) = self.last_write_ms {
            if now_ms.wrapping_sub(last) < MIN_GAP_MS {
                return Ok(());
            }
        }
        let Some(job) = self.queue.pop_front() else {
            return Ok(());
        };
        self.last_write_ms = Some(now_ms);
        if storage.write(job.namespace, job.key, &job.payload).is_err() {
            warn!("deferred write {}::{} failed", job.namespace, job.key);
            return Err(());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
