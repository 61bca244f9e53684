//! Serial print queue.
//!
//! Operator-facing messages are queued non-blocking and emitted at most
//! one per tick with a minimum 50 ms gap, so a burst of messages can
//! never stall the control path or flood the console.

use log::info;

const CAPACITY: usize = 10;

/// Minimum gap between emissions (≤ 20 messages/s).
const MIN_GAP_MS: u32 = 50;

pub type PrintMessage = heapless::String<120>;

pub struct PrintQueue {
    queue: heapless::Deque<PrintMessage, CAPACITY>,
    last_emit_ms: Option<u32>,
}

impl Default for PrintQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PrintQueue {
    pub fn new() -> Self {
        Self {
            queue: heapless::Deque::new(),
            last_emit_ms: None,
        }
    }

    /// Queue a message, dropping the oldest if full. Never blocks.
    pub fn enqueue(&mut self, msg: &str) {
        if self.queue.is_full() {
            let _ = self.queue.pop_front();
        }
        let mut m = PrintMessage::new();
        for ch in msg.chars() {
            if m.push(ch).is_err() {
                break;
            }
        }
        let _ = self.queue.push_back(m);
    }

    /// Emit at most one message if the gap has elapsed.
    pub fn tick(&mut self, now_ms: u32) {
        if self.queue.is_empty() {
            return;
        }
        if let Some(last) = self.last_emit_ms {
            if now_ms.wrapping_sub(last) < MIN_GAP_MS {
                return;
            }
        }
        if let Some(msg) = self.queue.pop_front() {
            info!("{msg}");
            self.last_emit_ms = Some(now_ms);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
