//! Telemetry / command link framing.
//!
//! The wireless serial transport (BLE NUS-style) is an adapter behind
//! [`LinkPort`](crate::app::ports::LinkPort); this module owns the
//! queues and the ASCII grammar on top of it:
//!
//! - **Outbound**: newline-terminated telemetry frames, queued capacity
//!   10 drop-oldest, at most one transmitted per tick. A send failure
//!   silently drops the frame — telemetry is lossy by design.
//! - **Inbound**: raw bytes accumulate in a 128-byte buffer; each
//!   completed line is UTF-8-decoded (invalid lines dropped) and pushed
//!   to a 16-slot command FIFO. Overflowing the accumulator retains the
//!   most recent 128 bytes.
//!
//! Command grammar: one command per line, `CV<id>=<value>`, whitespace
//! around tokens ignored. Anything else is a parse error.

use crate::app::ports::LinkPort;
use core::fmt::Write as _;

const FRAME_QUEUE_CAP: usize = 10;
const COMMAND_QUEUE_CAP: usize = 16;
const RX_BUFFER_CAP: usize = 128;

pub type Frame = heapless::String<120>;
pub type CommandLine = heapless::String<128>;

/// A parsed `CV<id>=<value>` command. The value stays textual; the CV
/// store parses it against the declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvCommand {
    pub id: u8,
    pub raw_value: heapless::String<32>,
}

/// Why an inbound line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandParseError {
    /// Line does not start with `CV`.
    NotACommand,
    /// Id is missing, non-numeric, or out of u8 range.
    BadId,
    /// Missing `=` separator or empty value.
    BadValue,
}

/// Parse one inbound line against the command grammar.
pub fn parse_cv_command(line: &str) -> Result<CvCommand, CommandParseError> {
    let line = line.trim();
    let rest = line
        .strip_prefix("CV")
        .ok_or(CommandParseError::NotACommand)?;
    let (id_part, value_part) = rest.split_once('=').ok_or(CommandParseError::BadValue)?;

    let id: u8 = id_part
        .trim()
        .parse()
        .map_err(|_| CommandParseError::BadId)?;

    let value = value_part.trim();
    if value.is_empty() {
        return Err(CommandParseError::BadValue);
    }
    let mut raw_value = heapless::String::new();
    raw_value
        .push_str(value)
        .map_err(|()| CommandParseError::BadValue)?;

    Ok(CvCommand { id, raw_value })
}

// ---------------------------------------------------------------------------
// Telemetry frame
// ---------------------------------------------------------------------------

/// Everything one outbound frame reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryReport {
    pub velocity_cms: f32,
    pub pressure_psi: f32,
    pub boiler_c: f32,
    pub superheater_c: f32,
    pub logic_c: f32,
    pub servo_pct: f32,
    pub dcc_step: u8,
    pub loop_count: u32,
    pub measured_cms: f32,
}

/// Build the space-separated key-value frame. Field order is part of
/// the contract; consumers tolerate fields appended at the end.
pub fn build_frame(r: &TelemetryReport) -> Frame {
    let mut f = Frame::new();
    let _ = write!(
        f,
        "V {:.1} P {:.1} T {:.1} {:.1} {:.1} S {} D {} L {} E {:.1}\n",
        r.velocity_cms,
        r.pressure_psi,
        r.boiler_c,
        r.superheater_c,
        r.logic_c,
        r.servo_pct as i32,
        r.dcc_step,
        r.loop_count,
        r.measured_cms,
    );
    f
}

// ---------------------------------------------------------------------------
// Link state
// ---------------------------------------------------------------------------

pub struct TelemetryLink {
    out_queue: heapless::Deque<Frame, FRAME_QUEUE_CAP>,
    rx_buffer: heapless::Vec<u8, RX_BUFFER_CAP>,
    commands: heapless::Deque<CommandLine, COMMAND_QUEUE_CAP>,
}

impl Default for TelemetryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryLink {
    pub fn new() -> Self {
        Self {
            out_queue: heapless::Deque::new(),
            rx_buffer: heapless::Vec::new(),
            commands: heapless::Deque::new(),
        }
    }

    /// Queue an outbound frame, dropping the oldest on overflow. O(1).
    pub fn enqueue_frame(&mut self, frame: Frame) {
        if self.out_queue.is_full() {
            let _ = self.out_queue.pop_front();
        }
        let _ = self.out_queue.push_back(frame);
    }

    /// Transmit at most one queued frame. Send failures drop the frame.
    pub fn process(&mut self, port: &mut dyn LinkPort) {
        if let Some(frame) = self.out_queue.pop_front() {
            let _ = port.try_send(&frame);
        }
    }

    /// Drain the transport's RX side into the accumulator and split out
    /// completed lines. Called once per tick.
    pub fn pump_rx(&mut self, port: &mut dyn LinkPort) {
        let mut buf = [0u8; 64];
        loop {
            let n = port.poll_rx(&mut buf);
            if n == 0 {
                break;
            }
            self.push_rx_bytes(&buf[..n]);
        }
    }

    /// Accumulate raw bytes, extracting commands at each newline.
    /// Callable directly from adapter callbacks.
    pub fn push_rx_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                self.complete_line();
                continue;
            }
            if self.rx_buffer.is_full() {
                // Keep the most recent bytes: drop the oldest.
                self.rx_buffer.remove(0);
            }
            let _ = self.rx_buffer.push(b);
        }
    }

    fn complete_line(&mut self) {
        let line = core::str::from_utf8(&self.rx_buffer).ok().map(|s| {
            let mut l = CommandLine::new();
            let _ = l.push_str(s);
            l
        });
        self.rx_buffer.clear();

        let Some(line) = line else {
            return; // invalid UTF-8 dropped
        };
        if line.trim().is_empty() {
            return;
        }
        if self.commands.is_full() {
            let _ = self.commands.pop_front();
        }
        let _ = self.commands.push_back(line);
    }

    /// Pop the oldest pending command line, if any.
    pub fn next_command(&mut self) -> Option<CommandLine> {
        self.commands.pop_front()
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.out_queue.len()
    }

    pub fn rx_buffered(&self) -> usize {
        self.rx_buffer.len()
    }
}
