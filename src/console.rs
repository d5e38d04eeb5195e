//! Where the shim's diagnostic lines go.

use crate::message::Payload;
use crate::tau_info;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A single diagnostic line emitted by the shim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogLine {
    /// One entry of the startup print sequence.
    Sequence(u32),
    DecoderReady,
    Opened,
    /// Inbound frame, verbatim.
    Payload(Payload),
    /// Counter value observed before it was incremented.
    Count(u64),
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLine::Sequence(n) => write!(f, "{n}"),
            LogLine::DecoderReady | LogLine::Opened => f.write_str("hello"),
            LogLine::Payload(p) => write!(f, "{p}"),
            LogLine::Count(c) => write!(f, "{c}"),
        }
    }
}

pub trait Console: Send + Sync {
    fn log(&self, line: LogLine);
}

/// Writes every line through the `log` facade at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogConsole;

impl Console for LogConsole {
    fn log(&self, line: LogLine) {
        tau_info!("{}", line);
    }
}

/// Keeps every line in memory, in emission order.
#[derive(Clone, Debug, Default)]
pub struct MemoryConsole {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Console for MemoryConsole {
    fn log(&self, line: LogLine) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn fixed_lines_render_as_greeting() {
        assert_eq!(LogLine::Opened.to_string(), "hello");
        assert_eq!(LogLine::DecoderReady.to_string(), "hello");
    }

    #[test]
    fn payload_lines_render_verbatim() {
        assert_eq!(LogLine::Payload(Payload::from("abc")).to_string(), "abc");
        let bin = LogLine::Payload(Payload::Binary(Bytes::from_static(b"Og"))).to_string();
        assert!(bin.starts_with("ArrayBuffer(2 bytes)"));
    }

    #[test]
    fn memory_console_keeps_order() {
        let console = MemoryConsole::new();
        console.log(LogLine::Count(0));
        console.log(LogLine::Count(1));
        assert_eq!(console.lines(), vec![LogLine::Count(0), LogLine::Count(1)]);
    }
}
