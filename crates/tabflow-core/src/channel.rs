//! Output channels drained by the host.

use crate::bytebuf::ByteBuf;

/// The four byte queues a pipeline writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Encoded output.
    Main = 0,
    /// One descriptor line per malformed input row.
    Errors = 1,
    /// One JSON line per operator per batch.
    Stats = 2,
    /// Operator-chosen preview rows.
    Samples = 3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Main,
        Channel::Errors,
        Channel::Stats,
        Channel::Samples,
    ];

    pub fn from_index(i: usize) -> Option<Channel> {
        match i {
            0 => Some(Channel::Main),
            1 => Some(Channel::Errors),
            2 => Some(Channel::Stats),
            3 => Some(Channel::Samples),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Main => "main",
            Channel::Errors => "errors",
            Channel::Stats => "stats",
            Channel::Samples => "samples",
        }
    }
}

/// The non-MAIN channel buffers, handed to every operator call so any op can
/// emit diagnostics while processing or flushing.
#[derive(Debug, Default)]
pub struct SideChannels {
    pub errors: ByteBuf,
    pub stats: ByteBuf,
    pub samples: ByteBuf,
}

impl SideChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one JSON line to ERRORS.
    pub fn error_line(&mut self, line: &serde_json::Value) {
        self.errors.write_str(&line.to_string());
        self.errors.write(b"\n");
    }

    /// Append one JSON line to STATS.
    pub fn stats_line(&mut self, line: &serde_json::Value) {
        self.stats.write_str(&line.to_string());
        self.stats.write(b"\n");
    }

    /// Append one JSON line to SAMPLES.
    pub fn sample_line(&mut self, line: &serde_json::Value) {
        self.samples.write_str(&line.to_string());
        self.samples.write(b"\n");
    }
}
