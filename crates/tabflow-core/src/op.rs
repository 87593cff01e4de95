//! Operator contracts.
//!
//! The pipeline is decoder → transforms → encoder. All three kinds share the
//! same lifecycle: zero or more `process`-style calls, one flush cascade at
//! end-of-input, drop for teardown. A transform returning no batch is a
//! legitimate filter-out, not an error. Every call receives the side channels
//! so operators can emit ERRORS / STATS / SAMPLES lines as they work.

use crate::batch::Batch;
use crate::bytebuf::ByteBuf;
use crate::channel::SideChannels;
use anyhow::Result;

/// Byte decoder: converts pushed input bytes into zero or more batches.
pub trait Decode {
    fn name(&self) -> &'static str;

    /// Consume an input chunk; emit every batch that became complete.
    fn push(&mut self, input: &[u8], side: &mut SideChannels) -> Result<Vec<Batch>>;

    /// End-of-input: emit the final partial batch if any rows are buffered.
    fn flush(&mut self, side: &mut SideChannels) -> Result<Option<Batch>>;
}

/// Row transform: may drop, rewrite, or buffer each input batch.
pub trait Transform {
    fn name(&self) -> &'static str;

    /// Handle one input batch; `None` means nothing to emit right now.
    fn process(&mut self, input: Batch, side: &mut SideChannels) -> Result<Option<Batch>>;

    /// End-of-input: aggregates emit their buffered output here.
    ///
    /// The executor guarantees `process` is never called after `flush`.
    fn flush(&mut self, _side: &mut SideChannels) -> Result<Option<Batch>> {
        Ok(None)
    }
}

/// Byte encoder: renders batches into the MAIN channel buffer.
pub trait Encode {
    fn name(&self) -> &'static str;

    fn encode(&mut self, batch: &Batch, out: &mut ByteBuf, side: &mut SideChannels) -> Result<()>;

    /// End-of-input: full-load encoders render their buffered table here.
    fn flush(&mut self, _out: &mut ByteBuf, _side: &mut SideChannels) -> Result<()> {
        Ok(())
    }
}
