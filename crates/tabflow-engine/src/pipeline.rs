//! Pipeline executor: drives push → decode → transform chain → encode → MAIN,
//! multiplexing the side channels, on one cooperative thread.

use anyhow::{bail, Result};
use serde_json::json;
use tabflow_core::{Batch, ByteBuf, Channel, FlowError, Plan, SideChannels};
use tracing::{debug, info};

/// Rows previewed on the SAMPLES channel from the first decoded batch.
const SAMPLE_ROWS: usize = 5;

/// A compiled, runnable pipeline.
///
/// The host pushes raw bytes, pulls encoded bytes per channel, and calls
/// [`Pipeline::finish`] exactly once at end-of-input. Errors are sticky:
/// after a failed push the pipeline refuses further input, but output
/// accumulated so far stays pullable.
pub struct Pipeline {
    decoder: Box<dyn tabflow_core::Decode>,
    decoder_op: String,
    ops: Vec<(String, Box<dyn tabflow_core::Transform>)>,
    encoder: Box<dyn tabflow_core::Encode>,
    encoder_op: String,
    main: ByteBuf,
    side: SideChannels,
    rows_in: u64,
    rows_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    error: Option<String>,
    finished: bool,
    sampled: bool,
}

impl Pipeline {
    /// Compile a plan into live operator instances.
    ///
    /// Validates and schema-infers the plan first if the frontend has not;
    /// any operator constructor failure fails the whole compile.
    pub fn compile(plan: &Plan) -> Result<Pipeline, FlowError> {
        let mut plan = plan.clone();
        if !plan.validated {
            plan.validate()?;
        }
        if !plan.schema_inferred {
            plan.infer_schema();
        }

        let last = plan.nodes.len() - 1;
        let decoder = tabflow_io::create_decoder(&plan.nodes[0])?;
        let encoder = tabflow_io::create_encoder(&plan.nodes[last])?;
        let mut ops = Vec::new();
        for node in &plan.nodes[1..last] {
            ops.push((node.op.clone(), tabflow_tx::create_transform(node)?));
        }
        info!(
            decoder = %plan.nodes[0].op,
            transforms = ops.len(),
            encoder = %plan.nodes[last].op,
            caps = ?plan.plan_caps,
            "pipeline compiled"
        );
        Ok(Pipeline {
            decoder,
            decoder_op: plan.nodes[0].op.clone(),
            ops,
            encoder,
            encoder_op: plan.nodes[last].op.clone(),
            main: ByteBuf::new(),
            side: SideChannels::new(),
            rows_in: 0,
            rows_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            error: None,
            finished: false,
            sampled: false,
        })
    }

    /// Feed an input chunk through the whole chain.
    pub fn push(&mut self, input: &[u8]) -> Result<()> {
        if self.finished {
            bail!("push after finish");
        }
        if let Some(e) = &self.error {
            bail!("pipeline already failed: {e}");
        }
        self.bytes_in += input.len() as u64;
        match self.push_inner(input) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn push_inner(&mut self, input: &[u8]) -> Result<()> {
        let batches = self.decoder.push(input, &mut self.side)?;
        for batch in batches {
            self.admit(batch)?;
        }
        Ok(())
    }

    /// Account for one decoded batch and run it down the chain.
    fn admit(&mut self, batch: Batch) -> Result<()> {
        self.rows_in += batch.n_rows() as u64;
        self.side.stats_line(&json!({
            "op": self.decoder_op,
            "rows_out": batch.n_rows(),
        }));
        if !self.sampled {
            self.sampled = true;
            for r in 0..batch.n_rows().min(SAMPLE_ROWS) {
                let mut obj = serde_json::Map::new();
                for c in 0..batch.n_cols() {
                    let v = if batch.is_null(r, c) {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::String(batch.render_cell(r, c))
                    };
                    obj.insert(batch.col_name(c).to_string(), v);
                }
                self.side.sample_line(&serde_json::Value::Object(obj));
            }
        }
        self.run_chain(0, batch)
    }

    /// Run a batch through the transforms starting at `start`, then encode.
    fn run_chain(&mut self, start: usize, batch: Batch) -> Result<()> {
        let mut current = Some(batch);
        for i in start..self.ops.len() {
            let Some(b) = current.take() else {
                return Ok(());
            };
            let rows_in = b.n_rows();
            current = self.ops[i].1.process(b, &mut self.side)?;
            self.side.stats_line(&json!({
                "op": self.ops[i].0,
                "rows_in": rows_in,
                "rows_out": current.as_ref().map(|b| b.n_rows()).unwrap_or(0),
            }));
        }
        if let Some(b) = current {
            self.side.stats_line(&json!({
                "op": self.encoder_op,
                "rows_in": b.n_rows(),
            }));
            self.rows_out += b.n_rows() as u64;
            let before = self.main.readable();
            self.encoder.encode(&b, &mut self.main, &mut self.side)?;
            self.bytes_out += (self.main.readable() - before) as u64;
        }
        Ok(())
    }

    /// End-of-input: cascade every flush in order, then flush the encoder.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if let Some(e) = &self.error {
            bail!("pipeline already failed: {e}");
        }
        match self.finish_inner() {
            Ok(()) => {
                self.finished = true;
                debug!(
                    rows_in = self.rows_in,
                    rows_out = self.rows_out,
                    bytes_in = self.bytes_in,
                    bytes_out = self.bytes_out,
                    "pipeline finished"
                );
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn finish_inner(&mut self) -> Result<()> {
        if let Some(batch) = self.decoder.flush(&mut self.side)? {
            self.admit(batch)?;
        }
        for i in 0..self.ops.len() {
            if let Some(batch) = self.ops[i].1.flush(&mut self.side)? {
                self.side.stats_line(&json!({
                    "op": self.ops[i].0,
                    "rows_in": 0,
                    "rows_out": batch.n_rows(),
                }));
                self.run_chain(i + 1, batch)?;
            }
        }
        let before = self.main.readable();
        self.encoder.flush(&mut self.main, &mut self.side)?;
        self.bytes_out += (self.main.readable() - before) as u64;
        Ok(())
    }

    fn channel_buf(&mut self, channel: Channel) -> &mut ByteBuf {
        match channel {
            Channel::Main => &mut self.main,
            Channel::Errors => &mut self.side.errors,
            Channel::Stats => &mut self.side.stats,
            Channel::Samples => &mut self.side.samples,
        }
    }

    /// Read from a channel; 0 means "nothing currently buffered", not
    /// end-of-stream.
    pub fn pull(&mut self, channel: Channel, into: &mut [u8]) -> usize {
        self.channel_buf(channel).read(into)
    }

    /// Drain everything currently buffered on a channel.
    pub fn drain(&mut self, channel: Channel) -> Vec<u8> {
        self.channel_buf(channel).take_all()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn rows_in(&self) -> u64 {
        self.rows_in
    }

    pub fn rows_out(&self) -> u64 {
        self.rows_out
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }
}
