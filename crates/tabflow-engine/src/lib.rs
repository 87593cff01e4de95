//! # tabflow-engine - Pipeline Executor and Frontends
//!
//! Ties the workspace together: compiles a plan (from the pipe DSL, a recipe
//! name, or plan JSON) into a live [`Pipeline`] and drives bytes through
//! decoder → transforms → encoder on a single cooperative thread.
//!
//! ## Example
//!
//! ```rust
//! use tabflow_engine::{dsl, Pipeline};
//! use tabflow_core::Channel;
//!
//! let plan = dsl::parse("csv | head 1 | csv").unwrap();
//! let mut pipeline = Pipeline::compile(&plan).unwrap();
//! pipeline.push(b"name,age\nAlice,30\nBob,25\n").unwrap();
//! pipeline.finish().unwrap();
//! let out = String::from_utf8(pipeline.drain(Channel::Main)).unwrap();
//! assert_eq!(out, "name,age\nAlice,30\n");
//! ```

pub mod dsl;
pub mod pipeline;
pub mod recipes;

pub use pipeline::Pipeline;

use tabflow_core::{FlowError, Plan};

/// Resolve any frontend input: a recipe name, or a pipe-DSL string.
pub fn plan_from_input(input: &str) -> Result<Plan, FlowError> {
    if let Some(expansion) = recipes::lookup(input.trim()) {
        return dsl::parse(expansion);
    }
    dsl::parse(input)
}
