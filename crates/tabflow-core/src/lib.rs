//! # tabflow-core - Batch Model, Plan IR and Operator Contracts
//!
//! Foundational types for tabflow streaming ETL pipelines: the arena-backed
//! columnar batch, the byte buffers behind the output channels, the operator
//! traits, the static op registry, and the validated plan IR that both
//! frontends (pipe DSL and plan JSON) compile into.
//!
//! ## Key Components
//!
//! - **Arena / ByteBuf**: bump-allocated string storage and channel FIFOs
//! - **Batch**: typed columns with per-cell null tracking
//! - **Operator traits**: `Decode`, `Transform`, `Encode`
//! - **Registry**: op metadata (kind, caps, required args, schema inference)
//! - **Plan**: validated, schema-inferred sequence of nodes
//!
//! ## Example
//!
//! ```rust
//! use tabflow_core::{Plan, Caps};
//! use serde_json::json;
//!
//! let mut plan = Plan::new();
//! plan.add_node("codec.csv.decode", json!({}));
//! plan.add_node("filter", json!({"expr": "col('age') > 25"}));
//! plan.add_node("codec.csv.encode", json!({}));
//! plan.validate().unwrap();
//! assert!(plan.plan_caps.contains(Caps::STREAMING));
//! ```

pub mod arena;
pub mod batch;
pub mod bytebuf;
pub mod caps;
pub mod channel;
pub mod error;
pub mod op;
pub mod plan;
pub mod registry;
pub mod schema;
pub mod value;

pub use arena::{Arena, StrRef};
pub use batch::Batch;
pub use bytebuf::ByteBuf;
pub use caps::Caps;
pub use channel::{Channel, SideChannels};
pub use error::FlowError;
pub use op::{Decode, Encode, Transform};
pub use plan::{Plan, PlanNode};
pub use registry::{lookup, OpEntry, OpKind};
pub use schema::Schema;
pub use value::{CellType, Value};
