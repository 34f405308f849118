//! The streaming query engine: data types, access planning, window
//! lifecycle, stream fan-in, and the execution loops.

pub mod engine;
pub mod multiplexer;
pub mod planner;
pub mod table;
pub mod types;
pub mod window;

pub use engine::QueryEngine;
pub use planner::{analyze_batch_access, BatchAccess, BatchTablePlan};
pub use types::{FieldValue, IndexKey, Record, TaggedRecord};
pub use window::{Window, WindowManager};
