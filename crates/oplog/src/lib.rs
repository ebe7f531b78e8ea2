//! oplog - versioned operation log for sample-based dataset cleaning
//!
//! A dataset session records every operation applied to a sample in a
//! [`VersionLog`]. The [`SampleView`] derives the rows at any version by
//! replaying the log through an [`ExecutionEngine`]; committed entries are
//! sealed and can no longer be rolled back.
//!
//! Set SHEETLOG_LOG to control logging (see the `diagnostics` crate).

pub mod engine;
pub mod error;
pub mod frame;
pub mod library;
pub mod local;
pub mod log;
pub mod op;
pub mod profile;
pub mod view;

pub use engine::{EngineError, ExecutionEngine};
pub use error::{OpLogError, Result};
pub use frame::{Frame, Row, Value};
pub use library::{DataType, FunctionDescriptor, FunctionId, FunctionRegistry, ObjectLibrary, ParameterSpec};
pub use local::LocalEngine;
pub use log::{ProvenanceEntry, VersionId, VersionLog};
pub use op::{Argument, InsertColumnOp, Op, Producer, UpdateOp};
pub use profile::{Profile, profile};
pub use view::{SampleState, SampleView, Window, replay};
