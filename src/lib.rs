//! convparity: conformance harness for tensor-graph conversion pipelines.
//!
//! A case is traced into a frozen graph, evaluated by the reference
//! executor, handed to a converter, executed by the target runtime, and the
//! two output sets are reconciled and compared within a tolerance.
pub mod artifacts;
pub mod cases;
pub mod compare;
pub mod config;
pub mod conformance;
pub mod convert;
pub mod eval;
pub mod export;
pub mod harness;
pub mod logging;
pub mod ops;
pub mod opt;
pub mod reconcile;
pub mod runtime;
pub mod shapes;
pub mod types;

pub mod ir;

pub use cases::CaseDefinition;
pub use compare::{CompareMode, ToleranceSpec};
pub use conformance::{run_suite, ConformanceOptions, SuiteReport};
pub use harness::{CaseReport, FailureKind, Harness, HarnessError};
