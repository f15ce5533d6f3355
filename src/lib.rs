//! Commander Library
//!
//! Loads a JSON array of operation objects and runs them in order: constant
//! definitions, file copies, text and regex edits, shell commands, nested
//! scripts and zip extraction.

pub mod actions;
pub mod cli;
pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod interpreter;
pub mod process_guard;
pub mod script;

// Re-export main types for convenience
pub use config::{NestedConstants, RunConfig};
pub use console::{Acknowledge, Console, RecordingConsole, TerminalConsole};
pub use constants::{ConstantStore, SubstitutionMode};
pub use error::{CommanderError, DefinitionError, Result};
pub use interpreter::{ExecutionContext, ExecutionState, Interpreter, RunOutcome, StepFailure};
pub use process_guard::{ChildRegistry, ProcessGuard, TrackedChild};
pub use script::{Operation, OperationKind, Script, Step};
