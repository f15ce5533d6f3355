//! Side-effecting bodies of the file, text, shell and archive operations.
//!
//! Each action takes already-resolved arguments (constants substituted) and
//! reports failures as [`CommanderError::Action`](crate::error::CommanderError::Action)
//! tagged with its operation name.

pub mod archive;
pub mod fs_ops;
pub mod shell;
pub mod text;

pub use archive::extract_zip;
pub use fs_ops::{copy, CopyOutcome};
pub use shell::{run_shell, ShellOutcome};
pub use text::{regex_edit, replace_text};
