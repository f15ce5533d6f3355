//! `RUN_SHELL`: run a command line through `sh -c`.
//!
//! The child inherits stdin, stdout and stderr, so its output appears
//! directly in the interpreter's terminal. While it runs it is tracked by a
//! [`TrackedChild`] so a signal to the interpreter also stops it.

use std::process::{Command, Stdio};

use crate::error::{CommanderError, Result};
use crate::process_guard::{DieWithParent, TrackedChild};
use crate::script::{OperationKind, RunShellArgs};

/// Exit information from a shell step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellOutcome {
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the command exited with code 0.
    pub success: bool,
}

/// Run `args.command` and wait for it.
///
/// A non-zero exit is reported in the outcome and only becomes an error when
/// `strict` is set. Failing to spawn the shell (for example because the
/// working directory does not exist) is always an error.
pub fn run_shell(args: &RunShellArgs, strict: bool) -> Result<ShellOutcome> {
    let kind = OperationKind::RunShell;

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&args.command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .die_with_parent();

    if let Some(dir) = &args.working_directory {
        cmd.current_dir(dir);
    }

    tracing::info!(
        "run_shell: {:?} cwd={:?}",
        args.command,
        args.working_directory
    );

    let mut child = cmd.spawn().map_err(|e| {
        CommanderError::action(kind.as_ref(), format!("could not spawn shell: {e}"))
    })?;
    let status = {
        let _tracked = TrackedChild::track(child.id(), &args.command);
        child.wait()
    };

    let status = status.map_err(|e| {
        CommanderError::action(kind.as_ref(), format!("failed waiting for shell: {e}"))
    })?;

    let outcome = ShellOutcome {
        exit_code: status.code(),
        success: status.success(),
    };

    if !outcome.success {
        let code = outcome.exit_code.unwrap_or(-1);
        if strict {
            return Err(CommanderError::action(
                kind.as_ref(),
                format!("command exited with code {code}"),
            ));
        }
        tracing::warn!("Shell command exited with code {}, continuing", code);
    }

    Ok(outcome)
}
