//! Interpreter loop
//!
//! Runs the steps of a [`Script`] strictly in order against a
//! [`ConstantStore`]. Each step is resolved (constants substituted into its
//! string fields), dispatched to its action, and, if it asked for it, followed
//! by a pause until the [`Acknowledge`] source lets the run continue.
//!
//! # State Flow
//!
//! ```text
//! Ready
//!   ↓
//! Running ⇄ Paused      (after a `wait: true` step, or every step in stepper mode)
//!   ↓
//! Completed | Failed    (terminal)
//! ```
//!
//! The first failing step moves the context to `Failed` and no later step
//! runs. Nothing already applied is rolled back. A nested script
//! (`RUN_COMMANDER_SCRIPT`) runs in its own [`ExecutionContext`]; its failure
//! becomes the failure of the parent step.

use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::actions::{self, CopyOutcome};
use crate::config::{NestedConstants, RunConfig};
use crate::console::{Acknowledge, Console, StdinAcknowledger, TerminalConsole};
use crate::constants::ConstantStore;
use crate::error::{CommanderError, Result};
use crate::script::{DefineConstantArgs, Operation, OperationKind, RunScriptArgs, Script, Step};

/// Lifecycle of one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Ready,
    Running,
    /// Waiting for acknowledgment after a step
    Paused,
    /// Every step ran or was skipped (terminal state)
    Completed,
    /// A step failed; later steps were not run (terminal state)
    Failed,
}

impl ExecutionState {
    /// Returns true if this is a terminal state (Completed or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Attempted an illegal state transition
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Cannot transition from {from} to {to}")]
pub struct StateTransitionError {
    pub from: ExecutionState,
    pub to: ExecutionState,
}

impl From<StateTransitionError> for CommanderError {
    fn from(err: StateTransitionError) -> Self {
        CommanderError::state(err.to_string())
    }
}

/// One interpreter-loop invocation bound to one script.
///
/// Borrows the steps read-only and the constant store mutably; the store is
/// either the caller's own or one shared with a parent context.
#[derive(Debug)]
pub struct ExecutionContext<'s> {
    steps: &'s [Step],
    constants: &'s mut ConstantStore,
    cursor: usize,
    state: ExecutionState,
    depth: usize,
    executed: usize,
    skipped: usize,
}

impl<'s> ExecutionContext<'s> {
    pub fn new(steps: &'s [Step], constants: &'s mut ConstantStore, depth: usize) -> Self {
        Self {
            steps,
            constants,
            cursor: 0,
            state: ExecutionState::Ready,
            depth,
            executed: 0,
            skipped: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Index of the step that runs next.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Nesting level, 0 for the top-level script.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn constants(&self) -> &ConstantStore {
        self.constants
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition_to(&mut self, next: ExecutionState) -> std::result::Result<(), StateTransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(StateTransitionError {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("Context depth {}: {} -> {}", self.depth, self.state, next);
        self.state = next;
        Ok(())
    }

    fn outcome(&self, failure: Option<StepFailure>) -> RunOutcome {
        RunOutcome {
            state: self.state,
            total: self.steps.len(),
            executed: self.executed,
            skipped: self.skipped,
            failure,
        }
    }
}

/// The step that stopped a run, and why.
#[derive(Debug)]
pub struct StepFailure {
    /// Zero-based position of the failing step.
    pub index: usize,
    /// The step's `operation` tag.
    pub operation: String,
    pub error: CommanderError,
}

/// Structured result of running one script.
#[derive(Debug)]
pub struct RunOutcome {
    /// Completed or Failed
    pub state: ExecutionState,
    /// Number of steps in the script
    pub total: usize,
    /// Steps whose action ran successfully
    pub executed: usize,
    /// Steps passed over because of `skip: true`
    pub skipped: usize,
    pub failure: Option<StepFailure>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == ExecutionState::Completed
    }
}

/// Runs scripts with a fixed [`RunConfig`], console and acknowledgment source.
pub struct Interpreter<'a> {
    config: RunConfig,
    console: Box<dyn Console + 'a>,
    acknowledger: Box<dyn Acknowledge + 'a>,
}

impl Interpreter<'static> {
    /// Interpreter writing to the terminal and pausing on stdin.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            console: Box::new(TerminalConsole),
            acknowledger: Box::new(StdinAcknowledger),
        }
    }
}

impl<'a> Interpreter<'a> {
    pub fn with_console<'b>(self, console: impl Console + 'b) -> Interpreter<'b>
    where
        'a: 'b,
    {
        Interpreter {
            config: self.config,
            console: Box::new(console),
            acknowledger: self.acknowledger,
        }
    }

    pub fn with_acknowledger<'b>(self, acknowledger: impl Acknowledge + 'b) -> Interpreter<'b>
    where
        'a: 'b,
    {
        Interpreter {
            config: self.config,
            console: self.console,
            acknowledger: Box::new(acknowledger),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load the script at `path` and run it. Only a load failure is an `Err`;
    /// step failures are reported in the outcome.
    pub fn run_file<P: AsRef<Path>>(&mut self, path: P, constants: &mut ConstantStore) -> Result<RunOutcome> {
        let script = Script::load(path)?;
        Ok(self.run(&script, constants))
    }

    /// Run a loaded script against `constants`.
    pub fn run(&mut self, script: &Script, constants: &mut ConstantStore) -> RunOutcome {
        if self.config.stepper {
            self.console.info("Stepper is active");
        }
        self.run_context(script, constants, 0)
    }

    fn run_context(&mut self, script: &Script, constants: &mut ConstantStore, depth: usize) -> RunOutcome {
        let mut ctx = ExecutionContext::new(script.steps(), constants, depth);
        if let Err(err) = ctx.transition_to(ExecutionState::Running) {
            return ctx.outcome(Some(StepFailure {
                index: 0,
                operation: String::new(),
                error: err.into(),
            }));
        }

        let steps = ctx.steps;
        tracing::info!(
            "Running {} step(s) from {} at depth {}",
            steps.len(),
            script.source().map(|p| p.display().to_string()).unwrap_or_else(|| "<inline>".into()),
            depth
        );

        while let Some(step) = steps.get(ctx.cursor) {
            if step.skip {
                self.console.info(&format!("Command is skipping.. {}", step.name));
                tracing::info!("Skipping step {} ({})", step.index + 1, step.name);
                ctx.skipped += 1;
                ctx.cursor += 1;
                continue;
            }

            self.console.info(&format!("Command is executing.. {}", step.name));
            tracing::info!("Executing step {} ({})", step.index + 1, step.name);

            let result = self
                .execute_step(step, ctx.constants, depth)
                .and_then(|()| {
                    ctx.executed += 1;
                    self.console
                        .success(&format!("Command is executed successfully.. {}", step.name));
                    self.pause_if_requested(&mut ctx, step)
                });

            if let Err(error) = result {
                self.console
                    .error(&format!("Command could not be executed: {}", step.name));
                self.console.error(&error.to_string());
                tracing::error!("Step {} ({}) failed: {}", step.index + 1, step.name, error);

                // Paused -> Failed is not a legal edge; resume first
                if ctx.state == ExecutionState::Paused {
                    let _ = ctx.transition_to(ExecutionState::Running);
                }
                let _ = ctx.transition_to(ExecutionState::Failed);
                return ctx.outcome(Some(StepFailure {
                    index: step.index,
                    operation: step.name.clone(),
                    error,
                }));
            }

            ctx.cursor += 1;
        }

        let _ = ctx.transition_to(ExecutionState::Completed);
        ctx.outcome(None)
    }

    fn pause_if_requested(&mut self, ctx: &mut ExecutionContext<'_>, step: &Step) -> Result<()> {
        if !(step.wait || self.config.stepper) {
            return Ok(());
        }

        ctx.transition_to(ExecutionState::Paused)?;
        tracing::debug!("Paused after step {}", step.index + 1);
        self.acknowledger.acknowledge(step)?;
        ctx.transition_to(ExecutionState::Running)?;
        Ok(())
    }

    fn execute_step(&mut self, step: &Step, constants: &mut ConstantStore, depth: usize) -> Result<()> {
        let operation = step
            .operation()
            .map_err(|err| CommanderError::from(err.clone()))?;

        // DEFINE_CONSTANT resolves pair by pair inside dispatch and reports each one there
        let resolved = operation.resolve(constants, self.config.substitution);
        if !matches!(resolved, Operation::DefineConstant(_)) {
            for (label, value) in resolved.describe() {
                self.console.detail(label, &value);
            }
        }

        let has_side_effects = !matches!(
            resolved,
            Operation::DefineConstant(_) | Operation::RunCommanderScript(_)
        );
        if self.config.dry_run && has_side_effects {
            self.console.info("Dry run, side effects skipped");
            return Ok(());
        }

        self.dispatch(&resolved, constants, depth)
    }

    fn define_constants(&mut self, args: &DefineConstantArgs, constants: &mut ConstantStore) {
        let mode = self.config.substitution;
        for pair in &args.pairs {
            let key = constants.substitute(&pair.key, mode);
            let value = constants.substitute(&pair.value, mode);
            self.console.detail(&key, &value);
            if let Some(previous) = constants.insert(key.clone(), value) {
                tracing::debug!("Constant {} redefined (was {:?})", key, previous);
            }
        }
    }

    fn dispatch(&mut self, operation: &Operation, constants: &mut ConstantStore, depth: usize) -> Result<()> {
        match operation {
            Operation::DefineConstant(args) => self.define_constants(args, constants),
            Operation::Copy(args) => {
                if actions::copy(args)? == CopyOutcome::AlreadyExists {
                    self.console.info(&format!("File exists: {}", args.destination));
                }
            }
            Operation::ReplaceText(args) => {
                actions::replace_text(args)?;
            }
            Operation::RunShell(args) => {
                actions::run_shell(args, self.config.strict_shell)?;
            }
            Operation::RunCommanderScript(args) => self.run_nested(args, constants, depth)?,
            Operation::ExtractZip(args) => {
                actions::extract_zip(args)?;
            }
            Operation::Regex(args) => {
                actions::regex_edit(args)?;
            }
        }
        Ok(())
    }

    fn run_nested(&mut self, args: &RunScriptArgs, constants: &mut ConstantStore, depth: usize) -> Result<()> {
        let kind = OperationKind::RunCommanderScript;
        let child_depth = depth + 1;
        if child_depth > self.config.max_depth {
            return Err(CommanderError::action(
                kind.as_ref(),
                format!(
                    "{}: nesting deeper than {} levels",
                    args.file_path, self.config.max_depth
                ),
            ));
        }

        let script = Script::load(&args.file_path)
            .map_err(|err| CommanderError::action(kind.as_ref(), err.to_string()))?;

        let outcome = match self.config.nested_constants {
            NestedConstants::ShareParent => self.run_context(&script, constants, child_depth),
            NestedConstants::FreshEmpty => {
                let mut fresh = ConstantStore::new();
                self.run_context(&script, &mut fresh, child_depth)
            }
        };

        match outcome.failure {
            None => Ok(()),
            Some(failure) => Err(CommanderError::action(
                kind.as_ref(),
                format!(
                    "{}: step {} ({}) failed: {}",
                    args.file_path,
                    failure.index + 1,
                    failure.operation,
                    failure.error
                ),
            )),
        }
    }
}
