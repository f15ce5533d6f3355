use clap::Parser;
use std::path::PathBuf;

use crate::config::{NestedConstants, RunConfig};
use crate::constants::SubstitutionMode;

/// Commander - run declarative JSON command scripts
#[derive(Parser, Debug)]
#[command(name = "commander")]
#[command(about = "Execute a JSON list of file, text, shell and archive operations in order")]
#[command(version)]
pub struct Cli {
    /// Path to the script file (a JSON array of operation objects)
    pub file: PathBuf,

    /// Pause for Enter after every executed step
    #[arg(long)]
    pub stepper: bool,

    /// Print each resolved step without touching the filesystem or running commands.
    ///
    /// DEFINE_CONSTANT still updates the constant store and nested scripts are
    /// still walked, so the printed values match what a real run would use.
    #[arg(long)]
    pub dry_run: bool,

    /// Treat a non-zero exit status from RUN_SHELL as a step failure
    #[arg(long)]
    pub strict_shell: bool,

    /// Give nested scripts an empty constant store instead of sharing the caller's
    #[arg(long)]
    pub isolate_nested: bool,

    /// Substitute all constants in one scan instead of one constant at a time
    #[arg(long)]
    pub single_pass: bool,

    /// Maximum RUN_COMMANDER_SCRIPT nesting depth
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Seed a constant before the run (repeatable)
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_define)]
    pub defines: Vec<(String, String)>,

    /// Load run options from a JSON configuration file; flags override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Load the script, report invalid steps and exit without running anything
    #[arg(long)]
    pub validate: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Overlay the command-line switches onto `base`.
    ///
    /// Switches only ever turn behaviour on, so an option enabled in the
    /// configuration file cannot be disabled from the command line.
    pub fn apply_to(&self, mut base: RunConfig) -> RunConfig {
        base.stepper |= self.stepper;
        base.dry_run |= self.dry_run;
        base.strict_shell |= self.strict_shell;
        if self.isolate_nested {
            base.nested_constants = NestedConstants::FreshEmpty;
        }
        if self.single_pass {
            base.substitution = SubstitutionMode::SinglePass;
        }
        if let Some(depth) = self.max_depth {
            base.max_depth = depth;
        }
        base
    }
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}
