//! Lifecycle management for shell step child processes
//!
//! `RUN_SHELL` children share the interpreter's terminal and process group so
//! they can read input and see Ctrl+C like any foreground command. This module
//! makes sure none of them outlive the interpreter:
//!
//! - a running child is tracked by a [`TrackedChild`] handle for as long as
//!   the step waits on it
//! - SIGINT, SIGTERM and SIGHUP stop every tracked child, then exit
//! - on Linux, children receive SIGTERM if the interpreter dies (`PR_SET_PDEATHSIG`)
//! - dropping the [`ProcessGuard`] held by `main` stops anything still tracked

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shell commands currently running, keyed by PID.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    running: HashMap<u32, String>,
    shutting_down: bool,
}

impl ChildRegistry {
    /// The process-wide registry used by shell steps and signal handlers.
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        Arc::clone(REGISTRY.get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default()))))
    }

    pub fn register(&mut self, pid: u32, command: impl Into<String>) {
        let command = command.into();
        tracing::debug!("Tracking PID {} ({})", pid, command);
        self.running.insert(pid, command);
    }

    /// Stop tracking `pid`, returning the command it was running.
    pub fn unregister(&mut self, pid: u32) -> Option<String> {
        let command = self.running.remove(&pid);
        if command.is_some() {
            tracing::debug!("PID {} finished", pid);
        }
        command
    }

    pub fn count(&self) -> usize {
        self.running.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// SIGTERM every tracked child, wait up to `grace_period` for them to
    /// exit, then SIGKILL whatever is left. Runs at most once per registry.
    ///
    /// Returns the number of children that were signalled.
    pub fn terminate_all(&mut self, grace_period: Duration) -> usize {
        if std::mem::replace(&mut self.shutting_down, true) {
            return 0;
        }

        let children: Vec<(u32, String)> = self.running.drain().collect();
        if children.is_empty() {
            return 0;
        }

        for (pid, command) in &children {
            tracing::info!("Stopping PID {} ({})", pid, command);
            if let Err(e) = send_signal(*pid, Signal::SIGTERM) {
                tracing::warn!("SIGTERM to PID {} failed: {}", pid, e);
            }
        }

        let deadline = Instant::now() + grace_period;
        let mut survivors: Vec<u32> = children.iter().map(|(pid, _)| *pid).collect();
        loop {
            survivors.retain(|&pid| is_process_alive(pid));
            if survivors.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        for pid in survivors {
            tracing::warn!("PID {} ignored SIGTERM, sending SIGKILL", pid);
            let _ = send_signal(pid, Signal::SIGKILL);
        }

        children.len()
    }
}

/// Registration of one running child in the global registry; unregisters on drop.
#[derive(Debug)]
pub struct TrackedChild {
    pid: u32,
}

impl TrackedChild {
    pub fn track(pid: u32, command: &str) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid, command);
        }
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for TrackedChild {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pid);
        }
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// True if `pid` exists and is neither a zombie nor dead.
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // /proc/<pid>/stat is "pid (comm) state ..."; comm may contain spaces
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_none_or(|state| !matches!(state, 'Z' | 'X')),
        Err(_) => true,
    }
}

/// Held for the lifetime of `main`; stops any tracked child when dropped.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }

    pub fn child_count(&self) -> usize {
        self.registry.lock().map(|r| r.count()).unwrap_or(0)
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            let stopped = registry.terminate_all(Duration::from_secs(5));
            if stopped > 0 {
                tracing::info!("Stopped {} shell command(s) on exit", stopped);
            }
        }
    }
}

/// Install SIGINT, SIGTERM and SIGHUP handling.
///
/// A background thread waits for the first signal, stops all tracked
/// children and exits with status 128 + signal number. Call once at start-up.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::Builder::new()
        .name("commander-signals".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                let name = match sig {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => "SIGHUP",
                };
                tracing::warn!("Received {}, stopping script", name);

                if let Ok(mut registry) = ChildRegistry::global().lock() {
                    registry.terminate_all(Duration::from_secs(3));
                }
                std::process::exit(128 + sig);
            }
        })?;

    Ok(())
}

/// Extension trait for std::process::Command tying the child's lifetime to ours
pub trait DieWithParent {
    /// Ask the kernel to send SIGTERM to the child if the interpreter dies.
    /// No-op outside Linux.
    fn die_with_parent(&mut self) -> &mut Self;
}

impl DieWithParent for std::process::Command {
    #[cfg(target_os = "linux")]
    fn die_with_parent(&mut self) -> &mut Self {
        use nix::libc;
        use std::os::unix::process::CommandExt;

        // SAFETY: prctl is async-signal-safe and touches no parent state.
        unsafe {
            self.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }

    #[cfg(not(target_os = "linux"))]
    fn die_with_parent(&mut self) -> &mut Self {
        self
    }
}
