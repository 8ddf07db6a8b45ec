//! Job and signal control.
//!
//! The interpreter has a single foreground slot holding the process group of the
//! pipeline it is currently waiting for. Interrupt and suspend signals received by the
//! interpreter are relayed to that group. Background pipelines live in a bounded
//! [`JobTable`] and are reaped without blocking between prompts.

use crate::command::ExitCode;
use crate::error::ShellError;
use log::{debug, warn};
use nix::errno::Errno;
use nix::libc::c_int;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal, killpg};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, getpgrp, tcsetpgrp};
use std::fmt;
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicI32, Ordering};

/// Process group of the foreground pipeline, 0 when there is none.
static FOREGROUND: AtomicI32 = AtomicI32::new(0);

/// Signals relayed to the foreground group.
pub const FORWARDED_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTSTP];

/// Signals the interactive interpreter ignores and its children must reset.
pub const JOB_CONTROL_SIGNALS: [Signal; 3] = [Signal::SIGQUIT, Signal::SIGTTIN, Signal::SIGTTOU];

/// Claim the foreground slot for `pgid`.
///
/// Must only be called once the group's first process exists. Returns false when the
/// slot is already taken, in which case nothing is changed.
pub fn set_foreground(pgid: Pid) -> bool {
    FOREGROUND
        .compare_exchange(0, pgid.as_raw(), Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Release the slot if it still belongs to `pgid`. Call only after the wait finished.
pub fn clear_foreground(pgid: Pid) {
    let _ = FOREGROUND.compare_exchange(pgid.as_raw(), 0, Ordering::AcqRel, Ordering::Acquire);
}

/// Current foreground group, if any.
pub fn foreground() -> Option<Pid> {
    match FOREGROUND.load(Ordering::Acquire) {
        0 => None,
        raw => Some(Pid::from_raw(raw)),
    }
}

/// Relay `signal` to the foreground group; no effect when the slot is empty.
///
/// Runs in signal-handler context: one atomic load and one `kill(2)`, nothing else.
pub fn forward(signal: Signal) {
    let raw = FOREGROUND.load(Ordering::Acquire);
    if raw > 0 {
        let _ = killpg(Pid::from_raw(raw), signal);
    }
}

extern "C" fn relay_signal(signo: c_int) {
    let saved = Errno::last_raw();
    if let Ok(signal) = Signal::try_from(signo) {
        forward(signal);
    }
    Errno::set_raw(saved);
}

/// Route SIGINT and SIGTSTP through [`forward`] so they never stop the interpreter.
///
/// With `interactive` set the job-control signals are ignored as well, which lets the
/// interpreter take the terminal back from a finished foreground group.
pub fn install_signal_handlers(interactive: bool) -> nix::Result<()> {
    let relay = SigAction::new(
        SigHandler::Handler(relay_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());

    for signal in FORWARDED_SIGNALS {
        // SAFETY: the handler only performs an atomic load and kill(2).
        unsafe { signal::sigaction(signal, &relay)? };
    }
    if interactive {
        for signal in JOB_CONTROL_SIGNALS {
            // SAFETY: installing SIG_IGN has no handler code to run.
            unsafe { signal::sigaction(signal, &ignore)? };
        }
    }
    Ok(())
}

/// Controlling terminal of an interactive session.
#[derive(Debug, Clone, Copy)]
pub struct Terminal {
    shell_pgid: Pid,
}

impl Terminal {
    /// Returns a handle when standard input is a terminal.
    pub fn detect() -> Option<Self> {
        io::stdin().is_terminal().then(|| Terminal {
            shell_pgid: getpgrp(),
        })
    }

    /// Make `pgid` the terminal's foreground group.
    pub fn give_to(&self, pgid: Pid) {
        if let Err(e) = tcsetpgrp(io::stdin().as_fd(), pgid) {
            debug!("tcsetpgrp({pgid}) failed: {e}");
        }
    }

    /// Give the terminal back to the interpreter.
    pub fn reclaim(&self) {
        self.give_to(self.shell_pgid);
    }
}

/// Exit code of a finished process; signals map to `128 + signal`.
///
/// Returns `None` for stop/continue notifications.
pub fn exit_code(status: WaitStatus) -> Option<ExitCode> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
}

/// A pipeline the interpreter is not waiting for.
#[derive(Debug)]
pub struct Job {
    pub id: usize,
    pub pgid: Pid,
    pub command: String,
    pub state: JobState,
    /// Stages not reaped yet, in pipeline order.
    pids: Vec<Pid>,
    last_pid: Pid,
    status: ExitCode,
}

/// Notification that every process of a job has been reaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: usize,
    pub command: String,
    /// Status of the job's last stage.
    pub status: ExitCode,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            0 => write!(f, "[{}] Done {}", self.id, self.command),
            code => write!(f, "[{}] Exit {} {}", self.id, code, self.command),
        }
    }
}

/// Bounded set of background and stopped jobs.
#[derive(Debug)]
pub struct JobTable {
    jobs: Vec<Job>,
    capacity: usize,
    terminal: Option<Terminal>,
}

impl JobTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Vec::new(),
            capacity,
            terminal: None,
        }
    }

    /// Hand the terminal to foreground pipelines while they run.
    pub fn with_terminal(mut self, terminal: Option<Terminal>) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Record a job and return its id.
    ///
    /// Fails with [`ShellError::Resource`] when the table is full.
    pub fn add(
        &mut self,
        pgid: Pid,
        pids: Vec<Pid>,
        command: &str,
        state: JobState,
    ) -> Result<usize, ShellError> {
        if self.is_full() {
            return Err(ShellError::Resource(format!(
                "job table full ({} jobs)",
                self.capacity
            )));
        }
        let Some(&last_pid) = pids.last() else {
            return Err(ShellError::Resource("job without processes".into()));
        };
        let id = self.jobs.iter().map(|j| j.id).max().unwrap_or(0) + 1;
        debug!("job [{id}] pgid {pgid} {state:?}: {command}");
        self.jobs.push(Job {
            id,
            pgid,
            command: command.to_string(),
            state,
            pids,
            last_pid,
            status: 0,
        });
        Ok(id)
    }

    /// Collect every finished process without blocking.
    ///
    /// Returns the jobs whose processes have all terminated, in table order.
    pub fn reap(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        for job in &mut self.jobs {
            let Job {
                id,
                command,
                pids,
                last_pid,
                status,
                ..
            } = job;
            pids.retain(|&pid| match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(wait_status) => match exit_code(wait_status) {
                    Some(code) => {
                        debug!("reaped {pid} of job [{id}] with status {code}");
                        if pid == *last_pid {
                            *status = code;
                        }
                        false
                    }
                    None => true,
                },
                Err(Errno::EINTR) => true,
                Err(e) => {
                    warn!("waitpid({pid}) failed: {e}");
                    false
                }
            });
            if pids.is_empty() {
                done.push(Completion {
                    id: *id,
                    command: command.clone(),
                    status: *status,
                });
            }
        }
        self.jobs.retain(|job| !job.pids.is_empty());
        done
    }

    /// Send SIGHUP and then SIGCONT to every stopped job so none outlives the session.
    pub fn hangup_stopped(&mut self) {
        for job in self.jobs.iter().filter(|j| j.state == JobState::Stopped) {
            debug!("hanging up stopped job [{}]", job.id);
            let _ = killpg(job.pgid, Signal::SIGHUP);
            let _ = killpg(job.pgid, Signal::SIGCONT);
        }
    }
}
