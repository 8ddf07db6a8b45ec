//! Creation of one child process wired to the requested streams.

use crate::command::{Command, ExitCode, OutputMode};
use crate::error::ShellError;
use crate::io_adapters::REDIRECT_FILE_MODE;
use crate::jobs::{FORWARDED_SIGNALS, JOB_CONTROL_SIGNALS};
use log::debug;
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{ForkResult, Pid, close, dup2, execvp, fork, setpgid};
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::{self, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};

/// Status of a child whose program could not be found.
pub const EXIT_NOT_FOUND: ExitCode = 127;
/// Status of a child whose program exists but could not be executed.
pub const EXIT_NOT_EXECUTABLE: ExitCode = 126;
/// Status of a child that could not open or wire one of its streams.
pub const EXIT_REDIRECT_FAILED: ExitCode = 125;

/// Ignored by the Rust runtime at start-up; an ignored disposition survives exec.
const INHERITED_IGNORED: [Signal; 1] = [Signal::SIGPIPE];

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;
const STDERR: RawFd = 2;

/// Descriptors handed down by the pipeline orchestrator for the standard streams.
///
/// A stage's own `<`/`>` redirection is applied after these and therefore wins.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StdioOverrides {
    pub stdin: Option<RawFd>,
    pub stdout: Option<RawFd>,
}

/// Process group the new child is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessGroup {
    /// Lead a new group (first stage of a pipeline).
    Lead,
    /// Join the group of an earlier stage.
    Join(Pid),
}

impl ProcessGroup {
    fn target(self) -> Pid {
        match self {
            ProcessGroup::Lead => Pid::from_raw(0),
            ProcessGroup::Join(pgid) => pgid,
        }
    }
}

/// Everything the child needs, converted before `fork` so the child never allocates.
struct Prepared {
    argv: Vec<CString>,
    input: Option<CString>,
    output: Option<(CString, OFlag)>,
}

impl Prepared {
    fn new(command: &Command) -> Result<Self, ShellError> {
        let to_c = |s: &str| {
            CString::new(s).map_err(|_| {
                ShellError::Exec(format!("{}: argument contains a NUL byte", command.name()))
            })
        };
        if command.argv.is_empty() {
            return Err(ShellError::Exec("empty argument vector".into()));
        }

        let argv = command
            .argv
            .iter()
            .map(|a| to_c(a))
            .collect::<Result<Vec<_>, _>>()?;
        let input = command.input_path.as_deref().map(to_c).transpose()?;
        let output = match &command.output_path {
            Some(path) => {
                let mode = match command.output_mode {
                    OutputMode::Truncate => OFlag::O_TRUNC,
                    OutputMode::Append => OFlag::O_APPEND,
                };
                Some((to_c(path)?, OFlag::O_WRONLY | OFlag::O_CREAT | mode))
            }
            None => None,
        };
        Ok(Self {
            argv,
            input,
            output,
        })
    }
}

/// Start `command` as a new process and return its pid.
///
/// Inside the child: join `group`, restore default signal dispositions, apply
/// `overrides`, then the command's own redirections, then replace the program image
/// using the `PATH` search of `execvp`. A child that cannot do so exits with
/// [`EXIT_NOT_FOUND`], [`EXIT_NOT_EXECUTABLE`] or [`EXIT_REDIRECT_FAILED`]; it never
/// returns into interpreter code. Only redirection failures are described by the child
/// itself, since the file name is not part of the status.
pub fn launch(
    command: &Command,
    overrides: StdioOverrides,
    group: ProcessGroup,
) -> Result<Pid, ShellError> {
    let prepared = Prepared::new(command)?;
    // the child gets a copy of anything still buffered
    io::stdout().flush()?;

    // SAFETY: the child branch only performs async-signal-safe calls on data
    // prepared above and ends in exec or _exit.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => child_main(&prepared, overrides, group),
        Ok(ForkResult::Parent { child }) => {
            // also done by the child; whichever runs first closes the race
            let _ = setpgid(child, match group {
                ProcessGroup::Lead => child,
                ProcessGroup::Join(pgid) => pgid,
            });
            debug!("launched {} as pid {child} ({group:?})", command.name());
            Ok(child)
        }
        Err(e) => Err(ShellError::Resource(format!("Fork Failed! ({})", e.desc()))),
    }
}

fn child_main(prepared: &Prepared, overrides: StdioOverrides, group: ProcessGroup) -> ! {
    let _ = setpgid(Pid::from_raw(0), group.target());
    let defaults = FORWARDED_SIGNALS
        .into_iter()
        .chain(JOB_CONTROL_SIGNALS)
        .chain(INHERITED_IGNORED);
    for sig in defaults {
        // SAFETY: resetting to the default disposition runs no handler code.
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }

    if let Err(errno) = wire(overrides.stdin, STDIN).and_then(|()| wire(overrides.stdout, STDOUT)) {
        report(&[b"minish: dup2: ", errno.desc().as_bytes(), b"\n"]);
        exit_child(EXIT_REDIRECT_FAILED);
    }

    if let Some(path) = &prepared.input {
        if let Err(errno) = redirect(path, OFlag::O_RDONLY, STDIN) {
            redirect_failed(path, errno);
        }
    }
    if let Some((path, flags)) = &prepared.output {
        if let Err(errno) = redirect(path, *flags, STDOUT) {
            redirect_failed(path, errno);
        }
    }

    let errno = match execvp(&prepared.argv[0], &prepared.argv) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    // the interpreter reports the failure from the exit status
    exit_child(match errno {
        Errno::ENOENT | Errno::ENOTDIR => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    })
}

fn wire(source: Option<RawFd>, target: RawFd) -> Result<(), Errno> {
    match source {
        Some(fd) if fd != target => dup2(fd, target).map(drop),
        _ => Ok(()),
    }
}

fn redirect(path: &CStr, flags: OFlag, target: RawFd) -> Result<(), Errno> {
    let fd = open(path, flags, Mode::from_bits_truncate(REDIRECT_FILE_MODE))?;
    if fd == target {
        return Ok(());
    }
    let wired = dup2(fd, target).map(drop);
    let _ = close(fd);
    wired
}

fn redirect_failed(path: &CStr, errno: Errno) -> ! {
    report(&[
        b"minish: ",
        path.to_bytes(),
        b": ",
        errno.desc().as_bytes(),
        b"\n",
    ]);
    exit_child(EXIT_REDIRECT_FAILED)
}

/// Write straight to descriptor 2, bypassing the lock of `std::io::Stderr`.
fn report(parts: &[&[u8]]) {
    // SAFETY: fd 2 stays open; ManuallyDrop keeps it from being closed here.
    let mut stderr = ManuallyDrop::new(unsafe { File::from_raw_fd(STDERR) });
    for part in parts {
        let _ = stderr.write_all(part);
    }
}

fn exit_child(code: ExitCode) -> ! {
    // SAFETY: _exit skips atexit handlers and buffered output owned by the parent.
    unsafe { nix::libc::_exit(code) }
}

/// Readable summary of a non-zero status returned by a launched stage.
pub fn describe_status(code: ExitCode) -> String {
    match code {
        EXIT_NOT_FOUND => "command not found".to_string(),
        EXIT_NOT_EXECUTABLE => "permission denied".to_string(),
        EXIT_REDIRECT_FAILED => "redirection failed".to_string(),
        code if code > 128 => format!("terminated by signal {}", code - 128),
        code => format!("exited with status {code}"),
    }
}
