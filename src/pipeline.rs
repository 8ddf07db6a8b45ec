//! Multi-stage pipeline construction, waiting and backgrounding.

use crate::command::{ExitCode, Pipeline};
use crate::error::ShellError;
use crate::jobs::{self, JobState, JobTable, exit_code};
use crate::launcher::{self, ProcessGroup, StdioOverrides};
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, killpg};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, pipe2};
use std::os::fd::{AsRawFd, OwnedFd};

/// Final status of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    pub name: String,
    pub code: ExitCode,
}

/// What happened to a pipeline handed to [`run_pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// Every stage terminated; statuses are in pipeline order.
    Completed { stages: Vec<StageStatus> },
    /// The foreground group was suspended and moved to the job table.
    Stopped { pgid: Pid, job: usize },
    /// Launched with `&`; `pid` is the last stage.
    Background { pid: Pid, job: usize },
}

impl ExitReport {
    /// Status of the pipeline as a whole: that of its last stage.
    pub fn status(&self) -> ExitCode {
        match self {
            ExitReport::Completed { stages } => stages.last().map_or(0, |s| s.code),
            ExitReport::Stopped { .. } => 128 + Signal::SIGTSTP as i32,
            ExitReport::Background { .. } => 0,
        }
    }
}

/// One `(read, write)` pair per connection between adjacent stages.
struct PipeSet {
    pipes: Vec<(OwnedFd, OwnedFd)>,
}

impl PipeSet {
    fn for_stages(stages: usize) -> Result<Self, ShellError> {
        let mut pipes = Vec::with_capacity(stages.saturating_sub(1));
        for _ in 1..stages {
            // close-on-exec: each child keeps only what it dup2'ed onto 0 and 1
            let pair = pipe2(OFlag::O_CLOEXEC).map_err(|e| ShellError::resource("pipe", e))?;
            pipes.push(pair);
        }
        Ok(Self { pipes })
    }

    /// Inherited descriptors of stage `i` out of `n`.
    fn overrides(&self, i: usize, n: usize) -> StdioOverrides {
        StdioOverrides {
            stdin: (i > 0).then(|| self.pipes[i - 1].0.as_raw_fd()),
            stdout: (i + 1 < n).then(|| self.pipes[i].1.as_raw_fd()),
        }
    }
}

/// Launch every stage of `pipeline` and wait for it unless it is backgrounded.
///
/// Stages are started left to right and run concurrently. The interpreter's copies of
/// all pipe descriptors are closed as soon as the last stage is started, otherwise a
/// reader would never see end-of-stream. The foreground slot is claimed right after the
/// first stage exists and released only once waiting is over.
pub fn run_pipeline(pipeline: &Pipeline, jobs: &mut JobTable) -> Result<ExitReport, ShellError> {
    let background = pipeline.is_background();
    if background && jobs.is_full() {
        return Err(ShellError::Resource(format!(
            "too many background jobs ({})",
            jobs.len()
        )));
    }

    let n = pipeline.stages.len();
    let pipes = PipeSet::for_stages(n)?;
    let terminal = jobs.terminal().copied();
    let mut pids: Vec<Pid> = Vec::with_capacity(n);
    let mut pgid = None;

    for (i, stage) in pipeline.stages.iter().enumerate() {
        let group = pgid.map_or(ProcessGroup::Lead, ProcessGroup::Join);
        match launcher::launch(stage, pipes.overrides(i, n), group) {
            Ok(pid) => {
                pids.push(pid);
                if pgid.is_none() {
                    pgid = Some(pid);
                    if !background {
                        if !jobs::set_foreground(pid) {
                            warn!("foreground slot busy; signals will not reach group {pid}");
                        }
                        if let Some(terminal) = &terminal {
                            terminal.give_to(pid);
                        }
                    }
                }
            }
            Err(e) => {
                drop(pipes);
                if let Some(pgid) = pgid {
                    abandon(pgid, &pids, background, terminal.as_ref());
                }
                return Err(e);
            }
        }
    }
    drop(pipes);

    let (Some(pgid), Some(&last)) = (pgid, pids.last()) else {
        return Err(ShellError::Exec("empty pipeline".into()));
    };
    let job_text = pipeline.text.trim_end_matches('&').trim_end();

    if background {
        let job = jobs.add(pgid, pids, job_text, JobState::Running)?;
        println!("Background process PID: {last}");
        return Ok(ExitReport::Background { pid: last, job });
    }

    let outcome = wait_foreground(&pids);
    if let Some(terminal) = &terminal {
        terminal.reclaim();
    }
    jobs::clear_foreground(pgid);

    match outcome {
        Waited::Failed(e) => Err(ShellError::resource("waitpid", e)),
        Waited::Done(codes) => Ok(ExitReport::Completed {
            stages: pipeline
                .stages
                .iter()
                .zip(codes)
                .map(|(stage, code)| StageStatus {
                    name: stage.name().to_string(),
                    code,
                })
                .collect(),
        }),
        Waited::Stopped(remaining) => {
            println!();
            println!("Process {pgid} stopped");
            match jobs.add(pgid, remaining.clone(), job_text, JobState::Stopped) {
                Ok(job) => Ok(ExitReport::Stopped { pgid, job }),
                Err(e) => {
                    let _ = killpg(pgid, Signal::SIGHUP);
                    let _ = killpg(pgid, Signal::SIGCONT);
                    wait_foreground(&remaining);
                    Err(e)
                }
            }
        }
    }
}

enum Waited {
    Done(Vec<ExitCode>),
    /// Pids that were still alive when the group stopped.
    Stopped(Vec<Pid>),
    Failed(Errno),
}

fn wait_foreground(pids: &[Pid]) -> Waited {
    let mut codes = Vec::with_capacity(pids.len());
    for (i, &pid) in pids.iter().enumerate() {
        loop {
            match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Stopped(..)) => {
                    debug!("{pid} stopped");
                    return Waited::Stopped(pids[i..].to_vec());
                }
                Ok(status) => {
                    if let Some(code) = exit_code(status) {
                        debug!("{pid} finished with status {code}");
                        codes.push(code);
                        break;
                    }
                }
                Err(Errno::EINTR) => {}
                Err(e) => {
                    warn!("waitpid({pid}) failed: {e}");
                    return Waited::Failed(e);
                }
            }
        }
    }
    Waited::Done(codes)
}

/// Tear down the stages already started when a later one could not be launched.
fn abandon(pgid: Pid, pids: &[Pid], background: bool, terminal: Option<&jobs::Terminal>) {
    let _ = killpg(pgid, Signal::SIGTERM);
    let _ = killpg(pgid, Signal::SIGCONT);
    for &pid in pids {
        let _ = waitpid(pid, None);
    }
    if !background {
        if let Some(terminal) = terminal {
            terminal.reclaim();
        }
        jobs::clear_foreground(pgid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use std::fs;
    use std::time::{Duration, Instant};

    fn single(line: &str) -> Pipeline {
        parse_line(line).unwrap().remove(0)
    }

    #[test]
    fn three_stage_pipeline_counts_one_line() {
        let _guard = crate::serial_guard();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("count.txt");
        let line = format!(
            "printf 'a\\nb\\nc\\n' | grep b | wc -l > {}",
            out.display()
        );
        let mut jobs = JobTable::new(4);

        let report = run_pipeline(&single(&line), &mut jobs).unwrap();
        assert_eq!(report.status(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "1");
        assert_eq!(jobs::foreground(), None);
    }

    #[test]
    fn statuses_are_reported_per_stage() {
        let _guard = crate::serial_guard();
        let mut jobs = JobTable::new(4);
        let report = run_pipeline(&single("false | no-such-program-xyz | true"), &mut jobs).unwrap();
        let ExitReport::Completed { stages } = report else {
            panic!("expected completion");
        };
        let codes: Vec<_> = stages.iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![1, launcher::EXIT_NOT_FOUND, 0]);
        assert_eq!(stages[1].name, "no-such-program-xyz");
    }

    #[test]
    fn explicit_redirection_beats_the_pipe() {
        let _guard = crate::serial_guard();
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let last = dir.path().join("last.txt");
        let line = format!(
            "echo hi > {} | wc -c > {}",
            first.display(),
            last.display()
        );
        let mut jobs = JobTable::new(4);

        run_pipeline(&single(&line), &mut jobs).unwrap();
        assert_eq!(fs::read_to_string(&first).unwrap(), "hi\n");
        // wc saw end-of-stream immediately
        assert_eq!(fs::read_to_string(&last).unwrap().trim(), "0");
    }

    #[test]
    fn later_stage_input_file_replaces_the_pipe() {
        let _guard = crate::serial_guard();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        fs::write(&input, "from file\n").unwrap();
        let line = format!("echo x | cat < {} > {}", input.display(), out.display());
        let mut jobs = JobTable::new(4);

        run_pipeline(&single(&line), &mut jobs).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "from file\n");
    }

    #[test]
    fn writer_dies_of_sigpipe_when_reader_quits() {
        let _guard = crate::serial_guard();
        let mut jobs = JobTable::new(4);
        let report = run_pipeline(&single("yes | head -n 1 > /dev/null"), &mut jobs).unwrap();
        let ExitReport::Completed { stages } = report else {
            panic!("expected completion, got {report:?}");
        };
        assert_eq!(stages[0].code, 128 + Signal::SIGPIPE as i32);
        assert_eq!(stages[1].code, 0);
    }

    #[test]
    fn wait_failure_is_not_a_status() {
        // pid 1 is never our child
        let waited = wait_foreground(&[Pid::from_raw(1)]);
        assert!(matches!(waited, Waited::Failed(Errno::ECHILD)));
    }

    #[test]
    fn long_pipeline_has_no_fixed_limit() {
        let _guard = crate::serial_guard();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut line = String::from("echo deep");
        for _ in 0..40 {
            line.push_str(" | cat");
        }
        line.push_str(&format!(" > {}", out.display()));
        let mut jobs = JobTable::new(4);

        run_pipeline(&single(&line), &mut jobs).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "deep\n");
    }

    #[test]
    fn background_returns_immediately() {
        let _guard = crate::serial_guard();
        let mut jobs = JobTable::new(4);
        let started = Instant::now();

        let report = run_pipeline(&single("sleep 1 &"), &mut jobs).unwrap();
        assert!(started.elapsed() < Duration::from_millis(800));
        assert!(matches!(report, ExitReport::Background { job: 1, .. }));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs.jobs()[0].command, "sleep 1");
        assert_eq!(jobs::foreground(), None);

        let mut done = Vec::new();
        while done.is_empty() && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(20));
            done = jobs.reap();
        }
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].status, 0);
    }

    #[test]
    fn foreground_blocks_until_done() {
        let _guard = crate::serial_guard();
        let mut jobs = JobTable::new(4);
        let started = Instant::now();
        run_pipeline(&single("sleep 0.3"), &mut jobs).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn full_table_refuses_background_launch() {
        let _guard = crate::serial_guard();
        let mut jobs = JobTable::new(0);
        let err = run_pipeline(&single("true &"), &mut jobs).unwrap_err();
        assert!(matches!(err, ShellError::Resource(_)));
    }

    #[test]
    fn stopped_group_moves_to_job_table() {
        let _guard = crate::serial_guard();
        let mut jobs = JobTable::new(4);
        let report = run_pipeline(&single("sh -c 'kill -STOP $$'"), &mut jobs).unwrap();
        let ExitReport::Stopped { pgid, job } = report else {
            panic!("expected a stopped job, got {report:?}");
        };
        assert_eq!(job, 1);
        assert_eq!(jobs.jobs()[0].state, JobState::Stopped);
        assert_eq!(jobs::foreground(), None);

        killpg(pgid, Signal::SIGKILL).unwrap();
        let _ = killpg(pgid, Signal::SIGCONT);
        waitpid(pgid, None).unwrap();
    }
}
