use crate::command::{BuiltinKind, CommandFactory, ExecutableCommand, ExitCode};
use crate::dispatcher::Factory;
use crate::session::Session;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use chrono::{DateTime, Local};
use nix::unistd::{Gid, Group, Uid, User};
use regex::RegexBuilder;
use std::fs::{self, Metadata};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Whether the command has to run inside the interpreter's own process.
    fn kind() -> BuiltinKind {
        BuiltinKind::Stateless
    }

    /// Rewrite raw arguments into a form `argh` accepts.
    fn normalize_args(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    /// Executes the command, writing its regular output to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let result = T::execute(*self, stdout, session);
        stdout.flush()?;
        match result {
            Ok(x) => Ok(x),
            Err(e) => {
                eprintln!("{}: {e:#}", T::name());
                Ok(1)
            }
        }
    }
}

/// Usage text or a parse error produced by `argh`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _session: &mut Session) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output.trim_end());
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output.trim_end())?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn kind(&self) -> BuiltinKind {
        T::kind()
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        let args = T::normalize_args(args);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Some(match T::from_args(&[name], &args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

/// Every built-in in dispatch order.
pub(crate) fn factories() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<Ls>::default()),
        Box::new(Factory::<Pinfo>::default()),
        Box::new(Factory::<Search>::default()),
        Box::new(Factory::<History>::default()),
    ]
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        writeln!(stdout, "{}", session.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target, or with `~`, returns to the directory the shell was started in;
/// `-` returns to the previous directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute, relative, `~`, `~/...` or `-`.
    pub target: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn kind() -> BuiltinKind {
        BuiltinKind::StateMutating
    }

    fn normalize_args(args: &[&str]) -> Vec<String> {
        // a lone "-" is an operand, not a flag
        args.iter()
            .flat_map(|&a| match a {
                "-" => vec!["--".to_string(), "-".to_string()],
                a => vec![a.to_string()],
            })
            .collect()
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let target = match self.target.as_slice() {
            [] => session.base_dir.clone(),
            [one] if one == "-" => {
                let Some(previous) = session.previous_dir.clone() else {
                    bail!("OLDPWD not set");
                };
                writeln!(stdout, "{}", previous.display())?;
                previous
            }
            [one] => session.expand_tilde(one),
            _ => bail!("too many arguments"),
        };
        session.change_dir(&target)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell. Arguments are ignored.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn kind() -> BuiltinKind {
        BuiltinKind::StateMutating
    }

    fn normalize_args(_args: &[&str]) -> Vec<String> {
        Vec::new()
    }

    fn execute(self, _stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        session.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn normalize_args(args: &[&str]) -> Vec<String> {
        if args.first() == Some(&"--help") {
            return vec!["--help".to_string()];
        }
        // leading -n flags, then everything else verbatim
        let flags = args.iter().take_while(|&&a| a == "-n").count();
        let mut out = Vec::with_capacity(args.len() + 2);
        if flags > 0 {
            out.push("-n".to_string());
        }
        out.push("--".to_string());
        out.extend(args[flags..].iter().map(|a| a.to_string()));
        out
    }

    fn execute(self, stdout: &mut dyn Write, _session: &mut Session) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// list directory contents, sorted by name.
pub struct Ls {
    #[argh(switch, short = 'a')]
    /// include entries whose names begin with a dot.
    pub all: bool,

    #[argh(switch, short = 'l')]
    /// use a long listing format.
    pub long: bool,

    #[argh(positional)]
    /// directories or files to list; defaults to the current directory.
    pub paths: Vec<String>,
}

impl BuiltinCommand for Ls {
    fn name() -> &'static str {
        "ls"
    }

    fn normalize_args(args: &[&str]) -> Vec<String> {
        // -la, -al, -lla ... become separate switches
        let mut out = Vec::with_capacity(args.len());
        for &arg in args {
            match arg.strip_prefix('-') {
                Some(flags) if flags.len() > 1 && flags.chars().all(|c| "al".contains(c)) => {
                    out.extend(flags.chars().map(|c| format!("-{c}")));
                }
                _ => out.push(arg.to_string()),
            }
        }
        out
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let paths: Vec<String> = if self.paths.is_empty() {
            vec![".".to_string()]
        } else {
            self.paths.clone()
        };
        let headers = paths.len() > 1;
        let mut status = 0;

        for arg in &paths {
            let path = session.current_dir.join(session.expand_tilde(arg));
            if headers {
                writeln!(stdout, "{arg}:")?;
            }
            if let Err(e) = self.list(arg, &path, stdout) {
                eprintln!("ls: {arg}: {e:#}");
                status = 1;
            }
            if headers {
                writeln!(stdout)?;
            }
        }
        Ok(status)
    }
}

impl Ls {
    fn list(&self, arg: &str, path: &Path, stdout: &mut dyn Write) -> Result<()> {
        let meta = fs::metadata(path).context("cannot access")?;
        if !meta.is_dir() {
            return self.print_entry(arg, path, stdout);
        }

        let mut names: Vec<String> = fs::read_dir(path)
            .context("cannot open directory")?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| self.all || !name.starts_with('.'))
            .collect();
        if self.all {
            names.push(".".into());
            names.push("..".into());
        }
        names.sort();

        if self.long {
            let blocks: u64 = names
                .iter()
                .filter_map(|name| fs::symlink_metadata(path.join(name)).ok())
                .map(|m| m.blocks())
                .sum();
            writeln!(stdout, "total {}", blocks / 2)?;
        }
        for name in &names {
            self.print_entry(name, &path.join(name), stdout)?;
        }
        Ok(())
    }

    fn print_entry(&self, name: &str, path: &Path, stdout: &mut dyn Write) -> Result<()> {
        if !self.long {
            writeln!(stdout, "{name}")?;
            return Ok(());
        }
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("cannot stat {}", path.display()))?;
        let modified: DateTime<Local> = meta.modified()?.into();
        writeln!(
            stdout,
            "{} {} {} {} {:>8} {} {}",
            permissions(&meta),
            meta.nlink(),
            user_name(meta.uid()),
            group_name(meta.gid()),
            meta.len(),
            modified.format("%b %d %H:%M"),
            name
        )?;
        Ok(())
    }
}

/// `drwxr-xr-x`-style mode string.
fn permissions(meta: &Metadata) -> String {
    let kind = if meta.is_dir() {
        'd'
    } else if meta.file_type().is_symlink() {
        'l'
    } else {
        '-'
    };
    let mode = meta.permissions().mode();
    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn group_name(gid: u32) -> String {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    }
}

#[derive(FromArgs)]
/// print information about a process (defaults to the shell itself).
pub struct Pinfo {
    #[argh(positional)]
    /// process id to inspect.
    pub pid: Option<u32>,
}

impl BuiltinCommand for Pinfo {
    fn name() -> &'static str {
        "pinfo"
    }

    fn execute(self, stdout: &mut dyn Write, _session: &mut Session) -> Result<ExitCode> {
        let pid = self.pid.unwrap_or_else(std::process::id);
        let proc_dir = PathBuf::from(format!("/proc/{pid}"));
        let status = fs::read_to_string(proc_dir.join("status"))
            .with_context(|| format!("no such process {pid}"))?;
        let stat = fs::read_to_string(proc_dir.join("stat")).unwrap_or_default();

        let mut state = status_field(&status, "State").unwrap_or_default();
        state.truncate(1);
        if in_foreground_group(&stat) {
            state.push('+');
        }
        let memory = status_field(&status, "VmSize")
            .map(|v| v.trim_end_matches("kB").trim_end().to_string())
            .unwrap_or_default();
        let exe = fs::read_link(proc_dir.join("exe"))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        writeln!(stdout, "pid -- {pid}")?;
        writeln!(stdout, "Process Status -- {{{state}}}")?;
        writeln!(stdout, "memory -- {memory} {{Virtual Memory}}")?;
        writeln!(stdout, "Executable Path -- {exe}")?;
        Ok(0)
    }
}

/// Value of `key:` in a `/proc/<pid>/status` listing.
fn status_field(status: &str, key: &str) -> Option<String> {
    let re = RegexBuilder::new(&format!(r"^{}:\s*(.*)$", regex::escape(key)))
        .multi_line(true)
        .build()
        .ok()?;
    re.captures(status).map(|c| c[1].trim().to_string())
}

/// Whether the process group in a `/proc/<pid>/stat` line owns its terminal.
fn in_foreground_group(stat: &str) -> bool {
    // fields after the parenthesised command name: state ppid pgrp session tty_nr tpgid
    let Some(rest) = stat.rfind(')').map(|i| &stat[i + 1..]) else {
        return false;
    };
    let fields: Vec<&str> = rest.split_whitespace().collect();
    match (fields.get(2), fields.get(5)) {
        (Some(pgrp), Some(tpgid)) => pgrp == tpgid && *tpgid != "-1",
        _ => false,
    }
}

#[derive(FromArgs)]
/// search for a file or directory below the current directory; prints True or False.
pub struct Search {
    #[argh(positional)]
    /// exact name to look for.
    pub name: String,
}

impl BuiltinCommand for Search {
    fn name() -> &'static str {
        "search"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let found = WalkDir::new(&session.current_dir)
            .min_depth(1)
            .max_depth(session.config.search.max_depth)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_str() == Some(self.name.as_str()));
        writeln!(stdout, "{}", if found { "True" } else { "False" })?;
        Ok(if found { 0 } else { 1 })
    }
}

#[derive(FromArgs)]
/// print the most recent input lines.
pub struct History {
    #[argh(positional)]
    /// how many entries to show (default 10).
    pub count: Option<usize>,
}

impl History {
    const DEFAULT_COUNT: usize = 10;
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let count = match self.count {
            None | Some(0) => Self::DEFAULT_COUNT,
            Some(n) => n,
        };
        for line in session.history.recent(count) {
            writeln!(stdout, "{line}")?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env as stdenv;

    fn run<T: BuiltinCommand + 'static>(args: &[&str], session: &mut Session) -> (ExitCode, String) {
        let factory = Factory::<T>::default();
        let cmd = factory
            .try_create(T::name(), args)
            .expect("factory must recognise its own name");
        let mut out = Vec::new();
        let code = cmd.execute(&mut out, session).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::for_tests(dir.path());
        let (code, out) = run::<Pwd>(&[], &mut session);
        assert_eq!(code, 0);
        assert_eq!(out, format!("{}\n", dir.path().to_string_lossy()));
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::for_tests(dir.path());
        assert_eq!(run::<Echo>(&["hello", "world"], &mut session).1, "hello world\n");
        assert_eq!(run::<Echo>(&["-n", "foo", "bar"], &mut session).1, "foo bar");
        // dashes after the first operand are printed
        assert_eq!(run::<Echo>(&["a", "-n", "-x"], &mut session).1, "a -n -x\n");
        assert_eq!(run::<Echo>(&[], &mut session).1, "\n");
        assert_eq!(run::<Echo>(&["-n", "-n", "x"], &mut session).1, "x");
    }

    #[test]
    fn test_cd_and_back() {
        let _guard = crate::serial_guard();
        let orig = stdenv::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = fs::canonicalize(dir.path()).unwrap();
        let mut session = Session::for_tests(&orig);

        let (code, _) = run::<Cd>(&[target.to_str().unwrap()], &mut session);
        assert_eq!(code, 0);
        assert_eq!(session.current_dir, target);

        let (code, out) = run::<Cd>(&["-"], &mut session);
        assert_eq!(code, 0);
        assert_eq!(out, format!("{}\n", orig.display()));
        assert_eq!(session.current_dir, orig);
        assert_eq!(session.previous_dir.as_deref(), Some(target.as_path()));

        stdenv::set_current_dir(orig).unwrap();
    }

    #[test]
    fn test_cd_without_previous_fails() {
        let _guard = crate::serial_guard();
        let orig = stdenv::current_dir().unwrap();
        let mut session = Session::for_tests(&orig);
        let (code, out) = run::<Cd>(&["-"], &mut session);
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_cd_home_is_start_directory() {
        let _guard = crate::serial_guard();
        let orig = stdenv::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(base.join("sub")).unwrap();
        let mut session = Session::for_tests(&base);

        assert_eq!(run::<Cd>(&["~/sub"], &mut session).0, 0);
        assert_eq!(session.current_dir, base.join("sub"));
        assert_eq!(run::<Cd>(&[], &mut session).0, 0);
        assert_eq!(session.current_dir, base);
        assert_eq!(run::<Cd>(&["sub"], &mut session).0, 0);
        assert_eq!(run::<Cd>(&["~"], &mut session).0, 0);
        assert_eq!(session.current_dir, base);

        stdenv::set_current_dir(orig).unwrap();
    }

    #[test]
    fn test_cd_rejects_two_targets() {
        let _guard = crate::serial_guard();
        let orig = stdenv::current_dir().unwrap();
        let mut session = Session::for_tests(&orig);
        assert_eq!(run::<Cd>(&["a", "b"], &mut session).0, 1);
        assert_eq!(session.current_dir, orig);
    }

    #[test]
    fn test_exit_sets_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::for_tests(dir.path());
        assert_eq!(run::<Exit>(&["3"], &mut session).0, 0);
        assert!(session.should_exit);
    }

    #[test]
    fn test_help_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::for_tests(dir.path());
        let (code, out) = run::<Ls>(&["--help"], &mut session);
        assert_eq!(code, 0);
        assert!(out.contains("Usage"));
        assert_eq!(run::<Ls>(&["--bogus"], &mut session).0, 1);
    }

    #[test]
    fn test_ls_sorted_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("a.txt"));
        touch(&dir.path().join(".hidden"));
        let mut session = Session::for_tests(dir.path());

        assert_eq!(run::<Ls>(&[], &mut session).1, "a.txt\nb.txt\n");
        assert_eq!(
            run::<Ls>(&["-a"], &mut session).1,
            ".\n..\n.hidden\na.txt\nb.txt\n"
        );
    }

    #[test]
    fn test_ls_long_format() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        fs::write(&file, vec![0u8; 1234]).unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();
        let mut session = Session::for_tests(dir.path());

        for flags in [["-la"], ["-al"]] {
            let (code, out) = run::<Ls>(&flags, &mut session);
            assert_eq!(code, 0);
            let lines: Vec<&str> = out.lines().collect();
            assert!(lines[0].starts_with("total "));
            let entry = lines.last().unwrap();
            assert!(entry.starts_with("-rw-r----- 1 "), "{entry}");
            assert!(entry.contains("    1234 "), "{entry}");
            assert!(entry.ends_with(" data.bin"), "{entry}");
            assert!(out.contains(" .\n"));
        }
    }

    #[test]
    fn test_ls_several_paths_get_headers() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("one")).unwrap();
        fs::create_dir(dir.path().join("two")).unwrap();
        touch(&dir.path().join("one/x"));
        let mut session = Session::for_tests(dir.path());

        let (code, out) = run::<Ls>(&["one", "two", "missing"], &mut session);
        assert_eq!(code, 1);
        assert_eq!(out, "one:\nx\n\ntwo:\n\nmissing:\n\n");
    }

    #[test]
    fn test_ls_tilde_means_start_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("f"));
        let mut session = Session::for_tests(dir.path());
        session.current_dir = PathBuf::from("/");
        assert_eq!(run::<Ls>(&["~"], &mut session).1, "f\n");
    }

    #[test]
    fn test_pinfo_of_self() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::for_tests(dir.path());
        let (code, out) = run::<Pinfo>(&[], &mut session);
        assert_eq!(code, 0);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], format!("pid -- {}", std::process::id()));
        assert!(lines[1].starts_with("Process Status -- {R") || lines[1].starts_with("Process Status -- {S"));
        assert!(lines[2].starts_with("memory -- ") && lines[2].ends_with(" {Virtual Memory}"));
        let exe = stdenv::current_exe().unwrap();
        assert_eq!(lines[3], format!("Executable Path -- {}", exe.display()));
    }

    #[test]
    fn test_pinfo_unknown_pid() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::for_tests(dir.path());
        assert_eq!(run::<Pinfo>(&["999999999"], &mut session).0, 1);
    }

    #[test]
    fn test_proc_parsing() {
        let status = "Name:\tcat\nState:\tS (sleeping)\nVmSize:\t    8200 kB\n";
        assert_eq!(status_field(status, "State").as_deref(), Some("S (sleeping)"));
        assert_eq!(status_field(status, "VmSize").as_deref(), Some("8200 kB"));
        assert_eq!(status_field(status, "VmRSS"), None);

        assert!(in_foreground_group("42 (my prog) S 1 42 42 34816 42 0"));
        assert!(!in_foreground_group("42 (my prog) S 1 42 42 34816 77 0"));
        assert!(!in_foreground_group("42 (x) S 1 42 42 0 -1 0"));
    }

    #[test]
    fn test_search_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        touch(&dir.path().join("a/b/c/needle"));
        let mut session = Session::for_tests(dir.path());

        assert_eq!(run::<Search>(&["needle"], &mut session), (0, "True\n".to_string()));
        assert_eq!(run::<Search>(&["hay"], &mut session), (1, "False\n".to_string()));

        session.config.search.max_depth = 2;
        assert_eq!(run::<Search>(&["needle"], &mut session).1, "False\n");
    }

    #[test]
    fn test_history_default_and_clamp() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::for_tests(dir.path());
        for i in 1..=15 {
            session.history.push(&format!("cmd {i}")).unwrap();
        }

        let (_, out) = run::<History>(&[], &mut session);
        let expected: String = (6..=15).map(|i| format!("cmd {i}\n")).collect();
        assert_eq!(out, expected);

        assert_eq!(run::<History>(&["2"], &mut session).1, "cmd 14\ncmd 15\n");
        assert_eq!(run::<History>(&["100"], &mut session).1.lines().count(), 15);
    }

    #[test]
    fn test_factory_ignores_other_names() {
        let factory = Factory::<Pwd>::default();
        assert!(factory.try_create("cd", &[]).is_none());
        assert_eq!(factory.kind(), BuiltinKind::Stateless);
        assert_eq!(Factory::<Cd>::default().kind(), BuiltinKind::StateMutating);
    }
}
