use crate::command::{Command, OutputMode};
use crate::error::ShellError;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Permission bits of a newly created redirection target (`rw-r--r--`).
pub const REDIRECT_FILE_MODE: u32 = 0o644;

/// Open the target of `<`.
pub fn open_input(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Open the target of `>` or `>>`, creating it with [`REDIRECT_FILE_MODE`].
pub fn open_output(path: &Path, mode: OutputMode) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(REDIRECT_FILE_MODE);
    match mode {
        OutputMode::Truncate => options.truncate(true),
        OutputMode::Append => options.append(true),
    };
    options.open(path)
}

/// Where an in-process built-in writes: the terminal or its own `>`/`>>` file.
pub enum OutputSink {
    Stdout(io::Stdout),
    File(File),
}

impl OutputSink {
    /// Open the sink for `command`, validating its `<` target on the way.
    ///
    /// Built-ins never read standard input, so the input file is only checked.
    pub fn for_command(command: &Command) -> Result<Self, ShellError> {
        if let Some(path) = &command.input_path {
            open_input(Path::new(path)).map_err(|source| ShellError::Redirection {
                path: path.clone(),
                source,
            })?;
        }
        match &command.output_path {
            Some(path) => open_output(Path::new(path), command.output_mode)
                .map(OutputSink::File)
                .map_err(|source| ShellError::Redirection {
                    path: path.clone(),
                    source,
                }),
            None => Ok(OutputSink::Stdout(io::stdout())),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(out) => out.write(data),
            OutputSink::File(file) => file.write(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(out) => out.flush(),
            OutputSink::File(file) => file.flush(),
        }
    }
}
