use anyhow::Context;
use argh::FromArgs;
use log::debug;
use minish::jobs::{self, Terminal};
use minish::{Config, Interpreter, Session, logging};
use std::path::PathBuf;

#[derive(FromArgs)]
/// A small interactive command interpreter.
struct Args {
    #[argh(option)]
    /// configuration file overriding the built-in defaults.
    config: Option<PathBuf>,

    #[argh(option, short = 'c')]
    /// execute one line and exit.
    command: Option<String>,

    #[argh(switch, short = 'v')]
    /// enable debug logging.
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref());
    logging::init(&config, args.verbose)?;

    // `-c` still launches into separate process groups, so a terminal is handed over too
    let terminal = Terminal::detect();
    jobs::install_signal_handlers(terminal.is_some()).context("cannot install signal handlers")?;
    debug!("terminal: {terminal:?}");

    let session = Session::new(config, terminal)?;
    let mut interpreter = Interpreter::new(session);
    match args.command {
        Some(line) => {
            interpreter.run_line(&line);
        }
        None => interpreter.repl().context("cannot read input")?,
    }
    Ok(())
}
