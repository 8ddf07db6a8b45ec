use crate::command::{Command, OutputMode, Pipeline, StatementList};
use crate::error::ParseError;
use crate::lexer::{self, Token};

/// Kind of redirection
///
/// Defines the specific operation mode for an I/O redirection (`<`, `>`, `>>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): Reads standard input from a specified file.
    Input,
    /// Output redirection (`>`): Writes standard output to a file, **overwriting** the file if it exists.
    Output,
    /// Output redirection with append (`>>`): Writes standard output to a file, **appending** to the file if it exists.
    Append,
}

impl RedirectKind {
    fn of(token: &Token) -> Option<Self> {
        if token.quoted {
            return None;
        }
        match token.text.as_str() {
            "<" => Some(RedirectKind::Input),
            ">" => Some(RedirectKind::Output),
            ">>" => Some(RedirectKind::Append),
            _ => None,
        }
    }
}

/// Pull the redirection operators out of one stage's tokens.
///
/// Operators may appear anywhere; each consumes the next token as its file name.
/// The remaining tokens keep their relative order and become `argv`. When the same
/// stream is redirected twice the last operator wins.
pub fn resolve(tokens: Vec<Token>) -> Result<Command, ParseError> {
    let mut command = Command::new(Vec::<String>::new());
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        let Some(kind) = RedirectKind::of(&token) else {
            command.argv.push(token.text);
            continue;
        };

        let target = match tokens.next() {
            Some(next) if RedirectKind::of(&next).is_none() => next.text,
            _ => return Err(ParseError::MissingRedirectTarget(token.text)),
        };

        match kind {
            RedirectKind::Input => command.input_path = Some(target),
            RedirectKind::Output => {
                command.output_path = Some(target);
                command.output_mode = OutputMode::Truncate;
            }
            RedirectKind::Append => {
                command.output_path = Some(target);
                command.output_mode = OutputMode::Append;
            }
        }
    }

    if command.argv.is_empty() {
        return Err(ParseError::EmptyCommand);
    }
    Ok(command)
}

/// Parse one pipeline (the text between two `;`).
///
/// Returns `Ok(None)` for a blank statement.
fn parse_pipeline(text: &str) -> Result<Option<Pipeline>, ParseError> {
    if text.is_empty() {
        return Ok(None);
    }

    let pieces = lexer::split_on(text, '|');
    let last = pieces.len() - 1;
    let mut stages = Vec::with_capacity(pieces.len());

    for (i, piece) in pieces.iter().enumerate() {
        let mut tokens = lexer::tokenize(piece)?;

        let background = i == last && tokens.last().is_some_and(|t| t.is_operator("&"));
        if background {
            tokens.pop();
        }

        match resolve(tokens) {
            Ok(mut command) => {
                command.background = background;
                stages.push(command);
            }
            Err(ParseError::EmptyCommand) if last > 0 => {
                return Err(ParseError::EmptyPipelineStage);
            }
            Err(ParseError::EmptyCommand) => return Ok(None),
            Err(e) => return Err(e),
        }
    }

    Ok(Some(Pipeline {
        stages,
        text: text.to_string(),
    }))
}

/// Turn a raw input line into the list of pipelines to run.
///
/// Blank statements (`;;`, whitespace, a lone `&`) are dropped, so a line made only
/// of separators yields an empty list. Any syntax error rejects the whole line.
pub fn parse_line(line: &str) -> Result<StatementList, ParseError> {
    let mut statements = Vec::new();
    for text in lexer::split_on(line, ';') {
        if let Some(pipeline) = parse_pipeline(&text)? {
            statements.push(pipeline);
        }
    }
    Ok(statements)
}
