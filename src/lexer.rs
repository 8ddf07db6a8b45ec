//! Lexical analysis of one input line: statement and stage splitting, then
//! whitespace tokenization with quote handling.

use crate::error::ParseError;

/// A whitespace-delimited word with quotes resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Text with the quote characters removed.
    pub text: String,
    /// True when any part of the word was quoted. Quoted words are never operators.
    pub quoted: bool,
}

impl Token {
    /// Shorthand for an unquoted token.
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    /// True when the token is exactly `op` and was written without quotes.
    pub fn is_operator(&self, op: &str) -> bool {
        !self.quoted && self.text == op
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum QuoteState {
    #[default]
    Unquoted,
    Single,
    Double,
}

/// What a character means once the surrounding quotes are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    /// An opening or closing quote; dropped from the final text.
    Quote,
    /// Inside quotes: taken literally, whitespace included.
    Quoted(char),
    /// Outside quotes.
    Unquoted(char),
}

/// Quote state machine shared by the splitters and the tokenizer.
///
/// Double quotes toggle a literal mode. Single quotes do the same unless a double
/// quote already appeared in the current word, after which they are plain text.
#[derive(Debug, Default)]
struct QuoteTracker {
    state: QuoteState,
    seen_double: bool,
}

impl QuoteTracker {
    fn feed(&mut self, ch: char) -> CharClass {
        match self.state {
            QuoteState::Unquoted => match ch {
                '"' => {
                    self.state = QuoteState::Double;
                    self.seen_double = true;
                    CharClass::Quote
                }
                '\'' if !self.seen_double => {
                    self.state = QuoteState::Single;
                    CharClass::Quote
                }
                c => {
                    if c.is_whitespace() {
                        self.end_word();
                    }
                    CharClass::Unquoted(c)
                }
            },
            QuoteState::Double if ch == '"' => {
                self.state = QuoteState::Unquoted;
                CharClass::Quote
            }
            QuoteState::Single if ch == '\'' => {
                self.state = QuoteState::Unquoted;
                CharClass::Quote
            }
            _ => CharClass::Quoted(ch),
        }
    }

    fn end_word(&mut self) {
        self.seen_double = false;
    }

    fn is_open(&self) -> bool {
        self.state != QuoteState::Unquoted
    }
}

/// Split `line` on every unquoted `delimiter` and trim each piece.
///
/// Quote characters are kept in the pieces; only the tokenizer removes them.
/// A line without the delimiter yields exactly one piece, the trimmed line.
pub fn split_on(line: &str, delimiter: char) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut quotes = QuoteTracker::default();

    for ch in line.chars() {
        match quotes.feed(ch) {
            CharClass::Unquoted(c) if c == delimiter => {
                pieces.push(current.trim().to_string());
                current.clear();
                quotes.end_word();
            }
            _ => current.push(ch),
        }
    }
    pieces.push(current.trim().to_string());
    pieces
}

/// Break one pipeline stage into tokens.
///
/// Whitespace separates tokens unless quoted. Quote characters are stripped from the
/// token text; everything else is passed through verbatim.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut quotes = QuoteTracker::default();
    let mut text = String::new();
    let mut quoted = false;
    let mut in_token = false;

    for ch in line.chars() {
        match quotes.feed(ch) {
            CharClass::Quote => {
                in_token = true;
                quoted = true;
            }
            CharClass::Quoted(c) => text.push(c),
            CharClass::Unquoted(c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(Token {
                        text: std::mem::take(&mut text),
                        quoted,
                    });
                    quoted = false;
                    in_token = false;
                }
            }
            CharClass::Unquoted(c) => {
                in_token = true;
                text.push(c);
            }
        }
    }

    if quotes.is_open() {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(Token { text, quoted });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &str) -> Vec<String> {
        tokenize(line).unwrap().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn split_without_delimiter_returns_trimmed_line() {
        for line in ["  ls -la  ", "echo hi", "", "   "] {
            assert_eq!(split_on(line, ';'), vec![line.trim().to_string()]);
            assert_eq!(split_on(line, '|'), vec![line.trim().to_string()]);
        }
    }

    #[test]
    fn split_on_semicolons_and_pipes() {
        assert_eq!(split_on("cd /tmp ; ls", ';'), vec!["cd /tmp", "ls"]);
        assert_eq!(
            split_on("printf x|grep b |  wc -l", '|'),
            vec!["printf x", "grep b", "wc -l"]
        );
        assert_eq!(split_on(";;", ';'), vec!["", "", ""]);
    }

    #[test]
    fn split_ignores_quoted_delimiters() {
        assert_eq!(
            split_on("echo \"a;b\" ; echo 'c|d'", ';'),
            vec!["echo \"a;b\"", "echo 'c|d'"]
        );
        assert_eq!(split_on("echo 'c|d' | cat", '|'), vec!["echo 'c|d'", "cat"]);
    }

    #[test]
    fn tokenize_plain_words() {
        assert_eq!(texts("ls   -la\t/tmp"), vec!["ls", "-la", "/tmp"]);
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn double_quotes_keep_whitespace_and_are_stripped() {
        let tokens = tokenize(r#"ls -la "my dir" > out.txt"#).unwrap();
        assert_eq!(tokens[2], Token { text: "my dir".into(), quoted: true });
        assert!(tokens[3].is_operator(">"));
    }

    #[test]
    fn single_quotes_are_stripped_outside_double_quotes() {
        assert_eq!(texts("echo 'hello  world'"), vec!["echo", "hello  world"]);
        assert_eq!(texts("echo ab'c'd"), vec!["echo", "abcd"]);
    }

    #[test]
    fn single_quote_after_double_quote_is_literal() {
        assert_eq!(texts(r#"echo "it's""#), vec!["echo", "it's"]);
        assert_eq!(texts(r#"echo "it"'s"#), vec!["echo", "it's"]);
        // a new word forgets the double quote
        assert_eq!(texts(r#"echo "a" 'b c'"#), vec!["echo", "a", "b c"]);
    }

    #[test]
    fn quoted_operator_is_not_an_operator() {
        let tokens = tokenize(r#"echo ">" '<'"#).unwrap();
        assert!(!tokens[1].is_operator(">"));
        assert!(!tokens[2].is_operator("<"));
    }

    #[test]
    fn empty_quotes_make_an_empty_argument() {
        assert_eq!(texts(r#"printf "" x"#), vec!["printf", "", "x"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(tokenize("echo \"abc"), Err(ParseError::UnterminatedQuote));
        assert_eq!(tokenize("echo 'abc"), Err(ParseError::UnterminatedQuote));
    }
}
