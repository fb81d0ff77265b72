//! Tokenizer for HiveLang source text.
//!
//! Lexing never fails: characters the lexer does not understand are emitted as
//! [`TokenKind::Unknown`] tokens and left for the parser to report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a token inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column (in characters).
    pub column: usize,
    /// Byte offset from the start of the source.
    pub offset: usize,
}

impl Position {
    /// Construct a position from its components.
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Line-leading `@name`; the value holds the name without the `@`.
    Directive,
    /// Bare word. Keywords are identifiers too; the parser gives them meaning.
    Identifier,
    /// Double-quoted string; the value holds the unescaped contents.
    String,
    /// Integer or decimal literal.
    Number,
    /// Punctuation: `( ) , : . = + == !=`.
    Symbol,
    /// Statement separator.
    Newline,
    /// Anything the lexer could not classify.
    Unknown,
    /// End of input. Always the last token.
    Eof,
}

/// A single lexed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token classification.
    pub kind: TokenKind,
    /// Token text (unescaped for strings, name-only for directives).
    pub value: String,
    /// Where the token starts.
    pub position: Position,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            value: value.into(),
            position,
        }
    }

    /// Whether this token is the given symbol.
    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.value == symbol
    }

    /// Whether this token is the given bare word.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.value == word
    }
}

/// Tokenize HiveLang source text.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
    line: usize,
    column: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            index: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(ch) = self.current() {
            let start = self.position();
            match ch {
                '\n' => {
                    self.advance();
                    self.push(TokenKind::Newline, "\n", start);
                    self.at_line_start = true;
                    continue;
                }
                '\r' | ' ' | '\t' => {
                    self.advance();
                    continue;
                }
                '#' => self.skip_comment(),
                '/' if self.peek() == Some('/') => self.skip_comment(),
                '@' if self.at_line_start => self.lex_directive(start),
                '"' => self.lex_string(start),
                c if c.is_ascii_digit() => self.lex_number(start),
                '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.lex_number(start),
                c if is_ident_start(c) => self.lex_identifier(start),
                '=' | '!' if self.peek() == Some('=') => {
                    self.advance();
                    self.advance();
                    let text = if ch == '=' { "==" } else { "!=" };
                    self.push(TokenKind::Symbol, text, start);
                }
                '(' | ')' | ',' | ':' | '.' | '=' | '+' => {
                    self.advance();
                    self.push(TokenKind::Symbol, ch.to_string(), start);
                }
                other => {
                    self.advance();
                    self.push(TokenKind::Unknown, other.to_string(), start);
                }
            }
            self.at_line_start = false;
        }

        let end = self.position();
        self.push(TokenKind::Eof, "", end);
        self.tokens
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.index).map(|(_, c)| *c)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index + 1).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.src.len())
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.offset())
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current() {
            self.index += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>, position: Position) {
        self.tokens.push(Token::new(kind, value, position));
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn lex_directive(&mut self, start: Position) {
        self.advance(); // '@'
        let name = self.take_while(is_ident_continue);
        if name.is_empty() {
            self.push(TokenKind::Unknown, "@", start);
        } else {
            self.push(TokenKind::Directive, name, start);
        }
    }

    fn lex_string(&mut self, start: Position) {
        self.advance(); // opening quote
        let mut buf = String::new();
        while let Some(ch) = self.current() {
            match ch {
                '"' => {
                    self.advance();
                    self.push(TokenKind::String, buf, start);
                    return;
                }
                '\n' => break,
                '\\' => {
                    self.advance();
                    match self.current() {
                        Some('"') => buf.push('"'),
                        Some('\\') => buf.push('\\'),
                        Some('n') => buf.push('\n'),
                        Some('t') => buf.push('\t'),
                        Some('r') => buf.push('\r'),
                        Some('\n') | None => break,
                        Some(other) => {
                            buf.push('\\');
                            buf.push(other);
                        }
                    }
                    self.advance();
                }
                other => {
                    buf.push(other);
                    self.advance();
                }
            }
        }
        // Unterminated literal: keep the raw text for the diagnostic.
        let raw = &self.src[start.offset..self.offset()];
        self.push(TokenKind::Unknown, raw, start);
    }

    fn lex_number(&mut self, start: Position) {
        let begin = self.offset();
        if self.current() == Some('-') {
            self.advance();
        }
        self.take_while(|c| c.is_ascii_digit());
        if self.current() == Some('.') && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }
        let text = self.src[begin..self.offset()].to_string();
        self.push(TokenKind::Number, text, start);
    }

    fn lex_identifier(&mut self, start: Position) {
        let word = self.take_while(is_ident_continue);
        self.push(TokenKind::Identifier, word, start);
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let begin = self.offset();
        while let Some(ch) = self.current() {
            if predicate(ch) {
                self.advance();
            } else {
                break;
            }
        }
        self.src[begin..self.offset()].to_string()
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_directives_and_newlines() {
        let tokens = tokenize("@bot Greeter\n@capability greet\n");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Directive,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Directive,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[0].value, "bot");
        assert_eq!(tokens[1].value, "Greeter");
        assert_eq!(tokens[3].position.line, 2);
    }

    #[test]
    fn lexes_call_statement() {
        let tokens = tokenize("call slack.send(text: \"hi\", n: 2) as sent");
        let values: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(
            values,
            vec![
                "call", "slack", ".", "send", "(", "text", ":", "hi", ",", "n", ":", "2", ")",
                "as", "sent", ""
            ]
        );
        assert_eq!(tokens[7].kind, TokenKind::String);
        assert_eq!(tokens[11].kind, TokenKind::Number);
    }

    #[test]
    fn unescapes_embedded_quotes() {
        let tokens = tokenize(r#"say "she said \"hi\"\n""#);
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].value, "she said \"hi\"\n");
    }

    #[test]
    fn unterminated_string_is_unknown() {
        let tokens = tokenize("say \"oops\nsay \"ok\"");
        assert_eq!(tokens[1].kind, TokenKind::Unknown);
        assert_eq!(tokens[1].value, "\"oops");
        assert_eq!(tokens[4].kind, TokenKind::String);
    }

    #[test]
    fn unknown_characters_do_not_abort() {
        let tokens = tokenize("say $ 1 ~");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier,
                TokenKind::Unknown,
                TokenKind::Number,
                TokenKind::Unknown,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn non_leading_at_is_unknown() {
        let tokens = tokenize("say @bot");
        assert_eq!(tokens[1].kind, TokenKind::Unknown);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn indented_directive_is_still_line_leading() {
        let tokens = tokenize("   @trigger on_message");
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].position.column, 4);
    }

    #[test]
    fn comments_and_comparison_operators() {
        let tokens = tokenize("if a == 1 # note\n// whole line\nb != -2.5");
        let values: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Newline)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(values, vec!["if", "a", "==", "1", "b", "!=", "-2.5", ""]);
    }
}
