use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

use super::ast::{Argument, Condition, Expr, Program, Statement, StatementKind, Surface, TriggerBlock};
use super::lexer::{Position, Token, TokenKind, tokenize};

/// Parsing stops once this many errors have been collected.
const MAX_ERRORS: usize = 64;

/// Deepest allowed nesting of `not`, parentheses and `if` blocks.
const MAX_DEPTH: usize = 64;

/// Words with grammatical meaning; they cannot be used as variable names.
const RESERVED: &[&str] = &[
    "bot", "on", "call", "say", "as", "end", "if", "else", "set", "respond", "with", "not",
    "contains", "true", "false", "null",
];

/// A structural problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: {message}")]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// Where the problem was detected.
    pub position: Position,
}

impl ParseError {
    fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Tokenize and parse HiveLang source text.
pub fn parse_source(source: &str) -> Result<Program, Vec<ParseError>> {
    parse(&tokenize(source))
}

/// Parse a token stream into a [`Program`], collecting every error found.
pub fn parse(tokens: &[Token]) -> Result<Program, Vec<ParseError>> {
    let mut parser = Parser::new(tokens);
    parser.parse_program();
    parser.finish()
}

/// How a statement sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    End,
    Else,
    Directive,
    Eof,
}

#[derive(Default)]
struct Header {
    bot_name: Option<String>,
    description: Option<String>,
    model: Option<String>,
    capabilities: Vec<String>,
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    errors: Vec<ParseError>,
    header: Header,
    triggers: Vec<TriggerBlock>,
    surface: Surface,
    depth: usize,
    eof: Token,
}

type ParseResult<T> = std::result::Result<T, ParseError>;

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let end = tokens.last().map(|t| t.position).unwrap_or_default();
        Self {
            tokens,
            index: 0,
            errors: Vec::new(),
            header: Header::default(),
            triggers: Vec::new(),
            surface: Surface::Directive,
            depth: 0,
            eof: Token {
                kind: TokenKind::Eof,
                value: String::new(),
                position: end,
            },
        }
    }

    fn finish(mut self) -> Result<Program, Vec<ParseError>> {
        if self.errors.is_empty() {
            if self.header.bot_name.is_none() {
                let position = self.tokens.first().map(|t| t.position).unwrap_or_default();
                self.errors
                    .push(ParseError::new("missing `@bot` directive", position));
            }
            if self.triggers.is_empty() {
                let position = self.eof.position;
                self.errors
                    .push(ParseError::new("program declares no trigger", position));
            }
        }
        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        Ok(Program {
            bot_name: self.header.bot_name.unwrap_or_default(),
            description: self.header.description,
            model: self.header.model,
            capabilities: self.header.capabilities,
            triggers: self.triggers,
            surface: self.surface,
        })
    }

    // ----- token cursor -------------------------------------------------

    fn current(&self) -> &Token {
        self.tokens.get(self.index).unwrap_or(&self.eof)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.index + 1).unwrap_or(&self.eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn gave_up(&self) -> bool {
        self.errors.len() >= MAX_ERRORS
    }

    fn skip_newlines(&mut self) {
        while self.current().kind == TokenKind::Newline {
            self.advance();
        }
    }

    /// Error recovery: drop everything up to and including the next newline.
    fn skip_line(&mut self) {
        while !self.at_eof() {
            if self.advance().kind == TokenKind::Newline {
                break;
            }
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current().position)
    }

    fn record(&mut self, error: ParseError) {
        self.errors.push(error);
        self.skip_line();
    }

    /// Run `parse` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested<T>(
        &mut self,
        what: &str,
        position: Position,
        parse: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                format!("{} nested too deeply (limit {})", what, MAX_DEPTH),
                position,
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect_line_end(&mut self) -> ParseResult<()> {
        match self.current().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.error_here(format!(
                "unexpected {} at end of statement",
                describe(self.current())
            ))),
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> ParseResult<()> {
        if self.current().is_symbol(symbol) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected `{}`, found {}",
                symbol,
                describe(self.current())
            )))
        }
    }

    fn expect_word(&mut self, word: &str) -> ParseResult<()> {
        if self.current().is_word(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected `{}`, found {}",
                word,
                describe(self.current())
            )))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        let token = self.current();
        if token.kind == TokenKind::Identifier && !RESERVED.contains(&token.value.as_str()) {
            Ok(self.advance().value)
        } else {
            Err(self.error_here(format!("expected {}, found {}", what, describe(token))))
        }
    }

    /// `a.b.c`, used for tool and capability names.
    fn expect_dotted_name(&mut self, what: &str) -> ParseResult<String> {
        let mut name = self.expect_identifier(what)?;
        while self.current().is_symbol(".") && self.peek().kind == TokenKind::Identifier {
            self.advance();
            name.push('.');
            name.push_str(&self.advance().value);
        }
        Ok(name)
    }

    /// Identifier or string literal (bot names, model names).
    fn expect_name(&mut self, what: &str) -> ParseResult<String> {
        match self.current().kind {
            TokenKind::String => Ok(self.advance().value),
            TokenKind::Identifier => self.expect_dotted_name(what),
            _ => Err(self.error_here(format!(
                "expected {}, found {}",
                what,
                describe(self.current())
            ))),
        }
    }

    fn expect_string(&mut self, what: &str) -> ParseResult<String> {
        if self.current().kind == TokenKind::String {
            Ok(self.advance().value)
        } else {
            Err(self.error_here(format!(
                "expected {} string, found {}",
                what,
                describe(self.current())
            )))
        }
    }

    // ----- top level ----------------------------------------------------

    fn parse_program(&mut self) {
        loop {
            self.skip_newlines();
            if self.at_eof() || self.gave_up() {
                break;
            }
            let token = self.current().clone();
            match token.kind {
                TokenKind::Directive => self.parse_directive(),
                TokenKind::Identifier if token.value == "bot" => self.parse_block_bot(),
                TokenKind::Identifier if token.value == "end" => {
                    self.record(ParseError::new("unmatched `end`", token.position));
                }
                _ => {
                    self.record(ParseError::new(
                        format!("expected a directive, found {}", describe(&token)),
                        token.position,
                    ));
                }
            }
        }
    }

    fn parse_directive(&mut self) {
        let directive = self.advance();
        let result = match directive.value.as_str() {
            "bot" => self.parse_bot_directive(&directive),
            "description" => self.expect_string("description").and_then(|text| {
                set_once(
                    &mut self.header.description,
                    text,
                    "@description",
                    directive.position,
                )
            }),
            "model" => self.expect_name("model name").and_then(|name| {
                set_once(&mut self.header.model, name, "@model", directive.position)
            }),
            "capability" => self.expect_dotted_name("capability name").map(|name| {
                self.header.capabilities.push(name);
            }),
            "trigger" => {
                self.parse_directive_trigger(&directive);
                return;
            }
            other => Err(ParseError::new(
                format!("unknown directive `@{}`", other),
                directive.position,
            )),
        };

        match result.and_then(|_| self.expect_line_end()) {
            Ok(()) => {}
            Err(error) => self.record(error),
        }
    }

    fn parse_bot_directive(&mut self, directive: &Token) -> ParseResult<()> {
        let name = self.expect_name("bot name")?;
        set_once(&mut self.header.bot_name, name, "@bot", directive.position)
    }

    fn parse_directive_trigger(&mut self, directive: &Token) {
        let event = match self
            .expect_identifier("trigger event")
            .and_then(|event| self.expect_line_end().map(|_| event))
        {
            Ok(event) => event,
            Err(error) => {
                self.record(error);
                return;
            }
        };
        let statements = self.parse_trigger_body(false, "@trigger");
        self.triggers.push(TriggerBlock {
            event,
            statements,
            position: directive.position,
        });
    }

    /// Statements of a trigger. With `require_end` the block must close with
    /// `end`; otherwise a directive or end of input also closes it.
    fn parse_trigger_body(&mut self, require_end: bool, opener: &str) -> Vec<Statement> {
        let mut statements = Vec::new();
        loop {
            let (mut block, end) = self.parse_block();
            statements.append(&mut block);
            match end {
                BlockEnd::End => {
                    self.advance();
                    if let Err(error) = self.expect_line_end() {
                        self.record(error);
                    }
                    break;
                }
                BlockEnd::Else => {
                    let error = self.error_here("`else` without `if`");
                    self.record(error);
                }
                BlockEnd::Directive if !require_end => break,
                BlockEnd::Directive => {
                    let error = self.error_here(format!("directive inside `{}` block", opener));
                    self.record(error);
                }
                BlockEnd::Eof if !require_end => break,
                BlockEnd::Eof => {
                    let error = self.error_here(format!("unterminated `{}` block", opener));
                    self.errors.push(error);
                    break;
                }
            }
            if self.gave_up() {
                break;
            }
        }
        statements
    }

    fn parse_block_bot(&mut self) {
        let opener = self.advance();
        self.surface = Surface::Block;
        let header = self
            .expect_name("bot name")
            .and_then(|name| set_once(&mut self.header.bot_name, name, "bot", opener.position))
            .and_then(|_| self.expect_line_end());
        if let Err(error) = header {
            self.record(error);
        }

        loop {
            self.skip_newlines();
            if self.gave_up() {
                return;
            }
            let token = self.current().clone();
            let result = match token.kind {
                TokenKind::Eof => {
                    self.errors.push(ParseError::new(
                        "unterminated `bot` block",
                        token.position,
                    ));
                    return;
                }
                TokenKind::Identifier => match token.value.as_str() {
                    "end" => {
                        self.advance();
                        if let Err(error) = self.expect_line_end() {
                            self.record(error);
                        }
                        return;
                    }
                    "description" => {
                        self.advance();
                        self.expect_string("description").and_then(|text| {
                            set_once(
                                &mut self.header.description,
                                text,
                                "description",
                                token.position,
                            )
                        })
                    }
                    "model" => {
                        self.advance();
                        self.expect_name("model name").and_then(|name| {
                            set_once(&mut self.header.model, name, "model", token.position)
                        })
                    }
                    "capability" => {
                        self.advance();
                        self.expect_dotted_name("capability name")
                            .map(|name| self.header.capabilities.push(name))
                    }
                    "on" => {
                        self.advance();
                        match self
                            .expect_identifier("trigger event")
                            .and_then(|event| self.expect_line_end().map(|_| event))
                        {
                            Ok(event) => {
                                let statements = self.parse_trigger_body(true, "on");
                                self.triggers.push(TriggerBlock {
                                    event,
                                    statements,
                                    position: token.position,
                                });
                            }
                            Err(error) => self.record(error),
                        }
                        continue;
                    }
                    _ => Err(ParseError::new(
                        format!("unexpected {} in `bot` block", describe(&token)),
                        token.position,
                    )),
                },
                _ => Err(ParseError::new(
                    format!("unexpected {} in `bot` block", describe(&token)),
                    token.position,
                )),
            };

            if let Err(error) = result.and_then(|_| self.expect_line_end()) {
                self.record(error);
            }
        }
    }

    // ----- statements ---------------------------------------------------

    fn parse_block(&mut self) -> (Vec<Statement>, BlockEnd) {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.gave_up() {
                return (statements, BlockEnd::Eof);
            }
            let token = self.current();
            let end = match token.kind {
                TokenKind::Eof => Some(BlockEnd::Eof),
                TokenKind::Directive => Some(BlockEnd::Directive),
                TokenKind::Identifier if token.value == "end" => Some(BlockEnd::End),
                TokenKind::Identifier if token.value == "else" => Some(BlockEnd::Else),
                _ => None,
            };
            if let Some(end) = end {
                return (statements, end);
            }

            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                // A directive opens the next trigger; leave it for the caller.
                Err(error) if self.current().kind == TokenKind::Directive => {
                    self.errors.push(error)
                }
                Err(error) => self.record(error),
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let token = self.current().clone();
        let position = token.position;
        if token.kind == TokenKind::Unknown {
            return Err(ParseError::new(
                format!("unexpected character `{}`", token.value),
                position,
            ));
        }
        if token.kind != TokenKind::Identifier {
            return Err(ParseError::new(
                format!("expected a statement, found {}", describe(&token)),
                position,
            ));
        }

        let kind = match token.value.as_str() {
            "say" => {
                self.advance();
                let text = self.parse_expr()?;
                self.expect_line_end()?;
                StatementKind::Say { text }
            }
            "call" => {
                self.advance();
                let kind = self.parse_call()?;
                self.expect_line_end()?;
                kind
            }
            "respond" => {
                self.advance();
                self.parse_respond()?
            }
            "set" => {
                self.advance();
                let name = self.expect_identifier("binding name")?;
                self.expect_symbol("=")?;
                let value = self.parse_expr()?;
                self.expect_line_end()?;
                StatementKind::Assign { name, value }
            }
            "if" => {
                self.advance();
                self.nested("`if` block", position, |parser| {
                    parser.parse_conditional(position)
                })?
            }
            other => {
                return Err(ParseError::new(
                    format!("unknown statement `{}`", other),
                    position,
                ));
            }
        };

        Ok(Statement { kind, position })
    }

    fn parse_call(&mut self) -> ParseResult<StatementKind> {
        let tool = self.expect_dotted_name("tool name")?;
        self.expect_symbol("(")?;
        let mut args = Vec::new();
        self.skip_newlines();
        if self.current().is_symbol(")") {
            self.advance();
        } else {
            loop {
                self.skip_newlines();
                args.push(self.parse_argument()?);
                self.skip_newlines();
                if self.current().is_symbol(",") {
                    self.advance();
                    continue;
                }
                self.expect_symbol(")")?;
                break;
            }
        }

        let binding = if self.current().is_word("as") {
            self.advance();
            Some(self.expect_identifier("binding name")?)
        } else {
            None
        };

        Ok(StatementKind::Call {
            tool,
            args,
            binding,
            reply: false,
        })
    }

    fn parse_argument(&mut self) -> ParseResult<Argument> {
        let position = self.current().position;
        let name = self.expect_identifier("argument name")?;
        self.expect_symbol(":")?;
        let value = self.parse_expr()?;
        Ok(Argument {
            name,
            value,
            position,
        })
    }

    /// `respond with ai` followed by indented `key: expr` option lines.
    fn parse_respond(&mut self) -> ParseResult<StatementKind> {
        self.expect_word("with")?;
        let target = self.expect_identifier("responder name")?;
        self.expect_line_end()?;

        let mut args = Vec::new();
        loop {
            let checkpoint = self.index;
            self.skip_newlines();
            let is_option = self.current().kind == TokenKind::Identifier
                && !RESERVED.contains(&self.current().value.as_str())
                && self.peek().is_symbol(":");
            if !is_option {
                self.index = checkpoint;
                break;
            }
            args.push(self.parse_argument()?);
            self.expect_line_end()?;
        }

        Ok(StatementKind::Call {
            tool: format!("{}.respond", target),
            args,
            binding: None,
            reply: true,
        })
    }

    fn parse_conditional(&mut self, position: Position) -> ParseResult<StatementKind> {
        let condition = self.parse_condition()?;
        self.expect_line_end()?;

        let (then_block, end) = self.parse_block();
        let else_block = match end {
            BlockEnd::Else => {
                self.advance();
                self.expect_line_end()?;
                let (block, end) = self.parse_block();
                self.close_if(end, position)?;
                Some(block)
            }
            other => {
                self.close_if(other, position)?;
                None
            }
        };

        Ok(StatementKind::Conditional {
            condition,
            then_block,
            else_block,
        })
    }

    fn close_if(&mut self, end: BlockEnd, opened: Position) -> ParseResult<()> {
        match end {
            BlockEnd::End => {
                self.advance();
                self.expect_line_end()
            }
            BlockEnd::Else => Err(self.error_here("duplicate `else` in `if` block")),
            BlockEnd::Directive | BlockEnd::Eof => Err(ParseError::new(
                format!("unterminated `if` block opened at {}", opened),
                self.current().position,
            )),
        }
    }

    // ----- expressions --------------------------------------------------

    fn parse_condition(&mut self) -> ParseResult<Condition> {
        if self.current().is_word("not") {
            let position = self.advance().position;
            let inner = self.nested("expression", position, Self::parse_condition)?;
            return Ok(Condition::Not {
                inner: Box::new(inner),
            });
        }

        let left = self.parse_expr()?;
        let current = self.current();
        if current.is_symbol("==") {
            self.advance();
            let right = self.parse_expr()?;
            Ok(Condition::Equals { left, right })
        } else if current.is_symbol("!=") {
            self.advance();
            let right = self.parse_expr()?;
            Ok(Condition::NotEquals { left, right })
        } else if current.is_word("contains") {
            self.advance();
            let right = self.parse_expr()?;
            Ok(Condition::Contains { left, right })
        } else {
            Ok(Condition::Truthy { expr: left })
        }
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let mut parts = vec![self.parse_postfix()?];
        while self.current().is_symbol("+") {
            self.advance();
            parts.push(self.parse_postfix()?);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(Expr::Concat(parts))
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.current().is_symbol(".") {
            self.advance();
            let field = self.current();
            if field.kind != TokenKind::Identifier && field.kind != TokenKind::Number {
                return Err(self.error_here(format!(
                    "expected field name after `.`, found {}",
                    describe(field)
                )));
            }
            let field = self.advance().value;
            expr = Expr::Field {
                base: Box::new(expr),
                field,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::String => {
                self.advance();
                Ok(Expr::Literal(Value::String(token.value)))
            }
            TokenKind::Number => {
                self.advance();
                parse_number(&token.value)
                    .map(Expr::Literal)
                    .ok_or_else(|| ParseError::new("invalid number literal", token.position))
            }
            TokenKind::Identifier => match token.value.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Bool(true)))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Bool(false)))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Null))
                }
                _ => Ok(Expr::Variable(self.expect_identifier("expression")?)),
            },
            TokenKind::Symbol if token.value == "(" => {
                self.advance();
                self.nested("expression", token.position, |parser| {
                    let inner = parser.parse_expr()?;
                    parser.expect_symbol(")")?;
                    Ok(inner)
                })
            }
            _ => Err(ParseError::new(
                format!("expected an expression, found {}", describe(&token)),
                token.position,
            )),
        }
    }
}

fn set_once(
    slot: &mut Option<String>,
    value: String,
    directive: &str,
    position: Position,
) -> ParseResult<()> {
    if slot.is_some() {
        return Err(ParseError::new(
            format!("duplicate `{}` directive", directive),
            position,
        ));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn describe(token: &Token) -> impl fmt::Display + '_ {
    struct Describe<'t>(&'t Token);
    impl fmt::Display for Describe<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.0.kind {
                TokenKind::Eof => write!(f, "end of input"),
                TokenKind::Newline => write!(f, "end of line"),
                TokenKind::String => write!(f, "string \"{}\"", self.0.value),
                TokenKind::Directive => write!(f, "directive `@{}`", self.0.value),
                _ => write!(f, "`{}`", self.0.value),
            }
        }
    }
    Describe(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse_source(src).expect("parse")
    }

    fn parse_err(src: &str) -> Vec<ParseError> {
        parse_source(src).expect_err("expected parse errors")
    }

    #[test]
    fn parses_directive_program() {
        let src = "@bot Greeter\n@description \"Says hello\"\n@model \"gpt-4o\"\n@capability greet\n@capability slack.post\n@trigger on_message\n  say \"hi \" + input\nend\n";
        let program = parse_ok(src);
        assert_eq!(program.bot_name, "Greeter");
        assert_eq!(program.description.as_deref(), Some("Says hello"));
        assert_eq!(program.model.as_deref(), Some("gpt-4o"));
        assert_eq!(program.capabilities, vec!["greet", "slack.post"]);
        assert_eq!(program.surface, Surface::Directive);
        assert_eq!(program.triggers.len(), 1);
        let trigger = &program.triggers[0];
        assert_eq!(trigger.event, "on_message");
        assert_eq!(
            trigger.statements[0].kind,
            StatementKind::Say {
                text: Expr::Concat(vec![
                    Expr::Literal(Value::String("hi ".into())),
                    Expr::Variable("input".into()),
                ])
            }
        );
    }

    #[test]
    fn trigger_without_end_closes_at_next_directive() {
        let src = "@bot B\n@trigger a\nsay \"1\"\n@trigger b\nsay \"2\"\n";
        let program = parse_ok(src);
        assert_eq!(program.triggers.len(), 2);
        assert_eq!(program.triggers[1].event, "b");
        assert_eq!(program.triggers[1].statements.len(), 1);
    }

    #[test]
    fn parses_call_with_named_arguments_and_binding() {
        let src = "@bot B\n@trigger on_message\ncall slack.sendMessage(channel: \"#general\", text: reply.body) as sent\n";
        let program = parse_ok(src);
        match &program.triggers[0].statements[0].kind {
            StatementKind::Call {
                tool,
                args,
                binding,
                reply,
            } => {
                assert_eq!(tool, "slack.sendMessage");
                assert_eq!(args.len(), 2);
                assert_eq!(args[0].name, "channel");
                assert_eq!(
                    args[1].value,
                    Expr::Field {
                        base: Box::new(Expr::Variable("reply".into())),
                        field: "body".into(),
                    }
                );
                assert_eq!(binding.as_deref(), Some("sent"));
                assert!(!reply);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn parses_multiline_argument_list() {
        let src = "@bot B\n@trigger t\ncall a.b(\n  x: 1,\n  y: 2.5\n)\n";
        let program = parse_ok(src);
        match &program.triggers[0].statements[0].kind {
            StatementKind::Call { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn parses_respond_with_options() {
        let src = "@bot Greeter\n@capability greet\n@trigger on_message\n  respond with ai\n    context: \"hi\"\n";
        let program = parse_ok(src);
        let statements = &program.triggers[0].statements;
        assert_eq!(statements.len(), 1);
        match &statements[0].kind {
            StatementKind::Call {
                tool, args, reply, ..
            } => {
                assert_eq!(tool, "ai.respond");
                assert_eq!(args[0].name, "context");
                assert!(reply);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn parses_nested_conditionals() {
        let src = "@bot B\n@trigger t\nif input contains \"help\"\n  if not result\n    say \"a\"\n  end\nelse\n  set x = 1\nend\nsay \"done\"\n";
        let program = parse_ok(src);
        let statements = &program.triggers[0].statements;
        assert_eq!(statements.len(), 2);
        assert_eq!(program.statement_count(), 5);
        match &statements[0].kind {
            StatementKind::Conditional {
                condition,
                then_block,
                else_block,
            } => {
                assert!(matches!(condition, Condition::Contains { .. }));
                assert_eq!(then_block.len(), 1);
                assert_eq!(else_block.as_ref().map(Vec::len), Some(1));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn parses_block_surface() {
        let src = "bot \"Helper\"\n  description \"helps\"\n  capability search\n  on input\n    say \"hello\"\n  end\nend\n";
        let program = parse_ok(src);
        assert_eq!(program.surface, Surface::Block);
        assert_eq!(program.bot_name, "Helper");
        assert_eq!(program.capabilities, vec!["search"]);
        assert_eq!(program.triggers[0].event, "input");
        assert_eq!(program.triggers[0].statements.len(), 1);
    }

    #[test]
    fn collects_multiple_errors() {
        let src = "@bot B\n@trigger t\ncall (x: 1)\nsay\nfrobnicate\nsay \"ok\"\n";
        let errors = parse_err(src);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].position.line, 3);
        assert_eq!(errors[1].position.line, 4);
        assert!(errors[2].message.contains("frobnicate"));
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let src = format!(
            "@bot B\n@trigger t\n  if {}input\n  say \"x\"\n  end\n",
            "not ".repeat(1000)
        );
        let errors = parse_err(&src);
        assert!(errors[0].message.contains("nested too deeply"));
        assert_eq!(errors[0].position.line, 3);

        let src = format!(
            "@bot B\n@trigger t\n  say {}1{}\n",
            "(".repeat(1000),
            ")".repeat(1000)
        );
        let errors = parse_err(&src);
        assert!(errors[0].message.contains("expression nested too deeply"));

        let src = format!(
            "@bot B\n@trigger t\n{}say \"x\"\n{}",
            "if input\n".repeat(200),
            "end\n".repeat(200)
        );
        let errors = parse_err(&src);
        assert!(errors.iter().any(|e| e.message.contains("`if` block nested too deeply")));
    }

    #[test]
    fn nesting_within_the_limit_parses() {
        let src = format!(
            "@bot B\n@trigger t\n  if {}input\n    say ({}1{})\n  end\n",
            "not ".repeat(MAX_DEPTH - 1),
            "(".repeat(MAX_DEPTH - 1),
            ")".repeat(MAX_DEPTH - 1)
        );
        let program = parse_ok(&src);
        assert_eq!(program.statement_count(), 2);
    }

    #[test]
    fn unterminated_if_does_not_swallow_the_next_trigger() {
        let src = "@bot B\n@trigger a\n  if input\n    say \"x\"\n@trigger 5\n";
        let errors = parse_err(src);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("unterminated `if`"));
        assert_eq!(errors[1].position.line, 5);
        assert!(errors[1].message.contains("trigger event"));
    }

    #[test]
    fn rejects_duplicate_bot_directive() {
        let errors = parse_err("@bot A\n@bot B\n@trigger t\nsay \"x\"\n");
        assert!(errors[0].message.contains("duplicate `@bot`"));
    }

    #[test]
    fn reports_unmatched_end_and_unterminated_if() {
        let errors = parse_err("@bot A\nend\n@trigger t\nif x\nsay \"y\"\n");
        assert!(errors[0].message.contains("unmatched `end`"));
        assert!(errors.iter().any(|e| e.message.contains("unterminated `if`")));
    }

    #[test]
    fn reports_unknown_characters() {
        let errors = parse_err("@bot A\n@trigger t\nsay $\n");
        assert!(errors[0].message.contains("expected an expression"));
    }

    #[test]
    fn requires_a_trigger() {
        let errors = parse_err("@bot A\n");
        assert!(errors[0].message.contains("no trigger"));
    }
}
