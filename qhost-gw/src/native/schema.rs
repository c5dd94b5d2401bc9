//! Static root-field schema
//!
//! A deliberately small native engine: a single `Query` type whose root
//! fields resolve to fixed JSON values. It accepts flat selection sets only;
//! string and number literals are lexed so argument groups parse, but no
//! field takes arguments.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

use super::{NativeContext, NativeEngine, NativeResult};

/// Engine serving fixed root fields
#[derive(Debug, Clone)]
pub struct StaticSchema {
    fields: Map<String, Value>,
}

impl StaticSchema {
    /// Schema with no fields
    pub fn empty() -> Self {
        Self { fields: Map::new() }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// `hello` and `version` root fields
    pub fn greeting() -> Self {
        Self::empty()
            .with_field("hello", Value::String("Hello, world.".to_string()))
            .with_field("version", Value::String(env!("CARGO_PKG_VERSION").to_string()))
    }

    fn resolve(&self, operation: &Operation) -> NativeResult {
        let mut data = Map::new();
        let mut errors = Vec::new();

        for selection in &operation.selections {
            match self.fields.get(&selection.field) {
                None => errors.push(format!(
                    "Cannot query field \"{}\" on type \"Query\".",
                    selection.field
                )),
                Some(_) if selection.has_arguments => errors.push(format!(
                    "Unknown argument on field \"Query.{}\".",
                    selection.field
                )),
                Some(_) if selection.has_subselection => errors.push(format!(
                    "Field \"{}\" must not have a selection since its type has no subfields.",
                    selection.field
                )),
                Some(value) => {
                    data.insert(selection.response_key().to_string(), value.clone());
                }
            }
        }

        if errors.is_empty() {
            NativeResult::data(Value::Object(data))
        } else {
            NativeResult::invalid(errors)
        }
    }
}

impl Default for StaticSchema {
    fn default() -> Self {
        Self::greeting()
    }
}

#[async_trait]
impl NativeEngine for StaticSchema {
    async fn execute(&self, context: &NativeContext) -> NativeResult {
        let operation = match parse(&context.query) {
            Ok(operation) => operation,
            Err(message) => return NativeResult::invalid([message]),
        };

        match operation.kind.as_str() {
            "query" => {}
            "mutation" => {
                return NativeResult::invalid(["Schema is not configured for mutations.".to_string()])
            }
            other => {
                return NativeResult::invalid([format!("Schema is not configured for {}s.", other)])
            }
        }

        if let Some(wanted) = &context.operation_name {
            if operation.name.as_deref() != Some(wanted.as_str()) {
                return NativeResult::invalid([format!("Unknown operation named \"{}\".", wanted)]);
            }
        }

        self.resolve(&operation)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Punct(char),
    Str(String),
    Number(String),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "Name \"{}\"", name),
            Token::Punct(c) => write!(f, "\"{}\"", c),
            Token::Str(text) => write!(f, "String \"{}\"", text),
            Token::Number(text) => write!(f, "Number \"{}\"", text),
            Token::Eof => write!(f, "<EOF>"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            // Commas are insignificant
            c if c.is_whitespace() || c == ',' => {
                chars.next();
            }
            '#' => {
                while let Some(c) = chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | '(' | ')' | ':' | '$' | '!' | '=' | '[' | ']' => {
                tokens.push(Token::Punct(c));
                chars.next();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(lex_string(&mut chars)?));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.') {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let well_formed = number
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
                if !well_formed || number.parse::<f64>().is_err() {
                    return Err(format!("Syntax Error: Invalid number \"{}\".", number));
                }
                tokens.push(Token::Number(number));
            }
            other => return Err(format!("Syntax Error: Unexpected character \"{}\".", other)),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Body of a `"..."` literal, the opening quote already consumed
fn lex_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, String> {
    let mut text = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(text),
            '\\' => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some(escaped @ ('"' | '\\' | '/')) => text.push(escaped),
                Some(other) => {
                    return Err(format!("Syntax Error: Invalid character escape sequence: \\{}.", other))
                }
                None => break,
            },
            '\n' => break,
            c => text.push(c),
        }
    }
    Err("Syntax Error: Unterminated string.".to_string())
}

#[derive(Debug, Clone, PartialEq)]
struct Selection {
    alias: Option<String>,
    field: String,
    has_arguments: bool,
    has_subselection: bool,
}

impl Selection {
    fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Operation {
    kind: String,
    name: Option<String>,
    selections: Vec<Selection>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect_punct(&mut self, wanted: char) -> Result<(), String> {
        match self.next() {
            Token::Punct(c) if c == wanted => Ok(()),
            other => Err(format!("Syntax Error: Expected \"{}\", found {}.", wanted, other)),
        }
    }

    fn expect_name(&mut self) -> Result<String, String> {
        match self.next() {
            Token::Name(name) => Ok(name),
            other => Err(format!("Syntax Error: Expected Name, found {}.", other)),
        }
    }

    /// Skip a balanced `open ... close` group, the opening token already consumed
    fn skip_group(&mut self, open: char, close: char) -> Result<(), String> {
        let mut depth = 1;
        while depth > 0 {
            match self.next() {
                Token::Punct(c) if c == open => depth += 1,
                Token::Punct(c) if c == close => depth -= 1,
                Token::Eof => {
                    return Err(format!("Syntax Error: Expected \"{}\", found <EOF>.", close))
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn operation(&mut self) -> Result<Operation, String> {
        let (kind, name) = match self.peek().clone() {
            Token::Punct('{') => ("query".to_string(), None),
            Token::Name(keyword)
                if matches!(keyword.as_str(), "query" | "mutation" | "subscription") =>
            {
                self.next();
                let name = match self.peek().clone() {
                    Token::Name(name) => {
                        self.next();
                        Some(name)
                    }
                    _ => None,
                };
                if self.peek() == &Token::Punct('(') {
                    self.next();
                    self.skip_group('(', ')')?;
                }
                (keyword, name)
            }
            other => return Err(format!("Syntax Error: Unexpected {}.", other)),
        };

        let selections = self.selection_set()?;

        match self.peek() {
            Token::Eof => Ok(Operation {
                kind,
                name,
                selections,
            }),
            other => Err(format!("Syntax Error: Unexpected {}.", other)),
        }
    }

    fn selection_set(&mut self) -> Result<Vec<Selection>, String> {
        self.expect_punct('{')?;
        let mut selections = vec![self.selection()?];
        while self.peek() != &Token::Punct('}') {
            selections.push(self.selection()?);
        }
        self.expect_punct('}')?;
        Ok(selections)
    }

    fn selection(&mut self) -> Result<Selection, String> {
        let first = self.expect_name()?;
        let (alias, field) = if self.peek() == &Token::Punct(':') {
            self.next();
            (Some(first), self.expect_name()?)
        } else {
            (None, first)
        };

        let mut selection = Selection {
            alias,
            field,
            has_arguments: false,
            has_subselection: false,
        };

        if self.peek() == &Token::Punct('(') {
            self.next();
            self.skip_group('(', ')')?;
            selection.has_arguments = true;
        }
        if self.peek() == &Token::Punct('{') {
            self.next();
            self.skip_group('{', '}')?;
            selection.has_subselection = true;
        }

        Ok(selection)
    }
}

fn parse(source: &str) -> Result<Operation, String> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
    };
    parser.operation()
}
