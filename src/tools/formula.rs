//! Spreadsheet-style formula evaluation.
//!
//! A small recursive-descent parser over a closed grammar: numbers, named
//! variables, `+ - * /`, parentheses, unary minus, and the aggregate
//! functions SUM, AVERAGE, MIN and MAX (case-insensitive). Nothing else
//! tokenizes, so model-supplied input cannot smuggle anything executable
//! through this tool. A leading `=` is tolerated the way spreadsheets
//! write formulas.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::AgentError;
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutcome};

#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("formula ended unexpectedly")]
    UnexpectedEnd,
    #[error("unexpected token at position {0}")]
    UnexpectedToken(usize),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("{0} requires at least one argument")]
    EmptyArgs(&'static str),
    #[error("division by zero")]
    DivisionByZero,
    #[error("unexpected input at position {0}")]
    TrailingInput(usize),
}

impl From<FormulaError> for AgentError {
    fn from(e: FormulaError) -> Self {
        AgentError::InvalidFormula(e.to_string())
    }
}

/// Evaluate `formula` with the given variable bindings.
pub fn evaluate(formula: &str, variables: &HashMap<String, f64>) -> Result<f64, FormulaError> {
    let body = formula.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    let tokens = tokenize(body)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        vars: variables,
    };
    let value = parser.expr()?;
    if let Some((_, position)) = parser.tokens.get(parser.pos) {
        return Err(FormulaError::TrailingInput(*position));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push((Token::Plus, i));
                i += 1;
            }
            '-' => {
                tokens.push((Token::Minus, i));
                i += 1;
            }
            '*' => {
                tokens.push((Token::Star, i));
                i += 1;
            }
            '/' => {
                tokens.push((Token::Slash, i));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, i));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, i));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, i));
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedToken(start))?;
                tokens.push((Token::Number(value), start));
            }
            // Identifiers must start alphabetic. An underscore in first
            // position is rejected here, which is what keeps dunder names
            // out of the grammar entirely.
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push((Token::Ident(text), start));
            }
            other => return Err(FormulaError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    vars: &'a HashMap<String, f64>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<&'a (Token, usize)> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn expr(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64, FormulaError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            return Ok(-self.factor()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64, FormulaError> {
        let Some((token, position)) = self.advance() else {
            return Err(FormulaError::UnexpectedEnd);
        };
        match token {
            Token::Number(value) => Ok(*value),
            Token::LParen => {
                let value = self.expr()?;
                match self.advance() {
                    Some((Token::RParen, _)) => Ok(value),
                    Some((_, position)) => Err(FormulaError::UnexpectedToken(*position)),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            Token::Ident(name) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.pos += 1;
                    let args = self.args()?;
                    apply_function(name, &args)
                } else {
                    self.vars
                        .get(name)
                        .copied()
                        .ok_or_else(|| FormulaError::UnknownVariable(name.clone()))
                }
            }
            _ => Err(FormulaError::UnexpectedToken(*position)),
        }
    }

    fn args(&mut self) -> Result<Vec<f64>, FormulaError> {
        let mut values = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(values);
        }
        loop {
            values.push(self.expr()?);
            match self.advance() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RParen, _)) => return Ok(values),
                Some((_, position)) => return Err(FormulaError::UnexpectedToken(*position)),
                None => return Err(FormulaError::UnexpectedEnd),
            }
        }
    }
}

fn apply_function(name: &str, args: &[f64]) -> Result<f64, FormulaError> {
    match name.to_ascii_uppercase().as_str() {
        "SUM" => {
            if args.is_empty() {
                return Err(FormulaError::EmptyArgs("SUM"));
            }
            Ok(args.iter().sum())
        }
        "AVERAGE" => {
            if args.is_empty() {
                return Err(FormulaError::EmptyArgs("AVERAGE"));
            }
            Ok(args.iter().sum::<f64>() / args.len() as f64)
        }
        "MIN" => {
            if args.is_empty() {
                return Err(FormulaError::EmptyArgs("MIN"));
            }
            Ok(args.iter().copied().fold(f64::INFINITY, f64::min))
        }
        "MAX" => {
            if args.is_empty() {
                return Err(FormulaError::EmptyArgs("MAX"));
            }
            Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        }
        _ => Err(FormulaError::UnknownFunction(name.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct FormulaArgs {
    formula: String,
    #[serde(default)]
    variables: HashMap<String, f64>,
}

/// Formula evaluation as a tool.
pub struct FormulaTool;

#[async_trait]
impl Tool for FormulaTool {
    fn name(&self) -> &str {
        "evaluate_formula"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "evaluate_formula".to_string(),
            description: "Evaluate a spreadsheet-style formula. Supports +, -, *, /, \
                          parentheses, SUM, AVERAGE, MIN and MAX, and named variables \
                          bound to numbers."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "formula": {
                        "type": "string",
                        "description": "Formula to evaluate, e.g. '=SUM(a, b) * 2'"
                    },
                    "variables": {
                        "type": "object",
                        "description": "Numeric bindings for variables used in the formula",
                        "additionalProperties": {"type": "number"}
                    }
                },
                "required": ["formula"]
            }),
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolOutcome {
        let args: FormulaArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return ToolOutcome::error(format!("invalid arguments: {e}")),
        };
        match evaluate(&args.formula, &args.variables) {
            Ok(value) => ToolOutcome::success(format_number(value)),
            Err(e) => ToolOutcome::error(AgentError::from(e).to_string()),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
