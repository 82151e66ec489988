use std::collections::HashMap;

use serde_json::Value;

/// A small expression language for `PhaseDefinition.skip_if` (spec.md §3),
/// supporting boolean literals, `options.<key>` / `outputs.<phase>.<field>`
/// lookups, equality, and `&&`/`||`/`!` — enough to express predicates like
/// `options.skip_audit == true` without embedding a general scripting
/// engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipIfExpr {
    BoolLit(bool),
    /// A bare path, true iff the looked-up JSON value is truthy.
    Truthy(Path),
    Eq(Path, Literal),
    NotEq(Path, Literal),
    Not(Box<SkipIfExpr>),
    And(Box<SkipIfExpr>, Box<SkipIfExpr>),
    Or(Box<SkipIfExpr>, Box<SkipIfExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Path {
    Options(String),
    Output { phase: String, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    String(String),
    Number(f64),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SkipIfParseError {
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unknown path: {0}")]
    UnknownPath(String),
}

/// Read-only lookups a `skip_if` expression evaluates against: the job's
/// merged options and a phase-id -> output-object map (global outputs for a
/// global-phase evaluation context, or a unit's own per-unit outputs when
/// evaluating for a specific unit).
pub struct EvalContext<'a> {
    pub options: &'a Value,
    pub outputs: &'a HashMap<String, Value>,
}

impl SkipIfExpr {
    pub fn parse(src: &str) -> Result<Self, SkipIfParseError> {
        let tokens = tokenize(src);
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(SkipIfParseError::UnexpectedToken(
                parser.tokens[parser.pos].clone(),
            ));
        }
        Ok(expr)
    }

    pub fn eval(&self, ctx: &EvalContext) -> bool {
        match self {
            SkipIfExpr::BoolLit(b) => *b,
            SkipIfExpr::Truthy(path) => is_truthy(&lookup(path, ctx)),
            SkipIfExpr::Eq(path, lit) => values_equal(&lookup(path, ctx), lit),
            SkipIfExpr::NotEq(path, lit) => !values_equal(&lookup(path, ctx), lit),
            SkipIfExpr::Not(inner) => !inner.eval(ctx),
            SkipIfExpr::And(lhs, rhs) => lhs.eval(ctx) && rhs.eval(ctx),
            SkipIfExpr::Or(lhs, rhs) => lhs.eval(ctx) || rhs.eval(ctx),
        }
    }
}

fn lookup(path: &Path, ctx: &EvalContext) -> Value {
    match path {
        Path::Options(key) => ctx.options.get(key).cloned().unwrap_or(Value::Null),
        Path::Output { phase, field } => ctx
            .outputs
            .get(phase)
            .and_then(|v| v.get(field))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(value: &Value, lit: &Literal) -> bool {
    match lit {
        Literal::Bool(b) => value.as_bool() == Some(*b),
        Literal::String(s) => value.as_str() == Some(s.as_str()),
        Literal::Number(n) => value.as_f64() == Some(*n),
    }
}

fn tokenize(src: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '&' && chars.get(i + 1) == Some(&'&') {
            tokens.push("&&".to_string());
            i += 2;
            continue;
        }
        if c == '|' && chars.get(i + 1) == Some(&'|') {
            tokens.push("||".to_string());
            i += 2;
            continue;
        }
        if c == '=' && chars.get(i + 1) == Some(&'=') {
            tokens.push("==".to_string());
            i += 2;
            continue;
        }
        if c == '!' && chars.get(i + 1) == Some(&'=') {
            tokens.push("!=".to_string());
            i += 2;
            continue;
        }
        if c == '!' || c == '(' || c == ')' {
            tokens.push(c.to_string());
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                s.push(chars[i]);
                i += 1;
            }
            i += 1;
            tokens.push(format!("\"{s}\""));
            continue;
        }
        let mut word = String::new();
        while i < chars.len() && !chars[i].is_whitespace() && !"&|!()".contains(chars[i]) {
            word.push(chars[i]);
            i += 1;
        }
        tokens.push(word);
    }
    tokens
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn advance(&mut self) -> Option<String> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<SkipIfExpr, SkipIfParseError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some("||") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = SkipIfExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<SkipIfExpr, SkipIfParseError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some("&&") {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = SkipIfExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<SkipIfExpr, SkipIfParseError> {
        if self.peek() == Some("!") {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(SkipIfExpr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<SkipIfExpr, SkipIfParseError> {
        if self.peek() == Some("(") {
            self.advance();
            let inner = self.parse_or()?;
            if self.advance().as_deref() != Some(")") {
                return Err(SkipIfParseError::UnexpectedToken(")".to_string()));
            }
            return Ok(inner);
        }

        let token = self.advance().ok_or(SkipIfParseError::UnexpectedEof)?;

        if token == "true" {
            return Ok(SkipIfExpr::BoolLit(true));
        }
        if token == "false" {
            return Ok(SkipIfExpr::BoolLit(false));
        }

        let path = parse_path(&token)?;

        match self.peek() {
            Some("==") => {
                self.advance();
                let lit = self.parse_literal()?;
                Ok(SkipIfExpr::Eq(path, lit))
            }
            Some("!=") => {
                self.advance();
                let lit = self.parse_literal()?;
                Ok(SkipIfExpr::NotEq(path, lit))
            }
            _ => Ok(SkipIfExpr::Truthy(path)),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, SkipIfParseError> {
        let token = self.advance().ok_or(SkipIfParseError::UnexpectedEof)?;
        if token == "true" {
            return Ok(Literal::Bool(true));
        }
        if token == "false" {
            return Ok(Literal::Bool(false));
        }
        if let Some(inner) = token.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return Ok(Literal::String(inner.to_string()));
        }
        token
            .parse::<f64>()
            .map(Literal::Number)
            .map_err(|_| SkipIfParseError::UnexpectedToken(token))
    }
}

fn parse_path(token: &str) -> Result<Path, SkipIfParseError> {
    let mut parts = token.split('.');
    match parts.next() {
        Some("options") => {
            let key = parts.next().ok_or_else(|| SkipIfParseError::UnknownPath(token.to_string()))?;
            Ok(Path::Options(key.to_string()))
        }
        Some("outputs") => {
            let phase = parts.next().ok_or_else(|| SkipIfParseError::UnknownPath(token.to_string()))?;
            let field = parts.next().ok_or_else(|| SkipIfParseError::UnknownPath(token.to_string()))?;
            Ok(Path::Output {
                phase: phase.to_string(),
                field: field.to_string(),
            })
        }
        _ => Err(SkipIfParseError::UnknownPath(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx<'a>(options: &'a Value, outputs: &'a HashMap<String, Value>) -> EvalContext<'a> {
        EvalContext { options, outputs }
    }

    #[test]
    fn evaluates_simple_equality() {
        let expr = SkipIfExpr::parse("options.skip_audit == true").unwrap();
        let options = json!({"skip_audit": true});
        let outputs = HashMap::new();
        assert!(expr.eval(&ctx(&options, &outputs)));
    }

    #[test]
    fn evaluates_string_equality_and_negation() {
        let expr = SkipIfExpr::parse("!(options.mode == \"dry_run\")").unwrap();
        let options = json!({"mode": "dry_run"});
        let outputs = HashMap::new();
        assert!(!expr.eval(&ctx(&options, &outputs)));
    }

    #[test]
    fn evaluates_and_or_combinators() {
        let expr = SkipIfExpr::parse("options.a == true && options.b == false").unwrap();
        let options = json!({"a": true, "b": false});
        let outputs = HashMap::new();
        assert!(expr.eval(&ctx(&options, &outputs)));

        let expr = SkipIfExpr::parse("options.a == true || options.c == true").unwrap();
        let options = json!({"a": false, "c": true});
        assert!(expr.eval(&ctx(&options, &outputs)));
    }

    #[test]
    fn reads_upstream_output_fields() {
        let expr = SkipIfExpr::parse("outputs.validate.already_configured == true").unwrap();
        let options = json!({});
        let mut outputs = HashMap::new();
        outputs.insert("validate".to_string(), json!({"already_configured": true}));
        assert!(expr.eval(&ctx(&options, &outputs)));
    }

    #[test]
    fn bare_path_is_evaluated_as_truthy() {
        let expr = SkipIfExpr::parse("options.skip_audit").unwrap();
        let options = json!({"skip_audit": true});
        let outputs = HashMap::new();
        assert!(expr.eval(&ctx(&options, &outputs)));
    }

    #[test]
    fn unknown_prefix_is_a_parse_error() {
        let err = SkipIfExpr::parse("garbage.field == true").unwrap_err();
        assert!(matches!(err, SkipIfParseError::UnknownPath(_)));
    }
}
