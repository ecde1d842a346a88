//! FILENAME: core/template-engine/src/substitution.rs
//! PURPOSE: `{{ }}` text substitution over JSON contexts.
//! CONTEXT: Template cells such as `Report for {{ .company }}` are expanded
//! against the sheet's fill data, and DataField cells such as
//! `{{ .first }} {{ .last | upper }}` against each record.
//!
//! Supported action syntax:
//! - `{{ . }}` the whole context, `{{ .a.b }}` a (dotted) field
//! - `"text"`, `` `raw` ``, numbers, `true`, `false`, `nil` literals
//! - `{{ fn arg1 arg2 }}` function calls and `{{ .x | fn arg }}` pipelines,
//!   where the piped value becomes the last argument
//! - `{{-` and `-}}` trim adjacent whitespace

use crate::error::{TemplateError, TemplateResult};
use engine::format_number;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

static TEMPLATE_SYNTAX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^{}]+\}\}").expect("template syntax pattern must compile"));

/// True when `text` holds at least one `{{ ... }}` action.
pub fn contains_template_syntax(text: &str) -> bool {
    TEMPLATE_SYNTAX_RE.is_match(text)
}

pub type TemplateFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Named functions callable from actions.
#[derive(Clone)]
pub struct FunctionTable {
    functions: HashMap<String, TemplateFunction>,
}

impl FunctionTable {
    /// A table holding the built-ins: upper, lower, trim, default, print, len.
    pub fn new() -> Self {
        let mut table = FunctionTable::empty();
        table.insert("upper", |args| text_function("upper", args, |s| s.to_uppercase()));
        table.insert("lower", |args| text_function("lower", args, |s| s.to_lowercase()));
        table.insert("trim", |args| text_function("trim", args, |s| s.trim().to_string()));
        table.insert("default", |args| match args {
            [fallback, given] => Ok(if is_empty_value(given) { fallback.clone() } else { given.clone() }),
            _ => Err(format!("default expects 2 arguments, got {}", args.len())),
        });
        table.insert("print", |args| Ok(Value::String(sprint(args))));
        table.insert("len", |args| match args {
            [Value::String(s)] => Ok(Value::from(s.chars().count())),
            [Value::Array(items)] => Ok(Value::from(items.len())),
            [Value::Object(map)] => Ok(Value::from(map.len())),
            [other] => Err(format!("len of {}", display_value(other))),
            _ => Err(format!("len expects 1 argument, got {}", args.len())),
        });
        table
    }

    pub fn empty() -> Self {
        FunctionTable {
            functions: HashMap::new(),
        }
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.insert(name, function);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<&TemplateFunction> {
        self.functions.get(name)
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        FunctionTable::new()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

fn text_function(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value, String> {
    match args {
        [value] => Ok(Value::String(f(&display_value(value)))),
        _ => Err(format!("{name} expects 1 argument, got {}", args.len())),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Joins operands, adding a space between two operands when neither is a string.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !arg.is_string() {
            out.push(' ');
        }
        out.push_str(&display_value(arg));
    }
    out
}

/// Text a value renders as. `null` (a missing field) renders empty.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        },
        other => other.to_string(),
    }
}

// ============================================================================
// RENDERING
// ============================================================================

/// Expands every action in `template` against `context`.
pub fn render_template(template: &str, context: &Value, functions: &FunctionTable) -> TemplateResult<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut trim_next = false;

    while let Some(open) = rest.find("{{") {
        let mut text = &rest[..open];
        if trim_next {
            text = text.trim_start();
        }
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or_else(|| TemplateError::template(template, "unclosed action"))?;
        let mut body = &after_open[..close];

        if let Some(stripped) = body.strip_prefix('-').filter(|b| b.starts_with(char::is_whitespace)) {
            text = text.trim_end();
            body = stripped;
        }
        trim_next = false;
        if let Some(stripped) = body.strip_suffix('-').filter(|b| b.ends_with(char::is_whitespace)) {
            trim_next = true;
            body = stripped;
        }

        output.push_str(text);
        let value = evaluate_action(body, context, functions)
            .map_err(|message| TemplateError::template(template, message))?;
        output.push_str(&display_value(&value));
        rest = &after_open[close + 2..];
    }

    output.push_str(if trim_next { rest.trim_start() } else { rest });
    Ok(output)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(Vec<String>),
    Literal(Value),
    Ident(String),
    Pipe,
}

fn evaluate_action(body: &str, context: &Value, functions: &FunctionTable) -> Result<Value, String> {
    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err("empty action".to_string());
    }

    let mut piped: Option<Value> = None;
    for command in tokens.split(|t| *t == Token::Pipe) {
        let Some((head, args)) = command.split_first() else {
            return Err("missing command in pipeline".to_string());
        };
        piped = Some(match head {
            Token::Ident(name) => {
                let function = functions
                    .get(name)
                    .ok_or_else(|| format!("function \"{name}\" not defined"))?;
                let mut values = args
                    .iter()
                    .map(|arg| operand(arg, context))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped.take());
                function(&values).map_err(|e| format!("error calling {name}: {e}"))?
            }
            other => {
                if !args.is_empty() || piped.is_some() {
                    return Err("can't give argument to non-function".to_string());
                }
                operand(other, context)?
            }
        });
    }
    Ok(piped.unwrap_or(Value::Null))
}

fn operand(token: &Token, context: &Value) -> Result<Value, String> {
    match token {
        Token::Field(path) => Ok(lookup(context, path)),
        Token::Literal(value) => Ok(value.clone()),
        Token::Ident(name) => Err(format!("function \"{name}\" used as an argument")),
        Token::Pipe => Err("unexpected '|'".to_string()),
    }
}

fn lookup(context: &Value, path: &[String]) -> Value {
    let mut current = context;
    for key in path {
        match current.get(key.as_str()) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn tokenize(body: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        match ch {
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err("unterminated quoted string".to_string()),
                        },
                        Some((_, c)) => text.push(c),
                        None => return Err("unterminated quoted string".to_string()),
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            '`' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '`')) => break,
                        Some((_, c)) => text.push(c),
                        None => return Err("unterminated raw string".to_string()),
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            '(' | ')' | '$' => return Err(format!("unsupported syntax '{ch}'")),
            _ => {
                let mut end = body.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() || c == '|' || c == '"' {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                tokens.push(word_token(&body[start..end])?);
            }
        }
    }
    Ok(tokens)
}

fn word_token(word: &str) -> Result<Token, String> {
    if word == "." {
        return Ok(Token::Field(Vec::new()));
    }
    if let Some(path) = word.strip_prefix('.') {
        let parts: Vec<String> = path.split('.').map(str::to_string).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("bad field path '{word}'"));
        }
        return Ok(Token::Field(parts));
    }
    match word {
        "true" => return Ok(Token::Literal(Value::Bool(true))),
        "false" => return Ok(Token::Literal(Value::Bool(false))),
        "nil" => return Ok(Token::Literal(Value::Null)),
        _ => {}
    }
    if word.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
        if let Ok(i) = word.parse::<i64>() {
            return Ok(Token::Literal(Value::from(i)));
        }
        return word
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(|n| Token::Literal(Value::Number(n)))
            .ok_or_else(|| format!("bad number syntax '{word}'"));
    }
    if word.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Ok(Token::Ident(word.to_string()));
    }
    Err(format!("unexpected '{word}' in action"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, context: &Value) -> TemplateResult<String> {
        render_template(template, context, &FunctionTable::new())
    }

    #[test]
    fn detects_template_syntax() {
        assert!(contains_template_syntax("{{ .name }}"));
        assert!(contains_template_syntax("Total: {{.sum}} items"));
        assert!(!contains_template_syntax("name"));
        assert!(!contains_template_syntax("{{}}"));
        assert!(!contains_template_syntax("{ .name }"));
    }

    #[test]
    fn renders_fields_and_paths() {
        let context = json!({"name": "Acme", "owner": {"city": "Oslo"}, "count": 3, "rate": 1.5});
        assert_eq!(render("Hi {{ .name }}", &context).unwrap(), "Hi Acme");
        assert_eq!(render("{{.owner.city}}", &context).unwrap(), "Oslo");
        assert_eq!(render("{{ .count }}/{{ .rate }}", &context).unwrap(), "3/1.5");
        assert_eq!(render("[{{ .missing }}]", &context).unwrap(), "[]");
        assert_eq!(render("{{ .owner.city.zip }}", &context).unwrap(), "");
    }

    #[test]
    fn renders_pipelines_and_builtins() {
        let context = json!({"name": " acme ", "empty": ""});
        assert_eq!(render("{{ .name | trim | upper }}", &context).unwrap(), "ACME");
        assert_eq!(render("{{ .empty | default \"n/a\" }}", &context).unwrap(), "n/a");
        assert_eq!(render("{{ len .name }}", &context).unwrap(), "6");
        assert_eq!(render("{{ print 1 2 \"x\" }}", &context).unwrap(), "1 2x");
        assert_eq!(render("{{ lower `RAW` }}", &context).unwrap(), "raw");
    }

    #[test]
    fn trim_markers_eat_whitespace() {
        let context = json!({"a": "x"});
        assert_eq!(render("a  {{- .a -}}  b", &context).unwrap(), "axb");
        assert_eq!(render("{{ -3 }}", &context).unwrap(), "-3");
    }

    #[test]
    fn caller_functions_extend_the_table() {
        let table = FunctionTable::new().with_function("repeat", |args| match args {
            [Value::Number(n), value] => {
                let times = n.as_u64().unwrap_or(0) as usize;
                Ok(Value::String(display_value(value).repeat(times)))
            }
            _ => Err("repeat expects a count and a value".to_string()),
        });
        let context = json!({"mark": "ab"});
        assert_eq!(render_template("{{ .mark | repeat 3 }}", &context, &table).unwrap(), "ababab");
        assert!(table.contains("upper"));
    }

    #[test]
    fn unknown_functions_and_bad_actions_fail() {
        let context = json!({});
        assert!(matches!(render("{{ shout .x }}", &context), Err(TemplateError::Template { .. })));
        assert!(render("{{ .x ", &context).is_err());
        assert!(render("{{ \"open }}", &context).is_err());
        assert!(render("{{ .x .y }}", &context).is_err());
        assert!(render("{{ }}", &context).is_err());
    }

    #[test]
    fn whole_context_renders_as_text() {
        assert_eq!(render("{{ . }}", &json!("plain")).unwrap(), "plain");
    }
}
