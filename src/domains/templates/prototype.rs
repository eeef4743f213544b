//! Prototype compiler.
//!
//! Turns raw template source into a node tree once, so that malformed
//! definitions are rejected before they reach the cache and rendering is a
//! plain walk over the tree.
//!
//! Supported syntax:
//! - `{{.Name}}` (or `{{ .Name }}`) substitutes the value of `Name`
//! - `{{if .Name}}...{{end}}` includes content only if `Name` is set and non-empty
//! - `{{if .Name}}...{{else}}...{{end}}` with else support
//! - `{{/* comment */}}` is dropped
//! - `{{- ` and ` -}}` trim the whitespace before / after the action

use std::collections::HashMap;

use super::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A compiled template prototype.
#[derive(Debug, Clone)]
pub struct Prototype {
    /// The name the prototype was compiled under (the endpoint key).
    name: String,

    /// The parsed node tree.
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Field(String),
    If {
        field: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

enum Token<'a> {
    Text(&'a str),
    Action { body: &'a str, offset: usize },
}

enum Directive<'a> {
    Comment,
    Field(&'a str),
    If(&'a str),
    Else,
    End,
}

struct Frame {
    field: String,
    offset: usize,
    then: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl Frame {
    fn current(&mut self) -> &mut Vec<Node> {
        match &mut self.otherwise {
            Some(otherwise) => otherwise,
            None => &mut self.then,
        }
    }
}

impl Prototype {
    /// Compile `source` under `name`.
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        let tokens = lex(&name, source)?;
        let nodes = parse(&name, tokens)?;
        Ok(Self { name, nodes })
    }

    /// The name this prototype was compiled under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Render the prototype against `variables`.
    ///
    /// Fields without a value render as empty text.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        let mut out = String::new();
        render_nodes(&self.nodes, variables, &mut out);
        out
    }
}

fn lex<'a>(name: &str, source: &'a str) -> Result<Vec<Token<'a>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = 0;
    let mut trim_next = false;

    while let Some(pos) = source[rest..].find(OPEN) {
        let start = rest + pos;
        let mut text = &source[rest..start];
        if trim_next {
            text = text.trim_start();
        }

        let body_start = start + OPEN.len();
        let search_from = body_start + comment_end(&source[body_start..]).unwrap_or(0);
        let close = source[search_from..]
            .find(CLOSE)
            .ok_or_else(|| TemplateError::compile(name, start, "unclosed action"))?;
        let body_end = search_from + close;

        let mut body = &source[body_start..body_end];
        if let Some(trimmed) = strip_left_trim(body) {
            text = text.trim_end();
            body = trimmed;
        }
        trim_next = false;
        if let Some(trimmed) = strip_right_trim(body) {
            trim_next = true;
            body = trimmed;
        }

        if !text.is_empty() {
            tokens.push(Token::Text(text));
        }
        tokens.push(Token::Action {
            body: body.trim(),
            offset: start,
        });
        rest = body_end + CLOSE.len();
    }

    let mut tail = &source[rest..];
    if trim_next {
        tail = tail.trim_start();
    }
    if !tail.is_empty() {
        tokens.push(Token::Text(tail));
    }

    Ok(tokens)
}

/// Offset just past the closing `*/` when the action opens a comment.
///
/// Comments may contain `}}`, so the action close is searched from here.
fn comment_end(after_open: &str) -> Option<usize> {
    let rest = strip_left_trim(after_open).map_or(after_open, str::trim_start);
    let lead = after_open.len() - rest.len();
    let inner = rest.strip_prefix("/*")?;
    inner.find("*/").map(|end| lead + 2 + end + 2)
}

/// `{{- ` trims; `{{-3}}` does not.
fn strip_left_trim(body: &str) -> Option<&str> {
    let rest = body.strip_prefix('-')?;
    rest.starts_with(char::is_whitespace).then_some(rest)
}

fn strip_right_trim(body: &str) -> Option<&str> {
    let rest = body.strip_suffix('-')?;
    rest.ends_with(char::is_whitespace).then_some(rest)
}

fn parse(name: &str, tokens: Vec<Token<'_>>) -> Result<Vec<Node>, TemplateError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        let node = match token {
            Token::Text(text) => Node::Text(text.to_string()),
            Token::Action { body, offset } => match classify(name, body, offset)? {
                Directive::Comment => continue,
                Directive::Field(field) => Node::Field(field.to_string()),
                Directive::If(field) => {
                    stack.push(Frame {
                        field: field.to_string(),
                        offset,
                        then: Vec::new(),
                        otherwise: None,
                    });
                    continue;
                }
                Directive::Else => {
                    let frame = stack
                        .last_mut()
                        .ok_or_else(|| TemplateError::compile(name, offset, "unexpected {{else}}"))?;
                    if frame.otherwise.is_some() {
                        return Err(TemplateError::compile(name, offset, "duplicate {{else}}"));
                    }
                    frame.otherwise = Some(Vec::new());
                    continue;
                }
                Directive::End => {
                    let frame = stack
                        .pop()
                        .ok_or_else(|| TemplateError::compile(name, offset, "unexpected {{end}}"))?;
                    Node::If {
                        field: frame.field,
                        then: frame.then,
                        otherwise: frame.otherwise.unwrap_or_default(),
                    }
                }
            },
        };

        match stack.last_mut() {
            Some(frame) => frame.current().push(node),
            None => root.push(node),
        }
    }

    if let Some(frame) = stack.last() {
        return Err(TemplateError::compile(
            name,
            frame.offset,
            "{{if}} without matching {{end}}",
        ));
    }

    Ok(root)
}

fn classify<'a>(name: &str, body: &'a str, offset: usize) -> Result<Directive<'a>, TemplateError> {
    if body.starts_with("/*") && body.ends_with("*/") && body.len() >= 4 {
        return Ok(Directive::Comment);
    }

    match body {
        "" => Err(TemplateError::compile(name, offset, "empty action")),
        "else" => Ok(Directive::Else),
        "end" => Ok(Directive::End),
        _ => {
            if let Some(condition) = body.strip_prefix("if")
                && condition.starts_with(char::is_whitespace)
            {
                let condition = condition.trim();
                return field_ref(condition).map(Directive::If).ok_or_else(|| {
                    TemplateError::compile(
                        name,
                        offset,
                        format!("unsupported condition `{}`", condition),
                    )
                });
            }

            field_ref(body).map(Directive::Field).ok_or_else(|| {
                TemplateError::compile(name, offset, format!("unsupported action `{}`", body))
            })
        }
    }
}

/// Parse `.Ident` into `Ident`.
fn field_ref(expr: &str) -> Option<&str> {
    let ident = expr.strip_prefix('.')?;
    is_identifier(ident).then_some(ident)
}

fn is_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn render_nodes(nodes: &[Node], variables: &HashMap<String, String>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Field(field) => {
                if let Some(value) = variables.get(field) {
                    out.push_str(value);
                }
            }
            Node::If {
                field,
                then,
                otherwise,
            } => {
                let is_set = variables.get(field).is_some_and(|v| !v.is_empty());
                let branch = if is_set { then } else { otherwise };
                render_nodes(branch, variables, out);
            }
        }
    }
}
