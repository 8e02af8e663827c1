use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::{CommsError, Result};

const BUILTIN_TEMPLATE: &str = include_str!("../templates/email.html");

/// The three values a comms email body is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct TemplateValues<'a> {
    pub reference: &'a str,
    pub summary: &'a str,
    pub description: &'a str,
}

impl<'a> TemplateValues<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "ref" => Some(self.reference),
            "summary" => Some(self.summary),
            "desc" => Some(self.description),
            _ => None,
        }
    }
}

pub trait TemplateRenderer {
    fn render(&self, values: &TemplateValues<'_>) -> Result<String>;
}

/// HTML template with `{{ ref }}`, `{{ summary }}` and `{{ desc }}` placeholders.
#[derive(Debug, Clone)]
pub struct EmailTemplate {
    source: String,
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*([a-zA-Z0-9_.-]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

impl EmailTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_TEMPLATE)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            CommsError::Template(format!("Failed to read template {}: {}", path.display(), e))
        })?;
        Ok(Self::new(source))
    }
}

impl TemplateRenderer for EmailTemplate {
    fn render(&self, values: &TemplateValues<'_>) -> Result<String> {
        let unknown: Vec<&str> = placeholder_regex()
            .captures_iter(&self.source)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| values.lookup(name).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(CommsError::Template(format!(
                "Unknown placeholder(s): {}",
                unknown.join(", ")
            )));
        }

        let rendered = placeholder_regex().replace_all(&self.source, |caps: &Captures| {
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            escape_html(values.lookup(name).unwrap_or(""))
        });

        Ok(rendered.into_owned())
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
