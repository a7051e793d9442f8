//! HTML email templates.
//!
//! Templates are plain HTML files named `<template>.html`. Two constructs are
//! understood: `{{ key }}` is replaced by the HTML-escaped context value (or
//! nothing when the key is absent), and `{{#key}} ... {{/key}}` keeps its body
//! only when `key` is present and non-empty. Sections do not nest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::warn;

pub type Context = BTreeMap<&'static str, String>;

lazy_static! {
    static ref SECTION: Regex =
        Regex::new(r"(?s)\{\{#\s*(\w+)\s*\}\}(.*?)\{\{/\s*(\w+)\s*\}\}").unwrap();
    static ref VARIABLE: Regex = Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    VerificationCode,
    Welcome,
    PasswordReset,
}

impl Template {
    pub fn name(self) -> &'static str {
        match self {
            Self::VerificationCode => "verification_code",
            Self::Welcome => "welcome",
            Self::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("section `{open}` is closed by `{close}`")]
    MismatchedSection { open: String, close: String },
    #[error("template has an unclosed section")]
    UnclosedSection,
}

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    dir: PathBuf,
}

impl TemplateRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn render(&self, template: Template, context: &Context) -> Result<String, RenderError> {
        let path = self.dir.join(format!("{}.html", template.name()));
        let source = std::fs::read_to_string(&path).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        render_source(&source, context)
    }

    /// Renders `template`, or the built-in minimal body if that fails.
    pub fn render_or_fallback(&self, template: Template, context: &Context) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(err) => {
                warn!(error = %err, template = template.name(), "template rendering failed, using fallback");
                fallback(template, context)
            }
        }
    }
}

fn is_set(context: &Context, key: &str) -> bool {
    context.get(key).is_some_and(|v| !v.is_empty())
}

pub(crate) fn render_source(source: &str, context: &Context) -> Result<String, RenderError> {
    let mut expanded = String::with_capacity(source.len());
    let mut last = 0;
    for caps in SECTION.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        let (open, close) = (&caps[1], &caps[3]);
        if open != close {
            return Err(RenderError::MismatchedSection {
                open: open.to_owned(),
                close: close.to_owned(),
            });
        }
        expanded.push_str(&source[last..whole.start()]);
        if is_set(context, open) {
            expanded.push_str(&caps[2]);
        }
        last = whole.end();
    }
    expanded.push_str(&source[last..]);

    if expanded.contains("{{#") || expanded.contains("{{/") {
        return Err(RenderError::UnclosedSection);
    }

    let rendered = VARIABLE.replace_all(&expanded, |caps: &Captures| {
        context
            .get(&caps[1])
            .map(|v| escape_html(v))
            .unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn value<'a>(context: &'a Context, key: &str, default: &'a str) -> String {
    escape_html(context.get(key).map(String::as_str).unwrap_or(default))
}

/// Minimal bodies used when the template file cannot be rendered.
pub fn fallback(template: Template, context: &Context) -> String {
    match template {
        Template::VerificationCode => format!(
            "<html>\n<body>\n    <h1>Verification Code</h1>\n    <p>Hello,</p>\n    \
             <p>Your verification code is: <strong>{}</strong></p>\n    \
             <p>This code will expire in 30 minutes.</p>\n</body>\n</html>\n",
            value(context, "code", "N/A"),
        ),
        Template::Welcome => {
            let otp = if is_set(context, "otp") {
                format!(
                    "    <p>Your code is: <strong>{}</strong></p>\n",
                    value(context, "otp", "")
                )
            } else {
                String::new()
            };
            format!(
                "<html>\n<body>\n    <h1>Welcome!</h1>\n    <p>Hello {},</p>\n    \
                 <p>Thank you for joining our platform.</p>\n{otp}</body>\n</html>\n",
                value(context, "user_name", ""),
            )
        }
        Template::PasswordReset => format!(
            "<html>\n<body>\n    <h1>Password Reset</h1>\n    \
             <p>Your password reset code is: <strong>{}</strong></p>\n</body>\n</html>\n",
            value(context, "reset_code", "N/A"),
        ),
    }
}
