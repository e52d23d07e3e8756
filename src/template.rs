//! Rendering of the install and run command templates.
//!
//! Commands are written in Go `text/template` syntax (`{{.Version}}`,
//! `{{if .Sudo}}sudo {{end}}`), the same syntax image-build configurations
//! already use, and are rendered with `gtmpl`.
//!
//! Before rendering, every top-level field a template references is checked
//! against the fields the data provides, so a typo such as `{{.StagingDirr}}`
//! fails instead of silently rendering an empty string.

use std::sync::LazyLock;

use gtmpl::Value;
use regex::Regex;

static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("action pattern is a valid regex"));

/// `.Field` at the start of an action or after whitespace, `(` or `|`.
/// `$var.Field` and string literals are not matched.
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s(|])\.([A-Za-z_][A-Za-z0-9_]*)"#).expect("field pattern is a valid regex")
});

/// Errors returned while rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// A `{{` was opened and never closed.
    #[error("unclosed action at offset {0}")]
    Unclosed(usize),

    /// The template references a field the data does not provide.
    #[error("field '.{0}' not found in template data")]
    MissingField(String),

    /// The template engine rejected the template or failed to execute it.
    #[error("{0}")]
    Template(String),
}

/// Renders `src` against `data`.
///
/// When `data` is an object, field references are checked against its keys
/// first.
pub fn render(src: &str, data: Value) -> Result<String, RenderError> {
    check_actions(src, &data)?;
    gtmpl::template(src, data).map_err(|e| RenderError::Template(e.to_string()))
}

fn check_actions(src: &str, data: &Value) -> Result<(), RenderError> {
    let mut closed_until = 0;
    for action in ACTION_RE.captures_iter(src) {
        let (Some(whole), Some(body)) = (action.get(0), action.get(1)) else {
            continue;
        };
        closed_until = whole.end();

        let body = body.as_str();
        if body.trim_start().starts_with("/*") {
            continue;
        }
        if let Value::Object(fields) = data {
            for field in FIELD_RE.captures_iter(body) {
                let name = &field[1];
                if !fields.contains_key(name) {
                    return Err(RenderError::MissingField(name.to_string()));
                }
            }
        }
    }

    match src[closed_until..].find("{{") {
        Some(offset) => Err(RenderError::Unclosed(closed_until + offset)),
        None => Ok(()),
    }
}
