//! The generated `terraform.auto.tfvars` file.
//!
//! Each variable becomes exactly one `name = "value"` line, sorted by name.
//! Values are written as HCL quoted strings, so quotes, backslashes, control
//! characters and template sequences (`${`, `%{`) are escaped and a value
//! can never spill onto a second line.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// File name of the generated variables file inside the staging directory.
pub const TFVARS_FILE_NAME: &str = "terraform.auto.tfvars";

/// HCL identifier, as accepted for Terraform variable names.
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("variable name pattern is a valid regex")
});

/// Checks that `name` can be written as a variable and `value` as a quoted
/// string. Returns a description of the problem otherwise.
pub fn check_variable(name: &str, value: &Value) -> Result<(), String> {
    if !NAME_RE.is_match(name) {
        return Err(format!("variable name '{}' is not a valid identifier", name));
    }
    let kind = match value {
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
        _ => return Ok(()),
    };
    Err(format!("variable '{}' must be a scalar value, got {}", name, kind))
}

/// Renders the body of the variables file.
pub fn render(variables: &BTreeMap<String, Value>) -> String {
    let mut out = String::new();
    for (name, value) in variables {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        out.push_str(name);
        out.push_str(" = \"");
        push_escaped(&mut out, &text);
        out.push_str("\"\n");
    }
    out
}

fn push_escaped(out: &mut String, value: &str) {
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
}
