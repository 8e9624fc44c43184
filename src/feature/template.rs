// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! `{{ .Path.To.Value }}` substitution against a JSON map of data bindings.

use crate::error::{OperatorError, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Any `{{ ... }}` action, with optional `{{- ` / ` -}}` trim markers
static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{(-\s)?(.*?)(\s-)?\}\}").expect("template action regex is valid")
});

static PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)$")
        .expect("template path regex is valid")
});

/// Substitute every reference in `text`.
///
/// Only plain `.Path.To.Value` references are supported; any other action,
/// or a reference that does not resolve to a non-null value, is a TemplateError.
/// Trim markers remove the whitespace on their side of the action.
pub fn render(path: &str, text: &str, data: &Map<String, Value>) -> Result<String> {
    let error = |reason: String| OperatorError::TemplateError {
        path: path.to_string(),
        reason,
    };

    let mut rendered = String::with_capacity(text.len());
    let mut last = 0;

    for caps in ACTION.captures_iter(text) {
        let Some(action) = caps.get(0) else {
            continue;
        };

        let preceding = &text[last..action.start()];
        if caps.get(1).is_some() {
            rendered.push_str(preceding.trim_end());
        } else {
            rendered.push_str(preceding);
        }

        let body = caps[2].trim();
        let reference = PATH
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| error(format!("unsupported template action {{{{ {} }}}}", body)))?;
        let value = lookup(data, reference)
            .and_then(to_text)
            .ok_or_else(|| error(format!("unresolved reference .{}", reference)))?;
        rendered.push_str(&value);

        last = action.end();
        if caps.get(3).is_some() {
            let rest = &text[last..];
            last += rest.len() - rest.trim_start().len();
        }
    }

    rendered.push_str(&text[last..]);
    Ok(rendered)
}

fn lookup<'a>(data: &'a Map<String, Value>, reference: &str) -> Option<&'a Value> {
    let mut parts = reference.split('.');
    let first = data.get(parts.next()?)?;
    parts.try_fold(first, |value, key| value.get(key))
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
