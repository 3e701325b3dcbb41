//! Escaping for every target language an artifact is rendered into.

/// Single-quoted SQL string literal with quotes doubled.
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\0', "").replace('\'', "''"))
}

/// SQL literal, or `NULL` for absent or empty values.
pub(crate) fn sql_optional(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => sql_literal(v),
        _ => "NULL".into(),
    }
}

/// Numeric SQL literal. Non-finite values render as 0.
pub(crate) fn sql_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "0".into()
    }
}

/// Text safe to place after `//` or `--` on a single line.
pub(crate) fn line_comment(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Rust string literal. `Debug` for `str` emits valid Rust escapes.
pub(crate) fn rust_string(value: &str) -> String {
    format!("{value:?}")
}

/// Lowercase identifier fragment: anything outside `[a-z0-9_]` becomes `_`.
pub(crate) fn identifier(value: &str) -> String {
    let ident: String = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() { "service".into() } else { ident }
}

/// Markdown table cell: pipes escaped, newlines flattened.
pub(crate) fn markdown_cell(value: &str) -> String {
    line_comment(value).replace('|', "\\|")
}
