//! Block-style YAML emitter for generated values.
//!
//! Output follows the layout GitHub workflow files conventionally use: two-space
//! indentation, sequences indented under their key, multi-line strings as literal
//! block scalars. Scalars are only quoted when a plain scalar would change meaning.

use serde_yaml::Value;

pub const INDENT_STEP: usize = 2;

const INDICATORS: &[char] = &[
    '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@',
    '`',
];

const RESERVED_WORDS: &[&str] = &[
    "null", "~", "true", "false", "yes", "no", "on", "off", "y", "n",
];

/// Append `label: value` at `indent` to `out`, one line per emitted row.
pub fn emit_entry(out: &mut String, indent: usize, label: &str, value: &Value) {
    let pad = " ".repeat(indent);
    match value {
        Value::Mapping(map) if map.is_empty() => push_line(out, &format!("{pad}{label}: {{}}")),
        Value::Mapping(map) => {
            push_line(out, &format!("{pad}{label}:"));
            for (key, child) in map {
                emit_entry(out, indent + INDENT_STEP, &key_label(key), child);
            }
        }
        Value::Sequence(items) if items.is_empty() => push_line(out, &format!("{pad}{label}: []")),
        Value::Sequence(items) => {
            push_line(out, &format!("{pad}{label}:"));
            for item in items {
                emit_item(out, indent + INDENT_STEP, item);
            }
        }
        Value::Null => push_line(out, &format!("{pad}{label}:")),
        Value::String(text) if text.contains('\n') => {
            emit_multiline(out, &format!("{pad}{label}:"), indent + INDENT_STEP, text)
        }
        Value::Tagged(tagged) => emit_entry(out, indent, label, &tagged.value),
        scalar => push_line(out, &format!("{pad}{label}: {}", format_scalar(scalar))),
    }
}

/// Append one sequence item (`- value`) at `indent`.
pub fn emit_item(out: &mut String, indent: usize, value: &Value) {
    let pad = " ".repeat(indent);
    match value {
        Value::Mapping(map) if !map.is_empty() => {
            let mut nested = String::new();
            for (key, child) in map {
                emit_entry(&mut nested, indent + INDENT_STEP, &key_label(key), child);
            }
            // The first key shares the dash line; its indentation is exactly indent + 2.
            let first_pad = indent + INDENT_STEP;
            out.push_str(&pad);
            out.push_str("- ");
            out.push_str(&nested[first_pad..]);
        }
        Value::Sequence(items) if !items.is_empty() => {
            push_line(out, &format!("{pad}-"));
            for item in items {
                emit_item(out, indent + INDENT_STEP, item);
            }
        }
        Value::Mapping(_) => push_line(out, &format!("{pad}- {{}}")),
        Value::Sequence(_) => push_line(out, &format!("{pad}- []")),
        Value::Null => push_line(out, &format!("{pad}- null")),
        Value::String(text) if text.contains('\n') => {
            emit_multiline(out, &format!("{pad}-"), indent + INDENT_STEP, text)
        }
        Value::Tagged(tagged) => emit_item(out, indent, &tagged.value),
        scalar => push_line(out, &format!("{pad}- {}", format_scalar(scalar))),
    }
}

/// Render a standalone `label: value` block.
pub fn render_entry(indent: usize, label: &str, value: &Value) -> String {
    let mut out = String::new();
    emit_entry(&mut out, indent, label, value);
    out
}

pub fn key_label(key: &Value) -> String {
    match key {
        Value::String(text) => format_key(text),
        other => format_scalar(other),
    }
}

/// Keys are written plain unless they contain something YAML would misread.
pub fn format_key(key: &str) -> String {
    let plain = !key.is_empty()
        && key == key.trim()
        && !key.starts_with(INDICATORS)
        && !key.contains(": ")
        && !key.contains(" #")
        && !key.ends_with(':')
        && !key.chars().any(char::is_control);
    if plain { key.to_string() } else { quote(key) }
}

pub fn format_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => format_string(text),
        Value::Tagged(tagged) => format_scalar(&tagged.value),
        Value::Sequence(items) if items.is_empty() => "[]".to_string(),
        Value::Mapping(map) if map.is_empty() => "{}".to_string(),
        // Collections are never emitted inline; fall back to a JSON flow rendering.
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

pub fn format_string(text: &str) -> String {
    if is_plain_safe(text) {
        text.to_string()
    } else {
        quote(text)
    }
}

fn quote(text: &str) -> String {
    if text.chars().any(char::is_control) {
        // A JSON string literal is a valid YAML double-quoted scalar.
        serde_json::to_string(text).unwrap_or_else(|_| format!("'{}'", text.replace('\'', "''")))
    } else {
        format!("'{}'", text.replace('\'', "''"))
    }
}

fn is_plain_safe(text: &str) -> bool {
    if text.is_empty() || text != text.trim() {
        return false;
    }
    if text.starts_with(INDICATORS) {
        return false;
    }
    if text.contains(": ") || text.contains(" #") || text.ends_with(':') {
        return false;
    }
    if text.chars().any(char::is_control) {
        return false;
    }
    !looks_like_non_string(text)
}

fn looks_like_non_string(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    if RESERVED_WORDS.contains(&lowered.as_str()) {
        return true;
    }
    if lowered.starts_with("0x") || lowered.starts_with("0o") {
        return true;
    }
    if matches!(
        lowered.as_str(),
        ".inf" | "-.inf" | "+.inf" | ".nan"
    ) {
        return true;
    }
    text.parse::<f64>().is_ok()
}

fn emit_multiline(out: &mut String, head: &str, body_indent: usize, text: &str) {
    let first_line_indented = text.starts_with(' ');
    if first_line_indented || text.ends_with("\n\n") || text.contains('\r') {
        push_line(out, &format!("{head} {}", quote(text)));
        return;
    }
    let (indicator, body) = match text.strip_suffix('\n') {
        Some(body) => ("|", body),
        None => ("|-", text),
    };
    push_line(out, &format!("{head} {indicator}"));
    let pad = " ".repeat(body_indent);
    for line in body.split('\n') {
        if line.is_empty() {
            out.push('\n');
        } else {
            push_line(out, &format!("{pad}{line}"));
        }
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{mapping, sequence, string};

    #[test]
    fn plain_strings_stay_plain() {
        assert_eq!(format_string("ubuntu-latest"), "ubuntu-latest");
        assert_eq!(format_string("actions/checkout@v4"), "actions/checkout@v4");
        assert_eq!(
            format_string("${{ needs.changes.outputs.api == 'true' }}"),
            "${{ needs.changes.outputs.api == 'true' }}"
        );
    }

    #[test]
    fn ambiguous_strings_are_quoted() {
        assert_eq!(format_string("20"), "'20'");
        assert_eq!(format_string("on"), "'on'");
        assert_eq!(format_string("true"), "'true'");
        assert_eq!(format_string("**/*.rs"), "'**/*.rs'");
        assert_eq!(format_string("a: b"), "'a: b'");
        assert_eq!(format_string("it's"), "it's");
        assert_eq!(format_string("'quoted'"), "'''quoted'''");
        assert_eq!(format_string(""), "''");
    }

    #[test]
    fn control_characters_use_double_quotes() {
        assert_eq!(format_string("a\tb"), "\"a\\tb\"");
    }

    #[test]
    fn keys_are_plain_when_safe() {
        assert_eq!(format_key("on"), "on");
        assert_eq!(format_key("cancel-in-progress"), "cancel-in-progress");
        assert_eq!(format_key("weird: key"), "'weird: key'");
    }

    #[test]
    fn emits_nested_mappings_and_sequences() {
        let value = mapping([
            ("runs-on", string("ubuntu-latest")),
            ("needs", sequence(["changes", "version"])),
            (
                "steps",
                sequence([
                    mapping([("uses", string("actions/checkout@v4"))]),
                    mapping([
                        ("name", string("Build")),
                        ("run", string("make build\nmake test\n")),
                    ]),
                ]),
            ),
        ]);
        let rendered = render_entry(2, "build", &value);
        assert_eq!(
            rendered,
            "  build:\n    runs-on: ubuntu-latest\n    needs:\n      - changes\n      - version\n    steps:\n      - uses: actions/checkout@v4\n      - name: Build\n        run: |\n          make build\n          make test\n"
        );
    }

    #[test]
    fn emits_empty_collections_and_null() {
        let value = mapping([
            ("workflow_dispatch", Value::Null),
            ("inputs", mapping(Vec::<(String, Value)>::new())),
            ("branches", sequence(Vec::<String>::new())),
        ]);
        assert_eq!(
            render_entry(0, "on", &value),
            "on:\n  workflow_dispatch:\n  inputs: {}\n  branches: []\n"
        );
    }

    #[test]
    fn multiline_without_trailing_newline_uses_strip_indicator() {
        let rendered = render_entry(0, "run", &string("one\n\ntwo"));
        assert_eq!(rendered, "run: |-\n  one\n\n  two\n");
    }

    #[test]
    fn emitted_output_round_trips_through_serde_yaml() {
        let value = mapping([
            ("name", string("yes")),
            ("version", string("1.10")),
            ("script", string("echo hi\n")),
            ("list", sequence(["- dash", "# hash", "plain"])),
        ]);
        let rendered = render_entry(0, "root", &value);
        let parsed: Value = serde_yaml::from_str(&rendered).expect("parse");
        assert_eq!(parsed["root"], value);
    }
}
