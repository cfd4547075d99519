//! Textual post-pass that folds long `if:` guards of generated jobs.
//!
//! A guard longer than the threshold becomes a `>-` folded scalar with one top-level
//! `&&`/`||` operand per line. Every continuation line shares one indentation, so YAML
//! folding joins them back with single spaces into exactly the original expression.
//! Only jobs named in the managed set are touched; user jobs and the custom region are
//! emitted as written.

use std::sync::OnceLock;

use regex::Regex;

use crate::document::split_key;
use crate::region;

pub const DEFAULT_THRESHOLD: usize = 100;

fn guard_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<indent> *)(?P<dash>- )?if: (?P<expr>\S.*)$").expect("valid regex")
    })
}

/// Reflow every eligible guard inside the `jobs.<name>` entries listed in `managed`.
pub fn reflow_guards(text: &str, threshold: usize, managed: &[&str]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_region = false;
    let mut in_jobs = false;
    let mut job_indent: Option<usize> = None;
    let mut in_managed_job = false;
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches('\n');
        if region::is_start_marker(body) {
            in_region = true;
            in_managed_job = false;
        } else if region::is_end_marker(body) {
            in_region = false;
        } else if !in_region {
            if let Some((indent, key)) = entry_key(body) {
                if indent == 0 {
                    in_jobs = key == "jobs";
                    job_indent = None;
                    in_managed_job = false;
                } else if in_jobs && job_indent.is_none_or(|column| indent <= column) {
                    job_indent = Some(indent);
                    in_managed_job = managed.contains(&key.as_str());
                }
            }
            if in_managed_job
                && body.chars().count() > threshold
                && let Some(folded) = fold_guard(body)
            {
                out.push_str(&folded);
                continue;
            }
        }
        out.push_str(line);
    }
    out
}

/// Column and key of a `key:` line; comments, blanks and sequence items yield `None`.
fn entry_key(line: &str) -> Option<(usize, String)> {
    let body = line.trim_start_matches(' ');
    if body.trim().is_empty() {
        return None;
    }
    let (key, _, _) = split_key(body)?;
    Some((line.len() - body.len(), key))
}

/// The folded replacement for one guard line, newline-terminated, or `None` when the
/// line is not a plain guard or cannot be split safely.
pub fn fold_guard(line: &str) -> Option<String> {
    let captures = guard_pattern().captures(line)?;
    let indent = captures.name("indent").map_or("", |m| m.as_str());
    let dash = captures.name("dash").map_or("", |m| m.as_str());
    let expr = captures.name("expr")?.as_str().trim_end();
    if expr.starts_with(['\'', '"', '>', '|', '&', '*', '!', '[', '{', '#']) || expr.contains(" #") {
        return None;
    }

    let operands = split_operands(expr)?;
    if operands.len() < 2 {
        return None;
    }

    let pad = " ".repeat(indent.len() + dash.len() + 2);
    let mut out = format!("{indent}{dash}if: >-\n");
    for operand in operands {
        out.push_str(&pad);
        out.push_str(operand);
        out.push('\n');
    }
    Some(out)
}

/// Split at `&&`/`||` outside parentheses, brackets and quotes. Every piece after the
/// first starts with its operator.
fn split_operands(expr: &str) -> Option<Vec<&str>> {
    let bytes = expr.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None => match byte {
                b'\'' | b'"' => quote = Some(byte),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.checked_sub(1)?,
                b' ' if depth == 0
                    && (expr[index..].starts_with(" && ") || expr[index..].starts_with(" || ")) =>
                {
                    pieces.push(&expr[start..index]);
                    start = index + 1;
                    index += 4;
                    continue;
                }
                _ => {}
            },
        }
        index += 1;
    }
    if quote.is_some() || depth != 0 {
        return None;
    }
    pieces.push(&expr[start..]);

    let safe = pieces
        .iter()
        .all(|piece| !piece.is_empty() && *piece == piece.trim() && !piece.starts_with('#'));
    safe.then_some(pieces)
}

#[cfg(test)]
mod tests {
    use serde_yaml::Value;

    use super::*;

    const MANAGED: &[&str] = &["tag", "release"];

    const LONG: &str = "${{ always() && github.event_name == 'push' && (github.ref_name == 'develop' || github.ref_name == 'main') && needs.version.outputs.version != '' }}";

    fn folded_value(text: &str, key: &str) -> Value {
        let parsed: Value = serde_yaml::from_str(text).expect("valid yaml");
        parsed["jobs"]["tag"][key].clone()
    }

    #[test]
    fn long_guard_is_folded_one_operand_per_line() {
        let text = format!("jobs:\n  tag:\n    if: {LONG}\n    runs-on: x\n");
        let reflowed = reflow_guards(&text, DEFAULT_THRESHOLD, MANAGED);
        assert_eq!(
            reflowed,
            "jobs:\n  tag:\n    if: >-\n      ${{ always()\n      && github.event_name == 'push'\n      && (github.ref_name == 'develop' || github.ref_name == 'main')\n      && needs.version.outputs.version != '' }}\n    runs-on: x\n"
        );
    }

    #[test]
    fn folding_reproduces_original_expression() {
        let text = format!("jobs:\n  tag:\n    if: {LONG}\n");
        let reflowed = reflow_guards(&text, DEFAULT_THRESHOLD, MANAGED);
        assert_eq!(folded_value(&reflowed, "if"), Value::String(LONG.to_string()));
    }

    #[test]
    fn reflow_is_idempotent() {
        let text = format!("jobs:\n  tag:\n    if: {LONG}\n");
        let once = reflow_guards(&text, DEFAULT_THRESHOLD, MANAGED);
        assert_eq!(reflow_guards(&once, DEFAULT_THRESHOLD, MANAGED), once);
    }

    #[test]
    fn step_guards_align_under_the_key() {
        let line = format!("      - if: {LONG}");
        let folded = fold_guard(&line).expect("folds");
        assert!(folded.starts_with("      - if: >-\n          ${{ always()\n"));
    }

    #[test]
    fn short_quoted_and_commented_guards_are_untouched() {
        let short = "jobs:\n  tag:\n    if: ${{ a && b }}\n";
        assert_eq!(reflow_guards(short, DEFAULT_THRESHOLD, MANAGED), short);

        let quoted = format!("    if: '{}'", LONG.replace('\'', "''"));
        assert!(fold_guard(&quoted).is_none());

        let commented = format!("    if: {LONG} # keep");
        assert!(fold_guard(&commented).is_none());
    }

    #[test]
    fn guard_without_top_level_operator_is_untouched() {
        let line = format!("    if: ${{{{ contains(fromJSON('[{}]'), github.ref_name) }}}}", "\"a\", ".repeat(30));
        assert!(fold_guard(&line).is_none());
    }

    #[test]
    fn custom_region_is_skipped() {
        let text = format!(
            "jobs:\n  # <--START CUSTOM JOBS-->\n  mine:\n    if: {LONG}\n  # <--END CUSTOM JOBS-->\n"
        );
        assert_eq!(reflow_guards(&text, DEFAULT_THRESHOLD, MANAGED), text);
    }

    #[test]
    fn user_jobs_are_left_as_written() {
        let text = format!(
            "jobs:\n  lint-extra:\n    if: {LONG}\n    runs-on: x\n  tag:\n    if: {LONG}\n"
        );
        let reflowed = reflow_guards(&text, DEFAULT_THRESHOLD, MANAGED);
        assert!(reflowed.starts_with(&format!("jobs:\n  lint-extra:\n    if: {LONG}\n    runs-on: x\n")));
        assert!(reflowed.contains("  tag:\n    if: >-\n"));
    }

    #[test]
    fn guards_outside_jobs_are_left_alone() {
        let text = format!("tag:\n  if: {LONG}\njobs:\n  tag:\n    steps:\n      - if: {LONG}\n");
        let reflowed = reflow_guards(&text, DEFAULT_THRESHOLD, MANAGED);
        assert!(reflowed.starts_with(&format!("tag:\n  if: {LONG}\njobs:\n")));
        assert!(reflowed.contains("      - if: >-\n"));
    }

    #[test]
    fn unbalanced_expression_is_left_alone() {
        assert!(split_operands("a && (b || c").is_none());
        assert!(split_operands("a && 'b || c").is_none());
        assert_eq!(
            split_operands("a && (b || c) || d"),
            Some(vec!["a", "&& (b || c)", "|| d"])
        );
    }
}
