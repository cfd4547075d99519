//! Sentinel-delimited custom region.
//!
//! The two marker tokens are a compatibility contract with every workflow generated so
//! far: they may sit behind any number of `#` characters at any indentation. Scanning is
//! line based and independent of the YAML parser so quoting or indentation never hides a
//! marker.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::document::{self, Document};
use crate::emit;

pub const START_MARKER: &str = "<--START CUSTOM JOBS-->";
pub const END_MARKER: &str = "<--END CUSTOM JOBS-->";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerScan {
    Absent,
    Region { start: usize, end: usize },
    StartOnly { start: usize },
    EndOnly { end: usize },
    Misordered { start: usize, end: usize },
}

impl MarkerScan {
    /// Exactly one usable marker: treated as no region at all.
    pub fn is_mismatch(self) -> bool {
        matches!(
            self,
            Self::StartOnly { .. } | Self::EndOnly { .. } | Self::Misordered { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub scan: MarkerScan,
    /// Region text with marker lines excluded and surrounding blank lines trimmed.
    pub body: Option<String>,
    /// The document with the region (or any lone marker line) cut out.
    pub remainder: String,
}

/// A generated suggestion job named `{prefix}-{domain}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub prefix: String,
    pub domain: String,
    pub value: serde_yaml::Value,
}

impl Placeholder {
    pub fn name(&self) -> String {
        format!("{}-{}", self.prefix, self.domain)
    }

    pub fn render(&self, indent: usize) -> String {
        emit::render_entry(indent, &emit::format_key(&self.name()), &self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMerge {
    pub body: String,
    pub added: Vec<String>,
    pub suppressed: Vec<String>,
}

fn start_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| marker_pattern(START_MARKER))
}

fn end_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| marker_pattern(END_MARKER))
}

fn marker_pattern(token: &str) -> Regex {
    Regex::new(&format!(r"^\s*#.*{}", regex::escape(token))).expect("marker pattern is valid")
}

pub fn is_start_marker(line: &str) -> bool {
    start_pattern().is_match(line)
}

pub fn is_end_marker(line: &str) -> bool {
    end_pattern().is_match(line)
}

pub fn scan_markers(text: &str) -> MarkerScan {
    let lines = text.lines().collect::<Vec<_>>();
    let start = lines.iter().position(|line| is_start_marker(line));
    let first_end = lines.iter().position(|line| is_end_marker(line));
    match (start, first_end) {
        (None, None) => MarkerScan::Absent,
        (Some(start), None) => MarkerScan::StartOnly { start },
        (None, Some(end)) => MarkerScan::EndOnly { end },
        // The first end marker after the start closes the region.
        (Some(start), Some(first_end)) => match lines[start + 1..]
            .iter()
            .position(|line| is_end_marker(line))
        {
            Some(offset) => MarkerScan::Region {
                start,
                end: start + 1 + offset,
            },
            None => MarkerScan::Misordered {
                start,
                end: first_end,
            },
        },
    }
}

pub fn extract(text: &str) -> Extraction {
    let scan = scan_markers(text);
    let lines: Vec<&str> = text.lines().collect();
    match scan {
        MarkerScan::Absent => Extraction {
            scan,
            body: None,
            remainder: text.to_string(),
        },
        MarkerScan::Region { start, end } => {
            let body = trim_blank_lines(&lines[start + 1..end]).join("\n");
            // The blank line rendered above the start marker belongs to the region.
            let mut cut_from = start;
            while cut_from > 0 && lines[cut_from - 1].trim().is_empty() {
                cut_from -= 1;
            }
            let kept = lines[..cut_from]
                .iter()
                .chain(lines[end + 1..].iter())
                .copied()
                .collect::<Vec<_>>();
            Extraction {
                scan,
                body: Some(body),
                remainder: join_lines(&kept),
            }
        }
        MarkerScan::StartOnly { start: marker } | MarkerScan::EndOnly { end: marker } => {
            Extraction {
                scan,
                body: None,
                remainder: join_lines(&without_lines(&lines, &[marker])),
            }
        }
        MarkerScan::Misordered { start, end } => Extraction {
            scan,
            body: None,
            remainder: join_lines(&without_lines(&lines, &[start, end])),
        },
    }
}

/// Names of the top-level entries in region text: `name:` lines at the shallowest
/// indentation used by non-comment lines.
pub fn entry_names(body: &str) -> Vec<String> {
    let content = body
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect::<Vec<_>>();
    let Some(indent) = content.iter().map(|line| indentation(line)).min() else {
        return Vec::new();
    };
    content
        .iter()
        .filter(|line| indentation(line) == indent)
        .filter_map(|line| entry_name(line.trim_start()))
        .collect()
}

fn entry_name(line: &str) -> Option<String> {
    if line.starts_with("- ") {
        return None;
    }
    if let Some(quote) = line.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let rest = &line[1..];
        let close = rest.find(quote)?;
        let after = rest[close + 1..].trim_start();
        return after.starts_with(':').then(|| rest[..close].to_string());
    }
    let colon = line
        .char_indices()
        .find(|(index, c)| {
            *c == ':' && matches!(line[index + 1..].chars().next(), None | Some(' '))
        })?
        .0;
    let name = line[..colon].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Append placeholders whose names are not already taken, sorted by prefix then domain.
pub fn merge_placeholders(
    body: &str,
    placeholders: &[Placeholder],
    taken: &BTreeSet<String>,
    indent: usize,
) -> RegionMerge {
    let mut known = entry_names(body).into_iter().collect::<BTreeSet<_>>();
    known.extend(taken.iter().cloned());

    let mut ordered = placeholders.iter().collect::<Vec<_>>();
    ordered.sort_by(|left, right| {
        (left.prefix.as_str(), left.domain.as_str()).cmp(&(right.prefix.as_str(), right.domain.as_str()))
    });

    let mut parts = Vec::new();
    if !body.trim().is_empty() {
        parts.push(body.trim_end().to_string());
    }
    let mut added = Vec::new();
    let mut suppressed = Vec::new();
    for placeholder in ordered {
        let name = placeholder.name();
        if !known.insert(name.clone()) {
            suppressed.push(name);
            continue;
        }
        parts.push(placeholder.render(indent).trim_end().to_string());
        added.push(name);
    }

    RegionMerge {
        body: parts.join("\n\n"),
        added,
        suppressed,
    }
}

/// The region block as spliced into the document: one blank line, the start marker,
/// the body, the end marker.
pub fn wrap(body: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    let mut out = String::from("\n");
    out.push_str(&format!("{pad}# {START_MARKER}\n"));
    if !body.trim().is_empty() {
        out.push_str(body.trim_end());
        out.push('\n');
    }
    out.push_str(&format!("{pad}# {END_MARKER}\n"));
    out
}

/// Seed text for a region created inside a document that never had one.
pub fn example_stub(indent: usize) -> String {
    let pad = " ".repeat(indent);
    [
        "# Custom jobs go between these markers; regeneration keeps them as written.",
        "# example-job:",
        "#   needs: [changes, version]",
        "#   runs-on: ubuntu-latest",
        "#   steps:",
        "#     - run: echo \"hello\"",
    ]
    .iter()
    .map(|line| format!("{pad}{line}"))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Serialize each job under `jobs` that the engine does not own, shifted to `indent`,
/// so a rebuild can fold it into the region instead of dropping it.
pub(crate) fn recover_unmanaged_jobs(
    document: &Document,
    jobs_path: &[String],
    managed: &[&str],
    indent: usize,
) -> Vec<(String, String)> {
    let Some(jobs) = document.mapping(jobs_path) else {
        return Vec::new();
    };
    jobs.entries()
        .iter()
        .filter(|entry| !managed.contains(&entry.key()))
        .map(|entry| (entry.key().to_string(), entry.render_at(indent)))
        .collect()
}

/// Shift region text so its shallowest line sits at `indent`.
pub fn reindent_body(body: &str, indent: usize) -> String {
    let current = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(indentation)
        .min()
        .unwrap_or(indent);
    document::reindent(body, current, indent)
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn trim_blank_lines<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map(|index| index + 1)
        .unwrap_or(start);
    &lines[start..end.max(start)]
}

fn without_lines<'a>(lines: &[&'a str], skip: &[usize]) -> Vec<&'a str> {
    lines
        .iter()
        .enumerate()
        .filter(|(index, _)| !skip.contains(index))
        .map(|(_, line)| *line)
        .collect()
}

fn join_lines(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
