//! Comment-preserving tree for block-style YAML documents.
//!
//! Only block mappings are modelled structurally. Every other value (scalars, sequences,
//! flow collections, block scalars) is kept as the verbatim lines the user wrote, so any
//! node the merge does not touch re-renders byte-for-byte. Blank lines and comments are
//! attached to the entry that follows them; comments trailing a nested mapping stay with
//! that mapping.

use serde_yaml::Value;

use crate::emit::{self, INDENT_STEP};
use crate::error::MergeError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    root: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    indent: usize,
    entries: Vec<Entry>,
    trailing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    key: String,
    label: String,
    indent: usize,
    leading: Vec<String>,
    node: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Nested block mapping. `inline` is whatever followed the colon, usually a comment.
    Mapping { inline: String, mapping: Mapping },
    /// Verbatim source: text after the colon plus the continuation lines.
    Raw { inline: String, lines: Vec<String> },
    /// Generated content, rendered by the emitter.
    Value(Value),
}

/// Text spliced into the rendering right after a named entry of a mapping.
#[derive(Debug, Clone)]
pub struct Insertion<'a> {
    pub parent: &'a [String],
    pub after: &'a str,
    pub text: &'a str,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, MergeError> {
        validate_yaml(text)?;
        let lines = classify(text)?;
        let mut parser = Parser {
            lines,
            pos: 0,
            pending: Vec::new(),
        };
        let mut root = parser.parse_mapping(0)?;
        if let Some(line) = parser.lines.get(parser.pos) {
            return Err(MergeError::parse(line.number, "unexpected content"));
        }
        root.trailing.extend(parser.take_pending());
        Ok(Self { root })
    }

    /// Walk `path`, creating missing mappings at the end of their parent. Returns the
    /// dotted prefix that blocked resolution when an ancestor is not a mapping.
    pub fn resolve_or_create(&mut self, path: &[String]) -> Result<&mut Mapping, String> {
        let mut current = &mut self.root;
        for (depth, segment) in path.iter().enumerate() {
            let index = match current.position(segment) {
                Some(index) => index,
                None => {
                    let indent = current.entry_indent();
                    current.push(Entry::new(
                        segment,
                        indent,
                        Node::Mapping {
                            inline: String::new(),
                            mapping: Mapping::with_indent(indent + INDENT_STEP),
                        },
                    ));
                    current.entries.len() - 1
                }
            };
            current = current.entries[index]
                .as_mapping_mut()
                .ok_or_else(|| path[..=depth].join("."))?;
        }
        Ok(current)
    }

    pub fn contains(&self, path: &[String]) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return true;
        };
        let mut current = &self.root;
        for (depth, segment) in parents.iter().enumerate() {
            let Some(entry) = current.get(segment) else {
                return false;
            };
            match &entry.node {
                Node::Mapping { mapping, .. } => current = mapping,
                Node::Value(value) => return value_contains(value, &path[depth + 1..]),
                Node::Raw { .. } => return false,
            }
        }
        current.get(last).is_some()
    }

    pub fn mapping(&self, path: &[String]) -> Option<&Mapping> {
        let mut current = &self.root;
        for segment in path {
            match &current.get(segment)?.node {
                Node::Mapping { mapping, .. } => current = mapping,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Keys of the mapping at `path`, whether parsed or generated.
    pub fn keys(&self, path: &[String]) -> Vec<String> {
        let Some((last, parents)) = path.split_last() else {
            return self.root.keys();
        };
        let Some(parent) = self.mapping(parents) else {
            return Vec::new();
        };
        match parent.get(last).map(|entry| &entry.node) {
            Some(Node::Mapping { mapping, .. }) => mapping.keys(),
            Some(Node::Value(Value::Mapping(map))) => map
                .keys()
                .map(|key| key.as_str().map(str::to_string).unwrap_or_else(|| emit::key_label(key)))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn remove(&mut self, path: &[String]) -> Option<Entry> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.root;
        for segment in parents {
            let index = current.position(segment)?;
            current = match &mut current.entries[index].node {
                Node::Mapping { mapping, .. } => mapping,
                _ => return None,
            };
        }
        let index = current.position(last)?;
        Some(current.entries.remove(index))
    }

    pub fn render_with(&self, insertion: Option<&Insertion<'_>>) -> String {
        let mut out = String::new();
        let mut path = Vec::new();
        let mut inserted = false;
        render_mapping(&mut out, &self.root, &mut path, insertion, &mut inserted);
        if let Some(insertion) = insertion
            && !inserted
        {
            out.push_str(insertion.text);
        }
        out
    }
}

impl Mapping {
    fn with_indent(indent: usize) -> Self {
        Self {
            indent,
            ..Self::default()
        }
    }

    fn from_values(indent: usize, map: &serde_yaml::Mapping) -> Self {
        let entries = map
            .iter()
            .map(|(key, value)| {
                let name = key
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| emit::key_label(key));
                Entry::new(&name, indent, Node::Value(value.clone()))
            })
            .collect();
        Self {
            indent,
            entries,
            trailing: Vec::new(),
        }
    }

    /// Column its entries sit at; for an empty mapping, the column a first entry would use.
    pub fn entry_indent(&self) -> usize {
        self.entries
            .first()
            .map(|entry| entry.indent)
            .unwrap_or(self.indent)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key.clone()).collect()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.key == key)
    }

    /// Insert or replace `key` with a generated value. Returns true when the key was new.
    pub fn put(&mut self, key: &str, value: Value) -> bool {
        if let Some(entry) = self.get_mut(key) {
            entry.node = Node::Value(value);
            return false;
        }
        let indent = self.entry_indent();
        self.push(Entry::new(key, indent, Node::Value(value)));
        true
    }

    /// Take `entry`'s value for a key this mapping already has, keeping the local
    /// formatting; a new key is inserted as written before `before`, or appended.
    pub fn adopt(&mut self, entry: &Entry, before: &str) {
        if let Some(existing) = self.get_mut(&entry.key) {
            existing.node = entry.node.clone();
            return;
        }
        match self.position(before) {
            Some(index) => self.entries.insert(index, entry.clone()),
            None => self.push(entry.clone()),
        }
    }

    fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }
}

impl Entry {
    fn new(key: &str, indent: usize, node: Node) -> Self {
        Self {
            key: key.to_string(),
            label: emit::format_key(key),
            indent,
            leading: Vec::new(),
            node,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Replace the blank lines and comments rendered above this entry.
    pub fn set_formatting(&mut self, space_before: bool, comment: Option<&str>) {
        let pad = " ".repeat(self.indent);
        let mut leading = Vec::new();
        if space_before {
            leading.push(String::new());
        }
        if let Some(comment) = comment {
            for line in comment.lines() {
                let line = line.trim_end();
                if line.is_empty() {
                    leading.push(format!("{pad}#"));
                } else {
                    leading.push(format!("{pad}# {line}"));
                }
            }
        }
        self.leading = leading;
    }

    /// Render this entry alone, shifted so its key sits at `indent`. Leading blank lines
    /// are dropped; comments above the entry travel with it.
    pub fn render_at(&self, indent: usize) -> String {
        let mut out = String::new();
        let mut path = Vec::new();
        let mut inserted = false;
        render_entry(&mut out, self, &mut path, None, &mut inserted);
        let text = out.trim_start_matches('\n');
        reindent(text, self.indent, indent)
    }

    fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        let child_indent = self.indent + INDENT_STEP;
        let replacement = match &self.node {
            Node::Mapping { .. } => None,
            Node::Value(Value::Mapping(map)) => Some(Node::Mapping {
                inline: String::new(),
                mapping: Mapping::from_values(child_indent, map),
            }),
            Node::Value(Value::Null) => Some(Node::Mapping {
                inline: String::new(),
                mapping: Mapping::with_indent(child_indent),
            }),
            Node::Raw { inline, lines } => match empty_mapping_remainder(inline) {
                Some(inline) if lines.is_empty() => Some(Node::Mapping {
                    inline,
                    mapping: Mapping::with_indent(child_indent),
                }),
                _ => {
                    let map = raw_mapping(inline, lines, self.indent)?;
                    Some(Node::Mapping {
                        inline: String::new(),
                        mapping: Mapping::from_values(child_indent, &map),
                    })
                }
            },
            _ => return None,
        };
        if let Some(node) = replacement {
            self.node = node;
        }
        match &mut self.node {
            Node::Mapping { mapping, .. } => Some(mapping),
            _ => None,
        }
    }
}

/// For a raw inline value that denotes "nothing" or `{}`, the text to keep after the colon.
fn empty_mapping_remainder(inline: &str) -> Option<String> {
    let trimmed = inline.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Some(inline.to_string());
    }
    let rest = trimmed.strip_prefix("{}")?;
    let rest_trimmed = rest.trim_start();
    if rest_trimmed.is_empty() {
        Some(String::new())
    } else if rest_trimmed.starts_with('#') {
        Some(rest.to_string())
    } else {
        None
    }
}

/// The mapping a verbatim value denotes, e.g. a flow mapping `{ push: { branches: [main] } }`.
fn raw_mapping(inline: &str, lines: &[String], indent: usize) -> Option<serde_yaml::Mapping> {
    let mut text = format!("value:{inline}\n");
    for line in lines {
        text.push_str(&reindent(line, indent, 0));
        text.push('\n');
    }
    let Value::Mapping(mut root) = serde_yaml::from_str::<Value>(&text).ok()? else {
        return None;
    };
    match root.remove("value")? {
        Value::Mapping(map) => Some(map),
        _ => None,
    }
}

fn value_contains(value: &Value, path: &[String]) -> bool {
    let mut current = value;
    for segment in path {
        match current.as_mapping().and_then(|map| map.get(segment.as_str())) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn render_mapping(
    out: &mut String,
    mapping: &Mapping,
    path: &mut Vec<String>,
    insertion: Option<&Insertion<'_>>,
    inserted: &mut bool,
) {
    let target = insertion.filter(|insertion| insertion.parent == path.as_slice());
    for entry in &mapping.entries {
        render_entry(out, entry, path, insertion, inserted);
        if let Some(target) = target
            && !*inserted
            && entry.key == target.after
        {
            out.push_str(target.text);
            *inserted = true;
        }
    }
    if let Some(target) = target
        && !*inserted
    {
        out.push_str(target.text);
        *inserted = true;
    }
    for line in &mapping.trailing {
        push_line(out, line);
    }
}

fn render_entry(
    out: &mut String,
    entry: &Entry,
    path: &mut Vec<String>,
    insertion: Option<&Insertion<'_>>,
    inserted: &mut bool,
) {
    for line in &entry.leading {
        push_line(out, line);
    }
    let pad = " ".repeat(entry.indent);
    match &entry.node {
        Node::Mapping { inline, mapping } => {
            if mapping.entries.is_empty() && mapping.trailing.is_empty() {
                push_line(out, &format!("{pad}{}: {{}}", entry.label));
                return;
            }
            push_line(out, &format!("{pad}{}:{inline}", entry.label));
            path.push(entry.key.clone());
            render_mapping(out, mapping, path, insertion, inserted);
            path.pop();
        }
        Node::Raw { inline, lines } => {
            push_line(out, &format!("{pad}{}:{inline}", entry.label));
            for line in lines {
                push_line(out, line);
            }
        }
        Node::Value(value) => emit::emit_entry(out, entry.indent, &entry.label, value),
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Shift every non-blank line of `text` from column `from` to column `to`.
pub fn reindent(text: &str, from: usize, to: usize) -> String {
    if from == to {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches('\n');
        if body.trim().is_empty() {
            out.push_str(line.trim_start_matches(' '));
            continue;
        }
        if to > from {
            out.push_str(&" ".repeat(to - from));
            out.push_str(line);
        } else {
            let existing = body.len() - body.trim_start_matches(' ').len();
            out.push_str(&line[existing.min(from - to)..]);
        }
    }
    out
}

fn validate_yaml(text: &str) -> Result<(), MergeError> {
    let value: Value = serde_yaml::from_str(text).map_err(|err| {
        let line = err.location().map(|location| location.line()).unwrap_or(1);
        MergeError::parse(line, err.to_string())
    })?;
    match value {
        Value::Mapping(_) | Value::Null => Ok(()),
        _ => Err(MergeError::parse(1, "document root must be a mapping")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Comment,
    Content,
}

#[derive(Debug, Clone)]
struct Line<'a> {
    number: usize,
    text: &'a str,
    indent: usize,
    kind: LineKind,
}

fn classify(text: &str) -> Result<Vec<Line<'_>>, MergeError> {
    let mut lines = Vec::new();
    for (index, text) in text.lines().enumerate() {
        let number = index + 1;
        let body = text.trim_start_matches(' ');
        let indent = text.len() - body.len();
        let kind = if body.trim().is_empty() {
            LineKind::Blank
        } else if body.starts_with('#') || (indent == 0 && body.trim_end() == "---") {
            LineKind::Comment
        } else if body.starts_with('\t') {
            return Err(MergeError::parse(number, "tab character in indentation"));
        } else {
            LineKind::Content
        };
        lines.push(Line {
            number,
            text,
            indent,
            kind,
        });
    }
    Ok(lines)
}

struct Parser<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
    pending: Vec<usize>,
}

impl Parser<'_> {
    fn parse_mapping(&mut self, indent: usize) -> Result<Mapping, MergeError> {
        let mut mapping = Mapping::with_indent(indent);
        while let Some(line) = self.lines.get(self.pos) {
            match line.kind {
                LineKind::Blank | LineKind::Comment => {
                    self.pending.push(self.pos);
                    self.pos += 1;
                }
                LineKind::Content if line.indent < indent => break,
                LineKind::Content if line.indent > indent => {
                    return Err(MergeError::parse(line.number, "unexpected indentation"));
                }
                LineKind::Content => {
                    let entry = self.parse_entry(indent)?;
                    mapping.push(entry);
                }
            }
        }
        if indent > 0 {
            mapping.trailing = self.take_nested_trailing(indent);
        }
        Ok(mapping)
    }

    fn parse_entry(&mut self, indent: usize) -> Result<Entry, MergeError> {
        let line = self.lines[self.pos].clone();
        let body = &line.text[indent..];
        if is_sequence_item(body) {
            return Err(MergeError::parse(
                line.number,
                "expected a mapping entry, found a sequence item",
            ));
        }
        let (key, label, rest) = split_key(body)
            .ok_or_else(|| MergeError::parse(line.number, "expected a `key:` mapping entry"))?;
        let leading = self.take_pending();
        self.pos += 1;

        let inline = rest.to_string();
        let trimmed = rest.trim_start();
        let node = if trimmed.is_empty() || trimmed.starts_with('#') {
            match self.peek_content() {
                Some((next_indent, false)) if next_indent > indent => Node::Mapping {
                    inline,
                    mapping: self.parse_mapping(next_indent)?,
                },
                Some((next_indent, true)) if next_indent >= indent => Node::Raw {
                    inline,
                    lines: self.collect_block(indent, true),
                },
                _ => Node::Raw {
                    inline,
                    lines: Vec::new(),
                },
            }
        } else {
            Node::Raw {
                inline,
                lines: self.collect_block(indent, false),
            }
        };

        Ok(Entry {
            key,
            label,
            indent,
            leading,
            node,
        })
    }

    /// Indentation of the next content line and whether it starts a sequence item.
    fn peek_content(&self) -> Option<(usize, bool)> {
        self.lines[self.pos..]
            .iter()
            .find(|line| line.kind == LineKind::Content)
            .map(|line| (line.indent, is_sequence_item(&line.text[line.indent..])))
    }

    /// Continuation lines of a value whose key sits at `indent`. Trailing blank lines and
    /// comments that are not indented past the key are left for whatever follows.
    fn collect_block(&mut self, indent: usize, dash_at_indent: bool) -> Vec<String> {
        let start = self.pos;
        let mut end = self.pos;
        let mut cursor = self.pos;
        while let Some(line) = self.lines.get(cursor) {
            match line.kind {
                LineKind::Blank => cursor += 1,
                LineKind::Comment => {
                    cursor += 1;
                    if line.indent > indent {
                        end = cursor;
                    }
                }
                LineKind::Content => {
                    let continues = line.indent > indent
                        || (dash_at_indent
                            && line.indent == indent
                            && is_sequence_item(&line.text[line.indent..]));
                    if !continues {
                        break;
                    }
                    cursor += 1;
                    end = cursor;
                }
            }
        }
        self.pos = end;
        self.lines[start..end]
            .iter()
            .map(|line| line.text.to_string())
            .collect()
    }

    fn take_pending(&mut self) -> Vec<String> {
        self.pending
            .drain(..)
            .map(|index| self.lines[index].text.to_string())
            .collect()
    }

    /// Comments indented at least as deep as a nested mapping that closes stay with it.
    fn take_nested_trailing(&mut self, indent: usize) -> Vec<String> {
        let last_owned = self.pending.iter().rposition(|&index| {
            let line = &self.lines[index];
            line.kind == LineKind::Comment && line.indent >= indent
        });
        let Some(last_owned) = last_owned else {
            return Vec::new();
        };
        self.pending
            .drain(..=last_owned)
            .map(|index| self.lines[index].text.to_string())
            .collect()
    }
}

fn is_sequence_item(body: &str) -> bool {
    body == "-" || body.starts_with("- ")
}

/// Split `key: rest` into (key, label as written, text after the colon).
pub(crate) fn split_key(body: &str) -> Option<(String, String, &str)> {
    let first = body.chars().next()?;
    if first == '"' || first == '\'' {
        let close = closing_quote(body, first)?;
        let label = &body[..=close];
        let rest = body[close + 1..].strip_prefix(':')?;
        if !(rest.is_empty() || rest.starts_with(' ')) {
            return None;
        }
        let key: String = serde_yaml::from_str(label).ok()?;
        return Some((key, label.to_string(), rest));
    }
    if matches!(first, '[' | '{' | '-' | '?' | '&' | '*' | '!' | '|' | '>' | '#') {
        return None;
    }
    let bytes = body.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        if *byte == b'#' && index > 0 && bytes[index - 1] == b' ' {
            return None;
        }
        if *byte == b':' && (index + 1 == bytes.len() || bytes[index + 1] == b' ') {
            let label = &body[..index];
            let key = label.trim();
            if key.is_empty() {
                return None;
            }
            return Some((key.to_string(), label.to_string(), &body[index + 1..]));
        }
    }
    None
}

fn closing_quote(body: &str, quote: char) -> Option<usize> {
    let bytes = body.as_bytes();
    let quote = quote as u8;
    let mut index = 1;
    while index < bytes.len() {
        let byte = bytes[index];
        if quote == b'"' && byte == b'\\' {
            index += 2;
            continue;
        }
        if byte == quote {
            if quote == b'\'' && bytes.get(index + 1) == Some(&b'\'') {
                index += 2;
                continue;
            }
            return Some(index);
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{mapping, sequence, split_path, string};

    const SAMPLE: &str = "\
# Workflow managed by a generator
name: Pipeline

on:
  push:
    branches:
      - develop
      - main # production
  workflow_dispatch: # manual runs

env:
  NODE_VERSION: '18'

jobs:
  # Lint everything
  lint:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: |
          npm ci
          npm run lint
    # end of lint

  build:
    if: ${{ github.event_name == 'push' }}
    needs: [lint]
# trailing note
";

    fn path(dotted: &str) -> Vec<String> {
        split_path(dotted)
    }

    #[test]
    fn parse_then_render_is_byte_identical() {
        let document = Document::parse(SAMPLE).expect("parse");
        assert_eq!(document.render_with(None), SAMPLE);
    }

    #[test]
    fn parse_exposes_structure() {
        let document = Document::parse(SAMPLE).expect("parse");
        assert_eq!(document.keys(&[]), vec!["name", "on", "env", "jobs"]);
        assert_eq!(document.keys(&path("jobs")), vec!["lint", "build"]);
        assert!(document.contains(&path("on.push.branches")));
        assert!(document.contains(&path("on.workflow_dispatch")));
        assert!(!document.contains(&path("on.pull_request")));
        assert!(!document.contains(&path("on.push.branches.main")));
    }

    #[test]
    fn comments_attach_to_following_entry() {
        let document = Document::parse(SAMPLE).expect("parse");
        let jobs = document.mapping(&path("jobs")).expect("jobs");
        let lint = jobs.get("lint").expect("lint");
        assert_eq!(lint.leading, vec!["  # Lint everything".to_string()]);
        let build = jobs.get("build").expect("build");
        assert_eq!(build.leading, vec![String::new()]);
    }

    #[test]
    fn nested_trailing_comment_stays_with_its_mapping() {
        let document = Document::parse(SAMPLE).expect("parse");
        let lint = document.mapping(&path("jobs.lint")).expect("lint");
        assert_eq!(lint.trailing, vec!["    # end of lint".to_string()]);
    }

    #[test]
    fn resolve_or_create_appends_missing_keys() {
        let mut document = Document::parse(SAMPLE).expect("parse");
        let push = document
            .resolve_or_create(&path("on.pull_request"))
            .expect("resolve");
        push.put("branches", string("main"));
        let rendered = document.render_with(None);
        assert!(rendered.contains(
            "  workflow_dispatch: # manual runs\n  pull_request:\n    branches: main\n\nenv:"
        ));
    }

    #[test]
    fn resolve_or_create_promotes_null_values() {
        let mut document = Document::parse(SAMPLE).expect("parse");
        let dispatch = document
            .resolve_or_create(&path("on.workflow_dispatch"))
            .expect("resolve");
        dispatch.put("inputs", mapping([("version", string("x"))]));
        assert!(
            document
                .render_with(None)
                .contains("  workflow_dispatch: # manual runs\n    inputs:\n      version: x\n")
        );
    }

    #[test]
    fn resolve_or_create_reports_blocking_scalar() {
        let mut document = Document::parse("on: push\n").expect("parse");
        let blocked = document
            .resolve_or_create(&path("on.push.branches"))
            .expect_err("scalar blocks");
        assert_eq!(blocked, "on");
    }

    #[test]
    fn empty_flow_mapping_is_promoted() {
        let mut document = Document::parse("jobs: {}\n").expect("parse");
        let jobs = document.resolve_or_create(&path("jobs")).expect("resolve");
        jobs.put("build", mapping([("runs-on", string("ubuntu-latest"))]));
        assert_eq!(
            document.render_with(None),
            "jobs:\n  build:\n    runs-on: ubuntu-latest\n"
        );
    }

    #[test]
    fn flow_mapping_is_promoted_to_block() {
        let mut document =
            Document::parse("on: { push: { branches: [main] } } # triggers
name: x
").expect("parse");
        let push = document.resolve_or_create(&path("on.push")).expect("resolve");
        push.put("branches", sequence(["develop", "main"]));
        assert_eq!(
            document.render_with(None),
            "on:\n  push:\n    branches:\n      - develop\n      - main\nname: x\n"
        );
    }

    #[test]
    fn multiline_flow_mapping_is_promoted() {
        let mut document =
            Document::parse("env: {\n    A: '1',\n    B: two }\n").expect("parse");
        let env = document.resolve_or_create(&path("env")).expect("resolve");
        assert_eq!(env.keys(), vec!["A", "B"]);
        assert!(document.contains(&path("env.B")));
    }

    #[test]
    fn flow_sequence_still_blocks() {
        let mut document = Document::parse("on: [push, pull_request]\n").expect("parse");
        let blocked = document
            .resolve_or_create(&path("on.push"))
            .expect_err("sequence blocks");
        assert_eq!(blocked, "on");
    }

    #[test]
    fn generated_mappings_can_be_descended() {
        let mut document = Document::new();
        document
            .resolve_or_create(&[])
            .expect("root")
            .put("jobs", mapping([("a", mapping([("x", string("1"))]))]));
        let a = document.resolve_or_create(&path("jobs.a")).expect("resolve");
        a.put("y", string("2"));
        assert_eq!(document.render_with(None), "jobs:\n  a:\n    x: '1'\n    y: '2'\n");
    }

    #[test]
    fn adopt_replaces_value_or_inserts_before_anchor() {
        let previous =
            Document::parse("name: Mine\n# shell defaults\ndefaults:\n  run:\n    shell: bash\n").expect("parse");
        let mut document = Document::parse("# header\nname: Pipeline\n\njobs: {}\n").expect("parse");
        let root = document.resolve_or_create(&[]).expect("root");
        for entry in previous.mapping(&[]).expect("root").entries() {
            root.adopt(entry, "jobs");
        }
        assert_eq!(
            document.render_with(None),
            "# header\nname: Mine\n# shell defaults\ndefaults:\n  run:\n    shell: bash\n\njobs: {}\n"
        );
    }

    #[test]
    fn remove_drops_entry_and_its_comments() {
        let mut document = Document::parse(SAMPLE).expect("parse");
        let removed = document.remove(&path("jobs.lint")).expect("removed");
        assert_eq!(removed.key(), "lint");
        let rendered = document.render_with(None);
        assert!(!rendered.contains("Lint everything"));
        assert!(rendered.contains("jobs:\n\n  build:\n"));
    }

    #[test]
    fn insertion_lands_after_anchor() {
        let document = Document::parse(SAMPLE).expect("parse");
        let parent = path("jobs");
        let rendered = document.render_with(Some(&Insertion {
            parent: &parent,
            after: "lint",
            text: "  # marker\n",
        }));
        assert!(rendered.contains("    # end of lint\n  # marker\n\n  build:"));
    }

    #[test]
    fn insertion_without_anchor_appends_to_parent() {
        let document = Document::parse("jobs:\n  build:\n    x: 1\nname: y\n").expect("parse");
        let parent = path("jobs");
        let rendered = document.render_with(Some(&Insertion {
            parent: &parent,
            after: "version",
            text: "  # marker\n",
        }));
        assert_eq!(rendered, "jobs:\n  build:\n    x: 1\n  # marker\nname: y\n");
    }

    #[test]
    fn sequence_at_key_indent_is_kept_raw() {
        let text = "on:\n  push:\n    branches:\n    - main\n    - develop\n";
        let document = Document::parse(text).expect("parse");
        assert_eq!(document.render_with(None), text);
        assert!(document.contains(&path("on.push.branches")));
    }

    #[test]
    fn quoted_keys_are_unquoted() {
        let document = Document::parse("'on':\n  push: {}\n").expect("parse");
        assert_eq!(document.keys(&[]), vec!["on"]);
        assert_eq!(document.render_with(None), "'on':\n  push: {}\n");
    }

    #[test]
    fn render_at_reindents_entry() {
        let document = Document::parse(SAMPLE).expect("parse");
        let build = document.mapping(&path("jobs")).expect("jobs").get("build").expect("build");
        assert_eq!(
            build.render_at(4),
            "    build:\n      if: ${{ github.event_name == 'push' }}\n      needs: [lint]\n"
        );
    }

    #[test]
    fn rejects_invalid_yaml() {
        let err = Document::parse("jobs:\n  build: [unclosed\n").expect_err("invalid");
        assert!(matches!(err, MergeError::Parse { .. }), "{err:?}");
    }

    #[test]
    fn rejects_non_mapping_root() {
        let err = Document::parse("- a\n- b\n").expect_err("sequence root");
        assert!(err.to_string().contains("root must be a mapping"));
    }

    #[test]
    fn set_formatting_renders_blank_line_and_comment() {
        let mut document = Document::new();
        let root = document.resolve_or_create(&[]).expect("root");
        root.put("env", mapping([("A", string("b"))]));
        root.get_mut("env")
            .expect("env")
            .set_formatting(true, Some("Runtime pins\n\nEdit freely"));
        assert_eq!(
            document.render_with(None),
            "\n# Runtime pins\n#\n# Edit freely\nenv:\n  A: b\n"
        );
    }

    #[test]
    fn reindent_shifts_both_directions() {
        assert_eq!(reindent("a:\n  b: 1\n", 0, 2), "  a:\n    b: 1\n");
        assert_eq!(reindent("    a:\n\n      b: 1\n", 4, 2), "  a:\n\n    b: 1\n");
    }
}
