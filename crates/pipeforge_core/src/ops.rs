use serde_yaml::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Authoritative overwrite of the node at the path.
    Set,
    /// Install the value only when nothing exists at the path yet.
    Preserve,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Preserve => "preserve",
        }
    }
}

/// One declarative node of a managed document.
///
/// A document's machine-owned skeleton is a flat, ordered list of these. Sub-generators
/// each produce their own slice of the list and the composer concatenates them.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub path: Vec<String>,
    pub kind: OperationKind,
    pub value: Value,
    pub required: bool,
    pub space_before: bool,
    pub comment_before: Option<String>,
}

impl Operation {
    pub fn new(kind: OperationKind, path: &str, value: impl Into<Value>) -> Self {
        Self {
            path: split_path(path),
            kind,
            value: value.into(),
            required: false,
            space_before: false,
            comment_before: None,
        }
    }

    pub fn set(path: &str, value: impl Into<Value>) -> Self {
        Self::new(OperationKind::Set, path, value)
    }

    pub fn preserve(path: &str, value: impl Into<Value>) -> Self {
        Self::new(OperationKind::Preserve, path, value)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn space_before(mut self) -> Self {
        self.space_before = true;
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comment_before = Some(text.into());
        self
    }

    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build an ordered YAML mapping from `(key, value)` pairs.
pub fn mapping<K, I>(entries: I) -> Value
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    let mut out = serde_yaml::Mapping::new();
    for (key, value) in entries {
        out.insert(Value::String(key.into()), value);
    }
    Value::Mapping(out)
}

pub fn sequence<T, I>(items: I) -> Value
where
    T: Into<Value>,
    I: IntoIterator<Item = T>,
{
    Value::Sequence(items.into_iter().map(Into::into).collect())
}

pub fn string(value: impl Into<String>) -> Value {
    Value::String(value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_drops_empty_segments() {
        assert_eq!(split_path("on.push.branches"), vec!["on", "push", "branches"]);
        assert_eq!(split_path(".jobs..version."), vec!["jobs", "version"]);
        assert!(split_path("").is_empty());
    }

    #[test]
    fn builder_sets_flags() {
        let op = Operation::set("jobs.version", string("x"))
            .required()
            .space_before()
            .comment("Version job");
        assert_eq!(op.kind, OperationKind::Set);
        assert!(op.required);
        assert!(op.space_before);
        assert_eq!(op.comment_before.as_deref(), Some("Version job"));
        assert_eq!(op.dotted_path(), "jobs.version");
    }

    #[test]
    fn mapping_keeps_insertion_order() {
        let value = mapping([("zeta", string("1")), ("alpha", string("2"))]);
        let keys = value
            .as_mapping()
            .expect("mapping")
            .keys()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
