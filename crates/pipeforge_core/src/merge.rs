use tracing::debug;

use crate::document::Document;
use crate::error::MergeError;
use crate::ops::{Operation, OperationKind};

/// What one merge pass did, by dotted path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub written: Vec<String>,
    pub preserved: Vec<String>,
    pub skipped: Vec<String>,
}

/// Apply `operations` to `document` in order.
///
/// `set` replaces the addressed node wholesale; `preserve` only installs its value when
/// nothing is there yet, leaving an existing node and its comments alone. Formatting hints
/// are applied to every node an operation writes. Nodes no operation addresses are never
/// touched.
pub fn apply_operations(
    document: &mut Document,
    operations: &[Operation],
) -> Result<MergeReport, MergeError> {
    let mut report = MergeReport::default();
    for operation in operations {
        apply_operation(document, operation, &mut report)?;
    }

    // A later operation may have replaced an ancestor of an earlier required one.
    for operation in operations.iter().filter(|operation| operation.required) {
        if !document.contains(&operation.path) {
            return Err(MergeError::structural(
                operation.dotted_path(),
                "required path is missing after merge",
            ));
        }
    }
    Ok(report)
}

fn apply_operation(
    document: &mut Document,
    operation: &Operation,
    report: &mut MergeReport,
) -> Result<(), MergeError> {
    let dotted = operation.dotted_path();
    let Some((leaf, parents)) = operation.path.split_last() else {
        return Err(MergeError::structural(dotted, "operation path is empty"));
    };

    let parent = match document.resolve_or_create(parents) {
        Ok(parent) => parent,
        Err(blocked) if operation.required => {
            return Err(MergeError::structural(
                dotted,
                format!("`{blocked}` is not a mapping"),
            ));
        }
        Err(blocked) => {
            debug!(path = %dotted, %blocked, "skipping operation: ancestor is not a mapping");
            report.skipped.push(dotted);
            return Ok(());
        }
    };

    if operation.kind == OperationKind::Preserve && parent.get(leaf).is_some() {
        debug!(path = %dotted, "preserving existing node");
        report.preserved.push(dotted);
        return Ok(());
    }

    let created = parent.put(leaf, operation.value.clone());
    if let Some(entry) = parent.get_mut(leaf) {
        entry.set_formatting(operation.space_before, operation.comment_before.as_deref());
    }
    debug!(
        path = %dotted,
        kind = operation.kind.as_str(),
        created,
        "wrote node"
    );
    report.written.push(dotted);
    Ok(())
}
