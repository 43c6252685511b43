//! Per-procedure label table.
//!
//! Labels are allocated before or after the branches that use them, may
//! be referenced any number of times, and are marked at most once. At
//! the end of a procedure every referenced label must have been marked.

use crate::error::LowerError;
use crate::instr::Label;

#[derive(Clone, Debug, Default)]
struct LabelInfo {
    /// Debug name for named labels (`<return>`, `noStateContinuation`).
    name: Option<&'static str>,
    /// Instruction position where the label was marked.
    marked_at: Option<usize>,
    referenced: bool,
}

#[derive(Debug, Default)]
pub struct LabelTable {
    labels: Vec<LabelInfo>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a synthetic label.
    pub fn new_label(&mut self) -> Label {
        self.push(None)
    }

    /// Allocate a label carrying a debug name.
    pub fn named(&mut self, name: &'static str) -> Label {
        self.push(Some(name))
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "label counts never exceed u32"
    )]
    fn push(&mut self, name: Option<&'static str>) -> Label {
        let label = Label::new(self.labels.len() as u32);
        self.labels.push(LabelInfo {
            name,
            ..LabelInfo::default()
        });
        label
    }

    fn info_mut(&mut self, label: Label) -> Result<&mut LabelInfo, LowerError> {
        self.labels
            .get_mut(label.index())
            .ok_or(LowerError::UnknownLabel(label))
    }

    /// Record that `label` is marked at instruction `position`.
    pub fn mark(&mut self, label: Label, position: usize) -> Result<(), LowerError> {
        let info = self.info_mut(label)?;
        if let Some(first) = info.marked_at {
            tracing::error!(label = label.raw(), first, position, "label marked twice");
            return Err(LowerError::LabelMarkedTwice(label));
        }
        info.marked_at = Some(position);
        Ok(())
    }

    /// Record a branch to `label`.
    pub fn reference(&mut self, label: Label) -> Result<(), LowerError> {
        self.info_mut(label)?.referenced = true;
        Ok(())
    }

    /// Whether any branch to `label` has been recorded so far.
    pub fn is_referenced(&self, label: Label) -> bool {
        self.labels
            .get(label.index())
            .is_some_and(|info| info.referenced)
    }

    pub fn name(&self, label: Label) -> Option<&'static str> {
        self.labels.get(label.index()).and_then(|info| info.name)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "label counts never exceed u32"
    )]
    pub fn len(&self) -> u32 {
        self.labels.len() as u32
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Check that every referenced label was marked.
    pub fn finish(&self) -> Result<(), LowerError> {
        for (i, info) in self.labels.iter().enumerate() {
            if info.referenced && info.marked_at.is_none() {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "label counts never exceed u32"
                )]
                let label = Label::new(i as u32);
                tracing::error!(label = i, name = ?info.name, "label referenced but never marked");
                return Err(LowerError::UnmarkedLabel(label));
            }
        }
        Ok(())
    }
}
