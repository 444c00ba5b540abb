//! Filter stages and their left-to-right composition.

use crate::types::Record;

/// One filtering step in a query chain.
///
/// Stages operate on a selection: an ordered list of positions into the live
/// record sequence. Working on positions rather than copies lets delete and
/// update act on exactly the selected entries, even when structurally equal
/// duplicates exist elsewhere in the sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterStage {
    /// Keep records that subset-match the pattern.
    Pattern(Record),

    /// 1-indexed start: drop the first `n - 1` selected records.
    Offset(usize),

    /// Keep at most the first `n` selected records.
    Limit(usize),
}

impl FilterStage {
    /// Apply this stage to a selection of positions into `records`.
    pub fn apply(&self, records: &[Record], selection: Vec<usize>) -> Vec<usize> {
        match self {
            FilterStage::Pattern(pattern) => {
                if pattern.is_empty() {
                    return selection;
                }
                selection
                    .into_iter()
                    .filter(|&pos| records[pos].matches(pattern))
                    .collect()
            }
            FilterStage::Offset(start) => {
                let skip = start.saturating_sub(1);
                if skip >= selection.len() {
                    Vec::new()
                } else {
                    let mut selection = selection;
                    selection.drain(..skip);
                    selection
                }
            }
            FilterStage::Limit(n) => {
                let mut selection = selection;
                selection.truncate(*n);
                selection
            }
        }
    }
}

/// The effective filter of a chain: its stages reduced in chaining order.
///
/// Applying the filter equals applying stage 1, then stage 2 to its output,
/// and so on. The empty filter is the identity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    stages: Vec<FilterStage>,
}

impl Filter {
    /// The identity filter.
    pub fn identity() -> Self {
        Self::default()
    }

    /// A new filter with `stage` appended. `self` is left untouched.
    pub fn then(&self, stage: FilterStage) -> Self {
        let mut stages = Vec::with_capacity(self.stages.len() + 1);
        stages.extend(self.stages.iter().cloned());
        stages.push(stage);
        Self { stages }
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    /// Positions in `records` selected by this filter, in sequence order.
    pub fn positions(&self, records: &[Record]) -> Vec<usize> {
        let all: Vec<usize> = (0..records.len()).collect();
        self.stages.iter().fold(all, |selection, stage| {
            let selected = stage.apply(records, selection);
            tracing::trace!(
                target: "record_chain::query",
                ?stage,
                remaining = selected.len(),
                "applied filter stage"
            );
            selected
        })
    }

    /// Clones of the selected records, in sequence order.
    pub fn apply(&self, records: &[Record]) -> Vec<Record> {
        self.positions(records)
            .into_iter()
            .map(|pos| records[pos].clone())
            .collect()
    }
}

impl FromIterator<FilterStage> for Filter {
    fn from_iter<I: IntoIterator<Item = FilterStage>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}
