//! Column-alias schema.
//!
//! Input CSVs from different sources spell the same column differently. The
//! accepted spellings come from configuration as `{expected: [aliases]}` and
//! are resolved once against a header row into column indexes.

use csv::StringRecord;
use std::collections::{BTreeMap, HashMap};

use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct ColumnSchema {
    accepted: BTreeMap<String, Vec<String>>,
}

/// Expected column name → index in the source header
#[derive(Debug, Clone, Default)]
pub struct ResolvedColumns {
    indexes: HashMap<String, usize>,
}

impl ColumnSchema {
    pub fn new(accepted: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            accepted: accepted.clone(),
        }
    }

    /// Resolve every known column present in `headers`. Any `required`
    /// column that cannot be found is reported, all at once.
    pub fn resolve(
        &self,
        headers: &StringRecord,
        required: &[&str],
        context: &str,
    ) -> Result<ResolvedColumns, PipelineError> {
        let header_index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.trim().to_ascii_lowercase(), idx))
            .collect();

        let lookup = |expected: &str| -> Option<usize> {
            let spellings = std::iter::once(expected)
                .chain(self.accepted.get(expected).into_iter().flatten().map(String::as_str));
            spellings
                .map(|s| s.to_ascii_lowercase())
                .find_map(|s| header_index.get(&s).copied())
        };

        let mut resolved = ResolvedColumns::default();
        let expected = self
            .accepted
            .keys()
            .map(String::as_str)
            .chain(required.iter().copied());
        for name in expected {
            if let Some(idx) = lookup(name) {
                resolved.indexes.insert(name.to_string(), idx);
            }
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|name| !resolved.indexes.contains_key(**name))
            .map(|name| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(PipelineError::missing_columns(context, missing));
        }
        Ok(resolved)
    }
}

impl ResolvedColumns {
    pub fn index(&self, name: &str) -> Option<usize> {
        self.indexes.get(name).copied()
    }

    /// Trimmed cell value; `None` for an absent column or blank cell
    pub fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index(name)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}
