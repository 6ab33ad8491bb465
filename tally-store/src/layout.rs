use crate::backend::{Document, Fields};
use crate::error::LayoutError;
use std::collections::HashSet;
use tally_core::{CandidateIndex, Tally};

/// Mapping from candidate index to the document field holding its counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    fields: Box<[String]>,
}

impl FieldLayout {
    /// `count_0`, `count_1`, ... for the given number of candidates
    pub fn indexed(candidates: usize) -> Self {
        Self {
            fields: (0..candidates).map(Self::default_field).collect(),
        }
    }

    /// name of the counter of the candidate at `position` when none is given
    pub fn default_field(position: usize) -> String {
        format!("count_{}", position)
    }

    pub fn new<I, S>(fields: I) -> Result<Self, LayoutError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if field.is_empty() {
                return Err(LayoutError::EmptyField { index });
            }
            if !seen.insert(field.as_str()) {
                return Err(LayoutError::DuplicateField {
                    field: field.clone(),
                });
            }
        }
        Ok(Self {
            fields: fields.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, candidate: CandidateIndex) -> Option<&str> {
        self.fields.get(candidate.as_usize()).map(String::as_str)
    }

    /// read the tally out of a document. Missing counters are zero, fields
    /// foreign to the layout are ignored.
    pub fn decode(&self, document: &Document) -> Tally {
        Tally::from_counts(self.fields.iter().map(|f| document.field(f)).collect())
    }

    /// the persisted record of an empty tally
    pub fn zeroed(&self) -> Fields {
        self.fields.iter().map(|f| (f.clone(), 0)).collect()
    }
}
