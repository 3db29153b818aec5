use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use thiserror::Error;

/// Errors raised while freezing the compartment label set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompartmentSetError {
    #[error("compartment set must contain '{0}'")]
    MissingRequired(&'static str),
    #[error("duplicate compartment label '{0}'")]
    Duplicate(String),
    #[error("compartment label '{0}' is not a valid identifier")]
    InvalidLabel(String),
    #[error("compartment set must not be empty")]
    Empty,
}

/// Ordered, immutable set of epidemiological compartment labels.
///
/// Labels carry fixed position indices assigned in input order; every tensor
/// in the simulation uses that order on its last axis. The set is frozen at
/// startup (it derives from the disease-model identity) and must contain `S`
/// and `E`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompartmentSet {
    labels: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl CompartmentSet {
    pub fn new(labels: &[&str]) -> Result<Self, CompartmentSetError> {
        if labels.is_empty() {
            return Err(CompartmentSetError::Empty);
        }
        let mut index = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            let valid = !label.is_empty()
                && label.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(CompartmentSetError::InvalidLabel(label.to_string()));
            }
            if index.insert(label.to_string(), i).is_some() {
                return Err(CompartmentSetError::Duplicate(label.to_string()));
            }
        }
        for required in ["S", "E"] {
            if !index.contains_key(required) {
                return Err(CompartmentSetError::MissingRequired(required));
            }
        }
        Ok(Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            index,
        })
    }

    /// The SEIRS compartment set.
    pub fn seirs() -> Self {
        Self::new(&["S", "E", "I", "R"]).unwrap()
    }

    /// The SEATIRD compartment set.
    pub fn seatird() -> Self {
        Self::new(&["S", "E", "A", "T", "I", "R", "D"]).unwrap()
    }

    /// The SEIHRD compartment set.
    pub fn seihrd() -> Self {
        Self::new(&["S", "E", "IA", "IP", "IS", "H", "R", "D"]).unwrap()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Index of a label that must exist in the frozen set.
    ///
    /// # Panics
    /// Panics if the label is absent. Models resolve their compartments once
    /// at construction, so a miss is a wiring bug, not a runtime condition.
    pub fn resolve(&self, label: &str) -> usize {
        self.position(label)
            .unwrap_or_else(|| panic!("compartment '{label}' not in set {:?}", self.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_keep_input_order() {
        let set = CompartmentSet::seatird();
        assert_eq!(set.len(), 7);
        assert_eq!(set.resolve("S"), 0);
        assert_eq!(set.resolve("A"), 2);
        assert_eq!(set.resolve("D"), 6);
        assert_eq!(set.label(3), "T");
    }

    #[test]
    fn missing_s_or_e_rejected() {
        assert_eq!(
            CompartmentSet::new(&["S", "I", "R"]),
            Err(CompartmentSetError::MissingRequired("E"))
        );
        assert_eq!(
            CompartmentSet::new(&["E", "I", "R"]),
            Err(CompartmentSetError::MissingRequired("S"))
        );
    }

    #[test]
    fn duplicates_rejected() {
        assert_eq!(
            CompartmentSet::new(&["S", "E", "I", "I"]),
            Err(CompartmentSetError::Duplicate("I".to_string()))
        );
    }

    #[test]
    fn non_identifier_labels_rejected() {
        assert!(matches!(
            CompartmentSet::new(&["S", "E", "2nd"]),
            Err(CompartmentSetError::InvalidLabel(_))
        ));
        assert!(matches!(
            CompartmentSet::new(&["S", "E", "I-A"]),
            Err(CompartmentSetError::InvalidLabel(_))
        ));
    }

    #[test]
    #[should_panic(expected = "compartment 'H' not in set")]
    fn resolve_missing_label_panics() {
        CompartmentSet::seirs().resolve("H");
    }
}
