pub mod database;
pub mod static_files;

use std::collections::HashMap;
use std::path::PathBuf;

use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::warn;

use crate::facet::Facet;

pub use database::{load_database_vocabulary, mapping_from_rows};
pub use static_files::{load_max_length_table, load_static_vocabulary};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{facet}: index {index} for {name:?} is not a valid vocabulary index")]
    InvalidIndex {
        facet: Facet,
        name: String,
        index: i64,
    },
    #[error("{facet}: index {index} is assigned to both {first:?} and {second:?}")]
    DuplicateIndex {
        facet: Facet,
        index: u32,
        first: String,
        second: String,
    },
    #[error("max-length table has no entry for {0}")]
    MissingMaxLength(Facet),
    #[error("max-length for {facet} must be positive, got {value}")]
    InvalidMaxLength { facet: Facet, value: i64 },
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
}

/// Result of looking a category name up in a facet mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Mapped(u32),
    OutOfVocabulary,
}

/// Immutable `name -> index` vocabulary of one facet.
#[derive(Debug, Clone)]
pub struct FacetMapping {
    facet: Facet,
    indices: HashMap<String, u32>,
    oov_index: u32,
}

impl FacetMapping {
    /// Build a mapping from `(name, index)` pairs.
    ///
    /// A name seen twice keeps its last index. Two names sharing one index, or
    /// an index that does not fit `u32`, are rejected.
    pub fn new<I, S>(facet: Facet, entries: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut indices: HashMap<String, u32> = HashMap::new();

        for (name, raw_index) in entries {
            let name = name.into();
            let index = u32::try_from(raw_index)
                .ok()
                .filter(|index| *index < u32::MAX)
                .ok_or_else(|| MappingError::InvalidIndex {
                    facet,
                    name: name.clone(),
                    index: raw_index,
                })?;

            if let Some(previous) = indices.insert(name.clone(), index) {
                if previous != index {
                    warn!(facet = %facet, name = %name, previous, index, "duplicate category name; keeping last index");
                }
            }
        }

        let mut owners: HashMap<u32, &str> = HashMap::with_capacity(indices.len());
        for (name, index) in &indices {
            if let Some(first) = owners.insert(*index, name.as_str()) {
                let (first, second) = if first < name.as_str() {
                    (first, name.as_str())
                } else {
                    (name.as_str(), first)
                };
                return Err(MappingError::DuplicateIndex {
                    facet,
                    index: *index,
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
        }

        // One past the largest valid index, and never the pad slot.
        let oov_index = indices
            .values()
            .max()
            .map(|max| max + 1)
            .unwrap_or(1)
            .max(1);

        Ok(Self {
            facet,
            indices,
            oov_index,
        })
    }

    pub fn facet(&self) -> Facet {
        self.facet
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        match self.indices.get(name) {
            Some(index) => Lookup::Mapped(*index),
            None => Lookup::OutOfVocabulary,
        }
    }

    /// Index substituted for names absent from the mapping.
    pub fn oov_index(&self) -> u32 {
        self.oov_index
    }

    pub fn contains_index(&self, index: u32) -> bool {
        self.indices.values().any(|value| *value == index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Per-facet bound on encoded sequence length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxLengthTable {
    lengths: [usize; 5],
}

impl MaxLengthTable {
    pub fn new(lookup: impl Fn(Facet) -> Option<i64>) -> Result<Self, MappingError> {
        let mut lengths = [0usize; 5];
        for facet in Facet::ALL {
            let value = lookup(facet).ok_or(MappingError::MissingMaxLength(facet))?;
            lengths[facet.slot()] = usize::try_from(value)
                .ok()
                .filter(|len| *len > 0)
                .ok_or(MappingError::InvalidMaxLength { facet, value })?;
        }
        Ok(Self { lengths })
    }

    /// Every facet bounded by its own vocabulary size.
    pub fn from_cardinality(mappings: &[FacetMapping; 5]) -> Result<Self, MappingError> {
        Self::new(|facet| Some(mappings[facet.slot()].len() as i64))
    }

    pub fn uniform(length: usize) -> Self {
        Self {
            lengths: [length.max(1); 5],
        }
    }

    pub fn get(&self, facet: Facet) -> usize {
        self.lengths[facet.slot()]
    }
}

/// Read access to the facet vocabularies, whatever their source.
pub trait MappingProvider: Send + Sync {
    fn mapping(&self, facet: Facet) -> &FacetMapping;

    fn max_length(&self, facet: Facet) -> usize;
}

/// All five facet mappings plus their max-length table, loaded once at startup.
#[derive(Debug, Clone)]
pub struct FacetVocabulary {
    mappings: [FacetMapping; 5],
    max_lengths: MaxLengthTable,
}

impl FacetVocabulary {
    /// Assemble a vocabulary, `load` being called once per facet in slot order.
    pub fn build(
        mut load: impl FnMut(Facet) -> Result<FacetMapping, MappingError>,
        max_lengths: Option<MaxLengthTable>,
    ) -> Result<Self, MappingError> {
        let mappings = [
            load(Facet::Platform)?,
            load(Facet::Product)?,
            load(Facet::Role)?,
            load(Facet::Language)?,
            load(Facet::Tools)?,
        ];

        let max_lengths = match max_lengths {
            Some(table) => table,
            None => MaxLengthTable::from_cardinality(&mappings)?,
        };

        Ok(Self {
            mappings,
            max_lengths,
        })
    }
}

impl MappingProvider for FacetVocabulary {
    fn mapping(&self, facet: Facet) -> &FacetMapping {
        &self.mappings[facet.slot()]
    }

    fn max_length(&self, facet: Facet) -> usize {
        self.max_lengths.get(facet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oov_index_is_disjoint_from_valid_indices() {
        let zero_based = FacetMapping::new(Facet::Platform, [("web", 0), ("mobile", 1)]).unwrap();
        assert_eq!(zero_based.oov_index(), 2);
        assert!(!zero_based.contains_index(zero_based.oov_index()));

        let sparse = FacetMapping::new(Facet::Tools, [("docker", 7), ("git", 3)]).unwrap();
        assert_eq!(sparse.oov_index(), 8);
        assert!(!sparse.contains_index(sparse.oov_index()));
    }

    #[test]
    fn empty_mapping_keeps_oov_off_the_pad_slot() {
        let empty = FacetMapping::new(Facet::Role, Vec::<(String, i64)>::new()).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.oov_index(), 1);
    }

    #[test]
    fn lookup_is_tagged() {
        let mapping = FacetMapping::new(Facet::Language, [("python", 1)]).unwrap();
        assert_eq!(mapping.lookup("python"), Lookup::Mapped(1));
        assert_eq!(mapping.lookup("cobol"), Lookup::OutOfVocabulary);
    }

    #[test]
    fn rejects_shared_and_negative_indices() {
        let shared = FacetMapping::new(Facet::Role, [("backend", 1), ("frontend", 1)]);
        match shared {
            Err(MappingError::DuplicateIndex {
                index,
                first,
                second,
                ..
            }) => {
                assert_eq!(index, 1);
                assert_eq!(first, "backend");
                assert_eq!(second, "frontend");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let negative = FacetMapping::new(Facet::Role, [("backend", -1)]);
        assert!(matches!(negative, Err(MappingError::InvalidIndex { index: -1, .. })));
    }

    #[test]
    fn repeated_name_keeps_last_index() {
        let mapping = FacetMapping::new(Facet::Product, [("saas", 1), ("saas", 2)]).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.lookup("saas"), Lookup::Mapped(2));
    }

    #[test]
    fn max_length_table_requires_every_positive_facet() {
        let missing = MaxLengthTable::new(|facet| (facet != Facet::Tools).then_some(3));
        assert!(matches!(missing, Err(MappingError::MissingMaxLength(Facet::Tools))));

        let zero = MaxLengthTable::new(|facet| Some(if facet == Facet::Role { 0 } else { 3 }));
        assert!(matches!(
            zero,
            Err(MappingError::InvalidMaxLength {
                facet: Facet::Role,
                value: 0
            })
        ));
    }

    #[test]
    fn vocabulary_derives_max_length_from_cardinality() {
        let vocabulary = FacetVocabulary::build(
            |facet| FacetMapping::new(facet, [("a", 1), ("b", 2)]),
            None,
        )
        .unwrap();

        for facet in Facet::ALL {
            assert_eq!(vocabulary.max_length(facet), 2);
            assert_eq!(vocabulary.mapping(facet).facet(), facet);
        }
    }

    #[test]
    fn explicit_max_lengths_win_over_cardinality() {
        let vocabulary = FacetVocabulary::build(
            |facet| FacetMapping::new(facet, [("a", 1)]),
            Some(MaxLengthTable::uniform(4)),
        )
        .unwrap();

        assert_eq!(vocabulary.max_length(Facet::Platform), 4);
    }
}
