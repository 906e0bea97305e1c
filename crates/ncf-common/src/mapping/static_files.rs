use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use super::{FacetMapping, FacetVocabulary, MappingError, MaxLengthTable, MappingProvider};
use crate::facet::Facet;

pub const MAX_LENGTH_FILE: &str = "maxlen.json";

pub fn mapping_file_name(facet: Facet) -> String {
    format!("mapping_{}.json", facet.as_str())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, MappingError> {
    let raw = fs::read_to_string(path).map_err(|source| MappingError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|source| MappingError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a `{"platform": 3, "product": 2, ...}` table.
pub fn load_max_length_table(path: &Path) -> Result<MaxLengthTable, MappingError> {
    let raw: HashMap<String, i64> = read_json(path)?;
    MaxLengthTable::new(|facet| raw.get(facet.as_str()).copied())
}

/// Load `mapping_<facet>.json` for every facet plus `maxlen.json` from `dir`.
pub fn load_static_vocabulary(dir: &Path) -> Result<FacetVocabulary, MappingError> {
    let max_lengths = load_max_length_table(&dir.join(MAX_LENGTH_FILE))?;

    let vocabulary = FacetVocabulary::build(
        |facet| {
            let entries: HashMap<String, i64> = read_json(&dir.join(mapping_file_name(facet)))?;
            FacetMapping::new(facet, entries)
        },
        Some(max_lengths),
    )?;

    for facet in Facet::ALL {
        info!(
            facet = %facet,
            entries = vocabulary.mapping(facet).len(),
            max_length = vocabulary.max_length(facet),
            "loaded static facet mapping"
        );
    }

    Ok(vocabulary)
}
