use std::fmt;

use serde::{Deserialize, Serialize};

use crate::facet::Facet;
use crate::scoring::PipelineError;

/// Tag lists of a project or a talent, one optional list per facet.
///
/// A facet that is absent from the payload stays `None`, which lets the
/// single prediction path reject it while batch ranking defaults it to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl FeatureSet {
    pub fn facet(&self, facet: Facet) -> Option<&[String]> {
        let values = match facet {
            Facet::Platform => &self.platform,
            Facet::Product => &self.product,
            Facet::Role => &self.role,
            Facet::Language => &self.language,
            Facet::Tools => &self.tools,
        };
        values.as_deref()
    }

    /// Tags of `facet`, failing with [`PipelineError::MissingFeature`] when the key is absent.
    pub fn require(&self, facet: Facet) -> Result<&[String], PipelineError> {
        self.facet(facet)
            .ok_or(PipelineError::MissingFeature(facet))
    }

    /// Replace every absent facet with an empty list.
    pub fn with_defaults(mut self) -> Self {
        for slot in [
            &mut self.platform,
            &mut self.product,
            &mut self.role,
            &mut self.language,
            &mut self.tools,
        ] {
            slot.get_or_insert_with(Vec::new);
        }
        self
    }

    /// Raw tag count summed over all present facets, duplicates included.
    pub fn tag_count(&self) -> usize {
        Facet::ALL
            .iter()
            .filter_map(|facet| self.facet(*facet))
            .map(<[String]>::len)
            .sum()
    }
}

/// Opaque talent identifier, echoed back untouched in ranking results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TalentId {
    Number(i64),
    Text(String),
}

impl fmt::Display for TalentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TalentId::Number(id) => write!(f, "{id}"),
            TalentId::Text(id) => f.write_str(id),
        }
    }
}

impl From<&str> for TalentId {
    fn from(value: &str) -> Self {
        TalentId::Text(value.to_string())
    }
}

impl From<i64> for TalentId {
    fn from(value: i64) -> Self {
        TalentId::Number(value)
    }
}

/// A talent entry of a ranking request: identifier plus its facets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalentFeatures {
    pub talent_id: TalentId,
    #[serde(flatten)]
    pub features: FeatureSet,
}
