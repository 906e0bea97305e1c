use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::facet::Facet;
use crate::features::FeatureSet;

/// How many of a project's tags in one facet the talent covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetCoverage {
    pub matched: Vec<String>,
    pub missed: Vec<String>,
    pub matched_count: usize,
    pub project_count: usize,
    /// `matched_count / project_count` rounded to two decimals, 0.0 for an empty facet.
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchExplanation {
    pub facets: BTreeMap<Facet, FacetCoverage>,
}

impl MatchExplanation {
    pub fn facet(&self, facet: Facet) -> Option<&FacetCoverage> {
        self.facets.get(&facet)
    }
}

fn distinct(values: Option<&[String]>) -> BTreeSet<&str> {
    values
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .collect()
}

/// Compare tags facet by facet, independently of the model.
///
/// Tags are deduplicated; missing facets count as empty.
pub fn explain_match(project: &FeatureSet, talent: &FeatureSet) -> MatchExplanation {
    let facets = Facet::ALL
        .into_iter()
        .map(|facet| {
            let wanted = distinct(project.facet(facet));
            let offered = distinct(talent.facet(facet));

            let matched: Vec<String> = wanted
                .intersection(&offered)
                .map(|tag| tag.to_string())
                .collect();
            let missed: Vec<String> = wanted
                .difference(&offered)
                .map(|tag| tag.to_string())
                .collect();

            let coverage = if wanted.is_empty() {
                0.0
            } else {
                (matched.len() as f64 / wanted.len() as f64 * 100.0).round() / 100.0
            };

            (
                facet,
                FacetCoverage {
                    matched_count: matched.len(),
                    project_count: wanted.len(),
                    matched,
                    missed,
                    coverage,
                },
            )
        })
        .collect();

    MatchExplanation { facets }
}
