use std::time::Instant;

use deadpool_postgres::Client;
use tracing::{info, instrument};

use super::{FacetMapping, FacetVocabulary, MappingError, MappingProvider, MaxLengthTable};
use crate::db::PgPool;
use crate::facet::Facet;

fn facet_query(facet: Facet) -> String {
    // Table names come from the closed Facet enum, never from input.
    format!(
        "SELECT id::BIGINT AS id, name::TEXT AS name FROM {} ORDER BY id",
        facet.table_name()
    )
}

/// Build `{name: id}` from `(id, name)` rows already ordered by id.
pub fn mapping_from_rows(
    facet: Facet,
    rows: impl IntoIterator<Item = (i64, String)>,
) -> Result<FacetMapping, MappingError> {
    FacetMapping::new(facet, rows.into_iter().map(|(id, name)| (name, id)))
}

async fn fetch_facet_rows(
    client: &Client,
    facet: Facet,
) -> Result<Vec<(i64, String)>, MappingError> {
    let started = Instant::now();
    let rows = client.query(facet_query(facet).as_str(), &[]).await?;

    info!(
        facet = %facet,
        table = facet.table_name(),
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fetched facet vocabulary"
    );

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<_, i64>("id"), row.get::<_, String>("name")))
        .collect())
}

/// Load every facet vocabulary from the relational store.
///
/// Without an explicit `max_lengths` table each facet is bounded by its own
/// vocabulary size.
#[instrument(skip(pool, max_lengths))]
pub async fn load_database_vocabulary(
    pool: &PgPool,
    max_lengths: Option<MaxLengthTable>,
) -> Result<FacetVocabulary, MappingError> {
    let client = pool.get().await?;

    let mut fetched = Vec::with_capacity(Facet::ALL.len());
    for facet in Facet::ALL {
        fetched.push(fetch_facet_rows(&client, facet).await?);
    }

    let mut fetched = fetched.into_iter();
    let vocabulary = FacetVocabulary::build(
        |facet| mapping_from_rows(facet, fetched.next().unwrap_or_default()),
        max_lengths,
    )?;

    for facet in Facet::ALL {
        info!(
            facet = %facet,
            entries = vocabulary.mapping(facet).len(),
            max_length = vocabulary.max_length(facet),
            "loaded database facet mapping"
        );
    }

    Ok(vocabulary)
}
