//! Ranks catalog instruments against free-text queries.
//!
//! Matching runs on folded text (see [`text`]), so Arabic and Persian
//! spellings, locale digits, and joiner variants of the same name compare
//! equal. Each instrument is scored by its best field; ranking is by score
//! descending, then identifier ascending.

mod score;
pub mod text;

use std::cmp::Ordering;

use tracing::debug;
use tse_store::models::{Instrument, MatchedField, SearchHit};

use crate::catalog::CatalogSnapshot;
use crate::error::QueryError;
use score::{FieldMatch, score_field};
use text::FoldedText;

/// Penalty applied to instruments no longer present in the listing.
const INACTIVE_FACTOR: f64 = 0.9;

/// Most candidates reported back when a query is ambiguous.
pub const MAX_AMBIGUOUS_CANDIDATES: usize = 5;

/// Folded forms of every searchable field of one instrument, computed once
/// per catalog build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchKeys {
    symbol: FoldedText,
    name: FoldedText,
    aliases: Vec<FoldedText>,
}

impl SearchKeys {
    #[must_use]
    pub fn new(instrument: &Instrument) -> Self {
        Self {
            symbol: FoldedText::new(&instrument.symbol),
            name: FoldedText::new(&instrument.name),
            aliases: instrument.aliases.iter().map(|alias| FoldedText::new(alias)).collect(),
        }
    }

    fn best_match(&self, query: &FoldedText) -> Option<FieldMatch> {
        let fields = std::iter::once((&self.symbol, MatchedField::Symbol))
            .chain(std::iter::once((&self.name, MatchedField::Name)))
            .chain(self.aliases.iter().map(|alias| (alias, MatchedField::Alias)));

        fields
            .filter_map(|(candidate, field)| score_field(query, candidate, field))
            .fold(None, |best: Option<FieldMatch>, next| match best {
                Some(current) if !next.beats(&current) => Some(current),
                _ => Some(next),
            })
    }
}

/// Ranks catalog instruments against `query`.
///
/// An empty query (after folding) yields no hits.
///
/// # Errors
/// Returns `QueryError::InvalidInput` when `limit` is zero or negative.
pub fn search(
    catalog: &CatalogSnapshot,
    query: &str,
    limit: i64,
) -> Result<Vec<SearchHit>, QueryError> {
    if limit <= 0 {
        return Err(QueryError::InvalidInput(format!(
            "limit must be a positive integer, got {limit}"
        )));
    }
    let folded = FoldedText::new(query);
    if folded.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits: Vec<SearchHit> = catalog
        .entries()
        .iter()
        .filter_map(|entry| {
            let found = entry.keys.best_match(&folded)?;
            let score = if entry.instrument.active {
                found.score
            } else {
                found.score * INACTIVE_FACTOR
            };
            Some(SearchHit {
                instrument: entry.instrument.clone(),
                score: round_score(score),
                matched_field: found.field,
                tier: found.tier,
            })
        })
        .collect();

    hits.sort_by(rank);
    hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    Ok(hits)
}

/// Picks the single instrument a query refers to.
///
/// The best hit wins when it reaches `threshold` and strictly outscores the
/// runner-up.
///
/// # Errors
/// Returns `QueryError::NotFound` when nothing matches, or
/// `QueryError::Ambiguous` with up to [`MAX_AMBIGUOUS_CANDIDATES`] ranked
/// candidates when no hit is decisive.
pub fn resolve_one(
    catalog: &CatalogSnapshot,
    query: &str,
    threshold: f64,
) -> Result<SearchHit, QueryError> {
    let limit = i64::try_from(MAX_AMBIGUOUS_CANDIDATES).unwrap_or(i64::MAX);
    let hits = search(catalog, query, limit)?;
    let Some((best, rest)) = hits.split_first() else {
        return Err(QueryError::NotFound {
            query: query.to_string(),
        });
    };

    let decisive = best.score >= threshold
        && rest
            .first()
            .is_none_or(|runner_up| best.score > runner_up.score);
    if decisive {
        debug!(
            query,
            identifier = %best.instrument.identifier,
            score = best.score,
            "resolved instrument"
        );
        return Ok(best.clone());
    }

    debug!(query, candidates = hits.len(), "query is ambiguous");
    Err(QueryError::Ambiguous {
        query: query.to_string(),
        candidates: hits,
    })
}

fn rank(left: &SearchHit, right: &SearchHit) -> Ordering {
    right
        .score
        .total_cmp(&left.score)
        .then_with(|| left.instrument.identifier.cmp(&right.instrument.identifier))
}

fn round_score(score: f64) -> f64 {
    (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}
