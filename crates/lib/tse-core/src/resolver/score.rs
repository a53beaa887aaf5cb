use tse_store::models::{MatchTier, MatchedField};

use super::text::FoldedText;

const EXACT_SYMBOL: f64 = 1.0;
const EXACT_NAME: f64 = 0.95;
const SYMBOL_PREFIX: f64 = 0.80;
const NAME_PREFIX: f64 = 0.70;
const SUBSTRING: f64 = 0.55;
/// Room inside a tier for how much of the field the query covers.
const COVERAGE_WEIGHT: f64 = 0.09;
const FUZZY_WEIGHT: f64 = 0.5;
const FUZZY_FLOOR: f64 = 0.4;

/// Best match of a query against one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct FieldMatch {
    pub score: f64,
    pub tier: MatchTier,
    pub field: MatchedField,
}

impl FieldMatch {
    /// Higher score wins; on equal scores the better tier, then symbol over
    /// name over alias.
    pub(super) fn beats(&self, other: &Self) -> bool {
        if (self.score - other.score).abs() > f64::EPSILON {
            return self.score > other.score;
        }
        (self.tier, field_rank(self.field)) < (other.tier, field_rank(other.field))
    }
}

const fn field_rank(field: MatchedField) -> u8 {
    match field {
        MatchedField::Symbol => 0,
        MatchedField::Name => 1,
        MatchedField::Alias => 2,
    }
}

/// Scores `query` against one instrument field.
pub(super) fn score_field(
    query: &FoldedText,
    candidate: &FoldedText,
    field: MatchedField,
) -> Option<FieldMatch> {
    if candidate.is_empty() {
        return None;
    }
    let is_symbol = field == MatchedField::Symbol;
    let matched = |score: f64, tier: MatchTier| Some(FieldMatch { score, tier, field });

    if query.compact == candidate.compact {
        return if is_symbol {
            matched(EXACT_SYMBOL, MatchTier::ExactSymbol)
        } else {
            matched(EXACT_NAME, MatchTier::ExactName)
        };
    }

    let coverage = char_len(&query.compact) / char_len(&candidate.compact);
    if candidate.compact.starts_with(&query.compact) {
        let base = if is_symbol { SYMBOL_PREFIX } else { NAME_PREFIX };
        return matched(base + COVERAGE_WEIGHT * coverage, MatchTier::Prefix);
    }
    if candidate.compact.contains(&query.compact) {
        return matched(SUBSTRING + COVERAGE_WEIGHT * coverage, MatchTier::Substring);
    }

    let similarity = edit_similarity(&query.compact, &candidate.compact)
        .max(token_overlap(query, candidate));
    (similarity >= FUZZY_FLOOR).then_some(FieldMatch {
        score: FUZZY_WEIGHT * similarity,
        tier: MatchTier::Fuzzy,
        field,
    })
}

#[allow(clippy::cast_precision_loss)]
fn char_len(text: &str) -> f64 {
    text.chars().count().max(1) as f64
}

/// `1 - levenshtein / longer length`, over code points.
pub(super) fn edit_similarity(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    let longest = left.len().max(right.len());
    if longest == 0 {
        return 1.0;
    }

    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];
    for (i, left_ch) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, right_ch) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(left_ch != right_ch);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    #[allow(clippy::cast_precision_loss)]
    let distance = previous[right.len()] as f64;
    #[allow(clippy::cast_precision_loss)]
    let longest = longest as f64;
    1.0 - distance / longest
}

/// Share of distinct tokens the two texts have in common (Jaccard).
pub(super) fn token_overlap(left: &FoldedText, right: &FoldedText) -> f64 {
    let left: std::collections::BTreeSet<&str> = left.tokens().collect();
    let right: std::collections::BTreeSet<&str> = right.tokens().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let shared = left.intersection(&right).count() as f64;
    #[allow(clippy::cast_precision_loss)]
    let union = union as f64;
    shared / union
}
