//! Ranking of scored rows into search results.
//!
//! All functions take the per-row scores produced by
//! [`VectorStore::score`](crate::semantic::VectorStore::score), in row order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::semantic::highlight::extract_phrases;
use crate::semantic::index::{Field, VectorStore};
use crate::semantic::threshold::ThresholdPolicy;

/// A single matching row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub entity_id: i64,
    pub field: Field,
    pub matched_text: String,
    pub score: f32,
    pub highlight_phrases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldScores {
    /// 0 when the entity has no title row
    pub title: f32,
    /// Best description chunk, 0 when the entity has no chunks
    pub description: f32,
}

/// One entity ranked by the mean of its title and best chunk scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub entity_id: i64,
    pub combined_score: f32,
    pub per_field_scores: FieldScores,
    /// Best chunk text, or the title when there are no chunks
    pub matched_text: String,
    pub highlight_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome<T> {
    pub results: Vec<T>,
    pub final_threshold: f32,
    pub threshold_reduced: bool,
}

impl<T> SearchOutcome<T> {
    /// No results at the default threshold, as for a blank query.
    pub fn empty(policy: &ThresholdPolicy) -> Self {
        let untouched = policy.untouched();
        Self {
            results: Vec::new(),
            final_threshold: untouched.threshold,
            threshold_reduced: untouched.reduced,
        }
    }

    /// Keep at most `limit` results.
    pub fn truncate(mut self, limit: usize) -> Self {
        self.results.truncate(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawScore {
    pub entity_id: i64,
    pub text: String,
    pub score: f32,
}

/// Every row's score, split by field, in row order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawScores {
    pub title_scores: Vec<RawScore>,
    pub description_scores: Vec<RawScore>,
}

/// Rank rows of the given fields. An empty `fields` slice means all fields.
pub fn search_fields(
    store: &VectorStore,
    scores: &[f32],
    fields: &[Field],
    policy: &ThresholdPolicy,
    highlight_k: usize,
) -> SearchOutcome<QueryResult> {
    debug_assert_eq!(scores.len(), store.len());

    let candidates: Vec<(usize, f32)> = store
        .records()
        .iter()
        .zip(scores.iter().copied())
        .filter(|(record, _)| fields.is_empty() || fields.contains(&record.field))
        .map(|(record, score)| (record.row_index, score))
        .collect();

    let outcome = policy.resolve(candidates.iter().map(|(_, score)| *score));

    let mut hits: Vec<(usize, f32)> = candidates
        .into_iter()
        .filter(|(_, score)| *score >= outcome.threshold)
        .collect();

    hits.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| entity_of(store, a.0).cmp(&entity_of(store, b.0)))
            .then_with(|| a.0.cmp(&b.0))
    });

    let results = hits
        .into_iter()
        .filter_map(|(row, score)| {
            let record = store.record(row)?;
            Some(QueryResult {
                entity_id: record.entity_id,
                field: record.field,
                matched_text: record.text.clone(),
                score,
                highlight_phrases: extract_phrases(&record.text, highlight_k),
            })
        })
        .collect();

    SearchOutcome {
        results,
        final_threshold: outcome.threshold,
        threshold_reduced: outcome.reduced,
    }
}

fn entity_of(store: &VectorStore, row: usize) -> i64 {
    store.record(row).map(|r| r.entity_id).unwrap_or(i64::MAX)
}

/// Best score and text seen for one field of one entity.
#[derive(Default)]
struct EntityScores<'a> {
    title: Option<(f32, &'a str)>,
    best_chunk: Option<(f32, &'a str)>,
}

/// Rank entities by `(title + best chunk) / 2`.
pub fn search_combined(
    store: &VectorStore,
    scores: &[f32],
    policy: &ThresholdPolicy,
    highlight_k: usize,
) -> SearchOutcome<FusedResult> {
    debug_assert_eq!(scores.len(), store.len());

    let mut entities: BTreeMap<i64, EntityScores> = BTreeMap::new();
    for (record, score) in store.records().iter().zip(scores.iter().copied()) {
        let entry = entities.entry(record.entity_id).or_default();
        let slot = match record.field {
            Field::Title => &mut entry.title,
            Field::DescriptionChunk => &mut entry.best_chunk,
        };
        // strictly greater, so the earliest row wins ties
        let replace = match slot {
            Some((best, _)) => score > *best,
            None => true,
        };
        if replace {
            *slot = Some((score, record.text.as_str()));
        }
    }

    let fused: Vec<(i64, f32, FieldScores, &str)> = entities
        .into_iter()
        .filter_map(|(entity_id, entity)| {
            let title = entity.title.map(|(s, _)| s).unwrap_or(0.0);
            let description = entity.best_chunk.map(|(s, _)| s).unwrap_or(0.0);
            let text = entity
                .best_chunk
                .or(entity.title)
                .map(|(_, text)| text)?;
            Some((
                entity_id,
                (title + description) / 2.0,
                FieldScores { title, description },
                text,
            ))
        })
        .collect();

    let outcome = policy.resolve(fused.iter().map(|(_, combined, _, _)| *combined));

    let mut hits: Vec<_> = fused
        .into_iter()
        .filter(|(_, combined, _, _)| *combined >= outcome.threshold)
        .collect();
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let results = hits
        .into_iter()
        .map(|(entity_id, combined_score, per_field_scores, text)| FusedResult {
            entity_id,
            combined_score,
            per_field_scores,
            matched_text: text.to_string(),
            highlight_phrases: extract_phrases(text, highlight_k),
        })
        .collect();

    SearchOutcome {
        results,
        final_threshold: outcome.threshold,
        threshold_reduced: outcome.reduced,
    }
}

pub fn raw_scores(store: &VectorStore, scores: &[f32]) -> RawScores {
    let mut raw = RawScores::default();
    for (record, score) in store.records().iter().zip(scores.iter().copied()) {
        let entry = RawScore {
            entity_id: record.entity_id,
            text: record.text.clone(),
            score,
        };
        match record.field {
            Field::Title => raw.title_scores.push(entry),
            Field::DescriptionChunk => raw.description_scores.push(entry),
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::index::{EmbeddingRecord, VectorMatrix};

    fn store(records: Vec<EmbeddingRecord>) -> VectorStore {
        let mut matrix = VectorMatrix::new(2).unwrap();
        for _ in &records {
            matrix.push_row(&[1.0, 0.0]).unwrap();
        }
        VectorStore::new(matrix, records).unwrap()
    }

    fn library() -> VectorStore {
        store(vec![
            EmbeddingRecord::new(1, Field::Title, "Data Structures and Algorithms"),
            EmbeddingRecord::new(1, Field::DescriptionChunk, "Balanced search trees explained."),
            EmbeddingRecord::new(2, Field::Title, "Operating Systems"),
            EmbeddingRecord::new(3, Field::Title, "Machine Learning Basics"),
            EmbeddingRecord::new(3, Field::DescriptionChunk, "Linear models first."),
            EmbeddingRecord::new(3, Field::DescriptionChunk, "Neural networks later on."),
        ])
    }

    #[test]
    fn test_title_only_search() {
        let store = library();
        let scores = [0.70, 0.90, 0.20, 0.10, 0.0, 0.0];

        let outcome = search_fields(&store, &scores, &[Field::Title], &ThresholdPolicy::default(), 3);
        assert!(!outcome.threshold_reduced);
        assert_eq!(outcome.final_threshold, 0.60);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].entity_id, 1);
        assert_eq!(outcome.results[0].field, Field::Title);
        assert_eq!(outcome.results[0].matched_text, "Data Structures and Algorithms");
        assert_eq!(outcome.results[0].highlight_phrases, vec!["data structures".to_string()]);
    }

    #[test]
    fn test_field_search_sorted_and_tie_broken() {
        let store = library();
        let scores = [0.65, 0.80, 0.65, 0.10, 0.80, 0.0];

        let outcome = search_fields(&store, &scores, &[], &ThresholdPolicy::default(), 0);
        let order: Vec<(i64, f32)> = outcome
            .results
            .iter()
            .map(|r| (r.entity_id, r.score))
            .collect();
        assert_eq!(order, vec![(1, 0.80), (3, 0.80), (1, 0.65), (2, 0.65)]);
    }

    #[test]
    fn test_field_search_backs_off() {
        let store = library();
        let scores = [0.52, 0.0, 0.10, 0.0, 0.0, 0.0];

        let outcome = search_fields(&store, &scores, &[Field::Title], &ThresholdPolicy::default(), 3);
        assert!(outcome.threshold_reduced);
        assert_eq!(outcome.final_threshold, 0.50);
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_combined_score_is_mean_of_title_and_best_chunk() {
        let store = library();
        let scores = [0.10, 0.10, 0.10, 0.50, 0.80, 0.30];

        let outcome = search_combined(&store, &scores, &ThresholdPolicy::default(), 3);
        assert!(!outcome.threshold_reduced);
        assert_eq!(outcome.results.len(), 1);

        let hit = &outcome.results[0];
        assert_eq!(hit.entity_id, 3);
        assert!((hit.combined_score - 0.65).abs() < 1e-6);
        assert_eq!(hit.per_field_scores.title, 0.50);
        assert_eq!(hit.per_field_scores.description, 0.80);
        assert_eq!(hit.matched_text, "Linear models first.");
    }

    #[test]
    fn test_combined_without_chunks_uses_title() {
        let store = library();
        // entity 2 has no description: (0.9 + 0) / 2
        let scores = [0.0, 0.0, 0.90, 0.0, 0.0, 0.0];

        let outcome = search_combined(&store, &scores, &ThresholdPolicy::new(0.45, 0.40, 0.05), 3);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].entity_id, 2);
        assert!((outcome.results[0].combined_score - 0.45).abs() < 1e-6);
        assert_eq!(outcome.results[0].matched_text, "Operating Systems");
    }

    #[test]
    fn test_combined_first_chunk_wins_ties() {
        let store = library();
        let scores = [0.0, 0.0, 0.0, 0.9, 0.7, 0.7];

        let outcome = search_combined(&store, &scores, &ThresholdPolicy::default(), 3);
        assert_eq!(outcome.results[0].matched_text, "Linear models first.");
    }

    #[test]
    fn test_combined_nothing_at_floor() {
        let store = library();
        let scores = [0.1; 6];

        let outcome = search_combined(&store, &scores, &ThresholdPolicy::default(), 3);
        assert!(outcome.results.is_empty());
        assert!(outcome.threshold_reduced);
        assert_eq!(outcome.final_threshold, 0.45);
    }

    #[test]
    fn test_raw_scores_split_by_field() {
        let store = library();
        let scores = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];

        let raw = raw_scores(&store, &scores);
        let titles: Vec<f32> = raw.title_scores.iter().map(|r| r.score).collect();
        let chunks: Vec<f32> = raw.description_scores.iter().map(|r| r.score).collect();
        assert_eq!(titles, vec![0.1, 0.3, 0.4]);
        assert_eq!(chunks, vec![0.2, 0.5, 0.6]);
        assert_eq!(raw.description_scores[2].text, "Neural networks later on.");
    }

    #[test]
    fn test_empty_outcome() {
        let outcome: SearchOutcome<QueryResult> = SearchOutcome::empty(&ThresholdPolicy::default());
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.final_threshold, 0.60);
        assert!(!outcome.threshold_reduced);
    }

    #[test]
    fn test_outcome_serializes() {
        let store = library();
        let scores = [0.70, 0.0, 0.0, 0.0, 0.0, 0.0];
        let outcome = search_fields(&store, &scores, &[Field::Title], &ThresholdPolicy::default(), 3);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["threshold_reduced"], false);
        assert_eq!(json["results"][0]["field"], "title");
        assert_eq!(json["results"][0]["entity_id"], 1);
    }
}
