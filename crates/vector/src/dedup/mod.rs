//! Deduplication / re-ranking of search results
//!
//! Several stored rows can share one classification label. Each query's
//! ranked matches are condensed into one candidate per label, scored by a
//! pluggable policy, re-ranked by that score and given a softmax confidence.

mod condense;
mod scorers;

pub use condense::condense;
pub use scorers::{average_scorer, naive_scorer, softmax_scores, ScoreFn, ScoringMethod};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{Metadata, SearchQuery, SearchResult};

/// One retrieved row of a query's ranked list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub label: String,
    pub description: String,
    pub distance: f32,
    pub similarity: f32,
    pub rank: usize,
    #[serde(flatten)]
    pub metadata: Metadata,
}

/// Ranked matches of one query; `response` is empty when nothing matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub input_id: String,
    pub response: Vec<RankedMatch>,
}

/// All matches of one query sharing a label, in retrieval order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedCandidate {
    pub label: String,
    pub descriptions: Vec<String>,
    pub distances: Vec<f32>,
    pub ranks: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedList {
    pub input_id: String,
    pub response: Vec<CondensedCandidate>,
}

/// One label per query after scoring and re-ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicatedCandidate {
    pub label: String,
    pub distance: f32,
    pub description: String,
    pub rank: usize,

    /// Softmax confidence, 3 decimals
    pub score: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicatedList {
    pub input_id: String,
    pub response: Vec<DeduplicatedCandidate>,
}

/// Group flat search results into one ranked list per query, in query order.
///
/// Queries without any result get an explicit empty list.
pub fn rank_lists(queries: &[SearchQuery], results: &[SearchResult]) -> Vec<RankedList> {
    queries
        .iter()
        .map(|query| {
            let mut response: Vec<RankedMatch> = results
                .iter()
                .filter(|r| r.query_id == query.id)
                .map(|r| RankedMatch {
                    label: r.doc_id.clone(),
                    description: r.doc_text.clone(),
                    distance: r.distance,
                    similarity: r.similarity,
                    rank: r.rank,
                    metadata: r.metadata.clone(),
                })
                .collect();
            response.sort_by_key(|m| m.rank);

            RankedList {
                input_id: query.id.clone(),
                response,
            }
        })
        .collect()
}

/// Score one query's label groups, sort ascending by distance, rank from 1
/// and attach softmax scores over the sorted distances
fn deduplicate_list(list: &CondensedList, scorer: ScoreFn) -> DeduplicatedList {
    let mut candidates: Vec<(String, f32, String)> = list
        .response
        .iter()
        .map(|group| {
            let (distance, index) = scorer(&group.distances, &group.ranks);
            let description = group.descriptions.get(index).cloned().unwrap_or_default();
            (group.label.clone(), distance, description)
        })
        .collect();
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let distances: Vec<f32> = candidates.iter().map(|c| c.1).collect();
    let scores = softmax_scores(&distances);

    let response = candidates
        .into_iter()
        .zip(scores)
        .enumerate()
        .map(|(i, ((label, distance, description), score))| DeduplicatedCandidate {
            label,
            distance,
            description,
            rank: i + 1,
            score,
        })
        .collect();

    DeduplicatedList {
        input_id: list.input_id.clone(),
        response,
    }
}

/// Condense, score and re-rank every query's ranked list
pub fn deduplicate(lists: &[RankedList], method: ScoringMethod) -> Vec<DeduplicatedList> {
    let scorer = method.scorer();
    condense(lists)
        .iter()
        .map(|list| deduplicate_list(list, scorer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(input_id: &str, items: &[(&str, f32)]) -> RankedList {
        RankedList {
            input_id: input_id.to_string(),
            response: items
                .iter()
                .enumerate()
                .map(|(i, (label, distance))| RankedMatch {
                    label: label.to_string(),
                    description: format!("{} at {}", label, i + 1),
                    distance: *distance,
                    similarity: 1.0 - distance / 2.0,
                    rank: i + 1,
                    metadata: Metadata::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_naive_scenario() {
        let lists = vec![ranked("q", &[("1", 0.11), ("2", 0.23), ("1", 0.27), ("2", 0.52)])];
        let out = deduplicate(&lists, ScoringMethod::Naive);

        let response = &out[0].response;
        assert_eq!(out[0].input_id, "q");
        assert_eq!(response.len(), 2);

        assert_eq!(response[0].label, "1");
        assert_eq!(response[0].distance, 0.11);
        assert_eq!(response[0].rank, 1);
        assert_eq!(response[0].score, "0.53");
        assert_eq!(response[0].description, "1 at 1");

        assert_eq!(response[1].label, "2");
        assert_eq!(response[1].distance, 0.23);
        assert_eq!(response[1].rank, 2);
        assert_eq!(response[1].score, "0.47");
    }

    #[test]
    fn test_average_reorders_but_keeps_best_description() {
        // label "a" has the best single hit but a poor mean
        let lists = vec![ranked(
            "q",
            &[("a", 0.10), ("b", 0.20), ("b", 0.25), ("a", 0.90)],
        )];
        let out = deduplicate(&lists, ScoringMethod::Average);

        let response = &out[0].response;
        assert_eq!(response[0].label, "b");
        assert!((response[0].distance - 0.225).abs() < 1e-6);
        assert_eq!(response[0].description, "b at 2");
        assert_eq!(response[1].label, "a");
        assert!((response[1].distance - 0.5).abs() < 1e-6);
        assert_eq!(response[1].description, "a at 1");
    }

    #[test]
    fn test_ranks_contiguous_and_scores_sum_to_one() {
        let lists = vec![ranked(
            "q",
            &[("x", 0.3), ("y", 0.1), ("z", 0.7), ("y", 0.2), ("w", 1.1)],
        )];
        let out = deduplicate(&lists, ScoringMethod::Naive);
        let response = &out[0].response;

        let ranks: Vec<usize> = response.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert!(response.windows(2).all(|w| w[0].distance <= w[1].distance));

        let total: f64 = response.iter().map(|c| c.score.parse::<f64>().unwrap()).sum();
        assert!((total - 1.0).abs() <= 0.002);
    }

    #[test]
    fn test_rank_lists_keeps_empty_queries() {
        let queries = vec![SearchQuery::new("a", "nurse"), SearchQuery::new("b", "baker")];
        let results = vec![SearchResult {
            query_id: "a".to_string(),
            query_text: "nurse".to_string(),
            doc_id: "1111".to_string(),
            doc_text: "Nurse".to_string(),
            rank: 1,
            similarity: 0.9,
            distance: 0.2,
            metadata: Metadata::new(),
        }];

        let lists = rank_lists(&queries, &results);
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].response[0].label, "1111");
        assert_eq!(lists[1].input_id, "b");
        assert!(lists[1].response.is_empty());

        let out = deduplicate(&lists, ScoringMethod::Naive);
        assert!(out[1].response.is_empty());
    }
}
