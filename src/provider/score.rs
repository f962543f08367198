//! Relevance scoring and ranking of geocoding candidates
//!
//! Components are strictly ordered by weight: text match, then proximity to
//! the bias location, then the home-region bonus, then the POI bonus. The
//! total is clamped to `0..=1`.

use serde::{Deserialize, Serialize};

use super::types::{CandidateKind, GeoCandidate};
use crate::geo::{BoundingBox, LatLon};

const EXACT: f64 = 0.50;
const PREFIX: f64 = 0.40;
const SUBSTRING: f64 = 0.30;
const ALL_TOKENS: f64 = 0.20;
const ANY_TOKEN: f64 = 0.10;

/// Upper distance bound in meters and the bonus awarded within it
const PROXIMITY_BUCKETS: [(f64, f64); 4] = [(1_000.0, 0.25), (5_000.0, 0.20), (15_000.0, 0.12), (50_000.0, 0.06)];

const HOME_REGION: f64 = 0.15;
const POI_CATEGORY_MATCH: f64 = 0.10;
const POI_OTHER: f64 = 0.05;

/// A candidate with its computed score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: GeoCandidate,
    pub score: f64,
}

/// Scores candidates against a query
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    /// Area whose candidates get a bonus, e.g. the municipality
    pub home_region: Option<BoundingBox>,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn text_match(label: &str, query: &str) -> f64 {
    if label.is_empty() || query.is_empty() {
        return 0.0;
    }
    if label == query {
        return EXACT;
    }
    if label.starts_with(query) {
        return PREFIX;
    }
    if label.contains(query) {
        return SUBSTRING;
    }

    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.iter().all(|t| label.contains(t)) {
        ALL_TOKENS
    } else if tokens.iter().any(|t| label.contains(t)) {
        ANY_TOKEN
    } else {
        0.0
    }
}

fn proximity(position: LatLon, bias: Option<LatLon>) -> f64 {
    let Some(bias) = bias else {
        return 0.0;
    };
    let distance = position.distance_m(&bias);
    PROXIMITY_BUCKETS
        .iter()
        .find(|(limit, _)| distance <= *limit)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0.0)
}

impl Scorer {
    pub fn new(home_region: Option<BoundingBox>) -> Self {
        Self { home_region }
    }

    /// Relevance of `candidate` for `query`, in `0..=1`
    pub fn score(&self, candidate: &GeoCandidate, query: &str, bias: Option<LatLon>) -> f64 {
        let query = normalize(query);

        let text = text_match(&normalize(candidate.label()), &query)
            .max(text_match(&normalize(&candidate.address.line), &query));

        let home = match self.home_region {
            Some(region) if region.contains(candidate.position) => HOME_REGION,
            _ => 0.0,
        };

        let poi = match (&candidate.poi, candidate.kind) {
            (Some(poi), CandidateKind::Poi) => {
                let matches = query.split_whitespace().any(|token| {
                    poi.categories.iter().any(|c| normalize(c).contains(token))
                });
                if matches {
                    POI_CATEGORY_MATCH
                } else {
                    POI_OTHER
                }
            }
            _ => 0.0,
        };

        (text + proximity(candidate.position, bias) + home + poi).clamp(0.0, 1.0)
    }

    /// Scores and sorts candidates, best first
    ///
    /// The sort is stable. Among equal scores, candidates that both carry a
    /// provider rank are ordered by it; everything else keeps input order.
    pub fn rank(&self, candidates: Vec<GeoCandidate>, query: &str, bias: Option<LatLon>) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| RankedCandidate {
                score: self.score(&candidate, query, bias),
                candidate,
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut start = 0;
        while start < ranked.len() {
            let score = ranked[start].score;
            let end = ranked[start..]
                .iter()
                .position(|r| r.score != score)
                .map_or(ranked.len(), |n| start + n);
            order_ties_by_provider_rank(&mut ranked[start..end]);
            start = end;
        }

        ranked
    }
}

/// Reorders only the rank-carrying entries among the slots they occupy
fn order_ties_by_provider_rank(group: &mut [RankedCandidate]) {
    let slots: Vec<usize> = group
        .iter()
        .enumerate()
        .filter(|(_, r)| r.candidate.provider_rank.is_some())
        .map(|(i, _)| i)
        .collect();
    if slots.len() < 2 {
        return;
    }

    let mut with_rank: Vec<RankedCandidate> = slots.iter().map(|&i| group[i].clone()).collect();
    with_rank.sort_by_key(|r| r.candidate.provider_rank);
    for (slot, entry) in slots.into_iter().zip(with_rank) {
        group[slot] = entry;
    }
}
