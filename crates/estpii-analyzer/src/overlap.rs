//! Overlap resolution
//!
//! Candidates are swept left to right. A candidate that overlaps spans
//! already accepted replaces them only if it beats every one of them under
//! the [`ConflictPolicy`]; otherwise it is discarded. Spans are never
//! truncated.

use estpii_core::{EntityType, Span};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One criterion for deciding between two overlapping spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    /// Higher entity-type priority wins (only between different types)
    Priority,
    /// Higher score wins
    Score,
    /// Longer span wins
    Length,
    /// Earlier-registered recognizer wins
    RegistrationOrder,
}

/// Ordered list of tie-breakers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictPolicy {
    order: Vec<TieBreaker>,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            order: vec![
                TieBreaker::Priority,
                TieBreaker::Score,
                TieBreaker::Length,
                TieBreaker::RegistrationOrder,
            ],
        }
    }
}

impl ConflictPolicy {
    /// Create a policy with a custom criterion order
    pub fn new(order: Vec<TieBreaker>) -> Self {
        Self { order }
    }

    /// Criteria in evaluation order
    pub fn order(&self) -> &[TieBreaker] {
        &self.order
    }

    /// Compare a challenger against an accepted span
    ///
    /// `Greater` means the challenger wins. `Equal` keeps the accepted span.
    pub fn compare(
        &self,
        challenger: &Candidate,
        accepted: &Candidate,
        priorities: &HashMap<EntityType, i32>,
    ) -> Ordering {
        let (a, b) = (&challenger.span, &accepted.span);

        for criterion in &self.order {
            let ordering = match criterion {
                TieBreaker::Priority if a.entity_type != b.entity_type => {
                    let pa = priorities.get(&a.entity_type).copied().unwrap_or(0);
                    let pb = priorities.get(&b.entity_type).copied().unwrap_or(0);
                    pa.cmp(&pb)
                }
                TieBreaker::Priority => Ordering::Equal,
                TieBreaker::Score => a.score.total_cmp(&b.score),
                TieBreaker::Length => a.len().cmp(&b.len()),
                TieBreaker::RegistrationOrder => {
                    accepted.registration.cmp(&challenger.registration)
                }
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

/// A span together with its recognizer's registration index
#[derive(Debug, Clone)]
pub struct Candidate {
    pub span: Span,
    pub registration: usize,
}

impl Candidate {
    pub fn new(span: Span, registration: usize) -> Self {
        Self { span, registration }
    }
}

fn sweep_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.span
        .start
        .cmp(&b.span.start)
        .then_with(|| b.span.end.cmp(&a.span.end))
        .then_with(|| b.span.score.total_cmp(&a.span.score))
        .then_with(|| a.registration.cmp(&b.registration))
        .then_with(|| a.span.entity_type.cmp(&b.span.entity_type))
}

/// Resolve overlapping candidates into a non-overlapping, position-ordered set
pub fn resolve_overlaps(
    mut candidates: Vec<Candidate>,
    priorities: &HashMap<EntityType, i32>,
    policy: &ConflictPolicy,
) -> Vec<Span> {
    candidates.retain(|c| !c.span.is_empty());
    candidates.sort_by(sweep_order);

    let mut accepted: Vec<Candidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let beats_all = accepted
            .iter()
            .filter(|kept| kept.span.overlaps(&candidate.span))
            .all(|kept| policy.compare(&candidate, kept, priorities) == Ordering::Greater);

        if !beats_all {
            continue;
        }

        accepted.retain(|kept| !kept.span.overlaps(&candidate.span));
        accepted.push(candidate);
    }

    let mut spans: Vec<Span> = accepted.into_iter().map(|c| c.span).collect();
    spans.sort_by(|a, b| a.position_cmp(b));
    spans
}
