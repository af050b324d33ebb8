use estpii_analyzer::{resolve_overlaps, Candidate, ConflictPolicy};
use estpii_core::{EntityType, Span};
use proptest::prelude::*;
use std::collections::HashMap;

const TYPES: [EntityType; 4] = [
    EntityType::PERSON,
    EntityType::LOCATION,
    EntityType::EE_PERSONAL_CODE,
    EntityType::PHONE_NUMBER,
];

fn candidate_strategy() -> impl Strategy<Value = Candidate> {
    (0usize..60, 1usize..15, 0usize..TYPES.len(), 0u8..=100, 0usize..5).prop_map(
        |(start, len, ty, score, registration)| {
            Candidate::new(
                Span::new(start, start + len, TYPES[ty].clone(), score as f32 / 100.0),
                registration,
            )
        },
    )
}

fn priorities() -> HashMap<EntityType, i32> {
    HashMap::from([(EntityType::EE_PERSONAL_CODE, 10), (EntityType::PERSON, 5)])
}

fn key(span: &Span) -> (usize, usize, String, u32) {
    (span.start, span.end, span.entity_type.to_string(), span.score.to_bits())
}

proptest! {
    #[test]
    fn resolved_spans_never_overlap(candidates in prop::collection::vec(candidate_strategy(), 0..40)) {
        let spans = resolve_overlaps(candidates, &priorities(), &ConflictPolicy::default());

        for pair in spans.windows(2) {
            prop_assert!(
                pair[0].end <= pair[1].start,
                "overlap between [{}, {}) and [{}, {})",
                pair[0].start, pair[0].end, pair[1].start, pair[1].end
            );
        }
    }

    #[test]
    fn resolved_spans_come_from_input(candidates in prop::collection::vec(candidate_strategy(), 0..40)) {
        let inputs: Vec<_> = candidates.iter().map(|c| key(&c.span)).collect();
        let spans = resolve_overlaps(candidates, &priorities(), &ConflictPolicy::default());

        for span in &spans {
            prop_assert!(inputs.contains(&key(span)));
        }
    }

    #[test]
    fn resolution_ignores_input_order(candidates in prop::collection::vec(candidate_strategy(), 0..40)) {
        let mut reversed = candidates.clone();
        reversed.reverse();

        let forward = resolve_overlaps(candidates, &priorities(), &ConflictPolicy::default());
        let backward = resolve_overlaps(reversed, &priorities(), &ConflictPolicy::default());

        let forward: Vec<_> = forward.iter().map(key).collect();
        let backward: Vec<_> = backward.iter().map(key).collect();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn disjoint_input_is_kept_whole(lengths in prop::collection::vec(1usize..10, 0..20)) {
        let mut start = 0;
        let mut candidates = Vec::new();
        for (i, len) in lengths.iter().enumerate() {
            candidates.push(Candidate::new(Span::new(start, start + len, EntityType::PERSON, 0.5), i));
            start += len + 1;
        }

        let spans = resolve_overlaps(candidates, &priorities(), &ConflictPolicy::default());
        prop_assert_eq!(spans.len(), lengths.len());
    }
}
