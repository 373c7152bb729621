//! Greedy token-bounded batching of chunks for embedding calls.

use tracing::{debug, info, warn};

use crate::record::Chunk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchStats {
    pub chunks: usize,
    pub tokens: usize,
}

/// Batches in input order plus per-batch diagnostics.
#[derive(Clone, Debug, Default)]
pub struct BatchPlan {
    pub batches: Vec<Vec<Chunk>>,
    pub stats: Vec<BatchStats>,
    pub total_tokens: usize,
}

impl BatchPlan {
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Greedy fill: a batch closes when the next chunk would push its token sum
/// past `max_tokens`. A chunk larger than `max_tokens` on its own still gets
/// a batch of its own (over the limit) instead of being dropped or split.
pub fn batch(chunks: Vec<Chunk>, max_tokens: usize) -> BatchPlan {
    let mut plan = BatchPlan::default();
    let mut current: Vec<Chunk> = Vec::new();
    let mut current_tokens = 0usize;

    for chunk in chunks {
        let t = chunk.token_count;
        plan.total_tokens += t;

        if !current.is_empty() && current_tokens + t > max_tokens {
            close(&mut plan, &mut current, &mut current_tokens);
        }
        if t > max_tokens {
            warn!(
                tokens = t,
                limit = max_tokens,
                source = %chunk.source,
                "chunk exceeds batch token limit, placing it alone"
            );
        }
        current_tokens += t;
        current.push(chunk);
    }
    if !current.is_empty() {
        close(&mut plan, &mut current, &mut current_tokens);
    }

    for (i, s) in plan.stats.iter().enumerate() {
        debug!(batch = i + 1, chunks = s.chunks, tokens = s.tokens, "batch planned");
    }
    info!(
        batches = plan.len(),
        total_tokens = plan.total_tokens,
        limit = max_tokens,
        "batching complete"
    );
    plan
}

fn close(plan: &mut BatchPlan, current: &mut Vec<Chunk>, tokens: &mut usize) {
    plan.stats.push(BatchStats {
        chunks: current.len(),
        tokens: *tokens,
    });
    plan.batches.push(std::mem::take(current));
    *tokens = 0;
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chunk(i: usize, tokens: usize) -> Chunk {
        Chunk {
            id: format!("c{i}"),
            text: format!("chunk {i}"),
            source: "kb.txt".into(),
            index: i,
            token_count: tokens,
        }
    }

    fn ids(plan: &BatchPlan) -> Vec<Vec<String>> {
        plan.batches
            .iter()
            .map(|b| b.iter().map(|c| c.id.clone()).collect())
            .collect()
    }

    #[test]
    fn three_chunks_over_small_limit_get_three_batches() {
        let plan = batch(vec![chunk(1, 50), chunk(2, 60), chunk(3, 70)], 100);
        assert_eq!(ids(&plan), vec![vec!["c1"], vec!["c2"], vec!["c3"]]);
        assert_eq!(plan.total_tokens, 180);
        assert_eq!(
            plan.stats,
            vec![
                BatchStats { chunks: 1, tokens: 50 },
                BatchStats { chunks: 1, tokens: 60 },
                BatchStats { chunks: 1, tokens: 70 },
            ]
        );
    }

    #[test]
    fn chunks_fill_up_to_the_limit_inclusive() {
        let plan = batch(vec![chunk(1, 40), chunk(2, 60), chunk(3, 1)], 100);
        assert_eq!(ids(&plan), vec![vec!["c1", "c2"], vec!["c3"]]);
    }

    #[test]
    fn oversized_chunk_stands_alone() {
        let plan = batch(vec![chunk(1, 10), chunk(2, 500), chunk(3, 10)], 100);
        assert_eq!(ids(&plan), vec![vec!["c1"], vec!["c2"], vec!["c3"]]);
        assert_eq!(plan.stats[1].tokens, 500);
    }

    #[test]
    fn empty_input_gives_empty_plan() {
        let plan = batch(Vec::new(), 100);
        assert!(plan.is_empty());
        assert_eq!(plan.total_tokens, 0);
    }

    proptest! {
        #[test]
        fn batches_respect_limit_unless_single_chunk(
            tokens in prop::collection::vec(0usize..300, 0..60),
            limit in 1usize..400,
        ) {
            let chunks: Vec<_> = tokens.iter().enumerate().map(|(i, &t)| chunk(i, t)).collect();
            let plan = batch(chunks, limit);
            for (b, s) in plan.batches.iter().zip(&plan.stats) {
                prop_assert!(!b.is_empty());
                prop_assert_eq!(b.iter().map(|c| c.token_count).sum::<usize>(), s.tokens);
                prop_assert!(s.tokens <= limit || b.len() == 1);
            }
        }

        #[test]
        fn batching_is_lossless_and_order_preserving(
            tokens in prop::collection::vec(0usize..300, 0..60),
            limit in 1usize..400,
        ) {
            let chunks: Vec<_> = tokens.iter().enumerate().map(|(i, &t)| chunk(i, t)).collect();
            let plan = batch(chunks.clone(), limit);
            let flat: Vec<Chunk> = plan.batches.into_iter().flatten().collect();
            prop_assert_eq!(flat, chunks);
            prop_assert_eq!(plan.total_tokens, tokens.iter().sum::<usize>());
        }
    }
}
