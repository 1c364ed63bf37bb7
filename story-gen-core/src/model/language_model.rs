use rand::Rng;

use crate::error::{CoreError, Result};
use crate::model::counts::{Count, NGramCounts};
use crate::tokenizer::vocab::SymbolId;

/// Fixed mixing coefficients for the three n-gram orders.
///
/// The weights must each lie in [0, 1] and sum to 1. They are never
/// renormalized per context: when a higher-order context is unseen its term
/// contributes zero and the distribution simply carries less mass, which
/// the sampler absorbs by dividing through the realized sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationWeights {
	pub unigram: f64,
	pub bigram: f64,
	pub trigram: f64,
}

impl Default for InterpolationWeights {
	/// The trained defaults: most of the mass on the trigram estimate.
	fn default() -> Self {
		Self {
			unigram: 0.1,
			bigram: 0.3,
			trigram: 0.6,
		}
	}
}

impl InterpolationWeights {
	const TOLERANCE: f64 = 1e-9;

	/// Creates a validated weight triple.
	///
	/// # Errors
	/// Returns `InvalidWeights` if any weight falls outside [0, 1] or the
	/// three do not sum to 1 within floating tolerance.
	pub fn new(unigram: f64, bigram: f64, trigram: f64) -> Result<Self> {
		let in_range =
			|w: f64| (0.0..=1.0).contains(&w) && w.is_finite();
		let sum = unigram + bigram + trigram;
		if !in_range(unigram)
			|| !in_range(bigram)
			|| !in_range(trigram)
			|| (sum - 1.0).abs() > Self::TOLERANCE
		{
			return Err(CoreError::InvalidWeights(unigram, bigram, trigram));
		}
		Ok(Self { unigram, bigram, trigram })
	}
}

/// Interpolated trigram language model.
///
/// Computes `P(w3 | w1, w2)` as a weighted mix of unigram, bigram and
/// trigram maximum-likelihood estimates over the count tables, and samples
/// the next token from the resulting distribution.
///
/// # Responsibilities
/// - Score candidate continuations for a two-token context
/// - Sample a continuation with an explicit random source
///
/// # Invariants
/// - Candidates are the unigram-observed token ids in ascending order;
///   the fixed order makes a seeded draw reproducible
/// - The sampler normalizes by the realized score sum, so entirely unseen
///   higher-order contexts need no special-casing
#[derive(Debug, Clone)]
pub struct LanguageModel {
	counts: NGramCounts,
	weights: InterpolationWeights,
	/// Unigram-observed token ids, ascending. Cached at construction.
	candidates: Vec<SymbolId>,
	/// Sum of all unigram counts. Cached at construction.
	unigram_total: Count,
}

impl LanguageModel {
	/// Builds a model over finished count tables.
	///
	/// All partial counts must be merged before this point; the model
	/// never observes additional text.
	pub fn new(counts: NGramCounts, weights: InterpolationWeights) -> Self {
		let candidates = counts.observed_tokens();
		let unigram_total = counts.unigram_total();
		Self { counts, weights, candidates, unigram_total }
	}

	/// Read-only view of the count tables.
	pub fn counts(&self) -> &NGramCounts {
		&self.counts
	}

	/// The mixing coefficients.
	pub fn weights(&self) -> InterpolationWeights {
		self.weights
	}

	/// Interpolated score of `token` following `context`.
	///
	/// `λ1 · P_uni + λ2 · P_bi + λ3 · P_tri`, where the bigram and trigram
	/// terms are zero for unseen contexts.
	pub fn score(&self, context: (SymbolId, SymbolId), token: SymbolId) -> f64 {
		let (_, w2) = context;
		let bi_row = self.counts.bigram_row(w2);
		let bi_total = bi_row.map_or(0, |row| row.values().sum());
		let tri_row = self.counts.trigram_row(context);
		let tri_total = tri_row.map_or(0, |row| row.values().sum());
		self.score_with_rows(token, bi_row, bi_total, tri_row, tri_total)
	}

	/// Normalized next-token distribution for `context`.
	///
	/// Returns an empty vector when no candidate carries mass, which is
	/// only possible with empty count tables.
	pub fn distribution(&self, context: (SymbolId, SymbolId)) -> Vec<(SymbolId, f64)> {
		let (scores, total) = self.scores(context);
		if total <= 0.0 {
			return Vec::new();
		}
		self.candidates
			.iter()
			.zip(scores)
			.map(|(&token, score)| (token, score / total))
			.collect()
	}

	/// Samples the next token for `context`.
	///
	/// Builds the cumulative distribution over the candidates, draws a
	/// uniform value in `[0, total)` and locates the matching token. The
	/// random source is explicit: repeated calls with a fixed rng are
	/// reproducible, and concurrent calls never contend.
	///
	/// Returns `None` when no candidate carries mass.
	pub fn sample<R: Rng + ?Sized>(
		&self,
		context: (SymbolId, SymbolId),
		rng: &mut R,
	) -> Option<SymbolId> {
		let (scores, total) = self.scores(context);
		if total <= 0.0 {
			return None;
		}

		// Cumulative subtraction over the candidate scores.
		let mut r = rng.random_range(0.0..total);
		let mut fallback: Option<SymbolId> = None;
		for (&token, &score) in self.candidates.iter().zip(&scores) {
			if score <= 0.0 {
				continue;
			}
			if r < score {
				return Some(token);
			}
			r -= score;
			fallback = Some(token);
		}

		// Floating rounding can exhaust the loop; the last scored token
		// takes the residual mass.
		fallback
	}

	/// Scores every candidate for `context`, returning the scores aligned
	/// with `self.candidates` and their sum.
	fn scores(&self, context: (SymbolId, SymbolId)) -> (Vec<f64>, f64) {
		let (_, w2) = context;
		let bi_row = self.counts.bigram_row(w2);
		let bi_total = bi_row.map_or(0, |row| row.values().sum());
		let tri_row = self.counts.trigram_row(context);
		let tri_total = tri_row.map_or(0, |row| row.values().sum());

		let mut scores = Vec::with_capacity(self.candidates.len());
		let mut total = 0.0;
		for &token in &self.candidates {
			let score = self.score_with_rows(token, bi_row, bi_total, tri_row, tri_total);
			total += score;
			scores.push(score);
		}
		(scores, total)
	}

	fn score_with_rows(
		&self,
		token: SymbolId,
		bi_row: Option<&std::collections::HashMap<SymbolId, Count>>,
		bi_total: Count,
		tri_row: Option<&std::collections::HashMap<SymbolId, Count>>,
		tri_total: Count,
	) -> f64 {
		let p_uni = if self.unigram_total > 0 {
			self.counts.unigram(token) as f64 / self.unigram_total as f64
		} else {
			0.0
		};
		let p_bi = match bi_row {
			Some(row) if bi_total > 0 => {
				row.get(&token).copied().unwrap_or(0) as f64 / bi_total as f64
			}
			_ => 0.0,
		};
		let p_tri = match tri_row {
			Some(row) if tri_total > 0 => {
				row.get(&token).copied().unwrap_or(0) as f64 / tri_total as f64
			}
			_ => 0.0,
		};
		self.weights.unigram * p_uni
			+ self.weights.bigram * p_bi
			+ self.weights.trigram * p_tri
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;

	const A: SymbolId = 0;
	const B: SymbolId = 1;
	const C: SymbolId = 2;
	const D: SymbolId = 3;

	/// Counts crafted so that P_uni(C) = 0.2, P_bi(C|B) = 0.5 and
	/// P_tri(C|A,B) = 0.9.
	fn handmade_counts() -> NGramCounts {
		let mut counts = NGramCounts::new();
		counts.unigram = HashMap::from([(A, 4), (B, 3), (C, 2), (D, 1)]);
		counts.bigram = HashMap::from([(B, HashMap::from([(C, 1), (D, 1)]))]);
		counts.trigram = HashMap::from([((A, B), HashMap::from([(C, 9), (D, 1)]))]);
		counts
	}

	#[test]
	fn interpolation_mixes_the_three_orders() {
		let model = LanguageModel::new(handmade_counts(), InterpolationWeights::default());
		// 0.1 * 0.2 + 0.3 * 0.5 + 0.6 * 0.9
		let score = model.score((A, B), C);
		assert!((score - 0.71).abs() < 1e-12, "got {score}");
	}

	#[test]
	fn unseen_context_falls_back_to_the_unigram_distribution() {
		let model = LanguageModel::new(handmade_counts(), InterpolationWeights::default());
		// (D, D) was never observed at either higher order.
		let distribution = model.distribution((D, D));
		let expected = [(A, 0.4), (B, 0.3), (C, 0.2), (D, 0.1)];
		assert_eq!(distribution.len(), expected.len());
		for ((token, p), (expected_token, expected_p)) in
			distribution.iter().zip(expected)
		{
			assert_eq!(*token, expected_token);
			assert!((p - expected_p).abs() < 1e-12);
		}
	}

	#[test]
	fn distributions_are_positive_and_normalized() {
		let model = LanguageModel::new(handmade_counts(), InterpolationWeights::default());
		for context in [(A, B), (B, C), (D, D), (C, A)] {
			let distribution = model.distribution(context);
			assert!(!distribution.is_empty());
			let sum: f64 = distribution.iter().map(|(_, p)| p).sum();
			assert!((sum - 1.0).abs() < 1e-9, "sum {sum} for {context:?}");
			assert!(distribution.iter().all(|&(_, p)| p >= 0.0));
		}
	}

	#[test]
	fn sampling_is_reproducible_under_a_fixed_seed() {
		let model = LanguageModel::new(handmade_counts(), InterpolationWeights::default());
		let draw = |seed: u64| {
			let mut rng = StdRng::seed_from_u64(seed);
			(0..20)
				.map(|_| model.sample((A, B), &mut rng).unwrap())
				.collect::<Vec<_>>()
		};
		assert_eq!(draw(42), draw(42));
	}

	#[test]
	fn sampling_only_returns_observed_tokens() {
		let model = LanguageModel::new(handmade_counts(), InterpolationWeights::default());
		let mut rng = StdRng::seed_from_u64(7);
		for _ in 0..100 {
			let token = model.sample((D, D), &mut rng).unwrap();
			assert!(model.counts().unigram(token) > 0);
		}
	}

	#[test]
	fn empty_counts_yield_no_sample() {
		let model = LanguageModel::new(NGramCounts::new(), InterpolationWeights::default());
		let mut rng = StdRng::seed_from_u64(0);
		assert_eq!(model.sample((A, B), &mut rng), None);
		assert!(model.distribution((A, B)).is_empty());
	}

	#[test]
	fn weight_validation_rejects_bad_triples() {
		assert!(InterpolationWeights::new(0.1, 0.3, 0.6).is_ok());
		assert!(matches!(
			InterpolationWeights::new(0.2, 0.3, 0.6),
			Err(CoreError::InvalidWeights(..))
		));
		assert!(matches!(
			InterpolationWeights::new(-0.1, 0.5, 0.6),
			Err(CoreError::InvalidWeights(..))
		));
	}
}
