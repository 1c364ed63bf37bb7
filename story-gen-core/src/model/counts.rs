use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::tokenizer::vocab::SymbolId;

/// Occurrence count.
pub type Count = u64;

/// N-gram count tables of orders 1, 2 and 3.
///
/// Each table maps a context (0, 1 or 2 preceding token ids) to the counts
/// of the tokens that followed it. Counts are built once from the encoded
/// training corpus and read-only afterwards; no smoothing happens here,
/// smoothing is the language model's concern.
///
/// # Invariants
/// - Accumulation is pure addition: partial counts over disjoint corpus
///   shards merge into the same result regardless of shard order
/// - Every recorded count is >= 1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NGramCounts {
	/// token -> count
	pub(crate) unigram: HashMap<SymbolId, Count>,
	/// preceding token -> following token -> count
	pub(crate) bigram: HashMap<SymbolId, HashMap<SymbolId, Count>>,
	/// two preceding tokens -> following token -> count
	pub(crate) trigram: HashMap<(SymbolId, SymbolId), HashMap<SymbolId, Count>>,
}

impl NGramCounts {
	/// Creates empty count tables.
	pub fn new() -> Self {
		Self::default()
	}

	/// Slides a window of size 3 over `tokens` and accumulates all three
	/// tables in one pass.
	///
	/// The first two positions only populate the lower orders: a bigram
	/// needs one preceding token, a trigram two.
	pub fn observe(&mut self, tokens: &[SymbolId]) {
		for (i, &w3) in tokens.iter().enumerate() {
			*self.unigram.entry(w3).or_insert(0) += 1;
			if i >= 1 {
				*self
					.bigram
					.entry(tokens[i - 1])
					.or_default()
					.entry(w3)
					.or_insert(0) += 1;
			}
			if i >= 2 {
				*self
					.trigram
					.entry((tokens[i - 2], tokens[i - 1]))
					.or_default()
					.entry(w3)
					.or_insert(0) += 1;
			}
		}
	}

	/// Builds counts over several token sequences, one after another.
	///
	/// Windows never span sequence boundaries: each document or story is
	/// its own sequence.
	pub fn from_sequences(sequences: &[Vec<SymbolId>]) -> Self {
		let mut counts = Self::new();
		for sequence in sequences {
			counts.observe(sequence);
		}
		counts
	}

	/// Builds counts over several token sequences using worker threads.
	///
	/// # Behavior
	/// - Splits the sequences into chunks (based on CPU cores * factor).
	/// - Spawns threads that each accumulate a partial table.
	/// - Merges all partial tables by addition before returning, so no
	///   reader ever observes partially-merged state.
	///
	/// # Notes
	/// - Uses MPSC channels to collect partial tables from threads.
	/// - Addition is associative and commutative, so the merged result is
	///   identical to the sequential one whatever the thread order.
	pub fn from_sequences_parallel(sequences: Vec<Vec<SymbolId>>) -> Self {
		if sequences.is_empty() {
			return Self::new();
		}

		let cpus = num_cpus::get();
		let factor = 8;
		let chunks = cpus * factor;
		let chunk_size = (sequences.len() + chunks - 1) / chunks;

		let (tx, rx) = mpsc::channel();
		for chunk in sequences.chunks(chunk_size.max(1)) {
			let tx = tx.clone();
			let chunk: Vec<Vec<SymbolId>> = chunk.to_vec();

			thread::spawn(move || {
				let mut partial = NGramCounts::new();
				for sequence in &chunk {
					partial.observe(sequence);
				}
				tx.send(partial).expect("Failed to send from thread");
			});
		}
		drop(tx);

		let mut counts = Self::new();
		for partial in rx.iter() {
			counts.merge(&partial);
		}
		counts
	}

	/// Merges another count table into this one by addition.
	pub fn merge(&mut self, other: &Self) {
		for (&token, &count) in &other.unigram {
			*self.unigram.entry(token).or_insert(0) += count;
		}
		for (&context, row) in &other.bigram {
			let target = self.bigram.entry(context).or_default();
			for (&token, &count) in row {
				*target.entry(token).or_insert(0) += count;
			}
		}
		for (&context, row) in &other.trigram {
			let target = self.trigram.entry(context).or_default();
			for (&token, &count) in row {
				*target.entry(token).or_insert(0) += count;
			}
		}
	}

	/// Count of a single token.
	pub fn unigram(&self, token: SymbolId) -> Count {
		self.unigram.get(&token).copied().unwrap_or(0)
	}

	/// Sum of all unigram counts.
	pub fn unigram_total(&self) -> Count {
		self.unigram.values().sum()
	}

	/// Continuation counts observed after `context`, if any.
	pub fn bigram_row(&self, context: SymbolId) -> Option<&HashMap<SymbolId, Count>> {
		self.bigram.get(&context)
	}

	/// Continuation counts observed after the two-token `context`, if any.
	pub fn trigram_row(
		&self,
		context: (SymbolId, SymbolId),
	) -> Option<&HashMap<SymbolId, Count>> {
		self.trigram.get(&context)
	}

	/// Distinct tokens observed at least once, in ascending id order.
	///
	/// This is the candidate set for sampling; the fixed order is what
	/// makes a seeded draw reproducible.
	pub fn observed_tokens(&self) -> Vec<SymbolId> {
		let mut tokens: Vec<SymbolId> = self.unigram.keys().copied().collect();
		tokens.sort_unstable();
		tokens
	}

	/// Number of distinct tokens observed.
	pub fn unigram_types(&self) -> usize {
		self.unigram.len()
	}

	/// Number of one-token contexts with observed continuations.
	pub fn bigram_contexts(&self) -> usize {
		self.bigram.len()
	}

	/// Number of two-token contexts with observed continuations.
	pub fn trigram_contexts(&self) -> usize {
		self.trigram.len()
	}
}
