use std::collections::HashMap;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::io::read_file;
use crate::tokenizer::vocab::{CONTROL_SYMBOLS, SymbolId, Vocabulary, WORD_BOUNDARY};
use crate::tokenizer::{Tokenizer, merge_adjacent};

/// A learned merge: `(left, right)` collapses into `merged`.
///
/// Rank is the rule's position in the learned order; the encoder replays
/// rules strictly by ascending rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRule {
	pub left: SymbolId,
	pub right: SymbolId,
	pub merged: SymbolId,
}

/// Stopping criteria for merge learning.
#[derive(Debug, Clone, Copy)]
pub struct TrainerConfig {
	/// Stop once the vocabulary holds this many symbols.
	pub target_vocab_size: usize,
	/// Stop once no pair occurs at least this often (weighted by word
	/// frequency). Must be >= 2: a pair seen once carries no signal.
	pub min_pair_frequency: u64,
}

impl Default for TrainerConfig {
	fn default() -> Self {
		Self {
			target_vocab_size: 250,
			min_pair_frequency: 2,
		}
	}
}

/// Splits corpus text into a word multiset, ordered by first appearance.
///
/// The order matters: symbol ids are assigned in the order the trainer
/// first sees them, so a reproducible input order is what makes training
/// reproducible.
pub fn word_frequencies(text: &str) -> Vec<(String, u64)> {
	let mut order: Vec<(String, u64)> = Vec::new();
	let mut index: HashMap<String, usize> = HashMap::new();
	for word in text.split_whitespace() {
		match index.get(word) {
			Some(&i) => order[i].1 += 1,
			None => {
				index.insert(word.to_owned(), order.len());
				order.push((word.to_owned(), 1));
			}
		}
	}
	order
}

/// Reads a corpus file and builds its word multiset.
///
/// # Errors
/// Propagates filesystem errors.
pub fn word_frequencies_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<(String, u64)>> {
	Ok(word_frequencies(&read_file(path)?))
}

/// Learns a symbol alphabet and an ordered list of merge rules from a
/// word-frequency corpus.
///
/// # Responsibilities
/// - Intern the character alphabet in first-appearance order
/// - Repeatedly merge the most frequent adjacent symbol pair
/// - Record each merge as a ranked `MergeRule`
///
/// # Invariants
/// - Pair selection is deterministic: equal counts are broken by the
///   lexicographic order of the `(left, right)` id pair
/// - Every word carries the boundary marker as its final symbol, except
///   words that are themselves a control token (kept atomic)
#[derive(Debug)]
pub struct VocabTrainer {
	config: TrainerConfig,
	vocab: Vocabulary,
	/// Corpus words as symbol id sequences, with their frequencies.
	words: Vec<(Vec<SymbolId>, u64)>,
	merges: Vec<MergeRule>,
}

impl VocabTrainer {
	/// Prepares a trainer from a word multiset.
	///
	/// Each word becomes its character sequence plus the boundary marker;
	/// words equal to a control symbol stay atomic. Characters are interned
	/// in first-appearance order.
	///
	/// # Errors
	/// Returns `InsufficientCorpus` if the multiset holds no non-empty word.
	pub fn new(words: &[(String, u64)], config: TrainerConfig) -> Result<Self> {
		let mut vocab = Vocabulary::new();
		let mut sequences = Vec::with_capacity(words.len());

		for (word, frequency) in words {
			if word.is_empty() || *frequency == 0 {
				continue;
			}
			let sequence = if CONTROL_SYMBOLS.contains(&word.as_str()) {
				vec![vocab.intern(word)]
			} else {
				let mut seq: Vec<SymbolId> = word
					.chars()
					.map(|c| vocab.intern(&c.to_string()))
					.collect();
				seq.push(vocab.intern(WORD_BOUNDARY));
				seq
			};
			sequences.push((sequence, *frequency));
		}

		if sequences.is_empty() {
			return Err(CoreError::InsufficientCorpus);
		}

		Ok(Self {
			config,
			vocab,
			words: sequences,
			merges: Vec::new(),
		})
	}

	/// Runs the merge loop to completion and returns the trained tokenizer.
	///
	/// # Behavior
	/// - Stops when the vocabulary reaches `target_vocab_size`, or when the
	///   best remaining pair occurs fewer than `min_pair_frequency` times.
	/// - Each iteration merges exactly one pair everywhere it occurs, so the
	///   rule order seen by the encoder is the order learned here.
	pub fn train(mut self) -> Tokenizer {
		let alphabet = self.vocab.len();

		while self.vocab.len() < self.config.target_vocab_size {
			let Some((pair, count)) = self.best_pair() else {
				break;
			};
			if count < self.config.min_pair_frequency {
				break;
			}
			self.apply_merge(pair);
			log::debug!(
				"merge {}: ({}, {}) -> {} ({} occurrences)",
				self.merges.len(),
				pair.0,
				pair.1,
				self.vocab.len() - 1,
				count
			);
		}

		log::info!(
			"trained vocabulary: {} characters, {} merges, {} symbols",
			alphabet,
			self.merges.len(),
			self.vocab.len()
		);
		Tokenizer::new(self.vocab, self.merges)
	}

	/// Counts every adjacent symbol pair across all words, weighted by
	/// word frequency.
	fn pair_counts(&self) -> HashMap<(SymbolId, SymbolId), u64> {
		let mut counts = HashMap::new();
		for (sequence, frequency) in &self.words {
			for window in sequence.windows(2) {
				*counts.entry((window[0], window[1])).or_insert(0) += frequency;
			}
		}
		counts
	}

	/// Picks the pair to merge next.
	///
	/// Highest total count wins; equal counts fall back to the smaller
	/// `(left, right)` id pair. The tie-break is what makes two training
	/// runs over the same corpus produce identical rules.
	fn best_pair(&self) -> Option<((SymbolId, SymbolId), u64)> {
		let counts = self.pair_counts();
		let mut best: Option<((SymbolId, SymbolId), u64)> = None;
		for (&pair, &count) in &counts {
			best = match best {
				None => Some((pair, count)),
				Some((best_pair, best_count)) => {
					if count > best_count || (count == best_count && pair < best_pair) {
						Some((pair, count))
					} else {
						Some((best_pair, best_count))
					}
				}
			};
		}
		best
	}

	/// Interns the merged symbol, records the rule, and rewrites every word.
	fn apply_merge(&mut self, (left, right): (SymbolId, SymbolId)) {
		// Both ids come from the pair counts, so the lookups cannot fail.
		let merged_symbol = format!(
			"{}{}",
			self.vocab.symbol(left).unwrap_or_default(),
			self.vocab.symbol(right).unwrap_or_default()
		);
		let merged = self.vocab.intern(&merged_symbol);
		self.merges.push(MergeRule { left, right, merged });

		for (sequence, _) in &mut self.words {
			merge_adjacent(sequence, left, right, merged);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tokenizer::vocab::END_OF_TEXT;

	fn counted(words: &[(&str, u64)]) -> Vec<(String, u64)> {
		words.iter().map(|(w, f)| ((*w).to_owned(), *f)).collect()
	}

	#[test]
	fn empty_corpus_is_rejected() {
		let err = VocabTrainer::new(&[], TrainerConfig::default()).unwrap_err();
		assert!(matches!(err, CoreError::InsufficientCorpus));

		// Words with no characters do not count either.
		let err = VocabTrainer::new(&counted(&[("", 3)]), TrainerConfig::default())
			.unwrap_err();
		assert!(matches!(err, CoreError::InsufficientCorpus));
	}

	#[test]
	fn word_frequencies_preserve_first_appearance_order() {
		let words = word_frequencies("low lower low low new");
		assert_eq!(
			words,
			vec![
				("low".to_owned(), 3),
				("lower".to_owned(), 1),
				("new".to_owned(), 1),
			]
		);
	}

	#[test]
	fn word_frequencies_load_from_corpus_files() {
		let path = std::env::temp_dir().join(format!(
			"story-gen-corpus-{}.txt",
			std::process::id()
		));
		std::fs::write(&path, "one two\ntwo three\n").unwrap();
		let words = word_frequencies_from_file(&path).unwrap();
		assert_eq!(
			words,
			vec![
				("one".to_owned(), 1),
				("two".to_owned(), 2),
				("three".to_owned(), 1),
			]
		);
		let _ = std::fs::remove_file(&path);
	}

	#[test]
	fn characters_intern_before_merges() {
		// "ab" x3: alphabet a, b, </w>; first merge must take ids 0..2.
		let trainer =
			VocabTrainer::new(&counted(&[("ab", 3)]), TrainerConfig::default()).unwrap();
		let tokenizer = trainer.train();
		let vocab = tokenizer.vocabulary();
		assert_eq!(vocab.id_of("a"), Some(0));
		assert_eq!(vocab.id_of("b"), Some(1));
		assert_eq!(vocab.id_of(WORD_BOUNDARY), Some(2));
		// Merged symbols follow the alphabet.
		assert!(vocab.id_of("ab").is_some_and(|id| id >= 3));
	}

	#[test]
	fn equal_counts_break_ties_toward_the_smaller_pair() {
		// "ab" and "cd" twice each: pairs (a,b), (b,</w>), (c,d), (d,</w>)
		// all occur twice. Ids: a=0 b=1 </w>=2 c=3 d=4, so (0,1) must win
		// the first round.
		let words = counted(&[("ab", 2), ("cd", 2)]);
		let config = TrainerConfig {
			target_vocab_size: 6,
			min_pair_frequency: 2,
		};
		let tokenizer = VocabTrainer::new(&words, config).unwrap().train();
		let first = tokenizer.merge_rules()[0];
		assert_eq!((first.left, first.right), (0, 1));
		assert_eq!(
			tokenizer.vocabulary().symbol(first.merged),
			Some("ab")
		);
	}

	#[test]
	fn rare_pairs_are_never_merged() {
		// Every pair occurs exactly once; the default minimum of 2 stops
		// training before any rule is learned.
		let words = counted(&[("ab", 1), ("cd", 1)]);
		let tokenizer = VocabTrainer::new(&words, TrainerConfig::default())
			.unwrap()
			.train();
		assert!(tokenizer.merge_rules().is_empty());
	}

	#[test]
	fn training_is_deterministic() {
		let words = counted(&[
			("the", 12),
			("then", 5),
			("there", 3),
			("other", 7),
			("hat", 2),
		]);
		let config = TrainerConfig {
			target_vocab_size: 40,
			min_pair_frequency: 2,
		};
		let first = VocabTrainer::new(&words, config).unwrap().train();
		let second = VocabTrainer::new(&words, config).unwrap().train();
		assert_eq!(first.merge_rules(), second.merge_rules());
		let first_entries: Vec<_> = first.vocabulary().entries().collect();
		let second_entries: Vec<_> = second.vocabulary().entries().collect();
		assert_eq!(first_entries, second_entries);
	}

	#[test]
	fn control_token_words_stay_atomic() {
		let words = counted(&[("ab", 4), (END_OF_TEXT, 4)]);
		let tokenizer = VocabTrainer::new(&words, TrainerConfig::default())
			.unwrap()
			.train();
		let vocab = tokenizer.vocabulary();
		// The marker became a single symbol, not characters + boundary.
		let id = vocab.id_of(END_OF_TEXT).unwrap();
		assert_eq!(tokenizer.control_tokens().end_of_text, id);
		// No merged symbol ever contains the control character.
		for (symbol, _) in vocab.entries() {
			if symbol.contains('\u{E002}') {
				assert_eq!(symbol, END_OF_TEXT);
			}
		}
	}

	#[test]
	fn target_vocab_size_bounds_the_merge_count() {
		let words = counted(&[("abcabc", 9), ("bca", 9)]);
		let config = TrainerConfig {
			target_vocab_size: 6,
			min_pair_frequency: 2,
		};
		let tokenizer = VocabTrainer::new(&words, config).unwrap().train();
		// Alphabet is a, b, c, </w> (4 symbols); at most 2 merges fit.
		assert!(tokenizer.merge_rules().len() <= 2);
	}
}
