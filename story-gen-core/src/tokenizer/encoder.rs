use crate::tokenizer::vocab::{CONTROL_SYMBOLS, SymbolId};
use crate::tokenizer::{Tokenizer, merge_adjacent};

impl Tokenizer {
	/// Encodes raw text into a flat sequence of symbol ids.
	///
	/// # Behavior
	/// - Splits on whitespace; each word becomes its character sequence
	///   plus the boundary marker.
	/// - Replays the merge rules in ascending rank, one pass per rule,
	///   merging non-overlapping occurrences left to right. Training
	///   guarantees a later rule never re-creates an earlier rule's pair,
	///   so a single pass per rank is enough.
	/// - A word that is exactly a control symbol (corpus end markers)
	///   becomes that control token, atomically.
	///
	/// # Notes
	/// Characters outside the trained alphabet map to the unknown token:
	/// output quality degrades, but encoding never fails.
	pub fn encode(&self, text: &str) -> Vec<SymbolId> {
		let mut ids = Vec::new();
		for word in text.split_whitespace() {
			if CONTROL_SYMBOLS.contains(&word) {
				// id_of cannot fail: control symbols are interned at
				// construction.
				if let Some(id) = self.vocabulary().id_of(word) {
					ids.push(id);
				}
				continue;
			}
			ids.extend(self.encode_word(word));
		}
		ids
	}

	/// Encodes one whitespace-delimited word.
	fn encode_word(&self, word: &str) -> Vec<SymbolId> {
		let unknown = self.control_tokens().unknown;
		let mut seq: Vec<SymbolId> = word
			.chars()
			.map(|c| {
				self.vocabulary()
					.id_of(c.to_string().as_str())
					.unwrap_or(unknown)
			})
			.collect();
		seq.push(self.boundary());

		for rule in self.merge_rules() {
			merge_adjacent(&mut seq, rule.left, rule.right, rule.merged);
		}
		seq
	}
}
