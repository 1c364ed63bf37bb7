//! Subword tokenizer built on learned byte-pair merges.
//!
//! - Symbol vocabulary with reserved control tokens (`vocab`)
//! - Merge-rule learning from a word-frequency corpus (`trainer`)
//! - Text to id-sequence encoding (`encoder`)
//! - Id-sequence to text decoding (`decoder`)

/// Vocabulary, symbol ids and reserved control tokens.
pub mod vocab;

/// Byte-pair merge learning.
///
/// Learns an ordered list of merge rules from word frequencies. Training is
/// deterministic: equal pair counts are broken by a fixed order on ids.
pub mod trainer;

/// Text encoding (merge-rule replay).
mod encoder;

/// Id decoding (control-token stripping, whitespace reconstruction).
mod decoder;

use vocab::{ControlTokens, SymbolId, Vocabulary, WORD_BOUNDARY};

use crate::tokenizer::trainer::MergeRule;

/// A trained subword tokenizer.
///
/// Bundles the vocabulary, the ordered merge rules and the reserved control
/// token ids. Immutable once built; shared read-only across concurrent
/// generation requests.
///
/// # Responsibilities
/// - Encode raw text into symbol ids (`encode`)
/// - Decode symbol ids back into readable text (`decode`)
/// - Expose the vocabulary and rules to the persistence layer
#[derive(Debug, Clone)]
pub struct Tokenizer {
	vocab: Vocabulary,
	merges: Vec<MergeRule>,
	control: ControlTokens,
	boundary: SymbolId,
}

impl Tokenizer {
	/// Builds a tokenizer from a vocabulary and its ordered merge rules.
	///
	/// The boundary marker and the five control tokens are interned if the
	/// vocabulary does not carry them yet, so a hand-built vocabulary works
	/// the same as a trained one.
	pub fn new(mut vocab: Vocabulary, merges: Vec<MergeRule>) -> Self {
		let boundary = vocab.intern(WORD_BOUNDARY);
		let control = ControlTokens::register(&mut vocab);
		Self { vocab, merges, control, boundary }
	}

	/// Read-only view of the vocabulary.
	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocab
	}

	/// The merge rules in rank order.
	pub fn merge_rules(&self) -> &[MergeRule] {
		&self.merges
	}

	/// Ids of the reserved control tokens.
	pub fn control_tokens(&self) -> ControlTokens {
		self.control
	}

	/// Id of the word boundary marker.
	pub(crate) fn boundary(&self) -> SymbolId {
		self.boundary
	}
}

/// Replaces every non-overlapping `(left, right)` occurrence in `seq` with
/// `merged`, scanning left to right.
///
/// Shared by the trainer (rewriting corpus words after a merge is learned)
/// and the encoder (replaying rules in rank order).
pub(crate) fn merge_adjacent(
	seq: &mut Vec<SymbolId>,
	left: SymbolId,
	right: SymbolId,
	merged: SymbolId,
) {
	if seq.len() < 2 {
		return;
	}
	let mut out = Vec::with_capacity(seq.len());
	let mut i = 0;
	while i < seq.len() {
		if i + 1 < seq.len() && seq[i] == left && seq[i + 1] == right {
			out.push(merged);
			i += 2;
		} else {
			out.push(seq[i]);
			i += 1;
		}
	}
	*seq = out;
}
