use crate::error::{CoreError, Result};
use crate::tokenizer::Tokenizer;
use crate::tokenizer::vocab::{SymbolId, WORD_BOUNDARY};

impl Tokenizer {
	/// Decodes a sequence of symbol ids back into readable text.
	///
	/// # Behavior
	/// - Control tokens (sentence/paragraph/text end, pad, unknown) are
	///   removed unconditionally: no control token ever reaches the caller.
	/// - Boundary markers become single spaces; whitespace runs collapse
	///   and the result is trimmed.
	///
	/// # Errors
	/// Returns `InvalidId` for an id outside the vocabulary. Ids produced
	/// by this tokenizer's own `encode` can never trigger it.
	pub fn decode(&self, ids: &[SymbolId]) -> Result<String> {
		let control = self.control_tokens();
		let mut text = String::new();
		for &id in ids {
			let symbol = self
				.vocabulary()
				.symbol(id)
				.ok_or(CoreError::InvalidId(id))?;
			if control.contains(id) {
				continue;
			}
			text.push_str(symbol);
		}

		let text = text.replace(WORD_BOUNDARY, " ");
		Ok(text
			.split_whitespace()
			.collect::<Vec<_>>()
			.join(" "))
	}
}
