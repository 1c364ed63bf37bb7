use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::artifact;
use crate::error::Result;
use crate::model::language_model::LanguageModel;
use crate::model::state::GenerationState;
use crate::tokenizer::Tokenizer;
use crate::tokenizer::vocab::SymbolId;

/// Smallest accepted generation length, in tokens.
pub const MIN_STORY_TOKENS: usize = 10;
/// Largest accepted generation length, in tokens.
pub const MAX_STORY_TOKENS: usize = 2000;

/// High-level story generator.
///
/// Bundles the trained tokenizer and language model into the immutable
/// artifact served at runtime. The bundle is loaded once and shared by
/// reference across concurrent requests; every request brings its own
/// random source and gets its own generation state.
///
/// # Responsibilities
/// - Expose `encode`/`decode` to the request layer
/// - Drive the sampling loop from a seed prefix to the end-of-text token
///   or the length bound
/// - Load and save the persisted artifact bundle
#[derive(Debug, Clone)]
pub struct StoryGenerator {
	tokenizer: Tokenizer,
	model: LanguageModel,
}

impl StoryGenerator {
	/// Assembles a generator from its trained parts.
	pub fn new(tokenizer: Tokenizer, model: LanguageModel) -> Self {
		Self { tokenizer, model }
	}

	/// Loads the artifact bundle from a directory.
	///
	/// # Errors
	/// Any failure (`VocabularyLoad`, `MalformedMergeFile`, `ModelLoad`)
	/// is fatal: a service must refuse to start rather than serve with a
	/// partial model.
	pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
		artifact::load(dir)
	}

	/// Persists the artifact bundle into a directory.
	pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
		artifact::save(dir, self)
	}

	/// The trained tokenizer.
	pub fn tokenizer(&self) -> &Tokenizer {
		&self.tokenizer
	}

	/// The trained language model.
	pub fn model(&self) -> &LanguageModel {
		&self.model
	}

	/// Encodes text into symbol ids. Never fails; unknown characters map
	/// to the unknown token.
	pub fn encode(&self, text: &str) -> Vec<SymbolId> {
		self.tokenizer.encode(text)
	}

	/// Decodes symbol ids into text, stripping every control token.
	pub fn decode(&self, ids: &[SymbolId]) -> Result<String> {
		self.tokenizer.decode(ids)
	}

	/// Generates a story continuation for `prefix`.
	///
	/// Deterministic given a fixed rng, otherwise stochastic. `max_length`
	/// bounds the number of generated tokens; the request layer validates
	/// it, but out-of-range values are clamped here as well.
	pub fn generate<R: Rng + ?Sized>(
		&self,
		prefix: &str,
		max_length: usize,
		rng: &mut R,
	) -> Result<String> {
		let cancel = AtomicBool::new(false);
		self.generate_with_cancel(prefix, max_length, rng, &cancel)
	}

	/// Generates a story continuation, checking `cancel` between sampling
	/// iterations.
	///
	/// # Behavior
	/// - Seeds the context window from the last two prefix tokens, padded
	///   for short prefixes. Prefix tokens never terminate the loop.
	/// - Each iteration samples one token, appends it to the buffer and
	///   shifts the window.
	/// - Stops on a generated end-of-text token (excluded from the output),
	///   on the length bound, or when `cancel` is raised.
	/// - Decodes prefix plus generated tokens into the final text; the
	///   decoder strips all control tokens.
	pub fn generate_with_cancel<R: Rng + ?Sized>(
		&self,
		prefix: &str,
		max_length: usize,
		rng: &mut R,
		cancel: &AtomicBool,
	) -> Result<String> {
		let max_length = max_length.clamp(MIN_STORY_TOKENS, MAX_STORY_TOKENS);
		let end_of_text = self.tokenizer.control_tokens().end_of_text;

		let mut buffer = self.tokenizer.encode(prefix);
		let mut state =
			GenerationState::seed(&buffer, self.tokenizer.control_tokens().pad);

		while !state.is_terminated() && state.emitted() < max_length {
			if cancel.load(Ordering::Relaxed) {
				break;
			}
			// A sampler without mass only happens on empty count tables;
			// treat it as exhaustion rather than an error.
			let Some(token) = self.model.sample(state.context(), rng) else {
				break;
			};
			state.advance(token);
			if token == end_of_text {
				state.terminate();
			} else {
				buffer.push(token);
			}
		}

		self.decode(&buffer)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::sync::atomic::AtomicBool;

	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;
	use crate::model::counts::NGramCounts;
	use crate::model::language_model::InterpolationWeights;
	use crate::tokenizer::trainer::{TrainerConfig, VocabTrainer, word_frequencies};
	use crate::tokenizer::vocab::{END_OF_TEXT, Vocabulary};

	/// Generator whose model puts all mass on the single symbol "a", so
	/// every sampling step is forced.
	fn forced_generator() -> StoryGenerator {
		let mut vocab = Vocabulary::new();
		let a = vocab.intern("a");
		let tokenizer = Tokenizer::new(vocab, Vec::new());
		let mut counts = NGramCounts::new();
		counts.unigram = HashMap::from([(a, 1)]);
		let model = LanguageModel::new(counts, InterpolationWeights::default());
		StoryGenerator::new(tokenizer, model)
	}

	/// Generator whose model can only ever sample the end-of-text token.
	fn terminating_generator() -> StoryGenerator {
		let mut vocab = Vocabulary::new();
		vocab.intern("a");
		let tokenizer = Tokenizer::new(vocab, Vec::new());
		let eot = tokenizer.control_tokens().end_of_text;
		let mut counts = NGramCounts::new();
		counts.unigram = HashMap::from([(eot, 1)]);
		let model = LanguageModel::new(counts, InterpolationWeights::default());
		StoryGenerator::new(tokenizer, model)
	}

	#[test]
	fn generation_stops_at_the_length_bound() {
		let generator = forced_generator();
		let mut rng = StdRng::seed_from_u64(1);
		let story = generator.generate("a", 12, &mut rng).unwrap();
		// Prefix word, then exactly 12 forced "a" symbols with no
		// boundary markers between them.
		assert_eq!(story, format!("a {}", "a".repeat(12)));
	}

	#[test]
	fn out_of_range_lengths_are_clamped() {
		let generator = forced_generator();
		let mut rng = StdRng::seed_from_u64(1);
		let story = generator.generate("a", 0, &mut rng).unwrap();
		assert_eq!(story, format!("a {}", "a".repeat(MIN_STORY_TOKENS)));
	}

	#[test]
	fn a_generated_end_of_text_terminates_and_is_stripped() {
		let generator = terminating_generator();
		let mut rng = StdRng::seed_from_u64(3);
		let story = generator.generate("a", 50, &mut rng).unwrap();
		assert_eq!(story, "a");
	}

	#[test]
	fn prefix_end_of_text_tokens_do_not_terminate() {
		let generator = forced_generator();
		let mut rng = StdRng::seed_from_u64(5);
		// The prefix carries an explicit end-of-text marker; generation
		// must still run to the length bound.
		let prefix = format!("a {END_OF_TEXT} a");
		let story = generator.generate(&prefix, 10, &mut rng).unwrap();
		assert_eq!(story, format!("a a {}", "a".repeat(10)));
	}

	#[test]
	fn cancellation_stops_the_loop_between_iterations() {
		let generator = forced_generator();
		let mut rng = StdRng::seed_from_u64(9);
		let cancel = AtomicBool::new(true);
		let story = generator
			.generate_with_cancel("a", 100, &mut rng, &cancel)
			.unwrap();
		// Cancelled before the first draw: only the prefix survives.
		assert_eq!(story, "a");
	}

	#[test]
	fn empty_models_fall_back_to_the_bare_prefix() {
		let mut vocab = Vocabulary::new();
		vocab.intern("a");
		let tokenizer = Tokenizer::new(vocab, Vec::new());
		let model =
			LanguageModel::new(NGramCounts::new(), InterpolationWeights::default());
		let generator = StoryGenerator::new(tokenizer, model);
		let mut rng = StdRng::seed_from_u64(11);
		assert_eq!(generator.generate("a", 20, &mut rng).unwrap(), "a");
	}

	#[test]
	fn trained_generation_is_reproducible_and_clean() {
		let corpus = format!(
			"once upon a time {eot} the cat sat on a mat {eot} once the mat ran {eot}",
			eot = END_OF_TEXT
		);
		let words = word_frequencies(&corpus);
		let config = TrainerConfig {
			target_vocab_size: 60,
			min_pair_frequency: 2,
		};
		let tokenizer = VocabTrainer::new(&words, config).unwrap().train();
		let counts = NGramCounts::from_sequences(&[tokenizer.encode(&corpus)]);
		let model = LanguageModel::new(counts, InterpolationWeights::default());
		let generator = StoryGenerator::new(tokenizer, model);

		let story = |seed: u64| {
			let mut rng = StdRng::seed_from_u64(seed);
			generator.generate("once upon", 40, &mut rng).unwrap()
		};
		// Deterministic under a fixed seed.
		assert_eq!(story(42), story(42));
		// No control character ever escapes the decoder.
		for c in story(42).chars() {
			assert!(!('\u{E000}'..='\u{E004}').contains(&c));
		}
		assert!(story(42).starts_with("once upon"));
	}
}
