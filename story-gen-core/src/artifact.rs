use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::io::ensure_dir;
use crate::model::counts::NGramCounts;
use crate::model::generator::StoryGenerator;
use crate::model::language_model::{InterpolationWeights, LanguageModel};
use crate::tokenizer::Tokenizer;
use crate::tokenizer::trainer::MergeRule;
use crate::tokenizer::vocab::{ControlTokens, SymbolId, Vocabulary};

/// Ordered `(symbol, id)` pairs.
pub const VOCABULARY_FILE: &str = "vocabulary.dat";
/// Ordered `(left, right, merged)` symbol triples; position defines rank.
pub const MERGES_FILE: &str = "merges.dat";
/// N-gram counts, interpolation weights and control token ids.
pub const MODEL_FILE: &str = "model.dat";

/// On-disk layout of the model file.
#[derive(Serialize, Deserialize)]
struct ModelFile {
	counts: NGramCounts,
	lambdas: (f64, f64, f64),
	control: ControlTokens,
}

/// Persists a generator's artifact bundle into `dir`.
///
/// Three files are written: the vocabulary in insertion order, the merge
/// rules in rank order (as symbol triples, so the file is self-describing),
/// and the model counts with weights and control ids.
///
/// # Errors
/// Propagates filesystem and serialization failures.
pub fn save<P: AsRef<Path>>(dir: P, generator: &StoryGenerator) -> Result<()> {
	let dir = dir.as_ref();
	ensure_dir(dir)?;
	let tokenizer = generator.tokenizer();
	let vocab = tokenizer.vocabulary();

	let entries: Vec<(String, SymbolId)> = vocab
		.entries()
		.map(|(symbol, id)| (symbol.to_owned(), id))
		.collect();
	fs::write(dir.join(VOCABULARY_FILE), postcard::to_stdvec(&entries)?)?;

	// Ids come from the live vocabulary, so the symbol lookups cannot fail.
	let triples: Vec<(String, String, String)> = tokenizer
		.merge_rules()
		.iter()
		.map(|rule| {
			let symbol =
				|id| vocab.symbol(id).unwrap_or_default().to_owned();
			(symbol(rule.left), symbol(rule.right), symbol(rule.merged))
		})
		.collect();
	fs::write(dir.join(MERGES_FILE), postcard::to_stdvec(&triples)?)?;

	let weights = generator.model().weights();
	let model = ModelFile {
		counts: generator.model().counts().clone(),
		lambdas: (weights.unigram, weights.bigram, weights.trigram),
		control: tokenizer.control_tokens(),
	};
	fs::write(dir.join(MODEL_FILE), postcard::to_stdvec(&model)?)?;

	log::info!(
		"saved artifact bundle to {}: {} symbols, {} merges",
		dir.display(),
		vocab.len(),
		tokenizer.merge_rules().len()
	);
	Ok(())
}

/// Loads a generator's artifact bundle from `dir`.
///
/// # Behavior
/// - The vocabulary must reload with dense, in-order ids: counts and rules
///   reference symbols by id.
/// - Merge triples are resolved against the vocabulary and replayed in file
///   order, which restores the training-time ranks exactly.
/// - The control token ids recorded in the model file must match the ones
///   derived from the vocabulary.
///
/// # Errors
/// `VocabularyLoad`, `MalformedMergeFile` or `ModelLoad` depending on the
/// failing file. All of them are fatal to service startup.
pub fn load<P: AsRef<Path>>(dir: P) -> Result<StoryGenerator> {
	let dir = dir.as_ref();

	let bytes = fs::read(dir.join(VOCABULARY_FILE))
		.map_err(|e| CoreError::VocabularyLoad(format!("{VOCABULARY_FILE}: {e}")))?;
	let entries: Vec<(String, SymbolId)> = postcard::from_bytes(&bytes)
		.map_err(|e| CoreError::VocabularyLoad(format!("{VOCABULARY_FILE}: {e}")))?;
	let vocab = Vocabulary::from_entries(entries)?;

	let bytes = fs::read(dir.join(MERGES_FILE))
		.map_err(|e| CoreError::MalformedMergeFile(format!("{MERGES_FILE}: {e}")))?;
	let triples: Vec<(String, String, String)> = postcard::from_bytes(&bytes)
		.map_err(|e| CoreError::MalformedMergeFile(format!("{MERGES_FILE}: {e}")))?;

	let mut merges = Vec::with_capacity(triples.len());
	for (rank, (left, right, merged)) in triples.iter().enumerate() {
		if format!("{left}{right}") != *merged {
			return Err(CoreError::MalformedMergeFile(format!(
				"rule {rank}: {left:?} + {right:?} does not produce {merged:?}"
			)));
		}
		let resolve = |symbol: &str| {
			vocab.id_of(symbol).ok_or_else(|| {
				CoreError::MalformedMergeFile(format!(
					"rule {rank}: symbol {symbol:?} is not in the vocabulary"
				))
			})
		};
		merges.push(MergeRule {
			left: resolve(left)?,
			right: resolve(right)?,
			merged: resolve(merged)?,
		});
	}
	let tokenizer = Tokenizer::new(vocab, merges);

	let bytes = fs::read(dir.join(MODEL_FILE))
		.map_err(|e| CoreError::ModelLoad(format!("{MODEL_FILE}: {e}")))?;
	let model_file: ModelFile = postcard::from_bytes(&bytes)
		.map_err(|e| CoreError::ModelLoad(format!("{MODEL_FILE}: {e}")))?;

	if model_file.control != tokenizer.control_tokens() {
		return Err(CoreError::ModelLoad(
			"control token ids do not match the vocabulary".to_owned(),
		));
	}
	let (l1, l2, l3) = model_file.lambdas;
	let weights = InterpolationWeights::new(l1, l2, l3)
		.map_err(|e| CoreError::ModelLoad(e.to_string()))?;
	let model = LanguageModel::new(model_file.counts, weights);

	log::info!(
		"loaded artifact bundle from {}: {} symbols, {} merges, {} unigram types",
		dir.display(),
		tokenizer.vocabulary().len(),
		tokenizer.merge_rules().len(),
		model.counts().unigram_types()
	);
	Ok(StoryGenerator::new(tokenizer, model))
}
