use rand::SeedableRng;
use rand::rngs::StdRng;

use story_gen_core::model::counts::NGramCounts;
use story_gen_core::model::generator::StoryGenerator;
use story_gen_core::model::language_model::{InterpolationWeights, LanguageModel};
use story_gen_core::tokenizer::trainer::{TrainerConfig, VocabTrainer, word_frequencies};
use story_gen_core::tokenizer::vocab::{END_OF_SENTENCE, END_OF_TEXT};

/// A handful of tiny stories. Each sentence ends with the end-of-sentence
/// marker, each story with the end-of-text marker, the way the corpus
/// preprocessing emits them.
fn sample_corpus() -> Vec<String> {
	let stories = [
		vec![
			"once upon a time there was a little cat",
			"the cat lived near the river",
			"one day the cat found a boat",
		],
		vec![
			"a farmer walked to the market",
			"the market was far from the river",
			"the farmer sold his boat and walked home",
		],
		vec![
			"the little boat drifted down the river",
			"a cat watched it from the shore",
		],
	];

	stories
		.iter()
		.map(|sentences| {
			let mut story = String::new();
			for sentence in sentences {
				story.push_str(sentence);
				story.push(' ');
				story.push_str(END_OF_SENTENCE);
				story.push(' ');
			}
			story.push_str(END_OF_TEXT);
			story
		})
		.collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();

	// Build the word multiset from the corpus. The order of first
	// appearance matters: it fixes the symbol ids.
	let corpus = sample_corpus();
	let words = word_frequencies(&corpus.join(" "));
	println!("Corpus: {} stories, {} distinct words", corpus.len(), words.len());

	// Learn the subword vocabulary. A small target keeps the demo fast;
	// the minimum pair frequency of 2 is the default.
	let config = TrainerConfig {
		target_vocab_size: 120,
		..TrainerConfig::default()
	};
	let tokenizer = VocabTrainer::new(&words, config)?.train();
	println!(
		"Tokenizer: {} symbols, {} merges",
		tokenizer.vocabulary().len(),
		tokenizer.merge_rules().len()
	);

	// Encode each story separately so n-gram windows never span two
	// stories, then count in parallel and merge by addition.
	let sequences: Vec<_> = corpus.iter().map(|story| tokenizer.encode(story)).collect();
	let counts = NGramCounts::from_sequences_parallel(sequences);
	println!(
		"Counts: {} unigram types, {} bigram contexts, {} trigram contexts",
		counts.unigram_types(),
		counts.bigram_contexts(),
		counts.trigram_contexts()
	);

	// Assemble the model with the default weights (0.1, 0.3, 0.6) and
	// bundle it with the tokenizer.
	let model = LanguageModel::new(counts, InterpolationWeights::default());
	let generator = StoryGenerator::new(tokenizer, model);

	// Persist the bundle and reload it, the way a serving process would.
	generator.save("./data")?;
	let reloaded = StoryGenerator::load("./data")?;

	// Invalid weights are rejected up front.
	match InterpolationWeights::new(0.5, 0.5, 0.5) {
		Ok(_) => println!("Should not happen"),
		Err(_) => println!("Weights (0.5, 0.5, 0.5) are invalid, they must sum to 1.0"),
	}

	// Generate a few continuations. A fixed seed makes a run
	// reproducible; change the seed to get different stories.
	for seed in 0..5 {
		let mut rng = StdRng::seed_from_u64(seed);
		let story = reloaded.generate("once upon a", 60, &mut rng)?;
		println!("Story {}: {}", seed + 1, story);
	}

	Ok(())
}
