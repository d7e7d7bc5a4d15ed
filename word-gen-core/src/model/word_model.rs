use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::State;
use crate::error::ModelError;
use crate::io::{build_output_path, read_file};

/// Sentinel character filling context positions not yet reached by real text.
/// The start context of a model of order `n` is this character repeated `n` times.
pub const START_CHAR: char = '$';

/// Sentinel character recorded after the last character of each training word,
/// and drawn during generation to signal that the word has ended.
pub const END_CHAR: char = '^';

/// Characters removed from every corpus line before digestion: the two
/// sentinels (which must never occur as real alphabet characters) and
/// brackets (which would end up un-matched in generated output).
const STRIPPED_CHARS: [char; 6] = ['$', '^', '(', ')', '[', ']'];

/// Represents a fixed-order Markov model for sequences of characters.
///
/// The `MarkovWordModel` stores states for contexts of length `order`
/// and allows probabilistic prediction of the next character based on
/// learned words.
///
/// # Responsibilities
/// - Build the transition table from corpus lines (one word per line)
/// - Accumulate transition counts for each context
/// - Sample next characters, word starts and complete words
/// - Report next-character probability tables for a given prefix
/// - Persist to and reload from a compact binary blob
///
/// # Invariants
/// - `order` is always >= 1
/// - Each state in `table` corresponds to a unique context of length `order`
/// - All state transitions have occurrence counts >= 1
/// - The table is read-only once construction or loading completes
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MarkovWordModel {
	/// The context length (number of preceding characters considered).
	order: usize, // must be >= 1

	/// Start sentinel, fills context positions before any real character.
	start_char: char,

	/// End sentinel, recorded after the final character of each word.
	end_char: char,

	/// Mapping from a context (length `order`) to its corresponding state.
	table: HashMap<String, State>,
}

impl MarkovWordModel {
	/// Creates a new empty model of the given order.
	///
	/// # Errors
	/// Returns `ModelError::InvalidOrder` if `order` is zero.
	pub fn new(order: usize) -> Result<Self, ModelError> {
		if order == 0 {
			return Err(ModelError::InvalidOrder);
		}
		Ok(Self::empty(order))
	}

	/// Infallible constructor for internal use once `order` has been checked.
	fn empty(order: usize) -> Self {
		Self {
			order,
			start_char: START_CHAR,
			end_char: END_CHAR,
			table: HashMap::new(),
		}
	}

	/// The context length this model was built with.
	pub fn order(&self) -> usize {
		self.order
	}

	/// The end sentinel, so callers can recognize it in sampled characters
	/// and probability tables.
	pub fn end_char(&self) -> char {
		self.end_char
	}

	/// Digests one corpus line into the transition table.
	///
	/// # Behavior
	/// - Trims surrounding whitespace, lower-cases, then strips sentinel and
	///   bracket characters.
	/// - Ignores lines shorter than `order` after normalization.
	/// - Slides an `order`-wide context window across the line, counting
	///   (context -> character) transitions, starting from the all-sentinel
	///   start context.
	/// - Records (final context -> end sentinel) after the last character,
	///   so every digested word contributes a legitimate ending.
	///
	/// # Notes
	/// - UTF-8 safe: iterates over characters, not bytes.
	pub fn add_line(&mut self, line: &str) {
		let line: String = line
			.trim()
			.to_lowercase()
			.chars()
			.filter(|c| !STRIPPED_CHARS.contains(c))
			.collect();
		if line.chars().count() < self.order {
			// Too short to fill a single context window
			return;
		}

		let mut context = self.start_context();
		for c in line.chars() {
			self.record(&context, c);
			context.remove(0);
			context.push(c);
		}
		let end_char = self.end_char;
		self.record(&context, end_char);
	}

	/// Increments the count for (context -> next_char), creating the state
	/// on first observation.
	fn record(&mut self, context: &str, next_char: char) {
		self.table
			.entry(context.to_owned())
			.or_insert_with(|| State::new(context))
			.add_transition(next_char);
	}

	/// Builds a model of the given order from an iterator of corpus lines.
	///
	/// # Errors
	/// Returns `ModelError::InvalidOrder` if `order` is zero.
	pub fn from_lines<I, S>(lines: I, order: usize) -> Result<Self, ModelError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut model = Self::new(order)?;
		for line in lines {
			model.add_line(line.as_ref());
		}
		Ok(model)
	}

	/// Loads a `MarkovWordModel` from a corpus file if a binary cache exists,
	/// otherwise builds the model by reading the raw file with multithreaded
	/// merging and writes the cache for future fast loading.
	///
	/// - `filepath` is the input text file (one word per line, UTF-8).
	/// - Checks if a `.bin` file exists beside it for fast loading; a cached
	///   model of a different order is ignored and rebuilt from the text.
	/// - Uses `postcard` for compact serialization/deserialization.
	pub fn from_corpus_file<P: AsRef<Path>>(filepath: P, order: usize) -> Result<Self, ModelError> {
		let binary_data_path = build_output_path(&filepath, "bin")?;
		if binary_data_path.exists() {
			let model = Self::load(&binary_data_path)?;
			if model.order == order {
				return Ok(model);
			}
		}

		let model = Self::read_corpus_file(&filepath, order)?;
		std::fs::write(binary_data_path, model.to_bytes()?)?;
		Ok(model)
	}

	/// Reads a corpus file, splits its lines into chunks, builds partial
	/// models in parallel and merges them into the final model.
	///
	/// # Behavior
	/// - Splits input lines into chunks (based on CPU cores * factor).
	/// - Spawns threads to build partial models for each chunk.
	/// - Merges the partial models in chunk order, so summed counts and
	///   first-observation transition order match a sequential pass over
	///   the whole file.
	///
	/// # Notes
	/// - Uses MPSC channels to collect models from threads, tagged with the
	///   chunk index to restore corpus order.
	/// - Threads use `add_line` for each line.
	fn read_corpus_file<P: AsRef<Path>>(filename: P, order: usize) -> Result<Self, ModelError> {
		let lines = read_file(&filename)?;
		let mut model = Self::new(order)?;
		if lines.is_empty() {
			return Ok(model);
		}

		let cpus = num_cpus::get();
		let factor = 8;
		let chunks = cpus * factor;
		let chunk_size = ((lines.len() + chunks - 1) / chunks).max(1);

		let (tx, rx) = mpsc::channel();
		for (index, chunk) in lines.chunks(chunk_size).enumerate() {
			let tx = tx.clone();
			let chunk: Vec<String> = chunk.to_vec();

			thread::spawn(move || {
				let mut partial_model = Self::empty(order);
				for line in chunk {
					partial_model.add_line(&line);
				}
				tx.send((index, partial_model)).expect("Failed to send from thread");
			});
		}
		drop(tx);

		let mut partial_models: Vec<(usize, Self)> = rx.iter().collect();
		partial_models.sort_by_key(|(index, _)| *index);

		for (_, partial_model) in partial_models {
			model.merge(partial_model)?;
		}

		Ok(model)
	}

	/// Merges a partial model into this one (construction only; loaded
	/// tables are never merged).
	///
	/// # Errors
	/// Returns an error if the model parameters do not match.
	fn merge(&mut self, other: Self) -> Result<(), ModelError> {
		if self.order != other.order {
			return Err(ModelError::Merge(format!(
				"order mismatch: {} != {}",
				self.order, other.order
			)));
		}

		for (key, state) in other.table {
			if let Some(existing) = self.table.get_mut(&key) {
				existing.merge(&state)?;
			} else {
				self.table.insert(key, state);
			}
		}

		Ok(())
	}

	/// The all-sentinel context representing "no characters seen yet".
	fn start_context(&self) -> String {
		std::iter::repeat(self.start_char).take(self.order).collect()
	}

	/// Returns the last `n` characters of a string.
	///
	/// If `n` is greater than the number of characters in `s`, the entire
	/// string is returned.
	///
	/// # Notes
	/// - Handles UTF-8 correctly (multibyte characters).
	fn last_n_chars(s: &str, n: usize) -> String {
		if n > s.chars().count() {
			return s.to_owned();
		}
		s.chars()
			.rev()
			.take(n)
			.collect::<Vec<_>>()
			.into_iter()
			.rev()
			.collect()
	}

	/// Computes the table context for a prefix: the lower-cased trailing
	/// `order` characters, left-padded with the start sentinel when the
	/// prefix is shorter than `order`.
	fn context_for(&self, prior: &str) -> String {
		let tail = Self::last_n_chars(&prior.to_lowercase(), self.order);
		let missing = self.order.saturating_sub(tail.chars().count());
		let mut context: String = std::iter::repeat(self.start_char).take(missing).collect();
		context.push_str(&tail);
		context
	}

	/// Draws a randomized next character for the text so far.
	///
	/// `prior` is the string "so far"; leading whitespace is removed before
	/// the context is computed. The drawn character MAY be the end sentinel,
	/// signalling the end of the word.
	///
	/// Returns `None` if there are no learned occurrences of the ending
	/// context. This cannot happen during complete word generation; it is
	/// a normal outcome for user-entered `prior` text.
	///
	/// Depending on `append`, returns either the trimmed `prior` with the
	/// drawn character appended, or the drawn character alone.
	pub fn generate_character<R: Rng + ?Sized>(
		&self,
		prior: &str,
		append: bool,
		rng: &mut R,
	) -> Option<String> {
		let prior = prior.trim_start();
		let context = self.context_for(prior);

		let next_char = self.table.get(&context)?.predict(rng)?;

		if append {
			let mut word = prior.to_owned();
			word.push(next_char);
			Some(word)
		} else {
			Some(next_char.to_string())
		}
	}

	/// Generates the start of a word: a string of exactly `order` characters.
	///
	/// Returns `None` if the model is empty (no context was ever observed).
	pub fn generate_start<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
		let mut word = String::new();
		for _ in 0..self.order {
			word = self.generate_character(&word, true, rng)?;
		}
		Some(word)
	}

	/// Generates a complete word, i.e. until the end sentinel is drawn
	/// (the sentinel itself is not returned).
	///
	/// Returns `None` if the model is empty (no context was ever observed).
	/// Termination is probabilistic: every context that ended a training
	/// word records the end sentinel with nonzero weight, so the draw loop
	/// ends with probability 1 for any model built from well-formed input.
	pub fn generate_word<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
		let mut word = String::new();
		loop {
			word = self.generate_character(&word, true, rng)?;
			if word.ends_with(self.end_char) {
				word.pop();
				return Some(word);
			}
		}
	}

	/// Gets the possible next characters after `prior` and their normalized
	/// weights as percentages, rounded to `round_digits` decimal places, or
	/// `None` if there are no options for `prior`.
	///
	/// Characters are listed in the order they were first observed for the
	/// context. The end sentinel appears like any other character; compare
	/// against [`MarkovWordModel::end_char`] to render it specially.
	pub fn get_options(&self, prior: &str, round_digits: u32) -> Option<Vec<(char, f64)>> {
		let prior = prior.trim_start();
		let state = self.table.get(&self.context_for(prior))?;

		let norm_factor = state.total() as f64;
		let scale = 10f64.powi(round_digits as i32);
		Some(
			state
				.transitions()
				.map(|(c, occurrence)| {
					(c, (100.0 * occurrence as f64 / norm_factor * scale).round() / scale)
				})
				.collect(),
		)
	}

	/// Serializes the whole model (order, sentinels, table) to an opaque
	/// binary blob.
	pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
		Ok(postcard::to_stdvec(self)?)
	}

	/// Rebuilds a model from a blob produced by [`MarkovWordModel::to_bytes`].
	///
	/// # Errors
	/// Fails fast with `ModelError::Codec` on truncated or corrupt input;
	/// never yields a partially populated table.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
		Ok(postcard::from_bytes(bytes)?)
	}

	/// Writes the serialized model to a file.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
		std::fs::write(path, self.to_bytes()?)?;
		Ok(())
	}

	/// Loads a model previously written with [`MarkovWordModel::save`].
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
		Self::from_bytes(&std::fs::read(path)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn rng() -> StdRng {
		StdRng::seed_from_u64(0x5eed)
	}

	fn cat_car_model() -> MarkovWordModel {
		MarkovWordModel::from_lines(["cat", "car"], 1).unwrap()
	}

	#[test]
	fn rejects_zero_order() {
		assert!(matches!(MarkovWordModel::new(0), Err(ModelError::InvalidOrder)));
	}

	#[test]
	fn context_keys_have_order_length() {
		let model = MarkovWordModel::from_lines(["cat", "car", "horse", "mouse"], 2).unwrap();
		assert!(!model.table.is_empty());
		for key in model.table.keys() {
			assert_eq!(key.chars().count(), 2);
		}
	}

	#[test]
	fn context_for_pads_and_truncates() {
		let model = MarkovWordModel::new(3).unwrap();
		assert_eq!(model.context_for(""), "$$$");
		assert_eq!(model.context_for("a"), "$$a");
		assert_eq!(model.context_for("ab"), "$ab");
		assert_eq!(model.context_for("ALPHABET"), "bet");
	}

	#[test]
	fn cat_car_table_counts() {
		let model = cat_car_model();

		let starts: Vec<(char, usize)> = model.table.get("$").unwrap().transitions().collect();
		assert_eq!(starts, vec![('c', 2)]);

		let after_c: Vec<(char, usize)> = model.table.get("c").unwrap().transitions().collect();
		assert_eq!(after_c, vec![('a', 2)]);

		let after_a: Vec<(char, usize)> = model.table.get("a").unwrap().transitions().collect();
		assert_eq!(after_a, vec![('t', 1), ('r', 1)]);

		let after_t: Vec<(char, usize)> = model.table.get("t").unwrap().transitions().collect();
		assert_eq!(after_t, vec![('^', 1)]);
	}

	#[test]
	fn cat_car_option_percentages() {
		let model = cat_car_model();
		assert_eq!(model.get_options("", 1).unwrap(), vec![('c', 100.0)]);
		assert_eq!(model.get_options("xyzc", 1).unwrap(), vec![('a', 100.0)]);
		assert_eq!(model.get_options("a", 1).unwrap(), vec![('t', 50.0), ('r', 50.0)]);
	}

	#[test]
	fn option_percentages_sum_to_hundred() {
		let model =
			MarkovWordModel::from_lines(["banana", "bandana", "cabana", "band", "bad"], 2).unwrap();
		for key in model.table.keys() {
			let options = model.get_options(key, 3).unwrap();
			let sum: f64 = options.iter().map(|(_, pc)| pc).sum();
			assert!((sum - 100.0).abs() < 0.1, "context '{key}' sums to {sum}");
		}
	}

	#[test]
	fn single_word_order_two_generates_it() {
		let model = MarkovWordModel::from_lines(["ab"], 2).unwrap();

		let starts: Vec<(char, usize)> = model.table.get("$$").unwrap().transitions().collect();
		assert_eq!(starts, vec![('a', 1)]);
		let after_a: Vec<(char, usize)> = model.table.get("$a").unwrap().transitions().collect();
		assert_eq!(after_a, vec![('b', 1)]);
		let after_ab: Vec<(char, usize)> = model.table.get("ab").unwrap().transitions().collect();
		assert_eq!(after_ab, vec![('^', 1)]);

		assert_eq!(model.generate_word(&mut rng()), Some("ab".to_owned()));
	}

	#[test]
	fn generate_start_has_order_length() {
		let model = MarkovWordModel::from_lines(["cat", "cart", "carts", "horse"], 2).unwrap();
		let start = model.generate_start(&mut rng()).unwrap();
		assert_eq!(start.chars().count(), 2);
	}

	#[test]
	fn generate_character_append_modes() {
		// Order-1 chain of "ab": 'a' is always followed by 'b'
		let model = MarkovWordModel::from_lines(["ab"], 1).unwrap();
		assert_eq!(model.generate_character("a", true, &mut rng()), Some("ab".to_owned()));
		assert_eq!(model.generate_character("a", false, &mut rng()), Some("b".to_owned()));
		// Leading whitespace is trimmed before the context is computed
		assert_eq!(model.generate_character("  a", true, &mut rng()), Some("ab".to_owned()));
	}

	#[test]
	fn identical_seeds_reproduce_identical_draws() {
		let model = MarkovWordModel::from_lines(["cat", "car", "cab", "can"], 1).unwrap();

		let mut rng_a = StdRng::seed_from_u64(7);
		let mut rng_b = StdRng::seed_from_u64(7);
		let draws_a: Vec<Option<String>> = (0..32)
			.map(|_| model.generate_character("a", false, &mut rng_a))
			.collect();
		let draws_b: Vec<Option<String>> = (0..32)
			.map(|_| model.generate_character("a", false, &mut rng_b))
			.collect();
		assert_eq!(draws_a, draws_b);
	}

	#[test]
	fn unknown_context_has_no_options() {
		let model = cat_car_model();
		assert!(model.generate_character("z", true, &mut rng()).is_none());
		assert!(model.get_options("z", 1).is_none());
	}

	#[test]
	fn empty_model_propagates_none() {
		let model = MarkovWordModel::new(2).unwrap();
		assert!(model.generate_start(&mut rng()).is_none());
		assert!(model.generate_word(&mut rng()).is_none());
		assert!(model.get_options("", 1).is_none());
	}

	#[test]
	fn short_lines_are_skipped() {
		let model = MarkovWordModel::from_lines(["a", "to"], 3).unwrap();
		assert!(model.table.is_empty());
	}

	#[test]
	fn normalization_strips_sentinels_and_brackets() {
		// Digested as "cat"
		let model = MarkovWordModel::from_lines(["  C$a(t)[]^  "], 1).unwrap();
		assert_eq!(model.table.len(), 4);
		assert_eq!(model.get_options("", 1).unwrap(), vec![('c', 100.0)]);
		let after_a: Vec<(char, usize)> = model.table.get("a").unwrap().transitions().collect();
		assert_eq!(after_a, vec![('t', 1)]);
	}

	#[test]
	fn serialized_round_trip_preserves_options() {
		let model = MarkovWordModel::from_lines(["banana", "bandana", "cabana"], 2).unwrap();
		let restored = MarkovWordModel::from_bytes(&model.to_bytes().unwrap()).unwrap();

		assert_eq!(restored.order(), model.order());
		assert_eq!(restored.end_char(), model.end_char());
		assert_eq!(restored.table.len(), model.table.len());
		for key in model.table.keys() {
			assert_eq!(model.get_options(key, 3), restored.get_options(key, 3), "context '{key}'");
		}
	}

	#[test]
	fn truncated_bytes_fail_to_decode() {
		let model = MarkovWordModel::from_lines(["banana", "bandana", "cabana"], 2).unwrap();
		let bytes = model.to_bytes().unwrap();
		assert!(matches!(
			MarkovWordModel::from_bytes(&bytes[..bytes.len() / 2]),
			Err(ModelError::Codec(_))
		));
		assert!(matches!(MarkovWordModel::from_bytes(&[]), Err(ModelError::Codec(_))));
	}

	#[test]
	fn corpus_file_build_matches_sequential_build() {
		let words = ["banana", "bandana", "cabana", "cat", "car", "cart", "horse", "house"];
		let dir = std::env::temp_dir().join(format!("word-gen-test-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let corpus_path = dir.join("words.txt");
		std::fs::write(&corpus_path, words.join("\n")).unwrap();

		let sequential = MarkovWordModel::from_lines(words, 2).unwrap();
		let parallel = MarkovWordModel::from_corpus_file(&corpus_path, 2).unwrap();

		assert_eq!(parallel.table.len(), sequential.table.len());
		for key in sequential.table.keys() {
			assert_eq!(sequential.get_options(key, 3), parallel.get_options(key, 3), "context '{key}'");
		}

		// Second call loads the cache written beside the corpus
		assert!(dir.join("words.bin").exists());
		let cached = MarkovWordModel::from_corpus_file(&corpus_path, 2).unwrap();
		assert_eq!(cached.table.len(), sequential.table.len());

		// A cached model of a different order is ignored and rebuilt
		let rebuilt = MarkovWordModel::from_corpus_file(&corpus_path, 3).unwrap();
		assert_eq!(rebuilt.order(), 3);

		std::fs::remove_dir_all(&dir).unwrap();
	}
}
