use rand::Rng;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Represents one context entry in the Markov table.
///
/// A `State` corresponds to a fixed `order`-character context (`key`) and
/// stores all observed transitions from this context to the next character
/// (which may be the end sentinel).
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Responsibilities:
/// - Accumulate transition occurrences during learning
/// - Predict the next character using weighted random sampling
/// - Merge with another state having the same key (parallel learning support)
///
/// ## Invariants
/// - All transitions belong to the same `key`
/// - Each transition occurrence count is strictly positive
/// - Transitions are kept in the order each character was first observed
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct State {
	/// Identifier of the state (the `order`-character context).
	key: String,
	/// Outgoing transitions as (next character, occurrence count) pairs.
	/// Kept as an ordered sequence rather than a map so that probability
	/// tables list characters in first-observation order.
	/// Example: [('e', 42), ('a', 3)]
	transitions: Vec<(char, usize)>,
}

impl State {
	/// Creates a new empty state for the given context.
	pub fn new(key: &str) -> Self {
		Self {
			key: key.to_owned(),
			transitions: Vec::new(),
		}
	}

	/// Records `occurrence` observations of a transition toward `next_char`.
	///
	/// - If the transition already exists, its occurrence count is increased.
	/// - Otherwise, a new transition is appended with the given count.
	fn record(&mut self, next_char: char, occurrence: usize) {
		if let Some((_, count)) = self.transitions.iter_mut().find(|(c, _)| *c == next_char) {
			*count += occurrence;
		} else {
			self.transitions.push((next_char, occurrence));
		}
	}

	/// Records a single observation of a transition toward `next_char`.
	pub fn add_transition(&mut self, next_char: char) {
		self.record(next_char, 1);
	}

	/// Returns the total number of recorded observations for this context.
	pub fn total(&self) -> usize {
		self.transitions.iter().map(|(_, occurrence)| occurrence).sum()
	}

	/// Iterates over (next character, occurrence count) pairs in
	/// first-observation order.
	pub fn transitions(&self) -> impl Iterator<Item = (char, usize)> + '_ {
		self.transitions.iter().copied()
	}

	/// Predicts the next character using weighted random sampling.
	///
	/// The probability of selecting a character is proportional to its
	/// occurrence count.
	///
	/// This method performs:
	/// - an O(n) scan over the transitions
	/// - a cumulative subtraction to select a bucket
	///
	/// Returns `None` if the state has no transitions.
	pub fn predict<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<char> {
		if self.transitions.is_empty() {
			return None;
		}

		let total = self.total();
		if total == 0 {
			// Should not happen due to invariants, but kept for safety
			return None;
		}

		// Randomly select a character
		let mut r = rng.random_range(0..total);

		let mut fallback: Option<char> = None;
		for (next_char, occurrence) in &self.transitions {
			if r < *occurrence {
				return Some(*next_char);
			}
			r -= occurrence;
			fallback = Some(*next_char);
		}

		// Fallback: should not happen, but kept for safety.
		fallback
	}

	/// Merges another state into this one.
	///
	/// Both states must represent the same context (`key`).
	/// Transition occurrence counts are summed; characters unknown to `self`
	/// are appended after its own, so merging partial states in corpus order
	/// reproduces the first-observation order of a sequential pass.
	///
	/// # Errors
	/// Returns an error if the state keys do not match.
	pub fn merge(&mut self, other: &Self) -> Result<(), ModelError> {
		if self.key != other.key {
			return Err(ModelError::Merge(format!(
				"key mismatch: '{}' != '{}'",
				self.key, other.key
			)));
		}

		for (next_char, occurrence) in &other.transitions {
			self.record(*next_char, *occurrence);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	#[test]
	fn transitions_keep_first_observation_order() {
		let mut state = State::new("ab");
		state.add_transition('x');
		state.add_transition('y');
		state.add_transition('x');
		state.add_transition('z');

		let recorded: Vec<(char, usize)> = state.transitions().collect();
		assert_eq!(recorded, vec![('x', 2), ('y', 1), ('z', 1)]);
		assert_eq!(state.total(), 4);
	}

	#[test]
	fn predict_draws_from_recorded_transitions() {
		let mut state = State::new("a");
		state.add_transition('b');

		let mut rng = StdRng::seed_from_u64(1);
		assert_eq!(state.predict(&mut rng), Some('b'));

		let empty = State::new("a");
		assert_eq!(empty.predict(&mut rng), None);
	}

	#[test]
	fn merge_sums_counts_and_appends_new_characters() {
		let mut left = State::new("a");
		left.add_transition('t');
		left.add_transition('t');

		let mut right = State::new("a");
		right.add_transition('t');
		right.add_transition('r');

		left.merge(&right).unwrap();
		let recorded: Vec<(char, usize)> = left.transitions().collect();
		assert_eq!(recorded, vec![('t', 3), ('r', 1)]);
	}

	#[test]
	fn merge_rejects_mismatched_keys() {
		let mut left = State::new("a");
		let right = State::new("b");
		assert!(matches!(left.merge(&right), Err(ModelError::Merge(_))));
	}
}
