//! Top-level module for the Markov word generation system.
//!
//! This module provides a character-level Markov word generator, including:
//! - The fixed-order model itself (`MarkovWordModel`)
//! - Internal per-context transition tracking (`State`)

/// Fixed-order Markov model over characters.
///
/// Handles corpus ingestion, transition counting, weighted next-character
/// sampling, word generation, probability tables and binary persistence.
pub mod word_model;

/// Internal representation of a single table entry (context).
///
/// Tracks outgoing transitions in first-observation order and supports
/// weighted random sampling. This module is not exposed publicly.
mod state;
