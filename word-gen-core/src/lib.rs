//! Character-level Markov word generation library.
//!
//! This crate learns letter-transition statistics from a corpus of example
//! words (one per line) and uses them to synthesize new, plausible-looking
//! words. It provides:
//! - A fixed-order Markov model over characters (`MarkovWordModel`)
//! - Weighted next-character sampling with an injectable randomness source
//! - Next-character probability tables for a given prefix
//! - Compact binary persistence of trained models
//!
//! Only the high-level API is exposed publicly. Low-level components
//! are kept internal to ensure consistency and prevent misuse.

/// Error types shared across model construction, persistence and queries.
pub mod error;

/// Core Markov model and generation logic.
///
/// This module exposes the high-level model interface while keeping
/// internal table representations private.
pub mod model;

/// I/O utilities (file loading, path helpers).
///
/// Not exposed
pub(crate) mod io;
