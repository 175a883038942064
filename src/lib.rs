//! Analysis engine for 15x15 crossword-tile games: packed dictionary
//! automata, a rack-constrained move generator and a multi-threaded
//! Monte-Carlo play simulator.

// Produce a compiler warning for missing documentation.
#![warn(missing_docs)]

pub mod ai;
pub mod error;
pub mod game;
pub mod util;
