//! Reusable machinery shared across the library: packed dictionaries,
//! leave values, the word map, running statistics and hash keys.

pub mod bit_rack;
pub mod klv;
pub mod kwg;
pub mod stats;
pub mod win_pct;
pub mod wmp;
