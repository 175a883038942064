//! The error and result types for the library.

use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// The [`Result`] type for the library.
pub type GameResult<T> = std::result::Result<T, GameError>;

/// The error type for the analytical core. Errors are values: no function
/// in the core panics on bad input, and a failed operation leaves the
/// observable state unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameError {
    /// A KWG blob had a length that was not a positive multiple of 4 bytes.
    MalformedKwg,
    /// A KWG root index pointed outside the node array.
    InvalidKwgRoot,
    /// A KLV blob was truncated or its trie and value array disagreed.
    MalformedKlv,
    /// A WMP blob was truncated or internally inconsistent.
    MalformedWmp,
    /// A WMP blob carried an unsupported version byte.
    UnsupportedWmpVersion(u8),
    /// A board layout file had the wrong shape or an unknown square char.
    MalformedLayout,
    /// A win-percentage table had ragged columns or gapped spreads.
    MalformedWinPct,
    /// A character did not map to any letter in the distribution.
    InvalidLetter(char),
    /// Attempted to play a tile which was not in the player's rack.
    NotInRack,
    /// A placed tile landed on an occupied square.
    CoincidentTiles,
    /// A placement did not touch the existing tiles.
    NotConnected,
    /// The opening play must cover the start square.
    MustIntersectStart,
    /// Expected at least one and at most 7 tiles to place.
    PlacementCount,
    /// At least one and no more than 7 tiles may be exchanged.
    ExchangeCount,
    /// The bag does not hold enough tiles for the requested exchange.
    NotEnoughLetters,
    /// Cannot make a play as the game is over.
    Over,
    /// The simulator was handed an empty candidate list.
    SimNoMoves,
}

impl Error for GameError {}
impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::MalformedKwg => write!(f, "KWG length is not a positive multiple of 4"),
            GameError::InvalidKwgRoot => write!(f, "KWG root index is out of bounds"),
            GameError::MalformedKlv => write!(f, "KLV trie and value array are inconsistent"),
            GameError::MalformedWmp => write!(f, "WMP blob is truncated or inconsistent"),
            GameError::UnsupportedWmpVersion(v) => write!(f, "unsupported WMP version {}", v),
            GameError::MalformedLayout => write!(f, "board layout has the wrong shape"),
            GameError::MalformedWinPct => write!(f, "win percentage table is malformed"),
            GameError::InvalidLetter(ch) => write!(f, "'{}' is not in the distribution", ch),
            GameError::NotInRack => write!(f, "one or more played tiles were not in the rack"),
            GameError::CoincidentTiles => write!(f, "tiles were placed over existing tiles"),
            GameError::NotConnected => write!(f, "placement does not touch the existing tiles"),
            GameError::MustIntersectStart => write!(f, "the opening play must cover the start square"),
            GameError::PlacementCount => write!(f, "at least 1 and no more than 7 tiles can be placed"),
            GameError::ExchangeCount => write!(f, "at least 1 and no more than 7 tiles can be exchanged"),
            GameError::NotEnoughLetters => write!(f, "not enough tiles in the bag to exchange"),
            GameError::Over => write!(f, "the game is over so no further plays can be made"),
            GameError::SimNoMoves => write!(f, "no moves to simulate"),
        }
    }
}
