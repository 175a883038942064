//! Moves and the bounded move list that collects them.

use crate::game::{
    board::BOARD_DIM,
    tile::{LetterDistribution, MachineLetter, PLAYED_THROUGH_MARKER},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The equity of a pass, below any recordable play.
pub const PASS_MOVE_EQUITY: f64 = -10_000.0;
/// The root equity of an empty move list.
const INITIAL_TOP_MOVE_EQUITY: f64 = -100_000.0;

/// What a move does: place tiles, exchange tiles, or pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    /// Lay a strip of tiles on the board.
    Place,
    /// Return tiles to the bag and draw replacements.
    Exchange,
    /// Forfeit the turn.
    Pass,
}

/// The criterion a move list ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveSort {
    /// Score plus the leave value of the remaining rack.
    Equity,
    /// Raw score.
    Score,
}

/// A single move. For placements `tiles` holds the strip between the
/// word's first and last square, with the played-through marker on
/// squares whose letters were already on the board. For exchanges it
/// holds the tiles surrendered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Move {
    /// The tile strip.
    #[serde(with = "serde_tiles")]
    pub tiles: [MachineLetter; BOARD_DIM],
    /// Number of slots of `tiles` in use.
    pub tiles_length: u8,
    /// Number of fresh tiles coming off the rack.
    pub tiles_played: u8,
    /// Row of the first strip square.
    pub row_start: u8,
    /// Column of the first strip square.
    pub col_start: u8,
    /// 0 horizontal, 1 vertical.
    pub dir: u8,
    /// The move's score.
    pub score: i32,
    /// Score plus the leave value of the rack after the move.
    pub equity: f64,
    /// What kind of move this is.
    pub kind: MoveKind,
}

mod serde_tiles {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        tiles: &[MachineLetter; BOARD_DIM],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&tiles[..], serializer)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[MachineLetter; BOARD_DIM], D::Error> {
        let v: Vec<MachineLetter> = serde::Deserialize::deserialize(deserializer)?;
        let mut tiles = [MachineLetter::default(); BOARD_DIM];
        for (slot, ml) in tiles.iter_mut().zip(v) {
            *slot = ml;
        }
        Ok(tiles)
    }
}

impl Default for Move {
    fn default() -> Self {
        Self::pass()
    }
}

impl Move {
    /// A pass, carrying the sentinel minimum equity.
    pub fn pass() -> Self {
        Self {
            tiles: [MachineLetter::default(); BOARD_DIM],
            tiles_length: 0,
            tiles_played: 0,
            row_start: 0,
            col_start: 0,
            dir: 0,
            score: 0,
            equity: PASS_MOVE_EQUITY,
            kind: MoveKind::Pass,
        }
    }

    /// The strip slots in use.
    pub fn strip(&self) -> &[MachineLetter] {
        &self.tiles[..self.tiles_length as usize]
    }

    /// Renders the move in coordinate notation, blanks lowercase and
    /// played-through squares as dots.
    pub fn describe(&self, ld: &LetterDistribution) -> String {
        match self.kind {
            MoveKind::Pass => "(pass)".into(),
            MoveKind::Exchange => {
                let tiles: String = self.strip().iter().map(|&ml| ld.ml_to_char(ml)).collect();
                format!("(exch {})", tiles)
            }
            MoveKind::Place => {
                let coord = if self.dir == 0 {
                    format!("{}{}", self.row_start + 1, (b'A' + self.col_start) as char)
                } else {
                    format!("{}{}", (b'A' + self.col_start) as char, self.row_start + 1)
                };
                let word: String = self
                    .strip()
                    .iter()
                    .map(|&ml| {
                        if ml.as_u8() == PLAYED_THROUGH_MARKER {
                            '.'
                        } else {
                            ld.ml_to_char(ml)
                        }
                    })
                    .collect();
                format!("{} {}", coord, word)
            }
        }
    }

    /// Total order used for ranking, most attractive first: the sort
    /// criterion, then tiles played, score, position, direction and
    /// tile strip, so ties break deterministically.
    pub fn cmp_by(&self, other: &Self, sort: MoveSort) -> Ordering {
        let primary = match sort {
            MoveSort::Equity => self
                .equity
                .partial_cmp(&other.equity)
                .unwrap_or(Ordering::Equal),
            MoveSort::Score => self.score.cmp(&other.score),
        };
        primary
            .then(self.tiles_played.cmp(&other.tiles_played))
            .then(self.score.cmp(&other.score))
            .then(self.row_start.cmp(&other.row_start).reverse())
            .then(self.col_start.cmp(&other.col_start).reverse())
            .then(self.dir.cmp(&other.dir).reverse())
            .then(self.tiles.cmp(&other.tiles).reverse())
    }
}

/// A bounded collection of moves kept as a binary min-heap on the
/// ranking criterion: the weakest recorded move sits at the root and
/// is evicted when a stronger move arrives at capacity. A spare slot
/// lets insertion shuffle moves without allocating. `sort_moves` turns
/// the heap into a descending array in place.
#[derive(Debug, Clone)]
pub struct MoveList {
    moves: Vec<Move>,
    spare: Move,
    count: usize,
    capacity: usize,
    sort: MoveSort,
}

impl MoveList {
    /// Creates a list holding at most `capacity` moves.
    pub fn new(capacity: usize, sort: MoveSort) -> Self {
        assert!(capacity > 0);
        Self {
            // One extra slot holds the overflowing move during eviction.
            moves: vec![Move::pass(); capacity + 1],
            spare: Move::pass(),
            count: 0,
            capacity,
            sort,
        }
    }

    /// Empties the list, keeping its capacity and criterion.
    pub fn reset(&mut self) {
        self.count = 0;
        self.moves[0].equity = INITIAL_TOP_MOVE_EQUITY;
    }
    /// The number of recorded moves.
    pub fn count(&self) -> usize {
        self.count
    }
    /// The capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    /// The ranking criterion.
    pub fn sort(&self) -> MoveSort {
        self.sort
    }
    /// Borrows a recorded move.
    pub fn get(&self, i: usize) -> &Move {
        debug_assert!(i < self.count);
        &self.moves[i]
    }
    /// The recorded moves, sorted only after [`sort_moves`](Self::sort_moves).
    pub fn moves(&self) -> &[Move] {
        &self.moves[..self.count]
    }

    /// The spare slot for the caller to fill before
    /// [`insert_spare`](Self::insert_spare).
    pub fn spare_mut(&mut self) -> &mut Move {
        &mut self.spare
    }

    /// Whether a move with this ranking would currently be recorded:
    /// either the list has room or the move beats the weakest entry.
    pub fn would_record(&self, mv: &Move) -> bool {
        self.count < self.capacity || mv.cmp_by(&self.moves[0], self.sort) == Ordering::Greater
    }

    /// Pushes the spare move into the heap, evicting the weakest entry
    /// when over capacity.
    pub fn insert_spare(&mut self) {
        std::mem::swap(&mut self.moves[self.count], &mut self.spare);
        self.up_heapify(self.count);
        self.count += 1;
        if self.count == self.capacity + 1 {
            self.pop();
        }
    }

    /// Removes and returns a copy of the weakest recorded move.
    pub fn pop(&mut self) -> Move {
        debug_assert!(self.count > 0);
        let popped = self.moves[0];
        self.count -= 1;
        self.moves.swap(0, self.count);
        self.down_heapify(0);
        popped
    }

    fn up_heapify(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.moves[parent].cmp_by(&self.moves[i], self.sort) == Ordering::Greater {
                self.moves.swap(parent, i);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn down_heapify(&mut self, mut i: usize) {
        loop {
            let left = i * 2 + 1;
            let right = i * 2 + 2;
            let mut min = i;
            if left < self.count
                && self.moves[min].cmp_by(&self.moves[left], self.sort) == Ordering::Greater
            {
                min = left;
            }
            if right < self.count
                && self.moves[min].cmp_by(&self.moves[right], self.sort) == Ordering::Greater
            {
                min = right;
            }
            if min == i {
                return;
            }
            self.moves.swap(i, min);
            i = min;
        }
    }

    /// Drops all but the first `keep` moves. Only meaningful after
    /// [`sort_moves`](Self::sort_moves).
    pub fn truncate(&mut self, keep: usize) {
        self.count = self.count.min(keep);
    }

    /// Converts the heap into an array sorted most attractive first.
    /// The count stays constant. Each pop parks the evicted root just
    /// behind the shrinking heap, which is exactly descending order.
    pub fn sort_moves(&mut self) {
        let count = self.count;
        for _ in 1..count {
            self.pop();
        }
        self.count = count;
    }
}
