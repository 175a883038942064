//! The 15x15 board: letters, premium squares, cross-sets and anchors.

use crate::{
    error::{GameError, GameResult},
    game::tile::{LetterDistribution, MachineLetter},
    util::kwg::Kwg,
};
use std::fmt;

/// The width and height of the board.
pub const BOARD_DIM: usize = 15;
/// The number of squares on the board.
pub const BOARD_AREA: usize = BOARD_DIM * BOARD_DIM;

/// Horizontal axis index.
pub const DIR_HORIZONTAL: usize = 0;
/// Vertical axis index.
pub const DIR_VERTICAL: usize = 1;

/// The bonus byte of a plain square: word and letter multiplier one.
pub const BONUS_NONE: u8 = 0x11;
/// The bonus byte of a brick, which nothing may be placed on.
pub const BONUS_BRICK: u8 = 0x00;

/// A square's letter and word multipliers packed into one byte: high
/// nibble multiplies the word, low nibble multiplies the letter.
fn bonus_byte(word_multiplier: u8, letter_multiplier: u8) -> u8 {
    word_multiplier << 4 | letter_multiplier
}

/// The board: per square a letter (0 when empty) and a bonus byte, plus
/// derived state kept in sync after every play: a cross-set and
/// cross-score per (axis x lexicon slot), and per-axis anchor flags.
/// A transposed flag swaps row/column indexing in every accessor
/// without moving data; only one orientation is live during
/// generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    letters: [MachineLetter; BOARD_AREA],
    bonuses: [u8; BOARD_AREA],
    // (square * 2 + axis) + BOARD_AREA * 2 * lexicon slot.
    cross_sets: [u64; BOARD_AREA * 4],
    cross_scores: [i32; BOARD_AREA * 4],
    anchors: [bool; BOARD_AREA * 2],
    transposed: bool,
    tiles_played: u32,
    start_row: u8,
    start_col: u8,
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

impl Board {
    /// The standard crossword-game premium layout, start square at the
    /// centre.
    pub fn standard() -> Self {
        let mut bonuses = [BONUS_NONE; BOARD_AREA];
        for row in 0..BOARD_DIM {
            for col in 0..BOARD_DIM {
                bonuses[row * BOARD_DIM + col] = Self::standard_bonus(row, col);
            }
        }
        Self::with_bonuses(bonuses, 7, 7)
    }

    /// The premium for a square of the standard layout, keyed on the
    /// absolute distance to the centre.
    fn standard_bonus(row: usize, col: usize) -> u8 {
        let delta_row = row.abs_diff(7);
        let delta_col = col.abs_diff(7);

        match (delta_row, delta_col) {
            (2, 2) | (2, 6) | (6, 2) => bonus_byte(1, 3),
            (0, 4) | (4, 0) | (1, 1) | (1, 5) | (5, 1) | (7, 4) | (4, 7) => bonus_byte(1, 2),
            (7, 7) | (0, 7) | (7, 0) => bonus_byte(3, 1),
            (0, 0) => bonus_byte(2, 1),
            (a, b) if a == b => bonus_byte(2, 1),
            _ => BONUS_NONE,
        }
    }

    fn with_bonuses(bonuses: [u8; BOARD_AREA], start_row: u8, start_col: u8) -> Self {
        Self {
            letters: [MachineLetter::blank(); BOARD_AREA],
            bonuses,
            cross_sets: [0; BOARD_AREA * 4],
            cross_scores: [0; BOARD_AREA * 4],
            anchors: [false; BOARD_AREA * 2],
            transposed: false,
            tiles_played: 0,
            start_row,
            start_col,
        }
    }

    /// Parses a board-layout file: a `start_row,start_col` line, then
    /// fifteen lines of fifteen square characters.
    pub fn from_layout(text: &str) -> GameResult<Self> {
        let mut lines = text.lines();
        let header = lines.next().ok_or(GameError::MalformedLayout)?;
        let (row_str, col_str) = header.split_once(',').ok_or(GameError::MalformedLayout)?;
        let start_row: u8 = row_str.trim().parse().map_err(|_| GameError::MalformedLayout)?;
        let start_col: u8 = col_str.trim().parse().map_err(|_| GameError::MalformedLayout)?;
        if start_row as usize >= BOARD_DIM || start_col as usize >= BOARD_DIM {
            return Err(GameError::MalformedLayout);
        }

        let mut bonuses = [BONUS_NONE; BOARD_AREA];
        let mut row = 0;
        for line in lines.by_ref().take(BOARD_DIM) {
            let mut col = 0;
            for ch in line.chars() {
                if col >= BOARD_DIM {
                    return Err(GameError::MalformedLayout);
                }
                bonuses[row * BOARD_DIM + col] = match ch {
                    ' ' => BONUS_NONE,
                    '\'' => bonus_byte(1, 2),
                    '"' => bonus_byte(1, 3),
                    '-' => bonus_byte(2, 1),
                    '=' => bonus_byte(3, 1),
                    '^' => bonus_byte(1, 4),
                    '~' => bonus_byte(4, 1),
                    '#' => BONUS_BRICK,
                    _ => return Err(GameError::MalformedLayout),
                };
                col += 1;
            }
            if col != BOARD_DIM {
                return Err(GameError::MalformedLayout);
            }
            row += 1;
        }
        if row != BOARD_DIM || lines.next().is_some() {
            return Err(GameError::MalformedLayout);
        }

        Ok(Self::with_bonuses(bonuses, start_row, start_col))
    }

    /// Serializes the premium layout back to the text format.
    pub fn to_layout(&self) -> String {
        let mut out = format!("{},{}\n", self.start_row, self.start_col);
        for row in 0..BOARD_DIM {
            for col in 0..BOARD_DIM {
                out.push(match self.bonuses[row * BOARD_DIM + col] {
                    BONUS_NONE => ' ',
                    0x12 => '\'',
                    0x13 => '"',
                    0x21 => '-',
                    0x31 => '=',
                    0x14 => '^',
                    0x41 => '~',
                    BONUS_BRICK => '#',
                    _ => ' ',
                });
            }
            out.push('\n');
        }
        out
    }

    /// Index of a logical (row, col) under the current transposition.
    fn tindex(&self, row: usize, col: usize) -> usize {
        if self.transposed {
            col * BOARD_DIM + row
        } else {
            row * BOARD_DIM + col
        }
    }
    /// The axis a logical row currently runs along.
    fn taxis(&self) -> usize {
        if self.transposed {
            DIR_VERTICAL
        } else {
            DIR_HORIZONTAL
        }
    }

    /// Flips row/column indexing in all accessors. Data does not move.
    pub fn transpose(&mut self) {
        self.transposed = !self.transposed;
    }
    /// Whether the board is currently transposed.
    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    /// The start square under the current transposition.
    pub fn start_square(&self) -> (usize, usize) {
        if self.transposed {
            (self.start_col as usize, self.start_row as usize)
        } else {
            (self.start_row as usize, self.start_col as usize)
        }
    }

    /// The number of tiles on the board.
    pub fn tiles_played(&self) -> u32 {
        self.tiles_played
    }

    /// The letter at a square, 0 when empty.
    pub fn letter(&self, row: usize, col: usize) -> MachineLetter {
        self.letters[self.tindex(row, col)]
    }
    /// Places or clears a letter. Derived state is not refreshed here.
    pub fn set_letter(&mut self, row: usize, col: usize, ml: MachineLetter) {
        let idx = self.tindex(row, col);
        let was_empty = self.letters[idx].is_empty_square();
        self.letters[idx] = ml;
        match (was_empty, ml.is_empty_square()) {
            (true, false) => self.tiles_played += 1,
            (false, true) => self.tiles_played -= 1,
            _ => {}
        }
    }
    /// Checks whether a square holds no tile.
    pub fn is_empty_square(&self, row: usize, col: usize) -> bool {
        self.letters[self.tindex(row, col)].is_empty_square()
    }
    /// The bonus byte of a square.
    pub fn bonus(&self, row: usize, col: usize) -> u8 {
        self.bonuses[self.tindex(row, col)]
    }
    /// Checks whether a square is an unplayable brick.
    pub fn is_brick(&self, row: usize, col: usize) -> bool {
        self.bonus(row, col) == BONUS_BRICK
    }

    /// The cross-set for extending a word along the current row
    /// orientation through an empty square.
    pub fn cross_set(&self, row: usize, col: usize, cross_index: usize) -> u64 {
        self.cross_sets[self.cross_slot(row, col, cross_index)]
    }
    /// The summed face value of the perpendicular fragment through a
    /// square, for the current row orientation.
    pub fn cross_score(&self, row: usize, col: usize, cross_index: usize) -> i32 {
        self.cross_scores[self.cross_slot(row, col, cross_index)]
    }
    fn cross_slot(&self, row: usize, col: usize, cross_index: usize) -> usize {
        (self.tindex(row, col) * 2 + self.taxis()) + BOARD_AREA * 2 * cross_index
    }

    /// Whether plays along the current row orientation may begin at
    /// this square.
    pub fn anchor(&self, row: usize, col: usize) -> bool {
        self.anchors[self.tindex(row, col) * 2 + self.taxis()]
    }

    /// Whether a square has an occupied neighbor perpendicular to the
    /// current row orientation.
    pub fn has_perpendicular_tile(&self, row: usize, col: usize) -> bool {
        (row > 0 && !self.is_empty_square(row - 1, col))
            || (row + 1 < BOARD_DIM && !self.is_empty_square(row + 1, col))
    }

    /// The mask permitting every letter of the distribution.
    pub fn trivial_cross_set(ld: &LetterDistribution) -> u64 {
        ((1u64 << ld.size()) - 1) & !1
    }

    /// Walks to the last occupied square in direction `step` (-1 or 1)
    /// along the current row orientation, starting from an occupied
    /// square.
    pub fn word_edge(&self, row: usize, mut col: usize, step: isize) -> usize {
        loop {
            let next = col as isize + step;
            if !(0..BOARD_DIM as isize).contains(&next)
                || self.is_empty_square(row, next as usize)
            {
                return col;
            }
            col = next as usize;
        }
    }

    /// Recomputes every anchor flag from the letters. On an empty board
    /// the sole anchor is the start square, horizontal.
    pub fn update_all_anchors(&mut self) {
        debug_assert!(!self.transposed);
        self.anchors = [false; BOARD_AREA * 2];
        if self.tiles_played == 0 {
            let idx = self.start_row as usize * BOARD_DIM + self.start_col as usize;
            self.anchors[idx * 2 + DIR_HORIZONTAL] = true;
            return;
        }

        for row in 0..BOARD_DIM {
            for col in 0..BOARD_DIM {
                let tile_here = !self.is_empty_square(row, col);
                let tile_above = row > 0 && !self.is_empty_square(row - 1, col);
                let tile_below = row + 1 < BOARD_DIM && !self.is_empty_square(row + 1, col);
                let tile_left = col > 0 && !self.is_empty_square(row, col - 1);
                let tile_right = col + 1 < BOARD_DIM && !self.is_empty_square(row, col + 1);

                let idx = (row * BOARD_DIM + col) * 2;
                if tile_here {
                    self.anchors[idx + DIR_HORIZONTAL] = !tile_right;
                    self.anchors[idx + DIR_VERTICAL] = !tile_below;
                } else {
                    self.anchors[idx + DIR_HORIZONTAL] =
                        !tile_left && !tile_right && (tile_above || tile_below);
                    self.anchors[idx + DIR_VERTICAL] =
                        !tile_above && !tile_below && (tile_left || tile_right);
                }
            }
        }
    }

    /// Recomputes every cross-set and cross-score for one lexicon slot
    /// by walking perpendicular fragments through the KWG's DAWG.
    pub fn update_all_cross_sets(&mut self, kwg: &Kwg, ld: &LetterDistribution, cross_index: usize) {
        debug_assert!(!self.transposed);
        let mut fragment = Vec::with_capacity(BOARD_DIM);

        for axis in [DIR_HORIZONTAL, DIR_VERTICAL] {
            for row in 0..BOARD_DIM {
                for col in 0..BOARD_DIM {
                    // For horizontal plays the perpendicular runs down
                    // a column; for vertical plays, along a row.
                    let (r, c) = if axis == DIR_HORIZONTAL {
                        (row, col)
                    } else {
                        (col, row)
                    };
                    let slot = ((r * BOARD_DIM + c) * 2 + axis) + BOARD_AREA * 2 * cross_index;
                    let (set, score) = self.cross_of(kwg, ld, r, c, axis, &mut fragment);
                    self.cross_sets[slot] = set;
                    self.cross_scores[slot] = score;
                }
            }
        }
    }

    /// The cross-set and cross-score of one square for one axis,
    /// untransposed.
    fn cross_of(
        &self,
        kwg: &Kwg,
        ld: &LetterDistribution,
        row: usize,
        col: usize,
        axis: usize,
        fragment: &mut Vec<MachineLetter>,
    ) -> (u64, i32) {
        if !self.is_empty_square(row, col) {
            return (0, 0);
        }
        if self.bonuses[row * BOARD_DIM + col] == BONUS_BRICK {
            return (0, 0);
        }

        // Step perpendicular to the play axis.
        let step = |r: usize, c: usize, delta: isize| -> Option<(usize, usize)> {
            let (pr, pc) = if axis == DIR_HORIZONTAL {
                (r as isize + delta, c as isize)
            } else {
                (r as isize, c as isize + delta)
            };
            ((0..BOARD_DIM as isize).contains(&pr) && (0..BOARD_DIM as isize).contains(&pc))
                .then_some((pr as usize, pc as usize))
        };
        let occupied = |r: usize, c: usize| !self.letters[r * BOARD_DIM + c].is_empty_square();

        // Collect the before-fragment (reading order) and the
        // after-fragment around the square.
        fragment.clear();
        let mut pos = (row, col);
        while let Some(prev) = step(pos.0, pos.1, -1) {
            if !occupied(prev.0, prev.1) {
                break;
            }
            pos = prev;
        }
        let mut score = 0;
        let before_start = pos;
        let mut split = 0;
        let mut cursor = before_start;
        while cursor != (row, col) {
            let ml = self.letters[cursor.0 * BOARD_DIM + cursor.1];
            fragment.push(ml);
            score += ld.score(ml);
            split += 1;
            cursor = step(cursor.0, cursor.1, 1).expect("fragment stays on the board");
        }
        let mut after = (row, col);
        while let Some(next) = step(after.0, after.1, 1) {
            if !occupied(next.0, next.1) {
                break;
            }
            let ml = self.letters[next.0 * BOARD_DIM + next.1];
            fragment.push(ml);
            score += ld.score(ml);
            after = next;
        }

        if fragment.is_empty() {
            return (Self::trivial_cross_set(ld), 0);
        }

        let (before, after) = fragment.split_at(split);
        // An unmatched before-fragment permits nothing.
        let p = kwg.follow(kwg.dawg_root(), before);
        if p == 0 {
            return (0, score);
        }

        let set = if after.is_empty() {
            kwg.letter_set(p)
        } else {
            let mut set = 0;
            for ml in 1..ld.size() as u8 {
                let letter = MachineLetter::new(ml);
                if let Some((child, _)) = kwg.seek(p, letter) {
                    if child != 0 && kwg.accepts_from(child, after) {
                        set |= 1 << ml;
                    }
                }
            }
            set
        };
        (set, score)
    }

    /// Scores a tile strip laid along `row` from `leftstrip` to
    /// `rightstrip` inclusive, under the current orientation. Strip
    /// slots holding the played-through marker read their letter from
    /// the board. Cross-scores come from the cached per-square values.
    pub fn score_strip(
        &self,
        ld: &LetterDistribution,
        strip: &[MachineLetter],
        row: usize,
        leftstrip: usize,
        rightstrip: usize,
        cross_index: usize,
        bingo_bonus: i32,
    ) -> i32 {
        let mut main_score = 0;
        let mut word_multiplier = 1;
        let mut cross_total = 0;
        let mut fresh = 0;

        for col in leftstrip..=rightstrip {
            let played_through = !self.is_empty_square(row, col);
            if played_through {
                main_score += ld.score(self.letter(row, col));
                continue;
            }

            let ml = strip[col];
            let bonus = self.bonus(row, col);
            let letter_mult = (bonus & 0x0f) as i32;
            let word_mult = (bonus >> 4) as i32;
            let letter_score = ld.score(ml) * letter_mult;

            main_score += letter_score;
            word_multiplier *= word_mult;
            if self.has_perpendicular_tile(row, col) {
                cross_total += (letter_score + self.cross_score(row, col, cross_index)) * word_mult;
            }
            fresh += 1;
        }

        let bingo = if fresh == crate::game::rack::RACK_SIZE {
            bingo_bonus
        } else {
            0
        };
        main_score * word_multiplier + cross_total + bingo
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "   ")?;
        for col in 0..BOARD_DIM {
            write!(f, " {} ", (b'A' + col as u8) as char)?;
        }
        writeln!(f)?;
        for row in 0..BOARD_DIM {
            write!(f, "{:>2} ", row)?;
            for col in 0..BOARD_DIM {
                let ml = self.letter(row, col);
                if ml.is_empty_square() {
                    write!(f, " . ")?;
                } else {
                    write!(f, " {} ", (b'A' + ml.unblanked().as_u8() - 1) as char)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::kwg::KwgBuilder;

    fn kwg_of(words: &[&str]) -> Kwg {
        let ld = LetterDistribution::english();
        let mut builder = KwgBuilder::new();
        for word in words {
            builder.insert(&ld.str_to_mls(word).unwrap());
        }
        builder.build()
    }

    #[test]
    fn standard_premiums() {
        let board = Board::standard();
        assert_eq!(board.bonus(0, 0), 0x31); // TW corner
        assert_eq!(board.bonus(7, 7), 0x21); // start counts double word
        assert_eq!(board.bonus(7, 3), 0x12); // DL
        assert_eq!(board.bonus(5, 5), 0x13); // TL
        assert_eq!(board.bonus(1, 1), 0x21); // DW diagonal
        assert_eq!(board.bonus(8, 8), 0x12); // DL inner diamond
        assert_eq!(board.bonus(4, 2), BONUS_NONE);
    }

    #[test]
    fn layout_round_trip() {
        let board = Board::standard();
        let text = board.to_layout();
        let parsed = Board::from_layout(&text).unwrap();
        assert_eq!(parsed.to_layout(), text);
        assert_eq!(parsed.bonuses, board.bonuses);
    }

    #[test]
    fn malformed_layouts() {
        assert!(Board::from_layout("").is_err());
        assert!(Board::from_layout("7,7\nshort").is_err());
        let mut text = String::from("99,7\n");
        for _ in 0..BOARD_DIM {
            text.push_str(&" ".repeat(BOARD_DIM));
            text.push('\n');
        }
        assert!(Board::from_layout(&text).is_err());
    }

    #[test]
    fn transposition_swaps_indexing() {
        let ld = LetterDistribution::english();
        let mut board = Board::standard();
        let q = ld.char_to_ml('Q').unwrap();
        board.set_letter(3, 10, q);

        board.transpose();
        assert_eq!(board.letter(10, 3), q);
        assert!(board.is_empty_square(3, 10));
        board.transpose();
        assert_eq!(board.letter(3, 10), q);
    }

    #[test]
    fn empty_board_anchor_is_start_square() {
        let mut board = Board::standard();
        board.update_all_anchors();
        assert!(board.anchor(7, 7));
        assert!(!board.anchor(7, 8));
        board.transpose();
        assert!(!board.anchor(7, 7));
        board.transpose();
    }

    #[test]
    fn anchors_after_one_word() {
        let ld = LetterDistribution::english();
        let mut board = Board::standard();
        // CAT across row 7, cols 6..=8.
        for (i, ch) in "CAT".chars().enumerate() {
            board.set_letter(7, 6 + i, ld.char_to_ml(ch).unwrap());
        }
        board.update_all_anchors();

        // The tile before the empty square to the right anchors
        // horizontal plays; squares above/below anchor through-plays.
        assert!(board.anchor(7, 8));
        assert!(!board.anchor(7, 7));
        assert!(board.anchor(6, 7));
        assert!(board.anchor(8, 6));
        board.transpose();
        // Each tile with an empty square below anchors vertical plays.
        assert!(board.anchor(6, 7)); // (6,7) transposed = col 6, row 7
        board.transpose();
    }

    #[test]
    fn cross_sets_follow_the_dawg() {
        let ld = LetterDistribution::english();
        let kwg = kwg_of(&["LA", "TA", "QAT", "AB"]);
        let mut board = Board::standard();
        // QAT across row 7, cols 7..=9.
        for (i, ch) in "QAT".chars().enumerate() {
            board.set_letter(7, 7 + i, ld.char_to_ml(ch).unwrap());
        }
        board.update_all_cross_sets(&kwg, &ld, 0);

        // Above the A at (6, 8): a letter L there forms L-A downward,
        // so only initial letters of two-letter words ending in A fit.
        let set = board.cross_set(6, 8, 0);
        let l = usize::from(ld.char_to_ml('L').unwrap());
        let t = usize::from(ld.char_to_ml('T').unwrap());
        let b = usize::from(ld.char_to_ml('B').unwrap());
        assert_eq!(set, (1 << l) | (1 << t));
        assert_eq!(set & (1 << b), 0);

        // Below the A at (8, 8): only B completes AB.
        let set_below = board.cross_set(8, 8, 0);
        assert_eq!(set_below, 1 << b);
        // Cross scores carry the fragment's face value.
        assert_eq!(board.cross_score(6, 8, 0), 1);

        // A square with no perpendicular neighbors is trivial.
        assert_eq!(board.cross_set(0, 0, 0), Board::trivial_cross_set(&ld));
    }

    #[test]
    fn occupied_squares_have_empty_cross_sets() {
        let ld = LetterDistribution::english();
        let kwg = kwg_of(&["QAT"]);
        let mut board = Board::standard();
        board.set_letter(7, 7, ld.char_to_ml('Q').unwrap());
        board.update_all_cross_sets(&kwg, &ld, 0);
        assert_eq!(board.cross_set(7, 7, 0), 0);
    }
}
