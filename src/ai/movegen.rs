//! The rack-constrained move generator.

use crate::{
    game::{
        board::{Board, BOARD_DIM},
        play::{Move, MoveKind, MoveList},
        rack::{Rack, RACK_SIZE},
        tile::{LetterDistribution, MachineLetter, PLAYED_THROUGH_MARKER},
        Game,
    },
    util::{
        bit_rack::BitRack,
        klv::Klv,
        kwg::{Kwg, GADDAG_SEPARATOR},
        wmp::Wmp,
    },
};

/// Which moves the generator keeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveRecord {
    /// Only the single best move.
    Best,
    /// The best moves up to the list's capacity.
    Top,
    /// Every move within the given equity of the best one found,
    /// still bounded by the list's capacity.
    WithinEquity(f64),
}

/// Generates all legal moves for the player on turn into `move_list`:
/// tile placements via GADDAG descent from every anchor, exchanges
/// when the bag allows them, and the pass. The generator never fails;
/// illegal states only prune the search.
pub fn generate_moves(game: &mut Game, record: MoveRecord, move_list: &mut MoveList) {
    let kwg = game.kwg_arc();
    let klv = game.klv_arc();
    let ld = game.ld_arc();
    let wmp = game.wmp_arc();
    let rack = *game.player(game.on_turn()).rack();
    let bag_count = game.bag().count();
    let bingo_bonus = game.bingo_bonus();
    let board = game.board_mut();
    debug_assert!(!board.is_transposed());

    move_list.reset();
    let mut gen = MoveGen {
        kwg: &kwg,
        klv: &klv,
        ld: &ld,
        board,
        move_list: &mut *move_list,
        rack,
        strip: [MachineLetter::default(); BOARD_DIM],
        exchange_strip: [MachineLetter::default(); RACK_SIZE],
        cross_index: 0,
        bingo_bonus,
        dir: 0,
        current_row: 0,
        current_anchor_col: 0,
        last_anchor_col: -2,
        tiles_played: 0,
    };

    gen.record_pass();
    if bag_count >= RACK_SIZE {
        gen.generate_exchanges(0, 0);
    }

    if gen.board.tiles_played() == 0 && wmp.is_some() {
        // Dense full-rack lookups replace the descent on the opening.
        gen.generate_opening_from_wmp(wmp.as_deref().expect("checked above"));
    } else {
        gen.generate_placements();
    }

    match record {
        MoveRecord::Best => {
            move_list.sort_moves();
            move_list.truncate(1.min(move_list.count()));
        }
        MoveRecord::Top => move_list.sort_moves(),
        MoveRecord::WithinEquity(delta) => {
            move_list.sort_moves();
            if move_list.count() > 0 {
                let floor = move_list.get(0).equity - delta;
                let keep = (0..move_list.count())
                    .take_while(|&i| move_list.get(i).equity >= floor)
                    .count();
                move_list.truncate(keep);
            }
        }
    }
}

/// Re-derives the score of a placement against a board, for callers
/// that need to verify a move independently of the generator.
pub fn score_of_move(board: &mut Board, ld: &LetterDistribution, mv: &Move, bingo_bonus: i32) -> i32 {
    debug_assert_eq!(mv.kind, MoveKind::Place);
    if mv.dir == 1 {
        board.transpose();
    }
    let (row, start_col) = if mv.dir == 0 {
        (mv.row_start as usize, mv.col_start as usize)
    } else {
        (mv.col_start as usize, mv.row_start as usize)
    };
    let mut strip = [MachineLetter::default(); BOARD_DIM];
    strip[start_col..start_col + mv.tiles_length as usize].copy_from_slice(mv.strip());
    let score = board.score_strip(
        ld,
        &strip,
        row,
        start_col,
        start_col + mv.tiles_length as usize - 1,
        0,
        bingo_bonus,
    );
    if board.is_transposed() {
        board.transpose();
    }
    score
}

struct MoveGen<'a> {
    kwg: &'a Kwg,
    klv: &'a Klv,
    ld: &'a LetterDistribution,
    board: &'a mut Board,
    move_list: &'a mut MoveList,
    rack: Rack,
    strip: [MachineLetter; BOARD_DIM],
    exchange_strip: [MachineLetter; RACK_SIZE],
    cross_index: usize,
    bingo_bonus: i32,
    dir: u8,
    current_row: usize,
    current_anchor_col: usize,
    last_anchor_col: i32,
    tiles_played: u8,
}

impl MoveGen<'_> {
    fn record_pass(&mut self) {
        let mv = Move::pass();
        if self.move_list.would_record(&mv) {
            *self.move_list.spare_mut() = mv;
            self.move_list.insert_spare();
        }
    }

    /// Enumerates every non-empty sub-multiset of the rack as an
    /// exchange, walking the letter slots recursively.
    fn generate_exchanges(&mut self, slot: usize, picked: usize) {
        if slot == self.ld.size() {
            if picked > 0 {
                self.record_exchange(picked);
            }
            return;
        }
        self.generate_exchanges(slot + 1, picked);
        let available = self.rack.count_at(slot);
        for taken in 1..=available {
            self.rack.take_letter(MachineLetter::new(slot as u8));
            self.exchange_strip[picked + taken as usize - 1] = MachineLetter::new(slot as u8);
            self.generate_exchanges(slot + 1, picked + taken as usize);
        }
        for _ in 0..available {
            self.rack.add_letter(MachineLetter::new(slot as u8));
        }
    }

    fn record_exchange(&mut self, count: usize) {
        let mut mv = Move::pass();
        mv.kind = MoveKind::Exchange;
        mv.tiles_length = count as u8;
        mv.tiles_played = count as u8;
        mv.score = 0;
        mv.equity = self.klv.leave_value(&self.rack);
        mv.tiles[..count].copy_from_slice(&self.exchange_strip[..count]);
        if self.move_list.would_record(&mv) {
            *self.move_list.spare_mut() = mv;
            self.move_list.insert_spare();
        }
    }

    /// Runs the GADDAG descent over every anchor, horizontally and
    /// then again on the transposed board.
    fn generate_placements(&mut self) {
        for dir in 0..2u8 {
            if dir == 1 {
                self.board.transpose();
            }
            self.dir = dir;
            for row in 0..BOARD_DIM {
                self.current_row = row;
                let mut last_anchor_col = -2i32;
                for col in 0..BOARD_DIM {
                    if self.board.anchor(row, col) {
                        self.current_anchor_col = col;
                        self.last_anchor_col = last_anchor_col;
                        self.recursive_gen(col as i32, self.kwg.gaddag_root(), col, col);
                        last_anchor_col = col as i32;
                    }
                }
            }
            if dir == 1 {
                self.board.transpose();
            }
        }
    }

    /// Visits the square at `col` with the sibling list `p`: play
    /// through an existing tile, or try every rack letter the cross-set
    /// and the automaton both allow.
    fn recursive_gen(&mut self, col: i32, p: u32, leftstrip: usize, rightstrip: usize) {
        let row = self.current_row;
        let ucol = col as usize;
        let board_letter = self.board.letter(row, ucol);

        if !board_letter.is_empty_square() {
            if let Some((child, accepts)) = self.kwg.seek(p, board_letter) {
                self.go_on(col, board_letter, child, accepts, leftstrip, rightstrip, false);
            }
            return;
        }
        if self.rack.is_empty() {
            return;
        }

        let cross_set = self.board.cross_set(row, ucol, self.cross_index);
        let has_blank = self.rack.count(MachineLetter::blank()) > 0;
        let mut i = p;
        if p == 0 {
            return;
        }
        loop {
            let tile = self.kwg.tile(i);
            if tile != GADDAG_SEPARATOR && cross_set & (1 << tile) != 0 {
                let ml = MachineLetter::new(tile);
                let child = self.kwg.arc_index(i);
                let accepts = self.kwg.accepts(i);
                if self.rack.count(ml) > 0 {
                    self.rack.take_letter(ml);
                    self.tiles_played += 1;
                    self.go_on(col, ml, child, accepts, leftstrip, rightstrip, true);
                    self.tiles_played -= 1;
                    self.rack.add_letter(ml);
                }
                if has_blank {
                    let blanked = ml.blanked();
                    self.rack.take_letter(blanked);
                    self.tiles_played += 1;
                    self.go_on(col, blanked, child, accepts, leftstrip, rightstrip, true);
                    self.tiles_played -= 1;
                    self.rack.add_letter(blanked);
                }
            }
            if self.kwg.is_end(i) {
                break;
            }
            i += 1;
        }
    }

    /// Extends the play with one letter: leftward up to the anchor,
    /// rightward after the separator flips the direction. Records the
    /// play whenever the automaton accepts at a word boundary.
    #[allow(clippy::too_many_arguments)]
    fn go_on(
        &mut self,
        col: i32,
        ml: MachineLetter,
        node: u32,
        accepts: bool,
        leftstrip: usize,
        rightstrip: usize,
        fresh: bool,
    ) {
        let row = self.current_row;
        let anchor = self.current_anchor_col as i32;

        if col <= anchor {
            if fresh {
                self.strip[col as usize] = ml;
            }
            let leftstrip = col as usize;
            let no_letter_left =
                col == 0 || self.board.is_empty_square(row, col as usize - 1);

            if accepts && no_letter_left && self.tiles_played > 0 {
                self.record_play(leftstrip, rightstrip);
            }
            if node != 0 {
                if col > 0 && col - 1 != self.last_anchor_col {
                    self.recursive_gen(col - 1, node, leftstrip, rightstrip);
                }
                // The separator is only valid once the prefix is
                // maximal: nothing may hang on to the left.
                if no_letter_left && (anchor as usize) < BOARD_DIM - 1 {
                    if let Some((sep_child, _)) =
                        self.kwg.seek(node, MachineLetter::new(GADDAG_SEPARATOR))
                    {
                        if sep_child != 0 {
                            self.recursive_gen(anchor + 1, sep_child, leftstrip, rightstrip);
                        }
                    }
                }
            }
        } else {
            if fresh {
                self.strip[col as usize] = ml;
            }
            let rightstrip = col as usize;
            let no_letter_right = col as usize == BOARD_DIM - 1
                || self.board.is_empty_square(row, col as usize + 1);

            if accepts && no_letter_right && self.tiles_played > 0 {
                self.record_play(leftstrip, rightstrip);
            }
            if node != 0 && (col as usize) < BOARD_DIM - 1 {
                self.recursive_gen(col + 1, node, leftstrip, rightstrip);
            }
        }
    }

    fn record_play(&mut self, leftstrip: usize, rightstrip: usize) {
        let row = self.current_row;

        // A single tile joining a word in the other orientation was
        // already recorded by the horizontal pass.
        if self.dir == 1 && self.tiles_played == 1 {
            let placed = (leftstrip..=rightstrip)
                .find(|&col| self.board.is_empty_square(row, col))
                .expect("one fresh tile in the span");
            if self.board.has_perpendicular_tile(row, placed) {
                return;
            }
        }

        let score = self.board.score_strip(
            self.ld,
            &self.strip,
            row,
            leftstrip,
            rightstrip,
            self.cross_index,
            self.bingo_bonus,
        );
        let leave_value = self.klv.leave_value(&self.rack);

        let mut mv = Move::pass();
        mv.kind = MoveKind::Place;
        mv.tiles_length = (rightstrip - leftstrip + 1) as u8;
        mv.tiles_played = self.tiles_played;
        mv.dir = self.dir;
        if self.dir == 0 {
            mv.row_start = row as u8;
            mv.col_start = leftstrip as u8;
        } else {
            mv.row_start = leftstrip as u8;
            mv.col_start = row as u8;
        }
        mv.score = score;
        mv.equity = score as f64 + leave_value;
        for (i, col) in (leftstrip..=rightstrip).enumerate() {
            mv.tiles[i] = if self.board.is_empty_square(row, col) {
                self.strip[col]
            } else {
                MachineLetter::new(PLAYED_THROUGH_MARKER)
            };
        }

        if self.move_list.would_record(&mv) {
            *self.move_list.spare_mut() = mv;
            self.move_list.insert_spare();
        }
    }

    /// Opening generation through the word map: every playable
    /// sub-multiset of the rack resolves to its anagram set with one
    /// hash probe per blank designation, and each word slides across
    /// the windows covering the start square.
    fn generate_opening_from_wmp(&mut self, wmp: &Wmp) {
        let full_rack = self.rack;
        let blanks_held = full_rack.count(MachineLetter::blank());
        let mut subset = Rack::new();
        let mut letters_buf = Vec::new();

        // Enumerate natural-tile sub-multisets recursively.
        self.wmp_subsets(wmp, &full_rack, blanks_held, 1, &mut subset, &mut letters_buf);
    }

    fn wmp_subsets(
        &mut self,
        wmp: &Wmp,
        full_rack: &Rack,
        blanks_held: u8,
        slot: usize,
        subset: &mut Rack,
        letters_buf: &mut Vec<u8>,
    ) {
        if slot == self.ld.size() {
            for blanks in 0..=blanks_held {
                self.wmp_query(wmp, subset, blanks, letters_buf);
            }
            return;
        }
        self.wmp_subsets(wmp, full_rack, blanks_held, slot + 1, subset, letters_buf);
        let ml = MachineLetter::new(slot as u8);
        let available = full_rack.count(ml);
        for _ in 0..available {
            subset.add_letter(ml);
            self.wmp_subsets(wmp, full_rack, blanks_held, slot + 1, subset, letters_buf);
        }
        for _ in 0..available {
            subset.take_letter(ml);
        }
    }

    /// Probes the map for `subset` plus `blanks` wildcard tiles.
    fn wmp_query(&mut self, wmp: &Wmp, subset: &Rack, blanks: u8, letters_buf: &mut Vec<u8>) {
        let word_len = subset.total() + blanks as usize;
        if !(2..=RACK_SIZE).contains(&word_len)
            || word_len < wmp.min_word_len()
            || word_len > wmp.max_word_len()
        {
            return;
        }
        let base = BitRack::from_rack(subset);

        match blanks {
            0 => {
                letters_buf.clear();
                wmp.words_into(base, word_len, letters_buf);
                let words = std::mem::take(letters_buf);
                for word in words.chunks_exact(word_len) {
                    self.record_wmp_word(word, &[]);
                }
                *letters_buf = words;
            }
            1 => {
                for c in 1..self.ld.size() as u8 {
                    let mut probe = base;
                    probe.add_letter(MachineLetter::new(c));
                    letters_buf.clear();
                    wmp.words_into(probe, word_len, letters_buf);
                    let words = std::mem::take(letters_buf);
                    for word in words.chunks_exact(word_len) {
                        for pos in word_positions(word, c) {
                            self.record_wmp_word(word, &[pos]);
                        }
                    }
                    *letters_buf = words;
                }
            }
            _ => {
                for c in 1..self.ld.size() as u8 {
                    for d in c..self.ld.size() as u8 {
                        let mut probe = base;
                        probe.add_letter(MachineLetter::new(c));
                        probe.add_letter(MachineLetter::new(d));
                        letters_buf.clear();
                        wmp.words_into(probe, word_len, letters_buf);
                        let words = std::mem::take(letters_buf);
                        for word in words.chunks_exact(word_len) {
                            if c == d {
                                let positions = word_positions(word, c);
                                for (i, &p) in positions.iter().enumerate() {
                                    for &q in &positions[i + 1..] {
                                        self.record_wmp_word(word, &[p, q]);
                                    }
                                }
                            } else {
                                for p in word_positions(word, c) {
                                    for q in word_positions(word, d) {
                                        self.record_wmp_word(word, &[p, q]);
                                    }
                                }
                            }
                        }
                        *letters_buf = words;
                    }
                }
            }
        }
    }

    /// Records one word from the map at every window covering the
    /// start square, with the given positions played as blanks.
    fn record_wmp_word(&mut self, word: &[u8], blank_positions: &[usize]) {
        let len = word.len();
        let (start_row, start_col) = self.board.start_square();
        let lo = start_col.saturating_sub(len - 1);
        let hi = start_col.min(BOARD_DIM - len);

        // Move the word tiles off the working rack so the leave and
        // tiles_played are right for the shared record path.
        let saved_rack = self.rack;
        for (i, &b) in word.iter().enumerate() {
            let blanked = blank_positions.contains(&i);
            self.rack.take_letter(if blanked {
                MachineLetter::blank()
            } else {
                MachineLetter::new(b)
            });
        }
        self.tiles_played = len as u8;
        self.current_row = start_row;
        self.dir = 0;

        for start in lo..=hi {
            for (i, &b) in word.iter().enumerate() {
                let ml = MachineLetter::new(b);
                self.strip[start + i] = if blank_positions.contains(&i) {
                    ml.blanked()
                } else {
                    ml
                };
            }
            self.record_play(start, start + len - 1);
        }

        self.tiles_played = 0;
        self.rack = saved_rack;
    }
}

/// The positions of machine letter `c` within a raw word.
fn word_positions(word: &[u8], c: u8) -> Vec<usize> {
    word.iter()
        .enumerate()
        .filter_map(|(i, &b)| (b == c).then_some(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::play::MoveSort,
        util::{klv::Klv, kwg::KwgBuilder, wmp::WmpBuilder},
    };
    use std::{collections::HashSet, sync::Arc};

    fn game_with(words: &[&str], klv: Klv, seed: u64) -> Game {
        let ld = Arc::new(LetterDistribution::english());
        let mut builder = KwgBuilder::new();
        for word in words {
            builder.insert(&ld.str_to_mls(word).unwrap());
        }
        Game::new(ld, Arc::new(builder.build()), Arc::new(klv), seed)
    }

    fn set_rack(game: &mut Game, rack: &str) {
        let rack = Rack::from_str(game.ld(), rack).unwrap();
        let player = game.on_turn();
        game.set_rack(player, &rack).unwrap();
    }

    fn placements(list: &MoveList) -> Vec<Move> {
        list.moves()
            .iter()
            .filter(|m| m.kind == MoveKind::Place)
            .copied()
            .collect()
    }

    fn move_key(ld: &LetterDistribution, m: &Move) -> String {
        format!(
            "{},{},{},{},{}",
            m.row_start,
            m.col_start,
            m.dir,
            m.score,
            m.describe(ld)
        )
    }

    #[test]
    fn opening_bingo_tops_the_list() {
        let mut game = game_with(&["BEEFIER"], Klv::empty(), 3);
        set_rack(&mut game, "BEEFIER");
        let mut list = MoveList::new(40, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Top, &mut list);

        let best = list.get(0);
        assert_eq!(best.kind, MoveKind::Place);
        assert_eq!(best.tiles_played, 7);
        assert_eq!(best.row_start, 7);
        assert_eq!(best.dir, 0);
        // B on the double-letter at column 3, doubled again by the
        // start square, plus the bingo bonus: (12 + 3) * 2 + 50.
        assert_eq!(best.col_start, 3);
        assert_eq!(best.score, 80);
        assert_eq!(best.equity, 80.0);
        // Exactly the seven windows over the start square exist.
        assert_eq!(placements(&list).len(), 7);
        for mv in placements(&list) {
            assert!(mv.score <= 80);
        }
    }

    #[test]
    fn generated_scores_rescore_identically() {
        let mut game = game_with(
            &["BEEFIER", "BEE", "FIB", "REEF", "IF", "BI"],
            Klv::empty(),
            3,
        );
        set_rack(&mut game, "BEEFIER");
        let mut list = MoveList::new(60, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Top, &mut list);
        assert!(list.count() > 7);

        let ld = LetterDistribution::english();
        let bingo_bonus = game.bingo_bonus();
        for mv in placements(&list) {
            let rescored = score_of_move(game.board_mut(), &ld, &mv, bingo_bonus);
            assert_eq!(rescored, mv.score, "{}", mv.describe(&ld));
        }
    }

    #[test]
    fn cross_set_blocks_bad_letters() {
        let mut game = game_with(&["LA", "TA", "QAT", "AB"], Klv::empty(), 9);
        {
            let ld = LetterDistribution::english();
            let board = game.board_mut();
            for (i, ch) in "QAT".chars().enumerate() {
                board.set_letter(7, 7 + i, ld.char_to_ml(ch).unwrap());
            }
        }
        game.refresh_derived();
        set_rack(&mut game, "BLTXVWZ");

        let mut list = MoveList::new(100, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Top, &mut list);

        let ld = LetterDistribution::english();
        let b = ld.char_to_ml('B').unwrap();
        for mv in placements(&list) {
            // No move may put a letter outside {L, T} above the A.
            if mv.dir == 1 && mv.col_start == 8 {
                let offset = 6usize.saturating_sub(mv.row_start as usize);
                if mv.row_start <= 6 && (mv.row_start as usize + mv.tiles_length as usize) > 6 {
                    let ml = mv.tiles[offset];
                    assert_ne!(ml.unblanked(), b, "{}", mv.describe(&ld));
                }
            }
        }
        // B lands only below the A, completing AB.
        let ab = placements(&list)
            .into_iter()
            .find(|m| m.strip().iter().any(|ml| ml.unblanked() == b))
            .expect("the AB hook exists");
        assert_eq!((ab.dir, ab.col_start), (1, 8));
    }

    #[test]
    fn bingo_bonus_applies_on_seven_tiles() {
        let mut game = game_with(&["RETINAS", "RETINA"], Klv::empty(), 4);
        set_rack(&mut game, "AEINRST");
        let mut list = MoveList::new(60, MoveSort::Score);
        generate_moves(&mut game, MoveRecord::Top, &mut list);

        let best = list.get(0);
        assert_eq!(best.tiles_played, 7);
        // Letter sum 7, one letter on a double-letter square, doubled
        // at the start, plus 50.
        assert_eq!(best.score, 66);
        // Six-tile RETINA placements never reach the bingo bonus.
        let six_best = placements(&list)
            .into_iter()
            .filter(|m| m.tiles_played == 6)
            .map(|m| m.score)
            .max()
            .unwrap();
        assert!(six_best < 50);
    }

    #[test]
    fn exchanges_enumerate_sub_multisets() {
        let ld = LetterDistribution::english();
        let klv = Klv::from_entries(
            &ld,
            &[("A", 1.0), ("B", 2.0), ("?", 10.0), ("AB", 3.0), ("A?", 11.0), ("B?", 12.0)],
        )
        .unwrap();
        let mut game = game_with(&["CAT"], klv, 6);
        set_rack(&mut game, "AB?");

        let mut list = MoveList::new(100, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Top, &mut list);

        let exchanges: Vec<Move> = list
            .moves()
            .iter()
            .filter(|m| m.kind == MoveKind::Exchange)
            .copied()
            .collect();
        // Non-empty sub-multisets of {A, B, ?}.
        assert_eq!(exchanges.len(), 7);
        for mv in &exchanges {
            assert_eq!(mv.score, 0);
            let mut kept = Rack::from_str(&ld, "AB?").unwrap();
            for &ml in mv.strip() {
                kept.take_letter(ml);
            }
            assert_eq!(mv.equity, game.klv().leave_value(&kept), "{:?}", mv.strip());
        }
        // Exchanging only the A keeps B and the blank, the best leave.
        let best_exchange = exchanges
            .iter()
            .max_by(|a, b| a.equity.partial_cmp(&b.equity).unwrap())
            .unwrap();
        assert_eq!(best_exchange.equity, 12.0);
    }

    #[test]
    fn no_exchanges_from_a_thin_bag() {
        let mut game = game_with(&["CAT"], Klv::empty(), 6);
        set_rack(&mut game, "ABCDEFG");
        // Drain the bag below a rack's worth.
        while game.bag().count() >= RACK_SIZE {
            game.bag_mut().draw_random_letter(0);
        }
        let mut list = MoveList::new(100, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Top, &mut list);
        assert!(list.moves().iter().all(|m| m.kind != MoveKind::Exchange));
    }

    #[test]
    fn each_play_is_emitted_exactly_once() {
        let mut game = game_with(&["CARES", "ARE", "CA", "ARES", "CAR", "CARE"], Klv::empty(), 2);
        {
            let ld = LetterDistribution::english();
            let board = game.board_mut();
            for (i, ch) in "ARE".chars().enumerate() {
                board.set_letter(7, 7 + i, ld.char_to_ml(ch).unwrap());
            }
        }
        game.refresh_derived();
        set_rack(&mut game, "CSQZJXW");

        let mut list = MoveList::new(200, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Top, &mut list);

        let ld = LetterDistribution::english();
        let mut seen = HashSet::new();
        for mv in placements(&list) {
            let key = move_key(&ld, &mv);
            assert!(seen.insert(key.clone()), "duplicate: {}", key);
        }
        // CARES through the existing ARE appears exactly once.
        let cares = placements(&list)
            .into_iter()
            .filter(|m| m.tiles_played == 2 && m.tiles_length == 5)
            .count();
        assert_eq!(cares, 1);
    }

    #[test]
    fn best_record_keeps_one_move() {
        let mut game = game_with(&["BEEFIER"], Klv::empty(), 3);
        set_rack(&mut game, "BEEFIER");
        let mut list = MoveList::new(40, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Best, &mut list);
        assert_eq!(list.count(), 1);
        assert_eq!(list.get(0).score, 80);
    }

    #[test]
    fn within_equity_filters_the_tail() {
        let mut game = game_with(&["BEEFIER"], Klv::empty(), 3);
        set_rack(&mut game, "BEEFIER");
        let mut list = MoveList::new(40, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::WithinEquity(6.0), &mut list);
        // 80 and the 76s and 74 survive within 6 points; exchanges at
        // equity zero and the pass do not.
        assert!(list.count() >= 2);
        for mv in list.moves() {
            assert!(mv.equity >= 74.0);
        }
    }

    #[test]
    fn pass_is_always_available() {
        let mut game = game_with(&["CAT"], Klv::empty(), 6);
        set_rack(&mut game, "QZJXK");
        // An impossible rack: no placements exist on an empty board.
        let mut list = MoveList::new(10, MoveSort::Equity);
        generate_moves(&mut game, MoveRecord::Top, &mut list);
        assert!(list.moves().iter().any(|m| m.kind == MoveKind::Pass));
    }

    #[test]
    fn wmp_opening_matches_gaddag_opening() {
        let words = ["EAT", "ETA", "TEA", "EATEN", "NET", "TEN", "ANT", "NEAT", "ANTE"];
        let ld = LetterDistribution::english();

        let mut plain = game_with(&words, Klv::empty(), 8);
        set_rack(&mut plain, "AETN?");
        let mut plain_list = MoveList::new(500, MoveSort::Equity);
        generate_moves(&mut plain, MoveRecord::Top, &mut plain_list);

        let mut accelerated = game_with(&words, Klv::empty(), 8);
        let mut wmp_builder = WmpBuilder::new();
        wmp_builder.insert_all(&ld, &words).unwrap();
        accelerated.set_wmp(Some(Arc::new(wmp_builder.build())));
        set_rack(&mut accelerated, "AETN?");
        let mut wmp_list = MoveList::new(500, MoveSort::Equity);
        generate_moves(&mut accelerated, MoveRecord::Top, &mut wmp_list);

        let keys = |list: &MoveList| -> HashSet<String> {
            list.moves()
                .iter()
                .filter(|m| m.kind == MoveKind::Place)
                .map(|m| move_key(&ld, m))
                .collect()
        };
        assert_eq!(keys(&plain_list), keys(&wmp_list));
        assert!(!keys(&plain_list).is_empty());
    }
}
