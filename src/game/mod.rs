//! The abstract game state: board, bag, racks, scores and turn flow.

use crate::{
    error::{GameError, GameResult},
    game::{
        bag::Bag,
        board::Board,
        play::{Move, MoveKind},
        rack::{Rack, RACK_SIZE},
        tile::{LetterDistribution, MachineLetter, PLAYED_THROUGH_MARKER},
    },
    util::{klv::Klv, kwg::Kwg, wmp::Wmp},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod bag;
pub mod board;
pub mod play;
pub mod rack;
pub mod tile;

/// Turns without a score before the game ends by exhaustion.
pub const MAX_SCORELESS_TURNS: u32 = 6;
/// The default bingo bonus.
pub const DEFAULT_BINGO_BONUS: i32 = 50;

/// Why a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEndReason {
    /// A player emptied their rack with the bag empty.
    StandardPlayout,
    /// Six consecutive scoreless turns.
    ConsecutiveZeros,
}

/// One player: a rack and a running score.
#[derive(Debug, Clone, Default)]
pub struct Player {
    rack: Rack,
    score: i32,
}

impl Player {
    /// The player's rack.
    pub fn rack(&self) -> &Rack {
        &self.rack
    }
    /// The player's score.
    pub fn score(&self) -> i32 {
        self.score
    }
}

/// A snapshot of the mutable game state, restorable after a failed or
/// speculative command.
#[derive(Debug, Clone)]
struct Snapshot {
    board: Board,
    bag: Bag,
    players: [Player; 2],
    on_turn: usize,
    scoreless_turns: u32,
    end_reason: Option<GameEndReason>,
}

/// A two-player game. The dictionaries and leave table are shared
/// read-only references, so cloning a game for a simulation thread
/// copies only the mutable state.
#[derive(Debug, Clone)]
pub struct Game {
    ld: Arc<LetterDistribution>,
    kwg: Arc<Kwg>,
    klv: Arc<Klv>,
    wmp: Option<Arc<Wmp>>,
    board: Board,
    bag: Bag,
    players: [Player; 2],
    on_turn: usize,
    scoreless_turns: u32,
    end_reason: Option<GameEndReason>,
    bingo_bonus: i32,
    backup: Option<Box<Snapshot>>,
}

impl Game {
    /// A fresh game on the standard board with empty racks.
    pub fn new(ld: Arc<LetterDistribution>, kwg: Arc<Kwg>, klv: Arc<Klv>, seed: u64) -> Self {
        let bag = Bag::new(&ld, seed);
        let mut game = Self {
            board: Board::standard(),
            bag,
            players: [Player::default(), Player::default()],
            on_turn: 0,
            scoreless_turns: 0,
            end_reason: None,
            bingo_bonus: DEFAULT_BINGO_BONUS,
            wmp: None,
            ld,
            kwg,
            klv,
            backup: None,
        };
        game.refresh_derived();
        game
    }

    /// Attaches a word map for generator acceleration.
    pub fn set_wmp(&mut self, wmp: Option<Arc<Wmp>>) {
        self.wmp = wmp;
    }
    /// Overrides the bingo bonus.
    pub fn set_bingo_bonus(&mut self, bonus: i32) {
        self.bingo_bonus = bonus;
    }

    /// The letter distribution.
    pub fn ld(&self) -> &LetterDistribution {
        &self.ld
    }
    /// A shared handle on the letter distribution.
    pub fn ld_arc(&self) -> Arc<LetterDistribution> {
        Arc::clone(&self.ld)
    }
    /// A shared handle on the word graph.
    pub fn kwg_arc(&self) -> Arc<Kwg> {
        Arc::clone(&self.kwg)
    }
    /// A shared handle on the leave table.
    pub fn klv_arc(&self) -> Arc<Klv> {
        Arc::clone(&self.klv)
    }
    /// A shared handle on the word map, when attached.
    pub fn wmp_arc(&self) -> Option<Arc<Wmp>> {
        self.wmp.clone()
    }
    /// The word graph.
    pub fn kwg(&self) -> &Kwg {
        &self.kwg
    }
    /// The leave table.
    pub fn klv(&self) -> &Klv {
        &self.klv
    }
    /// The word map, when attached.
    pub fn wmp(&self) -> Option<&Wmp> {
        self.wmp.as_deref()
    }
    /// The board.
    pub fn board(&self) -> &Board {
        &self.board
    }
    /// Mutable board access for the generator's transposition passes.
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }
    /// The bag.
    pub fn bag(&self) -> &Bag {
        &self.bag
    }
    /// Mutable bag access for rollout setup.
    pub fn bag_mut(&mut self) -> &mut Bag {
        &mut self.bag
    }
    /// A player's state.
    pub fn player(&self, index: usize) -> &Player {
        &self.players[index]
    }
    /// The index of the player on turn.
    pub fn on_turn(&self) -> usize {
        self.on_turn
    }
    /// The bingo bonus in force.
    pub fn bingo_bonus(&self) -> i32 {
        self.bingo_bonus
    }
    /// The end reason, set once the game is over.
    pub fn end_reason(&self) -> Option<GameEndReason> {
        self.end_reason
    }
    /// Whether the game is over.
    pub fn is_over(&self) -> bool {
        self.end_reason.is_some()
    }
    /// Consecutive scoreless turns so far.
    pub fn scoreless_turns(&self) -> u32 {
        self.scoreless_turns
    }
    /// Score difference from `player`'s point of view.
    pub fn spread(&self, player: usize) -> i32 {
        self.players[player].score - self.players[1 - player].score
    }
    /// Tiles not visible to `player`: the bag plus the opponent rack.
    pub fn unseen_tiles(&self, player: usize) -> usize {
        self.bag.count() + self.players[1 - player].rack.total()
    }

    /// Fills a player's rack up to seven tiles from the bag.
    pub fn draw_rack(&mut self, player: usize) {
        while self.players[player].rack.total() < RACK_SIZE && !self.bag.is_empty() {
            let ml = self
                .bag
                .draw_random_letter(player)
                .expect("bag checked non-empty");
            self.players[player].rack.add_letter(ml);
        }
    }

    /// Replaces a player's rack with specific tiles, returning the old
    /// rack to the bag first. Fails without state change when the bag
    /// and old rack cannot supply the requested tiles.
    pub fn set_rack(&mut self, player: usize, rack: &Rack) -> GameResult<()> {
        let old = self.players[player].rack;
        for ml in old.iter() {
            self.bag.add_letter(ml, player);
        }
        self.players[player].rack.reset();

        let mut drawn = Rack::new();
        for ml in rack.iter() {
            if !self.bag.draw_letter(ml, player) {
                // Roll back: return what we took, restore the old rack.
                for taken in drawn.iter() {
                    self.bag.add_letter(taken, player);
                }
                for taken in old.iter() {
                    let ok = self.bag.draw_letter(taken, player);
                    debug_assert!(ok);
                }
                self.players[player].rack = old;
                return Err(GameError::NotEnoughLetters);
            }
            drawn.add_letter(ml);
        }
        self.players[player].rack = *rack;
        Ok(())
    }

    /// Snapshots the mutable state.
    pub fn backup(&mut self) {
        self.backup = Some(Box::new(Snapshot {
            board: self.board.clone(),
            bag: self.bag.clone(),
            players: self.players.clone(),
            on_turn: self.on_turn,
            scoreless_turns: self.scoreless_turns,
            end_reason: self.end_reason,
        }));
    }

    /// Restores the last snapshot. Returns whether one existed.
    pub fn restore(&mut self) -> bool {
        match self.backup.take() {
            Some(snapshot) => {
                self.board = snapshot.board;
                self.bag = snapshot.bag;
                self.players = snapshot.players;
                self.on_turn = snapshot.on_turn;
                self.scoreless_turns = snapshot.scoreless_turns;
                self.end_reason = snapshot.end_reason;
                true
            }
            None => false,
        }
    }

    /// Applies a move for the player on turn: validates it, scores it,
    /// refills the rack and advances the turn. A rejected move leaves
    /// the game untouched.
    pub fn play_move(&mut self, mv: &Move) -> GameResult<()> {
        if self.is_over() {
            return Err(GameError::Over);
        }
        match mv.kind {
            MoveKind::Pass => {
                self.scoreless_turns += 1;
            }
            MoveKind::Exchange => self.play_exchange(mv)?,
            MoveKind::Place => self.play_placement(mv)?,
        }

        if self.end_reason.is_none() && self.scoreless_turns >= MAX_SCORELESS_TURNS {
            // Exhaustion: both players give back their racks.
            for player in self.players.iter_mut() {
                player.score -= player.rack.score(&self.ld);
            }
            self.end_reason = Some(GameEndReason::ConsecutiveZeros);
        }
        self.on_turn = 1 - self.on_turn;
        Ok(())
    }

    fn play_exchange(&mut self, mv: &Move) -> GameResult<()> {
        let count = mv.tiles_length as usize;
        if !(1..=RACK_SIZE).contains(&count) {
            return Err(GameError::ExchangeCount);
        }
        if self.bag.count() < RACK_SIZE {
            return Err(GameError::NotEnoughLetters);
        }
        let mut exchanged = Rack::new();
        for &ml in mv.strip() {
            exchanged.add_letter(ml);
        }
        if !self.players[self.on_turn].rack.subtract(&exchanged) {
            return Err(GameError::NotInRack);
        }

        // Draw replacements before returning the old tiles so they
        // cannot come straight back.
        self.draw_rack(self.on_turn);
        for ml in exchanged.iter() {
            self.bag.add_letter(ml, self.on_turn);
        }
        self.scoreless_turns += 1;
        Ok(())
    }

    fn play_placement(&mut self, mv: &Move) -> GameResult<()> {
        if !(1..=RACK_SIZE).contains(&(mv.tiles_played as usize))
            || mv.tiles_length < mv.tiles_played
        {
            return Err(GameError::PlacementCount);
        }

        if mv.dir == 1 {
            self.board.transpose();
        }
        let result = self.apply_placement_oriented(mv);
        if self.board.is_transposed() {
            self.board.transpose();
        }
        let score = result?;

        let player = &mut self.players[self.on_turn];
        player.score += score;
        if score == 0 {
            self.scoreless_turns += 1;
        } else {
            self.scoreless_turns = 0;
        }
        self.draw_rack(self.on_turn);

        self.refresh_derived();

        if self.players[self.on_turn].rack.is_empty() && self.bag.is_empty() {
            // Going out earns twice the opponent's remaining tiles.
            let out_bonus = 2 * self.players[1 - self.on_turn].rack.score(&self.ld);
            self.players[self.on_turn].score += out_bonus;
            self.end_reason = Some(GameEndReason::StandardPlayout);
        }
        Ok(())
    }

    /// Validates and lays the tiles with the board already oriented
    /// along the move, returning the score. Restores any partial change
    /// on error.
    fn apply_placement_oriented(&mut self, mv: &Move) -> GameResult<i32> {
        let (row, start_col) = if mv.dir == 0 {
            (mv.row_start as usize, mv.col_start as usize)
        } else {
            (mv.col_start as usize, mv.row_start as usize)
        };
        let len = mv.tiles_length as usize;
        if row >= board::BOARD_DIM || start_col + len > board::BOARD_DIM || len < 2 {
            return Err(GameError::PlacementCount);
        }
        // The word must be maximal: empty or edge on both sides.
        if (start_col > 0 && !self.board.is_empty_square(row, start_col - 1))
            || (start_col + len < board::BOARD_DIM
                && !self.board.is_empty_square(row, start_col + len))
        {
            return Err(GameError::NotConnected);
        }

        let mut fresh = Rack::new();
        let mut connected = false;
        let mut covers_start = false;
        for (i, &ml) in mv.strip().iter().enumerate() {
            let col = start_col + i;
            let occupied = !self.board.is_empty_square(row, col);
            if ml.as_u8() == PLAYED_THROUGH_MARKER {
                if !occupied {
                    return Err(GameError::NotConnected);
                }
                connected = true;
            } else {
                if occupied {
                    return Err(GameError::CoincidentTiles);
                }
                if self.board.is_brick(row, col) {
                    return Err(GameError::CoincidentTiles);
                }
                fresh.add_letter(ml);
                connected = connected || self.board.has_perpendicular_tile(row, col);
                covers_start = covers_start || (row, col) == self.board.start_square();
            }
        }
        if fresh.total() != mv.tiles_played as usize {
            return Err(GameError::PlacementCount);
        }
        if self.board.tiles_played() == 0 {
            if !covers_start {
                return Err(GameError::MustIntersectStart);
            }
        } else if !connected {
            return Err(GameError::NotConnected);
        }
        if !self.players[self.on_turn].rack.subtract(&fresh) {
            return Err(GameError::NotInRack);
        }

        // Score before laying tiles: cross-scores describe the board
        // as the mover saw it.
        let mut strip = [MachineLetter::default(); board::BOARD_DIM];
        strip[start_col..start_col + len].copy_from_slice(mv.strip());
        let score = self.board.score_strip(
            &self.ld,
            &strip,
            row,
            start_col,
            start_col + len - 1,
            0,
            self.bingo_bonus,
        );

        for (i, &ml) in mv.strip().iter().enumerate() {
            if ml.as_u8() != PLAYED_THROUGH_MARKER {
                self.board.set_letter(row, start_col + i, ml);
            }
        }
        Ok(score)
    }

    /// Recomputes the derived board state: cross-sets, cross-scores
    /// and anchors.
    pub fn refresh_derived(&mut self) {
        debug_assert!(!self.board.is_transposed());
        let kwg = Arc::clone(&self.kwg);
        let ld = Arc::clone(&self.ld);
        self.board.update_all_cross_sets(&kwg, &ld, 0);
        self.board.update_all_anchors();
    }
}
