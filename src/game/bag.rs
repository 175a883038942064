//! The tile bag: an ordered pool with a seeded generator.

use crate::game::tile::{LetterDistribution, MachineLetter};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// The bag of undrawn tiles. Tiles sit in a shuffled order and the two
/// players draw from opposite ends, so each side's draw history replays
/// deterministically regardless of how the other side draws. Returned
/// tiles re-enter at the returning player's end and are swapped to a
/// random position.
#[derive(Debug, Clone)]
pub struct Bag {
    tiles: VecDeque<MachineLetter>,
    rng: StdRng,
}

impl Bag {
    /// A full bag for the distribution, shuffled with `seed`.
    pub fn new(ld: &LetterDistribution, seed: u64) -> Self {
        let mut bag = Self {
            tiles: VecDeque::with_capacity(ld.total_tiles()),
            rng: StdRng::seed_from_u64(seed),
        };
        bag.reset(ld);
        bag
    }

    /// Refills from the distribution and shuffles with the current
    /// generator state.
    pub fn reset(&mut self, ld: &LetterDistribution) {
        self.tiles.clear();
        for i in 0..ld.size() {
            let ml = MachineLetter::new(i as u8);
            for _ in 0..ld.count(ml) {
                self.tiles.push_back(ml);
            }
        }
        self.shuffle();
    }

    /// Reseeds the generator and reshuffles.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.shuffle();
    }

    /// Fisher-Yates over the current contents.
    pub fn shuffle(&mut self) {
        for i in (1..self.tiles.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            self.tiles.swap(i, j);
        }
    }

    /// The number of undrawn tiles.
    pub fn count(&self) -> usize {
        self.tiles.len()
    }
    /// Checks whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
    /// How many of one letter remain.
    pub fn letter_count(&self, ml: MachineLetter) -> usize {
        self.tiles.iter().filter(|&&t| t == ml).count()
    }

    /// Draws the next tile from the player's end of the bag.
    pub fn draw_random_letter(&mut self, player: usize) -> Option<MachineLetter> {
        if player == 0 {
            self.tiles.pop_back()
        } else {
            self.tiles.pop_front()
        }
    }

    /// Draws one specific letter, swapping it out from wherever it
    /// sits. Returns false when the bag does not hold it.
    pub fn draw_letter(&mut self, ml: MachineLetter, player: usize) -> bool {
        let Some(pos) = self.tiles.iter().position(|&t| t == ml) else {
            return false;
        };
        if player == 0 {
            self.tiles.swap(pos, self.tiles.len() - 1);
            self.tiles.pop_back();
        } else {
            self.tiles.swap(pos, 0);
            self.tiles.pop_front();
        }
        true
    }

    /// Returns a tile to the bag at the player's end, then swaps it to
    /// a random position so later draws stay unpredictable.
    pub fn add_letter(&mut self, ml: MachineLetter, player: usize) {
        if player == 0 {
            self.tiles.push_back(ml);
            let last = self.tiles.len() - 1;
            let j = self.rng.gen_range(0..=last);
            self.tiles.swap(last, j);
        } else {
            self.tiles.push_front(ml);
            let j = self.rng.gen_range(0..self.tiles.len());
            self.tiles.swap(0, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bag_counts() {
        let ld = LetterDistribution::english();
        let bag = Bag::new(&ld, 0);
        assert_eq!(bag.count(), 100);
        assert_eq!(bag.letter_count(MachineLetter::blank()), 2);
        assert_eq!(bag.letter_count(MachineLetter::new(5)), 12); // E
    }

    #[test]
    fn seeded_shuffle_is_deterministic() {
        let ld = LetterDistribution::english();
        let mut a = Bag::new(&ld, 42);
        let mut b = Bag::new(&ld, 42);
        for _ in 0..100 {
            assert_eq!(a.draw_random_letter(0), b.draw_random_letter(0));
        }
        assert!(a.is_empty());
    }

    #[test]
    fn different_seeds_differ() {
        let ld = LetterDistribution::english();
        let mut a = Bag::new(&ld, 1);
        let mut b = Bag::new(&ld, 2);
        let draws_a: Vec<_> = (0..20).filter_map(|_| a.draw_random_letter(0)).collect();
        let draws_b: Vec<_> = (0..20).filter_map(|_| b.draw_random_letter(0)).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn per_player_draw_histories_are_independent() {
        let ld = LetterDistribution::english();
        let mut a = Bag::new(&ld, 7);
        let mut b = Bag::new(&ld, 7);

        // Player 1 drawing first must not disturb player 0's sequence.
        for _ in 0..5 {
            b.draw_random_letter(1);
        }
        let from_a: Vec<_> = (0..7).filter_map(|_| a.draw_random_letter(0)).collect();
        let from_b: Vec<_> = (0..7).filter_map(|_| b.draw_random_letter(0)).collect();
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn draw_specific_letter() {
        let ld = LetterDistribution::english();
        let mut bag = Bag::new(&ld, 3);
        let q = ld.char_to_ml('Q').unwrap();
        assert!(bag.draw_letter(q, 0));
        assert_eq!(bag.letter_count(q), 0);
        assert!(!bag.draw_letter(q, 0));
        assert_eq!(bag.count(), 99);

        bag.add_letter(q, 0);
        assert_eq!(bag.letter_count(q), 1);
        assert_eq!(bag.count(), 100);
    }
}
