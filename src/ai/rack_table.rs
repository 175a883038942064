//! A striped-lock hash table from racks to their best moves, shared
//! by inference worker threads.

use crate::{
    game::play::{Move, MoveList, MoveSort},
    util::bit_rack::BitRack,
};
use std::sync::Mutex;

/// One stored rack: its leave value, draw statistics and the top-K
/// moves offered for it so far.
#[derive(Debug)]
struct RackEntry {
    bucket: u32,
    rack: BitRack,
    leave_value: f64,
    draws: u32,
    weight: f32,
    moves: MoveList,
}

/// A snapshot of one rack's data, returned by lookups so no lock
/// outlives the call.
#[derive(Debug, Clone)]
pub struct RackEntrySnapshot {
    /// The rack.
    pub rack: BitRack,
    /// Its static leave value.
    pub leave_value: f64,
    /// How many ways the rack can be drawn.
    pub draws: u32,
    /// The inference weight attached to the rack.
    pub weight: f32,
    /// The top moves by equity, best first.
    pub moves: Vec<Move>,
}

/// A fixed-bucket concurrent map keyed on [`BitRack`]. Writers hash
/// the rack to a bucket, take the owning stripe lock and splice into
/// that bucket's chain, keeping a bounded min-heap of the K best moves
/// per rack. The stripe count rounds up to a power of two and stripes
/// are chosen by masking, so buckets spread evenly over locks.
#[derive(Debug)]
pub struct RackTable {
    num_buckets: u32,
    stripe_mask: usize,
    stripes: Vec<Mutex<Vec<RackEntry>>>,
    move_list_capacity: usize,
}

impl RackTable {
    /// Creates a table with `num_buckets` hash buckets guarded by at
    /// least `num_stripes` locks, keeping `move_list_capacity` moves
    /// per rack.
    pub fn new(num_buckets: u32, move_list_capacity: usize, num_stripes: usize) -> Self {
        let stripes = num_stripes.max(1).next_power_of_two();
        Self {
            num_buckets: num_buckets.max(1),
            stripe_mask: stripes - 1,
            stripes: (0..stripes).map(|_| Mutex::new(Vec::new())).collect(),
            move_list_capacity,
        }
    }

    fn bucket_of(&self, rack: &BitRack) -> u32 {
        (rack.mix64() % self.num_buckets as u64) as u32
    }
    fn stripe_of(&self, bucket: u32) -> usize {
        bucket as usize & self.stripe_mask
    }

    /// Offers one move for a rack, inserting the rack on first sight.
    /// The entry keeps only the K best moves by equity.
    pub fn add_move(&self, rack: &BitRack, leave_value: f64, draws: u32, weight: f32, mv: &Move) {
        let bucket = self.bucket_of(rack);
        let mut chain = self.stripes[self.stripe_of(bucket)]
            .lock()
            .expect("a writer never panics while holding a stripe");

        let idx = match chain
            .iter()
            .position(|e| e.bucket == bucket && e.rack == *rack)
        {
            Some(idx) => idx,
            None => {
                chain.push(RackEntry {
                    bucket,
                    rack: *rack,
                    leave_value,
                    draws,
                    weight,
                    moves: MoveList::new(self.move_list_capacity, MoveSort::Equity),
                });
                chain.len() - 1
            }
        };
        let entry = &mut chain[idx];
        entry.leave_value = leave_value;
        entry.draws = draws;
        entry.weight = weight;
        if entry.moves.would_record(mv) {
            *entry.moves.spare_mut() = *mv;
            entry.moves.insert_spare();
        }
    }

    /// Copies out a rack's entry with its moves sorted best first.
    pub fn lookup(&self, rack: &BitRack) -> Option<RackEntrySnapshot> {
        let bucket = self.bucket_of(rack);
        let chain = self.stripes[self.stripe_of(bucket)]
            .lock()
            .expect("a reader never panics while holding a stripe");

        chain
            .iter()
            .find(|e| e.bucket == bucket && e.rack == *rack)
            .map(|entry| {
                let mut moves = entry.moves.clone();
                moves.sort_moves();
                RackEntrySnapshot {
                    rack: entry.rack,
                    leave_value: entry.leave_value,
                    draws: entry.draws,
                    weight: entry.weight,
                    moves: moves.moves().to_vec(),
                }
            })
    }

    /// The number of racks stored.
    pub fn len(&self) -> usize {
        self.stripes
            .iter()
            .map(|stripe| stripe.lock().map_or(0, |chain| chain.len()))
            .sum()
    }
    /// Checks whether no racks are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{
        play::MoveKind,
        rack::Rack,
        tile::LetterDistribution,
    };
    use std::sync::Arc;
    use std::thread;

    fn mv_with_equity(equity: f64) -> Move {
        let mut mv = Move::pass();
        mv.kind = MoveKind::Place;
        mv.tiles_played = 1;
        mv.tiles_length = 1;
        mv.score = equity as i32;
        mv.equity = equity;
        mv.col_start = (equity as u8) % 15;
        mv
    }

    fn bits(s: &str) -> BitRack {
        let ld = LetterDistribution::english();
        BitRack::from_rack(&Rack::from_str(&ld, s).unwrap())
    }

    #[test]
    fn keeps_the_top_k_per_rack() {
        let table = RackTable::new(64, 3, 4);
        let rack = bits("AEINRST");
        for equity in [5.0, 9.0, 1.0, 7.0, 3.0, 8.0] {
            table.add_move(&rack, 12.5, 10, 0.5, &mv_with_equity(equity));
        }

        let entry = table.lookup(&rack).unwrap();
        assert_eq!(entry.leave_value, 12.5);
        assert_eq!(entry.draws, 10);
        let equities: Vec<f64> = entry.moves.iter().map(|m| m.equity).collect();
        assert_eq!(equities, vec![9.0, 8.0, 7.0]);
    }

    #[test]
    fn distinct_racks_do_not_collide() {
        let table = RackTable::new(2, 2, 1);
        // Two buckets and one stripe force shared chains.
        let a = bits("AB");
        let b = bits("CD");
        table.add_move(&a, 1.0, 1, 1.0, &mv_with_equity(4.0));
        table.add_move(&b, 2.0, 2, 1.0, &mv_with_equity(6.0));

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(&a).unwrap().moves[0].equity, 4.0);
        assert_eq!(table.lookup(&b).unwrap().moves[0].equity, 6.0);
        assert!(table.lookup(&bits("EF")).is_none());
    }

    #[test]
    fn concurrent_writers_keep_the_invariant() {
        let table = Arc::new(RackTable::new(256, 5, 8));
        let racks = ["AB", "CD", "EF", "GH"];
        fn offer(t: usize, i: usize) -> (f64, usize) {
            (((t * 100 + i) % 37) as f64, (t + i) % 4)
        }

        let mut handles = Vec::new();
        for t in 0..4 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let (equity, rack_idx) = offer(t, i);
                    table.add_move(&bits(racks[rack_idx]), 0.0, 1, 1.0, &mv_with_equity(equity));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // After the write phase each rack holds exactly the top-K by
        // equity of everything offered for it.
        let mut expected: Vec<Vec<f64>> = vec![Vec::new(); racks.len()];
        for t in 0..4 {
            for i in 0..100 {
                let (equity, rack_idx) = offer(t, i);
                expected[rack_idx].push(equity);
            }
        }
        for (rack_idx, rack_str) in racks.iter().enumerate() {
            let mut best = expected[rack_idx].clone();
            best.sort_by(|a, b| b.partial_cmp(a).unwrap());
            best.truncate(5);

            let entry = table.lookup(&bits(rack_str)).unwrap();
            let equities: Vec<f64> = entry.moves.iter().map(|m| m.equity).collect();
            assert_eq!(equities, best, "rack {}", rack_str);
        }
    }
}
