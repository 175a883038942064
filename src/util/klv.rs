//! The leave-value table: a trie over sorted racks plus packed values.

use crate::{
    error::{GameError, GameResult},
    game::{rack::Rack, tile::LetterDistribution, tile::MachineLetter},
    util::kwg::{Kwg, KwgBuilder},
};

/// Racks larger than this always have a leave value of zero.
pub const MAX_LEAVE_SIZE: usize = 6;

/// Maps every rack of size 1..=6 to a static equity adjustment. Stored
/// as a KWG-style trie keyed on the sorted rack plus a dense value
/// array indexed by the accepting-node ordinal. Immutable and
/// infallible after load.
#[derive(Debug, Clone)]
pub struct Klv {
    kwg: Kwg,
    arc_counts: Vec<u32>,
    leaves: Vec<f32>,
}

impl Klv {
    /// An all-zero table: every leave is worth nothing.
    pub fn empty() -> Self {
        let kwg = KwgBuilder::new().build();
        Self {
            arc_counts: vec![0; kwg.node_count()],
            kwg,
            leaves: Vec::new(),
        }
    }

    /// Decodes a KLV blob: a little-endian node count, that many KWG
    /// nodes, then 32-bit floats through to the end.
    pub fn from_bytes(bytes: &[u8]) -> GameResult<Self> {
        if bytes.len() < 4 {
            return Err(GameError::MalformedKlv);
        }
        let node_count =
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let kwg_end = 4 + node_count * 4;
        if bytes.len() < kwg_end || (bytes.len() - kwg_end) % 4 != 0 {
            return Err(GameError::MalformedKlv);
        }
        let kwg = Kwg::from_bytes(&bytes[4..kwg_end]).map_err(|_| GameError::MalformedKlv)?;
        let leaves: Vec<f32> = bytes[kwg_end..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let klv = Self::with_counts(kwg, leaves);
        if klv.total_leaves() as usize != klv.leaves.len() {
            return Err(GameError::MalformedKlv);
        }
        Ok(klv)
    }

    /// Re-encodes the table.
    pub fn to_bytes(&self) -> Vec<u8> {
        let kwg_bytes = self.kwg.to_bytes();
        let mut bytes = Vec::with_capacity(4 + kwg_bytes.len() + self.leaves.len() * 4);
        bytes.extend_from_slice(&((kwg_bytes.len() / 4) as u32).to_le_bytes());
        bytes.extend_from_slice(&kwg_bytes);
        for &leave in &self.leaves {
            bytes.extend_from_slice(&leave.to_le_bytes());
        }
        bytes
    }

    /// Builds a table from (rack string, value) pairs. Meant for tests
    /// and CSV import tooling.
    pub fn from_entries(ld: &LetterDistribution, entries: &[(&str, f32)]) -> GameResult<Self> {
        let mut builder = KwgBuilder::new();
        let mut sorted_entries = Vec::with_capacity(entries.len());
        for &(rack_str, value) in entries {
            let mut letters = ld.str_to_mls(rack_str)?;
            letters.iter_mut().for_each(|ml| *ml = ml.unblanked());
            letters.sort();
            builder.insert(&letters);
            sorted_entries.push((letters, value));
        }

        let mut klv = Self::with_counts(builder.build(), Vec::new());
        klv.leaves = vec![0.0; klv.total_leaves() as usize];
        for (letters, value) in sorted_entries {
            let idx = klv
                .word_index(&letters)
                .expect("an inserted rack is indexable");
            klv.leaves[idx as usize] = value;
        }
        Ok(klv)
    }

    /// The equity adjustment for keeping `rack`. Zero for empty racks,
    /// racks above [`MAX_LEAVE_SIZE`] and racks the table does not
    /// know.
    pub fn leave_value(&self, rack: &Rack) -> f64 {
        if rack.is_empty() || rack.total() > MAX_LEAVE_SIZE {
            return 0.0;
        }
        let mut letters = [MachineLetter::blank(); MAX_LEAVE_SIZE];
        let mut len = 0;
        for ml in rack.iter() {
            letters[len] = ml.unblanked();
            len += 1;
        }
        // rack iteration is already in ascending letter order.
        match self.word_index(&letters[..len]) {
            Some(idx) => self.leaves[idx as usize] as f64,
            None => 0.0,
        }
    }

    fn with_counts(kwg: Kwg, leaves: Vec<f32>) -> Self {
        let mut klv = Self {
            arc_counts: vec![u32::MAX; kwg.node_count()],
            kwg,
            leaves,
        };
        for i in 3..klv.kwg.node_count() as u32 {
            klv.count_arc(i);
        }
        klv
    }

    /// Number of leaves in the subtree hanging off arc `i`, counting
    /// the arc's own acceptance.
    fn count_arc(&mut self, i: u32) -> u32 {
        if self.arc_counts[i as usize] != u32::MAX {
            return self.arc_counts[i as usize];
        }
        let mut count = self.kwg.accepts(i) as u32;
        count += self.count_list(self.kwg.arc_index(i));
        self.arc_counts[i as usize] = count;
        count
    }

    fn count_list(&mut self, p: u32) -> u32 {
        if p == 0 {
            return 0;
        }
        let mut count = 0;
        let mut i = p;
        loop {
            count += self.count_arc(i);
            if self.kwg.is_end(i) {
                break;
            }
            i += 1;
        }
        count
    }

    fn total_leaves(&self) -> u32 {
        let root = self.kwg.dawg_root();
        if root == 0 {
            return 0;
        }
        let mut total = 0;
        let mut i = root;
        loop {
            total += self.arc_counts[i as usize];
            if self.kwg.is_end(i) {
                break;
            }
            i += 1;
        }
        total
    }

    /// The ordinal of a sorted rack among all accepted racks, walking
    /// the trie and skipping the subtrees of smaller siblings.
    fn word_index(&self, letters: &[MachineLetter]) -> Option<u32> {
        let mut p = self.kwg.dawg_root();
        if p == 0 {
            return None;
        }
        let mut idx = 0;
        for (pos, &ml) in letters.iter().enumerate() {
            let last = pos + 1 == letters.len();
            let mut i = p;
            loop {
                if self.kwg.tile(i) == ml.as_u8() {
                    if last {
                        return self.kwg.accepts(i).then_some(idx);
                    }
                    if self.kwg.accepts(i) {
                        idx += 1;
                    }
                    p = self.kwg.arc_index(i);
                    if p == 0 {
                        return None;
                    }
                    break;
                }
                idx += self.arc_counts[i as usize];
                if self.kwg.is_end(i) {
                    return None;
                }
                i += 1;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_is_all_zero() {
        let ld = LetterDistribution::english();
        let klv = Klv::empty();
        let rack = Rack::from_str(&ld, "AEINRST").unwrap();
        assert_eq!(klv.leave_value(&rack), 0.0);
    }

    #[test]
    fn entries_round_trip() {
        let ld = LetterDistribution::english();
        let klv = Klv::from_entries(
            &ld,
            &[("S", 8.0), ("QU", 1.5), ("ERS", 12.25), ("?", 24.5)],
        )
        .unwrap();

        let cases = [("S", 8.0), ("QU", 1.5), ("ERS", 12.25), ("?", 24.5)];
        for (rack_str, expected) in cases {
            let rack = Rack::from_str(&ld, rack_str).unwrap();
            assert_eq!(klv.leave_value(&rack), expected, "{}", rack_str);
        }

        // Unknown leaves and over-long racks fall back to zero.
        let unknown = Rack::from_str(&ld, "ZZ").unwrap();
        assert_eq!(klv.leave_value(&unknown), 0.0);
        let long = Rack::from_str(&ld, "AEINRST").unwrap();
        assert_eq!(klv.leave_value(&long), 0.0);
    }

    #[test]
    fn rack_order_does_not_matter() {
        let ld = LetterDistribution::english();
        let klv = Klv::from_entries(&ld, &[("ER", 3.5)]).unwrap();
        let a = Rack::from_str(&ld, "ER").unwrap();
        let b = Rack::from_str(&ld, "RE").unwrap();
        assert_eq!(klv.leave_value(&a), 3.5);
        assert_eq!(klv.leave_value(&b), 3.5);
    }

    #[test]
    fn blob_round_trip() {
        let ld = LetterDistribution::english();
        let klv = Klv::from_entries(&ld, &[("A", 1.0), ("B", -2.5), ("AB", 4.0)]).unwrap();
        let bytes = klv.to_bytes();
        let loaded = Klv::from_bytes(&bytes).unwrap();

        let rack = Rack::from_str(&ld, "AB").unwrap();
        assert_eq!(loaded.leave_value(&rack), 4.0);
        assert_eq!(loaded.to_bytes(), bytes);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        assert_eq!(Klv::from_bytes(&[1, 2]).unwrap_err(), GameError::MalformedKlv);
        // Node count pointing past the end.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        assert_eq!(Klv::from_bytes(&bytes).unwrap_err(), GameError::MalformedKlv);
    }
}
