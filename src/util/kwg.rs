//! The packed word graph: a DAWG and a GADDAG sharing one node array.

use crate::{
    error::{GameError, GameResult},
    game::tile::MachineLetter,
};
use std::collections::HashMap;

/// Bit 22 marks the last arc of a sibling list.
const IS_END_BIT: u32 = 0x40_0000;
/// Bit 23 marks a word ending on this arc.
const ACCEPTS_BIT: u32 = 0x80_0000;
/// Low 22 bits hold the child sibling-list index.
const ARC_INDEX_MASK: u32 = 0x3f_ffff;

/// The separator tile flipping a GADDAG path from the reversed prefix
/// to the forward suffix.
pub const GADDAG_SEPARATOR: u8 = 0;

/// A packed, read-only word graph. Each 32-bit node holds a tile label,
/// an acceptance bit, an end-of-list bit and the index of its child
/// sibling list. The fixed header addresses two roots: a DAWG for word
/// verification and a GADDAG for move generation. Malformed input is
/// rejected at load; a loaded graph is infallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kwg {
    nodes: Vec<u32>,
}

impl Kwg {
    /// Decodes a little-endian KWG blob, validating the shape: length a
    /// positive multiple of 4, in-bounds roots and arc targets,
    /// properly terminated sibling lists and no cycles.
    pub fn from_bytes(bytes: &[u8]) -> GameResult<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(GameError::MalformedKwg);
        }
        let nodes: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        if nodes.len() < 3 {
            return Err(GameError::MalformedKwg);
        }

        let kwg = Self { nodes };
        kwg.validate()?;
        Ok(kwg)
    }

    /// Re-encodes the node array as a little-endian blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.nodes.len() * 4);
        for &node in &self.nodes {
            bytes.extend_from_slice(&node.to_le_bytes());
        }
        bytes
    }

    /// The number of 32-bit nodes, header included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, i: u32) -> u32 {
        self.nodes[i as usize]
    }
    /// Checks whether node `i` ends its sibling list.
    pub fn is_end(&self, i: u32) -> bool {
        self.node(i) & IS_END_BIT != 0
    }
    /// Checks whether a word ends on node `i`.
    pub fn accepts(&self, i: u32) -> bool {
        self.node(i) & ACCEPTS_BIT != 0
    }
    /// The child sibling-list index of node `i`, 0 when childless.
    pub fn arc_index(&self, i: u32) -> u32 {
        self.node(i) & ARC_INDEX_MASK
    }
    /// The tile label of node `i`.
    pub fn tile(&self, i: u32) -> u8 {
        (self.node(i) >> 24) as u8
    }

    /// The DAWG root sibling list, for word verification.
    pub fn dawg_root(&self) -> u32 {
        self.arc_index(1)
    }
    /// The GADDAG root sibling list, for move generation.
    pub fn gaddag_root(&self) -> u32 {
        self.arc_index(2)
    }

    /// Scans the sibling list at `p` for `letter`, returning the child
    /// list index, or 0 when the letter has no arc or no children.
    pub fn next_node(&self, p: u32, letter: MachineLetter) -> u32 {
        self.seek(p, letter).map(|(child, _)| child).unwrap_or(0)
    }

    /// Scans the sibling list at `p` for `letter`, returning the child
    /// list index and the acceptance bit of the matched arc.
    pub fn seek(&self, p: u32, letter: MachineLetter) -> Option<(u32, bool)> {
        if p == 0 {
            return None;
        }
        let tile = letter.unblanked().as_u8();
        let mut i = p;
        loop {
            if self.tile(i) == tile {
                return Some((self.arc_index(i), self.accepts(i)));
            }
            if self.is_end(i) {
                return None;
            }
            i += 1;
        }
    }

    /// Checks whether `letter` ends a word at the sibling list `p`.
    pub fn in_letter_set(&self, letter: MachineLetter, p: u32) -> bool {
        matches!(self.seek(p, letter), Some((_, true)))
    }

    /// The mask of letters ending a word at the sibling list `p`.
    pub fn letter_set(&self, p: u32) -> u64 {
        if p == 0 {
            return 0;
        }
        let mut set = 0;
        let mut i = p;
        loop {
            if self.accepts(i) {
                set |= 1 << self.tile(i);
            }
            if self.is_end(i) {
                break;
            }
            i += 1;
        }
        set
    }

    /// Follows `letters` from the sibling list `p`, returning the list
    /// reached after the last letter, or 0 when the path breaks off.
    pub fn follow(&self, mut p: u32, letters: &[MachineLetter]) -> u32 {
        for &ml in letters {
            p = self.next_node(p, ml);
            if p == 0 {
                return 0;
            }
        }
        p
    }

    /// Checks whether consuming `letters` from the sibling list `p`
    /// ends on an accepting arc.
    pub fn accepts_from(&self, p: u32, letters: &[MachineLetter]) -> bool {
        match letters.split_last() {
            None => false,
            Some((&last, rest)) => {
                let q = self.follow(p, rest);
                q != 0 && self.in_letter_set(last, q)
            }
        }
    }

    /// Checks a word against the DAWG.
    pub fn accepts_word(&self, word: &[MachineLetter]) -> bool {
        self.accepts_from(self.dawg_root(), word)
    }

    /// Enumerates every word accepted off the DAWG root, in
    /// lexicographic machine-letter order.
    pub fn words(&self) -> Vec<Vec<MachineLetter>> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_words(self.dawg_root(), &mut prefix, &mut out);
        out
    }

    fn collect_words(&self, p: u32, prefix: &mut Vec<MachineLetter>, out: &mut Vec<Vec<MachineLetter>>) {
        if p == 0 {
            return;
        }
        let mut i = p;
        loop {
            prefix.push(MachineLetter::new(self.tile(i)));
            if self.accepts(i) {
                out.push(prefix.clone());
            }
            self.collect_words(self.arc_index(i), prefix, out);
            prefix.pop();
            if self.is_end(i) {
                break;
            }
            i += 1;
        }
    }

    /// Walks every sibling list reachable from the roots, checking
    /// bounds, list termination and acyclicity.
    fn validate(&self) -> GameResult<()> {
        let n = self.nodes.len() as u32;
        let dawg = self.dawg_root();
        let gaddag = self.gaddag_root();
        if dawg >= n || gaddag >= n {
            return Err(GameError::InvalidKwgRoot);
        }

        // 0 = unvisited, 1 = on the current path, 2 = done.
        let mut color = vec![0u8; self.nodes.len()];
        for root in [dawg, gaddag] {
            if root != 0 {
                self.validate_list(root, n, &mut color)?;
            }
        }
        Ok(())
    }

    fn validate_list(&self, p: u32, n: u32, color: &mut [u8]) -> GameResult<()> {
        match color[p as usize] {
            2 => return Ok(()),
            1 => return Err(GameError::MalformedKwg),
            _ => color[p as usize] = 1,
        }
        let mut i = p;
        loop {
            if i >= n {
                return Err(GameError::MalformedKwg);
            }
            let child = self.arc_index(i);
            if child >= n {
                return Err(GameError::MalformedKwg);
            }
            if child != 0 {
                self.validate_list(child, n, color)?;
            }
            if self.is_end(i) {
                break;
            }
            i += 1;
        }
        color[p as usize] = 2;
        Ok(())
    }
}

/// Builds packed word graphs from plain word lists, so tests and tools
/// need no external lexicon files. Construction is canonical: the same
/// word set always produces the same blob.
#[derive(Debug, Default)]
pub struct KwgBuilder {
    words: Vec<Vec<MachineLetter>>,
}

/// An arc in a builder trie.
#[derive(Debug, Clone)]
struct BuildArc {
    tile: u8,
    accepts: bool,
    child: Option<usize>,
}

/// A trie node in the builder arena.
#[derive(Debug, Default)]
struct BuildNode {
    arcs: Vec<BuildArc>,
}

impl KwgBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a word. Duplicates are harmless.
    pub fn insert(&mut self, word: &[MachineLetter]) -> &mut Self {
        debug_assert!(!word.is_empty());
        self.words.push(word.iter().map(|ml| ml.unblanked()).collect());
        self
    }

    /// Builds the packed graph: a DAWG over the words and a GADDAG
    /// holding, for each split point `k` of each word, the path
    /// `Lk .. L1 # Lk+1 .. Ln`.
    pub fn build(&self) -> Kwg {
        let mut arena: Vec<BuildNode> = vec![BuildNode::default(), BuildNode::default()];
        let dawg_trie = 0;
        let gaddag_trie = 1;

        let mut path = Vec::with_capacity(16);
        for word in &self.words {
            Self::insert_path(&mut arena, dawg_trie, word);

            for k in 1..=word.len() {
                path.clear();
                path.extend(word[..k].iter().rev().map(|ml| ml.as_u8()));
                if k < word.len() {
                    path.push(GADDAG_SEPARATOR);
                    path.extend(word[k..].iter().map(|ml| ml.as_u8()));
                }
                Self::insert_path_raw(&mut arena, gaddag_trie, &path);
            }
        }

        // Hash-cons identical subtrees so shared suffixes collapse into
        // one state, then lay the unique states out breadth-first.
        let mut states: Vec<Vec<(u8, bool, Option<u32>)>> = Vec::new();
        let mut interned: HashMap<Vec<(u8, bool, Option<u32>)>, u32> = HashMap::new();
        let dawg_state = Self::canonicalize(&arena, dawg_trie, &mut states, &mut interned);
        let gaddag_state = Self::canonicalize(&arena, gaddag_trie, &mut states, &mut interned);

        Self::serialize(&states, dawg_state, gaddag_state)
    }

    fn insert_path(arena: &mut Vec<BuildNode>, root: usize, word: &[MachineLetter]) {
        let bytes: Vec<u8> = word.iter().map(|ml| ml.as_u8()).collect();
        Self::insert_path_raw(arena, root, &bytes);
    }

    fn insert_path_raw(arena: &mut Vec<BuildNode>, root: usize, path: &[u8]) {
        let mut node = root;
        for (i, &tile) in path.iter().enumerate() {
            let last = i + 1 == path.len();
            let pos = match arena[node].arcs.binary_search_by_key(&tile, |a| a.tile) {
                Ok(pos) => pos,
                Err(pos) => {
                    arena[node].arcs.insert(
                        pos,
                        BuildArc {
                            tile,
                            accepts: false,
                            child: None,
                        },
                    );
                    pos
                }
            };
            if last {
                arena[node].arcs[pos].accepts = true;
            } else {
                node = match arena[node].arcs[pos].child {
                    Some(child) => child,
                    None => {
                        arena.push(BuildNode::default());
                        let child = arena.len() - 1;
                        arena[node].arcs[pos].child = Some(child);
                        child
                    }
                };
            }
        }
    }

    /// Returns the unique-state id for a trie node, or `None` when the
    /// node has no arcs.
    fn canonicalize(
        arena: &[BuildNode],
        node: usize,
        states: &mut Vec<Vec<(u8, bool, Option<u32>)>>,
        interned: &mut HashMap<Vec<(u8, bool, Option<u32>)>, u32>,
    ) -> Option<u32> {
        if arena[node].arcs.is_empty() {
            return None;
        }
        let repr: Vec<(u8, bool, Option<u32>)> = arena[node]
            .arcs
            .iter()
            .map(|arc| {
                let child = arc
                    .child
                    .and_then(|c| Self::canonicalize(arena, c, states, interned));
                (arc.tile, arc.accepts, child)
            })
            .collect();

        if let Some(&id) = interned.get(&repr) {
            return Some(id);
        }
        let id = states.len() as u32;
        states.push(repr.clone());
        interned.insert(repr, id);
        Some(id)
    }

    fn serialize(
        states: &[Vec<(u8, bool, Option<u32>)>],
        dawg_state: Option<u32>,
        gaddag_state: Option<u32>,
    ) -> Kwg {
        // Breadth-first placement from the two roots gives each unique
        // state one run of consecutive sibling nodes.
        let mut placement: HashMap<u32, u32> = HashMap::new();
        let mut queue: std::collections::VecDeque<u32> = std::collections::VecDeque::new();
        let mut enqueued: std::collections::HashSet<u32> = std::collections::HashSet::new();
        for root in [dawg_state, gaddag_state].into_iter().flatten() {
            if enqueued.insert(root) {
                queue.push_back(root);
            }
        }

        let mut next_free = 3u32;
        let mut order = Vec::new();
        while let Some(state) = queue.pop_front() {
            placement.insert(state, next_free);
            next_free += states[state as usize].len() as u32;
            order.push(state);
            for &(_, _, child) in &states[state as usize] {
                if let Some(child) = child {
                    if enqueued.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
        assert!(next_free <= ARC_INDEX_MASK, "lexicon exceeds the 22-bit node space");

        let mut nodes = vec![0u32; next_free as usize];
        nodes[1] = IS_END_BIT | dawg_state.map_or(0, |s| placement[&s]);
        nodes[2] = IS_END_BIT | gaddag_state.map_or(0, |s| placement[&s]);
        for &state in &order {
            let start = placement[&state] as usize;
            let arcs = &states[state as usize];
            for (j, &(tile, accepts, child)) in arcs.iter().enumerate() {
                let mut word = (tile as u32) << 24 | child.map_or(0, |c| placement[&c]);
                if accepts {
                    word |= ACCEPTS_BIT;
                }
                if j + 1 == arcs.len() {
                    word |= IS_END_BIT;
                }
                nodes[start + j] = word;
            }
        }

        Kwg { nodes }
    }
}
