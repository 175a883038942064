//! The word map: direct rack-to-anagram lookup keyed on packed racks.

use crate::{
    error::{GameError, GameResult},
    game::{
        board::BOARD_DIM,
        tile::{LetterDistribution, MachineLetter},
    },
    util::bit_rack::BitRack,
};
use log::debug;
use std::collections::BTreeMap;

/// The only supported blob version.
pub const WMP_VERSION: u8 = 3;
/// Bytes of one serialized entry: a 12-byte quotient plus a 16-byte
/// payload.
const ENTRY_BYTES: usize = 28;
/// Payload bytes available for inlined anagram sets.
const INLINE_BYTES: usize = 16;
/// Bucket counts never drop below this prime so that every quotient
/// fits the 12 bytes an entry stores.
const MIN_BUCKETS: u32 = 4099;

/// One parsed entry: the quotient of the packed rack and either an
/// inlined anagram set or a span of the shared letter blob.
#[derive(Debug, Clone)]
struct WmpEntry {
    quotient: [u8; 12],
    payload: [u8; INLINE_BYTES],
}

impl WmpEntry {
    /// The anagram letters of this entry, resolved against the shared
    /// blob when the payload is a pointer.
    fn letters<'a>(&'a self, word_len: usize, blob: &'a [u8]) -> &'a [u8] {
        if self.payload[..8].iter().all(|&b| b == 0) {
            let start = u32::from_le_bytes(self.payload[8..12].try_into().unwrap()) as usize;
            let num = u32::from_le_bytes(self.payload[12..16].try_into().unwrap()) as usize;
            &blob[start..start + num * word_len]
        } else {
            let mut used = 0;
            while used + word_len <= INLINE_BYTES && self.payload[used] != 0 {
                used += word_len;
            }
            &self.payload[..used]
        }
    }
}

/// The per-length hash sub-table.
#[derive(Debug, Clone, Default)]
struct WmpForLength {
    num_buckets: u32,
    bucket_starts: Vec<u32>,
    entries: Vec<WmpEntry>,
    letters: Vec<u8>,
}

impl WmpForLength {
    fn lookup(&self, rack: BitRack, word_len: usize) -> Option<&[u8]> {
        if self.num_buckets == 0 {
            return None;
        }
        let (quotient, bucket) = rack.div_mod(self.num_buckets);
        let quotient = quotient.to_quotient_bytes();
        let start = self.bucket_starts[bucket as usize] as usize;
        let end = self.bucket_starts[bucket as usize + 1] as usize;
        self.entries[start..end]
            .iter()
            .find(|e| e.quotient == quotient)
            .map(|e| e.letters(word_len, &self.letters))
    }
}

/// An immutable rack-to-anagram map. For each (packed rack, word
/// length) pair it stores the concatenated letters of every word
/// spellable from exactly those tiles. Queries with one or two blanks
/// are answered by substituting designation letters and re-probing the
/// blank-free table.
#[derive(Debug, Clone)]
pub struct Wmp {
    min_word_len: u8,
    max_word_len: u8,
    max_blank_pair_bytes: u32,
    max_word_lookup_bytes: u32,
    by_len: Vec<WmpForLength>,
}

impl Wmp {
    /// Decodes a version-3 blob.
    pub fn from_bytes(bytes: &[u8]) -> GameResult<Self> {
        let mut r = Reader { bytes, at: 0 };
        let version = r.u8()?;
        if version != WMP_VERSION {
            return Err(GameError::UnsupportedWmpVersion(version));
        }
        let board_dim = r.u8()?;
        if board_dim as usize != BOARD_DIM {
            return Err(GameError::MalformedWmp);
        }
        let min_word_len = r.u8()?;
        let max_word_len = r.u8()?;
        let max_blank_pair_bytes = r.u32()?;
        let max_word_lookup_bytes = r.u32()?;

        let mut by_len = vec![WmpForLength::default(); BOARD_DIM + 1];
        for (len, table) in by_len.iter_mut().enumerate().take(BOARD_DIM + 1).skip(2) {
            let num_buckets = r.u32()?;
            let mut bucket_starts = Vec::with_capacity(num_buckets as usize + 1);
            for _ in 0..=num_buckets {
                bucket_starts.push(r.u32()?);
            }
            let num_entries = r.u32()?;
            if *bucket_starts.last().unwrap_or(&0) != num_entries {
                return Err(GameError::MalformedWmp);
            }
            if bucket_starts.windows(2).any(|w| w[0] > w[1]) {
                return Err(GameError::MalformedWmp);
            }

            let mut entries = Vec::with_capacity(num_entries as usize);
            let mut blob_len = 0usize;
            for _ in 0..num_entries {
                let raw = r.take(ENTRY_BYTES)?;
                let entry = WmpEntry {
                    quotient: raw[..12].try_into().unwrap(),
                    payload: raw[12..].try_into().unwrap(),
                };
                if entry.payload[..8].iter().all(|&b| b == 0) {
                    let start =
                        u32::from_le_bytes(entry.payload[8..12].try_into().unwrap()) as usize;
                    let num =
                        u32::from_le_bytes(entry.payload[12..16].try_into().unwrap()) as usize;
                    blob_len = blob_len.max(start + num * len);
                }
                entries.push(entry);
            }
            let letters = r.take(blob_len)?.to_vec();

            *table = WmpForLength {
                num_buckets,
                bucket_starts,
                entries,
                letters,
            };
        }
        if !r.done() {
            return Err(GameError::MalformedWmp);
        }

        debug!(
            "loaded wmp: word lengths {}..={}, lookup buffer {} bytes",
            min_word_len, max_word_len, max_word_lookup_bytes
        );
        Ok(Self {
            min_word_len,
            max_word_len,
            max_blank_pair_bytes,
            max_word_lookup_bytes,
            by_len,
        })
    }

    /// Re-encodes the map.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(WMP_VERSION);
        out.push(BOARD_DIM as u8);
        out.push(self.min_word_len);
        out.push(self.max_word_len);
        out.extend_from_slice(&self.max_blank_pair_bytes.to_le_bytes());
        out.extend_from_slice(&self.max_word_lookup_bytes.to_le_bytes());
        for table in self.by_len.iter().skip(2) {
            out.extend_from_slice(&table.num_buckets.to_le_bytes());
            if table.bucket_starts.is_empty() {
                // An absent length still carries its single bucket edge.
                out.extend_from_slice(&0u32.to_le_bytes());
            }
            for &start in &table.bucket_starts {
                out.extend_from_slice(&start.to_le_bytes());
            }
            out.extend_from_slice(&(table.entries.len() as u32).to_le_bytes());
            for entry in &table.entries {
                out.extend_from_slice(&entry.quotient);
                out.extend_from_slice(&entry.payload);
            }
            out.extend_from_slice(&table.letters);
        }
        out
    }

    /// The shortest word length stored.
    pub fn min_word_len(&self) -> usize {
        self.min_word_len as usize
    }
    /// The longest word length stored.
    pub fn max_word_len(&self) -> usize {
        self.max_word_len as usize
    }
    /// An upper bound in bytes on any single lookup result.
    pub fn max_word_lookup_bytes(&self) -> usize {
        self.max_word_lookup_bytes as usize
    }

    /// Appends the concatenated letters of every word spellable from
    /// exactly the tiles of `rack` (no blanks) at `word_len`, returning
    /// the number of words appended.
    pub fn words_into(&self, rack: BitRack, word_len: usize, out: &mut Vec<u8>) -> usize {
        debug_assert_eq!(rack.count(MachineLetter::blank()), 0);
        if word_len < 2 || word_len > BOARD_DIM {
            return 0;
        }
        match self.by_len[word_len].lookup(rack, word_len) {
            Some(letters) => {
                out.extend_from_slice(letters);
                letters.len() / word_len
            }
            None => 0,
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> GameResult<&'a [u8]> {
        if self.at + n > self.bytes.len() {
            return Err(GameError::MalformedWmp);
        }
        let slice = &self.bytes[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }
    fn u8(&mut self) -> GameResult<u8> {
        Ok(self.take(1)?[0])
    }
    fn u32(&mut self) -> GameResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn done(&self) -> bool {
        self.at == self.bytes.len()
    }
}

/// Builds a word map from a plain word list. Construction is
/// canonical: the same word set always produces the same blob.
#[derive(Debug, Default)]
pub struct WmpBuilder {
    words: Vec<Vec<MachineLetter>>,
}

impl WmpBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }
    /// Adds a word.
    pub fn insert(&mut self, word: &[MachineLetter]) -> &mut Self {
        self.words.push(word.iter().map(|ml| ml.unblanked()).collect());
        self
    }
    /// Adds every word of a display-string list.
    pub fn insert_all(&mut self, ld: &LetterDistribution, words: &[&str]) -> GameResult<&mut Self> {
        for word in words {
            self.insert(&ld.str_to_mls(word)?);
        }
        Ok(self)
    }

    /// Builds the map.
    pub fn build(&self) -> Wmp {
        let mut min_word_len = 0u8;
        let mut max_word_len = 0u8;
        let mut max_word_lookup_bytes = 0u32;
        let mut by_len = vec![WmpForLength::default(); BOARD_DIM + 1];

        for len in 2..=BOARD_DIM {
            // Group anagram sets; BTreeMap keeps construction canonical.
            let mut groups: BTreeMap<u128, Vec<&[MachineLetter]>> = BTreeMap::new();
            for word in &self.words {
                if word.len() == len {
                    groups
                        .entry(BitRack::from_word(word).value())
                        .or_default()
                        .push(word);
                }
            }
            if groups.is_empty() {
                continue;
            }
            for set in groups.values_mut() {
                set.sort();
                set.dedup();
            }

            if min_word_len == 0 {
                min_word_len = len as u8;
            }
            max_word_len = len as u8;

            let num_buckets = next_prime((groups.len() as u32).max(MIN_BUCKETS));
            let mut buckets: Vec<Vec<(BitRack, &[&[MachineLetter]])>> =
                vec![Vec::new(); num_buckets as usize];
            for (&value, set) in groups.iter() {
                let (quotient, bucket) = BitRack::from_value(value).div_mod(num_buckets);
                buckets[bucket as usize].push((quotient, set.as_slice()));
            }

            let mut bucket_starts = Vec::with_capacity(num_buckets as usize + 1);
            let mut entries = Vec::new();
            let mut letters = Vec::new();
            bucket_starts.push(0);
            for bucket in &buckets {
                for &(quotient, set) in bucket {
                    let total_bytes = set.len() * len;
                    max_word_lookup_bytes = max_word_lookup_bytes.max(total_bytes as u32);
                    let mut payload = [0u8; INLINE_BYTES];
                    if total_bytes <= INLINE_BYTES {
                        let mut at = 0;
                        for word in set {
                            for &ml in word.iter() {
                                payload[at] = ml.as_u8();
                                at += 1;
                            }
                        }
                    } else {
                        payload[8..12].copy_from_slice(&(letters.len() as u32).to_le_bytes());
                        payload[12..16].copy_from_slice(&(set.len() as u32).to_le_bytes());
                        for word in set {
                            letters.extend(word.iter().map(|ml| ml.as_u8()));
                        }
                    }
                    entries.push(WmpEntry {
                        quotient: quotient.to_quotient_bytes(),
                        payload,
                    });
                }
                bucket_starts.push(entries.len() as u32);
            }

            by_len[len] = WmpForLength {
                num_buckets,
                bucket_starts,
                entries,
                letters,
            };
        }

        Wmp {
            min_word_len,
            max_word_len,
            max_blank_pair_bytes: 0,
            max_word_lookup_bytes,
            by_len,
        }
    }
}

fn next_prime(n: u32) -> u32 {
    let mut candidate = if n % 2 == 0 { n + 1 } else { n };
    loop {
        let mut is_prime = candidate > 1;
        let mut f = 3;
        while f * f <= candidate {
            if candidate % f == 0 {
                is_prime = false;
                break;
            }
            f += 2;
        }
        if is_prime {
            return candidate;
        }
        candidate += 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wmp_of(words: &[&str]) -> Wmp {
        let ld = LetterDistribution::english();
        let mut builder = WmpBuilder::new();
        builder.insert_all(&ld, words).unwrap();
        builder.build()
    }

    fn rack_bits(s: &str) -> BitRack {
        let ld = LetterDistribution::english();
        BitRack::from_word(&ld.str_to_mls(s).unwrap())
    }

    fn decode(ld: &LetterDistribution, bytes: &[u8], len: usize) -> Vec<String> {
        bytes
            .chunks(len)
            .map(|word| {
                word.iter()
                    .map(|&b| ld.ml_to_char(MachineLetter::new(b)))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn anagram_sets_come_back() {
        let ld = LetterDistribution::english();
        let wmp = wmp_of(&["EAT", "ETA", "TEA", "TEN", "NET", "CARE", "RACE"]);

        let mut out = Vec::new();
        let n = wmp.words_into(rack_bits("AET"), 3, &mut out);
        assert_eq!(n, 3);
        assert_eq!(decode(&ld, &out, 3), vec!["EAT", "ETA", "TEA"]);

        out.clear();
        let n = wmp.words_into(rack_bits("ACER"), 4, &mut out);
        assert_eq!(n, 2);
        assert_eq!(decode(&ld, &out, 4), vec!["CARE", "RACE"]);

        out.clear();
        assert_eq!(wmp.words_into(rack_bits("XYZ"), 3, &mut out), 0);
    }

    #[test]
    fn long_sets_spill_to_the_letter_blob() {
        let ld = LetterDistribution::english();
        // Six 3-letter "words" of one anagram class: 18 bytes > 16.
        let wmp = wmp_of(&["APS", "ASP", "PAS", "SAP", "SPA", "PSA"]);
        let mut out = Vec::new();
        let n = wmp.words_into(rack_bits("APS"), 3, &mut out);
        assert_eq!(n, 6);
        assert!(decode(&ld, &out, 3).contains(&"SPA".to_string()));
    }

    #[test]
    fn blob_round_trip() {
        let wmp = wmp_of(&["EAT", "TEA", "QI", "JAMBOREE", "CARE", "RACE"]);
        let bytes = wmp.to_bytes();
        let loaded = Wmp::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.to_bytes(), bytes);

        let mut out = Vec::new();
        assert_eq!(loaded.words_into(rack_bits("ABEEJMOR"), 8, &mut out), 1);
        assert_eq!(loaded.min_word_len(), 2);
        assert_eq!(loaded.max_word_len(), 8);
    }

    #[test]
    fn version_and_shape_are_validated() {
        let wmp = wmp_of(&["EAT"]);
        let mut bytes = wmp.to_bytes();
        bytes[0] = 2;
        assert_eq!(
            Wmp::from_bytes(&bytes).unwrap_err(),
            GameError::UnsupportedWmpVersion(2)
        );
        assert_eq!(
            Wmp::from_bytes(&wmp.to_bytes()[..10]).unwrap_err(),
            GameError::MalformedWmp
        );
    }
}
