//! Hash codec and partition arithmetic.
//!
//! Hashes travel across the public surface as hex strings and are handled
//! internally as big-endian byte strings, bit 0 being the most significant
//! bit of the first byte.

/// Parse a hex hash. Upper and lower case digits are both accepted.
pub fn parse_hex(hex: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(hex)
}

/// Format a hash as lowercase hex.
pub fn format_hex(hash: &[u8]) -> String {
    hex::encode(hash)
}

/// Number of differing bits between two equal-length hashes.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[inline]
fn bit(hash: &[u8], pos: u32) -> bool {
    (hash[(pos / 8) as usize] >> (7 - pos % 8)) & 1 == 1
}

/// Split of a hash into the partitions used as index keys.
///
/// With `partitions = (max_error + 3) / 2`, two hashes within `max_error`
/// bits of each other agree exactly, or up to a single bit, on at least one
/// partition. Lookups therefore only need to probe each partition's exact
/// key and its one-bit neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioning {
    partitions: u32,
    /// Width of the narrower partitions.
    base_bits: u32,
    /// The first `wide` partitions are one bit wider than `base_bits`.
    wide: u32,
}

impl Partitioning {
    pub fn new(hash_bits: u32, max_error: u32) -> Self {
        let partitions = ((max_error + 3) / 2).clamp(1, hash_bits.max(1));
        Self {
            partitions,
            base_bits: hash_bits / partitions,
            wide: hash_bits % partitions,
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Width of the widest partition.
    pub fn partition_bits(&self) -> u32 {
        self.base_bits + u32::from(self.wide > 0)
    }

    /// Whether every hash within `max_error` bits is guaranteed to share a
    /// partition with at most one differing bit.
    pub fn covers(&self, max_error: u32) -> bool {
        self.partitions > max_error / 2
    }

    fn bounds(&self, index: u32) -> (u32, u32) {
        let start = index * self.base_bits + index.min(self.wide);
        let width = self.base_bits + u32::from(index < self.wide);
        (start, start + width)
    }

    /// Storage key for partition `index` of `hash`: the partition index as a
    /// big-endian `u16` followed by the partition's bits, left aligned.
    pub fn key(&self, hash: &[u8], index: u32) -> Vec<u8> {
        let (start, end) = self.bounds(index);
        let len = end - start;
        let mut key = vec![0u8; 2 + len.div_ceil(8) as usize];
        key[..2].copy_from_slice(&(index as u16).to_be_bytes());
        for offset in 0..len {
            if bit(hash, start + offset) {
                key[2 + (offset / 8) as usize] |= 0x80 >> (offset % 8);
            }
        }
        key
    }

    /// Every key of partition `index` that differs from `key` in one bit.
    pub fn neighbours<'a>(&self, key: &'a [u8], index: u32) -> impl Iterator<Item = Vec<u8>> + 'a {
        let (start, end) = self.bounds(index);
        (0..end - start).map(move |offset| {
            let mut flipped = key.to_vec();
            flipped[2 + (offset / 8) as usize] ^= 0x80 >> (offset % 8);
            flipped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_accepts_either_case_and_formats_lowercase() {
        let upper = parse_hex("414F2C9F12625841").unwrap();
        let lower = parse_hex("414f2c9f12625841").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(format_hex(&upper), "414f2c9f12625841");
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!(parse_hex("xyz").is_err());
        assert!(parse_hex("abc").is_err());
    }

    #[test]
    fn distance_counts_differing_bits() {
        let a = parse_hex("3CA1063EC8C29C20").unwrap();
        let b = parse_hex("3CA1063EC8C29C2C").unwrap();
        assert_eq!(hamming_distance(&a, &b), 2);
        assert_eq!(hamming_distance(&a, &a), 0);
    }

    #[test]
    fn partitioning_for_64_bits_and_5_errors() {
        let p = Partitioning::new(64, 5);
        assert_eq!(p.partitions(), 4);
        assert_eq!(p.partition_bits(), 16);
        assert!(p.covers(5));
    }

    #[test]
    fn uneven_split_keeps_every_partition() {
        // 8 bits over 5 partitions: 2 + 2 + 2 + 1 + 1.
        let p = Partitioning::new(8, 7);
        assert_eq!(p.partitions(), 5);
        assert_eq!(p.partition_bits(), 2);
        assert!(p.covers(7));
        let widths: Vec<u32> = (0..5).map(|i| p.bounds(i).1 - p.bounds(i).0).collect();
        assert_eq!(widths, vec![2, 2, 2, 1, 1]);
        assert_eq!(p.bounds(4).1, 8);
    }

    #[test]
    fn every_max_error_is_covered_for_64_bits() {
        for max_error in 1..64 {
            let p = Partitioning::new(64, max_error);
            assert_eq!(p.partitions(), (max_error + 3) / 2, "max_error {max_error}");
            assert!(p.covers(max_error), "max_error {max_error}");
            let mut next = 0;
            for index in 0..p.partitions() {
                let (start, end) = p.bounds(index);
                assert_eq!(start, next, "max_error {max_error} partition {index}");
                assert!(end > start);
                next = end;
            }
            assert_eq!(next, 64, "max_error {max_error}");
        }
    }

    #[test]
    fn key_extracts_partition_bits() {
        let p = Partitioning::new(16, 1);
        assert_eq!(p.partitions(), 2);
        let hash = [0xAB, 0xCD];
        assert_eq!(p.key(&hash, 0), vec![0, 0, 0xAB]);
        assert_eq!(p.key(&hash, 1), vec![0, 1, 0xCD]);
    }

    #[test]
    fn key_handles_unaligned_partitions() {
        // 3 partitions over 16 bits: 6 + 5 + 5.
        let p = Partitioning::new(16, 3);
        assert_eq!(p.partitions(), 3);
        let hash = [0b1111_0000, 0b1010_1010];
        assert_eq!(p.key(&hash, 0), vec![0, 0, 0b1111_0000]);
        assert_eq!(p.key(&hash, 1), vec![0, 1, 0b0010_1000]);
        assert_eq!(p.key(&hash, 2), vec![0, 2, 0b0101_0000]);
    }

    #[test]
    fn neighbours_flip_one_bit_each() {
        let p = Partitioning::new(16, 1);
        let key = p.key(&[0x00, 0xFF], 0);
        let neighbours: Vec<_> = p.neighbours(&key, 0).collect();
        assert_eq!(neighbours.len(), 8);
        for n in &neighbours {
            assert_eq!(hamming_distance(&n[2..], &key[2..]), 1);
            assert_eq!(&n[..2], &key[..2]);
        }
    }
}
