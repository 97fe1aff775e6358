// set.rs — growable bit set with an "inverted" membership flag
//
// Bits are stored in 64-bit words. Byte k of the bitmap (as read/written by
// the visibility codec) holds bits 8k..8k+7, least significant bit first,
// independent of host endianness.

pub type SetBits = u64;

pub const SET_BITS: usize = SetBits::BITS as usize;

/// Number of bits allocated for a set that must hold `x` elements.
/// Always leaves room for at least one spare bit.
#[inline]
pub const fn set_size(x: usize) -> usize {
    (x + SET_BITS) & !(SET_BITS - 1)
}

/// Bit set over `[0, size)`.
///
/// When `inverted` is false, a one bit marks a member. When it is true, a
/// zero bit marks a member. The raw-bit accessors (`iter`, `count`, the byte
/// import/export) ignore the flag; `add`, `remove` and `is_member` honor it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Set {
    map: Vec<SetBits>,
    pub inverted: bool,
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl Set {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(bits: usize) -> Self {
        Self {
            map: vec![0; set_size(bits) / SET_BITS],
            inverted: false,
        }
    }

    /// Allocated size in bits.
    #[inline]
    pub fn size(&self) -> usize {
        self.map.len() * SET_BITS
    }

    #[inline]
    pub fn words(&self) -> &[SetBits] {
        &self.map
    }

    /// Grow the bitmap to hold at least `x` elements. Never shrinks.
    pub fn expand(&mut self, x: usize) -> &mut Self {
        let words = set_size(x) / SET_BITS;
        if words > self.map.len() {
            self.map.resize(words, 0);
        }
        self
    }

    /// Clear every bit. The inverted flag is left alone.
    pub fn empty(&mut self) -> &mut Self {
        self.map.fill(0);
        self
    }

    pub fn add(&mut self, x: usize) -> &mut Self {
        if x >= self.size() {
            self.expand(x);
        }
        let mask: SetBits = 1 << (x % SET_BITS);
        if self.inverted {
            self.map[x / SET_BITS] &= !mask;
        } else {
            self.map[x / SET_BITS] |= mask;
        }
        self
    }

    pub fn remove(&mut self, x: usize) -> &mut Self {
        if x >= self.size() {
            self.expand(x);
        }
        let mask: SetBits = 1 << (x % SET_BITS);
        if self.inverted {
            self.map[x / SET_BITS] |= mask;
        } else {
            self.map[x / SET_BITS] &= !mask;
        }
        self
    }

    pub fn is_member(&self, x: usize) -> bool {
        if x >= self.size() {
            return self.inverted;
        }
        let bit = self.map[x / SET_BITS] & (1 << (x % SET_BITS)) != 0;
        bit != self.inverted
    }

    /// Number of one bits.
    pub fn count(&self) -> usize {
        self.map.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True when no bit is set.
    pub fn is_clear(&self) -> bool {
        self.map.iter().all(|&w| w == 0)
    }

    /// Force every bit at or above `numbits` to zero.
    pub fn mask_tail(&mut self, numbits: usize) {
        let full = numbits / SET_BITS;
        let rem = numbits % SET_BITS;
        let mut start = full;
        if rem != 0 && full < self.map.len() {
            self.map[full] &= (1 << rem) - 1;
            start += 1;
        }
        if start < self.map.len() {
            self.map[start..].fill(0);
        }
    }

    /// Set every byte of the bitmap to `byte`.
    pub fn fill_bytes(&mut self, byte: u8) {
        let word = SetBits::from_le_bytes([byte; SET_BITS / 8]);
        self.map.fill(word);
    }

    /// Export the first `out.len()` bytes of the bitmap.
    pub fn copy_to_bytes(&self, out: &mut [u8]) {
        for (k, b) in out.iter_mut().enumerate() {
            let word = self.map.get(k / 8).copied().unwrap_or(0);
            *b = (word >> ((k % 8) * 8)) as u8;
        }
    }

    /// Overwrite the first `bytes.len()` bytes of the bitmap, growing it if
    /// needed. Bytes beyond are left untouched.
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) {
        if bytes.len() * 8 > self.size() {
            self.expand(bytes.len() * 8);
        }
        for (k, &b) in bytes.iter().enumerate() {
            let shift = (k % 8) * 8;
            let word = &mut self.map[k / 8];
            *word = (*word & !(0xff << shift)) | ((b as SetBits) << shift);
        }
    }

    /// Ascending indices of the one bits. For an inverted set these are the
    /// non-members.
    pub fn iter(&self) -> SetIter<'_> {
        SetIter {
            map: &self.map,
            word: 0,
            bits: self.map.first().copied().unwrap_or(0),
        }
    }
}

pub struct SetIter<'a> {
    map: &'a [SetBits],
    word: usize,
    bits: SetBits,
}

impl Iterator for SetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.bits != 0 {
                let bit = self.bits.trailing_zeros() as usize;
                self.bits &= self.bits - 1;
                return Some(self.word * SET_BITS + bit);
            }
            self.word += 1;
            if self.word >= self.map.len() {
                return None;
            }
            self.bits = self.map[self.word];
        }
    }
}

impl<'a> IntoIterator for &'a Set {
    type Item = usize;
    type IntoIter = SetIter<'a>;

    fn into_iter(self) -> SetIter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_size_leaves_spare_bit() {
        assert_eq!(set_size(0), 64);
        assert_eq!(set_size(63), 64);
        assert_eq!(set_size(64), 128);
        assert_eq!(set_size(100), 128);
    }

    #[test]
    fn test_add_and_member() {
        let mut set = Set::new();
        set.add(3).add(64).add(200);
        assert!(set.is_member(3));
        assert!(set.is_member(64));
        assert!(set.is_member(200));
        assert!(!set.is_member(4));
        assert!(!set.is_member(10_000));
        assert!(set.size() >= 201);
        assert_eq!(set.count(), 3);
    }

    #[test]
    fn test_expand_never_shrinks() {
        let mut set = Set::with_capacity(500);
        let size = set.size();
        set.expand(10);
        assert_eq!(set.size(), size);
    }

    #[test]
    fn test_empty_keeps_inverted() {
        let mut set = Set::with_capacity(10);
        set.inverted = true;
        set.fill_bytes(0xff);
        set.empty();
        assert!(set.inverted);
        assert!(set.is_clear());
        // zero bits are members of an inverted set
        assert!(set.is_member(5));
    }

    #[test]
    fn test_inverted_add_remove() {
        let mut set = Set::with_capacity(16);
        set.inverted = true;
        set.remove(7);
        assert!(!set.is_member(7));
        set.add(7);
        assert!(set.is_member(7));
    }

    #[test]
    fn test_iter_ascending() {
        let mut set = Set::with_capacity(300);
        for &i in &[299, 0, 63, 64, 128, 5] {
            set.add(i);
        }
        let got: Vec<usize> = set.iter().collect();
        assert_eq!(got, vec![0, 5, 63, 64, 128, 299]);
        // restartable
        let again: Vec<usize> = (&set).into_iter().collect();
        assert_eq!(got, again);
    }

    #[test]
    fn test_mask_tail() {
        let mut set = Set::with_capacity(70);
        set.fill_bytes(0xff);
        set.mask_tail(70);
        assert_eq!(set.count(), 70);
        assert!(set.is_member(69));
        assert!(!set.is_member(70));
    }

    #[test]
    fn test_mask_tail_on_word_boundary() {
        let mut set = Set::with_capacity(64);
        set.fill_bytes(0xff);
        set.mask_tail(64);
        assert_eq!(set.count(), 64);
        assert!(!set.is_member(64));
    }

    #[test]
    fn test_byte_order() {
        let mut set = Set::with_capacity(24);
        set.copy_from_bytes(&[0x01, 0x80, 0x00]);
        assert!(set.is_member(0));
        assert!(set.is_member(15));
        assert_eq!(set.count(), 2);

        let mut out = [0u8; 3];
        set.copy_to_bytes(&mut out);
        assert_eq!(out, [0x01, 0x80, 0x00]);
    }

    #[test]
    fn test_copy_from_bytes_preserves_rest() {
        let mut set = Set::with_capacity(128);
        set.add(100);
        set.copy_from_bytes(&[0xff]);
        assert!(set.is_member(100));
        assert!(set.is_member(7));
        assert!(!set.is_member(8));
    }
}
