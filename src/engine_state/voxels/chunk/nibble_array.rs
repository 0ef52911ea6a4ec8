//! Packed 4-bit per-cell storage used for water and light levels.

/// A flat array of 4-bit values, two cells per byte.
///
/// Even indices live in the low nibble, odd indices in the high nibble.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NibbleArray {
    data: Vec<u8>,
}

impl NibbleArray {
    /// Creates an array of `len` zeroed cells.
    pub fn new(len: usize) -> Self {
        NibbleArray {
            data: vec![0; len.div_ceil(2)],
        }
    }

    /// Reads the value at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        let byte = self.data[index >> 1];
        if index & 1 == 0 {
            byte & 0x0F
        } else {
            byte >> 4
        }
    }

    /// Writes `value` (masked to 4 bits) at `index`.
    #[inline]
    pub fn set(&mut self, index: usize, value: u8) {
        let value = value & 0x0F;
        let byte = &mut self.data[index >> 1];
        if index & 1 == 0 {
            *byte = (*byte & 0xF0) | value;
        } else {
            *byte = (*byte & 0x0F) | (value << 4);
        }
    }

    /// Zeroes every cell.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// True when every cell is zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|byte| *byte == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbouring_cells_do_not_clobber_each_other() {
        let mut nibbles = NibbleArray::new(5);
        nibbles.set(0, 7);
        nibbles.set(1, 15);
        nibbles.set(4, 3);
        assert_eq!(nibbles.get(0), 7);
        assert_eq!(nibbles.get(1), 15);
        assert_eq!(nibbles.get(2), 0);
        assert_eq!(nibbles.get(4), 3);

        nibbles.set(1, 0x1F);
        assert_eq!(nibbles.get(1), 15);
        assert_eq!(nibbles.get(0), 7);

        nibbles.clear();
        assert!(nibbles.is_zero());
    }
}
