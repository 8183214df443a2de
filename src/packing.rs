//! Bit packing of binary rasters into 64-bit display words.
//!
//! The display addresses memory in pages of up to 64 pixels. Images that fit
//! within one page horizontally are packed one word per row. Wider images
//! are rotated a quarter turn so that each word holds one column instead.

use serde::{Deserialize, Serialize};

use crate::raster::BinaryRaster;

/// Layout of the words in a packed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackingMode {
    /// One word per row, column 0 in the most significant active bit.
    RowMajor64,
    /// One word per column, row 0 in the most significant active bit.
    ColumnMajor64Rotated,
}

impl PackingMode {
    /// Picks the layout for an image `width` pixels wide on a display whose
    /// pages are `page_bits` wide.
    pub fn select(width: u32, page_bits: u32) -> Self {
        if width > page_bits {
            PackingMode::ColumnMajor64Rotated
        } else {
            PackingMode::RowMajor64
        }
    }

    /// Name of the preprocessor symbol the display driver switches on.
    pub fn label(self) -> &'static str {
        match self {
            PackingMode::RowMajor64 => "MODE_64BIT",
            PackingMode::ColumnMajor64Rotated => "MODE_64BIT_ROT",
        }
    }

    /// Template keyword naming the dimension that counts words per frame.
    pub fn stride_keyword(self) -> &'static str {
        match self {
            PackingMode::RowMajor64 => "MOVIE_HEIGHT",
            PackingMode::ColumnMajor64Rotated => "MOVIE_WIDTH",
        }
    }

    pub fn words_per_frame(self, width: u32, height: u32) -> usize {
        match self {
            PackingMode::RowMajor64 => height as usize,
            PackingMode::ColumnMajor64Rotated => width as usize,
        }
    }
}

/// One frame worth of packed words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    mode: PackingMode,
    words: Vec<u64>,
}

impl PackedFrame {
    pub fn mode(&self) -> PackingMode {
        self.mode
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Renders the frame as a brace-delimited list of hex literals.
    pub fn to_literal(&self) -> String {
        let words: Vec<String> = self.words.iter().map(|w| format!("{w:#x}")).collect();
        format!("  {{{}}}", words.join(","))
    }
}

/// Packs `raster` using `mode`.
///
/// Rotated packing expects the raster to be at most 64 rows high; taller
/// rasters lose their leading rows.
pub fn pack(raster: &BinaryRaster, mode: PackingMode) -> PackedFrame {
    let (width, height) = (raster.width(), raster.height());
    let words = match mode {
        PackingMode::RowMajor64 => (0..height)
            .map(|row| {
                (0..width).fold(0u64, |word, col| (word << 1) | u64::from(raster.get(row, col)))
            })
            .collect(),
        PackingMode::ColumnMajor64Rotated => (0..width)
            .map(|col| {
                (0..height).fold(0u64, |word, row| (word << 1) | u64::from(raster.get(row, col)))
            })
            .collect(),
    };
    PackedFrame { mode, words }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn raster_from(width: u32, height: u32, cells: &[bool]) -> BinaryRaster {
        BinaryRaster::from_fn(width, height, |row, col| cells[(row * width + col) as usize])
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(PackingMode::select(64, 64), PackingMode::RowMajor64);
        assert_eq!(PackingMode::select(65, 64), PackingMode::ColumnMajor64Rotated);
        assert_eq!(PackingMode::select(1, 64), PackingMode::RowMajor64);
    }

    #[test]
    fn test_single_unlit_cell_row_major() {
        let raster = BinaryRaster::from_fn(8, 8, |row, col| !(row == 3 && col == 5));
        let packed = pack(&raster, PackingMode::RowMajor64);

        assert_eq!(packed.len(), 8);
        for (row, word) in packed.words().iter().enumerate() {
            if row == 3 {
                assert_eq!(*word, 0b1111_0111);
                assert_eq!(*word, 0xFFFF_FFFF_FFFF_FFF7 & 0xff);
            } else {
                assert_eq!(*word, 0xff);
            }
        }
    }

    #[test]
    fn test_column_zero_is_most_significant() {
        let raster = BinaryRaster::from_fn(5, 1, |_, col| col == 0);
        let packed = pack(&raster, PackingMode::RowMajor64);
        assert_eq!(packed.words(), &[0b10000]);
    }

    #[test]
    fn test_rotated_row_zero_is_most_significant() {
        // 70 wide, 3 high; only the top-left pixel and the bottom-right pixel lit.
        let raster = BinaryRaster::from_fn(70, 3, |row, col| {
            (row == 0 && col == 0) || (row == 2 && col == 69)
        });
        let packed = pack(&raster, PackingMode::ColumnMajor64Rotated);

        assert_eq!(packed.len(), 70);
        assert_eq!(packed.words()[0], 0b100);
        assert_eq!(packed.words()[69], 0b001);
        assert!(packed.words()[1..69].iter().all(|w| *w == 0));
    }

    #[test]
    fn test_full_width_row_uses_every_bit() {
        let raster = BinaryRaster::from_fn(64, 2, |_, _| true);
        let packed = pack(&raster, PackingMode::RowMajor64);
        assert_eq!(packed.words(), &[u64::MAX, u64::MAX]);
    }

    #[test]
    fn test_literal_rendering() {
        let raster = raster_from(4, 2, &[true, false, false, true, false, false, false, false]);
        let packed = pack(&raster, PackingMode::RowMajor64);
        assert_eq!(packed.to_literal(), "  {0x9,0x0}");
    }

    proptest! {
        #[test]
        fn row_major_bits_stay_within_width(
            width in 1u32..=64,
            height in 1u32..=16,
            seed in any::<u64>(),
        ) {
            let raster = BinaryRaster::from_fn(width, height, |row, col| {
                (seed.rotate_left(row * 7 + col) & 1) == 1
            });
            let packed = pack(&raster, PackingMode::RowMajor64);
            prop_assert_eq!(packed.len(), height as usize);
            for word in packed.words() {
                if width < 64 {
                    prop_assert_eq!(word >> width, 0);
                }
            }
        }

        #[test]
        fn rotated_bits_stay_within_height(
            width in 65u32..=160,
            height in 1u32..=64,
            seed in any::<u64>(),
        ) {
            let raster = BinaryRaster::from_fn(width, height, |row, col| {
                (seed.rotate_left(row * 3 + col) & 1) == 1
            });
            let packed = pack(&raster, PackingMode::ColumnMajor64Rotated);
            prop_assert_eq!(packed.len(), width as usize);
            for word in packed.words() {
                if height < 64 {
                    prop_assert_eq!(word >> height, 0);
                }
            }
        }

        #[test]
        fn uniform_rasters_pack_to_uniform_words(
            width in 1u32..=160,
            height in 1u32..=64,
            lit in any::<bool>(),
        ) {
            let mode = PackingMode::select(width, 64);
            let raster = BinaryRaster::from_fn(width, height, |_, _| lit);
            let packed = pack(&raster, mode);
            let active = match mode {
                PackingMode::RowMajor64 => width,
                PackingMode::ColumnMajor64Rotated => height,
            };
            let all_set = if active == 64 { u64::MAX } else { (1u64 << active) - 1 };
            let expected = if lit { all_set } else { 0 };
            prop_assert!(packed.words().iter().all(|w| *w == expected));
        }
    }
}
