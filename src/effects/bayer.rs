/// 4x4 Bayer index matrix, row-major, indexed by `(y & 3) * 4 + (x & 3)`.
pub const BAYER_4X4: [u8; 16] = [
    0, 8, 2, 10, //
    12, 4, 14, 6, //
    3, 11, 1, 9, //
    15, 7, 13, 5,
];

#[inline]
pub fn bayer_index(x: u32, y: u32) -> u8 {
    BAYER_4X4[(((y & 3) << 2) + (x & 3)) as usize]
}

/// Centered threshold in `(-0.5, 0.5)`: `(index + 0.5) / 16 - 0.5`.
#[inline]
pub fn bayer_threshold(x: u32, y: u32) -> f32 {
    (f32::from(bayer_index(x, y)) + 0.5) / 16.0 - 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_is_a_permutation_of_0_to_15() {
        let mut seen = [false; 16];
        for &v in &BAYER_4X4 {
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn thresholds_are_symmetric_and_tile() {
        assert_eq!(bayer_threshold(0, 0), -0.46875);
        assert_eq!(bayer_threshold(0, 3), 0.46875);
        assert_eq!(bayer_threshold(5, 6), bayer_threshold(1, 2));
        let sum: f32 = (0..4)
            .flat_map(|y| (0..4).map(move |x| bayer_threshold(x, y)))
            .sum();
        assert!(sum.abs() < 1e-6);
    }
}
