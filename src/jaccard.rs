//! Pairwise Jaccard distance kernel over bit-packed presence vectors.

use rayon::prelude::*;

use crate::table::PackedView;

/// `1 - |A∩B| / |A∪B|` via AND/OR popcounts over the packed words.
///
/// Two vectors with an empty union are defined as maximally dissimilar
/// (distance 1.0), not an error.
#[inline]
pub fn jaccard_distance(a: &[u64], b: &[u64]) -> f32 {
    let mut inter = 0u64;
    let mut union = 0u64;
    for (&wa, &wb) in a.iter().zip(b) {
        inter += (wa & wb).count_ones() as u64;
        union += (wa | wb).count_ones() as u64;
    }
    if union == 0 {
        1.0
    } else {
        1.0 - inter as f32 / union as f32
    }
}

/// Dense `ni x nj` row-major tile of distances between two packed blocks.
///
/// Pure: no side effects; tile rows are computed independently on the
/// rayon pool. For a self-pair (`same_block`) the diagonal is exactly 0
/// (no floating-point roundoff on self-comparisons) and only the upper
/// triangle is computed, then mirrored.
pub fn jaccard_tile(a: PackedView<'_>, b: PackedView<'_>, same_block: bool) -> Vec<f32> {
    let ni = a.num_samples();
    let nj = b.num_samples();
    let mut tile = vec![0.0f32; ni * nj];
    if tile.is_empty() {
        return tile;
    }

    if same_block {
        debug_assert_eq!(ni, nj);
        tile.par_chunks_mut(nj).enumerate().for_each(|(i, row)| {
            let wa = a.sample_words(i);
            for j in (i + 1)..nj {
                row[j] = jaccard_distance(wa, b.sample_words(j));
            }
        });
        // mirror the upper triangle; the diagonal stays 0
        for i in 0..ni {
            for j in (i + 1)..nj {
                tile[j * nj + i] = tile[i * nj + j];
            }
        }
    } else {
        tile.par_chunks_mut(nj).enumerate().for_each(|(i, row)| {
            let wa = a.sample_words(i);
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = jaccard_distance(wa, b.sample_words(j));
            }
        });
    }
    tile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::PackedBlock;
    use approx::assert_abs_diff_eq;

    /// Pack one sample per bit list.
    fn pack(num_words: usize, samples: &[&[usize]]) -> PackedBlock {
        let mut block = PackedBlock::zeroed(samples.len(), num_words);
        for (s, bits) in samples.iter().enumerate() {
            for &bit in *bits {
                block.set_bit(s, bit);
            }
        }
        block
    }

    #[test]
    fn distance_matches_hand_computation() {
        // s1 = {0,1}, s2 = {1,3}: intersection 1, union 3
        let block = pack(1, &[&[0, 1], &[1, 3]]);
        let v = block.as_view();
        let d = jaccard_distance(v.sample_words(0), v.sample_words(1));
        assert_abs_diff_eq!(d, 1.0 - 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn empty_union_is_maximally_dissimilar() {
        let block = pack(2, &[&[], &[]]);
        let v = block.as_view();
        assert_eq!(jaccard_distance(v.sample_words(0), v.sample_words(1)), 1.0);
    }

    #[test]
    fn identical_vectors_are_at_distance_zero() {
        let block = pack(2, &[&[3, 64, 100], &[3, 64, 100]]);
        let v = block.as_view();
        assert_eq!(jaccard_distance(v.sample_words(0), v.sample_words(1)), 0.0);
    }

    #[test]
    fn self_pair_tile_has_zero_diagonal_and_is_symmetric() {
        let block = pack(1, &[&[0, 1], &[1, 3], &[0, 3]]);
        let tile = jaccard_tile(block.as_view(), block.as_view(), true);
        for i in 0..3 {
            assert_eq!(tile[i * 3 + i], 0.0);
            for j in 0..3 {
                assert_eq!(tile[i * 3 + j], tile[j * 3 + i]);
            }
        }
        // every off-diagonal pair in this fixture shares 1 of 3 features
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            assert_abs_diff_eq!(tile[i * 3 + j], 2.0 / 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn cross_tile_is_the_transpose_of_the_swapped_tile() {
        let a = pack(2, &[&[0, 70], &[1]]);
        let b = pack(2, &[&[0], &[1, 70], &[2, 3, 4]]);
        let ab = jaccard_tile(a.as_view(), b.as_view(), false);
        let ba = jaccard_tile(b.as_view(), a.as_view(), false);
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(ab[i * 3 + j], ba[j * 2 + i]);
            }
        }
    }

    #[test]
    fn distances_stay_in_unit_range() {
        let block = pack(2, &[&[0, 1, 2, 64], &[2, 65], &[], &[0]]);
        let tile = jaccard_tile(block.as_view(), block.as_view(), true);
        for &d in &tile {
            assert!((0.0..=1.0).contains(&d), "distance {d} out of range");
        }
    }
}
