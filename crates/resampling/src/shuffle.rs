use rand::Rng;

use crate::error::ResamplingError;

/// In-place Fisher-Yates shuffle (sampling without replacement).
pub fn inplace_shuffle<T>(values: &mut [T], rng: &mut impl Rng) {
    let n = values.len();
    if n <= 1 {
        return;
    }
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        values.swap(i, j);
    }
}

/// Shuffle three vectors by one shared permutation, so corresponding entries
/// stay aligned across the vectors.
pub fn joint_shuffle3<A, B, C>(
    a: &mut [A],
    b: &mut [B],
    c: &mut [C],
    rng: &mut impl Rng,
) -> Result<(), ResamplingError> {
    if a.len() != b.len() || b.len() != c.len() {
        return Err(ResamplingError::JointShuffleMismatch);
    }
    let n = a.len();
    if n <= 1 {
        return Ok(());
    }
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        a.swap(i, j);
        b.swap(i, j);
        c.swap(i, j);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut v: Vec<u32> = (0..100).collect();
        inplace_shuffle(&mut v, &mut rng);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<u32>>());
        assert_ne!(v, (0..100).collect::<Vec<u32>>());
    }

    #[test]
    fn shuffle_is_deterministic_under_seed() {
        let mut a: Vec<u32> = (0..50).collect();
        let mut b: Vec<u32> = (0..50).collect();
        let mut rng_a = ChaCha8Rng::seed_from_u64(42);
        let mut rng_b = ChaCha8Rng::seed_from_u64(42);
        inplace_shuffle(&mut a, &mut rng_a);
        inplace_shuffle(&mut b, &mut rng_b);
        assert_eq!(a, b);
    }

    #[test]
    fn joint_shuffle_keeps_rows_aligned() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut a: Vec<u32> = (0..40).collect();
        let mut b: Vec<u32> = (0..40).map(|i| i + 100).collect();
        let mut c: Vec<u32> = (0..40).map(|i| i + 200).collect();
        joint_shuffle3(&mut a, &mut b, &mut c, &mut rng).unwrap();
        for i in 0..40 {
            assert_eq!(b[i], a[i] + 100);
            assert_eq!(c[i], a[i] + 200);
        }
    }

    #[test]
    fn joint_shuffle_rejects_mismatched_lengths() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut a = [1, 2, 3];
        let mut b = [1, 2];
        let mut c = [1, 2, 3];
        assert!(joint_shuffle3(&mut a, &mut b, &mut c, &mut rng).is_err());
    }
}
