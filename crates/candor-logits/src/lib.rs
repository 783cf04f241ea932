//! Pure logits and probability transforms for generation telemetry.
//!
//! All functions operate on plain `f32` slices and carry no state, so they
//! can be exercised in isolation from any inference runtime.
//!
//! ## Typical pipeline
//!
//! ```
//! use candor_logits::*;
//!
//! let mut logits = vec![1.0f32, 2.0, 3.0, 0.5];
//! apply_temperature(&mut logits, 0.8);
//! softmax_in_place(&mut logits);
//! let top = top_k_probs(&logits, 2);
//! let entropy = shannon_entropy(&top.iter().map(|&(_, p)| p).collect::<Vec<_>>());
//! let chosen = argmax(&logits);
//! # let _ = (entropy, chosen);
//! ```

use rand::Rng;
use std::cmp::Ordering;

/// Scale logits by `1 / temperature`.
///
/// Temperatures of `0.0` and `1.0` are no-ops; greedy decoding at
/// temperature zero is handled by the caller via [`argmax`].
///
/// # Examples
///
/// ```
/// use candor_logits::apply_temperature;
///
/// let mut logits = vec![1.0f32, 2.0, 4.0];
/// apply_temperature(&mut logits, 2.0);
/// assert!((logits[2] - 2.0).abs() < 1e-6);
/// ```
pub fn apply_temperature(logits: &mut [f32], temperature: f32) {
    #[allow(clippy::float_cmp)]
    if logits.is_empty() || temperature == 0.0 || temperature == 1.0 {
        return;
    }
    let inv = 1.0 / temperature;
    for l in logits.iter_mut() {
        *l *= inv;
    }
}

/// Convert raw logits to a probability distribution in-place.
///
/// Uses the numerically-stable subtract-max form. When every exponentiated
/// value underflows to zero the slice falls back to a uniform distribution
/// so downstream consumers always see valid probability mass.
///
/// # Examples
///
/// ```
/// use candor_logits::softmax_in_place;
///
/// let mut logits = vec![0.0f32, 1.0, 2.0];
/// softmax_in_place(&mut logits);
/// let sum: f32 = logits.iter().sum();
/// assert!((sum - 1.0).abs() < 1e-5);
/// assert!(logits[2] > logits[1]);
/// ```
pub fn softmax_in_place(logits: &mut [f32]) {
    if logits.is_empty() {
        return;
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for l in logits.iter_mut() {
        let exp = (*l - max).exp();
        *l = exp;
        sum += exp;
    }
    if sum > 0.0 {
        let inv_sum = 1.0 / sum;
        for l in logits.iter_mut() {
            *l *= inv_sum;
        }
    } else {
        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0_f32 / logits.len() as f32;
        for l in logits.iter_mut() {
            *l = uniform;
        }
    }
}

/// Index of the maximum value; ties keep the first maximum. Returns `0`
/// on an empty slice.
///
/// # Examples
///
/// ```
/// use candor_logits::argmax;
///
/// assert_eq!(argmax(&[0.2f32, 0.7, 0.1]), 1);
/// assert_eq!(argmax(&[0.5f32, 0.5]), 0);
/// assert_eq!(argmax(&[]), 0);
/// ```
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// The `k` highest-probability entries as `(index, probability)` pairs,
/// sorted by descending probability.
///
/// When `k == 0` or `k >= len`, every entry is returned (still sorted).
///
/// # Examples
///
/// ```
/// use candor_logits::top_k_probs;
///
/// let probs = vec![0.1f32, 0.5, 0.15, 0.25];
/// let top = top_k_probs(&probs, 2);
/// assert_eq!(top.len(), 2);
/// assert_eq!(top[0], (1, 0.5));
/// assert_eq!(top[1], (3, 0.25));
/// ```
pub fn top_k_probs(probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    if k > 0 && k < indexed.len() {
        // O(N) partition so only the surviving prefix needs a full sort.
        indexed.select_nth_unstable_by(k - 1, |a, b| f32_descending(a.1, b.1));
        indexed.truncate(k);
    }
    indexed.sort_unstable_by(|a, b| f32_descending(a.1, b.1));
    indexed
}

/// Shannon entropy `-Σ p·ln(p)` over a probability slice, natural log.
///
/// Zero-probability entries contribute nothing (the `p·ln(p)` limit at
/// zero). The slice need not sum to one; callers passing a truncated top-k
/// mass get the entropy of that mass as-is.
///
/// # Examples
///
/// ```
/// use candor_logits::shannon_entropy;
///
/// // A certain outcome carries no entropy.
/// assert_eq!(shannon_entropy(&[1.0f32, 0.0]), 0.0);
///
/// // Uniform over two outcomes is ln(2).
/// let h = shannon_entropy(&[0.5f32, 0.5]);
/// assert!((h - std::f64::consts::LN_2).abs() < 1e-6);
/// ```
pub fn shannon_entropy(probs: &[f32]) -> f64 {
    probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| {
            let p = f64::from(p);
            -p * p.ln()
        })
        .sum()
}

/// Draw an index from a probability slice by cumulative weight.
///
/// Falls back to [`argmax`] when the total mass is not positive. The caller
/// owns the RNG, so seeded reproducible draws are possible.
///
/// # Examples
///
/// ```
/// use candor_logits::sample_index;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let probs = vec![0.0f32, 1.0, 0.0];
/// assert_eq!(sample_index(&probs, &mut rng), 1);
/// ```
pub fn sample_index<R: Rng>(probs: &[f32], rng: &mut R) -> usize {
    let total: f32 = probs.iter().sum();
    if !(total > 0.0) {
        return argmax(probs);
    }
    let mut draw = rng.gen::<f32>() * total;
    for (i, &p) in probs.iter().enumerate() {
        draw -= p;
        if draw <= 0.0 {
            return i;
        }
    }
    // Floating-point residue can leave draw marginally positive.
    probs.len().saturating_sub(1)
}

// --- helpers ---------------------------------------------------------------

#[inline]
fn f32_descending(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn temperature_scales_logits() {
        let mut logits = vec![2.0f32, 4.0];
        apply_temperature(&mut logits, 0.5);
        assert!((logits[0] - 4.0).abs() < 1e-6);
        assert!((logits[1] - 8.0).abs() < 1e-6);
    }

    #[test]
    fn temperature_zero_and_one_are_noops() {
        let original = vec![1.0f32, 2.0, 3.0];
        for temp in [0.0, 1.0] {
            let mut logits = original.clone();
            apply_temperature(&mut logits, temp);
            assert_eq!(logits, original);
        }
    }

    #[test]
    fn softmax_sums_to_one_and_preserves_order() {
        let mut logits = vec![1.0f32, 3.0, 2.0];
        softmax_in_place(&mut logits);
        let sum: f32 = logits.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(logits[1] > logits[2]);
        assert!(logits[2] > logits[0]);
    }

    #[test]
    fn argmax_ties_keep_first_index() {
        assert_eq!(argmax(&[0.5f32, 0.5, 0.5]), 0);
        assert_eq!(argmax(&[1.0f32, 2.0, 2.0]), 1);
    }

    #[test]
    fn top_k_returns_descending_pairs() {
        let probs = vec![0.05f32, 0.4, 0.1, 0.3, 0.15];
        let top = top_k_probs(&probs, 3);
        assert_eq!(top.iter().map(|&(i, _)| i).collect::<Vec<_>>(), vec![1, 3, 4]);
        assert!(top[0].1 >= top[1].1 && top[1].1 >= top[2].1);
    }

    #[test]
    fn top_k_wider_than_slice_returns_everything() {
        let probs = vec![0.6f32, 0.4];
        let top = top_k_probs(&probs, 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, 0);
    }

    #[test]
    fn entropy_is_zero_for_certainty() {
        assert_eq!(shannon_entropy(&[1.0f32]), 0.0);
        assert_eq!(shannon_entropy(&[0.0f32, 1.0, 0.0]), 0.0);
    }

    #[test]
    fn entropy_maximal_for_uniform() {
        let n = 8usize;
        #[allow(clippy::cast_precision_loss)]
        let uniform = vec![1.0f32 / n as f32; n];
        let h = shannon_entropy(&uniform);
        assert!((h - (n as f64).ln()).abs() < 1e-5);

        let skewed = vec![0.9f32, 0.05, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert!(shannon_entropy(&skewed) < h);
    }

    #[test]
    fn sample_index_respects_point_mass() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let probs = vec![0.0f32, 0.0, 1.0];
        for _ in 0..20 {
            assert_eq!(sample_index(&probs, &mut rng), 2);
        }
    }

    #[test]
    fn sample_index_on_zero_mass_falls_back_to_argmax() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let probs = vec![0.0f32, 0.0, 0.0];
        assert_eq!(sample_index(&probs, &mut rng), 0);
    }

    // --- proptest -----------------------------------------------------------

    proptest::proptest! {
        #[test]
        fn softmax_always_sums_to_one(vals in proptest::collection::vec(-80.0f32..80.0f32, 1..64)) {
            let mut logits = vals;
            softmax_in_place(&mut logits);
            let sum: f32 = logits.iter().sum();
            proptest::prop_assert!((sum - 1.0).abs() < 1e-4, "softmax sum = {sum}");
        }

        #[test]
        fn temperature_preserves_argmax(
            vals in proptest::collection::vec(0.1f32..10.0f32, 2..32),
            temp in 0.1f32..4.0f32,
        ) {
            let best_before = argmax(&vals);
            let mut logits = vals;
            apply_temperature(&mut logits, temp);
            proptest::prop_assert_eq!(best_before, argmax(&logits));
        }

        #[test]
        fn entropy_is_non_negative(
            vals in proptest::collection::vec(0.0f32..1.0f32, 1..64),
        ) {
            proptest::prop_assert!(shannon_entropy(&vals) >= 0.0);
        }

        #[test]
        fn top_k_never_exceeds_k(
            vals in proptest::collection::vec(0.0f32..1.0f32, 1..64),
            k in 1usize..16,
        ) {
            let top = top_k_probs(&vals, k);
            proptest::prop_assert_eq!(top.len(), k.min(vals.len()));
        }

        #[test]
        fn sampled_index_is_in_bounds(
            vals in proptest::collection::vec(0.0f32..1.0f32, 1..64),
            seed in 0u64..1000,
        ) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let idx = sample_index(&vals, &mut rng);
            proptest::prop_assert!(idx < vals.len());
        }
    }
}
