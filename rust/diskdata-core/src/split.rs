// rust/diskdata-core/src/split.rs

//! Stratified partitioning of observation indices.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ProviderError, Result};

/// Checks that `fractions` describe a valid partition: each value lies in
/// (0, 1) and together they leave a non-empty remainder for the last subset.
pub fn validate_fractions(fractions: &[f64]) -> Result<()> {
    if fractions.is_empty() {
        return Err(ProviderError::invalid_fraction("at least one fraction is required"));
    }

    for &p in fractions {
        if !(p > 0.0 && p < 1.0) {
            return Err(ProviderError::invalid_fraction(format!(
                "fraction {p} must lie strictly between 0 and 1"
            )));
        }
    }

    let total: f64 = fractions.iter().sum();
    if total >= 1.0 {
        return Err(ProviderError::invalid_fraction(format!(
            "fractions sum to {total}, which leaves nothing for the last subset"
        )));
    }

    Ok(())
}

/// Partitions `0..labels.len()` into `fractions.len() + 1` disjoint subsets.
///
/// Indices are grouped by label and each group is cut separately, so every
/// subset keeps the class distribution of `labels` up to rounding. Subset
/// `k < fractions.len()` receives about `fractions[k]` of each class; the
/// last subset receives the rest. Group order and subset order are both
/// shuffled with `rng`.
///
/// # Errors
///
/// Returns `InvalidFraction` if `fractions` fail [`validate_fractions`].
pub fn stratified_indices<L, R>(labels: &[L], fractions: &[f64], rng: &mut R) -> Result<Vec<Vec<usize>>>
where
    L: Ord,
    R: Rng + ?Sized,
{
    validate_fractions(fractions)?;

    let mut groups: BTreeMap<&L, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(idx);
    }

    let mut subsets: Vec<Vec<usize>> = vec![Vec::new(); fractions.len() + 1];

    for indices in groups.values_mut() {
        indices.shuffle(rng);

        let total = indices.len();
        let mut start = 0;
        for (k, &p) in fractions.iter().enumerate() {
            let wanted = (p * total as f64).round() as usize;
            let count = wanted.min(total - start);
            subsets[k].extend_from_slice(&indices[start..start + count]);
            start += count;
        }
        subsets[fractions.len()].extend_from_slice(&indices[start..]);
    }

    for subset in &mut subsets {
        subset.shuffle(rng);
    }

    Ok(subsets)
}
