use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Area under the ROC curve from the Mann-Whitney rank sum. Tied scores share
/// their average rank. Returns 0.5 when either class is absent.
pub fn compute_auc(scores: &[f64], labels: &[u8]) -> f64 {
    if scores.len() != labels.len() || scores.is_empty() {
        return 0.5;
    }

    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based; the tie group start..end shares the mean rank
        let avg = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        start = end;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l == 1)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

/// Scale non-negative scores to sum to one. Negative or non-finite scores
/// count as zero; an all-zero input becomes uniform.
pub fn normalize_weights(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let clean: Vec<f64> = scores
        .iter()
        .map(|&s| if s.is_finite() && s > 0.0 { s } else { 0.0 })
        .collect();
    let total: f64 = clean.iter().sum();
    if total <= 0.0 {
        return vec![1.0 / scores.len() as f64; scores.len()];
    }
    clean.iter().map(|s| s / total).collect()
}

/// Per-class shuffled hold-out split. Each class contributes
/// `round(n_c * test_fraction)` rows to the test side but always keeps at
/// least one row for training.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let fraction = test_fraction.clamp(0.0, 1.0);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * fraction).round() as usize).min(members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_auc() {
        assert_eq!(compute_auc(&[0.9, 0.8, 0.2, 0.1], &[1, 1, 0, 0]), 1.0);
        assert_eq!(compute_auc(&[0.1, 0.2, 0.8, 0.9], &[1, 1, 0, 0]), 0.0);
        assert_eq!(compute_auc(&[0.5, 0.5, 0.5, 0.5], &[1, 0, 1, 0]), 0.5);
        // one inverted pair out of four
        assert_eq!(compute_auc(&[0.9, 0.3, 0.4, 0.1], &[1, 1, 0, 0]), 0.75);
    }

    #[test]
    fn test_auc_single_class_is_neutral() {
        assert_eq!(compute_auc(&[0.1, 0.9], &[1, 1]), 0.5);
        assert_eq!(compute_auc(&[], &[]), 0.5);
    }

    #[test]
    fn test_normalize_weights() {
        let w = normalize_weights(&[0.9, 0.6, 0.0]);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((w[0] - 0.6).abs() < 1e-12);
        assert_eq!(w[2], 0.0);
        assert_eq!(normalize_weights(&[0.0, 0.0]), vec![0.5, 0.5]);
        assert_eq!(normalize_weights(&[f64::NAN, 1.0]), vec![0.0, 1.0]);
    }

    #[test]
    fn test_stratified_split_keeps_class_balance() {
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i < 20)).collect();
        let (train, test) = stratified_split(&labels, 0.2, 42);
        assert_eq!(train.len() + test.len(), 50);
        assert_eq!(test.len(), 10);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 4);
        let (train2, test2) = stratified_split(&labels, 0.2, 42);
        assert_eq!(train, train2);
        assert_eq!(test, test2);
    }

    #[test]
    fn test_split_keeps_a_training_row_per_class() {
        let (train, test) = stratified_split(&[0, 1], 0.9, 1);
        assert_eq!(train.len(), 2);
        assert!(test.is_empty());
    }
}
