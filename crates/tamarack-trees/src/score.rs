//! Split scoring via symmetric normalized mutual information.

/// Score a candidate split of one attribute column against the class labels.
///
/// `column` is one attribute over all examples, `labels` the dense label
/// index of every example, `subset` the example indices under consideration,
/// and `split` the candidate threshold (`column[i] < split` goes left).
///
/// Returns `2·I(C;S) / (H_S + H_C)` in `[0, 1]` — the symmetric normalized
/// mutual information between the class variable and the split variable,
/// with all logs base 2. Returns exactly `0.0` when the split puts every
/// example in `subset` on one side.
#[must_use]
pub fn split_score(
    column: &[f32],
    labels: &[usize],
    n_classes: usize,
    subset: &[usize],
    split: f32,
) -> f64 {
    // Per-class [left, right] counts and overall side counts.
    let mut side_counts = [0usize; 2];
    let mut class_counts = vec![[0usize; 2]; n_classes];
    for &i in subset {
        let is_right = usize::from(column[i] >= split);
        side_counts[is_right] += 1;
        class_counts[labels[i]][is_right] += 1;
    }

    // No split occurs when either side is empty.
    if side_counts[0] == 0 || side_counts[1] == 0 {
        return 0.0;
    }

    let r_size = 1.0 / subset.len() as f64;

    // Mutual information and class entropy in one pass, skipping zero
    // buckets by count inspection rather than masking log(0).
    let mut mutual_inf = 0.0;
    let mut class_ent = 0.0;
    for counts in &class_counts {
        let class_total = counts[0] + counts[1];
        if class_total == 0 {
            continue;
        }

        let p_class = class_total as f64 * r_size;
        class_ent -= p_class * p_class.log2();

        for (side, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let p_joint = count as f64 * r_size;
            let p_class_given_side = count as f64 / side_counts[side] as f64;
            mutual_inf -= p_joint * (p_class / p_class_given_side).log2();
        }
    }

    let p_left = side_counts[0] as f64 * r_size;
    let p_right = side_counts[1] as f64 * r_size;
    let split_ent = -p_left * p_left.log2() - p_right * p_right.log2();

    2.0 * mutual_inf / (split_ent + class_ent)
}
