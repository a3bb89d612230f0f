/// Linearly resamples `src` along time to `target_len` rows.
///
/// Row `i` samples the source at `i * (len - 1) / (target_len - 1)`, i.e. a
/// `linspace(0, len - 1, target_len)` grid. A single source row is repeated.
pub fn resample_linear(src: &[Vec<f32>], target_len: usize) -> Vec<Vec<f32>> {
    if src.is_empty() || target_len == 0 {
        return Vec::new();
    }
    if src.len() == 1 {
        return vec![src[0].clone(); target_len];
    }

    let last = (src.len() - 1) as f64;
    let step = if target_len > 1 {
        last / (target_len - 1) as f64
    } else {
        0.0
    };

    (0..target_len)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = (pos.floor() as usize).min(src.len() - 1);
            let hi = (lo + 1).min(src.len() - 1);
            let frac = (pos - lo as f64) as f32;
            src[lo]
                .iter()
                .zip(&src[hi])
                .map(|(&a, &b)| a + (b - a) * frac)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_preserved() {
        let src = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![3.0, 3.0]];
        let out = resample_linear(&src, 9);
        assert_eq!(out.len(), 9);
        assert_eq!(out[0], src[0]);
        assert_eq!(out[8], src[2]);
        // Halfway between row 0 and row 1.
        assert!((out[2][0] - 0.5).abs() < 1e-6);
        assert!((out[2][1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn single_row_is_replicated() {
        let out = resample_linear(&[vec![0.25, 0.75]], 4);
        assert_eq!(out, vec![vec![0.25, 0.75]; 4]);
    }

    #[test]
    fn empty_inputs_produce_nothing() {
        assert!(resample_linear(&[], 5).is_empty());
        assert!(resample_linear(&[vec![1.0]], 0).is_empty());
    }

    #[test]
    fn downsampling_to_one_row_takes_first() {
        let src = vec![vec![2.0], vec![4.0]];
        assert_eq!(resample_linear(&src, 1), vec![vec![2.0]]);
    }
}
