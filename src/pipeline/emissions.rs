use crate::alignment::tokenization::PhonemeVocab;

pub fn log_softmax_row(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum_exp: f64 = logits.iter().map(|&x| ((x - max_logit) as f64).exp()).sum();
    let log_denom = if sum_exp > 0.0 && sum_exp.is_finite() {
        max_logit + sum_exp.ln() as f32
    } else {
        f32::INFINITY
    };

    logits.iter().map(|&x| x - log_denom).collect()
}

/// Softmax over the real phoneme columns only; special tokens are dropped
/// before normalization.
pub fn ppg_from_logits(logits: &[Vec<f32>], vocab: &PhonemeVocab) -> Vec<Vec<f32>> {
    let dim = vocab.phoneme_dim();
    logits
        .iter()
        .map(|row| {
            let mut kept = vec![f32::NEG_INFINITY; dim];
            for (class, &x) in row.iter().enumerate() {
                if let Some(col) = vocab.ppg_column(class) {
                    kept[col] = x;
                }
            }
            let max = kept.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if !max.is_finite() {
                return vec![0.0; dim];
            }
            let exps: Vec<f64> = kept.iter().map(|&x| ((x - max) as f64).exp()).collect();
            let sum: f64 = exps.iter().sum();
            exps.into_iter().map(|e| (e / sum) as f32).collect()
        })
        .collect()
}

/// Zero-mean, unit-variance copy of `samples`.
pub fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = var.sqrt().max(1e-7);
    samples
        .iter()
        .map(|&x| ((x as f64 - mean) / std) as f32)
        .collect()
}
