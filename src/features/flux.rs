use super::FLUX_LAGS;

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Rectified multi-order mel flux, `frames x FLUX_LAGS`.
///
/// Column `n - 1` holds `sum_bins |d^n mel[t]|`, the `n`-th order backward
/// difference with `n` zero frames prepended so every order keeps the input
/// length.
pub fn spectral_flux(mel: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let frames = mel.len();
    let bins = mel.first().map_or(0, Vec::len);
    let mut out = vec![vec![0.0f32; FLUX_LAGS]; frames];

    for order in 1..=FLUX_LAGS {
        // (-1)^j * C(order, j)
        let coeffs: Vec<f64> = (0..=order)
            .map(|j| {
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                sign * binomial(order, j)
            })
            .collect();

        for (t, out_row) in out.iter_mut().enumerate() {
            let mut total = 0.0f64;
            for b in 0..bins {
                let mut d = 0.0f64;
                for (j, &c) in coeffs.iter().enumerate() {
                    if t >= j {
                        d += c * mel[t - j][b] as f64;
                    }
                }
                total += d.abs();
            }
            out_row[order - 1] = total as f32;
        }
    }
    out
}
