/// Token end frames for one aligned segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPath {
    /// Exclusive end frame of each token, in absolute frame indices. Token
    /// `i` covers `[ends[i - 1], ends[i])`, token 0 starts at the segment
    /// start, and the last entry equals the segment end.
    pub token_ends: Vec<usize>,
    /// `false` when no monotone path reached the last token and the frames
    /// were spread evenly instead.
    pub feasible: bool,
}

/// Monotone forced alignment of `tokens` onto frames `[start_frame, end_frame)`.
///
/// Each frame either stays on the current token or advances by exactly one;
/// frame 0 is pinned to token 0 and the last frame to the last token. Ties
/// between staying and advancing keep the current token. When the last
/// token is unreachable the span is divided linearly.
pub fn forced_align_viterbi(
    log_probs: &[Vec<f32>],
    start_frame: usize,
    end_frame: usize,
    tokens: &[usize],
) -> SegmentPath {
    let end_frame = end_frame.min(log_probs.len()).max(start_frame.min(log_probs.len()));
    let start_frame = start_frame.min(end_frame);
    let t_len = end_frame - start_frame;
    let s_len = tokens.len();

    if s_len == 0 {
        return SegmentPath {
            token_ends: Vec::new(),
            feasible: true,
        };
    }
    if t_len < s_len {
        return linear_distribution(start_frame, end_frame, s_len);
    }

    let emit = |t: usize, s: usize| -> f32 {
        log_probs[start_frame + t]
            .get(tokens[s])
            .copied()
            .filter(|v| !v.is_nan())
            .unwrap_or(f32::NEG_INFINITY)
    };

    let mut prev = vec![f32::NEG_INFINITY; s_len];
    let mut curr = vec![f32::NEG_INFINITY; s_len];
    // 1 = entered this token on this frame, 0 = stayed.
    let mut bp = vec![0u8; t_len * s_len];

    prev[0] = emit(0, 0);

    for t in 1..t_len {
        // Token `s` is only reachable by frame `t` if s <= t, and the last
        // token is only reachable from it if enough frames remain.
        let remaining = t_len - 1 - t;
        let lo = (s_len - 1).saturating_sub(remaining);
        let hi = t.min(s_len - 1);
        curr.iter_mut().for_each(|v| *v = f32::NEG_INFINITY);

        let bp_row = &mut bp[t * s_len..(t + 1) * s_len];
        for s in lo..=hi {
            let stay = prev[s];
            let advance = if s > 0 { prev[s - 1] } else { f32::NEG_INFINITY };
            let (best, step) = if advance > stay {
                (advance, 1u8)
            } else {
                (stay, 0u8)
            };
            if best == f32::NEG_INFINITY {
                continue;
            }
            curr[s] = best + emit(t, s);
            bp_row[s] = step;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let terminal = prev[s_len - 1];
    if !terminal.is_finite() {
        return linear_distribution(start_frame, end_frame, s_len);
    }

    let mut token_ends = vec![end_frame; s_len];
    let mut s = s_len - 1;
    for t in (1..t_len).rev() {
        if s == 0 {
            break;
        }
        if bp[t * s_len + s] == 1 {
            token_ends[s - 1] = start_frame + t;
            s -= 1;
        }
    }
    debug_assert_eq!(s, 0, "backtrack must end on the first token");

    SegmentPath {
        token_ends,
        feasible: true,
    }
}

/// Evenly spread `s_len` tokens over `[start_frame, end_frame)`. Tokens get
/// zero frames when the span is shorter than the sequence.
pub fn linear_distribution(start_frame: usize, end_frame: usize, s_len: usize) -> SegmentPath {
    let span = end_frame.saturating_sub(start_frame);
    let token_ends = (0..s_len)
        .map(|i| {
            if i + 1 == s_len {
                end_frame
            } else {
                start_frame + (i + 1) * span / s_len
            }
        })
        .collect();
    SegmentPath {
        token_ends,
        feasible: false,
    }
}
