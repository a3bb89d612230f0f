use phoneme_aligner::alignment::elastic::{realign_grid, redistribute_around};
use phoneme_aligner::alignment::refine::clamp_refined;
use phoneme_aligner::alignment::viterbi::forced_align_viterbi;
use phoneme_aligner::{
    AlignerConfig, AlignmentConstraint, AlignmentEngine, AlignmentEngineBuilder, AlignmentError,
    AlignmentRequest, AudioInput, EmissionBackend, PhonemeGraph,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEED: u64 = 42;
const ROUNDS: usize = 200;
const PHONEMES: [&str; 8] = ["sil", "k", "a", "t", "i", "s", "o", "n"];

fn random_log_probs(rng: &mut StdRng, frames: usize, classes: usize) -> Vec<Vec<f32>> {
    (0..frames)
        .map(|_| (0..classes).map(|_| rng.gen_range(-8.0f32..0.0)).collect())
        .collect()
}

/// Fixed random emissions: 100 frames of 20 ms whatever the input.
struct NoiseBackend {
    logits: Vec<Vec<f32>>,
}

impl EmissionBackend for NoiseBackend {
    fn infer(&self, _audio: &[f32]) -> Result<Vec<Vec<f32>>, AlignmentError> {
        Ok(self.logits.clone())
    }

    fn device_label(&self) -> String {
        "noise".to_string()
    }
}

fn noise_engine(rng: &mut StdRng) -> AlignmentEngine {
    let symbols: Vec<&str> = std::iter::once("<pad>").chain(PHONEMES).collect();
    let vocab = std::env::temp_dir().join(format!(
        "phoneme_aligner_properties_{}.txt",
        std::process::id()
    ));
    std::fs::write(&vocab, symbols.join("\n")).unwrap();
    let config = AlignerConfig {
        vocab_path: vocab.to_string_lossy().to_string(),
        ..AlignerConfig::default()
    };
    let logits = random_log_probs(rng, 100, symbols.len());
    let engine = AlignmentEngineBuilder::new(config)
        .with_emission_backend(Box::new(NoiseBackend { logits }))
        .build();
    let _ = std::fs::remove_file(&vocab);
    engine.unwrap()
}

fn random_graph(rng: &mut StdRng) -> PhonemeGraph {
    let n = rng.gen_range(1..8);
    let mut times = vec![0.0];
    for _ in 0..n {
        let last = times[times.len() - 1];
        times.push(last + rng.gen_range(0.02..0.4));
    }
    let texts: Vec<String> = (0..n)
        .map(|_| {
            let k = rng.gen_range(1..3);
            (0..k)
                .map(|_| PHONEMES[rng.gen_range(0..PHONEMES.len())])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    let mut graph = PhonemeGraph::from_times(&times, texts).unwrap();
    for i in 1..n {
        if rng.gen_bool(0.3) {
            graph.set_locked(i, true);
        }
    }
    graph
}

fn assert_monotone(times: &[f64]) {
    assert!(
        times.windows(2).all(|w| w[0] <= w[1] + 1e-12),
        "boundaries out of order: {times:?}"
    );
}

#[test]
fn viterbi_paths_cover_the_segment() {
    let mut rng = StdRng::seed_from_u64(SEED);
    for _ in 0..ROUNDS {
        let frames = rng.gen_range(1..60);
        let classes = rng.gen_range(2..6);
        let log_probs = random_log_probs(&mut rng, frames, classes);
        let start = rng.gen_range(0..frames);
        let end = rng.gen_range(start..=frames);
        let tokens: Vec<usize> = (0..rng.gen_range(1..8))
            .map(|_| rng.gen_range(0..classes))
            .collect();

        let path = forced_align_viterbi(&log_probs, start, end, &tokens);
        assert_eq!(path.token_ends.len(), tokens.len());
        assert_eq!(path.token_ends.last().copied(), Some(end));
        assert!(path.token_ends.windows(2).all(|w| w[0] <= w[1]));
        assert!(path.token_ends[0] >= start);
        if end - start >= tokens.len() {
            assert!(path.feasible);
            assert!(
                path.token_ends[0] > start && path.token_ends.windows(2).all(|w| w[0] < w[1]),
                "every token gets at least one frame: {:?}",
                path.token_ends
            );
        }
    }
}

#[test]
fn refined_boundaries_respect_minimum_duration() {
    let mut rng = StdRng::seed_from_u64(SEED + 1);
    let min = 0.01;
    for _ in 0..ROUNDS {
        let n = rng.gen_range(2..10);
        let mut boundaries = vec![0.0];
        for _ in 0..n {
            let last = boundaries[boundaries.len() - 1];
            boundaries.push(last + rng.gen_range(0.025..0.3));
        }
        let offsets: Vec<f32> = (0..n - 1).map(|_| rng.gen_range(-200.0..200.0)).collect();

        let refined = clamp_refined(&boundaries, &offsets, min);
        assert_eq!(refined.len(), boundaries.len());
        assert_eq!(refined[0], boundaries[0]);
        assert_eq!(refined[n], boundaries[n]);
        for i in 1..n {
            assert!(refined[i] - refined[i - 1] >= min - 1e-9, "{refined:?}");
            assert!(boundaries[i + 1] - refined[i] >= min - 1e-9, "{refined:?}");
        }
        assert_monotone(&refined);
    }
}

#[test]
fn elastic_grid_keeps_locks_and_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(SEED + 2);
    for _ in 0..ROUNDS {
        let graph = random_graph(&mut rng);
        let duration = graph.boundaries[graph.last_boundary()].time;
        let once = realign_grid(&graph, duration).unwrap();
        assert!(once.validate().is_ok());
        assert_monotone(&once.times());
        let locked_before: Vec<f64> = graph
            .boundaries
            .iter()
            .filter(|b| b.locked)
            .map(|b| b.time)
            .collect();
        let locked_after: Vec<f64> = once
            .boundaries
            .iter()
            .filter(|b| b.locked)
            .map(|b| b.time)
            .collect();
        assert_eq!(locked_before, locked_after);
        assert_eq!(realign_grid(&once, duration).unwrap(), once);

        let intervals = once.to_intervals();
        assert!(intervals.windows(2).all(|w| w[0].end == w[1].start));
        assert_eq!(intervals.first().map(|iv| iv.start), Some(0.0));
        assert_eq!(intervals.last().map(|iv| iv.end), Some(duration));
    }
}

#[test]
fn dragging_a_boundary_never_inverts_the_grid() {
    let mut rng = StdRng::seed_from_u64(SEED + 3);
    for _ in 0..ROUNDS {
        let graph = random_graph(&mut rng);
        let last = graph.last_boundary();
        if last < 2 {
            continue;
        }
        let pivot = rng.gen_range(1..last);
        let target = rng.gen_range(-0.5..graph.boundaries[last].time + 0.5);
        let moved = redistribute_around(&graph, pivot, target).unwrap();
        assert!(moved.validate().is_ok());
        assert_monotone(&moved.times());
        for (i, (before, after)) in graph.boundaries.iter().zip(&moved.boundaries).enumerate() {
            if before.locked && i != pivot {
                assert_eq!(before.time, after.time);
            }
        }
    }
}

#[test]
fn alignment_covers_the_timeline_under_any_anchors() {
    let mut rng = StdRng::seed_from_u64(SEED + 4);
    let engine = noise_engine(&mut rng);
    let audio = AudioInput::new("noise.wav", 16_000, vec![0.0; 32_000]);
    for _ in 0..ROUNDS {
        let tokens = rng.gen_range(1..10);
        let phonemes: Vec<String> = (0..tokens)
            .map(|_| PHONEMES[rng.gen_range(0..PHONEMES.len())].to_string())
            .collect();
        let end_time = rng.gen_range(0.05..2.5);
        let start_time = if rng.gen_bool(0.3) {
            rng.gen_range(0.0..end_time)
        } else {
            0.0
        };
        // Anchors in random order, some past the sequence or the timeline.
        let constraints: Vec<AlignmentConstraint> = (0..rng.gen_range(0..5))
            .map(|_| AlignmentConstraint {
                time: rng.gen_range(-0.2..end_time + 0.5),
                token_index: rng.gen_range(0..tokens + 3),
            })
            .collect();
        let request = AlignmentRequest::new(phonemes.clone())
            .with_constraints(constraints.clone())
            .with_start_time(start_time)
            .with_end_time(end_time);

        let out = engine.align(&audio, &request).unwrap();
        let context = format!("{constraints:?} on [{start_time}, {end_time}]");
        assert_eq!(out.intervals.len(), tokens, "{context}");
        assert_eq!(out.intervals[0].start, start_time, "{context}");
        assert_eq!(out.intervals[tokens - 1].end, end_time, "{context}");
        assert!(
            out.intervals.windows(2).all(|w| w[0].end == w[1].start),
            "gap in {:?} for {context}",
            out.intervals
        );
        assert!(
            out.intervals.iter().all(|iv| iv.end >= iv.start),
            "inverted interval in {:?} for {context}",
            out.intervals
        );
        let texts: Vec<&str> = out.intervals.iter().map(|iv| iv.text.as_str()).collect();
        assert_eq!(texts, phonemes, "{context}");
    }
}
