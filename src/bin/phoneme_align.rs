use std::path::{Path, PathBuf};
use std::sync::Arc;

use claxon::FlacReader;
use clap::Parser;
use phoneme_aligner::alignment::tokenization::split_phonemes;
use phoneme_aligner::{
    AlignerConfig, AlignmentEngineBuilder, AlignmentError, AlignmentProfile, AudioInput,
    ManualProfile, ModelBackedProfile, PhonemeGraph,
};

/// Aligns a phoneme sequence to a mono FLAC file and prints the intervals
/// as JSON.
#[derive(Debug, Parser)]
#[command(name = "phoneme_align")]
struct Args {
    /// Mono FLAC recording.
    audio: PathBuf,
    /// Whitespace-separated phonemes, e.g. "sil k a sil".
    phonemes: String,
    #[arg(long, env = "PHONEME_ALIGN_VOCAB", default_value = "")]
    vocab: String,
    #[arg(long, env = "PHONEME_ALIGN_MODEL", default_value = "")]
    model: String,
    #[arg(long, env = "PHONEME_ALIGN_MODEL_CONFIG", default_value = "")]
    model_config: String,
    #[arg(long, env = "PHONEME_ALIGN_REFINER", default_value = "")]
    refiner: String,
    #[arg(long, env = "PHONEME_ALIGN_REFINER_METADATA", default_value = "")]
    refiner_metadata: String,
    #[arg(long, env = "PHONEME_ALIGN_DEVICE", default_value = "cpu")]
    device: String,
    /// Locks the boundary before phoneme INDEX at TIME seconds (`TIME:INDEX`).
    #[arg(long = "anchor", value_parser = parse_anchor)]
    anchors: Vec<(f64, usize)>,
    #[arg(long, default_value_t = 0.0)]
    chunk_seconds: f64,
    #[arg(long, default_value_t = false)]
    no_refine: bool,
    /// Skip the acoustic model and use weighted elastic alignment.
    #[arg(long, default_value_t = false)]
    manual: bool,
}

#[derive(serde::Serialize)]
struct Report {
    profile: &'static str,
    intervals: Vec<phoneme_aligner::AlignmentInterval>,
    diagnostics: Vec<phoneme_aligner::SegmentDiagnostic>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("phoneme_align: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    let (sample_rate_hz, samples) = read_flac_mono(&args.audio)?;
    let key = args.audio.to_string_lossy().to_string();
    let audio = AudioInput::new(key, sample_rate_hz, samples);

    let phonemes: Vec<&str> = split_phonemes(&args.phonemes);
    if phonemes.is_empty() {
        return Err("no phonemes given".to_string());
    }
    let graph = initial_graph(&phonemes, &args.anchors, audio.duration_secs())?;

    let profile = select_profile(&args).map_err(|err| err.to_string())?;
    let outcome = profile
        .realign_grid(&audio, &graph)
        .map_err(|err| err.to_string())?;
    let report = Report {
        profile: profile.name(),
        intervals: outcome.graph.to_intervals(),
        diagnostics: outcome.diagnostics,
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| format!("failed to serialize alignment report: {err}"))?;
    println!("{json}");
    Ok(())
}

fn select_profile(args: &Args) -> Result<Arc<dyn AlignmentProfile>, AlignmentError> {
    if args.manual {
        return Ok(Arc::new(ManualProfile::new()));
    }
    let config = AlignerConfig {
        model_path: args.model.clone(),
        vocab_path: args.vocab.clone(),
        model_config_path: args.model_config.clone(),
        refiner_model_path: args.refiner.clone(),
        refiner_metadata_path: args.refiner_metadata.clone(),
        device: args.device.clone(),
        chunk_seconds: args.chunk_seconds,
        refine: !args.no_refine,
        ..AlignerConfig::default()
    };
    match AlignmentEngineBuilder::new(config).build() {
        Ok(engine) => Ok(Arc::new(ModelBackedProfile::new(Arc::new(engine)))),
        Err(err) if err.is_model_unavailable() => {
            eprintln!("phoneme_align: {err}; falling back to elastic alignment");
            Ok(Arc::new(ManualProfile::new()))
        }
        Err(err) => Err(err),
    }
}

/// One interval per phoneme. Anchored boundaries are locked at their time and
/// the rest are interpolated linearly between anchors as a starting point.
fn initial_graph(
    phonemes: &[&str],
    anchors: &[(f64, usize)],
    duration: f64,
) -> Result<PhonemeGraph, String> {
    let last = phonemes.len();
    let mut fixed: Vec<Option<f64>> = vec![None; last + 1];
    fixed[0] = Some(0.0);
    fixed[last] = Some(duration);
    for &(time, index) in anchors {
        if index == 0 || index >= last {
            return Err(format!(
                "anchor index {index} must fall between 1 and {}",
                last.saturating_sub(1)
            ));
        }
        fixed[index] = Some(time);
    }

    let mut times = vec![0.0; last + 1];
    let mut left = 0;
    for right in 1..=last {
        let Some(right_time) = fixed[right] else {
            continue;
        };
        let left_time = times[left];
        let steps = (right - left) as f64;
        for i in left + 1..=right {
            times[i] = left_time + (right_time - left_time) * (i - left) as f64 / steps;
        }
        left = right;
    }

    let mut graph = PhonemeGraph::from_times(&times, phonemes.iter().copied())
        .map_err(|err| format!("anchors do not form a valid grid: {err}"))?;
    for &(_, index) in anchors {
        graph.set_locked(index, true);
    }
    Ok(graph)
}

fn parse_anchor(raw: &str) -> Result<(f64, usize), String> {
    let (time, index) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected TIME:INDEX, got '{raw}'"))?;
    let time: f64 = time
        .trim()
        .parse()
        .map_err(|err| format!("bad anchor time '{time}': {err}"))?;
    let index: usize = index
        .trim()
        .parse()
        .map_err(|err| format!("bad anchor index '{index}': {err}"))?;
    Ok((time, index))
}

fn read_flac_mono(path: &Path) -> Result<(u32, Vec<f32>), String> {
    let mut reader = FlacReader::open(path)
        .map_err(|err| format!("Failed to decode FLAC '{}': {err}", path.display()))?;
    let streaminfo = reader.streaminfo();
    let channels = streaminfo.channels as usize;
    let bits_per_sample = streaminfo.bits_per_sample as i32;
    let scale = if bits_per_sample > 1 {
        ((1_i64 << (bits_per_sample - 1)) - 1) as f32
    } else {
        1.0
    };
    if channels == 0 {
        return Err(format!("FLAC has zero channels: {}", path.display()));
    }

    let mut mono = Vec::new();
    let mut frame = Vec::with_capacity(channels);
    for sample in reader.samples() {
        let sample = sample
            .map_err(|err| format!("Failed reading sample from '{}': {err}", path.display()))?;
        frame.push(sample as f32 / scale);
        if frame.len() == channels {
            mono.push(frame.iter().sum::<f32>() / channels as f32);
            frame.clear();
        }
    }
    Ok((streaminfo.sample_rate, mono))
}
