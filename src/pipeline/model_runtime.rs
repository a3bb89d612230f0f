#[cfg(feature = "onnx")]
use std::path::Path;

#[cfg(feature = "onnx")]
use crate::alignment::refine::check_batch;
use crate::config::{AlignerConfig, RefinerMetadata};
use crate::error::AlignmentError;
#[cfg(feature = "onnx")]
use crate::features::FeatureWindow;
use crate::pipeline::defaults::DisabledRefiner;
use crate::pipeline::traits::{BoundaryRefiner, EmissionBackend};

/// Loads the acoustic model. Every failure is reported as
/// `ModelUnavailable` so callers can fall back to elastic alignment.
pub(crate) fn build_emission_backend(
    config: &AlignerConfig,
) -> Result<Box<dyn EmissionBackend>, AlignmentError> {
    if config.model_path.is_empty() {
        return Err(AlignmentError::model_unavailable(
            "acoustic model",
            "no model path configured",
        ));
    }

    #[cfg(feature = "onnx")]
    {
        let backend = OnnxEmissionBackend::load(config)
            .map_err(|e| AlignmentError::model_unavailable("acoustic model", e))?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "onnx"))]
    {
        Err(AlignmentError::model_unavailable(
            "acoustic model",
            "ONNX runtime support is disabled; enable the `onnx` cargo feature",
        ))
    }
}

/// Loads the boundary refiner, or a [`DisabledRefiner`] when refinement is
/// turned off or the model and its metadata cannot be used.
pub(crate) fn build_refiner(config: &AlignerConfig, ppg_dim: usize) -> Box<dyn BoundaryRefiner> {
    match try_build_refiner(config, ppg_dim) {
        Ok(refiner) => refiner,
        Err(reason) => {
            tracing::warn!(%reason, "boundary refinement disabled");
            Box::new(DisabledRefiner::new(reason))
        }
    }
}

fn try_build_refiner(
    config: &AlignerConfig,
    ppg_dim: usize,
) -> Result<Box<dyn BoundaryRefiner>, String> {
    if !config.refine {
        return Err("refinement turned off in config".to_string());
    }
    if config.refiner_model_path.is_empty() || config.refiner_metadata_path.is_empty() {
        return Err("no refiner model or metadata path configured".to_string());
    }
    let metadata = RefinerMetadata::load(std::path::Path::new(&config.refiner_metadata_path))
        .map_err(|e| e.to_string())?;
    metadata.validate(ppg_dim).map_err(|e| e.to_string())?;

    #[cfg(feature = "onnx")]
    {
        let refiner = OnnxRefiner::load(config, metadata).map_err(|e| e.to_string())?;
        Ok(Box::new(refiner))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = metadata;
        Err("ONNX runtime support is disabled; enable the `onnx` cargo feature".to_string())
    }
}

#[cfg(feature = "onnx")]
struct OnnxEmissionBackend {
    session: std::sync::Mutex<ort::session::Session>,
    device_label: String,
}

#[cfg(feature = "onnx")]
impl OnnxEmissionBackend {
    fn load(config: &AlignerConfig) -> Result<Self, AlignmentError> {
        let session = load_session(&config.model_path, &config.device)?;
        tracing::info!(
            inputs = session.inputs().len(),
            outputs = session.outputs().len(),
            model_path = %config.model_path,
            device = %config.device,
            "acoustic ONNX model loaded"
        );
        let device_label = parse_onnx_device(config.device.as_str())?;
        Ok(Self {
            session: std::sync::Mutex::new(session),
            device_label: device_label.to_string(),
        })
    }
}

#[cfg(feature = "onnx")]
impl EmissionBackend for OnnxEmissionBackend {
    fn infer(&self, audio: &[f32]) -> Result<Vec<Vec<f32>>, AlignmentError> {
        let input = ort::value::TensorRef::from_array_view(([1usize, audio.len()], audio))
            .map_err(|e| AlignmentError::runtime("onnx input tensor", e))?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| AlignmentError::runtime("onnx session lock", "session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| AlignmentError::runtime("onnx forward pass", e))?;
        if outputs.len() == 0 {
            return Err(AlignmentError::runtime(
                "onnx forward pass",
                "model produced no outputs",
            ));
        }
        let (shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AlignmentError::runtime("onnx extract logits", e))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        let (frames, classes) = parse_logits_shape(&dims, logits.len())?;
        Ok(logits
            .chunks_exact(classes.max(1))
            .take(frames)
            .map(<[f32]>::to_vec)
            .collect())
    }

    fn device_label(&self) -> String {
        self.device_label.clone()
    }
}

#[cfg(feature = "onnx")]
struct OnnxRefiner {
    session: std::sync::Mutex<ort::session::Session>,
    metadata: RefinerMetadata,
}

#[cfg(feature = "onnx")]
impl OnnxRefiner {
    fn load(config: &AlignerConfig, metadata: RefinerMetadata) -> Result<Self, AlignmentError> {
        let session = load_session(&config.refiner_model_path, &config.device)?;
        tracing::info!(
            model_path = %config.refiner_model_path,
            feature_dim = metadata.feature_dim,
            time_steps = metadata.time_steps,
            num_phonemes = metadata.num_phonemes,
            "boundary refiner ONNX model loaded"
        );
        Ok(Self {
            session: std::sync::Mutex::new(session),
            metadata,
        })
    }
}

#[cfg(feature = "onnx")]
impl BoundaryRefiner for OnnxRefiner {
    fn time_steps(&self) -> Option<usize> {
        Some(self.metadata.time_steps)
    }

    fn refine_batch(
        &self,
        windows: &[FeatureWindow],
        left_phonemes: &[usize],
        right_phonemes: &[usize],
    ) -> Result<Vec<f32>, AlignmentError> {
        check_batch(windows.len(), left_phonemes.len(), right_phonemes.len())?;
        if windows.is_empty() {
            return Ok(Vec::new());
        }
        let (t, f) = (self.metadata.time_steps, self.metadata.feature_dim);
        let mut features = Vec::with_capacity(windows.len() * t * f);
        for w in windows {
            if w.time_steps != t || w.feature_dim != f {
                return Err(AlignmentError::invalid_input(format!(
                    "feature window is {}x{}, refiner expects {t}x{f}",
                    w.time_steps, w.feature_dim
                )));
            }
            features.extend_from_slice(&w.data);
        }
        let left: Vec<i64> = left_phonemes.iter().map(|&id| id as i64).collect();
        let right: Vec<i64> = right_phonemes.iter().map(|&id| id as i64).collect();
        let b = windows.len();

        let features = ort::value::TensorRef::from_array_view(([b, t, f], features.as_slice()))
            .map_err(|e| AlignmentError::runtime("refiner feature tensor", e))?;
        let left = ort::value::TensorRef::from_array_view(([b], left.as_slice()))
            .map_err(|e| AlignmentError::runtime("refiner left phoneme tensor", e))?;
        let right = ort::value::TensorRef::from_array_view(([b], right.as_slice()))
            .map_err(|e| AlignmentError::runtime("refiner right phoneme tensor", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AlignmentError::runtime("onnx session lock", "session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![
                self.metadata.features_input.as_str() => features,
                self.metadata.left_phoneme_input.as_str() => left,
                self.metadata.right_phoneme_input.as_str() => right,
            ])
            .map_err(|e| AlignmentError::runtime("refiner forward pass", e))?;
        if outputs.len() == 0 {
            return Err(AlignmentError::runtime(
                "refiner forward pass",
                "model produced no outputs",
            ));
        }
        let (_, offsets) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AlignmentError::runtime("refiner extract offsets", e))?;
        if offsets.len() != b {
            return Err(AlignmentError::batch_size_mismatch(
                "refiner outputs",
                b,
                offsets.len(),
            ));
        }
        Ok(offsets.to_vec())
    }
}

#[cfg(feature = "onnx")]
fn load_session(model_path: &str, device: &str) -> Result<ort::session::Session, AlignmentError> {
    let execution_providers = onnx_execution_providers(device)?;
    ort::session::Session::builder()
        .map_err(|e| AlignmentError::runtime("onnx session builder", e))?
        .with_execution_providers(execution_providers)
        .map_err(|e| AlignmentError::runtime("onnx execution providers", e))?
        .commit_from_file(Path::new(model_path))
        .map_err(|e| AlignmentError::runtime("onnx model load", e))
}

#[cfg(feature = "onnx")]
fn onnx_execution_providers(
    device: &str,
) -> Result<Vec<ort::ep::ExecutionProviderDispatch>, AlignmentError> {
    match parse_onnx_device(device)? {
        "cuda" => Ok(vec![
            ort::ep::CUDA::default()
                .with_device_id(0)
                .build()
                .error_on_failure(),
            ort::ep::CPU::default().build(),
        ]),
        _ => Ok(vec![ort::ep::CPU::default().build()]),
    }
}

#[cfg(feature = "onnx")]
fn parse_onnx_device(device: &str) -> Result<&'static str, AlignmentError> {
    if device.eq_ignore_ascii_case("cpu") {
        Ok("cpu")
    } else if device.eq_ignore_ascii_case("cuda") {
        Ok("cuda")
    } else {
        Err(AlignmentError::invalid_input(format!(
            "unsupported ONNX device '{device}', expected 'cpu' or 'cuda'"
        )))
    }
}

/// Accepts `[1, T, V]` or `[T, V]` logits and checks them against the data
/// length.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn parse_logits_shape(dims: &[i64], logits_len: usize) -> Result<(usize, usize), AlignmentError> {
    let (frames, classes) = match dims {
        [batch, t, v] => {
            if *batch != 1 {
                return Err(AlignmentError::invalid_input(format!(
                    "acoustic logits batch size must be 1, got {batch}"
                )));
            }
            (dim(*t, "time")?, positive_dim(*v, "class")?)
        }
        [t, v] => (dim(*t, "time")?, positive_dim(*v, "class")?),
        _ => {
            return Err(AlignmentError::invalid_input(format!(
                "unsupported acoustic logits rank {}; expected [1, T, V] or [T, V]",
                dims.len()
            )));
        }
    };
    let expected_len = frames
        .checked_mul(classes)
        .ok_or_else(|| AlignmentError::invalid_input("acoustic logits shape is too large"))?;
    if expected_len != logits_len {
        return Err(AlignmentError::invalid_input(format!(
            "acoustic logits shape/data mismatch: shape implies {expected_len} values, got {logits_len}"
        )));
    }
    Ok((frames, classes))
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn dim(value: i64, name: &'static str) -> Result<usize, AlignmentError> {
    usize::try_from(value).map_err(|_| {
        AlignmentError::invalid_input(format!("logits {name} dimension must be >= 0, got {value}"))
    })
}

#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn positive_dim(value: i64, name: &'static str) -> Result<usize, AlignmentError> {
    match dim(value, name)? {
        0 => Err(AlignmentError::invalid_input(format!(
            "logits {name} dimension must be > 0"
        ))),
        v => Ok(v),
    }
}
