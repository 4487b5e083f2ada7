//! Model management for ONNX Runtime
//!
//! Resolves the PaddleOCR model set (detection, recognition, dictionary) in a
//! local directory, fetching missing files once and recording them in a
//! `manifest.json` next to the models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::error::InferenceError;

/// Environment variable that disables model downloads
pub const OFFLINE_ENV: &str = "DRAWING_OCR_OFFLINE";

const MANIFEST_FILE: &str = "manifest.json";
const HF_BASE: &str = "https://huggingface.co/monkt/paddleocr-onnx/resolve/main";

/// Files making up the OCR model set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// DBNet text detector
    Detection,
    /// CRNN text recognizer
    Recognition,
    /// Recognizer character set
    Dictionary,
}

/// Where a model file comes from and what a valid copy looks like
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub filename: &'static str,
    /// Path below the Hugging Face repository root
    pub remote_path: &'static str,
    /// Accepted size in bytes, inclusive
    pub size_range: (u64, u64),
    pub sha256: Option<&'static str>,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [
        ModelType::Detection,
        ModelType::Recognition,
        ModelType::Dictionary,
    ];

    pub fn spec(self) -> ModelSpec {
        match self {
            ModelType::Detection => ModelSpec {
                filename: "det.onnx",
                remote_path: "detection/v3/det.onnx",
                size_range: (2_000_000, 5_000_000),
                sha256: None,
            },
            ModelType::Recognition => ModelSpec {
                filename: "rec.onnx",
                remote_path: "languages/english/rec.onnx",
                size_range: (7_000_000, 10_000_000),
                sha256: None,
            },
            ModelType::Dictionary => ModelSpec {
                filename: "dict.txt",
                remote_path: "languages/english/dict.txt",
                size_range: (500, 10_000),
                sha256: None,
            },
        }
    }

    pub fn filename(self) -> &'static str {
        self.spec().filename
    }

    pub fn download_url(self) -> String {
        format!("{}/{}", HF_BASE, self.spec().remote_path)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Detection => "text detection model",
            ModelType::Recognition => "text recognition model",
            ModelType::Dictionary => "character dictionary",
        };
        f.write_str(name)
    }
}

impl ModelSpec {
    fn accepts_size(&self, len: u64) -> bool {
        (self.size_range.0..=self.size_range.1).contains(&len)
    }
}

/// Record of one fetched file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub size_bytes: u64,
    pub sha256: String,
    /// Unix seconds
    pub fetched_at: u64,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default)]
    pub models: BTreeMap<ModelType, ManifestEntry>,
}

/// Paths of a complete, verified model set
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
    pub dictionary: PathBuf,
}

/// Owns the directory holding the model files
#[derive(Debug, Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Manager rooted at `<data_dir>/models`
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir.join("models"))
    }

    /// Manager rooted at a custom directory
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {:?}", models_dir))?;
        Ok(Self { models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        self.models_dir.join(model_type.filename())
    }

    /// True when the file exists with a plausible size
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        std::fs::metadata(self.model_path(model_type))
            .map(|meta| model_type.spec().accepts_size(meta.len()))
            .unwrap_or(false)
    }

    pub fn are_models_ready(&self) -> bool {
        ModelType::ALL.iter().all(|&m| self.is_model_available(m))
    }

    /// Path of a usable copy of `model_type`, fetching it first when missing
    pub fn ensure_model(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model_type);
        if self.is_model_available(model_type) {
            debug!("Using cached {} at {:?}", model_type, path);
            return Ok(path);
        }

        if std::env::var_os(OFFLINE_ENV).is_some() {
            anyhow::bail!(
                "{} missing at {:?} and {} is set; fetch {} manually",
                model_type,
                path,
                OFFLINE_ENV,
                model_type.download_url()
            );
        }

        self.fetch(model_type)?;
        Ok(path)
    }

    /// Make sure the full model set is present
    pub fn ensure_all_models(&self) -> Result<ModelPaths> {
        Ok(ModelPaths {
            detection: self.ensure_model(ModelType::Detection)?,
            recognition: self.ensure_model(ModelType::Recognition)?,
            dictionary: self.ensure_model(ModelType::Dictionary)?,
        })
    }

    /// Blocking fetch on a private runtime
    fn fetch(&self, model_type: ModelType) -> Result<()> {
        let url = model_type.download_url();
        let path = self.model_path(model_type);
        info!("Fetching {} from {}", model_type, url);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start download runtime")?;
        let entry = runtime.block_on(download(&url, &path, model_type.spec()))?;

        info!("Stored {} ({} bytes) at {:?}", model_type, entry.size_bytes, path);
        self.record_in_manifest(model_type, entry)
    }

    fn record_in_manifest(&self, model_type: ModelType, entry: ManifestEntry) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_else(|e| {
            warn!("Replacing unreadable model manifest: {}", e);
            ModelManifest::default()
        });
        manifest.models.insert(model_type, entry);
        self.save_manifest(&manifest)
    }

    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let path = self.models_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(ModelManifest::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).with_context(|| format!("Invalid manifest {:?}", path))
    }

    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let path = self.models_dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(manifest)?)
            .with_context(|| format!("Failed to write manifest {:?}", path))
    }
}

/// Stream `url` to `dest` through a `.part` file, checking size and hash before
/// the file is moved into place
async fn download(url: &str, dest: &Path, spec: ModelSpec) -> Result<ManifestEntry> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Request for {} failed", url))?;

    let announced = response.content_length();
    if let Some(len) = announced {
        if !spec.accepts_size(len) {
            anyhow::bail!(
                "{} announces {} bytes, outside {:?}",
                spec.filename,
                len,
                spec.size_range
            );
        }
    }

    let part = dest.with_extension("part");
    let mut file =
        std::fs::File::create(&part).with_context(|| format!("Failed to create {:?}", part))?;
    let mut hasher = Sha256::new();
    let mut received = 0u64;
    let mut next_report = 25u64;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("Download of {} interrupted", spec.filename))?;
        file.write_all(&chunk)?;
        hasher.update(&chunk);
        received += chunk.len() as u64;

        if let Some(total) = announced.filter(|&t| t > 0) {
            let percent = received * 100 / total;
            if percent >= next_report {
                debug!("{}: {}%", spec.filename, percent);
                next_report = percent - percent % 25 + 25;
            }
        }
    }
    file.flush()?;
    drop(file);

    let sha256 = format!("{:x}", hasher.finalize());
    let rejection = if !spec.accepts_size(received) {
        Some(format!("size {} outside {:?}", received, spec.size_range))
    } else {
        spec.sha256
            .filter(|expected| *expected != sha256)
            .map(|expected| format!("sha256 {} does not match {}", sha256, expected))
    };
    if let Some(reason) = rejection {
        std::fs::remove_file(&part).ok();
        anyhow::bail!("Rejected {}: {}", spec.filename, reason);
    }

    std::fs::rename(&part, dest).with_context(|| format!("Failed to move {:?} into place", part))?;

    Ok(ManifestEntry {
        size_bytes: received,
        sha256,
        fetched_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    })
}

/// ONNX Runtime session with its input name
pub struct OnnxSession {
    session: Session,
    input_name: String,
}

impl OnnxSession {
    /// Load a model, optionally asking for a GPU execution provider
    pub fn new(model_path: &Path, use_gpu: bool) -> Result<Self, InferenceError> {
        info!("Loading ONNX model from {:?} (gpu: {})", model_path, use_gpu);

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        let builder = if use_gpu {
            use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider};
            builder.with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CoreMLExecutionProvider::default().build(),
            ])?
        } else {
            builder
        };

        let session = builder.commit_from_file(model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| {
                InferenceError::MalformedOutput(format!("model {:?} has no inputs", model_path))
            })?;

        debug!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}",
            session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self { session, input_name })
    }

    /// Run the model on one NCHW tensor and return the first output's shape and data
    pub fn run(&mut self, input: Array4<f32>) -> Result<(Vec<usize>, Vec<f32>), InferenceError> {
        let shape = input.shape().to_vec();
        let (data, _offset) = input.into_raw_vec_and_offset();
        let value = ort::value::Value::from_array((shape.as_slice(), data))?;

        let outputs = self.session.run(ort::inputs![self.input_name.as_str() => value])?;
        let (out_shape, out_data) = outputs[0].try_extract_tensor::<f32>()?;

        let out_shape = out_shape
            .iter()
            .map(|&d| {
                usize::try_from(d).map_err(|_| {
                    InferenceError::MalformedOutput(format!("dynamic dimension {}", d))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((out_shape, out_data.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(sha256: &str, size_bytes: u64) -> ManifestEntry {
        ManifestEntry {
            size_bytes,
            sha256: sha256.to_string(),
            fetched_at: 0,
        }
    }

    #[test]
    fn test_model_specs() {
        assert_eq!(ModelType::Detection.filename(), "det.onnx");
        assert_eq!(ModelType::Recognition.filename(), "rec.onnx");
        assert_eq!(ModelType::Dictionary.filename(), "dict.txt");
        assert!(ModelType::Dictionary.download_url().ends_with("/languages/english/dict.txt"));
        assert_eq!(ModelType::Recognition.to_string(), "text recognition model");
    }

    #[test]
    fn test_missing_models_not_ready() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().join("models")).unwrap();
        assert!(manager.models_dir().exists());
        assert!(!manager.are_models_ready());
    }

    #[test]
    fn test_size_check() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();

        std::fs::write(manager.model_path(ModelType::Dictionary), "x\n".repeat(10)).unwrap();
        assert!(!manager.is_model_available(ModelType::Dictionary));

        std::fs::write(manager.model_path(ModelType::Dictionary), "x\n".repeat(500)).unwrap();
        assert!(manager.is_model_available(ModelType::Dictionary));
        assert_eq!(
            manager.ensure_model(ModelType::Dictionary).unwrap(),
            manager.model_path(ModelType::Dictionary)
        );
    }

    #[test]
    fn test_manifest_keeps_latest_entry_per_model() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        assert!(manager.load_manifest().unwrap().models.is_empty());

        manager.record_in_manifest(ModelType::Dictionary, entry("abc", 900)).unwrap();
        manager.record_in_manifest(ModelType::Dictionary, entry("def", 1000)).unwrap();
        manager.record_in_manifest(ModelType::Detection, entry("123", 3_000_000)).unwrap();

        let manifest = manager.load_manifest().unwrap();
        assert_eq!(manifest.models.len(), 2);
        assert_eq!(manifest.models[&ModelType::Dictionary], entry("def", 1000));

        let raw = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(raw.contains("\"dictionary\""));
    }

    #[test]
    fn test_corrupt_manifest_is_replaced() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_dir(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "not json").unwrap();

        assert!(manager.load_manifest().is_err());
        manager.record_in_manifest(ModelType::Recognition, entry("r", 8_000_000)).unwrap();
        assert_eq!(manager.load_manifest().unwrap().models.len(), 1);
    }
}
