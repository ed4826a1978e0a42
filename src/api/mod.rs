//! High-level entry point: the fusion orchestrator. It owns both uploads for the
//! duration of a request, runs normalization and compositing, submits exactly one
//! generation call, and releases every artifact on every exit path.
use std::path::{Path, PathBuf};

use tokio::task::JoinError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{GenerationPayload, IMAGE_COUNT, ImageGenerator};
use crate::core::artifacts::{ArtifactGuard, ReleaseSignal};
use crate::core::params::FuseParams;
use crate::core::processing::normalize::normalize_image;
use crate::core::processing::pipeline::build_composite;
use crate::core::prompt::{FusionPrompt, fusion_description};
use crate::error::{Error, Result};
use crate::io::upload::UploadedImage;
use crate::types::{CompositeArtifact, FusionResult, GenerationMode, MaskArtifact, NormalizedImage, Slot};

/// Where a request is in its lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Normalizing(Slot),
    Composing,
    Submitting,
    Completed,
    PreprocessFailed,
    FusionFailed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Received => write!(f, "Received"),
            Stage::Normalizing(slot) => write!(f, "Normalizing({})", slot),
            Stage::Composing => write!(f, "Composing"),
            Stage::Submitting => write!(f, "Submitting"),
            Stage::Completed => write!(f, "Completed"),
            Stage::PreprocessFailed => write!(f, "PreprocessFailed"),
            Stage::FusionFailed => write!(f, "FusionFailed"),
        }
    }
}

/// Terminal failure of a fusion request, tagged with the phase that failed.
#[derive(Debug)]
pub enum FuseFailure {
    /// Validation or compositing failed; the backend was never contacted.
    Preprocess(Error),
    /// The backend call (or assembling its payload) failed.
    Fusion(Error),
}

impl FuseFailure {
    pub fn stage(&self) -> Stage {
        match self {
            FuseFailure::Preprocess(_) => Stage::PreprocessFailed,
            FuseFailure::Fusion(_) => Stage::FusionFailed,
        }
    }

    pub fn error(&self) -> &Error {
        match self {
            FuseFailure::Preprocess(e) | FuseFailure::Fusion(e) => e,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, FuseFailure::Preprocess(_))
    }
}

impl std::fmt::Display for FuseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuseFailure::Preprocess(e) => write!(f, "Preprocessing failed: {}", e),
            FuseFailure::Fusion(e) => write!(f, "Fusion failed: {}", e),
        }
    }
}

impl std::error::Error for FuseFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error())
    }
}

/// Per-request artifact locations, keyed by a request id rather than anything the
/// client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub car1: PathBuf,
    pub car2: PathBuf,
    pub composite: PathBuf,
    pub mask: PathBuf,
}

impl ArtifactPaths {
    pub fn new(work_dir: &Path, request_id: &Uuid) -> Self {
        Self {
            car1: work_dir.join(format!("{request_id}_car1_processed.png")),
            car2: work_dir.join(format!("{request_id}_car2_processed.png")),
            composite: work_dir.join(format!("{request_id}_base.png")),
            mask: work_dir.join(format!("{request_id}_mask.png")),
        }
    }

    pub fn processed(&self, slot: Slot) -> &Path {
        match slot {
            Slot::Car1 => &self.car1,
            Slot::Car2 => &self.car2,
        }
    }
}

struct Preprocessed {
    composite: Option<(CompositeArtifact, MaskArtifact)>,
}

/// Runs the whole upload → normalize → compose → generate → cleanup sequence.
#[derive(Debug)]
pub struct Fuser<G> {
    generator: G,
    params: FuseParams,
}

impl<G: ImageGenerator> Fuser<G> {
    pub fn new(generator: G, params: FuseParams) -> Result<Self> {
        params.validate()?;
        std::fs::create_dir_all(&params.work_dir)?;
        Ok(Self { generator, params })
    }

    pub fn params(&self) -> &FuseParams {
        &self.params
    }

    /// Fuse two uploads into one generated image. Both uploads are deleted before
    /// this returns, whatever the outcome, together with every intermediate file.
    pub async fn fuse(
        &self,
        car1: UploadedImage,
        car2: UploadedImage,
    ) -> std::result::Result<FusionResult, FuseFailure> {
        let request_id = Uuid::new_v4();
        let mut artifacts = ArtifactGuard::new();
        artifacts.register(&car1.path);
        artifacts.register(&car2.path);
        debug!("[{}] {}", request_id, Stage::Received);

        let outcome = self
            .run(&request_id, &car1, &car2, &mut artifacts)
            .await;

        let removed = artifacts.release();
        debug!("[{}] released {} artifact(s)", request_id, removed);

        match &outcome {
            Ok(result) => info!("[{}] {}: {}", request_id, Stage::Completed, result.image),
            Err(failure) => warn!("[{}] {}: {}", request_id, failure.stage(), failure.error()),
        }
        outcome
    }

    async fn run(
        &self,
        request_id: &Uuid,
        car1: &UploadedImage,
        car2: &UploadedImage,
        artifacts: &mut ArtifactGuard,
    ) -> std::result::Result<FusionResult, FuseFailure> {
        let mode = self.params.mode;
        let paths = ArtifactPaths::new(&self.params.work_dir, request_id);

        let prepared = self
            .preprocess(request_id, car1, car2, &paths, artifacts)
            .await
            .map_err(FuseFailure::Preprocess)?;

        let first = car1.display_name(Slot::Car1);
        let second = car2.display_name(Slot::Car2);
        let prompt = FusionPrompt::new(&first, &second, mode.target_size());

        let payload = assemble_payload(mode, prompt, prepared)
            .await
            .map_err(FuseFailure::Fusion)?;
        debug!("[{}] {} ({})", request_id, Stage::Submitting, payload.size());

        let result = self
            .generator
            .submit(payload)
            .await
            .map_err(|e| FuseFailure::Fusion(e.into()))?;

        Ok(match result.description {
            Some(_) => result,
            None => result.with_description(fusion_description(&first, &second)),
        })
    }

    async fn preprocess(
        &self,
        request_id: &Uuid,
        car1: &UploadedImage,
        car2: &UploadedImage,
        paths: &ArtifactPaths,
        artifacts: &mut ArtifactGuard,
    ) -> Result<Preprocessed> {
        let max_bytes = self.params.max_artifact_bytes;

        let first_out = artifacts.register(paths.processed(Slot::Car1));
        let second_out = artifacts.register(paths.processed(Slot::Car2));
        debug!(
            "[{}] {} / {}",
            request_id,
            Stage::Normalizing(Slot::Car1),
            Stage::Normalizing(Slot::Car2)
        );

        let signal = artifacts.signal();
        let first = spawn_normalize(&signal, car1.path.clone(), first_out, Slot::Car1, max_bytes);
        let second = spawn_normalize(&signal, car2.path.clone(), second_out, Slot::Car2, max_bytes);
        // Wait for both even if one fails, so nothing writes after cleanup
        let (first, second) = tokio::join!(first, second);
        let first = flatten(first, "car1 normalization")?;
        let second = flatten(second, "car2 normalization")?;

        if !self.params.mode.needs_composite() {
            return Ok(Preprocessed { composite: None });
        }

        debug!("[{}] {}", request_id, Stage::Composing);
        let composite_out = artifacts.register(&paths.composite);
        let mask_out = artifacts.register(&paths.mask);
        let built = tokio::task::spawn_blocking(move || {
            let built =
                build_composite(&first, &second, &composite_out, Some(mask_out.as_path()), max_bytes);
            signal.sweep(&[composite_out.as_path(), mask_out.as_path()]);
            built
        })
        .await;

        match flatten(built, "compositing")? {
            (composite, Some(mask)) => Ok(Preprocessed {
                composite: Some((composite, mask)),
            }),
            (_, None) => Err(Error::Processing("mask was not produced".to_string())),
        }
    }
}

/// The worker sweeps its own output if the request was dropped while it ran.
fn spawn_normalize(
    signal: &ReleaseSignal,
    source: PathBuf,
    output: PathBuf,
    slot: Slot,
    max_bytes: u64,
) -> tokio::task::JoinHandle<Result<NormalizedImage>> {
    let signal = signal.clone();
    tokio::task::spawn_blocking(move || {
        let normalized = normalize_image(&source, &output, slot.field_name(), max_bytes);
        signal.sweep(&[output.as_path()]);
        normalized
    })
}

fn flatten<T>(joined: std::result::Result<Result<T>, JoinError>, what: &str) -> Result<T> {
    joined.map_err(|e| Error::Processing(format!("{what} task failed: {e}")))?
}

async fn assemble_payload(
    mode: GenerationMode,
    prompt: FusionPrompt,
    prepared: Preprocessed,
) -> Result<GenerationPayload> {
    match (mode, prepared.composite) {
        (GenerationMode::EditWithMask, Some((composite, mask))) => {
            let image = tokio::fs::read(&composite.path).await?;
            let mask = tokio::fs::read(&mask.path).await?;
            Ok(GenerationPayload::Edit {
                image,
                mask,
                prompt: prompt.into_string(),
                n: IMAGE_COUNT,
                size: mode.target_size(),
            })
        }
        (GenerationMode::EditWithMask, None) => {
            Err(Error::Processing("edit mode requires a composite".to_string()))
        }
        (GenerationMode::PromptOnly, _) => Ok(GenerationPayload::Generate {
            prompt: prompt.into_string(),
            n: IMAGE_COUNT,
            size: mode.target_size(),
        }),
    }
}
