//! Shared types and enums used across carfuse.
//! Includes `GenerationMode`, the upload `Slot`, and the artifact records passed
//! between the normalizer, the composite builder and the orchestrator.
use std::path::PathBuf;

use clap::ValueEnum;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// Which generation call follows preprocessing.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    /// Composite + blank mask submitted to the edit endpoint.
    #[default]
    EditWithMask,
    /// Text prompt only, submitted to the generation endpoint.
    PromptOnly,
}

impl GenerationMode {
    /// Output size requested from the backend.
    pub fn target_size(self) -> &'static str {
        match self {
            GenerationMode::EditWithMask => "1024x1024",
            GenerationMode::PromptOnly => "1024x1792",
        }
    }

    /// Edit mode is the only one that needs a composite and a mask.
    pub fn needs_composite(self) -> bool {
        matches!(self, GenerationMode::EditWithMask)
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::EditWithMask => write!(f, "EditWithMask"),
            GenerationMode::PromptOnly => write!(f, "PromptOnly"),
        }
    }
}

/// Upload field an image arrived in.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Slot {
    Car1,
    Car2,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Car1, Slot::Car2];

    /// Multipart field name, also used as the fallback display name.
    pub fn field_name(self) -> &'static str {
        match self {
            Slot::Car1 => "car1",
            Slot::Car2 => "car2",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Slot> {
        match name {
            "car1" => Some(Slot::Car1),
            "car2" => Some(Slot::Car2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// An upload re-encoded to the canonical format within the dimension bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: u64,
}

/// Both normalized images centered on the fixed canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub size_bytes: u64,
}

/// Fully transparent mask matching the composite (edit mode only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// What the caller gets back; the intermediate files never leave the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionResult {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FusionResult {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
