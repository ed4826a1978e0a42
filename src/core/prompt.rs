/// Text sent to the generation backend, built from the two display names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionPrompt(String);

impl FusionPrompt {
    /// `canvas` is the requested output size, e.g. `1024x1024`.
    pub fn new(first: &str, second: &str, canvas: &str) -> Self {
        Self(format!(
            "A single, photorealistic hybrid car seamlessly fused from unique parts of a \
             {first} and a {second}, shown from a perfect side profile with the entire car \
             (front bumper to rear bumper) fully visible, perfectly centered with generous \
             space on all sides on a {canvas} white background, with vibrant colors, detailed \
             styling, and a natural, unified design, ensuring no cropping."
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for FusionPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary returned next to the generated image.
pub fn fusion_description(first: &str, second: &str) -> String {
    format!(
        "Generated fusion of {first} and {second} into a single hybrid car, fully visible and centered"
    )
}
