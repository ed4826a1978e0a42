#![doc = r#"
CARFUSE: fuse two car photos into one generated hybrid car image.

The crate takes two uploaded images through a fixed pipeline: validate and normalize
each image to a bounded PNG, compose both onto a white 1024x1024 canvas with a blank
mask, submit exactly one request to an OpenAI-compatible images API, and return the
resulting image URL. Every file a request touches (the raw uploads included) is
deleted before the request completes, whatever the outcome.

It powers the `carfuse` binary (HTTP service and one-shot CLI) and can be embedded in
your own Rust applications.

Add dependency
--------------
```toml
[dependencies]
carfuse = "0.1"
```

Quick start: run the HTTP service
---------------------------------
```rust,no_run
use std::sync::Arc;
use carfuse::{ClientConfig, FuseParams, Fuser, OpenAiImageClient};
use carfuse::server::{self, AppState, DEFAULT_MAX_UPLOAD_BYTES};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = OpenAiImageClient::new(ClientConfig::new("sk-..."))?;
    let fuser = Fuser::new(client, FuseParams::default())?;
    let state = Arc::new(AppState::new(fuser));
    server::serve(state, "0.0.0.0:3000".parse()?, DEFAULT_MAX_UPLOAD_BYTES).await?;
    Ok(())
}
```

Fuse two local files
--------------------
The pipeline deletes its inputs, so stage copies of user files first.

```rust,no_run
use std::path::Path;
use carfuse::{ClientConfig, FuseParams, Fuser, OpenAiImageClient, stage_file};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fuser = Fuser::new(
        OpenAiImageClient::new(ClientConfig::new("sk-..."))?,
        FuseParams::default(),
    )?;
    let dir = fuser.params().work_dir.clone();
    let car1 = stage_file(&dir, Path::new("civic.jpg")).await?;
    let car2 = stage_file(&dir, Path::new("model3.png")).await?;

    match fuser.fuse(car1, car2).await {
        Ok(result) => println!("{}", result.image),
        Err(failure) if failure.is_client_error() => eprintln!("bad input: {failure}"),
        Err(failure) => eprintln!("backend: {failure}"),
    }
    Ok(())
}
```

Plugging in another backend
---------------------------
```rust
use carfuse::client::{GenerationPayload, ImageGenerator};
use carfuse::{FusionResult, UpstreamError};

struct Canned;

impl ImageGenerator for Canned {
    async fn submit(&self, _payload: GenerationPayload) -> Result<FusionResult, UpstreamError> {
        Ok(FusionResult::new("https://example.com/fused.png"))
    }
}
```

Useful modules
--------------
- [`api`]: the fusion orchestrator and its failure type.
- [`server`]: the `POST /fuse` HTTP surface.
- [`client`]: the generation backend trait and the OpenAI adapter.
- [`core`]: dimension policy, resizing, compositing, prompt text, artifact cleanup.
- [`io`]: upload staging and PNG writing.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod client;
pub mod core;
pub mod error;
pub mod io;
pub mod server;
pub mod types;

// Curated public API surface
// Types
pub use core::params::FuseParams;
pub use error::{Error, Result, UpstreamError};
pub use types::{
    CompositeArtifact, FusionResult, GenerationMode, MaskArtifact, NormalizedImage, Slot,
};

// Backend
pub use client::{ClientConfig, ImageGenerator, OpenAiImageClient};

// Staging helpers
pub use io::{UploadedImage, stage_bytes, stage_file};

// High-level API re-exports
pub use api::{FuseFailure, Fuser, Stage};
