use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use carfuse::api::Fuser;
use carfuse::client::{ClientConfig, OpenAiImageClient};
use carfuse::core::params::FuseParams;
use carfuse::io::stage_file;
use carfuse::server::{self, AppState};

use super::args::{CliArgs, Command, FuseArgs, GenerationArgs, ServeArgs};
use super::errors::AppError;

fn init_logging(debug: bool) {
    let default = if debug { "carfuse=debug" } else { "carfuse=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_fuser(args: &GenerationArgs) -> Result<Fuser<OpenAiImageClient>, AppError> {
    if args.timeout_secs == 0 {
        return Err(AppError::ZeroTimeout {
            secs: args.timeout_secs,
        });
    }

    let config = ClientConfig {
        api_key: args.api_key.clone(),
        base_url: args.base_url.clone(),
        model: args.model.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    };
    info!("Images backend: {} ({:?} timeout)", config.base_url, config.timeout);
    let client = OpenAiImageClient::new(config)?;

    let params = FuseParams {
        mode: args.mode,
        work_dir: args.work_dir.clone(),
        ..FuseParams::default()
    };
    info!("Mode: {}, work dir: {:?}", params.mode, params.work_dir);
    Ok(Fuser::new(client, params)?)
}

async fn run_serve(args: ServeArgs) -> Result<(), AppError> {
    if args.max_upload_mb == 0 {
        return Err(AppError::ZeroUploadLimit {
            mb: args.max_upload_mb,
        });
    }
    let ip: IpAddr = args.host.parse().map_err(|_| AppError::InvalidAddress {
        host: args.host.clone(),
        port: args.port,
    })?;
    let addr = SocketAddr::new(ip, args.port);

    let fuser = build_fuser(&args.generation)?;
    let state = Arc::new(AppState::new(fuser));
    server::serve(state, addr, args.max_upload_mb * 1024 * 1024).await?;
    Ok(())
}

async fn run_fuse(args: FuseArgs) -> Result<(), AppError> {
    for input in [&args.car1, &args.car2] {
        if !input.is_file() {
            return Err(AppError::MissingInput {
                path: input.display().to_string(),
            });
        }
    }

    let fuser = build_fuser(&args.generation)?;
    let dir = fuser.params().work_dir.clone();

    // Stage copies; the pipeline deletes its inputs
    let car1 = stage_file(&dir, &args.car1).await?;
    let car2 = match stage_file(&dir, &args.car2).await {
        Ok(upload) => upload,
        Err(e) => {
            carfuse::core::artifacts::remove_quietly(&car1.path);
            return Err(e.into());
        }
    };

    info!("Fusing {:?} and {:?}", args.car1, args.car2);
    let result = fuser
        .fuse(car1, car2)
        .await
        .map_err(|failure| AppError::Fuse(failure.to_string()))?;

    let json = serde_json::to_string_pretty(&result).map_err(carfuse::Error::external)?;
    println!("{}", json);
    Ok(())
}

pub async fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);

    match args.command {
        Command::Serve(serve) => run_serve(serve).await?,
        Command::Fuse(fuse) => run_fuse(fuse).await?,
    }
    Ok(())
}
