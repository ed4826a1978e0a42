use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::IntoResponse;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use carfuse::client::{GenerationPayload, ImageGenerator};
use carfuse::core::params::{FuseParams, MAX_ARTIFACT_BYTES};
use carfuse::server::{AppState, router};
use carfuse::{
    ClientConfig, FuseFailure, Fuser, FusionResult, GenerationMode, OpenAiImageClient,
    UpstreamError, stage_file,
};

#[derive(Clone, Default)]
struct RecordingGenerator {
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<GenerationPayload>>>,
}

impl ImageGenerator for RecordingGenerator {
    async fn submit(&self, payload: GenerationPayload) -> Result<FusionResult, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(payload);
        Ok(FusionResult::new("https://images.test/fused.png"))
    }
}

fn params(work_dir: &Path, mode: GenerationMode) -> FuseParams {
    FuseParams {
        mode,
        work_dir: work_dir.to_path_buf(),
        max_artifact_bytes: MAX_ARTIFACT_BYTES,
    }
}

fn write_jpeg(path: &Path, width: u32, height: u32) {
    RgbImage::from_pixel(width, height, Rgb([20, 60, 200]))
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

fn write_gradient_png(path: &Path, side: u32) {
    RgbaImage::from_fn(side, side, |x, y| {
        Rgba([x as u8, y as u8, (x ^ y) as u8, 255])
    })
    .save_with_format(path, ImageFormat::Png)
    .unwrap();
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

/// Two user files staged into `work`, the way the CLI does it.
async fn stage_pair(
    sources: &Path,
    work: &Path,
    first: (&str, fn(&Path)),
    second: (&str, fn(&Path)),
) -> (carfuse::UploadedImage, carfuse::UploadedImage) {
    let a = sources.join(first.0);
    let b = sources.join(second.0);
    first.1(&a);
    second.1(&b);
    let car1 = stage_file(work, &a).await.unwrap();
    let car2 = stage_file(work, &b).await.unwrap();
    (car1, car2)
}

fn big_jpeg(path: &Path) {
    write_jpeg(path, 2000, 1000)
}

fn small_jpeg(path: &Path) {
    write_jpeg(path, 100, 100)
}

fn gradient(path: &Path) {
    write_gradient_png(path, 300)
}

fn garbage(path: &Path) {
    std::fs::write(path, b"definitely not an image").unwrap();
}

fn huge_jpeg(path: &Path) {
    write_jpeg(path, 3000, 2000)
}

/// Pseudo-random RGB over opaque alpha; PNG cannot compress it much.
fn write_noise_png(path: &Path, width: u32, height: u32) {
    let mut state = width.wrapping_mul(7919) ^ height;
    RgbaImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        Rgba([next(), next(), next(), 255])
    })
    .save_with_format(path, ImageFormat::Png)
    .unwrap();
}

fn wide_noise(path: &Path) {
    write_noise_png(path, 1024, 256)
}

fn tall_noise(path: &Path) {
    write_noise_png(path, 256, 1024)
}

/// Accept one connection, record the request head, answer with `status` and `body`.
async fn one_shot_backend(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];

        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let lower = head.to_lowercase();

        let content_length = lower
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        match content_length {
            Some(len) => {
                while buf.len() < head_end + len {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
            None if lower.contains("transfer-encoding: chunked") => {
                while !buf.ends_with(b"0\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
            None => {}
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(head);
    });

    (format!("http://{addr}"), rx)
}

/// Accept one connection, swallow the request and never answer.
async fn silent_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut chunk = [0u8; 8192];
        while let Ok(n) = socket.read(&mut chunk).await {
            if n == 0 {
                break;
            }
        }
    });

    format!("http://{addr}")
}

/// Poll until `dir` is empty or `deadline` passes; returns what is left.
async fn wait_until_empty(dir: &Path, deadline: Duration) -> Vec<PathBuf> {
    let start = tokio::time::Instant::now();
    loop {
        let left = files_in(dir);
        if left.is_empty() || start.elapsed() > deadline {
            return left;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn http_client(base_url: String, timeout: Duration) -> OpenAiImageClient {
    OpenAiImageClient::new(ClientConfig {
        base_url,
        timeout,
        ..ClientConfig::new("sk-test")
    })
    .unwrap()
}

#[tokio::test]
async fn successful_fusion_cleans_up_and_describes() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let generator = RecordingGenerator::default();
    let fuser = Fuser::new(
        generator.clone(),
        params(work.path(), GenerationMode::EditWithMask),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("civic.jpg", big_jpeg),
        ("model3.final.jpg", small_jpeg),
    )
    .await;
    let result = fuser.fuse(car1, car2).await.unwrap();

    assert_eq!(result.image, "https://images.test/fused.png");
    assert_eq!(
        result.description.as_deref(),
        Some("Generated fusion of civic and model3 into a single hybrid car, fully visible and centered")
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let payload = generator.last.lock().unwrap().take().unwrap();
    match payload {
        GenerationPayload::Edit {
            image,
            mask,
            prompt,
            n,
            size,
        } => {
            assert_eq!(n, 1);
            assert_eq!(size, "1024x1024");
            assert!(prompt.contains("civic") && prompt.contains("model3"));
            assert_eq!(
                image::load_from_memory(&image).unwrap().to_rgba8().dimensions(),
                (1024, 1024)
            );
            let mask = image::load_from_memory(&mask).unwrap().to_rgba8();
            assert!(mask.pixels().all(|p| p.0 == [0, 0, 0, 0]));
        }
        other => panic!("expected an edit payload, got {other:?}"),
    }

    assert!(files_in(work.path()).is_empty());
    assert_eq!(files_in(sources.path()).len(), 2);
}

#[tokio::test]
async fn oversized_artifact_never_reaches_the_backend() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let generator = RecordingGenerator::default();
    let fuser = Fuser::new(
        generator.clone(),
        FuseParams {
            max_artifact_bytes: 1024,
            ..params(work.path(), GenerationMode::EditWithMask)
        },
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("a.png", gradient),
        ("b.png", gradient),
    )
    .await;
    let failure = fuser.fuse(car1, car2).await.unwrap_err();

    assert!(matches!(failure, FuseFailure::Preprocess(_)));
    let message = failure.to_string();
    assert!(message.starts_with("Preprocessing failed: "), "{message}");
    assert!(message.contains("exceeds size limit"), "{message}");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn undecodable_upload_is_a_preprocessing_failure() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let generator = RecordingGenerator::default();
    let fuser = Fuser::new(
        generator.clone(),
        params(work.path(), GenerationMode::EditWithMask),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("civic.jpg", small_jpeg),
        ("junk.png", garbage),
    )
    .await;
    let failure = fuser.fuse(car1, car2).await.unwrap_err();

    assert!(failure.is_client_error());
    assert!(failure.to_string().contains("car2"), "{failure}");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn prompt_only_mode_skips_the_composite() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let generator = RecordingGenerator::default();
    let fuser = Fuser::new(
        generator.clone(),
        params(work.path(), GenerationMode::PromptOnly),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("civic.jpg", small_jpeg),
        ("beetle.jpg", small_jpeg),
    )
    .await;
    fuser.fuse(car1, car2).await.unwrap();

    let payload = generator.last.lock().unwrap().take().unwrap();
    assert!(matches!(
        payload,
        GenerationPayload::Generate { size: "1024x1792", n: 1, .. }
    ));
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn upstream_error_message_is_surfaced_as_fusion_failure() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let (base_url, head) = one_shot_backend(
        "500 Internal Server Error",
        r#"{"error":{"message":"The server had an error processing your request"}}"#,
    )
    .await;
    let fuser = Fuser::new(
        http_client(base_url, Duration::from_secs(10)),
        params(work.path(), GenerationMode::EditWithMask),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("civic.jpg", small_jpeg),
        ("beetle.jpg", small_jpeg),
    )
    .await;
    let failure = fuser.fuse(car1, car2).await.unwrap_err();

    assert!(!failure.is_client_error());
    assert_eq!(
        failure.to_string(),
        "Fusion failed: The server had an error processing your request"
    );

    let head = head.await.unwrap().to_lowercase();
    assert!(head.starts_with("post /v1/images/edits "), "{head}");
    assert!(head.contains("authorization: bearer sk-test"), "{head}");
    assert!(head.contains("multipart/form-data"), "{head}");
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn http_backend_success_returns_first_url() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let (base_url, head) = one_shot_backend(
        "200 OK",
        r#"{"created":1,"data":[{"url":"https://cdn.test/hybrid.png"}]}"#,
    )
    .await;
    let fuser = Fuser::new(
        http_client(base_url, Duration::from_secs(10)),
        params(work.path(), GenerationMode::PromptOnly),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("civic.jpg", small_jpeg),
        ("beetle.jpg", small_jpeg),
    )
    .await;
    let result = fuser.fuse(car1, car2).await.unwrap();

    assert_eq!(result.image, "https://cdn.test/hybrid.png");
    assert!(result.description.is_some());
    let head = head.await.unwrap().to_lowercase();
    assert!(head.starts_with("post /v1/images/generations "), "{head}");
    assert!(head.contains("application/json"), "{head}");
    assert!(files_in(work.path()).is_empty());
}

async fn spawn_service(work: &Path) -> (String, RecordingGenerator) {
    let generator = RecordingGenerator::default();
    let fuser = Fuser::new(
        generator.clone(),
        params(work, GenerationMode::EditWithMask),
    )
    .unwrap();
    let app = router(Arc::new(AppState::new(fuser)), 25 * 1024 * 1024);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/fuse"), generator)
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

#[tokio::test]
async fn service_fuses_a_multipart_upload() {
    let work = tempfile::tempdir().unwrap();
    let (url, generator) = spawn_service(work.path()).await;

    let form = reqwest::multipart::Form::new()
        .part(
            "car1",
            reqwest::multipart::Part::bytes(jpeg_bytes(640, 480)).file_name("civic.jpg"),
        )
        .part(
            "car2",
            reqwest::multipart::Part::bytes(jpeg_bytes(120, 90)).file_name("mustang.jpeg"),
        );
    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["image"], "https://images.test/fused.png");
    assert_eq!(
        json["description"],
        "Generated fusion of civic and mustang into a single hybrid car, fully visible and centered"
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn service_rejects_a_missing_field_and_cleans_up() {
    let work = tempfile::tempdir().unwrap();
    let (url, generator) = spawn_service(work.path()).await;

    let form = reqwest::multipart::Form::new().part(
        "car1",
        reqwest::multipart::Part::bytes(jpeg_bytes(300, 300)).file_name("civic.jpg"),
    );
    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        "Preprocessing failed: missing file field car2"
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn oversized_composite_is_cleaned_up() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let generator = RecordingGenerator::default();
    // Each noisy band encodes to roughly 1 MB; their union on the canvas cannot fit
    let fuser = Fuser::new(
        generator.clone(),
        FuseParams {
            max_artifact_bytes: 1_200_000,
            ..params(work.path(), GenerationMode::EditWithMask)
        },
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("wide.png", wide_noise),
        ("tall.png", tall_noise),
    )
    .await;
    let failure = fuser.fuse(car1, car2).await.unwrap_err();

    assert!(failure.is_client_error());
    let message = failure.to_string();
    assert!(
        message.starts_with("Preprocessing failed: composite exceeds size limit"),
        "{message}"
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn backend_timeout_is_a_fusion_failure() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let base_url = silent_backend().await;
    let fuser = Fuser::new(
        http_client(base_url, Duration::from_secs(1)),
        params(work.path(), GenerationMode::EditWithMask),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("civic.jpg", small_jpeg),
        ("beetle.jpg", small_jpeg),
    )
    .await;
    let failure = fuser.fuse(car1, car2).await.unwrap_err();

    assert!(matches!(
        failure.error(),
        carfuse::Error::Upstream(UpstreamError::Timeout(_))
    ));
    assert_eq!(failure.to_string(), "Fusion failed: request timed out after 1s");
    assert_eq!(
        failure.into_response().status(),
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    );
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn empty_data_array_is_a_malformed_response() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let (base_url, _head) = one_shot_backend("200 OK", r#"{"created":1,"data":[]}"#).await;
    let fuser = Fuser::new(
        http_client(base_url, Duration::from_secs(10)),
        params(work.path(), GenerationMode::EditWithMask),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("civic.jpg", small_jpeg),
        ("beetle.jpg", small_jpeg),
    )
    .await;
    let failure = fuser.fuse(car1, car2).await.unwrap_err();

    assert_eq!(failure.to_string(), "Fusion failed: malformed response");
    assert!(!failure.is_client_error());
    assert!(files_in(work.path()).is_empty());
}

#[tokio::test]
async fn dropping_a_request_mid_normalization_leaves_nothing_behind() {
    let sources = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let generator = RecordingGenerator::default();
    let fuser = Fuser::new(
        generator.clone(),
        params(work.path(), GenerationMode::EditWithMask),
    )
    .unwrap();

    let (car1, car2) = stage_pair(
        sources.path(),
        work.path(),
        ("a.jpg", huge_jpeg),
        ("b.jpg", huge_jpeg),
    )
    .await;
    // The request future is dropped when the timeout fires, like a client disconnect
    let _ = tokio::time::timeout(Duration::from_millis(50), fuser.fuse(car1, car2)).await;

    let left = wait_until_empty(work.path(), Duration::from_secs(60)).await;
    assert!(left.is_empty(), "left after cancel: {left:?}");
}

#[tokio::test]
async fn service_rejects_a_non_multipart_body() {
    let work = tempfile::tempdir().unwrap();
    let (url, generator) = spawn_service(work.path()).await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({"car1": "civic.jpg"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body = response.text().await.unwrap();
    assert!(body.starts_with("Preprocessing failed: invalid upload: "), "{body}");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(files_in(work.path()).is_empty());
}
