use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use docprep::config::{Config, ProgramLimits, VisionConfig};
use docprep::engine::PrepEngine;
use docprep::error::PrepError;
use docprep::server::{build_router, AppState};
use docprep::vision::{ImagePayload, Prompt, VisionService};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower::ServiceExt;

const BOUNDARY: &str = "docprep-test-boundary";

/// Replays canned extractions and always answers generations the same way
struct FakeService {
    extractions: Mutex<VecDeque<String>>,
    generation: Result<String, String>,
    generation_delay: Duration,
}

impl FakeService {
    fn new(extractions: &[&str], generation: Result<&str, &str>) -> Self {
        Self {
            extractions: Mutex::new(extractions.iter().map(|s| s.to_string()).collect()),
            generation: generation.map(str::to_string).map_err(str::to_string),
            generation_delay: Duration::ZERO,
        }
    }

    /// Make every generation take `delay` before answering
    fn slow(mut self, delay: Duration) -> Self {
        self.generation_delay = delay;
        self
    }

    fn offline() -> Self {
        Self::new(&[], Err("connection refused"))
    }
}

impl VisionService for FakeService {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    fn extract_text(&self, _image: ImagePayload<'_>) -> Result<String, PrepError> {
        self.extractions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PrepError::Upstream("connection refused".to_string()))
    }

    fn generate(&self, _prompt: Prompt<'_>) -> Result<String, PrepError> {
        std::thread::sleep(self.generation_delay);
        self.generation.clone().map_err(PrepError::Upstream)
    }
}

fn test_config(max_file_size: usize) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_file_size,
        vision: VisionConfig {
            api_base_url: "http://127.0.0.1:1".to_string(),
            api_key: None,
            model: "fake-model".to_string(),
            max_tokens: 500,
            request_timeout: Duration::from_secs(5),
        },
        program: ProgramLimits::default(),
    }
}

fn app_with(service: FakeService, max_file_size: usize) -> Router {
    app_with_config(service, test_config(max_file_size))
}

fn app_with_config(service: FakeService, config: Config) -> Router {
    let engine = PrepEngine::new(Arc::new(service), config.program);
    build_router(AppState {
        engine: Arc::new(engine),
        config: Arc::new(config),
    })
}

fn app(service: FakeService) -> Router {
    app_with(service, 10 * 1024 * 1024)
}

fn document_png() -> Vec<u8> {
    let img = RgbImage::from_fn(48, 32, |x, y| {
        if (8..40).contains(&x) && (12..20).contains(&y) && x % 3 != 0 {
            Rgb([20, 20, 25])
        } else {
            Rgb([230, 225, 215])
        }
    });
    docprep::preprocessing::encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
    /// Plain field whose value is not necessarily UTF-8
    Bytes(&'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, data) => {
                let disposition = format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}.png\"\r\n",
                    name, name
                );
                body.extend_from_slice(disposition.as_bytes());
                body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
                body.extend_from_slice(data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                        .as_bytes(),
                );
            }
            Part::Bytes(name, data) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn post(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = app(FakeService::offline()).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_info_endpoint() {
    let response = app(FakeService::offline()).oneshot(get("/info")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let categories: Vec<&str> = json["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert_eq!(
        categories,
        vec![
            "license-plate",
            "table-image",
            "dark-background",
            "far-away-text",
            "ai-generated"
        ]
    );
    assert!(json["custom_options"]
        .as_array()
        .unwrap()
        .contains(&Value::from("noiseReduction")));
    assert_eq!(json["model"], "fake-model");
    assert_eq!(json["program_max_steps"], 32);
}

#[tokio::test]
async fn test_default_preprocess_returns_binary_png() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post("/preprocess", &[Part::File("file", &png)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(
        header(&response, "x-preprocess-steps"),
        "grayscale,gaussian_blur,adaptive_threshold,morph_close"
    );

    let out = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert!(matches!(out, DynamicImage::ImageLuma8(_)));
    assert_eq!((out.width(), out.height()), (48, 32));
}

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let response = app(FakeService::offline())
        .oneshot(post("/preprocess", &[Part::Text("note", "no file here")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_undecodable_file_is_bad_request() {
    let response = app(FakeService::offline())
        .oneshot(post("/preprocess", &[Part::File("file", b"definitely not a png")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "DECODE_ERROR");
}

#[tokio::test]
async fn test_oversized_file_is_rejected() {
    let big = vec![0u8; 4096];
    let response = app_with(FakeService::offline(), 1024)
        .oneshot(post("/preprocess", &[Part::File("file", &big)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["code"], "IMAGE_TOO_LARGE");
}

#[tokio::test]
async fn test_unknown_category_is_bad_request() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/category_preprocess/blueprint",
            &[Part::File("file", &png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNKNOWN_CATEGORY");
    assert!(json["error"].as_str().unwrap().contains("blueprint"));
}

#[tokio::test]
async fn test_license_plate_category() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/category_preprocess/license-plate",
            &[Part::File("file", &png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-preprocess-pipeline"), "license-plate");
    assert!(header(&response, "x-preprocess-steps").starts_with("grayscale,"));

    let out = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert!(matches!(out, DynamicImage::ImageLuma8(_)));
}

#[tokio::test]
async fn test_dark_background_category_keeps_color() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/category_preprocess/dark-background",
            &[Part::File("file", &png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let steps = header(&response, "x-preprocess-steps").to_string();
    let clahe = steps.find("clahe").unwrap();
    let denoise = steps.find("denoise_color").unwrap();
    assert!(clahe < denoise);

    let out = image::load_from_memory(&body_bytes(response).await).unwrap();
    assert!(matches!(out, DynamicImage::ImageRgb8(_)));
}

#[tokio::test]
async fn test_ai_generated_program_runs() {
    let png = document_png();
    let program = r#"{"steps": [{"op": "grayscale"}, {"op": "otsu_threshold"}, {"op": "output"}]}"#;
    let response = app(FakeService::new(&[], Ok(program)))
        .oneshot(post(
            "/category_preprocess/ai-generated",
            &[Part::File("file", &png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-preprocess-steps"), "grayscale,otsu_threshold");
}

#[tokio::test]
async fn test_ai_generated_without_output_fails() {
    let png = document_png();
    let program = r#"[{"op": "grayscale"}]"#;
    let response = app(FakeService::new(&[], Ok(program)))
        .oneshot(post(
            "/category_preprocess/ai-generated",
            &[Part::File("file", &png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "GENERATION_ERROR");
}

#[tokio::test]
async fn test_ai_generated_upstream_failure() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/category_preprocess/ai-generated",
            &[Part::File("file", &png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_ai_generated_request_is_cut_off_at_deadline() {
    let png = document_png();
    let service = FakeService::new(&[], Ok(r#"[{"op": "output"}]"#)).slow(Duration::from_secs(1));
    let mut config = test_config(10 * 1024 * 1024);
    config.vision.request_timeout = Duration::from_millis(100);
    config.program.time_budget = Duration::from_millis(100);

    let started = Instant::now();
    let response = app_with_config(service, config)
        .oneshot(post(
            "/category_preprocess/ai-generated",
            &[Part::File("file", &png)],
        ))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "EXECUTION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_custom_preprocess_without_options_is_identity() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post("/custom_preprocess", &[Part::File("file", &png)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-preprocess-steps"), "");

    let out = image::load_from_memory(&body_bytes(response).await).unwrap();
    let original = image::load_from_memory(&png).unwrap();
    assert_eq!(out.to_rgb8(), original.to_rgb8());
}

#[tokio::test]
async fn test_custom_preprocess_applies_options_in_order() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/custom_preprocess",
            &[
                Part::File("file", &png),
                Part::Text("morphologicalOperation", "true"),
                Part::Text("morphOperationType", "opening"),
                Part::Text("noiseReduction", "true"),
                Part::Text("blurKernelSize", "4"),
                Part::Text("edgeDetection", "not-a-bool"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "x-preprocess-steps"),
        "gaussian_blur,morph_open"
    );
}

#[tokio::test]
async fn test_custom_preprocess_tolerates_non_utf8_option_values() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/custom_preprocess",
            &[
                Part::File("file", &png),
                Part::Text("noiseReduction", "true"),
                Part::Bytes("blurKernelSize", &[0xff, 0xfe, b'7']),
                Part::Bytes("edgeDetection", &[0xc3, 0x28]),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-preprocess-steps"), "gaussian_blur");
}

#[tokio::test]
async fn test_extract_text() {
    let png = document_png();
    let response = app(FakeService::new(&["INVOICE 0042"], Err("unused")))
        .oneshot(post("/extract_text", &[Part::File("file", &png)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["extracted_text"], "INVOICE 0042");
}

#[tokio::test]
async fn test_compare_extractions() {
    let png = document_png();
    let response = app(FakeService::new(
        &["INV0ICE 0042", "INVOICE 0042"],
        Ok("The zero in INVOICE was corrected."),
    ))
    .oneshot(post(
        "/extract_text_preprocessed",
        &[
            Part::File("original_image", &png),
            Part::File("preprocessed_image", &png),
        ],
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["original_text"], "INV0ICE 0042");
    assert_eq!(json["preprocessed_text"], "INVOICE 0042");
    assert_eq!(json["direction"], "decreased");
    assert_eq!(json["qualitative_feedback"], "The zero in INVOICE was corrected.");

    let similarity = json["similarity"].as_f64().unwrap();
    assert!(similarity > 0.9 && similarity < 1.0);
    let percentage = json["similarity_percentage"].as_f64().unwrap();
    assert!((percentage - similarity * 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_compare_requires_both_images() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/extract_text_preprocessed",
            &[Part::File("original_image", &png)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_compare_upstream_failure() {
    let png = document_png();
    let response = app(FakeService::offline())
        .oneshot(post(
            "/extract_text_preprocessed",
            &[
                Part::File("original_image", &png),
                Part::File("preprocessed_image", &png),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "UPSTREAM_ERROR");
}
