//! HTTP handlers

pub mod health;
pub mod info;
pub mod predict;

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::camera::tests::{frame, FakeSource};
    use crate::camera::VideoSource;
    use crate::config::Config;
    use crate::model::{Detection, Detector, InferenceError, ModelState};
    use crate::{create_router, AppState};

    const BOUNDARY: &str = "darkcircleboundary";

    struct CountingDetector {
        detections: Vec<Detection>,
        calls: AtomicUsize,
    }

    impl Detector for CountingDetector {
        fn detect(&self, _: &RgbImage, _: f32) -> Result<Vec<Detection>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.clone())
        }

        fn class_name(&self, class_id: usize) -> Option<&str> {
            ["High", "Low", "Moderate", "No"].get(class_id).copied()
        }
    }

    fn detector(detections: Vec<Detection>) -> Arc<CountingDetector> {
        Arc::new(CountingDetector { detections, calls: AtomicUsize::new(0) })
    }

    fn app(detector: Option<Arc<CountingDetector>>, camera: Arc<dyn VideoSource>) -> Router {
        app_with_config(detector, camera, Config::default())
    }

    fn app_with_config(
        detector: Option<Arc<CountingDetector>>,
        camera: Arc<dyn VideoSource>,
        config: Config,
    ) -> Router {
        let model = match detector {
            Some(d) => ModelState {
                handle: Some(d as Arc<dyn Detector>),
                path: Some(PathBuf::from("best.onnx")),
                strategy: Some("optimized"),
            },
            None => ModelState::default(),
        };
        create_router(AppState::new(model, config, camera))
    }

    fn jpeg() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([200, 180, 170])));
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg).unwrap();
        buf
    }

    fn upload(content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"face.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn no_camera() -> Arc<dyn VideoSource> {
        Arc::new(FakeSource::default())
    }

    #[tokio::test]
    async fn test_health_without_model() {
        let (status, body) = send(app(None, no_camera()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], false);
        assert!(body["model_path"].is_null());
    }

    #[tokio::test]
    async fn test_health_with_model() {
        let (_, body) = send(app(Some(detector(vec![])), no_camera()), get("/health")).await;
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["model_path"], "best.onnx");
    }

    #[tokio::test]
    async fn test_root_info() {
        let (status, body) = send(app(None, no_camera()), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Dark Circles Detection API");
        assert_eq!(body["model_path"], "Not loaded");
        assert!(body["endpoints"]["/predict/camera"].is_string());
        assert_eq!(body["stats"]["inference_count"], 0);
    }

    #[tokio::test]
    async fn test_predict_without_model_is_503() {
        let (status, body) = send(app(None, no_camera()), upload("image/jpeg", &jpeg())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Model not loaded. Please check server logs.");

    }

    #[tokio::test]
    async fn test_non_image_rejected_without_model() {
        let (status, body) = send(app(None, no_camera()), upload("text/plain", b"hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "File must be an image");
    }

    #[tokio::test]
    async fn test_camera_without_model_is_503() {
        let source = Arc::new(FakeSource { frame: Some(frame(4, 4, [1, 2, 3])), ..Default::default() });
        let (status, _) = send(app(None, source.clone()), post("/predict/camera")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(source.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_image_rejected_before_decoding() {
        let det = detector(vec![]);
        let (status, body) = send(app(Some(det.clone()), no_camera()), upload("text/plain", b"not an image")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "File must be an image");
        assert_eq!(det.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let body = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{BOUNDARY}--\r\n");
        let req = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        let (status, body) = send(app(Some(detector(vec![])), no_camera()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_upload_with_no_detection() {
        let (status, body) = send(app(Some(detector(vec![])), no_camera()), upload("image/jpeg", &jpeg())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["class_name"], "No");
        assert_eq!(body["prediction"], "No");
        assert!(body["confidence"].is_null());
        assert_eq!(body["causes"], "No significant dark circles detected! 👏");
    }

    #[tokio::test]
    async fn test_upload_with_detection() {
        let det = detector(vec![
            Detection { class_id: 0, confidence: 0.5, bbox: [0.0, 0.0, 4.0, 4.0] },
            Detection { class_id: 1, confidence: 0.9, bbox: [0.0, 0.0, 4.0, 4.0] },
        ]);
        let (status, body) = send(app(Some(det.clone()), no_camera()), upload("image/jpeg", &jpeg())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["class_name"], "High");
        assert_eq!(body["confidence"], 0.5);
        assert_eq!(det.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_image_is_500() {
        let det = detector(vec![]);
        let (status, body) = send(app(Some(det.clone()), no_camera()), upload("image/png", b"definitely not a png")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().starts_with("Error processing image"));
        assert_eq!(det.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let det = detector(vec![]);
        let config = Config { max_upload_bytes: 512, ..Config::default() };
        let app = app_with_config(Some(det.clone()), no_camera(), config);

        let (status, body) = send(app, upload("image/jpeg", &vec![0u8; 8 * 1024])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["status"], 413);
        assert_eq!(det.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_camera_prediction() {
        let source = Arc::new(FakeSource { frame: Some(frame(8, 8, [10, 20, 30])), ..Default::default() });
        let det = detector(vec![Detection { class_id: 2, confidence: 0.61, bbox: [0.0, 0.0, 1.0, 1.0] }]);
        let (status, body) = send(app(Some(det), source.clone()), post("/predict/camera")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["class_name"], "Moderate");
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_camera_releases_device_when_capture_fails() {
        let source = Arc::new(FakeSource::default());
        let (status, body) = send(app(Some(detector(vec![])), source.clone()), post("/predict/camera")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Failed to capture image from camera");
        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_camera_open_failure_reports_index() {
        let source = Arc::new(FakeSource { fail_open: true, ..Default::default() });
        let (status, body) = send(app(Some(detector(vec![])), source), post("/predict/camera?camera_index=2")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("index 2"));
    }
}
