//! In-process HTTP stub used by the transport tests.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: serde_json::to_vec(&value).unwrap(),
        }
    }

    pub fn bytes(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }
}

pub struct HttpStub {
    pub base_url: String,
    pub requests: mpsc::UnboundedReceiver<RecordedRequest>,
    task: JoinHandle<()>,
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serves every connection with `handler` until dropped.
pub async fn spawn_stub<F>(handler: F) -> HttpStub
where
    F: Fn(&RecordedRequest) -> StubResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (request_tx, requests) = mpsc::unbounded_channel();
    let handler = Arc::new(handler);
    let task = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let handler = Arc::clone(&handler);
            let request_tx = request_tx.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(stream, handler.as_ref()).await {
                    let _ = request_tx.send(request);
                }
            });
        }
    });
    HttpStub {
        base_url: format!("http://{}", addr),
        requests,
        task,
    }
}

async fn read_request<F>(mut stream: TcpStream, handler: &F) -> Option<RecordedRequest>
where
    F: Fn(&RecordedRequest) -> StubResponse,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let request = RecordedRequest {
        method,
        target,
        headers,
        body,
    };
    let response = handler(&request);
    let reason = if response.status < 400 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason,
        response.content_type,
        response.body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&response.body).await;
    let _ = stream.shutdown().await;
    Some(request)
}

/// A URL nothing is listening on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub mod fakes {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use tokio::sync::Notify;

    use crate::capture::{MediaSource, VideoConstraints};
    use crate::encoding::EncodedImage;
    use crate::error::{CaptureError, InferenceError};
    use crate::inference::{InferenceClient, UploadedImage};
    use crate::pipeline::types::{Detection, DetectionParameters, InferenceResult};

    /// Camera whose readiness and availability are switched by the test.
    pub struct FakeSource {
        pub ready: Arc<AtomicBool>,
        pub acquired: Arc<AtomicBool>,
        pub acquisitions: Arc<AtomicUsize>,
        pub captures: Arc<AtomicUsize>,
        available: bool,
        surface: RgbImage,
    }

    impl FakeSource {
        pub fn new() -> Self {
            Self {
                ready: Arc::new(AtomicBool::new(true)),
                acquired: Arc::new(AtomicBool::new(false)),
                acquisitions: Arc::new(AtomicUsize::new(0)),
                captures: Arc::new(AtomicUsize::new(0)),
                available: true,
                surface: RgbImage::from_pixel(8, 8, Rgb([40, 80, 120])),
            }
        }

        pub fn unavailable() -> Self {
            Self {
                available: false,
                ..Self::new()
            }
        }

        pub fn not_ready() -> Self {
            let source = Self::new();
            source.ready.store(false, Ordering::SeqCst);
            source
        }
    }

    #[async_trait]
    impl MediaSource for FakeSource {
        async fn acquire(&mut self, _constraints: VideoConstraints) -> Result<(), CaptureError> {
            if !self.available {
                return Err(CaptureError::DeviceUnavailable("no camera granted".to_string()));
            }
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            self.acquired.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) {
            self.acquired.store(false, Ordering::SeqCst);
        }

        fn capture_still(&mut self) -> Option<&RgbImage> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            if self.acquired.load(Ordering::SeqCst) && self.ready.load(Ordering::SeqCst) {
                Some(&self.surface)
            } else {
                None
            }
        }
    }

    type Script = Box<dyn Fn(usize) -> Result<InferenceResult, InferenceError> + Send + Sync>;

    /// Detection service double that records how many calls overlap.
    pub struct FakeClient {
        pub calls: AtomicUsize,
        pub uploads: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub parameters: Mutex<Vec<DetectionParameters>>,
        in_flight: AtomicUsize,
        latency: Duration,
        gate: Option<Arc<Notify>>,
        classes: Option<Vec<String>>,
        classes_delay: Duration,
        script: Script,
    }

    /// Successful result whose annotated image is `[index]` and which
    /// carries `index` detections of "car".
    pub fn numbered_result(index: usize) -> InferenceResult {
        InferenceResult {
            annotated_image: EncodedImage::jpeg(vec![index as u8]),
            detections: (0..index).map(|_| Detection::new("car")).collect(),
        }
    }

    pub fn service_error() -> InferenceError {
        InferenceError::Service {
            status: 500,
            body: "inference failed".to_string(),
        }
    }

    struct InFlightGuard<'a>(&'a AtomicUsize);

    impl Drop for InFlightGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FakeClient {
        pub fn new(latency: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                uploads: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                parameters: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                latency,
                gate: None,
                classes: Some(vec!["person".to_string(), "car".to_string(), "dog".to_string()]),
                classes_delay: Duration::ZERO,
                script: Box::new(|index| Ok(numbered_result(index))),
            }
        }

        /// Every request waits for a `notify_one` on the gate before answering.
        pub fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn scripted<F>(mut self, script: F) -> Self
        where
            F: Fn(usize) -> Result<InferenceResult, InferenceError> + Send + Sync + 'static,
        {
            self.script = Box::new(script);
            self
        }

        /// `list_classes` answers only after `delay`.
        pub fn with_classes_delay(mut self, delay: Duration) -> Self {
            self.classes_delay = delay;
            self
        }

        pub fn without_classes(mut self) -> Self {
            self.classes = None;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        async fn respond(&self, index: usize) -> Result<InferenceResult, InferenceError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlightGuard(&self.in_flight);
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            tokio::time::sleep(self.latency).await;
            (self.script)(index)
        }
    }

    #[async_trait]
    impl InferenceClient for FakeClient {
        async fn infer_frame(
            &self,
            _image: EncodedImage,
            parameters: DetectionParameters,
        ) -> Result<InferenceResult, InferenceError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.parameters.lock().unwrap().push(parameters);
            self.respond(index).await
        }

        async fn infer_upload(
            &self,
            _upload: UploadedImage,
            _threshold: f32,
        ) -> Result<InferenceResult, InferenceError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.uploads.fetch_add(1, Ordering::SeqCst);
            self.respond(index).await
        }

        async fn list_classes(&self) -> Result<Vec<String>, InferenceError> {
            tokio::time::sleep(self.classes_delay).await;
            self.classes.clone().ok_or_else(service_error)
        }
    }
}
