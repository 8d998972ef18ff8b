#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, Rgb, RgbImage};
use inpaint_relay::api::routes::{router, AppState};
use inpaint_relay::{imaging, Config};
use serde_json::{json, Value};

pub const RUN_ID: &str = "run-1";
pub const OUTPUT_FILE: &str = "composite_00001_.png";

/// One scripted answer of the fake `/status` endpoint.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Absent,
    Running,
    CompletedEmpty,
    Completed,
    /// Hold the request open far longer than any test deadline.
    Stall,
}

/// A broken answer from the upload or execute endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    UploadServerError,
    UploadWithoutName,
    ExecuteServerError,
    ExecuteWithoutRunId,
}

/// In-process stand-in for the generative backend.
///
/// `/view` serves the image uploaded for the original slot, so a composite
/// keeps the original's dimensions.
#[derive(Default)]
pub struct FakeBackend {
    calls: AtomicUsize,
    status_polls: AtomicUsize,
    uploads: Mutex<HashMap<u64, Vec<u8>>>,
    submitted: Mutex<Option<Value>>,
    script: Mutex<VecDeque<Reply>>,
    fault: Option<Fault>,
}

impl FakeBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> usize {
        self.status_polls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Option<Value> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn uploaded_nodes(&self) -> Vec<u64> {
        let mut nodes: Vec<u64> = self.uploads.lock().unwrap().keys().copied().collect();
        nodes.sort();
        nodes
    }

    /// Pops the next scripted reply; the last one repeats forever.
    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().copied().unwrap_or(Reply::Completed)
        }
    }
}

async fn upload(State(fake): State<Arc<FakeBackend>>, Json(body): Json<Value>) -> Response {
    fake.calls.fetch_add(1, Ordering::SeqCst);
    match fake.fault {
        Some(Fault::UploadServerError) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "disk full").into_response();
        }
        Some(Fault::UploadWithoutName) => return Json(json!({})).into_response(),
        _ => {}
    }
    let node_id = body["node_id"].as_u64().unwrap_or_default();
    let Some(bytes) = body["image"].as_str().and_then(|s| STANDARD.decode(s).ok()) else {
        return (StatusCode::BAD_REQUEST, "bad image").into_response();
    };
    fake.uploads.lock().unwrap().insert(node_id, bytes);
    Json(json!({ "name": format!("upload_{}.png", node_id) })).into_response()
}

async fn execute(State(fake): State<Arc<FakeBackend>>, Json(body): Json<Value>) -> Response {
    fake.calls.fetch_add(1, Ordering::SeqCst);
    match fake.fault {
        Some(Fault::ExecuteServerError) => {
            return (StatusCode::SERVICE_UNAVAILABLE, "queue full").into_response();
        }
        Some(Fault::ExecuteWithoutRunId) => return Json(json!({ "queued": true })).into_response(),
        _ => {}
    }
    *fake.submitted.lock().unwrap() = Some(body["workflow"].clone());
    Json(json!({ "run_id": RUN_ID })).into_response()
}

async fn status(State(fake): State<Arc<FakeBackend>>) -> Json<Value> {
    fake.calls.fetch_add(1, Ordering::SeqCst);
    fake.status_polls.fetch_add(1, Ordering::SeqCst);
    let reply = fake.next_reply();
    if let Reply::Stall = reply {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    }
    let body = match reply {
        Reply::Absent => json!({ "some-other-run": { "status": "running", "output_images": [] } }),
        Reply::Running | Reply::Stall => json!({ RUN_ID: { "status": "running", "output_images": [] } }),
        Reply::CompletedEmpty => json!({ RUN_ID: { "status": "completed", "output_images": [] } }),
        Reply::Completed => json!({ RUN_ID: { "status": "completed", "output_images": [OUTPUT_FILE] } }),
    };
    Json(body)
}

async fn view(State(fake): State<Arc<FakeBackend>>, Query(params): Query<HashMap<String, String>>) -> Response {
    fake.calls.fetch_add(1, Ordering::SeqCst);
    if params.get("filename").map(String::as_str) != Some(OUTPUT_FILE) {
        return StatusCode::NOT_FOUND.into_response();
    }
    match fake.uploads.lock().unwrap().get(&140) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Start a fake backend on an ephemeral port and return its base URL.
pub fn spawn_backend(script: Vec<Reply>) -> (String, Arc<FakeBackend>) {
    serve(FakeBackend {
        script: Mutex::new(script.into()),
        ..Default::default()
    })
}

/// Start a fake backend whose upload or execute endpoint misbehaves.
pub fn spawn_faulty_backend(fault: Fault) -> (String, Arc<FakeBackend>) {
    serve(FakeBackend {
        script: Mutex::new(vec![Reply::Completed].into()),
        fault: Some(fault),
        ..Default::default()
    })
}

fn serve(fake: FakeBackend) -> (String, Arc<FakeBackend>) {
    let fake = Arc::new(fake);
    let app = Router::new()
        .route("/upload/image", post(upload))
        .route("/execute", post(execute))
        .route("/status", get(status))
        .route("/view", get(view))
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service());
    tokio::spawn(async move {
        server.await.unwrap();
    });
    (format!("http://{}", addr), fake)
}

pub fn workflow_json() -> Value {
    json!({
        "nodes": {
            "140": { "class_type": "LoadImage", "inputs": { "image": "original.png" } },
            "218": { "class_type": "LoadImage", "inputs": { "image": "replacement.png" } },
            "9": { "class_type": "SaveImage", "inputs": { "filename_prefix": "inpaint" } }
        }
    })
}

/// Build the relay router against `backend_url`, with fast polling.
/// The returned temp dir holds the workflow file and must outlive the router.
pub fn relay(backend_url: &str, overrides: &[(&str, &str)]) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let workflow_path = dir.path().join("workflow.json");
    std::fs::write(&workflow_path, workflow_json().to_string()).unwrap();

    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("COMFYUI_URL".into(), backend_url.to_string());
    vars.insert("WORKFLOW_PATH".into(), workflow_path.display().to_string());
    vars.insert("POLL_INTERVAL_MS".into(), "1".into());
    vars.insert("POLL_MAX_INTERVAL_MS".into(), "5".into());
    vars.insert("POLL_MAX_ATTEMPTS".into(), "50".into());
    vars.insert("POLL_TIMEOUT_SECS".into(), "10".into());
    vars.insert("REQUEST_TIMEOUT_SECS".into(), "10".into());
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
    (router(Arc::new(AppState::new(config).unwrap())), dir)
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 251) as u8, (y % 241) as u8, 90]));
    imaging::encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
}

const BOUNDARY: &str = "relay-test-boundary";

pub fn multipart_body(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn process_request(query: &str, parts: &[(&str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/process_images/{}", query))
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn read_json(response: Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
