// src/test_utils/mock_judge0_server.rs
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use crate::executors::remote::{SubmissionRequest, SubmissionResponse, SubmissionToken};

#[derive(Clone)]
struct MockServerState {
    accept_submissions: bool,
    poll_failure: Option<StatusCode>,
    responses: Arc<Mutex<VecDeque<SubmissionResponse>>>,
    submissions: Arc<Mutex<Vec<SubmissionRequest>>>,
    auth_tokens: Arc<Mutex<Vec<String>>>,
    polls: Arc<Mutex<usize>>,
}

impl MockServerState {
    fn new(responses: Vec<SubmissionResponse>, accept_submissions: bool) -> Self {
        Self {
            accept_submissions,
            poll_failure: None,
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            submissions: Arc::new(Mutex::new(Vec::new())),
            auth_tokens: Arc::new(Mutex::new(Vec::new())),
            polls: Arc::new(Mutex::new(0)),
        }
    }
}

async fn submit_handler(
    State(state): State<MockServerState>,
    headers: HeaderMap,
    Json(payload): Json<SubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionToken>), StatusCode> {
    log::debug!("Mock Judge0 received submission for language {}", payload.language_id);
    if !state.accept_submissions {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if let Some(token) = headers.get("X-Auth-Token").and_then(|v| v.to_str().ok()) {
        state.auth_tokens.lock().unwrap().push(token.to_string());
    }
    state.submissions.lock().unwrap().push(payload);
    Ok((
        StatusCode::CREATED,
        Json(SubmissionToken {
            token: "mock-token".to_string(),
        }),
    ))
}

async fn result_handler(
    State(state): State<MockServerState>,
    Path(token): Path<String>,
) -> Result<Json<SubmissionResponse>, StatusCode> {
    *state.polls.lock().unwrap() += 1;
    if let Some(status) = state.poll_failure {
        return Err(status);
    }
    let mut responses = state.responses.lock().unwrap();
    // The last scripted state repeats for as long as the client keeps asking.
    let response = if responses.len() > 1 {
        responses.pop_front()
    } else {
        responses.front().cloned()
    };
    match response {
        Some(resp) => {
            log::debug!("Mock Judge0 returning status {} for {}", resp.status.id, token);
            Ok(Json(resp))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn about_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "version": "mock" }))
}

pub struct MockJudge0Server {
    addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    state: MockServerState,
}

impl MockJudge0Server {
    /// Accepts every submission and answers polls with `responses` in order.
    pub async fn start(responses: Vec<SubmissionResponse>) -> Self {
        Self::serve(MockServerState::new(responses, true)).await
    }

    /// Rejects every submission with 503.
    pub async fn start_rejecting() -> Self {
        Self::serve(MockServerState::new(Vec::new(), false)).await
    }

    /// Accepts submissions but answers every poll with `status`.
    pub async fn start_failing_polls(status: StatusCode) -> Self {
        let mut state = MockServerState::new(Vec::new(), true);
        state.poll_failure = Some(status);
        Self::serve(state).await
    }

    async fn serve(state: MockServerState) -> Self {
        let app = Router::new()
            .route("/submissions", post(submit_handler))
            .route("/submissions/{token}", get(result_handler))
            .route("/about", get(about_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap_or_else(|e| {
            panic!("Failed to bind mock server to 127.0.0.1:0. Error: {}", e);
        });
        let addr = listener.local_addr().unwrap();
        log::info!("Mock Judge0 server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap_or_else(|e| log::error!("Mock Judge0 server error: {}", e));
        });

        MockJudge0Server {
            addr,
            shutdown_tx,
            state,
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            log::warn!("Mock Judge0 server already stopped");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    pub fn get_submissions(&self) -> Vec<SubmissionRequest> {
        self.state.submissions.lock().unwrap().clone()
    }

    pub fn auth_tokens(&self) -> Vec<String> {
        self.state.auth_tokens.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        *self.state.polls.lock().unwrap()
    }
}
