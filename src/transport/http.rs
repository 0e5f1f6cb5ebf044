//! HTTP implementations of the turn transport and the collaborators

use super::{SessionToken, TurnHandle, TurnId, TurnSignal, TurnSink, TurnTransport};
use crate::config::SessionConfig;
use crate::error::{BackendError, TransportError};
use crate::protocol::{ServerEvent, SseDecoder, TurnRequest};
use crate::session::{AccountSink, CatalogClient, Feedback, FeedbackClient, HistoryClient, Transcript};
use crate::tree::TreeData;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const RUN_PATH: &str = "/api/study/run";
const RECORDS_PATH: &str = "/api/study/records";
const RESET_PATH: &str = "/api/study/reset";
const TREE_PATH: &str = "/api/study/tree";
const FEEDBACK_PATH: &str = "/api/study/feedback";

/// Shared HTTP plumbing: base URL, token, correlation ids
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: SessionConfig,
    token: SessionToken,
}

impl ApiClient {
    pub fn new(config: SessionConfig, token: SessionToken) -> Result<Self, TransportError> {
        // No overall timeout: turn streams stay open as long as the server talks
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            token,
        })
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("X-Request-ID", Uuid::new_v4().to_string());
        match self.token.get().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BackendError> {
        let builder = self
            .client
            .get(self.config.endpoint(path))
            .query(query)
            .timeout(self.config.request_timeout);
        let response = self.authorize(builder).await.send().await.map_err(TransportError::from)?;
        decode_response(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, BackendError> {
        let builder = self
            .client
            .post(self.config.endpoint(path))
            .json(body)
            .timeout(self.config.request_timeout);
        let response = self.authorize(builder).await.send().await.map_err(TransportError::from)?;
        decode_response(response).await
    }
}

/// Responses may or may not be wrapped in a `{data: ...}` envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } | Envelope::Bare(data) => data,
        }
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::status(status.as_u16(), body).into());
    }
    let body = response.text().await.map_err(TransportError::from)?;
    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

// ============================================================================
// Turn transport
// ============================================================================

/// Streams turns from `POST /api/study/run`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    api: ApiClient,
}

impl HttpTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl TurnTransport for HttpTransport {
    fn open_turn(&self, id: TurnId, request: &TurnRequest, sink: TurnSink) -> TurnHandle {
        let cancel = CancellationToken::new();
        let handle = TurnHandle::new(id, cancel.clone());
        let api = self.api.clone();
        let request = request.clone();

        tracing::info!(turn_id = id, lesson_id = %request.lesson_id, input_type = %request.input_type.as_str(), "Opening turn");

        tokio::spawn(async move {
            let signal = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(turn_id = id, "Turn cancelled");
                    TurnSignal::Closed
                }
                result = stream_turn(&api, id, &request, &sink) => match result {
                    Ok(()) => TurnSignal::Closed,
                    Err(e) => {
                        tracing::error!(turn_id = id, error = %e, "Turn stream failed");
                        TurnSignal::Failed(e)
                    }
                },
            };
            // Receiver gone means the session was dropped
            let _ = sink.send((id, signal));
        });

        handle
    }
}

async fn stream_turn(
    api: &ApiClient,
    id: TurnId,
    request: &TurnRequest,
    sink: &TurnSink,
) -> Result<(), TransportError> {
    let builder = api
        .client
        .post(api.config.endpoint(RUN_PATH))
        .header("Accept", "text/event-stream")
        .json(request);
    let response = api.authorize(builder).await.send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::status(status.as_u16(), body));
    }

    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for frame in decoder.push(&chunk) {
            if !forward(id, &frame, sink) {
                return Ok(());
            }
        }
    }
    if let Some(frame) = decoder.finish() {
        forward(id, &frame, sink);
    }
    Ok(())
}

/// Decode and deliver one frame; false once nobody is listening
fn forward(id: TurnId, frame: &str, sink: &TurnSink) -> bool {
    match ServerEvent::parse(frame) {
        Ok(event) => sink.send((id, TurnSignal::Event(event))).is_ok(),
        Err(e) => {
            tracing::debug!(turn_id = id, error = %e, frame = %frame, "Dropping malformed event");
            !sink.is_closed()
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// HTTP-backed history, catalog, feedback, and account collaborators
#[derive(Debug, Clone)]
pub struct HttpBackend {
    api: ApiClient,
    profile: Arc<RwLock<HashMap<String, Value>>>,
}

impl HttpBackend {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            profile: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Profile values pushed by the server during this session
    pub async fn profile(&self) -> HashMap<String, Value> {
        self.profile.read().await.clone()
    }
}

#[async_trait]
impl HistoryClient for HttpBackend {
    async fn load_transcript(
        &self,
        chapter_id: &str,
        preview_mode: bool,
    ) -> Result<Transcript, BackendError> {
        let transcript: Option<Transcript> = self
            .api
            .get_json(
                RECORDS_PATH,
                &[
                    ("lesson_id", chapter_id.to_string()),
                    ("preview_mode", preview_mode.to_string()),
                ],
            )
            .await?;
        Ok(transcript.unwrap_or_default())
    }

    async fn reset_chapter(&self, chapter_id: &str) -> Result<(), BackendError> {
        let _: Value = self
            .api
            .post_json(RESET_PATH, &json!({ "lesson_id": chapter_id }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for HttpBackend {
    async fn load_tree(
        &self,
        course_id: &str,
        chapter_id: Option<&str>,
    ) -> Result<TreeData, BackendError> {
        let mut query = vec![("course_id", course_id.to_string())];
        if let Some(chapter_id) = chapter_id {
            query.push(("chapter_id", chapter_id.to_string()));
        }
        self.api.get_json(TREE_PATH, &query).await
    }
}

#[async_trait]
impl FeedbackClient for HttpBackend {
    async fn annotate(&self, log_id: &str, feedback: Feedback) -> Result<(), BackendError> {
        let _: Value = self
            .api
            .post_json(
                FEEDBACK_PATH,
                &json!({
                    "log_id": log_id,
                    "interaction_type": feedback.interaction_type(),
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountSink for HttpBackend {
    async fn soft_login(&self, token: &str) -> Result<(), BackendError> {
        self.api.token().set(token).await;
        tracing::info!("Soft login applied");
        Ok(())
    }

    async fn update_profile(&self, key: &str, value: &Value) -> Result<(), BackendError> {
        self.profile
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
