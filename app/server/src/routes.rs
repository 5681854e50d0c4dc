//! JSON API over the question answering engine.

use axum::{
    extract::State as AxumState,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use tally_rag::rag::render_statement;
use tally_rag::types::Source;
use tally_rag::{
    AggregateOp, AggregateReport, AnswerFlow, AskRequest, ChatMessage, PipelineError, RagEngine,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RagEngine>,
}

#[derive(Debug, Deserialize)]
struct AskBody {
    question: Option<String>,
    /// Accepted as an alias of `question`.
    message: Option<String>,
    top_k: Option<usize>,
    max_records: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AskReply {
    answer: String,
    sources: Vec<Source>,
    math: Option<AggregateReport>,
    auto_flow: AnswerFlow,
}

#[derive(Debug, Default, Deserialize)]
struct MathBody {
    #[serde(default)]
    op: String,
    max_records: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MathReply {
    statement: String,
    #[serde(flatten)]
    report: AggregateReport,
}

#[derive(Debug, Deserialize)]
struct HistoryTurn {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<HistoryTurn>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    answer: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorReply>);

/// Validation failures are the caller's fault (400); anything upstream is a 502.
pub fn error_response(err: PipelineError) -> ApiError {
    let status = match &err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::Upstream { .. } => StatusCode::BAD_GATEWAY,
    };
    if status == StatusCode::BAD_GATEWAY {
        tracing::warn!(error = %err, "Request failed upstream");
    }
    (
        status,
        Json(ErrorReply {
            error: err.to_string(),
        }),
    )
}

async fn health_check() -> &'static str {
    "tally-rag API is running"
}

async fn handle_ask(
    AxumState(state): AxumState<AppState>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskReply>, ApiError> {
    let question = body.question.or(body.message).unwrap_or_default();
    let request = AskRequest {
        question,
        top_k: body.top_k,
        max_records: body.max_records,
    };

    let response = state.engine.ask(request).await.map_err(error_response)?;
    Ok(Json(AskReply {
        answer: response.answer,
        sources: response.sources,
        math: response.math,
        auto_flow: response.flow,
    }))
}

async fn handle_math(
    AxumState(state): AxumState<AppState>,
    Json(body): Json<MathBody>,
) -> Result<Json<MathReply>, ApiError> {
    let op: AggregateOp = RagEngine::parse_op(&body.op).map_err(error_response)?;
    let report = state
        .engine
        .math(op, body.max_records)
        .await
        .map_err(error_response)?;

    let statement = render_statement(report.op, &report.stats, &state.engine.config().labels);
    Ok(Json(MathReply { statement, report }))
}

async fn handle_chat(
    AxumState(state): AxumState<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let history: Vec<ChatMessage> = body
        .history
        .into_iter()
        .map(|turn| {
            let content = turn.content.unwrap_or_default();
            if turn.role.eq_ignore_ascii_case("user") {
                ChatMessage::user(content)
            } else {
                ChatMessage::assistant(content)
            }
        })
        .collect();

    let answer = state
        .engine
        .chat(&body.message, &history)
        .await
        .map_err(error_response)?;
    Ok(Json(ChatReply { answer }))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health_check))
        .route("/api/ask", post(handle_ask))
        .route("/api/math", post(handle_math))
        .route("/api/chat", post(handle_chat))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tally_rag::embeddings::EmbeddingModel;
    use tally_rag::llm::TextGenerator;
    use tally_rag::storage::VectorStore;
    use tally_rag::types::{Hit, ScanCursor, ScanPage};
    use tally_rag::{Service, TallyConfig};
    use tower::ServiceExt;

    /// Every collaborator call fails as if the backing service were down.
    struct Offline;

    #[async_trait]
    impl EmbeddingModel for Offline {
        async fn embed_with_model(&self, _model: &str, _text: &str) -> anyhow::Result<Vec<f32>> {
            Err(anyhow::anyhow!("connection refused"))
        }

        fn default_model(&self) -> &str {
            "offline"
        }
    }

    #[async_trait]
    impl VectorStore for Offline {
        async fn search(&self, _c: &str, _v: &[f32], _limit: usize) -> anyhow::Result<Vec<Hit>> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn scroll(
            &self,
            _c: &str,
            _batch_size: usize,
            _cursor: Option<&ScanCursor>,
        ) -> anyhow::Result<ScanPage> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn count(&self, _c: &str) -> anyhow::Result<Option<u64>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl TextGenerator for Offline {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("connection refused"))
        }

        fn model(&self) -> &str {
            "offline"
        }
    }

    fn app() -> Router {
        let offline = Arc::new(Offline);
        let engine = RagEngine::with_components(
            TallyConfig::default(),
            offline.clone(),
            offline.clone(),
            offline,
        );
        router(AppState {
            engine: Arc::new(engine),
        })
    }

    async fn post_json(path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_error_mapping() {
        let (status, _) = error_response(PipelineError::validation("question is required"));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(body)) = error_response(PipelineError::upstream(
            Service::Generation,
            anyhow::anyhow!("timed out"),
        ));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.error.starts_with("Upstream request failed: "));
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ask_without_question_is_bad_request() {
        let (status, body) = post_json("/api/ask", serde_json::json!({"top_k": 3})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "question is required");
    }

    #[tokio::test]
    async fn test_ask_accepts_message_alias() {
        let (status, body) =
            post_json("/api/ask", serde_json::json!({"message": "who is Ada?"})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Upstream request failed: "));
    }

    #[tokio::test]
    async fn test_math_unknown_op_is_bad_request() {
        let (status, _) = post_json("/api/math", serde_json::json!({"op": "median"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_math_scan_failure_is_bad_gateway() {
        let (status, body) =
            post_json("/api/math", serde_json::json!({"op": "count_employees"})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("vector store"));
    }

    #[tokio::test]
    async fn test_chat_requires_message() {
        let (status, body) = post_json(
            "/api/chat",
            serde_json::json!({"history": [{"role": "user", "content": "hi"}]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "message is required");
    }
}
