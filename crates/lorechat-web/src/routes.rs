use crate::view::{detect_layout, PageRenderer, PageView, Tab};
use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use lorechat_core::{
    ChatError, ChatMessage, ChatProvider, ChatSession, LorebookConfig, Notice, ReplyOutcome,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

const STYLE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/style.css"));

type HandlerError = (StatusCode, String);

/// Shared by every handler for the lifetime of the process
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<ChatSession>>,
    pub provider: Arc<dyn ChatProvider>,
    pub pages: Arc<PageRenderer>,
}

impl AppState {
    pub fn new(session: ChatSession, provider: Arc<dyn ChatProvider>, pages: PageRenderer) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            provider,
            pages: Arc::new(pages),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    #[serde(default)]
    tab: Option<String>,
    #[serde(default)]
    layout: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    prompt: String,
}

#[derive(Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    lorebook: String,
    #[serde(default)]
    user_info: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(chat))
        .route("/settings", post(save_settings))
        .route("/reset", post(reset))
        .route("/api/messages", get(messages))
        .route("/static/style.css", get(stylesheet))
        .route("/health", get(health))
        .with_state(state)
}

fn internal(e: anyhow::Error) -> HandlerError {
    tracing::error!(error = %format!("{:#}", e), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
}

/// Answer the last user message if it is still unanswered.
///
/// The session lock is released while the provider call is in flight; the
/// session's processing flag keeps concurrent requests from claiming the
/// same reply. The call and its bookkeeping run on a spawned task, so a
/// client that disconnects mid-call does not leave the session stuck.
async fn generate_reply(state: &AppState) -> anyhow::Result<Option<ReplyOutcome>> {
    let pending = state.session.lock().await.begin_reply();
    let Some(pending) = pending else {
        return Ok(None);
    };

    let session = Arc::clone(&state.session);
    let provider = Arc::clone(&state.provider);
    let task = tokio::spawn(async move {
        tracing::info!(messages = pending.request.messages.len(), "generating reply");
        let result = provider.complete(&pending.request).await;
        let outcome = session.lock().await.finish_reply(pending, result)?;
        tracing::info!(?outcome, "reply cycle finished");
        anyhow::Ok(outcome)
    });

    let outcome = task.await??;
    Ok(Some(outcome))
}

async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Result<Html<String>, HandlerError> {
    generate_reply(&state).await.map_err(internal)?;

    let layout = detect_layout(
        query.layout.as_deref(),
        headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok()),
    );
    let tab = Tab::parse(query.tab.as_deref());

    let view = {
        let mut session = state.session.lock().await;
        let notices = session.take_notices();
        PageView::build(
            layout,
            tab,
            session.messages(),
            session.lorebook(),
            notices,
            session.is_processing(),
        )
    };

    state.pages.render(&view).map(Html).map_err(internal)
}

/// POST /chat: store the user's line, then generate the reply before redirecting.
async fn chat(
    State(state): State<AppState>,
    Form(form): Form<ChatForm>,
) -> Result<Redirect, HandlerError> {
    generate_reply(&state).await.map_err(internal)?;

    let submitted = {
        let mut session = state.session.lock().await;
        match session.submit(&form.prompt) {
            Ok(submitted) => submitted,
            Err(e) => match e.downcast_ref::<ChatError>() {
                Some(chat_error) => {
                    session.push_notice(Notice::warning(chat_error.to_string()));
                    false
                }
                None => return Err(internal(e)),
            },
        }
    };

    if submitted {
        generate_reply(&state).await.map_err(internal)?;
    }
    Ok(Redirect::to("/#latest"))
}

async fn save_settings(
    State(state): State<AppState>,
    Form(form): Form<SettingsForm>,
) -> Result<Redirect, HandlerError> {
    state
        .session
        .lock()
        .await
        .save_lorebook(LorebookConfig {
            lorebook: form.lorebook,
            user_info: form.user_info,
        })
        .map_err(internal)?;
    Ok(Redirect::to("/?tab=settings"))
}

async fn reset(State(state): State<AppState>) -> Result<Redirect, HandlerError> {
    state.session.lock().await.reset().map_err(internal)?;
    Ok(Redirect::to("/?tab=settings"))
}

async fn messages(State(state): State<AppState>) -> Json<Vec<ChatMessage>> {
    Json(state.session.lock().await.messages().to_vec())
}

async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], STYLE)
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use lorechat_core::{ChatRole, CompletionRequest, CompletionSettings, ContentBlock, DataPaths};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct EchoProvider {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatProvider for EchoProvider {
        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Vec<ContentBlock>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(vec![ContentBlock::Text {
                text: format!("*listens* You said {}", last),
            }])
        }
    }

    fn test_state(dir: &TempDir, fail: bool) -> (AppState, Arc<EchoProvider>) {
        let session =
            ChatSession::open(DataPaths::in_dir(dir.path()), CompletionSettings::default())
                .unwrap();
        let provider = Arc::new(EchoProvider {
            fail,
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(session, provider.clone(), PageRenderer::new().unwrap());
        (state, provider)
    }

    fn form_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Hangs forever on the first call, answers every later one
    struct StallOnceProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatProvider for StallOnceProvider {
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Vec<ContentBlock>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(vec![ContentBlock::Text {
                text: "ok".to_string(),
            }])
        }
    }

    /// Answers after a delay longer than the client is willing to wait
    struct SlowProvider;

    #[async_trait]
    impl ChatProvider for SlowProvider {
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Vec<ContentBlock>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(vec![ContentBlock::Text {
                text: "late but here".to_string(),
            }])
        }
    }

    fn state_with(dir: &TempDir, provider: Arc<dyn ChatProvider>) -> AppState {
        let session =
            ChatSession::open(DataPaths::in_dir(dir.path()), CompletionSettings::default())
                .unwrap();
        AppState::new(session, provider, PageRenderer::new().unwrap())
    }

    async fn body_text(res: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir, false);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = router(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "OK");
    }

    #[tokio::test]
    async fn test_chat_post_stores_reply_and_redirects() {
        let dir = TempDir::new().unwrap();
        let (state, provider) = test_state(&dir, false);

        let res = router(state.clone())
            .oneshot(form_post("/chat", "prompt=hello+there"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let session = state.session.lock().await;
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::user("hello there"));
        assert_eq!(
            messages[1],
            ChatMessage::assistant("*listens* You said hello there")
        );

        let raw = std::fs::read_to_string(dir.path().join("messages.json")).unwrap();
        assert!(raw.contains("*listens* You said hello there"));
    }

    #[tokio::test]
    async fn test_provider_failure_shows_banner_and_transcript_error() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir, true);

        router(state.clone())
            .oneshot(form_post("/chat", "prompt=hi"))
            .await
            .unwrap();

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let res = router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("notice-error"));
        assert!(html.contains("API call failed: connection refused"));
        assert!(html.contains("❌ API call error: connection refused"));

        let session = state.session.lock().await;
        assert_eq!(session.messages().last().unwrap().role, ChatRole::Assistant);
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn test_index_answers_pending_user_message() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("messages.json"),
            r#"[{"role": "user", "content": "still there?"}]"#,
        )
        .unwrap();
        let (state, provider) = test_state(&dir, false);

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let res = router(state).oneshot(req).await.unwrap();
        let html = body_text(res).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(html.contains(r#"<span class="narrative">listens</span>"#));
        assert!(html.contains("You said still there?"));
    }

    #[tokio::test]
    async fn test_settings_and_reset() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir, false);

        let res = router(state.clone())
            .oneshot(form_post("/settings", "lorebook=Floating+isles&user_info=Arin"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let saved = std::fs::read_to_string(dir.path().join("lorebook.json")).unwrap();
        assert!(saved.contains("Floating isles"));

        router(state.clone())
            .oneshot(form_post("/chat", "prompt=hi"))
            .await
            .unwrap();
        router(state.clone())
            .oneshot(form_post("/reset", ""))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("messages.json")).unwrap(),
            "[]"
        );

        let req = Request::builder()
            .uri("/api/messages")
            .body(Body::empty())
            .unwrap();
        let res = router(state).oneshot(req).await.unwrap();
        assert_eq!(body_text(res).await, "[]");
    }

    #[tokio::test]
    async fn test_mobile_settings_tab() {
        let dir = TempDir::new().unwrap();
        let (state, _) = test_state(&dir, false);

        let req = Request::builder()
            .uri("/?tab=settings")
            .header(header::USER_AGENT, "Mozilla/5.0 (Linux; Android 14) Mobile Safari/537.36")
            .body(Body::empty())
            .unwrap();
        let html = body_text(router(state).oneshot(req).await.unwrap()).await;

        assert!(html.contains("layout-mobile"));
        assert!(html.contains(r#"name="lorebook""#));
        assert!(!html.contains(r#"class="transcript""#));
    }

    #[tokio::test]
    async fn test_dropped_request_still_finishes_reply() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&dir, Arc::new(SlowProvider));

        let dropped = tokio::time::timeout(
            Duration::from_millis(50),
            router(state.clone()).oneshot(form_post("/chat", "prompt=hello")),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let session = state.session.lock().await;
        assert!(!session.is_processing());
        assert_eq!(
            session.messages().last(),
            Some(&ChatMessage::assistant("late but here"))
        );
    }

    #[tokio::test]
    async fn test_reset_recovers_from_stalled_reply() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(StallOnceProvider {
            calls: AtomicUsize::new(0),
        });
        let state = state_with(&dir, provider.clone());

        let dropped = tokio::time::timeout(
            Duration::from_millis(100),
            router(state.clone()).oneshot(form_post("/chat", "prompt=hello")),
        )
        .await;
        assert!(dropped.is_err());
        assert!(state.session.lock().await.is_processing());

        router(state.clone())
            .oneshot(form_post("/reset", ""))
            .await
            .unwrap();
        let res = router(state.clone())
            .oneshot(form_post("/chat", "prompt=again"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);

        let mut session = state.session.lock().await;
        assert!(!session.is_processing());
        assert_eq!(
            session.messages(),
            &[ChatMessage::user("again"), ChatMessage::assistant("ok")]
        );
        assert!(session
            .take_notices()
            .iter()
            .all(|notice| notice.kind != lorechat_core::NoticeKind::Warning));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
