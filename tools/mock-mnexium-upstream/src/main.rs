use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_101;
const API_PREFIX: &str = "/api/v1";

#[derive(Copy, Clone)]
enum StreamShape {
    OpenAi,
    Anthropic,
    Gemini,
}

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Error,
}

struct RequestStats {
    completions: AtomicU64,
    history: AtomicU64,
    conversation: AtomicU64,
}

impl RequestStats {
    const fn new() -> Self {
        Self {
            completions: AtomicU64::new(0),
            history: AtomicU64::new(0),
            conversation: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.completions.load(Ordering::Relaxed),
            self.history.load(Ordering::Relaxed),
            self.conversation.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.completions.store(0, Ordering::Relaxed);
        self.history.store(0, Ordering::Relaxed);
        self.conversation.store(0, Ordering::Relaxed);
    }
}

struct MockState {
    shape: StreamShape,
    scenario: MockScenario,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        shape: parse_shape(),
        scenario: parse_scenario(),
        stats: RequestStats::new(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!("mock upstream listening on http://127.0.0.1:{port}{API_PREFIX}");

    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_shape() -> StreamShape {
    match env::var("MOCK_SHAPE").as_deref() {
        Ok("openai") | Err(_) => StreamShape::OpenAi,
        Ok("anthropic") => StreamShape::Anthropic,
        Ok("gemini") => StreamShape::Gemini,
        Ok(other) => {
            eprintln!("unknown MOCK_SHAPE '{other}', fallback to openai");
            StreamShape::OpenAi
        }
    }
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("text") | Err(_) => MockScenario::Text,
        Ok("error") => MockScenario::Error,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    let method = parts.method;
    let path = parts.uri.path();

    if method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if method == Method::POST && path == "/_mock/reset" {
        state.stats.reset();
        return simple_response_static(StatusCode::OK, "application/json", br#"{"ok":true}"#);
    }

    let Some(route) = path.strip_prefix(API_PREFIX) else {
        return not_found();
    };

    if matches!(state.scenario, MockScenario::Error) {
        return simple_response_static(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            br#"{"error":"mock_injected_error"}"#,
        );
    }

    match (&method, route) {
        (&Method::POST, "/chat/completions") => {
            state.stats.completions.fetch_add(1, Ordering::Relaxed);
            streaming_response(state.shape)
        }
        (&Method::GET, "/chat/history/read") => {
            state.stats.conversation.fetch_add(1, Ordering::Relaxed);
            simple_response_static(StatusCode::OK, "application/json", CONVERSATION_BODY)
        }
        (&Method::GET, _) if route.starts_with("/history/") => {
            state.stats.history.fetch_add(1, Ordering::Relaxed);
            let subject = &route["/history/".len()..];
            history_response(subject)
        }
        (_, "/chat/completions" | "/chat/history/read") => simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        ),
        _ => not_found(),
    }
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let (completions, history, conversation) = state.stats.snapshot();
    let shape = match state.shape {
        StreamShape::OpenAi => "openai",
        StreamShape::Anthropic => "anthropic",
        StreamShape::Gemini => "gemini",
    };
    let scenario = match state.scenario {
        MockScenario::Text => "text",
        MockScenario::Error => "error",
    };
    let body = format!(
        "{{\"shape\":\"{shape}\",\"scenario\":\"{scenario}\",\"completions\":{completions},\"history\":{history},\"conversation\":{conversation}}}"
    );
    simple_response(
        StatusCode::OK,
        "application/json",
        Bytes::from(body.into_bytes()),
    )
}

fn history_response(subject: &str) -> Response<Full<Bytes>> {
    // Subject ids are uuids or test strings; no escaping needed.
    let body = format!(
        "{{\"chats\":[{{\"chat_id\":\"mock-chat-{subject}\",\"title\":\"Mock conversation\",\"updated_at\":\"2026-01-02T03:04:05Z\"}}]}}"
    );
    simple_response(
        StatusCode::OK,
        "application/json",
        Bytes::from(body.into_bytes()),
    )
}

fn streaming_response(shape: StreamShape) -> Response<Full<Bytes>> {
    let body = match shape {
        StreamShape::OpenAi => OPENAI_STREAM,
        StreamShape::Anthropic => ANTHROPIC_STREAM,
        StreamShape::Gemini => GEMINI_STREAM,
    };
    let mut response = simple_response_static(StatusCode::OK, "text/event-stream", body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    simple_response_static(
        StatusCode::NOT_FOUND,
        "application/json",
        br#"{"error":"not_found"}"#,
    )
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    simple_response(status, content_type, Bytes::from_static(body))
}

const CONVERSATION_BODY: &[u8] = br#"{"messages":[{"role":"user","content":"hello"},{"role":"assistant","content":"hi there"}]}"#;

const OPENAI_STREAM: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o-mini\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4o-mini\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";

const ANTHROPIC_STREAM: &[u8] = b"event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_mock\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-3-5-haiku-latest\",\"content\":[]}}\n\nevent: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\nevent: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\nevent: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":2}}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";

const GEMINI_STREAM: &[u8] = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}],\"role\":\"model\"},\"index\":0}]}\r\n\r\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}],\"role\":\"model\"},\"finishReason\":\"STOP\",\"index\":0}],\"usageMetadata\":{\"promptTokenCount\":1,\"candidatesTokenCount\":2,\"totalTokenCount\":3}}\r\n\r\n";
