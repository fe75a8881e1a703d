use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use openai_api::{ApiConfig, ChatCompletionsEndpoint, ResponsesEndpoint};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use turn_provider::{Message, TurnContext, TurnEndpoint, TurnEntry, TurnError, TurnEvent};

fn allow_local_integration() -> bool {
    std::env::var("OPENAI_API_ALLOW_LOCAL_INTEGRATION")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<ResponseChunk>,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(status: u16, frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type: "text/event-stream",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn config(base_url: &str) -> ApiConfig {
    ApiConfig::new("gpt-test", "sk-test").with_base_url(base_url)
}

fn initial_entry() -> TurnEntry {
    TurnEntry::Initial(vec![Message::user("hi")])
}

#[tokio::test]
async fn chat_stream_emits_deltas_then_a_final_turn() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"choices":[{"delta":{"content":"Hel"}}]}"##,
            r##"{"choices":[{"delta":{"content":"lo"}}]}"##,
            r##"{"choices":[{"delta":{},"finish_reason":"stop"}]}"##,
            "[DONE]",
        ],
    )])
    .await;

    let endpoint = ChatCompletionsEndpoint::new(config(&server.base_url)).expect("endpoint");
    let mut texts = Vec::new();
    let result = endpoint
        .prompt(initial_entry(), None, &mut |event| {
            if let TurnEvent::AssistantTextDelta { text } = event {
                texts.push(text);
            }
        })
        .await
        .expect("turn should succeed");

    assert_eq!(texts, vec!["Hel", "lo"]);
    assert!(result.is_complete());

    server.shutdown();
}

#[tokio::test]
async fn chat_fragmented_tool_call_reassembles_across_chunks() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"f","arguments":"{\"a\":"}}]}}]}"##,
            r##"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1}"}}]},"finish_reason":"tool_calls"}]}"##,
        ],
    )])
    .await;

    let endpoint = ChatCompletionsEndpoint::new(config(&server.base_url)).expect("endpoint");
    let result = endpoint
        .prompt(initial_entry(), None, &mut |_| {})
        .await
        .expect("turn should succeed");

    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].id, "c1");
    assert_eq!(result.tool_calls[0].name, "f");
    assert_eq!(result.tool_calls[0].arguments, serde_json::json!({"a": 1}));

    // The continuation history ends with the synthetic assistant message.
    let Some(TurnContext::ChatCompletions { messages }) = result.context else {
        panic!("expected chat completions continuation");
    };
    assert_eq!(messages.last().unwrap().tool_calls.len(), 1);

    server.shutdown();
}

#[tokio::test]
async fn responses_in_progress_polls_until_completed() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_sse(
            200,
            &[r##"{"type":"response.created","response":{"id":"r1","status":"in_progress"}}"##],
        ),
        response_json(200, r##"{"id":"r1","status":"in_progress"}"##),
        response_json(
            200,
            r##"{"id":"r1","status":"completed","output":[{"type":"message","content":[{"type":"output_text","text":"ok"}]}]}"##,
        ),
    ])
    .await;

    let endpoint = ResponsesEndpoint::new(config(&server.base_url)).expect("endpoint");
    let mut texts = Vec::new();
    let result = timeout(
        Duration::from_secs(5),
        endpoint.prompt(initial_entry(), None, &mut |event| {
            if let TurnEvent::AssistantTextDelta { text } = event {
                texts.push(text);
            }
        }),
    )
    .await
    .expect("poll loop should be bounded")
    .expect("turn should succeed");

    assert_eq!(texts, vec!["ok"]);
    assert!(result.tool_calls.is_empty());
    assert!(result.context.is_none());
    assert_eq!(result.resume_token.as_deref(), Some("r1"));
    assert_eq!(server.request_count(), 3);

    server.shutdown();
}

#[tokio::test]
async fn responses_tool_calls_carry_the_continuation_id() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"type":"response.completed","response":{"id":"r2","status":"completed","output":[{"type":"function_call","call_id":"c1","name":"read","arguments":"{\"path\":\"a.txt\"}"}]}}"##,
        ],
    )])
    .await;

    let endpoint = ResponsesEndpoint::new(config(&server.base_url)).expect("endpoint");
    let result = endpoint
        .prompt(initial_entry(), None, &mut |_| {})
        .await
        .expect("turn should succeed");

    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].name, "read");
    assert_eq!(
        result.context,
        Some(TurnContext::Responses {
            previous_response_id: "r2".to_string(),
        })
    );
    assert_eq!(result.resume_token, None);

    server.shutdown();
}

#[tokio::test]
async fn responses_failed_status_surfaces_the_provider_error() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_sse(
            200,
            &[r##"{"type":"response.created","response":{"id":"r1","status":"in_progress"}}"##],
        ),
        response_json(
            200,
            r##"{"id":"r1","status":"failed","error":{"message":"model exploded"}}"##,
        ),
    ])
    .await;

    let endpoint = ResponsesEndpoint::new(config(&server.base_url)).expect("endpoint");
    let error = endpoint
        .prompt(initial_entry(), None, &mut |_| {})
        .await
        .expect_err("failed status should be fatal");

    assert_eq!(error, TurnError::Provider("model exploded".to_string()));

    server.shutdown();
}

#[tokio::test]
async fn cancellation_after_a_terminal_event_keeps_the_finished_turn() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"choices":[{"delta":{"content":"done"}}]}"##,
            r##"{"choices":[{"delta":{},"finish_reason":"stop"}]}"##,
        ],
    )])
    .await;

    let endpoint = ChatCompletionsEndpoint::new(config(&server.base_url)).expect("endpoint");
    let cancellation = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancellation);

    let mut texts = Vec::new();
    let result = endpoint
        .prompt(initial_entry(), Some(&cancellation), &mut |event| {
            // Flip the flag from inside the stream, before the stop arrives.
            flag.store(true, Ordering::Release);
            if let TurnEvent::AssistantTextDelta { text } = event {
                texts.push(text);
            }
        })
        .await
        .expect("a turn that reached stop must not be discarded");

    assert_eq!(texts, vec!["done"]);
    assert!(result.is_complete());

    server.shutdown();
}

#[tokio::test]
async fn non_2xx_status_surfaces_the_provider_message() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        401,
        r##"{"error":{"message":"invalid api key"}}"##,
    )])
    .await;

    let endpoint = ChatCompletionsEndpoint::new(config(&server.base_url)).expect("endpoint");
    let error = endpoint
        .prompt(initial_entry(), None, &mut |_| {})
        .await
        .expect_err("status error should surface");

    assert_eq!(
        error,
        TurnError::Status {
            status: 401,
            message: "invalid api key".to_string(),
        }
    );

    server.shutdown();
}

#[tokio::test]
async fn cancellation_interrupts_the_poll_loop() {
    if !allow_local_integration() {
        return;
    }

    let mut scripts = vec![response_sse(
        200,
        &[r##"{"type":"response.created","response":{"id":"r1","status":"in_progress"}}"##],
    )];
    for _ in 0..20 {
        scripts.push(response_json(200, r##"{"id":"r1","status":"in_progress"}"##));
    }
    let server = ScriptedServer::new(scripts).await;

    let endpoint = Arc::new(ResponsesEndpoint::new(config(&server.base_url)).expect("endpoint"));
    let cancellation = Arc::new(AtomicBool::new(false));

    let turn_task = tokio::spawn({
        let endpoint = Arc::clone(&endpoint);
        let cancellation = Arc::clone(&cancellation);
        async move {
            endpoint
                .prompt(initial_entry(), Some(&cancellation), &mut |_| {})
                .await
        }
    });

    sleep(Duration::from_millis(150)).await;
    cancellation.store(true, Ordering::Release);

    let error = timeout(Duration::from_secs(5), turn_task)
        .await
        .expect("cancelled turn should resolve promptly")
        .expect("join handle should resolve")
        .expect_err("cancellation should abort the turn");
    assert_eq!(error, TurnError::Cancelled);

    server.shutdown();
}

#[tokio::test]
async fn cancellation_interrupts_a_stalled_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: sse_frames(&[r##"{"choices":[{"delta":{"content":"part"}}]}"##]),
            },
            ResponseChunk {
                delay_ms: 500,
                bytes: sse_frames(&[r##"{"choices":[{"delta":{},"finish_reason":"stop"}]}"##]),
            },
        ],
    }])
    .await;

    let endpoint =
        Arc::new(ChatCompletionsEndpoint::new(config(&server.base_url)).expect("endpoint"));
    let cancellation = Arc::new(AtomicBool::new(false));

    let turn_task = tokio::spawn({
        let endpoint = Arc::clone(&endpoint);
        let cancellation = Arc::clone(&cancellation);
        async move {
            endpoint
                .prompt(initial_entry(), Some(&cancellation), &mut |_| {})
                .await
        }
    });

    sleep(Duration::from_millis(120)).await;
    cancellation.store(true, Ordering::Release);

    let error = timeout(Duration::from_secs(5), turn_task)
        .await
        .expect("cancelled turn should resolve promptly")
        .expect("join handle should resolve")
        .expect_err("cancellation should abort the stream");
    assert_eq!(error, TurnError::Cancelled);

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
) {
    if read_request_headers(&mut socket).await.is_err() {
        return;
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r##"{"error":{"message":"unexpected request"}}"##));

    let headers = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        response.status,
        status_reason(response.status),
        response.content_type,
    );

    if socket.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    for chunk in response.chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        let prefix = format!("{:X}\r\n", chunk.bytes.len());
        if socket.write_all(prefix.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&chunk.bytes).await.is_err() {
            return;
        }
        if socket.write_all(b"\r\n").await.is_err() {
            return;
        }
    }

    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

async fn read_request_headers(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buffer[..n]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            return Ok(());
        }
    }
}
