#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use copilot_relay::auth::Credential;
use copilot_relay::client::CopilotClient;
use copilot_relay::clock::ManualClock;
use copilot_relay::config::GatewayConfig;
use copilot_relay::context::ApproximateCounter;
use copilot_relay::error::RelayError;
use copilot_relay::http::{
    HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport,
};
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::{Value, json};

pub const NOW: u64 = 1_700_000_000;

/// Canned reply for one request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Json { status: u16, body: Value },
    Raw { status: u16, body: String },
    Chunks { status: u16, chunks: Vec<String> },
    Fail(String),
}

/// In-memory gateway: replies are queued per URL and every request is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on(&self, url: &str, reply: Scripted) -> &Self {
        self.queues
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.url == url)
            .cloned()
            .collect()
    }

    async fn next_reply(&self, request: HttpRequest) -> Result<Scripted, RelayError> {
        let url = request.url.clone();
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .queues
            .lock()
            .get_mut(&url)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Scripted::Fail(message)) => Err(RelayError::transport(message)),
            Some(reply) => Ok(reply),
            None => Err(RelayError::transport(format!("no scripted reply for {url}"))),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError> {
        let (status, body) = match self.next_reply(request).await? {
            Scripted::Json { status, body } => (status, body.to_string()),
            Scripted::Raw { status, body } => (status, body),
            Scripted::Chunks { status, chunks } => (status, chunks.concat()),
            Scripted::Fail(_) => unreachable!("failures are returned by next_reply"),
        };
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.into_bytes(),
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, RelayError> {
        let (status, chunks) = match self.next_reply(request).await? {
            Scripted::Json { status, body } => (status, vec![body.to_string()]),
            Scripted::Raw { status, body } => (status, vec![body]),
            Scripted::Chunks { status, chunks } => (status, chunks),
            Scripted::Fail(_) => unreachable!("failures are returned by next_reply"),
        };
        let body: HttpBodyStream = Box::pin(stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(chunk.into_bytes()))
                .collect::<Vec<_>>(),
        ));
        Ok(HttpStreamResponse {
            status,
            headers: HashMap::new(),
            body,
        })
    }
}

pub fn token_reply(token: &str, expires_at: u64) -> Scripted {
    Scripted::Json {
        status: 200,
        body: json!({"token": token, "expires_at": expires_at, "refresh_in": 1500}),
    }
}

pub fn catalog_reply(models: Value) -> Scripted {
    Scripted::Json {
        status: 200,
        body: json!({"data": models}),
    }
}

pub fn sse(events: &[Value]) -> Vec<String> {
    let mut chunks: Vec<String> = events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect();
    chunks.push("data: [DONE]\n\n".to_string());
    chunks
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<ManualClock>,
    pub config: GatewayConfig,
    pub client: CopilotClient,
}

/// Client wired to a scripted transport, a manual clock and approximate token counting.
pub fn harness(transport: ScriptedTransport) -> Harness {
    let transport = Arc::new(transport);
    let clock = Arc::new(ManualClock::new(NOW));
    let config = GatewayConfig::default();
    let client = CopilotClient::builder(Credential::new("ghu_test_credential"))
        .transport(transport.clone())
        .clock(clock.clone())
        .config(config.clone())
        .token_counter(Arc::new(ApproximateCounter))
        .build()
        .expect("client");
    Harness {
        transport,
        clock,
        config,
        client,
    }
}
