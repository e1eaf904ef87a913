//! Scripted transport for client tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

use super::fetch::{HttpResponse, HttpTransport};
use super::ClientError;

type Handler = Box<dyn Fn(usize) -> Result<HttpResponse, ClientError> + Send + Sync>;
type UrlHandler = Box<dyn Fn(&str) -> Result<HttpResponse, ClientError> + Send + Sync>;
type Latency = Box<dyn Fn(&str) -> Duration + Send + Sync>;

/// Answers every GET from a closure and records what was requested.
pub(crate) struct MockTransport {
    handler: Responder,
    latency: Option<Latency>,
    calls: AtomicUsize,
    log: Mutex<Vec<(String, Instant)>>,
}

enum Responder {
    ByCall(Handler),
    ByUrl(UrlHandler),
}

impl MockTransport {
    /// Respond based on the zero-based call number.
    pub(crate) fn new(
        handler: impl Fn(usize) -> Result<HttpResponse, ClientError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_responder(Responder::ByCall(Box::new(handler)))
    }

    /// Respond based on the requested URL.
    pub(crate) fn by_url(
        handler: impl Fn(&str) -> Result<HttpResponse, ClientError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_responder(Responder::ByUrl(Box::new(handler)))
    }

    fn with_responder(handler: Responder) -> Self {
        Self {
            handler,
            latency: None,
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Delay each response; the delay may depend on the URL.
    pub(crate) fn with_latency(
        mut self,
        latency: impl Fn(&str) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.latency = Some(Box::new(latency));
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, ClientError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(url)).await;
        }

        match &self.handler {
            Responder::ByCall(handler) => handler(n),
            Responder::ByUrl(handler) => handler(url),
        }
    }
}

pub(crate) fn json_response<T: Serialize>(status: u16, body: &T) -> HttpResponse {
    HttpResponse {
        status,
        body: serde_json::to_vec(body).unwrap(),
    }
}

pub(crate) fn text_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        body: body.as_bytes().to_vec(),
    }
}
