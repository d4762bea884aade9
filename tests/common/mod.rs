//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

use topology_tester::config::{validate_config, ServiceConfig};
use topology_tester::instrument::zipkin::model::Span as ZipkinSpan;
use topology_tester::instrument::{Backend, Instrumenter, Reporter};
use topology_tester::lifecycle::{CrashScheduler, Shutdown};
use topology_tester::HttpServer;

/// A raw-TCP backend answering every request with the same response.
pub struct StubBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Request heads received so far, lower-cased.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub async fn start_stub(status: u16, body: &'static str) -> StubBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let (counter, log) = (calls.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let (counter, log) = (counter.clone(), log.clone());
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                log.lock().unwrap().push(head.to_ascii_lowercase());

                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    StubBackend { addr, calls, requests }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running node with an in-process Zipkin reporter.
pub struct Node {
    pub addr: SocketAddr,
    pub spans: UnboundedReceiver<ZipkinSpan>,
    shutdown: Shutdown,
}

impl Node {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn authority(&self) -> String {
        self.addr.to_string()
    }

    /// Collect `count` exported spans.
    pub async fn take_spans(&mut self, count: usize) -> Vec<ZipkinSpan> {
        let mut spans = Vec::with_capacity(count);
        for _ in 0..count {
            let span = tokio::time::timeout(Duration::from_secs(5), self.spans.recv())
                .await
                .expect("span was not exported")
                .expect("reporter closed");
            spans.push(span);
        }
        spans
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_node(name: &str) -> Node {
    start_node_with(name, |_| {}).await
}

pub async fn start_node_with(name: &str, configure: impl FnOnce(&mut ServiceConfig)) -> Node {
    let mut config = ServiceConfig::default();
    config.service_name = name.to_string();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    configure(&mut config);
    let settings = validate_config(&config).unwrap();

    let (reporter, spans) = Reporter::capture();
    let instrumenter = Instrumenter::from_backend(Backend::zipkin(&settings.zipkin, reporter).unwrap());
    let server = HttpServer::with_crash_scheduler(
        &settings,
        &instrumenter,
        CrashScheduler::with_terminator(settings.crash_delay, |_| {}),
    )
    .unwrap();

    let listener = TcpListener::bind(server.bind_address()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    Node { addr, spans, shutdown }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
