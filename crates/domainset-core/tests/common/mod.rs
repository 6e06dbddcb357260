//! Test doubles and fixtures shared by the integration tests
//!
//! Provides a minimal raw-HTTP fixture server for URL-mode sources, callable
//! sources backed by in-memory bytes, and helpers to pre-seed a data
//! directory the way a previous engine run would have left it.

#![allow(dead_code)]

use domainset_core::{ByteStream, DataSource};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// A canned HTTP response for one path.
#[derive(Clone)]
pub struct Route {
    pub path: &'static str,
    pub status: u16,
    pub body: &'static str,
}

impl Route {
    pub fn ok(path: &'static str, body: &'static str) -> Self {
        Self {
            path,
            status: 200,
            body,
        }
    }

    pub fn status(path: &'static str, status: u16, body: &'static str) -> Self {
        Self { path, status, body }
    }
}

/// Tiny HTTP/1.1 fixture server serving fixed responses per path.
///
/// Each connection reads one request, answers with `Connection: close`, and
/// hangs up. Enough for a reqwest GET.
pub struct FixtureServer {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl FixtureServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let (status, body) = routes
                        .iter()
                        .find(|route| route.path == path)
                        .map(|route| (route.status, route.body))
                        .unwrap_or((404, ""));
                    let reason = match status {
                        200 => "OK",
                        404 => "Not Found",
                        500 => "Internal Server Error",
                        _ => "Error",
                    };

                    let response = format!(
                        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, handle }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{path}", self.addr)).unwrap()
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A long interval that keeps scheduled updaters out of a test's way.
pub const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

/// A callable source serving fixed bytes.
pub fn bytes_source(content: &'static str, refresh_interval: Duration) -> DataSource {
    DataSource::from_get(
        move || async move {
            Ok(Box::new(std::io::Cursor::new(content.as_bytes().to_vec())) as ByteStream)
        },
        refresh_interval,
    )
}

/// A callable source serving fixed bytes and counting invocations.
pub fn counting_source(
    content: &'static str,
    refresh_interval: Duration,
) -> (DataSource, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_source = Arc::clone(&calls);

    let source = DataSource::from_get(
        move || {
            calls_in_source.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(Box::new(std::io::Cursor::new(content.as_bytes().to_vec())) as ByteStream)
            }
        },
        refresh_interval,
    );

    (source, calls)
}

/// A callable source that always fails.
pub fn failing_source(refresh_interval: Duration) -> DataSource {
    DataSource::from_get(
        || async {
            let down: domainset_core::Result<ByteStream> =
                Err(domainset_core::Error::http("fixture source down"));
            down
        },
        refresh_interval,
    )
}

/// Seed a data directory the way a previous engine run would have:
/// a cached database file plus a checkpoints document mentioning it.
pub fn seed_cache(dir: &Path, name: &str, content: &str, last_updated_unix: i64) {
    std::fs::write(dir.join(format!("{name}.txt")), content).unwrap();
    std::fs::write(
        dir.join("checkpoints.json"),
        format!(r#"{{"Checkpoints":{{"{name}":{{"LastUpdatedUnix":{last_updated_unix}}}}}}}"#),
    )
    .unwrap();
}
