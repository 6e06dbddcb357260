// # Source Opener
//
// Converts a DataSource into a single readable byte stream.
//
// ## Purpose
//
// A database may be fed by a user callable or by several URLs. Either way
// the loader and the storage writer want one stream. For URL sources a
// producer task GETs each URL in order and pipes the bodies through a
// bounded channel, with a newline after every URL so the last line of one
// body cannot run into the first line of the next.
//
// ## Partial failures
//
// A URL counts as failed when the request errors, the status is not 200
// (the first KiB of the body is kept for diagnostics), or the body copy
// errors mid-stream. Failures are logged and skipped; only when *every* URL
// fails is the pipe closed with an aggregate error, which readers observe
// on their next read.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;
use tracing::{debug, error};
use url::Url;

use crate::config::DataSource;
use crate::error::{Error, Result};
use crate::traits::storage::ByteStream;
use crate::SERVICE;

/// Bytes of a non-200 response body kept for the failure message.
const BODY_PREVIEW_BYTES: usize = 1024;

/// Channel depth between the URL producer and the consuming reader.
const PIPE_DEPTH: usize = 8;

/// Open a data source as a single readable stream.
///
/// A `get` callable is invoked and passed through unchanged, failures
/// included. A URL list spawns a producer that sequences the bodies; see
/// the module docs for the failure policy. A source with neither returns
/// [`Error::DataSourceNoSource`].
pub(crate) async fn open_data_source(
    client: &reqwest::Client,
    source: &DataSource,
) -> Result<ByteStream> {
    if let Some(get) = &source.get {
        debug!(service = SERVICE, "opening database source via get callable");
        return get().await;
    }

    if source.urls.is_empty() {
        return Err(Error::DataSourceNoSource);
    }

    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(PIPE_DEPTH);
    let client = client.clone();
    let urls = source.urls.clone();

    tokio::spawn(async move {
        let mut failures: Vec<String> = Vec::with_capacity(urls.len());

        for url in &urls {
            if let Err(failure) = fetch_url_into(&client, url, &tx).await {
                failures.push(failure);
            }

            // Separator so the next URL body starts on a fresh line; written
            // after failed URLs too.
            if tx.send(Ok(Bytes::from_static(b"\n"))).await.is_err() {
                return;
            }
        }

        if failures.len() == urls.len() {
            let aggregate = Error::AllUrlsFailed(failures.join("; "));
            let _ = tx.send(Err(std::io::Error::other(aggregate))).await;
        }
    });

    Ok(Box::new(StreamReader::new(ReceiverStream::new(rx))))
}

/// Fetch one URL and forward its body into the pipe.
///
/// Returns the failure message when the URL did not contribute a complete
/// 200 body.
async fn fetch_url_into(
    client: &reqwest::Client,
    url: &Url,
    tx: &mpsc::Sender<std::io::Result<Bytes>>,
) -> std::result::Result<(), String> {
    debug!(service = SERVICE, source_url = %url, "starting database download");

    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(err) => {
            error!(
                service = SERVICE,
                source_url = %url,
                error = %err,
                "failed to download database"
            );
            return Err(format!("source URL \"{url}\": {err}"));
        }
    };

    let status = response.status();
    if status.as_u16() != 200 {
        let body = body_preview(response).await;
        error!(
            service = SERVICE,
            source_url = %url,
            status_code = status.as_u16(),
            body = %body,
            "failed to download database because status code was not 200"
        );
        return Err(format!(
            "source URL \"{url}\": status code {status} (expected 200): {body}"
        ));
    }

    let mut bytes_written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => {
                bytes_written += chunk.len() as u64;
                if tx.send(Ok(chunk)).await.is_err() {
                    // Reader side is gone; the refresh was abandoned.
                    return Err(format!("source URL \"{url}\": pipe reader closed"));
                }
            }
            Err(err) => {
                error!(
                    service = SERVICE,
                    source_url = %url,
                    bytes_written,
                    error = %err,
                    "failed to download database"
                );
                return Err(format!(
                    "source URL \"{url}\" (bytes written: {bytes_written}): {err}"
                ));
            }
        }
    }

    debug!(service = SERVICE, source_url = %url, bytes_written, "finished database download");
    Ok(())
}

/// Read a bounded prefix of a response body for error messages.
async fn body_preview(response: reqwest::Response) -> String {
    let mut buf: Vec<u8> = Vec::with_capacity(BODY_PREVIEW_BYTES);
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let Ok(chunk) = chunk else { break };
        buf.extend_from_slice(&chunk);
        if buf.len() >= BODY_PREVIEW_BYTES {
            buf.truncate(BODY_PREVIEW_BYTES);
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSource;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn sourceless_spec_rejected() {
        let client = reqwest::Client::new();
        let source = DataSource::from_urls(vec![], Duration::from_secs(60));

        let err = open_data_source(&client, &source).await.err().unwrap();
        assert!(matches!(err, Error::DataSourceNoSource));
    }

    #[tokio::test]
    async fn get_callable_passes_through() {
        let client = reqwest::Client::new();
        let source = DataSource::from_get(
            || async {
                Ok(Box::new(std::io::Cursor::new(b"a.com\n".to_vec())) as ByteStream)
            },
            Duration::from_secs(60),
        );

        let mut stream = open_data_source(&client, &source).await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "a.com\n");
    }

    #[tokio::test]
    async fn get_callable_failure_propagates_verbatim() {
        let client = reqwest::Client::new();
        let source = DataSource::from_get(
            || async {
                let down: Result<ByteStream> = Err(Error::http("boom"));
                down
            },
            Duration::from_secs(60),
        );

        let err = open_data_source(&client, &source).await.err().unwrap();
        assert!(matches!(err, Error::Http(msg) if msg == "boom"));
    }
}
