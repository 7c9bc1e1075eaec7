//! Readiness detection on the preview server's output, plus the warm-up request

use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufRead, Split};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::process::read_line;

/// The output line that signalled readiness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyLine {
    pub line: String,

    /// Lines read from the stream, including the matching one
    pub consumed: usize,
}

/// Read lines until one matches `pattern`.
///
/// Stops right after the matching line, so anything the server prints
/// afterwards is still available on the stream.
pub async fn await_ready<R>(
    lines: &mut Split<R>,
    pattern: &Regex,
    limit: Duration,
) -> E2eResult<ReadyLine>
where
    R: AsyncBufRead + Unpin,
{
    match timeout(limit, scan(lines, pattern)).await {
        Ok(result) => result,
        Err(_) => Err(E2eError::Timeout(format!(
            "readiness marker /{}/ after {:?}",
            pattern.as_str(),
            limit
        ))),
    }
}

async fn scan<R>(lines: &mut Split<R>, pattern: &Regex) -> E2eResult<ReadyLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    while let Some(line) = read_line(lines).await? {
        consumed += 1;
        debug!("[preview] {}", line);
        if pattern.is_match(&line) {
            info!("Preview server ready: {}", line.trim());
            return Ok(ReadyLine { line, consumed });
        }
    }

    Err(E2eError::Readiness(format!(
        "output closed after {} line(s) without matching /{}/",
        consumed,
        pattern.as_str()
    )))
}

/// Issue one GET against the data endpoint and discard the outcome.
///
/// The first uncached response can take several seconds, long enough for
/// browser tests to see a blank page.
pub async fn warm_up(url: &str, limit: Duration) {
    let client = match reqwest::Client::builder().timeout(limit).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Skipping warm-up, HTTP client unavailable: {}", e);
            return;
        }
    };

    debug!("Warming up {}", url);
    match client.get(url).send().await {
        Ok(resp) => {
            let status = resp.status();
            let _ = resp.bytes().await;
            debug!("Warm-up returned {}", status);
        }
        Err(e) => warn!("Warm-up request to {} failed: {}", url, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn marker() -> Regex {
        Regex::new(r"Running preview at http://localhost:3883/").unwrap()
    }

    #[tokio::test]
    async fn test_stops_after_matching_line() {
        let output: &[u8] = b"starting...\nRunning preview at http://localhost:3883/\nother log\n";
        let mut lines = BufReader::new(output).split(b'\n');

        let ready = await_ready(&mut lines, &marker(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(ready.consumed, 2);
        assert_eq!(ready.line, "Running preview at http://localhost:3883/");
        assert_eq!(read_line(&mut lines).await.unwrap().as_deref(), Some("other log"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let output: &[u8] = b"starting...\n\xff\xfe build\nRunning preview at http://localhost:3883/\n";
        let mut lines = BufReader::new(output).split(b'\n');

        let ready = await_ready(&mut lines, &marker(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(ready.consumed, 3);
    }

    #[tokio::test]
    async fn test_stream_end_is_readiness_error() {
        let output: &[u8] = b"starting...\nError: port in use\n";
        let mut lines = BufReader::new(output).split(b'\n');

        let err = await_ready(&mut lines, &marker(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Readiness(_)));
    }

    #[tokio::test]
    async fn test_silent_stream_times_out() {
        // Keep the writer alive so the stream never closes
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).split(b'\n');

        let err = await_ready(&mut lines, &marker(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_warm_up_issues_single_get() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/previews.json", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        warm_up(&url, Duration::from_secs(5)).await;

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /previews.json"));
    }

    #[tokio::test]
    async fn test_warm_up_swallows_connection_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        warm_up(&format!("http://{}/previews.json", addr), Duration::from_secs(1)).await;
    }
}
