use anyhow::Context as _;
use futures::StreamExt as _;
use futures::stream::BoxStream;
use std::net::TcpListener;
use std::process::Child;
use std::time::{Duration, Instant};

/// Kills (and reaps) a spawned importer process when the test ends, pass or fail.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; another process may still bind it first.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a success status.
///
/// # Errors
///
/// Returns an error if the timeout elapses first.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// One server-sent event with its data parsed as JSON.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: serde_json::Value,
}

/// Reads named events off a `text/event-stream` response (e.g. `GET /api/updates`).
pub struct SseReader {
    inner: BoxStream<'static, anyhow::Result<sse_stream::Sse>>,
}

impl SseReader {
    #[must_use]
    pub fn new(resp: reqwest::Response) -> Self {
        Self {
            inner: sse_stream::SseStream::from_byte_stream(resp.bytes_stream())
                .map(|evt| evt.map_err(|e| anyhow::anyhow!("{e}")))
                .boxed(),
        }
    }

    /// Next event named `event`, skipping keep-alives and other event types.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, stream end, or non-JSON data.
    pub async fn next_named(
        &mut self,
        event: &str,
        timeout_dur: Duration,
    ) -> anyhow::Result<SseEvent> {
        tokio::time::timeout(timeout_dur, async {
            while let Some(evt) = self.inner.next().await {
                let evt = evt.context("read SSE event")?;
                if evt.event.as_deref() != Some(event) {
                    continue;
                }
                let payload = evt.data.unwrap_or_default();
                let data = serde_json::from_str(&payload)
                    .with_context(|| format!("parse SSE data as JSON: {payload}"))?;
                return Ok(SseEvent {
                    event: evt.event,
                    id: evt.id,
                    data,
                });
            }
            anyhow::bail!("event-stream ended before a '{event}' event")
        })
        .await
        .with_context(|| format!("timed out waiting for '{event}' event"))?
    }
}
