//! The streaming transformation pipeline.
//!
//! Each streamed request runs three tasks joined by bounded queues:
//!
//! ```text
//! upstream bytes ─▶ reader ─▶ [q] ─▶ classifier ─▶ [q] ─▶ renderer ─▶ [q] ─▶ client body
//! ```
//!
//! Order is preserved end to end and every queue applies backpressure. When
//! the client goes away the body is dropped and each stage exits as soon as
//! its output queue closes, which in turn drops the upstream response.
//! Until the first upstream byte arrives the body interleaves keepalive
//! comments; after that they stop for good.

use assistgate_config::StreamingConfig;
use assistgate_translate::{Classify, Render, sse::KEEPALIVE_FRAME};
use assistgate_types::{ByteStream, GatewayError, error::Result};
use bytes::Bytes;
use eventsource_stream::Eventsource as _;
use futures_util::StreamExt as _;
use std::{future::Future, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, Interval, MissedTickBehavior},
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Capacity of each inter-stage queue (at least 1).
    pub queue_depth: usize,
    /// Keepalive period before the first upstream byte; `None` disables.
    pub keepalive: Option<Duration>,
    /// Log raw upstream payloads at debug level.
    pub debug: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

impl From<&StreamingConfig> for PipelineOptions {
    fn from(c: &StreamingConfig) -> Self {
        Self {
            queue_depth: c.queue_depth.max(1),
            keepalive: (c.keepalive_secs > 0).then(|| Duration::from_secs(c.keepalive_secs)),
            debug: c.debug,
        }
    }
}

/// Start the three stages for one request and return the client body.
pub fn spawn<C, R>(upstream: ByteStream, classifier: C, renderer: R, opts: &PipelineOptions) -> ByteStream
where
    C: Classify + 'static,
    R: Render<Item = C::Item> + 'static,
{
    let depth = opts.queue_depth.max(1);
    let (payload_tx, payload_rx) = mpsc::channel::<String>(depth);
    let (item_tx, item_rx) = mpsc::channel::<C::Item>(depth);
    let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(depth);
    let (first_byte_tx, first_byte_rx) = watch::channel(false);

    tokio::spawn(run_stage("reader", read_upstream(upstream, payload_tx, first_byte_tx)));
    tokio::spawn(run_stage(
        "classifier",
        classify_payloads(payload_rx, item_tx, classifier, opts.debug),
    ));
    tokio::spawn(run_stage("renderer", render_items(item_rx, frame_tx, renderer)));

    let keepalive = opts.keepalive.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    body(frame_rx, first_byte_rx, keepalive)
}

async fn run_stage(stage: &'static str, task: impl Future<Output = Result<()>>) {
    if let Err(e) = task.await {
        tracing::debug!(stage, error = %e, "pipeline stage stopped");
    }
}

/// The error a stage reports when its downstream queue has closed.
fn client_gone() -> GatewayError {
    GatewayError::StreamWrite("client disconnected".into())
}

/// Stage 1: frame the upstream SSE and forward `data` payloads.
///
/// Dropping the returned future releases the upstream response.
async fn read_upstream(
    upstream: ByteStream,
    out: mpsc::Sender<String>,
    first_byte: watch::Sender<bool>,
) -> Result<()> {
    let mut events = Box::pin(
        upstream
            .inspect(move |chunk| {
                if chunk.is_ok() && !*first_byte.borrow() {
                    first_byte.send_replace(true);
                }
            })
            .eventsource(),
    );

    loop {
        let next = tokio::select! {
            biased;
            () = out.closed() => return Err(client_gone()),
            next = events.next() => next,
        };
        match next {
            Some(Ok(event)) if event.data.is_empty() => {}
            Some(Ok(event)) => out.send(event.data).await.map_err(|_| client_gone())?,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "upstream stream failed, closing response");
                return Ok(());
            }
            None => return Ok(()),
        }
    }
}

/// Stage 2: classify payloads into renderer items.
async fn classify_payloads<C: Classify>(
    mut input: mpsc::Receiver<String>,
    out: mpsc::Sender<C::Item>,
    mut classifier: C,
    debug: bool,
) -> Result<()> {
    loop {
        let payload = tokio::select! {
            biased;
            () = out.closed() => return Err(client_gone()),
            p = input.recv() => match p {
                Some(p) => p,
                None => return Ok(()),
            },
        };
        if debug {
            tracing::debug!(payload = %payload, "upstream chunk");
        }
        for item in classifier.classify(&payload) {
            out.send(item).await.map_err(|_| client_gone())?;
        }
    }
}

/// Stage 3: render items into frames, then the closing frames.
async fn render_items<R: Render>(
    mut input: mpsc::Receiver<R::Item>,
    out: mpsc::Sender<Bytes>,
    mut renderer: R,
) -> Result<()> {
    loop {
        let item = tokio::select! {
            biased;
            () = out.closed() => return Err(client_gone()),
            i = input.recv() => i,
        };
        let Some(item) = item else { break };
        for frame in renderer.render(item) {
            out.send(frame).await.map_err(|_| client_gone())?;
        }
    }
    for frame in renderer.finish() {
        out.send(frame).await.map_err(|_| client_gone())?;
    }
    Ok(())
}

struct BodyState {
    frames: mpsc::Receiver<Bytes>,
    first_byte: watch::Receiver<bool>,
    keepalive: Option<Interval>,
}

enum Next {
    Frame(Option<Bytes>),
    FirstByte,
    Keepalive,
}

fn frame(bytes: Bytes) -> Result<Bytes> {
    Ok(bytes)
}

fn body(frames: mpsc::Receiver<Bytes>, first_byte: watch::Receiver<bool>, keepalive: Option<Interval>) -> ByteStream {
    let state = BodyState {
        frames,
        first_byte,
        keepalive,
    };
    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if *state.first_byte.borrow() {
                state.keepalive = None;
            }
            let Some(ticker) = state.keepalive.as_mut() else {
                return state.frames.recv().await.map(|f| (frame(f), state));
            };
            let next = tokio::select! {
                biased;
                f = state.frames.recv() => Next::Frame(f),
                _ = state.first_byte.changed() => Next::FirstByte,
                _ = ticker.tick() => Next::Keepalive,
            };
            match next {
                Next::Frame(f) => return f.map(|f| (frame(f), state)),
                Next::FirstByte => state.keepalive = None,
                Next::Keepalive => {
                    return Some((frame(Bytes::from_static(KEEPALIVE_FRAME)), state));
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistgate_translate::{EnvelopeClassifier, EventClassifier, NativeSseRenderer, OpenAISseRenderer};
    use serde_json::Value;
    use tokio_stream::wrappers::ReceiverStream;

    type Upstream = mpsc::Sender<Result<Bytes>>;

    fn upstream_channel() -> (Upstream, ByteStream) {
        let (tx, rx) = mpsc::channel(8);
        (tx, Box::pin(ReceiverStream::new(rx)))
    }

    fn openai(upstream: ByteStream, opts: &PipelineOptions) -> ByteStream {
        spawn(upstream, EventClassifier, OpenAISseRenderer::new("gemini-2.5-flash"), opts)
    }

    async fn collect(mut body: ByteStream) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(frame) = body.next().await {
            out.push(String::from_utf8(frame.unwrap().to_vec()).unwrap());
        }
        out
    }

    fn data(frame: &str) -> Value {
        serde_json::from_str(frame.strip_prefix("data: ").unwrap().trim_end()).unwrap()
    }

    fn sse(json: &str) -> Result<Bytes> {
        Ok(Bytes::from(format!("data: {json}\n\n")))
    }

    const TEXT_CHUNK: &str =
        r#"{"response":{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello"}]}}]}}"#;

    fn no_keepalive() -> PipelineOptions {
        PipelineOptions {
            keepalive: None,
            ..PipelineOptions::default()
        }
    }

    #[tokio::test]
    async fn test_text_stream_frames_in_order() {
        let (tx, upstream) = upstream_channel();
        let body = openai(upstream, &no_keepalive());
        tx.send(sse(TEXT_CHUNK)).await.unwrap();
        tx.send(sse(
            r#"{"response":{"candidates":[{"content":{"parts":[{"text":" world"}]}}],"usageMetadata":{"promptTokenCount":2,"candidatesTokenCount":2,"totalTokenCount":4}}}"#,
        ))
        .await
        .unwrap();
        drop(tx);

        let frames = collect(body).await;
        assert_eq!(frames.len(), 4);
        assert_eq!(data(&frames[0])["choices"][0]["delta"]["content"], "Hello");
        assert_eq!(data(&frames[0])["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(data(&frames[1])["choices"][0]["delta"]["content"], " world");
        let last = data(&frames[2]);
        assert_eq!(last["choices"][0]["finish_reason"], "stop");
        assert_eq!(last["usage"]["total_tokens"], 4);
        assert_eq!(frames[3], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_chunk_split_across_reads() {
        let (tx, upstream) = upstream_channel();
        let body = openai(upstream, &no_keepalive());
        let whole = format!("data: {TEXT_CHUNK}\n\n");
        let (a, b) = whole.split_at(25);
        tx.send(Ok(Bytes::from(a.to_string()))).await.unwrap();
        tx.send(Ok(Bytes::from(b.to_string()))).await.unwrap();
        drop(tx);

        let frames = collect(body).await;
        assert_eq!(data(&frames[0])["choices"][0]["delta"]["content"], "Hello");
    }

    #[tokio::test]
    async fn test_empty_upstream_still_closes() {
        let (tx, upstream) = upstream_channel();
        let body = openai(upstream, &no_keepalive());
        drop(tx);
        let frames = collect(body).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(data(&frames[0])["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[1], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_tool_call_stream() {
        let (tx, upstream) = upstream_channel();
        let body = openai(upstream, &no_keepalive());
        tx.send(sse(
            r#"{"response":{"candidates":[{"content":{"parts":[{"functionCall":{"name":"lookup","args":{"q":"rust"}}}]}}]}}"#,
        ))
        .await
        .unwrap();
        drop(tx);

        let frames = collect(body).await;
        let call = &data(&frames[0])["choices"][0]["delta"]["tool_calls"][0];
        assert!(call["id"].as_str().unwrap().starts_with("call_"));
        assert_eq!(call["function"]["arguments"], r#"{"q":"rust"}"#);
        assert_eq!(data(&frames[1])["choices"][0]["finish_reason"], "tool_calls");
    }

    #[tokio::test]
    async fn test_midstream_error_still_closes() {
        let (tx, upstream) = upstream_channel();
        let body = openai(upstream, &no_keepalive());
        tx.send(sse(TEXT_CHUNK)).await.unwrap();
        tx.send(Err(GatewayError::Http("connection reset".into())))
            .await
            .unwrap();
        tx.send(sse(TEXT_CHUNK)).await.unwrap();
        drop(tx);

        let frames = collect(body).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(data(&frames[1])["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[2], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_native_stream_unwraps_without_done() {
        let (tx, upstream) = upstream_channel();
        let body = spawn(upstream, EnvelopeClassifier, NativeSseRenderer, &no_keepalive());
        tx.send(sse(TEXT_CHUNK)).await.unwrap();
        drop(tx);

        let frames = collect(body).await;
        assert_eq!(frames.len(), 1);
        let chunk = data(&frames[0]);
        assert!(chunk.get("response").is_none());
        assert_eq!(chunk["candidates"][0]["content"]["parts"][0]["text"], "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_stops_after_first_byte() {
        let (tx, upstream) = upstream_channel();
        let opts = PipelineOptions {
            keepalive: Some(Duration::from_secs(15)),
            ..PipelineOptions::default()
        };
        let mut body = openai(upstream, &opts);

        for _ in 0..2 {
            let frame = body.next().await.unwrap().unwrap();
            assert_eq!(&frame[..], KEEPALIVE_FRAME);
        }

        tx.send(sse(TEXT_CHUNK)).await.unwrap();
        let frame = body.next().await.unwrap().unwrap();
        assert!(frame.starts_with(b"data: "));

        // A quiet upstream after the first byte produces no keepalives.
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(tx);
        let rest = collect(body).await;
        assert!(rest.iter().all(|f| f.starts_with("data: ")));
        assert_eq!(rest.last().unwrap(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_client_disconnect_drops_upstream() {
        let (tx, upstream) = upstream_channel();
        let body = openai(upstream, &no_keepalive());
        tx.send(sse(TEXT_CHUNK)).await.unwrap();
        drop(body);

        tokio::time::timeout(Duration::from_secs(5), tx.closed())
            .await
            .expect("upstream should be released after the client disconnects");
    }

    #[tokio::test]
    async fn test_stage_reports_closed_client() {
        let (tx, upstream) = upstream_channel();
        let (payload_tx, payload_rx) = mpsc::channel(1);
        let (first_byte_tx, _first_byte_rx) = watch::channel(false);
        drop(payload_rx);
        tx.send(sse(TEXT_CHUNK)).await.unwrap();

        let err = read_upstream(upstream, payload_tx, first_byte_tx).await.unwrap_err();
        assert!(matches!(err, GatewayError::StreamWrite(_)));
        assert!(tx.is_closed());

        let (item_tx, item_rx) = mpsc::channel(1);
        let (frame_tx, frame_rx) = mpsc::channel(1);
        drop(frame_rx);
        drop(item_tx);
        let err = render_items(item_rx, frame_tx, OpenAISseRenderer::new("gemini-2.5-flash"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StreamWrite(_)));
    }

    #[tokio::test]
    async fn test_backpressure_bounds_reads() {
        let (tx, upstream) = upstream_channel();
        let opts = PipelineOptions {
            queue_depth: 1,
            ..no_keepalive()
        };
        let mut body = openai(upstream, &opts);

        // With nobody reading the body, the stages fill up and stop pulling.
        let mut accepted = 0;
        while accepted < 100 && tx.try_send(sse(TEXT_CHUNK)).is_ok() {
            accepted += 1;
            tokio::task::yield_now().await;
        }
        assert!(accepted < 100, "pipeline kept reading without a consumer");

        let first = body.next().await.unwrap().unwrap();
        assert!(first.starts_with(b"data: "));
        drop(tx);
        let rest = collect(body).await;
        assert_eq!(rest.len(), accepted + 1);
        assert_eq!(rest.last().unwrap(), "data: [DONE]\n\n");
    }
}
