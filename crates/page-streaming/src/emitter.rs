//! Turns a render result into response frames.

use std::fmt::Display;

use futures::stream::{self, StreamExt};
use futures::Sink;
use http::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use http::StatusCode;
use page_core::PageError;
use tracing::{debug, warn};

use crate::close::OnceCallback;
use crate::error::{EmitError, EmitResult};
use crate::etag::{etag_matches, generate_etag};
use crate::response::{OutgoingResponse, ResponseFrame};
use crate::result::{BodyStream, RenderResult};

/// Header marking responses produced by this server.
pub const RUNTIME_MARKER_HEADER: &str = "x-edge-runtime";

/// Value of [`RUNTIME_MARKER_HEADER`].
pub const RUNTIME_MARKER_VALUE: &str = "1";

/// Header advertising the server.
pub const POWERED_BY_HEADER: &str = "x-powered-by";

/// Default value of the powered-by header.
pub const DEFAULT_POWERED_BY: &str = "page-server";

/// Kind of payload being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Html,
    Json,
}

impl ContentKind {
    /// Content type used when neither the response nor the result declares one.
    pub fn default_content_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Json => "application/json",
        }
    }
}

/// Per-response delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub content_kind: ContentKind,
    pub generate_etags: bool,
    pub advertise_powered_by: bool,
    pub powered_by_value: String,
    /// `If-None-Match` from the request, for conditional buffered responses.
    pub if_none_match: Option<String>,
    /// Headers written right after the runtime marker.
    pub extra_headers: Vec<(HeaderName, String)>,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            content_kind: ContentKind::Html,
            generate_etags: true,
            advertise_powered_by: false,
            powered_by_value: DEFAULT_POWERED_BY.to_string(),
            if_none_match: None,
            extra_headers: Vec::new(),
        }
    }
}

impl DeliveryOptions {
    /// Settings for an HTML page.
    pub fn html() -> Self {
        Self::default()
    }

    /// Settings for a JSON payload.
    pub fn json() -> Self {
        Self {
            content_kind: ContentKind::Json,
            ..Self::default()
        }
    }
}

/// How a streamed body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every chunk was written and the response finished.
    Completed,
    /// The client went away or the transport failed mid-stream.
    Cancelled,
}

/// Result of emitting a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Buffered body written in full.
    Buffered { content_length: u64 },
    /// Conditional request matched the ETag; no body sent.
    NotModified,
    /// Streamed body.
    Streamed(StreamOutcome),
}

enum PumpEnd {
    Drained,
    Aborted,
    WriteFailed(EmitError),
    BodyFailed(PageError),
}

/// Writes render results to outgoing responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseEmitter;

impl ResponseEmitter {
    /// Create an emitter.
    pub fn new() -> Self {
        Self
    }

    /// Emit `result` on `response`.
    ///
    /// Buffered results get an exact byte `Content-Length` and, when enabled,
    /// an ETag. Streamed results are pumped chunk by chunk; a client
    /// disconnect aborts the producer and yields
    /// [`StreamOutcome::Cancelled`] rather than an error.
    pub async fn emit<S, E>(
        &self,
        response: &mut OutgoingResponse<S>,
        result: RenderResult,
        options: &DeliveryOptions,
    ) -> EmitResult<EmitOutcome>
    where
        S: Sink<ResponseFrame, Error = E> + Unpin,
        E: Display,
    {
        if let Err(e) = self.apply_headers(response, result.content_type(), options) {
            response.close_listeners().notify();
            return Err(e);
        }

        match result {
            RenderResult::Buffered { content, .. } => {
                let emitted = self.emit_buffered(response, content, options).await;
                if emitted.is_err() {
                    response.close_listeners().notify();
                }
                emitted
            }
            RenderResult::Dynamic { body, .. } => self
                .emit_stream(response, body)
                .await
                .map(EmitOutcome::Streamed),
        }
    }

    fn apply_headers<S, E>(
        &self,
        response: &mut OutgoingResponse<S>,
        declared: Option<&str>,
        options: &DeliveryOptions,
    ) -> EmitResult<()>
    where
        S: Sink<ResponseFrame, Error = E> + Unpin,
        E: Display,
    {
        // Render functions may already have set headers on the head.
        response.set_first_header(
            HeaderName::from_static(RUNTIME_MARKER_HEADER),
            RUNTIME_MARKER_VALUE,
        )?;
        for (name, value) in &options.extra_headers {
            response.set_header(name.clone(), value)?;
        }

        if options.advertise_powered_by && options.content_kind == ContentKind::Html {
            response.set_header(
                HeaderName::from_static(POWERED_BY_HEADER),
                &options.powered_by_value,
            )?;
        }

        let content_type = declared.unwrap_or(options.content_kind.default_content_type());
        response.set_header_if_absent(CONTENT_TYPE, content_type)
    }

    async fn emit_buffered<S, E>(
        &self,
        response: &mut OutgoingResponse<S>,
        content: Vec<u8>,
        options: &DeliveryOptions,
    ) -> EmitResult<EmitOutcome>
    where
        S: Sink<ResponseFrame, Error = E> + Unpin,
        E: Display,
    {
        if options.generate_etags {
            let etag = generate_etag(&content);
            let fresh = options
                .if_none_match
                .as_deref()
                .is_some_and(|candidate| etag_matches(candidate, &etag));
            response.set_header(ETAG, &etag)?;

            if fresh {
                response.set_status(StatusCode::NOT_MODIFIED)?;
                response.finish().await?;
                response.close_listeners().notify();
                return Ok(EmitOutcome::NotModified);
            }
        }

        let content_length = content.len() as u64;
        response.set_header(CONTENT_LENGTH, &content_length.to_string())?;
        if content.is_empty() {
            response.send_head().await?;
        } else {
            response.write(content).await?;
        }
        response.finish().await?;
        response.close_listeners().notify();

        Ok(EmitOutcome::Buffered { content_length })
    }

    async fn emit_stream<S, E>(
        &self,
        response: &mut OutgoingResponse<S>,
        body: BodyStream,
    ) -> EmitResult<StreamOutcome>
    where
        S: Sink<ResponseFrame, Error = E> + Unpin,
        E: Display,
    {
        let (body, abort) = stream::abortable(body);

        let caller = response.close_listeners().clone();
        let close = OnceCallback::new(move || caller.notify());

        let disconnect = response.client_close().register(move || abort.abort());
        let end = pump(response, body).await;
        response.client_close().deregister(disconnect);

        match end {
            PumpEnd::Drained => match response.finish().await {
                Ok(()) => {
                    close.fire();
                    debug!(bytes = response.bytes_written(), "stream completed");
                    Ok(StreamOutcome::Completed)
                }
                Err(e) => {
                    close.fire();
                    warn!(error = %e, "stream finalization failed, treating as cancelled");
                    Ok(StreamOutcome::Cancelled)
                }
            },
            PumpEnd::Aborted => {
                response.abort().await;
                close.fire();
                debug!(bytes = response.bytes_written(), "stream cancelled by client");
                Ok(StreamOutcome::Cancelled)
            }
            PumpEnd::WriteFailed(e) => {
                response.abort().await;
                close.fire();
                warn!(error = %e, "stream write failed, treating as cancelled");
                Ok(StreamOutcome::Cancelled)
            }
            PumpEnd::BodyFailed(e) => {
                response.abort().await;
                close.fire();
                Err(EmitError::Body(e))
            }
        }
    }
}

async fn pump<S, E, B>(response: &mut OutgoingResponse<S>, mut body: B) -> PumpEnd
where
    S: Sink<ResponseFrame, Error = E> + Unpin,
    E: Display,
    B: futures::Stream<Item = Result<Vec<u8>, PageError>> + Unpin,
{
    if let Err(e) = response.send_head().await {
        return PumpEnd::WriteFailed(e);
    }

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => {
                if let Err(e) = response.write(chunk).await {
                    return PumpEnd::WriteFailed(e);
                }
            }
            Err(e) => return PumpEnd::BodyFailed(e),
        }
    }

    if response.client_close().is_closed() {
        PumpEnd::Aborted
    } else {
        PumpEnd::Drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Poll;

    fn head_headers(frames: &[ResponseFrame]) -> &http::HeaderMap {
        match &frames[0] {
            ResponseFrame::Head { headers, .. } => headers,
            other => panic!("expected head frame, got {:?}", other),
        }
    }

    fn close_counter<S, E>(response: &OutgoingResponse<S>) -> Arc<AtomicUsize>
    where
        S: Sink<ResponseFrame, Error = E> + Unpin,
        E: Display,
    {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        response.on_close(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    // === Header Tests ===

    #[tokio::test]
    async fn test_json_content_type_fallback() {
        let mut response = OutgoingResponse::new(Vec::new());
        ResponseEmitter::new()
            .emit(&mut response, RenderResult::buffered("{}"), &DeliveryOptions::json())
            .await
            .unwrap();

        let frames = response.into_inner();
        assert_eq!(head_headers(&frames)[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_html_content_type_fallback() {
        let mut response = OutgoingResponse::new(Vec::new());
        ResponseEmitter::new()
            .emit(&mut response, RenderResult::buffered("<p/>"), &DeliveryOptions::html())
            .await
            .unwrap();

        let frames = response.into_inner();
        let headers = head_headers(&frames);
        assert_eq!(headers[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(headers[RUNTIME_MARKER_HEADER], "1");
    }

    #[tokio::test]
    async fn test_existing_content_type_not_overwritten() {
        let mut response = OutgoingResponse::new(Vec::new());
        response.set_header(CONTENT_TYPE, "application/rss+xml").unwrap();
        let result = RenderResult::buffered("<rss/>").with_content_type("text/xml");

        ResponseEmitter::new()
            .emit(&mut response, result, &DeliveryOptions::html())
            .await
            .unwrap();

        let frames = response.into_inner();
        assert_eq!(head_headers(&frames)[CONTENT_TYPE], "application/rss+xml");
    }

    #[tokio::test]
    async fn test_declared_content_type_used() {
        let mut response = OutgoingResponse::new(Vec::new());
        let result = RenderResult::buffered("a,b").with_content_type("text/csv");
        ResponseEmitter::new()
            .emit(&mut response, result, &DeliveryOptions::json())
            .await
            .unwrap();

        let frames = response.into_inner();
        assert_eq!(head_headers(&frames)[CONTENT_TYPE], "text/csv");
    }

    #[tokio::test]
    async fn test_powered_by_only_for_html() {
        let emitter = ResponseEmitter::new();
        let mut html = OutgoingResponse::new(Vec::new());
        let options = DeliveryOptions {
            advertise_powered_by: true,
            ..DeliveryOptions::html()
        };
        emitter.emit(&mut html, RenderResult::buffered("x"), &options).await.unwrap();
        assert_eq!(head_headers(&html.into_inner())[POWERED_BY_HEADER], DEFAULT_POWERED_BY);

        let mut json = OutgoingResponse::new(Vec::new());
        let options = DeliveryOptions {
            advertise_powered_by: true,
            ..DeliveryOptions::json()
        };
        emitter.emit(&mut json, RenderResult::buffered("{}"), &options).await.unwrap();
        assert!(head_headers(&json.into_inner()).get(POWERED_BY_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_marker_leads_headers() {
        let mut response = OutgoingResponse::new(Vec::new());
        response.set_header(CONTENT_TYPE, "text/plain").unwrap();
        response
            .set_header(HeaderName::from_static("x-custom"), "a")
            .unwrap();
        let options = DeliveryOptions {
            advertise_powered_by: true,
            extra_headers: vec![(HeaderName::from_static("x-cache-status"), "MISS".into())],
            ..DeliveryOptions::html()
        };

        ResponseEmitter::new()
            .emit(&mut response, RenderResult::buffered("x"), &options)
            .await
            .unwrap();

        let frames = response.into_inner();
        let names: Vec<&str> = head_headers(&frames).keys().map(|n| n.as_str()).collect();
        assert_eq!(names[0], RUNTIME_MARKER_HEADER);
        assert_eq!(names[1..3], ["content-type", "x-custom"]);
        assert!(names.contains(&"x-cache-status"));
        assert_eq!(head_headers(&frames)[CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_invalid_header_still_fires_close() {
        let mut response = OutgoingResponse::new(Vec::new());
        let closed = close_counter(&response);
        let options = DeliveryOptions {
            advertise_powered_by: true,
            powered_by_value: "bad\nvalue".into(),
            ..DeliveryOptions::html()
        };

        let err = ResponseEmitter::new()
            .emit(&mut response, RenderResult::buffered("x"), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, EmitError::InvalidHeader { .. }));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    // === Buffered Tests ===

    #[tokio::test]
    async fn test_content_length_counts_bytes() {
        let payload = "caf\u{e9} \u{1f600}";
        let mut response = OutgoingResponse::new(Vec::new());
        let outcome = ResponseEmitter::new()
            .emit(&mut response, RenderResult::buffered(payload), &DeliveryOptions::html())
            .await
            .unwrap();

        assert_eq!(outcome, EmitOutcome::Buffered { content_length: 10 });
        let frames = response.into_inner();
        let length = head_headers(&frames)[CONTENT_LENGTH].to_str().unwrap();
        assert_eq!(length, payload.len().to_string());
        assert_ne!(length, payload.chars().count().to_string());
        assert_eq!(frames[1], ResponseFrame::Data(payload.as_bytes().to_vec()));
        assert_eq!(frames[2], ResponseFrame::End);
    }

    #[tokio::test]
    async fn test_etag_toggle() {
        let emitter = ResponseEmitter::new();
        let mut with = OutgoingResponse::new(Vec::new());
        emitter.emit(&mut with, RenderResult::buffered("x"), &DeliveryOptions::html()).await.unwrap();
        assert_eq!(head_headers(&with.into_inner())[ETAG], generate_etag(b"x").as_str());

        let mut without = OutgoingResponse::new(Vec::new());
        let options = DeliveryOptions {
            generate_etags: false,
            ..DeliveryOptions::html()
        };
        emitter.emit(&mut without, RenderResult::buffered("x"), &options).await.unwrap();
        assert!(head_headers(&without.into_inner()).get(ETAG).is_none());
    }

    #[tokio::test]
    async fn test_matching_etag_is_not_modified() {
        let mut response = OutgoingResponse::new(Vec::new());
        let options = DeliveryOptions {
            if_none_match: Some(generate_etag(b"page")),
            ..DeliveryOptions::html()
        };
        let outcome = ResponseEmitter::new()
            .emit(&mut response, RenderResult::buffered("page"), &options)
            .await
            .unwrap();

        assert_eq!(outcome, EmitOutcome::NotModified);
        let frames = response.into_inner();
        assert!(matches!(&frames[0], ResponseFrame::Head { status, .. } if *status == StatusCode::NOT_MODIFIED));
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_body_has_zero_length() {
        let mut response = OutgoingResponse::new(Vec::new());
        ResponseEmitter::new()
            .emit(&mut response, RenderResult::buffered(""), &DeliveryOptions::html())
            .await
            .unwrap();
        let frames = response.into_inner();
        assert_eq!(head_headers(&frames)[CONTENT_LENGTH], "0");
        assert_eq!(frames.len(), 2);
    }

    // === Streaming Tests ===

    #[tokio::test]
    async fn test_stream_completes_and_closes_once() {
        let mut response = OutgoingResponse::new(Vec::new());
        let closes = close_counter(&response);

        let outcome = ResponseEmitter::new()
            .emit(&mut response, RenderResult::chunks(["<html>", "</html>"]), &DeliveryOptions::html())
            .await
            .unwrap();

        assert_eq!(outcome, EmitOutcome::Streamed(StreamOutcome::Completed));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(response.client_close().is_empty());

        let frames = response.into_inner();
        assert!(head_headers(&frames).get(CONTENT_LENGTH).is_none());
        assert_eq!(frames[1], ResponseFrame::Data(b"<html>".to_vec()));
        assert_eq!(frames.last(), Some(&ResponseFrame::End));
    }

    #[tokio::test]
    async fn test_client_disconnect_cancels_once() {
        let mut response = OutgoingResponse::new(Vec::new());
        let closes = close_counter(&response);
        let disconnect = response.client_close().clone();
        let polled = Arc::new(AtomicUsize::new(0));

        let body = {
            let polled = Arc::clone(&polled);
            stream::iter(vec![Ok(b"<html>".to_vec())]).chain(stream::poll_fn(move |_| {
                polled.fetch_add(1, Ordering::SeqCst);
                disconnect.notify();
                Poll::Pending
            }))
        };

        let outcome = ResponseEmitter::new()
            .emit(&mut response, RenderResult::stream(body), &DeliveryOptions::html())
            .await
            .unwrap();

        assert_eq!(outcome, EmitOutcome::Streamed(StreamOutcome::Cancelled));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(polled.load(Ordering::SeqCst), 1);

        let frames = response.into_inner();
        assert!(!frames.contains(&ResponseFrame::End));
    }

    #[tokio::test]
    async fn test_write_failure_is_cancellation() {
        let (tx, rx) = mpsc::channel::<ResponseFrame>(4);
        drop(rx);
        let mut response = OutgoingResponse::new(tx);
        let closes = close_counter(&response);

        let outcome = ResponseEmitter::new()
            .emit(&mut response, RenderResult::chunks(["a", "b"]), &DeliveryOptions::html())
            .await
            .unwrap();

        assert_eq!(outcome, EmitOutcome::Streamed(StreamOutcome::Cancelled));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_producer_error_propagates_after_close() {
        let mut response = OutgoingResponse::new(Vec::new());
        let closes = close_counter(&response);
        let body = stream::iter(vec![
            Ok(b"a".to_vec()),
            Err(PageError::Render(anyhow::anyhow!("template exploded"))),
        ]);

        let result = ResponseEmitter::new()
            .emit(&mut response, RenderResult::stream(body), &DeliveryOptions::html())
            .await;

        assert!(matches!(result, Err(EmitError::Body(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_over_bounded_channel() {
        let (tx, rx) = mpsc::channel::<ResponseFrame>(1);
        let mut response = OutgoingResponse::new(tx);

        let emit = async {
            ResponseEmitter::new()
                .emit(&mut response, RenderResult::chunks(["1", "2", "3"]), &DeliveryOptions::html())
                .await
        };
        let (outcome, frames) = futures::join!(emit, rx.collect::<Vec<_>>());

        assert_eq!(outcome.unwrap(), EmitOutcome::Streamed(StreamOutcome::Completed));
        assert_eq!(frames.len(), 5);
    }
}
