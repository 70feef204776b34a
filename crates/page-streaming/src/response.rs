//! Platform-controlled outgoing response.

use std::fmt::Display;

use futures::{Sink, SinkExt};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

use crate::close::{CloseListeners, ListenerId};
use crate::error::{EmitError, EmitResult};

/// A frame written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFrame {
    /// Status line and headers. Always the first frame.
    Head { status: StatusCode, headers: HeaderMap },
    /// A chunk of body bytes.
    Data(Vec<u8>),
    /// End of the response.
    End,
}

/// Status and headers before they are committed.
///
/// Render functions receive this to set headers of their own, such as a
/// content type, before the emitter takes over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Create a `200 OK` head without headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value.
    pub fn set(&mut self, name: HeaderName, value: &str) -> EmitResult<()> {
        let value = HeaderValue::from_str(value).map_err(|_| EmitError::InvalidHeader {
            name: name.to_string(),
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Set a header so it leads every header already present.
    pub fn set_first(&mut self, name: HeaderName, value: &str) -> EmitResult<()> {
        let value = HeaderValue::from_str(value).map_err(|_| EmitError::InvalidHeader {
            name: name.to_string(),
        })?;
        let previous = std::mem::take(&mut self.headers);
        self.headers.insert(name.clone(), value);
        for (key, value) in &previous {
            if *key != name {
                self.headers.append(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    /// Get a header as a string.
    pub fn get(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    /// Head not yet written; headers may change.
    Open,
    /// Head written, body frames may follow.
    HeadSent,
    /// End frame written.
    Finished,
}

/// An outgoing response over a transport sink.
///
/// Generic over the sink so any `Sink<ResponseFrame>` works, from a
/// channel feeding a socket writer to a `Vec` in tests. The head is
/// committed exactly once; after that header changes fail with
/// [`EmitError::HeadersSent`].
pub struct OutgoingResponse<S> {
    head: ResponseHead,
    sink: S,
    state: ResponseState,
    bytes_written: u64,
    client_close: CloseListeners,
    on_close: CloseListeners,
}

impl<S, E> OutgoingResponse<S>
where
    S: Sink<ResponseFrame, Error = E> + Unpin,
    E: Display,
{
    /// Create a response writing to `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            head: ResponseHead::new(),
            sink,
            state: ResponseState::Open,
            bytes_written: 0,
            client_close: CloseListeners::new(),
            on_close: CloseListeners::new(),
        }
    }

    /// Use the head prepared by a render function.
    pub fn with_head(mut self, head: ResponseHead) -> Self {
        self.head = head;
        self
    }

    /// The uncommitted head.
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Mutable access to the head while it is still open.
    pub fn head_mut(&mut self) -> EmitResult<&mut ResponseHead> {
        self.ensure_open()?;
        Ok(&mut self.head)
    }

    /// Set the status code.
    pub fn set_status(&mut self, status: StatusCode) -> EmitResult<()> {
        self.head_mut()?.status = status;
        Ok(())
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> EmitResult<()> {
        self.head_mut()?.set(name, value)
    }

    /// Set a header ahead of every other header.
    pub fn set_first_header(&mut self, name: HeaderName, value: &str) -> EmitResult<()> {
        self.head_mut()?.set_first(name, value)
    }

    /// Set a header unless one is already present.
    pub fn set_header_if_absent(&mut self, name: HeaderName, value: &str) -> EmitResult<()> {
        if self.head.headers.contains_key(&name) {
            return Ok(());
        }
        self.set_header(name, value)
    }

    /// Whether the head has been committed.
    pub fn is_head_sent(&self) -> bool {
        self.state != ResponseState::Open
    }

    /// Whether the end frame has been written.
    pub fn is_finished(&self) -> bool {
        self.state == ResponseState::Finished
    }

    /// Body bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Listeners fired when the client goes away.
    ///
    /// The transport keeps a clone and calls `notify` on disconnect.
    pub fn client_close(&self) -> &CloseListeners {
        &self.client_close
    }

    /// Register a callback fired once when the response closes.
    pub fn on_close<F>(&self, callback: F) -> ListenerId
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_close.register(callback)
    }

    /// Caller-visible close listeners.
    pub fn close_listeners(&self) -> &CloseListeners {
        &self.on_close
    }

    /// Commit the head.
    pub async fn send_head(&mut self) -> EmitResult<()> {
        self.ensure_open()?;
        let frame = ResponseFrame::Head {
            status: self.head.status,
            headers: self.head.headers.clone(),
        };
        self.send(frame).await?;
        self.state = ResponseState::HeadSent;
        Ok(())
    }

    /// Write a body chunk, committing the head first if needed.
    pub async fn write(&mut self, chunk: Vec<u8>) -> EmitResult<()> {
        match self.state {
            ResponseState::Open => self.send_head().await?,
            ResponseState::HeadSent => {}
            ResponseState::Finished => return Err(EmitError::Finished),
        }
        let len = chunk.len() as u64;
        self.send(ResponseFrame::Data(chunk)).await?;
        self.bytes_written += len;
        Ok(())
    }

    /// Write the end frame and close the transport.
    pub async fn finish(&mut self) -> EmitResult<()> {
        match self.state {
            ResponseState::Open => self.send_head().await?,
            ResponseState::HeadSent => {}
            ResponseState::Finished => return Err(EmitError::Finished),
        }
        self.send(ResponseFrame::End).await?;
        self.state = ResponseState::Finished;
        self.sink
            .close()
            .await
            .map_err(|e| EmitError::Transport(e.to_string()))
    }

    /// Close the transport without an end frame, ignoring errors.
    pub async fn abort(&mut self) {
        self.state = ResponseState::Finished;
        let _ = self.sink.close().await;
    }

    /// Consume the response and return the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }

    fn ensure_open(&self) -> EmitResult<()> {
        match self.state {
            ResponseState::Open => Ok(()),
            _ => Err(EmitError::HeadersSent),
        }
    }

    async fn send(&mut self, frame: ResponseFrame) -> EmitResult<()> {
        self.sink
            .send(frame)
            .await
            .map_err(|e| EmitError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;

    fn response() -> OutgoingResponse<Vec<ResponseFrame>> {
        OutgoingResponse::new(Vec::new())
    }

    #[tokio::test]
    async fn test_write_commits_head_once() {
        let mut response = response();
        response.set_header(CONTENT_TYPE, "text/plain").unwrap();
        response.write(b"a".to_vec()).await.unwrap();
        response.write(b"bc".to_vec()).await.unwrap();
        response.finish().await.unwrap();

        assert_eq!(response.bytes_written(), 3);
        let frames = response.into_inner();
        assert_eq!(frames.len(), 4);
        assert!(matches!(&frames[0], ResponseFrame::Head { headers, .. } if headers[CONTENT_TYPE] == "text/plain"));
        assert_eq!(frames[3], ResponseFrame::End);
    }

    #[tokio::test]
    async fn test_headers_locked_after_head() {
        let mut response = response();
        response.send_head().await.unwrap();

        assert!(matches!(
            response.set_header(CONTENT_TYPE, "text/html"),
            Err(EmitError::HeadersSent)
        ));
        assert!(matches!(response.send_head().await, Err(EmitError::HeadersSent)));
    }

    #[tokio::test]
    async fn test_write_after_finish_fails() {
        let mut response = response();
        response.finish().await.unwrap();
        assert!(response.is_finished());
        assert!(matches!(response.write(b"x".to_vec()).await, Err(EmitError::Finished)));
    }

    #[test]
    fn test_set_header_if_absent_keeps_existing() {
        let mut response = response();
        response.set_header(CONTENT_TYPE, "application/xml").unwrap();
        response.set_header_if_absent(CONTENT_TYPE, "text/html").unwrap();
        assert_eq!(response.head().get(&CONTENT_TYPE), Some("application/xml"));
    }

    #[test]
    fn test_invalid_header_value() {
        let mut response = response();
        assert!(matches!(
            response.set_header(CONTENT_TYPE, "bad\nvalue"),
            Err(EmitError::InvalidHeader { .. })
        ));
    }
}
