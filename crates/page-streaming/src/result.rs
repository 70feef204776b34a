//! Output of a render call.

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use page_core::PageError;

/// Byte chunks produced by a streamed render.
pub type BodyStream = BoxStream<'static, Result<Vec<u8>, PageError>>;

/// What a render function hands back. Consumed exactly once by the emitter.
pub enum RenderResult {
    /// The whole payload, available up front.
    Buffered {
        content: Vec<u8>,
        content_type: Option<String>,
    },
    /// A producer of body chunks.
    Dynamic {
        body: BodyStream,
        content_type: Option<String>,
    },
}

impl RenderResult {
    /// Buffered result without a declared content type.
    pub fn buffered(content: impl Into<Vec<u8>>) -> Self {
        Self::Buffered {
            content: content.into(),
            content_type: None,
        }
    }

    /// Streamed result without a declared content type.
    pub fn stream<S>(body: S) -> Self
    where
        S: Stream<Item = Result<Vec<u8>, PageError>> + Send + 'static,
    {
        Self::Dynamic {
            body: body.boxed(),
            content_type: None,
        }
    }

    /// Streamed result from a fixed list of chunks.
    pub fn chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let chunks: Vec<Result<Vec<u8>, PageError>> =
            chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::stream(stream::iter(chunks))
    }

    /// Declare the content type.
    pub fn with_content_type(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Buffered { content_type, .. } | Self::Dynamic { content_type, .. } => {
                *content_type = Some(value.into());
            }
        }
        self
    }

    /// Declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::Buffered { content_type, .. } | Self::Dynamic { content_type, .. } => {
                content_type.as_deref()
            }
        }
    }

    /// Whether the body is streamed.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic { .. })
    }

    /// Drain the result into a single byte string.
    pub async fn into_bytes(self) -> Result<Vec<u8>, PageError> {
        match self {
            Self::Buffered { content, .. } => Ok(content),
            Self::Dynamic { body, .. } => {
                body.try_fold(Vec::new(), |mut acc, chunk| async move {
                    acc.extend_from_slice(&chunk);
                    Ok(acc)
                })
                .await
            }
        }
    }
}

impl std::fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered {
                content,
                content_type,
            } => f
                .debug_struct("Buffered")
                .field("len", &content.len())
                .field("content_type", content_type)
                .finish(),
            Self::Dynamic { content_type, .. } => f
                .debug_struct("Dynamic")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_into_bytes_concatenates_chunks() {
        let result = RenderResult::chunks(["<p>", "hi", "</p>"]);
        assert!(result.is_dynamic());
        assert_eq!(result.into_bytes().await.unwrap(), b"<p>hi</p>");
    }

    #[tokio::test]
    async fn test_into_bytes_surfaces_producer_error() {
        let result = RenderResult::stream(stream::iter(vec![
            Ok(b"a".to_vec()),
            Err(PageError::invalid_input("bad chunk")),
        ]));
        assert!(result.into_bytes().await.is_err());
    }

    #[test]
    fn test_content_type_declaration() {
        let result = RenderResult::buffered("{}").with_content_type("application/json");
        assert_eq!(result.content_type(), Some("application/json"));
        assert!(!result.is_dynamic());
        assert!(format!("{:?}", result).contains("len: 2"));
    }
}
