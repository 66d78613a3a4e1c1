//! Incremental reader turning an upstream byte stream into text deltas.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::protocol::{parse_line, StreamEvent};
use crate::error::{PipelineError, Result};

/// Raw response body as delivered by a backend
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

enum LineOutcome {
    Skip,
    Delta(String),
    Failed(PipelineError),
    End,
}

/// Lazily yields text deltas from a [`ByteStream`].
///
/// Ends on the `[DONE]` sentinel, on connection close, or when its
/// cancellation token fires. An error event ends the sequence with
/// `Err(Upstream)`; a malformed event is logged and skipped.
pub struct StreamReader {
    inner: ByteStream,
    pending: Vec<u8>,
    cancel: CancellationToken,
    finished: bool,
    label: String,
}

impl StreamReader {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            cancel: CancellationToken::new(),
            finished: false,
            label: "stream".to_string(),
        }
    }

    /// Name used in log lines (e.g. "outline", "section 3")
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Use an externally owned token for abort
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts this reader when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next text delta, or `None` once the stream has ended
    pub async fn next_delta(&mut self) -> Option<Result<String>> {
        loop {
            if self.finished {
                return None;
            }
            if self.cancel.is_cancelled() {
                tracing::debug!(stream = %self.label, "reader aborted");
                self.finished = true;
                return None;
            }

            while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                match self.handle_line(&line[..line.len() - 1]) {
                    LineOutcome::Skip => continue,
                    LineOutcome::Delta(text) => return Some(Ok(text)),
                    LineOutcome::Failed(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                    LineOutcome::End => {
                        self.finished = true;
                        return None;
                    }
                }
            }

            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                chunk = self.inner.next() => Some(chunk),
            };

            match polled {
                None => {
                    tracing::debug!(stream = %self.label, "reader aborted");
                    self.finished = true;
                    return None;
                }
                Some(Some(Ok(bytes))) => self.pending.extend_from_slice(&bytes),
                Some(Some(Err(e))) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(None) => {
                    // connection closed; a final unterminated line still counts
                    self.finished = true;
                    let rest = std::mem::take(&mut self.pending);
                    return match self.handle_line(&rest) {
                        LineOutcome::Delta(text) => Some(Ok(text)),
                        LineOutcome::Failed(e) => Some(Err(e)),
                        LineOutcome::Skip | LineOutcome::End => None,
                    };
                }
            }
        }
    }

    /// Drain everything into one string
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(delta) = self.next_delta().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }

    fn handle_line(&self, raw: &[u8]) -> LineOutcome {
        if raw.is_empty() {
            return LineOutcome::Skip;
        }
        let line = String::from_utf8_lossy(raw);
        match parse_line(&line) {
            Ok(None) => LineOutcome::Skip,
            Ok(Some(StreamEvent::Delta(text))) if text.is_empty() => LineOutcome::Skip,
            Ok(Some(StreamEvent::Delta(text))) => LineOutcome::Delta(text),
            Ok(Some(StreamEvent::Done)) => LineOutcome::End,
            Ok(Some(StreamEvent::Error { message, code })) => {
                tracing::warn!(stream = %self.label, %message, ?code, "error event in stream");
                LineOutcome::Failed(PipelineError::Upstream { message, code })
            }
            Err(e) => {
                tracing::warn!(stream = %self.label, error = %e, "skipping malformed event");
                LineOutcome::Skip
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(chunks: Vec<&str>) -> ByteStream {
        let items: Vec<Result<Vec<u8>>> = chunks
            .into_iter()
            .map(|c| Ok(c.as_bytes().to_vec()))
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_deltas_across_chunk_boundaries() {
        let stream = bytes_of(vec![
            "data: {\"content\": \"He",
            "llo\"}\n\ndata: {\"content\": \" world\"}\n",
            "data: [DONE]\n",
        ]);
        let text = StreamReader::new(stream).collect_text().await.unwrap();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let line = "data: {\"content\": \"caf\u{e9}\"}\n".as_bytes().to_vec();
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let items: Vec<Result<Vec<u8>>> =
            vec![Ok(line[..split].to_vec()), Ok(line[split..].to_vec())];
        let reader = StreamReader::new(Box::pin(futures::stream::iter(items)));
        assert_eq!(reader.collect_text().await.unwrap(), "caf\u{e9}");
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped() {
        let stream = bytes_of(vec![
            "data: {\"content\": \"a\"}\n",
            "data: {broken\n",
            "data: {\"content\": \"b\"}\n",
        ]);
        let text = StreamReader::new(stream).collect_text().await.unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_error_event_ends_stream() {
        let stream = bytes_of(vec![
            "data: {\"content\": \"a\"}\n",
            "data: {\"error\": {\"message\": \"rate limited\", \"code\": \"429\"}}\n",
            "data: {\"content\": \"never\"}\n",
        ]);
        let mut reader = StreamReader::new(stream);
        assert_eq!(reader.next_delta().await, Some(Ok("a".to_string())));
        assert!(matches!(
            reader.next_delta().await,
            Some(Err(PipelineError::Upstream { .. }))
        ));
        assert_eq!(reader.next_delta().await, None);
    }

    #[tokio::test]
    async fn test_sentinel_stops_reading() {
        let stream = bytes_of(vec!["data: {\"content\": \"a\"}\ndata: [DONE]\ndata: {\"content\": \"b\"}\n"]);
        let text = StreamReader::new(stream).collect_text().await.unwrap();
        assert_eq!(text, "a");
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let stream = bytes_of(vec!["data: {\"content\": \"a\"}\ndata: {\"content\": \"b\"}"]);
        let text = StreamReader::new(stream).collect_text().await.unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn test_cancellation_stops_delivery() {
        let stream = bytes_of(vec!["data: {\"content\": \"a\"}\n", "data: {\"content\": \"b\"}\n"]);
        let mut reader = StreamReader::new(stream);
        let token = reader.cancellation_token();
        assert_eq!(reader.next_delta().await, Some(Ok("a".to_string())));
        token.cancel();
        assert_eq!(reader.next_delta().await, None);
    }

    #[tokio::test]
    async fn test_cancellation_while_waiting() {
        let pending: ByteStream = Box::pin(futures::stream::pending());
        let mut reader = StreamReader::new(pending);
        let token = reader.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            token.cancel();
        });
        assert_eq!(reader.next_delta().await, None);
    }
}
