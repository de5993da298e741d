use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RelayError, StreamWarning};
use crate::http::HttpBodyStream;

/// Text fragments of a streamed reply, in arrival order.
///
/// `Err` items are transport failures; the stream ends right after one.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// What a dialect makes of one `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParseStep {
    Emit(String),
    Skip,
    Warn(StreamWarning),
    /// Emit the fragment, then end the stream.
    Final(String),
    Stop,
}

/// Turns `data:` payloads of one wire dialect into fragments.
pub(crate) trait FragmentParser: Send + Unpin + 'static {
    fn dialect(&self) -> &'static str;

    fn parse(&mut self, data: &str) -> ParseStep;
}

type CancelFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Splits a response body into SSE lines and feeds `data:` payloads to a [`FragmentParser`].
///
/// Lines other than `data:` (`event:`, comments, blank separators) are ignored and
/// `[DONE]` ends the stream for every dialect.
pub(crate) struct FragmentStream<P> {
    body: Option<HttpBodyStream>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, RelayError>>,
    parser: P,
    cancel: Option<CancelFuture>,
    cancelled: bool,
    fragments: usize,
    warnings: usize,
    finished: bool,
}

impl<P: FragmentParser> FragmentStream<P> {
    pub(crate) fn new(body: HttpBodyStream, parser: P, cancel: Option<CancellationToken>) -> Self {
        let cancel = cancel.map(|token| {
            Box::pin(async move { token.cancelled().await }) as CancelFuture
        });
        Self {
            body: Some(body),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            parser,
            cancel,
            cancelled: false,
            fragments: 0,
            warnings: 0,
            finished: false,
        }
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        let Some(data) = line.strip_prefix(b"data:") else {
            return;
        };
        let data = data.strip_prefix(b" ").unwrap_or(data);
        let text = match std::str::from_utf8(data) {
            Ok(text) => text.trim(),
            Err(err) => {
                self.record_warning(StreamWarning::InvalidUtf8 {
                    reason: err.to_string(),
                });
                return;
            }
        };
        if text.is_empty() {
            return;
        }
        if text == "[DONE]" {
            self.finish();
            return;
        }

        match self.parser.parse(text) {
            ParseStep::Emit(fragment) => self.push_fragment(fragment),
            ParseStep::Skip => {}
            ParseStep::Warn(warning) => self.record_warning(warning),
            ParseStep::Final(fragment) => {
                self.push_fragment(fragment);
                self.finish();
            }
            ParseStep::Stop => self.finish(),
        }
    }

    fn push_fragment(&mut self, fragment: String) {
        if fragment.is_empty() {
            return;
        }
        self.fragments += 1;
        self.pending.push_back(Ok(fragment));
    }

    fn record_warning(&mut self, warning: StreamWarning) {
        self.warnings += 1;
        warn!(dialect = self.parser.dialect(), warning = %warning, "skipping stream chunk");
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        // Dropping the body closes the connection.
        self.body = None;
        self.cancel = None;
        self.buffer.clear();

        if self.cancelled {
            debug!(
                dialect = self.parser.dialect(),
                fragments = self.fragments,
                "stream cancelled by caller"
            );
        } else if self.fragments == 0 && self.warnings == 0 {
            warn!(
                dialect = self.parser.dialect(),
                "stream ended without producing any text"
            );
        } else {
            debug!(
                dialect = self.parser.dialect(),
                fragments = self.fragments,
                warnings = self.warnings,
                "stream finished"
            );
        }
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }
}

impl<P: FragmentParser> Stream for FragmentStream<P> {
    type Item = Result<String, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(this.pending.pop_front());
        }

        if let Some(cancel) = this.cancel.as_mut() {
            if cancel.as_mut().poll(cx).is_ready() {
                this.cancelled = true;
                this.pending.clear();
                this.finish();
                return Poll::Ready(None);
            }
        }

        if let Some(item) = this.pending.pop_front() {
            return Poll::Ready(Some(item));
        }

        loop {
            while let Some(line) = Self::drain_line(&mut this.buffer) {
                this.handle_line(line);
                if this.finished || !this.pending.is_empty() {
                    break;
                }
            }
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            let Some(body) = this.body.as_mut() else {
                this.finish();
                return Poll::Ready(None);
            };
            match body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(err))) => {
                    warn!(dialect = this.parser.dialect(), error = %err, "stream transport failed");
                    this.finish();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    let rest = std::mem::take(&mut this.buffer);
                    if !rest.is_empty() {
                        this.handle_line(rest);
                    }
                    this.finish();
                    return Poll::Ready(this.pending.pop_front());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Boxes a parser over a response body into a [`TextStream`].
pub(crate) fn text_stream<P: FragmentParser>(
    body: HttpBodyStream,
    parser: P,
    cancel: Option<CancellationToken>,
) -> TextStream {
    Box::pin(FragmentStream::new(body, parser, cancel))
}
