//! Streaming line ingestor.
//!
//! Frames an [`AsyncRead`] into lines, runs each through the parser and
//! routes the outcome to caller-supplied sinks. A bad line never stops the
//! stream; only stream-level failures (over-long line, I/O error,
//! cancellation) abort, and records already forwarded stand.

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use super::parser::{parse_line, ParseError};
use crate::models::NewLogRecord;

/// Default cap on a single line, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1 << 20;

/// Counters for one ingestion run. `accepted + rejected == total_lines`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub total_lines: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Failures that abort the remaining stream, as opposed to per-line parse
/// errors which are routed to the reject sink.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("line exceeds maximum length of {0} bytes")]
    LineTooLong(usize),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("ingestion cancelled")]
    Cancelled,
}

/// Reads `reader` line by line, forwarding parsed records to `accept` and
/// rejected lines to `reject`.
///
/// Stops promptly with [`ScanError::Cancelled`] once `cancel` fires.
pub async fn ingest_lines<R, A, J>(
    reader: R,
    max_line_bytes: usize,
    cancel: &CancellationToken,
    mut accept: A,
    mut reject: J,
) -> Result<IngestSummary, ScanError>
where
    R: AsyncRead + Unpin,
    A: FnMut(NewLogRecord),
    J: FnMut(ParseError),
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_bytes));
    let mut summary = IngestSummary::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            next = lines.next() => next,
        };
        let Some(item) = next else {
            break;
        };
        let line = match item {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                return Err(ScanError::LineTooLong(max_line_bytes))
            }
            Err(LinesCodecError::Io(e)) => return Err(ScanError::Io(e)),
        };

        summary.total_lines += 1;
        match parse_line(&line) {
            Ok(rec) => {
                summary.accepted += 1;
                accept(rec);
            }
            Err(err) => {
                summary.rejected += 1;
                reject(err);
            }
        }
    }

    Ok(summary)
}
