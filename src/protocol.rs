//! Incremental parser for the worker's line-oriented stdout protocol.
//!
//! Workers report status as newline-terminated lines:
//!
//! - `PROGRESS:<integer 0-100>` — progress update
//! - `METRICS:<json>` — quality scores, e.g. `METRICS:{"psnr":30.2,"mse":12.5}`
//!
//! Anything else is diagnostic text. Bytes arrive at arbitrary chunk
//! boundaries, so the parser carries the unterminated tail between calls and
//! flushes it when the stream closes.

use crate::types::EnhancementMetrics;

const PROGRESS_PREFIX: &str = "PROGRESS:";
const METRICS_PREFIX: &str = "METRICS:";

/// A classified line from the worker's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Progress report, clamped to [0, 100].
    Progress(u8),
    /// Quality metrics for the finished enhancement.
    Metrics(EnhancementMetrics),
    /// Any other non-blank line. Logged only, never applied to job state.
    Diagnostic(String),
}

/// Reassembles stdout byte chunks into lines and classifies them.
///
/// Malformed `PROGRESS`/`METRICS` payloads are dropped silently — a worker
/// emitting garbage must never take down its supervisor.
#[derive(Debug, Default)]
pub struct ProtocolParser {
    carry: Vec<u8>,
}

impl ProtocolParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stdout bytes, returning every message completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<WorkerMessage> {
        self.carry.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..pos]);
            if let Some(message) = classify(&line) {
                messages.push(message);
            }
        }
        messages
    }

    /// Flush a trailing line that was never newline-terminated.
    ///
    /// Call once when the stream closes so a final message is not lost to a
    /// close notification racing ahead of buffered output.
    pub fn finish(&mut self) -> Option<WorkerMessage> {
        if self.carry.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        classify(&tail)
    }
}

/// Classify a single complete line. Returns `None` for blank lines and for
/// malformed `PROGRESS`/`METRICS` payloads.
fn classify(line: &str) -> Option<WorkerMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(payload) = line.strip_prefix(PROGRESS_PREFIX) {
        return match payload.trim().parse::<i64>() {
            Ok(value) => Some(WorkerMessage::Progress(value.clamp(0, 100) as u8)),
            Err(_) => {
                tracing::debug!(payload, "Dropping non-numeric progress line");
                None
            }
        };
    }

    if let Some(payload) = line.strip_prefix(METRICS_PREFIX) {
        return match serde_json::from_str::<EnhancementMetrics>(payload) {
            Ok(metrics) => Some(WorkerMessage::Metrics(metrics)),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed metrics line");
                None
            }
        };
    }

    Some(WorkerMessage::Diagnostic(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_in_one_chunk() {
        let mut parser = ProtocolParser::new();
        let messages = parser.push(b"PROGRESS:42\n");
        assert_eq!(messages, vec![WorkerMessage::Progress(42)]);
    }

    #[test]
    fn line_split_across_chunks() {
        let mut parser = ProtocolParser::new();
        assert!(parser.push(b"PROG").is_empty());
        let messages = parser.push(b"RESS:42\n");
        assert_eq!(messages, vec![WorkerMessage::Progress(42)]);
    }

    #[test]
    fn multiple_lines_in_one_chunk() {
        let mut parser = ProtocolParser::new();
        let messages = parser.push(b"PROGRESS:10\nPROGRESS:55\nnote\n");
        assert_eq!(
            messages,
            vec![
                WorkerMessage::Progress(10),
                WorkerMessage::Progress(55),
                WorkerMessage::Diagnostic("note".into()),
            ]
        );
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut parser = ProtocolParser::new();
        assert!(parser.push(b"PROGRESS:99").is_empty());
        assert_eq!(parser.finish(), Some(WorkerMessage::Progress(99)));
        // A second flush has nothing left.
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut parser = ProtocolParser::new();
        assert!(parser.push(b"\n\n  \n").is_empty());
    }

    #[test]
    fn crlf_is_tolerated() {
        let mut parser = ProtocolParser::new();
        let messages = parser.push(b"PROGRESS:7\r\n");
        assert_eq!(messages, vec![WorkerMessage::Progress(7)]);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        let mut parser = ProtocolParser::new();
        let messages = parser.push(b"PROGRESS:150\nPROGRESS:-5\n");
        assert_eq!(
            messages,
            vec![WorkerMessage::Progress(100), WorkerMessage::Progress(0)]
        );
    }

    #[test]
    fn non_numeric_progress_is_dropped() {
        let mut parser = ProtocolParser::new();
        assert!(parser.push(b"PROGRESS:fast\n").is_empty());
        assert!(parser.push(b"PROGRESS:\n").is_empty());
    }

    #[test]
    fn metrics_line_parses_exactly() {
        let mut parser = ProtocolParser::new();
        let messages = parser.push(b"METRICS:{\"psnr\":30.2,\"mse\":12.5}\n");
        assert_eq!(
            messages,
            vec![WorkerMessage::Metrics(EnhancementMetrics {
                psnr: 30.2,
                mse: 12.5,
            })]
        );
    }

    #[test]
    fn truncated_metrics_json_is_dropped() {
        let mut parser = ProtocolParser::new();
        assert!(parser.push(b"METRICS:{\"psnr\":30.2,\"ms\n").is_empty());
        assert!(parser.push(b"METRICS:not json at all\n").is_empty());
        // Wrong shape: missing the expected fields.
        assert!(parser.push(b"METRICS:{\"quality\":1}\n").is_empty());
    }

    #[test]
    fn other_lines_surface_as_diagnostics() {
        let mut parser = ProtocolParser::new();
        let messages = parser.push(b"loading model weights...\n");
        assert_eq!(
            messages,
            vec![WorkerMessage::Diagnostic("loading model weights...".into())]
        );
    }

    #[test]
    fn split_chunks_equal_whole_chunk() {
        let whole = {
            let mut parser = ProtocolParser::new();
            parser.push(b"PROGRESS:42\n")
        };
        let split = {
            let mut parser = ProtocolParser::new();
            let mut messages = parser.push(b"PROG");
            messages.extend(parser.push(b"RESS:42\n"));
            messages
        };
        assert_eq!(whole, split);
    }
}
