//! Incremental frame parser: raw transport fragments in, [`Frame`]s out.
//!
//! The transport hands us bytes cut at arbitrary points. A record may span
//! several reads, several records may share one read, and a read may even
//! end in the middle of a multi-byte UTF-8 character. The parser keeps two
//! buffers to absorb that:
//!
//! 1. `pending` — trailing bytes of an incomplete UTF-8 sequence
//! 2. `buffer`  — decoded text after the last `\n`
//!
//! Only complete lines are interpreted. A line is a record when it starts
//! with `data:`; everything else (blank separators, `:` comments, `event:`
//! fields) is ignored. This makes SSE (`data: x\n\n`) and newline-delimited
//! chunked bodies (`data: x\n`) decode identically.

use super::frame::{decode_record, Frame};
use crate::error::TransportError;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Raw fragments from the backend connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Lazy sequence of decoded frames, ending after the first terminal frame.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

const DATA_PREFIX: &str = "data:";

/// Stateful line/record splitter for one transport.
#[derive(Debug, Default)]
pub struct FrameParser {
    pending: Vec<u8>,
    buffer: String,
    terminated: bool,
    skipped: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes. Returns every frame completed by this fragment.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(bytes);
        let text = drain_utf8(&mut self.pending);
        self.push_str(&text)
    }

    /// Feed already-decoded text.
    pub fn push_str(&mut self, fragment: &str) -> Vec<Frame> {
        self.buffer.push_str(fragment);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].find('\n') {
            let end = consumed + pos;
            let line = self.buffer[consumed..end].to_string();
            consumed = end + 1;
            self.handle_line(&line, &mut frames);
        }
        self.buffer.drain(..consumed);
        frames
    }

    /// Flush at end of transport: an unterminated last line still counts.
    pub fn finish(&mut self) -> Vec<Frame> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.buffer.push_str(&tail);
        }

        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line, &mut frames);
        }
        frames
    }

    /// True once a `Done` or `Error` frame has been produced.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of records dropped as undecodable.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<Frame>) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = rest.strip_prefix(' ').unwrap_or(rest);
        if payload.trim().is_empty() {
            return;
        }

        if self.terminated {
            debug!("Ignoring record after terminal frame: {payload:?}");
            return;
        }

        match decode_record(payload) {
            Ok(frame) => {
                if frame.is_terminal() {
                    self.terminated = true;
                }
                out.push(frame);
            }
            Err(e) => {
                self.skipped += 1;
                warn!("Skipping frame: {e}");
            }
        }
    }
}

/// Decode the longest valid UTF-8 prefix of `pending`, leaving an
/// incomplete trailing sequence in place. Invalid bytes become U+FFFD.
fn drain_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut start = 0;
    loop {
        match std::str::from_utf8(&pending[start..]) {
            Ok(s) => {
                out.push_str(s);
                start = pending.len();
                break;
            }
            Err(e) => {
                let valid = start + e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[start..valid]));
                match e.error_len() {
                    Some(n) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        start = valid + n;
                    }
                    None => {
                        start = valid;
                        break;
                    }
                }
            }
        }
    }
    pending.drain(..start);
    out
}

/// Wrap a byte transport as a lazy frame stream.
///
/// Transport errors are yielded once and end the stream. The stream also
/// ends right after the first terminal frame, so no late record can follow
/// `Done`/`Error`. Dropping the returned stream drops (closes) the
/// transport.
pub fn frames(transport: ByteStream) -> FrameStream {
    struct State {
        transport: ByteStream,
        parser: FrameParser,
        ready: VecDeque<Frame>,
        exhausted: bool,
    }

    let state = State {
        transport,
        parser: FrameParser::new(),
        ready: VecDeque::new(),
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.ready.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.exhausted || st.parser.is_terminated() {
                return None;
            }
            match st.transport.next().await {
                Some(Ok(bytes)) => {
                    debug!("Transport fragment: {} bytes", bytes.len());
                    let parsed = st.parser.push_bytes(&bytes);
                    st.ready.extend(parsed);
                }
                Some(Err(e)) => {
                    st.exhausted = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.exhausted = true;
                    let parsed = st.parser.finish();
                    st.ready.extend(parsed);
                }
            }
        }
    }))
}

/// Bound the silence between two transport fragments.
///
/// Every fragment resets the clock, including keep-alive comments and
/// pieces of a record that is still incomplete. Once `idle` passes with
/// nothing received, the stream yields [`TransportError::Timeout`].
pub fn idle_timeout(transport: ByteStream, idle: Duration) -> ByteStream {
    let secs = idle.as_secs();
    let timed = tokio_stream::StreamExt::timeout(transport, idle);
    Box::pin(timed.map(move |item| match item {
        Ok(fragment) => fragment,
        Err(_) => {
            warn!("No transport fragment within {:?}", idle);
            Err(TransportError::Timeout { secs })
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut FrameParser, parts: &[&[u8]]) -> Vec<Frame> {
        let mut out = Vec::new();
        for p in parts {
            out.extend(parser.push_bytes(p));
        }
        out.extend(parser.finish());
        out
    }

    #[test]
    fn sse_records() {
        let mut p = FrameParser::new();
        let frames = p.push_str(concat!(
            "data: {\"chunk\":\"# Hi\"}\n\n",
            "data: {\"chunk\":\"\\nworld\"}\n\n",
            "data: {\"done\":true}\n\n",
        ));
        assert_eq!(
            frames,
            vec![
                Frame::Chunk("# Hi".into()),
                Frame::Chunk("\nworld".into()),
                Frame::Done
            ]
        );
        assert!(p.is_terminated());
    }

    #[test]
    fn record_split_across_fragments() {
        let mut p = FrameParser::new();
        assert!(p.push_str("data: {\"chunk\":\"a").is_empty());
        assert_eq!(p.push_str("b\"}\n"), vec![Frame::Chunk("ab".into())]);
    }

    #[test]
    fn every_split_point_yields_same_frames() {
        let wire = concat!(
            "data: {\"chunk\":\"héllo\"}\n\n",
            "data: {\"chunk\":\" wörld\"}\n\n",
            "data: {\"done\":true}\n\n",
        );
        let bytes = wire.as_bytes();
        let expected = vec![
            Frame::Chunk("héllo".into()),
            Frame::Chunk(" wörld".into()),
            Frame::Done,
        ];
        for cut in 0..=bytes.len() {
            let mut p = FrameParser::new();
            let got = feed_all(&mut p, &[&bytes[..cut], &bytes[cut..]]);
            assert_eq!(got, expected, "split at byte {cut}");
        }
    }

    #[test]
    fn byte_at_a_time() {
        let wire = "data: {\"chunk\":\"日本\"}\n\ndata: {\"done\":true}\n\n".as_bytes();
        let mut p = FrameParser::new();
        let parts: Vec<&[u8]> = wire.chunks(1).collect();
        assert_eq!(
            feed_all(&mut p, &parts),
            vec![Frame::Chunk("日本".into()), Frame::Done]
        );
    }

    #[test]
    fn newline_delimited_and_crlf() {
        let mut p = FrameParser::new();
        let frames = p.push_str("data: {\"chunk\":\"x\"}\r\ndata:{\"chunk\":\"y\"}\n");
        assert_eq!(
            frames,
            vec![Frame::Chunk("x".into()), Frame::Chunk("y".into())]
        );
    }

    #[test]
    fn malformed_record_is_skipped() {
        let mut p = FrameParser::new();
        let frames = p.push_str(
            "data: {\"chunk\":\"a\"}\n\ndata: {not json\n\ndata: {\"chunk\":\"b\"}\n\n",
        );
        assert_eq!(
            frames,
            vec![Frame::Chunk("a".into()), Frame::Chunk("b".into())]
        );
        assert_eq!(p.skipped(), 1);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut p = FrameParser::new();
        let frames = p.push_str(": keep-alive\nevent: message\nid: 7\ndata: {\"done\":true}\n\n");
        assert_eq!(frames, vec![Frame::Done]);
        assert_eq!(p.skipped(), 0);
    }

    #[test]
    fn nothing_after_terminal() {
        let mut p = FrameParser::new();
        let frames = p.push_str(
            "data: {\"error\":\"boom\"}\n\ndata: {\"chunk\":\"late\"}\n\ndata: {\"done\":true}\n\n",
        );
        assert_eq!(frames, vec![Frame::Error("boom".into())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut p = FrameParser::new();
        assert!(p.push_str("data: {\"done\":true}").is_empty());
        assert_eq!(p.finish(), vec![Frame::Done]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut p = FrameParser::new();
        let mut wire = b"data: {\"chunk\":\"a".to_vec();
        wire.push(0xFF);
        wire.extend_from_slice(b"b\"}\n");
        assert_eq!(
            p.push_bytes(&wire),
            vec![Frame::Chunk("a\u{FFFD}b".into())]
        );
    }

    #[tokio::test]
    async fn frames_stream_stops_after_terminal() {
        let parts: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"chunk\":\"a\"}\n\ndata: {\"do")),
            Ok(Bytes::from_static(b"ne\":true}\n\n")),
            Ok(Bytes::from_static(b"data: {\"chunk\":\"never\"}\n\n")),
        ];
        let transport: ByteStream = Box::pin(stream::iter(parts));
        let got: Vec<_> = frames(transport).collect().await;
        assert_eq!(got, vec![Ok(Frame::Chunk("a".into())), Ok(Frame::Done)]);
    }

    #[tokio::test]
    async fn frames_stream_surfaces_transport_error_once() {
        let parts: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"chunk\":\"a\"}\n\n")),
            Err(TransportError::Disconnected {
                reason: "reset".into(),
            }),
            Ok(Bytes::from_static(b"data: {\"done\":true}\n\n")),
        ];
        let transport: ByteStream = Box::pin(stream::iter(parts));
        let got: Vec<_> = frames(transport).collect().await;
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], Ok(Frame::Chunk("a".into())));
        assert!(matches!(got[1], Err(TransportError::Disconnected { .. })));
    }

    #[tokio::test]
    async fn idle_timeout_counts_every_fragment() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, TransportError>>(8);
        let transport: ByteStream = Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx));
        let mut stream = frames(idle_timeout(transport, Duration::from_millis(300)));

        tokio::spawn(async move {
            for part in [
                &b": ping\n"[..],
                b"data: {\"chunk\":\"ab",
                b"cd\"}\n\n",
                b"data: {\"done\":true}\n\n",
            ] {
                tokio::time::sleep(Duration::from_millis(150)).await;
                if tx.send(Ok(Bytes::from_static(part))).await.is_err() {
                    return;
                }
            }
        });

        assert_eq!(stream.next().await, Some(Ok(Frame::Chunk("abcd".into()))));
        assert_eq!(stream.next().await, Some(Ok(Frame::Done)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn idle_timeout_fires_on_silence() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, TransportError>>(8);
        tx.send(Ok(Bytes::from_static(b"data: {\"chunk\":\"a\"}\n\n")))
            .await
            .unwrap();
        let transport: ByteStream = Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx));
        let got: Vec<_> = frames(idle_timeout(transport, Duration::from_millis(50)))
            .collect()
            .await;

        assert_eq!(got.len(), 2);
        assert_eq!(got[0], Ok(Frame::Chunk("a".into())));
        assert_eq!(got[1], Err(TransportError::Timeout { secs: 0 }));
        drop(tx);
    }
}
