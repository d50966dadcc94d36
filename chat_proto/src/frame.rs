//! `data: <json>\n\n` framing.
//!
//! Transports deliver the body in chunks of arbitrary size, so a chunk may
//! hold several blocks, a fraction of one, or end in the middle of a UTF-8
//! sequence. Both decoders here buffer raw bytes and only look at a block
//! once its blank-line terminator has arrived.

use crate::event::StreamEvent;

pub const DATA_PREFIX: &str = "data: ";
const BLOCK_TERMINATOR: &[u8] = b"\n\n";

/// Serialize one event as a complete frame, terminator included.
pub fn encode_frame(event: &StreamEvent) -> serde_json::Result<String> {
    let json = serde_json::to_string(event)?;
    Ok(format!("{DATA_PREFIX}{json}\n\n"))
}

/// Splits a byte stream into blocks and returns the `data` payload of each.
///
/// Lines starting with `:` are comments. Multiple `data:` lines in one block
/// are joined with `\n`. Other SSE fields (`event:`, `id:`) are ignored.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched without finding a terminator.
    scanned: usize,
}

impl BlockBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of every block it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // JSON never carries a raw CR, so dropping them folds CRLF framing into LF framing.
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        loop {
            // Back up one byte: the terminator may straddle the previous chunk.
            let from = self.scanned.saturating_sub(BLOCK_TERMINATOR.len() - 1);
            let Some(pos) = find_terminator(&self.buffer[from..]).map(|p| p + from) else {
                self.scanned = self.buffer.len();
                break;
            };
            let block: Vec<u8> = self.buffer.drain(..pos + BLOCK_TERMINATOR.len()).collect();
            self.scanned = 0;
            if let Some(data) = block_data(&block[..pos]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing block that was never terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        block_data(&rest)
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(BLOCK_TERMINATOR.len())
        .position(|w| w == BLOCK_TERMINATOR)
}

fn block_data(block: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(block).ok()?;
    let mut data: Option<String> = None;
    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }
    data.filter(|d| !d.trim().is_empty())
}

/// Incremental decoder for a turn's response body.
///
/// Blocks that are not valid events (bad JSON, unknown `kind`) are dropped;
/// incomplete blocks stay buffered until more bytes arrive.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    blocks: BlockBuffer,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.blocks
            .push(chunk)
            .iter()
            .filter_map(|data| serde_json::from_str(data).ok())
            .collect()
    }

    pub fn finish(&mut self) -> Option<StreamEvent> {
        self.blocks
            .finish()
            .and_then(|data| serde_json::from_str(&data).ok())
    }

    pub fn pending(&self) -> usize {
        self.blocks.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AudioEncoding;

    fn sample_body() -> Vec<u8> {
        let events = [
            StreamEvent::text("안녕, "),
            StreamEvent::text("hi there"),
            StreamEvent::audio(&[0u8, 1, 2, 3, 254, 255], AudioEncoding::Wav),
            StreamEvent::text(" — ok"),
            StreamEvent::Done,
        ];
        events
            .iter()
            .map(|e| encode_frame(e).unwrap())
            .collect::<String>()
            .into_bytes()
    }

    #[test]
    fn encodes_data_prefix_and_blank_line() {
        let frame = encode_frame(&StreamEvent::Done).unwrap();
        assert_eq!(frame, "data: {\"kind\":\"done\"}\n\n");
    }

    #[test]
    fn decodes_several_events_from_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(&sample_body());
        assert_eq!(events.len(), 5);
        assert_eq!(events[4], StreamEvent::Done);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_events() {
        let body = sample_body();
        let expected = FrameDecoder::new().push(&body);

        for split in 1..body.len() {
            let mut decoder = FrameDecoder::new();
            let mut events = decoder.push(&body[..split]);
            events.extend(decoder.push(&body[split..]));
            assert_eq!(events, expected, "split at byte {split}");
        }

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for byte in &body {
            events.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(events, expected);
    }

    #[test]
    fn partial_block_waits_for_terminator() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"kind\":\"text\",").is_empty());
        assert!(decoder.push(b"\"delta\":\"hi\"}").is_empty());
        assert_eq!(decoder.push(b"\n\n"), vec![StreamEvent::text("hi")]);
    }

    #[test]
    fn malformed_and_unknown_blocks_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let body = b"data: {not json}\n\n: keep-alive\n\ndata: {\"kind\":\"mystery\"}\n\ndata: {\"kind\":\"done\"}\n\n";
        assert_eq!(decoder.push(body), vec![StreamEvent::Done]);
    }

    #[test]
    fn accepts_crlf_and_missing_space() {
        let mut decoder = FrameDecoder::new();
        let body = b"data:{\"kind\":\"text\",\"delta\":\"a\"}\r\n\r\ndata: {\"kind\":\"done\"}\r\n\r\n";
        assert_eq!(
            decoder.push(body),
            vec![StreamEvent::text("a"), StreamEvent::Done]
        );
    }

    #[test]
    fn finish_reads_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"kind\":\"done\"}").is_empty());
        assert_eq!(decoder.finish(), Some(StreamEvent::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn large_frame_in_small_chunks_decodes_once() {
        let clip: Vec<u8> = (0..48 * 1024).map(|i| (i % 251) as u8).collect();
        let event = StreamEvent::audio(&clip, AudioEncoding::Wav);
        let mut body = encode_frame(&event).unwrap().into_bytes();
        body.extend(encode_frame(&StreamEvent::Done).unwrap().into_bytes());

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in body.chunks(7) {
            events.extend(decoder.push(chunk));
        }
        assert_eq!(events, vec![event, StreamEvent::Done]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn terminator_split_after_long_scan_is_found() {
        let mut blocks = BlockBuffer::new();
        let payload = "x".repeat(4096);
        assert!(blocks.push(format!("data: {payload}\n").as_bytes()).is_empty());
        assert_eq!(blocks.pending(), payload.len() + 7);
        assert_eq!(blocks.push(b"\ndata: y\n"), vec![payload]);
        assert_eq!(blocks.push(b"\n"), vec!["y".to_string()]);
        assert_eq!(blocks.pending(), 0);
    }

    #[test]
    fn block_buffer_joins_multiline_data() {
        let mut blocks = BlockBuffer::new();
        let out = blocks.push(b"event: message\ndata: first\ndata: second\n\n");
        assert_eq!(out, vec!["first\nsecond".to_string()]);
    }
}
