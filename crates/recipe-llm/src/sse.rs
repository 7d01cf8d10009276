//! Server-sent events framing for streamed chat completions.

/// One `data:` payload from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into `data:` events.
///
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across network chunks decode intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return the events completed by it.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Event left in an unterminated final line, if any.
    pub(crate) fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim_end_matches(&['\r', '\n'][..]).strip_prefix("data:")?.trim();

    match data {
        "" => None,
        "[DONE]" => Some(SseEvent::Done),
        payload => Some(SseEvent::Data(payload.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(
            decoder.push(b":1}\n\n: keep-alive\ndata: [DONE]\n"),
            vec![
                SseEvent::Data("{\"a\":1}".to_string()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn test_split_multibyte_character() {
        let bytes = "data: 红烧肉\r\n".as_bytes();
        let mut decoder = SseDecoder::default();
        // Cut inside the first character
        assert!(decoder.push(&bytes[..7]).is_empty());
        assert_eq!(
            decoder.push(&bytes[7..]),
            vec![SseEvent::Data("红烧肉".to_string())]
        );
    }

    #[test]
    fn test_unterminated_last_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: message\ndata: tail").is_empty());
        assert_eq!(decoder.finish(), Some(SseEvent::Data("tail".to_string())));
        assert_eq!(decoder.finish(), None);
    }
}
