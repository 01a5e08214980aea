/// Splits an upstream `text/event-stream` body into `data:` payloads.
///
/// Bytes are buffered until a full line is available, so frames and UTF-8
/// sequences split across network chunks are reassembled intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let line = &self.buffer[start..start + offset];
            start += offset + 1;
            if let Some(payload) = data_payload(line) {
                payloads.push(payload);
            }
        }
        self.buffer.drain(..start);
        payloads
    }

    /// Whatever is left once the body has ended without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches('\r');
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}
