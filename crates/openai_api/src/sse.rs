/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name from the last `event:` line, if any.
    pub event: Option<String>,
    /// Accumulated `data:` lines joined by newline.
    pub data: String,
}

/// Incremental line-oriented SSE frame parser.
///
/// `id:`, `retry:` and comment lines are recognized and discarded; there is
/// no reconnection support. Malformed input is treated as "no frame yet".
#[derive(Debug, Default)]
pub struct SseFrameParser {
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseFrameParser {
    /// Feed one line (without its terminator) and drain a complete frame.
    pub fn feed(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.flush();
        }

        if line.starts_with(':') {
            return None;
        }

        if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(trim_one_leading_space(rest).to_owned());
            return None;
        }

        if let Some(rest) = line.strip_prefix("data:") {
            self.data_lines.push(trim_one_leading_space(rest).to_owned());
            return None;
        }

        // id:/retry:/unknown field lines carry nothing we replay.
        None
    }

    /// Final flush for input that ended without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.flush()
    }

    fn flush(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data_lines.is_empty() {
            return None;
        }

        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(SseFrame { event, data })
    }
}

/// Buffers raw transport bytes into complete lines.
///
/// Bytes are buffered and split on `\n` before UTF-8 conversion, so a
/// multi-byte character straddling two transport chunks decodes intact.
/// Strips one trailing `\r` per line.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(0..=split).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        lines
    }

    /// Returns the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

fn trim_one_leading_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}
