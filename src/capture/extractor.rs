//! Incremental extraction of the marker line from a child's standard output.
//!
//! [`StreamExtractor`] is fed raw byte chunks as they arrive and makes no
//! assumption about where a chunk ends. Only complete lines are inspected; the
//! unterminated tail stays buffered until the next chunk or [`StreamExtractor::finish`].

/// Marker printed by the capture script in front of the encoded artifact.
pub const DEFAULT_MARKER: &str = "FINGERPRINT_WSQ_B64:";

/// Default cap on a single buffered line (8 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

fn is_terminator(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Pulls the first marker line out of an unbounded byte stream.
#[derive(Debug)]
pub struct StreamExtractor {
    marker: Vec<u8>,
    max_line_bytes: usize,
    buffer: Vec<u8>,
    payload: Option<String>,
    // Discarding the remainder of an overlong line until the next terminator.
    skipping: bool,
    overflowed: bool,
    finished: bool,
}

impl StreamExtractor {
    /// The cap is raised to the marker length so a partial marker is never
    /// mistaken for an overlong marker line.
    pub fn new(marker: impl Into<String>, max_line_bytes: usize) -> Self {
        let marker = marker.into().into_bytes();
        Self {
            max_line_bytes: max_line_bytes.max(marker.len()).max(1),
            marker,
            buffer: Vec::new(),
            payload: None,
            skipping: false,
            overflowed: false,
            finished: false,
        }
    }

    /// Appends a chunk and inspects every line it completes.
    ///
    /// Returns the payload on the call that first discovers it and `None`
    /// on every other call, so the value is yielded exactly once. After the
    /// payload is found further chunks are dropped without buffering.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<&str> {
        if self.payload.is_some() || self.finished {
            return None;
        }

        let mut rest = chunk;
        if self.skipping {
            match rest.iter().position(|b| is_terminator(*b)) {
                Some(pos) => {
                    self.skipping = false;
                    rest = &rest[pos + 1..];
                }
                None => return None,
            }
        }

        self.buffer.extend_from_slice(rest);

        if let Some(boundary) = self.buffer.iter().rposition(|b| is_terminator(*b)) {
            let tail = self.buffer.split_off(boundary + 1);
            let processable = std::mem::replace(&mut self.buffer, tail);
            self.scan(&processable[..boundary]);
        }

        if self.payload.is_some() {
            self.buffer = Vec::new();
            return self.payload.as_deref();
        }

        if self.buffer.len() > self.max_line_bytes {
            self.flush_overlong();
        }

        None
    }

    /// Final pass over any unterminated content left at end of stream.
    ///
    /// The marker may be the last thing written with no trailing newline.
    /// Returns the payload only if this pass is the one that found it.
    pub fn finish(&mut self) -> Option<&str> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if self.payload.is_some() || self.skipping || self.buffer.is_empty() {
            self.buffer = Vec::new();
            return None;
        }

        let line = std::mem::take(&mut self.buffer);
        self.inspect_line(&line);
        self.payload.as_deref()
    }

    /// The extracted payload, if any line has matched so far.
    #[allow(dead_code)]
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn into_payload(self) -> Option<String> {
        self.payload
    }

    /// True when a marker line was dropped for exceeding the line cap.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    fn scan(&mut self, bytes: &[u8]) {
        for line in bytes.split(|b| is_terminator(*b)) {
            if self.payload.is_some() {
                break;
            }
            self.inspect_line(line);
        }
    }

    fn inspect_line(&mut self, line: &[u8]) {
        if line.is_empty() {
            return;
        }

        // Same cap as the unterminated tail, whether or not the terminator
        // arrived in the same chunk.
        if line.len() > self.max_line_bytes {
            self.discard_overlong(line);
            return;
        }

        if let Some(value) = line.strip_prefix(self.marker.as_slice()) {
            let value = String::from_utf8_lossy(value).trim().to_string();
            if value.is_empty() {
                tracing::warn!("Marker line carried an empty payload, ignoring it");
                return;
            }
            tracing::debug!(bytes = value.len(), "Marker line found in capture output");
            self.payload = Some(value);
            return;
        }

        tracing::debug!(
            target: "capture_agent::capture::stdout",
            "{}",
            String::from_utf8_lossy(line).trim_end()
        );
    }

    // Forced pass once the unterminated tail outgrows the cap. The tail is
    // never parsed as a payload since that would hand back a truncated artifact.
    fn flush_overlong(&mut self) {
        let line = std::mem::take(&mut self.buffer);
        self.discard_overlong(&line);
        self.skipping = true;
    }

    fn discard_overlong(&mut self, line: &[u8]) {
        if line.starts_with(&self.marker) {
            tracing::warn!(
                limit = self.max_line_bytes,
                "Marker line exceeded the line limit and was discarded"
            );
            self.overflowed = true;
        } else {
            tracing::debug!(
                limit = self.max_line_bytes,
                "Discarding overlong line from capture output"
            );
        }
    }
}
