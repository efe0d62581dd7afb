//! Server-sent event decoding
//!
//! Bytes arrive in arbitrary chunks; events are only emitted once their
//! terminating blank line has been seen.

/// One decoded server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // Bytes before this offset hold no event boundary
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            match find_boundary(&self.buffer, self.scanned) {
                Scan::Boundary { end, len } => {
                    let raw: Vec<u8> = self.buffer.drain(..end + len).collect();
                    self.scanned = 0;
                    if let Some(event) = parse_event(&String::from_utf8_lossy(&raw[..end])) {
                        events.push(event);
                    }
                }
                Scan::Incomplete { resume } => {
                    self.scanned = resume;
                    break;
                }
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.scanned = 0;
        let raw = std::mem::take(&mut self.buffer);
        parse_event(&String::from_utf8_lossy(&raw))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// Event text ends at `end`, followed by `len` separator bytes
    Boundary { end: usize, len: usize },
    /// No boundary yet; scanning can resume at `resume`
    Incomplete { resume: usize },
}

/// Length of the line terminator at `i`: `Some(None)` for any other byte,
/// `None` when more bytes are needed to tell
fn terminator(buffer: &[u8], i: usize) -> Option<Option<usize>> {
    match buffer.get(i) {
        Some(b'\n') => Some(Some(1)),
        Some(b'\r') => match buffer.get(i + 1) {
            Some(b'\n') => Some(Some(2)),
            Some(_) => Some(Some(1)),
            None => None,
        },
        Some(_) => Some(None),
        None => None,
    }
}

/// Find two consecutive line terminators (`\n`, `\r\n` or `\r` in any mix)
fn find_boundary(buffer: &[u8], from: usize) -> Scan {
    let mut i = from;
    while i < buffer.len() {
        let first = match terminator(buffer, i) {
            Some(Some(len)) => len,
            Some(None) => {
                i += 1;
                continue;
            }
            None => return Scan::Incomplete { resume: i },
        };

        match terminator(buffer, i + first) {
            Some(Some(second)) => {
                return Scan::Boundary {
                    end: i,
                    len: first + second,
                }
            }
            Some(None) => i += first,
            None => return Scan::Incomplete { resume: i },
        }
    }
    Scan::Incomplete { resume: buffer.len() }
}

fn parse_event(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.split(['\r', '\n']) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }

    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}
