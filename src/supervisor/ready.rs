//! Readiness detection on server stdout.
//!
//! The server announces its WebSocket endpoint as a line on stdout, possibly
//! wrapped in ANSI color escapes, and the OS delivers stdout in arbitrary
//! chunks. `OutputScanner` accumulates raw bytes across reads, strips escapes
//! over the accumulated window, and runs a `ReadyDetector` on every chunk so
//! an announcement split across read boundaries is still found.

use regex::Regex;

/// Scan window cap in bytes. The buffer is dropped entirely once the endpoint
/// is found; the cap only bounds memory against a child that chatters forever
/// without announcing.
const DEFAULT_SCAN_CAP: usize = 64 * 1024;

/// Strategy for recognizing the readiness announcement in accumulated,
/// ANSI-stripped output.
pub trait ReadyDetector: Send + Sync {
    /// Return the endpoint if the output contains one.
    fn detect(&self, output: &str) -> Option<String>;
}

/// Default detector: the first `ws://<host>:<port>/<token>` URL in the
/// output (`wss://` is accepted too).
pub struct WsEndpointDetector {
    pattern: Regex,
}

impl WsEndpointDetector {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"wss?://[\w.-]+:\d+/[\w./-]*").expect("endpoint pattern"),
        }
    }

    /// Detector with a caller-supplied pattern, for servers that announce
    /// readiness differently. The whole match is taken as the endpoint.
    pub fn with_pattern(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl Default for WsEndpointDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyDetector for WsEndpointDetector {
    fn detect(&self, output: &str) -> Option<String> {
        self.pattern.find(output).map(|m| m.as_str().to_string())
    }
}

/// Rolling scan buffer fed by the stdout reader task.
pub struct OutputScanner {
    buf: Vec<u8>,
    cap: usize,
    done: bool,
}

impl OutputScanner {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_SCAN_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            buf: Vec::new(),
            cap,
            done: false,
        }
    }

    /// Append a raw chunk and scan. Returns the endpoint on the first
    /// detection; afterwards the scanner goes inert and pushes are ignored.
    pub fn push(&mut self, chunk: &[u8], detector: &dyn ReadyDetector) -> Option<String> {
        self.scan(chunk, detector, false)
    }

    /// Final scan at stream end. A candidate sitting at the very end of the
    /// buffer is accepted here, since no more bytes can extend it.
    pub fn finish(&mut self, detector: &dyn ReadyDetector) -> Option<String> {
        self.scan(&[], detector, true)
    }

    fn scan(&mut self, chunk: &[u8], detector: &dyn ReadyDetector, at_eof: bool) -> Option<String> {
        if self.done {
            return None;
        }
        self.buf.extend_from_slice(chunk);

        // Strip over the whole window, not per chunk, so an escape sequence
        // split across reads still disappears before matching.
        let clean = strip_ansi_escapes::strip(&self.buf);
        let text = String::from_utf8_lossy(&clean);

        if let Some(found) = detector.detect(&text) {
            let pos = text.find(found.as_str()).unwrap_or(0);
            // A match touching the end of the buffer may still be growing
            // (port or token split mid-write); hold it until the next chunk
            // or EOF settles the boundary.
            if at_eof || pos + found.len() < text.len() {
                self.done = true;
                self.buf = Vec::new();
                return Some(found);
            }
        }

        if self.buf.len() > self.cap {
            let excess = self.buf.len() - self.cap;
            self.buf.drain(..excess);
        }
        None
    }
}

impl Default for OutputScanner {
    fn default() -> Self {
        Self::new()
    }
}
