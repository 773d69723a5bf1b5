//! Captured-output buffer and the text-marker protocol.
//!
//! Test units talk back to the harness through their own output: a line
//! containing [`FAILURE_MARKER`] reports an assertion failure, and a line
//! containing [`EXIT_CODE_MARKER`] followed by a single decimal digit
//! declares the exit code the unit expects to terminate with.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Marker a test unit prints to report an assertion failure.
pub const FAILURE_MARKER: &str = "FAILED!";

/// Marker a test unit prints to declare its expected exit code. The marker is
/// followed immediately by a single decimal digit; the last occurrence wins.
pub const EXIT_CODE_MARKER: &str = "EXPECT EXIT CODE ";

/// Shared in-memory capture of a session's standard output and error,
/// interleaved in write order.
///
/// Cloning yields another handle onto the same bytes. Writes only ever
/// append, so a reader on another thread always sees a consistent prefix even
/// after a forced cancellation mid-write.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far, lossily decoded as UTF-8.
    pub fn text(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Verdict-relevant facts extracted from captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputScan {
    /// Lines containing [`FAILURE_MARKER`], verbatim, in order of appearance.
    pub failures: Vec<String>,
    /// Exit code declared by the last [`EXIT_CODE_MARKER`] line, default 0.
    pub expected_exit_code: i32,
}

/// Scan captured output line by line for the two protocol markers.
pub fn scan(text: &str) -> OutputScan {
    let mut failures = Vec::new();
    let mut expected_exit_code = 0;
    for line in text.lines() {
        if line.contains(FAILURE_MARKER) {
            failures.push(line.to_string());
        }
        if let Some(at) = line.find(EXIT_CODE_MARKER) {
            let rest = &line[at + EXIT_CODE_MARKER.len()..];
            if let Some(code) = rest.chars().next().and_then(|c| c.to_digit(10)) {
                expected_exit_code = code as i32;
            }
        }
    }
    OutputScan {
        failures,
        expected_exit_code,
    }
}
