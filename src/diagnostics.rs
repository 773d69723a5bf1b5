//! Structured diagnostics buffered during a test run.
//!
//! Engines report errors and warnings through a [`DiagnosticChannel`]; the
//! harness interposes a [`DiagnosticBuffer`] that keeps errors for the
//! verdict while letting warnings pass straight through.

use std::cell::RefCell;
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::engine::{DiagnosticChannel, EngineError};

/// One engine-reported error: message plus source location. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    message: String,
    source_name: Option<String>,
    line: u32,
    line_source: Option<String>,
    column: u32,
}

impl Diagnostic {
    pub fn new(
        message: &str,
        source_name: Option<&str>,
        line: u32,
        line_source: Option<&str>,
        column: u32,
    ) -> Self {
        Self {
            message: message.to_string(),
            source_name: source_name.map(str::to_string),
            line,
            line_source: line_source.map(str::to_string),
            column,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn line_source(&self) -> Option<&str> {
        self.line_source.as_deref()
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    /// Render a slice of diagnostics, one per line group, joined by newlines.
    pub fn render_all(diagnostics: &[Diagnostic]) -> String {
        let mut rendered = Vec::with_capacity(diagnostics.len());
        for diagnostic in diagnostics {
            rendered.push(diagnostic.to_string());
        }
        rendered.join("\n")
    }
}

/// Renders `<sourceName>:<line>: <message>`, then the offending source line,
/// then a caret line pointing at the column. Characters before the caret are
/// replaced with matching whitespace; tabs stay tabs so the caret lines up in
/// a terminal. A column of 0 or past the end of the line yields a caret line
/// without a caret.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.source_name {
            write!(f, "{name}:")?;
        }
        if self.line != 0 {
            write!(f, "{}: ", self.line)?;
        }
        f.write_str(&self.message)?;
        if let Some(source) = &self.line_source {
            write!(f, "\n{source}\n")?;
            for (i, c) in source.chars().enumerate() {
                let position = i as u32 + 1;
                if position < self.column {
                    f.write_char(if c == '\t' { '\t' } else { ' ' })?;
                } else if position == self.column {
                    f.write_char('^')?;
                }
            }
        }
        Ok(())
    }
}

/// Buffers engine-reported errors for post-run inspection while forwarding
/// warnings to the channel it wraps. Buffering never interrupts execution.
///
/// Single-threaded by design: one buffer serves exactly one session.
pub struct DiagnosticBuffer {
    wrapped: Rc<dyn DiagnosticChannel>,
    errors: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticBuffer {
    pub fn new(wrapped: Rc<dyn DiagnosticChannel>) -> Self {
        Self {
            wrapped,
            errors: RefCell::new(Vec::new()),
        }
    }

    /// Snapshot of the buffered records, in report order.
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.errors.borrow().clone()
    }
}

impl DiagnosticChannel for DiagnosticBuffer {
    fn warning(
        &self,
        message: &str,
        source_name: Option<&str>,
        line: u32,
        line_source: Option<&str>,
        column: u32,
    ) {
        self.wrapped
            .warning(message, source_name, line, line_source, column);
    }

    fn error(
        &self,
        message: &str,
        source_name: Option<&str>,
        line: u32,
        line_source: Option<&str>,
        column: u32,
    ) {
        self.errors
            .borrow_mut()
            .push(Diagnostic::new(message, source_name, line, line_source, column));
    }

    fn runtime_error(
        &self,
        message: &str,
        source_name: Option<&str>,
        line: u32,
        line_source: Option<&str>,
        column: u32,
    ) -> EngineError {
        self.wrapped
            .runtime_error(message, source_name, line, line_source, column)
    }
}
