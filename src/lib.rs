#![forbid(unsafe_code)]
//! Quipu: a conformance test harness for embedded scripting engines.
//!
//! Quipu drives one untrusted script file at a time against an engine the
//! caller supplies, enforces a wall-clock timeout via forced cancellation,
//! buffers the engine's structured diagnostics, and reduces each run to a
//! sequence of observer signals: pass/fail verdict, thrown host errors,
//! exit codes, and captured output.
//!
//! The engine itself stays behind the traits in [`engine`]; this crate ships
//! none. What it does ship:
//!
//! - [`driver`]: the execution pipeline, forked ([`driver::run`]) and
//!   synchronous ([`driver::run_no_fork`])
//! - [`status`]: the multi-observer verdict protocol and its composite
//! - [`diagnostics`]: buffered error records with caret-pointer rendering
//! - [`output`]: the shared capture buffer and the text-marker protocol
//! - [`framework`]: the pre-compiled mandatory bootstrap handle
//! - [`discovery`]: the suite's file-name predicates
//!
//! ## Panic Policy
//!
//! Production code returns `Result` and propagates with `?`. Worker panics
//! are caught and reported through [`status::Status::threw`], never allowed
//! to cross the harness boundary. `.unwrap()` / `.expect()` are reserved for
//! test code.

pub mod diagnostics;
pub mod discovery;
pub mod driver;
pub mod engine;
pub mod framework;
pub mod output;
pub mod status;

pub use diagnostics::{Diagnostic, DiagnosticBuffer};
pub use driver::{
    BOOTSTRAP_FILE, HarnessError, HostError, NEGATIVE_SUFFIX, Parameters, is_negative_unit, run,
    run_no_fork,
};
pub use framework::Framework;
pub use output::{OutputBuffer, OutputScan};
pub use status::{Composite, ConsoleStatus, Status};
