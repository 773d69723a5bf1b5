//! Collaborator contract with the embedded scripting engine.
//!
//! The harness does not ship an engine. Everything it needs from one is
//! captured by the traits here:
//!
//! - [`EngineFactory`] produces a fresh, isolated [`EngineSession`] per run.
//! - [`EngineSession`] compiles and executes source units against its own
//!   global environment, with redirectable output and an installable
//!   [`DiagnosticChannel`].
//! - [`CancelHandle`] forcibly tears down a session's in-flight execution
//!   from another thread.
//!
//! Script-level problems (syntax errors, uncaught script exceptions inside
//! evaluated code) flow through the installed [`DiagnosticChannel`] and never
//! surface as `Err`. Only host-level failures become [`EngineError`].

use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::output::OutputBuffer;

/// Host-level failure surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// In-flight execution was torn down through a [`CancelHandle`].
    #[error("script execution cancelled")]
    Cancelled,

    /// A throwable runtime error constructed by a diagnostic channel.
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Engine-internal failure (corrupted state, unsupported operation).
    #[error("engine failure: {0}")]
    Internal(String),
}

/// Structured error/warning channel an engine reports through.
///
/// All five location arguments mirror what engines typically know at report
/// time; `source_name` and `line_source` may be absent, and `line` 0 means
/// "no line information".
pub trait DiagnosticChannel {
    /// Report a warning. Warnings never affect a run's verdict.
    fn warning(
        &self,
        message: &str,
        source_name: Option<&str>,
        line: u32,
        line_source: Option<&str>,
        column: u32,
    );

    /// Report an error. Reporting must not halt execution; the engine
    /// continues (or aborts) on its own terms.
    fn error(
        &self,
        message: &str,
        source_name: Option<&str>,
        line: u32,
        line_source: Option<&str>,
        column: u32,
    );

    /// Construct a throwable runtime error for the caller to raise or not.
    fn runtime_error(
        &self,
        message: &str,
        source_name: Option<&str>,
        line: u32,
        line_source: Option<&str>,
        column: u32,
    ) -> EngineError;
}

/// Property attributes for host functions injected into the global namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAttrs {
    pub enumerable: bool,
    pub writable: bool,
    pub permanent: bool,
}

impl PropertyAttrs {
    /// Non-enumerable, read-only, permanent: the attributes for compatibility
    /// shims that scripts may probe but must not replace.
    pub const SHIM: PropertyAttrs = PropertyAttrs {
        enumerable: false,
        writable: false,
        permanent: true,
    };
}

/// Host function callable from script code. Arguments arrive as their string
/// conversions; the return value is injected back as a string.
pub type HostFn = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// Handle with which another thread can tear a session down.
///
/// Cancellation is forceful and best-effort: the engine may take a moment to
/// notice, and engine-internal state may be left inconsistent. The session is
/// discarded immediately afterwards, so neither matters.
pub trait CancelHandle: Send {
    fn cancel(&self);
}

/// One isolated execution context plus its global environment.
///
/// A session serves exactly one run and is used from one thread only; it is
/// deliberately not `Send`. Cross-thread teardown goes through the
/// [`CancelHandle`] instead.
pub trait EngineSession {
    /// Compiled form of a source unit, reusable across executions.
    type Script;
    type Cancel: CancelHandle + 'static;

    /// Redirect the session's standard output and error streams into `out`,
    /// interleaved in write order.
    fn redirect_output(&mut self, out: OutputBuffer);

    /// The channel the engine reports through when none is installed.
    fn default_channel(&self) -> Rc<dyn DiagnosticChannel>;

    /// Install `channel` as the active diagnostic channel for this session.
    fn install_channel(&mut self, channel: Rc<dyn DiagnosticChannel>);

    /// Initialise the engine's built-in global objects.
    fn init_globals(&mut self) -> Result<(), EngineError>;

    /// Define a host-callable function on the global object.
    fn define_host_fn(
        &mut self,
        name: &str,
        attrs: PropertyAttrs,
        body: HostFn,
    ) -> Result<(), EngineError>;

    /// Register a hook invoked when script code sets an explicit exit code.
    fn on_exit_code(&mut self, hook: Box<dyn Fn(i32)>);

    /// Compile a named source unit to a reusable script.
    fn compile(&mut self, source: &str, name: &str) -> Result<Self::Script, EngineError>;

    /// Execute a previously compiled script against this session's globals.
    fn exec_script(&mut self, script: &Self::Script) -> Result<(), EngineError>;

    /// Compile and execute the file at `path`. Script-level errors are
    /// reported through the installed diagnostic channel; only host-level
    /// failures return `Err`.
    fn exec_file(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Handle for forcing this session down from another thread.
    fn cancel_handle(&self) -> Self::Cancel;
}

/// Produces fresh isolated sessions; shared across runs and threads.
pub trait EngineFactory: Send + Sync {
    type Session: EngineSession;

    fn enter(&self) -> Result<Self::Session, EngineError>;
}

/// Session type produced by an engine factory.
pub type SessionOf<F> = <F as EngineFactory>::Session;
/// Compiled-script type produced by an engine factory's sessions.
pub type ScriptOf<F> = <SessionOf<F> as EngineSession>::Script;
/// Cancel-handle type produced by an engine factory's sessions.
pub type CancelOf<F> = <SessionOf<F> as EngineSession>::Cancel;
