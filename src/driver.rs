//! Execution driver: orchestrates one test run end to end.
//!
//! A run prepares an isolated session, wires a [`DiagnosticBuffer`] into the
//! engine's error channel, executes the bootstrap chain and the unit inside a
//! cancellable worker, then derives the verdict from buffered diagnostics and
//! captured output.
//!
//! ## Failure semantics
//!
//! Script-level errors are recoverable: buffered, then classified against the
//! unit's negative expectation. Host-level errors are fatal to the run but
//! never to the harness: they surface through [`Status::threw`]. A timeout is
//! fatal to the run and triggers forced, best-effort cancellation; the
//! supervisor never blocks waiting for a cancelled worker to unwind. The only
//! `Err` returns from [`run`] and [`run_no_fork`] are harness-internal
//! failures, so one broken unit cannot abort a batch.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostics::DiagnosticBuffer;
use crate::engine::{
    CancelHandle, CancelOf, EngineError, EngineFactory, EngineSession, PropertyAttrs, ScriptOf,
};
use crate::framework::Framework;
use crate::output::{self, OutputBuffer};
use crate::status::{self, Status};

/// Bootstrap file resolved at up to three ancestor directory levels above a
/// test unit, run root-most first, each silently skipped when absent.
pub const BOOTSTRAP_FILE: &str = "shell.js";

/// File-name suffix declaring a unit that is expected to produce at least
/// one script error.
pub const NEGATIVE_SUFFIX: &str = "-n.js";

/// Compatibility shim defined on every fresh global: a no-op that returns an
/// empty string, so suites probing for it do not trip over its absence.
const SHIM_FN: &str = "options";

/// Whether a unit's file name declares it a negative test.
pub fn is_negative_unit(unit: &Path) -> bool {
    unit.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(NEGATIVE_SUFFIX))
}

/// Per-run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    timeout: Duration,
}

impl Parameters {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Wall-clock budget for one forked run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Failures of the harness itself, as opposed to failures of a test unit.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("missing test framework file {0}")]
    FrameworkMissing(PathBuf),

    #[error("failed to read test framework file {path}: {source}")]
    FrameworkRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to compile test framework file {path}: {source}")]
    FrameworkCompile {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Host-level error escaping a test unit, reported via [`Status::threw`].
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The pre-compiled framework script failed while executing. Every unit
    /// in the suite is suspect when this happens.
    #[error("test framework script failed: {0}")]
    Framework(#[source] EngineError),

    #[error("worker panicked: {0}")]
    Panic(String),
}

/// State shared between the worker and the supervising flow. `finished`
/// transitions false to true exactly once, in the worker's epilogue, and is
/// the sole signal distinguishing natural completion from a run that had to
/// be cancelled.
struct RunState<H> {
    finished: bool,
    exit_code: i32,
    cancel: Option<H>,
    thrown: Option<HostError>,
}

struct Shared<H> {
    state: Mutex<RunState<H>>,
    done: Condvar,
}

impl<H> Shared<H> {
    fn new() -> Self {
        Self {
            state: Mutex::new(RunState {
                finished: false,
                exit_code: 0,
                cancel: None,
                thrown: None,
            }),
            done: Condvar::new(),
        }
    }
}

/// A poisoned run-state lock only means the worker died mid-update; the
/// fields are plain values, so recover the guard and read them anyway.
fn lock<H>(shared: &Shared<H>) -> MutexGuard<'_, RunState<H>> {
    shared.state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run one test unit on a dedicated worker thread, enforcing the configured
/// timeout via forced cancellation.
///
/// The observer receives, in order: `running`, any worker-side signals
/// (`failed` from buffered diagnostics, or `threw`), then after the wait
/// `timed_out` (if the budget elapsed), any pending host error via `threw`,
/// `output_was`, `failed` for accumulated `FAILED!` lines, and finally
/// `exit_codes_were`.
pub fn run<F>(
    factory: &Arc<F>,
    framework: &Arc<Framework<ScriptOf<F>>>,
    unit: &Path,
    parameters: &Parameters,
    status: &Arc<dyn Status>,
) -> Result<(), HarnessError>
where
    F: EngineFactory + 'static,
    ScriptOf<F>: Send + Sync + 'static,
{
    let negative = is_negative_unit(unit);
    let out = OutputBuffer::new();
    let shared: Arc<Shared<CancelOf<F>>> = Arc::new(Shared::new());

    let worker = {
        let factory = Arc::clone(factory);
        let framework = Arc::clone(framework);
        let unit = unit.to_path_buf();
        let status = Arc::clone(status);
        let shared = Arc::clone(&shared);
        let out = out.clone();
        move || {
            let body = panic::catch_unwind(AssertUnwindSafe(|| {
                execute_unit(
                    &*factory,
                    &framework,
                    &unit,
                    negative,
                    &*status,
                    &shared,
                    out,
                )
            }));
            let thrown = match body {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(error),
                Err(payload) => Some(HostError::Panic(panic_message(payload))),
            };
            let mut state = lock(&shared);
            state.thrown = thrown;
            state.finished = true;
            drop(state);
            shared.done.notify_all();
        }
    };

    // The handle is dropped on purpose: completion is signalled through the
    // condvar, and a worker that outlives its timeout is abandoned rather
    // than joined.
    thread::Builder::new()
        .name(unit.display().to_string())
        .spawn(worker)
        .map_err(HarnessError::Spawn)?;

    let timeout = parameters.timeout();
    let guard = lock(&shared);
    let (mut state, _) = shared
        .done
        .wait_timeout_while(guard, timeout, |state| !state.finished)
        .unwrap_or_else(PoisonError::into_inner);
    if !state.finished {
        match state.cancel.take() {
            Some(handle) => {
                debug!(unit = %unit.display(), "timeout elapsed, cancelling worker");
                handle.cancel();
            }
            None => warn!(
                unit = %unit.display(),
                "timeout elapsed before the worker published a cancel handle"
            ),
        }
        status.timed_out(timeout);
    }
    let actual_exit = state.exit_code;
    let thrown = state.thrown.take();
    drop(state);

    conclude(&**status, &out, thrown, actual_exit);
    Ok(())
}

/// Run one test unit synchronously on the calling thread, with no timeout
/// and no cancellation path. Produces the same observer sequence as [`run`]
/// for any unit that would not have timed out.
pub fn run_no_fork<F>(
    factory: &F,
    framework: &Framework<ScriptOf<F>>,
    unit: &Path,
    _parameters: &Parameters,
    status: &dyn Status,
) -> Result<(), HarnessError>
where
    F: EngineFactory,
{
    let negative = is_negative_unit(unit);
    let out = OutputBuffer::new();
    let shared: Arc<Shared<CancelOf<F>>> = Arc::new(Shared::new());

    let body = panic::catch_unwind(AssertUnwindSafe(|| {
        execute_unit(
            factory,
            framework,
            unit,
            negative,
            status,
            &shared,
            out.clone(),
        )
    }));
    let thrown = match body {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(payload) => Some(HostError::Panic(panic_message(payload))),
    };
    let mut state = lock(&shared);
    state.finished = true;
    let actual_exit = state.exit_code;
    drop(state);

    conclude(status, &out, thrown, actual_exit);
    Ok(())
}

/// Worker body shared by both operations: session setup, bootstrap chain,
/// the unit itself, then the verdict from buffered diagnostics.
///
/// `Err` means a host failure outside any single file's execution (session
/// setup); it lands in the shared `thrown` slot and is re-signalled after
/// the wait. Failures inside the file chain are signalled here, directly.
fn execute_unit<F>(
    factory: &F,
    framework: &Framework<ScriptOf<F>>,
    unit: &Path,
    negative: bool,
    status: &dyn Status,
    shared: &Arc<Shared<CancelOf<F>>>,
    out: OutputBuffer,
) -> Result<(), HostError>
where
    F: EngineFactory,
{
    let mut session = factory.enter()?;
    session.redirect_output(out);
    status.running(unit);

    let buffer = Rc::new(DiagnosticBuffer::new(session.default_channel()));
    session.install_channel(buffer.clone());
    session.init_globals()?;
    session.define_host_fn(SHIM_FN, PropertyAttrs::SHIM, Arc::new(|_: &[String]| String::new()))?;
    session.on_exit_code(Box::new({
        let shared = Arc::clone(shared);
        move |code| lock(&shared).exit_code = code
    }));
    lock(shared).cancel = Some(session.cancel_handle());

    match run_files(&mut session, framework, unit) {
        Ok(()) => status::report_script_errors(status, unit, negative, &buffer.errors()),
        // A cancelled run has already been reported as timed out.
        Err(HostError::Engine(EngineError::Cancelled)) => {}
        Err(error) => status.threw(&error),
    }
    Ok(())
}

/// Run each ancestor bootstrap that exists, root-most first, then the unit.
fn run_files<S>(
    session: &mut S,
    framework: &Framework<S::Script>,
    unit: &Path,
) -> Result<(), HostError>
where
    S: EngineSession,
{
    for level in (1..=3).rev() {
        if let Some(dir) = unit.ancestors().nth(level) {
            run_file_if_exists(session, framework, &dir.join(BOOTSTRAP_FILE))?;
        }
    }
    run_file_if_exists(session, framework, unit)
}

fn run_file_if_exists<S>(
    session: &mut S,
    framework: &Framework<S::Script>,
    path: &Path,
) -> Result<(), HostError>
where
    S: EngineSession,
{
    if path == framework.path() {
        session.exec_script(framework.script()).map_err(|error| match error {
            EngineError::Cancelled => HostError::Engine(EngineError::Cancelled),
            other => HostError::Framework(other),
        })
    } else if path.is_file() {
        session.exec_file(path).map_err(HostError::from)
    } else {
        debug!(path = %path.display(), "bootstrap file absent, skipping");
        Ok(())
    }
}

/// Post-wait epilogue shared by both operations. Signal order is fixed:
/// pending host error, captured output, marker-derived failure, exit codes.
fn conclude(status: &dyn Status, out: &OutputBuffer, thrown: Option<HostError>, actual_exit: i32) {
    let text = out.text();
    if let Some(error) = thrown {
        status.threw(&error);
    }
    status.output_was(&text);
    let scan = output::scan(&text);
    if !scan.failures.is_empty() {
        status.failed(&scan.failures.join("\n"));
    }
    status.exit_codes_were(scan.expected_exit_code, actual_exit);
}
