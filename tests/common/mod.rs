//! Shared test doubles: a directive-driven fake engine and a recording
//! observer.
//!
//! Fake "scripts" are plain text files, one directive per line:
//!
//! ```text
//! print <text>      write a line to the captured output
//! error <message>   report a script error through the installed channel
//! warn <message>    report a warning through the installed channel
//! throw <message>   fail at the host level
//! exit <code>       record an explicit exit code
//! hang              spin until cancelled
//! panic <message>   panic on the executing thread
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use quipu::engine::{
    CancelHandle, DiagnosticChannel, EngineError, EngineFactory, EngineSession, HostFn,
    PropertyAttrs,
};
use quipu::output::OutputBuffer;
use quipu::status::Status;
use quipu::{Framework, HostError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Fake engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Print(String),
    Error(String),
    Warn(String),
    Throw(String),
    Exit(i32),
    Hang,
    Panic(String),
}

fn parse(source: &str, name: &str) -> Result<Vec<Step>, EngineError> {
    let mut steps = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (directive, rest) = line.split_once(' ').unwrap_or((line, ""));
        let step = match directive {
            "print" => Step::Print(rest.to_string()),
            "error" => Step::Error(rest.to_string()),
            "warn" => Step::Warn(rest.to_string()),
            "throw" => Step::Throw(rest.to_string()),
            "exit" => Step::Exit(rest.parse().map_err(|_| {
                EngineError::Internal(format!("bad exit code {rest:?} in {name}"))
            })?),
            "hang" => Step::Hang,
            "panic" => Step::Panic(rest.to_string()),
            other => {
                return Err(EngineError::Internal(format!(
                    "unknown directive {other:?} in {name}"
                )));
            }
        };
        steps.push(step);
    }
    Ok(steps)
}

pub struct FakeScript {
    name: String,
    steps: Vec<Step>,
}

/// Observations every session feeds back to its factory, for assertions.
#[derive(Default)]
struct Observations {
    executed: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    host_fns: Mutex<Vec<(String, PropertyAttrs)>>,
}

/// Directive-driven engine; shared across runs and threads.
#[derive(Default)]
pub struct FakeEngine {
    observed: Arc<Observations>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything executed so far, in order: files by full path,
    /// pre-compiled scripts as `script:<name>`.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.observed.executed).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        lock(&self.observed.warnings).clone()
    }

    pub fn host_fns(&self) -> Vec<(String, PropertyAttrs)> {
        lock(&self.observed.host_fns).clone()
    }
}

impl EngineFactory for FakeEngine {
    type Session = FakeSession;

    fn enter(&self) -> Result<FakeSession, EngineError> {
        Ok(FakeSession {
            observed: Arc::clone(&self.observed),
            out: None,
            channel: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            exit_hook: None,
        })
    }
}

/// The engine's own channel: counts warnings, builds runtime errors.
struct BaseChannel {
    observed: Arc<Observations>,
}

impl DiagnosticChannel for BaseChannel {
    fn warning(&self, message: &str, _: Option<&str>, _: u32, _: Option<&str>, _: u32) {
        lock(&self.observed.warnings).push(message.to_string());
    }

    fn error(&self, _: &str, _: Option<&str>, _: u32, _: Option<&str>, _: u32) {}

    fn runtime_error(
        &self,
        message: &str,
        _: Option<&str>,
        _: u32,
        _: Option<&str>,
        _: u32,
    ) -> EngineError {
        EngineError::Runtime(message.to_string())
    }
}

pub struct FakeSession {
    observed: Arc<Observations>,
    out: Option<OutputBuffer>,
    channel: Option<Rc<dyn DiagnosticChannel>>,
    cancelled: Arc<AtomicBool>,
    exit_hook: Option<Box<dyn Fn(i32)>>,
}

impl FakeSession {
    fn run_steps(&mut self, name: &str, steps: &[Step]) -> Result<(), EngineError> {
        for step in steps {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(EngineError::Cancelled);
            }
            match step {
                Step::Print(text) => {
                    if let Some(out) = &mut self.out {
                        writeln!(out, "{text}").expect("output buffer write");
                    }
                }
                Step::Error(message) => {
                    if let Some(channel) = &self.channel {
                        channel.error(message, Some(name), 1, None, 0);
                    }
                }
                Step::Warn(message) => {
                    if let Some(channel) = &self.channel {
                        channel.warning(message, Some(name), 1, None, 0);
                    }
                }
                Step::Throw(message) => return Err(EngineError::Internal(message.clone())),
                Step::Exit(code) => {
                    if let Some(hook) = &self.exit_hook {
                        hook(*code);
                    }
                }
                Step::Hang => {
                    let start = Instant::now();
                    while !self.cancelled.load(Ordering::SeqCst) {
                        // Safety net so a missed cancellation cannot wedge
                        // the whole test binary.
                        if start.elapsed() > Duration::from_secs(5) {
                            return Err(EngineError::Internal("hang safety limit".into()));
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                    return Err(EngineError::Cancelled);
                }
                Step::Panic(message) => panic!("{}", message),
            }
        }
        Ok(())
    }
}

impl EngineSession for FakeSession {
    type Script = FakeScript;
    type Cancel = FakeCancel;

    fn redirect_output(&mut self, out: OutputBuffer) {
        self.out = Some(out);
    }

    fn default_channel(&self) -> Rc<dyn DiagnosticChannel> {
        Rc::new(BaseChannel {
            observed: Arc::clone(&self.observed),
        })
    }

    fn install_channel(&mut self, channel: Rc<dyn DiagnosticChannel>) {
        self.channel = Some(channel);
    }

    fn init_globals(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn define_host_fn(
        &mut self,
        name: &str,
        attrs: PropertyAttrs,
        body: HostFn,
    ) -> Result<(), EngineError> {
        // Exercise the shim once so the no-op contract is visible in tests.
        assert_eq!(body(&[]), "");
        lock(&self.observed.host_fns).push((name.to_string(), attrs));
        Ok(())
    }

    fn on_exit_code(&mut self, hook: Box<dyn Fn(i32)>) {
        self.exit_hook = Some(hook);
    }

    fn compile(&mut self, source: &str, name: &str) -> Result<FakeScript, EngineError> {
        Ok(FakeScript {
            name: name.to_string(),
            steps: parse(source, name)?,
        })
    }

    fn exec_script(&mut self, script: &FakeScript) -> Result<(), EngineError> {
        lock(&self.observed.executed).push(format!("script:{}", script.name));
        self.run_steps(&script.name, &script.steps)
    }

    fn exec_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let source = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let steps = parse(&source, &name)?;
        lock(&self.observed.executed).push(path.display().to_string());
        self.run_steps(&name, &steps)
    }

    fn cancel_handle(&self) -> FakeCancel {
        FakeCancel {
            flag: Arc::clone(&self.cancelled),
        }
    }
}

pub struct FakeCancel {
    flag: Arc<AtomicBool>,
}

impl CancelHandle for FakeCancel {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Recording observer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Running(PathBuf),
    Failed(String),
    Threw(String),
    TimedOut(Duration),
    ExitCodes { expected: i32, actual: i32 },
    Output(String),
}

/// Records every observer signal, in order.
#[derive(Default)]
pub struct RecordingStatus {
    events: Mutex<Vec<Event>>,
}

impl RecordingStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    /// Signal names only, for order assertions.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|event| match event {
                Event::Running(_) => "running",
                Event::Failed(_) => "failed",
                Event::Threw(_) => "threw",
                Event::TimedOut(_) => "timed_out",
                Event::ExitCodes { .. } => "exit_codes",
                Event::Output(_) => "output",
            })
            .collect()
    }

    fn push(&self, event: Event) {
        lock(&self.events).push(event);
    }
}

impl Status for RecordingStatus {
    fn running(&self, unit: &Path) {
        self.push(Event::Running(unit.to_path_buf()));
    }

    fn failed(&self, reason: &str) {
        self.push(Event::Failed(reason.to_string()));
    }

    fn threw(&self, error: &HostError) {
        self.push(Event::Threw(error.to_string()));
    }

    fn timed_out(&self, timeout: Duration) {
        self.push(Event::TimedOut(timeout));
    }

    fn exit_codes_were(&self, expected: i32, actual: i32) {
        self.push(Event::ExitCodes { expected, actual });
    }

    fn output_was(&self, output: &str) {
        self.push(Event::Output(output.to_string()));
    }
}

// ============================================================================
// Scratch trees
// ============================================================================

/// Fresh scratch directory for one test, wiped if a previous run left one.
pub fn scratch(test: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("quipu_tests_{}", std::process::id()))
        .join(test);
    if dir.exists() {
        let _ = fs::remove_dir_all(&dir);
    }
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, contents).expect("write test file");
}

/// Factory plus a framework compiled from a file outside any unit's
/// bootstrap chain.
pub fn harness(root: &Path) -> (Arc<FakeEngine>, Arc<Framework<FakeScript>>) {
    let factory = FakeEngine::new();
    let framework_path = root.join("framework").join("shell.js");
    write_file(&framework_path, "print framework bootstrap\n");
    let framework = Arc::new(
        Framework::compile(factory.as_ref(), &framework_path).expect("compile framework"),
    );
    (factory, framework)
}
