//! Multi-observer status protocol for one test run.
//!
//! The driver reduces a run to a fixed sequence of calls on a [`Status`]
//! observer. Within one run the sequence is strictly ordered: `running` comes
//! first, `exit_codes_were` comes last and is unconditional, and `output_was`
//! fires exactly once just before the marker-derived signals.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::Diagnostic;
use crate::driver::HostError;

/// Lifecycle observer for a single test unit. All methods are side-effecting
/// and return nothing; implementations needing state use interior mutability.
pub trait Status: Send + Sync {
    /// The unit is about to run, before any bootstrap file.
    fn running(&self, unit: &Path);

    /// The derived verdict is failure, for a reason expressible as text.
    fn failed(&self, reason: &str);

    /// The execution path itself raised an error that escaped the unit's own
    /// error handling. Distinct from buffered script errors, which are
    /// reported through [`Status::failed`].
    fn threw(&self, error: &HostError);

    /// The timeout elapsed before the unit completed naturally.
    fn timed_out(&self, timeout: Duration);

    /// Declared-expected versus recorded exit code; exactly once per run.
    fn exit_codes_were(&self, expected: i32, actual: i32);

    /// Full captured output of the run; exactly once per run.
    fn output_was(&self, output: &str);
}

/// Broadcasts every signal to an ordered list of observers.
pub struct Composite {
    members: Vec<Arc<dyn Status>>,
}

impl Composite {
    pub fn new(members: Vec<Arc<dyn Status>>) -> Self {
        Self { members }
    }
}

impl Status for Composite {
    fn running(&self, unit: &Path) {
        for member in &self.members {
            member.running(unit);
        }
    }

    fn failed(&self, reason: &str) {
        for member in &self.members {
            member.failed(reason);
        }
    }

    fn threw(&self, error: &HostError) {
        for member in &self.members {
            member.threw(error);
        }
    }

    fn timed_out(&self, timeout: Duration) {
        for member in &self.members {
            member.timed_out(timeout);
        }
    }

    fn exit_codes_were(&self, expected: i32, actual: i32) {
        for member in &self.members {
            member.exit_codes_were(expected, actual);
        }
    }

    fn output_was(&self, output: &str) {
        for member in &self.members {
            member.output_was(output);
        }
    }
}

/// Derived verdict rule for buffered script errors.
///
/// A non-negative unit fails when any diagnostic was buffered; a negative
/// unit fails when none was. Every other combination is silent.
pub fn report_script_errors(
    status: &dyn Status,
    unit: &Path,
    negative: bool,
    errors: &[Diagnostic],
) {
    if !negative && !errors.is_empty() {
        status.failed(&format!(
            "script errors in {}:\n{}",
            unit.display(),
            Diagnostic::render_all(errors)
        ));
    } else if negative && errors.is_empty() {
        status.failed(&format!(
            "should have produced a script error in {}.",
            unit.display()
        ));
    }
}

/// Observer that logs every signal through `tracing`. A reporting front end
/// proper is a separate concern; this is enough to watch a suite go by.
#[derive(Debug, Default)]
pub struct ConsoleStatus;

impl Status for ConsoleStatus {
    fn running(&self, unit: &Path) {
        tracing::info!(unit = %unit.display(), "running");
    }

    fn failed(&self, reason: &str) {
        tracing::error!("test failed: {reason}");
    }

    fn threw(&self, error: &HostError) {
        tracing::error!("test threw: {error}");
    }

    fn timed_out(&self, timeout: Duration) {
        tracing::error!(?timeout, "test timed out");
    }

    fn exit_codes_were(&self, expected: i32, actual: i32) {
        if expected != actual {
            tracing::error!(expected, actual, "exit code mismatch");
        } else {
            tracing::debug!(expected, actual, "exit codes");
        }
    }

    fn output_was(&self, output: &str) {
        tracing::debug!(bytes = output.len(), "captured output");
    }
}
