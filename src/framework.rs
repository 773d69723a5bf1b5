//! Pre-compiled framework bootstrap script.
//!
//! One bootstrap file is special: the framework script every suite depends
//! on. It is compiled once at process start and substituted for its
//! filesystem counterpart whenever the bootstrap chain would otherwise run
//! that path, so a thousand test units do not recompile it a thousand times.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::driver::HarnessError;
use crate::engine::{EngineFactory, EngineSession, SessionOf};

/// Read-only handle to the mandatory framework bootstrap. Built once, then
/// passed explicitly to every run; there is no ambient global cache.
pub struct Framework<S> {
    path: PathBuf,
    script: S,
}

impl<S> Framework<S> {
    /// Compile the framework file at `path` using a throwaway session.
    ///
    /// A missing, unreadable, or uncompilable framework file is a startup
    /// failure of the harness itself, never a per-test signal.
    pub fn compile<F>(factory: &F, path: &Path) -> Result<Self, HarnessError>
    where
        F: EngineFactory,
        SessionOf<F>: EngineSession<Script = S>,
    {
        if !path.is_file() {
            return Err(HarnessError::FrameworkMissing(path.to_path_buf()));
        }
        let source = fs::read_to_string(path).map_err(|source| HarnessError::FrameworkRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut session = factory
            .enter()
            .map_err(|source| HarnessError::FrameworkCompile {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let script = session
            .compile(&source, &name)
            .map_err(|source| HarnessError::FrameworkCompile {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "framework bootstrap compiled");
        Ok(Self {
            path: path.to_path_buf(),
            script,
        })
    }

    /// Path the pre-compiled script stands in for.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn script(&self) -> &S {
        &self.script
    }
}
