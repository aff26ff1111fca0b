//! Script units: compile-once, run-many guest scripts.
//!
//! A unit is created from source plus a filename and origin. Creation
//! runs the source pre-filter and compiles (or reuses a cached
//! artifact); a unit that fails either step is inspectable but
//! permanently unrunnable. Each unit owns one execution namespace,
//! created lazily on the first run and reused by later runs.

use pyweb_core::{BridgeValue, EmbedError, EmbedResult, ScriptOrigin};

use crate::engine::{self, CodeKey, Engine};
use crate::foreign;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptState {
    /// Pre-filter rejection or compile error. Terminal.
    CompileFailed,
    Compiled,
    Running,
    Completed,
    /// The last run raised and the unit will not run again. Terminal.
    RuntimeFailed,
}

pub struct ScriptUnit {
    engine: &'static Engine,
    filename: String,
    origin: ScriptOrigin,
    muted_errors: bool,
    state: ScriptState,
    error: Option<EmbedError>,
    code_key: Option<CodeKey>,
    namespace_id: Option<u64>,
}

impl ScriptUnit {
    pub fn create(source: &str, filename: &str, origin: ScriptOrigin) -> EmbedResult<ScriptUnit> {
        Self::create_with_options(source, filename, origin, false)
    }

    /// `muted_errors` marks a script whose failures must not leak detail
    /// to the embedding page (a cross-origin script served without CORS
    /// clearance). Muted units run under the opaque origin and surface
    /// every failure as the generic "Script error.".
    pub fn create_with_options(
        source: &str,
        filename: &str,
        origin: ScriptOrigin,
        muted_errors: bool,
    ) -> EmbedResult<ScriptUnit> {
        let engine = Engine::handle()?;
        let origin = if muted_errors {
            ScriptOrigin::opaque()
        } else {
            origin
        };
        let mut unit = ScriptUnit {
            engine,
            filename: filename.to_owned(),
            origin,
            muted_errors,
            state: ScriptState::Compiled,
            error: None,
            code_key: None,
            namespace_id: None,
        };

        if !engine
            .policy_read()
            .should_allow_script_execution(source, &unit.origin)
        {
            tracing::warn!(filename, "script rejected by the source pre-filter");
            unit.state = ScriptState::CompileFailed;
            unit.error = Some(EmbedError::Security(format!(
                "script '{filename}' was rejected by the source pre-filter"
            )));
            return Ok(unit);
        }

        let compiled =
            engine.enter(|vm, regs| engine::compile_cached(vm, regs, source, filename).map(|_| ()));
        match compiled {
            Ok(()) => {
                unit.code_key = Some(engine::cache_key(source, filename));
            }
            Err(error) => {
                tracing::debug!(filename, %error, "script failed to compile");
                unit.state = ScriptState::CompileFailed;
                unit.error = Some(error);
            }
        }
        Ok(unit)
    }

    /// Executes the compiled artifact in this unit's namespace. A run
    /// that raises makes the unit RuntimeFailed; later calls return the
    /// recorded error without executing anything.
    pub fn run(&mut self) -> EmbedResult<BridgeValue> {
        Engine::handle()?;
        match self.state {
            ScriptState::CompileFailed | ScriptState::RuntimeFailed => {
                let recorded = self.error.clone().unwrap_or_else(|| {
                    EmbedError::Internal("failed script unit has no recorded error".to_string())
                });
                return Err(self.surface(recorded));
            }
            ScriptState::Running => {
                return Err(EmbedError::Internal(format!(
                    "script '{}' is already running",
                    self.filename
                )));
            }
            ScriptState::Compiled | ScriptState::Completed => {}
        }
        let Some(key) = self.code_key.clone() else {
            return Err(EmbedError::Internal(format!(
                "script '{}' has no compiled artifact",
                self.filename
            )));
        };

        self.state = ScriptState::Running;
        let result = self
            .engine
            .run_unit(&self.filename, &key, &mut self.namespace_id, &self.origin);
        match result {
            Ok(value) => {
                self.state = ScriptState::Completed;
                Ok(value)
            }
            Err(error) => {
                self.state = ScriptState::RuntimeFailed;
                self.error = Some(error.clone());
                if !self.muted_errors {
                    self.engine.report(&error);
                }
                Err(self.surface(error))
            }
        }
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn origin(&self) -> &ScriptOrigin {
        &self.origin
    }

    pub fn muted_errors(&self) -> bool {
        self.muted_errors
    }

    /// The recorded compile or runtime error, unfiltered. Host-side
    /// diagnostics only; what a page observes goes through `run`.
    pub fn error(&self) -> Option<&EmbedError> {
        self.error.as_ref()
    }

    fn surface(&self, error: EmbedError) -> EmbedError {
        if self.muted_errors {
            muted_error()
        } else {
            error
        }
    }
}

impl Drop for ScriptUnit {
    fn drop(&mut self) {
        // The namespace holds guest dicts; release happens under the
        // execution lock on the engine's next entry.
        if let Some(id) = self.namespace_id.take() {
            foreign::enqueue_namespace_release(id);
        }
    }
}

/// The detail-free error surfaced for muted scripts.
pub fn muted_error() -> EmbedError {
    EmbedError::Guest {
        type_name: "Error".to_string(),
        message: "Script error.".to_string(),
        traceback: String::new(),
    }
}
