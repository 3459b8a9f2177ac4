//! Engine-agnostic JavaScript facade.
//! This crate centralizes the interfaces and value types shared between the
//! script engine adapters and the DOM session host (execution coordinator,
//! host capability surface, library loading).

use anyhow::Result;
use std::sync::Arc;

pub mod console;
pub use console::{Console, ConsoleLogger};

/// Engine-agnostic host bindings facade: values, logger, and namespace builders.
pub mod bindings;
pub use bindings::{
    HALT_MARKER, HostBindings, HostContext, HostFnKind, HostFnSync, HostLogger, HostNamespace,
    JSError, JSValue, LogLevel, ScriptError, SourcePosition, build_console_namespace, stringify_arguments,
};

/// Script library loading for `require()` support in the guest runtime.
pub mod modules;
pub use modules::{DirectoryLoader, LoadError, NoLibrary, SourceLoader};

// ============================
// Engine-agnostic JS context trait
// ============================

/// Requests termination of an in-progress evaluation from any thread.
///
/// Interruption is best effort: engines honour it at their next safe point
/// and report the outcome as [`ScriptError::Halted`].
pub trait InterruptHandle: Send + Sync {
    /// Ask the engine to stop the evaluation currently running, if any.
    fn interrupt(&self);
}

/// A minimal interface for evaluating JavaScript in a per-session engine.
/// Keep this trait small so engines can be swapped (e.g., QuickJS/V8).
///
/// Engines are owned by a single thread; the trait does not require `Send`.
pub trait JsEngine {
    /// Evaluate a classic script and return its completion value.
    ///
    /// # Errors
    /// Returns the exception raised by the script, or [`ScriptError::Halted`]
    /// when the evaluation was interrupted.
    fn eval_script(&mut self, source: &str, url: &str) -> Result<JSValue, ScriptError>;

    /// Compile `function_source` (a function expression) and invoke it with
    /// `args` marshalled as values, never as source text.
    ///
    /// # Errors
    /// Same as [`JsEngine::eval_script`]; also fails when the source does not
    /// evaluate to a function.
    fn call_function(
        &mut self,
        function_source: &str,
        args: Vec<JSValue>,
        url: &str,
    ) -> Result<JSValue, ScriptError>;

    /// Install host namespaces onto the global object.
    ///
    /// # Errors
    /// Returns an error if the engine cannot allocate the objects involved.
    fn install_bindings(&mut self, context: &HostContext, bindings: &HostBindings) -> Result<()>;

    /// Handle used by other threads to interrupt a running evaluation.
    fn interrupt_handle(&self) -> Arc<dyn InterruptHandle>;

    /// Run pending microtasks/jobs until idle.
    ///
    /// # Errors
    /// Returns an error if the engine fails to run its job queue.
    fn run_jobs(&mut self) -> Result<()>;
}
