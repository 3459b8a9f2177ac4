//! Engine-agnostic host bindings facade for registering functions and
//! properties on the JavaScript global object.
//!
//! This module defines a small set of value types and traits that allow
//! the session host to install its namespaces (`console`, the host
//! capability object) into any JavaScript engine adapter without depending
//! on engine-specific APIs.

use std::collections::BTreeMap;
use std::sync::Arc;

mod values;
pub use values::{HALT_MARKER, JSError, JSValue, LogLevel, ScriptError, SourcePosition};
mod logger;
pub use logger::HostLogger;

/// Execution context passed to host callbacks (for example, for logging).
#[derive(Clone)]
pub struct HostContext {
    /// Identifier of the session the callback belongs to, used in log lines.
    pub session_id: u64,
    /// Logger used by host functions such as `console.*`.
    pub logger: Arc<dyn HostLogger>,
}

/// A synchronous host function signature.
pub type HostFnSync =
    dyn Fn(&HostContext, Vec<JSValue>) -> Result<JSValue, JSError> + Send + Sync + 'static;

/// A single function descriptor the engine adapter can install.
#[derive(Clone)]
pub enum HostFnKind {
    /// Synchronous function.
    Sync(Arc<HostFnSync>),
}

/// A namespaced set of functions and properties (for example, the `console` object).
pub struct HostNamespace {
    /// Functions to install under this namespace.
    pub functions: BTreeMap<String, HostFnKind>,
    /// Constant properties to install under this namespace.
    pub properties: BTreeMap<String, JSValue>,
}

impl HostNamespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Register a synchronous function.
    pub fn with_sync_fn(mut self, name: &str, function: Arc<HostFnSync>) -> Self {
        self.functions
            .insert(name.to_string(), HostFnKind::Sync(function));
        self
    }

    /// Register a constant property.
    pub fn with_property(mut self, name: &str, value: JSValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    /// Look up a registered function by name.
    pub fn function(&self, name: &str) -> Option<Arc<HostFnSync>> {
        self.functions.get(name).map(|kind| match kind {
            HostFnKind::Sync(function) => Arc::clone(function),
        })
    }
}

impl Default for HostNamespace {
    fn default() -> Self {
        Self::new()
    }
}

/// A collection of namespaces to be installed on the global object.
pub struct HostBindings {
    /// Mapping from namespace name to its definitions.
    pub namespaces: BTreeMap<String, HostNamespace>,
}

impl HostBindings {
    /// Create empty bindings.
    pub fn new() -> Self {
        Self {
            namespaces: BTreeMap::new(),
        }
    }

    /// Add or replace a namespace.
    pub fn with_namespace(mut self, name: &str, namespace: HostNamespace) -> Self {
        self.namespaces.insert(name.to_string(), namespace);
        self
    }

    /// Borrow a namespace by its global name.
    pub fn namespace(&self, name: &str) -> Option<&HostNamespace> {
        self.namespaces.get(name)
    }
}

impl Default for HostBindings {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal helper to build a console logging function for a given level.
fn make_log_fn(level: LogLevel) -> Arc<HostFnSync> {
    Arc::new(
        move |context: &HostContext, arguments: Vec<JSValue>| -> Result<JSValue, JSError> {
            let message = stringify_arguments(arguments);
            context.logger.log(level, &message);
            Ok(JSValue::Undefined)
        },
    )
}

/// Build the `console` namespace with standard logging methods.
pub fn build_console_namespace() -> HostNamespace {
    let methods: [(&str, LogLevel); 5] = [
        ("debug", LogLevel::Debug),
        ("log", LogLevel::Info),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];

    methods
        .iter()
        .fold(HostNamespace::new(), |ns, (name, level)| {
            ns.with_sync_fn(name, make_log_fn(*level))
        })
}

/// Join console arguments the way `console.log` prints them.
pub fn stringify_arguments(arguments: Vec<JSValue>) -> String {
    arguments
        .iter()
        .map(JSValue::to_text)
        .collect::<Vec<_>>()
        .join(" ")
}
