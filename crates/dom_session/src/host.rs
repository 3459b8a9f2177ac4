//! The host capability surface injected into guest scope as `opossum`.

use crate::bridge::{NetRequest, NetworkBridge, StyleBridge};
use crate::mutation::{MutationCollector, MutationKind};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use js::{
    HostBindings, HostContext, HostFnSync, HostNamespace, JSError, JSValue, LoadError, SourceLoader,
    build_console_namespace,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Global name of the host object.
pub const HOST_OBJECT: &str = "opossum";

/// Adapts the host object for the DOM shim: `require`, window, mutation
/// handler and callback-style `xhr`.
pub(crate) const HOST_PRELUDE: &str = include_str!("prelude/host.js");
/// Loads a regenerator runtime for transpiled generator code when available.
pub(crate) const REGEN_PRELUDE: &str = include_str!("prelude/regen.js");

/// Everything guest script can reach on the host.
pub trait HostCapabilities: Send + Sync {
    /// Style query for the node matched by `selector`; never fails.
    fn query(&self, selector: &str, property: &str) -> String;
    /// Start a network request, returning the id its reply is delivered under.
    fn fetch(&self, request: NetRequest) -> u64;
    /// Record a document mutation. Returns whether it was queued.
    fn report_mutation(
        &self,
        kind: MutationKind,
        target: &str,
        tag: &str,
        attributes: HashMap<String, String>,
    ) -> bool;
    /// Base64 of the text's bytes.
    fn encode(&self, text: &str) -> String;
    /// Source of a library module for `require`.
    ///
    /// # Errors
    /// [`LoadError::NotFound`] for modules that cannot be served.
    fn load(&self, specifier: &str) -> Result<String, LoadError>;
}

/// The session's implementation of [`HostCapabilities`].
pub struct SessionHost {
    pub(crate) style: StyleBridge,
    pub(crate) network: Arc<NetworkBridge>,
    pub(crate) mutations: MutationCollector,
    pub(crate) loader: Arc<dyn SourceLoader>,
}

impl HostCapabilities for SessionHost {
    fn query(&self, selector: &str, property: &str) -> String {
        self.style.query(selector, property)
    }

    fn fetch(&self, request: NetRequest) -> u64 {
        self.network.dispatch(request)
    }

    fn report_mutation(
        &self,
        kind: MutationKind,
        target: &str,
        tag: &str,
        attributes: HashMap<String, String>,
    ) -> bool {
        self.mutations.report(kind, target, tag, attributes)
    }

    fn encode(&self, text: &str) -> String {
        BASE64_STANDARD.encode(text.as_bytes())
    }

    fn load(&self, specifier: &str) -> Result<String, LoadError> {
        self.loader.load(specifier)
    }
}

/// Argument `index` as text; missing and `undefined` arguments read as `""`.
fn text_arg(args: &[JSValue], index: usize) -> String {
    match args.get(index) {
        None | Some(JSValue::Undefined) => String::new(),
        Some(value) => value.to_text(),
    }
}

/// Parse a JSON object into string pairs; non-string values keep their JSON form.
fn string_map(json: &str) -> Result<HashMap<String, String>, JSError> {
    if json.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let parsed: Value = serde_json::from_str(json)
        .map_err(|err| JSError::TypeError(format!("expected a JSON object: {err}")))?;
    let Value::Object(entries) = parsed else {
        return Err(JSError::TypeError(String::from("expected a JSON object")));
    };
    Ok(entries
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}

fn build_referrer(origin: String) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, _args: Vec<JSValue>| -> Result<JSValue, JSError> {
            Ok(JSValue::String(origin.clone()))
        },
    )
}

/// `style(selector, pseudo, property, property2)`; only selector and property are used.
fn build_style(host: Arc<dyn HostCapabilities>) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            let value = host.query(&text_arg(&args, 0), &text_arg(&args, 2));
            Ok(JSValue::String(value))
        },
    )
}

/// `xhr(method, uri, headersJson, body)` returning the request id.
fn build_xhr(host: Arc<dyn HostCapabilities>) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            let method = text_arg(&args, 0);
            let method = if method.is_empty() {
                String::from("GET")
            } else {
                method.to_ascii_uppercase()
            };
            let mut headers: Vec<(String, String)> =
                string_map(&text_arg(&args, 2))?.into_iter().collect();
            headers.sort();
            let request = NetRequest {
                method,
                uri: text_arg(&args, 1),
                headers,
                body: text_arg(&args, 3),
            };
            Ok(JSValue::Number(host.fetch(request) as f64))
        },
    )
}

/// `mutated(kind, target, tag, nodeJson)`.
fn build_mutated(host: Arc<dyn HostCapabilities>) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            let code = match args.first() {
                Some(JSValue::Number(code)) => *code as i64,
                Some(other) => other.to_text().parse::<i64>().unwrap_or_default(),
                None => 0,
            };
            let kind = MutationKind::try_from(code)
                .map_err(|bad| JSError::TypeError(format!("unknown mutation kind {bad}")))?;
            let attributes = string_map(&text_arg(&args, 3))?;
            let kept =
                host.report_mutation(kind, &text_arg(&args, 1), &text_arg(&args, 2), attributes);
            Ok(JSValue::Boolean(kept))
        },
    )
}

fn build_btoa(host: Arc<dyn HostCapabilities>) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            Ok(JSValue::String(host.encode(&text_arg(&args, 0))))
        },
    )
}

fn build_load(host: Arc<dyn HostCapabilities>) -> Arc<HostFnSync> {
    Arc::new(
        move |_context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
            host.load(&text_arg(&args, 0))
                .map(JSValue::String)
                .map_err(|err| JSError::InternalError(err.to_string()))
        },
    )
}

/// Build the `opossum` namespace over `host`.
pub fn build_host_namespace(
    host: &Arc<dyn HostCapabilities>,
    html: &str,
    origin: &str,
) -> HostNamespace {
    HostNamespace::new()
        .with_property("html", JSValue::String(html.to_owned()))
        .with_property("origin", JSValue::String(origin.to_owned()))
        .with_sync_fn("referrer", build_referrer(origin.to_owned()))
        .with_sync_fn("style", build_style(Arc::clone(host)))
        .with_sync_fn("xhr", build_xhr(Arc::clone(host)))
        .with_sync_fn("mutated", build_mutated(Arc::clone(host)))
        .with_sync_fn("btoa", build_btoa(Arc::clone(host)))
        .with_sync_fn("load", build_load(Arc::clone(host)))
}

/// Host object plus `console`: the complete set of globals a session installs.
pub fn build_host_bindings(host: &Arc<dyn HostCapabilities>, html: &str, origin: &str) -> HostBindings {
    HostBindings::new()
        .with_namespace("console", build_console_namespace())
        .with_namespace(HOST_OBJECT, build_host_namespace(host, html, origin))
}
