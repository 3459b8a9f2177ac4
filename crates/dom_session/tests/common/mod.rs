//! Scripted engine and providers shared by the session tests.
//!
//! The fake engine understands one directive per line (`FAKE_*`), ignores
//! `//` comments and everything else, and recognizes the fixed host scripts
//! by their shape. Host functions installed through the bindings are called
//! exactly as a real engine would call them.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::anyhow;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::time::Duration;
use dom_session::{
    EngineFactory, NetFuture, NetRequest, NetResponse, NetworkProvider, NoStyles, Providers,
    SessionConfig,
};
use js::{
    HostBindings, HostContext, HostFnSync, InterruptHandle, JSValue, JsEngine, ScriptError,
    SourcePosition,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// What the fake engine saw, shared with the test.
#[derive(Default)]
pub struct Probe {
    pub installs: AtomicUsize,
    pub sources: Mutex<Vec<String>>,
    pub deliveries: Mutex<Vec<(String, String, String)>>,
}

impl Probe {
    pub fn evaluated(&self, needle: &str) -> bool {
        lock(&self.sources).iter().any(|source| source.contains(needle))
    }

    pub fn source_count(&self) -> usize {
        lock(&self.sources).len()
    }
}

#[derive(Default)]
struct FakeInterrupt {
    requested: AtomicBool,
}

impl InterruptHandle for FakeInterrupt {
    fn interrupt(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}

pub struct FakeEngine {
    probe: Arc<Probe>,
    interrupt: Arc<FakeInterrupt>,
    context: Option<HostContext>,
    host: HashMap<String, Arc<HostFnSync>>,
    body: String,
    props: HashMap<String, String>,
}

impl FakeEngine {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            interrupt: Arc::new(FakeInterrupt::default()),
            context: None,
            host: HashMap::new(),
            body: String::new(),
            props: HashMap::new(),
        }
    }

    fn host_call(&self, name: &str, args: Vec<JSValue>) -> Result<JSValue, ScriptError> {
        let (Some(context), Some(function)) = (self.context.as_ref(), self.host.get(name)) else {
            return Err(exception(&format!("ReferenceError: opossum.{name} is not defined"), 1));
        };
        function(context, args).map_err(|err| exception(&err.to_string(), 1))
    }

    fn mutated(&self, tag: &str, target: &str, attrs: &serde_json::Value) -> Result<JSValue, ScriptError> {
        self.host_call(
            "mutated",
            vec![
                JSValue::Number(6.0),
                JSValue::String(target.to_owned()),
                JSValue::String(tag.to_owned()),
                JSValue::String(attrs.to_string()),
            ],
        )
    }

    fn directive(&mut self, line: usize, text: &str, result: &mut JSValue) -> Result<(), ScriptError> {
        let (name, rest) = text.split_once(' ').unwrap_or((text, ""));
        match name {
            "FAKE_RESULT" => *result = JSValue::String(rest.to_owned()),
            "FAKE_THROW" => return Err(exception(rest, line)),
            "FAKE_SPIN" => {
                while !self.interrupt.requested.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
                return Err(ScriptError::Halted {
                    location: Some(SourcePosition { line, column: 1 }),
                });
            }
            "FAKE_SET_BODY" => {
                self.body = rest.to_owned();
                self.mutated("DIV", "undefined/0", &serde_json::json!({}))?;
            }
            "FAKE_INSERT_SCRIPT" => {
                self.mutated("SCRIPT", "/0/1", &serde_json::json!({ "innerHTML": rest }))?;
            }
            "FAKE_INSERT_REMOTE" => {
                self.mutated("script", "/0/1", &serde_json::json!({ "src": rest }))?;
            }
            "FAKE_MUTATE" => {
                let count: usize = rest.parse().unwrap_or_default();
                for index in 0..count {
                    self.mutated("P", &format!("/0/{index}"), &serde_json::json!({}))?;
                }
            }
            "FAKE_XHR" => {
                *result = self.host_call(
                    "xhr",
                    vec![
                        JSValue::String(String::from("get")),
                        JSValue::String(rest.to_owned()),
                        JSValue::String(String::from("{}")),
                        JSValue::String(String::new()),
                    ],
                )?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn exception(message: &str, line: usize) -> ScriptError {
    ScriptError::Exception {
        message: message.to_owned(),
        location: Some(SourcePosition { line, column: 1 }),
    }
}

fn text_arg(args: &[JSValue], index: usize) -> String {
    args.get(index).map(JSValue::to_text).unwrap_or_default()
}

impl JsEngine for FakeEngine {
    fn eval_script(&mut self, source: &str, _url: &str) -> Result<JSValue, ScriptError> {
        self.interrupt.requested.store(false, Ordering::SeqCst);
        lock(&self.probe.sources).push(source.to_owned());

        let trimmed = source.trim();
        if trimmed == "document.querySelector('html').innerHTML;" {
            return Ok(JSValue::String(self.body.clone()));
        }
        if trimmed.starts_with("document.getElementsByTagName('body')[0]") {
            return Ok(self
                .props
                .get(trimmed)
                .map_or(JSValue::Undefined, |value| JSValue::String(value.clone())));
        }
        if trimmed.contains("getOwnPropertyNames") {
            return Ok(JSValue::String(String::from("0\n1\nid\nclick()")));
        }

        let mut result = JSValue::Undefined;
        for (index, line) in source.lines().enumerate() {
            let text = line.trim();
            if text.starts_with("FAKE_") {
                self.directive(index + 1, text, &mut result)?;
            }
        }
        Ok(result)
    }

    fn call_function(
        &mut self,
        function_source: &str,
        args: Vec<JSValue>,
        _url: &str,
    ) -> Result<JSValue, ScriptError> {
        self.interrupt.requested.store(false, Ordering::SeqCst);
        lock(&self.probe.sources).push(function_source.to_owned());

        if function_source.contains("opossum.deliver") {
            let body = text_arg(&args, 1);
            lock(&self.probe.deliveries).push((text_arg(&args, 0), body.clone(), text_arg(&args, 2)));
            if body == "BOOM" {
                return Err(exception("Error: callback failed", 1));
            }
            return Ok(JSValue::Undefined);
        }
        if let Some(target) = function_source
            .strip_prefix("function (value) { ")
            .and_then(|rest| rest.strip_suffix(" = value; }"))
        {
            self.props.insert(target.to_owned(), text_arg(&args, 0));
            return Ok(JSValue::Undefined);
        }
        if function_source.contains("_listeners") {
            if text_arg(&args, 0) != "#go" {
                return Ok(JSValue::Null);
            }
            self.body = String::from("clicked");
            self.mutated("BUTTON", "/0/3", &serde_json::json!({}))?;
            return Ok(JSValue::Boolean(true));
        }
        if function_source.contains("setAttribute") {
            return Ok(JSValue::Boolean(text_arg(&args, 0) == "#go"));
        }
        Err(exception("TypeError: call target is not a function", 1))
    }

    fn install_bindings(&mut self, context: &HostContext, bindings: &HostBindings) -> anyhow::Result<()> {
        self.probe.installs.fetch_add(1, Ordering::SeqCst);
        let namespace = bindings
            .namespace("opossum")
            .ok_or_else(|| anyhow!("host object missing"))?;
        for name in namespace.functions.keys() {
            if let Some(function) = namespace.function(name) {
                self.host.insert(name.clone(), function);
            }
        }
        self.context = Some(context.clone());
        Ok(())
    }

    fn interrupt_handle(&self) -> Arc<dyn InterruptHandle> {
        Arc::clone(&self.interrupt) as Arc<dyn InterruptHandle>
    }

    fn run_jobs(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn fake_factory(probe: &Arc<Probe>) -> EngineFactory {
    let probe = Arc::clone(probe);
    Arc::new(move || Ok(Box::new(FakeEngine::new(Arc::clone(&probe))) as Box<dyn JsEngine>))
}

/// Network provider answering from a fixed table of rooted URIs.
#[derive(Default)]
pub struct StaticNetwork {
    pub responses: HashMap<String, String>,
    pub requests: Mutex<Vec<NetRequest>>,
}

impl NetworkProvider for StaticNetwork {
    fn fetch(&self, request: NetRequest) -> NetFuture<'_> {
        Box::pin(async move {
            lock(&self.requests).push(request.clone());
            let body = self
                .responses
                .get(&request.uri)
                .cloned()
                .ok_or_else(|| anyhow!("404 {}", request.uri))?;
            Ok(NetResponse { status: 200, body })
        })
    }
}

pub fn providers(network: Arc<StaticNetwork>) -> Providers {
    Providers {
        network,
        style: Arc::new(NoStyles),
    }
}

/// Short timings so settlement and interrupts happen quickly.
pub fn quick_config() -> SessionConfig {
    SessionConfig::new(300, 100)
}
