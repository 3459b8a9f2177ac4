//! V8 JavaScript engine implementation.

use crate::bindings::install_bindings_impl;
use crate::conversions::{jsvalue_to_local, local_to_jsvalue};
use anyhow::Result;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use js::{
    Console, HostBindings, HostContext, InterruptHandle, JSValue, JsEngine, ScriptError,
    SourcePosition,
};
use std::sync::{Arc, Once};
use v8::{
    Context, ContextScope, CreateParams, Function, Global, Isolate, IsolateHandle, Local,
    OwnedIsolate, Script, ScriptOrigin, String as V8String, V8, Value, new_default_platform,
};

/// Thread-safe termination handle for one isolate.
///
/// Termination is only requested while an evaluation is running, so a late
/// request cannot kill the evaluation that follows.
pub struct V8Interrupt {
    handle: IsolateHandle,
    running: AtomicBool,
}

impl V8Interrupt {
    fn begin(&self) {
        // Drop any termination that arrived after the previous run finished.
        let _cancelled: bool = self.handle.cancel_terminate_execution();
        self.running.store(true, Ordering::SeqCst);
    }

    fn end(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _cancelled: bool = self.handle.cancel_terminate_execution();
    }
}

impl InterruptHandle for V8Interrupt {
    fn interrupt(&self) {
        if self.running.load(Ordering::SeqCst) {
            let _requested: bool = self.handle.terminate_execution();
        }
    }
}

/// What a single guest entry point does once the context is entered.
enum Entry<'a> {
    Script(&'a str),
    Call(&'a str, Vec<JSValue>),
}

/// V8-backed engine, always compiled.
pub struct V8Engine {
    /// The owned isolate (Pin<Box> ensures it doesn't move in memory).
    /// Must be first so it's initialized before context.
    isolate: Pin<Box<OwnedIsolate>>,
    /// The current global V8 context.
    context: Global<Context>,
    /// Interrupt handle shared with other threads.
    interrupt: Arc<V8Interrupt>,
}

impl V8Engine {
    /// Create a new engine instance: initializes the V8 platform, isolate, and context.
    ///
    /// # Errors
    /// Returns an error if context initialization fails (unexpected).
    #[inline]
    pub fn new() -> Result<Self> {
        // Initialize V8 platform (singleton per-process).
        static START: Once = Once::new();
        START.call_once(|| {
            let platform = new_default_platform(0, false).make_shared();
            V8::initialize_platform(platform);
            V8::initialize();
        });

        // Pin<Box> ensures it doesn't move in memory (Global<Context> stores raw pointer to isolate)
        let mut isolate = Box::pin(Isolate::new(CreateParams::default()));
        let handle = isolate.thread_safe_handle();
        let context = {
            // SAFETY: We're pinning the isolate, so it's safe to create a mutable reference
            let isolate_mut = unsafe { isolate.as_mut().get_unchecked_mut() };
            v8::scope!(let scope, isolate_mut);
            let ctx: Local<Context> = Context::new(scope, Default::default());
            Global::new(scope, ctx)
        };
        Console::debug("V8Engine initialized");
        Ok(Self {
            isolate,
            context,
            interrupt: Arc::new(V8Interrupt {
                handle,
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Enter the isolate, run one guest entry point, and leave again.
    fn run_entry(&mut self, entry: Entry<'_>, url: &str) -> Result<JSValue, ScriptError> {
        // SAFETY: Isolate is pinned. We need to re-enter it because another isolate
        // might have been entered since this engine was created (multiple V8Engine instances)
        let isolate_mut = unsafe { self.isolate.as_mut().get_unchecked_mut() };
        unsafe { isolate_mut.enter() };

        self.interrupt.begin();
        let result = Self::run_entry_impl(isolate_mut, &self.context, entry, url);
        self.interrupt.end();

        // SAFETY: Exit the isolate after we're done using it
        unsafe { isolate_mut.exit() };

        result
    }

    fn run_entry_impl(
        isolate_mut: &mut Isolate,
        context: &Global<Context>,
        entry: Entry<'_>,
        url: &str,
    ) -> Result<JSValue, ScriptError> {
        v8::scope!(let scope, isolate_mut);

        let local_context: Local<Context> = Local::new(scope, context);
        let scope = &mut ContextScope::new(scope, local_context);

        v8::tc_scope!(let tc, scope);

        let (source, args) = match entry {
            Entry::Script(source) => (source.to_owned(), None),
            Entry::Call(function_source, args) => (format!("({function_source})"), Some(args)),
        };
        let code = V8String::new(tc, &source)
            .ok_or_else(|| ScriptError::Internal(String::from("alloc v8 string")))?;
        let name = V8String::new(tc, url)
            .ok_or_else(|| ScriptError::Internal(String::from("alloc v8 name")))?;
        let origin = ScriptOrigin::new(
            tc,
            name.into(),
            0,
            0,
            false,
            0,
            None,
            false,
            false,
            false,
            None,
        );

        let mut completion: Option<Local<Value>> =
            Script::compile(tc, code, Some(&origin)).and_then(|compiled| compiled.run(tc));

        if let (Some(value), Some(call_args)) = (completion, args) {
            let Ok(function) = Local::<Function>::try_from(value) else {
                return Err(ScriptError::Exception {
                    message: String::from("TypeError: call target is not a function"),
                    location: None,
                });
            };
            let argv: Vec<Local<Value>> = call_args
                .into_iter()
                .map(|arg| jsvalue_to_local(tc, arg))
                .collect();
            let receiver: Local<Value> = v8::undefined(tc).into();
            completion = function.call(tc, receiver, &argv);
        }

        if let Some(value) = completion {
            return Ok(local_to_jsvalue(tc, value));
        }

        let location = tc.message().and_then(|msg_obj| {
            msg_obj
                .get_line_number(tc)
                .map(|line| SourcePosition {
                    line,
                    column: msg_obj.get_start_column().saturating_add(1),
                })
        });
        if tc.has_terminated() {
            return Err(ScriptError::Halted { location });
        }
        if !tc.has_caught() {
            return Err(ScriptError::Internal(String::from("v8 failed")));
        }
        let exc_str = tc
            .exception()
            .and_then(|val| val.to_string(tc))
            .map_or_else(
                || String::from("Uncaught exception"),
                |val| val.to_rust_string_lossy(tc),
            );
        let stack = tc
            .stack_trace()
            .and_then(|val| val.to_string(tc))
            .map(|val| val.to_rust_string_lossy(tc));
        Console::exception(&exc_str, stack.as_deref());
        Err(ScriptError::Exception {
            message: exc_str,
            location,
        })
    }

    fn run_jobs_impl(isolate_mut: &mut Isolate, context: &Global<Context>) {
        v8::scope!(let scope, isolate_mut);

        let local_context: Local<Context> = Local::new(scope, context);
        let scope = &mut ContextScope::new(scope, local_context);

        v8::tc_scope!(let tc, scope);

        tc.perform_microtask_checkpoint();
    }
}

impl JsEngine for V8Engine {
    #[inline]
    fn eval_script(&mut self, source: &str, url: &str) -> Result<JSValue, ScriptError> {
        self.run_entry(Entry::Script(source), url)
    }

    #[inline]
    fn call_function(
        &mut self,
        function_source: &str,
        args: Vec<JSValue>,
        url: &str,
    ) -> Result<JSValue, ScriptError> {
        self.run_entry(Entry::Call(function_source, args), url)
    }

    /// Install host bindings (namespaces and functions) onto the global object.
    #[inline]
    fn install_bindings(&mut self, host_context: &HostContext, bindings: &HostBindings) -> Result<()> {
        // SAFETY: Isolate is pinned. We need to re-enter it because another isolate
        // might have been entered since this engine was created (multiple V8Engine instances)
        let isolate_mut = unsafe { self.isolate.as_mut().get_unchecked_mut() };
        unsafe { isolate_mut.enter() };

        let result = install_bindings_impl(isolate_mut, &self.context, host_context, bindings);

        // SAFETY: Exit the isolate after we're done using it
        unsafe { isolate_mut.exit() };

        result
    }

    #[inline]
    fn interrupt_handle(&self) -> Arc<dyn InterruptHandle> {
        Arc::clone(&self.interrupt) as Arc<dyn InterruptHandle>
    }

    #[inline]
    fn run_jobs(&mut self) -> Result<()> {
        // SAFETY: Isolate is pinned. We need to re-enter it because another isolate
        // might have been entered since this engine was created (multiple V8Engine instances)
        let isolate_mut = unsafe { self.isolate.as_mut().get_unchecked_mut() };
        unsafe { isolate_mut.enter() };

        self.interrupt.begin();
        Self::run_jobs_impl(isolate_mut, &self.context);
        self.interrupt.end();

        // SAFETY: Exit the isolate after we're done using it
        unsafe { isolate_mut.exit() };

        Ok(())
    }
}
