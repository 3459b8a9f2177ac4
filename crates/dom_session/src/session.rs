use crate::bridge::{NetworkBridge, Providers, StyleBridge};
use crate::config::SessionConfig;
use crate::coordinator::{Coordinator, EngineFactory, JobQueue};
use crate::error::SessionError;
use crate::events::{CLICK_FUNCTION, PUT_ATTR_FUNCTION};
use crate::host::{HostCapabilities, SessionHost, build_host_bindings};
use crate::mutation::MutationCollector;
use crate::path::{list_expression, read_expression, write_function};
use crate::tracker::ChangeTracker;
use core::sync::atomic::{AtomicU64, Ordering};
use js::{ConsoleLogger, DirectoryLoader, HostContext, JSValue, NoLibrary, SourceLoader};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Fires the ready-state transition so `ready` handlers run.
const CLOSE_DOCUMENT: &str = "if (this.document) document.close();";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One live runtime plus its document state.
///
/// Not meant for concurrent use: callers serialize access (see
/// [`crate::ControlServer`]).
pub struct Session {
    id: u64,
    config: SessionConfig,
    coordinator: Coordinator,
    network: Arc<NetworkBridge>,
    tracker: ChangeTracker,
}

impl Session {
    /// Create the execution thread and engine for a document seeded with `html`.
    ///
    /// # Errors
    /// [`SessionError::Configuration`] if no tokio runtime is available or
    /// the engine cannot be created; no session is left behind.
    pub async fn new(
        html: &str,
        config: SessionConfig,
        providers: Providers,
        factory: EngineFactory,
    ) -> Result<Self, SessionError> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let runtime = Handle::try_current()
            .map_err(|err| SessionError::Configuration(format!("tokio runtime: {err}")))?;
        let (queue, jobs) = JobQueue::new();
        let (mutations, receiver) = MutationCollector::new();
        let network = Arc::new(NetworkBridge::new(providers.network, runtime, queue.clone()));
        let loader: Arc<dyn SourceLoader> = match &config.library_dir {
            Some(dir) => Arc::new(DirectoryLoader::new(dir.clone())),
            None => Arc::new(NoLibrary),
        };
        let host: Arc<dyn HostCapabilities> = Arc::new(SessionHost {
            style: StyleBridge::new(providers.style),
            network: Arc::clone(&network),
            mutations,
            loader,
        });
        let bindings = build_host_bindings(&host, html, &config.origin);
        let context = HostContext {
            session_id: id,
            logger: Arc::new(ConsoleLogger),
        };
        let coordinator =
            Coordinator::start(queue, jobs, factory, context, bindings, config.exec_timeout()).await?;
        info!("session {id} created");
        Ok(Self {
            id,
            tracker: ChangeTracker::new(receiver, config.quiescence()),
            config,
            coordinator,
            network,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run the seed scripts, close the document and wait for it to settle.
    ///
    /// The first script is the bootstrap. A halted script aborts the boot;
    /// other script errors are logged and the remaining scripts still run.
    ///
    /// # Errors
    /// [`SessionError::Interrupted`] from a halted script, or any failure of
    /// the ready-state transition or the final serialization.
    pub async fn boot(&mut self, scripts: &[String]) -> Result<Option<String>, SessionError> {
        if scripts.is_empty() {
            self.exec("", true).await?;
        }
        for (index, script) in scripts.iter().enumerate() {
            if let Err(err) = self.exec(script, index == 0).await {
                if err.is_interrupt() {
                    return Err(err);
                }
                error!("exec <script>: {err}");
            }
        }
        self.close_document().await?;
        let html = self.track_changes().await?;
        info!("session {}: boot changed = {}", self.id, html.is_some());
        Ok(html)
    }

    /// Evaluate a script; see [`Coordinator::exec`].
    ///
    /// # Errors
    /// Script errors and forced halts.
    pub async fn exec(&self, script: &str, bootstrap: bool) -> Result<String, SessionError> {
        self.coordinator.exec(script, bootstrap).await
    }

    /// Fire the ready-state transition of the document.
    ///
    /// # Errors
    /// Script errors and forced halts.
    pub async fn close_document(&self) -> Result<(), SessionError> {
        self.exec(CLOSE_DOCUMENT, false).await.map(drop)
    }

    /// Drain mutations until the document settles; see [`ChangeTracker`].
    ///
    /// # Errors
    /// Failure of the final serialization.
    pub async fn track_changes(&mut self) -> Result<Option<String>, SessionError> {
        self.tracker
            .track(
                &self.coordinator,
                &self.network,
                self.config.transpiler.as_deref(),
            )
            .await
    }

    /// HTML of the last settlement that saw changes.
    pub fn last_output(&self) -> &str {
        self.tracker.last_output()
    }

    /// Text form of the addressed property, or `""` on any failure.
    pub async fn retrieve(&self, path: &str) -> String {
        let expression = match read_expression(path) {
            Ok(expression) => expression,
            Err(err) => {
                warn!("doc path {path}: {err}");
                return String::new();
            }
        };
        match self.exec(&expression, false).await {
            Ok(value) => value,
            Err(err) => {
                warn!("exec {expression}: {err}");
                String::new()
            }
        }
    }

    /// Assign `value` to the addressed property.
    ///
    /// # Errors
    /// [`SessionError::Path`] without running any script, or the
    /// evaluation failure.
    pub async fn write(&self, path: &str, value: &str) -> Result<(), SessionError> {
        let function = write_function(path)?;
        debug!("write {path} ({} bytes)", value.len());
        self.coordinator
            .call(&function, vec![JSValue::String(value.to_owned())])
            .await
            .map(drop)
    }

    /// Entries below the addressed node: child indices, properties, `name()` methods.
    ///
    /// Fail-soft: errors are logged and yield no entries.
    pub async fn list(&self, path: &str) -> Vec<String> {
        let expression = match list_expression(path) {
            Ok(expression) => expression,
            Err(err) => {
                warn!("doc path {path}: {err}");
                return Vec::new();
            }
        };
        match self.exec(&expression, false).await {
            Ok(listing) if listing.is_empty() => Vec::new(),
            Ok(listing) => listing.split('\n').map(str::to_owned).collect(),
            Err(err) => {
                warn!("list {path}: {err}");
                Vec::new()
            }
        }
    }

    /// Click the first node matching `selector` and track the consequences.
    ///
    /// Returns the new HTML when something reacted and the document changed.
    ///
    /// # Errors
    /// Evaluation failures of the click script or the final serialization.
    pub async fn trigger_click(&mut self, selector: &str) -> Result<Option<String>, SessionError> {
        let acted = self
            .coordinator
            .call(CLICK_FUNCTION, vec![JSValue::String(selector.to_owned())])
            .await?;
        if !acted.is_true() {
            debug!("click {selector}: no action taken");
            return Ok(None);
        }
        self.track_changes().await
    }

    /// Set an attribute on the first node matching `selector`.
    ///
    /// # Errors
    /// Evaluation failures.
    pub async fn put_attr(
        &self,
        selector: &str,
        attribute: &str,
        value: &str,
    ) -> Result<bool, SessionError> {
        let args = [selector, attribute, value]
            .into_iter()
            .map(|arg| JSValue::String(arg.to_owned()))
            .collect();
        let found = self.coordinator.call(PUT_ATTR_FUNCTION, args).await?;
        Ok(found.is_true())
    }

    /// Shut the execution thread down.
    pub fn stop(self) {
        info!("session {} stopped", self.id);
        self.coordinator.shutdown();
    }
}
