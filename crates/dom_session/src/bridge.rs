//! Style and network bridges between guest script and external providers.

use crate::coordinator::JobQueue;
use crate::error::SessionError;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};
use log::{debug, trace, warn};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Request issued by guest script or by the change tracker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Provider answer. Only the body reaches guest callbacks.
#[derive(Clone, Debug, Default)]
pub struct NetResponse {
    pub status: u16,
    pub body: String,
}

// Reduce type complexity with an alias for provider futures
pub type NetFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<NetResponse>> + Send + 'a>>;

/// Performs HTTP-like requests on behalf of the session.
pub trait NetworkProvider: Send + Sync {
    /// Perform `request`. Relative URIs arrive already rooted (`/path`).
    fn fetch(&self, request: NetRequest) -> NetFuture<'_>;
}

/// Answers computed style queries.
pub trait StyleProvider: Send + Sync {
    /// Value of `property` for the node matched by `selector`.
    ///
    /// # Errors
    /// Any provider failure; the bridge logs it and answers `""`.
    fn query(&self, selector: &str, property: &str) -> anyhow::Result<String>;
}

/// Style provider for sessions without computed styles.
pub struct NoStyles;

impl StyleProvider for NoStyles {
    fn query(&self, _selector: &str, _property: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct Providers {
    pub network: Arc<dyn NetworkProvider>,
    pub style: Arc<dyn StyleProvider>,
}

/// Drop a leading `.` and root anything that is neither absolute nor rooted.
pub fn normalize_uri(uri: &str) -> String {
    let trimmed = uri.strip_prefix('.').unwrap_or(uri);
    if trimmed.starts_with("http") || trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Forwards style queries, failing soft.
pub struct StyleBridge {
    provider: Arc<dyn StyleProvider>,
}

impl StyleBridge {
    pub fn new(provider: Arc<dyn StyleProvider>) -> Self {
        Self { provider }
    }

    /// Query the provider; failures are logged and answered with `""`.
    pub fn query(&self, selector: &str, property: &str) -> String {
        trace!("style query: sel={selector}, prop={property}");
        self.provider
            .query(selector, property)
            .unwrap_or_else(|err| {
                warn!("query {selector}: {err:#}");
                String::new()
            })
    }
}

/// Dispatches guest requests off the execution thread and hands the
/// replies back to it.
pub struct NetworkBridge {
    provider: Arc<dyn NetworkProvider>,
    runtime: Handle,
    queue: JobQueue,
    next_id: AtomicU64,
}

impl NetworkBridge {
    pub(crate) fn new(provider: Arc<dyn NetworkProvider>, runtime: Handle, queue: JobQueue) -> Self {
        Self {
            provider,
            runtime,
            queue,
            next_id: AtomicU64::new(0),
        }
    }

    /// Start `request` and return the id its reply will be delivered under.
    ///
    /// Provider failures are delivered as the callback's error argument.
    pub fn dispatch(&self, mut request: NetRequest) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        request.uri = normalize_uri(&request.uri);
        debug!("xhr {id}: {} {}", request.method, request.uri);

        let provider = Arc::clone(&self.provider);
        let queue = self.queue.clone();
        self.runtime.spawn(async move {
            match provider.fetch(request).await {
                Ok(response) => {
                    trace!("xhr {id}: status {}", response.status);
                    queue.deliver(id, response.body, String::new());
                }
                Err(err) => {
                    warn!("xhr {id}: {err:#}");
                    queue.deliver(id, String::new(), format!("xhrq: {err:#}"));
                }
            }
        });
        id
    }

    /// GET `uri` directly, for subresources the tracker has to run.
    ///
    /// # Errors
    /// Returns [`SessionError::Network`] when the provider fails.
    pub async fn fetch_text(&self, uri: &str) -> Result<String, SessionError> {
        let request = NetRequest {
            method: String::from("GET"),
            uri: normalize_uri(uri),
            ..NetRequest::default()
        };
        self.provider
            .fetch(request)
            .await
            .map(|response| response.body)
            .map_err(|err| SessionError::Network(format!("{uri}: {err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_uris_are_rooted() {
        assert_eq!(normalize_uri("./app.js"), "/app.js");
        assert_eq!(normalize_uri("app.js"), "/app.js");
        assert_eq!(normalize_uri("/api/items"), "/api/items");
        assert_eq!(normalize_uri("https://cdn.test/lib.js"), "https://cdn.test/lib.js");
        assert_eq!(normalize_uri(".hidden"), "/hidden");
    }

    struct Failing;

    impl StyleProvider for Failing {
        fn query(&self, _selector: &str, _property: &str) -> anyhow::Result<String> {
            anyhow::bail!("no such file")
        }
    }

    #[test]
    fn style_failures_answer_empty() {
        let bridge = StyleBridge::new(Arc::new(Failing));
        assert_eq!(bridge.query("#a", "color"), "");
        assert_eq!(StyleBridge::new(Arc::new(NoStyles)).query("#a", "color"), "");
    }
}
