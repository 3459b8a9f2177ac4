//! Change tracker: drains the mutation queue until the document settles.

use crate::bridge::NetworkBridge;
use crate::coordinator::Coordinator;
use crate::error::SessionError;
use crate::mutation::Mutation;
use crate::transpile::transpile;
use core::time::Duration;
use log::{debug, info, warn};
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

/// Serializes the settled document.
pub(crate) const SERIALIZE_DOCUMENT: &str = "document.querySelector('html').innerHTML;";

/// Consumer half of the mutation queue plus the last settled output.
pub struct ChangeTracker {
    mutations: Receiver<Mutation>,
    quiescence: Duration,
    last_output: String,
}

impl ChangeTracker {
    pub(crate) fn new(mutations: Receiver<Mutation>, quiescence: Duration) -> Self {
        Self {
            mutations,
            quiescence,
            last_output: String::new(),
        }
    }

    /// HTML produced by the most recent settlement that saw changes.
    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    /// Drain mutations until none arrives within the quiescence window.
    ///
    /// Inserted script elements are run as follow-up scripts. Returns the
    /// serialized document when anything changed.
    ///
    /// # Errors
    /// Only the final serialization can fail; follow-up failures are logged.
    pub(crate) async fn track(
        &mut self,
        coordinator: &Coordinator,
        network: &NetworkBridge,
        transpiler: Option<&str>,
    ) -> Result<Option<String>, SessionError> {
        let mut changed = false;
        let mut drained = 0_usize;
        loop {
            let mutation = match timeout(self.quiescence, self.mutations.recv()).await {
                Ok(Some(mutation)) => mutation,
                Ok(None) => {
                    debug!("mutation queue closed");
                    break;
                }
                Err(_) => break,
            };
            changed = true;
            drained += 1;
            if mutation.is_script() {
                run_follow_up(&mutation, coordinator, network, transpiler).await;
            }
        }
        debug!("settled after {drained} mutations (changed = {changed})");

        if !changed {
            return Ok(None);
        }
        let html = coordinator.exec(SERIALIZE_DOCUMENT, false).await?;
        self.last_output.clone_from(&html);
        Ok(Some(html))
    }
}

async fn run_follow_up(
    mutation: &Mutation,
    coordinator: &Coordinator,
    network: &NetworkBridge,
    transpiler: Option<&str>,
) {
    let (label, source) = if let Some(src) = mutation.attributes.get("src") {
        info!("<script> GET {src}");
        let body = network.fetch_text(src).await.unwrap_or_else(|err| {
            warn!("xhr {src}: {err}");
            String::new()
        });
        (src.as_str(), body)
    } else if let Some(inner) = mutation.attributes.get("innerHTML") {
        ("inline script", inner.clone())
    } else {
        return;
    };
    if source.trim().is_empty() {
        return;
    }

    let source = match transpiler {
        Some(command) => match transpile(command, &source, coordinator.timeout()).await {
            Ok(rewritten) => rewritten,
            Err(err) => {
                warn!("exec {label}: {err}");
                return;
            }
        },
        None => source,
    };
    if let Err(err) = coordinator.exec(&source, false).await {
        if err.is_interrupt() {
            warn!("follow-up {label} abandoned: {err}");
        } else {
            warn!("exec {label}: {err}");
        }
    }
}
