//! Line-oriented control protocol: `start`, `stop`, `click\n<selector>\n`.

use crate::bridge::Providers;
use crate::config::{SeedDocument, SessionConfig};
use crate::coordinator::EngineFactory;
use crate::error::SessionError;
use crate::session::Session;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::Mutex;

/// Owns the session slot shared by all control connections.
///
/// At most one control operation runs at a time; each connection carries
/// a single command.
pub struct ControlServer {
    session: Mutex<Option<Session>>,
    seed: SeedDocument,
    config: SessionConfig,
    providers: Providers,
    factory: EngineFactory,
}

impl ControlServer {
    pub fn new(
        seed: SeedDocument,
        config: SessionConfig,
        providers: Providers,
        factory: EngineFactory,
    ) -> Self {
        Self {
            session: Mutex::new(None),
            seed,
            config,
            providers,
            factory,
        }
    }

    /// Serve one command from `reader`, writing changed HTML to `writer`.
    ///
    /// Command failures are logged, never written back.
    ///
    /// # Errors
    /// Only I/O errors on the connection itself.
    pub async fn handle<R, W>(&self, mut reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut command = String::new();
        if reader.read_line(&mut command).await? == 0 {
            return Ok(());
        }

        let mut slot = self.session.lock().await;
        let html = match command.trim() {
            "start" => {
                if let Some(previous) = slot.take() {
                    previous.stop();
                }
                match self.start().await {
                    Ok((session, html)) => {
                        *slot = Some(session);
                        html
                    }
                    Err(err) => {
                        error!("start: {err}");
                        None
                    }
                }
            }
            "stop" => {
                if let Some(session) = slot.take() {
                    session.stop();
                }
                None
            }
            "click" => {
                let mut selector = String::new();
                reader.read_line(&mut selector).await?;
                let selector = selector.trim();
                match slot.as_mut() {
                    None => {
                        warn!("click {selector}: no session");
                        None
                    }
                    Some(session) => session.trigger_click(selector).await.unwrap_or_else(|err| {
                        error!("click {selector}: {err}");
                        None
                    }),
                }
            }
            other => {
                warn!("unknown cmd {other:?}");
                None
            }
        };
        drop(slot);

        info!("processJS: changed = {}", html.is_some());
        if let Some(html) = html {
            writer.write_all(html.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    async fn start(&self) -> Result<(Session, Option<String>), SessionError> {
        let mut session = Session::new(
            &self.seed.html,
            self.config.clone(),
            self.providers.clone(),
            Arc::clone(&self.factory),
        )
        .await?;
        match session.boot(&self.seed.scripts).await {
            Ok(html) => Ok((session, html)),
            Err(err) => {
                session.stop();
                Err(err)
            }
        }
    }
}
