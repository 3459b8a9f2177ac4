use crate::providers::{FileStyleProvider, HttpNetworkProvider};
use anyhow::{Context as _, anyhow};
use dom_session::{
    ControlServer, EngineFactory, NoStyles, Providers, SeedDocument, SessionConfig, StyleProvider,
};
use js::JsEngine;
use js_engine_v8::V8Engine;
use log::{error, info};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::runtime::Runtime;
use url::Url;

mod providers;

const USAGE: &str = "usage: domfs [-s socket] [-b base-url] [-m style-root] [-h htmlfile] jsfile...";

/// Command line of the binary.
#[derive(Debug, PartialEq, Eq)]
struct Args {
    socket: PathBuf,
    base: String,
    style_root: Option<PathBuf>,
    html: Option<PathBuf>,
    scripts: Vec<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("domfs.ctl"),
            base: String::from("http://localhost/"),
            style_root: None,
            html: None,
            scripts: Vec::new(),
        }
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{flag} needs a value"));
        match arg.as_str() {
            "-s" => parsed.socket = PathBuf::from(value("-s")?),
            "-b" => parsed.base = value("-b")?,
            "-m" => parsed.style_root = Some(PathBuf::from(value("-m")?)),
            "-h" => parsed.html = Some(PathBuf::from(value("-h")?)),
            flag if flag.starts_with('-') => return Err(anyhow!("unknown flag {flag}")),
            _ => parsed.scripts.push(PathBuf::from(&arg)),
        }
    }
    Ok(parsed)
}

fn v8_factory() -> EngineFactory {
    Arc::new(|| -> anyhow::Result<Box<dyn JsEngine>> { Ok(Box::new(V8Engine::new()?)) })
}

fn providers(args: &Args) -> anyhow::Result<Providers> {
    let base = Url::parse(&args.base).with_context(|| format!("base url {}", args.base))?;
    let style: Arc<dyn StyleProvider> = match &args.style_root {
        Some(root) => Arc::new(FileStyleProvider::new(root.clone())),
        None => Arc::new(NoStyles),
    };
    Ok(Providers {
        network: Arc::new(HttpNetworkProvider::new(base)),
        style,
    })
}

/// Bind the control socket and serve one command per connection.
async fn serve(socket: &Path, server: Arc<ControlServer>) -> anyhow::Result<()> {
    if socket.exists() {
        fs::remove_file(socket)
            .with_context(|| format!("remove stale socket {}", socket.display()))?;
    }
    let listener =
        UnixListener::bind(socket).with_context(|| format!("bind {}", socket.display()))?;
    info!("serving control on {}", socket.display());
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _addr)) => stream,
            Err(err) => {
                error!("accept: {err}");
                continue;
            }
        };
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let (read, write) = stream.into_split();
            if let Err(err) = server.handle(BufReader::new(read), write).await {
                error!("ctl: {err:#}");
            }
        });
    }
}

pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            error!("{err}");
            error!("{USAGE}");
            process::exit(1);
        }
    };

    let seed = SeedDocument::load(args.html.as_deref(), &args.scripts)?;
    let server = Arc::new(ControlServer::new(
        seed,
        SessionConfig::from_env(),
        providers(&args)?,
        v8_factory(),
    ));

    let runtime = Runtime::new()?;
    runtime.block_on(serve(&args.socket, server))
}
