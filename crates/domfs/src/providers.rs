//! Concrete providers wired into sessions by the binary.

use anyhow::{Context as _, anyhow};
use dom_session::{NetFuture, NetRequest, NetResponse, NetworkProvider, StyleProvider};
use log::trace;
use reqwest::{Client, Method};
use std::fs;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Performs guest requests over HTTP, resolving rooted URIs against `base`.
pub struct HttpNetworkProvider {
    client: Client,
    base: Url,
}

impl HttpNetworkProvider {
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
        }
    }

    /// Absolute URL for `uri`; rooted and relative URIs are joined to the base.
    ///
    /// # Errors
    /// Returns an error if the joined URL is invalid.
    pub fn resolve(&self, uri: &str) -> anyhow::Result<Url> {
        if uri.starts_with("http") {
            return Url::parse(uri).with_context(|| format!("parse {uri}"));
        }
        self.base
            .join(uri)
            .with_context(|| format!("join {uri} onto {}", self.base))
    }
}

impl NetworkProvider for HttpNetworkProvider {
    fn fetch(&self, request: NetRequest) -> NetFuture<'_> {
        Box::pin(async move {
            let url = self.resolve(&request.uri)?;
            let method_upper = request.method.to_ascii_uppercase();
            let mut req = self.client.request(
                Method::from_bytes(method_upper.as_bytes()).unwrap_or(Method::GET),
                url.clone(),
            );
            for (name, value) in &request.headers {
                req = req.header(name, value);
            }
            if !request.body.is_empty() {
                req = req.body(request.body);
            }
            let resp = req
                .send()
                .await
                .map_err(|err| anyhow!("Failed to fetch URL {url}: {err}"))?;
            let status = resp.status().as_u16();
            trace!("{method_upper} {url}: {status}");
            let body = resp.text().await?;
            Ok(NetResponse { status, body })
        })
    }
}

/// Reads computed styles from `<root>/<selector>/style/<property>`.
///
/// Selectors are document paths such as `/0/2`; they are resolved below the
/// root, never against the filesystem root.
pub struct FileStyleProvider {
    root: PathBuf,
}

impl FileStyleProvider {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn style_file(&self, selector: &str, property: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(selector.trim_start_matches('/'))
            .join("style")
            .join(property);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(anyhow!("selector {selector:?} escapes the style root"));
        }
        Ok(self.root.join(relative))
    }
}

impl StyleProvider for FileStyleProvider {
    fn query(&self, selector: &str, property: &str) -> anyhow::Result<String> {
        let path = self.style_file(selector, property)?;
        fs::read_to_string(&path).with_context(|| format!("open {}", path.display()))
    }
}
