use log::{trace, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::read_to_string;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Failure to resolve a library specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Nothing loadable lives at the specifier (missing, directory, not `.js`, escapes the root).
    NotFound(String),
    /// The file exists but could not be read.
    Io(String),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NotFound(specifier) => write!(f, "module does not exist: {specifier}"),
            Self::Io(message) => write!(f, "module read failed: {message}"),
        }
    }
}

impl Error for LoadError {}

/// Supplies script library sources to the guest `require()`.
pub trait SourceLoader: Send + Sync {
    /// Load the source text for a normalized, root-relative specifier.
    ///
    /// # Errors
    /// Returns [`LoadError::NotFound`] for specifiers the loader refuses to serve.
    fn load(&self, specifier: &str) -> Result<String, LoadError>;
}

/// Serves `.js` files below a single library directory.
pub struct DirectoryLoader {
    /// Directory every specifier is resolved against.
    root: PathBuf,
    /// Cache of loaded sources by resolved path.
    cache: Mutex<HashMap<PathBuf, String>>,
}

impl DirectoryLoader {
    #[inline]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Map a specifier onto a file below the root, refusing anything that
    /// could escape it.
    fn resolve(&self, specifier: &str) -> Option<PathBuf> {
        let trimmed = specifier.trim().trim_start_matches("./");
        if trimmed.is_empty() {
            return None;
        }
        let relative = Path::new(trimmed);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }
        let with_suffix = if trimmed.ends_with(".js") {
            relative.to_path_buf()
        } else {
            PathBuf::from(format!("{trimmed}.js"))
        };
        Some(self.root.join(with_suffix))
    }
}

impl SourceLoader for DirectoryLoader {
    fn load(&self, specifier: &str) -> Result<String, LoadError> {
        let path = self
            .resolve(specifier)
            .ok_or_else(|| LoadError::NotFound(specifier.to_owned()))?;
        if let Ok(cache) = self.cache.lock()
            && let Some(source) = cache.get(&path)
        {
            return Ok(source.clone());
        }
        if path.is_dir() {
            return Err(LoadError::NotFound(specifier.to_owned()));
        }
        let source = match read_to_string(&path) {
            Ok(source) => source,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(LoadError::NotFound(specifier.to_owned()));
            }
            Err(error) => {
                warn!("DirectoryLoader: reading {}: {error}", path.display());
                return Err(LoadError::Io(error.to_string()));
            }
        };
        trace!("DirectoryLoader: loaded {} ({} bytes)", path.display(), source.len());
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(path, source.clone());
        }
        Ok(source)
    }
}

/// Loader used when no library directory is configured.
pub struct NoLibrary;

impl SourceLoader for NoLibrary {
    fn load(&self, specifier: &str) -> Result<String, LoadError> {
        Err(LoadError::NotFound(specifier.to_owned()))
    }
}
