use std::ops::Range;
use std::path::PathBuf;

use rand::seq::SliceRandom;

/// Enumerates the tokens a catalog is rebuilt from.
#[tonic::async_trait]
pub trait TokenSource: Send + Sync {
    /// List every token currently available. I/O errors propagate as-is.
    async fn scan(&self) -> std::io::Result<Vec<String>>;
}

/// Uses the names of the regular files in one directory as tokens.
///
/// Sub-directories and names that are not valid UTF-8 are skipped. Names are
/// returned sorted so that two scans of an unchanged directory produce the
/// same catalog order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[tonic::async_trait]
impl TokenSource for DirectorySource {
    async fn scan(&self) -> std::io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut tokens = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => tokens.push(name),
                Err(raw) => {
                    tracing::warn!(name = ?raw, dir = %self.dir.display(), "Skipping non-UTF-8 file name");
                }
            }
        }

        tokens.sort();
        Ok(tokens)
    }
}

/// Serves a fixed list of tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    tokens: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[tonic::async_trait]
impl TokenSource for StaticSource {
    async fn scan(&self) -> std::io::Result<Vec<String>> {
        Ok(self.tokens.clone())
    }
}

/// Ordered, index-addressable sequence of tokens leases are carved from.
#[derive(Debug, Default, Clone)]
pub struct TokenCatalog {
    tokens: Vec<String>,
}

impl TokenCatalog {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// Replace the whole catalog. Returns the new token count.
    pub fn replace(&mut self, tokens: Vec<String>) -> usize {
        self.tokens = tokens;
        self.tokens.len()
    }

    /// Permute the catalog in place (Fisher-Yates). Returns the token count.
    pub fn shuffle(&mut self) -> usize {
        self.tokens.shuffle(&mut rand::thread_rng());
        self.tokens.len()
    }

    /// Tokens covered by `range`, or `None` if it reaches past the end.
    pub fn slice(&self, range: Range<usize>) -> Option<&[String]> {
        self.tokens.get(range)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.tokens.clone()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
