//! Source snippet cache
//!
//! One cache serves one result-retrieval pass. Each file is fetched at most
//! once; later lookups split the cached content again.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use scanpilot_core::Result;
use tracing::{debug, warn};

/// Fetches full source file content by path
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<String>;
}

/// Memoises source files for line lookups
pub struct SnippetCache<F> {
    fetcher: F,
    files: HashMap<String, String>,
    /// Paths whose fetch failed; not retried within the pass
    unavailable: HashSet<String>,
    fetches: u32,
}

impl<F: SourceFetcher> SnippetCache<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            files: HashMap::new(),
            unavailable: HashSet::new(),
            fetches: 0,
        }
    }

    /// Line `line` (1-based) of `path`, without its line terminator.
    ///
    /// Returns `Ok(None)` when the line is outside the file or the file was
    /// already found to be unavailable. A failed fetch is returned as an
    /// error once and then remembered.
    pub async fn get_line(&mut self, path: &str, line: u32) -> Result<Option<String>> {
        if line == 0 || self.unavailable.contains(path) {
            return Ok(None);
        }

        if !self.files.contains_key(path) {
            self.fetches += 1;
            match self.fetcher.fetch(path).await {
                Ok(content) => {
                    debug!("Cached source for {} ({} bytes)", path, content.len());
                    self.files.insert(path.to_string(), content);
                }
                Err(e) => {
                    warn!("Source for {} unavailable: {}", path, e);
                    self.unavailable.insert(path.to_string());
                    return Err(e);
                }
            }
        }

        Ok(self
            .files
            .get(path)
            .and_then(|content| content.lines().nth(line as usize - 1))
            .map(|l| l.trim_end_matches('\r').to_string()))
    }

    /// Number of fetches issued so far
    pub fn fetches(&self) -> u32 {
        self.fetches
    }

    pub fn cached_files(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanpilot_core::{Error, Phase};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingFetcher {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SourceFetcher for CountingFetcher {
        async fn fetch(&self, path: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match path {
                "app.js" => Ok(String::from("const a = 1;\r\nlet b = a;\r\nrender(b);\r\n")),
                _ => Err(Error::transport(Phase::ResultRetrieval, Some(404), "not found")),
            }
        }
    }

    fn cache() -> (SnippetCache<CountingFetcher>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = SnippetCache::new(CountingFetcher {
            calls: Arc::clone(&calls),
        });
        (cache, calls)
    }

    #[tokio::test]
    async fn test_fetches_each_file_once() {
        let (mut cache, calls) = cache();
        assert_eq!(
            cache.get_line("app.js", 2).await.unwrap(),
            Some(String::from("let b = a;"))
        );
        assert_eq!(
            cache.get_line("app.js", 3).await.unwrap(),
            Some(String::from("render(b);"))
        );
        assert_eq!(
            cache.get_line("app.js", 1).await.unwrap(),
            Some(String::from("const a = 1;"))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_files(), 1);
    }

    #[tokio::test]
    async fn test_line_out_of_range() {
        let (mut cache, _) = cache();
        assert_eq!(cache.get_line("app.js", 99).await.unwrap(), None);
        assert_eq!(cache.get_line("app.js", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_fetch_not_retried() {
        let (mut cache, calls) = cache();
        assert!(cache.get_line("gone.js", 1).await.is_err());
        assert_eq!(cache.get_line("gone.js", 2).await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.fetches(), 1);
    }
}
