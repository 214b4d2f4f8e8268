//! Lexical Index Manager (C7): supervises an external subprocess that
//! owns an on-disk lexical index over the project tree.

use anyhow::{ensure, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineMatch {
    pub line_number: u32,
    pub line: String,
    pub match_ranges: Option<Vec<(u32, u32)>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMatch {
    pub file_name: String,
    pub repository: String,
    pub branches: Option<Vec<String>>,
    pub line_matches: Vec<LineMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResponse {
    pub matches: Vec<FileMatch>,
    pub error: Option<String>,
}

pub struct LexicalIndexManager {
    port: u16,
    index_dir: PathBuf,
    binary_dir: PathBuf,
    health_poll_timeout: Duration,
    reindex_min_interval: Duration,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
    last_reindex: Mutex<Option<Instant>>,
}

impl LexicalIndexManager {
    pub fn new(port: u16, index_dir: PathBuf, binary_dir: PathBuf, health_poll_timeout: Duration, reindex_min_interval: Duration) -> Self {
        Self {
            port,
            index_dir,
            binary_dir,
            health_poll_timeout,
            reindex_min_interval,
            http: reqwest::Client::new(),
            child: Mutex::new(None),
            last_reindex: Mutex::new(None),
        }
    }

    fn port_is_free(port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }

    fn locate_binary(&self, name: &str) -> Result<PathBuf> {
        let candidate = self.binary_dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        std::env::var_os("PATH")
            .into_iter()
            .flat_map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
            .with_context(|| format!("could not locate '{name}' in {:?} or on PATH", self.binary_dir))
    }

    /// Starts the subprocess bound to `127.0.0.1:<port>`, polling
    /// `/healthz` with exponential backoff until it answers or the
    /// bounded timeout elapses.
    pub async fn start(&self) -> Result<()> {
        ensure!(Self::port_is_free(self.port), "port {} is already in use", self.port);
        std::fs::create_dir_all(&self.index_dir)?;

        let binary = self.locate_binary("lexical-index-server")?;
        let child = Command::new(binary)
            .arg("--port")
            .arg(self.port.to_string())
            .arg("--index-dir")
            .arg(&self.index_dir)
            .kill_on_drop(true)
            .spawn()
            .context("spawning lexical index subprocess")?;
        *self.child.lock().await = Some(child);

        self.wait_for_ready().await
    }

    async fn wait_for_ready(&self) -> Result<()> {
        let deadline = Instant::now() + self.health_poll_timeout;
        let mut backoff = Duration::from_millis(50);
        loop {
            let url = format!("http://127.0.0.1:{}/healthz", self.port);
            if let Ok(resp) = self.http.get(&url).timeout(Duration::from_secs(2)).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                anyhow::bail!("lexical index did not become healthy within {:?}", self.health_poll_timeout);
            }
            let jitter = backoff.mul_f64(rand::thread_rng().gen_range(0.0..0.3));
            tokio::time::sleep(backoff + jitter).await;
            backoff = (backoff * 2).min(Duration::from_secs(2));
        }
    }

    /// Sends a graceful-terminate signal and clears the cached handle.
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            child.start_kill().ok();
            let _ = child.wait().await;
        }
        Ok(())
    }

    /// Debounced reindex: calls are no-ops inside the minimum spacing
    /// window. A non-zero exit from the build binary is treated as
    /// non-fatal — the prior index is kept.
    pub async fn reindex(&self, repo_root: &Path) -> Result<()> {
        let mut last = self.last_reindex.lock().await;
        if let Some(previous) = *last {
            if previous.elapsed() < self.reindex_min_interval {
                return Ok(());
            }
        }
        *last = Some(Instant::now());
        drop(last);

        let binary = self.locate_binary("lexical-index-build")?;
        let output = Command::new(binary)
            .arg(&self.index_dir)
            .arg(repo_root)
            .output()
            .await
            .context("running lexical-index-build")?;

        if !output.status.success() {
            tracing::warn!(
                status = ?output.status,
                "lexical index rebuild failed, keeping previous index"
            );
        }
        Ok(())
    }

    /// Never throws: if the subprocess is not running, returns an
    /// empty result set with an `error` string.
    pub async fn search(&self, query: &str, num: usize, file_glob: Option<&str>) -> SearchResponse {
        if self.child.lock().await.is_none() {
            return SearchResponse {
                matches: Vec::new(),
                error: Some("lexical index subprocess is not running".to_string()),
            };
        }

        let mut url = format!(
            "http://127.0.0.1:{}/search?q={}&format=json&num={num}",
            self.port,
            urlencoding_minimal(query)
        );
        if let Some(glob) = file_glob {
            url.push_str(&format!("&f={}", urlencoding_minimal(glob)));
        }

        match self.http.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) => match resp.json::<SearchResponse>().await {
                Ok(body) => body,
                Err(e) => SearchResponse {
                    matches: Vec::new(),
                    error: Some(format!("malformed response from lexical index: {e}")),
                },
            },
            Err(e) => SearchResponse {
                matches: Vec::new(),
                error: Some(format!("lexical index request failed: {e}")),
            },
        }
    }
}

fn urlencoding_minimal(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => "%20".to_string(),
            '"' => "%22".to_string(),
            '&' => "%26".to_string(),
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_without_running_subprocess_returns_empty_with_error() {
        let manager = LexicalIndexManager::new(
            0,
            PathBuf::from("/tmp/does-not-matter"),
            PathBuf::from("."),
            Duration::from_millis(10),
            Duration::from_secs(30),
        );
        let response = manager.search("needle", 10, None).await;
        assert!(response.matches.is_empty());
        assert!(response.error.is_some());
    }

    #[test]
    fn minimal_urlencoding_escapes_reserved_characters() {
        assert_eq!(urlencoding_minimal("a b"), "a%20b");
        assert_eq!(urlencoding_minimal("q&x"), "q%26x");
    }
}
