// src/watchlist.rs
//! Ordered set of tickers persisted one per line in a flat file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::ingest::types::normalize_ticker;

pub const ENV_WATCHLIST_PATH: &str = "WATCHLIST_PATH";
pub const DEFAULT_WATCHLIST_PATH: &str = "my_watchlist.txt";

#[derive(Debug, Clone, Serialize)]
pub struct Watchlist {
    #[serde(skip)]
    path: PathBuf,
    tickers: Vec<String>,
}

impl Watchlist {
    /// `$WATCHLIST_PATH` or `my_watchlist.txt`.
    pub fn default_path() -> PathBuf {
        std::env::var(ENV_WATCHLIST_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_WATCHLIST_PATH))
    }

    /// Missing file is an empty list. Blank lines are skipped, entries are
    /// uppercased and deduplicated keeping first occurrence.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut wl = Self {
            path,
            tickers: Vec::new(),
        };
        if !wl.path.exists() {
            return Ok(wl);
        }
        let content = fs::read_to_string(&wl.path)
            .with_context(|| format!("reading watchlist {}", wl.path.display()))?;
        for line in content.lines() {
            let t = line.trim();
            if t.is_empty() {
                continue;
            }
            let t = t.to_ascii_uppercase();
            if !wl.tickers.contains(&t) {
                wl.tickers.push(t);
            }
        }
        Ok(wl)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        let t = ticker.trim();
        self.tickers.iter().any(|x| x.eq_ignore_ascii_case(t))
    }

    /// Appends; `Ok(false)` if already present.
    pub fn add(&mut self, ticker: &str) -> Result<bool> {
        let t = normalize_ticker(ticker)
            .with_context(|| format!("invalid ticker {ticker:?}"))?;
        if self.tickers.contains(&t) {
            return Ok(false);
        }
        self.tickers.push(t);
        Ok(true)
    }

    /// `false` if it was not listed.
    pub fn remove(&mut self, ticker: &str) -> bool {
        let before = self.tickers.len();
        let t = ticker.trim();
        self.tickers.retain(|x| !x.eq_ignore_ascii_case(t));
        self.tickers.len() != before
    }

    /// Write tmp then rename over the target.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("txt.tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        for t in &self.tickers {
            writeln!(f, "{t}")?;
        }
        f.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
