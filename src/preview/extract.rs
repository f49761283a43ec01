//! Image reference extraction.
//!
//! A block is previewable only when it holds exactly one `![alt](target)`
//! reference. Two or more references make the block ambiguous and it is
//! skipped entirely.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::image::{clean_path, resolve_path};

static IMAGE_REF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").ok());

/// Raw target of the single image reference in `text`.
pub fn extract_url(text: &str) -> Option<&str> {
    let mut captures = IMAGE_REF.as_ref()?.captures_iter(text);
    let first = captures.next()?;
    if captures.next().is_some() {
        return None;
    }
    first.get(1).map(|m| m.as_str())
}

/// Turns reference targets into locators relative to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorResolver {
    base_dir: PathBuf,
}

impl LocatorResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Locator of the single image referenced by `text`.
    ///
    /// Targets naming an existing local entry become cleaned absolute paths.
    /// Anything else is kept as a URL string, normalized when it parses.
    pub fn extract_locator(&self, text: &str) -> Option<String> {
        let target = extract_url(text)?;
        let candidate = resolve_path(&self.base_dir, target);
        if candidate.exists() {
            return Some(clean_path(&candidate).to_string_lossy().into_owned());
        }
        Some(Url::parse(target).map_or_else(|_| target.to_string(), String::from))
    }
}
