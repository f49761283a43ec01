//! Locator to resource-name cache.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::editor::ResourceStore;
use crate::image::{decode_file, is_network_locator};

use super::download::DownloadCoordinator;

/// Maps each locator to the name of the resource registered for it.
///
/// Entries are never overwritten: the first successful decode of a locator
/// wins, whether it came from disk or from a download.
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<String, String>,
}

/// Resource name registered for a locator. Locators are unique per document,
/// so the locator itself serves as the name.
pub fn resource_name(locator: &str) -> String {
    locator.to_string()
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locator: &str) -> Option<&str> {
        self.entries.get(locator).map(String::as_str)
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.entries.contains_key(locator)
    }

    /// Record a resource for `locator`. Returns `false` and keeps the
    /// existing entry when the locator is already cached.
    pub fn insert(&mut self, locator: &str, resource: String) -> bool {
        match self.entries.entry(locator.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(resource);
                true
            }
        }
    }

    /// Register a decoded image and cache it, unless the locator is already
    /// cached.
    pub fn insert_decoded<S: ResourceStore + ?Sized>(
        &mut self,
        locator: &str,
        image: DynamicImage,
        store: &mut S,
    ) -> bool {
        if self.contains(locator) {
            return false;
        }
        let name = resource_name(locator);
        store.add_resource(&name, image);
        self.insert(locator, name)
    }

    /// Resource name for `locator`, decoding local files on first use.
    ///
    /// Network locators that are not cached yet get a download request and
    /// resolve to `None` until a later call after the download lands.
    pub fn resolve<S: ResourceStore + ?Sized>(
        &mut self,
        locator: &str,
        store: &mut S,
        downloads: &mut DownloadCoordinator,
    ) -> Option<String> {
        if let Some(name) = self.entries.get(locator) {
            return Some(name.clone());
        }

        let path = Path::new(locator);
        if path.exists() {
            return match decode_file(path) {
                Ok(image) => {
                    self.insert_decoded(locator, image, store);
                    debug!(locator, "cached local image");
                    self.entries.get(locator).cloned()
                }
                Err(err) => {
                    debug!(%err, "local image not previewable");
                    None
                }
            };
        }

        if is_network_locator(locator) {
            downloads.request(locator);
        }
        None
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
