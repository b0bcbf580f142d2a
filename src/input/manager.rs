//! Input manager for reading source documents from disk
//!
//! The master document and job posting are plain structured text. Files are
//! read as-is: the splitter's grounding checks need byte-level fidelity, so
//! no markup stripping or re-encoding happens here.

use crate::error::{CvTailorError, Result};
use log::info;
use std::collections::HashMap;
use std::path::Path;

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

pub struct InputManager {
    cache: HashMap<String, String>,
    enable_cache: bool,
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            enable_cache: true,
        }
    }

    pub fn with_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub async fn read_text(&mut self, path: &Path) -> Result<String> {
        let path_str = path.to_string_lossy().to_string();

        if self.enable_cache {
            if let Some(cached) = self.cache.get(&path_str) {
                info!("Using cached text for: {}", path.display());
                return Ok(cached.clone());
            }
        }

        if !path.exists() {
            return Err(CvTailorError::InvalidInput(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .ok_or_else(|| {
                CvTailorError::InvalidInput(format!("File has no extension: {}", path.display()))
            })?;

        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(CvTailorError::UnsupportedFormat(format!(
                "Unsupported file type .{} for: {}",
                extension,
                path.display()
            )));
        }

        info!("Reading text file: {}", path.display());
        let text = tokio::fs::read_to_string(path).await?;

        if self.enable_cache {
            self.cache.insert(path_str, text.clone());
        }

        Ok(text)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}
