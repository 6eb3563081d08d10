//! Local font library
//!
//! Font programs found on disk, looked up by the font name a span carries.
//! Supplies the font data for the first rung of the cascade.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::fonts::strip_subset_prefix;

/// Shortest normalized name accepted for a truncated-prefix match
const MIN_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct LibraryFont {
    /// Name the font program reports for itself, if readable
    pub postscript_name: Option<String>,
    pub path: Option<PathBuf>,
    data: Arc<[u8]>,
}

impl LibraryFont {
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, Default)]
pub struct FontLibrary {
    fonts: Vec<LibraryFont>,
    /// Normalized name -> index into `fonts`
    index: BTreeMap<String, usize>,
}

/// Lowercase alphanumerics of a font name, subset tag removed
pub fn normalize_name(name: &str) -> String {
    strip_subset_prefix(name)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FontLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Recursively load every `.ttf` / `.otf` file under `dir`.
    ///
    /// A missing or unreadable directory gives an empty library.
    pub fn scan(dir: &Path) -> Self {
        let mut library = Self::empty();
        if !dir.is_dir() {
            warn!("Font directory {} not found, font library is empty", dir.display());
            return library;
        }
        library.scan_dir(dir);
        info!(
            "Font library loaded {} fonts from {}",
            library.len(),
            dir.display()
        );
        library
    }

    fn scan_dir(&mut self, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read font directory {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan_dir(&path);
            } else if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if matches!(ext.as_str(), "ttf" | "otf") {
                    self.load_font_file(&path);
                }
            }
        }
    }

    fn load_font_file(&mut self, path: &Path) {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Skipping font {}: {}", path.display(), e);
                return;
            }
        };

        let face = match ttf_parser::Face::parse(&data, 0) {
            Ok(face) => face,
            Err(e) => {
                warn!("Skipping font {}: {}", path.display(), e);
                return;
            }
        };

        let mut names = Vec::new();
        let mut postscript_name = None;
        for name in face.names() {
            let is_postscript = name.name_id == ttf_parser::name_id::POST_SCRIPT_NAME;
            if !is_postscript && name.name_id != ttf_parser::name_id::FULL_NAME {
                continue;
            }
            if let Some(value) = name.to_string() {
                if is_postscript && postscript_name.is_none() {
                    postscript_name = Some(value.clone());
                }
                names.push(value);
            }
        }
        if let Some(stem) = path.file_stem() {
            names.push(stem.to_string_lossy().into_owned());
        }

        debug!("Indexed font {} as {:?}", path.display(), names);
        self.insert(
            &names,
            LibraryFont {
                postscript_name,
                path: Some(path.to_path_buf()),
                data: Arc::from(data),
            },
        );
    }

    /// Build a library from in-memory font programs keyed by name
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut library = Self::empty();
        for (name, data) in entries {
            library.insert(
                std::slice::from_ref(&name),
                LibraryFont {
                    postscript_name: Some(name.clone()),
                    path: None,
                    data: Arc::from(data),
                },
            );
        }
        library
    }

    fn insert(&mut self, names: &[String], font: LibraryFont) {
        let slot = self.fonts.len();
        let mut indexed = false;
        for name in names {
            let key = normalize_name(name);
            if key.is_empty() {
                continue;
            }
            // First font registered under a name keeps it
            self.index.entry(key).or_insert_with(|| {
                indexed = true;
                slot
            });
        }
        if indexed {
            self.fonts.push(font);
        }
    }

    /// Find the font for a span's font name.
    ///
    /// Exact normalized match first, then a library name that starts with
    /// the (possibly truncated) requested name.
    pub fn find(&self, font_name: &str) -> Option<&LibraryFont> {
        let key = normalize_name(font_name);
        if key.is_empty() {
            return None;
        }
        if let Some(&slot) = self.index.get(&key) {
            return self.fonts.get(slot);
        }
        if key.len() < MIN_PREFIX_LEN {
            return None;
        }
        self.index
            .range(key.clone()..)
            .take_while(|(name, _)| name.starts_with(&key))
            .min_by_key(|(name, _)| name.len())
            .and_then(|(_, &slot)| self.fonts.get(slot))
    }

    pub fn font_data(&self, font_name: &str) -> Option<&[u8]> {
        self.find(font_name).map(LibraryFont::data)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}
