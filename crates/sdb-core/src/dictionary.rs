//! Datum dictionaries.
//!
//! A dictionary maps the value columns of one converter output file to
//! dotted series names. It lives in `datums{id}.lst`, one `index,source,datum`
//! row per column; row order defines the mapping and the index column is
//! informational only.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading a dictionary.
#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("no datum dictionary for file type {id} at {}", path.display())]
    NotFound { id: FileTypeId, path: PathBuf },

    #[error("malformed datum dictionary {} line {line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("failed to read datum dictionary {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File-type id exactly as it appears in the converter output name.
///
/// Kept as text so `007.csv` resolves to `datums007.lst` and `3.csv` and
/// `03.csv` stay distinct batches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileTypeId(String);

impl FileTypeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileTypeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FileTypeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One dictionary row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatumEntry {
    pub source: String,
    pub datum: String,
}

impl DatumEntry {
    /// `source.datum`, the field key written to the store.
    pub fn series_name(&self) -> String {
        format!("{}.{}", self.source, self.datum)
    }
}

/// Ordered column mapping for one file type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatumDictionary {
    id: FileTypeId,
    entries: Vec<DatumEntry>,
}

impl DatumDictionary {
    pub fn new(id: impl Into<FileTypeId>, entries: Vec<DatumEntry>) -> Self {
        Self {
            id: id.into(),
            entries,
        }
    }

    /// Parse dictionary text. `path` is only used in error messages.
    pub fn parse(id: impl Into<FileTypeId>, content: &str, path: &Path) -> Result<Self, DictionaryError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DictionaryError::Malformed {
                path: path.to_path_buf(),
                line: e.position().map(|p| p.line()).unwrap_or(0),
                reason: e.to_string(),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            if record.len() < 3 {
                return Err(DictionaryError::Malformed {
                    path: path.to_path_buf(),
                    line,
                    reason: format!("expected index,source,datum but found {} fields", record.len()),
                });
            }

            let source = &record[1];
            let datum = &record[2];
            if source.is_empty() || datum.is_empty() {
                return Err(DictionaryError::Malformed {
                    path: path.to_path_buf(),
                    line,
                    reason: "empty source or datum".to_string(),
                });
            }

            entries.push(DatumEntry {
                source: source.to_string(),
                datum: datum.to_string(),
            });
        }

        Ok(Self {
            id: id.into(),
            entries,
        })
    }

    /// Load `datums{id}.lst` from `dir`.
    pub fn load(dir: &Path, id: &FileTypeId) -> Result<Self, DictionaryError> {
        let path = dictionary_path(dir, id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DictionaryError::NotFound { id: id.clone(), path });
            }
            Err(source) => return Err(DictionaryError::Io { path, source }),
        };

        let dictionary = Self::parse(id.clone(), &content, &path)?;
        debug!(id = %id, columns = dictionary.len(), path = %path.display(), "Loaded datum dictionary");
        Ok(dictionary)
    }

    pub fn id(&self) -> &FileTypeId {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DatumEntry] {
        &self.entries
    }

    /// Entry for a 1-based CSV column.
    pub fn column(&self, column: usize) -> Option<&DatumEntry> {
        column.checked_sub(1).and_then(|i| self.entries.get(i))
    }
}

/// `{dir}/datums{id}.lst`.
pub fn dictionary_path(dir: &Path, id: &FileTypeId) -> PathBuf {
    dir.join(format!("datums{}.lst", id))
}

/// File-type id of a converter output file: the first run of ASCII digits
/// in its name, leading zeros included.
pub fn file_type_id(name: &str) -> Option<FileTypeId> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(FileTypeId(digits))
}

/// Per-batch memo of loaded dictionaries.
#[derive(Debug)]
pub struct DictionaryCache {
    dir: PathBuf,
    loaded: HashMap<FileTypeId, Arc<DatumDictionary>>,
}

impl DictionaryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: HashMap::new(),
        }
    }

    /// Load or reuse the dictionary for `id`. Failures are not cached.
    pub fn get(&mut self, id: &FileTypeId) -> Result<Arc<DatumDictionary>, DictionaryError> {
        if let Some(found) = self.loaded.get(id) {
            return Ok(Arc::clone(found));
        }
        let dictionary = Arc::new(DatumDictionary::load(&self.dir, id)?);
        self.loaded.insert(id.clone(), Arc::clone(&dictionary));
        Ok(dictionary)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}
