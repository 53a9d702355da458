//! Markdown note tree: listing, reading, searching and admin file management

pub mod safe_path;
pub mod search;

use serde::Serialize;
use std::fs::{self, DirEntry, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::NotesConfig;

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("invalid path")]
    InvalidPath,

    #[error("note not found")]
    NotFound,

    #[error("unsupported file type, allowed: {0}")]
    UnsupportedType(String),

    #[error("file already exists")]
    AlreadyExists,

    #[error("file too large, maximum allowed is {0:.1}MB")]
    TooLarge(f64),

    #[error("refusing to delete the notes root")]
    RootDeletion,

    #[error("failed to create directory: {0}")]
    CreateDir(io::Error),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// One entry of the note tree. Directories only appear with at least one
/// eligible descendant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NoteNode {
    File {
        /// File name without its extension
        name: String,
        path: String,
    },
    Directory {
        name: String,
        path: String,
        children: Vec<NoteNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub path: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedNote {
    pub path: String,
    pub name: String,
    pub size: u64,
}

pub struct NoteStore {
    root: PathBuf,
    allowed_extensions: Vec<String>,
    max_upload_bytes: u64,
}

impl NoteStore {
    pub fn new(config: &NotesConfig) -> Self {
        Self {
            root: config.dir.clone(),
            allowed_extensions: config.allowed_extensions.iter().map(|e| e.to_lowercase()).collect(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Upload limit in MB, as reported to clients
    pub fn max_upload_mb(&self) -> f64 {
        self.max_upload_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn is_accessible(&self) -> bool {
        self.root.is_dir()
    }

    pub fn resolve(&self, user_path: &str) -> Option<PathBuf> {
        safe_path::resolve(user_path, &self.root)
    }

    /// Lowercased extension (with dot) if it is one we serve
    fn allowed_extension(&self, path: &Path) -> Option<String> {
        let ext = format!(".{}", path.extension()?.to_str()?.to_lowercase());
        self.allowed_extensions.contains(&ext).then_some(ext)
    }

    fn relative(&self, path: &Path) -> String {
        safe_path::relative_to(path, &self.root).unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    /// Build the note tree, directories first and then by name
    pub fn tree(&self) -> Vec<NoteNode> {
        self.scan_directory(&self.root)
    }

    fn scan_directory(&self, directory: &Path) -> Vec<NoteNode> {
        let mut items = Vec::new();

        for entry in sorted_entries(directory) {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }

            // file_type does not follow symlinks
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let full_path = entry.path();
            let path = self.relative(&full_path);

            if file_type.is_dir() {
                let children = self.scan_directory(&full_path);
                if !children.is_empty() {
                    items.push(NoteNode::Directory { name: file_name, path, children });
                }
            } else if self.allowed_extension(&full_path).is_some() {
                items.push(NoteNode::File { name: display_name(&full_path), path });
            }
        }

        items
    }

    /// Raw text of a note
    pub fn content(&self, note_path: &str) -> Result<String, NoteError> {
        let path = self.resolve(note_path).ok_or(NoteError::NotFound)?;
        if !path.is_file() || self.allowed_extension(&path).is_none() {
            return Err(NoteError::NotFound);
        }
        read_text(&path).map_err(|e| {
            debug!("Failed to read {}: {}", path.display(), e);
            NoteError::NotFound
        })
    }

    /// Case-insensitive search over note names and contents
    pub fn search(&self, keyword: &str) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        self.search_directory(&self.root, keyword, &mut hits);
        hits
    }

    fn search_directory(&self, directory: &Path, keyword: &str, hits: &mut Vec<SearchHit>) {
        for entry in sorted_entries(directory) {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let full_path = entry.path();

            if file_type.is_dir() {
                self.search_directory(&full_path, keyword, hits);
                continue;
            }
            if self.allowed_extension(&full_path).is_none() {
                continue;
            }

            let content = match read_text(&full_path) {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping unreadable note {}: {}", full_path.display(), e);
                    continue;
                }
            };

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if search::contains_ignore_case(&content, keyword) || search::contains_ignore_case(&file_name, keyword) {
                hits.push(SearchHit {
                    name: display_name(&full_path),
                    path: self.relative(&full_path),
                    context: search::extract_context(&content, keyword),
                });
            }
        }
    }

    /// Store an uploaded note.
    ///
    /// `target` optionally names a directory under the root; a path with an
    /// extension is taken as a file and its parent directory is used.
    pub fn save_upload(&self, target: Option<&str>, file_name: &str, data: &[u8]) -> Result<UploadedNote, NoteError> {
        let file_name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.starts_with('.'))
            .ok_or(NoteError::InvalidPath)?
            .to_string();

        if self.allowed_extension(Path::new(&file_name)).is_none() {
            return Err(NoteError::UnsupportedType(self.allowed_extensions.join(", ")));
        }

        let size = data.len() as u64;
        if size > self.max_upload_bytes {
            return Err(NoteError::TooLarge(self.max_upload_mb()));
        }

        let target_dir = match target.filter(|t| !t.is_empty()) {
            Some(target) => {
                let dir = self.resolve(target).ok_or(NoteError::InvalidPath)?;
                if dir.extension().is_some() {
                    dir.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone())
                } else {
                    dir
                }
            }
            None => self.root.clone(),
        };

        fs::create_dir_all(&target_dir).map_err(NoteError::CreateDir)?;

        let target_path = target_dir.join(&file_name);
        if target_path.exists() {
            return Err(NoteError::AlreadyExists);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target_path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => NoteError::AlreadyExists,
                _ => NoteError::Io(e),
            })?;
        file.write_all(data)?;

        Ok(UploadedNote {
            path: self.relative(&target_path),
            name: file_name,
            size,
        })
    }

    /// Remove a note, or a directory with everything below it
    pub fn delete(&self, note_path: &str) -> Result<(), NoteError> {
        let path = self.resolve(note_path).ok_or(NoteError::InvalidPath)?;
        if path == self.root {
            return Err(NoteError::RootDeletion);
        }

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(NoteError::NotFound),
            Err(e) => return Err(NoteError::Io(e)),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Directory entries, directories first and then by name. Unreadable
/// directories yield nothing.
fn sorted_entries(directory: &Path) -> Vec<DirEntry> {
    let read_dir = match fs::read_dir(directory) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            debug!("Skipping unreadable directory {}: {}", directory.display(), e);
            return Vec::new();
        }
    };

    let mut entries: Vec<(bool, DirEntry)> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| (entry.file_type().map(|t| t.is_dir()).unwrap_or(false), entry))
        .collect();
    entries.sort_by(|(a_dir, a), (b_dir, b)| b_dir.cmp(a_dir).then_with(|| a.file_name().cmp(&b.file_name())));
    entries.into_iter().map(|(_, entry)| entry).collect()
}

/// Note text; bytes that are not UTF-8 become replacement characters
fn read_text(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
