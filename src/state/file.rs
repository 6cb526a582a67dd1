//! File-backed state store.
//!
//! The envelope is written next to a status document in one directory. Each
//! write goes to a temporary sibling first and is renamed into place, so a
//! crash never leaves a truncated state file behind.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Serialize;
use tracing::debug;

use super::{InfrastructureStatus, PersistedState, StateError, StateWriter, WriteFuture};

const STATUS_SUFFIX: &str = ".status.json";
const TEMP_SUFFIX: &str = ".tmp";

/// Persists state as JSON files on the local file system.
#[derive(Clone, Debug)]
pub struct FileStateStore {
    path: Utf8PathBuf,
}

impl FileStateStore {
    /// Creates a store writing the envelope to `path`; the status document
    /// lands next to it.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state envelope.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Path of the status document.
    #[must_use]
    pub fn status_path(&self) -> Utf8PathBuf {
        let name = self.path.file_stem().unwrap_or("state");
        self.path.with_file_name(format!("{name}{STATUS_SUFFIX}"))
    }

    /// Loads the envelope written by a previous run.
    ///
    /// Returns `Ok(None)` when no file exists yet or the file carries foreign
    /// markers.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the file cannot be read and
    /// [`StateError::Malformed`] when it cannot be decoded.
    pub fn load(&self) -> Result<Option<PersistedState>, StateError> {
        let (parent, file_name) = open_parent(&self.path, false)?;
        let Some(dir) = parent else {
            return Ok(None);
        };
        let contents = match dir.read_to_string(file_name) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&self.path, &err)),
        };
        PersistedState::decode_str(&contents)
    }

    fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), StateError> {
        let rendered =
            serde_json::to_string_pretty(value).map_err(|err| StateError::Malformed {
                message: err.to_string(),
            })?;
        let (parent, file_name) = open_parent(path, true)?;
        let dir = parent.ok_or_else(|| StateError::Io {
            path: path.to_path_buf(),
            message: String::from("parent directory is missing"),
        })?;
        let temp_name = format!("{file_name}{TEMP_SUFFIX}");
        dir.write(&temp_name, rendered)
            .map_err(|err| io_error(path, &err))?;
        dir.rename(&temp_name, &dir, file_name)
            .map_err(|err| io_error(path, &err))?;
        debug!(path = %path, "wrote state file");
        Ok(())
    }
}

impl StateWriter for FileStateStore {
    fn write_state<'a>(&'a self, state: &'a PersistedState) -> WriteFuture<'a> {
        Box::pin(async move { Self::write_json(&self.path, state) })
    }

    fn write_status<'a>(&'a self, status: &'a InfrastructureStatus) -> WriteFuture<'a> {
        Box::pin(async move { Self::write_json(&self.status_path(), status) })
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StateError {
    StateError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn open_parent(path: &Utf8Path, create: bool) -> Result<(Option<Dir>, &str), StateError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| StateError::Io {
        path: path.to_path_buf(),
        message: String::from("state file path is missing a filename"),
    })?;

    if create {
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|err| io_error(parent, &err))?;
    }
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => Ok((Some(dir), file_name)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok((None, file_name)),
        Err(err) => Err(io_error(parent, &err)),
    }
}
