//! Filesystem primitives for the division store.
//!
//! This module centralizes all filesystem- and path-related logic for
//! `climdiv-core`. It is responsible for mapping a store root directory to
//! the locations of:
//!
//! - The self-describing metadata document (`<root>/store.json`).
//! - Per-variable data files holding raw little-endian rows
//!   (`<root>/<variable>.dat`).
//!
//! Goals of this module include:
//!
//! - Keeping path conventions in one place so they can be evolved without
//!   touching higher-level logic.
//! - Providing small helpers for atomic file operations used by metadata
//!   updates (write-then-rename semantics) and for positioned row reads
//!   and writes into variable data files.
//!
//! All I/O here is synchronous blocking I/O; the comparison pipeline has
//! no suspension points and callers coordinate concurrent writers through
//! the per-path lock registry in [`crate::locks`].

use snafu::{Backtrace, prelude::*};
use std::{
    error::Error,
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Represents the location of a division store.
///
/// This enum abstracts over different storage backends, currently supporting
/// local filesystem paths with potential future support for object storage.
#[derive(Clone, Debug)]
pub enum StoreLocation {
    /// A store rooted at the given local filesystem directory.
    Local(PathBuf),
    // Future:
    // S3 { bucket: String, prefix: String },
}

impl StoreLocation {
    /// Creates a new `StoreLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StoreLocation::Local(root.into())
    }

    /// Returns the root path of the store.
    pub fn root(&self) -> &Path {
        match self {
            StoreLocation::Local(root) => root,
        }
    }
}

/// Errors produced by the storage backend implementation.
///
/// Currently this crate only supports a local filesystem backend;
/// backend-specific I/O errors are wrapped in this enum so higher layers can
/// map them into `StorageError` variants with additional context.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The specified path already exists when creation was requested with
    /// create-new semantics.
    #[snafu(display("Path already exists: {path}"))]
    AlreadyExists {
        /// The path that was found to already exist.
        path: String,
        /// Underlying backend error that indicates the existing resource.
        source: BackendError,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// An I/O error occurred on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A positioned read or write fell outside the bounds of the data file.
    #[snafu(display(
        "Out-of-bounds access at {path}: offset {offset} + len {len} exceeds file size {file_len}"
    ))]
    OutOfBounds {
        /// The data file that was accessed.
        path: String,
        /// Requested byte offset.
        offset: u64,
        /// Requested length in bytes.
        len: usize,
        /// Actual file length in bytes.
        file_len: u64,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

/// Join a store location with a relative path into an absolute local path.
///
/// v0.1: only Local is supported.
fn join_local(location: &StoreLocation, rel: &Path) -> PathBuf {
    match location {
        StoreLocation::Local(root) => root.join(rel),
    }
}

fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Guard that removes a temporary file on drop unless disarmed.
/// Used to ensure cleanup on error paths during atomic writes.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Disarm the guard so the file is NOT removed on drop.
    /// Call this after a successful rename.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup; we're likely already handling another error.
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Write `contents` to `rel_path` inside `location` using an atomic write.
///
/// This performs a write-then-rename sequence on the local filesystem: it
/// writes the payload to a temporary file next to the target path, syncs the
/// file, and then renames it into place to provide an atomic replacement.
///
/// # Errors
///
/// Returns `StorageError::OtherIo` when filesystem I/O fails.
pub fn write_atomic(
    location: &StoreLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);

    create_parent_dir(&abs)?;

    let tmp_path = abs.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = File::create(&tmp_path)
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.write_all(contents)
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.sync_all()
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: tmp_path.display().to_string(),
            })?;
    }

    fs::rename(&tmp_path, &abs)
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    // Success - don't remove the temp file (it's been renamed).
    guard.disarm();

    Ok(())
}

/// Read the file at `rel_path` within the given `location` and return its
/// contents as a `String`.
///
/// On success this returns the file contents; if the file cannot be found a
/// `StorageError::NotFound` is returned, while other filesystem problems
/// produce `StorageError::OtherIo`.
pub fn read_to_string(location: &StoreLocation, rel_path: &Path) -> StorageResult<String> {
    let abs = join_local(location, rel_path);

    match fs::read_to_string(&abs) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(BackendError::Local(e)).context(NotFoundSnafu {
                path: abs.display().to_string(),
            })
        }
        Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu {
            path: abs.display().to_string(),
        }),
    }
}

/// Create a *new* file at `rel_path` and write `contents`, failing if the
/// file already exists.
///
/// This is used for variable data files where creation must happen exactly
/// once; re-provisioning an existing variable reuses its data file untouched.
pub fn write_new(
    location: &StoreLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    create_parent_dir(&abs)?;

    let path_str = abs.display().to_string();

    // Atomic "create only if not exists" on the target path.
    let open_result = OpenOptions::new().write(true).create_new(true).open(&abs);

    let mut file = match open_result {
        Ok(f) => f,
        Err(e) => {
            let backend = BackendError::Local(e);
            // Classify AlreadyExists vs "other I/O".
            let storage_err = match &backend {
                BackendError::Local(inner) if inner.kind() == io::ErrorKind::AlreadyExists => {
                    StorageError::AlreadyExists {
                        path: path_str,
                        source: backend,
                        backtrace: Backtrace::capture(),
                    }
                }
                _ => StorageError::OtherIo {
                    path: path_str,
                    source: backend,
                    backtrace: Backtrace::capture(),
                },
            };
            return Err(storage_err);
        }
    };

    file.write_all(contents)
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    file.sync_all()
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    Ok(())
}

/// Read exactly `len` bytes at byte `offset` from the file at `rel_path`
/// within `location`.
///
/// Semantics:
/// - On missing file: `StorageError::NotFound`.
/// - On a range extending past the end of the file: `StorageError::OutOfBounds`.
/// - On other I/O problems: `StorageError::OtherIo`.
pub fn read_at(
    location: &StoreLocation,
    rel_path: &Path,
    offset: u64,
    len: usize,
) -> StorageResult<Vec<u8>> {
    let abs = join_local(location, rel_path);
    let path_str = abs.display().to_string();

    let mut file = match File::open(&abs) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BackendError::Local(e)).context(NotFoundSnafu { path: path_str });
        }
        Err(e) => {
            return Err(BackendError::Local(e)).context(OtherIoSnafu { path: path_str });
        }
    };

    let file_len = file
        .metadata()
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path_str.clone(),
        })?
        .len();

    ensure!(
        offset.checked_add(len as u64).is_some_and(|end| end <= file_len),
        OutOfBoundsSnafu {
            path: path_str.clone(),
            offset,
            len,
            file_len,
        }
    );

    file.seek(SeekFrom::Start(offset))
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path_str.clone(),
        })?;

    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: path_str })?;

    Ok(buf)
}

/// Write `bytes` at byte `offset` into the existing file at `rel_path`
/// within `location`.
///
/// The target range must lie entirely within the file: data files are
/// pre-sized at variable creation and a row write never extends them. The
/// write is a single positioned `write_all` followed by a data sync, so one
/// division's row is replaced without touching any other row.
pub fn write_at(
    location: &StoreLocation,
    rel_path: &Path,
    offset: u64,
    bytes: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    let path_str = abs.display().to_string();

    let mut file = match OpenOptions::new().write(true).open(&abs) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BackendError::Local(e)).context(NotFoundSnafu { path: path_str });
        }
        Err(e) => {
            return Err(BackendError::Local(e)).context(OtherIoSnafu { path: path_str });
        }
    };

    let file_len = file
        .metadata()
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path_str.clone(),
        })?
        .len();

    ensure!(
        offset
            .checked_add(bytes.len() as u64)
            .is_some_and(|end| end <= file_len),
        OutOfBoundsSnafu {
            path: path_str.clone(),
            offset,
            len: bytes.len(),
            file_len,
        }
    );

    file.seek(SeekFrom::Start(offset))
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path_str.clone(),
        })?;

    file.write_all(bytes)
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path_str.clone(),
        })?;

    file.sync_data()
        .map_err(BackendError::Local)
        .context(OtherIoSnafu { path: path_str })?;

    Ok(())
}
