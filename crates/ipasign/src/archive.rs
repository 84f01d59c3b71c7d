//! IPA archive extraction and creation.
//!
//! IPA files are ZIP archives. [`extract`] materializes one into a directory
//! tree and [`compress`] packs a directory tree back into a fresh archive,
//! preserving relative paths, Unix permission bits, and symlinks in both
//! directions. Both functions are stateless.

use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// ZIP compression level for archive creation.
///
/// Controls the trade-off between compression speed and output file size.
///
/// # Examples
///
/// ```
/// use ipasign::CompressionLevel;
///
/// let fast = CompressionLevel::NONE;        // No compression
/// let balanced = CompressionLevel::DEFAULT; // Level 6
/// let small = CompressionLevel::MAX;        // Maximum compression
///
/// // Or create a custom level (clamped to 0-9)
/// let custom = CompressionLevel::new(3);
/// assert_eq!(custom.level(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// No compression (level 0). Fastest creation, largest file size.
    pub const NONE: CompressionLevel = CompressionLevel(0);

    /// Default compression (level 6). Balanced speed and size.
    pub const DEFAULT: CompressionLevel = CompressionLevel(6);

    /// Maximum compression (level 9). Smallest file, slowest creation.
    pub const MAX: CompressionLevel = CompressionLevel(9);

    /// Creates a compression level from 0-9.
    ///
    /// Values greater than 9 are clamped to 9.
    #[must_use]
    pub fn new(level: u32) -> Self {
        CompressionLevel(level.min(9))
    }

    /// Returns the compression level value (0-9).
    #[must_use]
    pub fn level(&self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for CompressionLevel {
    fn from(level: u32) -> Self {
        CompressionLevel::new(level)
    }
}

/// Validate that a path looks like an IPA file.
///
/// Checks that the file exists and starts with the ZIP signature.
pub fn validate(archive_path: impl AsRef<Path>) -> Result<()> {
    let archive_path = archive_path.as_ref();

    if !archive_path.exists() {
        return Err(Error::InputNotFound(archive_path.to_path_buf()));
    }

    // ZIP magic: PK\x03\x04, PK\x05\x06 (empty), or PK\x07\x08 (spanned)
    let mut file = File::open(archive_path)
        .map_err(|e| Error::ArchiveRead(format!("{}: {e}", archive_path.display())))?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .map_err(|_| Error::ArchiveRead(format!("{}: not a ZIP archive", archive_path.display())))?;

    if &magic[0..2] != b"PK" {
        return Err(Error::ArchiveRead(format!(
            "{}: not a ZIP archive",
            archive_path.display()
        )));
    }

    Ok(())
}

/// Extract a ZIP archive into a destination directory.
///
/// Every entry is materialized under `dest_dir` with its relative path
/// preserved. Symlinks and Unix permission bits are restored where the
/// archive recorded them. Entries whose names would escape `dest_dir`
/// are skipped.
///
/// # Errors
///
/// Returns [`Error::ArchiveRead`] if the archive is missing, unreadable,
/// or structurally corrupt, and [`Error::Io`] if an extracted file cannot
/// be written.
pub fn extract(archive_path: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<()> {
    let archive_path = archive_path.as_ref();
    let dest_dir = dest_dir.as_ref();

    if !archive_path.exists() {
        return Err(Error::ArchiveRead(format!(
            "archive not found: {}",
            archive_path.display()
        )));
    }

    let file = File::open(archive_path)
        .map_err(|e| Error::ArchiveRead(format!("{}: {e}", archive_path.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::ArchiveRead(format!("{}: {e}", archive_path.display())))?;

    fs::create_dir_all(dest_dir)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::ArchiveRead(e.to_string()))?;

        // enclosed_name rejects entries that would escape dest_dir
        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => continue,
        };

        #[cfg(unix)]
        let unix_mode = entry.unix_mode();

        #[cfg(unix)]
        let is_symlink = unix_mode
            .map(|mode| (mode & 0o170000) == 0o120000)
            .unwrap_or(false);

        #[cfg(not(unix))]
        let is_symlink = false;

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        if is_symlink {
            let mut target = String::new();
            entry.read_to_string(&mut target)?;

            if outpath.symlink_metadata().is_ok() {
                let _ = fs::remove_file(&outpath);
            }

            std::os::unix::fs::symlink(&target, &outpath)?;
            continue;
        }

        #[cfg(not(unix))]
        let _ = is_symlink;

        let mut outfile = File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = unix_mode {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
    }

    Ok(())
}

/// Create a ZIP archive from a directory tree.
///
/// Walks `source_dir` recursively and writes every entry into a new
/// archive at `archive_path`, using paths relative to `source_dir` as
/// member names. Files are deflate-compressed at the given level;
/// directories and symlinks are recorded as such. An existing file at
/// `archive_path` is overwritten.
///
/// # Errors
///
/// Returns [`Error::ArchiveWrite`] if the destination cannot be created,
/// the walk encounters an unreadable entry, or the archive cannot be
/// finalized.
pub fn compress(
    source_dir: impl AsRef<Path>,
    archive_path: impl AsRef<Path>,
    compression_level: CompressionLevel,
) -> Result<()> {
    let source_dir = source_dir.as_ref();
    let archive_path = archive_path.as_ref();

    if !source_dir.is_dir() {
        return Err(Error::ArchiveWrite(format!(
            "not a directory: {}",
            source_dir.display()
        )));
    }

    if let Some(parent) = archive_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::ArchiveWrite(format!("{}: {e}", parent.display())))?;
        }
    }

    let file = File::create(archive_path)
        .map_err(|e| Error::ArchiveWrite(format!("{}: {e}", archive_path.display())))?;
    let mut zip = ZipWriter::new(file);

    let options = if compression_level.level() == 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level.level() as i64))
    };

    // Don't follow symlinks; they are stored as symlink entries
    for entry in WalkDir::new(source_dir).follow_links(false) {
        let entry =
            entry.map_err(|e| Error::ArchiveWrite(format!("failed to walk directory: {e}")))?;
        let path = entry.path();

        let relative_path = path.strip_prefix(source_dir).map_err(|_| {
            Error::ArchiveWrite(format!(
                "entry outside source tree: {}",
                path.display()
            ))
        })?;

        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let name = relative_path.to_string_lossy().replace('\\', "/");
        let metadata = fs::symlink_metadata(path)
            .map_err(|e| Error::ArchiveWrite(format!("{}: {e}", path.display())))?;

        if metadata.is_dir() {
            zip.add_directory(format!("{name}/"), options)
                .map_err(|e| Error::ArchiveWrite(e.to_string()))?;
        } else if metadata.file_type().is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| Error::ArchiveWrite(format!("{}: {e}", path.display())))?;
            zip.add_symlink(&name, target.to_string_lossy(), options)
                .map_err(|e| Error::ArchiveWrite(e.to_string()))?;
        } else {
            #[cfg(unix)]
            let options = {
                use std::os::unix::fs::PermissionsExt;
                options.unix_permissions(metadata.permissions().mode())
            };

            zip.start_file(&name, options)
                .map_err(|e| Error::ArchiveWrite(e.to_string()))?;

            let mut src = File::open(path)
                .map_err(|e| Error::ArchiveWrite(format!("{}: {e}", path.display())))?;
            io::copy(&mut src, &mut zip)
                .map_err(|e| Error::ArchiveWrite(format!("{}: {e}", path.display())))?;
        }
    }

    zip.finish()
        .map_err(|e| Error::ArchiveWrite(e.to_string()))?;

    Ok(())
}
