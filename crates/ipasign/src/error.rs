//! Error types for IPA re-signing operations.
//!
//! This module defines the [`enum@Error`] enum covering all failure cases
//! in the re-signing pipeline, from archive handling through external
//! tool invocation.
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for IPA re-signing operations.
///
/// All public functions in this crate return [`crate::Result<T>`], which uses
/// this error type. Match on variants to handle specific failure cases.
///
/// Every variant is terminal for the current run; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The host platform cannot run the external signing tools.
    ///
    /// Signing delegates to Apple's `codesign`, which only exists on macOS.
    #[error("unsupported platform: {0}")]
    PlatformUnsupported(String),

    /// A required external tool could not be invoked.
    ///
    /// Typically means `codesign` or `security` is not installed or not
    /// on `PATH` (Xcode Command Line Tools missing).
    #[error("required tool not available: {0}")]
    ToolUnavailable(String),

    /// The input archive does not exist.
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The temporary workspace could not be created.
    ///
    /// The filesystem rejected creation of the per-run scratch directory,
    /// e.g. no space or no permission in the temp location.
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] io::Error),

    /// The input archive could not be read or extracted.
    ///
    /// The file is missing, unreadable, or not a structurally valid
    /// ZIP archive.
    #[error("failed to read archive: {0}")]
    ArchiveRead(String),

    /// The output archive could not be written.
    ///
    /// The destination is not writable or a file in the signed tree
    /// could not be read back during repackaging.
    #[error("failed to write archive: {0}")]
    ArchiveWrite(String),

    /// The extracted archive has no top-level `Payload` directory.
    ///
    /// Every IPA carries its application bundle under `Payload/`; an
    /// archive without one is not an IPA.
    #[error("no Payload directory found in {}", .0.display())]
    PayloadNotFound(PathBuf),

    /// No `.app` bundle exists under the `Payload` directory.
    #[error("no .app bundle found in {}", .0.display())]
    BundleNotFound(PathBuf),

    /// More than one `.app` bundle exists under the `Payload` directory.
    ///
    /// The pipeline operates on exactly one bundle and refuses to guess
    /// which of several was intended.
    #[error("found {0} .app bundles in Payload, expected exactly one")]
    MultipleBundles(usize),

    /// The provisioning profile could not be copied into the bundle.
    ///
    /// The source `.mobileprovision` file is missing or the bundle is
    /// not writable.
    #[error("failed to inject provisioning profile: {0}")]
    ProfileInject(String),

    /// The external signing utility reported failure.
    ///
    /// Carries the utility's diagnostic output. The most common cause is
    /// a signing identity not present in the host's keychain.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Signature verification reported failure.
    ///
    /// The freshly applied signature did not verify; carries the
    /// utility's diagnostic output.
    #[error("signature verification failed: {0}")]
    Verification(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// ZIP archive operation failed.
    ///
    /// Occurs during IPA extraction or creation. See [`crate::archive`].
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
