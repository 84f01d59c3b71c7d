//! Application bundle discovery and in-place mutation.
//!
//! An IPA carries exactly one `.app` bundle under a top-level `Payload/`
//! directory. [`locate`] finds it in an extracted tree; [`inject_profile`]
//! replaces the bundle's embedded provisioning profile.

use crate::{Error, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed name of the top-level directory holding the application bundle.
pub const PAYLOAD_DIR: &str = "Payload";

/// Path extension identifying an application bundle.
pub const BUNDLE_EXTENSION: &str = "app";

/// Filename of the provisioning profile embedded in a bundle.
pub const EMBEDDED_PROFILE: &str = "embedded.mobileprovision";

/// Name of the signature metadata directory inside a bundle.
pub const SIGNATURE_DIR: &str = "_CodeSignature";

/// Locate the single `.app` bundle in an extracted IPA tree.
///
/// Requires a directory literally named `Payload` directly under
/// `extracted_root`, holding exactly one entry with the `.app` extension.
/// Returns the bundle's full path.
///
/// # Errors
///
/// - [`Error::PayloadNotFound`] if there is no `Payload` directory.
/// - [`Error::BundleNotFound`] if `Payload` holds no `.app` entry.
/// - [`Error::MultipleBundles`] if it holds more than one; the pipeline
///   refuses to guess which bundle was intended.
pub fn locate(extracted_root: impl AsRef<Path>) -> Result<PathBuf> {
    let extracted_root = extracted_root.as_ref();
    let payload_dir = extracted_root.join(PAYLOAD_DIR);

    if !payload_dir.is_dir() {
        return Err(Error::PayloadNotFound(extracted_root.to_path_buf()));
    }

    let mut matches: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(&payload_dir)? {
        let path = entry?.path();
        if path.is_dir()
            && path
                .extension()
                .is_some_and(|ext| ext == BUNDLE_EXTENSION)
        {
            matches.push(path);
        }
    }
    // Sorted so diagnostics are deterministic across filesystems
    matches.sort();

    match matches.len() {
        0 => Err(Error::BundleNotFound(payload_dir)),
        1 => {
            let bundle = matches.remove(0);
            info!("found app bundle: {}", bundle.display());
            Ok(bundle)
        }
        n => {
            for path in &matches {
                debug!("candidate bundle: {}", path.display());
            }
            Err(Error::MultipleBundles(n))
        }
    }
}

/// Replace the provisioning profile embedded in a bundle.
///
/// Copies `profile_path` to `embedded.mobileprovision` inside
/// `bundle_path`, overwriting any existing file. A `None` profile is a
/// no-op success. Injecting the same profile twice is idempotent.
///
/// # Errors
///
/// Returns [`Error::ProfileInject`] if the source file is missing or the
/// destination cannot be written.
pub fn inject_profile(bundle_path: &Path, profile_path: Option<&Path>) -> Result<()> {
    let Some(profile_path) = profile_path else {
        debug!("no provisioning profile specified, skipping injection");
        return Ok(());
    };

    if !profile_path.is_file() {
        return Err(Error::ProfileInject(format!(
            "profile not found: {}",
            profile_path.display()
        )));
    }

    let dest = bundle_path.join(EMBEDDED_PROFILE);
    info!(
        "injecting provisioning profile {} -> {}",
        profile_path.display(),
        dest.display()
    );
    fs::copy(profile_path, &dest)
        .map_err(|e| Error::ProfileInject(format!("{}: {e}", dest.display())))?;

    Ok(())
}
