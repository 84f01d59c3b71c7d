//! The re-signing pipeline.
//!
//! [`Resigner`] drives the full workflow for one IPA:
//!
//! 1. Preflight the host's signing tools
//! 2. Extract the input archive into a fresh workspace
//! 3. Locate the `.app` bundle in `Payload/`
//! 4. Replace the embedded provisioning profile (optional)
//! 5. Strip the old signature and apply a new one
//! 6. Verify the new signature
//! 7. Repackage into the output archive
//!
//! Stages run strictly in order; the first failure aborts the run. The
//! workspace is removed on every exit path, and the output file only
//! appears once repackaging has fully completed.

use crate::archive::{self, CompressionLevel};
use crate::bundle;
use crate::tools::{HostTools, ToolInvoker};
use crate::workspace::Workspace;
use crate::{Error, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Extraction target inside the workspace. Kept separate from the
/// staging area so the staged archive never sweeps itself up.
const CONTENTS_DIR: &str = "contents";

/// Staged output filename inside the workspace.
const STAGED_ARCHIVE: &str = "output.ipa";

/// IPA re-signing workflow with a builder-style API.
///
/// # Example
///
/// ```no_run
/// use ipasign::Resigner;
///
/// Resigner::new("Apple Distribution: Example Corp")
///     .provisioning_profile("dist.mobileprovision")
///     .resign("App.ipa", "App-signed.ipa")?;
/// # Ok::<(), ipasign::Error>(())
/// ```
pub struct Resigner<T: ToolInvoker = HostTools> {
    invoker: T,
    identity: String,
    provisioning_profile: Option<PathBuf>,
    entitlements: Option<PathBuf>,
    compression_level: CompressionLevel,
}

impl Resigner<HostTools> {
    /// Create a resigner using the host's `codesign` and `security`.
    pub fn new(identity: impl Into<String>) -> Self {
        Self::with_invoker(identity, HostTools)
    }
}

impl<T: ToolInvoker> Resigner<T> {
    /// Create a resigner with a custom tool invoker.
    ///
    /// Used by tests to substitute a fake signing backend.
    pub fn with_invoker(identity: impl Into<String>, invoker: T) -> Self {
        Resigner {
            invoker,
            identity: identity.into(),
            provisioning_profile: None,
            entitlements: None,
            compression_level: CompressionLevel::DEFAULT,
        }
    }

    /// The tool invoker backing this resigner.
    pub fn invoker(&self) -> &T {
        &self.invoker
    }

    /// Set the provisioning profile to embed as `embedded.mobileprovision`.
    pub fn provisioning_profile(mut self, path: impl AsRef<Path>) -> Self {
        self.provisioning_profile = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the entitlements file passed through to `codesign`.
    ///
    /// The file is handed to the signing utility unmodified; this crate
    /// never parses it.
    pub fn entitlements(mut self, path: impl AsRef<Path>) -> Self {
        self.entitlements = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the compression level for the output archive.
    pub fn compression_level(mut self, level: impl Into<CompressionLevel>) -> Self {
        self.compression_level = level.into();
        self
    }

    /// Re-sign `input`, writing the result to `output`.
    ///
    /// Atomic from the caller's perspective: on any failure no file is
    /// written at `output` and the workspace is removed.
    pub fn resign(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
        let input = input.as_ref();
        let output = output.as_ref();

        self.invoker.preflight()?;
        archive::validate(input)?;

        // Release on success and failure alike so removal problems get
        // logged; the TempDir drop guard still covers panics.
        let workspace = Workspace::acquire()?;
        let result = self.run_stages(input, output, &workspace);
        workspace.release();
        result
    }

    fn run_stages(&self, input: &Path, output: &Path, workspace: &Workspace) -> Result<()> {
        let contents = workspace.path().join(CONTENTS_DIR);

        info!("extracting {}", input.display());
        archive::extract(input, &contents)?;

        let bundle_path = bundle::locate(&contents)?;

        bundle::inject_profile(&bundle_path, self.provisioning_profile.as_deref())?;

        info!("signing with identity: {}", self.identity);
        self.invoker.remove_signature(&bundle_path)?;
        let signed = self.invoker.apply_signature(
            &bundle_path,
            &self.identity,
            self.entitlements.as_deref(),
        )?;
        if !signed.success() {
            return Err(Error::Signing(signed.diagnostics()));
        }

        info!("verifying signature");
        let verified = self.invoker.verify_signature(&bundle_path)?;
        if !verified.success() {
            return Err(Error::Verification(verified.diagnostics()));
        }

        info!("repackaging to {}", output.display());
        let staged = workspace.path().join(STAGED_ARCHIVE);
        archive::compress(&contents, &staged, self.compression_level)?;
        place_output(&staged, output)?;

        Ok(())
    }
}

/// Move the staged archive to the caller's output path.
///
/// The archive is built inside the workspace first so a repackaging
/// failure never leaves a partial file at `output`. Rename is preferred;
/// a cross-device rename falls back to copy-then-delete.
fn place_output(staged: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::ArchiveWrite(format!("{}: {e}", parent.display())))?;
        }
    }

    match fs::rename(staged, output) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!("rename to {} failed ({rename_err}), copying", output.display());
            if let Err(copy_err) = fs::copy(staged, output) {
                // A copy that dies mid-write leaves a truncated file at
                // the caller's path; no partial output may survive a
                // failed run
                let _ = fs::remove_file(output);
                return Err(Error::ArchiveWrite(format!(
                    "{}: {copy_err}",
                    output.display()
                )));
            }
            let _ = fs::remove_file(staged);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use std::cell::RefCell;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Fake invoker recording every call; failures are injectable.
    #[derive(Default)]
    struct FakeTools {
        fail_sign: bool,
        fail_verify: bool,
        calls: RefCell<Vec<String>>,
        signed_bundles: RefCell<Vec<PathBuf>>,
    }

    impl ToolInvoker for FakeTools {
        fn preflight(&self) -> Result<()> {
            self.calls.borrow_mut().push("preflight".into());
            Ok(())
        }

        fn remove_signature(&self, bundle: &Path) -> Result<ToolOutput> {
            self.calls.borrow_mut().push("remove".into());
            let _ = fs::remove_dir_all(bundle.join(bundle::SIGNATURE_DIR));
            Ok(ToolOutput::ok())
        }

        fn apply_signature(
            &self,
            bundle: &Path,
            _identity: &str,
            _entitlements: Option<&Path>,
        ) -> Result<ToolOutput> {
            self.calls.borrow_mut().push("sign".into());
            self.signed_bundles.borrow_mut().push(bundle.to_path_buf());
            if self.fail_sign {
                return Ok(ToolOutput {
                    status: 1,
                    stdout: String::new(),
                    stderr: "no identity found".into(),
                });
            }
            // Regenerate signature metadata the way codesign would
            let sig_dir = bundle.join(bundle::SIGNATURE_DIR);
            fs::create_dir_all(&sig_dir)?;
            fs::write(sig_dir.join("CodeResources"), b"<plist></plist>")?;
            Ok(ToolOutput::ok())
        }

        fn verify_signature(&self, _bundle: &Path) -> Result<ToolOutput> {
            self.calls.borrow_mut().push("verify".into());
            if self.fail_verify {
                return Ok(ToolOutput {
                    status: 1,
                    stdout: String::new(),
                    stderr: "invalid signature".into(),
                });
            }
            Ok(ToolOutput::ok())
        }

        fn list_identities(&self) -> Result<ToolOutput> {
            self.calls.borrow_mut().push("list".into());
            Ok(ToolOutput::ok())
        }
    }

    fn create_test_ipa(dir: &Path) -> PathBuf {
        let ipa_path = dir.join("App.ipa");
        let file = File::create(&ipa_path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        zip.add_directory("Payload/", options).unwrap();
        zip.add_directory("Payload/App.app/", options).unwrap();
        zip.start_file("Payload/App.app/Info.plist", options).unwrap();
        zip.write_all(b"<?xml version=\"1.0\"?><plist><dict></dict></plist>")
            .unwrap();
        zip.start_file("Payload/App.app/App", options).unwrap();
        zip.write_all(b"MACHO_PLACEHOLDER").unwrap();

        zip.finish().unwrap();
        ipa_path
    }

    #[test]
    fn resign_succeeds_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let input = create_test_ipa(temp_dir.path());
        let output = temp_dir.path().join("App-signed.ipa");

        let tools = FakeTools::default();
        let resigner = Resigner::with_invoker("Test Identity", tools);
        resigner.resign(&input, &output).unwrap();

        assert!(output.is_file());
        let calls = resigner.invoker.calls.borrow();
        assert_eq!(
            calls.as_slice(),
            ["preflight", "remove", "sign", "verify"]
        );

        // Output carries the input's files plus fresh signature metadata
        let file = File::open(&output).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "Payload/App.app/Info.plist"));
        assert!(names.iter().any(|n| n == "Payload/App.app/App"));
        assert!(names
            .iter()
            .any(|n| n == "Payload/App.app/_CodeSignature/CodeResources"));
    }

    #[test]
    fn resign_injects_profile() {
        let temp_dir = TempDir::new().unwrap();
        let input = create_test_ipa(temp_dir.path());
        let output = temp_dir.path().join("out.ipa");
        let profile = temp_dir.path().join("dist.mobileprovision");
        fs::write(&profile, b"profile bytes").unwrap();

        Resigner::with_invoker("Test Identity", FakeTools::default())
            .provisioning_profile(&profile)
            .resign(&input, &output)
            .unwrap();

        let file = File::open(&output).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut embedded = archive
            .by_name("Payload/App.app/embedded.mobileprovision")
            .unwrap();
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut embedded, &mut bytes).unwrap();
        assert_eq!(bytes, b"profile bytes");
    }

    #[test]
    fn resign_missing_input_fails_early() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.ipa");

        let resigner = Resigner::with_invoker("Test Identity", FakeTools::default());
        let result = resigner.resign(temp_dir.path().join("missing.ipa"), &output);

        assert!(matches!(result, Err(Error::InputNotFound(_))));
        assert!(!output.exists());
        assert_eq!(resigner.invoker.calls.borrow().as_slice(), ["preflight"]);
    }

    #[test]
    fn resign_fails_without_payload() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("empty.ipa");
        let file = File::create(&input).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.start_file("README.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"not an ipa").unwrap();
        zip.finish().unwrap();

        let output = temp_dir.path().join("out.ipa");
        let resigner = Resigner::with_invoker("Test Identity", FakeTools::default());
        let result = resigner.resign(&input, &output);

        assert!(matches!(result, Err(Error::PayloadNotFound(_))));
        assert!(!output.exists());
        // No signing stage ran
        let calls = resigner.invoker.calls.borrow();
        assert!(!calls.iter().any(|c| c == "sign"));
    }

    #[test]
    fn signing_failure_leaves_no_output_or_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let input = create_test_ipa(temp_dir.path());
        let output = temp_dir.path().join("out.ipa");

        let tools = FakeTools {
            fail_sign: true,
            ..FakeTools::default()
        };
        let resigner = Resigner::with_invoker("Missing Identity", tools);
        let result = resigner.resign(&input, &output);

        match result {
            Err(Error::Signing(msg)) => assert!(msg.contains("no identity found")),
            other => panic!("expected Signing error, got {other:?}"),
        }
        assert!(!output.exists());

        // The whole workspace must be gone, not just the bundle
        let signed = resigner.invoker.signed_bundles.borrow();
        assert!(!workspace_root(&signed[0]).exists());
    }

    #[test]
    fn verification_failure_aborts_before_repackage() {
        let temp_dir = TempDir::new().unwrap();
        let input = create_test_ipa(temp_dir.path());
        let output = temp_dir.path().join("out.ipa");

        let tools = FakeTools {
            fail_verify: true,
            ..FakeTools::default()
        };
        let result = Resigner::with_invoker("Test Identity", tools).resign(&input, &output);

        assert!(matches!(result, Err(Error::Verification(_))));
        assert!(!output.exists());
    }

    #[test]
    fn workspace_removed_after_success() {
        let temp_dir = TempDir::new().unwrap();
        let input = create_test_ipa(temp_dir.path());
        let output = temp_dir.path().join("out.ipa");

        let resigner = Resigner::with_invoker("Test Identity", FakeTools::default());
        resigner.resign(&input, &output).unwrap();

        let signed = resigner.invoker.signed_bundles.borrow();
        assert!(!workspace_root(&signed[0]).exists());
    }

    /// Workspace root above `<workspace>/contents/Payload/App.app`.
    fn workspace_root(bundle: &Path) -> PathBuf {
        bundle.ancestors().nth(3).unwrap().to_path_buf()
    }

    #[test]
    fn failed_copy_fallback_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let staged = temp_dir.path().join("staged.ipa");
        fs::write(&staged, b"archive bytes").unwrap();

        // Routing the output through a regular file makes both rename
        // and the copy fallback fail
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let output = blocker.join("out.ipa");

        let result = place_output(&staged, &output);

        assert!(matches!(result, Err(Error::ArchiveWrite(_))));
        assert!(!output.exists());
    }
}
