//! External signing tool invocation.
//!
//! Signing, verification, and identity enumeration delegate to Apple's
//! `codesign` and `security` utilities. The [`ToolInvoker`] trait keeps
//! process spawning out of the pipeline and lets tests substitute a fake
//! implementation.

use crate::bundle::SIGNATURE_DIR;
use crate::{Error, Result};
use log::{debug, info};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

/// Captured result of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit code; -1 when the process died without one.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// New output with exit code 0 and empty streams.
    pub fn ok() -> Self {
        ToolOutput {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// True when the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combined diagnostic text, stderr first.
    pub fn diagnostics(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if text.is_empty() {
            format!("exit status {}", self.status)
        } else {
            text.to_string()
        }
    }
}

impl From<std::process::Output> for ToolOutput {
    fn from(output: std::process::Output) -> Self {
        ToolOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Capability interface over the host's signing tools.
///
/// The pipeline only ever talks to signing infrastructure through this
/// trait; [`HostTools`] is the production implementation.
pub trait ToolInvoker {
    /// Check that the host can run the signing tools at all.
    ///
    /// Called once before any pipeline stage.
    fn preflight(&self) -> Result<()>;

    /// Remove existing signature metadata from a bundle, best-effort.
    ///
    /// A bundle without signature metadata is not an error.
    fn remove_signature(&self, bundle: &Path) -> Result<ToolOutput>;

    /// Apply a code signature to a bundle with the given identity.
    fn apply_signature(
        &self,
        bundle: &Path,
        identity: &str,
        entitlements: Option<&Path>,
    ) -> Result<ToolOutput>;

    /// Verify a bundle's code signature.
    fn verify_signature(&self, bundle: &Path) -> Result<ToolOutput>;

    /// List the signing identities known to the host's identity store.
    fn list_identities(&self) -> Result<ToolOutput>;
}

/// Production [`ToolInvoker`] shelling out to `codesign` and `security`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostTools;

impl HostTools {
    fn run(program: &str, args: &[&str]) -> Result<ToolOutput> {
        debug!("running: {program} {}", args.join(" "));
        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::ToolUnavailable(program.to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Ok(ToolOutput::from(output))
    }
}

impl ToolInvoker for HostTools {
    fn preflight(&self) -> Result<()> {
        if !cfg!(target_os = "macos") {
            return Err(Error::PlatformUnsupported(
                "codesign requires macOS".to_string(),
            ));
        }

        let probe = Self::run("codesign", &["--version"])?;
        if !probe.success() {
            return Err(Error::ToolUnavailable(
                "codesign (install the Xcode Command Line Tools)".to_string(),
            ));
        }

        Ok(())
    }

    fn remove_signature(&self, bundle: &Path) -> Result<ToolOutput> {
        let signature_dir = bundle.join(SIGNATURE_DIR);
        match fs::remove_dir_all(&signature_dir) {
            Ok(()) => info!("removed old signature: {}", signature_dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no existing signature metadata to remove")
            }
            // Best-effort; codesign -f will overwrite whatever remains
            Err(e) => debug!("could not remove {}: {e}", signature_dir.display()),
        }
        Ok(ToolOutput::ok())
    }

    fn apply_signature(
        &self,
        bundle: &Path,
        identity: &str,
        entitlements: Option<&Path>,
    ) -> Result<ToolOutput> {
        let bundle = bundle.to_string_lossy();
        let mut args = vec!["-f", "-s", identity];

        let entitlements = entitlements.map(|p| p.to_string_lossy().into_owned());
        if let Some(ref entitlements) = entitlements {
            args.push("--entitlements");
            args.push(entitlements);
        }

        args.push("--generate-entitlement-der");
        args.push(&bundle);

        Self::run("codesign", &args)
    }

    fn verify_signature(&self, bundle: &Path) -> Result<ToolOutput> {
        let bundle = bundle.to_string_lossy();
        Self::run("codesign", &["-v", "-v", &bundle])
    }

    fn list_identities(&self) -> Result<ToolOutput> {
        Self::run("security", &["find-identity", "-v", "-p", "codesigning"])
    }
}
