//! Re-sign packaged iOS applications.
//!
//! `ipasign` replaces the code signature (and optionally the embedded
//! provisioning profile) of the `.app` bundle inside an IPA archive,
//! producing a new signed IPA. Cryptographic signing is delegated to the
//! host's `codesign` utility; this crate owns the surrounding pipeline:
//! extraction, bundle discovery, profile injection, signature
//! application and verification, and repackaging, all inside a
//! temporary workspace that is cleaned up on every exit path.
//!
//! ```no_run
//! use ipasign::Resigner;
//!
//! Resigner::new("Apple Distribution: Example Corp")
//!     .provisioning_profile("dist.mobileprovision")
//!     .resign("App.ipa", "App-signed.ipa")?;
//! # Ok::<(), ipasign::Error>(())
//! ```

pub mod archive;
pub mod bundle;
pub mod error;
pub mod pipeline;
pub mod tools;
pub mod workspace;

pub use archive::CompressionLevel;
pub use error::Error;
pub use pipeline::Resigner;
pub use tools::{HostTools, ToolInvoker, ToolOutput};
pub use workspace::Workspace;

pub type Result<T> = std::result::Result<T, Error>;
