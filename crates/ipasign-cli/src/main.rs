//! Command-line interface for the ipasign IPA re-signing tool.
//!
//! Re-signs an IPA with a keychain identity via the host's `codesign`
//! utility, optionally replacing the embedded provisioning profile.

use clap::Parser;
use ipasign::{HostTools, Resigner, ToolInvoker};
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ipasign")]
#[command(about = "Re-sign iOS application archives (IPA)")]
struct Cli {
    /// Input IPA file path
    #[arg(short, long, required_unless_present = "list_identities")]
    input: Option<PathBuf>,

    /// Output IPA file path
    #[arg(short, long, required_unless_present = "list_identities")]
    output: Option<PathBuf>,

    /// Signing certificate identity (e.g. "Apple Distribution: Example Corp")
    #[arg(short, long, required_unless_present = "list_identities")]
    certificate: Option<String>,

    /// Provisioning profile (.mobileprovision) to embed in the bundle
    #[arg(short = 'p', long)]
    provisioning_profile: Option<PathBuf>,

    /// Entitlements (.plist) file passed through to codesign
    #[arg(short, long)]
    entitlements: Option<PathBuf>,

    /// List available signing identities and exit
    #[arg(short, long)]
    list_identities: bool,

    /// ZIP compression level for the output IPA (0-9)
    #[arg(short = 'z', long, default_value = "6")]
    zip_level: u32,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ipasign::Result<()> {
    if cli.list_identities {
        return list_identities();
    }

    // clap's required_unless_present enforces these when not listing
    let (Some(input), Some(output), Some(identity)) = (cli.input, cli.output, cli.certificate)
    else {
        unreachable!("clap requires input, output, and certificate for signing");
    };

    let mut resigner = Resigner::new(identity).compression_level(cli.zip_level);
    if let Some(profile) = cli.provisioning_profile {
        resigner = resigner.provisioning_profile(profile);
    }
    if let Some(entitlements) = cli.entitlements {
        resigner = resigner.entitlements(entitlements);
    }

    resigner.resign(&input, &output)?;
    println!("Signed: {}", output.display());

    Ok(())
}

fn list_identities() -> ipasign::Result<()> {
    let output = HostTools.list_identities()?;
    if !output.success() {
        return Err(ipasign::Error::ToolUnavailable(format!(
            "security find-identity failed: {}",
            output.diagnostics()
        )));
    }

    println!("Available signing identities:");
    print!("{}", output.stdout);

    Ok(())
}
