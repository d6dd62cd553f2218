//! Self-update from GitHub releases
//!
//! The `update` subcommand replaces the running executable with the latest
//! published release. Releases ship one gzip-compressed binary per platform:
//!
//! ```text
//! ecsy-linux-amd64.gz
//! ecsy-linux-arm64.gz
//! ecsy-darwin-amd64.gz
//! ecsy-darwin-arm64.gz
//! ecsy-windows-amd64.exe.gz
//! ```
//!
//! ## Replacement Strategy
//!
//! The new binary is unpacked next to the current one when that directory is
//! writable, so the final swap is a same-filesystem rename:
//! 1. The current executable is renamed to `<exe>.backup`
//! 2. The unpacked binary is moved into place
//! 3. On failure the backup is renamed back; on success it is removed
//!
//! When the install directory is not writable the same three steps run
//! through `sudo`.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail, ensure};
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use semver::Version;
use serde::Deserialize;
use tempfile::{Builder, NamedTempFile};

use crate::prompt::Prompter;

const RELEASES_URL: &str = "https://api.github.com/repos/ju-net/ecsy/releases/latest";
const BIN_NAME: &str = "ecsy";

/// The subset of the GitHub release payload the updater reads.
#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    /// Release version with any leading `v` removed.
    pub fn version(&self) -> &str {
        self.tag_name.trim_start_matches('v')
    }

    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Version of the running binary.
pub fn current_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Whether `latest` is newer than `current`.
///
/// # Errors
///
/// Returns an error if either string is not a valid semantic version.
pub fn is_newer(current: &str, latest: &str) -> Result<bool> {
    let current = Version::parse(current.trim_start_matches('v'))
        .with_context(|| format!("Invalid current version: {current}"))?;
    let latest = Version::parse(latest.trim_start_matches('v'))
        .with_context(|| format!("Invalid release version: {latest}"))?;
    Ok(latest > current)
}

/// Release asset name for a platform, using Rust's `std::env::consts` names.
///
/// Rust reports `macos`/`x86_64`/`aarch64`; release assets use the
/// `darwin`/`amd64`/`arm64` spelling.
pub fn asset_name(os: &str, arch: &str) -> String {
    let os = match os {
        "macos" => "darwin",
        other => other,
    };
    let arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    let ext = if os == "windows" { ".exe" } else { "" };
    format!("{BIN_NAME}-{os}-{arch}{ext}.gz")
}

/// Checks the release feed and swaps in a newer executable.
pub struct Updater {
    client: reqwest::Client,
}

impl Updater {
    /// Creates an updater with an HTTP client identifying itself to GitHub.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (for
    /// example when the TLS backend fails to initialise).
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ecsy/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Fetches metadata for the latest published release.
    pub async fn latest_release(&self) -> Result<Release> {
        self.client
            .get(RELEASES_URL)
            .send()
            .await
            .context("failed to check for updates")?
            .error_for_status()
            .context("failed to get latest release")?
            .json()
            .await
            .context("failed to parse release info")
    }

    /// Runs the interactive update flow.
    ///
    /// 1. Fetches the latest release and compares it with [`current_version`]
    /// 2. Asks the operator to confirm
    /// 3. Downloads the asset for this platform
    /// 4. Unpacks and installs it over the running executable
    ///
    /// Declining the confirmation is not an error.
    ///
    /// # Errors
    ///
    /// Fails when the release feed is unreachable, no asset exists for this
    /// platform, or the download, unpacking or installation fails. A failed
    /// installation leaves the previous executable in place.
    pub async fn run<P: Prompter>(&self, prompter: &P) -> Result<()> {
        println!("Checking for updates...");
        let release = self.latest_release().await?;
        let latest = release.version();
        let current = current_version();

        if !is_newer(current, latest)? {
            println!("You are already running the latest version ({current})");
            return Ok(());
        }
        println!("Current version: {current}");
        println!("Latest version: {latest}");

        if !prompter.confirm(&format!("Do you want to update to version {latest}"))? {
            println!("Update cancelled");
            return Ok(());
        }

        let name = asset_name(std::env::consts::OS, std::env::consts::ARCH);
        let asset = release.asset(&name).with_context(|| {
            format!(
                "no release found for platform {}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            )
        })?;

        println!("Downloading {name}...");
        let compressed = self.download(&asset.browser_download_url).await?;

        let exe = std::env::current_exe().context("failed to get executable path")?;
        install_update(&compressed, &exe).context("failed to install update")?;

        println!("Update completed successfully!");
        println!("{BIN_NAME} has been updated to version {latest}");
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .context("download failed")?
            .error_for_status()
            .context("download failed")?
            .bytes()
            .await
            .context("download interrupted")?;
        info!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Unpacks `compressed` and installs it at `exe`, escalating with `sudo`
/// when the install directory is not writable.
fn install_update(compressed: &[u8], exe: &Path) -> Result<()> {
    let dir = exe
        .parent()
        .context("executable has no parent directory")?;

    if is_writable(dir) {
        let staged = Builder::new().prefix(".ecsy-update-").tempfile_in(dir)?;
        unpack(compressed, &staged)?;
        return replace_executable(staged, exe);
    }

    println!("Update requires administrative privileges...");
    let staged = Builder::new().prefix("ecsy-update-").tempfile()?;
    unpack(compressed, &staged)?;
    replace_with_sudo(staged.path(), exe)
}

/// Writes the gunzipped contents of `compressed` into `dst` and marks it executable.
fn unpack(compressed: &[u8], dst: &NamedTempFile) -> Result<()> {
    let mut decoder = GzDecoder::new(compressed);
    let mut file = dst.as_file();
    io::copy(&mut decoder, &mut file).context("failed to decompress")?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dst.path(), fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn is_writable(dir: &Path) -> bool {
    match Builder::new().prefix(".ecsy-write-test").tempfile_in(dir) {
        Ok(_) => true,
        Err(e) => {
            debug!("{} is not writable: {e}", dir.display());
            false
        }
    }
}

fn backup_path(exe: &Path) -> PathBuf {
    let mut name = exe.file_name().unwrap_or_default().to_os_string();
    name.push(".backup");
    exe.with_file_name(name)
}

/// Swaps `staged` into `exe`, restoring the previous executable on failure.
fn replace_executable(staged: NamedTempFile, exe: &Path) -> Result<()> {
    let backup = backup_path(exe);
    fs::rename(exe, &backup).context("failed to backup current executable")?;

    if let Err(e) = staged.persist(exe) {
        if let Err(restore) = fs::rename(&backup, exe) {
            warn!("Failed to restore {}: {restore}", backup.display());
        }
        return Err(e.error).context("failed to install new executable");
    }

    if let Err(e) = fs::remove_file(&backup) {
        warn!("Failed to remove {}: {e}", backup.display());
    }
    Ok(())
}

fn sudo(args: &[&Path], program: &str) -> Result<()> {
    let status = Command::new("sudo")
        .arg(program)
        .args(args)
        .status()
        .with_context(|| format!("failed to run sudo {program}"))?;
    ensure!(status.success(), "sudo {program} exited with {status}");
    Ok(())
}

fn replace_with_sudo(staged: &Path, exe: &Path) -> Result<()> {
    if cfg!(windows) {
        bail!("the install directory is not writable");
    }
    let backup = backup_path(exe);

    let has_backup = exe.exists();
    if has_backup {
        sudo(&[exe, backup.as_path()], "cp").context("failed to backup with sudo")?;
    }

    if let Err(e) = sudo(&[staged, exe], "mv") {
        if has_backup && let Err(restore) = sudo(&[backup.as_path(), exe], "mv") {
            warn!("Failed to restore {}: {restore:#}", backup.display());
        }
        return Err(e).context("failed to install with sudo");
    }

    if has_backup && let Err(e) = sudo(&[Path::new("-f"), backup.as_path()], "rm") {
        warn!("Failed to remove {}: {e:#}", backup.display());
    }
    Ok(())
}
