//! Driver binary installation
//!
//! External drivers are separate executables. Installing one means:
//!
//! 1. Fetch the binary (`http(s)://`, `file://` or a plain path)
//! 2. Verify its SHA-256 against the descriptor's checksum, if one is given
//! 3. Write it under the install directory and make it executable
//! 4. Start it with the listen port as its only argument
//! 5. Wait until the port accepts connections
//!
//! The [`DriverInstaller`] trait is the seam the KontainerDriver lifecycle
//! depends on; [`BinaryInstaller`] is the real implementation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::config::InstallerConfig;
use crate::retry::retry_with_backoff;
use crate::{Error, Result, LISTEN_HOST};

/// Installs, starts and stops driver binaries
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DriverInstaller: Send + Sync {
    /// Fetch and verify the binary for `name`, returning where it was written
    async fn download(&self, name: &str, url: &str, checksum: &str) -> Result<PathBuf>;

    /// Start `binary` listening on `port` (0 = pick one) and wait until it is reachable
    async fn start(&self, name: &str, binary: &Path, port: u16) -> Result<SocketAddr>;

    /// Stop the process started for `name`; stopping an unknown driver is not an error
    async fn stop(&self, name: &str) -> Result<()>;
}

/// Installer that runs drivers as child processes
pub struct BinaryInstaller {
    config: InstallerConfig,
    http: reqwest::Client,
    processes: Mutex<HashMap<String, Child>>,
}

impl BinaryInstaller {
    /// Create an installer writing binaries under `config.install_dir`
    pub fn new(config: InstallerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Where the binary for `name` is written
    pub fn binary_path(&self, name: &str) -> PathBuf {
        self.config.install_dir.join(name)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| Error::install(format!("failed to download {url}: {e}")))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::install(format!("failed to read {url}: {e}")))?;
            return Ok(bytes.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::install(format!("failed to read {path}: {e}")))
    }

    async fn write_executable(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.install_dir)
            .await
            .map_err(|e| Error::install(format!("failed to create install dir: {e}")))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| Error::install(format!("failed to write {}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| Error::install(format!("failed to chmod {}: {e}", path.display())))?;
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Check `bytes` against `checksum`; an empty checksum accepts anything
pub fn verify_checksum(bytes: &[u8], checksum: &str) -> Result<()> {
    let expected = checksum.trim();
    if expected.is_empty() {
        return Ok(());
    }
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::install(format!(
            "checksum mismatch: expected {expected}, got {actual}"
        )))
    }
}

/// Ask the OS for a free loopback port
fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(format!("{LISTEN_HOST}:0"))
        .map_err(|e| Error::install(format!("failed to find a free port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::install(format!("failed to find a free port: {e}")))?
        .port();
    Ok(port)
}

#[async_trait]
impl DriverInstaller for BinaryInstaller {
    async fn download(&self, name: &str, url: &str, checksum: &str) -> Result<PathBuf> {
        info!(driver = %name, %url, "downloading driver");
        let bytes = self.fetch(url).await?;
        verify_checksum(&bytes, checksum)?;

        let path = self.binary_path(name);
        self.write_executable(&path, &bytes).await?;
        debug!(driver = %name, path = %path.display(), size = bytes.len(), "driver written");
        Ok(path)
    }

    async fn start(&self, name: &str, binary: &Path, port: u16) -> Result<SocketAddr> {
        let port = if port == 0 { free_port()? } else { port };
        let address: SocketAddr = format!("{LISTEN_HOST}:{port}")
            .parse()
            .map_err(|e| Error::install(format!("invalid listen address: {e}")))?;

        // The previous process may still hold the port
        self.stop(name).await?;

        info!(driver = %name, binary = %binary.display(), port, "starting driver");
        let mut child = Command::new(binary)
            .arg(port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::install(format!("failed to start {}: {e}", binary.display())))?;

        let ready = tokio::select! {
            status = child.wait() => Err(match status {
                Ok(status) => Error::install(format!("driver {name} exited with {status}")),
                Err(e) => Error::install(format!("failed to wait for driver {name}: {e}")),
            }),
            ready = retry_with_backoff(&self.config.readiness, "wait_for_driver", || {
                TcpStream::connect(address)
            }) => ready.map(drop).map_err(|e| Error::install(format!(
                "driver {name} never became reachable on {address}: {e}"
            ))),
        };
        // Something else answering on the port does not make this child ready
        let ready = ready.and_then(|()| match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(Error::install(format!("driver {name} exited with {status}"))),
            Err(e) => Err(Error::install(format!("failed to poll driver {name}: {e}"))),
        });
        if let Err(e) = ready {
            if let Err(kill) = child.kill().await {
                debug!(driver = %name, error = %kill, "driver already gone");
            }
            return Err(e);
        }

        self.processes.lock().insert(name.to_string(), child);
        info!(driver = %name, %address, "driver is reachable");
        Ok(address)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let child = self.processes.lock().remove(name);
        match child {
            Some(mut child) => {
                info!(driver = %name, "stopping driver");
                child
                    .kill()
                    .await
                    .map_err(|e| Error::install(format!("failed to stop {name}: {e}")))
            }
            None => {
                debug!(driver = %name, "no running process to stop");
                Ok(())
            }
        }
    }
}
