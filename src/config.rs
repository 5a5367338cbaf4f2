//! Server address resolution.
//!
//! The address is resolved once at startup and handed to the client as a
//! plain `host:port` string. Priority: explicit `--addr` > `LEIN_REPL_PORT`
//! env var > `.nrepl-port` file in the current directory or an ancestor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Host used when only a port is known.
pub const DEFAULT_HOST: &str = "localhost";

/// Environment variable Leiningen sets to the REPL port.
pub const PORT_ENV_VAR: &str = "LEIN_REPL_PORT";

/// Port file written by nREPL servers in the project root.
pub const PORT_FILE: &str = ".nrepl-port";

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server address as `host:port`.
    pub addr: String,
}

impl Config {
    /// Resolve the server address from the flag, environment and port file.
    pub fn from_env(explicit_addr: Option<&str>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let env_port = std::env::var(PORT_ENV_VAR).ok();
        let addr = resolve_addr(explicit_addr, env_port.as_deref(), &cwd)?;
        Ok(Self { addr })
    }
}

/// Resolve the address from already-gathered inputs.
///
/// An explicit address that is just a port number is expanded to
/// `localhost:<port>`. Empty values count as unset.
pub fn resolve_addr(
    explicit_addr: Option<&str>,
    env_port: Option<&str>,
    start_dir: &Path,
) -> Result<String> {
    if let Some(addr) = explicit_addr.map(str::trim).filter(|a| !a.is_empty()) {
        debug!(addr = %addr, "Using explicit address");
        if addr.bytes().all(|b| b.is_ascii_digit()) {
            let port = parse_port(addr).with_context(|| format!("Invalid port: '{addr}'"))?;
            return Ok(format!("{DEFAULT_HOST}:{port}"));
        }
        return Ok(addr.to_string());
    }

    if let Some(port) = env_port.map(str::trim).filter(|p| !p.is_empty()) {
        let port = parse_port(port)
            .with_context(|| format!("Invalid {PORT_ENV_VAR} value: '{port}'"))?;
        debug!(port, "Using port from {PORT_ENV_VAR}");
        return Ok(format!("{DEFAULT_HOST}:{port}"));
    }

    if let Some(path) = find_port_file(start_dir) {
        let port = read_port_file(&path)?;
        debug!(path = %path.display(), port, "Using port file");
        return Ok(format!("{DEFAULT_HOST}:{port}"));
    }

    anyhow::bail!(
        "No nREPL address: pass --addr, set {PORT_ENV_VAR}, or run inside a project with a {PORT_FILE} file"
    )
}

/// Find the nearest `.nrepl-port`, starting at `start_dir` and walking up.
pub fn find_port_file(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .map(|dir| dir.join(PORT_FILE))
        .find(|path| path.is_file())
}

/// Read and parse a port file.
pub fn read_port_file(path: &Path) -> Result<u16> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_port(contents.trim())
        .with_context(|| format!("Invalid port in {}: '{}'", path.display(), contents.trim()))
}

fn parse_port(s: &str) -> Result<u16> {
    let port: u16 = s.parse()?;
    anyhow::ensure!(port != 0, "port must be non-zero");
    Ok(port)
}
