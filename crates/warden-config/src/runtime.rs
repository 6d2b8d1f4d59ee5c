//! Derives the on-disk layout shared by the supervisor, the daemons, and the
//! control CLI.
//!
//! The runtime directory houses the supervisor lock, pid, and state snapshot.
//! Every binary needs to agree on the layout so lifecycle commands can
//! interact with the files written by `wardend`.

use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

/// Canonical paths for runtime artefacts written by the supervisor.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    state_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the shared configuration, creating the
    /// directory when missing.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let runtime_dir = config.data_dir().as_std_path().to_path_buf();
        fs::create_dir_all(&runtime_dir).map_err(|source| RuntimePathsError::RuntimeDirectory {
            path: runtime_dir.clone(),
            source,
        })?;
        Ok(Self::in_directory(runtime_dir))
    }

    /// Builds the layout under `runtime_dir` without touching the filesystem.
    #[must_use]
    pub fn in_directory(runtime_dir: PathBuf) -> Self {
        Self {
            lock_path: runtime_dir.join("wardend.lock"),
            pid_path: runtime_dir.join("wardend.pid"),
            state_path: runtime_dir.join("wardend.state"),
            runtime_dir,
        }
    }

    /// Directory holding runtime artefacts.
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path to the lock file guarding singleton startup.
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the supervisor PID file.
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the published lifecycle state.
    pub fn state_path(&self) -> &Path {
        self.state_path.as_path()
    }
}

/// An auxiliary transport module referenced from the daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPlugin {
    file_name: &'static str,
    path: Utf8PathBuf,
}

impl TransportPlugin {
    /// Describes a transport whose configured location is `path`.
    #[must_use]
    pub const fn new(file_name: &'static str, path: Utf8PathBuf) -> Self {
        Self { file_name, path }
    }

    /// File name the daemon configuration refers to, e.g. `libobfs4proxy.so`.
    #[must_use]
    pub const fn file_name(&self) -> &'static str {
        self.file_name
    }

    /// Path substituted into the daemon configuration.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_path()
    }
}

/// Resolved locations for the primary daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    /// Daemon executable.
    pub binary: Utf8PathBuf,
    /// Configuration file patched before launch.
    pub config: Utf8PathBuf,
    /// Known-good configuration used for resets.
    pub template: Option<Utf8PathBuf>,
    /// PID file the daemon writes.
    pub pid_file: Utf8PathBuf,
    /// Log file truncated before launch.
    pub log_file: Utf8PathBuf,
    /// Cached consensus dropped before a recovery restart.
    pub consensus_cache: Utf8PathBuf,
    /// Directory exported as `LD_LIBRARY_PATH`.
    pub library_dir: Utf8PathBuf,
    /// Transport modules substituted into `ClientTransportPlugin` lines.
    pub transports: Vec<TransportPlugin>,
}

impl DaemonPaths {
    /// Resolves every optional path against the data and library directories.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let data_dir = config.data_dir();
        let library_dir = config.library_dir();
        let transport = |name: &'static str, configured: Option<&Utf8PathBuf>| {
            TransportPlugin::new(
                name,
                configured
                    .cloned()
                    .unwrap_or_else(|| library_dir.join(name)),
            )
        };
        let transports = vec![
            transport("libobfs4proxy.so", config.obfs4_transport.as_ref()),
            transport("libsnowflake.so", config.snowflake_transport.as_ref()),
            transport("libwebtunnel.so", config.webtunnel_transport.as_ref()),
        ];
        Self {
            binary: config.daemon_binary.clone(),
            config: resolve(config.daemon_config.as_ref(), data_dir, "app_data/tor/tor.conf"),
            template: config.daemon_config_template.clone(),
            pid_file: resolve(config.daemon_pid_file.as_ref(), data_dir, "tor.pid"),
            log_file: resolve(config.daemon_log_file.as_ref(), data_dir, "logs/Tor.log"),
            consensus_cache: data_dir.join("tor_data/cached-microdesc-consensus"),
            transports,
            library_dir,
        }
    }
}

/// Resolved locations for the dependent reverse proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPaths {
    /// Proxy executable.
    pub binary: Utf8PathBuf,
    /// PID file the proxy writes.
    pub pid_file: Utf8PathBuf,
    /// Directory exported as `LD_LIBRARY_PATH`.
    pub library_dir: Utf8PathBuf,
}

impl ProxyPaths {
    /// Resolves the proxy paths against the data directory.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.proxy_binary.clone(),
            pid_file: resolve(
                config.proxy_pid_file.as_ref(),
                config.data_dir(),
                "reverse-proxy.pid",
            ),
            library_dir: config.library_dir(),
        }
    }
}

fn resolve(configured: Option<&Utf8PathBuf>, base: &Utf8Path, fallback: &str) -> Utf8PathBuf {
    configured.cloned().unwrap_or_else(|| base.join(fallback))
}

/// Errors raised while deriving supervisor runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
