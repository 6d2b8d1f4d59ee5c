//! Shared configuration for the warden supervisor and its control CLI.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a
//! configuration file, then `WARDEN_*` environment variables, then command
//! line flags. Path fields that are left unset resolve relative to
//! [`Config::data_dir`] through [`DaemonPaths`], [`ProxyPaths`], and
//! [`RuntimePaths`].

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod runtime;

pub use defaults::{
    DEFAULT_CHECK_HOST, DEFAULT_CHECK_PORT, DEFAULT_FAKE_SNI_HOSTS, DEFAULT_LOG_FILTER,
    DEFAULT_PROXY_PORT, DEFAULT_SOCKS_PORT, default_data_dir, default_fake_sni_hosts,
    default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{DaemonPaths, ProxyPaths, RuntimePaths, RuntimePathsError, TransportPlugin};

/// Resolved configuration shared by `wardend` and `warden`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WARDEN")]
pub struct Config {
    /// `tracing_subscriber::EnvFilter` expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Directory holding supervisor artefacts and default daemon paths.
    #[ortho_config(default = defaults::default_data_dir())]
    pub data_dir: Utf8PathBuf,
    /// Native library directory exported to the daemons.
    pub library_dir: Option<Utf8PathBuf>,
    /// Primary daemon executable.
    #[ortho_config(default = Utf8PathBuf::from("tor"))]
    pub daemon_binary: Utf8PathBuf,
    /// Line-oriented daemon configuration patched before each launch.
    pub daemon_config: Option<Utf8PathBuf>,
    /// Known-good configuration restored after a crash.
    pub daemon_config_template: Option<Utf8PathBuf>,
    /// PID file written by the primary daemon.
    pub daemon_pid_file: Option<Utf8PathBuf>,
    /// Log file truncated before each primary launch.
    pub daemon_log_file: Option<Utf8PathBuf>,
    /// SOCKS port the primary daemon binds.
    #[ortho_config(default = defaults::DEFAULT_SOCKS_PORT)]
    pub socks_port: u16,
    /// Override for the obfs4 transport binary.
    pub obfs4_transport: Option<Utf8PathBuf>,
    /// Override for the snowflake transport binary.
    pub snowflake_transport: Option<Utf8PathBuf>,
    /// Override for the webtunnel transport binary.
    pub webtunnel_transport: Option<Utf8PathBuf>,
    /// Decoy SNI hosts passed to the daemon.
    #[ortho_config(default = defaults::default_fake_sni_hosts())]
    pub fake_sni_hosts: Vec<String>,
    /// Rewrite the SOCKS port to a free neighbour when it stays occupied.
    #[ortho_config(default = false)]
    pub remap_busy_ports: bool,
    /// Leave the reverse proxy unsupervised.
    #[ortho_config(default = false)]
    pub disable_proxy: bool,
    /// Reverse proxy executable.
    #[ortho_config(default = Utf8PathBuf::from("reverse-proxy"))]
    pub proxy_binary: Utf8PathBuf,
    /// PID file written by the reverse proxy.
    pub proxy_pid_file: Option<Utf8PathBuf>,
    /// Port the reverse proxy binds.
    #[ortho_config(default = defaults::DEFAULT_PROXY_PORT)]
    pub proxy_port: u16,
    /// Host reached through the daemon when checking connectivity.
    #[ortho_config(default = defaults::DEFAULT_CHECK_HOST.to_owned())]
    pub check_host: String,
    /// Port reached through the daemon when checking connectivity.
    #[ortho_config(default = defaults::DEFAULT_CHECK_PORT)]
    pub check_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            data_dir: defaults::default_data_dir(),
            library_dir: None,
            daemon_binary: Utf8PathBuf::from("tor"),
            daemon_config: None,
            daemon_config_template: None,
            daemon_pid_file: None,
            daemon_log_file: None,
            socks_port: DEFAULT_SOCKS_PORT,
            obfs4_transport: None,
            snowflake_transport: None,
            webtunnel_transport: None,
            fake_sni_hosts: defaults::default_fake_sni_hosts(),
            remap_busy_ports: false,
            disable_proxy: false,
            proxy_binary: Utf8PathBuf::from("reverse-proxy"),
            proxy_pid_file: None,
            proxy_port: DEFAULT_PROXY_PORT,
            check_host: DEFAULT_CHECK_HOST.to_owned(),
            check_port: DEFAULT_CHECK_PORT,
        }
    }
}

impl Config {
    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the directory holding runtime artefacts.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8Path {
        self.data_dir.as_path()
    }

    /// Returns the primary daemon's SOCKS port.
    #[must_use]
    pub const fn socks_port(&self) -> u16 {
        self.socks_port
    }

    /// Returns the reverse proxy port.
    #[must_use]
    pub const fn proxy_port(&self) -> u16 {
        self.proxy_port
    }

    /// Reports whether the reverse proxy is supervised.
    #[must_use]
    pub const fn proxy_enabled(&self) -> bool {
        !self.disable_proxy
    }

    /// Returns the decoy SNI hosts.
    #[must_use]
    pub fn fake_sni_hosts(&self) -> &[String] {
        &self.fake_sni_hosts
    }

    /// Reports whether a busy SOCKS port may be remapped.
    #[must_use]
    pub const fn remap_busy_ports(&self) -> bool {
        self.remap_busy_ports
    }

    /// Returns the connectivity check target as `(host, port)`.
    #[must_use]
    pub fn check_target(&self) -> (&str, u16) {
        (self.check_host.as_str(), self.check_port)
    }

    /// Returns the native library directory.
    #[must_use]
    pub fn library_dir(&self) -> Utf8PathBuf {
        self.library_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("lib"))
    }
}
