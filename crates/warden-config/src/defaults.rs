use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Port the primary daemon listens on for SOCKS traffic.
pub const DEFAULT_SOCKS_PORT: u16 = 9051;

/// Port the dependent reverse proxy listens on.
pub const DEFAULT_PROXY_PORT: u16 = 8181;

/// Host contacted through the daemon to confirm end-to-end connectivity.
pub const DEFAULT_CHECK_HOST: &str = "check.torproject.org";

/// Port used together with [`DEFAULT_CHECK_HOST`].
pub const DEFAULT_CHECK_PORT: u16 = 443;

/// Hosts handed to the daemon as decoy SNI names.
pub const DEFAULT_FAKE_SNI_HOSTS: &[&str] = &[
    "play.googleapis.com",
    "drive.google.com",
    "cdn.ampproject.org",
    "api.github.com",
    "ajax.aspnetcdn.com",
    "verizon.com",
    "eset.com",
];

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Owned copy of [`DEFAULT_FAKE_SNI_HOSTS`].
pub fn default_fake_sni_hosts() -> Vec<String> {
    DEFAULT_FAKE_SNI_HOSTS
        .iter()
        .map(|host| (*host).to_owned())
        .collect()
}

/// Computes the directory that holds supervisor and daemon artefacts.
pub fn default_data_dir() -> Utf8PathBuf {
    default_data_dir_inner()
}

#[cfg(unix)]
fn default_data_dir_inner() -> Utf8PathBuf {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("warden");
    if apply_namespace {
        base.push(user_namespace());
    }
    base
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(not(unix))]
fn default_data_dir_inner() -> Utf8PathBuf {
    let mut base = fallback_base_directory();
    base.push("warden");
    base
}
