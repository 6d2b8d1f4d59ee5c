//! Daemon invocation lines.

use std::borrow::Cow;

use camino::Utf8Path;
use warden_config::{DaemonPaths, ProxyPaths};

/// Builds the primary daemon's command line.
///
/// `exec` replaces the shell so the PID the runner tracks is the daemon's.
/// Fake SNI hosts are dropped when webtunnel bridges are configured because
/// that transport rejects them.
pub(crate) fn daemon_command(paths: &DaemonPaths, fake_sni_hosts: &[String], webtunnel: bool) -> String {
    let mut command = format!(
        "exec {} -f {} -pidfile {}",
        quote_path(&paths.binary),
        quote_path(&paths.config),
        quote_path(&paths.pid_file),
    );
    if !webtunnel && !fake_sni_hosts.is_empty() {
        command.push_str(" -fake-hosts ");
        command.push_str(&quote(&fake_sni_hosts.join(",")));
    }
    command
}

/// Builds the dependent proxy's command line.
pub(crate) fn proxy_command(paths: &ProxyPaths, proxy_port: u16, socks_port: u16) -> String {
    format!(
        "exec {} -proxyport {proxy_port} -sockport {socks_port} -pidfile {}",
        quote_path(&paths.binary),
        quote_path(&paths.pid_file),
    )
}

fn quote_path(path: &Utf8Path) -> Cow<'_, str> {
    quote(path.as_str())
}

/// Single-quotes `raw` unless it only holds characters the shell leaves alone.
fn quote(raw: &str) -> Cow<'_, str> {
    let plain = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ',' | ':' | '='));
    if plain {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(format!("'{}'", raw.replace('\'', r"'\''")))
    }
}
