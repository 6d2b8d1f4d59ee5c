//! Pre-flight rewriting of the daemon's line-oriented configuration.

use warden_config::{DaemonPaths, TransportPlugin};

use crate::files::{FileAccess, FileAccessError};

const TRANSPORT_DIRECTIVE: &str = "ClientTransportPlugin";
const SOCKS_DIRECTIVE: &str = "SocksPort";

/// Facts about the configuration that shape the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConfigFacts {
    /// Bridges are enabled and at least one is a webtunnel bridge.
    pub(crate) webtunnel: bool,
}

/// Points transport plugins at the configured binaries and, after a remap,
/// the socks listener at `remapped_port`. The file is rewritten only when
/// something changed.
pub(crate) fn prepare_config(
    files: &dyn FileAccess,
    paths: &DaemonPaths,
    remapped_port: Option<u16>,
) -> Result<ConfigFacts, FileAccessError> {
    let mut lines = files.read_lines(&paths.config)?;
    let mut changed = false;
    for line in &mut lines {
        let patched = if line.starts_with(TRANSPORT_DIRECTIVE) {
            substitute_transports(line, &paths.transports)
        } else if let Some(port) = remapped_port.filter(|_| line.starts_with(SOCKS_DIRECTIVE)) {
            rewrite_socks_port(line, port)
        } else {
            None
        };
        if let Some(patched) = patched {
            *line = patched;
            changed = true;
        }
    }
    if changed {
        files.rewrite_lines(&paths.config, &lines)?;
    }
    Ok(ConfigFacts {
        webtunnel: uses_webtunnel_bridges(&lines),
    })
}

/// Replaces the path ending in a known transport file name.
fn substitute_transports(line: &str, transports: &[TransportPlugin]) -> Option<String> {
    transports.iter().find_map(|transport| {
        let needle = format!("/{}", transport.file_name());
        let end = line.find(&needle)? + needle.len();
        let start = line.find('/')?;
        let (head, _) = line.split_at(start);
        let (_, tail) = line.split_at(end);
        let patched = format!("{head}{}{tail}", transport.path());
        (patched != line).then_some(patched)
    })
}

/// Rewrites the port of a `SocksPort [addr:]port [flags]` line.
fn rewrite_socks_port(line: &str, socks_port: u16) -> Option<String> {
    let mut tokens = line.split_whitespace();
    let directive = tokens.next()?;
    if directive != SOCKS_DIRECTIVE {
        return None;
    }
    let listener = tokens.next()?;
    let address = listener.rsplit_once(':').map(|(address, _)| address);
    let current = listener.rsplit(':').next()?;
    if current == socks_port.to_string() || current.parse::<u16>().is_err() {
        return None;
    }
    let mut patched = match address {
        Some(address) => format!("{directive} {address}:{socks_port}"),
        None => format!("{directive} {socks_port}"),
    };
    for flag in tokens {
        patched.push(' ');
        patched.push_str(flag);
    }
    Some(patched)
}

fn uses_webtunnel_bridges(lines: &[String]) -> bool {
    lines
        .iter()
        .position(|line| line.trim() == "UseBridges 1")
        .is_some_and(|enabled| {
            lines
                .iter()
                .skip(enabled + 1)
                .any(|line| line.trim_start().starts_with("Bridge webtunnel"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::SystemFileAccess;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn transports() -> Vec<TransportPlugin> {
        vec![
            TransportPlugin::new("libobfs4proxy.so", Utf8PathBuf::from("/opt/lib/libobfs4proxy.so")),
            TransportPlugin::new("libsnowflake.so", Utf8PathBuf::from("/opt/lib/libsnowflake.so")),
        ]
    }

    #[rstest]
    #[case(
        "ClientTransportPlugin obfs4 exec /data/old/lib/libobfs4proxy.so",
        Some("ClientTransportPlugin obfs4 exec /opt/lib/libobfs4proxy.so")
    )]
    #[case(
        "ClientTransportPlugin snowflake exec /old/libsnowflake.so -log x",
        Some("ClientTransportPlugin snowflake exec /opt/lib/libsnowflake.so -log x")
    )]
    #[case("ClientTransportPlugin obfs4 exec /opt/lib/libobfs4proxy.so", None)]
    #[case("ClientTransportPlugin meek exec /old/libmeek.so", None)]
    fn transport_paths_are_substituted(#[case] line: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            substitute_transports(line, &transports()).as_deref(),
            expected
        );
    }

    #[rstest]
    #[case("SocksPort 9051", 9052, Some("SocksPort 9052"))]
    #[case(
        "SocksPort 127.0.0.1:9051 IsolateDestAddr",
        9053,
        Some("SocksPort 127.0.0.1:9053 IsolateDestAddr")
    )]
    #[case("SocksPort 9051", 9051, None)]
    #[case("SocksPort auto", 9051, None)]
    fn socks_port_is_rewritten(
        #[case] line: &str,
        #[case] port: u16,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(rewrite_socks_port(line, port).as_deref(), expected);
    }

    #[rstest]
    #[case(&["UseBridges 1", "Bridge webtunnel 1.2.3.4:443 url=x"], true)]
    #[case(&["Bridge webtunnel 1.2.3.4:443 url=x", "UseBridges 1"], false)]
    #[case(&["UseBridges 0", "Bridge webtunnel 1.2.3.4:443"], false)]
    #[case(&["UseBridges 1", "Bridge obfs4 1.2.3.4:443"], false)]
    fn webtunnel_requires_enabled_bridges(#[case] lines: &[&str], #[case] expected: bool) {
        let lines: Vec<String> = lines.iter().map(|line| (*line).to_owned()).collect();
        assert_eq!(uses_webtunnel_bridges(&lines), expected);
    }

    #[test]
    fn unchanged_config_is_not_rewritten() {
        let dir = TempDir::new().expect("temp dir");
        let config = Utf8PathBuf::from_path_buf(dir.path().join("tor.conf")).expect("utf-8");
        fs::write(&config, "SocksPort 9051\nUseBridges 1\nBridge webtunnel x\n")
            .expect("write config");
        let before = fs::metadata(&config).expect("metadata").modified().expect("mtime");
        let paths = DaemonPaths {
            binary: Utf8PathBuf::from("tor"),
            config: config.clone(),
            template: None,
            pid_file: Utf8PathBuf::from("tor.pid"),
            log_file: Utf8PathBuf::from("Tor.log"),
            consensus_cache: Utf8PathBuf::from("cached-microdesc-consensus"),
            library_dir: Utf8PathBuf::from("lib"),
            transports: transports(),
        };

        let facts = prepare_config(&SystemFileAccess, &paths, Some(9051)).expect("prepare");

        assert!(facts.webtunnel);
        let after = fs::metadata(&config).expect("metadata").modified().expect("mtime");
        assert_eq!(before, after);
    }

    fn paths_for(config: Utf8PathBuf) -> DaemonPaths {
        DaemonPaths {
            binary: Utf8PathBuf::from("tor"),
            config,
            template: None,
            pid_file: Utf8PathBuf::from("tor.pid"),
            log_file: Utf8PathBuf::from("Tor.log"),
            consensus_cache: Utf8PathBuf::from("cached-microdesc-consensus"),
            library_dir: Utf8PathBuf::from("lib"),
            transports: Vec::new(),
        }
    }

    #[rstest]
    #[case(None, "SocksPort 9050\n")]
    #[case(Some(9052), "SocksPort 9052\n")]
    fn socks_port_follows_only_a_remap(#[case] remapped: Option<u16>, #[case] expected: &str) {
        let dir = TempDir::new().expect("temp dir");
        let config = Utf8PathBuf::from_path_buf(dir.path().join("tor.conf")).expect("utf-8");
        fs::write(&config, "SocksPort 9050\n").expect("write config");

        prepare_config(&SystemFileAccess, &paths_for(config.clone()), remapped).expect("prepare");

        assert_eq!(fs::read_to_string(&config).expect("read config"), expected);
    }
}
