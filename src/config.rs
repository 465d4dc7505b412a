use std::time::Duration;

use clap::Parser;

/// Update TrueNAS SCALE apps, holding off on Plex while anyone is streaming.
#[derive(Debug, Parser)]
#[command(name = "tnup", version, about, long_about = None)]
pub struct Cli {
    /// TrueNAS host (IP or hostname, no scheme).
    #[arg(long, env = "TRUENAS_HOST", value_name = "HOST")]
    pub host: String,

    /// TrueNAS API key used as the bearer credential.
    #[arg(long, env = "TRUENAS_API_KEY", value_name = "KEY", hide_env_values = true)]
    pub api_key: String,

    /// Report what would be updated without triggering anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Update regardless of app state or active Plex sessions.
    #[arg(long)]
    pub force: bool,

    /// Wait for each triggered update to reach a terminal state.
    #[arg(long)]
    pub wait: bool,

    /// Ceiling in seconds for --wait polling, per app.
    #[arg(long, default_value_t = 600, value_name = "SECONDS")]
    pub wait_timeout: u64,

    /// Seconds between status polls while waiting.
    #[arg(long, default_value_t = 10, value_name = "SECONDS")]
    pub poll_interval: u64,

    /// Skip the Plex active-session check entirely.
    #[arg(long)]
    pub skip_session_check: bool,

    /// Plex host override (defaults to auto-detection from the app list).
    #[arg(long, env = "PLEX_HOST", value_name = "HOST")]
    pub plex_host: Option<String>,

    /// Plex port.
    #[arg(long, env = "PLEX_PORT", default_value_t = 32400, value_name = "PORT")]
    pub plex_port: u16,

    /// Plex token for the session check.
    #[arg(long, env = "PLEX_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub plex_token: Option<String>,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,
}

/// Immutable run configuration, built once from the CLI and passed by
/// reference into the orchestrator.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub host: String,
    pub api_key: String,
    pub dry_run: bool,
    pub force: bool,
    pub wait: bool,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// False means the Plex guard is bypassed by policy, not that Plex was
    /// confirmed idle.
    pub check_sessions: bool,
    pub plex: PlexConfig,
}

#[derive(Debug, Clone)]
pub struct PlexConfig {
    pub host: Option<String>,
    pub port: u16,
    pub token: Option<String>,
}

impl From<Cli> for UpdaterConfig {
    fn from(cli: Cli) -> Self {
        UpdaterConfig {
            host: cli.host,
            api_key: cli.api_key,
            dry_run: cli.dry_run,
            force: cli.force,
            wait: cli.wait,
            wait_timeout: Duration::from_secs(cli.wait_timeout),
            poll_interval: Duration::from_secs(cli.poll_interval),
            check_sessions: !cli.skip_session_check,
            plex: PlexConfig {
                host: cli.plex_host,
                port: cli.plex_port,
                token: cli.plex_token,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> UpdaterConfig {
        let mut argv = vec!["tnup", "--host", "nas.local", "--api-key", "k"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().into()
    }

    #[test]
    fn defaults() {
        let config = parse(&[]);
        assert_eq!(config.host, "nas.local");
        assert!(!config.dry_run);
        assert!(!config.force);
        assert!(!config.wait);
        assert!(config.check_sessions);
        assert_eq!(config.wait_timeout, Duration::from_secs(600));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.plex.port, 32400);
        assert!(config.plex.host.is_none());
    }

    #[test]
    fn skip_session_check_inverts_into_check_sessions() {
        let config = parse(&["--skip-session-check"]);
        assert!(!config.check_sessions);
    }

    #[test]
    fn plex_overrides() {
        let config = parse(&[
            "--plex-host",
            "media.local",
            "--plex-port",
            "32401",
            "--plex-token",
            "t0k",
        ]);
        assert_eq!(config.plex.host.as_deref(), Some("media.local"));
        assert_eq!(config.plex.port, 32401);
        assert_eq!(config.plex.token.as_deref(), Some("t0k"));
    }

    #[test]
    fn wait_knobs_become_durations() {
        let config = parse(&["--wait", "--wait-timeout", "20", "--poll-interval", "5"]);
        assert!(config.wait);
        assert_eq!(config.wait_timeout, Duration::from_secs(20));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }
}
