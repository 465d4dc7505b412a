use reqwest::header::ACCEPT;
use serde::Deserialize;
use thiserror::Error;

use crate::client::AppRecord;
use crate::config::UpdaterConfig;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no Plex token configured; cannot verify active sessions")]
    MissingToken,
    #[error("Plex at {host}:{port} is unreachable: {detail}")]
    Unreachable {
        host: String,
        port: u16,
        detail: String,
    },
    #[error("could not parse the Plex session payload")]
    Unparseable,
}

/// One active playback session, best-effort. Fields the server omits default
/// to "Unknown"/"unknown".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user: String,
    pub title: String,
    pub player_state: String,
}

/// What the orchestrator acts on. `Unverifiable` is deliberately
/// indistinguishable from busy at the policy level: a check that cannot run
/// must never read as "no sessions".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionVerdict {
    /// Check disabled by configuration. A policy choice, not a measurement.
    SkippedCheck,
    Idle,
    Active {
        count: u64,
        sessions: Vec<SessionInfo>,
    },
    Unverifiable(String),
}

// The sessions endpoint answers JSON or a legacy XML-flavored text format
// depending on server configuration, so parsing is two-path: structured
// first, then a `size="N"` attribute scan.
enum ParsedSessions {
    Structured {
        size: u64,
        sessions: Vec<SessionInfo>,
    },
    LegacyCount(u64),
}

#[derive(Deserialize)]
struct SessionsResponse {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

#[derive(Deserialize)]
struct MediaContainer {
    #[serde(default)]
    size: u64,
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Metadata>,
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "grandparentTitle", default)]
    grandparent_title: Option<String>,
    #[serde(rename = "User", default)]
    user: Option<PlexUser>,
    #[serde(rename = "Player", default)]
    player: Option<Player>,
}

#[derive(Deserialize)]
struct PlexUser {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct Player {
    #[serde(default)]
    state: Option<String>,
}

/// Determine whether Plex has active playback before an update disrupts it.
/// Every failure mode collapses into `Unverifiable`; the caller applies the
/// fail-safe policy.
pub fn check_sessions(config: &UpdaterConfig, apps: &[AppRecord]) -> SessionVerdict {
    if !config.check_sessions {
        return SessionVerdict::SkippedCheck;
    }
    match fetch_sessions(config, apps).and_then(|body| parse_sessions(&body)) {
        Ok(parsed) => verdict(parsed),
        Err(e) => SessionVerdict::Unverifiable(e.to_string()),
    }
}

/// Resolve the Plex host: an explicit override wins. Auto-detection scans
/// the app listing for a Plex app but cannot learn a distinct address from
/// it (the API does not expose one), so it falls back to the management
/// host either way.
fn resolve_host(config: &UpdaterConfig, apps: &[AppRecord]) -> String {
    if let Some(host) = &config.plex.host {
        return host.clone();
    }
    if apps.iter().any(AppRecord::is_plex) {
        return config.host.clone();
    }
    config.host.clone()
}

fn fetch_sessions(config: &UpdaterConfig, apps: &[AppRecord]) -> Result<String, SessionError> {
    let token = config.plex.token.as_deref().ok_or(SessionError::MissingToken)?;
    let host = resolve_host(config, apps);
    let port = config.plex.port;
    let unreachable = |detail: String| SessionError::Unreachable {
        host: host.clone(),
        port,
        detail,
    };

    let http = reqwest::blocking::Client::builder()
        .user_agent(format!("truenas-app-updater/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| unreachable(e.to_string()))?;

    // Token goes in the query string, per Plex convention, not a header.
    let response = http
        .get(format!("http://{host}:{port}/status/sessions"))
        .query(&[("X-Plex-Token", token)])
        .header(ACCEPT, "application/json")
        .send()
        .map_err(|e| unreachable(e.to_string()))?;
    response.text().map_err(|e| unreachable(e.to_string()))
}

fn parse_sessions(body: &str) -> Result<ParsedSessions, SessionError> {
    if let Ok(parsed) = serde_json::from_str::<SessionsResponse>(body) {
        let container = parsed.media_container;
        let sessions = container.metadata.iter().map(session_info).collect();
        return Ok(ParsedSessions::Structured {
            size: container.size,
            sessions,
        });
    }
    match legacy_size(body) {
        Some(size) => Ok(ParsedSessions::LegacyCount(size)),
        None => Err(SessionError::Unparseable),
    }
}

fn verdict(parsed: ParsedSessions) -> SessionVerdict {
    match parsed {
        ParsedSessions::Structured { size: 0, .. } | ParsedSessions::LegacyCount(0) => {
            SessionVerdict::Idle
        }
        ParsedSessions::Structured { size, sessions } => SessionVerdict::Active {
            count: size,
            sessions,
        },
        ParsedSessions::LegacyCount(count) => SessionVerdict::Active {
            count,
            sessions: Vec::new(),
        },
    }
}

fn session_info(meta: &Metadata) -> SessionInfo {
    SessionInfo {
        user: meta
            .user
            .as_ref()
            .and_then(|u| u.title.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        // grandparentTitle carries the show name for episodes; plain title
        // covers movies.
        title: meta
            .grandparent_title
            .clone()
            .or_else(|| meta.title.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        player_state: meta
            .player
            .as_ref()
            .and_then(|p| p.state.clone())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

/// Legacy XML-flavored payloads carry the session count as a `size="N"`
/// attribute on the MediaContainer element.
fn legacy_size(body: &str) -> Option<u64> {
    let start = body.find("size=\"")? + "size=\"".len();
    let rest = &body[start..];
    let end = rest.find('"')?;
    rest[..end].parse().ok()
}
