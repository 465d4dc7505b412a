use colored::Colorize;

use crate::client::{AppRecord, AppState, ClientError, ManagementApi};
use crate::config::UpdaterConfig;
use crate::plex::{self, SessionVerdict};
use crate::poll::{self, PollOutcome};

/// Per-app classification. Exactly one per app per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Updated,
    UpToDate,
    Skipped,
    Failed,
}

/// Aggregate result of one run. `processed` always equals the number of apps
/// the listing returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dry_run: bool,
}

/// Walk every installed app once, in listing order, and trigger upgrades
/// where policy allows. An unreachable host or unparseable listing aborts
/// before any app is touched; per-app failures are recorded and the walk
/// continues.
pub fn run<A: ManagementApi>(api: &A, config: &UpdaterConfig) -> Result<RunSummary, ClientError> {
    let apps = api.list_apps()?;
    Ok(process_apps(api, config, &apps, |apps| {
        plex::check_sessions(config, apps)
    }))
}

fn process_apps<A: ManagementApi>(
    api: &A,
    config: &UpdaterConfig,
    apps: &[AppRecord],
    probe: impl Fn(&[AppRecord]) -> SessionVerdict,
) -> RunSummary {
    let mut summary = RunSummary {
        dry_run: config.dry_run,
        ..RunSummary::default()
    };
    for app in apps {
        summary.processed += 1;
        match update_one(api, config, apps, app, &probe) {
            Outcome::Updated => summary.updated += 1,
            Outcome::UpToDate => summary.up_to_date += 1,
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Failed => summary.failed += 1,
        }
    }
    summary
}

fn update_one<A: ManagementApi>(
    api: &A,
    config: &UpdaterConfig,
    apps: &[AppRecord],
    app: &AppRecord,
    probe: &impl Fn(&[AppRecord]) -> SessionVerdict,
) -> Outcome {
    let name = app.display_name();

    if config.dry_run {
        println!("{name}: {}", "would update".cyan());
        return Outcome::Updated;
    }

    // Plex gets the streaming guard: active or unverifiable playback blocks
    // the update unless forced.
    if app.is_plex() {
        match probe(apps) {
            SessionVerdict::SkippedCheck | SessionVerdict::Idle => {}
            SessionVerdict::Active { count, sessions } => {
                if config.force {
                    println!(
                        "{name}: {}",
                        format!("forcing update with {count} active session(s)").yellow()
                    );
                } else {
                    println!(
                        "{name}: {}",
                        format!("skipped ({count} active session(s))").yellow()
                    );
                    for session in &sessions {
                        println!(
                            "    {}: {} [{}]",
                            session.user, session.title, session.player_state
                        );
                    }
                    return Outcome::Skipped;
                }
            }
            SessionVerdict::Unverifiable(reason) => {
                if config.force {
                    println!("{name}: {}", format!("forcing update ({reason})").yellow());
                } else {
                    // Cannot verify means assume busy.
                    println!("{name}: {}", format!("skipped ({reason})").yellow());
                    return Outcome::Skipped;
                }
            }
        }
    }

    // Only quiescent or healthy-running apps get updated; anything mid-flight
    // or broken is left alone unless forced.
    if !config.force && !matches!(app.state, AppState::Running | AppState::Stopped) {
        println!(
            "{name}: {}",
            format!("skipped (state {})", app.state).yellow()
        );
        return Outcome::Skipped;
    }

    if !config.force && !app.update_pending() {
        println!("{name}: already up to date");
        return Outcome::UpToDate;
    }

    if let Err(e) = api.upgrade_app(&app.id) {
        println!("{name}: {}", format!("failed: {e}").red());
        return Outcome::Failed;
    }

    if !config.wait {
        println!("{name}: {}", "update triggered".green());
        return Outcome::Updated;
    }

    match poll::wait_for_ready(api, &app.id, config.wait_timeout, config.poll_interval) {
        PollOutcome::Completed => {
            println!("{name}: {}", "updated".green());
            Outcome::Updated
        }
        PollOutcome::Failed => {
            println!("{name}: {}", "update failed".red());
            Outcome::Failed
        }
        PollOutcome::TimedOut => {
            println!(
                "{name}: {}",
                format!(
                    "no terminal state after {}s",
                    config.wait_timeout.as_secs()
                )
                .red()
            );
            Outcome::Failed
        }
    }
}
