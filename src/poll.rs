use std::time::Duration;

use crate::client::{AppState, ClientError, ManagementApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    TimedOut,
}

/// Poll an app's status until it reaches a terminal state or the ceiling
/// elapses. RUNNING/STOPPED complete, FAILED/ERROR fail immediately,
/// anything else (including states this version does not recognize) keeps
/// polling.
pub fn wait_for_ready<A: ManagementApi>(
    api: &A,
    id: &str,
    max_wait: Duration,
    interval: Duration,
) -> PollOutcome {
    wait_with(
        || api.app_status(id).map(|app| app.state),
        std::thread::sleep,
        max_wait,
        interval,
    )
}

// Elapsed time advances by one interval per cycle and is checked before each
// fetch: a 20s ceiling at a 10s interval yields exactly two polls.
fn wait_with(
    mut fetch: impl FnMut() -> Result<AppState, ClientError>,
    mut sleep: impl FnMut(Duration),
    max_wait: Duration,
    interval: Duration,
) -> PollOutcome {
    let mut elapsed = Duration::ZERO;
    loop {
        if elapsed >= max_wait {
            return PollOutcome::TimedOut;
        }
        match fetch() {
            Ok(AppState::Running | AppState::Stopped) => return PollOutcome::Completed,
            Ok(AppState::Failed | AppState::Error) => return PollOutcome::Failed,
            // Still in flight; keep polling.
            Ok(_) => {}
            // A transient status-fetch failure is inconclusive, not fatal.
            Err(_) => {}
        }
        sleep(interval);
        elapsed += interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Duration = Duration::from_secs(600);
    const INTERVAL: Duration = Duration::from_secs(10);

    fn scripted(
        states: Vec<Result<AppState, ClientError>>,
    ) -> impl FnMut() -> Result<AppState, ClientError> {
        let mut remaining = states.into_iter();
        move || remaining.next().expect("polled past the scripted sequence")
    }

    #[test]
    fn completes_on_running_without_extra_polls() {
        let mut polls = 0;
        let mut fetch = scripted(vec![
            Ok(AppState::Updating),
            Ok(AppState::Updating),
            Ok(AppState::Running),
        ]);
        let outcome = wait_with(
            || {
                polls += 1;
                fetch()
            },
            |_| {},
            MAX,
            INTERVAL,
        );
        assert_eq!(outcome, PollOutcome::Completed);
        // The scripted sequence has exactly three entries; a fourth poll
        // would have panicked.
        assert_eq!(polls, 3);
    }

    #[test]
    fn stopped_is_also_terminal() {
        let outcome = wait_with(scripted(vec![Ok(AppState::Stopped)]), |_| {}, MAX, INTERVAL);
        assert_eq!(outcome, PollOutcome::Completed);
    }

    #[test]
    fn failed_state_stops_immediately() {
        let mut polls = 0;
        let mut fetch = scripted(vec![Ok(AppState::Deploying), Ok(AppState::Failed)]);
        let outcome = wait_with(
            || {
                polls += 1;
                fetch()
            },
            |_| {},
            MAX,
            INTERVAL,
        );
        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(polls, 2);
    }

    #[test]
    fn times_out_after_exactly_two_polls_at_twenty_seconds() {
        let mut polls = 0;
        let mut slept = Duration::ZERO;
        let outcome = wait_with(
            || {
                polls += 1;
                Ok(AppState::Deploying)
            },
            |d| slept += d,
            Duration::from_secs(20),
            INTERVAL,
        );
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(polls, 2);
        assert_eq!(slept, Duration::from_secs(20));
    }

    #[test]
    fn fetch_errors_are_inconclusive() {
        let outcome = wait_with(
            scripted(vec![
                Err(ClientError::FetchFailed {
                    what: "status for plex".to_string(),
                    detail: "503".to_string(),
                }),
                Ok(AppState::Running),
            ]),
            |_| {},
            MAX,
            INTERVAL,
        );
        assert_eq!(outcome, PollOutcome::Completed);
    }

    #[test]
    fn unknown_states_keep_polling() {
        let outcome = wait_with(
            scripted(vec![
                Ok(AppState::Unknown("ROLLING_BACK".to_string())),
                Ok(AppState::Running),
            ]),
            |_| {},
            MAX,
            INTERVAL,
        );
        assert_eq!(outcome, PollOutcome::Completed);
    }
}
