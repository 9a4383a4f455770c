//! Uptime derived from the event log
//!
//! Only state events count. A RUNNING event opens an interval and the next
//! state event that is not RUNNING closes it; an interval still open is
//! measured up to `now`.

use chrono::{DateTime, Duration, Utc};
use flotilla_types::{DeploymentState, Event};

/// Time since the deployment first reached RUNNING, up to the first
/// terminal or failed state after it. None if it never ran.
pub fn uptime_first_instance(events: &[Event], now: DateTime<Utc>) -> Option<Duration> {
    let mut states = state_changes(events);
    let (started, _) = states.find(|(_, state)| *state == DeploymentState::Running)?;

    let ended = states
        .find(|(_, state)| state.is_terminal() || state.is_rollback() || *state == DeploymentState::Failed)
        .map(|(at, _)| at)
        .unwrap_or(now);

    Some(ended - started)
}

/// Total time spent in RUNNING across every interval
pub fn uptime_all(events: &[Event], now: DateTime<Utc>) -> Duration {
    let mut total = Duration::zero();
    let mut open: Option<DateTime<Utc>> = None;

    for (at, state) in state_changes(events) {
        match (open, state == DeploymentState::Running) {
            (None, true) => open = Some(at),
            (Some(since), false) => {
                total = total + (at - since);
                open = None;
            }
            _ => {}
        }
    }

    if let Some(since) = open {
        total = total + (now - since);
    }
    total
}

fn state_changes(events: &[Event]) -> impl Iterator<Item = (DateTime<Utc>, DeploymentState)> + '_ {
    events
        .iter()
        .filter_map(|e| e.status.state().map(|state| (e.timestamp, state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flotilla_types::{DeploymentId, EventStatus};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    fn history(steps: &[(u32, EventStatus)]) -> Vec<Event> {
        let id = DeploymentId::generate();
        steps
            .iter()
            .map(|(minute, status)| {
                Event::new(id.clone(), *status, status.default_summary(), None).at(at(*minute))
            })
            .collect()
    }

    fn state(s: DeploymentState) -> EventStatus {
        EventStatus::State(s)
    }

    #[test]
    fn test_never_running() {
        let events = history(&[(0, state(DeploymentState::Pending))]);
        assert_eq!(uptime_first_instance(&events, at(30)), None);
        assert_eq!(uptime_all(&events, at(30)), Duration::zero());
    }

    #[test]
    fn test_open_interval_runs_to_now() {
        let events = history(&[
            (0, state(DeploymentState::Pending)),
            (5, state(DeploymentState::Running)),
        ]);
        assert_eq!(uptime_first_instance(&events, at(20)), Some(Duration::minutes(15)));
        assert_eq!(uptime_all(&events, at(20)), Duration::minutes(15));
    }

    #[test]
    fn test_incomplete_gaps_are_excluded() {
        let events = history(&[
            (0, state(DeploymentState::Pending)),
            (5, state(DeploymentState::Running)),
            (10, state(DeploymentState::Incomplete)),
            (12, EventStatus::InstanceStopFailed),
            (20, state(DeploymentState::Running)),
            (25, state(DeploymentState::ShuttingDown)),
            (30, state(DeploymentState::Stopped)),
        ]);

        assert_eq!(uptime_all(&events, at(59)), Duration::minutes(10));
        assert_eq!(uptime_first_instance(&events, at(59)), Some(Duration::minutes(25)));
    }
}
