//! Consecutive-active-day streak.
//!
//! The streak lives on the rollup document as three fields:
//! `focusStreak`, `focusStreakAt` (day the count was last advanced) and
//! `updatedAt` (last day with recorded activity). Each evaluation picks one
//! transition from the gap between today and `focusStreakAt`:
//!
//! | `focusStreakAt` | gap  | active today | transition  |
//! |-----------------|------|--------------|-------------|
//! | none            |      |              | `Rebuild`   |
//! | set             | >= 2 | no           | `Reset`     |
//! | set             | >= 2 | yes          | `Restart`   |
//! | set             | 1    | yes          | `Extend`    |
//! | set             | 1    | no, yesterday| `Pending`   |
//! | set             | else |              | `Unchanged` |

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use super::rollup::{day_key, load_rollup, GlobalRollup};
use crate::error::Result;
use crate::sessions;
use crate::storage::{paths, DocumentStore, Patch};

/// Streak fields of the rollup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakState {
    pub count: u32,
    pub streak_at: Option<NaiveDate>,
    pub updated_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// No streak recorded yet; recount from the session log.
    Rebuild,
    /// Gap of two or more days and nothing today.
    Reset,
    /// Gap of two or more days, but a session landed today.
    Restart,
    /// Yesterday's streak carried into today.
    Extend,
    /// Last activity was yesterday and today's session is not known yet.
    Pending,
    Unchanged,
}

/// Result of a streak evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakOutcome {
    pub count: u32,
    pub pending_confirmation: bool,
}

impl From<&GlobalRollup> for StreakState {
    fn from(rollup: &GlobalRollup) -> Self {
        Self {
            count: rollup.focus_streak,
            streak_at: rollup.focus_streak_at,
            updated_at: rollup.updated_at,
        }
    }
}

impl StreakState {
    /// Record that a session happened on `today`.
    pub fn mark_activity(&mut self, today: NaiveDate) {
        self.updated_at = Some(today);
    }

    pub fn transition(&self, today: NaiveDate) -> StreakTransition {
        let Some(streak_at) = self.streak_at else {
            return StreakTransition::Rebuild;
        };
        let active_today = self.updated_at == Some(today);
        match (today - streak_at).num_days() {
            gap if gap >= 2 && active_today => StreakTransition::Restart,
            gap if gap >= 2 => StreakTransition::Reset,
            1 if active_today => StreakTransition::Extend,
            1 if self.updated_at == Some(streak_at) => StreakTransition::Pending,
            _ => StreakTransition::Unchanged,
        }
    }

    /// State after `transition`. `rebuilt` is the recount used by `Rebuild`.
    pub fn apply(self, transition: StreakTransition, today: NaiveDate, rebuilt: u32) -> Self {
        let advanced = |count| Self {
            count,
            streak_at: Some(today),
            updated_at: Some(today),
        };
        match transition {
            StreakTransition::Rebuild => advanced(rebuilt),
            StreakTransition::Restart => advanced(1),
            StreakTransition::Extend => advanced(self.count.saturating_add(1)),
            StreakTransition::Reset => Self { count: 0, ..self },
            StreakTransition::Pending | StreakTransition::Unchanged => self,
        }
    }

    fn patch(&self, transition: StreakTransition) -> Option<Patch> {
        match transition {
            StreakTransition::Pending | StreakTransition::Unchanged => None,
            StreakTransition::Reset => Some(Patch::new().set("focusStreak", 0)),
            _ => {
                let mut patch = Patch::new().set("focusStreak", self.count);
                if let Some(at) = self.streak_at {
                    patch = patch.set("focusStreakAt", day_key(at));
                }
                if let Some(updated) = self.updated_at {
                    patch = patch.set("updatedAt", day_key(updated));
                }
                Some(patch)
            }
        }
    }
}

/// Length of the run of consecutive days in `days` that ends on `today`.
pub fn streak_ending_on(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut count = 0;
    let mut day = Some(today);
    while let Some(d) = day.filter(|d| days.contains(d)) {
        count += 1;
        day = d.pred_opt();
    }
    count
}

/// Evaluate and persist the streak for `today`.
///
/// `activity_today` is set when called for a session being saved; the
/// on-demand check passes `false`.
pub fn reconcile<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    today: NaiveDate,
    activity_today: bool,
) -> Result<StreakOutcome> {
    let mut state = StreakState::from(&load_rollup(store, user_id)?);
    if activity_today {
        state.mark_activity(today);
    }
    let rebuilt = match state.transition(today) {
        StreakTransition::Rebuild => {
            let mut days = sessions::active_days(store, user_id)?;
            if activity_today {
                days.insert(today);
            }
            Some(streak_ending_on(&days, today))
        }
        _ => None,
    };

    let mut outcome = StreakOutcome {
        count: state.count,
        pending_confirmation: false,
    };
    let path = paths::rollup(user_id)?;
    store.transaction(&path, &mut |doc| {
        let current = match doc {
            Some(doc) => GlobalRollup::from_document(doc).ok()?,
            None => GlobalRollup::default(),
        };
        let mut state = StreakState::from(&current);
        if activity_today {
            state.mark_activity(today);
        }
        let transition = match state.transition(today) {
            // Raced with another rebuild between the read and this write.
            StreakTransition::Rebuild if rebuilt.is_none() => StreakTransition::Unchanged,
            t => t,
        };
        let next = state.apply(transition, today, rebuilt.unwrap_or(0));
        outcome = StreakOutcome {
            count: next.count,
            pending_confirmation: transition == StreakTransition::Pending,
        };
        debug!("streak for {user_id}: {transition:?} -> {}", next.count);
        next.patch(transition)
    })?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{claim, SessionRecord};
    use crate::storage::{MemoryStore, WriteMode};
    use chrono::{Duration, Local, TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn state(count: u32, streak_at: u32, updated_at: u32) -> StreakState {
        StreakState {
            count,
            streak_at: Some(day(streak_at)),
            updated_at: Some(day(updated_at)),
        }
    }

    fn seed(store: &MemoryStore, s: StreakState) {
        let patch = s.patch(StreakTransition::Extend).unwrap();
        store
            .set(&paths::rollup("u").unwrap(), &patch, WriteMode::Merge)
            .unwrap();
    }

    fn log_session(store: &MemoryStore, id: &str, d: NaiveDate) {
        let ended_at = Local
            .from_local_datetime(&d.and_hms_opt(15, 0, 0).unwrap())
            .unwrap()
            .with_timezone(&Utc);
        let record = SessionRecord {
            id: id.into(),
            topic_id: "t".into(),
            duration_ms: 1_500_000,
            ended_at,
        };
        claim(store, "u", &record).unwrap();
    }

    #[test]
    fn transition_table() {
        let today = day(10);
        assert_eq!(StreakState::default().transition(today), StreakTransition::Rebuild);
        assert_eq!(state(5, 7, 7).transition(today), StreakTransition::Reset);
        assert_eq!(state(5, 7, 10).transition(today), StreakTransition::Restart);
        assert_eq!(state(3, 9, 10).transition(today), StreakTransition::Extend);
        assert_eq!(state(3, 9, 9).transition(today), StreakTransition::Pending);
        assert_eq!(state(3, 9, 8).transition(today), StreakTransition::Unchanged);
        assert_eq!(state(3, 10, 10).transition(today), StreakTransition::Unchanged);
        assert_eq!(state(3, 11, 11).transition(today), StreakTransition::Unchanged);
    }

    #[test]
    fn extends_yesterdays_streak_when_active_today() {
        let store = MemoryStore::new();
        seed(&store, state(3, 9, 9));
        let outcome = reconcile(&store, "u", day(10), true).unwrap();
        assert_eq!(outcome, StreakOutcome { count: 4, pending_confirmation: false });

        let rollup = load_rollup(&store, "u").unwrap();
        assert_eq!(rollup.focus_streak, 4);
        assert_eq!(rollup.focus_streak_at, Some(day(10)));
        assert_eq!(rollup.updated_at, Some(day(10)));

        // A second session the same day does not count twice.
        assert_eq!(reconcile(&store, "u", day(10), true).unwrap().count, 4);
    }

    #[test]
    fn gap_without_session_today_resets() {
        let store = MemoryStore::new();
        seed(&store, state(5, 7, 7));
        let outcome = reconcile(&store, "u", day(10), false).unwrap();
        assert_eq!(outcome.count, 0);
        assert!(!outcome.pending_confirmation);
        assert_eq!(load_rollup(&store, "u").unwrap().focus_streak, 0);
    }

    #[test]
    fn gap_with_session_today_restarts_at_one() {
        let store = MemoryStore::new();
        seed(&store, state(5, 7, 7));
        reconcile(&store, "u", day(10), false).unwrap();
        let outcome = reconcile(&store, "u", day(10), true).unwrap();
        assert_eq!(outcome.count, 1);
        assert_eq!(load_rollup(&store, "u").unwrap().focus_streak_at, Some(day(10)));
    }

    #[test]
    fn yesterday_only_is_pending_and_not_persisted() {
        let store = MemoryStore::new();
        seed(&store, state(3, 9, 9));
        let outcome = reconcile(&store, "u", day(10), false).unwrap();
        assert_eq!(outcome, StreakOutcome { count: 3, pending_confirmation: true });
        let rollup = load_rollup(&store, "u").unwrap();
        assert_eq!(rollup.focus_streak_at, Some(day(9)));
        assert_eq!(rollup.focus_streak, 3);
    }

    #[test]
    fn first_evaluation_rebuilds_from_session_log() {
        let store = MemoryStore::new();
        let today = day(10);
        for (i, back) in [0i64, 1, 2, 4].iter().enumerate() {
            log_session(&store, &format!("s{i}"), today - Duration::days(*back));
        }
        let outcome = reconcile(&store, "u", today, true).unwrap();
        assert_eq!(outcome.count, 3);
        let rollup = load_rollup(&store, "u").unwrap();
        assert_eq!(rollup.focus_streak_at, Some(today));
        assert_eq!(rollup.updated_at, Some(today));
    }

    #[test]
    fn rebuild_counts_todays_save_of_a_backdated_session() {
        let store = MemoryStore::new();
        log_session(&store, "s", day(9));
        let outcome = reconcile(&store, "u", day(10), true).unwrap();
        assert_eq!(outcome.count, 2);
    }

    #[test]
    fn rebuild_without_session_today_is_zero() {
        let store = MemoryStore::new();
        log_session(&store, "s", day(8));
        let outcome = reconcile(&store, "u", day(10), false).unwrap();
        assert_eq!(outcome.count, 0);
        assert_eq!(load_rollup(&store, "u").unwrap().focus_streak_at, Some(day(10)));
    }

    #[test]
    fn run_counting() {
        let days: BTreeSet<_> = [day(1), day(3), day(4), day(5)].into_iter().collect();
        assert_eq!(streak_ending_on(&days, day(5)), 3);
        assert_eq!(streak_ending_on(&days, day(1)), 1);
        assert_eq!(streak_ending_on(&days, day(6)), 0);
        assert_eq!(streak_ending_on(&BTreeSet::new(), day(6)), 0);
    }
}
