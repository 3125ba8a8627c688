// Draft windows and the edit-permission gate.
//
// Window status is never stored. It is recomputed from the wall clock and the
// window bounds on every call, so a cached status can't drift from real time.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::player::{Role, WindowId};

// ---------------------------------------------------------------------------
// Window definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowKind {
    #[serde(rename = "PRE_SEASON")]
    PreSeason,
    #[serde(rename = "MID_SEASON")]
    MidSeason,
}

impl WindowKind {
    pub fn code(&self) -> &'static str {
        match self {
            WindowKind::PreSeason => "PRE_SEASON",
            WindowKind::MidSeason => "MID_SEASON",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PRE_SEASON" | "PRESEASON" => Some(WindowKind::PreSeason),
            "MID_SEASON" | "MIDSEASON" => Some(WindowKind::MidSeason),
            _ => None,
        }
    }
}

/// A scheduled range during which ranked lists may be edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftWindow {
    pub id: WindowId,
    pub season: u16,
    pub kind: WindowKind,
    /// Ordering among the windows of one season.
    pub sequence: u32,
    pub open_at: DateTime<Utc>,
    pub lock_at: DateTime<Utc>,
    /// Roles that are drafted in this window.
    pub roles: Vec<Role>,
}

/// Where a window sits relative to the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowStatus {
    NotOpen,
    Open,
    Locked,
}

/// Edit rejected by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("draft window {window} opens at {opens_at}")]
    NotYetOpen {
        window: WindowId,
        opens_at: DateTime<Utc>,
    },

    #[error("draft window {window} closed at {closed_at}")]
    WindowClosed {
        window: WindowId,
        closed_at: DateTime<Utc>,
    },
}

impl DraftWindow {
    /// `NotOpen` before `open_at`, `Open` on `[open_at, lock_at]`, `Locked`
    /// after `lock_at`.
    pub fn status_at(&self, now: DateTime<Utc>) -> WindowStatus {
        if now < self.open_at {
            WindowStatus::NotOpen
        } else if now <= self.lock_at {
            WindowStatus::Open
        } else {
            WindowStatus::Locked
        }
    }

    pub fn can_edit(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == WindowStatus::Open
    }

    /// Whole seconds until lock, floored at zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.lock_at - now).num_seconds().max(0)
    }

    pub fn check_editable(&self, now: DateTime<Utc>) -> Result<(), GateError> {
        match self.status_at(now) {
            WindowStatus::Open => Ok(()),
            WindowStatus::NotOpen => Err(GateError::NotYetOpen {
                window: self.id,
                opens_at: self.open_at,
            }),
            WindowStatus::Locked => Err(GateError::WindowClosed {
                window: self.id,
                closed_at: self.lock_at,
            }),
        }
    }

    pub fn applies_to(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Pick the window a participant should be looking at.
///
/// 1. A currently open window (earliest lock first, then lowest sequence).
/// 2. Otherwise the next window to open (earliest open, then lowest sequence).
/// 3. Otherwise the last window by sequence.
pub fn select_preferred_window(windows: &[DraftWindow], now: DateTime<Utc>) -> Option<&DraftWindow> {
    let open = windows
        .iter()
        .filter(|w| w.status_at(now) == WindowStatus::Open)
        .min_by_key(|w| (w.lock_at, w.sequence));
    if open.is_some() {
        return open;
    }

    let upcoming = windows
        .iter()
        .filter(|w| w.status_at(now) == WindowStatus::NotOpen)
        .min_by_key(|w| (w.open_at, w.sequence));
    if upcoming.is_some() {
        return upcoming;
    }

    windows.iter().max_by_key(|w| (w.sequence, w.lock_at))
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current time for gate decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 20, hour, min, sec).unwrap()
    }

    fn window(id: u32, sequence: u32, open: DateTime<Utc>, lock: DateTime<Utc>) -> DraftWindow {
        DraftWindow {
            id: WindowId(id),
            season: 2026,
            kind: WindowKind::PreSeason,
            sequence,
            open_at: open,
            lock_at: lock,
            roles: vec![Role::Bat, Role::Bowl],
        }
    }

    #[test]
    fn status_transitions_with_time() {
        let w = window(1, 1, t(10, 0, 0), t(12, 0, 0));
        assert_eq!(w.status_at(t(9, 59, 59)), WindowStatus::NotOpen);
        assert_eq!(w.status_at(t(10, 0, 0)), WindowStatus::Open);
        assert_eq!(w.status_at(t(12, 0, 0)), WindowStatus::Open);
        assert_eq!(w.status_at(t(12, 0, 1)), WindowStatus::Locked);
    }

    #[test]
    fn can_edit_matches_closed_interval() {
        let w = window(1, 1, t(10, 0, 0), t(12, 0, 0));
        let mut now = t(9, 0, 0);
        while now <= t(13, 0, 0) {
            let expected = t(10, 0, 0) <= now && now <= t(12, 0, 0);
            assert_eq!(w.can_edit(now), expected, "at {now}");
            now += Duration::seconds(450);
        }
    }

    #[test]
    fn remaining_seconds_counts_down_and_floors() {
        let w = window(1, 1, t(10, 0, 0), t(12, 0, 0));
        assert_eq!(w.remaining_seconds(t(11, 59, 0)), 60);
        assert_eq!(w.remaining_seconds(t(12, 0, 0)), 0);
        assert_eq!(w.remaining_seconds(t(13, 0, 0)), 0);

        let mut last = i64::MAX;
        let mut now = t(10, 0, 0);
        while now <= t(12, 0, 0) {
            let r = w.remaining_seconds(now);
            assert!(r <= last);
            last = r;
            now += Duration::seconds(97);
        }
    }

    #[test]
    fn check_editable_reports_condition() {
        let w = window(4, 1, t(10, 0, 0), t(12, 0, 0));
        assert_eq!(
            w.check_editable(t(9, 0, 0)),
            Err(GateError::NotYetOpen {
                window: WindowId(4),
                opens_at: t(10, 0, 0)
            })
        );
        assert!(w.check_editable(t(11, 0, 0)).is_ok());
        assert_eq!(
            w.check_editable(t(12, 30, 0)),
            Err(GateError::WindowClosed {
                window: WindowId(4),
                closed_at: t(12, 0, 0)
            })
        );
    }

    #[test]
    fn applies_to_roles() {
        let w = window(1, 1, t(10, 0, 0), t(12, 0, 0));
        assert!(w.applies_to(Role::Bat));
        assert!(!w.applies_to(Role::Wk));
    }

    #[test]
    fn preferred_window_prefers_open() {
        let windows = vec![
            window(1, 1, t(8, 0, 0), t(9, 0, 0)),
            window(2, 2, t(10, 0, 0), t(12, 0, 0)),
            window(3, 3, t(14, 0, 0), t(16, 0, 0)),
        ];
        let w = select_preferred_window(&windows, t(11, 0, 0)).unwrap();
        assert_eq!(w.id, WindowId(2));
    }

    #[test]
    fn preferred_window_open_tie_breaks_on_lock_then_sequence() {
        let windows = vec![
            window(1, 2, t(10, 0, 0), t(12, 0, 0)),
            window(2, 1, t(10, 0, 0), t(12, 0, 0)),
            window(3, 0, t(10, 0, 0), t(13, 0, 0)),
        ];
        let w = select_preferred_window(&windows, t(11, 0, 0)).unwrap();
        assert_eq!(w.id, WindowId(2));
    }

    #[test]
    fn preferred_window_falls_back_to_upcoming() {
        let windows = vec![
            window(1, 1, t(8, 0, 0), t(9, 0, 0)),
            window(3, 3, t(16, 0, 0), t(17, 0, 0)),
            window(2, 2, t(14, 0, 0), t(15, 0, 0)),
        ];
        let w = select_preferred_window(&windows, t(10, 0, 0)).unwrap();
        assert_eq!(w.id, WindowId(2));
    }

    #[test]
    fn preferred_window_falls_back_to_last() {
        let windows = vec![
            window(2, 2, t(10, 0, 0), t(11, 0, 0)),
            window(1, 1, t(8, 0, 0), t(9, 0, 0)),
        ];
        let w = select_preferred_window(&windows, t(20, 0, 0)).unwrap();
        assert_eq!(w.id, WindowId(2));
        assert!(select_preferred_window(&[], t(20, 0, 0)).is_none());
    }

    #[test]
    fn fixed_clock_moves_on_request() {
        let clock = FixedClock::new(t(10, 0, 0));
        assert_eq!(clock.now(), t(10, 0, 0));
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), t(10, 5, 0));
        clock.set(t(1, 0, 0));
        assert_eq!(clock.now(), t(1, 0, 0));
    }

    #[test]
    fn window_kind_codes() {
        assert_eq!(WindowKind::from_code("pre_season"), Some(WindowKind::PreSeason));
        assert_eq!(WindowKind::from_code("MID_SEASON"), Some(WindowKind::MidSeason));
        assert_eq!(WindowKind::from_code("post"), None);
        assert_eq!(WindowKind::MidSeason.code(), "MID_SEASON");
    }
}
