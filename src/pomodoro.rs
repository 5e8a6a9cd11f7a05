// Pomodoro work/break cycle

use serde::{Deserialize, Serialize};

use crate::models::PomodoroSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PomodoroMode {
    Work,
    Break,
    LongBreak,
}

impl std::fmt::Display for PomodoroMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PomodoroMode::Work => write!(f, "work"),
            PomodoroMode::Break => write!(f, "break"),
            PomodoroMode::LongBreak => write!(f, "long-break"),
        }
    }
}

/// Emitted when a countdown reaches zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub finished: PomodoroMode,
    pub next: PomodoroMode,
    pub message: &'static str,
}

/// Countdown state for one timer
///
/// Every completed work session counts; each `sessions_until_long_break`-th
/// one is followed by a long break instead of a short one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomodoroCycle {
    settings: PomodoroSettings,
    mode: PomodoroMode,
    remaining_secs: u32,
    sessions_completed: u32,
}

impl PomodoroCycle {
    pub fn new(settings: PomodoroSettings) -> Self {
        let mut cycle = Self {
            settings,
            mode: PomodoroMode::Work,
            remaining_secs: 0,
            sessions_completed: 0,
        };
        cycle.reset();
        cycle
    }

    pub fn mode(&self) -> PomodoroMode {
        self.mode
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn sessions_completed(&self) -> u32 {
        self.sessions_completed
    }

    /// Length of `mode` in seconds, saturating for absurdly long settings
    pub fn duration_secs(&self, mode: PomodoroMode) -> u32 {
        let minutes = match mode {
            PomodoroMode::Work => self.settings.work_duration,
            PomodoroMode::Break => self.settings.break_duration,
            PomodoroMode::LongBreak => self.settings.long_break_duration,
        };
        minutes.saturating_mul(60)
    }

    /// Share of the current period already elapsed, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        let total = self.duration_secs(self.mode);
        if total == 0 {
            return 1.0;
        }
        f64::from(total - self.remaining_secs.min(total)) / f64::from(total)
    }

    /// Count down `secs`; reaching zero completes the period
    pub fn tick(&mut self, secs: u32) -> Option<Completion> {
        if secs >= self.remaining_secs {
            return Some(self.complete());
        }
        self.remaining_secs -= secs;
        None
    }

    /// Finish the current period now and move to the next one
    pub fn complete(&mut self) -> Completion {
        let finished = self.mode;
        let next = match finished {
            PomodoroMode::Work => {
                self.sessions_completed = self.sessions_completed.saturating_add(1);
                let every = self.settings.sessions_until_long_break.max(1);
                if self.sessions_completed % every == 0 {
                    PomodoroMode::LongBreak
                } else {
                    PomodoroMode::Break
                }
            }
            PomodoroMode::Break | PomodoroMode::LongBreak => PomodoroMode::Work,
        };

        self.mode = next;
        self.remaining_secs = self.duration_secs(next);

        let message = match finished {
            PomodoroMode::Work => "Work session completed! Time for a break.",
            _ => "Break over! Time to work.",
        };

        Completion { finished, next, message }
    }

    /// Back to the start of a work period; the session count is kept
    pub fn reset(&mut self) {
        self.mode = PomodoroMode::Work;
        self.remaining_secs = self.duration_secs(PomodoroMode::Work);
    }

    /// Swap in new settings and restart the work period
    pub fn apply_settings(&mut self, settings: PomodoroSettings) {
        self.settings = settings;
        self.reset();
    }
}

/// `mm:ss`
pub fn format_clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
