//! Connection crystal: level derivation, streak arithmetic and the
//! forming/settling animation.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    i18n::t,
    modules::conversation::schema::{CrystalLevel, CrystalRecord},
};

const JUST_CREATED_SECS: i64 = 5;
pub const FORMING_DWELL_SECS: i64 = 4;

pub fn level_for_hours(hours: f64) -> CrystalLevel {
    if hours <= 24.0 {
        CrystalLevel::Brilhante
    } else if hours <= 72.0 {
        CrystalLevel::Equilibrado
    } else if hours <= 168.0 {
        CrystalLevel::Apagado
    } else {
        CrystalLevel::Rachado
    }
}

pub fn derive_level(last_interaction_at: DateTime<Utc>, now: DateTime<Utc>) -> CrystalLevel {
    let hours = (now - last_interaction_at).num_milliseconds() as f64 / 3_600_000.0;
    level_for_hours(hours)
}

/// Streak to store with a message sent at `now`, counting calendar days in `tz`.
pub fn next_streak<Tz: TimeZone>(crystal: Option<&CrystalRecord>, now: DateTime<Utc>, tz: &Tz) -> u32 {
    let Some((last, streak)) = crystal.and_then(|c| c.last_interaction_at.map(|at| (at, c.streak))) else {
        return 1;
    };

    let today = now.with_timezone(tz).date_naive();
    let last_day = last.with_timezone(tz).date_naive();

    if last_day == today {
        streak.max(1)
    } else if today.pred_opt() == Some(last_day) {
        streak.saturating_add(1)
    } else {
        1
    }
}

/// Render-facing crystal, recomputed from the stored record on every read.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalView {
    pub level: CrystalLevel,
    pub streak: u32,
}

impl CrystalView {
    pub fn derive(record: &CrystalRecord, now: DateTime<Utc>) -> Option<Self> {
        let last = record.last_interaction_at?;
        Some(CrystalView { level: derive_level(last, now), streak: record.streak })
    }

    pub fn title(&self) -> String {
        let status = t(self.level.key(), &[]);
        t("crystal.title", &[("status", status.as_str())])
    }

    pub fn streak_label(&self) -> Option<String> {
        let streak = self.streak.to_string();
        (self.streak > 1).then(|| t("crystal.streak", &[("streak", streak.as_str())]))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrystalPhase {
    Idle,
    Forming { message_key: &'static str, since: DateTime<Utc> },
    Settling,
}

#[derive(Debug, Clone)]
pub struct CrystalAnimation {
    phase: CrystalPhase,
    previous_level: Option<CrystalLevel>,
    announced_creation: Option<DateTime<Utc>>,
}

impl Default for CrystalAnimation {
    fn default() -> Self {
        Self { phase: CrystalPhase::Idle, previous_level: None, announced_creation: None }
    }
}

impl CrystalAnimation {
    pub fn phase(&self) -> &CrystalPhase {
        &self.phase
    }

    /// Feeds a conversation snapshot. Starts forming when the crystal was just
    /// created or just climbed back to `Brilhante`; returns whether it did.
    pub fn observe(&mut self, record: Option<&CrystalRecord>, now: DateTime<Utc>) -> bool {
        let level = record.and_then(|r| CrystalView::derive(r, now)).map(|view| view.level);
        let previous = std::mem::replace(&mut self.previous_level, level);

        let created_at = record.and_then(|r| r.created_at);
        let just_created = created_at.is_some_and(|created| {
            now - created < Duration::seconds(JUST_CREATED_SECS)
                && self.announced_creation != Some(created)
        });
        let upgraded = level == Some(CrystalLevel::Brilhante)
            && previous.is_some_and(|prev| prev != CrystalLevel::Brilhante);

        if self.phase != CrystalPhase::Idle || !(just_created || upgraded) {
            return false;
        }

        let message_key = if just_created {
            self.announced_creation = created_at;
            "crystal.formed"
        } else {
            "crystal.glowing"
        };
        self.phase = CrystalPhase::Forming { message_key, since: now };
        true
    }

    /// Time left in the forming phase.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.phase {
            CrystalPhase::Forming { since, .. } => {
                Some((since + Duration::seconds(FORMING_DWELL_SECS) - now).max(Duration::zero()))
            }
            _ => None,
        }
    }

    /// Moves forming to settling once the dwell time has passed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.remaining(now) == Some(Duration::zero()) {
            self.phase = CrystalPhase::Settling;
            return true;
        }
        false
    }

    /// Called when the view finished animating the crystal into the header.
    pub fn settle_finished(&mut self) {
        if self.phase == CrystalPhase::Settling {
            self.phase = CrystalPhase::Idle;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn message(&self) -> Option<String> {
        match self.phase {
            CrystalPhase::Forming { message_key, .. } => Some(t(message_key, &[])),
            _ => None,
        }
    }
}
