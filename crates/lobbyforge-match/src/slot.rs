//! One seat of a match.

use std::sync::Arc;

use lobbyforge_protocol::{Mods, SlotRecord, SlotStatus, SlotTeam};
use lobbyforge_session::Session;

/// A match seat.
///
/// The occupant and the status only change together through the
/// `pub(crate)` methods below, which keep one rule: a slot has an occupant
/// exactly when its status has a player, and a locked slot is empty.
#[derive(Debug, Clone, Default)]
pub struct Slot {
    status: SlotStatus,
    team: SlotTeam,
    mods: Mods,
    occupant: Option<Arc<Session>>,
    // Per-round scratch, reset when a round starts.
    pub(crate) skipped: bool,
    pub(crate) loaded: bool,
    pub(crate) failed: bool,
    pub(crate) passed: bool,
    pub(crate) score: i32,
}

impl Slot {
    pub fn status(&self) -> SlotStatus {
        self.status
    }

    pub fn team(&self) -> SlotTeam {
        self.team
    }

    pub fn mods(&self) -> Mods {
        self.mods
    }

    pub fn occupant(&self) -> Option<&Arc<Session>> {
        self.occupant.as_ref()
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    /// Free to be taken by a joining player.
    pub fn is_open(&self) -> bool {
        self.status == SlotStatus::OPEN
    }

    pub fn is_locked(&self) -> bool {
        self.status == SlotStatus::LOCKED
    }

    pub fn is_playing(&self) -> bool {
        self.status == SlotStatus::PLAYING
    }

    pub fn skipped(&self) -> bool {
        self.skipped
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    /// `true` when `session` is this slot's occupant (same connection).
    pub fn holds(&self, session: &Session) -> bool {
        self.occupant
            .as_ref()
            .is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), session))
    }

    pub(crate) fn occupy(&mut self, session: &Arc<Session>, team: SlotTeam) {
        self.status = SlotStatus::NOT_READY;
        self.team = team;
        self.mods = Mods::empty();
        self.occupant = Some(Arc::clone(session));
        self.reset_scratch();
    }

    /// Empties the slot back to Open and returns who was in it.
    pub(crate) fn vacate(&mut self) -> Option<Arc<Session>> {
        std::mem::take(self).occupant
    }

    /// Empties the slot and locks it in one step.
    pub(crate) fn lock_and_evict(&mut self) -> Option<Arc<Session>> {
        let evicted = self.vacate();
        self.status = SlotStatus::LOCKED;
        evicted
    }

    /// Open ↔ Locked for an empty slot. Returns `false` for occupied slots.
    pub(crate) fn toggle_lock_if_empty(&mut self) -> bool {
        if self.is_occupied() {
            return false;
        }
        self.status = if self.is_locked() {
            SlotStatus::OPEN
        } else {
            SlotStatus::LOCKED
        };
        true
    }

    pub(crate) fn unlock(&mut self) {
        if self.is_locked() {
            self.status = SlotStatus::OPEN;
        }
    }

    /// Changes the status of an occupied slot to another player status.
    /// Empty slots and non-player statuses are left alone.
    pub(crate) fn set_player_status(&mut self, status: SlotStatus) -> bool {
        if !self.is_occupied() || !status.has_player() {
            return false;
        }
        self.status = status;
        true
    }

    pub(crate) fn set_team(&mut self, team: SlotTeam) {
        self.team = team;
    }

    pub(crate) fn set_mods(&mut self, mods: Mods) {
        self.mods = mods;
    }

    pub(crate) fn reset_scratch(&mut self) {
        self.skipped = false;
        self.loaded = false;
        self.failed = false;
        self.passed = false;
        self.score = 0;
    }

    pub fn to_record(&self) -> SlotRecord {
        SlotRecord {
            status: self.status,
            team: self.team,
            mods: self.mods,
            user_id: self.occupant.as_ref().map(|s| s.id()),
        }
    }
}
