//! A single multiplayer match.
//!
//! A [`Match`] owns sixteen positional [`Slot`]s, the match-wide settings,
//! the round [`MatchPhase`] and a back-reference to its temporary
//! `#multi_{id}` channel. Every method assumes the caller holds the match's
//! lock (see [`MatchRegistry`](crate::MatchRegistry)); methods only append
//! frames to session queues and never block.
//!
//! Authorization failures are silent: the method returns `false` and
//! nothing is sent, except for [`Match::join`], which tells the client its
//! join failed.

use std::collections::BTreeMap;
use std::sync::Arc;

use lobbyforge_channel::{Channel, ChannelRegistry};
use lobbyforge_protocol::{
    packets, Audience, GameMode, MatchId, MatchRecord, MatchType, Mods, PacketReader, Privileges,
    ScoringType, SlotStatus, SlotTeam, TeamType, UserId, SLOT_COUNT,
};
use lobbyforge_session::{unix_now, Session, SessionDirectory};
use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::{MatchEndedEvent, MatchEventSink, MatchPhase, ModMode, PlayerResult, Slot};

/// Byte offset of the slot id inside a score frame.
const SCORE_SLOT_OFFSET: usize = 4;
const SCORE_VALUE_OFFSET: usize = 17;
const SCORE_HP_OFFSET: usize = 26;
/// Shortest score frame the server will relay.
pub const SCORE_FRAME_MIN_LEN: usize = 27;
/// HP byte value the client sends once a player has failed.
const HP_FAILED: u8 = 254;

/// Shared services a match calls back into.
#[derive(Debug)]
pub struct MatchServices {
    pub directory: Arc<SessionDirectory>,
    pub channels: Arc<ChannelRegistry>,
    pub events: Arc<dyn MatchEventSink>,
}

/// Who may mutate the match. Chosen once at creation.
///
/// In a tournament match the authority usually doesn't play: it is the
/// referee who created the match, and tournament staff act with the same
/// rights.
#[derive(Debug, Clone)]
pub enum HostAuthority {
    Normal(Arc<Session>),
    Tourney(Arc<Session>),
}

impl HostAuthority {
    pub fn session(&self) -> &Arc<Session> {
        match self {
            Self::Normal(host) | Self::Tourney(host) => host,
        }
    }

    pub fn id(&self) -> UserId {
        self.session().id()
    }

    pub fn is_tourney(&self) -> bool {
        matches!(self, Self::Tourney(_))
    }

    /// Same flavour, new holder.
    fn reassigned(&self, to: Arc<Session>) -> Self {
        match self {
            Self::Normal(_) => Self::Normal(to),
            Self::Tourney(_) => Self::Tourney(to),
        }
    }
}

/// What [`Match::leave`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The session had nothing to do with this match.
    NotInMatch,
    /// The session left, others remain.
    Left,
    /// The session was the last channel member; the match must be disbanded.
    Emptied,
}

/// Statuses a player may put their own slot in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnStatus {
    Ready,
    NotReady,
    NoMap,
    HasMap,
}

#[derive(Debug)]
pub struct Match {
    id: MatchId,
    name: String,
    password: Option<String>,
    beatmap_name: String,
    beatmap_id: i32,
    beatmap_md5: String,
    slots: [Slot; SLOT_COUNT],
    mods: Mods,
    seed: i32,
    match_type: MatchType,
    mode: GameMode,
    scoring_type: ScoringType,
    team_type: TeamType,
    freemod: bool,
    locked: bool,
    phase: MatchPhase,
    need_load: usize,
    host: HostAuthority,
    referees: Vec<UserId>,
    channel: Arc<Channel>,
    services: Arc<MatchServices>,
}

impl Match {
    /// Builds a match from client-supplied settings. Only the `Locked`
    /// slot statuses are taken from the client; every other slot starts
    /// open. Nobody is seated yet.
    pub(crate) fn new(
        id: MatchId,
        settings: &MatchRecord,
        host: HostAuthority,
        channel: Arc<Channel>,
        services: Arc<MatchServices>,
    ) -> Self {
        let slots = std::array::from_fn(|i| {
            let mut slot = Slot::default();
            if settings.slots[i].status == SlotStatus::LOCKED {
                slot.toggle_lock_if_empty();
            }
            slot
        });
        let team_type = settings.team_type;
        Self {
            id,
            name: default_name(&settings.name, host.session()),
            password: settings.password.clone().filter(|p| !p.is_empty()),
            beatmap_name: settings.beatmap_name.clone(),
            beatmap_id: settings.beatmap_id,
            beatmap_md5: settings.beatmap_md5.clone(),
            slots,
            mods: settings.mods.sanitized(),
            seed: settings.seed,
            match_type: settings.match_type,
            mode: settings.mode,
            scoring_type: settings.scoring_type,
            team_type,
            freemod: settings.freemod && team_type != TeamType::TagCoop,
            locked: false,
            phase: MatchPhase::Forming,
            need_load: 0,
            host,
            referees: Vec::new(),
            channel,
            services,
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn slots(&self) -> &[Slot; SLOT_COUNT] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn mods(&self) -> Mods {
        self.mods
    }

    pub fn freemod(&self) -> bool {
        self.freemod
    }

    pub fn team_type(&self) -> TeamType {
        self.team_type
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn in_progress(&self) -> bool {
        self.phase.in_progress()
    }

    pub fn need_load(&self) -> usize {
        self.need_load
    }

    pub fn host(&self) -> &HostAuthority {
        &self.host
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn referees(&self) -> &[UserId] {
        &self.referees
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    /// Index of the slot held by this exact session.
    pub fn slot_of(&self, session: &Session) -> Option<usize> {
        self.slots.iter().position(|s| s.holds(session))
    }

    /// Everyone currently seated.
    pub fn players(&self) -> Vec<Arc<Session>> {
        self.slots
            .iter()
            .filter_map(|s| s.occupant().cloned())
            .collect()
    }

    /// The client's `osump://` invite link.
    pub fn invite_link(&self) -> String {
        format!("osump://{}/{}", self.id.0, self.password.as_deref().unwrap_or(""))
    }

    /// Whether `caller` may change settings, lock slots, start and so on.
    pub fn can_mutate(&self, caller: &Session) -> bool {
        let is_authority = match &self.host {
            HostAuthority::Normal(host) => host.id() == caller.id(),
            HostAuthority::Tourney(host) => {
                host.id() == caller.id() || caller.privileges().has(Privileges::TOURNAMENT_STAFF)
            }
        };
        is_authority || self.referees.contains(&caller.id())
    }

    pub fn to_record(&self) -> MatchRecord {
        MatchRecord {
            id: self.id,
            in_progress: self.in_progress(),
            match_type: self.match_type,
            mods: self.mods,
            name: self.name.clone(),
            password: self.password.clone(),
            beatmap_name: self.beatmap_name.clone(),
            beatmap_id: self.beatmap_id,
            beatmap_md5: self.beatmap_md5.clone(),
            slots: std::array::from_fn(|i| self.slots[i].to_record()),
            host_id: self.host.id(),
            mode: self.mode,
            scoring_type: self.scoring_type,
            team_type: self.team_type,
            freemod: self.freemod,
            seed: self.seed,
        }
    }

    // ---------------------------------------------------------------------
    // Broadcast helpers
    // ---------------------------------------------------------------------

    /// Sends the current record to the match channel (with password) and
    /// to lobby browsers outside it (password masked).
    pub fn broadcast_update(&self) {
        let record = self.to_record();
        self.channel
            .enqueue_all(&packets::match_update(&record, Audience::Participant));

        let outsider = packets::match_update(&record, Audience::Outsider);
        for session in lobby_sessions(&self.services.directory) {
            if !self.channel.is_member(&session) {
                session.enqueue(&outsider);
            }
        }
    }

    fn enqueue_where(&self, frame: &[u8], wanted: impl Fn(&Slot) -> bool) {
        for slot in self.slots.iter().filter(|s| wanted(s)) {
            if let Some(session) = slot.occupant() {
                session.enqueue(frame);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------------

    /// Seats `session` in the first open slot.
    ///
    /// Fails when the session is already in a match, the password doesn't
    /// match, or no slot is open. The client gets the same failure packet
    /// in every case.
    pub fn join(&mut self, session: &Arc<Session>, password: &str) -> bool {
        let refusal = if session.match_id().is_some() {
            Some("already in a match")
        } else if self.password.as_deref().is_some_and(|required| required != password) {
            Some("wrong password")
        } else {
            None
        };
        let free = self.slots.iter().position(Slot::is_open);

        let index = match (refusal, free) {
            (None, Some(index)) => index,
            (reason, _) => {
                tracing::debug!(
                    match_id = %self.id,
                    user_id = %session.id(),
                    reason = reason.unwrap_or("no open slot"),
                    "match join refused"
                );
                session.enqueue(&packets::match_join_fail());
                return false;
            }
        };

        self.seat(session, index);
        self.broadcast_update();
        true
    }

    fn seat(&mut self, session: &Arc<Session>, index: usize) {
        let team = if self.team_type.is_team_mode() {
            team_for_index(index)
        } else {
            SlotTeam::Neutral
        };
        self.slots[index].occupy(session, team);
        session.set_match_id(Some(self.id));
        session.enqueue(&packets::match_join_success(&self.to_record()));
        self.services.channels.join(&self.channel, session);
        tracing::info!(match_id = %self.id, user_id = %session.id(), slot = index, "joined match");
    }

    /// Seats the creator of a new match without broadcasting; the registry
    /// announces the match itself.
    pub(crate) fn seat_creator(&mut self, host: &Arc<Session>) -> bool {
        let Some(index) = self.slots.iter().position(Slot::is_open) else {
            return false;
        };
        self.seat(host, index);
        true
    }

    /// Attaches a tournament referee: channel membership and command routing,
    /// but no slot.
    pub(crate) fn attach_referee(&mut self, referee: &Arc<Session>) {
        referee.set_match_id(Some(self.id));
        referee.enqueue(&packets::match_join_success(&self.to_record()));
        self.services.channels.join(&self.channel, referee);
    }

    /// Empties the match completely: every seated player and channel member
    /// is detached and told the match is gone.
    pub(crate) fn dissolve(&mut self) {
        let disband = packets::match_disband(self.id);
        for slot in &mut self.slots {
            if let Some(player) = slot.vacate() {
                if player.match_id() == Some(self.id) {
                    player.set_match_id(None);
                }
            }
        }
        for member in self.channel.members() {
            if member.match_id() == Some(self.id) {
                member.set_match_id(None);
            }
            member.enqueue(&disband);
            self.services.channels.leave(&self.channel, &member);
        }
        self.phase = MatchPhase::Forming;
        self.need_load = 0;
    }

    /// Removes `session` from its slot (if any) and from the match channel.
    ///
    /// A departing host is replaced by a random remaining player. When the
    /// channel ends up empty the match must be disbanded by the registry.
    pub fn leave(&mut self, session: &Arc<Session>) -> LeaveOutcome {
        let index = self.slot_of(session);
        let attached = index.is_some()
            || self.channel.is_member(session)
            || session.match_id() == Some(self.id);
        if !attached {
            return LeaveOutcome::NotInMatch;
        }

        let was_loading = index.is_some_and(|i| self.is_loading(i));
        if let Some(i) = index {
            self.slots[i].vacate();
        }
        self.after_departure(session, was_loading);

        tracing::info!(match_id = %self.id, user_id = %session.id(), "left match");
        if self.channel.is_empty() {
            return LeaveOutcome::Emptied;
        }
        self.broadcast_update();
        LeaveOutcome::Left
    }

    fn is_loading(&self, index: usize) -> bool {
        let slot = &self.slots[index];
        self.phase == MatchPhase::Starting && slot.is_playing() && !slot.loaded
    }

    /// Bookkeeping once `departed` no longer holds a slot.
    fn after_departure(&mut self, departed: &Arc<Session>, was_loading: bool) {
        if departed.match_id() == Some(self.id) {
            departed.set_match_id(None);
        }
        self.services.channels.leave(&self.channel, departed);

        if was_loading {
            self.need_load = self.need_load.saturating_sub(1);
        }
        if Arc::ptr_eq(self.host.session(), departed) {
            self.reassign_host();
        }
        self.check_round_end();
    }

    /// Kicks the occupant out of a slot that was just cleared by the host.
    fn evict(&mut self, evicted: Arc<Session>, was_loading: bool) {
        evicted.enqueue(&packets::match_disband(self.id));
        self.after_departure(&evicted, was_loading);
        tracing::info!(match_id = %self.id, user_id = %evicted.id(), "evicted from match");
    }

    fn reassign_host(&mut self) {
        let candidates = self.players();
        let Some(next) = candidates.choose(&mut rand::rng()) else {
            return;
        };
        next.enqueue(&packets::match_transfer_host());
        tracing::info!(match_id = %self.id, user_id = %next.id(), "host reassigned");
        self.host = self.host.reassigned(Arc::clone(next));
    }

    // ---------------------------------------------------------------------
    // Slot table
    // ---------------------------------------------------------------------

    /// Moves the caller to an empty, unlocked slot, carrying status, team
    /// and mods along.
    pub fn change_slot(&mut self, session: &Session, target: usize) -> bool {
        if self.in_progress() || target >= SLOT_COUNT {
            return false;
        }
        if self.locked && !self.can_mutate(session) {
            return false;
        }
        let Some(from) = self.slot_of(session) else {
            return false;
        };
        if from == target || !self.slots[target].is_open() {
            return false;
        }

        self.slots[target] = std::mem::take(&mut self.slots[from]);
        self.broadcast_update();
        true
    }

    /// Open ↔ Locked for an empty slot; an occupied slot is emptied and
    /// locked in one step. The authority's own slot can't be locked.
    pub fn toggle_slot_lock(&mut self, caller: &Session, index: usize) -> bool {
        if !self.can_mutate(caller) || self.in_progress() || index >= SLOT_COUNT {
            return false;
        }
        let slot = &self.slots[index];
        if slot.occupant().is_some_and(|s| s.id() == self.host.id()) {
            return false;
        }

        if slot.is_occupied() {
            let was_loading = self.is_loading(index);
            if let Some(evicted) = self.slots[index].lock_and_evict() {
                self.evict(evicted, was_loading);
            }
        } else {
            self.slots[index].toggle_lock_if_empty();
        }
        self.broadcast_update();
        true
    }

    /// Limits the match to `size` slots: lower slots are unlocked, higher
    /// slots are emptied and locked.
    pub fn force_size(&mut self, size: usize) {
        let size = size.min(SLOT_COUNT);
        for index in 0..SLOT_COUNT {
            if index < size {
                self.slots[index].unlock();
                continue;
            }
            let was_loading = self.is_loading(index);
            if let Some(evicted) = self.slots[index].lock_and_evict() {
                self.evict(evicted, was_loading);
            }
        }
        tracing::info!(match_id = %self.id, size, "match size forced");
        self.broadcast_update();
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    /// Applies a settings change sent by the authority.
    ///
    /// Changing the beatmap, mode, match type, scoring or team type unreadies
    /// everyone. The password travels in its own packet and is left alone.
    pub fn update_settings(&mut self, caller: &Session, settings: &MatchRecord) -> bool {
        if !self.can_mutate(caller) || self.in_progress() {
            return false;
        }

        let needs_unready = settings.beatmap_md5 != self.beatmap_md5
            || settings.mode != self.mode
            || settings.match_type != self.match_type
            || settings.scoring_type != self.scoring_type
            || settings.team_type != self.team_type;
        if needs_unready {
            self.unready_everyone();
        }

        self.name = default_name(&settings.name, self.host.session());
        self.beatmap_name = settings.beatmap_name.clone();
        self.beatmap_id = settings.beatmap_id;
        self.beatmap_md5 = settings.beatmap_md5.clone();
        self.mode = settings.mode;
        self.match_type = settings.match_type;
        self.scoring_type = settings.scoring_type;
        self.seed = settings.seed;

        if settings.team_type != self.team_type {
            self.apply_team_type(settings.team_type);
        }
        if settings.freemod != self.freemod {
            self.set_freemod(settings.freemod);
        }

        self.broadcast_update();
        true
    }

    fn apply_team_type(&mut self, team_type: TeamType) {
        self.team_type = team_type;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let team = match (team_type.is_team_mode(), slot.team()) {
                (true, SlotTeam::Neutral) => team_for_index(index),
                (true, team) => team,
                (false, _) => SlotTeam::Neutral,
            };
            slot.set_team(team);
        }
        if team_type == TeamType::TagCoop {
            self.set_freemod(false);
        }
    }

    /// Turns freemod on or off.
    ///
    /// On: the match-wide non-speed mods move into every seated player's
    /// slot; speed mods stay match-wide. Off: the host's slot mods become the
    /// match-wide mods again, merged with the speed mods already set.
    /// Tag co-op never allows freemod.
    pub fn set_freemod(&mut self, enabled: bool) {
        if enabled == self.freemod || (enabled && self.team_type == TeamType::TagCoop) {
            return;
        }

        if enabled {
            let personal = self.mods.without_speed();
            for slot in self.slots.iter_mut().filter(|s| s.is_occupied()) {
                slot.set_mods(personal);
            }
            self.mods = self.mods.speed_part();
        } else {
            let host_id = self.host.id();
            let host_mods = self
                .slots
                .iter()
                .find(|s| s.occupant().is_some_and(|o| o.id() == host_id))
                .map(Slot::mods)
                .unwrap_or_default();
            self.mods = host_mods.without_speed() | self.mods.speed_part();
            for slot in &mut self.slots {
                slot.set_mods(Mods::empty());
            }
        }
        self.freemod = enabled;
    }

    /// Mods change from `caller`.
    ///
    /// Under freemod every player sets their own non-speed mods and the
    /// authority additionally sets the match-wide speed mods. Otherwise only
    /// the authority may change anything, and the change is match-wide.
    pub fn change_mods(&mut self, caller: &Session, mods: Mods) -> bool {
        let mods = mods.sanitized();
        let authority = self.can_mutate(caller);

        if self.freemod {
            let own = self.slot_of(caller);
            if own.is_none() && !authority {
                return false;
            }
            if authority {
                self.mods = mods.speed_part();
            }
            if let Some(index) = own {
                self.slots[index].set_mods(mods.without_speed());
            }
        } else {
            if !authority {
                return false;
            }
            self.mods = mods;
        }

        self.broadcast_update();
        true
    }

    pub fn change_password(&mut self, caller: &Session, password: Option<String>) -> bool {
        if !self.can_mutate(caller) {
            return false;
        }
        self.password = password.filter(|p| !p.is_empty());
        self.broadcast_update();
        true
    }

    /// Player-driven readiness changes for the caller's own slot.
    pub fn set_own_status(&mut self, session: &Session, status: OwnStatus) -> bool {
        let Some(index) = self.slot_of(session) else {
            return false;
        };
        let slot = &mut self.slots[index];
        if slot.is_playing() || slot.status() == SlotStatus::COMPLETE {
            return false;
        }
        let next = match status {
            OwnStatus::Ready => SlotStatus::READY,
            OwnStatus::NotReady => SlotStatus::NOT_READY,
            OwnStatus::NoMap => SlotStatus::NO_MAP,
            OwnStatus::HasMap => SlotStatus::NOT_READY,
        };
        if slot.status() == next {
            return true;
        }
        slot.set_player_status(next);
        self.broadcast_update();
        true
    }

    /// Flips the caller between red and blue in team modes.
    pub fn change_team(&mut self, session: &Session) -> bool {
        if !self.team_type.is_team_mode() || self.in_progress() {
            return false;
        }
        if self.locked && !self.can_mutate(session) {
            return false;
        }
        let Some(index) = self.slot_of(session) else {
            return false;
        };
        let slot = &mut self.slots[index];
        let team = match slot.team() {
            SlotTeam::Neutral => SlotTeam::Red,
            team => team.toggled(),
        };
        slot.set_team(team);
        self.broadcast_update();
        true
    }

    /// Hands authority to the occupant of `index`.
    pub fn transfer_host(&mut self, caller: &Session, index: usize) -> bool {
        if !self.can_mutate(caller) {
            return false;
        }
        let Some(target) = self.slots.get(index).and_then(|s| s.occupant()).cloned() else {
            return false;
        };
        target.enqueue(&packets::match_transfer_host());
        self.host = self.host.reassigned(target);
        tracing::info!(match_id = %self.id, user_id = %self.host.id(), "host transferred");
        self.broadcast_update();
        true
    }

    pub fn add_referee(&mut self, user_id: UserId) -> bool {
        if self.referees.contains(&user_id) {
            return false;
        }
        self.referees.push(user_id);
        true
    }

    pub fn remove_referee(&mut self, user_id: UserId) -> bool {
        let before = self.referees.len();
        self.referees.retain(|&id| id != user_id);
        self.referees.len() != before
    }

    /// Ready → NotReady for every slot.
    pub fn unready_everyone(&mut self) {
        for slot in self.slots.iter_mut().filter(|s| s.status() == SlotStatus::READY) {
            slot.set_player_status(SlotStatus::NOT_READY);
        }
    }

    /// Complete → NotReady for every slot.
    pub fn unready_completed(&mut self) {
        for slot in self
            .slots
            .iter_mut()
            .filter(|s| s.status() == SlotStatus::COMPLETE)
        {
            slot.set_player_status(SlotStatus::NOT_READY);
        }
    }

    // ---------------------------------------------------------------------
    // Round cycle
    // ---------------------------------------------------------------------

    /// Starts a round for every seated player who has the beatmap.
    ///
    /// Refused while a round is already in flight. With nobody eligible the
    /// match stays in [`MatchPhase::Forming`] and `false` is returned.
    pub fn start(&mut self) -> bool {
        if !self.phase.can_transition_to(MatchPhase::Starting) {
            return false;
        }
        let eligible = |slot: &Slot| slot.status().has_player() && slot.status() != SlotStatus::NO_MAP;
        if !self.slots.iter().any(eligible) {
            tracing::debug!(match_id = %self.id, "start refused, nobody eligible");
            return false;
        }

        let mut starting = Vec::new();
        for slot in self.slots.iter_mut().filter(|s| eligible(s)) {
            slot.set_player_status(SlotStatus::PLAYING);
            slot.reset_scratch();
            starting.extend(slot.occupant().cloned());
        }
        self.need_load = starting.len();
        self.phase = MatchPhase::Starting;

        let frame = packets::match_start(&self.to_record());
        for session in &starting {
            session.enqueue(&frame);
        }
        self.broadcast_update();

        tracing::info!(match_id = %self.id, players = starting.len(), "round started");
        true
    }

    /// A player finished loading the beatmap.
    pub fn load_complete(&mut self, session: &Session) -> bool {
        let Some(index) = self.slot_of(session) else {
            return false;
        };
        if !self.is_loading(index) {
            return false;
        }
        self.slots[index].loaded = true;
        self.need_load = self.need_load.saturating_sub(1);
        self.all_players_loaded();
        true
    }

    /// Sends "go" once nobody is still loading. Returns whether it did.
    pub fn all_players_loaded(&mut self) -> bool {
        if self.phase != MatchPhase::Starting || self.need_load > 0 {
            return false;
        }
        self.phase = MatchPhase::AllLoaded;
        self.enqueue_where(&packets::match_all_players_loaded(), Slot::is_playing);
        tracing::debug!(match_id = %self.id, "all players loaded");
        true
    }

    /// Records a score frame from a playing session and relays it to the
    /// other players with the slot byte rewritten.
    pub fn score_update(&mut self, session: &Session, raw: &[u8]) -> bool {
        if !self.in_progress() || raw.len() < SCORE_FRAME_MIN_LEN {
            return false;
        }
        let Some(index) = self.slot_of(session) else {
            return false;
        };
        if !self.slots[index].is_playing() {
            return false;
        }

        let mut reader = PacketReader::new(raw);
        let score = reader
            .skip(SCORE_VALUE_OFFSET)
            .and_then(|()| reader.read_i32());
        let Ok(score) = score else {
            return false;
        };
        let slot = &mut self.slots[index];
        slot.score = score;
        if raw[SCORE_HP_OFFSET] == HP_FAILED {
            slot.failed = true;
        }

        let mut relayed = raw.to_vec();
        relayed[SCORE_SLOT_OFFSET] = index as u8;
        self.enqueue_where(&packets::match_score_update(&relayed), Slot::is_playing);
        true
    }

    /// The player's HP hit zero.
    pub fn player_failed(&mut self, session: &Session) -> bool {
        let Some(index) = self.slot_of(session) else {
            return false;
        };
        if !self.slots[index].is_playing() {
            return false;
        }
        self.slots[index].failed = true;
        self.enqueue_where(&packets::match_player_failed(index), Slot::is_playing);
        true
    }

    /// The player asked to skip the intro. Once every player has, the skip
    /// is sent to all of them.
    pub fn skip(&mut self, session: &Session) -> bool {
        let Some(index) = self.slot_of(session) else {
            return false;
        };
        let slot = &mut self.slots[index];
        if !slot.is_playing() || slot.skipped {
            return false;
        }
        slot.skipped = true;
        self.enqueue_where(&packets::match_player_skipped(session.id()), Slot::is_playing);

        let everyone_skipped = self
            .slots
            .iter()
            .filter(|s| s.is_playing())
            .all(Slot::skipped);
        if everyone_skipped {
            self.enqueue_where(&packets::match_skip(), Slot::is_playing);
        }
        true
    }

    /// The player finished the beatmap. The last one to finish ends the
    /// round.
    pub fn complete(&mut self, session: &Session) -> bool {
        let Some(index) = self.slot_of(session) else {
            return false;
        };
        if !self.in_progress() || !self.slots[index].is_playing() {
            return false;
        }
        self.slots[index].set_player_status(SlotStatus::COMPLETE);
        if self.phase.can_transition_to(MatchPhase::Completing) {
            self.phase = MatchPhase::Completing;
        }
        self.check_round_end();
        true
    }

    /// Ends the round early. Every playing slot goes back to NotReady and
    /// counts as failed.
    pub fn abort(&mut self) -> bool {
        if !self.in_progress() {
            return false;
        }
        let frame = packets::match_abort();
        for slot in self.slots.iter_mut().filter(|s| s.is_playing()) {
            slot.set_player_status(SlotStatus::NOT_READY);
            slot.failed = true;
            slot.score = 0;
            if let Some(session) = slot.occupant() {
                session.enqueue(&frame);
            }
        }
        self.unready_completed();
        self.phase = MatchPhase::Forming;
        self.need_load = 0;
        self.broadcast_update();

        tracing::info!(match_id = %self.id, "round aborted");
        true
    }

    /// Moves the round forward after someone stopped playing or loading.
    fn check_round_end(&mut self) {
        if !self.in_progress() {
            return;
        }
        if self.slots.iter().any(Slot::is_playing) {
            self.all_players_loaded();
            return;
        }
        if self.slots.iter().any(|s| s.status() == SlotStatus::COMPLETE) {
            self.finish_round();
        } else {
            // Every player left mid-round.
            self.phase = MatchPhase::Forming;
            self.need_load = 0;
        }
    }

    fn finish_round(&mut self) {
        for slot in self
            .slots
            .iter_mut()
            .filter(|s| s.status() == SlotStatus::COMPLETE)
        {
            slot.passed = !slot.failed;
        }
        let event = self.ended_event();

        self.unready_completed();
        self.phase = MatchPhase::Forming;
        self.need_load = 0;
        self.enqueue_where(&packets::match_complete(), Slot::is_occupied);
        self.services.events.match_ended(event);
        self.broadcast_update();

        tracing::info!(match_id = %self.id, "round finished");
    }

    fn ended_event(&self) -> MatchEndedEvent {
        let per_player: BTreeMap<UserId, PlayerResult> = self
            .slots
            .iter()
            .filter(|s| s.status() == SlotStatus::COMPLETE)
            .filter_map(|slot| {
                let player = slot.occupant()?;
                let result = PlayerResult {
                    username: player.name().to_string(),
                    score: slot.score(),
                    mods: MatchEndedEvent::effective_mods(self.mods, slot.mods(), self.freemod)
                        .bits(),
                    failed: slot.failed(),
                    passed: slot.passed(),
                    team: slot.team(),
                };
                Some((player.id(), result))
            })
            .collect();

        MatchEndedEvent {
            event_id: MatchEndedEvent::composite_id(unix_now(), self.id),
            match_id: self.id,
            name: self.name.clone(),
            beatmap_id: self.beatmap_id,
            mods: self.mods.bits(),
            mode: self.mode,
            host_id: self.host.id(),
            match_type: self.match_type,
            scoring_type: self.scoring_type,
            mod_mode: if self.freemod {
                ModMode::Freemod
            } else {
                ModMode::Normal
            },
            per_player,
        }
    }

    // ---------------------------------------------------------------------
    // Snapshot
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            id: self.id,
            name: self.name.clone(),
            has_password: self.password.is_some(),
            phase: self.phase,
            beatmap_name: self.beatmap_name.clone(),
            beatmap_id: self.beatmap_id,
            mods: self.mods.bits(),
            freemod: self.freemod,
            team_type: self.team_type,
            mode: self.mode,
            host_id: self.host.id(),
            tourney: self.host.is_tourney(),
            locked: self.locked,
            referees: self.referees.clone(),
            slots: self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.is_open())
                .map(|(index, s)| SlotSnapshot {
                    index,
                    status: s.status().bits(),
                    team: s.team(),
                    mods: s.mods().bits(),
                    user_id: s.occupant().map(|o| o.id()),
                    username: s.occupant().map(|o| o.name().to_string()),
                })
                .collect(),
        }
    }
}

/// Read-only view of a match for status pages and admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSnapshot {
    pub id: MatchId,
    pub name: String,
    pub has_password: bool,
    pub phase: MatchPhase,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub mods: u32,
    pub freemod: bool,
    pub team_type: TeamType,
    pub mode: GameMode,
    pub host_id: UserId,
    pub tourney: bool,
    pub locked: bool,
    pub referees: Vec<UserId>,
    /// Non-open slots only.
    pub slots: Vec<SlotSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub status: u8,
    pub team: SlotTeam,
    pub mods: u32,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
}

/// Sessions browsing the multiplayer lobby.
pub(crate) fn lobby_sessions(directory: &SessionDirectory) -> Vec<Arc<Session>> {
    directory
        .enumerate_all(false)
        .into_iter()
        .filter(|s| s.in_lobby())
        .collect()
}

fn team_for_index(index: usize) -> SlotTeam {
    if index % 2 == 1 {
        SlotTeam::Red
    } else {
        SlotTeam::Blue
    }
}

fn default_name(requested: &str, host: &Session) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        format!("{}'s game", host.name())
    } else {
        requested.to_string()
    }
}
