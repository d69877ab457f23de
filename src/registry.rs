//! Room registry: per-mode room maps, matchmaking, and the connection
//! reverse index.
//!
//! Each mode's map is guarded by one mutex held only for the brief critical
//! section of find/create/retire; room state mutation happens under the
//! room's own lock. A connection is in at most one room at any instant,
//! tracked by the `membership` reverse index.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::protocol::{ConnId, GameMode, MatchPhase};
use crate::rooms::boss::BossState;
use crate::rooms::koz::KozState;
use crate::rooms::pvp::PvpState;
use crate::rooms::slither::SlitherState;
use crate::rooms::RoomKey;

/// One room's shared handle: identity, lock-guarded state, ticker flag.
pub struct RoomHandle<S> {
    pub key: RoomKey,
    pub state: Mutex<S>,
    ticker_running: AtomicBool,
}

impl<S> RoomHandle<S> {
    #[must_use]
    pub fn new(key: RoomKey, state: S) -> Arc<Self> {
        Arc::new(Self {
            key,
            state: Mutex::new(state),
            ticker_running: AtomicBool::new(false),
        })
    }

    /// Claim the ticker slot; returns false when a ticker already runs.
    pub fn claim_ticker(&self) -> bool {
        !self.ticker_running.swap(true, Ordering::AcqRel)
    }

    pub fn release_ticker(&self) {
        self.ticker_running.store(false, Ordering::Release);
    }
}

/// Aggregate PVP occupancy for the mode-selection screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct PvpOccupancy {
    pub total_players: usize,
    pub active_rooms: usize,
    pub open_slots: usize,
}

/// Per-mode maps of room id to room state.
pub struct RoomRegistry {
    boss: Mutex<BTreeMap<String, Arc<RoomHandle<BossState>>>>,
    pvp: Mutex<BTreeMap<String, Arc<RoomHandle<PvpState>>>>,
    koz: Mutex<BTreeMap<String, Arc<RoomHandle<KozState>>>>,
    slither: Mutex<BTreeMap<String, Arc<RoomHandle<SlitherState>>>>,
    membership: DashMap<ConnId, RoomKey>,
    slither_parties: Mutex<BTreeMap<String, String>>,
    room_seq: AtomicU64,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            boss: Mutex::new(BTreeMap::new()),
            pvp: Mutex::new(BTreeMap::new()),
            koz: Mutex::new(BTreeMap::new()),
            slither: Mutex::new(BTreeMap::new()),
            membership: DashMap::new(),
            slither_parties: Mutex::new(BTreeMap::new()),
            room_seq: AtomicU64::new(1),
        }
    }

    fn next_room_id(&self) -> String {
        self.room_seq.fetch_add(1, Ordering::Relaxed).to_string()
    }

    // ------------------------------------------------------------------
    // Reverse index
    // ------------------------------------------------------------------

    /// Record a connection's room. Returns the previous room, which the
    /// caller must have already vacated.
    pub fn bind(&self, conn: ConnId, key: RoomKey) -> Option<RoomKey> {
        self.membership.insert(conn, key)
    }

    pub fn unbind(&self, conn: &ConnId) -> Option<RoomKey> {
        self.membership.remove(conn).map(|(_, key)| key)
    }

    #[must_use]
    pub fn locate(&self, conn: &ConnId) -> Option<RoomKey> {
        self.membership.get(conn).map(|entry| entry.value().clone())
    }

    // ------------------------------------------------------------------
    // Boss rooms (keyed by client room hint)
    // ------------------------------------------------------------------

    /// Find or create a boss room under the given id.
    pub async fn boss_room_or_create(
        &self,
        room_id: &str,
        make: impl FnOnce(RoomKey) -> BossState,
    ) -> (Arc<RoomHandle<BossState>>, bool) {
        let mut rooms = self.boss.lock().await;
        if let Some(handle) = rooms.get(room_id) {
            return (Arc::clone(handle), false);
        }
        let key = RoomKey::new(GameMode::Boss, room_id);
        let handle = RoomHandle::new(key.clone(), make(key));
        rooms.insert(room_id.to_string(), Arc::clone(&handle));
        (handle, true)
    }

    pub async fn boss_room(&self, room_id: &str) -> Option<Arc<RoomHandle<BossState>>> {
        self.boss.lock().await.get(room_id).cloned()
    }

    // ------------------------------------------------------------------
    // PVP rooms
    // ------------------------------------------------------------------

    /// Place a PVP joiner: the requested room if it accepts, else the first
    /// open room, else a fresh one.
    pub async fn pvp_room_for_join(
        &self,
        requested: Option<&str>,
        make: impl FnOnce(RoomKey) -> PvpState,
    ) -> (Arc<RoomHandle<PvpState>>, bool) {
        let mut rooms = self.pvp.lock().await;

        if let Some(id) = requested {
            if let Some(handle) = rooms.get(id) {
                if handle.state.lock().await.accepts_joins() {
                    return (Arc::clone(handle), false);
                }
            }
        }

        for handle in rooms.values() {
            if handle.state.lock().await.accepts_joins() {
                return (Arc::clone(handle), false);
            }
        }

        let room_id = self.next_room_id();
        let key = RoomKey::new(GameMode::Pvp, room_id.clone());
        let handle = RoomHandle::new(key.clone(), make(key));
        rooms.insert(room_id, Arc::clone(&handle));
        (handle, true)
    }

    pub async fn pvp_room(&self, room_id: &str) -> Option<Arc<RoomHandle<PvpState>>> {
        self.pvp.lock().await.get(room_id).cloned()
    }

    /// Aggregate occupancy across PVP rooms.
    pub async fn pvp_occupancy(&self) -> PvpOccupancy {
        let rooms = self.pvp.lock().await;
        let mut occupancy = PvpOccupancy::default();
        for handle in rooms.values() {
            let state = handle.state.lock().await;
            let count = state.player_count();
            occupancy.total_players += count;
            if count > 0 {
                occupancy.active_rooms += 1;
            }
            occupancy.open_slots += 2usize.saturating_sub(count);
        }
        if occupancy.open_slots == 0 {
            // A room can always be created on demand.
            occupancy.open_slots = 2;
        }
        occupancy
    }

    // ------------------------------------------------------------------
    // KOZ rooms
    // ------------------------------------------------------------------

    /// Place a KOZ joiner: the first room that can take an active player,
    /// else the first room at all (spectator seat), else a fresh room.
    pub async fn koz_room_for_join(
        &self,
        max_active: usize,
        make: impl FnOnce(RoomKey) -> KozState,
    ) -> (Arc<RoomHandle<KozState>>, bool) {
        let mut rooms = self.koz.lock().await;

        for handle in rooms.values() {
            let state = handle.state.lock().await;
            let joinable_as_player = matches!(
                state.phase(),
                MatchPhase::Lobby | MatchPhase::Countdown
            ) && state.active_player_count() < max_active;
            if joinable_as_player {
                drop(state);
                return (Arc::clone(handle), false);
            }
        }
        for handle in rooms.values() {
            let state = handle.state.lock().await;
            // Spectator seats are bounded to keep snapshots tractable.
            if state.player_count() < max_active * 2 {
                drop(state);
                return (Arc::clone(handle), false);
            }
        }

        let room_id = self.next_room_id();
        let key = RoomKey::new(GameMode::Koz, room_id.clone());
        let handle = RoomHandle::new(key.clone(), make(key));
        rooms.insert(room_id, Arc::clone(&handle));
        (handle, true)
    }

    pub async fn koz_room(&self, room_id: &str) -> Option<Arc<RoomHandle<KozState>>> {
        self.koz.lock().await.get(room_id).cloned()
    }

    // ------------------------------------------------------------------
    // Slither arenas
    // ------------------------------------------------------------------

    /// Place a slither joiner: the party's arena when it has space, else
    /// the oldest arena with space, else a fresh one. Records the party
    /// mapping for future friends.
    pub async fn slither_room_for_join(
        &self,
        party_id: Option<&str>,
        capacity: usize,
        make: impl FnOnce(RoomKey) -> SlitherState,
    ) -> (Arc<RoomHandle<SlitherState>>, bool) {
        let mut rooms = self.slither.lock().await;
        let mut parties = self.slither_parties.lock().await;

        if let Some(party) = party_id {
            if let Some(room_id) = parties.get(party).cloned() {
                if let Some(handle) = rooms.get(&room_id) {
                    if handle.state.lock().await.player_count() < capacity {
                        return (Arc::clone(handle), false);
                    }
                }
            }
        }

        for (room_id, handle) in rooms.iter() {
            if handle.state.lock().await.player_count() < capacity {
                if let Some(party) = party_id {
                    parties.insert(party.to_string(), room_id.clone());
                }
                return (Arc::clone(handle), false);
            }
        }

        let room_id = self.next_room_id();
        let key = RoomKey::new(GameMode::Slither, room_id.clone());
        let handle = RoomHandle::new(key.clone(), make(key));
        rooms.insert(room_id.clone(), Arc::clone(&handle));
        if let Some(party) = party_id {
            parties.insert(party.to_string(), room_id);
        }
        (handle, true)
    }

    pub async fn slither_room(&self, room_id: &str) -> Option<Arc<RoomHandle<SlitherState>>> {
        self.slither.lock().await.get(room_id).cloned()
    }

    /// Drop the party mapping when an arena empties.
    pub async fn forget_party_mappings(&self, room_id: &str) {
        let mut parties = self.slither_parties.lock().await;
        parties.retain(|_, mapped| mapped != room_id);
    }

    // ------------------------------------------------------------------
    // Reaping
    // ------------------------------------------------------------------

    /// Remove a room when it has no occupants. Checked under the mode map
    /// lock and the room lock so a concurrent join cannot be lost.
    pub async fn try_retire(&self, key: &RoomKey) -> bool {
        match key.mode {
            GameMode::Boss => retire_in(&self.boss, &key.room_id, BossState::player_count).await,
            GameMode::Pvp => retire_in(&self.pvp, &key.room_id, PvpState::player_count).await,
            GameMode::Koz => retire_in(&self.koz, &key.room_id, KozState::player_count).await,
            GameMode::Slither => {
                let retired =
                    retire_in(&self.slither, &key.room_id, SlitherState::player_count).await;
                if retired {
                    self.forget_party_mappings(&key.room_id).await;
                }
                retired
            }
        }
    }
}

async fn retire_in<S>(
    map: &Mutex<BTreeMap<String, Arc<RoomHandle<S>>>>,
    room_id: &str,
    occupant_count: impl Fn(&S) -> usize,
) -> bool {
    let mut rooms = map.lock().await;
    let Some(handle) = rooms.get(room_id) else {
        return true;
    };
    let empty = {
        let state = handle.state.lock().await;
        occupant_count(&state) == 0
    };
    if empty {
        rooms.remove(room_id);
    }
    empty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KozTuning, PowerUpTable, PvpTuning, SlitherTuning, WeaponTable};
    use crate::protocol::HeroClass;

    fn make_pvp(key: RoomKey) -> PvpState {
        PvpState::new(key, PvpTuning::default())
    }

    fn make_koz(key: RoomKey) -> KozState {
        KozState::new(
            key,
            KozTuning::default(),
            WeaponTable::default(),
            PowerUpTable::default(),
            0.0,
        )
    }

    fn make_slither(key: RoomKey) -> SlitherState {
        SlitherState::new(key, SlitherTuning::default())
    }

    #[tokio::test]
    async fn pvp_pairing_reuses_open_room() {
        let registry = RoomRegistry::new();
        let (room_a, created_a) = registry.pvp_room_for_join(None, make_pvp).await;
        assert!(created_a);
        {
            let mut state = room_a.state.lock().await;
            state
                .join(ConnId::new_v4(), None, "a".into(), HeroClass::Knight, 30, None)
                .unwrap();
        }

        let (room_b, created_b) = registry.pvp_room_for_join(None, make_pvp).await;
        assert!(!created_b);
        assert_eq!(room_a.key, room_b.key);
    }

    #[tokio::test]
    async fn pvp_full_room_spills_to_new_one() {
        let registry = RoomRegistry::new();
        let (room, _) = registry.pvp_room_for_join(None, make_pvp).await;
        {
            let mut state = room.state.lock().await;
            state
                .join(ConnId::new_v4(), None, "a".into(), HeroClass::Knight, 30, None)
                .unwrap();
            state
                .join(ConnId::new_v4(), None, "b".into(), HeroClass::Knight, 30, None)
                .unwrap();
        }
        let requested = room.key.room_id.clone();
        let (next, created) = registry
            .pvp_room_for_join(Some(&requested), make_pvp)
            .await;
        assert!(created, "full requested room must fall through to a new one");
        assert_ne!(next.key.room_id, requested);
    }

    #[tokio::test]
    async fn membership_is_exclusive() {
        let registry = RoomRegistry::new();
        let conn = ConnId::new_v4();
        let first = RoomKey::new(GameMode::Koz, "1");
        let second = RoomKey::new(GameMode::Pvp, "2");
        assert!(registry.bind(conn, first.clone()).is_none());
        assert_eq!(registry.locate(&conn), Some(first.clone()));
        // Rebinding surfaces the stale room for cleanup.
        assert_eq!(registry.bind(conn, second.clone()), Some(first));
        assert_eq!(registry.locate(&conn), Some(second.clone()));
        assert_eq!(registry.unbind(&conn), Some(second));
        assert_eq!(registry.locate(&conn), None);
    }

    #[tokio::test]
    async fn retire_removes_only_empty_rooms() {
        let registry = RoomRegistry::new();
        let (room, _) = registry.koz_room_for_join(12, make_koz).await;
        let key = room.key.clone();

        // Occupied: retire refuses.
        let conn = ConnId::new_v4();
        {
            let mut state = room.state.lock().await;
            let mut out = crate::rooms::Outbox::new();
            state.join(
                conn,
                None,
                "a".into(),
                String::new(),
                HeroClass::Knight,
                crate::protocol::WeaponKind::BulwarkDisc,
                0.0,
                &mut out,
            );
        }
        assert!(!registry.try_retire(&key).await);
        assert!(registry.koz_room(&key.room_id).await.is_some());

        // Empty: retire removes.
        {
            let mut state = room.state.lock().await;
            state.leave(&conn, 1.0);
        }
        assert!(registry.try_retire(&key).await);
        assert!(registry.koz_room(&key.room_id).await.is_none());
    }

    #[tokio::test]
    async fn slither_party_members_share_an_arena() {
        let registry = RoomRegistry::new();
        let (room_a, _) = registry
            .slither_room_for_join(Some("party-7"), 24, make_slither)
            .await;
        {
            let mut state = room_a.state.lock().await;
            state.join(ConnId::new_v4(), None, "a".into(), Some("party-7".into()), 0.0);
        }
        let (room_b, created) = registry
            .slither_room_for_join(Some("party-7"), 24, make_slither)
            .await;
        assert!(!created);
        assert_eq!(room_a.key, room_b.key);
    }

    #[tokio::test]
    async fn ticker_claim_is_exclusive() {
        let handle = RoomHandle::new(RoomKey::new(GameMode::Pvp, "1"), make_pvp(RoomKey::new(GameMode::Pvp, "1")));
        assert!(handle.claim_ticker());
        assert!(!handle.claim_ticker());
        handle.release_ticker();
        assert!(handle.claim_ticker());
    }
}
