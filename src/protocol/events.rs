//! Wire schema: enumerated inbound and outbound event envelopes.
//!
//! Every frame is JSON shaped as `{ "type": <event name>, "data": <payload> }`.
//! Inbound event names are stable contracts; the server ignores out-of-range
//! or unknown fields instead of erroring.

use serde::{Deserialize, Serialize};

use super::types::{
    BoundsHint, ConnId, HeroClass, InputAxes, JoinProfile, MatchPhase, PlayerRole, PowerUpKind,
    RejectReason, UserId, WeaponKind,
};

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    // ---- Boss Battle ----
    BossJoinRoom {
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        player: JoinProfile,
        #[serde(default)]
        bounds: Option<BoundsHint>,
        #[serde(default)]
        boss_health: Option<f64>,
        #[serde(default)]
        max_boss_health: Option<f64>,
    },
    BossLeaveRoom {
        #[serde(default)]
        room_id: Option<String>,
    },
    BossPlayerMove {
        room_id: String,
        x: f64,
        y: f64,
        #[serde(default)]
        boss_x: Option<f64>,
        #[serde(default)]
        boss_y: Option<f64>,
    },
    BossPlayerShoot {
        room_id: String,
        #[serde(default, alias = "bulletX")]
        bullet_x: Option<f64>,
        #[serde(default, alias = "bulletY")]
        bullet_y: Option<f64>,
        #[serde(default)]
        dx: Option<f64>,
        #[serde(default)]
        dy: Option<f64>,
        #[serde(default)]
        character: Option<String>,
    },
    BossDamage {
        room_id: String,
        #[serde(default)]
        damage: Option<f64>,
    },
    BossPlayerHit {
        room_id: String,
        #[serde(default)]
        lives: Option<i64>,
    },
    BossPlayerStats {
        room_id: String,
        #[serde(default)]
        bullets: Option<i64>,
        #[serde(default)]
        lives: Option<i64>,
    },
    BossRequestPowerupSpawn {
        room_id: String,
    },
    BossPowerupCollected {
        room_id: String,
        powerup_id: String,
    },
    BossReportStats {
        room_id: String,
        #[serde(default)]
        bullets_fired: Option<u64>,
        #[serde(default)]
        bullets_hit: Option<u64>,
        #[serde(default)]
        lives_lost: Option<u64>,
        #[serde(default)]
        powerups: Option<Vec<String>>,
    },
    BossJoinLobby {
        #[serde(default)]
        profile: JoinProfile,
    },
    BossLeaveLobby,
    BossChatSend {
        #[serde(default)]
        room_id: Option<String>,
        content: String,
    },
    BossPlayerAway {
        room_id: String,
    },
    BossPlayerReturned {
        room_id: String,
    },
    BossDebugState {
        room_id: String,
    },

    // ---- PVP Arena ----
    PvpJoinRoom {
        #[serde(default, alias = "roomId")]
        room_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        character: Option<String>,
        #[serde(default)]
        bullets: Option<i64>,
        #[serde(default)]
        lives: Option<i64>,
    },
    PvpReady,
    PvpPlayerMove {
        x: f64,
        y: f64,
    },
    PvpPlayerShoot {
        #[serde(default, alias = "bulletX")]
        bullet_x: Option<f64>,
        #[serde(default, alias = "bulletY")]
        bullet_y: Option<f64>,
        #[serde(default)]
        dx: Option<f64>,
        #[serde(default)]
        dy: Option<f64>,
        #[serde(default)]
        character: Option<String>,
    },
    PvpHitOpponent {
        #[serde(default)]
        damage: Option<f64>,
    },
    PvpPlayerStats {
        #[serde(default)]
        bullets: Option<i64>,
        #[serde(default)]
        lives: Option<i64>,
    },
    PvpChatSend {
        content: String,
    },
    PvpPlayerAway,
    PvpPlayerReturned,
    PvpLeaveRoom,
    PvpGetStatus,
    PvpModeViewerJoin,
    PvpModeViewerLeave,

    // ---- King of the Zone ----
    KozJoinRoom {
        #[serde(default)]
        profile: JoinProfile,
    },
    KozLeaveRoom,
    KozInput(InputAxes),
    KozPlayerShoot {
        #[serde(alias = "aimX")]
        aim_x: f64,
        #[serde(alias = "aimY")]
        aim_y: f64,
    },
    KozPlayAgain,
    KozRequestState,
    KozChatSend {
        content: String,
    },

    // ---- Slither ----
    SlitherJoinRoom {
        #[serde(default)]
        profile: JoinProfile,
    },
    SlitherLeaveRoom,
    SlitherInput {
        #[serde(default, alias = "dirX")]
        dir_x: f64,
        #[serde(default, alias = "dirY")]
        dir_y: f64,
        #[serde(default)]
        boost: bool,
    },
    SlitherPlayAgain,
    SlitherChatSend {
        content: String,
    },

    // ---- Transport ----
    Ping,
}

// ---------------------------------------------------------------------------
// Shared view structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointView {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleView {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub destructible: bool,
    pub hp: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileView {
    pub id: String,
    pub owner: ConnId,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub weapon_type: WeaponKind,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUpView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneView {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_radius: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StormView {
    pub damage: f64,
    pub tick_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreView {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub held_by: Option<ConnId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapView {
    pub id: String,
    pub name: String,
    pub theme: String,
    pub biome: String,
    pub flavor: String,
    pub preview_color: String,
    pub width: f64,
    pub height: f64,
    pub zone: PointView,
    pub zone_radius: f64,
    pub core: PointView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreboardEntry {
    pub conn_id: ConnId,
    pub name: String,
    pub avatar: String,
    pub hero: HeroClass,
    pub score: i64,
    pub kills: u32,
    pub deaths: u32,
    pub core_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillfeedEntry {
    pub id: u64,
    pub killer_conn: Option<ConnId>,
    pub killer_name: String,
    pub target_conn: ConnId,
    pub target_name: String,
    pub reason: String,
    pub time: f64,
}

// ---------------------------------------------------------------------------
// Boss payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BossBoundsView {
    pub width: f64,
    pub height: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BossPlayerView {
    pub conn_id: ConnId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub character: HeroClass,
    pub bullets: i64,
    pub lives: i64,
    pub x: f64,
    pub y: f64,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelfSeat {
    pub x: f64,
    pub y: f64,
    pub bullets: i64,
    pub lives: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BossRoomStatePayload {
    pub room_id: String,
    pub boss_health: f64,
    pub max_boss_health: f64,
    pub player_count: usize,
    pub players: Vec<BossPlayerView>,
    pub powerups: Vec<PowerUpView>,
    pub self_state: SelfSeat,
    pub bounds: BossBoundsView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BossFinalStats {
    pub conn_id: ConnId,
    pub username: String,
    pub character: HeroClass,
    pub damage_dealt: f64,
    pub bullets_fired: u64,
    pub bullets_hit: u64,
    pub lives: i64,
    pub lives_lost: u64,
    pub powerups_collected: Vec<PowerUpKind>,
}

// ---------------------------------------------------------------------------
// PVP payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvpPlayerView {
    pub conn_id: ConnId,
    pub username: String,
    pub character: HeroClass,
    pub bullets: i64,
    pub lives: i64,
    pub x: f64,
    pub y: f64,
    pub player_number: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvpRoomStatePayload {
    pub room_id: String,
    pub player_count: usize,
    pub player_number: u8,
    pub battle_active: bool,
    pub opponent: Option<PvpPlayerView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvpStatusPayload {
    pub total_players: usize,
    pub active_rooms: usize,
    pub open_slots: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_count: Option<usize>,
}

// ---------------------------------------------------------------------------
// KOZ payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KozLobbyPlayer {
    pub conn_id: ConnId,
    pub name: String,
    pub avatar: String,
    pub hero: HeroClass,
    pub weapon_type: WeaponKind,
    pub spectator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyStatePayload {
    pub state: MatchPhase,
    pub room_id: String,
    pub min_players: usize,
    pub active_players: usize,
    pub spectators: usize,
    pub countdown: u32,
    pub map: MapView,
    pub players: Vec<KozLobbyPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStatePayload {
    pub state: MatchPhase,
    pub time_left: u32,
    pub countdown: u32,
    pub next_shrink_in: u32,
    pub zone_radius: f64,
    pub min_players: usize,
    pub active_players: usize,
    pub map: MapView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KozRoomStatePayload {
    pub conn_id: ConnId,
    pub role: PlayerRole,
    pub room_id: String,
    pub width: f64,
    pub height: f64,
    pub tick_rate: u32,
    pub snapshot_rate: u32,
    pub min_players: usize,
    pub active_players: usize,
    pub lobby: LobbyStatePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KozPlayerView {
    pub conn_id: ConnId,
    pub name: String,
    pub avatar: String,
    pub hero: HeroClass,
    pub weapon_type: WeaponKind,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub hp: i32,
    pub max_hp: i32,
    pub ammo: u32,
    pub alive: bool,
    pub score: i64,
    pub kills: u32,
    pub deaths: u32,
    pub spectator: bool,
    pub last_input_seq: u64,
    pub overclock_meter: f64,
    pub overclock_active: bool,
    pub core_holder: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMatchInfo {
    pub state: MatchPhase,
    pub time_left: u32,
    pub countdown: u32,
    pub next_shrink_in: u32,
    pub score_target: i64,
    pub min_players: usize,
    pub active_players: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KozSnapshot {
    pub seq: u64,
    pub server_time: f64,
    pub room_id: String,
    pub map: MapView,
    pub match_info: SnapshotMatchInfo,
    pub zone: ZoneView,
    pub storm: StormView,
    pub core: CoreView,
    pub players: Vec<KozPlayerView>,
    pub projectiles: Vec<ProjectileView>,
    pub powerups: Vec<PowerUpView>,
    pub obstacles: Vec<ObstacleView>,
    pub scoreboard: Vec<ScoreboardEntry>,
    pub killfeed: Vec<KillfeedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStartPayload {
    pub state: MatchPhase,
    pub time_left: u32,
    pub started_at: f64,
    pub score_target: i64,
    pub map: MapView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEndPayload {
    pub reason: String,
    pub winner: Option<ScoreboardEntry>,
    pub results: Vec<ScoreboardEntry>,
    pub reset_in: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapView>,
}

// ---------------------------------------------------------------------------
// Slither payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbView {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlitherPlayerView {
    pub conn_id: ConnId,
    pub name: String,
    pub color: String,
    pub alive: bool,
    pub spectator: bool,
    pub score: i64,
    pub kills: u32,
    pub length: f64,
    pub boost_active: bool,
    pub segments: Vec<PointView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectating: Option<ConnId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub conn_id: ConnId,
    pub name: String,
    pub score: i64,
    pub kills: u32,
    pub length: f64,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArenaBoundsView {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlitherRoomStatePayload {
    pub conn_id: ConnId,
    pub room_id: String,
    pub role: PlayerRole,
    pub state: MatchPhase,
    pub time_left: u32,
    pub tick_rate: u32,
    pub bounds: ArenaBoundsView,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlitherSnapshot {
    pub seq: u64,
    pub server_time: f64,
    pub room_id: String,
    pub state: MatchPhase,
    pub time_left: u32,
    pub bounds: ArenaBoundsView,
    pub alive_count: usize,
    pub players: Vec<SlitherPlayerView>,
    pub orbs: Vec<OrbView>,
}

// ---------------------------------------------------------------------------
// Chat / lobby payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyMemberView {
    pub conn_id: ConnId,
    pub username: String,
    pub character: HeroClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conn_id: Option<ConnId>,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<HeroClass>,
    pub content: String,
    pub system: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

// ---------------------------------------------------------------------------
// Mode-dependent room_state body
// ---------------------------------------------------------------------------

/// Payload of the `room_state` event. The concrete shape depends on the mode
/// the receiver joined; clients know which arm to expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomStateBody {
    Boss(BossRoomStatePayload),
    Koz(KozRoomStatePayload),
    Slither(SlitherRoomStatePayload),
    Pvp(PvpRoomStatePayload),
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    // ---- Room membership ----
    RoomState(Box<RoomStateBody>),
    RoomFull {
        message: String,
    },
    RoomClosed {
        message: String,
    },
    PlayerJoined {
        player: BossPlayerView,
        player_count: usize,
    },
    PlayerLeft {
        conn_id: ConnId,
        name: String,
        reason: String,
        player_count: usize,
    },

    // ---- Movement ----
    SelfPosition {
        x: f64,
        y: f64,
    },
    PlayerPosition {
        conn_id: ConnId,
        x: f64,
        y: f64,
    },

    // ---- Combat ----
    PlayerBullet {
        conn_id: ConnId,
        bullet_x: f64,
        bullet_y: f64,
        dx: f64,
        dy: f64,
        character: HeroClass,
    },
    ProjectileSpawned {
        owner: ConnId,
        projectiles: Vec<ProjectileView>,
    },
    ProjectilePositions {
        projectiles: Vec<ProjectileView>,
    },
    ProjectileRemoved {
        ids: Vec<String>,
    },
    PlayerHit {
        target: ConnId,
        #[serde(skip_serializing_if = "Option::is_none")]
        attacker: Option<ConnId>,
        damage: f64,
        hp: i32,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        projectile_id: Option<String>,
    },
    PlayerDamaged {
        conn_id: ConnId,
        name: String,
        lives: i64,
    },
    PlayerDied {
        conn_id: ConnId,
        #[serde(skip_serializing_if = "Option::is_none")]
        killer: Option<ConnId>,
        reason: String,
        respawn_in: f64,
    },
    PlayerStatsUpdate {
        conn_id: ConnId,
        name: String,
        bullets: i64,
        lives: i64,
    },
    HealthUpdate {
        boss_health: f64,
        max_boss_health: f64,
        attacker: String,
        damage: f64,
    },
    Defeated {
        message: String,
        players: Vec<BossPlayerView>,
        all_player_stats: Vec<BossFinalStats>,
    },
    ShotRejected {
        reason: RejectReason,
    },
    Killfeed(KillfeedEntry),

    // ---- Power-ups / zone / core ----
    PowerupSpawned(PowerUpView),
    PowerupCollected {
        id: String,
        #[serde(rename = "type")]
        kind: PowerUpKind,
        by: ConnId,
        username: String,
    },
    ZoneEvent {
        kind: String,
        zone: ZoneView,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    ControlChanged {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        conn_id: Option<ConnId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },

    // ---- Lifecycle ----
    CountdownStart {
        seconds: u32,
        min_players: usize,
    },
    CountdownCancelled {
        reason: String,
        active_players: usize,
        min_players: usize,
    },
    MatchStart(Box<MatchStartPayload>),
    MatchEnd(Box<MatchEndPayload>),
    Results(Box<MatchEndPayload>),
    MatchState(Box<MatchStatePayload>),
    Snapshot(Box<KozSnapshot>),
    ArenaState(Box<SlitherSnapshot>),
    LeaderboardUpdate {
        entries: Vec<LeaderboardEntry>,
    },

    // ---- PVP specifics ----
    OpponentJoined {
        opponent: PvpPlayerView,
        player_count: usize,
    },
    OpponentLeft {
        username: String,
    },
    OpponentPosition {
        x: f64,
        y: f64,
    },
    OpponentShot {
        bullet_x: f64,
        bullet_y: f64,
        dx: f64,
        dy: f64,
        character: HeroClass,
    },
    OpponentStats {
        bullets: i64,
        lives: i64,
    },
    MatchReady {
        message: String,
        player_count: usize,
        player1: Option<PvpPlayerView>,
        player2: Option<PvpPlayerView>,
    },
    BattleStart {
        message: String,
        player1: Option<PvpPlayerView>,
        player2: Option<PvpPlayerView>,
    },
    PvpStatus(PvpStatusPayload),
    RoomStatus {
        room_id: String,
        player_count: usize,
        battle_active: bool,
    },

    // ---- Chat / lobby / presence ----
    ChatMessage(ChatMessagePayload),
    LobbyState(Box<LobbyStatePayload>),
    LobbyMembers {
        members: Vec<LobbyMemberView>,
    },
    LobbyPlayerCount {
        player_count: usize,
    },
    PlayerAway {
        conn_id: ConnId,
        username: String,
    },
    PlayerReturned {
        conn_id: ConnId,
        username: String,
    },

    // ---- Transport ----
    Error {
        message: String,
    },
    DebugResponse {
        state: serde_json::Value,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_names_follow_mode_prefix_contract() {
        let json = serde_json::to_value(&ClientEvent::KozPlayerShoot {
            aim_x: 1.0,
            aim_y: 2.0,
        })
        .unwrap();
        assert_eq!(json["type"], "koz_player_shoot");

        let json = serde_json::to_value(&ClientEvent::BossJoinRoom {
            room_id: Some("r1".into()),
            player: JoinProfile::default(),
            bounds: None,
            boss_health: None,
            max_boss_health: None,
        })
        .unwrap();
        assert_eq!(json["type"], "boss_join_room");
    }

    #[test]
    fn client_event_parses_legacy_aliases() {
        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"koz_player_shoot","data":{"aimX":140.5,"aimY":-3.0}}"#,
        )
        .unwrap();
        match ev {
            ClientEvent::KozPlayerShoot { aim_x, aim_y } => {
                assert!((aim_x - 140.5).abs() < f64::EPSILON);
                assert!((aim_y + 3.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_client_event_is_a_parse_error() {
        let parsed: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"teleport_hack","data":{}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn server_event_round_trips() {
        let event = ServerEvent::ShotRejected {
            reason: RejectReason::Cooldown,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("shot_rejected"));
        assert!(json.contains("cooldown"));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        match back {
            ServerEvent::ShotRejected { reason } => assert_eq!(reason, RejectReason::Cooldown),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn powerup_view_serializes_kind_as_type() {
        let view = PowerUpView {
            id: "pow_1".into(),
            kind: PowerUpKind::RapidFire,
            x: 1.0,
            y: 2.0,
            radius: 18.0,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "rapid-fire");
    }
}
