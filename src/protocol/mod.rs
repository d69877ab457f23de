//! WebSocket message protocol definitions.
//!
//! Split into the id/enum vocabulary ([`types`]), the event envelopes
//! ([`events`]) and inbound payload sanitization ([`validation`]).

pub mod events;
pub mod types;
pub mod validation;

pub use events::{
    ArenaBoundsView, BossBoundsView, BossFinalStats, BossPlayerView, BossRoomStatePayload,
    ChatMessagePayload, ClientEvent, CoreView, KillfeedEntry, KozLobbyPlayer, KozPlayerView,
    KozRoomStatePayload, KozSnapshot, LeaderboardEntry, LobbyMemberView, LobbyStatePayload,
    MapView, MatchEndPayload, MatchStartPayload, MatchStatePayload, ObstacleView, OrbView,
    PointView, PowerUpView, ProjectileView, PvpPlayerView, PvpRoomStatePayload, PvpStatusPayload,
    RoomStateBody, ScoreboardEntry, SelfSeat, ServerEvent, SlitherPlayerView,
    SlitherRoomStatePayload, SlitherSnapshot, SnapshotMatchInfo, StormView, ZoneView,
};
pub use types::{
    BoundsHint, ConnId, GameMode, HeroClass, InputAxes, JoinProfile, MatchPhase, PlayerRole,
    PowerUpKind, RejectReason, UserId, WeaponKind,
};
