use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral identifier for a socket connection.
pub type ConnId = Uuid;

/// Stable user identifier resolved by the identity layer (None for guests).
pub type UserId = i64;

/// The four simulation modes hosted by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Boss,
    Pvp,
    Koz,
    Slither,
}

impl GameMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boss => "boss",
            Self::Pvp => "pvp",
            Self::Koz => "koz",
            Self::Slither => "slither",
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playable hero classes. Unknown values normalize to `Knight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeroClass {
    #[default]
    Knight,
    Wizard,
    Archer,
    Warrior,
}

impl HeroClass {
    /// Parse a client-supplied hero string, falling back to the default.
    #[must_use]
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("wizard") => Self::Wizard,
            Some("archer") => Self::Archer,
            Some("warrior") => Self::Warrior,
            _ => Self::Knight,
        }
    }

    /// Weapon granted when the client does not request one explicitly.
    #[must_use]
    pub fn default_weapon(self) -> WeaponKind {
        match self {
            Self::Knight => WeaponKind::BulwarkDisc,
            Self::Wizard => WeaponKind::ArcaneOrb,
            Self::Archer => WeaponKind::PiercingArrow,
            Self::Warrior => WeaponKind::RageAxe,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knight => "knight",
            Self::Wizard => "wizard",
            Self::Archer => "archer",
            Self::Warrior => "warrior",
        }
    }
}

/// Projectile archetypes. Tuning lives in the weapon table of the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeaponKind {
    BulwarkDisc,
    ArcaneOrb,
    PiercingArrow,
    RageAxe,
}

impl WeaponKind {
    /// Parse a client-supplied weapon string; invalid input falls back to
    /// the hero's default weapon.
    #[must_use]
    pub fn normalize(hero: HeroClass, raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("bulwark-disc") => Self::BulwarkDisc,
            Some("arcane-orb") => Self::ArcaneOrb,
            Some("piercing-arrow") => Self::PiercingArrow,
            Some("rage-axe") => Self::RageAxe,
            _ => hero.default_weapon(),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BulwarkDisc => "bulwark-disc",
            Self::ArcaneOrb => "arcane-orb",
            Self::PiercingArrow => "piercing-arrow",
            Self::RageAxe => "rage-axe",
        }
    }
}

/// Power-up archetypes shared by the modes that spawn them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerUpKind {
    Heal,
    Speed,
    Shield,
    RapidFire,
    Damage,
    Ammo,
    VisionPing,
}

impl PowerUpKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heal => "heal",
            Self::Speed => "speed",
            Self::Shield => "shield",
            Self::RapidFire => "rapid-fire",
            Self::Damage => "damage",
            Self::Ammo => "ammo",
            Self::VisionPing => "vision-ping",
        }
    }
}

/// Enumerated reasons an input was ignored. Sent to the offending client
/// only; never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Cooldown,
    Ammo,
    Aim,
    Busy,
    Inactive,
    Dead,
    Spectator,
    NotInRoom,
}

/// Lifecycle phase of a room. `Reset` is a transient phase visible only in
/// the `match_state` emitted while a room re-seeds its map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPhase {
    Lobby,
    Countdown,
    Active,
    Results,
    Reset,
}

impl MatchPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lobby => "LOBBY",
            Self::Countdown => "COUNTDOWN",
            Self::Active => "ACTIVE",
            Self::Results => "RESULTS",
            Self::Reset => "RESET",
        }
    }
}

/// Whether a connection participates in combat or only observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Player,
    Spectator,
}

/// Display profile carried by join events. Every field is optional; the
/// server sanitizes and fills defaults rather than erroring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "avatarUrl", alias = "avatar_url")]
    pub avatar: Option<String>,
    #[serde(default, alias = "character")]
    pub hero: Option<String>,
    #[serde(default, alias = "weaponType")]
    pub weapon_type: Option<String>,
    #[serde(default)]
    pub bullets: Option<i64>,
    #[serde(default)]
    pub lives: Option<i64>,
    #[serde(default, alias = "partyId")]
    pub party_id: Option<String>,
}

impl JoinProfile {
    /// Preferred display name before sanitization.
    #[must_use]
    pub fn raw_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.username.as_deref())
    }
}

/// Client-suggested arena bounds for modes that let the canvas size drive
/// the play area (boss battle). Normalized server-side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BoundsHint {
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub top: Option<f64>,
}

/// Movement axis flags as last reported by the client.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InputAxes {
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
    #[serde(default)]
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hero_normalization_falls_back_to_knight() {
        assert_eq!(HeroClass::normalize(Some("WIZARD")), HeroClass::Wizard);
        assert_eq!(HeroClass::normalize(Some("  archer ")), HeroClass::Archer);
        assert_eq!(HeroClass::normalize(Some("dragon")), HeroClass::Knight);
        assert_eq!(HeroClass::normalize(None), HeroClass::Knight);
    }

    #[test]
    fn weapon_normalization_uses_hero_default() {
        assert_eq!(
            WeaponKind::normalize(HeroClass::Wizard, None),
            WeaponKind::ArcaneOrb
        );
        assert_eq!(
            WeaponKind::normalize(HeroClass::Knight, Some("rage-axe")),
            WeaponKind::RageAxe
        );
        assert_eq!(
            WeaponKind::normalize(HeroClass::Archer, Some("nonsense")),
            WeaponKind::PiercingArrow
        );
    }

    #[test]
    fn mode_names_are_stable() {
        assert_eq!(GameMode::Boss.as_str(), "boss");
        assert_eq!(GameMode::Koz.to_string(), "koz");
    }

    #[test]
    fn join_profile_accepts_legacy_field_names() {
        let profile: JoinProfile = serde_json::from_str(
            r#"{"username":"Rook","character":"warrior","weaponType":"rage-axe","avatarUrl":"a.png"}"#,
        )
        .unwrap();
        assert_eq!(profile.raw_name(), Some("Rook"));
        assert_eq!(profile.hero.as_deref(), Some("warrior"));
        assert_eq!(profile.weapon_type.as_deref(), Some("rage-axe"));
        assert_eq!(profile.avatar.as_deref(), Some("a.png"));
    }
}
