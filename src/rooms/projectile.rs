//! Projectile subsystem: spawn, integrate, collide, report hits.
//!
//! Stepping is pure over a view of the room (obstacles + live target
//! circles) and returns what happened; the owning room applies damage and
//! emits events. That keeps hit resolution testable without a room.

use std::collections::{HashMap, HashSet};

use crate::config::WeaponSpec;
use crate::geometry::{circle_rect_intersects, distance};
use crate::protocol::{ConnId, ProjectileView, WeaponKind};
use crate::rooms::Obstacle;

/// Fraction of direct damage dealt to splash victims.
pub const SPLASH_DAMAGE_FACTOR: f64 = 0.55;

/// One live projectile. Damage attribution sticks to the spawning owner
/// even if that player has since left the room.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: String,
    pub owner: ConnId,
    pub owner_name: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub damage: f64,
    pub age: f64,
    pub lifetime: f64,
    pub pierce_remaining: u32,
    pub bounces_remaining: u32,
    pub splash_radius: f64,
    pub weapon: WeaponKind,
    pub color: String,
}

impl Projectile {
    /// Build one projectile of a spread from the weapon table.
    #[must_use]
    pub fn from_weapon(
        id: String,
        owner: ConnId,
        owner_name: String,
        origin: (f64, f64),
        angle: f64,
        weapon: WeaponKind,
        spec: &WeaponSpec,
        damage_mult: f64,
    ) -> Self {
        Self {
            id,
            owner,
            owner_name,
            x: origin.0,
            y: origin.1,
            vx: angle.cos() * spec.speed,
            vy: angle.sin() * spec.speed,
            radius: spec.radius,
            damage: spec.damage * damage_mult,
            age: 0.0,
            lifetime: spec.lifetime,
            pierce_remaining: spec.pierce,
            bounces_remaining: spec.bounces,
            splash_radius: spec.splash,
            weapon,
            color: spec.color.clone(),
        }
    }

    #[must_use]
    pub fn view(&self) -> ProjectileView {
        ProjectileView {
            id: self.id.clone(),
            owner: self.owner,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            radius: self.radius,
            weapon_type: self.weapon,
            color: self.color.clone(),
        }
    }
}

/// A live, hittable player as seen by the projectile step.
#[derive(Debug, Clone, Copy)]
pub struct TargetCircle {
    pub conn: ConnId,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// One resolved projectile-player contact.
#[derive(Debug, Clone)]
pub struct ProjectileHit {
    pub projectile_id: String,
    pub owner: ConnId,
    pub owner_name: String,
    pub target: ConnId,
    pub damage: f64,
    pub at: (f64, f64),
    /// Secondary victims: (conn, damage).
    pub splash: Vec<(ConnId, f64)>,
}

/// Everything one integration step produced.
#[derive(Debug, Default)]
pub struct ProjectileStepOutcome {
    pub removed: Vec<String>,
    pub hits: Vec<ProjectileHit>,
    /// Destructible obstacles whose hp reached zero this step.
    pub broken_obstacles: Vec<String>,
}

/// Advance every projectile by `dt` against arena `(width, height)`.
///
/// Obstacle hp is mutated in place; callers remove broken obstacles and
/// apply the returned hits. A projectile referenced by a hit is always also
/// present in `removed` unless it pierced through with budget to spare.
pub fn step_projectiles(
    projectiles: &mut HashMap<String, Projectile>,
    obstacles: &mut Vec<Obstacle>,
    targets: &[TargetCircle],
    bounds: (f64, f64),
    dt: f64,
) -> ProjectileStepOutcome {
    let (width, height) = bounds;
    let mut outcome = ProjectileStepOutcome::default();

    for projectile in projectiles.values_mut() {
        projectile.age += dt;
        if projectile.age > projectile.lifetime {
            outcome.removed.push(projectile.id.clone());
            continue;
        }

        projectile.x += projectile.vx * dt;
        projectile.y += projectile.vy * dt;

        if !resolve_boundary(projectile, width, height) {
            outcome.removed.push(projectile.id.clone());
            continue;
        }

        if hits_obstacle(projectile, obstacles, &mut outcome) {
            outcome.removed.push(projectile.id.clone());
            continue;
        }

        if resolve_targets(projectile, targets, &mut outcome) {
            outcome.removed.push(projectile.id.clone());
        }
    }

    for id in &outcome.removed {
        projectiles.remove(id);
    }
    obstacles.retain(|o| !o.destructible || o.hp > 0);

    outcome
}

/// Reflect off arena edges while bounce budget lasts. Returns false when
/// the projectile is spent.
fn resolve_boundary(projectile: &mut Projectile, width: f64, height: f64) -> bool {
    let r = projectile.radius;
    let mut out_x = projectile.x < r || projectile.x > width - r;
    let mut out_y = projectile.y < r || projectile.y > height - r;

    while out_x || out_y {
        if projectile.bounces_remaining == 0 {
            return false;
        }
        projectile.bounces_remaining -= 1;
        if out_x {
            projectile.vx = -projectile.vx;
            projectile.x = projectile.x.clamp(r, width - r);
        }
        if out_y {
            projectile.vy = -projectile.vy;
            projectile.y = projectile.y.clamp(r, height - r);
        }
        out_x = projectile.x < r || projectile.x > width - r;
        out_y = projectile.y < r || projectile.y > height - r;
    }
    true
}

fn hits_obstacle(
    projectile: &Projectile,
    obstacles: &mut [Obstacle],
    outcome: &mut ProjectileStepOutcome,
) -> bool {
    for obstacle in obstacles.iter_mut() {
        if !circle_rect_intersects(projectile.x, projectile.y, projectile.radius, &obstacle.rect) {
            continue;
        }
        if obstacle.destructible {
            obstacle.hp -= 1;
            if obstacle.hp <= 0 {
                outcome.broken_obstacles.push(obstacle.id.clone());
            }
        }
        return true;
    }
    false
}

/// Apply direct and splash hits. Returns true when the projectile is spent.
fn resolve_targets(
    projectile: &mut Projectile,
    targets: &[TargetCircle],
    outcome: &mut ProjectileStepOutcome,
) -> bool {
    let mut struck: HashSet<ConnId> = HashSet::new();

    loop {
        let victim = targets.iter().find(|t| {
            t.conn != projectile.owner
                && !struck.contains(&t.conn)
                && distance(projectile.x, projectile.y, t.x, t.y) <= t.radius + projectile.radius
        });

        let Some(victim) = victim else {
            return false;
        };
        struck.insert(victim.conn);

        let splash = if projectile.splash_radius > 0.0 {
            targets
                .iter()
                .filter(|t| {
                    t.conn != projectile.owner
                        && t.conn != victim.conn
                        && distance(projectile.x, projectile.y, t.x, t.y)
                            <= projectile.splash_radius
                })
                .map(|t| (t.conn, projectile.damage * SPLASH_DAMAGE_FACTOR))
                .collect()
        } else {
            Vec::new()
        };

        outcome.hits.push(ProjectileHit {
            projectile_id: projectile.id.clone(),
            owner: projectile.owner,
            owner_name: projectile.owner_name.clone(),
            target: victim.conn,
            damage: projectile.damage,
            at: (projectile.x, projectile.y),
            splash,
        });

        if projectile.pierce_remaining == 0 {
            return true;
        }
        projectile.pierce_remaining -= 1;
    }
}
