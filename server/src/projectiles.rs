//! Fixed-capacity projectile pool owned by a single player.
//!
//! Slots are created once with ids `0..capacity` and recycled: a slot that
//! expires or collides is immediately available to the next fire request.

use log::debug;
use shared::physics::{Body, Integrator};
use shared::{
    Direction, Vec2, FIRE_COOLDOWN_MS, PROJECTILE_OFFSET, PROJECTILE_RANGE, PROJECTILE_SIZE,
    PROJECTILE_SPEED,
};

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: u32,
    pub owner_id: u32,
    pub active: bool,
    /// Owner position at fire time; range is measured from here.
    pub origin: Vec2,
    pub direction: Direction,
    pub velocity: Vec2,
    pub body: Body,
    pub zone_id: String,
    pub speed: f32,
    pub range: f32,
}

impl Projectile {
    fn new(id: u32, owner_id: u32) -> Self {
        let mut body = Body::new(Vec2::ZERO, PROJECTILE_SIZE, PROJECTILE_SIZE);
        body.enabled = false;
        Self {
            id,
            owner_id,
            active: false,
            origin: Vec2::ZERO,
            direction: Direction::None,
            velocity: Vec2::ZERO,
            body,
            zone_id: String::new(),
            speed: PROJECTILE_SPEED,
            range: PROJECTILE_RANGE,
        }
    }

    /// Displacement from the origin along each axis.
    pub fn displacement(&self) -> Vec2 {
        self.body.position.sub(&self.origin)
    }

    fn out_of_range(&self) -> bool {
        let d = self.displacement();
        d.x.abs() >= self.range || d.y.abs() >= self.range
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.body.enabled = false;
        self.velocity = Vec2::ZERO;
    }
}

#[derive(Debug, Clone)]
pub struct ProjectilePool {
    owner_id: u32,
    projectiles: Vec<Projectile>,
    cooldown_ms: u64,
    last_fire_ms: Option<u64>,
}

impl ProjectilePool {
    pub fn new(owner_id: u32, capacity: usize) -> Self {
        let projectiles = (0..capacity as u32)
            .map(|id| Projectile::new(id, owner_id))
            .collect();
        Self {
            owner_id,
            projectiles,
            cooldown_ms: FIRE_COOLDOWN_MS,
            last_fire_ms: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    pub fn owner_id(&self) -> u32 {
        self.owner_id
    }

    /// Re-tags every slot after the owning player was revived under a new id.
    /// Projectiles in flight keep flying.
    pub fn set_owner(&mut self, owner_id: u32) {
        self.owner_id = owner_id;
        for projectile in &mut self.projectiles {
            projectile.owner_id = owner_id;
        }
    }

    pub fn capacity(&self) -> usize {
        self.projectiles.len()
    }

    fn cooling_down(&self, now_ms: u64) -> bool {
        self.last_fire_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < self.cooldown_ms)
    }

    /// Launches the first free slot from `origin` towards `direction`.
    ///
    /// Returns `None` without side effects while the cooldown runs or when
    /// every slot is in flight.
    pub fn fire(&mut self, direction: Direction, origin: Vec2, zone_id: &str, now_ms: u64) -> Option<u32> {
        if !direction.is_moving() || self.cooling_down(now_ms) {
            return None;
        }

        let projectile = self.projectiles.iter_mut().find(|p| !p.active)?;

        let unit = direction.unit();
        projectile.origin = origin;
        projectile.direction = direction;
        projectile.velocity = unit.scale(projectile.speed);
        projectile.body.reset(origin.add(&unit.scale(PROJECTILE_OFFSET)));
        projectile.body.enabled = true;
        projectile.zone_id = zone_id.to_string();
        projectile.active = true;

        self.last_fire_ms = Some(now_ms);
        debug!(
            "Player {} fired projectile {} {}",
            self.owner_id, projectile.id, direction
        );
        Some(projectile.id)
    }

    /// Moves every active projectile and expires those past their range.
    /// Returns the ids that expired this step.
    pub fn advance<I: Integrator>(&mut self, dt: f32, integrator: &I) -> Vec<u32> {
        let mut expired = Vec::new();
        for projectile in self.projectiles.iter_mut().filter(|p| p.active) {
            integrator.apply_velocity(&mut projectile.body, projectile.velocity, dt, &[]);
            if projectile.out_of_range() {
                projectile.deactivate();
                expired.push(projectile.id);
            }
        }
        expired
    }

    /// Deactivates a projectile after a hit. Returns false if the id is
    /// unknown or the projectile was not in flight.
    pub fn collide(&mut self, id: u32) -> bool {
        match self.projectiles.get_mut(id as usize) {
            Some(projectile) if projectile.active => {
                projectile.deactivate();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: u32) -> Option<&Projectile> {
        self.projectiles.get(id as usize)
    }

    pub fn active(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.iter().filter(|p| p.active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::physics::ArcadeIntegrator;
    use shared::PROJECTILE_CAPACITY;

    const DT: f32 = 1.0 / 60.0;

    fn pool() -> ProjectilePool {
        ProjectilePool::new(7, PROJECTILE_CAPACITY)
    }

    #[test]
    fn test_pool_creation() {
        let pool = pool();
        assert_eq!(pool.capacity(), PROJECTILE_CAPACITY);
        assert_eq!(pool.active_count(), 0);
        for id in 0..PROJECTILE_CAPACITY as u32 {
            let p = pool.get(id).unwrap();
            assert_eq!(p.id, id);
            assert_eq!(p.owner_id, 7);
            assert!(!p.active);
        }
    }

    #[test]
    fn test_fire_uses_first_free_slot() {
        let mut pool = pool();
        let origin = Vec2::new(100.0, 100.0);
        assert_eq!(pool.fire(Direction::Right, origin, "N1", 0), Some(0));
        assert_eq!(pool.fire(Direction::Right, origin, "N1", 250), Some(1));

        let p = pool.get(0).unwrap();
        assert!(p.active);
        assert_eq!(p.origin, origin);
        assert_eq!(p.body.position, Vec2::new(132.0, 100.0));
        assert_eq!(p.velocity, Vec2::new(PROJECTILE_SPEED, 0.0));
        assert_eq!(p.zone_id, "N1");
    }

    #[test]
    fn test_fire_respects_cooldown() {
        let mut pool = pool();
        let origin = Vec2::new(100.0, 100.0);
        let mut accepted = 0;
        // One request every 10ms for one second.
        for t in (0..1000).step_by(10) {
            if pool.fire(Direction::Up, origin, "N1", t).is_some() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 4);
    }

    #[test]
    fn test_rejected_fire_does_not_reset_cooldown() {
        let mut pool = pool();
        let origin = Vec2::ZERO;
        assert!(pool.fire(Direction::Up, origin, "N1", 0).is_some());
        assert!(pool.fire(Direction::Up, origin, "N1", 200).is_none());
        assert!(pool.fire(Direction::Up, origin, "N1", 250).is_some());
    }

    #[test]
    fn test_fire_rejects_when_exhausted() {
        let mut pool = ProjectilePool::new(1, 2).with_cooldown(0);
        let origin = Vec2::new(500.0, 500.0);
        assert_eq!(pool.fire(Direction::Left, origin, "N1", 0), Some(0));
        assert_eq!(pool.fire(Direction::Left, origin, "N1", 1), Some(1));
        assert_eq!(pool.fire(Direction::Left, origin, "N1", 2), None);

        assert!(pool.collide(0));
        assert_eq!(pool.fire(Direction::Left, origin, "N1", 3), Some(0));
    }

    #[test]
    fn test_fire_without_direction_is_ignored() {
        let mut pool = pool();
        assert_eq!(pool.fire(Direction::None, Vec2::ZERO, "N1", 0), None);
        assert_eq!(pool.fire(Direction::Down, Vec2::ZERO, "N1", 0), Some(0));
    }

    #[test]
    fn test_projectile_expires_within_range() {
        let integrator = ArcadeIntegrator::default();
        for direction in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
            let mut pool = pool();
            let origin = Vec2::new(600.0, 480.0);
            let id = pool.fire(direction, origin, "N1", 0).unwrap();

            let mut steps = 0;
            while pool.get(id).unwrap().active {
                let d = pool.get(id).unwrap().displacement();
                assert!(d.x.abs() < PROJECTILE_RANGE && d.y.abs() < PROJECTILE_RANGE);
                let expired = pool.advance(DT, &integrator);
                steps += 1;
                if !expired.is_empty() {
                    assert_eq!(expired, vec![id]);
                }
                assert!(steps < 1000, "projectile never expired");
            }
            assert_eq!(pool.active_count(), 0);
        }
    }

    #[test]
    fn test_collide_deactivates_once() {
        let mut pool = pool();
        pool.fire(Direction::Right, Vec2::ZERO, "N1", 0);
        assert!(pool.collide(0));
        assert!(!pool.collide(0));
        assert!(!pool.collide(99));
        assert!(!pool.get(0).unwrap().body.enabled);
    }

    #[test]
    fn test_set_owner_keeps_flight() {
        let mut pool = pool();
        pool.fire(Direction::Right, Vec2::ZERO, "N1", 0);
        pool.set_owner(3);
        assert_eq!(pool.owner_id(), 3);
        assert_eq!(pool.get(0).unwrap().owner_id, 3);
        assert!(pool.get(0).unwrap().active);
    }
}
