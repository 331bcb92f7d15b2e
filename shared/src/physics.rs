//! Physics integration capability used by entities.
//!
//! Entities own a plain [`Body`]; movement goes through an [`Integrator`]
//! so the simulation does not depend on a particular engine.

use crate::geometry::{Rect, Vec2};
use crate::{WORLD_HEIGHT, WORLD_WIDTH};

/// Axis-aligned physics body. `position` is the center of the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub position: Vec2,
    pub width: f32,
    pub height: f32,
    /// Disabled bodies neither move nor overlap anything.
    pub enabled: bool,
    /// Whether the body is kept inside the world rectangle.
    pub collide_world_bounds: bool,
}

impl Body {
    pub fn new(position: Vec2, width: f32, height: f32) -> Self {
        Self {
            position,
            width,
            height,
            enabled: true,
            collide_world_bounds: false,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::centered(self.position, self.width, self.height)
    }

    /// Moves the body to `position` without integrating.
    pub fn reset(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.enabled && self.bounds().overlaps(other)
    }
}

/// Narrow interface to the movement integrator.
pub trait Integrator {
    /// Advances `body` by `velocity * dt`. Blockers stop the body at their
    /// edge instead of letting it pass through.
    fn apply_velocity(&self, body: &mut Body, velocity: Vec2, dt: f32, blockers: &[Rect]);

    fn position(&self, body: &Body) -> Vec2 {
        body.position
    }

    /// Overlap test used by collision callbacks.
    fn on_overlap(&self, body: &Body, other: &Rect) -> bool {
        body.overlaps(other)
    }
}

/// Arcade-style integrator: axis-separated movement with push-out against
/// static blockers and an optional world boundary.
#[derive(Debug, Clone, Copy)]
pub struct ArcadeIntegrator {
    pub world: Rect,
}

impl ArcadeIntegrator {
    pub fn new(world: Rect) -> Self {
        Self { world }
    }

    fn resolve_x(body: &mut Body, dx: f32, blockers: &[Rect]) {
        for wall in blockers {
            if !body.bounds().overlaps(wall) {
                continue;
            }
            if dx > 0.0 {
                body.position.x = wall.x - body.width / 2.0;
            } else if dx < 0.0 {
                body.position.x = wall.x + wall.width + body.width / 2.0;
            }
        }
    }

    fn resolve_y(body: &mut Body, dy: f32, blockers: &[Rect]) {
        for wall in blockers {
            if !body.bounds().overlaps(wall) {
                continue;
            }
            if dy > 0.0 {
                body.position.y = wall.y - body.height / 2.0;
            } else if dy < 0.0 {
                body.position.y = wall.y + wall.height + body.height / 2.0;
            }
        }
    }

    fn clamp_to_world(&self, body: &mut Body) {
        let half_w = body.width / 2.0;
        let half_h = body.height / 2.0;
        body.position.x = body
            .position
            .x
            .clamp(self.world.x + half_w, self.world.x + self.world.width - half_w);
        body.position.y = body
            .position
            .y
            .clamp(self.world.y + half_h, self.world.y + self.world.height - half_h);
    }
}

impl Default for ArcadeIntegrator {
    fn default() -> Self {
        Self::new(Rect::new(0.0, 0.0, WORLD_WIDTH, WORLD_HEIGHT))
    }
}

impl Integrator for ArcadeIntegrator {
    fn apply_velocity(&self, body: &mut Body, velocity: Vec2, dt: f32, blockers: &[Rect]) {
        if !body.enabled {
            return;
        }

        let dx = velocity.x * dt;
        let dy = velocity.y * dt;

        if dx != 0.0 {
            body.position.x += dx;
            Self::resolve_x(body, dx, blockers);
        }
        if dy != 0.0 {
            body.position.y += dy;
            Self::resolve_y(body, dy, blockers);
        }

        if body.collide_world_bounds {
            self.clamp_to_world(body);
        }
    }
}
