//! Movement rule shared by the authoritative server and client prediction.
//!
//! Both sides must integrate intent identically, otherwise reconciliation
//! would chase a permanent offset.

use crate::geometry::Vec2;
use crate::PLAYER_SPEED;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Movement intent sent by a client. One key at a time, no diagonals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    #[default]
    None,
}

impl Direction {
    /// Unit vector for the direction in screen coordinates (y grows down).
    pub fn unit(self) -> Vec2 {
        match self {
            Direction::Up => Vec2::new(0.0, -1.0),
            Direction::Down => Vec2::new(0.0, 1.0),
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
            Direction::None => Vec2::ZERO,
        }
    }

    pub fn is_moving(self) -> bool {
        self != Direction::None
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "u" => Ok(Direction::Up),
            "down" | "d" => Ok(Direction::Down),
            "left" | "l" => Ok(Direction::Left),
            "right" | "r" => Ok(Direction::Right),
            "none" | "n" | "-" => Ok(Direction::None),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Velocity produced by an intent at the fixed player speed.
pub fn intent_velocity(direction: Direction) -> Vec2 {
    direction.unit().scale(PLAYER_SPEED)
}
