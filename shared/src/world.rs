//! Static world description loaded at startup: every zone with its walls,
//! warps and spawn point, plus the zone new players start in.
//!
//! Layouts are plain JSON so designed maps and the output of an external cave
//! generator can be fed in the same way.

use serde::{Deserialize, Serialize};
use crate::codec::DELIMITER;
use crate::geometry::{Rect, Vec2};
use crate::{PLAYER_HEIGHT, PLAYER_WIDTH, TILE_SIZE};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("failed to read world file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid world file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("zone id {0:?} is empty or contains the record delimiter")]
    InvalidZoneId(String),
    #[error("zone {0} is defined twice")]
    DuplicateZone(String),
    #[error("default zone {0} does not exist")]
    UnknownDefaultZone(String),
    #[error("warp in zone {zone} leads to unknown zone {destination}")]
    UnknownDestination { zone: String, destination: String },
    #[error("spawn point of zone {0} overlaps a warp")]
    SpawnOnWarp(String),
}

/// Trigger region that moves a player to `destination`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warp {
    pub rect: Rect,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneLayout {
    pub id: String,
    #[serde(default)]
    pub walls: Vec<Rect>,
    #[serde(default)]
    pub warps: Vec<Warp>,
    pub spawn: Vec2,
}

impl ZoneLayout {
    /// Zone ids travel inside comma-delimited update records.
    pub fn validate_id(&self) -> Result<(), WorldError> {
        if self.id.is_empty() || self.id.contains(DELIMITER) {
            return Err(WorldError::InvalidZoneId(self.id.clone()));
        }
        Ok(())
    }

    fn spawn_bounds(&self) -> Rect {
        Rect::centered(self.spawn, PLAYER_WIDTH, PLAYER_HEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldLayout {
    pub default_zone: String,
    pub zones: Vec<ZoneLayout>,
}

fn tiles(col: f32, row: f32, cols: f32, rows: f32) -> Rect {
    Rect::new(col * TILE_SIZE, row * TILE_SIZE, cols * TILE_SIZE, rows * TILE_SIZE)
}

impl WorldLayout {
    pub fn from_json(json: &str) -> Result<Self, WorldError> {
        let layout: WorldLayout = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorldError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn zone(&self, id: &str) -> Option<&ZoneLayout> {
        self.zones.iter().find(|zone| zone.id == id)
    }

    /// Checks ids, warp destinations and spawn placement.
    pub fn validate(&self) -> Result<(), WorldError> {
        let mut ids = HashSet::new();
        for zone in &self.zones {
            zone.validate_id()?;
            if !ids.insert(zone.id.as_str()) {
                return Err(WorldError::DuplicateZone(zone.id.clone()));
            }
        }

        if !ids.contains(self.default_zone.as_str()) {
            return Err(WorldError::UnknownDefaultZone(self.default_zone.clone()));
        }

        for zone in &self.zones {
            for warp in &zone.warps {
                if !ids.contains(warp.destination.as_str()) {
                    return Err(WorldError::UnknownDestination {
                        zone: zone.id.clone(),
                        destination: warp.destination.clone(),
                    });
                }
            }
            let spawn = zone.spawn_bounds();
            if zone.warps.iter().any(|warp| warp.rect.overlaps(&spawn)) {
                return Err(WorldError::SpawnOnWarp(zone.id.clone()));
            }
        }

        Ok(())
    }

    /// Two designed zones joined by a warp on the shared edge, and one cave
    /// reachable from the top of `N2`.
    pub fn builtin() -> Self {
        Self {
            default_zone: "N1".to_string(),
            zones: vec![
                ZoneLayout {
                    id: "N1".to_string(),
                    walls: vec![tiles(12.0, 6.0, 1.0, 10.0), tiles(20.0, 20.0, 8.0, 1.0)],
                    warps: vec![Warp {
                        rect: tiles(38.0, 14.0, 2.0, 2.0),
                        destination: "N2".to_string(),
                    }],
                    spawn: Vec2::new(200.0, 480.0),
                },
                ZoneLayout {
                    id: "N2".to_string(),
                    walls: vec![tiles(24.0, 8.0, 1.0, 12.0)],
                    warps: vec![
                        Warp {
                            rect: tiles(0.0, 14.0, 2.0, 2.0),
                            destination: "N1".to_string(),
                        },
                        Warp {
                            rect: tiles(19.0, 0.0, 2.0, 2.0),
                            destination: "C1".to_string(),
                        },
                    ],
                    spawn: Vec2::new(200.0, 480.0),
                },
                ZoneLayout {
                    id: "C1".to_string(),
                    walls: vec![tiles(5.0, 5.0, 3.0, 3.0), tiles(30.0, 20.0, 4.0, 2.0)],
                    warps: vec![Warp {
                        rect: tiles(19.0, 28.0, 2.0, 2.0),
                        destination: "N2".to_string(),
                    }],
                    spawn: Vec2::new(640.0, 800.0),
                },
            ],
        }
    }
}

impl Default for WorldLayout {
    fn default() -> Self {
        Self::builtin()
    }
}
