//! Scripted input for headless clients
//!
//! A pattern such as `right:30,none:10,up:20` holds each direction for the
//! given number of input frames and loops forever. Only changes of intent
//! are reported, so the network layer sends one `playerMove` per change.

use shared::Direction;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ScriptError {
    #[error("empty input pattern")]
    Empty,
    #[error("step '{0}' is not of the form direction:frames")]
    MalformedStep(String),
    #[error("{0}")]
    UnknownDirection(String),
    #[error("invalid frame count in step '{0}'")]
    InvalidFrames(String),
}

/// What the client should send this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFrame {
    /// New intent, present only when it differs from the last one sent.
    pub intent: Option<Direction>,
    pub fire: bool,
}

/// Generates movement intent and fire requests from a looping script
pub struct InputManager {
    steps: Vec<(Direction, u32)>,
    step: usize,
    frames_in_step: u32,
    current: Option<Direction>,
    /// Fire every N frames; zero disables firing.
    fire_every: u32,
    frame: u64,
}

impl InputManager {
    pub fn new(steps: Vec<(Direction, u32)>, fire_every: u32) -> Self {
        Self {
            steps,
            step: 0,
            frames_in_step: 0,
            current: None,
            fire_every,
            frame: 0,
        }
    }

    /// Parses a pattern like `right:30,none:10`.
    pub fn from_pattern(pattern: &str, fire_every: u32) -> Result<Self, ScriptError> {
        let mut steps = Vec::new();
        for step in pattern.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (direction, frames) = step
                .split_once(':')
                .ok_or_else(|| ScriptError::MalformedStep(step.to_string()))?;
            let direction: Direction = direction.parse().map_err(ScriptError::UnknownDirection)?;
            let frames: u32 = frames
                .trim()
                .parse()
                .map_err(|_| ScriptError::InvalidFrames(step.to_string()))?;
            if frames > 0 {
                steps.push((direction, frames));
            }
        }

        if steps.is_empty() {
            return Err(ScriptError::Empty);
        }
        Ok(Self::new(steps, fire_every))
    }

    /// Advances the script by one frame.
    pub fn update(&mut self) -> InputFrame {
        let direction = self.sample();
        let intent = if self.current != Some(direction) {
            self.current = Some(direction);
            Some(direction)
        } else {
            None
        };

        self.frame += 1;
        let fire = self.fire_every > 0 && self.frame % self.fire_every as u64 == 0;
        InputFrame { intent, fire }
    }

    pub fn current(&self) -> Direction {
        self.current.unwrap_or_default()
    }

    fn sample(&mut self) -> Direction {
        let Some(&(direction, frames)) = self.steps.get(self.step) else {
            return Direction::None;
        };
        self.frames_in_step += 1;
        if self.frames_in_step >= frames {
            self.frames_in_step = 0;
            self.step = (self.step + 1) % self.steps.len();
        }
        direction
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(vec![(Direction::None, 1)], 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pattern() {
        let manager = InputManager::from_pattern("right:3, none:2,u:1", 0).unwrap();
        assert_eq!(
            manager.steps,
            vec![
                (Direction::Right, 3),
                (Direction::None, 2),
                (Direction::Up, 1)
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(InputManager::from_pattern("", 0).err(), Some(ScriptError::Empty));
        assert_eq!(
            InputManager::from_pattern("right", 0).err(),
            Some(ScriptError::MalformedStep("right".to_string()))
        );
        assert!(matches!(
            InputManager::from_pattern("sideways:3", 0),
            Err(ScriptError::UnknownDirection(_))
        ));
        assert_eq!(
            InputManager::from_pattern("up:x", 0).err(),
            Some(ScriptError::InvalidFrames("up:x".to_string()))
        );
    }

    #[test]
    fn test_only_changes_are_reported() {
        let mut manager = InputManager::from_pattern("right:2,left:1", 0).unwrap();
        let intents: Vec<Option<Direction>> = (0..6).map(|_| manager.update().intent).collect();
        assert_eq!(
            intents,
            vec![
                Some(Direction::Right),
                None,
                Some(Direction::Left),
                Some(Direction::Right),
                None,
                Some(Direction::Left),
            ]
        );
        assert_eq!(manager.current(), Direction::Left);
    }

    #[test]
    fn test_single_step_reported_once() {
        let mut manager = InputManager::from_pattern("down:1", 0).unwrap();
        assert_eq!(manager.update().intent, Some(Direction::Down));
        assert_eq!(manager.update().intent, None);
        assert_eq!(manager.update().intent, None);
    }

    #[test]
    fn test_fire_cadence() {
        let mut manager = InputManager::from_pattern("none:1", 3).unwrap();
        let fires: Vec<bool> = (0..6).map(|_| manager.update().fire).collect();
        assert_eq!(fires, vec![false, false, true, false, false, true]);

        let mut quiet = InputManager::default();
        assert!((0..10).all(|_| !quiet.update().fire));
    }
}
