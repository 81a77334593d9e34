//! Scene state - where the persona is and what hour it is in their world.

use serde::{Deserialize, Serialize};

use crate::mechanics::TimeOfDay;

/// The persona's current in-world situation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// In-world hour, `0..=23`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
}

impl SceneState {
    /// Create an empty scene state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the in-world hour. Values past 23 wrap around the clock.
    pub fn with_hour(mut self, hour: u8) -> Self {
        self.hour = Some(hour % 24);
        self
    }

    /// True when neither a location nor an hour is known.
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.hour.is_none()
    }

    pub fn time_of_day(&self) -> Option<TimeOfDay> {
        self.hour.map(TimeOfDay::from_hour)
    }

    pub fn is_night(&self) -> bool {
        matches!(self.time_of_day(), Some(TimeOfDay::Night))
    }

    /// Advance the in-world clock. Starts counting from midnight when no hour is set.
    pub fn advance_hours(&mut self, hours: u32) {
        let current = u32::from(self.hour.unwrap_or(0) % 24);
        self.hour = Some(((current + hours % 24) % 24) as u8);
    }

    /// Move the persona somewhere else.
    pub fn move_to(&mut self, location: impl Into<String>) {
        self.location = Some(location.into());
    }
}
