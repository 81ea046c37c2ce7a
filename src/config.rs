use std::time::Duration;

use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

use crate::checkin::PointsPolicy;

/// Application settings read from the `classroom` key of Rocket's figment
/// (`Rocket.toml` or `ROCKET_CLASSROOM={...}`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClassroomConfig {
    pub sign_in_path: String,
    pub public_base_url: String,
    pub max_points: i64,
    pub points_step: i64,
    pub min_points: i64,
    pub feed_capacity: usize,
    pub playground_idle_minutes: u64,
}

impl Default for ClassroomConfig {
    fn default() -> Self {
        Self {
            sign_in_path: "signin".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
            max_points: 100,
            points_step: 10,
            min_points: 10,
            feed_capacity: 256,
            playground_idle_minutes: 120,
        }
    }
}

impl ClassroomConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        match figment.find_value("classroom") {
            Ok(_) => figment.extract_inner("classroom"),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn points_policy(&self) -> PointsPolicy {
        PointsPolicy {
            max_points: self.max_points,
            step: self.points_step,
            floor: self.min_points,
        }
    }

    /// How long an untouched playground runner survives the hourly sweep.
    pub fn playground_idle(&self) -> Duration {
        Duration::from_secs(self.playground_idle_minutes.saturating_mul(60))
    }

    /// Mount point of the check-in routes, always with a single leading slash.
    pub fn sign_in_base(&self) -> String {
        format!("/{}", self.sign_in_path.trim_matches('/'))
    }

    /// Shareable link students open (usually via the QR code) to check in.
    pub fn check_in_url(&self, session_code: &str) -> String {
        crate::sessions::check_in_url(&self.public_base_url, &self.sign_in_path, session_code)
    }
}
