//! Travel profiles: which edges a mode may use and how fast it moves.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::tile::format::{EdgeRecord, ACCESS_CAR, ACCESS_FOOT};

/// Travel mode selecting the access bit and speed field of every edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Car,
    Foot,
}

impl Profile {
    pub fn settings(self) -> ProfileSettings {
        match self {
            Profile::Car => ProfileSettings {
                profile: self,
                access_mask: ACCESS_CAR,
                heuristic_speed_mps: 13.9,
            },
            Profile::Foot => ProfileSettings {
                profile: self,
                access_mask: ACCESS_FOOT,
                heuristic_speed_mps: 1.4,
            },
        }
    }
}

/// Resolved per-profile configuration.
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub profile: Profile,
    pub access_mask: u8,
    /// Upper bound on any admissible edge speed; divides the heuristic
    /// distance so remaining-time estimates never overshoot.
    pub heuristic_speed_mps: f64,
}

impl ProfileSettings {
    /// The stored speed field this profile travels at on `edge`.
    pub fn edge_speed_mps(&self, edge: &EdgeRecord) -> f64 {
        match self.profile {
            Profile::Car => edge.speed_mps as f64,
            Profile::Foot => edge.foot_speed_mps as f64,
        }
    }
}
