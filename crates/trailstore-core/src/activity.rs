// ABOUTME: Typed activity categories for tracks with their persisted string ids.
// ABOUTME: Also maps the legacy icon names written by older schema versions onto activity types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Airplane,
    Biking,
    MountainBiking,
    MotorBike,
    Kayaking,
    Boat,
    Sailing,
    Driving,
    Running,
    Skiing,
    Snowboarding,
    Walking,
    EScooter,
    KickScooter,
    InlineSkating,
    Skateboarding,
    Climbing,
    Swimming,
    SwimmingOpenWater,
    Workout,
    #[default]
    Unknown,
}

impl ActivityType {
    pub const ALL: [ActivityType; 21] = [
        ActivityType::Airplane,
        ActivityType::Biking,
        ActivityType::MountainBiking,
        ActivityType::MotorBike,
        ActivityType::Kayaking,
        ActivityType::Boat,
        ActivityType::Sailing,
        ActivityType::Driving,
        ActivityType::Running,
        ActivityType::Skiing,
        ActivityType::Snowboarding,
        ActivityType::Walking,
        ActivityType::EScooter,
        ActivityType::KickScooter,
        ActivityType::InlineSkating,
        ActivityType::Skateboarding,
        ActivityType::Climbing,
        ActivityType::Swimming,
        ActivityType::SwimmingOpenWater,
        ActivityType::Workout,
        ActivityType::Unknown,
    ];

    /// The id stored in `tracks.activity_type`.
    pub fn id(self) -> &'static str {
        match self {
            ActivityType::Airplane => "airplane",
            ActivityType::Biking => "biking",
            ActivityType::MountainBiking => "mountain biking",
            ActivityType::MotorBike => "motor bike",
            ActivityType::Kayaking => "kayaking",
            ActivityType::Boat => "boat",
            ActivityType::Sailing => "sailing",
            ActivityType::Driving => "driving",
            ActivityType::Running => "running",
            ActivityType::Skiing => "skiing",
            ActivityType::Snowboarding => "snowboarding",
            ActivityType::Walking => "walking",
            ActivityType::EScooter => "escooter",
            ActivityType::KickScooter => "kickscooter",
            ActivityType::InlineSkating => "inline skating",
            ActivityType::Skateboarding => "skateboarding",
            ActivityType::Climbing => "climbing",
            ActivityType::Swimming => "swimming",
            ActivityType::SwimmingOpenWater => "swimming in open water",
            ActivityType::Workout => "workout",
            ActivityType::Unknown => "unknown",
        }
    }

    /// Parse a persisted id. Unrecognized ids become `Unknown`.
    pub fn from_id(id: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|activity| activity.id() == id)
            .unwrap_or(ActivityType::Unknown)
    }

    /// Icon names used before activity types were stored explicitly.
    pub fn from_legacy_icon(icon: &str) -> Option<Self> {
        let activity = match icon {
            "AIRPLANE" => ActivityType::Airplane,
            "BIKE" => ActivityType::Biking,
            "MOUNTAIN_BIKE" => ActivityType::MountainBiking,
            "MOTOR_BIKE" => ActivityType::MotorBike,
            "KAYAK" => ActivityType::Kayaking,
            "BOAT" => ActivityType::Boat,
            "SAILING" => ActivityType::Sailing,
            "DRIVE" => ActivityType::Driving,
            "RUN" => ActivityType::Running,
            "SKI" => ActivityType::Skiing,
            "SNOW_BOARDING" => ActivityType::Snowboarding,
            "WALK" => ActivityType::Walking,
            "ESCOOTER" => ActivityType::EScooter,
            "KICKSCOOTER" => ActivityType::KickScooter,
            "INLINES_SKATING" => ActivityType::InlineSkating,
            "SKATE_BOARDING" => ActivityType::Skateboarding,
            "CLIMBING" => ActivityType::Climbing,
            "SWIMMING" => ActivityType::Swimming,
            "SWIMMING_OPEN" => ActivityType::SwimmingOpenWater,
            "WORKOUT" => ActivityType::Workout,
            "UNKNOWN" => ActivityType::Unknown,
            _ => return None,
        };
        Some(activity)
    }

    /// Resolve the activity of a legacy row: the icon wins, then a category
    /// text that happens to match an activity id, then `Unknown`.
    pub fn from_legacy(icon: Option<&str>, category: Option<&str>) -> Self {
        if let Some(activity) = icon.and_then(Self::from_legacy_icon) {
            return activity;
        }
        category
            .map(|c| c.trim().to_lowercase())
            .and_then(|c| Self::ALL.into_iter().find(|a| a.id() == c))
            .unwrap_or(ActivityType::Unknown)
    }
}
