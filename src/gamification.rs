//! Streak, efficiency and pet descriptors.
//!
//! Everything here is a pure function of the current counters; nothing is
//! stored and descriptors are recomputed whenever they are shown.

use serde::Serialize;

/// Image shown next to every efficiency level.
pub const PET_IMAGE: &str = "/images/energy-pet.png";

/// Efficiency level for an average consumption score (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EfficiencyLevel {
    pub tier: &'static str,
    /// Hex colour, `#RRGGBB`.
    pub color: &'static str,
    pub image: &'static str,
    pub description: &'static str,
}

const NEXT_LEVEL_HINT: &str = "Keep up your energy-saving habits to reach the next level!";

/// Map an average consumption score to its efficiency level.
///
/// Lower consumption is better. Exactly `0` means no data yet.
pub fn efficiency_level(avg_consumption: f64) -> EfficiencyLevel {
    let (tier, color) = if avg_consumption == 0.0 {
        ("Starter / New", "#FFFFFF")
    } else if avg_consumption > 80.0 {
        ("Low Efficiency", "#FE8D00")
    } else if avg_consumption > 60.0 {
        ("Medium Efficiency", "#FFC94A")
    } else if avg_consumption > 40.0 {
        ("High Efficiency", "#245C94")
    } else {
        ("Perfect Streak", "#1C74D9")
    };
    EfficiencyLevel {
        tier,
        color,
        image: PET_IMAGE,
        description: NEXT_LEVEL_HINT,
    }
}

/// Calendar cell shading for one day's consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionBucket {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConsumptionBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Weekend usage is weighted up before bucketing.
pub const WEEKEND_FACTOR: f64 = 1.2;

pub fn consumption_bucket(consumption: f64, weekend: bool) -> ConsumptionBucket {
    let weighted = if weekend {
        consumption * WEEKEND_FACTOR
    } else {
        consumption
    };
    if weighted < 33.0 {
        ConsumptionBucket::Low
    } else if weighted < 66.0 {
        ConsumptionBucket::Medium
    } else {
        ConsumptionBucket::High
    }
}

/// Month-over-month change in percent, rounded. Positive means less energy
/// was used this period. `None` when there is no previous usage.
pub fn improvement_percent(current: f64, previous: f64) -> Option<i64> {
    if previous == 0.0 {
        return None;
    }
    Some((((previous - current) / previous) * 100.0).round() as i64)
}

// ---------------------------------------------------------------------------
// Pet
// ---------------------------------------------------------------------------

const STAT_MAX: u8 = 100;

/// The virtual pet's stats, each capped at 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pet {
    pub health: u8,
    pub energy: u8,
    happiness_bonus: u8,
}

impl Default for Pet {
    fn default() -> Self {
        Self {
            health: 75,
            energy: 60,
            happiness_bonus: 0,
        }
    }
}

impl Pet {
    /// Happiness follows health with a small head start.
    pub fn happiness(&self) -> u8 {
        self.health
            .saturating_add(10)
            .saturating_add(self.happiness_bonus)
            .min(STAT_MAX)
    }

    /// Feeding lifts happiness by 15 and energy by 10.
    pub fn feed(&mut self) {
        self.happiness_bonus = self.happiness_bonus.saturating_add(15).min(STAT_MAX);
        self.energy = self.energy.saturating_add(10).min(STAT_MAX);
    }

    /// Caring restores 5 health.
    pub fn care(&mut self) {
        self.health = self.health.saturating_add(5).min(STAT_MAX);
    }
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

/// Counters achievements are judged against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Progress {
    pub saved_kwh: f64,
    pub streak_days: u32,
    pub level: u32,
    pub pet_health: u8,
    pub optimized_devices: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub title: &'static str,
    pub description: &'static str,
    pub unlocked: bool,
}

/// Every achievement, in display order, with its unlock state.
pub fn achievements(p: &Progress) -> Vec<Achievement> {
    let rules: [(&str, &str, bool); 6] = [
        ("Energy Saver", "Save 10 kWh", p.saved_kwh >= 10.0),
        ("Week Warrior", "7-day streak", p.streak_days >= 7),
        ("Champion", "Reach Level 10", p.level >= 10),
        ("Pet Master", "100% pet health", p.pet_health >= STAT_MAX),
        ("Smart Home", "Optimize 5 devices", p.optimized_devices >= 5),
        ("Rising Star", "Level 5 reached", p.level >= 5),
    ];
    rules
        .into_iter()
        .map(|(title, description, unlocked)| Achievement {
            title,
            description,
            unlocked,
        })
        .collect()
}
