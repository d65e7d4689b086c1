use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::store::KvSlot;

// The profile predates the unified document and keeps its original
// per-field keys in the same slot.
pub const NAME_KEY: &str = "ninjaUser";
pub const XP_KEY: &str = "totalXP";
pub const LEVEL_KEY: &str = "currentLevel";
pub const STATS_KEY: &str = "ninjaStats";

pub const MAX_GRADE: i64 = 12;

/// Grade titles, one per level 1..=12.
pub const GRADE_TITLES: [&str; 12] = [
    "THE_TACTUS",
    "SIMPLE_SUBDIVISION",
    "TERNARY_GROUPING",
    "THE_ANACRUSIS",
    "SYNCOPATION",
    "COMPOUND_METERS",
    "PARADIDDLES",
    "CROSS_RHYTHMS",
    "ASYMMETRIC_METERS",
    "THE_HEMIOLA",
    "MICRO_SUBDIVISIONS",
    "METRIC_MODULATION",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillStats {
    pub reading: i64,
    pub timing: i64,
    pub ident: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerProfile {
    pub name: String,
    pub xp: i64,
    pub level: i64,
    pub stats: SkillStats,
}

impl Default for PlayerProfile {
    fn default() -> Self {
        PlayerProfile {
            name: "GUEST_OPERATOR".to_string(),
            xp: 0,
            level: 1,
            stats: SkillStats::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillCategory {
    Reading,
    Timing,
    Ident,
}

impl SkillCategory {
    /// XP awarded against an unrecognized category still counts toward the
    /// total, it just doesn't move a skill stat.
    pub fn parse(raw: &str) -> Option<SkillCategory> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reading" => Some(SkillCategory::Reading),
            "timing" => Some(SkillCategory::Timing),
            "ident" => Some(SkillCategory::Ident),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeConfig {
    pub grade: i64,
    pub title: String,
    pub multiplier: f64,
    pub bpm: i64,
}

pub struct ProfileStore<'a> {
    slot: &'a dyn KvSlot,
}

impl<'a> ProfileStore<'a> {
    pub fn new(slot: &'a dyn KvSlot) -> Self {
        ProfileStore { slot }
    }

    /// Missing or unreadable fields fall back to the guest defaults. A stored
    /// level of 0 reads as 1, matching the legacy pages.
    pub fn load(&self) -> anyhow::Result<PlayerProfile> {
        let name = self
            .slot
            .get(NAME_KEY)?
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "GUEST_OPERATOR".to_string());
        let xp = self
            .slot
            .get(XP_KEY)?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);
        let level = self
            .slot
            .get(LEVEL_KEY)?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v != 0)
            .unwrap_or(1);
        let stats = self
            .slot
            .get(STATS_KEY)?
            .and_then(|v| serde_json::from_str(&v).ok())
            .unwrap_or_default();
        Ok(PlayerProfile {
            name,
            xp,
            level,
            stats,
        })
    }

    fn save(&self, profile: &PlayerProfile) -> anyhow::Result<()> {
        self.slot.set(XP_KEY, &profile.xp.to_string())?;
        self.slot.set(LEVEL_KEY, &profile.level.to_string())?;
        let stats = serde_json::to_string(&profile.stats).context("serialize stats")?;
        self.slot.set(STATS_KEY, &stats)?;
        Ok(())
    }

    /// Full overwrite, name included. Used when restoring from a bundle;
    /// normal saves never touch the name key.
    pub fn restore(&self, profile: &PlayerProfile) -> anyhow::Result<()> {
        self.slot.set(NAME_KEY, &profile.name)?;
        self.save(profile)
    }

    pub fn award(&self, category: &str, amount: i64) -> anyhow::Result<PlayerProfile> {
        let mut profile = self.load()?;
        profile.xp += amount;
        match SkillCategory::parse(category) {
            Some(SkillCategory::Reading) => profile.stats.reading += amount,
            Some(SkillCategory::Timing) => profile.stats.timing += amount,
            Some(SkillCategory::Ident) => profile.stats.ident += amount,
            None => {}
        }
        self.save(&profile)?;
        log::debug!("+{} XP to {}, total {}", amount, category, profile.xp);
        Ok(profile)
    }

    /// Advances one grade, capped at 12. Returns whether anything changed.
    pub fn promote(&self) -> anyhow::Result<(bool, PlayerProfile)> {
        let mut profile = self.load()?;
        if profile.level >= MAX_GRADE {
            return Ok((false, profile));
        }
        profile.level += 1;
        self.save(&profile)?;
        Ok((true, profile))
    }

    pub fn challenge_config(&self) -> anyhow::Result<ChallengeConfig> {
        let profile = self.load()?;
        let idx = (profile.level - 1).clamp(0, GRADE_TITLES.len() as i64 - 1) as usize;
        Ok(ChallengeConfig {
            grade: profile.level,
            title: GRADE_TITLES[idx].to_string(),
            multiplier: 1.0 + (profile.level as f64) * 0.1,
            bpm: 60 + profile.level * 5,
        })
    }
}
