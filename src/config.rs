//! Application-level configuration loading, including the achievement catalog
//! and event scheduling timings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dto::achievements::{
    AchievementCategory, AchievementDefinition, AchievementTier, RewardDescriptor,
};

/// Default location on disk where the service looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TOWN_PULSE_CONFIG_PATH";

const DEFAULT_EVENT_INTERVAL_SECS: u64 = 300;
const DEFAULT_EVENT_DURATION_SECS: u64 = 120;
const DEFAULT_COUNTDOWN_SECS: u64 = 30;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Static achievement catalog, loaded once and never mutated.
    pub catalog: Vec<AchievementDefinition>,
    /// Gap between one event starting and the next being due.
    pub event_interval: Duration,
    /// How long each event runs.
    pub event_duration: Duration,
    /// Pre-start countdown window.
    pub countdown: Duration,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        achievements = config.catalog.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            event_interval: Duration::from_secs(DEFAULT_EVENT_INTERVAL_SECS),
            event_duration: Duration::from_secs(DEFAULT_EVENT_DURATION_SECS),
            countdown: Duration::from_secs(DEFAULT_COUNTDOWN_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file.
struct RawConfig {
    achievements: Option<Vec<AchievementDefinition>>,
    event_interval_secs: Option<u64>,
    event_duration_secs: Option<u64>,
    countdown_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            catalog: raw.achievements.unwrap_or(defaults.catalog),
            event_interval: raw
                .event_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.event_interval),
            event_duration: raw
                .event_duration_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.event_duration),
            countdown: raw
                .countdown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.countdown),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn achievement(
    id: &str,
    category: AchievementCategory,
    tier: AchievementTier,
    requirement: u64,
    points: u32,
    reward: RewardDescriptor,
) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_owned(),
        category,
        tier,
        requirement,
        points,
        reward,
    }
}

/// Built-in catalog shipped with the binary.
fn default_catalog() -> Vec<AchievementDefinition> {
    use AchievementCategory::*;
    use AchievementTier::*;

    let coins = |amount| RewardDescriptor::Coins { amount };
    let skin = |id: &str| RewardDescriptor::Skin { id: id.to_owned() };
    let title = |id: &str| RewardDescriptor::Title { id: id.to_owned() };

    vec![
        achievement("collector_1", Collector, Bronze, 50, 10, coins(100)),
        achievement("collector_2", Collector, Silver, 500, 25, coins(500)),
        achievement("collector_3", Collector, Gold, 2_500, 50, skin("golden_backpack")),
        achievement("collector_4", Collector, Platinum, 10_000, 100, title("magnate")),
        achievement("explorer_1", Explorer, Bronze, 1_000, 10, coins(100)),
        achievement("explorer_2", Explorer, Silver, 10_000, 25, coins(500)),
        achievement("explorer_3", Explorer, Gold, 100_000, 50, skin("seven_league_boots")),
        achievement("explorer_4", Explorer, Platinum, 500_000, 100, title("wayfarer")),
        achievement("racer_1", Racer, Bronze, 1, 10, coins(150)),
        achievement("racer_2", Racer, Silver, 10, 25, coins(750)),
        achievement("racer_3", Racer, Gold, 50, 50, skin("checkered_helmet")),
        achievement("racer_4", Racer, Platinum, 200, 100, title("speed_demon")),
        achievement("performer_1", Performer, Bronze, 10, 10, coins(100)),
        achievement("performer_2", Performer, Silver, 100, 25, coins(500)),
        achievement("performer_3", Performer, Gold, 500, 50, title("showstopper")),
        achievement("social_1", Social, Bronze, 5, 10, coins(50)),
        achievement("social_2", Social, Silver, 25, 25, coins(250)),
        achievement("social_3", Social, Gold, 100, 50, title("town_fixture")),
        achievement("trader_1", Trader, Bronze, 1, 10, coins(50)),
        achievement("trader_2", Trader, Silver, 20, 25, coins(250)),
        achievement("trader_3", Trader, Gold, 100, 50, skin("merchant_cloak")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_ids_are_unique() {
        let catalog = default_catalog();
        let mut ids: Vec<_> = catalog.iter().map(|a| a.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn every_category_has_entries() {
        let catalog = default_catalog();
        for kind in [
            AchievementCategory::Collector,
            AchievementCategory::Explorer,
            AchievementCategory::Racer,
            AchievementCategory::Performer,
            AchievementCategory::Social,
            AchievementCategory::Trader,
        ] {
            assert!(catalog.iter().any(|a| a.category == kind));
        }
    }

    #[test]
    fn requirements_increase_with_tier_within_a_family() {
        let catalog = default_catalog();
        let collector: Vec<_> = catalog
            .iter()
            .filter(|a| a.category == AchievementCategory::Collector)
            .collect();
        for pair in collector.windows(2) {
            assert!(pair[0].requirement < pair[1].requirement);
        }
    }
}
