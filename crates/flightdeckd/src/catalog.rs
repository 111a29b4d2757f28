//! Dimension catalog: applications, platforms, channels and measures.
//!
//! Near-static reference data. The built-in defaults describe the
//! desktop product (three platforms, four channels, the crash and
//! quality measures); deployments can replace the whole catalog from
//! the config file.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A product whose telemetry we track, e.g. "firefox".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDef {
    pub name: String,
    /// Name the raw sample source knows this application by
    pub telemetry_name: String,
}

/// An operating system platform, e.g. "windows".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDef {
    pub name: String,
    /// Name the raw sample source knows this platform by
    pub telemetry_name: String,
}

/// A release channel with its observation cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDef {
    pub name: String,

    /// How often/long new builds roll out on this channel, in days.
    /// Ingestion looks back twice this far for candidate builds.
    pub update_interval_days: i64,

    /// Client-count threshold below which a sample is statistically
    /// unreliable (surfaced to consumers, not enforced by the engine)
    pub min_expected_client_count: u32,

    /// Channel ships a continuous stream of releases (every sub-version
    /// is effectively a major version); suppresses per-sub-version
    /// summary records
    #[serde(default)]
    pub continuous_releases: bool,

    /// Override for how many major versions back summaries reach;
    /// falls back to the configured default when absent
    #[serde(default)]
    pub version_lookback: Option<u32>,
}

impl ChannelDef {
    pub fn update_interval(&self) -> Duration {
        Duration::days(self.update_interval_days)
    }
}

/// A measure (e.g. "main_crashes") applicable to an application,
/// platform and set of channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureDef {
    pub name: String,
    pub application: String,
    /// None = not platform-specific (experiment measures)
    pub platform: Option<String>,
    /// Earliest major version the measure exists in
    #[serde(default)]
    pub min_version: Option<u32>,
    /// Channels the measure is collected on; empty = all channels
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// The full dimension catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub applications: Vec<ApplicationDef>,
    pub platforms: Vec<PlatformDef>,
    pub channels: Vec<ChannelDef>,
    pub measures: Vec<MeasureDef>,
}

const CRASH_MEASURES: &[&str] = &[
    "content_crashes",
    "gmplugin_crashes",
    "main_crashes",
    "plugin_crashes",
    "content_shutdown_crashes",
];

const UNIVERSAL_QUALITY_MEASURES: &[&str] = &["browser_shim_usage_blocked"];

const PRERELEASE_QUALITY_MEASURES: &[&str] = &[
    "slow_script_notice_count",
    "slow_script_page_count",
    "permissions_sql_corrupted",
    "defective_permissions_sql_removed",
];

impl Default for Catalog {
    fn default() -> Self {
        let platforms = vec![
            PlatformDef {
                name: "linux".to_string(),
                telemetry_name: "Linux".to_string(),
            },
            PlatformDef {
                name: "windows".to_string(),
                telemetry_name: "Windows_NT".to_string(),
            },
            PlatformDef {
                name: "mac".to_string(),
                telemetry_name: "Darwin".to_string(),
            },
        ];

        let mut measures = Vec::new();
        for platform in &platforms {
            // crash measures and the universal quality measures exist on
            // every platform and channel
            for name in CRASH_MEASURES.iter().chain(UNIVERSAL_QUALITY_MEASURES) {
                measures.push(MeasureDef {
                    name: name.to_string(),
                    application: "firefox".to_string(),
                    platform: Some(platform.name.clone()),
                    min_version: None,
                    channels: Vec::new(),
                    enabled: true,
                });
            }
            // most quality measures are collected on the development
            // channels only
            for name in PRERELEASE_QUALITY_MEASURES {
                measures.push(MeasureDef {
                    name: name.to_string(),
                    application: "firefox".to_string(),
                    platform: Some(platform.name.clone()),
                    min_version: None,
                    channels: vec!["nightly".to_string(), "beta".to_string()],
                    enabled: true,
                });
            }
        }
        // gpu process crashes are windows-only and arrived in 53
        measures.push(MeasureDef {
            name: "gpu_crashes".to_string(),
            application: "firefox".to_string(),
            platform: Some("windows".to_string()),
            min_version: Some(53),
            channels: Vec::new(),
            enabled: true,
        });
        // non-platform-specific crash measures, used by experiment data
        for name in CRASH_MEASURES {
            measures.push(MeasureDef {
                name: name.to_string(),
                application: "firefox".to_string(),
                platform: None,
                min_version: None,
                channels: Vec::new(),
                enabled: true,
            });
        }

        Catalog {
            applications: vec![ApplicationDef {
                name: "firefox".to_string(),
                telemetry_name: "Firefox".to_string(),
            }],
            platforms,
            channels: vec![
                ChannelDef {
                    name: "release".to_string(),
                    update_interval_days: 56,
                    min_expected_client_count: 1000,
                    continuous_releases: false,
                    version_lookback: None,
                },
                ChannelDef {
                    name: "beta".to_string(),
                    update_interval_days: 14,
                    min_expected_client_count: 100,
                    continuous_releases: false,
                    version_lookback: None,
                },
                ChannelDef {
                    name: "esr".to_string(),
                    update_interval_days: 56,
                    min_expected_client_count: 100,
                    continuous_releases: false,
                    version_lookback: Some(7),
                },
                ChannelDef {
                    name: "nightly".to_string(),
                    update_interval_days: 3,
                    min_expected_client_count: 10,
                    continuous_releases: true,
                    version_lookback: None,
                },
            ],
            measures,
        }
    }
}

impl Catalog {
    pub fn application(&self, name: &str) -> Option<&ApplicationDef> {
        self.applications.iter().find(|a| a.name == name)
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformDef> {
        self.platforms.iter().find(|p| p.name == name)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelDef> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Enabled measures collected for a dimension combination.
    pub fn measures_for(&self, application: &str, platform: &str, channel: &str) -> Vec<&MeasureDef> {
        self.measures
            .iter()
            .filter(|m| {
                m.enabled
                    && m.application == application
                    && m.platform.as_deref() == Some(platform)
                    && (m.channels.is_empty() || m.channels.iter().any(|c| c == channel))
            })
            .collect()
    }

    /// Enabled measures with no platform restriction (experiment data).
    pub fn experiment_measures(&self) -> Vec<&MeasureDef> {
        self.measures
            .iter()
            .filter(|m| m.enabled && m.platform.is_none())
            .collect()
    }

    /// Look up one measure within a dimension combination.
    pub fn measure(&self, application: &str, platform: &str, channel: &str, name: &str) -> Option<&MeasureDef> {
        self.measures_for(application, platform, channel)
            .into_iter()
            .find(|m| m.name == name)
    }

    /// Every (application, platform, channel) combination that has at
    /// least one configured measure.
    pub fn dimension_combinations(&self) -> Vec<(&ApplicationDef, &PlatformDef, &ChannelDef)> {
        let mut combos = Vec::new();
        for application in &self.applications {
            for platform in &self.platforms {
                for channel in &self.channels {
                    if !self
                        .measures_for(&application.name, &platform.name, &channel.name)
                        .is_empty()
                    {
                        combos.push((application, platform, channel));
                    }
                }
            }
        }
        combos
    }

    /// Major-version lookback for a channel, given the configured
    /// default.
    pub fn version_lookback(&self, channel: &str, default: u32) -> u32 {
        self.channel(channel)
            .and_then(|c| c.version_lookback)
            .unwrap_or(default)
    }
}
