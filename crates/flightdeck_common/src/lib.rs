//! Shared vocabulary for the flightdeck release-health engine:
//! release-version ordering and the serde-facing data types.

pub mod types;
pub mod version;

pub use types::{
    CatalogEntry, CatalogSummary, DimensionKey, ExperimentData, MeasureData, MeasureStatus,
    MeasureSummary, SeriesData, VersionSummary,
};
pub use version::{cmp_version_strings, major_version, Version};
