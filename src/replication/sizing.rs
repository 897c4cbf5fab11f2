//! Quote Size Schedule
//!
//! Quote size is a step function of seconds-to-end, one schedule per market
//! series. Schedules are plain data (breakpoints and sizes) so they can be
//! recalibrated from configuration without touching code.

use crate::replication::config::ConfigError;
use crate::replication::events::{MarketSeries, Size};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One step: applies while `seconds_to_end < below_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeStep {
    pub below_secs: i64,
    pub size: Size,
}

/// Step function for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeSchedule {
    /// Size once seconds-to-end is past the last breakpoint.
    pub tail_size: Size,
    /// Ascending by `below_secs`.
    pub steps: Vec<SizeStep>,
}

impl SizeSchedule {
    fn from_pairs(pairs: &[(i64, Size)], tail_size: Size) -> Self {
        Self {
            tail_size,
            steps: pairs
                .iter()
                .map(|&(below_secs, size)| SizeStep { below_secs, size })
                .collect(),
        }
    }

    /// Size for a given seconds-to-end.
    pub fn size_at(&self, seconds_to_end: i64) -> Size {
        // steps are ascending: first breakpoint above s wins
        let idx = self.steps.partition_point(|step| step.below_secs <= seconds_to_end);
        self.steps.get(idx).map_or(self.tail_size, |step| step.size)
    }

    fn validate(&self, series: &str) -> Result<(), ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedSizeTable {
            series: series.to_string(),
            reason,
        };

        let mut prev: Option<SizeStep> = None;
        for step in &self.steps {
            if !step.size.is_finite() || step.size <= 0.0 {
                return Err(malformed(format!("size {} must be positive", step.size)));
            }
            if let Some(p) = prev {
                if step.below_secs <= p.below_secs {
                    return Err(malformed(format!(
                        "breakpoints must be strictly increasing ({} after {})",
                        step.below_secs, p.below_secs
                    )));
                }
                if step.size < p.size {
                    return Err(malformed(format!(
                        "sizes must be non-decreasing with time to end ({} after {})",
                        step.size, p.size
                    )));
                }
            }
            prev = Some(*step);
        }
        if !self.tail_size.is_finite() || self.tail_size <= 0.0 {
            return Err(malformed(format!("tail size {} must be positive", self.tail_size)));
        }
        if let Some(last) = prev {
            if self.tail_size < last.size {
                return Err(malformed(format!(
                    "tail size {} below last step size {}",
                    self.tail_size, last.size
                )));
            }
        }
        Ok(())
    }
}

/// Per-series schedules plus a fallback size for unlisted series.
///
/// Schedules given in configuration are overlaid on the calibrated ones: a
/// listed series replaces its calibrated schedule, unlisted series keep theirs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeTable {
    pub default_size: Size,
    /// Keyed by series label (`btc-15m`, `eth-1h`, ...).
    #[serde(deserialize_with = "overlay_calibrated")]
    pub series: BTreeMap<String, SizeSchedule>,
}

fn overlay_calibrated<'de, D>(deserializer: D) -> Result<BTreeMap<String, SizeSchedule>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, SizeSchedule>::deserialize(deserializer)?;
    let mut series = calibrated_schedules();
    series.extend(overrides);
    Ok(series)
}

impl Default for SizeTable {
    fn default() -> Self {
        Self {
            default_size: 15.0,
            series: calibrated_schedules(),
        }
    }
}

/// Median replica sizes per (series, time-to-end bucket) from the latest
/// calibration snapshot.
fn calibrated_schedules() -> BTreeMap<String, SizeSchedule> {
    let mut series = BTreeMap::new();
    series.insert(
        MarketSeries::Btc15m.label().to_string(),
        SizeSchedule::from_pairs(&[(60, 11.0), (180, 13.0), (300, 17.0), (600, 19.0)], 20.0),
    );
    series.insert(
        MarketSeries::Eth15m.label().to_string(),
        SizeSchedule::from_pairs(&[(60, 8.0), (180, 10.0), (300, 12.0), (600, 13.0)], 14.0),
    );
    series.insert(
        MarketSeries::Btc1h.label().to_string(),
        SizeSchedule::from_pairs(
            &[
                (60, 9.0),
                (180, 10.0),
                (300, 11.0),
                (600, 12.0),
                (900, 14.0),
                (1200, 15.0),
                (1800, 17.0),
            ],
            18.0,
        ),
    );
    series.insert(
        MarketSeries::Eth1h.label().to_string(),
        SizeSchedule::from_pairs(
            &[
                (60, 7.0),
                (300, 8.0),
                (600, 9.0),
                (900, 11.0),
                (1200, 12.0),
                (1800, 13.0),
            ],
            14.0,
        ),
    );
    series
}

impl SizeTable {
    /// Quote size for a series at a given seconds-to-end.
    pub fn size_for(&self, series: MarketSeries, seconds_to_end: i64) -> Size {
        self.series
            .get(series.label())
            .map_or(self.default_size, |schedule| schedule.size_at(seconds_to_end))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_size.is_finite() || self.default_size <= 0.0 {
            return Err(ConfigError::MalformedSizeTable {
                series: "default".to_string(),
                reason: format!("default size {} must be positive", self.default_size),
            });
        }
        for (label, schedule) in &self.series {
            schedule.validate(label)?;
        }
        Ok(())
    }
}
