use std::{fmt, ops::RangeInclusive, str::FromStr};

use faults::{DelayWindow, LatencyPolicy, ModularBand, ProbabilisticDelay};

/// Size and delay tables for the pressure scenarios. Both profiles drive the
/// same primitives; only the numbers differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PressureProfile {
    #[default]
    Standard,
    Intensive,
}

impl PressureProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Intensive => "intensive",
        }
    }

    /// Export size for a task export of `records` rows, before clamping.
    pub fn task_export_mb(self, records: i64) -> i64 {
        let records_per_mb = match self {
            Self::Standard => 1000,
            Self::Intensive => 250,
        };
        (records / records_per_mb).max(1)
    }

    pub fn report_export_mb(self, range: DateRange) -> u32 {
        let base = match range {
            DateRange::LastWeek => 5,
            DateRange::LastMonth => 15,
            DateRange::LastQuarter => 30,
            DateRange::LastYear => 50,
        };
        self.scale(base)
    }

    pub fn report_mb(self, kind: ReportKind) -> u32 {
        let base = match kind {
            ReportKind::Summary => 5,
            ReportKind::Detailed => 10,
            ReportKind::Full => 20,
        };
        self.scale(base)
    }

    pub fn batch_item_mb(self) -> RangeInclusive<u32> {
        match self {
            Self::Standard => 10..=19,
            Self::Intensive => 20..=39,
        }
    }

    pub fn batch_item_delay(self) -> Option<ProbabilisticDelay> {
        match self {
            Self::Standard => None,
            Self::Intensive => Some(ProbabilisticDelay {
                chance_percent: 25,
                window: DelayWindow::new(100, 500),
            }),
        }
    }

    /// `(sizeMB, iterations)` used when the stress caller omits them.
    pub fn stress_defaults(self) -> (i64, i64) {
        match self {
            Self::Standard => (10, 5),
            Self::Intensive => (20, 10),
        }
    }

    pub fn search_latency(self) -> LatencyPolicy {
        let (rare, frequent, chance_percent, window) = match self {
            Self::Standard => (
                DelayWindow::new(5_000, 15_000),
                DelayWindow::new(1_000, 3_000),
                5,
                DelayWindow::new(300, 1_000),
            ),
            Self::Intensive => (
                DelayWindow::new(10_000, 30_000),
                DelayWindow::new(2_000, 5_000),
                15,
                DelayWindow::new(500, 2_000),
            ),
        };
        LatencyPolicy {
            bands: vec![
                ModularBand {
                    name: "every-13th",
                    every: 13,
                    window: rare,
                },
                ModularBand {
                    name: "every-7th",
                    every: 7,
                    window: frequent,
                },
            ],
            probabilistic: Some(ProbabilisticDelay {
                chance_percent,
                window,
            }),
        }
    }

    fn scale(self, base: u32) -> u32 {
        match self {
            Self::Standard => base,
            Self::Intensive => base * 2,
        }
    }
}

impl fmt::Display for PressureProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PressureProfile {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "intensive" => Ok(Self::Intensive),
            other => Err(format!("unknown pressure profile '{other}'")),
        }
    }
}

/// Per-scenario ceilings. Requests above a ceiling are clamped to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureLimits {
    pub max_export_mb: u32,
    pub max_batch_item_mb: u32,
    pub max_batch_types: usize,
    pub max_stress_mb: u32,
    pub max_stress_iterations: u32,
    pub max_report_mb: u32,
}

impl Default for PressureLimits {
    fn default() -> Self {
        Self {
            max_export_mb: 512,
            max_batch_item_mb: 64,
            max_batch_types: 16,
            max_stress_mb: 512,
            max_stress_iterations: 100,
            max_report_mb: 128,
        }
    }
}

/// Clamps a requested size into `1..=ceiling`. The flag is set when the
/// request had to be changed.
pub fn clamp_mb(requested: i64, ceiling: u32) -> (u32, bool) {
    let ceiling = ceiling.max(1);
    if requested < 1 {
        return (1, true);
    }
    if requested > i64::from(ceiling) {
        return (ceiling, true);
    }
    (requested as u32, false)
}

pub fn clamp_count(requested: i64, ceiling: u32) -> (u32, bool) {
    if requested < 0 {
        return (0, true);
    }
    if requested > i64::from(ceiling) {
        return (ceiling, true);
    }
    (requested as u32, false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Summary,
    Detailed,
    Full,
}

impl ReportKind {
    /// Unknown names fall back to `summary`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "detailed" => Self::Detailed,
            "full" => Self::Full,
            _ => Self::Summary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    LastWeek,
    LastMonth,
    LastQuarter,
    LastYear,
}

impl DateRange {
    /// Unknown ranges fall back to the smallest bucket.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "last_month" => Self::LastMonth,
            "last_quarter" => Self::LastQuarter,
            "last_year" => Self::LastYear,
            _ => Self::LastWeek,
        }
    }
}
