use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU scheduling series (spec §6 SKU catalog table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SkuSeries {
    /// Burstable — low priority, yields under contention.
    B,
    /// General — balanced baseline.
    D,
    /// Memory-optimized — keep data in RAM, avoid OOM kill.
    E,
    /// Compute-optimized — high CPU priority, strict no-swap.
    F,
}

impl fmt::Display for SkuSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            SkuSeries::B => 'B',
            SkuSeries::D => 'D',
            SkuSeries::E => 'E',
            SkuSeries::F => 'F',
        };
        write!(f, "{c}")
    }
}

/// Scheduling hints derived from a SKU's series (spec §4.3 "SKU scheduling
/// hints").
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchedulingHints {
    pub cpu_shares: u32,
    /// `None` means "use the runtime default".
    pub swappiness: Option<u8>,
    /// `None` means "use the runtime default".
    pub oom_score_adj: Option<i16>,
}

impl SkuSeries {
    pub fn scheduling_hints(self) -> SchedulingHints {
        match self {
            SkuSeries::B => SchedulingHints { cpu_shares: 512, swappiness: None, oom_score_adj: None },
            SkuSeries::D => SchedulingHints { cpu_shares: 1024, swappiness: None, oom_score_adj: None },
            SkuSeries::E => SchedulingHints { cpu_shares: 1024, swappiness: Some(0), oom_score_adj: Some(-500) },
            SkuSeries::F => SchedulingHints { cpu_shares: 2048, swappiness: Some(0), oom_score_adj: None },
        }
    }
}

/// A named tier fixing memory, CPU, storage, and scheduling hints (spec
/// GLOSSARY `SKU`).
#[derive(Debug, Clone, Serialize)]
pub struct Sku {
    pub id: String,
    pub series: Option<SkuSeries>,
    pub memory_mb: i64,
    pub vcpu: f64,
    pub storage_gb: i64,
    pub is_custom: bool,
}

impl Sku {
    pub fn scheduling_hints(&self) -> SchedulingHints {
        self.series
            .map(SkuSeries::scheduling_hints)
            .unwrap_or(SchedulingHints { cpu_shares: 1024, swappiness: None, oom_score_adj: None })
    }
}
