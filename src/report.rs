//! Cache Reporting
//!
//! Aggregate statistics and estimated memory burden of every cache region,
//! checked against a global cap expressed as a percentage of a memory budget.

use serde::Serialize;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Formats a byte count as `"0"`, `"< 1kB"`, `"~N.NkB"` or `"~N.NMB"`.
pub fn human_readable_size(bytes: u64) -> String {
    if bytes == 0 {
        "0".to_string()
    } else if bytes < KIB {
        "< 1kB".to_string()
    } else if bytes < MIB {
        format!("~{:.1}kB", bytes as f64 / KIB as f64)
    } else {
        format!("~{:.1}MB", bytes as f64 / MIB as f64)
    }
}

// == Region Report ==
/// Statistics and estimated size of one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionReport {
    pub region: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub size_bytes: u64,
    pub size: String,
    /// Entries whose estimated size exceeds the high-burden threshold
    pub high_burden_entries: usize,
    pub high_burden_bytes: u64,
    pub high_burden_size: String,
}

// == Cap ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapStatus {
    /// No cap configured
    Unlimited,
    Ok,
    SoftCapExceeded,
    HardCapExceeded,
}

/// Global cap on the total estimated size of all regions.
///
/// The soft and hard thresholds are percentages of the cap itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapReport {
    pub cap_percentage: u8,
    pub soft_cap_percentage: u8,
    pub hard_cap_percentage: u8,
    pub cap_bytes: u64,
    pub soft_cap_bytes: u64,
    pub hard_cap_bytes: u64,
    pub status: CapStatus,
}

impl CapReport {
    /// # Arguments
    /// * `memory_budget` - Bytes the cap percentage refers to
    /// * `total_bytes` - Current estimated size of all regions
    pub fn evaluate(
        memory_budget: u64,
        cap_percentage: u8,
        soft_cap_percentage: u8,
        hard_cap_percentage: u8,
        total_bytes: u64,
    ) -> Self {
        let cap_bytes = percent_of(memory_budget, cap_percentage);
        let soft_cap_bytes = percent_of(cap_bytes, soft_cap_percentage);
        let hard_cap_bytes = percent_of(cap_bytes, hard_cap_percentage);

        let status = if cap_percentage == 0 {
            CapStatus::Unlimited
        } else if total_bytes >= hard_cap_bytes {
            CapStatus::HardCapExceeded
        } else if total_bytes >= soft_cap_bytes {
            CapStatus::SoftCapExceeded
        } else {
            CapStatus::Ok
        };

        Self {
            cap_percentage,
            soft_cap_percentage,
            hard_cap_percentage,
            cap_bytes,
            soft_cap_bytes,
            hard_cap_bytes,
            status,
        }
    }
}

fn percent_of(bytes: u64, percentage: u8) -> u64 {
    (bytes as u128 * percentage as u128 / 100) as u64
}

// == Cache Report ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub regions: Vec<RegionReport>,
    pub total_bytes: u64,
    pub total_size: String,
    pub cap: CapReport,
}

impl CacheReport {
    pub fn region(&self, name: &str) -> Option<&RegionReport> {
        self.regions.iter().find(|region| region.region == name)
    }
}
