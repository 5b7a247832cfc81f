use serde::{Deserialize, Serialize};

use crate::domain::ports::{SampleMethod, SampleRequest};

/// Decides between a full scan and a bounded sample for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingStrategy {
    /// Tables with at most this many rows are always scanned in full.
    pub full_scan_threshold: u64,
    /// Upper bound on the number of sampled rows.
    pub sample_size: usize,
    pub method: SampleMethod,
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self {
            full_scan_threshold: 100_000,
            sample_size: 10_000,
            method: SampleMethod::Random,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPlan {
    FullScan,
    Sample(SampleRequest),
}

impl SamplingStrategy {
    pub fn plan(&self, estimated_rows: u64) -> ScanPlan {
        if estimated_rows <= self.full_scan_threshold || self.sample_size as u64 >= estimated_rows {
            return ScanPlan::FullScan;
        }
        self.sample(estimated_rows)
    }

    /// Sampled plan regardless of the table size. A sample larger than the
    /// table degenerates to reading every row, still through the sample path.
    pub fn forced(&self, estimated_rows: u64) -> ScanPlan {
        self.sample(estimated_rows)
    }

    fn sample(&self, estimated_rows: u64) -> ScanPlan {
        let size = self.sample_size.max(1);
        ScanPlan::Sample(SampleRequest {
            size,
            method: self.method,
            stride: estimated_rows.div_ceil(size as u64).max(1),
        })
    }
}
