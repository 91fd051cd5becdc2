//! BPM bucketing
//!
//! Records are split into tempo ranges no wider than `max_bpm_span` so
//! each bucket can be sequenced on its own. Undersized buckets are folded
//! into a neighbor.

use super::partition::PartitionConfig;
use crate::types::FeatureRecord;
use serde::{Deserialize, Serialize};

/// A tempo range and the records that fall in it
#[derive(Debug, Clone)]
pub struct BpmBucket {
    pub range: BpmRange,
    pub records: Vec<FeatureRecord>,
}

/// Inclusive BPM range covered by a bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmRange {
    pub min: f64,
    pub max: f64,
}

impl BpmRange {
    pub fn label(&self) -> String {
        format!("{:.0}-{:.0} BPM", self.min, self.max)
    }
}

impl BpmBucket {
    fn from_records(records: Vec<FeatureRecord>) -> Self {
        let min = records.iter().map(|r| r.bpm).fold(f64::INFINITY, f64::min);
        let max = records.iter().map(|r| r.bpm).fold(f64::NEG_INFINITY, f64::max);
        Self {
            range: BpmRange { min, max },
            records,
        }
    }

    fn absorb(&mut self, other: BpmBucket) {
        self.records.extend(other.records);
        self.records.sort_by(by_tempo);
        self.range.min = self.range.min.min(other.range.min);
        self.range.max = self.range.max.max(other.range.max);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn by_tempo(a: &FeatureRecord, b: &FeatureRecord) -> std::cmp::Ordering {
    a.bpm
        .total_cmp(&b.bpm)
        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
}

/// Group usable records into BPM buckets, slowest first
pub fn bucket_by_bpm(mut records: Vec<FeatureRecord>, config: &PartitionConfig) -> Vec<BpmBucket> {
    records.retain(FeatureRecord::is_usable);
    records.sort_by(by_tempo);

    let mut groups: Vec<Vec<FeatureRecord>> = Vec::new();
    for record in records {
        match groups.last_mut() {
            Some(group) if record.bpm - group[0].bpm <= config.max_bpm_span => group.push(record),
            _ => groups.push(vec![record]),
        }
    }

    let mut buckets: Vec<BpmBucket> = Vec::with_capacity(groups.len());
    let mut carry: Option<BpmBucket> = None;
    let count = groups.len();
    for (index, group) in groups.into_iter().enumerate() {
        let mut bucket = BpmBucket::from_records(group);
        if let Some(pending) = carry.take() {
            bucket.absorb(pending);
        }
        if bucket.len() >= config.min_bucket_size {
            buckets.push(bucket);
            continue;
        }

        let bridges_back = buckets
            .last()
            .is_some_and(|prev| bucket.range.min - prev.range.max <= config.bucket_merge_gap);
        match buckets.last_mut() {
            Some(prev) if bridges_back => prev.absorb(bucket),
            _ if index + 1 < count => carry = Some(bucket),
            Some(prev) => prev.absorb(bucket),
            None => buckets.push(bucket),
        }
    }
    buckets
}
