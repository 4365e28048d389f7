use serde::Serialize;

/// Classification counters for one splitting run.
///
/// Workers accumulate into their own instance and the results are combined
/// with [`SplitStats::merge`], which is associative and commutative, so the
/// batch pipeline can fold them in any order. Serialized key names match the
/// historical stat files consumed by downstream tooling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitStats {
    /// Reads where orientation detection failed; no segments produced.
    #[serde(rename = "Split_failed")]
    pub split_failed: u64,
    /// Segments without an intact 5′ signature.
    #[serde(rename = "5end_deg")]
    pub five_end_degraded: u64,
    /// Segments without a detectable 3′ adapter barcode.
    #[serde(rename = "No_BC")]
    pub no_barcode: u64,
    /// Barcoded segments without a detectable UMI pattern.
    #[serde(rename = "No_UMI")]
    pub no_umi: u64,
    /// Fully classified segments.
    #[serde(rename = "BC_assigned")]
    pub assigned: u64,
    /// Reads rejected by reverse complement on an unexpected symbol.
    #[serde(rename = "Invalid_base")]
    pub invalid_base: u64,
    /// Reads routed away by the minimum-pass filter.
    #[serde(rename = "Low_pass")]
    pub low_pass: u64,
}

impl SplitStats {
    pub fn merge(&mut self, other: &SplitStats) {
        self.split_failed += other.split_failed;
        self.five_end_degraded += other.five_end_degraded;
        self.no_barcode += other.no_barcode;
        self.no_umi += other.no_umi;
        self.assigned += other.assigned;
        self.invalid_base += other.invalid_base;
        self.low_pass += other.low_pass;
    }

    /// Total segments that reached classification. Equals the number of
    /// segments the boundary locator produced across all oriented reads.
    pub fn total_segments(&self) -> u64 {
        self.five_end_degraded + self.no_barcode + self.no_umi + self.assigned
    }
}

/// Case counters for one recall run. The recall pass is sequential, so these
/// are only ever filled by a single state machine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecallStats {
    /// An open queue hit a fresh boundary record and was flushed to discard.
    #[serde(rename = "Case 1")]
    pub open_queue_flushes: u64,
    /// A continuation record arrived with no queue to continue.
    #[serde(rename = "Case 2")]
    pub orphan_continuations: u64,
    /// Rows without usable columns, routed to the malformed stream.
    #[serde(rename = "Case 3")]
    pub malformed_rows: u64,
    /// A continuation broke parent/index contiguity; record and queue
    /// discarded together.
    #[serde(rename = "Case 4")]
    pub discontinuity_flushes: u64,
    /// Resolved queues with combined trimmed length over 200 bases.
    #[serde(rename = "Case 5")]
    pub candidates: u64,
    /// Resolved queues at or under 200 bases.
    #[serde(rename = "Case 6")]
    pub candidates_too_short: u64,
    /// Continuations appended to the queue unresolved.
    #[serde(rename = "Case 7")]
    pub queued_continuations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_fieldwise_and_commutes() {
        let a = SplitStats {
            split_failed: 1,
            five_end_degraded: 2,
            no_barcode: 3,
            no_umi: 4,
            assigned: 5,
            invalid_base: 6,
            low_pass: 7,
        };
        let b = SplitStats {
            assigned: 10,
            ..SplitStats::default()
        };
        let mut ab = a;
        ab.merge(&b);
        let mut ba = b;
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.assigned, 15);
        assert_eq!(ab.total_segments(), 2 + 3 + 4 + 15);
    }

    #[test]
    fn test_serialized_key_names_are_stable() {
        let json = serde_json::to_value(SplitStats::default()).unwrap();
        for key in [
            "Split_failed",
            "5end_deg",
            "No_BC",
            "No_UMI",
            "BC_assigned",
            "Invalid_base",
            "Low_pass",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }

        let json = serde_json::to_value(RecallStats::default()).unwrap();
        for n in 1..=7 {
            assert!(json.get(format!("Case {n}")).is_some());
        }
    }
}
