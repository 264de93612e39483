use std::collections::BTreeMap;

use crate::interface::{Detection, HistoryStatus, MethodCounts, ScanHistory, Stats};
use crate::prelude::Modality;

impl Stats {
    /// Pure aggregation over the store's collections.
    pub fn aggregate(detections: &[Detection], history: &[ScanHistory]) -> Self {
        let total_detections = detections.len();
        let average_confidence = if total_detections == 0 {
            0
        } else {
            let sum: u64 = detections.iter().map(|d| u64::from(d.confidence)).sum();
            (sum as f64 / total_detections as f64).round() as u8
        };

        let mut detections_by_type = BTreeMap::new();
        for detection in detections {
            *detections_by_type.entry(detection.device_type).or_insert(0) += 1;
        }

        let mut scans_by_method = MethodCounts::default();
        for scan in history {
            match scan.methods.as_slice() {
                [] => {}
                [Modality::Acoustic] => scans_by_method.acoustic += 1,
                [Modality::Network] => scans_by_method.network += 1,
                [Modality::Emi] => scans_by_method.emi += 1,
                _ => scans_by_method.combined += 1,
            }
        }

        let total_scans = history.len();
        let (success_rate, average_scan_duration) = if total_scans == 0 {
            (0.0, 0.0)
        } else {
            let succeeded = history
                .iter()
                .filter(|scan| scan.status != HistoryStatus::Failed)
                .count();
            let duration: u64 = history.iter().map(|scan| scan.duration).sum();
            (
                succeeded as f64 * 100.0 / total_scans as f64,
                duration as f64 / total_scans as f64,
            )
        };

        Stats {
            total_scans,
            total_detections,
            average_confidence,
            // Dates are `%Y/%m/%d ...` strings, so lexical order is chronological.
            last_scan_date: history.iter().map(|scan| scan.date.clone()).max(),
            scans_by_method,
            detections_by_type,
            success_rate,
            average_scan_duration,
        }
    }
}
