use std::fs;
use std::path::Path;

use anyhow::Context;
use minercore::interface::{Detection, HistoryStatus, Location, ScanHistory};
use minercore::prelude::{DetectionMethod, DeviceType};
use minercore::store::MemoryBackend;
use serde::{Deserialize, Serialize};

/// On-disk seed collections, as the detection service would return them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub history: Vec<ScanHistory>,
}

impl SeedData {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading seed data {}", path_ref.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing seed data {}", path_ref.display()))
    }

    pub fn into_backend(self) -> MemoryBackend {
        MemoryBackend::new(self.detections, self.history)
    }

    /// Field records from the Ilam survey.
    pub fn sample() -> Self {
        let detection = |id, timestamp: &str, lat, lng, address: &str, confidence, device_type, method, info: &str| Detection {
            id,
            timestamp: timestamp.to_string(),
            location: Location {
                lat,
                lng,
                address: address.to_string(),
            },
            confidence,
            device_type,
            detection_method: method,
            device_info: info.to_string(),
            audio_profile: None,
            network_activity: None,
            emi_signature: None,
            scan_id: None,
        };
        let scan = |id, date: &str, location: &str, detected_miners, minutes: u64, operator: &str| ScanHistory {
            id,
            scan_id: None,
            date: date.to_string(),
            location: location.to_string(),
            coordinates: None,
            radius_m: None,
            detected_miners,
            duration: minutes * 60,
            operator: operator.to_string(),
            methods: Vec::new(),
            status: HistoryStatus::Completed,
        };

        Self {
            detections: vec![
                detection(1, "2025/05/14 14:30:15", 33.6380, 46.4153, "Ilam, Taleghani St., Alley 5", 87, DeviceType::Asic, DetectionMethod::Acoustic, "Bitmain Antminer S19"),
                detection(2, "2025/05/13 18:15:39", 33.6299, 46.4215, "Ilam, Imam Sq., Central Arcade, 3rd floor", 65, DeviceType::Gpu, DetectionMethod::Network, "GPU Mining Rig"),
                detection(3, "2025/05/14 10:05:52", 33.6440, 46.4253, "Ilam, Azadi Blvd., Noor Commercial Complex", 92, DeviceType::Asic, DetectionMethod::Emi, "Whatsminer M30S"),
                detection(4, "2025/05/10 09:17:45", 33.6375, 46.4180, "Ilam, Ferdowsi St., Shahid Rezaei Alley", 78, DeviceType::Asic, DetectionMethod::Combined, "MicroBT Whatsminer M32"),
                detection(5, "2025/05/08 22:40:12", 33.6320, 46.4190, "Ilam, Industrial Park, Block 12", 95, DeviceType::Asic, DetectionMethod::Acoustic, "Multiple ASICs"),
            ],
            history: vec![
                scan(1, "2025/05/14", "Ilam, city centre", 3, 45, "Amiri, Mohammad"),
                scan(2, "2025/05/10", "Ilam, industrial zone", 5, 65, "Sadeghi, Ali"),
                scan(3, "2025/05/08", "Ilam, southern township", 1, 30, "Amiri, Mohammad"),
                scan(4, "2025/05/05", "Ilam, northern district", 0, 25, "Moradi, Hossein"),
                scan(5, "2025/05/02", "Ilam, commercial centre", 2, 40, "Sadeghi, Ali"),
                scan(6, "2025/04/30", "Ilam, Golestan district", 1, 35, "Amiri, Mohammad"),
                scan(7, "2025/04/25", "Ilam, Banbarz district", 3, 50, "Moradi, Hossein"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minercore::store::DetectionStore;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn sample_seed_populates_store() {
        let store = DetectionStore::new(Arc::new(SeedData::sample().into_backend()));
        let stats = store.refresh().await.unwrap();
        assert_eq!(stats.total_detections, 5);
        assert_eq!(stats.total_scans, 7);
        assert_eq!(stats.average_confidence, 83);
        assert_eq!(stats.last_scan_date.as_deref(), Some("2025/05/14"));
    }

    #[test]
    fn seed_file_round_trips_through_disk() {
        let mut temp = NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&SeedData::sample()).unwrap();
        temp.write_all(json.as_bytes()).unwrap();
        let path = temp.into_temp_path();
        let seed = SeedData::load(&path).unwrap();
        assert_eq!(seed.detections.len(), 5);
        assert_eq!(seed.history[1].duration, 65 * 60);
    }

    #[test]
    fn malformed_seed_file_reports_its_path() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"{not json").unwrap();
        let path = temp.into_temp_path();
        let err = SeedData::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing seed data"));
    }
}
