use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::prelude::Modality;

/// Raw payload produced by a signal source.
#[derive(Debug, Clone)]
pub enum RawSample {
    Audio(AudioBuffer),
    Emi(EmiSweep),
    Network(NetworkSnapshot),
}

impl RawSample {
    pub fn modality(&self) -> Modality {
        match self {
            RawSample::Audio(_) => Modality::Acoustic,
            RawSample::Emi(_) => Modality::Emi,
            RawSample::Network(_) => Modality::Network,
        }
    }
}

/// Fixed-duration mono capture.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f32 / self.sample_rate as f32
        }
    }
}

/// Frequency-domain profile swept over compass directions.
///
/// `readings` is laid out as `directions x frequency bins`; row `i` was
/// captured at bearing `i * step_deg`.
#[derive(Debug, Clone)]
pub struct EmiSweep {
    pub range_khz: (f32, f32),
    pub step_deg: f32,
    pub readings: Array2<f32>,
}

impl EmiSweep {
    pub fn directions(&self) -> usize {
        self.readings.nrows()
    }

    pub fn bins(&self) -> usize {
        self.readings.ncols()
    }

    pub fn frequency_of_bin(&self, bin: usize) -> f32 {
        let (low, high) = self.range_khz;
        let bins = self.bins().max(1) as f32;
        low + (bin as f32 / bins) * (high - low)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceObservation {
    pub id: String,
    pub ip_address: String,
    pub mac_address: String,
    pub manufacturer: String,
    pub model: String,
    pub open_ports: Vec<u16>,
    pub bandwidth_kbps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionObservation {
    pub source: String,
    pub target: String,
    pub port: u16,
    pub protocol: Protocol,
    pub bandwidth_kbps: u32,
}

/// Local devices and the outbound connections seen from each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub network_name: String,
    pub devices: Vec<DeviceObservation>,
    pub connections: Vec<ConnectionObservation>,
}

impl NetworkSnapshot {
    pub fn connections_from<'a>(
        &'a self,
        device_id: &'a str,
    ) -> impl Iterator<Item = &'a ConnectionObservation> + 'a {
        self.connections
            .iter()
            .filter(move |connection| connection.source == device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emi_bins_map_linearly_onto_range() {
        let sweep = EmiSweep {
            range_khz: (0.0, 500.0),
            step_deg: 45.0,
            readings: Array2::zeros((8, 500)),
        };
        assert_eq!(sweep.directions(), 8);
        assert_eq!(sweep.frequency_of_bin(200), 200.0);
        assert_eq!(sweep.frequency_of_bin(0), 0.0);
    }

    #[test]
    fn audio_duration_handles_zero_rate() {
        let buffer = AudioBuffer {
            sample_rate: 0,
            samples: vec![0.0; 10],
        };
        assert_eq!(buffer.duration_secs(), 0.0);
    }
}
