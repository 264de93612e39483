//! Reference signatures of common mining hardware.

use crate::interface::SignalPattern;
use crate::prelude::DeviceType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcousticSignature {
    pub device: &'static str,
    pub device_type: DeviceType,
    pub frequency_hz: (f32, f32),
    pub pattern: SignalPattern,
    pub decibels: (f32, f32),
}

pub const ACOUSTIC_SIGNATURES: &[AcousticSignature] = &[
    AcousticSignature {
        device: "Antminer S19",
        device_type: DeviceType::Asic,
        frequency_hz: (40.0, 60.0),
        pattern: SignalPattern::Continuous,
        decibels: (65.0, 75.0),
    },
    AcousticSignature {
        device: "Whatsminer M30S",
        device_type: DeviceType::Asic,
        frequency_hz: (45.0, 65.0),
        pattern: SignalPattern::Pulsating,
        decibels: (70.0, 80.0),
    },
    AcousticSignature {
        device: "Avalon A1246",
        device_type: DeviceType::Asic,
        frequency_hz: (50.0, 70.0),
        pattern: SignalPattern::Rhythmic,
        decibels: (60.0, 70.0),
    },
    AcousticSignature {
        device: "GPU Mining Rig",
        device_type: DeviceType::Gpu,
        frequency_hz: (30.0, 50.0),
        pattern: SignalPattern::Variable,
        decibels: (55.0, 65.0),
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmiProfile {
    pub device: &'static str,
    pub device_type: DeviceType,
    pub frequency_khz: (f32, f32),
    pub pattern: SignalPattern,
    pub strength: (f32, f32),
}

pub const EMI_PROFILES: &[EmiProfile] = &[
    EmiProfile {
        device: "Antminer S19",
        device_type: DeviceType::Asic,
        frequency_khz: (150.0, 250.0),
        pattern: SignalPattern::Pulsed,
        strength: (60.0, 85.0),
    },
    EmiProfile {
        device: "Whatsminer M30S",
        device_type: DeviceType::Asic,
        frequency_khz: (180.0, 280.0),
        pattern: SignalPattern::Continuous,
        strength: (75.0, 100.0),
    },
    EmiProfile {
        device: "Avalon A1246",
        device_type: DeviceType::Asic,
        frequency_khz: (120.0, 220.0),
        pattern: SignalPattern::Modulated,
        strength: (50.0, 70.0),
    },
    EmiProfile {
        device: "GPU Mining Rig",
        device_type: DeviceType::Gpu,
        frequency_khz: (80.0, 150.0),
        pattern: SignalPattern::Variable,
        strength: (40.0, 60.0),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningPool {
    pub name: &'static str,
    pub host_suffix: &'static str,
    pub ports: &'static [u16],
}

pub const MINING_POOLS: &[MiningPool] = &[
    MiningPool { name: "Antpool", host_suffix: "antpool.com", ports: &[3333, 8080, 8443] },
    MiningPool { name: "F2Pool", host_suffix: "f2pool.com", ports: &[3333, 8888, 25] },
    MiningPool { name: "Poolin", host_suffix: "poolin.com", ports: &[443, 5555, 1883] },
    MiningPool { name: "BTC.com", host_suffix: "btc.com", ports: &[1800, 1801, 8080] },
    MiningPool { name: "ViaBTC", host_suffix: "viabtc.com", ports: &[3333, 8888, 3256] },
    MiningPool { name: "Binance Pool", host_suffix: "binancepool.com", ports: &[8888, 3333, 443] },
    MiningPool { name: "SlushPool", host_suffix: "slushpool.com", ports: &[3333, 3353] },
    MiningPool { name: "Foundry USA", host_suffix: "foundryusapool.com", ports: &[4444, 3333] },
    MiningPool { name: "Ezil", host_suffix: "ezil.me", ports: &[5555, 5556] },
    MiningPool { name: "NiceHash", host_suffix: "nicehash.com", ports: &[3333, 3353] },
];

/// Ports pools share with ordinary traffic; never evidence on their own.
pub const COMMON_PORTS: &[u16] = &[25, 53, 80, 123, 443, 1883, 8080, 8443];

pub const ASIC_VENDORS: &[&str] = &["bitmain", "microbt", "canaan", "ebang", "innosilicon"];

/// Resolve a connection target (`host`, `host:port` or `scheme://host:port`) to a known pool.
pub fn match_pool(target: &str) -> Option<&'static MiningPool> {
    let lowered = target.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&lowered);
    let host = without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or(without_scheme);

    MINING_POOLS.iter().find(|pool| {
        host == pool.host_suffix
            || host
                .strip_suffix(pool.host_suffix)
                .is_some_and(|prefix| prefix.ends_with('.'))
            || host == pool.name.to_ascii_lowercase()
    })
}

/// Whether a port is pool-specific (stratum) rather than general-purpose.
pub fn is_stratum_port(port: u16) -> bool {
    !COMMON_PORTS.contains(&port) && MINING_POOLS.iter().any(|pool| pool.ports.contains(&port))
}

pub fn is_asic_vendor(manufacturer: &str) -> bool {
    let lowered = manufacturer.to_ascii_lowercase();
    ASIC_VENDORS.iter().any(|vendor| lowered.contains(vendor))
}

/// 1.0 inside `range`, decaying linearly to 0.0 at `falloff` outside it.
pub fn range_score(value: f32, range: (f32, f32), falloff: f32) -> f32 {
    let (low, high) = range;
    let distance = if value < low {
        low - value
    } else if value > high {
        value - high
    } else {
        0.0
    };
    if falloff <= 0.0 {
        return if distance == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - distance / falloff).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_matching_accepts_hosts_urls_and_names() {
        assert_eq!(match_pool("stratum.antpool.com").unwrap().name, "Antpool");
        assert_eq!(
            match_pool("stratum+tcp://btc.f2pool.com:3333").unwrap().name,
            "F2Pool"
        );
        assert_eq!(match_pool("NiceHash").unwrap().name, "NiceHash");
        assert_eq!(match_pool("btc.com:1800").unwrap().name, "BTC.com");
        assert!(match_pool("notantpool.com").is_none());
        assert!(match_pool("cdn.example.com").is_none());
    }

    #[test]
    fn stratum_ports_exclude_common_web_ports() {
        assert!(is_stratum_port(3333));
        assert!(is_stratum_port(4444));
        assert!(!is_stratum_port(443));
        assert!(!is_stratum_port(8080));
        assert!(!is_stratum_port(22));
    }

    #[test]
    fn range_score_decays_outside_range() {
        assert_eq!(range_score(50.0, (40.0, 60.0), 10.0), 1.0);
        assert_eq!(range_score(65.0, (40.0, 60.0), 10.0), 0.5);
        assert_eq!(range_score(80.0, (40.0, 60.0), 10.0), 0.0);
    }

    #[test]
    fn asic_vendor_lookup_is_case_insensitive() {
        assert!(is_asic_vendor("Bitmain Technologies"));
        assert!(!is_asic_vendor("Apple"));
    }
}
