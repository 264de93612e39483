//! Seeded random-data signal sources standing in for field hardware.

pub mod acoustic;
pub mod emi;
pub mod network;
pub mod profile;
pub mod template;

use std::sync::Arc;

use minercore::prelude::SignalSource;

pub use acoustic::SyntheticMicrophone;
pub use emi::SyntheticEmiProbe;
pub use network::SyntheticNetworkScanner;
pub use profile::GeneratorConfig;

/// One synthetic source per modality.
pub fn synthetic_sources(config: &GeneratorConfig) -> Vec<Arc<dyn SignalSource>> {
    vec![
        Arc::new(SyntheticMicrophone::new(config.clone())),
        Arc::new(SyntheticNetworkScanner::new(config.clone())),
        Arc::new(SyntheticEmiProbe::new(config.clone())),
    ]
}
