//! simulation tools for Skylink

pub mod scenarios;

use std::time::Duration;
use skylink_radio::AirConfig;

/// Channel both simulated stations tune to.
pub const DEFAULT_TRANSFER_CHANNEL: u8 = 42;

pub struct LinkPresets;

impl LinkPresets {
    pub fn bench() -> AirConfig {
        AirConfig {
            packet_loss: 0.0,
            corrupt_prob: 0.0,
            bandwidth_bps: 0,
            latency: Duration::ZERO,
            ..AirConfig::default()
        }
    }

    pub fn good_conditions() -> AirConfig {
        AirConfig {
            packet_loss: 0.02,
            corrupt_prob: 0.005,
            bandwidth_bps: 0,
            latency: Duration::ZERO,
            noise_floor_raw: 244,
            noise_jitter: 2.0,
        }
    }

    pub fn average_conditions() -> AirConfig {
        AirConfig {
            packet_loss: 0.10,
            corrupt_prob: 0.02,
            bandwidth_bps: 0,
            latency: Duration::ZERO,
            noise_floor_raw: 230,
            noise_jitter: 4.0,
        }
    }

    pub fn poor_conditions() -> AirConfig {
        AirConfig {
            packet_loss: 0.25,
            corrupt_prob: 0.05,
            bandwidth_bps: 0,
            latency: Duration::ZERO,
            noise_floor_raw: 200,
            noise_jitter: 8.0,
        }
    }
}
