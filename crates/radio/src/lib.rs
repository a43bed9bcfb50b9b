//! half-duplex radio link layer for Skylink

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use skylink_core::framing::FrameError;

pub mod channel;
pub mod simulated;
pub mod transport;

pub use channel::{LinkChannel, NoiseReport};
pub use simulated::{AirConfig, SimulatedAir, SimulatedRadio};
pub use transport::{PortMode, RadioHardware, RadioSettings};

/// Channels the radio can be tuned to.
pub const CHANNEL_COUNT: u8 = 84;

/// Representative channels sampled by the ambient noise scan; scanning
/// all 84 would take minutes of config-mode switches.
pub const CHECKED_CHANNELS: [u8; 4] = [16, 32, 48, 64];

/// The monitor address can receive but not transmit; every other address
/// can transmit but not receive.
pub const MONITOR_ADDRESS: u16 = 0xffff;

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("transport i/o failure: {0}")]
    Transport(String),

    #[error("radio rejected the register write")]
    ConfigRejected,

    #[error("timed out waiting for the radio to respond")]
    ResponseTimeout,

    #[error("channel {0} is outside the channel table")]
    InvalidChannel(u8),

    #[error("link is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Bit rate of the serial port while the radio is in config mode.
    pub config_baud: u32,
    /// Bit rate of the serial port while the radio is in data mode.
    pub data_baud: u32,
    /// Settle time after toggling the mode line, before reopening.
    pub mode_settle: Duration,
    /// RSSI samples taken per channel during a noise scan.
    pub scan_retries: u32,
    /// Bytes of inbound stream retained while hunting for a valid frame.
    pub recv_buffer_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            config_baud: 9600,
            data_baud: 9600,
            mode_settle: Duration::from_millis(100),
            scan_retries: 10,
            recv_buffer_bytes: 980,
        }
    }
}
