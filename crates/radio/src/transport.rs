//! physical layer collaborator interface
//!
//! The serial device, the GPIO mode lines and the radio's configuration
//! registers live behind [`RadioHardware`]; the link layer only sequences
//! them.

use async_trait::async_trait;

use crate::RadioError;

/// The two half-duplex personalities of the radio HAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    /// Register access at the config bit rate.
    Config,
    /// Payload traffic at the data bit rate.
    Data,
}

/// Register state pushed to the radio while in config mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSettings {
    pub channel: u8,
    pub address: u16,
    pub listen_before_talk: bool,
    /// Enables the ambient RSSI register for noise scans.
    pub ambient_rssi: bool,
}

/// Black-box physical layer: serial device plus radio registers.
///
/// Implementations must not sequence mode switches themselves; the owning
/// [`LinkChannel`](crate::LinkChannel) drives close → mode line → settle →
/// reopen explicitly, since every switch costs hundreds of milliseconds.
#[async_trait]
pub trait RadioHardware: Send {
    async fn open(&mut self, baud: u32) -> Result<(), RadioError>;

    async fn close(&mut self);

    async fn set_mode_line(&mut self, mode: PortMode) -> Result<(), RadioError>;

    /// Writes the settings registers; valid only in [`PortMode::Config`].
    async fn apply_settings(&mut self, settings: &RadioSettings) -> Result<(), RadioError>;

    /// Reads the ambient RSSI register. Raw units are -dBm·2, so a larger
    /// value means a quieter channel.
    async fn sample_rssi(&mut self) -> Result<u8, RadioError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), RadioError>;

    /// Appends whatever the device has buffered to `out` without blocking;
    /// returns the number of bytes appended.
    async fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, RadioError>;

    /// Bytes queued behind the serial port's transmit buffer.
    fn queued_write_bytes(&self) -> usize {
        0
    }
}
