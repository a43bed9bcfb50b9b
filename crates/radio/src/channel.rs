//! link channel policy over the physical radio
//!
//! Owns the framed send/receive path plus the slow parts of the HAT:
//! config-mode switching, channel/address caching and the ambient noise
//! scan.

use log::{debug, info};
use tokio::time::sleep;

use skylink_core::framing::{self, Deframer};

use crate::transport::{PortMode, RadioHardware, RadioSettings};
use crate::{LinkConfig, RadioError, CHANNEL_COUNT, CHECKED_CHANNELS, MONITOR_ADDRESS};

/// Maximum ambient noise observed per checked channel.
#[derive(Debug, Clone, Default)]
pub struct NoiseReport {
    readings: Vec<(u8, u8)>,
}

impl NoiseReport {
    /// Raw register value for `channel`; units are -dBm·2, so a larger
    /// value means a quieter channel.
    pub fn raw(&self, channel: u8) -> Option<u8> {
        self.readings
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, raw)| *raw)
    }

    /// Noise power in dBm for `channel`.
    pub fn dbm(&self, channel: u8) -> Option<f32> {
        self.raw(channel).map(|raw| -(raw as f32) / 2.0)
    }

    /// Channel with the lowest observed noise power.
    pub fn quietest_channel(&self) -> Option<u8> {
        self.readings
            .iter()
            .max_by_key(|(_, raw)| *raw)
            .map(|(ch, _)| *ch)
    }

    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.readings.iter().map(|(ch, _)| *ch)
    }
}

/// One node's view of the shared radio channel.
pub struct LinkChannel<H: RadioHardware> {
    hw: H,
    cfg: LinkConfig,
    settings: Option<RadioSettings>,
    transmit_address: u16,
    deframer: Deframer,
    read_buf: Vec<u8>,
    noise: NoiseReport,
}

impl<H: RadioHardware> LinkChannel<H> {
    pub fn new(hw: H, cfg: LinkConfig) -> Self {
        let deframer = Deframer::with_capacity(cfg.recv_buffer_bytes);
        Self {
            hw,
            cfg,
            settings: None,
            transmit_address: MONITOR_ADDRESS,
            deframer,
            read_buf: Vec::new(),
            noise: NoiseReport::default(),
        }
    }

    /// Configures the radio for a starting channel and address, scans the
    /// checked channels for ambient noise and leaves the radio on
    /// `channel` with a drained input stream.
    pub async fn initialize(
        &mut self,
        channel: u8,
        transmit_address: u16,
        listen_before_talk: bool,
    ) -> Result<(), RadioError> {
        if channel >= CHANNEL_COUNT {
            return Err(RadioError::InvalidChannel(channel));
        }
        self.transmit_address = transmit_address;
        self.reconfigure(RadioSettings {
            channel,
            address: transmit_address,
            listen_before_talk,
            ambient_rssi: false,
        })
        .await?;

        let report = self.scan_ambient_noise(self.cfg.scan_retries).await?;
        for ch in report.channels() {
            if let Some(dbm) = report.dbm(ch) {
                info!("ambient noise on channel {ch}: {dbm:.1} dBm");
            }
        }

        self.drain_receive_buffer().await?;
        Ok(())
    }

    /// Samples ambient RSSI on each checked channel, keeping the loudest
    /// reading per channel, then restores the channel that was configured
    /// before the scan began.
    pub async fn scan_ambient_noise(&mut self, retries: u32) -> Result<NoiseReport, RadioError> {
        let restore = self.settings.ok_or(RadioError::NotInitialized)?;
        let mut readings = Vec::with_capacity(CHECKED_CHANNELS.len());
        for &channel in CHECKED_CHANNELS.iter() {
            self.reconfigure(RadioSettings {
                channel,
                ambient_rssi: true,
                ..restore
            })
            .await?;
            // smallest raw value = loudest noise
            let mut loudest = u8::MAX;
            for _ in 0..retries.max(1) {
                loudest = loudest.min(self.hw.sample_rssi().await?);
            }
            readings.push((channel, loudest));
        }
        self.reconfigure(restore).await?;

        let report = NoiseReport { readings };
        self.noise = report.clone();
        Ok(report)
    }

    /// The most recent noise scan.
    pub fn noise(&self) -> &NoiseReport {
        &self.noise
    }

    pub fn config(&self) -> &LinkConfig {
        &self.cfg
    }

    pub fn current_channel(&self) -> Option<u8> {
        self.settings.map(|s| s.channel)
    }

    pub async fn set_channel(&mut self, channel: u8) -> Result<(), RadioError> {
        if channel >= CHANNEL_COUNT {
            return Err(RadioError::InvalidChannel(channel));
        }
        let settings = self.settings.ok_or(RadioError::NotInitialized)?;
        self.reconfigure(RadioSettings { channel, ..settings }).await
    }

    pub async fn set_address(&mut self, address: u16) -> Result<(), RadioError> {
        let settings = self.settings.ok_or(RadioError::NotInitialized)?;
        self.reconfigure(RadioSettings { address, ..settings }).await
    }

    /// Wraps `payload` into one frame and hands it to the radio, switching
    /// to the transmit address first if this node listens elsewhere.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), RadioError> {
        let settings = self.settings.ok_or(RadioError::NotInitialized)?;
        if settings.address != self.transmit_address {
            self.set_address(self.transmit_address).await?;
        }
        let frame = framing::wrap(payload)?;
        self.hw.write(&frame).await
    }

    /// Drains every frame currently parseable from the inbound stream.
    ///
    /// Non-blocking: one pass over whatever the device has buffered, so
    /// the owning loop stays responsive. Corrupt bytes are skipped by the
    /// deframer and logged.
    pub async fn receive(&mut self) -> Result<Vec<Vec<u8>>, RadioError> {
        let settings = self.settings.ok_or(RadioError::NotInitialized)?;
        if settings.address != MONITOR_ADDRESS {
            self.set_address(MONITOR_ADDRESS).await?;
        }

        self.read_buf.clear();
        let n = self.hw.read_available(&mut self.read_buf).await?;
        if n > 0 {
            self.deframer.extend(&self.read_buf);
        }

        let skipped_before = self.deframer.discarded();
        let mut frames = Vec::new();
        while let Some(payload) = self.deframer.next_frame() {
            frames.push(payload);
        }
        let skipped = self.deframer.discarded() - skipped_before;
        if skipped > 0 {
            debug!("resynchronized past {skipped} noise bytes");
        }
        Ok(frames)
    }

    /// Reads and discards input until the device goes quiet, then drops
    /// any partially collected frame.
    pub async fn drain_receive_buffer(&mut self) -> Result<(), RadioError> {
        loop {
            self.read_buf.clear();
            if self.hw.read_available(&mut self.read_buf).await? == 0 {
                break;
            }
        }
        self.read_buf.clear();
        self.deframer.clear();
        Ok(())
    }

    pub fn queued_write_bytes(&self) -> usize {
        self.hw.queued_write_bytes()
    }

    pub async fn shutdown(&mut self) {
        self.hw.close().await;
    }

    /// Full half-duplex switch: close, toggle the mode line, settle,
    /// reopen, write registers, and back. Skipped entirely when the
    /// requested settings are already active, since each switch costs on
    /// the order of 100 ms to 1 s.
    async fn reconfigure(&mut self, next: RadioSettings) -> Result<(), RadioError> {
        if self.settings == Some(next) {
            return Ok(());
        }
        debug!(
            "reconfiguring radio: channel {} address {:#06x}",
            next.channel, next.address
        );
        self.hw.close().await;
        self.hw.set_mode_line(PortMode::Config).await?;
        sleep(self.cfg.mode_settle).await;
        self.hw.open(self.cfg.config_baud).await?;
        self.hw.apply_settings(&next).await?;

        self.hw.close().await;
        self.hw.set_mode_line(PortMode::Data).await?;
        sleep(self.cfg.mode_settle).await;
        self.hw.open(self.cfg.data_baud).await?;

        // the switch destroys any partial frame in flight
        self.deframer.clear();
        self.settings = Some(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{AirConfig, SimulatedAir};

    fn quick_link() -> LinkConfig {
        LinkConfig {
            mode_settle: std::time::Duration::ZERO,
            scan_retries: 3,
            ..LinkConfig::default()
        }
    }

    fn quiet_air() -> AirConfig {
        AirConfig {
            packet_loss: 0.0,
            corrupt_prob: 0.0,
            ..AirConfig::default()
        }
    }

    #[tokio::test]
    async fn loopback_send_receive() {
        let air = SimulatedAir::new(quiet_air());
        let mut tx = LinkChannel::new(air.endpoint().await, quick_link());
        let mut rx = LinkChannel::new(air.endpoint().await, quick_link());

        tx.initialize(10, 0x0001, false).await.unwrap();
        rx.initialize(10, MONITOR_ADDRESS, false).await.unwrap();

        tx.send(b"over the air").await.unwrap();
        let frames = rx.receive().await.unwrap();
        assert_eq!(frames, vec![b"over the air".to_vec()]);
        assert!(rx.receive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn different_channels_do_not_hear_each_other() {
        let air = SimulatedAir::new(quiet_air());
        let mut tx = LinkChannel::new(air.endpoint().await, quick_link());
        let mut rx = LinkChannel::new(air.endpoint().await, quick_link());

        tx.initialize(10, 0x0001, false).await.unwrap();
        rx.initialize(11, MONITOR_ADDRESS, false).await.unwrap();

        tx.send(b"into the void").await.unwrap();
        assert!(rx.receive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_frame_is_dropped_silently() {
        let air = SimulatedAir::new(AirConfig {
            packet_loss: 0.0,
            corrupt_prob: 1.0,
            ..AirConfig::default()
        });
        let mut tx = LinkChannel::new(air.endpoint().await, quick_link());
        let mut rx = LinkChannel::new(air.endpoint().await, quick_link());

        tx.initialize(5, 0x0002, false).await.unwrap();
        rx.initialize(5, MONITOR_ADDRESS, false).await.unwrap();

        tx.send(b"doomed frame").await.unwrap();
        assert!(rx.receive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn noise_scan_covers_checked_channels_and_restores() {
        let air = SimulatedAir::new(quiet_air());
        let hw = air.endpoint().await;
        let id = hw.id();
        let mut link = LinkChannel::new(hw, quick_link());
        link.initialize(42, MONITOR_ADDRESS, false).await.unwrap();

        let report = link.scan_ambient_noise(3).await.unwrap();
        let channels: Vec<u8> = report.channels().collect();
        assert_eq!(channels, CHECKED_CHANNELS.to_vec());
        for ch in CHECKED_CHANNELS {
            assert!(report.raw(ch).is_some());
        }
        assert!(report.quietest_channel().is_some());
        assert_eq!(link.current_channel(), Some(42));
        let settings = air.endpoint_settings(id).await.unwrap();
        assert_eq!(settings.channel, 42);
        assert!(!settings.ambient_rssi);
    }

    #[tokio::test]
    async fn unchanged_settings_skip_the_mode_switch() {
        let air = SimulatedAir::new(quiet_air());
        let mut link = LinkChannel::new(air.endpoint().await, quick_link());
        link.initialize(7, 0x0001, false).await.unwrap();

        let writes_before = air.config_writes().await;
        link.set_channel(7).await.unwrap();
        link.set_address(0x0001).await.unwrap();
        assert_eq!(air.config_writes().await, writes_before);

        link.set_channel(8).await.unwrap();
        assert_eq!(air.config_writes().await, writes_before + 1);
    }

    #[tokio::test]
    async fn rejects_channels_outside_the_table() {
        let air = SimulatedAir::new(quiet_air());
        let mut link = LinkChannel::new(air.endpoint().await, quick_link());
        assert!(matches!(
            link.initialize(CHANNEL_COUNT, 0x0001, false).await,
            Err(RadioError::InvalidChannel(_))
        ));
    }
}
