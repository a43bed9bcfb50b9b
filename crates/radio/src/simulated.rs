//! simulated radio hardware for testing

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::transport::{PortMode, RadioHardware, RadioSettings};
use crate::{RadioError, MONITOR_ADDRESS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirConfig {
    /// Probability that a transmitted frame is lost outright.
    pub packet_loss: f32,
    /// Probability that a delivered frame arrives with one flipped bit.
    pub corrupt_prob: f32,
    /// Serial throughput used to pace writes; 0 disables pacing.
    pub bandwidth_bps: u32,
    pub latency: Duration,
    /// Baseline ambient RSSI register value, units -dBm·2.
    pub noise_floor_raw: u8,
    /// Gaussian sigma applied to each RSSI sample, in raw units.
    pub noise_jitter: f32,
}

impl Default for AirConfig {
    fn default() -> Self {
        Self {
            packet_loss: 0.05,
            corrupt_prob: 0.01,
            bandwidth_bps: 0,
            latency: Duration::ZERO,
            noise_floor_raw: 240,
            noise_jitter: 3.0,
        }
    }
}

#[derive(Debug, Default)]
struct AirStats {
    frames_sent: u64,
    frames_dropped: u64,
    frames_corrupted: u64,
    bytes_delivered: u64,
    config_writes: u64,
}

struct Endpoint {
    open: bool,
    mode: PortMode,
    settings: Option<RadioSettings>,
    inbox: VecDeque<u8>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            open: false,
            mode: PortMode::Data,
            settings: None,
            inbox: VecDeque::new(),
        }
    }
}

struct AirState {
    endpoints: Vec<Endpoint>,
    stats: AirStats,
}

/// In-process hub standing in for the shared radio spectrum.
///
/// Every [`SimulatedRadio`] handed out by [`endpoint`](Self::endpoint)
/// transmits into the hub; frames reach the other endpoints that are open
/// in data mode on the same channel and listening on the monitor address.
pub struct SimulatedAir {
    config: AirConfig,
    state: Arc<Mutex<AirState>>,
}

impl SimulatedAir {
    pub fn new(config: AirConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Arc::new(Mutex::new(AirState {
                endpoints: Vec::new(),
                stats: AirStats::default(),
            })),
        })
    }

    pub async fn endpoint(self: &Arc<Self>) -> SimulatedRadio {
        let mut state = self.state.lock().await;
        state.endpoints.push(Endpoint::new());
        SimulatedRadio {
            air: Arc::clone(self),
            id: state.endpoints.len() - 1,
        }
    }

    /// (sent, dropped, corrupted, bytes delivered)
    pub async fn stats(&self) -> (u64, u64, u64, u64) {
        let state = self.state.lock().await;
        (
            state.stats.frames_sent,
            state.stats.frames_dropped,
            state.stats.frames_corrupted,
            state.stats.bytes_delivered,
        )
    }

    /// Register writes observed across all endpoints.
    pub async fn config_writes(&self) -> u64 {
        self.state.lock().await.stats.config_writes
    }

    /// Last settings applied by endpoint `id`.
    pub async fn endpoint_settings(&self, id: usize) -> Option<RadioSettings> {
        self.state.lock().await.endpoints.get(id).and_then(|e| e.settings)
    }
}

pub struct SimulatedRadio {
    air: Arc<SimulatedAir>,
    id: usize,
}

impl SimulatedRadio {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl RadioHardware for SimulatedRadio {
    async fn open(&mut self, _baud: u32) -> Result<(), RadioError> {
        let mut state = self.air.state.lock().await;
        state.endpoints[self.id].open = true;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.air.state.lock().await;
        state.endpoints[self.id].open = false;
    }

    async fn set_mode_line(&mut self, mode: PortMode) -> Result<(), RadioError> {
        let mut state = self.air.state.lock().await;
        state.endpoints[self.id].mode = mode;
        Ok(())
    }

    async fn apply_settings(&mut self, settings: &RadioSettings) -> Result<(), RadioError> {
        let mut state = self.air.state.lock().await;
        let endpoint = &mut state.endpoints[self.id];
        if !endpoint.open || endpoint.mode != PortMode::Config {
            return Err(RadioError::ConfigRejected);
        }
        endpoint.settings = Some(*settings);
        state.stats.config_writes += 1;
        trace!(
            "endpoint {} configured: channel {} address {:#06x}",
            self.id,
            settings.channel,
            settings.address
        );
        Ok(())
    }

    async fn sample_rssi(&mut self) -> Result<u8, RadioError> {
        let floor = {
            let state = self.air.state.lock().await;
            let endpoint = &state.endpoints[self.id];
            if !endpoint.open {
                return Err(RadioError::Transport("port is closed".into()));
            }
            // quieter (larger raw) on higher channels, like a real band edge
            let channel = endpoint.settings.map(|s| s.channel).unwrap_or(0);
            self.air.config.noise_floor_raw.saturating_sub(channel % 8)
        };
        let jitter = Normal::new(0.0, self.air.config.noise_jitter.max(f32::EPSILON))
            .map(|n| n.sample(&mut rand::rng()))
            .unwrap_or(0.0);
        Ok((floor as f32 + jitter).clamp(0.0, 255.0) as u8)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), RadioError> {
        if self.air.config.bandwidth_bps > 0 {
            let air_time = Duration::from_secs_f64(
                (data.len() * 8) as f64 / self.air.config.bandwidth_bps as f64,
            );
            sleep(air_time).await;
        }
        if !self.air.config.latency.is_zero() {
            sleep(self.air.config.latency).await;
        }

        let mut state = self.air.state.lock().await;
        let sender = &state.endpoints[self.id];
        if !sender.open || sender.mode != PortMode::Data {
            return Err(RadioError::Transport("port is closed".into()));
        }
        let Some(settings) = sender.settings else {
            return Err(RadioError::Transport("radio is unconfigured".into()));
        };
        if settings.address == MONITOR_ADDRESS {
            trace!("endpoint {} is monitor-addressed, frame not radiated", self.id);
            return Ok(());
        }

        state.stats.frames_sent += 1;
        let mut rng = rand::rng();
        if rng.random::<f32>() < self.air.config.packet_loss {
            state.stats.frames_dropped += 1;
            debug!("simulated frame loss");
            return Ok(());
        }

        let mut delivered = data.to_vec();
        if rng.random::<f32>() < self.air.config.corrupt_prob {
            let byte = rng.random_range(0..delivered.len());
            let bit = rng.random_range(0..8u8);
            delivered[byte] ^= 1 << bit;
            state.stats.frames_corrupted += 1;
            debug!("simulated bit error");
        }

        let channel = settings.channel;
        let sender_id = self.id;
        let mut delivered_bytes = 0u64;
        for (id, endpoint) in state.endpoints.iter_mut().enumerate() {
            if id == sender_id || !endpoint.open || endpoint.mode != PortMode::Data {
                continue;
            }
            let Some(rs) = endpoint.settings else { continue };
            if rs.channel != channel || rs.address != MONITOR_ADDRESS {
                continue;
            }
            endpoint.inbox.extend(delivered.iter().copied());
            delivered_bytes += delivered.len() as u64;
        }
        state.stats.bytes_delivered += delivered_bytes;
        Ok(())
    }

    async fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, RadioError> {
        let mut state = self.air.state.lock().await;
        let endpoint = &mut state.endpoints[self.id];
        if !endpoint.open {
            return Err(RadioError::Transport("port is closed".into()));
        }
        let n = endpoint.inbox.len();
        out.extend(endpoint.inbox.drain(..));
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_writes_require_config_mode() {
        let air = SimulatedAir::new(AirConfig::default());
        let mut radio = air.endpoint().await;
        radio.open(9600).await.unwrap();

        let settings = RadioSettings {
            channel: 1,
            address: 2,
            listen_before_talk: false,
            ambient_rssi: false,
        };
        assert!(matches!(
            radio.apply_settings(&settings).await,
            Err(RadioError::ConfigRejected)
        ));
        radio.set_mode_line(PortMode::Config).await.unwrap();
        radio.apply_settings(&settings).await.unwrap();
        assert_eq!(air.endpoint_settings(radio.id()).await, Some(settings));
    }

    #[tokio::test]
    async fn rssi_tracks_the_configured_noise_floor() {
        let air = SimulatedAir::new(AirConfig {
            noise_floor_raw: 200,
            noise_jitter: 1.0,
            ..AirConfig::default()
        });
        let mut radio = air.endpoint().await;
        radio.open(9600).await.unwrap();
        radio.set_mode_line(PortMode::Config).await.unwrap();
        radio
            .apply_settings(&RadioSettings {
                channel: 0,
                address: MONITOR_ADDRESS,
                listen_before_talk: false,
                ambient_rssi: true,
            })
            .await
            .unwrap();

        let raw = radio.sample_rssi().await.unwrap();
        assert!((150..=250).contains(&raw), "raw {raw} far from the floor");
    }
}
