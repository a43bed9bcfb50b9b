//! end-to-end transfer scenarios over the simulated air

use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::time::Instant;

use skylink_radio::{AirConfig, LinkChannel, LinkConfig, SimulatedAir, MONITOR_ADDRESS};
use skylink_transfer::{BroadcastReceiver, BroadcastSender, TransferConfig};

use crate::DEFAULT_TRANSFER_CHANNEL;

#[derive(Debug)]
pub struct TransferReport {
    pub filename: String,
    pub file_bytes: usize,
    pub elapsed: Duration,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_corrupted: u64,
}

/// Runs one broadcast transfer between two simulated stations, invoking
/// `on_progress` with the receiver's fraction as it advances.
pub async fn broadcast_transfer<F>(
    air_cfg: AirConfig,
    transfer_cfg: TransferConfig,
    filename: &str,
    file_bytes: &[u8],
    deadline: Duration,
    mut on_progress: F,
) -> Result<TransferReport>
where
    F: FnMut(f32) + Send + 'static,
{
    let air = SimulatedAir::new(air_cfg);
    let link_cfg = LinkConfig {
        mode_settle: Duration::ZERO,
        scan_retries: 2,
        ..LinkConfig::default()
    };

    let mut tx_chan = LinkChannel::new(air.endpoint().await, link_cfg.clone());
    tx_chan
        .initialize(DEFAULT_TRANSFER_CHANNEL, 0x0001, false)
        .await?;
    let mut rx_chan = LinkChannel::new(air.endpoint().await, link_cfg);
    rx_chan
        .initialize(DEFAULT_TRANSFER_CHANNEL, MONITOR_ADDRESS, false)
        .await?;
    if let Some(quietest) = rx_chan.noise().quietest_channel() {
        info!("quietest checked channel: {quietest}");
    }

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut receiver = BroadcastReceiver::start(rx_chan, transfer_cfg.clone(), move |fraction, done| {
        on_progress(fraction);
        if let Some(result) = done {
            let _ = done_tx.send(result);
        }
    });

    let started = Instant::now();
    let mut sender = BroadcastSender::start(tx_chan, filename, file_bytes, transfer_cfg)
        .context("sender failed to start")?;

    let outcome = tokio::time::timeout(deadline, done_rx.recv()).await;
    let elapsed = started.elapsed();
    sender.shutdown().await;
    receiver.shutdown().await;

    let (received_name, received_bytes) = outcome
        .context("transfer did not complete before the deadline")?
        .context("receiver went away without completing")?;
    anyhow::ensure!(received_name == filename, "filename changed in flight");
    anyhow::ensure!(received_bytes == file_bytes, "contents changed in flight");

    let (frames_sent, frames_dropped, frames_corrupted, _) = air.stats().await;
    info!(
        "transfer of {} finished in {:?} ({} frames, {} lost, {} corrupted)",
        filename, elapsed, frames_sent, frames_dropped, frames_corrupted
    );
    Ok(TransferReport {
        filename: received_name,
        file_bytes: received_bytes.len(),
        elapsed,
        frames_sent,
        frames_dropped,
        frames_corrupted,
    })
}

/// Deterministic, compressible stand-in for a field log file.
pub fn sample_file(lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for line in 0..lines {
        out.extend_from_slice(
            format!("{line:06} station reports clear sky, battery nominal, queue empty\n")
                .as_bytes(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkPresets;

    fn fast_transfer_cfg() -> TransferConfig {
        TransferConfig {
            send_interval: Duration::from_millis(2),
            poll_sleep: Duration::from_millis(1),
            metadata_interval: 8,
            ..TransferConfig::default()
        }
    }

    #[tokio::test]
    async fn bench_preset_completes() {
        let report = broadcast_transfer(
            LinkPresets::bench(),
            fast_transfer_cfg(),
            "bench.txt",
            &sample_file(50),
            Duration::from_secs(30),
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(report.filename, "bench.txt");
        assert!(report.frames_sent > 0);
    }

    #[tokio::test]
    async fn average_conditions_complete() {
        let report = broadcast_transfer(
            LinkPresets::average_conditions(),
            fast_transfer_cfg(),
            "avg.txt",
            &sample_file(200),
            Duration::from_secs(60),
            |_| {},
        )
        .await
        .unwrap();
        assert!(report.frames_sent >= report.frames_dropped);
    }
}
