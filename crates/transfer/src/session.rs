//! broadcast session drivers
//!
//! One worker task per role, polling cooperatively and observing a shared
//! termination flag; shutdown sets the flag and joins the worker, so the
//! channel and codec handles are never touched after shutdown returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use skylink_radio::{LinkChannel, RadioHardware};

use crate::decoder::{TransferDecoder, TransferEvent};
use crate::encoder::TransferEncoder;
use crate::{TransferConfig, TransferError};

/// Streams one file onto the channel forever, with no feedback path: any
/// receiver that joins mid-stream eventually collects enough blocks.
pub struct BroadcastSender {
    terminated: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BroadcastSender {
    pub fn start<H>(
        mut channel: LinkChannel<H>,
        filename: &str,
        file_bytes: &[u8],
        cfg: TransferConfig,
    ) -> Result<Self, TransferError>
    where
        H: RadioHardware + 'static,
    {
        let mut encoder = TransferEncoder::new(filename, file_bytes, &cfg)?;
        let terminated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&terminated);

        let worker = tokio::spawn(async move {
            debug!("broadcast sender loop started");
            let mut next_send = Instant::now();
            while !flag.load(Ordering::Relaxed) {
                if Instant::now() >= next_send && channel.queued_write_bytes() == 0 {
                    let frame = match encoder.next_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("block encoding failed: {e}");
                            break;
                        }
                    };
                    if let Err(e) = channel.send(&frame).await {
                        error!("link send failed: {e}");
                        break;
                    }
                    next_send = Instant::now() + cfg.send_interval;
                }
                sleep(cfg.poll_sleep).await;
            }
            flag.store(true, Ordering::Relaxed);
            channel.shutdown().await;
            debug!("broadcast sender loop stopped");
        });

        Ok(Self {
            terminated,
            worker: Some(worker),
        })
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }

    pub async fn shutdown(&mut self) {
        self.terminated.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

/// Listens for broadcast transfers and reports them through a progress
/// callback: `(fraction, None)` while receiving, `(1.0, Some((filename,
/// contents)))` exactly once per completed file.
pub struct BroadcastReceiver {
    terminated: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BroadcastReceiver {
    pub fn start<H, F>(mut channel: LinkChannel<H>, cfg: TransferConfig, mut on_progress: F) -> Self
    where
        H: RadioHardware + 'static,
        F: FnMut(f32, Option<(String, Vec<u8>)>) + Send + 'static,
    {
        let terminated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&terminated);

        let worker = tokio::spawn(async move {
            debug!("broadcast receiver loop started");
            let mut decoder = TransferDecoder::new(cfg.clone());
            let mut last_scan = Instant::now();
            while !flag.load(Ordering::Relaxed) {
                let frames = match channel.receive().await {
                    Ok(frames) => frames,
                    Err(e) => {
                        error!("link receive failed: {e}");
                        break;
                    }
                };
                for payload in frames {
                    match decoder.on_frame(&payload) {
                        TransferEvent::Progress(fraction) => on_progress(fraction, None),
                        TransferEvent::Completed { filename, contents } => {
                            on_progress(1.0, Some((filename, contents)))
                        }
                        TransferEvent::Failed => on_progress(0.0, None),
                        TransferEvent::None => {}
                    }
                }
                decoder.poll_timeout();

                if decoder.state() == crate::TransferState::Idle
                    && last_scan.elapsed() >= cfg.idle_scan_interval
                {
                    let retries = channel.config().scan_retries;
                    if let Err(e) = channel.scan_ambient_noise(retries).await {
                        error!("ambient noise scan failed: {e}");
                        break;
                    }
                    last_scan = Instant::now();
                }

                sleep(cfg.poll_sleep).await;
            }
            flag.store(true, Ordering::Relaxed);
            channel.shutdown().await;
            debug!("broadcast receiver loop stopped");
        });

        Self {
            terminated,
            worker: Some(worker),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }

    pub async fn shutdown(&mut self) {
        self.terminated.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}
