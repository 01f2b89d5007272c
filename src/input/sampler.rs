use std::thread;
use std::time::Duration;

use chrono::Local;
use statum::{machine, state};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{InputDevice, InputError, InputSnapshot};

#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    pub poll_interval: Duration,
    /// Pause after a failed read before trying again
    pub retry_delay: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Opening,
    Sampling,
}

#[machine]
pub struct InputSampler<S: SamplerState> {
    device: Box<dyn InputDevice>,
    snapshot_tx: watch::Sender<InputSnapshot>,
    settings: SamplerSettings,
    cancel: CancellationToken,
}

impl InputSampler<Opening> {
    pub fn create(
        device: Box<dyn InputDevice>,
        snapshot_tx: watch::Sender<InputSnapshot>,
        settings: SamplerSettings,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating input sampler for {}", device.name());
        Self::new(device, snapshot_tx, settings, cancel)
    }

    pub fn open(mut self) -> Result<InputSampler<Sampling>, InputError> {
        self.device.open()?;
        info!(
            "Input device {} open, sampling every {:?}",
            self.device.name(),
            self.settings.poll_interval
        );
        Ok(self.transition())
    }
}

impl InputSampler<Sampling> {
    /// One read, published latest-wins. A failed read publishes neutral input
    /// so nothing keeps jogging on stale values.
    pub fn sample_once(&mut self) -> Result<(), InputError> {
        match self.device.read() {
            Ok(snapshot) => {
                self.snapshot_tx.send_replace(snapshot);
                Ok(())
            }
            Err(e) => {
                self.snapshot_tx.send_replace(InputSnapshot::neutral());
                Err(e)
            }
        }
    }

    pub fn run(&mut self) {
        info!("Starting input sampling loop");

        let mut read_count: u64 = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);

        while !self.cancel.is_cancelled() {
            match self.sample_once() {
                Ok(()) => read_count += 1,
                Err(e) => {
                    warn!("Input read failed: {}", e);
                    thread::sleep(self.settings.retry_delay);
                    continue;
                }
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Input sampler stats: {} reads in last {} seconds (avg {:.2}/sec)",
                    read_count,
                    log_interval.num_seconds(),
                    read_count as f64 / log_interval.num_seconds() as f64
                );
                read_count = 0;
                last_log_time = now;
            }

            thread::sleep(self.settings.poll_interval);
        }

        self.snapshot_tx.send_replace(InputSnapshot::neutral());
        info!("Input sampling loop stopped");
    }
}

/// Owns the sampler's OS thread.
pub struct SamplerHandle {
    thread: Option<thread::JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SamplerHandle {
    /// Starts the sampler thread and waits until the device is open.
    ///
    /// The device is built on the sampler thread by `factory`, so backends
    /// need not be `Send`.
    pub async fn spawn<F>(
        factory: F,
        settings: SamplerSettings,
        cancel: CancellationToken,
    ) -> Result<(Self, watch::Receiver<InputSnapshot>), InputError>
    where
        F: FnOnce() -> Box<dyn InputDevice> + Send + 'static,
    {
        let cancel = cancel.child_token();
        let (snapshot_tx, snapshot_rx) = watch::channel(InputSnapshot::neutral());
        let (ready_tx, ready_rx) = oneshot::channel();
        let thread_cancel = cancel.clone();

        let thread = thread::Builder::new()
            .name("input-sampler".to_string())
            .spawn(move || {
                let sampler = InputSampler::create(factory(), snapshot_tx, settings, thread_cancel);
                match sampler.open() {
                    Ok(mut sampling) => {
                        let _ = ready_tx.send(Ok(()));
                        sampling.run();
                    }
                    Err(e) => {
                        error!("Failed to open input device: {}", e);
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| InputError::Open(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok((
                Self {
                    thread: Some(thread),
                    cancel,
                },
                snapshot_rx,
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(InputError::Open("sampler thread exited".to_string())),
        }
    }

    /// Stops the loop and joins the thread.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Input sampler thread panicked");
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedDevice {
        reads: Arc<AtomicUsize>,
        fail_open: bool,
    }

    impl InputDevice for ScriptedDevice {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        fn open(&mut self) -> Result<(), InputError> {
            if self.fail_open {
                return Err(InputError::NoDevice("scripted".to_string()));
            }
            Ok(())
        }

        fn read(&mut self) -> Result<InputSnapshot, InputError> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            Ok(InputSnapshot::new([0.8, 0.0, 0.0, 0.0, 0.0, -0.3], [true, false]))
        }
    }

    #[tokio::test]
    async fn publishes_device_readings() {
        let reads = Arc::new(AtomicUsize::new(0));
        let device_reads = reads.clone();
        let cancel = CancellationToken::new();

        let (mut handle, mut snapshot_rx) = SamplerHandle::spawn(
            move || {
                Box::new(ScriptedDevice {
                    reads: device_reads,
                    fail_open: false,
                }) as Box<dyn InputDevice>
            },
            SamplerSettings::default(),
            cancel.clone(),
        )
        .await
        .unwrap();

        snapshot_rx.changed().await.unwrap();
        let snapshot = *snapshot_rx.borrow();
        assert_eq!(snapshot.axes[0], 0.8);
        assert_eq!(snapshot.buttons, [true, false]);
        assert!(reads.load(Ordering::Relaxed) >= 1);

        handle.shutdown();
        assert_eq!(snapshot_rx.borrow().axes, [0.0; 6]);
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let result = SamplerHandle::spawn(
            || {
                Box::new(ScriptedDevice {
                    reads: Arc::new(AtomicUsize::new(0)),
                    fail_open: true,
                }) as Box<dyn InputDevice>
            },
            SamplerSettings::default(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(InputError::NoDevice(_))));
    }
}
