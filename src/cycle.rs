use std::{future::Future, io, sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio::{pin, select, sync::watch, task, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    config::{CycleConfig, PrimaryMode, SecondaryMode, WaitPolicy},
    reduce::reduce,
    retry::{RetryPolicy, retry},
    sen5x::{
        AveragedMeasurement, DeviceError, DeviceInfo, SensorMeasurement, SensorModel, SensorPort,
        call, identify,
    },
    sink::{Sink, SinkError},
};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to {operation}")]
    Device {
        operation: &'static str,
        #[source]
        source: DeviceError,
    },
}

fn fatal(operation: &'static str) -> impl FnOnce(DeviceError) -> CycleError {
    move |source| CycleError::Device { operation, source }
}

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Dispatched(AveragedMeasurement),
    /// Every kept-phase read failed, nothing was dispatched.
    EmptyBatch,
    /// The one-shot fan cleaning ran; no measurement loop follows.
    FanCleaned,
    Shutdown,
}

/// Why [`Orchestrator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    FanCleaned,
}

/// Receiving end of the shutdown request, checked between samples and while waiting.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    pub fn is_requested(&self) -> bool {
        *self.0.borrow()
    }

    /// Sleeps for `duration` unless shutdown is requested first. Returns whether it was.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }

        let timer = sleep(duration);
        pin!(timer);

        let requested = select! {
            _ = &mut timer => return false,
            changed = self.0.wait_for(|r| *r) => changed.is_ok(),
        };

        if !requested {
            // sender gone, nobody can ask for shutdown any more
            timer.await;
        }
        requested
    }
}

/// Turns the first interrupt into a shutdown request and returns once a second one arrives,
/// so the caller can exit without waiting for a cycle to wind down.
pub async fn forward_interrupts<F, Fut>(
    mut interrupt: F,
    tx: watch::Sender<bool>,
) -> io::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    interrupt().await?;
    info!("received interrupt, stopping measurement; interrupt again to exit immediately");
    let _ = tx.send(true);

    interrupt().await
}

/// Drives the SEN5x through repeated measurement cycles and hands each averaged reading to
/// the configured sinks.
pub struct Orchestrator<P: SensorPort> {
    port: Arc<P>,
    config: CycleConfig,
    device: DeviceInfo,
    model: SensorModel,
    sinks: Vec<Arc<dyn Sink>>,
    shutdown: Shutdown,
}

impl<P: SensorPort> Orchestrator<P> {
    /// Resets the device, reads its identity and applies the device settings.
    ///
    /// Any failure here means the device link is unusable and is returned as fatal.
    pub async fn start(
        port: Arc<P>,
        config: CycleConfig,
        sinks: Vec<Arc<dyn Sink>>,
        shutdown: Shutdown,
    ) -> Result<Self, CycleError> {
        let timeout = config.command_timeout;

        let device = identify(&port, timeout)
            .await
            .map_err(fatal("identify device"))?;
        let model = SensorModel::from_product_name(&device.product_name);

        info!(
            serial_number = %device.serial_number,
            product_name = %device.product_name.trim_end_matches('\0'),
            firmware = %device.firmware,
            model = model.as_str(),
            "device identified"
        );

        let settings = config.device_settings;
        call(&port, timeout, move |p| {
            p.set_fan_cleaning_interval(settings.fan_cleaning_interval)
        })
        .await
        .map_err(fatal("set fan cleaning interval"))?;
        call(&port, timeout, move |p| {
            p.set_rht_acceleration_mode(settings.rht_acceleration_mode)
        })
        .await
        .map_err(fatal("set RH/T acceleration mode"))?;
        call(&port, timeout, move |p| {
            p.set_temperature_offset(settings.temperature_offset)
        })
        .await
        .map_err(fatal("set temperature offset"))?;

        Ok(Self {
            port,
            config,
            device,
            model,
            sinks,
            shutdown,
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn model(&self) -> SensorModel {
        self.model
    }

    /// Runs cycles until shutdown is requested, the fan cleaning ran, or a mode transition
    /// fails.
    pub async fn run(&mut self) -> Result<Exit, CycleError> {
        loop {
            match self.run_cycle().await? {
                CycleOutcome::Dispatched(_) | CycleOutcome::EmptyBatch => {}
                CycleOutcome::FanCleaned => return Ok(Exit::FanCleaned),
                CycleOutcome::Shutdown => return Ok(Exit::Shutdown),
            }

            let pause = self.config.sleep_between_batches;
            info!("sleeping {}s until next batch of measurements", pause.as_secs());
            if self.shutdown.sleep(pause).await {
                return Ok(Exit::Shutdown);
            }
        }
    }

    /// One pass of mode selection, collection, secondary transition, reduction and dispatch.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        if self.shutdown.is_requested() {
            return Ok(CycleOutcome::Shutdown);
        }

        if self.select_mode().await? {
            return Ok(CycleOutcome::FanCleaned);
        }

        let Some(batch) = self.collect().await else {
            return Ok(CycleOutcome::Shutdown);
        };

        self.enter_secondary_mode().await;

        let Some(average) = reduce(&batch) else {
            warn!("no sample was kept in this batch, skipping dispatch");
            return Ok(CycleOutcome::EmptyBatch);
        };
        drop(batch);

        info!(samples = average.sample_count, "average measurement: {}", average.values);
        self.dispatch(&average).await;

        Ok(CycleOutcome::Dispatched(average))
    }

    /// Starts the primary mode. Returns `true` if the one-shot fan cleaning was run instead.
    async fn select_mode(&self) -> Result<bool, CycleError> {
        let timeout = self.config.command_timeout;

        match self.config.primary {
            PrimaryMode::All => {
                call(&self.port, timeout, |p| p.start_full())
                    .await
                    .map_err(fatal("start measurement"))?;
                info!("started measurement in all mode");

                if self.config.force_clean_fan {
                    info!(
                        "starting fan cleaning, exiting afterwards; unset force_clean_fan to measure again"
                    );
                    call(&self.port, timeout, |p| p.start_cleaning())
                        .await
                        .map_err(fatal("start fan cleaning"))?;
                    return Ok(true);
                }
            }
            PrimaryMode::GasOnly => {
                call(&self.port, timeout, |p| p.start_gas_only())
                    .await
                    .map_err(fatal("start measurement without PM"))?;
                info!("started measurement without PM");
            }
        }

        Ok(false)
    }

    /// Reads `sample_count` samples and keeps those past the warm-up window. Returns `None`
    /// if shutdown was requested.
    async fn collect(&mut self) -> Option<Vec<SensorMeasurement>> {
        let CycleConfig {
            primary,
            warm_up_count,
            sample_count,
            command_timeout,
            read_retry,
            ..
        } = self.config;

        let mut batch = Vec::with_capacity(sample_count.saturating_sub(warm_up_count) as usize);

        for i in 0..sample_count {
            if self.shutdown.is_requested() || self.wait_for_data().await {
                return None;
            }

            let port = &self.port;
            let sample = match retry(read_retry, "sample read", || {
                call(port, command_timeout, |p| p.read_sample())
            })
            .await
            {
                Ok(s) => match primary {
                    PrimaryMode::All => self.model.mask(s),
                    PrimaryMode::GasOnly => self.model.mask(s).without_particulates(),
                },
                Err(e) => {
                    warn!(iteration = i, "failed to read sample: {e}");
                    continue;
                }
            };

            if i < warm_up_count {
                debug!(iteration = i, "discarding warm-up sample: {sample}");
                continue;
            }

            debug!(iteration = i, "read measurement: {sample}");
            batch.push(sample);
        }

        Some(batch)
    }

    /// Waits until the next sample can be read. Returns `true` if shutdown was requested.
    async fn wait_for_data(&mut self) -> bool {
        let interval = match self.config.wait {
            WaitPolicy::Fixed(delay) => return self.shutdown.sleep(delay).await,
            WaitPolicy::PollDataReady(interval) => interval,
        };

        loop {
            match call(&self.port, self.config.command_timeout, |p| p.data_ready()).await {
                Ok(true) => return false,
                Ok(false) => {}
                Err(e) => warn!("failed to read data-ready flag: {e}"),
            }

            if self.shutdown.sleep(interval).await {
                return true;
            }
        }
    }

    /// A failure here is not fatal: the next cycle's primary transition sets the mode again.
    async fn enter_secondary_mode(&self) {
        let timeout = self.config.command_timeout;

        let result = match self.config.secondary {
            SecondaryMode::Gas => call(&self.port, timeout, |p| p.start_gas_only()).await,
            SecondaryMode::Stop => call(&self.port, timeout, |p| p.stop()).await,
        };

        match result {
            Ok(()) => debug!(mode = ?self.config.secondary, "entered secondary mode"),
            Err(e) => warn!(mode = ?self.config.secondary, "failed to enter secondary mode: {e}"),
        }
    }

    /// Hands the reading to every sink. Sinks fail independently and never stop the loop.
    async fn dispatch(&self, average: &AveragedMeasurement) {
        let timestamp = Utc::now().timestamp();

        for sink in &self.sinks {
            let policy = if sink.retryable() {
                self.config.dispatch_retry
            } else {
                RetryPolicy::ONCE
            };

            let result = retry(policy, sink.name(), || {
                let sink = Arc::clone(sink);
                let average = *average;
                async move {
                    task::spawn_blocking(move || sink.dispatch(timestamp, &average))
                        .await
                        .map_err(|e| SinkError::Join(e.to_string()))?
                }
            })
            .await;

            match result {
                Ok(()) => info!(sink = sink.name(), "dispatched average measurement"),
                Err(e) => warn!(sink = sink.name(), "failed to dispatch average measurement: {e}"),
            }
        }
    }

    /// Stops the measurement, for use once [`run`](Self::run) has returned.
    pub async fn stop_measurement(&self) -> Result<(), CycleError> {
        call(&self.port, self.config.command_timeout, |p| p.stop())
            .await
            .map_err(fatal("stop measurement"))
    }
}
