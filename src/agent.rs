//! Agent builder and runtime.
//!
//! The [`AgentBuilder`] provides a fluent API for configuring the agent. The
//! [`Agent`] runs two tasks:
//! 1. Sampler: on every tick, read the sources, encode and fragment, and hand
//!    the frames to the link task without waiting
//! 2. Link: schedule and transmit frames on the radio
//!
//! Shutdown stops the sampler first, then lets the link task drain (or
//! abandon bulk) and close the radio.
//!
//! # Example
//!
//! ```ignore
//! use lora_telemetry::{Agent, SyntheticThermal, SyntheticVehicle};
//!
//! let agent = Agent::builder()
//!     .sample_interval(Duration::from_secs(1))
//!     .image_every(10)
//!     .start(radio, SyntheticVehicle::default(), SyntheticThermal::default());
//!
//! tokio::signal::ctrl_c().await?;
//! let report = agent.shutdown().await?;
//! ```

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::codec::PayloadFormat;
use crate::error::{LinkError, Result};
use crate::link::{spawn_link_task, LinkConfig, LinkHandle, ShutdownPolicy};
use crate::protocol::Fragmenter;
use crate::scheduler::{SchedulerConfig, SchedulerStats};
use crate::source::{ThermalSource, VehicleSource};
use crate::telemetry::{EncoderStats, Sample, TelemetryEncoder};
use crate::transport::RadioTx;

/// Default time between samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest accepted time between samples.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Default image cadence: one full thermal image every N ticks.
pub const DEFAULT_IMAGE_EVERY: u32 = 10;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Time between samples.
    pub sample_interval: Duration,
    /// Send a thermal image every N ticks; 0 disables images.
    pub image_every: u32,
    /// Payload encoding.
    pub format: PayloadFormat,
    /// Link task configuration.
    pub link: LinkConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            image_every: DEFAULT_IMAGE_EVERY,
            format: PayloadFormat::default(),
            link: LinkConfig::default(),
        }
    }
}

/// Builder for configuring and starting an agent.
pub struct AgentBuilder {
    config: AgentConfig,
}

impl AgentBuilder {
    /// Create a new agent builder.
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
        }
    }

    /// Set the time between samples, at least [`MIN_SAMPLE_INTERVAL`].
    ///
    /// Default: 1 second
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.config.sample_interval = interval.max(MIN_SAMPLE_INTERVAL);
        self
    }

    /// Send a thermal image every `ticks` samples; 0 disables images.
    ///
    /// Default: 10
    pub fn image_every(mut self, ticks: u32) -> Self {
        self.config.image_every = ticks;
        self
    }

    /// Set the payload encoding. The ground station must match.
    pub fn payload_format(mut self, format: PayloadFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Replace the scheduler configuration.
    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.config.link.scheduler = scheduler;
        self
    }

    /// Set the retries per frame.
    ///
    /// Default: 3
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.link.scheduler.max_retries = retries;
        self
    }

    /// Set the channel capacity between sampler and link task.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.link.channel_capacity = capacity;
        self
    }

    /// Set what happens to queued frames at shutdown.
    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.link.shutdown = policy;
        self
    }

    /// Start the agent on a radio with the given sources.
    ///
    /// Must be called within a tokio runtime.
    pub fn start<R, V, T>(self, radio: R, vehicle: V, thermal: T) -> Agent
    where
        R: RadioTx,
        V: VehicleSource,
        T: ThermalSource,
    {
        Agent::start(self.config, radio, vehicle, thermal)
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What the agent did over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    /// Sampling ticks executed.
    pub ticks: u64,
    /// Encoder statistics.
    pub encoder: EncoderStats,
    /// Frames dropped because the link channel was full.
    pub frames_dropped: u64,
    /// Link scheduler statistics.
    pub link: SchedulerStats,
}

struct SamplerReport {
    ticks: u64,
    encoder: EncoderStats,
}

/// A running agent.
pub struct Agent {
    link: LinkHandle,
    stop_tx: oneshot::Sender<()>,
    sampler: JoinHandle<SamplerReport>,
    link_task: JoinHandle<Result<SchedulerStats>>,
}

impl Agent {
    /// Create a new agent builder.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    fn start<R, V, T>(config: AgentConfig, radio: R, vehicle: V, thermal: T) -> Self
    where
        R: RadioTx,
        V: VehicleSource,
        T: ThermalSource,
    {
        let fragmenter = Fragmenter::for_mtu(radio.mtu());
        let encoder = TelemetryEncoder::new(config.format, fragmenter);

        let (link, link_task) = spawn_link_task(radio, config.link);
        let (stop_tx, stop_rx) = oneshot::channel();

        tracing::info!(
            interval_ms = config.sample_interval.as_millis() as u64,
            image_every = config.image_every,
            format = %config.format,
            max_data = fragmenter.max_data(),
            "agent started"
        );

        let sampler = tokio::spawn(sample_loop(
            encoder,
            vehicle,
            thermal,
            link.clone(),
            config.sample_interval,
            config.image_every,
            stop_rx,
        ));

        Agent {
            link,
            stop_tx,
            sampler,
            link_task,
        }
    }

    /// Frames waiting to be picked up by the link task.
    pub fn pending_frames(&self) -> usize {
        self.link.pending_count()
    }

    /// Frames dropped because the link channel was full.
    pub fn dropped_frames(&self) -> u64 {
        self.link.dropped_count()
    }

    /// Stop sampling, let the link task finish, and close the radio.
    pub async fn shutdown(self) -> Result<AgentReport> {
        let Agent {
            link,
            stop_tx,
            sampler,
            link_task,
        } = self;

        // The sampler may already have exited on a closed link.
        let _ = stop_tx.send(());
        let sampled = sampler.await?;

        let frames_dropped = link.dropped_count();
        drop(link);
        let link_stats = link_task.await??;

        tracing::info!(ticks = sampled.ticks, frames_dropped, "agent stopped");

        Ok(AgentReport {
            ticks: sampled.ticks,
            encoder: sampled.encoder,
            frames_dropped,
            link: link_stats,
        })
    }
}

/// Sampling loop: one sample per tick until stopped.
async fn sample_loop<V, T>(
    mut encoder: TelemetryEncoder,
    mut vehicle: V,
    mut thermal: T,
    link: LinkHandle,
    interval: Duration,
    image_every: u32,
    mut stop_rx: oneshot::Receiver<()>,
) -> SamplerReport
where
    V: VehicleSource,
    T: ThermalSource,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    'sampling: loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }

        let wants_image = image_every > 0 && ticks % u64::from(image_every) == 0;
        let sample = Sample {
            vehicle: vehicle.read_vehicle_state(),
            summary: thermal.read_thermal(),
            image: if wants_image {
                thermal.read_thermal_image()
            } else {
                None
            },
        };
        ticks += 1;

        for fragments in encoder.encode_tick(&sample) {
            let seq = fragments.seq();
            match link.try_enqueue_message(fragments) {
                Ok(()) => {}
                Err(LinkError::ChannelClosed) => {
                    tracing::error!("link task gone, stopping sampler");
                    break 'sampling;
                }
                Err(e) => tracing::warn!(seq, "message dropped: {}", e),
            }
        }
    }

    SamplerReport {
        ticks,
        encoder: encoder.stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let builder = AgentBuilder::default();
        assert_eq!(builder.config.sample_interval, DEFAULT_SAMPLE_INTERVAL);
        assert_eq!(builder.config.image_every, DEFAULT_IMAGE_EVERY);
        assert_eq!(builder.config.format, PayloadFormat::MsgPack);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Agent::builder()
            .sample_interval(Duration::from_millis(250))
            .image_every(0)
            .payload_format(PayloadFormat::Json)
            .max_retries(1)
            .channel_capacity(16)
            .shutdown_policy(ShutdownPolicy::AbandonBulk);

        assert_eq!(builder.config.sample_interval, Duration::from_millis(250));
        assert_eq!(builder.config.image_every, 0);
        assert_eq!(builder.config.format, PayloadFormat::Json);
        assert_eq!(builder.config.link.scheduler.max_retries, 1);
        assert_eq!(builder.config.link.channel_capacity, 16);
        assert_eq!(builder.config.link.shutdown, ShutdownPolicy::AbandonBulk);
    }

    #[test]
    fn test_zero_sample_interval_is_clamped() {
        let builder = Agent::builder().sample_interval(Duration::ZERO);
        assert_eq!(builder.config.sample_interval, MIN_SAMPLE_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_runs_with_zero_sample_interval() {
        use crate::source::{SyntheticThermal, SyntheticVehicle};
        use crate::transport::{SimConfig, SimRadio};

        let (tx, _rx, _control) = SimRadio::pair(SimConfig::default());
        let agent = Agent::builder()
            .sample_interval(Duration::ZERO)
            .image_every(0)
            .start(tx, SyntheticVehicle::default(), SyntheticThermal::default());

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = agent.shutdown().await.unwrap();
        assert!(report.ticks >= 1);
    }
}
