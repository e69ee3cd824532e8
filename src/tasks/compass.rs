// Compass Relay - Compass Task
//
// The single control loop.  Every ~120 ms it reads the magnetometer, runs the
// heading -> classification -> debounce chain, and gives the event queue a
// chance to send.  Wi-Fi liveness and self-update checks are interleaved on
// their own wall-clock intervals, so a slow network call stalls sensing for
// its duration and nothing else.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::classifier::DirectionClassifier;
use crate::config::*;
use crate::debounce::{ArmerConfig, ArmerOutcome, DebounceArmer};
use crate::drivers::MagSensor;
use crate::events::{Bearing, Classification, RawSample};
use crate::heading::HeadingEstimator;
use crate::network::{Connectivity, UpdateService};
use crate::queue::{EventQueue, SendOutcome};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// Sensing pipeline (no I/O)
// ---------------------------------------------------------------------------

/// What the pipeline made of one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub bearing: Bearing,
    pub classification: Classification,
    pub armer: ArmerOutcome,
}

pub struct Pipeline {
    estimator: HeadingEstimator,
    classifier: DirectionClassifier,
    armer: DebounceArmer,
    queue: EventQueue,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            estimator: HeadingEstimator::new(config.calibration, config.ema_alpha),
            classifier: DirectionClassifier::cardinal(config.window_deg),
            armer: DebounceArmer::new(ArmerConfig {
                stable_count_threshold: config.stable_count_threshold,
                cooldown: config.cooldown,
                window_deg: config.window_deg,
                release_extra_deg: config.release_extra_deg,
            }),
            queue: EventQueue::new(config.send_interval, config.stale_after),
        }
    }

    pub fn armer(&self) -> &DebounceArmer {
        &self.armer
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Heading, classification and debounce for one sample; enqueues on fire.
    pub fn process(&mut self, sample: RawSample, now: Instant) -> TickReport {
        let bearing = self.estimator.update(sample);
        let classification = self.classifier.classify(bearing.smoothed);
        let armer = self.armer.update(&classification, now);

        if let Some(direction) = armer.fire {
            self.queue.enqueue(direction, now);
        }
        if armer.rearmed {
            log::info!("[ARMED] Ready");
        }

        TickReport {
            bearing,
            classification,
            armer,
        }
    }

    pub fn drain<T: Transport + ?Sized>(&mut self, transport: &mut T, now: Instant) -> SendOutcome {
        self.queue.try_send(transport, now)
    }
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CycleReport {
    pub tick: TickReport,
    pub send: SendOutcome,
}

pub struct ControlLoop<S, T, N, U> {
    pipeline: Pipeline,
    sensor: S,
    transport: T,
    link: N,
    updater: U,

    last_wifi_check: Instant,
    last_update_check: Instant,
    last_telemetry: Option<Instant>,
}

impl<S, T, N, U> ControlLoop<S, T, N, U>
where
    S: MagSensor,
    T: Transport,
    N: Connectivity,
    U: UpdateService,
{
    /// `now` counts as the time of the last Wi-Fi and update checks
    /// (boot already did both).
    pub fn new(
        pipeline: Pipeline,
        sensor: S,
        transport: T,
        link: N,
        updater: U,
        now: Instant,
    ) -> Self {
        Self {
            pipeline,
            sensor,
            transport,
            link,
            updater,
            last_wifi_check: now,
            last_update_check: now,
            last_telemetry: None,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// One loop iteration.  A sensor failure ends the tick early with `Err`;
    /// nothing is classified or sent on that tick.
    pub fn run_cycle(&mut self, now: Instant) -> anyhow::Result<CycleReport> {
        self.check_link(now);
        self.check_update(now);

        let sample = self.sensor.read_stable().context("I2C stable read failed")?;
        let tick = self.pipeline.process(sample, now);
        self.log_telemetry(&tick, now);

        let send = self.pipeline.drain(&mut self.transport, now);
        Ok(CycleReport { tick, send })
    }

    /// Run forever.  Cycle errors are logged and followed by a short pause.
    pub fn run(mut self) -> ! {
        log::info!("Main Loop Started.");
        let period = Duration::from_millis(LOOP_PERIOD_MS);

        loop {
            let tick_start = Instant::now();

            if let Err(e) = self.run_cycle(tick_start) {
                log::error!("LOOP ERR: {:#}", e);
                thread::sleep(Duration::from_millis(LOOP_ERROR_PAUSE_MS));
            }

            let elapsed = tick_start.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            }
        }
    }

    fn check_link(&mut self, now: Instant) {
        let since = now.saturating_duration_since(self.last_wifi_check);
        if since < Duration::from_millis(WIFI_CHECK_INTERVAL_MS) {
            return;
        }
        self.last_wifi_check = now;

        if !self.link.is_connected() {
            log::warn!("[WiFi] Lost! Reconnecting...");
            if let Err(e) = self.link.reconnect() {
                log::warn!("[WiFi] Reconnect failed: {:#}", e);
            }
        }
    }

    fn check_update(&mut self, now: Instant) {
        let since = now.saturating_duration_since(self.last_update_check);
        if since <= Duration::from_millis(UPDATE_INTERVAL_MS) {
            return;
        }
        self.last_update_check = now;

        if self.link.is_connected() {
            self.updater.check_and_update();
        } else {
            log::debug!("[OTA] offline, skipping update check");
        }
    }

    fn log_telemetry(&mut self, tick: &TickReport, now: Instant) {
        let due = self.last_telemetry.map_or(true, |t| {
            now.saturating_duration_since(t) > Duration::from_millis(TELEMETRY_INTERVAL_MS)
        });
        if !due || !log::log_enabled!(log::Level::Debug) {
            return;
        }
        self.last_telemetry = Some(now);

        let dir = tick
            .classification
            .direction
            .map_or("None", |d| d.name());
        log::debug!(
            "raw:{:5.1} sm:{:5.1} dir:{:5} d:{:4.1}",
            tick.bearing.raw,
            tick.bearing.smoothed,
            dir,
            tick.classification.distance
        );
    }
}
