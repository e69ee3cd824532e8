//! Integration tests for the sensing pipeline and control loop
//!
//! Full path: raw sample -> heading -> classifier -> debounce -> queue -> transport,
//! with fake hardware and network collaborators.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use compass_relay::config::PipelineConfig;
use compass_relay::drivers::{MagSensor, SensorError};
use compass_relay::events::{Direction, RawSample};
use compass_relay::heading::HeadingCalibration;
use compass_relay::network::{Connectivity, UpdateService};
use compass_relay::queue::SendOutcome;
use compass_relay::tasks::compass::{ControlLoop, Pipeline};
use compass_relay::transport::{Transport, TransportError};
use pretty_assertions::assert_eq;

const TICK: Duration = Duration::from_millis(120);

/// Sample whose corrected, uncalibrated bearing is `deg`.
fn sample_at(deg: f64) -> RawSample {
    let r = 1000.0;
    let (s, c) = deg.to_radians().sin_cos();
    RawSample {
        x: (r * c).round() as i16,
        y: (r * s).round() as i16,
        z: 300,
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        calibration: HeadingCalibration::IDENTITY,
        ..PipelineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct ScriptedSensor {
    samples: VecDeque<Result<RawSample, SensorError>>,
    fallback: RawSample,
}

impl ScriptedSensor {
    fn steady(deg: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            fallback: sample_at(deg),
        }
    }
}

impl MagSensor for ScriptedSensor {
    fn read_stable(&mut self) -> Result<RawSample, SensorError> {
        self.samples.pop_front().unwrap_or(Ok(self.fallback))
    }
}

#[derive(Default)]
struct RecordingTransport {
    calls: Vec<Direction>,
    failures_left: usize,
}

impl Transport for RecordingTransport {
    fn send(&mut self, direction: Direction) -> Result<u16, TransportError> {
        self.calls.push(direction);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(TransportError::Status(503));
        }
        Ok(200)
    }
}

#[derive(Clone, Default)]
struct Link {
    state: Rc<RefCell<LinkState>>,
}

#[derive(Default)]
struct LinkState {
    down: bool,
    no_access_point: bool,
    reconnects: usize,
    updates: usize,
}

impl Connectivity for Link {
    fn is_connected(&mut self) -> bool {
        !self.state.borrow().down
    }

    fn reconnect(&mut self) -> anyhow::Result<()> {
        let mut s = self.state.borrow_mut();
        s.reconnects += 1;
        if s.no_access_point {
            anyhow::bail!("no access point in range");
        }
        s.down = false;
        Ok(())
    }
}

impl UpdateService for Link {
    fn check_and_update(&mut self) {
        self.state.borrow_mut().updates += 1;
    }
}

type Loop = ControlLoop<ScriptedSensor, RecordingTransport, Link, Link>;

fn control(sensor: ScriptedSensor, start: Instant) -> (Loop, Link) {
    let link = Link::default();
    let ctl = ControlLoop::new(
        Pipeline::new(&config()),
        sensor,
        RecordingTransport::default(),
        link.clone(),
        link.clone(),
        start,
    );
    (ctl, link)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[test]
fn steady_east_produces_exactly_one_send() {
    let mut pipeline = Pipeline::new(&config());
    let mut transport = RecordingTransport::default();
    let mut now = Instant::now();

    for _ in 0..30 {
        now += TICK;
        pipeline.process(sample_at(90.0), now);
        pipeline.drain(&mut transport, now);
    }

    assert_eq!(transport.calls, vec![Direction::East]);
    assert!(pipeline.queue().pending().is_none());
}

#[test]
fn fire_happens_on_fifth_tick() {
    let mut pipeline = Pipeline::new(&config());
    let now = Instant::now();

    let fired: Vec<Option<Direction>> = (1..=6u32)
        .map(|i| pipeline.process(sample_at(90.0), now + TICK * i).armer.fire)
        .collect();
    assert_eq!(fired, vec![None, None, None, None, Some(Direction::East), None]);
}

#[test]
fn calibration_rotates_bearing_before_classification() {
    // raw magnetic bearing 241° with north at 151° reads as east
    let mut cfg = config();
    cfg.calibration = HeadingCalibration {
        x_offset: 0.0,
        y_offset: 0.0,
        north_deg_raw: 151.0,
    };
    let mut pipeline = Pipeline::new(&cfg);
    let report = pipeline.process(sample_at(241.0), Instant::now());

    assert_eq!(report.classification.direction, Some(Direction::East));
    assert!(report.classification.distance < 0.1);
}

#[test]
fn turning_to_a_new_target_fires_again() {
    let mut pipeline = Pipeline::new(&config());
    let mut transport = RecordingTransport::default();
    let mut now = Instant::now();

    let mut run =
        |deg: f64, ticks: usize, pipeline: &mut Pipeline, transport: &mut RecordingTransport| {
        for _ in 0..ticks {
            now += TICK;
            pipeline.process(sample_at(deg), now);
            pipeline.drain(transport, now);
        }
    };

    run(90.0, 10, &mut pipeline, &mut transport);
    run(180.0, 40, &mut pipeline, &mut transport);

    assert_eq!(transport.calls, vec![Direction::East, Direction::South]);
}

#[test]
fn jitter_at_window_edge_does_not_chatter() {
    let mut pipeline = Pipeline::new(&config());
    let mut transport = RecordingTransport::default();
    let mut now = Instant::now();

    // settle on east, then wobble around the 22° window edge
    for i in 0..200 {
        now += TICK;
        let deg = if i < 20 { 90.0 } else if i % 2 == 0 { 90.0 + 20.0 } else { 90.0 + 30.0 };
        pipeline.process(sample_at(deg), now);
        pipeline.drain(&mut transport, now);
    }

    assert_eq!(transport.calls, vec![Direction::East]);
    assert!(!pipeline.armer().is_armed());
}

#[test]
fn failed_send_is_retried_then_delivered() {
    let mut pipeline = Pipeline::new(&config());
    let mut transport = RecordingTransport {
        failures_left: 2,
        ..Default::default()
    };
    let mut now = Instant::now();
    let mut outcomes = Vec::new();

    for _ in 0..30 {
        now += TICK;
        pipeline.process(sample_at(90.0), now);
        match pipeline.drain(&mut transport, now) {
            SendOutcome::Idle | SendOutcome::Throttled => {}
            other => outcomes.push(other),
        }
    }

    assert_eq!(transport.calls, vec![Direction::East; 3]);
    assert!(matches!(outcomes[0], SendOutcome::Failed { retained: true, .. }));
    assert!(matches!(outcomes[2], SendOutcome::Sent { direction: Direction::East, .. }));
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

#[test]
fn control_loop_end_to_end() {
    let start = Instant::now();
    let (mut ctl, _) = control(ScriptedSensor::steady(90.0), start);

    for i in 1..=20u32 {
        ctl.run_cycle(start + TICK * i).expect("cycle");
    }
    assert_eq!(ctl.transport().calls, vec![Direction::East]);
}

#[test]
fn sensor_failure_skips_the_tick() {
    let start = Instant::now();
    let mut sensor = ScriptedSensor::steady(90.0);
    sensor.samples.push_back(Ok(sample_at(90.0)));
    sensor.samples.push_back(Err(SensorError::Unstable { attempts: 12 }));
    let (mut ctl, _) = control(sensor, start);

    assert!(ctl.run_cycle(start + TICK).is_ok());
    let err = ctl.run_cycle(start + TICK * 2).unwrap_err();
    assert!(err.to_string().contains("stable read"));

    // the failed tick neither counted toward stability nor reset it
    let report = ctl.run_cycle(start + TICK * 3).expect("cycle");
    assert_eq!(ctl.pipeline().armer().stability().run_length, 2);
    assert_eq!(report.tick.classification.direction, Some(Direction::East));
}

#[test]
fn lost_link_is_reconnected_on_the_liveness_interval() {
    let start = Instant::now();
    let (mut ctl, link) = control(ScriptedSensor::steady(0.0), start);
    link.state.borrow_mut().down = true;

    ctl.run_cycle(start + Duration::from_secs(5)).unwrap();
    assert_eq!(link.state.borrow().reconnects, 0);

    ctl.run_cycle(start + Duration::from_secs(10)).unwrap();
    assert_eq!(link.state.borrow().reconnects, 1);
    assert!(!link.state.borrow().down);
}

#[test]
fn update_check_runs_hourly_and_only_online() {
    let start = Instant::now();
    let (mut ctl, link) = control(ScriptedSensor::steady(0.0), start);

    ctl.run_cycle(start + Duration::from_secs(3600)).unwrap();
    assert_eq!(link.state.borrow().updates, 0);

    ctl.run_cycle(start + Duration::from_secs(3601)).unwrap();
    assert_eq!(link.state.borrow().updates, 1);

    // offline at the next due check (reconnect fails too): skipped
    {
        let mut s = link.state.borrow_mut();
        s.down = true;
        s.no_access_point = true;
    }
    ctl.run_cycle(start + Duration::from_secs(7202)).unwrap();
    assert_eq!(link.state.borrow().updates, 1);
    assert_eq!(link.state.borrow().reconnects, 1);

    // back online: the timer restarted at 7202, so 7203 is not due yet
    link.state.borrow_mut().down = false;
    ctl.run_cycle(start + Duration::from_secs(7203)).unwrap();
    assert_eq!(link.state.borrow().updates, 1);
}
