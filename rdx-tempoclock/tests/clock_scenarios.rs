use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempoclock::prelude::*;

fn manual_engine() -> (ManualTime, TempoEngine) {
    let time = ManualTime::default();
    let config = EngineConfig {
        latency: LatencyHint::Custom { lookahead: 0.0 },
        clock: ClockConfig {
            frequency: 2.0,
            ..ClockConfig::default()
        },
    };
    (time.clone(), TempoEngine::with_time_source(config, Arc::new(time)))
}

#[test]
fn late_pulses_deliver_every_tick_once() {
    let (time, engine) = manual_engine();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let id = engine
        .create_clock(move |t, tick| {
            sink.lock().unwrap().push((t, tick));
            Ok(())
        })
        .unwrap();
    engine.with_clock(id, |clock| clock.start(0.0, None)).unwrap().unwrap();

    for now in [0.0, 0.3, 1.2] {
        time.set(now);
        engine.pulse().unwrap();
    }
    assert_eq!(*fired.lock().unwrap(), vec![(0.0, 0), (0.5, 1), (1.0, 2)]);
}

#[test]
fn pulses_near_boundaries_never_repeat_a_tick() {
    let (time, engine) = manual_engine();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let id = engine
        .create_clock(move |_, tick| {
            sink.lock().unwrap().push(tick);
            Ok(())
        })
        .unwrap();
    engine.with_clock(id, |clock| clock.start(0.0, None)).unwrap().unwrap();

    for now in [0.5, 0.500_000_1, 1.0, 1.000_000_2, 2.6] {
        time.set(now);
        engine.pulse().unwrap();
    }
    assert_eq!(*fired.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn faulting_callback_does_not_swallow_a_stop() {
    let (time, engine) = manual_engine();
    let id = engine
        .create_clock(|_, tick| match tick {
            1 => Err(anyhow::anyhow!("rejected")),
            _ => Ok(()),
        })
        .unwrap();
    let stops = Arc::new(Mutex::new(Vec::new()));
    let sink = stops.clone();
    engine
        .with_clock(id, |clock| {
            clock.on(ClockEventKind::Stop, move |event| {
                sink.lock().unwrap().push(event.time());
            });
            clock.start(0.0, None)?;
            clock.stop(1.0)
        })
        .unwrap()
        .unwrap();

    time.set(2.0);
    assert!(matches!(engine.pulse(), Err(ClockError::Callback { .. })));
    time.set(3.0);
    engine.pulse().unwrap();
    assert_eq!(*stops.lock().unwrap(), vec![1.0]);
}

#[test]
fn restart_after_stop_counts_from_zero() {
    let mut source = TickSource::new(1.0, RateUnits::Hertz).unwrap();
    source.start(0.0, None).unwrap();
    source.stop(5.0).unwrap();
    source.start(10.0, None).unwrap();
    assert_eq!(source.get_ticks_at_time(10.0), 0.0);
}

#[test]
fn pause_freezes_the_count() {
    let mut source = TickSource::new(1.0, RateUnits::Hertz).unwrap();
    source.start(0.0, None).unwrap();
    source.pause(3.0).unwrap();
    for x in [3.0, 4.25, 9.0] {
        assert_eq!(source.get_ticks_at_time(x), 3.0);
    }
}

#[test]
fn tempo_ramp_tick_times_satisfy_the_integral() {
    let mut rate = TickAccumulator::new(1.0, RateUnits::Hertz).unwrap();
    rate.schedule(10.0, RateChange::LinearRamp(2.0)).unwrap();

    let t = rate.get_time_of_tick(15.0);
    assert!((0.5 * (1.0 + (1.0 + t / 10.0)) * t - 15.0).abs() < 1e-9);
    for tick in [1.0, 4.0, 9.5, 12.0] {
        let t = rate.get_time_of_tick(tick);
        assert!((0.5 * (1.0 + (1.0 + t / 10.0)) * t - tick).abs() < 1e-9);
    }
}

#[test]
fn interval_lookup_prefers_latest_start() {
    let mut tree = IntervalTree::new();
    tree.add(1.0, 2.0, "first").unwrap();
    tree.add(2.0, 1.0, "second").unwrap();
    tree.add(5.0, 1.0, "third").unwrap();

    assert_eq!(tree.get(1.5).map(|e| e.payload), Some("first"));
    // both cover 2.5; the interval that started last is the one in effect
    assert_eq!(tree.get(2.5).map(|e| e.payload), Some("second"));
    assert!(tree.get(6.0).is_none());
}

#[test]
fn bpm_clock_ticks_at_ppq_resolution() {
    let time = ManualTime::default();
    let options = ClockOptions {
        frequency: 120.0,
        units: RateUnits::Bpm { ppq: 2 },
        ..ClockOptions::default()
    };
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let mut clock = Clock::with_callback(Arc::new(time.clone()), options, move |t, _| {
        sink.lock().unwrap().push(t);
        Ok(())
    })
    .unwrap();
    clock.start(0.0, None).unwrap();
    time.set(1.0);
    clock.pulse().unwrap();
    assert_eq!(*fired.lock().unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
}

#[test]
fn stop_event_is_the_last_thing_delivered() {
    let (time, engine) = manual_engine();
    let log = Arc::new(Mutex::new(Vec::new()));
    let ticks = log.clone();
    let id = engine
        .create_clock(move |t, _| {
            ticks.lock().unwrap().push(format!("tick {t}"));
            Ok(())
        })
        .unwrap();
    let events = log.clone();
    engine
        .with_clock(id, |clock| {
            clock.on(ClockEventKind::Stop, move |event| {
                events.lock().unwrap().push(format!("stop {}", event.time()));
            });
            clock.start(0.0, None)?;
            clock.stop(1.0)
        })
        .unwrap()
        .unwrap();

    let mut driver = ManualDriver::default();
    engine.attach(&mut driver);
    driver.advance(&time, Duration::from_secs(2));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["tick 0", "tick 0.5", "stop 1"]
    );
}
