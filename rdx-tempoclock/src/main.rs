use anyhow::Result;
use colored::Colorize;
use tempoclock::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ticks per beat in the demo.
const PPQ: u32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration; a missing file falls back to the defaults.
    let mut config = EngineConfig::load("tempoclock.toml")?;
    config.clock.units = RateUnits::Bpm { ppq: PPQ };
    config.clock.frequency = 90.0;

    // 3. Create the engine.
    let engine = TempoEngine::new(config);

    // 4. Listen to engine-level events.
    spawn_system_listener(&engine);

    // 5. Register a clock that accelerates from 90 to 180 bpm.
    register_demo_clock(&engine)?;

    // 6. Run the engine. It will shut down on Ctrl+C.
    engine.run().await?;

    Ok(())
}

fn spawn_system_listener(engine: &TempoEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });
}

fn register_demo_clock(engine: &TempoEngine) -> Result<()> {
    let id = engine.create_clock(|time, tick| {
        let beat = tick / u64::from(PPQ);
        if tick % u64::from(PPQ) == 0 {
            println!("{} beat {:>4} at {:>8.3}s", "●".green().bold(), beat, time);
        } else {
            println!("{} tick {:>4} at {:>8.3}s", "·".dimmed(), tick, time);
        }
        Ok(())
    })?;

    engine
        .with_clock(id, |clock| -> Result<()> {
            clock.on_any(|event| info!("[CLOCK] => {:?}", event));
            let start = clock.now();
            clock.start(start, None)?;
            clock.rate_mut().ramp_to(180.0, 20.0, start)?;
            clock.pause(start + 30.0)?;
            clock.start(start + 32.0, None)?;
            Ok(())
        })
        .unwrap_or(Ok(()))
}
