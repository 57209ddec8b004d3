//! Record/Replay Demo
//!
//! Publishes a few sensor topics on an in-process bus, records them into a
//! log file, then replays the log at the rate held in a parameter registry,
//! skipping its first quarter second.
//!
//! Usage: `record_replay [LOG_PATH]` (defaults to a file in the temp dir).
//! Set `RUST_LOG=debug` for more detail.

use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracklog_core::{duration_to_nanos, nanos_to_duration, Bus, Callback, MemoryBus, RawMessage};
use tracklog_journal::{Playback, PlaybackConfig, Recorder};
use tracklog_params::{ParameterValue, ParametersClient, ParametersInterface, ParametersRegistry};

const TOPICS: [(&str, &str); 3] = [
    ("/sensors/imu", "msgs.IMU"),
    ("/sensors/gps", "msgs.NavSat"),
    ("/cmd_vel", "msgs.Twist"),
];

/// Wall-clock length of a log whose records run from `first` to `last`
fn log_span(first: i64, last: i64) -> Duration {
    nanos_to_duration(last.saturating_sub(first))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("record_replay.tlog"));
    if path.exists() {
        std::fs::remove_file(&path)?;
    }

    println!("=== Tracklog Record/Replay Demo ===\n");

    let bus = Arc::new(MemoryBus::new());
    for (topic, type_name) in TOPICS {
        bus.advertise(topic, type_name)?;
    }

    // Replay settings live in a parameter registry
    let registry = ParametersRegistry::new("/demo");
    registry.serve(bus.as_ref())?;
    let params = ParametersClient::new(bus.clone(), "/demo");
    params.declare_parameter("playback_rate", ParameterValue::encode("Double", &2.0f64)?)?;

    // Record the sensor topics only
    let mut recorder = Recorder::open(&path, bus.clone())?;
    let selected = recorder.add_topic_pattern(&Regex::new("/sensors/.*")?);
    println!("Recording {} topics into {}", selected, path.display());
    let recording = recorder.start().ok_or("nothing to record")?;

    for i in 0u8..10 {
        for (topic, type_name) in TOPICS {
            bus.publish(&RawMessage::new(topic, type_name, vec![i]))?;
        }
        thread::sleep(Duration::from_millis(50));
    }
    recording.stop();
    let stats = recording.stats();
    println!(
        "Recorded {} messages ({} write failures)\n",
        stats.messages_recorded, stats.write_failures
    );
    drop(recording);
    drop(recorder);

    // Replay everything that was logged
    let replay_bus = Arc::new(MemoryBus::new());
    let delivered = replay_bus.clone();
    let received = Arc::new(Mutex::new(Vec::new()));
    for (topic, _) in TOPICS {
        let sink = received.clone();
        let callback: Callback = Arc::new(move |msg: &RawMessage| {
            if let Ok(mut sink) = sink.lock() {
                sink.push((Instant::now(), msg.topic.clone()));
            }
        });
        replay_bus.subscribe(topic, callback)?;
    }

    let rate: f64 = params.parameter_as("playback_rate")?;
    let mut playback = Playback::open(&path, replay_bus)?
        .with_config(PlaybackConfig::default().with_rate(rate));
    println!(
        "Log holds {} topics, {} messages",
        playback.store().topics()?.len(),
        playback.store().message_count()?
    );
    playback.add_topic_pattern(&Regex::new(".*")?);
    let bounds = playback.store().time_bounds(playback.selection().selection())?;
    if let Some((first, last)) = bounds {
        println!("Log spans {:?}", log_span(first, last));
    }

    let started = Instant::now();
    let session = playback.start().ok_or("nothing to play")?;
    info!(rate, "replaying");

    // Skip the first quarter second of the log
    if let Some((first, _)) = bounds {
        let skip = duration_to_nanos(Duration::from_millis(250));
        session.seek(first.saturating_add(skip));
    }
    session.wait_until_finished(Duration::from_secs(30));
    let stats = session.stats();
    drop(session);

    println!(
        "Replayed {} messages at {}x in {:?} ({} deliveries)",
        stats.published,
        rate,
        started.elapsed(),
        delivered.delivered_count()
    );
    if let Ok(received) = received.lock() {
        for (at, topic) in received.iter().take(4) {
            println!("  +{:>6.1?}  {}", at.duration_since(started), topic);
        }
        if received.len() > 4 {
            println!("  ... {} more", received.len() - 4);
        }
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
