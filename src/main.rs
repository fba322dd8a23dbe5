//! s7broker - poll an S7 data block and print decoded values
//!
//! Usage:
//!   s7broker check                 Validate the schema, print the window
//!   s7broker replay --log <PATH>   Replay a recorded frame log
//!   s7broker simulate              Poll an in-memory data block
//!
//! Ctrl-C stops the broker; the process exits once the consumer has ended.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use s7_broker::broker::{Broker, BrokerOptions};
use s7_broker::broker::BrokerStats;
use s7_broker::config::{self, Config, ConsumerConfig, ConsumerFormat};
use s7_broker::constants::STATUS_INTERVAL_SECS;
use s7_broker::consumer::{run_consumer, JsonLinesSink, SnapshotSink, TableSink};
use s7_broker::link::{MemoryLink, MemoryLinkControl};
use s7_broker::logging;
use s7_broker::schema::{self, compute_window, DataType, Schema};
use s7_broker::source::{FrameSource, LiveFrameSource, ReplayFrameSource};
use s7_broker::{BrokerError, Result};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut config = Config::load(&config_path)?;
    if let Some(path) = cli.schema {
        config.schema.path = path;
    }
    if cli.json {
        config.consumer.format = ConsumerFormat::Json;
    }
    config.validate()?;

    let schema = schema::file::load(&config.schema.path)?;
    info!(
        "Loaded {} fields from {}",
        schema.len(),
        config.schema.path.display()
    );

    match cli.command {
        Command::Check => {
            check(&schema)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Replay { log, interval } => {
            if let Some(ms) = interval {
                config.replay.interval_ms = ms;
                config.validate()?;
            }
            let log = log
                .or_else(|| config.replay.log_path.clone())
                .ok_or_else(|| BrokerError::ConfigValidation {
                    field: "replay.log_path",
                    reason: "no frame log given (set it in the config or use --log)".into(),
                })?;

            let mut options = BrokerOptions::from(&config.broker);
            options.poll_interval = Duration::from_millis(config.replay.interval_ms);
            // Never append a replay to a frame log
            options.record_path = None;

            let runtime = runtime()?;
            serve(
                &runtime,
                ReplayFrameSource::new(log),
                schema,
                options,
                &config.consumer,
                None,
            )
        }
        Command::Simulate { duration } => {
            config.validate_link()?;
            info!(
                "Simulating DB{} of {} (rack {}, slot {})",
                config.link.db_number,
                config.link.endpoint(),
                config.link.rack,
                config.link.slot
            );

            let link = MemoryLink::new(demo_image(&schema, 0)?);
            let control = link.control();
            let schema_for_ticks = Arc::new(schema.clone());
            let source = LiveFrameSource::new(link, config.link.endpoint());

            let runtime = runtime()?;
            let ticker = runtime.spawn(animate(
                control,
                schema_for_ticks,
                Duration::from_millis(config.broker.poll_interval_ms),
            ));
            let code = serve(
                &runtime,
                source,
                schema,
                BrokerOptions::from(&config.broker),
                &config.consumer,
                duration.map(Duration::from_secs),
            );
            ticker.abort();
            code
        }
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BrokerError::Runtime { source: e })
}

// =============================================================================
// Commands
// =============================================================================

fn check(schema: &Schema) -> Result<()> {
    let window = compute_window(schema)?;

    println!("{} fields, {}", schema.len(), window);
    for field in schema.fields() {
        let offset = match field.data_type {
            DataType::Bool => field.offset.to_string(),
            _ => field.offset.byte().to_string(),
        };
        println!("  {:<24} {:<5} {}", field.name, field.data_type.s7_name(), offset);
    }
    Ok(())
}

/// Run a broker and the bundled consumer until one of them ends
///
/// Ends on Ctrl-C, after `duration`, on broker termination or when the
/// consumer times out.
fn serve<S: FrameSource>(
    runtime: &Runtime,
    source: S,
    schema: Schema,
    options: BrokerOptions,
    consumer: &ConsumerConfig,
    duration: Option<Duration>,
) -> Result<ExitCode> {
    let mut broker = Broker::new(source, schema, options)?;
    info!("Polling {}", broker.window());
    let queue = broker.subscribe();
    let handle = broker.spawn()?;

    let timeout = consumer.timeout();
    let format = consumer.format;

    let status = runtime.spawn(report_status(handle.stats().clone()));

    let code = runtime.block_on(async move {
        let mut consumer = tokio::task::spawn_blocking(move || {
            let mut sink: Box<dyn SnapshotSink + Send> = match format {
                ConsumerFormat::Table => Box::new(TableSink::stdout()),
                ConsumerFormat::Json => Box::new(JsonLinesSink::stdout()),
            };
            run_consumer(&queue, timeout, &mut sink)
        });

        let deadline = async move {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let finished = tokio::select! {
            res = &mut consumer => Some(res),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping broker");
                None
            }
            _ = deadline => {
                info!("Run time elapsed, stopping broker");
                None
            }
        };

        handle.stop();
        let exit = match finished {
            Some(res) => res,
            None => consumer.await,
        };
        let stats = handle.stats().clone();
        let reason = tokio::task::spawn_blocking(move || handle.join())
            .await
            .ok()
            .flatten();

        info!(
            "Frames: {} read ({:.1}/s), {} published, {} read failures, {} reconnect attempts, {} evicted",
            stats.frames_read(),
            stats.update_rate(),
            stats.snapshots_published(),
            stats.read_failures(),
            stats.reconnect_attempts(),
            stats.evicted()
        );

        match (exit, reason) {
            (Ok(_), Some(reason)) if !reason.is_failure() => Ok(ExitCode::SUCCESS),
            (Ok(_), Some(reason)) => {
                warn!("Broker ended: {}", reason);
                Ok(ExitCode::FAILURE)
            }
            (Err(e), _) => {
                error!("Consumer task failed: {}", e);
                Ok(ExitCode::FAILURE)
            }
            (Ok(_), None) => {
                error!("Broker thread panicked");
                Ok(ExitCode::FAILURE)
            }
        }
    });
    status.abort();
    code
}

/// Log the frame rate and counters periodically
async fn report_status(stats: Arc<BrokerStats>) {
    let mut interval = tokio::time::interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    // First tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        debug!(
            "{:.1} frames/s, {} published, {} evicted",
            stats.update_rate(),
            stats.snapshots_published(),
            stats.evicted()
        );
    }
}

// =============================================================================
// Simulation
// =============================================================================

/// Data block image with a changing value in every field
fn demo_image(schema: &Schema, tick: u32) -> Result<Vec<u8>> {
    let window = compute_window(schema)?;
    let mut image = vec![0u8; window.end()];

    for (i, field) in schema.fields().iter().enumerate() {
        let at = field.offset.byte();
        let seed = (i as u32).wrapping_add(tick);
        match field.data_type {
            DataType::Int16 => {
                let value = (seed % 100) as i16;
                image[at..at + 2].copy_from_slice(&value.to_be_bytes());
            }
            DataType::Real32 => {
                let value = 10.0 + (seed % 50) as f32 * 0.5;
                image[at..at + 4].copy_from_slice(&value.to_be_bytes());
            }
            DataType::Bool => {
                let bit = field.offset.bit();
                if bit <= 7 && seed % 2 == 0 {
                    image[at] |= 1 << bit;
                }
            }
        }
    }
    Ok(image)
}

/// Refresh the simulated data block once per poll interval
async fn animate(control: MemoryLinkControl, schema: Arc<Schema>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    let mut tick = 0u32;
    loop {
        interval.tick().await;
        match demo_image(&schema, tick) {
            Ok(image) => control.set_image(image),
            Err(e) => {
                warn!("Simulation stopped: {}", e);
                return;
            }
        }
        tick = tick.wrapping_add(1);
    }
}
