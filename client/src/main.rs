use std::{fmt::Display, process::ExitCode};

use clap::Parser;
use shared::{
    affinity::{online_cores, SchedBinder},
    compute::{Element, Precision, Workload},
    config::{ComputeShape, DriverConfig},
    driver::{self, DriverReport},
    error::SetupError,
    trigger::TriggerPoint,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::command_line::GlobalArgs;

mod command_line;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = GlobalArgs::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "driver aborted");
            ExitCode::FAILURE
        }
    }
}

fn run(args: GlobalArgs) -> Result<(), SetupError> {
    let target = driver::resolve_target(&args.target)?;

    let mut config = DriverConfig::new(target);
    config.workers = args.workers;
    config.heads = args.heads;
    config.iterations = args.iterations;
    config.warmup = args.warmup;
    config.payload_size = args.payload_size;
    config.trigger = if args.no_trigger {
        TriggerPoint::Disabled
    } else {
        args.trigger
    };
    config.mode = args.mode;
    config.direction = args.direction;
    config.remainder = args.remainder;
    config.precision = args.precision;
    config.compute_core_base = args.compute_core_base;
    config.transmit_core_base = args.transmit_core_base;
    config.shape = ComputeShape {
        rows: args.rows,
        cols: args.cols,
        b_cols: args.b_cols,
    };
    config.validate()?;

    println!("Server: {}", config.target);
    println!("Number of available cores: {:?}", online_cores());

    let links = driver::connect_links(&config)?;

    match config.precision {
        Precision::Fp32 => execute::<f32>(&config, &links),
        Precision::Int8 => execute::<i8>(&config, &links),
    }
}

fn execute<T: Element>(
    config: &DriverConfig,
    links: &[Option<std::net::TcpStream>],
) -> Result<(), SetupError> {
    let workload = Workload::<T>::random(config.shape, &mut rand::thread_rng());
    let report = driver::run(config, &workload, links, &SchedBinder)?;
    print_report(config, &report);
    Ok(())
}

fn print_report<A: Display>(config: &DriverConfig, report: &DriverReport<A>) {
    for worker in &report.workers {
        let sent: usize = worker.transmissions.iter().map(|t| t.bytes()).sum();
        println!(
            "Thread {} rows [{}, {}) core {} (pinned: {}, running on {:?}), {} transmissions / {} bytes, {} launch failures",
            worker.worker_id(),
            worker.partition.start,
            worker.partition.end,
            worker.compute_core,
            worker.pinned,
            worker.cpu,
            worker.transmissions.len(),
            sent,
            worker.launch_failures,
        );
    }

    match report.summary.mean {
        Some(mean) => println!(
            "Average iteration time over {} iterations ({} warmup skipped, trigger {}, mode {}): {} us",
            report.summary.measured(),
            report.summary.warmup,
            config.trigger,
            config.mode,
            mean.as_micros()
        ),
        None => println!(
            "No iterations left after {} warmup iterations",
            report.summary.warmup
        ),
    }

    println!("First 10 results of matrix C:");
    let head: Vec<String> = report.output.iter().take(10).map(|v| v.to_string()).collect();
    println!("{}", head.join(" "));
}
