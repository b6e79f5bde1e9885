use std::process::ExitCode;

use clap::Parser;
use shared::{
    config::SinkConfig,
    sink::{Sink, SinkReport},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::command_line::GlobalArgs;

mod command_line;

pub fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = GlobalArgs::parse();

    let config = SinkConfig {
        port: args.port,
        payload_size: args.payload_size,
        iterations: args.iterations,
        clients: args.clients,
        mode: args.mode,
    };

    match Sink::run(config) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "sink aborted");
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &SinkReport) {
    for total in &report.iterations {
        println!(
            "iteration {} : {} bytes, interval = {}us",
            total.iteration,
            total.bytes,
            total.elapsed.as_micros()
        );
    }

    let calls = report.calls().count();
    let sum: u128 = report.iterations.iter().map(|t| t.elapsed.as_micros()).sum();
    println!(
        "{} bytes over {} calls, {}us total",
        report.total_bytes(),
        calls,
        sum
    );
    println!("Connection closed");
}
