use std::{panic::resume_unwind, process::ExitCode, thread};

use shared::{
    compute::Workload,
    config::ComputeShape,
    error::SetupError,
    transmit::{TransmitDirection, TransmitMode},
    trigger::TriggerPoint,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::setup::Setup;

mod client;
mod server;
mod setup;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let base = Setup {
        workers: 4,
        heads: 1,
        iterations: 20,
        warmup: 10,
        payload_size: 1024,
        trigger: TriggerPoint::MIDPOINT,
        mode: TransmitMode::OneShot,
        direction: TransmitDirection::Send,
        shape: ComputeShape::default(),
    };

    let workload = Workload::<f32>::random(base.shape, &mut rand::thread_rng());

    let runs = [
        ("baseline", Setup {
            trigger: TriggerPoint::Disabled,
            ..base
        }),
        ("oneshot", base),
        ("pooled", Setup {
            mode: TransmitMode::Pooled,
            ..base
        }),
    ];

    for (name, setup) in runs {
        match experiment(&setup, &workload) {
            Ok(Some(mean)) => println!("{}: average iteration time {} us", name, mean),
            Ok(None) => println!("{}: no iterations past warmup", name),
            Err(err) => {
                error!(%err, name, "loopback experiment failed");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn experiment(setup: &Setup, workload: &Workload<f32>) -> Result<Option<u128>, SetupError> {
    if !setup.trigger.is_enabled() {
        let target = ([127, 0, 0, 1], 0).into();
        let report = client::connect_to_server(setup, target, workload)?;
        return Ok(report.summary.mean.map(|mean| mean.as_micros()));
    }

    let (sink, target) = server::bind(setup)?;

    thread::scope(|s| {
        let sink_thread = s.spawn(move || server::serve(sink));
        let driver = client::connect_to_server(setup, target, workload);
        if let Err(err) = &driver {
            error!(%err, "driver failed, releasing the sink");
            server::release(target, setup.heads);
        }

        let sink_report = match sink_thread.join() {
            Ok(report) => report,
            Err(panic) => resume_unwind(panic),
        };
        let driver = driver?;
        let sink_report = sink_report?;
        println!(
            "sink moved {} bytes over {} calls",
            sink_report.total_bytes(),
            sink_report.calls().count()
        );

        Ok(driver.summary.mean.map(|mean| mean.as_micros()))
    })
}
