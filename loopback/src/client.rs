use std::net::SocketAddr;

use shared::{
    affinity::SchedBinder,
    compute::Workload,
    config::DriverConfig,
    driver::{self, DriverReport},
    error::SetupError,
};

use crate::setup::Setup;

pub fn connect_to_server(
    setup: &Setup,
    target: SocketAddr,
    workload: &Workload<f32>,
) -> Result<DriverReport<f32>, SetupError> {
    let mut config = DriverConfig::new(target);
    config.workers = setup.workers;
    config.heads = setup.heads;
    config.iterations = setup.iterations;
    config.warmup = setup.warmup;
    config.payload_size = setup.payload_size;
    config.trigger = setup.trigger;
    config.mode = setup.mode;
    config.direction = setup.direction;
    config.shape = setup.shape;

    let links = driver::connect_links(&config)?;
    driver::run(&config, workload, &links, &SchedBinder)
}
