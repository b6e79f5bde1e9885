use std::net::{Ipv4Addr, SocketAddr, TcpStream};

use shared::{
    config::{SinkConfig, SinkMode},
    error::SetupError,
    sink::{Sink, SinkReport},
    transmit::TransmitDirection,
};

use crate::setup::Setup;

/// Binds a sink on an ephemeral port sized to match `setup`.
pub fn bind(setup: &Setup) -> Result<(Sink, SocketAddr), SetupError> {
    let config = SinkConfig {
        port: 0,
        payload_size: setup.payload_size,
        iterations: setup.iterations,
        clients: setup.heads,
        mode: match setup.direction {
            TransmitDirection::Send => SinkMode::Read,
            TransmitDirection::Receive => SinkMode::Write,
            TransmitDirection::Exchange => SinkMode::Echo,
        },
    };

    let sink = Sink::bind(config)?;
    let port = sink.local_addr().map_or(0, |addr| addr.port());

    Ok((sink, SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)))
}

pub fn serve(mut sink: Sink) -> Result<SinkReport, SetupError> {
    sink.accept_clients()?;
    let report = sink.serve();
    sink.close();
    report
}

/// Fills the sink's remaining accept slots with connections that close at
/// once, so a sink still waiting on a failed driver reaches its serve step.
pub fn release(target: SocketAddr, clients: usize) {
    for _ in 0..clients {
        if TcpStream::connect(target).is_err() {
            break;
        }
    }
}
