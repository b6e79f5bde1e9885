use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    time::Duration,
};

use quanta::Clock;
use tracing::{info, warn};

use crate::{
    config::{SinkConfig, SinkMode},
    error::SetupError,
    timing::{CallTiming, Stopwatch},
    transfer::{read_all, write_all, CallContext, Transfer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Listen,
    Accepting,
    Serving,
    Closed,
}

/// Aggregate over all connections for one sink iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationTotal {
    pub iteration: usize,
    /// Payload bytes moved: received in read and echo mode, sent in write mode.
    pub bytes: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct SinkReport {
    pub iterations: Vec<IterationTotal>,
    pub transfers: Vec<Transfer>,
}

impl SinkReport {
    pub fn calls(&self) -> impl Iterator<Item = &CallTiming> {
        self.transfers.iter().flat_map(|t| t.calls.iter())
    }

    /// Bytes over every transfer, both directions of an echo included.
    pub fn total_bytes(&self) -> usize {
        self.transfers.iter().map(|t| t.transferred).sum()
    }
}

/// Passive endpoint that accepts a fixed number of clients and moves a fixed
/// number of bytes over each of them per iteration.
pub struct Sink {
    config: SinkConfig,
    listener: Option<TcpListener>,
    clients: Vec<TcpStream>,
    state: SinkState,
    clock: Clock,
}

impl Sink {
    pub fn bind(config: SinkConfig) -> Result<Self, SetupError> {
        config.validate()?;

        let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), config.port);
        let listener = TcpListener::bind(addr).map_err(|source| SetupError::Bind {
            port: config.port,
            source,
        })?;

        info!(port = config.port, "waiting for connections");

        Ok(Self {
            config,
            listener: Some(listener),
            clients: Vec::with_capacity(config.clients),
            state: SinkState::Listen,
            clock: Clock::new(),
        })
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Blocks until exactly `clients` connections are established.
    pub fn accept_clients(&mut self) -> Result<(), SetupError> {
        let listener = self.listener.as_ref().ok_or(SetupError::InsufficientPeers {
            expected: self.config.clients,
            connected: self.clients.len(),
        })?;

        self.state = SinkState::Accepting;

        while self.clients.len() < self.config.clients {
            let index = self.clients.len();
            let (stream, peer) = listener
                .accept()
                .map_err(|source| SetupError::Accept { index, source })?;

            self.clients.push(stream);
            info!(
                %peer,
                connected = self.clients.len(),
                expected = self.config.clients,
                "client connected"
            );
        }

        self.state = SinkState::Serving;
        Ok(())
    }

    /// Runs every iteration over every connection in accept order.
    ///
    /// A connection whose transfer ends early is dropped from later iterations.
    pub fn serve(&mut self) -> Result<SinkReport, SetupError> {
        if self.state != SinkState::Serving {
            return Err(SetupError::InsufficientPeers {
                expected: self.config.clients,
                connected: self.clients.len(),
            });
        }

        let SinkConfig {
            payload_size,
            iterations,
            mode,
            ..
        } = self.config;

        let mut buffer = vec![0u8; payload_size];
        let mut data = vec![0u8; payload_size];
        let mut alive = vec![true; self.clients.len()];
        let mut report = SinkReport::default();

        for iteration in 0..iterations {
            data.fill(b'A' + (iteration % 26) as u8);
            let watch = Stopwatch::start(&self.clock);
            let mut bytes = 0;

            for (connection, mut stream) in self.clients.iter().enumerate() {
                if !alive[connection] {
                    continue;
                }

                let ctx = CallContext {
                    iteration,
                    connection,
                };

                let transfers = match mode {
                    SinkMode::Read => vec![read_all(&mut stream, &mut buffer, ctx, &self.clock)],
                    SinkMode::Write => vec![write_all(&mut stream, &data, ctx, &self.clock)],
                    SinkMode::Echo => {
                        let read = read_all(&mut stream, &mut buffer, ctx, &self.clock);
                        let echoed = &buffer[..read.transferred];
                        let write = write_all(&mut stream, echoed, ctx, &self.clock);
                        vec![read, write]
                    }
                };

                // an echo moves the payload once; its write only returns it
                bytes += transfers[0].transferred;

                for transfer in transfers {
                    log_transfer(&transfer, ctx);
                    if !transfer.is_complete() {
                        alive[connection] = false;
                    }
                    report.transfers.push(transfer);
                }
            }

            let elapsed = watch.elapsed();
            info!(
                iteration,
                bytes,
                interval_us = elapsed.as_micros() as u64,
                "iteration served"
            );
            report.iterations.push(IterationTotal {
                iteration,
                bytes,
                elapsed,
            });
        }

        Ok(report)
    }

    pub fn close(&mut self) {
        self.clients.clear();
        self.listener = None;
        self.state = SinkState::Closed;
        info!("connections closed");
    }

    /// Listen, accept, serve, close.
    pub fn run(config: SinkConfig) -> Result<SinkReport, SetupError> {
        let mut sink = Sink::bind(config)?;
        sink.accept_clients()?;
        let report = sink.serve();
        sink.close();
        report
    }
}

fn log_transfer(transfer: &Transfer, ctx: CallContext) {
    for call in &transfer.calls {
        info!(
            iteration = ctx.iteration,
            connection = ctx.connection,
            call = call.call,
            bytes = call.bytes,
            interval_us = call.elapsed.as_micros() as u64,
            "sink call"
        );
    }

    if !transfer.is_complete() {
        warn!(
            iteration = ctx.iteration,
            connection = ctx.connection,
            transferred = transfer.transferred,
            requested = transfer.requested,
            outcome = ?transfer.outcome,
            "transfer ended early"
        );
    }
}
