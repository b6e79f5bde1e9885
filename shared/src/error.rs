use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failures that abort a run before any measurement is taken.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid target `{0}`, expected <host:port>")]
    BadAddress(String),
    #[error("worker {worker} failed to connect to {addr}: {source}")]
    Connect {
        worker: usize,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept client {index}: {source}")]
    Accept {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("expected {expected} connected peers, have {connected}")]
    InsufficientPeers { expected: usize, connected: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("{heads} transmission heads requested but only {workers} workers")]
    TooManyHeads { heads: usize, workers: usize },
    #[error("compute cores {compute:?} overlap transmission cores {transmit:?}")]
    OverlappingCores {
        compute: std::ops::Range<usize>,
        transmit: std::ops::Range<usize>,
    },
    #[error("payload size must be non-zero")]
    EmptyPayload,
    #[error("sink needs at least one client")]
    NoClients,
    #[error("invalid trigger `{0}`, expected midpoint, off, fraction:N/D or scaled:D")]
    InvalidTrigger(String),
    #[error("unknown {what} `{value}`")]
    UnknownValue { what: &'static str, value: String },
}

/// Pinning is a hint; these are logged and the thread keeps running unpinned.
#[derive(Debug, Error)]
pub enum AffinityError {
    #[error("core {core} is out of range, host has {available} online cores")]
    InvalidCore { core: usize, available: usize },
    #[error("host rejected pinning to core {core}: {source}")]
    Rejected {
        core: usize,
        #[source]
        source: nix::Error,
    },
    #[error("core pinning is not supported on this host")]
    NotSupported,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("worker {worker} failed to spawn its transmission thread: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
    #[error("worker {worker} has no running pooled transmitter")]
    TransmitterGone { worker: usize },
}
