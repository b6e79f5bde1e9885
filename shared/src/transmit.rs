use std::{fmt::Display, net::TcpStream, str::FromStr, time::Duration};

use derivative::Derivative;
use quanta::Clock;
use tracing::info;

use crate::{
    error::ConfigError,
    timing::Stopwatch,
    transfer::{read_all, write_all, CallContext, Transfer},
};

pub mod oneshot;
pub mod pooled;

/// How the overlapped transmission is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransmitMode {
    /// A fresh thread per trigger event, joined at the end of the iteration.
    #[default]
    OneShot,
    /// One long-lived thread per worker fed through a single-slot mailbox.
    Pooled,
}

impl FromStr for TransmitMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oneshot" => Ok(Self::OneShot),
            "pooled" => Ok(Self::Pooled),
            other => Err(ConfigError::UnknownValue {
                what: "transmit mode",
                value: other.to_owned(),
            }),
        }
    }
}

impl Display for TransmitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransmitMode::OneShot => write!(f, "oneshot"),
            TransmitMode::Pooled => write!(f, "pooled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransmitDirection {
    #[default]
    Send,
    Receive,
    /// Send the payload, then read the sink's echo of it.
    Exchange,
}

impl FromStr for TransmitDirection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(Self::Send),
            "receive" => Ok(Self::Receive),
            "exchange" => Ok(Self::Exchange),
            other => Err(ConfigError::UnknownValue {
                what: "transmit direction",
                value: other.to_owned(),
            }),
        }
    }
}

impl Display for TransmitDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransmitDirection::Send => write!(f, "send"),
            TransmitDirection::Receive => write!(f, "receive"),
            TransmitDirection::Exchange => write!(f, "exchange"),
        }
    }
}

/// One transmission handed from a compute worker to a transmission context.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TransmissionTask<'c> {
    pub worker_id: usize,
    pub iteration: usize,
    #[derivative(Debug = "ignore")]
    pub link: &'c TcpStream,
    #[derivative(Debug = "ignore")]
    pub payload: Vec<u8>,
    pub direction: TransmitDirection,
    pub core_id: usize,
}

impl<'c> TransmissionTask<'c> {
    pub fn new(
        worker_id: usize,
        iteration: usize,
        link: &'c TcpStream,
        payload_size: usize,
        direction: TransmitDirection,
        core_id: usize,
    ) -> Self {
        Self {
            worker_id,
            iteration,
            link,
            payload: vec![crate::PAYLOAD_BYTE; payload_size],
            direction,
            core_id,
        }
    }

    pub fn length(&self) -> usize {
        self.payload.len()
    }
}

#[derive(Debug)]
pub struct TransmitReport {
    pub worker_id: usize,
    pub iteration: usize,
    pub core_id: usize,
    pub direction: TransmitDirection,
    pub transfers: Vec<Transfer>,
    pub elapsed: Duration,
}

impl TransmitReport {
    pub fn is_complete(&self) -> bool {
        !self.transfers.is_empty() && self.transfers.iter().all(Transfer::is_complete)
    }

    pub fn bytes(&self) -> usize {
        self.transfers.iter().map(|t| t.transferred).sum()
    }
}

/// Performs the blocking network work of `task` on the calling thread.
///
/// The payload buffer is released as soon as the network calls return.
pub fn transmit(task: TransmissionTask<'_>, clock: &Clock) -> TransmitReport {
    let TransmissionTask {
        worker_id,
        iteration,
        mut link,
        mut payload,
        direction,
        core_id,
    } = task;

    let ctx = CallContext {
        iteration,
        connection: worker_id,
    };

    let watch = Stopwatch::start(clock);
    let mut transfers = Vec::with_capacity(2);

    match direction {
        TransmitDirection::Send => transfers.push(write_all(&mut link, &payload, ctx, clock)),
        TransmitDirection::Receive => {
            transfers.push(read_all(&mut link, &mut payload, ctx, clock))
        }
        TransmitDirection::Exchange => {
            let sent = write_all(&mut link, &payload, ctx, clock);
            let sent_all = sent.is_complete();
            transfers.push(sent);
            if sent_all {
                transfers.push(read_all(&mut link, &mut payload, ctx, clock));
            }
        }
    }

    let elapsed = watch.elapsed();
    drop(payload);

    let report = TransmitReport {
        worker_id,
        iteration,
        core_id,
        direction,
        transfers,
        elapsed,
    };

    info!(
        worker = worker_id,
        iteration,
        core = core_id,
        %direction,
        bytes = report.bytes(),
        complete = report.is_complete(),
        elapsed_us = elapsed.as_micros() as u64,
        "transmission finished"
    );

    report
}
