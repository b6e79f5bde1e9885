use std::{fmt::Display, net::SocketAddr, str::FromStr};

use crate::{
    affinity::CorePlan,
    compute::Precision,
    error::ConfigError,
    partition::RemainderPolicy,
    transmit::{TransmitDirection, TransmitMode},
    trigger::TriggerPoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeShape {
    pub rows: usize,
    pub cols: usize,
    pub b_cols: usize,
}

impl Default for ComputeShape {
    fn default() -> Self {
        Self {
            rows: 5120,
            cols: 5120,
            b_cols: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub target: SocketAddr,
    pub workers: usize,
    /// Transmitting workers, counted down from the highest worker id.
    pub heads: usize,
    pub iterations: usize,
    pub warmup: usize,
    pub payload_size: usize,
    pub trigger: TriggerPoint,
    pub mode: TransmitMode,
    pub direction: TransmitDirection,
    pub remainder: RemainderPolicy,
    pub precision: Precision,
    pub compute_core_base: usize,
    pub transmit_core_base: usize,
    pub shape: ComputeShape,
}

impl DriverConfig {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            workers: 4,
            heads: 1,
            iterations: 20,
            warmup: 10,
            payload_size: 1024,
            trigger: TriggerPoint::MIDPOINT,
            mode: TransmitMode::OneShot,
            direction: TransmitDirection::Send,
            remainder: RemainderPolicy::Drop,
            precision: Precision::Fp32,
            compute_core_base: 4,
            transmit_core_base: 0,
            shape: ComputeShape::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.heads > self.workers {
            return Err(ConfigError::TooManyHeads {
                heads: self.heads,
                workers: self.workers,
            });
        }
        if self.trigger.is_enabled() && self.payload_size == 0 {
            return Err(ConfigError::EmptyPayload);
        }
        self.core_plan().map(|_| ())
    }

    pub fn core_plan(&self) -> Result<CorePlan, ConfigError> {
        CorePlan::new(self.compute_core_base, self.transmit_core_base, self.workers)
    }

    /// Whether `worker_id` launches a transmission during each iteration.
    pub fn is_head(&self, worker_id: usize) -> bool {
        self.trigger.is_enabled() && worker_id + self.heads >= self.workers
    }

    pub fn active_heads(&self) -> usize {
        (0..self.workers).filter(|&w| self.is_head(w)).count()
    }
}

/// What the sink does with each connection per iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkMode {
    #[default]
    Read,
    Write,
    /// Read the payload, then write back what was read.
    Echo,
}

impl FromStr for SinkMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "echo" => Ok(Self::Echo),
            other => Err(ConfigError::UnknownValue {
                what: "sink mode",
                value: other.to_owned(),
            }),
        }
    }
}

impl Display for SinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkMode::Read => write!(f, "read"),
            SinkMode::Write => write!(f, "write"),
            SinkMode::Echo => write!(f, "echo"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    pub port: u16,
    pub payload_size: usize,
    pub iterations: usize,
    pub clients: usize,
    pub mode: SinkMode,
}

impl SinkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            payload_size: 8192 * 100,
            iterations: 1,
            clients: 1,
            mode: SinkMode::Read,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients == 0 {
            return Err(ConfigError::NoClients);
        }
        if self.payload_size == 0 {
            return Err(ConfigError::EmptyPayload);
        }
        Ok(())
    }
}
