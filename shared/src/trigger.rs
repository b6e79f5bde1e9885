use std::{fmt::Display, num::NonZeroUsize, str::FromStr};

use crate::{error::ConfigError, partition::WorkPartition};

/// Where inside a worker's range the overlapped transmission is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPoint {
    /// Pure compute baseline, nothing is ever launched.
    Disabled,
    /// Offset is `size * numerator / denominator` into the range.
    Fraction {
        numerator: usize,
        denominator: NonZeroUsize,
    },
    /// Offset is `size / denominator * worker_id`, staggering the workers.
    WorkerScaled { denominator: NonZeroUsize },
}

impl TriggerPoint {
    pub const MIDPOINT: TriggerPoint = TriggerPoint::Fraction {
        numerator: 1,
        denominator: match NonZeroUsize::new(2) {
            Some(d) => d,
            None => unreachable!(),
        },
    };

    pub fn is_enabled(&self) -> bool {
        !matches!(self, TriggerPoint::Disabled)
    }

    /// Offset from the start of a range of `size` rows owned by `worker_id`.
    ///
    /// Offsets past the range clamp to its last row, so an enabled trigger
    /// fires exactly once on every non-empty range.
    pub fn offset(&self, size: usize, worker_id: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }

        let raw = match *self {
            TriggerPoint::Disabled => return None,
            TriggerPoint::Fraction {
                numerator,
                denominator,
            } => size.saturating_mul(numerator) / denominator.get(),
            TriggerPoint::WorkerScaled { denominator } => {
                (size / denominator.get()).saturating_mul(worker_id)
            }
        };

        Some(raw.min(size - 1))
    }

    /// Absolute row at which the trigger fires for `partition`.
    pub fn index_for(&self, partition: &WorkPartition) -> Option<usize> {
        self.offset(partition.len(), partition.worker_id)
            .map(|offset| partition.start + offset)
    }

    pub fn holds(&self, index: usize, start: usize, size: usize, worker_id: usize) -> bool {
        self.offset(size, worker_id)
            .is_some_and(|offset| index == start + offset)
    }
}

impl FromStr for TriggerPoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTrigger(s.to_owned());

        match s {
            "midpoint" => return Ok(Self::MIDPOINT),
            "off" | "disabled" => return Ok(Self::Disabled),
            _ => {}
        }

        if let Some(fraction) = s.strip_prefix("fraction:") {
            let (numerator, denominator) = fraction.split_once('/').ok_or_else(invalid)?;
            let numerator = numerator.parse().map_err(|_| invalid())?;
            let denominator: NonZeroUsize = denominator.parse().map_err(|_| invalid())?;
            if numerator > denominator.get() {
                return Err(invalid());
            }
            return Ok(Self::Fraction {
                numerator,
                denominator,
            });
        }

        if let Some(denominator) = s.strip_prefix("scaled:") {
            let denominator = denominator.parse().map_err(|_| invalid())?;
            return Ok(Self::WorkerScaled { denominator });
        }

        Err(invalid())
    }
}

impl Display for TriggerPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerPoint::Disabled => write!(f, "off"),
            TriggerPoint::Fraction {
                numerator,
                denominator,
            } => write!(f, "fraction:{}/{}", numerator, denominator),
            TriggerPoint::WorkerScaled { denominator } => write!(f, "scaled:{}", denominator),
        }
    }
}

/// Single-use latch guarding the trigger inside one iteration of a worker.
#[derive(Debug, Clone, Copy)]
pub struct OverlapLatch {
    target: Option<usize>,
    fired: bool,
}

impl OverlapLatch {
    pub fn new(trigger: TriggerPoint, partition: &WorkPartition) -> Self {
        Self {
            target: trigger.index_for(partition),
            fired: false,
        }
    }

    pub fn disarmed() -> Self {
        Self {
            target: None,
            fired: false,
        }
    }

    /// Returns true the first time `index` reaches the target, never again.
    #[inline]
    pub fn fire(&mut self, index: usize) -> bool {
        if self.fired || self.target != Some(index) {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn reset(&mut self) {
        self.fired = false;
    }
}
