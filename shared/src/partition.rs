use std::{fmt::Display, ops::Range, str::FromStr};

use crate::error::ConfigError;

/// What happens to the `N % W` rows that do not fit an even block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemainderPolicy {
    /// Leftover rows are not computed by anyone.
    #[default]
    Drop,
    /// Leftover rows are appended to the last worker's block.
    FoldIntoLast,
}

impl FromStr for RemainderPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "fold" => Ok(Self::FoldIntoLast),
            other => Err(ConfigError::UnknownValue {
                what: "remainder policy",
                value: other.to_owned(),
            }),
        }
    }
}

impl Display for RemainderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemainderPolicy::Drop => write!(f, "drop"),
            RemainderPolicy::FoldIntoLast => write!(f, "fold"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartition {
    pub worker_id: usize,
    pub start: usize,
    pub end: usize,
}

impl WorkPartition {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Splits `[0, total)` into `workers` contiguous blocks of `total / workers`.
pub fn partition(
    total: usize,
    workers: usize,
    policy: RemainderPolicy,
) -> Result<Vec<WorkPartition>, ConfigError> {
    if workers == 0 {
        return Err(ConfigError::NoWorkers);
    }

    let duty = total / workers;

    let mut partitions: Vec<WorkPartition> = (0..workers)
        .map(|worker_id| WorkPartition {
            worker_id,
            start: worker_id * duty,
            end: (worker_id + 1) * duty,
        })
        .collect();

    if policy == RemainderPolicy::FoldIntoLast {
        if let Some(last) = partitions.last_mut() {
            last.end = total;
        }
    }

    Ok(partitions)
}

/// Rows that belong to no partition under `policy`.
pub fn uncovered(total: usize, workers: usize, policy: RemainderPolicy) -> usize {
    match policy {
        RemainderPolicy::Drop if workers > 0 => total % workers,
        _ => 0,
    }
}
