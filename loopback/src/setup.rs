use shared::{
    config::ComputeShape,
    transmit::{TransmitDirection, TransmitMode},
    trigger::TriggerPoint,
};

#[derive(Debug, Clone, Copy)]
pub struct Setup {
    pub workers: usize,
    pub heads: usize,
    pub iterations: usize,
    pub warmup: usize,
    pub payload_size: usize,
    pub trigger: TriggerPoint,
    pub mode: TransmitMode,
    pub direction: TransmitDirection,
    pub shape: ComputeShape,
}
