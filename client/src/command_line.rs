use clap::{arg, command, Parser};
use shared::{
    compute::Precision,
    partition::RemainderPolicy,
    transmit::{TransmitDirection, TransmitMode},
    trigger::TriggerPoint,
};

#[derive(Parser, Debug)]
#[command(version, about = "Overlaps a TCP transmission with a pinned compute team", long_about = None)]
pub struct GlobalArgs {
    /// Sink address as <host:port>
    pub target: String,
    #[arg(short = 's', long, default_value_t = 1024)]
    pub payload_size: usize,
    #[arg(short, long, default_value_t = 20)]
    pub iterations: usize,
    #[arg(long, default_value_t = 10)]
    pub warmup: usize,
    /// Workers that transmit, counted down from the last worker
    #[arg(long, default_value_t = 1)]
    pub heads: usize,
    /// Pure compute baseline, no transmission and no connections
    #[arg(long)]
    pub no_trigger: bool,
    /// oneshot or pooled
    #[arg(short, long, default_value_t = TransmitMode::OneShot)]
    pub mode: TransmitMode,
    /// send, receive or exchange
    #[arg(short, long, default_value_t = TransmitDirection::Send)]
    pub direction: TransmitDirection,
    /// midpoint, fraction:N/D or scaled:D
    #[arg(short, long, default_value_t = TriggerPoint::MIDPOINT)]
    pub trigger: TriggerPoint,
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,
    #[arg(long, default_value_t = 5120)]
    pub rows: usize,
    #[arg(long, default_value_t = 5120)]
    pub cols: usize,
    #[arg(long, default_value_t = 1)]
    pub b_cols: usize,
    /// fp32 or int8
    #[arg(short, long, default_value_t = Precision::Fp32)]
    pub precision: Precision,
    #[arg(long, default_value_t = 4)]
    pub compute_core_base: usize,
    #[arg(long, default_value_t = 0)]
    pub transmit_core_base: usize,
    /// drop or fold
    #[arg(long, default_value_t = RemainderPolicy::Drop)]
    pub remainder: RemainderPolicy,
}
