use clap::{arg, command, Parser};
use shared::config::SinkMode;

#[derive(Parser, Debug)]
#[command(version, about = "Accepts driver connections and moves a fixed payload per iteration", long_about = None)]
pub struct GlobalArgs {
    pub port: u16,
    #[arg(short = 's', long, default_value_t = 8192 * 100)]
    pub payload_size: usize,
    #[arg(short, long, default_value_t = 1)]
    pub iterations: usize,
    /// Connections to wait for before serving
    #[arg(short, long, default_value_t = 1)]
    pub clients: usize,
    /// read, write or echo
    #[arg(short, long, default_value_t = SinkMode::Read)]
    pub mode: SinkMode,
}
