use std::io::{self, ErrorKind, Read, Write};

use quanta::Clock;
use tracing::{debug, warn};

use crate::timing::{CallTiming, Stopwatch};

/// Identifies a logical transfer so per-call timings can be correlated offline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    pub iteration: usize,
    pub connection: usize,
}

#[derive(Debug)]
pub enum Outcome {
    Complete,
    /// The peer returned a zero-length call before the total was reached.
    PeerClosed,
    Failed(io::Error),
}

/// Result of a transfer-all loop.
///
/// `transferred` never exceeds `requested`, and equals it only for
/// [`Outcome::Complete`].
#[derive(Debug)]
pub struct Transfer {
    pub requested: usize,
    pub transferred: usize,
    pub outcome: Outcome,
    pub calls: Vec<CallTiming>,
}

impl Transfer {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, Outcome::Complete)
    }
}

/// Reads until `buf` is full, the peer closes, or a hard error occurs.
pub fn read_all<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    ctx: CallContext,
    clock: &Clock,
) -> Transfer {
    let requested = buf.len();
    transfer_all(requested, ctx, clock, "read", |done| {
        reader.read(&mut buf[done..])
    })
}

/// Writes until all of `buf` is accepted, the peer stops accepting, or a hard
/// error occurs.
pub fn write_all<W: Write>(writer: &mut W, buf: &[u8], ctx: CallContext, clock: &Clock) -> Transfer {
    transfer_all(buf.len(), ctx, clock, "write", |done| writer.write(&buf[done..]))
}

fn transfer_all(
    requested: usize,
    ctx: CallContext,
    clock: &Clock,
    op: &'static str,
    mut call: impl FnMut(usize) -> io::Result<usize>,
) -> Transfer {
    let mut transferred = 0;
    let mut calls = Vec::new();

    let outcome = loop {
        if transferred == requested {
            break Outcome::Complete;
        }

        let watch = Stopwatch::start(clock);
        let result = call(transferred);
        let elapsed = watch.elapsed();

        let bytes = *result.as_ref().unwrap_or(&0);
        calls.push(CallTiming {
            iteration: ctx.iteration,
            connection: ctx.connection,
            call: calls.len(),
            bytes,
            elapsed,
        });

        debug!(
            op,
            iteration = ctx.iteration,
            connection = ctx.connection,
            bytes,
            elapsed_us = elapsed.as_micros() as u64,
            "transfer call"
        );

        match result {
            Ok(0) => break Outcome::PeerClosed,
            // a misbehaving reader must not push us past the request
            Ok(n) => transferred += n.min(requested - transferred),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(
                    op,
                    iteration = ctx.iteration,
                    connection = ctx.connection,
                    transferred,
                    %err,
                    "transfer failed"
                );
                break Outcome::Failed(err);
            }
        }
    };

    Transfer {
        requested,
        transferred,
        outcome,
        calls,
    }
}
