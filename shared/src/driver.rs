use std::{
    mem,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::Barrier,
    thread::{self, Scope},
};

use quanta::Clock;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    affinity::{current_cpu, pin_current, CoreBinder, CorePlan},
    compute::{Element, Workload},
    config::DriverConfig,
    error::{LaunchError, SetupError},
    partition::{partition, uncovered, WorkPartition},
    timing::{IterationTiming, Stopwatch, TimingBoard, TimingSummary},
    transmit::{
        oneshot::{self, InFlight},
        pooled::PooledTransmitter,
        TransmissionTask, TransmitMode, TransmitReport,
    },
    trigger::OverlapLatch,
};

/// Parses `host:port`, resolving host names.
pub fn resolve_target(text: &str) -> Result<SocketAddr, SetupError> {
    let bad = || SetupError::BadAddress(text.to_owned());

    match text.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => return Err(bad()),
    }

    text.to_socket_addrs()
        .map_err(|_| bad())?
        .next()
        .ok_or_else(bad)
}

/// Opens one long-lived connection per transmitting worker, indexed by worker id.
pub fn connect_links(config: &DriverConfig) -> Result<Vec<Option<TcpStream>>, SetupError> {
    (0..config.workers)
        .map(|worker| {
            if !config.is_head(worker) {
                return Ok(None);
            }

            let stream =
                TcpStream::connect(config.target).map_err(|source| SetupError::Connect {
                    worker,
                    addr: config.target,
                    source,
                })?;

            info!(worker, addr = %config.target, "connected to sink");
            Ok(Some(stream))
        })
        .collect()
}

#[derive(Debug)]
pub struct WorkerReport {
    pub partition: WorkPartition,
    pub compute_core: usize,
    pub pinned: bool,
    /// Core the worker was observed running on after pinning.
    pub cpu: Option<usize>,
    pub transmissions: Vec<TransmitReport>,
    pub launch_failures: usize,
}

impl WorkerReport {
    pub fn worker_id(&self) -> usize {
        self.partition.worker_id
    }
}

#[derive(Debug)]
pub struct DriverReport<A> {
    pub workers: Vec<WorkerReport>,
    pub summary: TimingSummary,
    pub output: Vec<A>,
}

/// Runs the full compute team for `config.iterations` iterations.
///
/// `links[w]` must hold a connection for every worker that
/// [`DriverConfig::is_head`] selects.
pub fn run<T: Element>(
    config: &DriverConfig,
    workload: &Workload<T>,
    links: &[Option<TcpStream>],
    binder: &dyn CoreBinder,
) -> Result<DriverReport<T::Acc>, SetupError> {
    config.validate()?;

    let connected = (0..config.workers)
        .filter(|&w| config.is_head(w) && links.get(w).is_some_and(Option::is_some))
        .count();
    if connected != config.active_heads() {
        return Err(SetupError::InsufficientPeers {
            expected: config.active_heads(),
            connected,
        });
    }

    let shape = workload.shape();
    let plan = config.core_plan()?;
    let partitions = partition(shape.rows, config.workers, config.remainder)?;

    let dropped = uncovered(shape.rows, config.workers, config.remainder);
    if dropped > 0 {
        warn!(rows = dropped, policy = %config.remainder, "rows left out of every partition");
    }

    let mut output = workload.output();
    let mut rest: &mut [T::Acc] = &mut output;
    let mut slices = Vec::with_capacity(partitions.len());
    for partition in &partitions {
        let (mine, tail) = mem::take(&mut rest).split_at_mut(partition.len() * shape.b_cols);
        slices.push(mine);
        rest = tail;
    }

    let board = TimingBoard::new(config.workers, config.iterations);
    let clock = Clock::new();
    let barrier = Barrier::new(config.workers);

    let workers = thread::scope(|s| {
        let handles: Vec<_> = partitions
            .iter()
            .zip(slices)
            .map(|(&partition, out)| {
                let lane = Lane {
                    config,
                    workload,
                    partition,
                    out,
                    link: links.get(partition.worker_id).and_then(Option::as_ref),
                    plan: &plan,
                    binder,
                    clock: &clock,
                    board: &board,
                    barrier: &barrier,
                };
                s.spawn(move || lane.run(s))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(report) => report,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<_>>()
    });

    let summary = board.summarize(config.warmup);

    Ok(DriverReport {
        workers,
        summary,
        output,
    })
}

/// Everything one compute worker borrows for the duration of the run.
struct Lane<'env, T: Element> {
    config: &'env DriverConfig,
    workload: &'env Workload<T>,
    partition: WorkPartition,
    out: &'env mut [T::Acc],
    link: Option<&'env TcpStream>,
    plan: &'env CorePlan,
    binder: &'env dyn CoreBinder,
    clock: &'env Clock,
    board: &'env TimingBoard,
    barrier: &'env Barrier,
}

impl<'env, T: Element> Lane<'env, T> {
    fn run<'scope>(self, scope: &'scope Scope<'scope, 'env>) -> WorkerReport {
        let Lane {
            config,
            workload,
            partition,
            out,
            link,
            plan,
            binder,
            clock,
            board,
            barrier,
        } = self;

        let worker_id = partition.worker_id;
        let _span = info_span!("compute", worker = worker_id).entered();
        coz::thread_init();

        let compute_core = plan.compute_core(worker_id).core_id;
        let transmit_core = plan.transmit_core(worker_id).core_id;
        let pinned = pin_current(binder, "compute", worker_id, compute_core);
        let cpu = current_cpu();

        // created before the run so its startup cost is never measured
        let pooled = match (link, config.mode) {
            (Some(_), TransmitMode::Pooled) => {
                match PooledTransmitter::spawn(scope, worker_id, transmit_core, binder, clock) {
                    Ok(pooled) => Some(pooled),
                    Err(err) => {
                        error!(%err, "pooled transmitter unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        info!(
            start = partition.start,
            end = partition.end,
            core = compute_core,
            cpu,
            head = link.is_some(),
            "processing rows"
        );

        let b_cols = workload.shape().b_cols;
        let mut transmissions = Vec::new();
        let mut launch_failures = 0;

        barrier.wait();

        for iteration in 0..config.iterations {
            let mut latch = match link {
                Some(_) => OverlapLatch::new(config.trigger, &partition),
                None => OverlapLatch::disarmed(),
            };
            let mut in_flight = InFlight::NotStarted;
            let mut submitted = false;

            let watch = Stopwatch::start(clock);

            for (offset, row) in partition.range().enumerate() {
                if latch.fire(row) {
                    if let Some(link) = link {
                        debug!(iteration, row, "trigger fired");
                        let task = TransmissionTask::new(
                            worker_id,
                            iteration,
                            link,
                            config.payload_size,
                            config.direction,
                            transmit_core,
                        );

                        let launched = match (&pooled, config.mode) {
                            (Some(pooled), _) => pooled.submit(task).map(|()| submitted = true),
                            (None, TransmitMode::OneShot) => {
                                oneshot::launch(scope, task, binder, clock)
                                    .map(|started| in_flight = started)
                            }
                            (None, TransmitMode::Pooled) => {
                                Err(LaunchError::TransmitterGone { worker: worker_id })
                            }
                        };

                        if let Err(err) = launched {
                            launch_failures += 1;
                            error!(iteration, %err, "transmission not started");
                        }
                    }
                }

                workload.compute_row(row, &mut out[offset * b_cols..(offset + 1) * b_cols]);
            }

            // join point, skipped when nothing was started
            let report = match &pooled {
                Some(pooled) if submitted => pooled.wait_idle(),
                _ => in_flight.join(),
            };

            let elapsed = watch.elapsed();
            transmissions.extend(report);
            board.record(IterationTiming {
                worker_id,
                iteration,
                elapsed,
            });
            coz::progress!("compute iteration");

            debug!(iteration, elapsed_us = elapsed.as_micros() as u64, "worker iteration done");

            if barrier.wait().is_leader() {
                info!(
                    iteration,
                    max_us = board.iteration_max(iteration).as_micros() as u64,
                    "iteration complete"
                );
            }
        }

        if let Some(pooled) = pooled {
            let served = pooled.shutdown();
            debug!(served, "pooled transmitter joined");
        }

        WorkerReport {
            partition,
            compute_core,
            pinned,
            cpu,
            transmissions,
            launch_failures,
        }
    }
}
