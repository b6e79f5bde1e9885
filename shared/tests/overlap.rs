#[cfg(test)]
pub mod tests {
    use std::{
        io::Read,
        net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream},
        sync::{mpsc, Mutex},
        thread,
        time::Duration,
    };

    use quanta::Clock;
    use shared::{
        affinity::{online_cores, CoreBinder, NoopBinder, SchedBinder},
        compute::Workload,
        config::{ComputeShape, DriverConfig},
        driver,
        error::{AffinityError, LaunchError, SetupError},
        transmit::{
            oneshot::{self, InFlight},
            pooled::{Mailbox, PooledTransmitter},
            TransmissionTask, TransmitDirection, TransmitMode, TransmitReport,
        },
        trigger::TriggerPoint,
        PAYLOAD_BYTE,
    };

    const SHAPE: ComputeShape = ComputeShape {
        rows: 5120,
        cols: 8,
        b_cols: 1,
    };

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn drain(listener: &TcpListener) -> Vec<u8> {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    }

    /// Accepts every pin and remembers which thread asked for which core.
    #[derive(Default)]
    struct RecordingBinder {
        pins: Mutex<Vec<(String, usize)>>,
    }

    impl RecordingBinder {
        fn pins_of(&self, thread_name: &str) -> Vec<usize> {
            self.pins
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == thread_name)
                .map(|&(_, core)| core)
                .collect()
        }
    }

    impl CoreBinder for RecordingBinder {
        fn try_pin(&self, core_id: usize) -> Result<(), AffinityError> {
            let name = thread::current().name().unwrap_or_default().to_owned();
            self.pins.lock().unwrap().push((name, core_id));
            Ok(())
        }
    }

    fn config(target: SocketAddr, mode: TransmitMode) -> DriverConfig {
        let mut config = DriverConfig::new(target);
        config.shape = SHAPE;
        config.iterations = 1;
        config.warmup = 0;
        config.mode = mode;
        config
    }

    #[test]
    pub fn midpoint_of_worker_three_sends_one_kilobyte() {
        init_tracing();

        for mode in [TransmitMode::OneShot, TransmitMode::Pooled] {
            let (listener, addr) = listener();
            let config = config(addr, mode);
            let workload = Workload::<f32>::ones(SHAPE);

            let received = thread::scope(|s| {
                let sink = s.spawn(|| drain(&listener));

                let links = driver::connect_links(&config).unwrap();
                assert_eq!(links.iter().filter(|l| l.is_some()).count(), 1);
                assert!(links[3].is_some());

                let report = driver::run(&config, &workload, &links, &NoopBinder).unwrap();
                drop(links);

                for worker in &report.workers {
                    let expected = if worker.worker_id() == 3 { 1 } else { 0 };
                    assert_eq!(worker.transmissions.len(), expected, "{mode}");
                    assert_eq!(worker.launch_failures, 0);
                }

                let sent = &report.workers[3].transmissions[0];
                assert!(sent.is_complete());
                assert_eq!(sent.bytes(), 1024);
                assert_eq!(sent.direction, TransmitDirection::Send);
                assert_eq!(sent.core_id, 3);

                // every row was computed despite the launch in the middle
                assert!(report.output.iter().all(|&v| v == SHAPE.cols as f32));

                sink.join().unwrap()
            });

            assert_eq!(received.len(), 1024);
            assert!(received.iter().all(|&b| b == PAYLOAD_BYTE));
        }
    }

    #[test]
    pub fn every_iteration_transmits_exactly_once_per_head() {
        init_tracing();
        let (listener, addr) = listener();

        let mut config = config(addr, TransmitMode::Pooled);
        config.heads = 2;
        config.iterations = 6;
        config.warmup = 2;
        config.payload_size = 256;
        config.trigger = "scaled:4".parse().unwrap();

        let workload = Workload::<i8>::ones(SHAPE);

        let received = thread::scope(|s| {
            let sinks = [s.spawn(|| drain(&listener)), s.spawn(|| drain(&listener))];

            let links = driver::connect_links(&config).unwrap();
            let report = driver::run(&config, &workload, &links, &NoopBinder).unwrap();
            drop(links);

            let heads: Vec<_> = report
                .workers
                .iter()
                .map(|w| w.transmissions.len())
                .collect();
            assert_eq!(heads, vec![0, 0, 6, 6]);

            let iterations: Vec<_> = report.workers[2]
                .transmissions
                .iter()
                .map(|t| t.iteration)
                .collect();
            assert_eq!(iterations, (0..6).collect::<Vec<_>>());

            assert_eq!(report.summary.maxima.len(), 6);
            assert_eq!(report.summary.measured(), 4);
            assert!(report.summary.mean.is_some());
            assert!(report.output.iter().all(|&v| v == SHAPE.cols as i32));

            sinks.map(|h| h.join().unwrap().len())
        });

        assert_eq!(received, [6 * 256, 6 * 256]);
    }

    #[test]
    pub fn baseline_runs_without_connections() {
        init_tracing();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, 9));
        let mut config = config(target, TransmitMode::OneShot);
        config.trigger = TriggerPoint::Disabled;
        config.iterations = 3;

        let links = driver::connect_links(&config).unwrap();
        assert!(links.iter().all(Option::is_none));

        let workload = Workload::<f32>::ones(SHAPE);
        let report = driver::run(&config, &workload, &links, &NoopBinder).unwrap();

        assert!(report.workers.iter().all(|w| w.transmissions.is_empty()));
        assert_eq!(report.summary.maxima.len(), 3);
    }

    #[test]
    pub fn unreachable_core_leaves_the_run_unpinned() {
        init_tracing();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, 9));
        let mut config = config(target, TransmitMode::OneShot);
        config.trigger = TriggerPoint::Disabled;
        config.compute_core_base = 99;

        let workload = Workload::<f32>::ones(SHAPE);
        let report = driver::run(&config, &workload, &[], &SchedBinder).unwrap();

        assert_eq!(report.workers.len(), 4);
        if online_cores().is_some_and(|n| n <= 99) {
            assert!(report.workers.iter().all(|w| !w.pinned));
        }
        assert!(report.output.iter().all(|&v| v == SHAPE.cols as f32));
        assert!(report.summary.mean.is_some());
    }

    #[test]
    pub fn missing_link_for_a_head_is_a_setup_error() {
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, 9));
        let config = config(target, TransmitMode::OneShot);
        let workload = Workload::<f32>::ones(SHAPE);

        let result = driver::run(&config, &workload, &[None, None, None, None], &NoopBinder);
        assert!(matches!(
            result,
            Err(SetupError::InsufficientPeers {
                expected: 1,
                connected: 0
            })
        ));
    }

    #[test]
    pub fn join_on_a_never_started_launch_returns_at_once() {
        let in_flight = InFlight::NotStarted;
        assert!(!in_flight.is_started());
        assert!(in_flight.join().is_none());
    }

    #[test]
    pub fn pooled_mailbox_serves_every_request_once() {
        init_tracing();
        let (listener, addr) = listener();
        let clock = Clock::new();
        const REQUESTS: usize = 50;
        let link = TcpStream::connect(addr).unwrap();

        let received = thread::scope(|s| {
            let sink = s.spawn(|| drain(&listener));

            let pooled = PooledTransmitter::spawn(s, 0, 0, &NoopBinder, &clock).unwrap();
            let mut reports = Vec::new();
            for iteration in 0..REQUESTS {
                let task =
                    TransmissionTask::new(0, iteration, &link, 100, TransmitDirection::Send, 0);
                pooled.submit(task).unwrap();
                reports.extend(pooled.wait_idle());
            }
            assert_eq!(pooled.shutdown(), REQUESTS);

            let served: Vec<_> = reports.iter().map(|r| r.iteration).collect();
            assert_eq!(served, (0..REQUESTS).collect::<Vec<_>>());

            link.shutdown(Shutdown::Write).unwrap();
            sink.join().unwrap()
        });

        assert_eq!(received.len(), REQUESTS * 100);
    }

    #[test]
    pub fn back_to_back_submissions_are_never_dropped() {
        let (listener, addr) = listener();
        let clock = Clock::new();
        let link = TcpStream::connect(addr).unwrap();

        let received = thread::scope(|s| {
            let sink = s.spawn(|| drain(&listener));

            let pooled = PooledTransmitter::spawn(s, 1, 0, &NoopBinder, &clock).unwrap();
            // no wait in between: each submit parks until the slot frees up
            for iteration in 0..20 {
                let task =
                    TransmissionTask::new(1, iteration, &link, 64, TransmitDirection::Send, 0);
                pooled.submit(task).unwrap();
            }
            assert_eq!(pooled.shutdown(), 20);

            link.shutdown(Shutdown::Write).unwrap();
            sink.join().unwrap()
        });

        assert_eq!(received.len(), 20 * 64);
    }

    #[test]
    pub fn closed_mailbox_rejects_requests() {
        let (_listener, addr) = listener();
        let link = TcpStream::connect(addr).unwrap();
        let mailbox = Mailbox::new();

        mailbox.close();
        assert!(mailbox.is_closed());
        assert!(mailbox.take().is_none());

        let task = TransmissionTask::new(2, 0, &link, 8, TransmitDirection::Send, 0);
        assert!(matches!(
            mailbox.submit(task),
            Err(LaunchError::TransmitterGone { worker: 2 })
        ));
        assert!(mailbox.wait_idle().is_none());
    }

    #[test]
    pub fn pooled_thread_pins_once_at_start() {
        init_tracing();
        let (listener, addr) = listener();
        let mut config = config(addr, TransmitMode::Pooled);
        config.iterations = 0;

        let binder = RecordingBinder::default();
        let workload = Workload::<f32>::ones(SHAPE);

        thread::scope(|s| {
            let sink = s.spawn(|| drain(&listener));

            let links = driver::connect_links(&config).unwrap();
            let report = driver::run(&config, &workload, &links, &binder).unwrap();
            drop(links);

            assert!(report.workers.iter().all(|w| w.pinned));
            assert!(report.summary.mean.is_none());
            assert!(sink.join().unwrap().is_empty());
        });

        // no request was ever submitted, the pin still happened
        assert_eq!(binder.pins_of("pooled-3"), vec![3]);
        let mut compute = binder.pins_of("");
        compute.sort_unstable();
        assert_eq!(compute, vec![4, 5, 6, 7]);
    }

    #[test]
    pub fn pooled_thread_keeps_its_core_across_requests() {
        let (listener, addr) = listener();
        let clock = Clock::new();
        let binder = RecordingBinder::default();
        let link = TcpStream::connect(addr).unwrap();

        thread::scope(|s| {
            let sink = s.spawn(|| drain(&listener));

            let pooled = PooledTransmitter::spawn(s, 2, 6, &binder, &clock).unwrap();
            for (iteration, core_id) in [6, 1, 6].into_iter().enumerate() {
                let task =
                    TransmissionTask::new(2, iteration, &link, 16, TransmitDirection::Send, core_id);
                pooled.submit(task).unwrap();
                pooled.wait_idle();
            }
            assert_eq!(pooled.shutdown(), 3);

            link.shutdown(Shutdown::Write).unwrap();
            assert_eq!(sink.join().unwrap().len(), 48);
        });

        assert_eq!(binder.pins_of("pooled-2"), vec![6]);
    }

    /// Far beyond what loopback socket buffers hold, so the send cannot finish
    /// until the peer starts reading.
    const BLOCKED_PAYLOAD: usize = 32 << 20;

    const SMALL: ComputeShape = ComputeShape {
        rows: 512,
        cols: 64,
        b_cols: 1,
    };

    fn compute_all(workload: &Workload<f32>, out: &mut [f32]) {
        for (row, slot) in out.chunks_mut(SMALL.b_cols).enumerate() {
            workload.compute_row(row, slot);
        }
    }

    /// Starts a send the peer refuses to read, computes every row, and only then
    /// lets the peer drain. Compute progress must not depend on the send.
    fn compute_runs_while_send_is_blocked(mode: TransmitMode) {
        init_tracing();
        let (listener, addr) = listener();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let (computed_tx, computed_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<(Option<TransmitReport>, Vec<f32>)>();

        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let _ = go_rx.recv();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();
            received.len()
        });

        thread::spawn(move || {
            let link = TcpStream::connect(addr).unwrap();
            let clock = Clock::new();
            let workload = Workload::<f32>::ones(SMALL);
            let mut out = workload.output();

            let report = thread::scope(|s| {
                let task = TransmissionTask::new(
                    3,
                    0,
                    &link,
                    BLOCKED_PAYLOAD,
                    TransmitDirection::Send,
                    0,
                );

                match mode {
                    TransmitMode::OneShot => {
                        let in_flight = oneshot::launch(s, task, &NoopBinder, &clock).unwrap();
                        compute_all(&workload, &mut out);
                        computed_tx.send(()).unwrap();
                        go_tx.send(()).unwrap();
                        in_flight.join()
                    }
                    TransmitMode::Pooled => {
                        let pooled = PooledTransmitter::spawn(s, 3, 0, &NoopBinder, &clock).unwrap();
                        pooled.submit(task).unwrap();
                        compute_all(&workload, &mut out);
                        computed_tx.send(()).unwrap();
                        go_tx.send(()).unwrap();
                        let report = pooled.wait_idle();
                        pooled.shutdown();
                        report
                    }
                }
            });

            link.shutdown(Shutdown::Write).unwrap();
            done_tx.send((report, out)).unwrap();
        });

        computed_rx
            .recv_timeout(Duration::from_secs(30))
            .unwrap_or_else(|_| panic!("{mode}: rows were not computed while the send was blocked"));

        let (report, out) = done_rx.recv_timeout(Duration::from_secs(60)).unwrap();
        let report = report.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.bytes(), BLOCKED_PAYLOAD);
        assert!(out.iter().all(|&v| v == SMALL.cols as f32));
        assert_eq!(peer.join().unwrap(), BLOCKED_PAYLOAD);
    }

    #[test]
    pub fn oneshot_send_never_gates_compute() {
        compute_runs_while_send_is_blocked(TransmitMode::OneShot);
    }

    #[test]
    pub fn pooled_send_never_gates_compute() {
        compute_runs_while_send_is_blocked(TransmitMode::Pooled);
    }
}
