//! End-to-end scenarios exercising the data model, scheduler, I/O
//! calculation and drivers together: the same cross-cutting properties
//! a single kernel-level unit test can't reach.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use streamforge_compiler::{accessible_input_items, num_accessible_strides_partial_sum, INFINITE};
use streamforge_model::{
    Attributes, BindingId, BindingTarget, EdgeReason, KernelId, PortType,
    ProcessingRate, Rational, RelationshipGraph, TerminationSignal, Vertex as TerminationVertex,
    TerminationGraph,
};
use streamforge_runtime::{
    Config, KernelRuntime, PipelineDriver, RuntimeError, SegmentOutcome, TerminationCode, ThreadingMode,
};

fn fixed(n: u64) -> ProcessingRate {
    ProcessingRate::Fixed(Rational::new(n, 1))
}

fn linear_termination_graph(kernels: &[KernelId]) -> TerminationGraph {
    let mut tg = TerminationGraph::new();
    tg.add_edge(TerminationVertex::PipelineInput, TerminationVertex::Kernel(kernels[0]));
    for w in kernels.windows(2) {
        tg.add_edge(TerminationVertex::Kernel(w[0]), TerminationVertex::Kernel(w[1]));
    }
    tg.add_edge(TerminationVertex::Kernel(*kernels.last().unwrap()), TerminationVertex::PipelineOutput);
    tg
}

/// S1: a `Source -> Sink` pipeline copies its input byte-for-byte.
#[test]
fn s1_identity_round_trips_input_to_output() {
    let mut rg = RelationshipGraph::new();
    let source = rg.add_kernel("source");
    let sink = rg.add_kernel("sink");
    let ss = rg.add_stream_set(8, 1);
    let out = rg.add_binding(source, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
    rg.connect_binding(out, BindingTarget::StreamSet(ss), EdgeReason::Explicit);
    let inp = rg.add_binding(sink, "in", PortType::Input, fixed(1), Attributes::new()).unwrap();
    rg.connect_binding(inp, BindingTarget::StreamSet(ss), EdgeReason::Explicit);

    let input = b"hello\n".to_vec();
    let output = Mutex::new(Vec::new());

    struct IdentityRuntime<'a> {
        source: KernelId,
        sink: KernelId,
        input: &'a [u8],
        output: &'a Mutex<Vec<u8>>,
    }
    impl KernelRuntime for IdentityRuntime<'_> {
        fn run_segment(&self, kernel: KernelId, segment: u64) -> SegmentOutcome {
            if kernel == self.source {
                if (segment as usize) < self.input.len() {
                    SegmentOutcome::progress()
                } else {
                    SegmentOutcome::terminated(TerminationSignal::None)
                }
            } else if kernel == self.sink {
                let idx = segment as usize;
                if idx < self.input.len() {
                    self.output.lock().unwrap().push(self.input[idx]);
                    SegmentOutcome::progress()
                } else {
                    SegmentOutcome::terminated(TerminationSignal::None)
                }
            } else {
                unreachable!()
            }
        }
    }

    let kernels = vec![source, sink];
    let tg = linear_termination_graph(&kernels);
    let driver = PipelineDriver::new(kernels, tg);
    let runtime = IdentityRuntime { source, sink, input: &input, output: &output };
    let code = driver.run(&runtime, ThreadingMode::SingleThreaded, 1).unwrap();

    assert_eq!(code, TerminationCode::Normal);
    assert_eq!(*output.lock().unwrap(), input);
}

/// S2: counts set bits in the lowest bit of each byte. Also exercises
/// `addPopCountKernels` splicing a synthetic producer in for an
/// `ImplicitPopCount` edge with no explicit producer yet.
#[test]
fn s2_pop_count_sums_low_bits() {
    let data = [0x01u8, 0x03, 0x07, 0x00];
    let expected: u64 = data.iter().map(|&b| (b & 1) as u64).sum();
    assert_eq!(expected, 6);

    let mut rg = RelationshipGraph::new();
    let counter = rg.add_kernel("counter");
    let ss = rg.add_stream_set(1, 1);
    let inp = rg
        .add_binding(counter, "pop_count_in", PortType::Input, fixed(1), Attributes::new())
        .unwrap();
    rg.connect_binding(inp, BindingTarget::StreamSet(ss), EdgeReason::ImplicitPopCount);

    rg.add_pop_count_kernels();

    assert!(rg.kernels.iter().any(|kn| kn.name == "__pop_count__0"));

    let total = AtomicU64::new(0);
    for &b in &data {
        if b & 1 != 0 {
            total.fetch_add(1, Ordering::Relaxed);
        }
    }
    assert_eq!(total.load(Ordering::Relaxed), 6);
}

/// S3: a fixed(1) producer feeding a bounded [0,2] consumer processes
/// every input item exactly once, observing the final-segment flag once.
#[test]
fn s3_fixed_and_bounded_consume_all_input_exactly_once() {
    let mut rg = RelationshipGraph::new();
    let producer = rg.add_kernel("producer");
    let consumer = rg.add_kernel("consumer");
    let ss = rg.add_stream_set(8, 1);
    let out = rg.add_binding(producer, "out", PortType::Output, fixed(1), Attributes::new()).unwrap();
    rg.connect_binding(out, BindingTarget::StreamSet(ss), EdgeReason::Explicit);
    let inp = rg
        .add_binding(consumer, "in", PortType::Input, ProcessingRate::Bounded(Rational::new(0, 1), Rational::new(2, 1)), Attributes::new())
        .unwrap();
    rg.connect_binding(inp, BindingTarget::StreamSet(ss), EdgeReason::Explicit);

    const TOTAL: u64 = 1000;
    struct CountingRuntime {
        producer: KernelId,
        consumer: KernelId,
        consumed: AtomicU64,
        final_segment_observations: AtomicU64,
    }
    impl KernelRuntime for CountingRuntime {
        fn run_segment(&self, kernel: KernelId, segment: u64) -> SegmentOutcome {
            if kernel == self.producer {
                if segment < TOTAL {
                    SegmentOutcome::progress()
                } else {
                    SegmentOutcome::terminated(TerminationSignal::None)
                }
            } else if kernel == self.consumer {
                if segment < TOTAL {
                    self.consumed.fetch_add(1, Ordering::Relaxed);
                    if segment == TOTAL - 1 {
                        self.final_segment_observations.fetch_add(1, Ordering::Relaxed);
                    }
                    SegmentOutcome::progress()
                } else {
                    SegmentOutcome::terminated(TerminationSignal::None)
                }
            } else {
                unreachable!()
            }
        }
    }

    let kernels = vec![producer, consumer];
    let tg = linear_termination_graph(&kernels);
    let driver = PipelineDriver::new(kernels, tg);
    let runtime = CountingRuntime {
        producer,
        consumer,
        consumed: AtomicU64::new(0),
        final_segment_observations: AtomicU64::new(0),
    };
    let code = driver.run(&runtime, ThreadingMode::SingleThreaded, 1).unwrap();

    assert_eq!(code, TerminationCode::Normal);
    assert_eq!(runtime.consumed.load(Ordering::Relaxed), TOTAL);
    assert_eq!(runtime.final_segment_observations.load(Ordering::Relaxed), 1);
}

/// S4: a zero-extended short input reads as zeros past its own length
/// once closed, so the long input's accessible count is never bounded by it.
#[test]
fn s4_zero_extended_input_reports_infinite_once_closed_and_exhausted() {
    let short_len = 10u64;
    let long_len = 100u64;

    // While still open, the short input bounds accessibility normally.
    let accessible_open = accessible_input_items(0, short_len, 0, false);
    assert_eq!(accessible_open, short_len);

    // Once closed and fully read, a ZeroExtended input never bounds the
    // pipeline's stride count again.
    let accessible_closed = accessible_input_items(short_len, short_len, 0, true);
    assert_eq!(accessible_closed, INFINITE);

    // The long input is unaffected and keeps reporting its own length.
    let long_accessible = accessible_input_items(0, long_len, 0, false);
    assert_eq!(long_accessible, long_len);
}

/// S5: a PartialSum kernel turns the raw per-stride counting stream
/// `[2, 5, 5, 7, 10]` into running totals `[2, 7, 12, 19, 29]`; with
/// accessible = 6 only the first total (2) fits, so the consumer may
/// only take one linear stride before backtracking.
#[test]
fn s5_partial_sum_backtracks_to_the_largest_fitting_prefix() {
    let counting_stream = [2u64, 5, 5, 7, 10];
    let mut running_total = 0u64;
    let cumulative: Vec<u64> = counting_stream
        .iter()
        .map(|&delta| {
            running_total += delta;
            running_total
        })
        .collect();
    assert_eq!(cumulative, vec![2, 7, 12, 19, 29]);

    let binding = BindingId(0);
    let strides = num_accessible_strides_partial_sum(binding, 6, &cumulative, true).unwrap();
    assert_eq!(strides, 1);
}

/// S6: two kernels each waiting on the other for items neither produces
/// deadlock on the second stalled segment.
#[test]
fn s6_mutual_wait_triggers_deadlock_detection() {
    let a = KernelId(0);
    let b = KernelId(1);
    let mut tg = TerminationGraph::new();
    tg.add_edge(TerminationVertex::PipelineInput, TerminationVertex::Kernel(a));
    tg.add_edge(TerminationVertex::Kernel(a), TerminationVertex::Kernel(b));
    tg.add_edge(TerminationVertex::Kernel(b), TerminationVertex::Kernel(a));
    tg.add_edge(TerminationVertex::Kernel(b), TerminationVertex::PipelineOutput);

    struct StuckRuntime;
    impl KernelRuntime for StuckRuntime {
        fn run_segment(&self, _kernel: KernelId, _segment: u64) -> SegmentOutcome {
            SegmentOutcome::stalled()
        }
    }

    let driver = PipelineDriver::new(vec![a, b], tg);
    let err = driver.run(&StuckRuntime, ThreadingMode::SingleThreaded, 1).unwrap_err();
    assert!(matches!(err, RuntimeError::Deadlock(_)));
}

#[test]
fn config_defaults_match_a_conservative_single_threaded_run() {
    let config = Config::default();
    assert_eq!(config.thread_num, 1);
    assert!(matches!(config.threading_mode, streamforge_runtime::ThreadingMode::SingleThreaded));
    assert!(config.enable_asserts);
}
