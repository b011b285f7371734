use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use nn_bridge_core::{
    Backend, BackendHandle, BridgeError, MethodParams, NnProcessor, ProcessorConfig,
    ProcessorStatus, StubBackend,
};

const BLOCK: usize = 64;
const WINDOW: usize = 256;

/// Stub backend that sleeps before each pass and can fail or panic on
/// selected pass numbers (1-based).
struct ScriptedBackend {
    inner: StubBackend,
    delay: Duration,
    fail_on: Option<usize>,
    panic_on: Option<usize>,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn new(inner: StubBackend) -> Self {
        Self {
            inner,
            delay: Duration::ZERO,
            fail_on: None,
            panic_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Backend for ScriptedBackend {
    fn load(&mut self, path: &Path) -> Result<(), BridgeError> {
        self.inner.load(path)
    }

    fn reload(&mut self) -> Result<(), BridgeError> {
        self.inner.reload()
    }

    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn method_params(&self, method: &str) -> Option<MethodParams> {
        self.inner.method_params(method)
    }

    fn higher_ratio(&self) -> usize {
        self.inner.higher_ratio()
    }

    fn perform(
        &mut self,
        inputs: &[Vec<f32>],
        outputs: &mut [Vec<f32>],
        n_vec: usize,
        method: &str,
        n_batches: usize,
    ) -> Result<(), BridgeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        thread::sleep(self.delay);

        if self.panic_on == Some(call) {
            panic!("scripted panic on pass {call}");
        }
        if self.fail_on == Some(call) {
            return Err(BridgeError::Inference(format!("scripted failure on pass {call}")));
        }

        let result = self.inner.perform(inputs, outputs, n_vec, method, n_batches);
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn settable_attributes(&self) -> Vec<String> {
        self.inner.settable_attributes()
    }

    fn set_attribute(&mut self, name: &str, args: &[String]) -> Result<(), BridgeError> {
        self.inner.set_attribute(name, args)
    }

    fn attribute_as_string(&self, name: &str) -> Result<String, BridgeError> {
        self.inner.attribute_as_string(name)
    }

    fn available_layers(&self) -> Vec<String> {
        self.inner.available_layers()
    }

    fn layer_weights(&self, layer: &str) -> Result<Vec<f32>, BridgeError> {
        self.inner.layer_weights(layer)
    }

    fn set_layer_weights(&mut self, layer: &str, weights: &[f32]) -> Result<(), BridgeError> {
        self.inner.set_layer_weights(layer, weights)
    }
}

fn synchronous_config() -> ProcessorConfig {
    ProcessorConfig {
        buffer_size: 0,
        block_size: BLOCK,
        ..ProcessorConfig::default()
    }
}

fn background_config() -> ProcessorConfig {
    ProcessorConfig {
        buffer_size: WINDOW,
        block_size: BLOCK,
        ..ProcessorConfig::default()
    }
}

fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i + 1) as f32 / 1024.0).collect()
}

/// Feed `input` block by block and collect the mono output stream.
fn run_stream(proc: &mut NnProcessor, input: &[f32]) -> Vec<f32> {
    run_stream_with_block(proc, input, BLOCK)
}

fn run_stream_with_block(proc: &mut NnProcessor, input: &[f32], block: usize) -> Vec<f32> {
    let mut output = vec![0.0f32; input.len()];
    for (inp, out) in input.chunks(block).zip(output.chunks_mut(block)) {
        proc.perform(&[inp], &mut [out]);
    }
    output
}

fn synchronous_with_block(block: usize) -> NnProcessor {
    let config = ProcessorConfig {
        block_size: block,
        ..synchronous_config()
    };
    let stub = StubBackend::loaded().with_higher_ratio(WINDOW);
    NnProcessor::new(config, BackendHandle::new(stub)).unwrap()
}

#[test]
fn synchronous_window_passes_every_sample_once() {
    let stub = StubBackend::loaded().with_higher_ratio(WINDOW);
    let mut proc = NnProcessor::new(synchronous_config(), BackendHandle::new(stub)).unwrap();
    assert_eq!(proc.negotiated().buffer_size, WINDOW);
    assert!(!proc.negotiated().use_background);

    let input = ramp(WINDOW);
    let output = run_stream(&mut proc, &input);

    let snap = proc.diagnostics_snapshot();
    assert_eq!(snap.callbacks, 4);
    assert_eq!(snap.passes, 1);
    // Three blocks were popped before the window existed.
    assert_eq!(&output[..WINDOW - BLOCK], &vec![0.0; WINDOW - BLOCK][..]);
    assert_eq!(&output[WINDOW - BLOCK..], &input[..BLOCK]);
    assert_eq!(proc.output_fill(), WINDOW - BLOCK);

    // Keep going: the output is the input delayed by three blocks, with
    // nothing dropped and nothing duplicated.
    let more = ramp(3 * WINDOW);
    let mut proc = NnProcessor::new(
        synchronous_config(),
        BackendHandle::new(StubBackend::loaded().with_higher_ratio(WINDOW)),
    )
    .unwrap();
    let output = run_stream(&mut proc, &more);
    let delay = WINDOW - BLOCK;
    for k in delay..more.len() {
        assert_eq!(output[k], more[k - delay], "sample {k}");
    }
}

#[test]
fn background_mode_adds_one_window_of_latency() {
    let stub = StubBackend::loaded().with_gain(0.5);
    let mut proc = NnProcessor::new(background_config(), BackendHandle::new(stub)).unwrap();
    assert!(proc.negotiated().use_background);

    let input = ramp(4 * WINDOW);
    let output = run_stream(&mut proc, &input);

    let delay = 2 * WINDOW - BLOCK;
    assert!(output[..delay].iter().all(|s| *s == 0.0));
    for k in delay..input.len() {
        assert_relative_eq!(output[k], input[k - delay] * 0.5);
    }

    let snap = proc.diagnostics_snapshot();
    assert_eq!(snap.windows, 4);
    assert_eq!(snap.passes, 4);
    assert_eq!(snap.inference_errors, 0);
    assert!(proc.has_pending_pass());
}

#[test]
fn first_background_window_does_not_block_the_callback() {
    let mut backend = ScriptedBackend::new(StubBackend::loaded());
    backend.delay = Duration::from_millis(200);
    let mut proc = NnProcessor::new(background_config(), BackendHandle::new(backend)).unwrap();

    let block = vec![0.1f32; BLOCK];
    let mut out = vec![0.0f32; BLOCK];
    for _ in 0..3 {
        proc.perform(&[&block[..]], &mut [&mut out[..]]);
    }

    let start = Instant::now();
    proc.perform(&[&block[..]], &mut [&mut out[..]]);
    let elapsed = start.elapsed();

    assert!(proc.has_pending_pass());
    assert_eq!(proc.status(), ProcessorStatus::Computing);
    assert!(
        elapsed < Duration::from_millis(100),
        "first window blocked the callback for {:?}",
        elapsed
    );

    // The next window arrives immediately and has to wait for the join.
    for _ in 0..4 {
        proc.perform(&[&block[..]], &mut [&mut out[..]]);
    }
    assert_eq!(proc.diagnostics_snapshot().joins_waited, 1);
}

#[test]
fn teardown_joins_outstanding_pass() {
    let mut backend = ScriptedBackend::new(StubBackend::loaded());
    backend.delay = Duration::from_millis(100);
    let completed = Arc::clone(&backend.completed);
    let mut proc = NnProcessor::new(background_config(), BackendHandle::new(backend)).unwrap();

    run_stream(&mut proc, &ramp(WINDOW));
    assert!(proc.has_pending_pass());
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    drop(proc);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_pass_yields_one_silent_window_then_recovers() {
    let mut backend = ScriptedBackend::new(StubBackend::loaded().with_higher_ratio(WINDOW));
    backend.fail_on = Some(1);
    let mut proc = NnProcessor::new(synchronous_config(), BackendHandle::new(backend)).unwrap();

    let input = ramp(3 * WINDOW);
    let output = run_stream(&mut proc, &input);

    let delay = WINDOW - BLOCK;
    // Window 1 failed: silence where its samples would have played.
    assert!(output[..delay + WINDOW].iter().all(|s| *s == 0.0));
    // Window 2 onward plays normally.
    for k in delay + WINDOW..input.len() {
        assert_eq!(output[k], input[k - delay], "sample {k}");
    }
    assert_eq!(proc.diagnostics_snapshot().inference_errors, 1);
}

#[test]
fn background_panic_is_contained() {
    let mut backend = ScriptedBackend::new(StubBackend::loaded());
    backend.panic_on = Some(1);
    let mut proc = NnProcessor::new(background_config(), BackendHandle::new(backend)).unwrap();

    let input = ramp(4 * WINDOW);
    let output = run_stream(&mut proc, &input);

    let delay = 2 * WINDOW - BLOCK;
    // Window 1 panicked: its slot plays silence; window 2 comes through.
    assert!(output[..delay + WINDOW].iter().all(|s| *s == 0.0));
    for k in delay + WINDOW..input.len() {
        assert_eq!(output[k], input[k - delay], "sample {k}");
    }
    assert_eq!(proc.diagnostics_snapshot().inference_errors, 1);
}

#[test]
fn multichannel_method_keeps_channels_in_lockstep() {
    let params = MethodParams {
        in_channels: 2,
        in_ratio: 1,
        out_channels: 2,
        out_ratio: 1,
    };
    let stub = StubBackend::loaded()
        .with_method("stereo", params)
        .with_higher_ratio(WINDOW);
    let config = ProcessorConfig {
        method: "stereo".into(),
        ..synchronous_config()
    };
    let mut proc = NnProcessor::new(config, BackendHandle::new(stub)).unwrap();
    assert_eq!(proc.method(), "stereo");

    let left = vec![0.25f32; BLOCK];
    let right = vec![-0.75f32; BLOCK];
    let mut out_l = vec![0.0f32; BLOCK];
    let mut out_r = vec![0.0f32; BLOCK];
    for _ in 0..WINDOW / BLOCK {
        proc.perform(&[&left[..], &right[..]], &mut [&mut out_l[..], &mut out_r[..]]);
    }
    assert_eq!(out_l, left);
    assert_eq!(out_r, right);
}

#[test]
fn host_block_larger_than_window_passes_every_sample() {
    let block = 2 * WINDOW;
    let mut proc = synchronous_with_block(block);
    assert_eq!(proc.negotiated().buffer_size, block);

    let input = ramp(8 * WINDOW);
    let output = run_stream_with_block(&mut proc, &input, block);
    assert_eq!(output, input);
    assert_eq!(proc.diagnostics_snapshot().windows, 4);
}

#[test]
fn host_block_not_dividing_window_grows_the_window() {
    let block = 96;
    let mut proc = synchronous_with_block(block);
    let window = proc.negotiated().buffer_size;
    assert_eq!(window, 768);
    assert_eq!(window % block, 0);
    assert_eq!(window % WINDOW, 0);

    let input = ramp(20 * block);
    let output = run_stream_with_block(&mut proc, &input, block);
    let delay = window - block;
    assert!(output[..delay].iter().all(|s| *s == 0.0));
    for k in delay..input.len() {
        assert_eq!(output[k], input[k - delay], "sample {k}");
    }
}

#[test]
fn prepare_with_new_block_size_keeps_stream_intact() {
    let mut proc = synchronous_with_block(BLOCK);
    proc.prepare(2 * WINDOW).unwrap();
    assert_eq!(proc.negotiated().buffer_size, 2 * WINDOW);

    let input = ramp(4 * WINDOW);
    let output = run_stream_with_block(&mut proc, &input, 2 * WINDOW);
    assert_eq!(output, input);
}
