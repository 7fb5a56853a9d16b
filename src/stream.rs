//! Streaming update loop: one compute tick per captured frame.
//!
//! The loop is the single writer of the memory state. Each tick it pulls
//! exactly one frame from the capture collaborator (bounded wait), runs the
//! full compute cycle unconditionally, then — independently — hands a
//! snapshot to the sink collaborator if this tick is due for publication:
//!
//! ```text
//! awaiting frame → frame acquired → normalized → key projected
//!                → state updated → published → awaiting frame
//! ```
//!
//! Compute cadence and publish cadence are decoupled by design: compute must
//! keep pace with the audio stream, while rendering/playback may run slower.
//! A sink that cannot accept a snapshot costs one skipped publish, never a
//! stalled tick. Per-tick faults (capture overflow/timeout, non-finite
//! frames) are absorbed, counted, and logged — they never terminate the run.
//! The loop exits when the stop flag is raised between ticks or the source
//! reports [`CaptureFault::Closed`].
//!
//! Frames are processed strictly in arrival order, no batching: the state
//! after tick `n` reflects exactly frames `1..n`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CaptureFault;
use crate::{Echoic, Tick};

/// Capture collaborator: supplies one `D`-length frame per call.
///
/// Device adapters (microphone, file replay, network tap) implement this
/// outside the crate. Integer sample formats are converted to `f64` by the
/// source; amplitude scaling is the engine's job.
pub trait FrameSource {
    /// Block up to `timeout` for the next frame.
    ///
    /// `Overflow`/`Timeout` are recoverable — the loop skips the tick and
    /// asks again. `Closed` ends the run cleanly.
    fn capture(&mut self, timeout: Duration) -> Result<Vec<f64>, CaptureFault>;
}

/// What a sink sees on a published tick.
///
/// All fields are borrowed from the loop for the duration of the call; a
/// sink that defers consumption to another thread copies what it needs
/// (e.g. via [`AssociativeMemory::snapshot`] semantics — the `state` slice
/// cloned into an owned buffer). The live state matrix is never aliased
/// across threads.
///
/// [`AssociativeMemory::snapshot`]: crate::memory::AssociativeMemory::snapshot
pub struct TickSnapshot<'a> {
    /// 1-based index of the admitted frame this snapshot belongs to.
    pub tick: u64,
    /// Normalized frame written into memory this tick.
    pub write: &'a [f64],
    /// Key that addressed the memory.
    pub key: &'a [f64],
    /// Pre-update reconstruction (the read-back).
    pub read: &'a [f64],
    /// State matrix after the update, row-major `key_dim × frame_len`.
    pub state: &'a [f64],
    pub key_dim: usize,
    pub frame_len: usize,
}

/// Playback/visualization collaborator.
///
/// Return `false` when the snapshot cannot be accepted right now
/// (backpressure); the loop records a skipped publish and moves on.
pub trait FrameSink {
    fn publish(&mut self, snapshot: &TickSnapshot<'_>) -> bool;
}

/// Loop cadence parameters.
#[derive(Clone, Copy, Debug)]
pub struct LoopOptions {
    /// Bounded wait for the capture collaborator per tick.
    pub capture_timeout: Duration,
    /// Publish every n-th admitted frame. `1` publishes every tick,
    /// `0` disables publication entirely. Compute runs regardless.
    pub publish_every: u64,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            // Comfortably above one 2048-sample frame period at 44.1 kHz.
            capture_timeout: Duration::from_millis(100),
            publish_every: 1,
        }
    }
}

/// Counters for one run. Returned by [`StreamLoop::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Frames admitted and written into memory.
    pub ticks: u64,
    /// Ticks skipped on capture overflow/timeout.
    pub skipped_capture: u64,
    /// Ticks skipped on a recoverable compute fault (state untouched).
    pub skipped_fault: u64,
    /// Snapshots accepted by the sink.
    pub published: u64,
    /// Snapshots the sink refused (backpressure).
    pub publish_skipped: u64,
}

/// Drives an [`Echoic`] engine from a [`FrameSource`], optionally publishing
/// to a [`FrameSink`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use echoic::{CaptureFault, Echoic, EngineConfig, FrameSource, StreamLoop};
///
/// struct TwoFrames(u32);
/// impl FrameSource for TwoFrames {
///     fn capture(&mut self, _: Duration) -> Result<Vec<f64>, CaptureFault> {
///         if self.0 == 0 {
///             return Err(CaptureFault::Closed);
///         }
///         self.0 -= 1;
///         Ok(vec![100.0; 64])
///     }
/// }
///
/// let engine = Echoic::new(EngineConfig {
///     frame_len: 64,
///     key_dim: 4,
///     ..EngineConfig::default()
/// })
/// .unwrap();
///
/// let mut stream = StreamLoop::new(engine, TwoFrames(2));
/// let stats = stream.run();
/// assert_eq!(stats.ticks, 2);
/// ```
pub struct StreamLoop<S: FrameSource> {
    engine: Echoic,
    source: S,
    sink: Option<Box<dyn FrameSink>>,
    options: LoopOptions,
    stop: Arc<AtomicBool>,
    stats: LoopStats,
}

impl<S: FrameSource> StreamLoop<S> {
    pub fn new(engine: Echoic, source: S) -> Self {
        Self::with_options(engine, source, LoopOptions::default())
    }

    pub fn with_options(engine: Echoic, source: S, options: LoopOptions) -> Self {
        Self {
            engine,
            source,
            sink: None,
            options,
            stop: Arc::new(AtomicBool::new(false)),
            stats: LoopStats::default(),
        }
    }

    /// Attach the publication collaborator.
    pub fn set_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    /// Handle for external cancellation. Raising the flag stops the loop
    /// between ticks; the current tick always completes.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn engine(&self) -> &Echoic {
        &self.engine
    }

    /// Tear down the loop, releasing source and sink, and hand back the
    /// engine with its accumulated state.
    pub fn into_engine(self) -> Echoic {
        self.engine
    }

    /// Run until the stop flag is raised or the source closes.
    pub fn run(&mut self) -> LoopStats {
        while !self.stop.load(Ordering::Relaxed) {
            if !self.tick() {
                break;
            }
        }
        self.stats
    }

    /// Run until `max_ticks` further frames have been admitted (or the stop
    /// flag / source close ends the run earlier). Skipped ticks do not
    /// count toward the bound.
    pub fn run_ticks(&mut self, max_ticks: u64) -> LoopStats {
        let target = self.stats.ticks + max_ticks;
        while self.stats.ticks < target && !self.stop.load(Ordering::Relaxed) {
            if !self.tick() {
                break;
            }
        }
        self.stats
    }

    /// One cycle. Returns `false` when the source has closed.
    fn tick(&mut self) -> bool {
        let raw = match self.source.capture(self.options.capture_timeout) {
            Ok(raw) => raw,
            Err(CaptureFault::Closed) => {
                debug!("capture source closed, ending run");
                return false;
            }
            Err(fault) => {
                warn!(%fault, "capture fault, tick skipped");
                self.stats.skipped_capture += 1;
                return true;
            }
        };

        // Compute is unconditional for every admitted frame.
        let tick = match self.engine.step(&raw) {
            Ok(tick) => tick,
            Err(fault) => {
                warn!(%fault, "frame rejected, state unchanged");
                self.stats.skipped_fault += 1;
                return true;
            }
        };
        self.stats.ticks += 1;

        // Publication is independent and may be throttled or refused.
        let due = self.options.publish_every != 0
            && self.stats.ticks % self.options.publish_every == 0;
        if due {
            self.publish(&tick);
        }

        true
    }

    fn publish(&mut self, tick: &Tick) {
        let sink = match self.sink.as_mut() {
            Some(sink) => sink,
            None => return,
        };
        let memory = self.engine.memory();
        let snapshot = TickSnapshot {
            tick: self.stats.ticks,
            write: &tick.write,
            key: &tick.key,
            read: &tick.read,
            state: memory.state(),
            key_dim: memory.key_dim(),
            frame_len: memory.frame_len(),
        };
        if sink.publish(&snapshot) {
            self.stats.published += 1;
        } else {
            debug!(tick = self.stats.ticks, "sink busy, publish skipped");
            self.stats.publish_skipped += 1;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Source that replays a script of capture results, then closes.
    struct ScriptedSource {
        script: VecDeque<Result<Vec<f64>, CaptureFault>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<f64>, CaptureFault>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn capture(&mut self, _timeout: Duration) -> Result<Vec<f64>, CaptureFault> {
            self.script.pop_front().unwrap_or(Err(CaptureFault::Closed))
        }
    }

    /// Sink that records which ticks it saw, shared with the test body.
    struct RecordingSink {
        seen: Arc<Mutex<Vec<u64>>>,
        accept: bool,
    }

    impl FrameSink for RecordingSink {
        fn publish(&mut self, snapshot: &TickSnapshot<'_>) -> bool {
            if self.accept {
                self.seen.lock().unwrap().push(snapshot.tick);
            }
            self.accept
        }
    }

    fn engine(frame_len: usize, key_dim: usize) -> Echoic {
        Echoic::new(EngineConfig {
            frame_len,
            key_dim,
            seed: 42,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn frame(t: usize, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| 500.0 * ((i + 1) as f64 * (t + 1) as f64 * 0.03).sin())
            .collect()
    }

    #[test]
    fn test_processes_frames_in_order() {
        let frames: Vec<Vec<f64>> = (0..5).map(|t| frame(t, 32)).collect();
        let script = frames.iter().cloned().map(Ok).collect();

        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));
        let stats = stream.run();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.skipped_capture, 0);
        assert_eq!(stats.skipped_fault, 0);

        // Same frames through a bare engine give the same final state.
        let mut reference = engine(32, 4);
        for f in &frames {
            reference.step(f).unwrap();
        }
        assert_eq!(stream.engine().memory().state(), reference.memory().state());
    }

    #[test]
    fn test_capture_faults_skip_tick_and_continue() {
        let script = vec![
            Ok(frame(0, 32)),
            Err(CaptureFault::Overflow),
            Err(CaptureFault::Timeout),
            Ok(frame(1, 32)),
        ];
        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));
        let stats = stream.run();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.skipped_capture, 2);
    }

    #[test]
    fn test_non_finite_frame_skipped_state_preserved() {
        let mut bad = frame(1, 32);
        bad[7] = f64::NAN;
        let script = vec![Ok(frame(0, 32)), Ok(bad), Ok(frame(2, 32))];

        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));
        let stats = stream.run();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.skipped_fault, 1);

        // State reflects exactly the two valid frames.
        let mut reference = engine(32, 4);
        reference.step(&frame(0, 32)).unwrap();
        reference.step(&frame(2, 32)).unwrap();
        assert_eq!(stream.engine().memory().state(), reference.memory().state());
    }

    #[test]
    fn test_publish_throttling() {
        let script = (0..6).map(|t| Ok(frame(t, 32))).collect();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut stream = StreamLoop::with_options(
            engine(32, 4),
            ScriptedSource::new(script),
            LoopOptions {
                publish_every: 2,
                ..LoopOptions::default()
            },
        );
        stream.set_sink(Box::new(RecordingSink {
            seen: Arc::clone(&seen),
            accept: true,
        }));

        let stats = stream.run();
        assert_eq!(stats.ticks, 6);
        assert_eq!(stats.published, 3);
        assert_eq!(*seen.lock().unwrap(), vec![2, 4, 6]);
    }

    #[test]
    fn test_publish_disabled() {
        let script = (0..4).map(|t| Ok(frame(t, 32))).collect();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut stream = StreamLoop::with_options(
            engine(32, 4),
            ScriptedSource::new(script),
            LoopOptions {
                publish_every: 0,
                ..LoopOptions::default()
            },
        );
        stream.set_sink(Box::new(RecordingSink {
            seen: Arc::clone(&seen),
            accept: true,
        }));

        let stats = stream.run();
        assert_eq!(stats.ticks, 4);
        assert_eq!(stats.published, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sink_backpressure_never_stalls_compute() {
        let script = (0..4).map(|t| Ok(frame(t, 32))).collect();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));
        stream.set_sink(Box::new(RecordingSink {
            seen,
            accept: false,
        }));

        let stats = stream.run();
        assert_eq!(stats.ticks, 4, "compute must not depend on the sink");
        assert_eq!(stats.published, 0);
        assert_eq!(stats.publish_skipped, 4);
    }

    #[test]
    fn test_bounded_channel_sink_drops_when_full() {
        // The cross-thread publication pattern: the sink copies what it
        // needs into a bounded channel; a full channel is one skipped
        // publish, never a stalled tick.
        struct ChannelSink {
            tx: std::sync::mpsc::SyncSender<(u64, Vec<f64>)>,
        }
        impl FrameSink for ChannelSink {
            fn publish(&mut self, snapshot: &TickSnapshot<'_>) -> bool {
                self.tx
                    .try_send((snapshot.tick, snapshot.read.to_vec()))
                    .is_ok()
            }
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let script = (0..3).map(|t| Ok(frame(t, 32))).collect();
        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));
        stream.set_sink(Box::new(ChannelSink { tx }));

        let stats = stream.run();
        // Receiver never drained: the first publish fills the buffer and
        // the remaining ones drop.
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.published, 1);
        assert_eq!(stats.publish_skipped, 2);

        let (tick, read) = rx.recv().unwrap();
        assert_eq!(tick, 1);
        assert_eq!(read.len(), 32);
    }

    #[test]
    fn test_stop_flag_honored() {
        let script = (0..100).map(|t| Ok(frame(t, 32))).collect();
        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));

        stream.stop_handle().store(true, Ordering::Relaxed);
        let stats = stream.run();
        assert_eq!(stats.ticks, 0, "raised stop flag must preempt the first tick");
    }

    #[test]
    fn test_run_ticks_bounds_admitted_frames() {
        let script = (0..10).map(|t| Ok(frame(t, 32))).collect();
        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));

        let stats = stream.run_ticks(3);
        assert_eq!(stats.ticks, 3);
        let stats = stream.run_ticks(2);
        assert_eq!(stats.ticks, 5);
    }

    #[test]
    fn test_into_engine_returns_accumulated_state() {
        let script = vec![Ok(frame(0, 32))];
        let mut stream = StreamLoop::new(engine(32, 4), ScriptedSource::new(script));
        stream.run();
        let engine = stream.into_engine();
        assert_eq!(engine.memory().ticks(), 1);
    }
}
