//! Streaming Recall: the full engine driven by a synthetic capture source.
//!
//! Demonstrates the streaming associative memory end to end:
//!
//! 1. Build an engine from a config (seeded, deterministic)
//! 2. Stream frames from a synthetic oscillator source through the loop
//! 3. Watch the read-back converge toward the input as the state accumulates
//! 4. Inject capture faults and a NaN glitch — the loop absorbs both
//! 5. Re-run with the same seed and frames — identical read-backs
//!
//! Key insight: there is no training phase. Every frame is simultaneously a
//! write and a read; after a single exposure of a repeating waveform the
//! memory reads it back almost exactly.
//!
//! Run: cargo run --example streaming_recall --release

use std::time::Duration;

use echoic::{
    math, CaptureFault, Echoic, EngineConfig, FrameSink, FrameSource, LoopOptions, StreamLoop,
    TickSnapshot,
};
use rand::prelude::*;

const FRAME_LEN: usize = 2048;
const KEY_DIM: usize = 32;

// =============================================================================
// Synthetic capture source
// =============================================================================

/// Cycles through a small set of "chords" (sums of sine partials at i16-ish
/// amplitude), with light noise, an occasional buffer overflow, and one NaN
/// glitch — the misbehaviors a real capture device exhibits.
struct OscillatorSource {
    chords: Vec<Vec<f64>>,
    rng: StdRng,
    ticks_left: usize,
    glitch_at: Option<usize>,
}

impl OscillatorSource {
    fn new(ticks: usize, glitch_at: Option<usize>) -> Self {
        let partials: [&[f64]; 3] = [
            &[220.0, 277.2, 329.6], // A major
            &[246.9, 311.1, 370.0], // B major
            &[196.0, 246.9, 293.7], // G major
        ];
        let sample_rate = 44_100.0;
        let chords = partials
            .iter()
            .map(|freqs| {
                (0..FRAME_LEN)
                    .map(|i| {
                        freqs
                            .iter()
                            .map(|f| {
                                8000.0 * (2.0 * std::f64::consts::PI * f * i as f64 / sample_rate)
                                    .sin()
                            })
                            .sum()
                    })
                    .collect()
            })
            .collect();
        Self {
            chords,
            rng: StdRng::seed_from_u64(7),
            ticks_left: ticks,
            glitch_at,
        }
    }
}

impl FrameSource for OscillatorSource {
    fn capture(&mut self, _timeout: Duration) -> Result<Vec<f64>, CaptureFault> {
        if self.ticks_left == 0 {
            return Err(CaptureFault::Closed);
        }
        self.ticks_left -= 1;
        let tick = self.ticks_left;
        let glitch = self.glitch_at == Some(tick);

        // Roughly one overflow per 25 frames, like a busy capture thread.
        if !glitch && self.rng.gen::<f64>() < 0.04 {
            return Err(CaptureFault::Overflow);
        }

        let mut frame = self.chords[tick % self.chords.len()].clone();
        for sample in &mut frame {
            *sample += self.rng.gen_range(-20.0..20.0);
        }
        if glitch {
            frame[FRAME_LEN / 2] = f64::NAN;
        }
        Ok(frame)
    }
}

// =============================================================================
// Console sink
// =============================================================================

/// Reports recall quality (cosine between write and read-back) per publish.
struct ConsoleSink;

impl FrameSink for ConsoleSink {
    fn publish(&mut self, snapshot: &TickSnapshot<'_>) -> bool {
        let recall = math::cosine(snapshot.write, snapshot.read);
        let state_norm = math::l2_norm(snapshot.state);
        println!(
            "  [tick {:>3}]  recall={:+.4}  state_norm={:.3}",
            snapshot.tick, recall, state_norm
        );
        true
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn print_header(title: &str) {
    println!();
    println!("{}", "=".repeat(70));
    println!("  {}", title);
    println!("{}", "=".repeat(70));
}

fn run_once(ticks: usize, glitch_at: Option<usize>, verbose: bool) -> (Echoic, Vec<f64>) {
    let config = EngineConfig {
        frame_len: FRAME_LEN,
        key_dim: KEY_DIM,
        seed: 42,
        ..EngineConfig::default()
    };
    let engine = Echoic::new(config).expect("config is valid");

    let mut stream = StreamLoop::with_options(
        engine,
        OscillatorSource::new(ticks, glitch_at),
        LoopOptions {
            publish_every: if verbose { 10 } else { 0 },
            ..LoopOptions::default()
        },
    );
    if verbose {
        stream.set_sink(Box::new(ConsoleSink));
    }

    let stats = stream.run();
    if verbose {
        println!();
        println!("  Run statistics:");
        println!("    frames admitted:     {}", stats.ticks);
        println!("    capture skips:       {}", stats.skipped_capture);
        println!("    compute skips:       {}", stats.skipped_fault);
        println!("    snapshots published: {}", stats.published);
    }

    let engine = stream.into_engine();
    let reads: Vec<f64> = {
        // Probe: recall quality for each chord after the run.
        let mut probe_source = OscillatorSource::new(3, None);
        let mut qualities = Vec::new();
        let mut probe_engine = engine.clone();
        for _ in 0..3 {
            if let Ok(frame) = probe_source.capture(Duration::from_millis(0)) {
                if let Ok(tick) = probe_engine.step(&frame) {
                    qualities.push(math::cosine(&tick.write, &tick.read));
                }
            }
        }
        qualities
    };
    (engine, reads)
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    // =========================================================================
    // PHASE 1 — STREAMING CONVERGENCE
    // =========================================================================
    print_header("PHASE 1: Streaming Recall (delta rule, online)");
    println!("  Engine: D={}, K={}, beta=1.0, seed=42", FRAME_LEN, KEY_DIM);
    println!("  Source: 3 rotating chords + noise + capture overflows + 1 NaN glitch");
    println!();

    let (engine, probe) = run_once(120, Some(60), true);

    println!();
    println!("  Post-run recall per chord (cosine, 1.0 = exact):");
    for (i, q) in probe.iter().enumerate() {
        println!("    chord {}: {:+.4}", i, q);
    }
    println!(
        "  Memory absorbed {} frames; glitched frame skipped, state intact.",
        engine.memory().ticks()
    );

    // =========================================================================
    // PHASE 2 — DETERMINISM
    // =========================================================================
    print_header("PHASE 2: Determinism (same seed, same frames)");

    let (engine_a, _) = run_once(40, None, false);
    let (engine_b, _) = run_once(40, None, false);
    let identical = engine_a.memory().state() == engine_b.memory().state();
    println!(
        "  Two runs, identical states: {}",
        if identical { "YES ✓" } else { "NO ✗" }
    );

    // =========================================================================
    // PHASE 3 — SNAPSHOT
    // =========================================================================
    print_header("PHASE 3: Display-ready snapshot");

    let snapshot = engine.memory().snapshot();
    println!(
        "  StateSnapshot: {}x{} matrix after {} ticks, norm {:.3}",
        snapshot.key_dim,
        snapshot.frame_len,
        snapshot.ticks,
        math::l2_norm(&snapshot.state)
    );
    println!("  (serializable for external visualizers; never a restore format)");
    println!();
}
