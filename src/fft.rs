// GyroWatch — Spectral Engine
//
// Sliding overlapped short-time analysis over the angle signal: a staging
// ring buffer decouples the 1 kHz sample feed from the (slower) transform
// cadence. Every OVERLAP new samples, the N-wide complex input slides left
// and a Hann-windowed forward FFT runs over it.

use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::ringbuf::{Reader, RingBuffer};

/// Windowed, overlap-driven FFT over a compile-time-sized sample window.
///
/// `N` is the transform length, `OVERLAP` the number of fresh samples that
/// trigger a recompute. Call [`feed`](Self::feed) once per sample and
/// [`compute`](Self::compute) exactly once per `true` return — recomputing
/// without new data would reprocess the stale window tail and is rejected.
pub struct SpectralEngine<const N: usize, const OVERLAP: usize> {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,       // Hann taper, computed once
    input: Vec<Complex32>,  // sliding complex input, length N
    work: Vec<Complex32>,   // windowed transform buffer, length N
    scratch: Vec<Complex32>,
    power: Vec<f32>,        // power spectrum of the lower N/2 bins
    staging: RingBuffer<Complex32, N>,
    reader: Reader<Complex32, N>,
}

impl<const N: usize, const OVERLAP: usize> SpectralEngine<N, OVERLAP> {
    pub fn new() -> Self {
        assert!(OVERLAP > 0 && OVERLAP < N, "overlap must be within the window");

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(N);
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        // Hann window, periodic form — tapers the window edges to reduce
        // spectral leakage.
        let window = (0..N)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / N as f32).cos())
            })
            .collect();

        let staging = RingBuffer::new();
        let reader = staging.reader();

        Self {
            fft,
            window,
            input: vec![Complex32::new(0.0, 0.0); N],
            work: vec![Complex32::new(0.0, 0.0); N],
            scratch,
            power: vec![0.0; N / 2],
            staging,
            reader,
        }
    }

    /// Stage one complex sample. Returns `true` once at least `OVERLAP`
    /// unconsumed samples are pending, signalling that a transform is due.
    pub fn feed(&mut self, re: f32, im: f32) -> bool {
        self.staging.append(Complex32::new(re, im));
        self.reader.count() >= OVERLAP
    }

    /// Slide the analysis window and run the transform.
    ///
    /// Shifts the complex input left by `OVERLAP`, refills the freed tail
    /// from the staging reader, applies the window and performs the forward
    /// FFT in place on the working buffer.
    pub fn compute(&mut self) {
        assert!(
            self.reader.count() >= OVERLAP,
            "compute() requires a preceding true-returning feed()"
        );

        self.input.copy_within(OVERLAP.., 0);
        let offset = N - OVERLAP;
        for i in 0..OVERLAP {
            self.input[offset + i] = self.reader.read();
        }

        for i in 0..N {
            self.work[i] = self.input[i] * self.window[i];
        }

        self.fft
            .process_with_scratch(&mut self.work, &mut self.scratch);
    }

    /// Derive the normalized power spectrum (|X|²/N) of the lower half of
    /// the latest transform, via the value × conjugate product.
    pub fn postprocess(&mut self) {
        let norm = 1.0 / N as f32;
        for i in 0..N / 2 {
            let c = self.work[i];
            self.power[i] = (c * c.conj()).re * norm;
        }
    }

    /// Power spectrum produced by the last [`postprocess`](Self::postprocess).
    pub fn spectrum(&self) -> &[f32] {
        &self.power
    }

    /// Export the full frequency-domain result as interleaved re/im pairs,
    /// independent of the transform backend's internal layout. Resizes the
    /// container and returns the number of values written.
    pub fn copy_fft(&self, container: &mut Vec<f32>) -> usize {
        container.resize(N * 2, 0.0);
        for (i, c) in self.work.iter().enumerate() {
            container[i * 2] = c.re;
            container[i * 2 + 1] = c.im;
        }
        container.len()
    }

    pub fn size(&self) -> usize {
        N
    }
}

impl<const N: usize, const OVERLAP: usize> Default for SpectralEngine<N, OVERLAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_signals_after_exactly_overlap_samples() {
        let mut engine: SpectralEngine<64, 8> = SpectralEngine::new();

        for i in 0..7 {
            assert!(!engine.feed(i as f32, 0.0), "premature at sample {i}");
        }
        assert!(engine.feed(7.0, 0.0));

        // Consuming the batch re-arms the threshold.
        engine.compute();
        for i in 0..7 {
            assert!(!engine.feed(i as f32, 0.0));
        }
        assert!(engine.feed(7.0, 0.0));
    }

    #[test]
    #[should_panic(expected = "true-returning feed")]
    fn compute_without_fresh_samples_panics() {
        let mut engine: SpectralEngine<64, 8> = SpectralEngine::new();
        engine.compute();
    }

    #[test]
    fn sine_peaks_at_its_own_bin() {
        const N: usize = 256;
        const BIN: usize = 32;
        let mut engine: SpectralEngine<N, 16> = SpectralEngine::new();

        let mut computed = 0;
        for n in 0..1024 {
            let phase = 2.0 * std::f32::consts::PI * BIN as f32 * n as f32 / N as f32;
            if engine.feed(phase.sin(), 0.0) {
                engine.compute();
                engine.postprocess();
                computed += 1;
            }
        }
        assert!(computed > 0);

        let spectrum = engine.spectrum();
        assert_eq!(spectrum.len(), N / 2);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!(
            peak.abs_diff(BIN) <= 1,
            "peak at bin {peak}, expected {BIN}±1"
        );
    }

    #[test]
    fn postprocess_yields_squared_magnitude_over_n() {
        const N: usize = 64;
        let mut engine: SpectralEngine<N, 8> = SpectralEngine::new();
        for n in 0..N {
            let phase = 2.0 * std::f32::consts::PI * 5.0 * n as f32 / N as f32;
            if engine.feed(phase.sin() + 0.3, 0.0) {
                engine.compute();
            }
        }
        engine.postprocess();

        // Each bin must be |X|²/N of the exported complex result, not |X|/N.
        let mut raw = Vec::new();
        engine.copy_fft(&mut raw);
        for (i, &p) in engine.spectrum().iter().enumerate() {
            let (re, im) = (raw[i * 2], raw[i * 2 + 1]);
            let expected = (re * re + im * im) / N as f32;
            assert!(
                (p - expected).abs() <= 1e-4 * expected.max(1.0),
                "bin {i}: got {p}, expected {expected}"
            );
        }
    }

    #[test]
    fn copy_fft_exports_interleaved_pairs() {
        const N: usize = 64;
        let mut engine: SpectralEngine<N, 8> = SpectralEngine::new();
        for _ in 0..N {
            if engine.feed(1.0, 0.0) {
                engine.compute();
            }
        }

        let mut out = Vec::new();
        let written = engine.copy_fft(&mut out);
        assert_eq!(written, N * 2);
        assert_eq!(out.len(), N * 2);

        // A constant input concentrates energy in the DC bin: its real part
        // dominates every other exported value.
        let dc = out[0].abs();
        assert!(dc > 0.0);
        assert!(out[2..].iter().all(|v| v.abs() < dc));
    }
}
