// GyroWatch — Spectrum Bar Mapper
//
// Reduces a spectrum slice of arbitrary length to a fixed number of display
// columns. Longer inputs are decimated with a Bresenham-style accumulator
// (every bin lands in exactly one contiguous bucket); shorter inputs are
// linearly interpolated up to the column count.

use crate::drivers::display::Frame;

fn lerp(a: f32, b: f32, f: f32) -> f32 {
    a + f * (b - a)
}

/// Value transform applied before the intensity scaling in
/// [`FftDisplay::render`].
pub trait Transform {
    /// Values below this floor (post-transform) are clamped, not scaled.
    const FLOOR: Option<f32> = None;

    fn transform(value: f32) -> f32;
}

/// Pass-through transform.
pub struct Linear;

impl Transform for Linear {
    fn transform(value: f32) -> f32 {
        value
    }
}

/// Decibel-style transform with a fixed display floor.
pub struct Decibel;

impl Transform for Decibel {
    const FLOOR: Option<f32> = Some(-80.0);

    fn transform(value: f32) -> f32 {
        20.0 * value.max(f32::MIN_POSITIVE).log10()
    }
}

/// Downsampling bar mapper: `W` output columns, one intensity pixel each.
pub struct FftDisplay<T: Transform, const W: usize> {
    bars: [f32; W],
    colors: [u8; W],
    // Intensity scale carried across frames; low-pass filtered so a single
    // loud frame does not make the whole spectrogram flicker.
    smoothed_scale: Option<f32>,
    scale_gain: f32,
    _transform: core::marker::PhantomData<T>,
}

impl<T: Transform, const W: usize> FftDisplay<T, W> {
    /// Mapper without scale smoothing: every frame is scaled by its own
    /// dynamic range.
    pub fn new() -> Self {
        Self::with_scale_smoothing(1.0)
    }

    /// Mapper whose intensity scale follows frame-to-frame changes with the
    /// given low-pass gain (1.0 = immediate, 0.01 = heavy smoothing).
    pub fn with_scale_smoothing(gain: f32) -> Self {
        assert!(W > 1, "bar mapper needs at least two columns");
        assert!(gain > 0.0 && gain <= 1.0);
        Self {
            bars: [0.0; W],
            colors: [0; W],
            smoothed_scale: None,
            scale_gain: gain,
            _transform: core::marker::PhantomData,
        }
    }

    /// Fold `values` into the `W` bar accumulators.
    pub fn update(&mut self, values: &[f32]) {
        assert!(!values.is_empty(), "cannot map an empty spectrum slice");
        self.bars.fill(0.0);
        let len = values.len();

        if len >= W {
            // Bresenham-style decimation: advance the output bucket whenever
            // the running remainder crosses zero, averaging what fell in.
            let mut accu = len as i32;
            let mut divider = 0i32;
            let mut i = 0;
            for &value in values {
                self.bars[i] += value;
                divider += 1;
                accu -= W as i32;
                if accu <= 0 {
                    self.bars[i] /= divider as f32;
                    divider = 0;
                    accu += len as i32;
                    i += 1;
                }
            }
        } else {
            for i in 0..W {
                let position = lerp(0.0, (len - 1) as f32, i as f32 / (W - 1) as f32);
                let lower = position.floor() as usize;
                let upper = position.ceil() as usize;
                self.bars[i] = if lower == upper {
                    values[lower]
                } else {
                    lerp(values[lower], values[upper], position - lower as f32)
                };
            }
        }
    }

    /// Map the current bars to palette intensities and write one pixel per
    /// column at row `y`, starting at column `x`.
    pub fn render(&mut self, frame: &mut Frame, x: i32, y: i32) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut transformed = [0.0f32; W];

        for (dst, &bar) in transformed.iter_mut().zip(self.bars.iter()) {
            let mut value = T::transform(bar);
            if let Some(floor) = T::FLOOR {
                value = value.max(floor);
            }
            min = min.min(value);
            max = max.max(value);
            *dst = value;
        }

        // Zero dynamic range must not divide by zero.
        let height = (max - min).max(f32::EPSILON);
        log::debug!("bars: height {height:.2}, max {max:.2}, min {min:.2}");
        let target = 253.0 / height;

        let scale = match self.smoothed_scale {
            Some(prev) => prev + (target - prev) * self.scale_gain,
            None => target,
        };
        self.smoothed_scale = Some(scale);

        for (i, &value) in transformed.iter().enumerate() {
            let color = (2.0 + (value - min) * scale).clamp(2.0, 255.0) as u8;
            self.colors[i] = color;
            frame.draw_pixel(x + i as i32, y, color);
        }
    }

    /// Forget the carried intensity scale (e.g. when the view changes).
    pub fn reset(&mut self) {
        self.smoothed_scale = None;
    }

    pub fn width(&self) -> usize {
        W
    }

    pub fn bars(&self) -> &[f32] {
        &self.bars
    }
}

impl<T: Transform, const W: usize> Default for FftDisplay<T, W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsampling_averages_contiguous_buckets() {
        let mut bars: FftDisplay<Linear, 4> = FftDisplay::new();
        bars.update(&[0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        assert_eq!(bars.bars(), &[5.0, 25.0, 45.0, 65.0]);
    }

    #[test]
    fn every_input_lands_in_exactly_one_bucket() {
        // With a constant input, full non-overlapping coverage plus
        // averaging means every bar must come out at exactly that constant —
        // a skipped or double-counted bin would show up as a deviation.
        let mut bars: FftDisplay<Linear, 7> = FftDisplay::new();
        for len in [7usize, 8, 13, 50, 128] {
            let input = vec![3.0f32; len];
            bars.update(&input);
            for (i, &bar) in bars.bars().iter().enumerate() {
                assert!(
                    (bar - 3.0).abs() < 1e-6,
                    "len {len}, bar {i} came out as {bar}"
                );
            }
        }
    }

    #[test]
    fn interpolation_is_exact_at_the_boundaries() {
        let mut bars: FftDisplay<Linear, 8> = FftDisplay::new();
        bars.update(&[1.0, 5.0, 9.0]);
        assert_eq!(bars.bars()[0], 1.0);
        assert_eq!(bars.bars()[7], 9.0);
        // Midpoint lands halfway up the ramp.
        assert!((bars.bars()[3] - (1.0 + 8.0 * 3.0 / 7.0)).abs() < 1e-5);
    }

    #[test]
    fn render_is_deterministic_for_identical_input() {
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.37).sin().abs()).collect();

        let mut first = Frame::new();
        let mut second = Frame::new();
        let mut bars: FftDisplay<Linear, 16> = FftDisplay::new();

        bars.update(&input);
        bars.render(&mut first, 0, 0);

        bars.reset();
        bars.update(&input);
        bars.render(&mut second, 0, 0);

        assert_eq!(first.pixels(), second.pixels());
    }

    #[test]
    fn zero_dynamic_range_stays_in_palette_bounds() {
        let mut frame = Frame::new();
        let mut bars: FftDisplay<Linear, 8> = FftDisplay::new();
        bars.update(&[4.2; 32]);
        bars.render(&mut frame, 0, 0);
        for x in 0..8 {
            assert_eq!(frame.pixel(x, 0), Some(2));
        }
    }

    #[test]
    fn decibel_floor_clamps_silence() {
        let mut frame = Frame::new();
        let mut bars: FftDisplay<Decibel, 8> = FftDisplay::new();
        // One live bin over silence: silent columns sit at the dB floor,
        // i.e. the bottom of the intensity range, not at -inf.
        let mut input = [0.0f32; 16];
        input[4] = 1.0;
        bars.update(&input);
        bars.render(&mut frame, 0, 0);
        assert_eq!(frame.pixel(0, 0), Some(2));
        assert!(frame.pixel(2, 0).unwrap() > 2); // column containing the live bin
    }

    #[test]
    fn smoothed_scale_follows_slowly() {
        let mut frame = Frame::new();
        let mut bars: FftDisplay<Linear, 4> = FftDisplay::with_scale_smoothing(0.01);

        bars.update(&[0.0, 1.0, 2.0, 3.0]);
        bars.render(&mut frame, 0, 0);
        let calm = frame.pixel(3, 0);

        // A 100x amplitude spike barely moves the carried scale, so the
        // whole row saturates instead of being rescaled to fit.
        bars.update(&[0.0, 100.0, 200.0, 300.0]);
        bars.render(&mut frame, 0, 0);
        assert_eq!(calm, Some(255));
        assert_eq!(frame.pixel(3, 0), Some(255));
        // An unsmoothed mapper would rescale this column down to ~86.
        assert_eq!(frame.pixel(1, 0), Some(255));
    }
}
