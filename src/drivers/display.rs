// GyroWatch — Display Surface & Async Update Pipeline
//
// `Frame` owns a palette-indexed framebuffer and the drawing primitives;
// `Display` moves finished frames to the panel on a dedicated low-priority
// thread so the main loop never waits on SPI latency. The panel itself sits
// behind the `ScanlineLink` trait: the worker hands it one wire-format
// scanline at a time and nothing in here knows about controller registers
// beyond the thin `SpiPanel` implementation at the bottom.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use embedded_graphics::pixelcolor::Gray8;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, PrimitiveStyle};

use crate::config::*;

/// Transport for one frame of scanlines. `begin_frame` is the place for any
/// per-frame addressing the panel needs; `transmit` accepts one scanline in
/// wire byte order.
pub trait ScanlineLink: Send {
    fn begin_frame(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn transmit(&mut self, line: &[u8]) -> anyhow::Result<()>;
}

/// Palette-indexed sprite; `hotspot` is the pixel that lands on the blit
/// coordinates.
pub struct Sprite {
    pub data: &'static [u8],
    pub width: i32,
    pub height: i32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// In-memory framebuffer of palette indices plus the 256-entry RGB565
/// lookup table. Draw operations write indices, never raw colors; nothing
/// here touches the wire until [`Display::update`] is called.
pub struct Frame {
    pixels: Vec<u8>,
    palette: [u16; 256],
}

impl Frame {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            palette: build_palette(),
        }
    }

    pub fn width(&self) -> i32 {
        SCREEN_WIDTH as i32
    }

    pub fn height(&self) -> i32 {
        SCREEN_HEIGHT as i32
    }

    /// Reset every pixel to palette index 0 (black).
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Write one palette index. Out-of-bounds coordinates are clipped.
    pub fn draw_pixel(&mut self, x: i32, y: i32, color: u8) {
        if x < 0 || y < 0 || x >= SCREEN_WIDTH as i32 || y >= SCREEN_HEIGHT as i32 {
            return;
        }
        self.pixels[y as usize * SCREEN_WIDTH + x as usize] = color;
    }

    /// Horizontal line between `x` and `x2` inclusive.
    pub fn hline(&mut self, x: i32, x2: i32, y: i32, color: u8) {
        for x in x.min(x2)..=x.max(x2) {
            self.draw_pixel(x, y, color);
        }
    }

    /// Vertical line between `y` and `y2` inclusive.
    pub fn vline(&mut self, x: i32, y: i32, y2: i32, color: u8) {
        for y in y.min(y2)..=y.max(y2) {
            self.draw_pixel(x, y, color);
        }
    }

    pub fn circle(&mut self, x: i32, y: i32, radius: i32, color: u8, filled: bool) {
        let style = if filled {
            PrimitiveStyle::with_fill(Gray8::new(color))
        } else {
            PrimitiveStyle::with_stroke(Gray8::new(color), 1)
        };
        let circle = Circle::with_center(Point::new(x, y), (radius * 2 + 1) as u32);
        let _ = circle.into_styled(style).draw(self);
    }

    /// Copy a sprite's indices into the framebuffer, hotspot at (`x`, `y`),
    /// clipped at the edges.
    pub fn blit(&mut self, sprite: &Sprite, x: i32, y: i32) {
        let origin_x = x - sprite.hotspot_x;
        let origin_y = y - sprite.hotspot_y;
        for row in 0..sprite.height {
            for col in 0..sprite.width {
                let color = sprite.data[(row * sprite.width + col) as usize];
                self.draw_pixel(origin_x + col, origin_y + row, color);
            }
        }
    }

    /// Shift the whole framebuffer up by one row in place and blank the
    /// bottom row — the scrolling half of the spectrogram view.
    pub fn vscroll(&mut self) {
        self.pixels.copy_within(SCREEN_WIDTH.., 0);
        let last = SCREEN_WIDTH * (SCREEN_HEIGHT - 1);
        self.pixels[last..].fill(0);
    }

    /// Read one palette index back. `None` outside the framebuffer, so the
    /// read side tolerates the same coordinates the write side clips.
    pub fn pixel(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x >= SCREEN_WIDTH as i32 || y >= SCREEN_HEIGHT as i32 {
            return None;
        }
        Some(self.pixels[y as usize * SCREEN_WIDTH + x as usize])
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn palette(&self) -> &[u16; 256] {
        &self.palette
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32)
    }
}

// Palette indices ride through `embedded-graphics` as 8-bit luma, which
// opens up its primitives (circles, lines, styled shapes) for free.
impl DrawTarget for Frame {
    type Color = Gray8;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.draw_pixel(point.x, point.y, color.luma());
        }
        Ok(())
    }
}

/// Index 0 and 1 are pinned to black and white; the rest is a blue→red→green
/// ramp (the colormap the spectrogram intensities map into).
fn build_palette() -> [u16; 256] {
    let mut palette = [0u16; 256];
    palette[1] = 0xFFFF;
    for (i, entry) in palette.iter_mut().enumerate().skip(2) {
        let t = (i - 2) as f32 / 253.0;
        let (r, g, b) = if t < 0.5 {
            (2.0 * t, 0.0, 1.0 - 2.0 * t)
        } else {
            (2.0 - 2.0 * t, 2.0 * t - 1.0, 0.0)
        };
        *entry = rgb565(r, g, b);
    }
    palette
}

fn rgb565(r: f32, g: f32, b: f32) -> u16 {
    ((r * 31.0) as u16) << 11 | ((g * 63.0) as u16) << 5 | (b * 31.0) as u16
}

// ---------------------------------------------------------------------------
// Async update pipeline
// ---------------------------------------------------------------------------

struct TxState {
    back: Vec<u8>,
    requested: bool,
    in_flight: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<TxState>,
    signal: Condvar,
}

/// Double-buffered display front-end.
///
/// [`update`](Self::update) snapshots the frame into the back buffer and
/// returns immediately; the worker thread converts each scanline to wire
/// format (palette lookup, big-endian byte order) and streams it through the
/// link. At most one frame is ever pending — callers check
/// [`ready`](Self::ready) and drop frames while a transmit is in flight.
pub struct Display {
    frame: Frame,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Display {
    pub fn new(link: impl ScanlineLink + 'static) -> anyhow::Result<Self> {
        let frame = Frame::new();
        let shared = Arc::new(Shared {
            state: Mutex::new(TxState {
                back: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
                requested: false,
                in_flight: false,
                shutdown: false,
            }),
            signal: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let palette = frame.palette;
        let worker = thread::Builder::new()
            .name("display".into())
            .stack_size(STACK_DISPLAY)
            .spawn(move || transmit_loop(worker_shared, palette, link))?;

        Ok(Self {
            frame,
            shared,
            worker: Some(worker),
        })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    /// Hand the current frame to the transmit thread. Non-blocking: returns
    /// `false` (frame dropped) if a previous transmit is still in flight.
    pub fn update(&mut self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.requested || state.in_flight {
            log::debug!("frame dropped — transmit still in flight");
            return false;
        }
        state.back.copy_from_slice(&self.frame.pixels);
        state.requested = true;
        self.shared.signal.notify_all();
        true
    }

    /// Whether the pipeline can accept a new frame.
    pub fn ready(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        !state.requested && !state.in_flight
    }

    /// Block until any pending transmit has completed.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while state.requested || state.in_flight {
            state = self.shared.signal.wait(state).unwrap();
        }
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            self.shared.signal.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn transmit_loop(shared: Arc<Shared>, palette: [u16; 256], mut link: impl ScanlineLink) {
    let mut snapshot = vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT];
    let mut line = Vec::with_capacity(SCREEN_WIDTH * 2);

    loop {
        {
            let mut state = shared.state.lock().unwrap();
            while !state.requested && !state.shutdown {
                state = shared.signal.wait(state).unwrap();
            }
            if state.shutdown {
                return;
            }
            state.requested = false;
            state.in_flight = true;
            snapshot.copy_from_slice(&state.back);
        }

        // Panel failures must not take the firmware down; the next frame
        // simply tries again.
        if let Err(e) = push_frame(&mut link, &palette, &snapshot, &mut line) {
            log::warn!("display transmit failed: {e}");
        }

        let mut state = shared.state.lock().unwrap();
        state.in_flight = false;
        shared.signal.notify_all();
    }
}

fn push_frame(
    link: &mut impl ScanlineLink,
    palette: &[u16; 256],
    pixels: &[u8],
    line: &mut Vec<u8>,
) -> anyhow::Result<()> {
    link.begin_frame()?;
    for row in pixels.chunks_exact(SCREEN_WIDTH) {
        line.clear();
        for &index in row {
            // Panel expects big-endian RGB565.
            line.extend_from_slice(&palette[index as usize].to_be_bytes());
        }
        link.transmit(line)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SPI panel link (ST7735)
// ---------------------------------------------------------------------------

#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
#[cfg(target_os = "espidf")]
use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriver};

/// Thin wire adapter: command/data framing via the D/C line, pixel data
/// streamed as-is. Assumes the SPI device is already configured for the
/// panel's clock and mode.
#[cfg(target_os = "espidf")]
pub struct SpiPanel {
    spi: SpiDeviceDriver<'static, SpiDriver<'static>>,
    dc: PinDriver<'static, AnyOutputPin, Output>,
}

#[cfg(target_os = "espidf")]
impl SpiPanel {
    pub fn new(
        spi: SpiDeviceDriver<'static, SpiDriver<'static>>,
        dc: PinDriver<'static, AnyOutputPin, Output>,
    ) -> Self {
        Self { spi, dc }
    }

    fn command(&mut self, cmd: u8, args: &[u8]) -> anyhow::Result<()> {
        self.dc.set_low()?;
        self.spi.write(&[cmd])?;
        if !args.is_empty() {
            self.dc.set_high()?;
            self.spi.write(args)?;
        }
        Ok(())
    }

    /// Minimal ST7735 bring-up: out of sleep, 16-bit color, display on.
    pub fn init(&mut self) -> anyhow::Result<()> {
        self.command(0x01, &[])?; // SWRESET
        thread::sleep(std::time::Duration::from_millis(120));
        self.command(0x11, &[])?; // SLPOUT
        thread::sleep(std::time::Duration::from_millis(120));
        self.command(0x3A, &[0x05])?; // COLMOD: RGB565
        self.command(0x36, &[0xA0])?; // MADCTL: landscape
        self.command(0x29, &[])?; // DISPON
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
impl ScanlineLink for SpiPanel {
    fn begin_frame(&mut self) -> anyhow::Result<()> {
        let w = (SCREEN_WIDTH - 1) as u16;
        let h = (SCREEN_HEIGHT - 1) as u16;
        self.command(0x2A, &[0, 0, (w >> 8) as u8, w as u8])?; // CASET
        self.command(0x2B, &[0, 0, (h >> 8) as u8, h as u8])?; // RASET
        self.command(0x2C, &[])?; // RAMWR
        Ok(())
    }

    fn transmit(&mut self, line: &[u8]) -> anyhow::Result<()> {
        self.dc.set_high()?;
        self.spi.write(line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Captures every transmitted scanline for inspection.
    struct RecordingLink {
        frames: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
        delay: Duration,
    }

    impl RecordingLink {
        fn new(delay: Duration) -> (Self, Arc<Mutex<Vec<Vec<Vec<u8>>>>>) {
            let frames = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    frames: Arc::clone(&frames),
                    delay,
                },
                frames,
            )
        }
    }

    impl ScanlineLink for RecordingLink {
        fn begin_frame(&mut self) -> anyhow::Result<()> {
            std::thread::sleep(self.delay);
            self.frames.lock().unwrap().push(Vec::new());
            Ok(())
        }

        fn transmit(&mut self, line: &[u8]) -> anyhow::Result<()> {
            self.frames
                .lock()
                .unwrap()
                .last_mut()
                .expect("transmit before begin_frame")
                .push(line.to_vec());
            Ok(())
        }
    }

    #[test]
    fn clear_resets_to_black() {
        let mut frame = Frame::new();
        frame.draw_pixel(5, 5, 200);
        frame.clear();
        assert!(frame.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn palette_pins_black_and_white() {
        let frame = Frame::new();
        assert_eq!(frame.palette()[0], 0x0000);
        assert_eq!(frame.palette()[1], 0xFFFF);
        // Ramp endpoints: pure blue at the bottom, pure green at the top.
        assert_eq!(frame.palette()[2], 0x001F);
        assert_eq!(frame.palette()[255], 0x07E0);
    }

    #[test]
    fn update_renders_wire_format() {
        let (link, frames) = RecordingLink::new(Duration::ZERO);
        let mut display = Display::new(link).unwrap();

        display.frame_mut().draw_pixel(3, 0, 1);
        display.frame_mut().draw_pixel(0, 2, 2);
        assert!(display.update());
        display.wait_idle();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let lines = &frames[0];
        assert_eq!(lines.len(), SCREEN_HEIGHT);
        assert_eq!(lines[0].len(), SCREEN_WIDTH * 2);

        // Index 1 → 0xFFFF, big-endian, at column 3.
        assert_eq!(&lines[0][6..8], &[0xFF, 0xFF]);
        // Index 2 → bottom of the colormap ramp (pure blue).
        assert_eq!(&lines[2][0..2], &[0x00, 0x1F]);
        // Untouched pixels are black.
        assert_eq!(&lines[0][0..2], &[0x00, 0x00]);
    }

    #[test]
    fn in_flight_frames_are_dropped_not_queued() {
        let (link, frames) = RecordingLink::new(Duration::from_millis(100));
        let mut display = Display::new(link).unwrap();

        assert!(display.update());
        assert!(!display.ready());
        assert!(!display.update()); // dropped
        display.wait_idle();

        assert!(display.ready());
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn vscroll_shifts_rows_up() {
        let mut frame = Frame::new();
        frame.draw_pixel(7, 1, 42);
        frame.draw_pixel(0, 0, 9);
        frame.vscroll();
        assert_eq!(frame.pixel(7, 0), Some(42));
        assert_eq!(frame.pixel(0, 0), Some(0)); // old top row is gone
        // Bottom row is blanked.
        for x in 0..frame.width() {
            assert_eq!(frame.pixel(x, frame.height() - 1), Some(0));
        }
    }

    #[test]
    fn lines_and_circle_write_indices() {
        let mut frame = Frame::new();
        frame.hline(2, 5, 10, 7);
        assert_eq!(frame.pixel(2, 10), Some(7));
        assert_eq!(frame.pixel(5, 10), Some(7));
        assert_eq!(frame.pixel(6, 10), Some(0));

        frame.vline(20, 3, 1, 8);
        assert_eq!(frame.pixel(20, 1), Some(8));
        assert_eq!(frame.pixel(20, 3), Some(8));

        frame.circle(40, 40, 5, 9, false);
        assert_eq!(frame.pixel(45, 40), Some(9));
        assert_eq!(frame.pixel(35, 40), Some(9));
        assert_eq!(frame.pixel(40, 40), Some(0)); // outline only
    }

    #[test]
    fn pixel_reads_clip_like_writes() {
        let mut frame = Frame::new();
        frame.draw_pixel(-1, 0, 7);
        frame.draw_pixel(0, frame.height(), 7);
        assert!(frame.pixels().iter().all(|&p| p == 0));

        assert_eq!(frame.pixel(-1, 0), None);
        assert_eq!(frame.pixel(0, -1), None);
        assert_eq!(frame.pixel(frame.width(), 0), None);
        assert_eq!(frame.pixel(0, frame.height()), None);
        assert_eq!(frame.pixel(0, 0), Some(0));
    }

    #[test]
    fn blit_is_clipped_at_the_edges() {
        static DOT: [u8; 9] = [0, 5, 0, 5, 5, 5, 0, 5, 0];
        let sprite = Sprite {
            data: &DOT,
            width: 3,
            height: 3,
            hotspot_x: 1,
            hotspot_y: 1,
        };

        let mut frame = Frame::new();
        frame.blit(&sprite, 0, 0); // top-left corner, partially off-screen
        assert_eq!(frame.pixel(0, 0), Some(5));
        assert_eq!(frame.pixel(1, 0), Some(5));

        frame.blit(&sprite, 50, 50);
        assert_eq!(frame.pixel(50, 49), Some(5));
        assert_eq!(frame.pixel(49, 49), Some(0));
    }
}
