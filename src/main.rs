// GyroWatch — Firmware Entry Point
//
// Boot sequence:
//   1. Bring up logging, I2C (gyro) and SPI (panel) buses.
//   2. Initialise the panel, show the splash, self-test the gyro.
//   3. Spawn the display transmit worker, input task and network streamer.
//   4. Enter the ~60 fps frame loop: drain the gyro FIFO, integrate the
//      rotation angle, run the overlapped FFT, render the active view.
//
// The frame loop never blocks on the display: frames are dropped while a
// transmit is in flight. The only suspension points are the gyro bus read
// and the bounded button-event wait that doubles as the frame tick.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use esp_idf_hal::gpio::{AnyIOPin, InputPin, OutputPin, PinDriver};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::prelude::*;
use esp_idf_hal::spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriverConfig};

use gyrowatch::config::*;
use gyrowatch::drivers::display::{Display, Frame, SpiPanel, Sprite};
use gyrowatch::drivers::imu::Mpu6050;
use gyrowatch::events::{ButtonEvent, ViewMode};
use gyrowatch::fft::SpectralEngine;
use gyrowatch::fft_display::{Decibel, FftDisplay};
use gyrowatch::ringbuf::RingBuffer;
use gyrowatch::streamer::DataStreamer;
use gyrowatch::tasks;

// Marker blitted onto the rotation dial at the current angle.
static DIAL_DOT: Sprite = Sprite {
    data: &[0, 1, 0, 1, 1, 1, 0, 1, 0],
    width: 3,
    height: 3,
    hotspot_x: 1,
    hotspot_y: 1,
};

fn main() -> anyhow::Result<()> {
    // Link esp-idf-sys runtime patches and initialise logging.
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("GyroWatch firmware starting…");

    // ---- Peripherals ------------------------------------------------------
    let peripherals = Peripherals::take()?;

    // ---- I2C bus (gyro) ---------------------------------------------------
    let i2c_config = I2cConfig::new().baudrate(400u32.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio32, // SDA
        peripherals.pins.gpio33, // SCL
        &i2c_config,
    )?;
    // The bus handle lives for the entire programme duration (embedded
    // firmware never exits).
    let i2c_bus: &'static Mutex<I2cDriver<'static>> = Box::leak(Box::new(Mutex::new(i2c)));

    // ---- SPI panel --------------------------------------------------------
    let spi = SpiDeviceDriver::new_single(
        peripherals.spi2,
        peripherals.pins.gpio23,       // CLK
        peripherals.pins.gpio22,       // MOSI
        Option::<AnyIOPin>::None,      // no MISO — the panel is write-only
        Some(peripherals.pins.gpio16), // CS
        &SpiDriverConfig::new(),
        &SpiConfig::new().baudrate(DISPLAY_SPI_HZ.Hz()),
    )?;
    let dc = PinDriver::output(peripherals.pins.gpio5.downgrade_output())?;

    // Hardware reset pulse, then keep the line released for good.
    let mut reset = PinDriver::output(peripherals.pins.gpio19.downgrade_output())?;
    reset.set_low()?;
    thread::sleep(Duration::from_millis(10));
    reset.set_high()?;
    thread::sleep(Duration::from_millis(120));
    Box::leak(Box::new(reset));

    let mut panel = SpiPanel::new(spi, dc);
    panel.init()?;
    let mut display = Display::new(panel)?;

    // ---- Boot splash ------------------------------------------------------
    splash(display.frame_mut());
    display.update();
    thread::sleep(Duration::from_millis(BOOT_SPLASH_MS));

    // ---- Gyro self-test ---------------------------------------------------
    let imu = Mpu6050::new(i2c_bus);
    if !imu.is_connected() {
        // Continue anyway so we can still debug via serial.
        log::error!("Gyro not responding on I2C — continuing without sensor data");
    }
    if let Err(e) = imu.init() {
        log::error!("Gyro init failed: {e}");
    }

    // ---- Input task -------------------------------------------------------
    let (button_tx, button_rx) = mpsc::channel();
    let button = PinDriver::input(peripherals.pins.gpio27.downgrade_input())?;
    configure_pullup(&button);
    thread::Builder::new()
        .name("input".into())
        .stack_size(STACK_INPUT)
        .spawn(move || tasks::input::input_task(button, button_tx))?;

    // ---- Network export ---------------------------------------------------
    let streamer = DataStreamer::start(peripherals.modem);

    // ---- Pipeline state ---------------------------------------------------
    let mut ring: RingBuffer<f32, GYRO_RING_CAPACITY> = RingBuffer::new();
    let mut fft_reader = ring.reader();
    let mut scope_reader = ring.reader();
    let mut engine: SpectralEngine<FFT_SIZE, FFT_OVERLAP> = SpectralEngine::new();
    let mut bars: FftDisplay<Decibel, FFT_BARS> =
        FftDisplay::with_scale_smoothing(BAR_SCALE_GAIN);
    let mut fft_export = Vec::new();

    let mut angle = 0.0f32; // integrated Z rotation, degrees
    let mut mode = ViewMode::default();
    let mut blanked = false;
    let mut history = [0.0f32; SCREEN_WIDTH];
    let mut cursor = 0usize;

    let tick = Duration::from_millis(MAINLOOP_WAIT_MS);
    log::info!("Boot complete — entering frame loop");

    loop {
        let frame_start = Instant::now();

        // 1. Drain the gyro FIFO: integrate the angle, fan it out to the
        //    ring buffer and the network export.
        let drained = imu.read_fifo(|dps| {
            angle += dps * GYRO_DT;
            ring.append(angle);
            streamer.feed(angle);
        });
        if let Err(e) = drained {
            log::warn!("Gyro read error: {e}");
        }

        // 2. Feed the spectral engine; one compute per overlap batch.
        let mut fresh_spectrum = false;
        fft_reader.consume(|sample| {
            if engine.feed(sample, 0.0) {
                engine.compute();
                engine.postprocess();
                fresh_spectrum = true;
            }
        });

        if fresh_spectrum {
            engine.copy_fft(&mut fft_export);
            streamer.deliver_fft(&fft_export);
            bars.update(engine.spectrum());
        }

        // 3. One scope-trace point per frame: the newest angle this tick.
        let mut latest = None;
        scope_reader.consume(|v| latest = Some(v));
        if let Some(v) = latest {
            history[cursor] = v;
            cursor = (cursor + 1) % SCREEN_WIDTH;
        }

        // 4. Render the active view and hand the frame off — unless the
        //    previous transmit is still in flight (drop, don't queue).
        if !blanked {
            match mode {
                ViewMode::Spectrogram => {
                    let frame = display.frame_mut();
                    frame.vscroll();
                    bars.render(frame, 0, (SCREEN_HEIGHT - 1) as i32);
                }
                ViewMode::Scope => {
                    render_scope(display.frame_mut(), &history, cursor, angle);
                }
            }
            if display.ready() {
                display.update();
            }
        }

        // 5. Bounded button wait for the remainder of the frame budget.
        let remaining = tick
            .saturating_sub(frame_start.elapsed())
            .max(Duration::from_millis(1));
        match button_rx.recv_timeout(remaining) {
            Ok(ButtonEvent::SingleClick) => {
                mode = mode.toggle();
                bars.reset();
                display.frame_mut().clear();
                log::info!("View switched to {mode:?}");
            }
            Ok(ButtonEvent::DoubleClick) => {
                bars.reset();
                log::info!("Spectrogram intensity scale reset");
            }
            Ok(ButtonEvent::LongPress) => {
                blanked = !blanked;
                if blanked {
                    display.frame_mut().clear();
                    display.wait_idle();
                    display.update();
                }
                log::info!("Display {}", if blanked { "blanked" } else { "active" });
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("Input task gone — continuing without buttons");
                thread::sleep(tick);
            }
        }
    }
}

/// Concentric colormap rings around a white hub — doubles as a quick visual
/// check of the palette and the draw primitives.
fn splash(frame: &mut Frame) {
    frame.clear();
    let cx = SCREEN_WIDTH as i32 / 2;
    let cy = SCREEN_HEIGHT as i32 / 2;
    for (i, radius) in (12..=48).step_by(6).enumerate() {
        frame.circle(cx, cy, radius, 40 + (i as u8) * 30, false);
    }
    frame.circle(cx, cy, 6, 1, true);
}

/// Angle trace over time plus a rotation dial in the top-right corner.
fn render_scope(frame: &mut Frame, history: &[f32; SCREEN_WIDTH], cursor: usize, angle: f32) {
    frame.clear();
    let mid = SCREEN_HEIGHT as i32 / 2;
    frame.hline(0, SCREEN_WIDTH as i32 - 1, mid, 1);

    // Quarter pixel per degree, clamped to the panel.
    for x in 0..SCREEN_WIDTH {
        let value = history[(cursor + x) % SCREEN_WIDTH];
        let y = mid - (value * 0.25).clamp(-(mid as f32) + 1.0, mid as f32 - 1.0) as i32;
        frame.vline(x as i32, mid, y, 200);
    }

    let (cx, cy, radius) = (SCREEN_WIDTH as i32 - 20, 20, 12);
    frame.circle(cx, cy, radius, 1, false);
    let rad = angle.rem_euclid(360.0).to_radians();
    frame.blit(
        &DIAL_DOT,
        cx + (rad.cos() * radius as f32) as i32,
        cy + (rad.sin() * radius as f32) as i32,
    );
}

/// Configure internal pull-up on the button pin. The PinDriver constructor
/// sets the direction; the pull mode goes through the raw API because the
/// downgraded pin type no longer carries the output capability.
fn configure_pullup(_pin: &PinDriver<'_, esp_idf_hal::gpio::AnyInputPin, esp_idf_hal::gpio::Input>) {
    unsafe {
        esp_idf_sys::gpio_set_pull_mode(
            PIN_BUTTON,
            esp_idf_sys::gpio_pull_mode_t_GPIO_PULLUP_ONLY,
        );
    }
}
