// GyroWatch — Hardware & System Configuration
// Target: ESP32 (gyro + color SPI panel build)

// ---------------------------------------------------------------------------
// GPIO Pin Definitions
// ---------------------------------------------------------------------------
pub const PIN_BUTTON: i32 = 27;       // User button (INPUT_PULLUP, active LOW)
pub const PIN_DISPLAY_CLK: i32 = 23;  // SPI clock
pub const PIN_DISPLAY_MOSI: i32 = 22; // SPI data out
pub const PIN_DISPLAY_RST: i32 = 19;  // Panel reset
pub const PIN_DISPLAY_DC: i32 = 5;    // Data/command select
pub const PIN_DISPLAY_CS: i32 = 16;   // Chip select
pub const PIN_I2C_SDA: i32 = 32;      // I2C data line (gyro)
pub const PIN_I2C_SCL: i32 = 33;      // I2C clock line (gyro)

// ---------------------------------------------------------------------------
// Buses
// ---------------------------------------------------------------------------
pub const I2C_ADDR_MPU6050: u8 = 0x68;
pub const I2C_TIMEOUT_TICKS: u32 = 1000; // FreeRTOS ticks
pub const DISPLAY_SPI_HZ: u32 = 26_000_000;

// ---------------------------------------------------------------------------
// Display (ST7735, 16-bit color over SPI)
// ---------------------------------------------------------------------------
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 128;

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_DISPLAY: usize = 4096;
pub const STACK_INPUT: usize = 4096;
pub const STACK_STREAMER: usize = 8192;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const MAINLOOP_WAIT_MS: u64 = 16;        // ~60 fps frame tick
pub const INPUT_POLL_INTERVAL_MS: u64 = 10;  // 100 Hz button poll
pub const DEBOUNCE_MS: u64 = 50;
pub const LONG_PRESS_MS: u64 = 1500;
pub const DOUBLE_CLICK_WINDOW_MS: u64 = 400;
pub const BOOT_SPLASH_MS: u64 = 1000;        // Splash duration

// ---------------------------------------------------------------------------
// Spectral analysis
// ---------------------------------------------------------------------------
pub const FFT_SIZE: usize = 256;          // Analysis window length
pub const FFT_OVERLAP: usize = 16;        // New samples per recompute
pub const FFT_BARS: usize = SCREEN_WIDTH; // Spectrogram column count

// Samples carried between the sensor drain and the spectral consumer.
// The consumer runs every frame tick, so one second of headroom is plenty.
pub const GYRO_RING_CAPACITY: usize = 1024;

// Scale-factor low-pass gain for the spectrogram intensity mapping.
pub const BAR_SCALE_GAIN: f32 = 0.01;

// ---------------------------------------------------------------------------
// Gyro (MPU6050)
// ---------------------------------------------------------------------------
pub const GYRO_RATE_HZ: u32 = 1000;                 // FIFO output rate
pub const GYRO_DT: f32 = 1.0 / GYRO_RATE_HZ as f32; // Integration step
pub const GYRO_SCALE_500: f32 = 65.5;               // LSB/°/s at ±500 °/s

// ---------------------------------------------------------------------------
// Network export
// ---------------------------------------------------------------------------
// ~5 seconds of raw samples at the gyro output rate; anything beyond is
// dropped until the next HTTP drain (best-effort streaming).
pub const STREAM_BUFFER_CAPACITY: usize = 5 * GYRO_RATE_HZ as usize;
pub const MDNS_HOSTNAME: &str = "gyrowatch";
