// GyroWatch — MPU6050 Gyro Driver
//
// Custom register-level driver over shared I2C bus.
// Avoids external crate version conflicts with esp-idf-hal.
//
// Only the Z-axis gyro is collected, through the sensor's hardware FIFO:
// the main loop drains whatever accumulated since the last frame in one
// burst instead of pacing individual register reads.

use std::sync::Mutex;

use esp_idf_hal::i2c::I2cDriver;

use crate::config::*;

/// Thread-safe handle to a shared I2C bus.
pub type SharedBus = &'static Mutex<I2cDriver<'static>>;

// MPU6050 register addresses
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_FIFO_EN: u8 = 0x23;
const REG_INT_STATUS: u8 = 0x3A;
const REG_USER_CTRL: u8 = 0x6A;
const REG_FIFO_COUNT_H: u8 = 0x72;
const REG_FIFO_R_W: u8 = 0x74;
const REG_WHO_AM_I: u8 = 0x75;
const WHO_AM_I_EXPECTED: u8 = 0x68;

const FIFO_EN_ZG: u8 = 0x10;
const USER_CTRL_FIFO_EN: u8 = 0x40;
const USER_CTRL_FIFO_RESET: u8 = 0x04;
const INT_STATUS_FIFO_OFLOW: u8 = 0x10;

pub struct Mpu6050 {
    bus: SharedBus,
}

impl Mpu6050 {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }

    /// Verify the device is reachable on the I2C bus.
    pub fn is_connected(&self) -> bool {
        let mut bus = self.bus.lock().unwrap();
        let mut buf = [0u8; 1];
        match bus.write_read(I2C_ADDR_MPU6050, &[REG_WHO_AM_I], &mut buf, I2C_TIMEOUT_TICKS) {
            Ok(()) => buf[0] == WHO_AM_I_EXPECTED,
            Err(_) => false,
        }
    }

    /// Wake the sensor, configure the gyro (±500 °/s, 1 kHz output) and
    /// route the Z axis into the hardware FIFO.
    pub fn init(&self) -> anyhow::Result<()> {
        let mut bus = self.bus.lock().unwrap();

        // Wake up (clear SLEEP bit)
        bus.write(I2C_ADDR_MPU6050, &[REG_PWR_MGMT_1, 0x00], I2C_TIMEOUT_TICKS)?;

        // DLPF on → 1 kHz internal rate; divider 0 keeps the full rate.
        bus.write(I2C_ADDR_MPU6050, &[REG_CONFIG, 0x01], I2C_TIMEOUT_TICKS)?;
        bus.write(I2C_ADDR_MPU6050, &[REG_SMPLRT_DIV, 0x00], I2C_TIMEOUT_TICKS)?;

        // Gyroscope: ±500 °/s
        bus.write(I2C_ADDR_MPU6050, &[REG_GYRO_CONFIG, 0x08], I2C_TIMEOUT_TICKS)?;

        // FIFO: Z gyro only, reset then enable.
        bus.write(I2C_ADDR_MPU6050, &[REG_FIFO_EN, FIFO_EN_ZG], I2C_TIMEOUT_TICKS)?;
        bus.write(
            I2C_ADDR_MPU6050,
            &[REG_USER_CTRL, USER_CTRL_FIFO_RESET],
            I2C_TIMEOUT_TICKS,
        )?;
        bus.write(
            I2C_ADDR_MPU6050,
            &[REG_USER_CTRL, USER_CTRL_FIFO_EN],
            I2C_TIMEOUT_TICKS,
        )?;

        log::info!("MPU6050 initialised (±500°/s, 1 kHz, Z-axis FIFO)");
        Ok(())
    }

    /// Drain the hardware FIFO, invoking `sample` once per buffered Z-axis
    /// reading in °/s, oldest first. Returns the number of samples
    /// delivered — zero when nothing accumulated since the last poll.
    ///
    /// On FIFO overflow the stale contents are discarded and the FIFO
    /// restarted; the gap shows up as missing samples, not as an error.
    pub fn read_fifo(&self, mut sample: impl FnMut(f32)) -> anyhow::Result<usize> {
        let mut bus = self.bus.lock().unwrap();

        let mut status = [0u8; 1];
        bus.write_read(I2C_ADDR_MPU6050, &[REG_INT_STATUS], &mut status, I2C_TIMEOUT_TICKS)?;
        if status[0] & INT_STATUS_FIFO_OFLOW != 0 {
            log::warn!("gyro FIFO overflowed — dropping stale samples");
            bus.write(
                I2C_ADDR_MPU6050,
                &[REG_USER_CTRL, USER_CTRL_FIFO_RESET | USER_CTRL_FIFO_EN],
                I2C_TIMEOUT_TICKS,
            )?;
            return Ok(0);
        }

        let mut count_raw = [0u8; 2];
        bus.write_read(
            I2C_ADDR_MPU6050,
            &[REG_FIFO_COUNT_H],
            &mut count_raw,
            I2C_TIMEOUT_TICKS,
        )?;
        // Whole 2-byte words only; a trailing odd byte belongs to the next
        // sample still being written.
        let available = (u16::from_be_bytes(count_raw) & !1) as usize;

        let mut delivered = 0;
        let mut chunk = [0u8; 32];
        let mut remaining = available;
        while remaining > 0 {
            let take = remaining.min(chunk.len());
            bus.write_read(
                I2C_ADDR_MPU6050,
                &[REG_FIFO_R_W],
                &mut chunk[..take],
                I2C_TIMEOUT_TICKS,
            )?;
            for word in chunk[..take].chunks_exact(2) {
                let raw = i16::from_be_bytes([word[0], word[1]]);
                sample(raw as f32 / GYRO_SCALE_500);
                delivered += 1;
            }
            remaining -= take;
        }

        Ok(delivered)
    }
}
