pub mod display;
#[cfg(target_os = "espidf")]
pub mod imu;
