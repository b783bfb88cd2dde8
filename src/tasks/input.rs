// GyroWatch — Input Task
//
// Polls the user button at ~100 Hz and posts debounced click events into the
// button channel. The channel send is non-blocking, so a slow main loop can
// never stall the input side.

use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use esp_idf_hal::gpio::{AnyInputPin, Input, PinDriver};

use crate::config::*;
use crate::events::ButtonEvent;
use crate::input::InputManager;

pub fn input_task(pin: PinDriver<'static, AnyInputPin, Input>, events: Sender<ButtonEvent>) {
    log::info!("Input task started");

    let mut input = InputManager::new(pin, events);
    let poll_interval = Duration::from_millis(INPUT_POLL_INTERVAL_MS);

    loop {
        input.update();
        thread::sleep(poll_interval);
    }
}
