// GyroWatch — Button Input
//
// The single user button arrives as a raw active-low level polled at
// ~100 Hz. A counting debouncer turns the level into clean press/release
// edges, and a two-state machine (released-with-click-window / held) turns
// edges plus hold time into the three actions the device binds: single
// click, double click, long press.
//
// A long press fires while the button is still held, so the user gets
// feedback without releasing; the release afterwards is swallowed. A press
// that lands inside the double-click window resolves to a double click on
// its release.

use std::time::{Duration, Instant};

#[cfg(target_os = "espidf")]
use std::sync::mpsc::Sender;

#[cfg(target_os = "espidf")]
use esp_idf_hal::gpio::{AnyInputPin, Input, PinDriver};

use crate::config::*;
use crate::events::ButtonEvent;

// Poll ticks the raw level must disagree with the debounced level before an
// edge is accepted.
const DEBOUNCE_TICKS: u8 = (DEBOUNCE_MS / INPUT_POLL_INTERVAL_MS) as u8;

enum Edge {
    Down,
    Up,
}

enum State {
    /// Button up. `clicks` short presses seen so far; resolved as a single
    /// click when the double-click window closes without a second press.
    Released {
        clicks: u8,
        window_ends: Option<Instant>,
    },
    /// Button down since `since`; `long_fired` once the hold timer tripped.
    Held {
        clicks: u8,
        since: Instant,
        long_fired: bool,
    },
}

impl State {
    fn idle() -> Self {
        State::Released {
            clicks: 0,
            window_ends: None,
        }
    }
}

/// Debounce plus click/hold classification, decoupled from the GPIO so the
/// state machine can be driven with synthetic levels and timestamps.
pub struct ClickDetector {
    integrator: u8,
    pressed: bool, // debounced level
    state: State,
}

impl ClickDetector {
    pub fn new() -> Self {
        Self {
            integrator: 0,
            pressed: false,
            state: State::idle(),
        }
    }

    /// Advance one poll tick with the raw (bouncy) level. Returns at most
    /// one detected event.
    pub fn step(&mut self, raw_pressed: bool, now: Instant) -> Option<ButtonEvent> {
        let edge = self.debounce(raw_pressed);

        let window = Duration::from_millis(DOUBLE_CLICK_WINDOW_MS);
        let hold = Duration::from_millis(LONG_PRESS_MS);

        let state = std::mem::replace(&mut self.state, State::idle());
        let (next, event) = match (state, edge) {
            // Press edge: enter Held, carrying any pending click.
            (State::Released { clicks, .. }, Some(Edge::Down)) => (
                State::Held {
                    clicks,
                    since: now,
                    long_fired: false,
                },
                None,
            ),

            // Release after the hold timer already fired: swallowed.
            (State::Held { long_fired: true, .. }, Some(Edge::Up)) => (State::idle(), None),

            // Release of the second press inside the window.
            (State::Held { clicks, .. }, Some(Edge::Up)) if clicks > 0 => {
                (State::idle(), Some(ButtonEvent::DoubleClick))
            }

            // Release of a first short press: open the double-click window.
            (State::Held { .. }, Some(Edge::Up)) => (
                State::Released {
                    clicks: 1,
                    window_ends: Some(now + window),
                },
                None,
            ),

            // Hold timer: fire once while the button is still down.
            (
                State::Held {
                    clicks,
                    since,
                    long_fired: false,
                },
                None,
            ) if now.duration_since(since) >= hold => (
                State::Held {
                    clicks,
                    since,
                    long_fired: true,
                },
                Some(ButtonEvent::LongPress),
            ),

            // Window expired with exactly one click pending.
            (
                State::Released {
                    clicks,
                    window_ends: Some(ends),
                },
                None,
            ) if clicks > 0 && now >= ends => (State::idle(), Some(ButtonEvent::SingleClick)),

            (state, _) => (state, None),
        };
        self.state = next;
        event
    }

    /// Integrating debouncer: the debounced level only flips after
    /// `DEBOUNCE_TICKS` consecutive samples of the opposite raw level.
    fn debounce(&mut self, raw: bool) -> Option<Edge> {
        if raw == self.pressed {
            self.integrator = 0;
            return None;
        }
        self.integrator += 1;
        if self.integrator < DEBOUNCE_TICKS {
            return None;
        }
        self.integrator = 0;
        self.pressed = raw;
        Some(if raw { Edge::Down } else { Edge::Up })
    }
}

impl Default for ClickDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds the detector to the button GPIO and the event channel. Poll
/// [`update`](Self::update) every ~10 ms from the input task.
#[cfg(target_os = "espidf")]
pub struct InputManager<'d> {
    pin: PinDriver<'d, AnyInputPin, Input>,
    events: Sender<ButtonEvent>,
    detector: ClickDetector,
}

#[cfg(target_os = "espidf")]
impl<'d> InputManager<'d> {
    pub fn new(pin: PinDriver<'d, AnyInputPin, Input>, events: Sender<ButtonEvent>) -> Self {
        Self {
            pin,
            events,
            detector: ClickDetector::new(),
        }
    }

    pub fn update(&mut self) {
        // Active LOW with pull-up.
        if let Some(event) = self.detector.step(self.pin.is_low(), Instant::now()) {
            let _ = self.events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `(level, duration_ms)` segments at the poll cadence and collect
    /// every emitted event. Durations must be multiples of the poll tick.
    fn drive(detector: &mut ClickDetector, pattern: &[(bool, u64)]) -> Vec<ButtonEvent> {
        let start = Instant::now();
        let mut events = Vec::new();
        let mut t = 0;
        for &(pressed, duration_ms) in pattern {
            for _ in 0..duration_ms / INPUT_POLL_INTERVAL_MS {
                t += INPUT_POLL_INTERVAL_MS;
                if let Some(event) = detector.step(pressed, start + Duration::from_millis(t)) {
                    events.push(event);
                }
            }
        }
        events
    }

    #[test]
    fn short_press_resolves_after_the_window() {
        let mut detector = ClickDetector::new();
        let events = drive(&mut detector, &[(true, 100), (false, 600)]);
        assert_eq!(events, vec![ButtonEvent::SingleClick]);
    }

    #[test]
    fn two_presses_inside_the_window_make_a_double_click() {
        let mut detector = ClickDetector::new();
        let events = drive(
            &mut detector,
            &[(true, 100), (false, 100), (true, 100), (false, 600)],
        );
        assert_eq!(events, vec![ButtonEvent::DoubleClick]);
    }

    #[test]
    fn long_press_fires_while_held_and_swallows_the_release() {
        let mut detector = ClickDetector::new();
        let events = drive(&mut detector, &[(true, LONG_PRESS_MS + 100), (false, 600)]);
        assert_eq!(events, vec![ButtonEvent::LongPress]);
    }

    #[test]
    fn second_press_held_long_outranks_the_double_click() {
        let mut detector = ClickDetector::new();
        let events = drive(
            &mut detector,
            &[
                (true, 100),
                (false, 100),
                (true, LONG_PRESS_MS + 100),
                (false, 600),
            ],
        );
        assert_eq!(events, vec![ButtonEvent::LongPress]);
    }

    #[test]
    fn contact_bounce_produces_no_edges() {
        let mut detector = ClickDetector::new();
        // Bursts shorter than the debounce threshold, then a long idle.
        let events = drive(
            &mut detector,
            &[
                (true, 20),
                (false, 20),
                (true, 20),
                (false, 20),
                (true, 20),
                (false, 600),
            ],
        );
        assert_eq!(events, vec![]);
    }
}
