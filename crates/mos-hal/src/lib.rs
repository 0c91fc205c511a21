//! Hardware abstraction layer for mos
//!
//! This crate defines the [`Hal`] trait the kernel and filesystem drive the
//! board peripherals through, so the rest of the system can run hosted (for
//! tests and development) or against real hardware behind the same surface.
//!
//! The peripherals covered are exactly the ones the device files expose:
//! four LEDs, two push-button switches, an LCD character sink, two analog
//! sources, four touch pads, the console byte streams, and the clocks
//! (monotonic milliseconds plus an optional settable wall clock).
//!
//! [`LoopbackHal`] is the deterministic in-memory implementation used by the
//! test suites and hosted runs.

#![no_std]

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// The four board LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Orange,
    Yellow,
    Green,
    Blue,
}

/// The two push-button switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    Sw1,
    Sw2,
}

/// The two analog inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogSource {
    Potentiometer,
    Thermistor,
}

/// The four touch-sensor electrodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPad {
    E1,
    E2,
    E3,
    E4,
}

/// Hardware abstraction trait.
///
/// Methods take `&mut self`: the kernel owns its HAL exclusively and there
/// is exactly one current process at any instant, so no interior
/// synchronization is needed at this boundary.
pub trait Hal {
    // === LEDs ===

    /// Drive an LED on or off.
    fn led_set(&mut self, led: Led, on: bool);

    /// Current on/off status of an LED.
    fn led_status(&mut self, led: Led) -> bool;

    // === Switches ===

    /// Whether a push-button is currently depressed.
    fn switch_pressed(&mut self, sw: Switch) -> bool;

    // === LCD ===

    /// Send one character to the LCD.
    fn lcd_write(&mut self, byte: u8);

    // === Analog ===

    /// Read an analog source, pre-scaled to a byte.
    fn analog_read(&mut self, source: AnalogSource) -> u8;

    // === Touch ===

    /// Whether a touch electrode is currently being touched.
    fn touch_pressed(&mut self, pad: TouchPad) -> bool;

    // === Console ===

    /// Send one byte to the console output.
    fn console_write(&mut self, byte: u8);

    /// Take the next queued console input byte, if any.
    fn console_read(&mut self) -> Option<u8>;

    // === Clocks ===

    /// Monotonic milliseconds since boot.
    fn now_millis(&mut self) -> u64;

    /// Wall-clock seconds since the epoch, if the clock has been set.
    fn wallclock(&mut self) -> Option<u64>;

    /// Set the wall clock.
    fn set_wallclock(&mut self, epoch_seconds: u64);
}

/// Deterministic in-memory HAL for tests and hosted runs.
///
/// Inputs (switches, analog readings, touch pads, console bytes) are set by
/// the harness; outputs (LEDs, LCD, console) are captured for inspection.
/// The monotonic clock advances by one millisecond per query so timestamps
/// are strictly increasing.
#[derive(Debug, Default)]
pub struct LoopbackHal {
    pub leds: [bool; 4],
    pub switches: [bool; 2],
    pub analog: [u8; 2],
    pub touch: [bool; 4],
    pub lcd_output: Vec<u8>,
    pub console_output: Vec<u8>,
    pub console_input: VecDeque<u8>,
    millis: u64,
    wallclock: Option<u64>,
}

impl LoopbackHal {
    pub fn new() -> LoopbackHal {
        LoopbackHal::default()
    }

    /// Queue console input bytes for the kernel to read.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.console_input.extend(bytes.iter().copied());
    }
}

fn led_index(led: Led) -> usize {
    match led {
        Led::Orange => 0,
        Led::Yellow => 1,
        Led::Green => 2,
        Led::Blue => 3,
    }
}

impl Hal for LoopbackHal {
    fn led_set(&mut self, led: Led, on: bool) {
        self.leds[led_index(led)] = on;
    }

    fn led_status(&mut self, led: Led) -> bool {
        self.leds[led_index(led)]
    }

    fn switch_pressed(&mut self, sw: Switch) -> bool {
        match sw {
            Switch::Sw1 => self.switches[0],
            Switch::Sw2 => self.switches[1],
        }
    }

    fn lcd_write(&mut self, byte: u8) {
        self.lcd_output.push(byte);
    }

    fn analog_read(&mut self, source: AnalogSource) -> u8 {
        match source {
            AnalogSource::Potentiometer => self.analog[0],
            AnalogSource::Thermistor => self.analog[1],
        }
    }

    fn touch_pressed(&mut self, pad: TouchPad) -> bool {
        match pad {
            TouchPad::E1 => self.touch[0],
            TouchPad::E2 => self.touch[1],
            TouchPad::E3 => self.touch[2],
            TouchPad::E4 => self.touch[3],
        }
    }

    fn console_write(&mut self, byte: u8) {
        self.console_output.push(byte);
    }

    fn console_read(&mut self) -> Option<u8> {
        self.console_input.pop_front()
    }

    fn now_millis(&mut self) -> u64 {
        self.millis += 1;
        self.millis
    }

    fn wallclock(&mut self) -> Option<u64> {
        self.wallclock
    }

    fn set_wallclock(&mut self, epoch_seconds: u64) {
        self.wallclock = Some(epoch_seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_captures_led_state() {
        let mut hal = LoopbackHal::new();
        hal.led_set(Led::Green, true);
        assert!(hal.led_status(Led::Green));
        assert!(!hal.led_status(Led::Blue));
    }

    #[test]
    fn loopback_console_round_trip() {
        let mut hal = LoopbackHal::new();
        hal.push_input(b"hi");
        assert_eq!(hal.console_read(), Some(b'h'));
        assert_eq!(hal.console_read(), Some(b'i'));
        assert_eq!(hal.console_read(), None);
        hal.console_write(b'!');
        assert_eq!(hal.console_output, b"!");
    }

    #[test]
    fn monotonic_clock_increases() {
        let mut hal = LoopbackHal::new();
        let a = hal.now_millis();
        let b = hal.now_millis();
        assert!(b > a);
    }

    #[test]
    fn wallclock_unset_until_set() {
        let mut hal = LoopbackHal::new();
        assert_eq!(hal.wallclock(), None);
        hal.set_wallclock(1_700_000_000);
        assert_eq!(hal.wallclock(), Some(1_700_000_000));
    }
}
