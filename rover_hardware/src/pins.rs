//! Board pin map.
//!
//! The named lines of the STM32F4 board header. Drivers translate these into
//! peripheral configuration; the control core only ever sees decoded samples.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Port {
    A,
    B,
    C,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
        };
        write!(f, "P{c}")
    }
}

/// What the line is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    DigitalIn,
    DigitalOut,
    AnalogIn,
    /// H-bridge half driven with PWM.
    Pwm,
    /// Timer channel in encoder mode.
    Quadrature,
    Spi,
    I2c,
    /// Debug probe; must be left alone.
    Swd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    pub name: &'static str,
    pub port: Port,
    pub line: u8,
    pub role: Role,
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}{}", self.name, self.port, self.line)
    }
}

const fn pin(name: &'static str, port: Port, line: u8, role: Role) -> Pin {
    Pin {
        name,
        port,
        line,
        role,
    }
}

pub const PINS: &[Pin] = &[
    pin("VL53L4CD_INT", Port::C, 13, Role::DigitalIn),
    pin("IR_FRONT_L", Port::C, 0, Role::AnalogIn),
    pin("IR_FRONT_R", Port::C, 1, Role::AnalogIn),
    pin("IR_L", Port::C, 2, Role::AnalogIn),
    pin("IR_R", Port::C, 3, Role::AnalogIn),
    pin("SW1", Port::A, 0, Role::DigitalIn),
    pin("SW2", Port::A, 1, Role::DigitalIn),
    pin("VBATT_MON", Port::A, 4, Role::AnalogIn),
    pin("L_ENC_A", Port::A, 6, Role::Quadrature),
    pin("L_ENC_B", Port::A, 7, Role::Quadrature),
    pin("IR_FRONT_L_PULSE", Port::B, 0, Role::DigitalOut),
    pin("IR_FRONT_R_PULSE", Port::B, 1, Role::DigitalOut),
    pin("IR_L_PULSE", Port::B, 2, Role::DigitalOut),
    pin("ICM_42688_SCK", Port::B, 10, Role::Spi),
    pin("ICM_42688_CS", Port::B, 13, Role::Spi),
    pin("ICM_42688_MISO", Port::B, 14, Role::Spi),
    pin("ICM_42688_MOSI", Port::B, 15, Role::Spi),
    pin("ICM_42688_INT1", Port::C, 6, Role::DigitalIn),
    pin("ICM_42688_INT2", Port::C, 7, Role::DigitalIn),
    pin("MOTORS_EN", Port::C, 9, Role::DigitalOut),
    pin("LMOTOR_A", Port::A, 8, Role::Pwm),
    pin("LMOTOR_B", Port::A, 9, Role::Pwm),
    pin("RMOTOR_A", Port::A, 10, Role::Pwm),
    pin("RMOTOR_B", Port::A, 11, Role::Pwm),
    pin("SWDIO", Port::A, 13, Role::Swd),
    pin("SWCLK", Port::A, 14, Role::Swd),
    pin("LED1", Port::C, 10, Role::DigitalOut),
    pin("LED2", Port::C, 11, Role::DigitalOut),
    pin("IR_R_PULSE", Port::B, 3, Role::DigitalOut),
    pin("VL53L4CD_EN", Port::B, 5, Role::DigitalOut),
    pin("R_ENC_A", Port::B, 6, Role::Quadrature),
    pin("R_ENC_B", Port::B, 7, Role::Quadrature),
    pin("VL53L4CD_SCL", Port::B, 8, Role::I2c),
    pin("VL53L4CD_SDA", Port::B, 9, Role::I2c),
];

/// Look a line up by its header name.
pub fn lookup(name: &str) -> Option<&'static Pin> {
    PINS.iter().find(|p| p.name == name)
}

/// Lines the control loop needs, in the order `self-check` reports them.
pub const REQUIRED: &[&str] = &[
    "L_ENC_A",
    "L_ENC_B",
    "R_ENC_A",
    "R_ENC_B",
    "LMOTOR_A",
    "LMOTOR_B",
    "RMOTOR_A",
    "RMOTOR_B",
    "MOTORS_EN",
    "ICM_42688_CS",
    "VL53L4CD_SDA",
    "IR_FRONT_L",
    "IR_FRONT_R",
    "IR_L",
    "IR_R",
    "LED1",
    "LED2",
    "VBATT_MON",
];

/// Problems found in the pin map: duplicate names, two names on one line, or
/// a required line missing. Empty when the map is consistent.
pub fn check() -> Vec<String> {
    let mut problems = Vec::new();
    for (i, a) in PINS.iter().enumerate() {
        for b in &PINS[i + 1..] {
            if a.name == b.name {
                problems.push(format!("{} defined twice", a.name));
            }
            if a.port == b.port && a.line == b.line {
                problems.push(format!("{} and {} share {}{}", a.name, b.name, a.port, a.line));
            }
        }
    }
    for name in REQUIRED {
        if lookup(name).is_none() {
            problems.push(format!("required line {name} is not mapped"));
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_is_consistent() {
        assert!(check().is_empty(), "{:?}", check());
    }

    #[test]
    fn encoder_lines_are_timer_channels() {
        for name in ["L_ENC_A", "L_ENC_B", "R_ENC_A", "R_ENC_B"] {
            assert_eq!(lookup(name).map(|p| p.role), Some(Role::Quadrature));
        }
        assert_eq!(lookup("MOTORS_EN").map(ToString::to_string).as_deref(), Some("MOTORS_EN = PC9"));
    }
}
