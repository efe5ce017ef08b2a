// src/io/serial/utils.rs
//
// Character format of the serial line and its mapping onto the serialport
// crate's types. The bus normally runs 8N1.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, StopBits};

// ============================================================================
// Types
// ============================================================================

/// Parity setting for the serial line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Character framing on the UART.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineFormat {
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl Default for LineFormat {
    fn default() -> Self {
        LineFormat {
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

impl LineFormat {
    pub fn validate(&self) -> Result<(), String> {
        to_serialport_data_bits(self.data_bits)?;
        to_serialport_stop_bits(self.stop_bits)?;
        Ok(())
    }

    /// Conventional short form, e.g. "8N1".
    pub fn describe(&self) -> String {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        format!("{}{}{}", self.data_bits, parity, self.stop_bits)
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type
pub fn to_serialport_parity(p: Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(format!("Unsupported data bits: {}", other)),
    }
}

/// Convert stop bits count to serialport crate's StopBits type
pub fn to_serialport_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(format!("Unsupported stop bits: {}", other)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_8n1() {
        let format = LineFormat::default();
        assert_eq!(format.describe(), "8N1");
        assert!(format.validate().is_ok());
    }

    #[test]
    fn test_to_serialport_parity() {
        assert!(matches!(to_serialport_parity(Parity::None), SpParity::None));
        assert!(matches!(to_serialport_parity(Parity::Odd), SpParity::Odd));
        assert!(matches!(to_serialport_parity(Parity::Even), SpParity::Even));
    }

    #[test]
    fn test_data_bits_rejects_unknown() {
        assert!(matches!(to_serialport_data_bits(7), Ok(DataBits::Seven)));
        assert!(to_serialport_data_bits(9).is_err());
    }

    #[test]
    fn test_stop_bits_rejects_unknown() {
        assert!(matches!(to_serialport_stop_bits(2), Ok(StopBits::Two)));
        assert!(to_serialport_stop_bits(0).is_err());
        let format = LineFormat {
            stop_bits: 3,
            ..Default::default()
        };
        assert!(format.validate().is_err());
    }
}
