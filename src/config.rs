use crate::rx::RxStatus;

const BAUDRATE: Baudrate = Baudrate::Baud38400;
const PARITY: Parity = Parity::Even;
const DROP_ON: RxStatus = RxStatus::FRAMING.union(RxStatus::OVERRUN).union(RxStatus::PARITY);

/// Line speed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Baudrate {
    Baud9600,
    Baud19200,
    Baud38400,
    Baud57600,
    Baud115200,
}

impl Baudrate {
    pub const fn bits_per_second(self) -> u32 {
        match self {
            Baudrate::Baud9600 => 9_600,
            Baudrate::Baud19200 => 19_200,
            Baudrate::Baud38400 => 38_400,
            Baudrate::Baud57600 => 57_600,
            Baudrate::Baud115200 => 115_200,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
}

/// Link configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Line speed, both directions
    pub baudrate: Baudrate,
    /// Parity bit, both directions
    pub parity: Parity,
    /// Reception errors that drop the packet in progress.
    ///
    /// Errors outside this mask are ignored and the byte is decoded as usual. A break condition
    /// is not in the default mask because some adapters emit one when the host opens the port.
    pub drop_on: RxStatus,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baudrate: BAUDRATE,
            parity: PARITY,
            drop_on: DROP_ON,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_drops_on_line_errors_but_not_break() {
        let cfg = Config::default();
        assert_eq!(cfg.baudrate.bits_per_second(), 38_400);
        assert_eq!(cfg.parity, Parity::Even);
        assert!(cfg.drop_on.intersects(RxStatus::FRAMING));
        assert!(cfg.drop_on.intersects(RxStatus::OVERRUN));
        assert!(cfg.drop_on.intersects(RxStatus::PARITY));
        assert!(!cfg.drop_on.intersects(RxStatus::BREAK));
    }
}
