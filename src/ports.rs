/// A connector port that can carry a sensor's data line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Port {
    /// The connector pin number. This is what gets persisted.
    pub num: u8,
    /// A display label: the pin number and the MCU pin or function behind it.
    pub label: &'static str,
}

/// Every port a sensor may be attached to, in menu order.
pub const PORTS: [Port; 13] = [
    Port { num: 2, label: "2 (A7)" },
    Port { num: 3, label: "3 (A6)" },
    Port { num: 4, label: "4 (A4)" },
    Port { num: 5, label: "5 (B3)" },
    Port { num: 6, label: "6 (B2)" },
    Port { num: 7, label: "7 (C3)" },
    Port { num: 10, label: "10 (SWC)" },
    Port { num: 12, label: "12 (SIO)" },
    Port { num: 13, label: "13 (TX)" },
    Port { num: 14, label: "14 (RX)" },
    Port { num: 15, label: "15 (C1)" },
    Port { num: 16, label: "16 (C0)" },
    Port { num: 17, label: "17 (1W)" },
];

/// The port with connector number `num`.
pub fn find(num: u8) -> Option<&'static Port> {
    PORTS.iter().find(|port| port.num == num)
}

/// The display label of port `num`.
pub fn label(num: u8) -> Option<&'static str> {
    find(num).map(|port| port.label)
}

/// The position of port `num` in [`PORTS`].
pub fn index_of(num: u8) -> Option<usize> {
    PORTS.iter().position(|port| port.num == num)
}

/// The port at position `index` in [`PORTS`].
pub fn from_index(index: usize) -> Option<&'static Port> {
    PORTS.get(index)
}

/// Whether a sensor can be attached to port `num`.
pub fn is_valid(num: u8) -> bool {
    find(num).is_some()
}
