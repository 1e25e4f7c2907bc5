/// USB Protocol Types
use crate::DeviceHandle;

/// Represents a 16-bit binary-coded-decimal value
///
/// A 16-bit BCD represents 4 decimal digits (0-9).
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
#[repr(transparent)]
pub struct Bcd16(pub u16);

impl Bcd16 {
    /// Returns the four contained digits as separate numbers
    ///
    /// Each of the returned numbers is in the 0-9 range.
    pub fn to_digits(self) -> [u8; 4] {
        [
            ((self.0 >> 12) & 0xF) as u8,
            ((self.0 >> 8) & 0xF) as u8,
            ((self.0 >> 4) & 0xF) as u8,
            (self.0 & 0xF) as u8,
        ]
    }

    pub(crate) fn is_valid(value: u16) -> bool {
        (value >> 12 & 0xF) < 10
            && (value >> 8 & 0xF) < 10
            && (value >> 4 & 0xF) < 10
            && (value & 0xF) < 10
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Bcd16 {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "{}{}{}{}",
            (self.0 >> 12) & 0xF,
            (self.0 >> 8) & 0xF,
            (self.0 >> 4) & 0xF,
            self.0 & 0xF,
        )
    }
}

#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Pid {
    OUT = 0b0001,
    IN = 0b1001,
    SOF = 0b0101,
    SETUP = 0b1101,

    DATA0 = 0b0011,
    DATA1 = 0b1011,
    DATA2 = 0b0111,
    MDATA = 0b1111,

    ACK = 0b0010,
    NAK = 0b1010,
    STALL = 0b1110,
    NYET = 0b0110,

    // PRE and ERR are both 0b1100
    // Ignoring for now
    SPLIT = 0b1000,
    PING = 0b0100,
    Rsvd = 0b0000,
}

impl TryFrom<u8> for Pid {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b0001 => Ok(Pid::OUT),
            0b1001 => Ok(Pid::IN),
            0b0101 => Ok(Pid::SOF),
            0b1101 => Ok(Pid::SETUP),

            0b0011 => Ok(Pid::DATA0),
            0b1011 => Ok(Pid::DATA1),
            0b0111 => Ok(Pid::DATA2),
            0b1111 => Ok(Pid::MDATA),

            0b0010 => Ok(Pid::ACK),
            0b1010 => Ok(Pid::NAK),
            0b1110 => Ok(Pid::STALL),
            0b0110 => Ok(Pid::NYET),

            0b1000 => Ok(Pid::SPLIT),
            0b0100 => Ok(Pid::PING),
            0b0000 => Ok(Pid::Rsvd),

            _ => Err(()),
        }
    }
}

/// DATA0/DATA1 toggle state carried on a pipe between transfers.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub enum DataTog {
    DATA0,
    DATA1,
}

impl DataTog {
    pub fn next(&mut self) {
        *self = match self {
            DataTog::DATA0 => DataTog::DATA1,
            DataTog::DATA1 => DataTog::DATA0,
        };
    }
}

/// Negotiated link speed of a device, as reported by port status.
///
/// Only the signals that actually distinguish a speed are consulted: a
/// positive High-Speed or Low-Speed signal wins outright, anything else is
/// Full-Speed. There is no explicit "full speed" bit in port status.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub enum UsbSpeed {
    LowSpeed,
    FullSpeed,
    HighSpeed,
}

/// Direction of an endpoint, taken from bit 7 of bEndpointAddress.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub enum EndpointDirection {
    Out,
    In,
}

/// Endpoint number plus direction, as decoded from bEndpointAddress.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct EndpointAddress {
    pub number: u8,
    pub direction: EndpointDirection,
}

impl From<&crate::descriptor::EndpointDescriptor> for EndpointAddress {
    fn from(desc: &crate::descriptor::EndpointDescriptor) -> Self {
        let addr = desc.b_endpoint_address;
        EndpointAddress {
            number: addr & 0x0F,
            direction: if addr & 0x80 != 0 {
                EndpointDirection::In
            } else {
                EndpointDirection::Out
            },
        }
    }
}

impl From<crate::descriptor::EndpointDescriptor> for EndpointAddress {
    fn from(desc: crate::descriptor::EndpointDescriptor) -> Self {
        (&desc).into()
    }
}

/// A device's position in the USB topology: which hub port it hangs off of,
/// whether it needs transaction-translator service, and its negotiated
/// speed. This is threaded through address assignment (so a device's tier
/// and TT can be recovered later) and through hub attach/reset handling (so
/// a newly reset port can report where the device that appeared there
/// lives).
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct DevInfo {
    /// USB address of the parent hub, or 0 for the root hub.
    parent_hub_address: u8,
    /// 1-based port number on the parent hub, or 0 for the root port.
    parent_port: u8,
    /// (hub address, port) of the transaction translator serving this
    /// device, if any is needed. `None` if the device is itself running at
    /// High-Speed, or is attached directly to a High-Speed-capable root
    /// port with no TT in the path.
    transaction_translator: Option<(u8, u8)>,
    speed: UsbSpeed,
    /// Depth in the hub topology. The root is tier 1, a hub plugged into
    /// the root is tier 2, and so on.
    tier: u8,
}

impl DevInfo {
    pub fn root_device() -> Self {
        DevInfo {
            parent_hub_address: 0,
            parent_port: 0,
            transaction_translator: None,
            speed: UsbSpeed::HighSpeed,
            tier: 1,
        }
    }

    pub fn new(
        parent_hub_address: u8,
        parent_port: u8,
        transaction_translator: Option<(u8, u8)>,
        speed: UsbSpeed,
        tier: u8,
    ) -> Self {
        DevInfo {
            parent_hub_address,
            parent_port,
            transaction_translator,
            speed,
            tier,
        }
    }

    pub fn parent_hub_address(&self) -> u8 {
        self.parent_hub_address
    }

    pub fn parent_port(&self) -> u8 {
        self.parent_port
    }

    pub fn transaction_translator(&self) -> Option<(u8, u8)> {
        self.transaction_translator
    }

    pub fn speed(&self) -> UsbSpeed {
        self.speed
    }

    pub fn tier(&self) -> u8 {
        self.tier
    }

    pub fn is_root(&self) -> bool {
        self.parent_hub_address == 0
    }
}

/// Identifies a single port on a single hub, used to report detach events
/// (where, unlike attach, there is no device descriptor to carry the
/// location in).
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct PortInfo {
    hub_address: u8,
    port: u8,
}

impl PortInfo {
    pub fn new(hub_address: u8, port: u8) -> Self {
        PortInfo { hub_address, port }
    }

    pub fn hub_address(&self) -> u8 {
        self.hub_address
    }

    pub fn port(&self) -> u8 {
        self.port
    }
}

#[cfg(not(feature = "defmt"))]
impl core::fmt::Display for PortInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "hub {} port {}", self.hub_address, self.port)
    }
}

/// State carried across calls to `USBHostPipe::interrupt_transfer` for a
/// single interrupt endpoint: which device/endpoint to address, and the
/// DATA0/DATA1 toggle that must be maintained between transfers.
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct InterruptChannel {
    pub device_handle: DeviceHandle,
    pub endpoint_address: EndpointAddress,
    pub tog: DataTog,
}
