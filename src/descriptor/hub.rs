use crate::types::UsbSpeed;

#[cfg_attr(target_endian = "little", repr(C, packed))]
#[derive(Clone, Copy, Default)]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct HubDescriptor {
    pub length: u8,
    pub descriptor_type: u8,

    /// bNbrPorts
    pub number_of_ports: u8,

    /// wHubCharacteristics
    pub hub_characteristics: u16,

    /// Time in 2ms interval for power on to power good
    pub power_on_to_power_good_time: u8,

    pub hub_controller_current: u8,
}

#[cfg(feature = "defmt")]
impl defmt::Format for HubDescriptor {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "HubDescriptor {{ ports: {}, characteristics: {=u16:#06x}, pwr_good: {} x 2ms }}",
            self.number_of_ports,
            { self.hub_characteristics },
            self.power_on_to_power_good_time,
        )
    }
}

/// Feature selectors for GetHubStatus/ClearFeature at the hub (not port)
/// level, per the USB 2.0 hub class definition (table 11-17).
#[repr(u16)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub enum HubFeature {
    LocalPower = 0,
    OverCurrent = 1,
}

/// Feature selectors for GetPortStatus/SetPortFeature/ClearPortFeature,
/// per the USB 2.0 hub class definition (table 11-17).
#[repr(u16)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub enum HubPortFeature {
    Connection = 0,
    Enable = 1,
    Suspend = 2,
    OverCurrent = 3,
    Reset = 4,
    Power = 8,
    LowSpeed = 9,
    ChangeConnection = 16,
    ChangeEnable = 17,
    ChangeSuspend = 18,
    ChangeOverCurrent = 19,
    ChangeReset = 20,
    Test = 21,
    Indicator = 22,
}

macro_rules! bit_accessor {
    ($name:ident, $bit:expr) => {
        pub fn $name(&self) -> bool {
            (self.0 >> $bit) & 1 != 0
        }
    };
}

/// wPortStatus, as returned by GetPortStatus (USB 2.0 table 11-21).
#[derive(Clone, Copy)]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
#[repr(transparent)]
pub struct HubPortStatus(u16);

impl HubPortStatus {
    bit_accessor!(connected, 0);
    bit_accessor!(enabled, 1);
    bit_accessor!(suspended, 2);
    bit_accessor!(over_current, 3);
    bit_accessor!(reset, 4);
    bit_accessor!(power, 8);
    fn low_speed_bit(&self) -> bool {
        (self.0 >> 9) & 1 != 0
    }
    fn high_speed_bit(&self) -> bool {
        (self.0 >> 10) & 1 != 0
    }

    /// Positive-signal speed classification: High-Speed and Low-Speed are
    /// each reported by a dedicated bit; anything else defaults to
    /// Full-Speed, since there is no dedicated full-speed bit.
    pub fn speed(&self) -> UsbSpeed {
        if self.high_speed_bit() {
            UsbSpeed::HighSpeed
        } else if self.low_speed_bit() {
            UsbSpeed::LowSpeed
        } else {
            UsbSpeed::FullSpeed
        }
    }
}

impl From<u16> for HubPortStatus {
    fn from(value: u16) -> Self {
        HubPortStatus(value)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HubPortStatus {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "HubPortStatus {{ connected: {}, enabled: {}, suspended: {}, over_current: {}, reset: {}, power: {}, speed: {} }}",
            self.connected(),
            self.enabled(),
            self.suspended(),
            self.over_current(),
            self.reset(),
            self.power(),
            self.speed(),
        )
    }
}

/// wPortChange, as returned by GetPortStatus (USB 2.0 table 11-22). Each
/// bit latches until cleared with ClearPortFeature(C_PORT_*).
#[derive(Clone, Copy)]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
#[repr(transparent)]
pub struct HubPortStatusChange(u16);

impl HubPortStatusChange {
    bit_accessor!(connection, 0);
    bit_accessor!(enable, 1);
    bit_accessor!(suspend, 2);
    bit_accessor!(over_current, 3);
    bit_accessor!(reset, 4);
}

impl From<u16> for HubPortStatusChange {
    fn from(value: u16) -> Self {
        HubPortStatusChange(value)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HubPortStatusChange {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "HubPortStatusChange {{ connection: {}, enable: {}, suspend: {}, over_current: {}, reset: {} }}",
            self.connection(),
            self.enable(),
            self.suspend(),
            self.over_current(),
            self.reset(),
        )
    }
}

/// wHubChangeStatus, the upper 16 bits of the 4-byte hub-level GET_STATUS
/// response (USB 2.0 table 11-19/11-20). Each bit latches until cleared
/// with ClearFeature(C_HUB_*).
#[derive(Clone, Copy)]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
#[repr(transparent)]
pub struct HubStatusChange(u16);

impl HubStatusChange {
    bit_accessor!(local_power, 0);
    bit_accessor!(over_current, 1);
}

impl From<u16> for HubStatusChange {
    fn from(value: u16) -> Self {
        HubStatusChange(value)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HubStatusChange {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "HubStatusChange {{ local_power: {}, over_current: {} }}",
            self.local_power(),
            self.over_current(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_classification_is_positive_signal_only() {
        let high_speed = HubPortStatus::from(1 << 10);
        assert_eq!(high_speed.speed(), UsbSpeed::HighSpeed);

        let low_speed = HubPortStatus::from(1 << 9);
        assert_eq!(low_speed.speed(), UsbSpeed::LowSpeed);

        let neither_bit_set = HubPortStatus::from(0);
        assert_eq!(neither_bit_set.speed(), UsbSpeed::FullSpeed);

        // High-speed bit takes priority if a malformed status sets both.
        let both_bits_set = HubPortStatus::from((1 << 9) | (1 << 10));
        assert_eq!(both_bits_set.speed(), UsbSpeed::HighSpeed);
    }

    #[test]
    fn port_status_bit_accessors_read_the_right_bits() {
        let status = HubPortStatus::from(
            (1 << 0) | (1 << 1) | (1 << 2) | (1 << 3) | (1 << 4) | (1 << 8),
        );
        assert!(status.connected());
        assert!(status.enabled());
        assert!(status.suspended());
        assert!(status.over_current());
        assert!(status.reset());
        assert!(status.power());
    }

    #[test]
    fn port_status_change_bit_accessors_read_the_right_bits() {
        let change = HubPortStatusChange::from((1 << 0) | (1 << 4));
        assert!(change.connection());
        assert!(change.reset());
        assert!(!change.enable());
        assert!(!change.suspend());
        assert!(!change.over_current());
    }

    #[test]
    fn hub_status_change_bit_accessors_read_the_right_bits() {
        let both = HubStatusChange::from((1 << 0) | (1 << 1));
        assert!(both.local_power());
        assert!(both.over_current());

        let neither = HubStatusChange::from(0);
        assert!(!neither.local_power());
        assert!(!neither.over_current());
    }
}
