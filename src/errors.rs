use crate::descriptor::ParsingError;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
#[derive(Clone, Copy)]
pub enum UsbHostError {
    Unknown,
    // USB Device packet level errors
    NAK,
    NYET, // Used for split transactions
    WrongTog,
    STALL,
    UnexpectedPID,

    // USB Host stack level errors
    BufferOverflow,
    ParsingError(ParsingError),
    TransferTimeout,
    InvalidState,
    InvalidResponse,
    UnexpectedDevice,
    HubCapacity,
    Detached,

    /// Topology depth exceeded `consts::MAX_TOPOLOGY_TIER`.
    Unsupported,
    /// No free device address, or the downstream allocator otherwise ran
    /// out of room.
    AllocFailed,
    /// Operation referenced a hub or port that is no longer present.
    InvalidHandle,
    /// The host controller driver declined to submit a transfer.
    TransferSubmitFailed,
    /// Remote-wakeup arming exhausted `consts::REMOTE_WAKEUP_TIMES` without
    /// succeeding; the power-management sublayer gave up on suspending.
    #[cfg(feature = "power-management")]
    NotSuspended,
}
