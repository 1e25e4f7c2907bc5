use arrayvec::ArrayVec;

use crate::device_addr::DeviceDisconnectMask;
use crate::driver::hub::Hub;
use crate::errors::UsbHostError;

/// Opaque identifier for a host controller instance, used to key a
/// `HostTable` when a single embedder manages more than one controller.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct HostHandle(u8);

impl HostHandle {
    pub fn new(id: u8) -> Self {
        Self(id)
    }
}

/// The set of hub instances attached under one host controller. Replaces
/// ad hoc linear scans over a raw `ArrayVec<Hub, NR_HUBS>` with named,
/// reusable operations.
pub(crate) struct HubRegistry<const NR_HUBS: usize> {
    hubs: ArrayVec<Hub, NR_HUBS>,
}

impl<const NR_HUBS: usize> HubRegistry<NR_HUBS> {
    pub(crate) fn new() -> Self {
        Self {
            hubs: ArrayVec::new(),
        }
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Hub> {
        self.hubs.iter_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.hubs.len()
    }

    pub(crate) fn try_insert(&mut self, hub: Hub) -> Result<(), UsbHostError> {
        self.hubs.try_push(hub).map_err(|_| UsbHostError::HubCapacity)
    }

    /// Looks up the hub instance at `address`, mirroring the original's
    /// `USB_HostHubGetHubDeviceHandle`.
    pub(crate) fn find_by_address(&mut self, address: u8) -> Option<&Hub> {
        self.hubs.iter().find(|h| h.handle.address() == address)
    }

    pub(crate) fn find_by_address_mut(&mut self, address: u8) -> Option<&mut Hub> {
        self.hubs.iter_mut().find(|h| h.handle.address() == address)
    }

    /// Removes every hub whose address is present in `mask`, and clears
    /// those addresses from the mask so callers don't process them twice.
    pub(crate) fn remove_disconnected(&mut self, mask: &mut DeviceDisconnectMask) {
        let mut i = 0;
        while i < self.hubs.len() {
            let hub_addr = self.hubs[i].handle.address() as usize;
            if mask.iter().any(|addr| hub_addr == addr) {
                trace!("removing disconnected hub {}", hub_addr);
                self.hubs.swap_remove(i);
                mask.remove(hub_addr);
            } else {
                i += 1;
            }
        }
    }
}

struct HostSlot<const NR_HUBS: usize> {
    host: Option<HostHandle>,
    registry: HubRegistry<NR_HUBS>,
}

/// Per-host-controller table of `HubRegistry`s, mirroring the original's
/// `s_HubGlobalArray[USB_HOST_CONFIG_MAX_HOST]` plus
/// `USB_HostHubGetHubList`'s find-or-allocate lookup.
pub(crate) struct HostTable<const MAX_HOST: usize, const NR_HUBS: usize> {
    slots: [HostSlot<NR_HUBS>; MAX_HOST],
}

impl<const MAX_HOST: usize, const NR_HUBS: usize> HostTable<MAX_HOST, NR_HUBS> {
    pub(crate) fn new() -> Self {
        Self {
            slots: [const {
                HostSlot {
                    host: None,
                    registry: HubRegistry {
                        hubs: ArrayVec::new_const(),
                    },
                }
            }; MAX_HOST],
        }
    }

    /// Returns the registry for `host`, allocating a free slot for it if
    /// this is the first time `host` has been seen.
    pub(crate) fn get_or_create(
        &mut self,
        host: HostHandle,
    ) -> Result<&mut HubRegistry<NR_HUBS>, UsbHostError> {
        if let Some(index) = self.slots.iter().position(|s| s.host == Some(host)) {
            return Ok(&mut self.slots[index].registry);
        }
        let index = self
            .slots
            .iter()
            .position(|s| s.host.is_none())
            .ok_or(UsbHostError::AllocFailed)?;
        self.slots[index].host = Some(host);
        Ok(&mut self.slots[index].registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_slot_for_repeated_lookups() {
        let mut table = HostTable::<2, 4>::new();
        let a = HostHandle::new(1);
        let b = HostHandle::new(2);

        let first = table.get_or_create(a).unwrap() as *mut _;
        let second = table.get_or_create(a).unwrap() as *mut _;
        assert_eq!(first, second);

        let other = table.get_or_create(b).unwrap() as *mut _;
        assert_ne!(first, other);
    }

    #[test]
    fn get_or_create_fails_once_every_slot_is_taken() {
        let mut table = HostTable::<1, 4>::new();
        table.get_or_create(HostHandle::new(1)).unwrap();
        assert!(matches!(
            table.get_or_create(HostHandle::new(2)),
            Err(UsbHostError::AllocFailed)
        ));
    }
}
