use bitvec::{array::BitArray, BitArr};

use crate::types::{DevInfo, PortInfo};

/// Largest USB device address (7-bit address field, 0 reserved for the
/// default/unaddressed state).
const MAX_ADDRESS: usize = 127;

#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct DeviceHandle {
    address: u8,
    max_packet_size: u8,
    dev_info: DevInfo,
}

impl DeviceHandle {
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn max_packet_size(&self) -> u8 {
        self.max_packet_size
    }

    pub fn dev_info(&self) -> DevInfo {
        self.dev_info
    }
}

type DisconnectBits = BitArr!(for MAX_ADDRESS + 1, in u32);

/// Set of device addresses freed by a single detach event. The event
/// dispatcher feeds this to the enumeration engine and to hub bookkeeping
/// (`Host::remove_disconnected_hubs`) so downstream hub instances removed
/// by the same cascade are pruned from the hub list.
#[derive(Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub struct DeviceDisconnectMask(DisconnectBits);

impl DeviceDisconnectMask {
    fn empty() -> Self {
        Self(BitArray::ZERO)
    }

    fn mark(&mut self, address: u8) {
        self.0.set(address as usize, true);
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter_ones()
    }

    pub fn remove(&mut self, address: usize) {
        self.0.set(address, false);
    }

    pub fn is_empty(&self) -> bool {
        self.0.not_any()
    }
}

struct Slot {
    in_use: bool,
    dev_info: DevInfo,
}

/// Allocates/frees the 1..=NR_DEVICES USB addresses handed out to devices
/// below this host, and tracks each address's position in the hub topology
/// so a hub or branch detach can cascade to every address beneath it.
pub(crate) struct DeviceAddressManager<const NR_DEVICES: usize> {
    slots: [Slot; NR_DEVICES],
}

impl<const NR_DEVICES: usize> DeviceAddressManager<NR_DEVICES> {
    pub fn new() -> Self {
        debug_assert!(NR_DEVICES <= MAX_ADDRESS);
        Self {
            slots: [const {
                Slot {
                    in_use: false,
                    dev_info: DevInfo::root_device(),
                }
            }; NR_DEVICES],
        }
    }

    pub fn alloc_device_address(&mut self, max_packet_size: u16, dev_info: DevInfo) -> DeviceHandle {
        let index = self
            .slots
            .iter()
            .position(|slot| !slot.in_use)
            .unwrap_or_else(|| panic!("ran out of device addresses"));
        self.slots[index] = Slot {
            in_use: true,
            dev_info,
        };
        DeviceHandle {
            // addresses are 1-based, 0 is reserved for the unaddressed state
            address: (index + 1) as u8,
            max_packet_size: max_packet_size as u8,
            dev_info,
        }
    }

    pub fn free_address(&mut self, handle: DeviceHandle) {
        let index = handle.address as usize - 1;
        self.slots[index].in_use = false;
    }

    pub fn free_all_addresses(&mut self) -> DeviceDisconnectMask {
        let mut mask = DeviceDisconnectMask::empty();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.in_use {
                slot.in_use = false;
                mask.mark((index + 1) as u8);
            }
        }
        mask
    }

    /// Frees the device directly attached at `at`, plus every device
    /// transitively parented under it (i.e. the whole branch rooted at a
    /// detached hub).
    pub fn free_subtree(&mut self, at: PortInfo) -> DeviceDisconnectMask {
        let mut mask = DeviceDisconnectMask::empty();
        let mut frontier: arrayvec::ArrayVec<u8, NR_DEVICES> = arrayvec::ArrayVec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.in_use
                && slot.dev_info.parent_hub_address() == at.hub_address()
                && slot.dev_info.parent_port() == at.port()
            {
                slot.in_use = false;
                let address = (index + 1) as u8;
                mask.mark(address);
                let _ = frontier.try_push(address);
            }
        }

        let mut i = 0;
        while i < frontier.len() {
            let parent_address = frontier[i];
            i += 1;
            for (index, slot) in self.slots.iter_mut().enumerate() {
                if slot.in_use && slot.dev_info.parent_hub_address() == parent_address {
                    slot.in_use = false;
                    let address = (index + 1) as u8;
                    mask.mark(address);
                    let _ = frontier.try_push(address);
                }
            }
        }

        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UsbSpeed;

    fn child_of(hub_addr: u8, port: u8, tier: u8) -> DevInfo {
        DevInfo::new(hub_addr, port, None, UsbSpeed::FullSpeed, tier)
    }

    #[test]
    fn allocates_lowest_free_address_first() {
        let mut mgr = DeviceAddressManager::<8>::new();
        let a = mgr.alloc_device_address(64, DevInfo::root_device());
        let b = mgr.alloc_device_address(64, DevInfo::root_device());
        assert_eq!(a.address(), 1);
        assert_eq!(b.address(), 2);
        mgr.free_address(a);
        let c = mgr.alloc_device_address(64, DevInfo::root_device());
        assert_eq!(c.address(), 1);
    }

    #[test]
    fn free_subtree_cascades_through_nested_hubs() {
        let mut mgr = DeviceAddressManager::<8>::new();
        // address 1: hub plugged into root port 1
        let hub = mgr.alloc_device_address(64, child_of(0, 1, 2));
        // address 2: device plugged into hub's port 1
        let leaf = mgr.alloc_device_address(64, child_of(hub.address(), 1, 3));
        // address 3: unrelated device on root port 2
        let unrelated = mgr.alloc_device_address(64, child_of(0, 2, 1));

        let mask = mgr.free_subtree(PortInfo::new(0, 1));
        assert!(mask.iter().any(|a| a == hub.address() as usize));
        assert!(mask.iter().any(|a| a == leaf.address() as usize));
        assert!(!mask.iter().any(|a| a == unrelated.address() as usize));
    }

    #[test]
    fn free_all_addresses_returns_every_allocated_address() {
        let mut mgr = DeviceAddressManager::<4>::new();
        let a = mgr.alloc_device_address(64, DevInfo::root_device());
        let b = mgr.alloc_device_address(64, DevInfo::root_device());
        let mask = mgr.free_all_addresses();
        assert!(mask.iter().any(|x| x == a.address() as usize));
        assert!(mask.iter().any(|x| x == b.address() as usize));
    }
}
