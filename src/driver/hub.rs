/// USB Hub class driver, private because it is only used by the main driver.
use arrayvec::ArrayVec;
use bitvec::{array::BitArray, BitArr};

use crate::{
    consts::{MAX_PORT, MAX_TOPOLOGY_TIER, RESET_TIMES},
    descriptor::{
        hub::{HubDescriptor, HubFeature, HubPortFeature, HubPortStatus, HubPortStatusChange, HubStatusChange},
        Descriptor, DeviceDescriptor,
    },
    driver::get_configuration_descriptor,
    errors::UsbHostError,
    pipe::USBHostPipe,
    request::{Request, RequestTypeRecipient, RequestTypeType},
    types::{DataTog, DevInfo, InterruptChannel, PortInfo, UsbSpeed},
    DeviceHandle, HostDriver,
};

type PortChangeBitmask = BitArr!(for 128, in u8);

/// Per-port state tracked across polls. The C original re-derives this from
/// `portIndex`/`portStatus`/`resetCount` fields held inline on the hub
/// struct; here it's an explicit nested state so one hub can run several
/// ports through independent reset/attach lifecycles concurrently.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub(crate) enum PortPhase {
    /// Port is powered and waiting for C_PORT_CONNECTION.
    WaitConnect,
    /// A reset has been issued; `attempts_remaining` counts down on every
    /// reset issuance regardless of the enable bit, and the port is only
    /// accepted once it reaches zero.
    Resetting { attempts_remaining: u8 },
    /// Port is enabled and a device is attached and enumerated.
    Enabled,
    /// Port is suspended as part of the remote-wakeup/suspend chain.
    #[cfg(feature = "power-management")]
    Suspended,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(not(feature = "defmt"), derive(Debug))]
pub(crate) struct PortState {
    pub port: u8,
    pub phase: PortPhase,
}

impl PortState {
    fn new(port: u8) -> Self {
        PortState {
            port,
            phase: PortPhase::WaitConnect,
        }
    }
}

pub(crate) struct Hub {
    pub(crate) handle: DeviceHandle,
    dev_info: DevInfo,
    interrupt_channel: InterruptChannel,
    ports: ArrayVec<PortState, MAX_PORT>,
    /// This hub's own TT think-time contribution, decoded from
    /// wHubCharacteristics bits 5:6 as `(bits + 1) << 3`.
    #[allow(dead_code)]
    own_think_time: u8,
    /// Cumulative think-time budget for devices attached below this hub,
    /// i.e. this hub's own contribution plus whatever its parent hub (if
    /// any) already accumulated.
    total_think_time: u16,
    #[cfg(feature = "power-management")]
    remote_wakeup_capable: bool,
}

pub(crate) enum HubEvent {
    DeviceReset,
    DeviceAttach(DevInfo),
    DeviceDetach(PortInfo),
}

impl Hub {
    /// `parent_total_think_time` is this hub's parent hub's
    /// [`Hub::total_think_time`], or 0 if this hub hangs directly off the
    /// root port.
    pub async fn new<D: HostDriver, const NR_DEVICES: usize>(
        pipe: &USBHostPipe<D, NR_DEVICES>,
        handle: DeviceHandle,
        _descriptor: DeviceDescriptor, // TODO: maybe check if this is a hub?
        dev_info: DevInfo,
        parent_total_think_time: u16,
    ) -> Result<Self, UsbHostError> {
        if dev_info.tier() > MAX_TOPOLOGY_TIER {
            error!("hub at tier {} exceeds max topology depth", dev_info.tier());
            return Err(UsbHostError::Unsupported);
        }

        // Pull the configuration descriptor
        let mut buf: [u8; 255] = [0; 255];
        let desc_iter = get_configuration_descriptor(handle, &mut buf, pipe).await?;

        let mut endpoint_address = None;
        let mut remote_wakeup_capable = false;
        for desc in desc_iter {
            match desc? {
                Descriptor::Configuration(cfg) => {
                    remote_wakeup_capable = cfg.attributes.remote_wakeup();
                    pipe.control_transfer(handle, &Request::set_configuration(cfg.value), &mut [])
                        .await?;
                    debug!("found hub configuration: {:?}", cfg);
                }
                Descriptor::Endpoint(endpoint_descriptor) => {
                    assert!(endpoint_address.is_none()); // TODO: this happens on the Anker hub
                    endpoint_address = Some(endpoint_descriptor.into());
                }
                _ => continue, // skip other descriptors
            }
        }
        #[cfg(not(feature = "power-management"))]
        let _ = remote_wakeup_capable;

        let mut hub_desc = HubDescriptor::default();
        let hub_desc_buf = unsafe {
            core::slice::from_raw_parts_mut(
                &raw mut hub_desc as *mut u8,
                core::mem::size_of::<HubDescriptor>(),
            )
        };
        pipe.control_transfer(
            handle,
            &Request::get_descriptor(
                0x29, // Hub Descriptor
                RequestTypeType::Class,
                0,
                0,
                hub_desc_buf.len() as u16,
            ),
            hub_desc_buf,
        )
        .await?;

        debug!("hub descriptor: {:?}", hub_desc);

        if hub_desc.number_of_ports as usize > MAX_PORT {
            return Err(UsbHostError::HubCapacity);
        }

        // enable ports
        for port in 1..=hub_desc.number_of_ports {
            pipe.control_transfer(
                handle,
                &Request::set_feature(
                    RequestTypeRecipient::Other,
                    RequestTypeType::Class,
                    HubPortFeature::Power as u16,
                    port as u16,
                    0,
                ),
                &mut [],
            )
            .await?;
        }

        let endpoint_address = endpoint_address.ok_or(UsbHostError::InvalidResponse)?;

        let own_think_time = think_time_contribution(hub_desc.hub_characteristics);

        let mut hub = Hub {
            handle,
            dev_info,
            interrupt_channel: InterruptChannel {
                device_handle: handle,
                endpoint_address,
                tog: DataTog::DATA0,
            },
            ports: (1..=hub_desc.number_of_ports).map(PortState::new).collect(),
            own_think_time,
            total_think_time: parent_total_think_time + own_think_time as u16,
            #[cfg(feature = "power-management")]
            remote_wakeup_capable,
        };

        // Port numbers are 1-based.
        // Poll port status, powering on any port that reports unpowered.
        for port in 1..=hub_desc.number_of_ports {
            if let Ok((status, _)) = hub.get_port_status(pipe, port).await {
                trace!("port {} status: {:?}", port, status);

                if !status.power() {
                    if let Err(e) = hub
                        .set_port_feature(pipe, port, HubPortFeature::Power)
                        .await
                    {
                        error!("failed to enable port {}: {:?}", port, e);
                    }
                }
            }
        }

        Ok(hub)
    }

    pub(crate) fn total_think_time(&self) -> u16 {
        self.total_think_time
    }

    pub(crate) fn dev_info(&self) -> DevInfo {
        self.dev_info
    }

    fn port_state_mut(&mut self, port: u8) -> Option<&mut PortState> {
        self.ports.iter_mut().find(|p| p.port == port)
    }

    async fn clear_port_feature<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        port: u8,
        feature: HubPortFeature,
    ) -> Result<(), UsbHostError> {
        pipe.control_transfer(
            self.handle,
            &Request::clear_feature(
                RequestTypeRecipient::Other,
                RequestTypeType::Class,
                feature as u16,
                port as u16,
                0,
            ),
            &mut [],
        )
        .await
        .map(|_| ())
    }

    async fn set_port_feature<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        port: u8,
        feature: HubPortFeature,
    ) -> Result<(), UsbHostError> {
        pipe.control_transfer(
            self.handle,
            &Request::set_feature(
                RequestTypeRecipient::Other,
                RequestTypeType::Class,
                feature as u16,
                port as u16,
                0,
            ),
            &mut [],
        )
        .await
        .map(|_| ())
    }

    async fn get_port_status<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        port: u8,
    ) -> Result<(HubPortStatus, HubPortStatusChange), UsbHostError> {
        let mut status_buf = [0u8; 4];
        match pipe
            .control_transfer(
                self.handle,
                &Request::get_status(
                    RequestTypeRecipient::Other,
                    RequestTypeType::Class,
                    0,
                    port as u16,
                    status_buf.len() as u16,
                ),
                &mut status_buf,
            )
            .await
        {
            Ok(len) => {
                assert_eq!(len, 4);
                Ok((
                    u16::from_le_bytes([status_buf[0], status_buf[1]]).into(),
                    u16::from_le_bytes([status_buf[2], status_buf[3]]).into(),
                ))
            }
            Err(UsbHostError::BufferOverflow) => panic!("buffer overflow"),
            Err(e) => Err(e),
        }
    }

    /// GET_STATUS at the hub (not port) level: wHubStatus/wHubChangeStatus.
    async fn get_hub_status<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
    ) -> Result<HubStatusChange, UsbHostError> {
        let mut status_buf = [0u8; 4];
        match pipe
            .control_transfer(
                self.handle,
                &Request::get_status(
                    RequestTypeRecipient::Device,
                    RequestTypeType::Class,
                    0,
                    0,
                    status_buf.len() as u16,
                ),
                &mut status_buf,
            )
            .await
        {
            Ok(len) => {
                assert_eq!(len, 4);
                Ok(u16::from_le_bytes([status_buf[2], status_buf[3]]).into())
            }
            Err(UsbHostError::BufferOverflow) => panic!("buffer overflow"),
            Err(e) => Err(e),
        }
    }

    /// CLEAR_FEATURE at the hub (not port) level (C_HUB_LOCAL_POWER /
    /// C_HUB_OVER_CURRENT).
    async fn clear_hub_feature<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        feature: HubFeature,
    ) -> Result<(), UsbHostError> {
        pipe.control_transfer(
            self.handle,
            &Request::clear_feature(
                RequestTypeRecipient::Device,
                RequestTypeType::Class,
                feature as u16,
                0,
                0,
            ),
            &mut [],
        )
        .await
        .map(|_| ())
    }

    /// Removes a port's association with any downstream device and forces
    /// it back through a reset. Unlike every other method here, this
    /// mirrors the original driver's `USB_HostHubRemovePort` exactly,
    /// including returning an error on its success path: callers use this
    /// to force a re-enumeration of a wedged port and rely on the
    /// subsequent `DeviceDetach`/`DeviceReset` events, not this call's
    /// `Ok`/`Err` outcome, to learn the result.
    pub(crate) async fn remove_port<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        port: u8,
    ) -> Result<(), UsbHostError> {
        if let Some(state) = self.port_state_mut(port) {
            state.phase = PortPhase::Resetting {
                attempts_remaining: RESET_TIMES,
            };
        }
        self.set_port_feature(pipe, port, HubPortFeature::Reset)
            .await?;
        Err(UsbHostError::InvalidState)
    }

    async fn on_status_change<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        bitmask: &PortChangeBitmask,
        enumeration_in_progress: bool,
    ) -> Result<Option<HubEvent>, UsbHostError> {
        for port in bitmask.iter_ones() {
            if port == 0 {
                // Hub-level status change: GetStatusDone/ClearDone. Local
                // power takes priority over over-current, matching the
                // original's handling order; only one feature is cleared
                // per status-change event, the other (if also set) is
                // picked up on the next GET_STATUS once its own bit is
                // re-checked.
                let change = match self.get_hub_status(pipe).await {
                    Ok(change) => change,
                    Err(_) => continue,
                };
                debug!("hub {} status change: {:?}", self.handle.address(), change);

                if change.local_power() {
                    self.clear_hub_feature(pipe, HubFeature::LocalPower).await?;
                } else if change.over_current() {
                    self.clear_hub_feature(pipe, HubFeature::OverCurrent).await?;
                }
                continue;
            }
            let port = port as u8;

            let (status, change) = match self.get_port_status(pipe, port).await {
                Ok(v) => v,
                Err(_) => continue,
            };
            debug!("port {} status: {:?}\n change: {:?}", port, status, change);

            if change.connection() {
                if status.connected() {
                    if !enumeration_in_progress {
                        self.clear_port_feature(pipe, port, HubPortFeature::ChangeConnection)
                            .await?;

                        let child_tier = self.dev_info.tier() + 1;
                        if child_tier > MAX_TOPOLOGY_TIER {
                            error!(
                                "refusing to reset port {} on hub {}: tier {} exceeds max depth",
                                port,
                                self.handle.address(),
                                child_tier
                            );
                            continue;
                        }

                        // A reset is always driven through every one of
                        // RESET_TIMES cycles before the port is accepted,
                        // regardless of what the enable bit reports after
                        // any individual reset; `attempts_remaining` is
                        // pre-decremented here because issuing this first
                        // reset consumes the first of those cycles.
                        if let Some(state) = self.port_state_mut(port) {
                            state.phase = PortPhase::Resetting {
                                attempts_remaining: RESET_TIMES - 1,
                            };
                        }
                        trace!("resetting port {} on hub {}", port, self.handle.address());
                        unwrap!(
                            self.set_port_feature(pipe, port, HubPortFeature::Reset)
                                .await
                        );
                        return Ok(Some(HubEvent::DeviceReset));
                    }
                    // Enumeration in progress elsewhere, wait for it to finish.
                } else {
                    self.clear_port_feature(pipe, port, HubPortFeature::ChangeConnection)
                        .await?;
                    if let Some(state) = self.port_state_mut(port) {
                        state.phase = PortPhase::WaitConnect;
                    }
                    return Ok(Some(HubEvent::DeviceDetach(PortInfo::new(
                        self.handle.address(),
                        port,
                    ))));
                }
            }

            if change.reset() {
                unwrap!(
                    self.clear_port_feature(pipe, port, HubPortFeature::ChangeReset)
                        .await
                );

                if status.reset() {
                    error!("port {} reset changed but still reads reset", port);
                    continue;
                }

                // Success depends solely on the retry counter reaching
                // zero, never on the enable bit: a port is driven through
                // every one of RESET_TIMES reset cycles before it's
                // accepted, and only classified (speed read, positive-
                // signal-only) on the cycle that exhausts the counter.
                let attempts_remaining = match self.port_state_mut(port).map(|s| &s.phase) {
                    Some(PortPhase::Resetting { attempts_remaining }) => *attempts_remaining,
                    _ => {
                        error!("port {} C_PORT_RESET with no reset in flight", port);
                        continue;
                    }
                };

                match reset_cycle_outcome(attempts_remaining) {
                    ResetCycleOutcome::Accepted => {
                        if let Some(state) = self.port_state_mut(port) {
                            state.phase = PortPhase::Enabled;
                        }

                        let tt = match (self.dev_info.speed(), status.speed()) {
                            (UsbSpeed::HighSpeed, UsbSpeed::FullSpeed | UsbSpeed::LowSpeed) => {
                                // This hub is the TT for this device.
                                Some((self.handle.address(), port))
                            }
                            (_, _) => {
                                // Device shares the hub's own TT, if any.
                                self.dev_info.transaction_translator()
                            }
                        };

                        return Ok(Some(HubEvent::DeviceAttach(DevInfo::new(
                            self.handle.address(),
                            port,
                            tt,
                            status.speed(),
                            self.dev_info.tier() + 1,
                        ))));
                    }
                    ResetCycleOutcome::RetryWith(remaining) => {
                        if let Some(state) = self.port_state_mut(port) {
                            state.phase = PortPhase::Resetting {
                                attempts_remaining: remaining,
                            };
                        }
                        warn!(
                            "port {} reset cycle done, {} remaining, resetting again",
                            port, remaining
                        );
                        self.set_port_feature(pipe, port, HubPortFeature::Reset)
                            .await?;
                    }
                }
            }

            if change.enable() || change.over_current() {
                // Spurious change with no accompanying connection change;
                // clear and move on, matching the class spec's guidance
                // that hubs may report these independently of an attach.
                unwrap!(
                    self.clear_port_feature(pipe, port, HubPortFeature::ChangeEnable)
                        .await
                );
                unwrap!(
                    self.clear_port_feature(pipe, port, HubPortFeature::ChangeOverCurrent)
                        .await
                );
            }

            #[cfg(feature = "power-management")]
            if change.suspend() {
                unwrap!(
                    self.clear_port_feature(pipe, port, HubPortFeature::ChangeSuspend)
                        .await
                );
            }
        }
        Ok(None)
    }

    // Main deal
    pub async fn poll<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        enumeration_in_progress: bool,
    ) -> Result<Option<HubEvent>, UsbHostError> {
        let mut in_buf: PortChangeBitmask = BitArray::ZERO;
        let in_buf_len = pipe
            .interrupt_transfer(&mut self.interrupt_channel, in_buf.as_raw_mut_slice())
            .await;
        match in_buf_len {
            Ok(len) => {
                assert!(len > 0);
                self.on_status_change(pipe, &in_buf, enumeration_in_progress)
                    .await
            }
            Err(UsbHostError::NAK) => Ok(None),
            Err(e) => {
                error!("interrupt transfer error: {:?}", e);
                Err(e)
            }
        }
    }

    #[cfg(feature = "power-management")]
    pub(crate) fn remote_wakeup_capable(&self) -> bool {
        self.remote_wakeup_capable
    }

    /// Suspends a downstream port (PORT_SUSPEND), e.g. as the final step of
    /// the remote-wakeup chain once every hub between the device and the
    /// root has been told to forward the wakeup signal.
    #[cfg(feature = "power-management")]
    pub(crate) async fn suspend_port<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        port: u8,
    ) -> Result<(), UsbHostError> {
        self.set_port_feature(pipe, port, HubPortFeature::Suspend)
            .await?;
        if let Some(state) = self.port_state_mut(port) {
            state.phase = PortPhase::Suspended;
        }
        Ok(())
    }

    /// Resumes a previously suspended downstream port (CLEAR_FEATURE
    /// PORT_SUSPEND).
    #[cfg(feature = "power-management")]
    pub(crate) async fn resume_port<D: HostDriver, const NR_DEVICES: usize>(
        &mut self,
        pipe: &USBHostPipe<D, NR_DEVICES>,
        port: u8,
    ) -> Result<(), UsbHostError> {
        self.clear_port_feature(pipe, port, HubPortFeature::Suspend)
            .await?;
        if let Some(state) = self.port_state_mut(port) {
            state.phase = PortPhase::WaitConnect;
        }
        Ok(())
    }

    /// Test-only window into a port's reset/attach lifecycle, since
    /// `PortPhase` otherwise never leaves this module.
    #[cfg(test)]
    pub(crate) fn port_phase(&self, port: u8) -> Option<&PortPhase> {
        self.ports.iter().find(|p| p.port == port).map(|p| &p.phase)
    }
}

/// `(descriptor_bits + 1) << 3`, decoded from wHubCharacteristics bits 5:6
/// (TT Think Time, USB 2.0 table 11-13).
fn think_time_contribution(hub_characteristics: u16) -> u8 {
    let descriptor_bits = ((hub_characteristics >> 5) & 0x3) as u8;
    (descriptor_bits + 1) << 3
}

/// Outcome of one completed reset cycle (a single C_PORT_RESET
/// observation), given the retry counter in effect for that cycle.
#[derive(Debug, PartialEq, Eq)]
enum ResetCycleOutcome {
    /// The counter reached zero on this cycle: attach succeeds and the
    /// port's speed is classified now.
    Accepted,
    /// More cycles remain; reset again with the counter at this value.
    RetryWith(u8),
}

/// A port is driven through every one of `RESET_TIMES` reset cycles before
/// being accepted, regardless of what the enable bit reports after any
/// individual reset — acceptance depends solely on the counter reaching
/// zero.
fn reset_cycle_outcome(attempts_remaining: u8) -> ResetCycleOutcome {
    if attempts_remaining == 0 {
        ResetCycleOutcome::Accepted
    } else {
        ResetCycleOutcome::RetryWith(attempts_remaining - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_time_decodes_all_four_wHubCharacteristics_settings() {
        // bits 5:6 = 0 -> 8, 1 -> 16, 2 -> 24, 3 -> 32 FS bit-times.
        assert_eq!(think_time_contribution(0b000_0_00_00000), 8);
        assert_eq!(think_time_contribution(0b000_0_01_00000), 16);
        assert_eq!(think_time_contribution(0b000_0_10_00000), 24);
        assert_eq!(think_time_contribution(0b000_0_11_00000), 32);
    }

    #[test]
    fn reset_drives_through_every_cycle_before_accepting() {
        // Issuing the first reset already consumes one cycle, so the
        // counter in effect when the *first* C_PORT_RESET is observed is
        // RESET_TIMES - 1, matching `on_status_change`'s connection-change
        // branch.
        let mut attempts_remaining = RESET_TIMES - 1;
        let mut resets_issued_after_first = 0;
        loop {
            match reset_cycle_outcome(attempts_remaining) {
                ResetCycleOutcome::Accepted => break,
                ResetCycleOutcome::RetryWith(remaining) => {
                    resets_issued_after_first += 1;
                    attempts_remaining = remaining;
                }
            }
        }
        // First reset + 3 more retries = 4 total, i.e. RESET_TIMES.
        assert_eq!(resets_issued_after_first, RESET_TIMES as usize - 1);
    }

    #[test]
    fn reset_cycle_outcome_is_accepted_only_at_zero() {
        assert_eq!(reset_cycle_outcome(0), ResetCycleOutcome::Accepted);
        assert_eq!(reset_cycle_outcome(1), ResetCycleOutcome::RetryWith(0));
        assert_eq!(reset_cycle_outcome(3), ResetCycleOutcome::RetryWith(2));
    }

    #[test]
    fn child_tier_beyond_cap_is_rejected() {
        let deepest_parent_tier = MAX_TOPOLOGY_TIER;
        let child_tier = deepest_parent_tier + 1;
        assert!(child_tier > MAX_TOPOLOGY_TIER);

        let parent_tier = MAX_TOPOLOGY_TIER - 1;
        let child_tier = parent_tier + 1;
        assert!(child_tier <= MAX_TOPOLOGY_TIER);
    }

    mod scenarios {
        use super::*;
        use crate::descriptor::DescriptorType;
        use crate::mock::{MockDriver, MockPipe};
        use crate::types::Bcd16;
        use crate::{consts::UsbBaseClass, DeviceAddressManager};

        const GET_STATUS: u8 = 0x00;
        const CONFIGURATION_DESCRIPTOR: u16 = (DescriptorType::Configuration as u16) << 8;
        const HUB_DESCRIPTOR: u16 = 0x29 << 8;

        fn configuration_descriptor_bytes() -> [u8; 25] {
            [
                // Configuration descriptor (9 bytes)
                9, 2, 25, 0, 1, 1, 0, 0b1010_0000, 50,
                // Interface descriptor (9 bytes), class 0x09 (Hub)
                9, 4, 0, 0, 1, 0x09, 0, 0, 0,
                // Endpoint descriptor (7 bytes): EP1 IN, Interrupt, 2 bytes, 10ms
                7, 5, 0x81, 0x03, 2, 0, 10,
            ]
        }

        fn hub_descriptor_bytes(number_of_ports: u8) -> [u8; 7] {
            [7, 0x29, number_of_ports, 0, 0, 50, 0]
        }

        /// wPortStatus/wPortChange as raw little-endian bytes.
        fn port_status_bytes(status: u16, change: u16) -> [u8; 4] {
            let s = status.to_le_bytes();
            let c = change.to_le_bytes();
            [s[0], s[1], c[0], c[1]]
        }

        fn a_hub_device_descriptor() -> DeviceDescriptor {
            DeviceDescriptor {
                length: 18,
                descriptor_type: DescriptorType::Device,
                usb_release: Bcd16(0x0200),
                device_class: UsbBaseClass::Hub.into(),
                device_sub_class: 0,
                device_protocol: 0,
                max_packet_size: 64,
                id_vendor: 0,
                id_product: 0,
                device_release: Bcd16(0x0100),
                manufacturer_index: 0,
                product_index: 0,
                serial_number_index: 0,
                num_configurations: 1,
            }
        }

        /// Scripts the descriptor fetches and initial per-port power-up
        /// reads every `Hub::new` call performs, for a hub with `ports`
        /// downstream ports, none of which have anything attached yet.
        fn script_hub_bringup(mock: &mut MockPipe, ports: u8) {
            mock.script(0x06, CONFIGURATION_DESCRIPTOR, 0, &configuration_descriptor_bytes());
            mock.script(0x06, HUB_DESCRIPTOR, 0, &hub_descriptor_bytes(ports));
            for port in 1..=ports {
                mock.script(
                    GET_STATUS,
                    0,
                    port as u16,
                    &port_status_bytes(0x0100, 0x0000), // powered, nothing attached
                );
            }
        }

        fn new_hub(mock: MockPipe, ports: u8) -> (Hub, USBHostPipe<MockDriver, 4>) {
            let pipe = USBHostPipe::<MockDriver, 4>::new(mock);
            let mut addr_alloc = DeviceAddressManager::<4>::new();
            let handle = addr_alloc.alloc_device_address(64, DevInfo::root_device());
            let hub = pollster::block_on(Hub::new(
                &pipe,
                handle,
                a_hub_device_descriptor(),
                DevInfo::root_device(),
                0,
            ))
            .expect("hub bring-up should succeed against a fully scripted pipe");
            (hub, pipe)
        }

        #[test]
        fn port_connection_drives_exactly_reset_times_cycles_before_attach() {
            let mut mock = MockPipe::new();
            script_hub_bringup(&mut mock, 2);

            // Port 1: connection change, then RESET_TIMES reset-done events.
            mock.script(
                GET_STATUS,
                0,
                1,
                &port_status_bytes(0x0101, 0x0001), // C_PORT_CONNECTION
            );
            for _ in 0..RESET_TIMES {
                mock.script(
                    GET_STATUS,
                    0,
                    1,
                    &port_status_bytes(0x0101, 1 << 4), // C_PORT_RESET, reset bit itself clear
                );
            }

            mock.queue_interrupt_report(&[0b0000_0010]); // port 1 changed
            for _ in 0..RESET_TIMES {
                mock.queue_interrupt_report(&[0b0000_0010]);
            }

            let (mut hub, pipe) = new_hub(mock, 2);

            let event = pollster::block_on(hub.poll(&pipe, false))
                .unwrap()
                .expect("connection change should yield an event");
            assert!(matches!(event, HubEvent::DeviceReset));
            assert!(matches!(
                hub.port_phase(1),
                Some(PortPhase::Resetting {
                    attempts_remaining
                }) if *attempts_remaining == RESET_TIMES - 1
            ));

            for remaining in (0..RESET_TIMES - 1).rev() {
                let event = pollster::block_on(hub.poll(&pipe, false)).unwrap();
                assert!(event.is_none(), "mid-cycle reset-done should not surface an event yet");
                assert!(matches!(
                    hub.port_phase(1),
                    Some(PortPhase::Resetting { attempts_remaining }) if *attempts_remaining == remaining
                ));
            }

            let event = pollster::block_on(hub.poll(&pipe, false))
                .unwrap()
                .expect("final reset-done cycle should attach the device");
            assert!(matches!(event, HubEvent::DeviceAttach(_)));
            assert!(matches!(hub.port_phase(1), Some(PortPhase::Enabled)));
        }

        #[test]
        fn disconnect_mid_wait_reports_detach_and_resets_port_phase() {
            let mut mock = MockPipe::new();
            script_hub_bringup(&mut mock, 1);
            mock.script(
                GET_STATUS,
                0,
                1,
                &port_status_bytes(0x0000, 0x0001), // not connected, C_PORT_CONNECTION
            );
            mock.queue_interrupt_report(&[0b0000_0010]);

            let (mut hub, pipe) = new_hub(mock, 1);
            let event = pollster::block_on(hub.poll(&pipe, false))
                .unwrap()
                .expect("disconnect should yield a detach event");
            assert!(matches!(event, HubEvent::DeviceDetach(_)));
            assert!(matches!(hub.port_phase(1), Some(PortPhase::WaitConnect)));
        }

        #[test]
        fn hub_level_over_current_change_is_cleared_instead_of_ignored() {
            let mut mock = MockPipe::new();
            script_hub_bringup(&mut mock, 1);
            // wHubStatus/wHubChangeStatus: over-current change set, local power clear.
            mock.script(GET_STATUS, 0, 0, &port_status_bytes(0, 0b10));
            mock.queue_interrupt_report(&[0b0000_0001]); // hub-level (bit 0)

            let (mut hub, pipe) = new_hub(mock, 1);
            let event = pollster::block_on(hub.poll(&pipe, false)).unwrap();
            assert!(
                event.is_none(),
                "hub-level status change has no port event to report"
            );
        }
    }
}
