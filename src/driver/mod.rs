//! Shared helpers used by the hub class driver and the enumeration path.

pub(crate) mod hub;

use crate::{
    descriptor::DescriptorIterator,
    errors::UsbHostError,
    pipe::USBHostPipe,
    request::Request,
    DeviceHandle, HostDriver,
};

/// Fetches a device's configuration descriptor (and the interface/endpoint
/// descriptors that follow it) into `buf`, first with a short read to learn
/// `wTotalLength`, then with a second read sized to fit everything.
pub(crate) async fn get_configuration_descriptor<'b, D: HostDriver, const NR_DEVICES: usize>(
    handle: DeviceHandle,
    buf: &'b mut [u8],
    pipe: &USBHostPipe<D, NR_DEVICES>,
) -> Result<DescriptorIterator<'b>, UsbHostError> {
    const SHORT_READ_LEN: u16 = 9;
    debug_assert!(buf.len() >= SHORT_READ_LEN as usize);

    let total_length = {
        let mut short_buf = [0u8; SHORT_READ_LEN as usize];
        pipe.control_transfer(
            handle,
            &Request::get_configuration_descriptor(0, SHORT_READ_LEN),
            &mut short_buf,
        )
        .await?;
        u16::from_le_bytes([short_buf[2], short_buf[3]])
    };

    let total_length = total_length as usize;
    if total_length > buf.len() {
        return Err(UsbHostError::BufferOverflow);
    }

    let read = pipe
        .control_transfer(
            handle,
            &Request::get_configuration_descriptor(0, total_length as u16),
            &mut buf[..total_length],
        )
        .await?;

    Ok(DescriptorIterator::new(&buf[..read]))
}
