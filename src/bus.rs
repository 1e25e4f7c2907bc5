use core::future::Future;

use crate::HostDriver;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    DeviceAttach,
    DeviceDetach,
    Suspend,
    Resume,
}

// not Send anyways
#[allow(async_fn_in_trait)]
pub trait Bus {
    async fn reset(&mut self);
    /// must be able to resume after completion
    /// aka poll after returning Poll::Ready(_)
    /// the built-in async keyword does not allow this
    fn poll(&mut self) -> impl Future<Output = Event>;

    /// Host-controller ioctl equivalent of BUS_SUSPEND: suspends the bus
    /// itself, used when there is no parent hub to issue PORT_SUSPEND on
    /// (root-attached device, or no hub in the chain at all).
    #[cfg(feature = "power-management")]
    async fn suspend(&mut self);

    /// Host-controller ioctl equivalent of BUS_RESUME, symmetric to
    /// `suspend`.
    #[cfg(feature = "power-management")]
    async fn resume(&mut self);
}

pub(crate) struct BusWrap<D: HostDriver>(D::Bus);

impl<D: HostDriver> BusWrap<D> {
    pub fn new(bus: D::Bus) -> Self {
        Self(bus)
    }

    pub async fn poll(&mut self) -> Event {
        match self.0.poll().await {
            Event::DeviceAttach => {
                self.0.reset().await;
                embassy_time::Timer::after_millis(500).await;

                Event::DeviceAttach
            }
            e => e,
        }
    }

    /// Waits for a root-port detach specifically, ignoring every other bus
    /// event. Used to race enumeration against the device going away
    /// mid-enumeration.
    pub async fn wait_until_detach(&mut self) {
        loop {
            if let Event::DeviceDetach = self.0.poll().await {
                return;
            }
        }
    }

    #[cfg(feature = "power-management")]
    pub async fn suspend(&mut self) {
        self.0.suspend().await
    }

    #[cfg(feature = "power-management")]
    pub async fn resume(&mut self) {
        self.0.resume().await
    }
}
