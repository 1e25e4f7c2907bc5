//! Fake `HostDriver`/`Bus`/`Pipe` used to drive the hub state machine from
//! tests without any real host controller. Each control-transfer request is
//! matched by `(bRequest, wValue, wIndex)` against a small scripted table
//! built up front with [`MockPipe::script`]; every key holds a queue of
//! responses that advances one step per matching call and then repeats its
//! last entry, so a single table can model a register whose value changes
//! over the course of a scenario (e.g. a port status read before and after
//! a reset).

use arrayvec::ArrayVec;

use crate::{errors::UsbHostError, request::Request, types::DataTog, Bus, Event, HostDriver, Pipe};

fn bytes_to_arrayvec<const N: usize>(data: &[u8]) -> ArrayVec<u8, N> {
    let mut v = ArrayVec::new();
    for &b in data {
        v.push(b);
    }
    v
}

struct ControlStep {
    request: u8,
    value: u16,
    index: u16,
    queue: ArrayVec<ArrayVec<u8, 32>, 8>,
    cursor: usize,
}

impl ControlStep {
    fn next(&mut self) -> &[u8] {
        let i = self.cursor.min(self.queue.len() - 1);
        if self.cursor + 1 < self.queue.len() {
            self.cursor += 1;
        }
        &self.queue[i]
    }
}

pub(crate) struct MockPipe {
    addr: u8,
    last_setup: [u8; 8],
    steps: ArrayVec<ControlStep, 32>,
    interrupt_reports: ArrayVec<ArrayVec<u8, 4>, 32>,
    interrupt_cursor: usize,
}

impl MockPipe {
    pub(crate) fn new() -> Self {
        Self {
            addr: 0,
            last_setup: [0; 8],
            steps: ArrayVec::new(),
            interrupt_reports: ArrayVec::new(),
            interrupt_cursor: 0,
        }
    }

    /// Appends `response` to the reply queue for the control request
    /// identified by `(request, value, index)`. Calling this more than once
    /// for the same key models a register whose value changes between
    /// reads; calling it once and reading it many times models a constant
    /// one (descriptors).
    pub(crate) fn script(&mut self, request: u8, value: u16, index: u16, response: &[u8]) {
        if let Some(step) = self
            .steps
            .iter_mut()
            .find(|s| s.request == request && s.value == value && s.index == index)
        {
            step.queue.push(bytes_to_arrayvec(response));
        } else {
            let mut queue = ArrayVec::new();
            queue.push(bytes_to_arrayvec(response));
            self.steps.push(ControlStep {
                request,
                value,
                index,
                queue,
                cursor: 0,
            });
        }
    }

    /// Queues one interrupt-IN report, consumed in order by successive
    /// `Hub::poll` calls.
    pub(crate) fn queue_interrupt_report(&mut self, report: &[u8]) {
        self.interrupt_reports.push(bytes_to_arrayvec(report));
    }
}

impl Pipe for MockPipe {
    fn set_addr(&mut self, addr: u8) {
        self.addr = addr;
    }

    async fn setup(&mut self, buf: &[u8; 8]) -> Result<(), UsbHostError> {
        self.last_setup = *buf;
        Ok(())
    }

    async fn data_in(
        &mut self,
        endpoint: u8,
        _tog: DataTog,
        buf: &mut [u8],
    ) -> Result<usize, UsbHostError> {
        if endpoint != 0 {
            if self.interrupt_cursor >= self.interrupt_reports.len() {
                return Err(UsbHostError::NAK);
            }
            let report = &self.interrupt_reports[self.interrupt_cursor];
            self.interrupt_cursor += 1;
            let len = report.len().min(buf.len());
            buf[..len].copy_from_slice(&report[..len]);
            return Ok(len);
        }

        // Zero-length status-stage acknowledgement.
        if buf.is_empty() {
            return Ok(0);
        }

        // SAFETY: `Request` is `#[repr(C)]` and exactly 8 bytes, the same
        // transmute `USBHostPipeInner::setup` performs on the way in.
        let request: &Request = unsafe { core::mem::transmute(&self.last_setup) };
        let (code, value, index) = (request.request, request.value, request.index);

        let step = self
            .steps
            .iter_mut()
            .find(|s| s.request == code && s.value == value && s.index == index)
            .unwrap_or_else(|| {
                panic!(
                    "unscripted control request {:#04x} value {:#06x} index {:#06x} (addr {})",
                    code, value, index, self.addr
                )
            });
        let data = step.next();
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    async fn data_out(
        &mut self,
        _endpoint: u8,
        _tog: DataTog,
        _buf: &[u8],
    ) -> Result<(), UsbHostError> {
        Ok(())
    }
}

/// Root-port bus stub. None of the hub-level scenario tests drive a `Host`
/// directly, so this never needs to report a real event; it exists so
/// `MockDriver` has a concrete `Bus` to name.
pub(crate) struct MockBus;

impl Bus for MockBus {
    async fn reset(&mut self) {}

    async fn poll(&mut self) -> Event {
        core::future::pending().await
    }

    #[cfg(feature = "power-management")]
    async fn suspend(&mut self) {}

    #[cfg(feature = "power-management")]
    async fn resume(&mut self) {}
}

pub(crate) struct MockDriver;

impl HostDriver for MockDriver {
    type Bus = MockBus;
    type Pipe = MockPipe;

    fn start(self) -> (Self::Bus, Self::Pipe) {
        (MockBus, MockPipe::new())
    }
}
