//! Port queues and the host contract the adapters plug into.

use std::collections::VecDeque;

use codec_types::{BufferHeader, CodecError, ComponentEvent, PortIndex};

/// Receives buffers and events from a component.
pub trait ComponentHost {
    /// An input buffer has been consumed and may be refilled.
    fn empty_buffer_done(&mut self, buffer: BufferHeader);
    /// An output buffer carries decoded data, or is returned empty.
    fn fill_buffer_done(&mut self, buffer: BufferHeader);
    fn notify(&mut self, event: ComponentEvent);
}

/// FIFO queues of buffers currently owned by the component.
#[derive(Debug)]
pub struct Ports {
    pub input: VecDeque<BufferHeader>,
    pub output: VecDeque<BufferHeader>,
    enabled: [bool; 2],
}

impl Ports {
    fn new() -> Self {
        Self {
            input: VecDeque::new(),
            output: VecDeque::new(),
            enabled: [true, true],
        }
    }

    pub fn is_enabled(&self, port: PortIndex) -> bool {
        self.enabled[port as usize]
    }

    pub fn queue_mut(&mut self, port: PortIndex) -> &mut VecDeque<BufferHeader> {
        match port {
            PortIndex::Input => &mut self.input,
            PortIndex::Output => &mut self.output,
        }
    }
}

/// The adapter side of a component. Only `on_queue_filled` is mandatory.
pub trait Codec {
    /// Called whenever new buffers may let the adapter make progress.
    fn on_queue_filled(&mut self, ports: &mut Ports, host: &mut dyn ComponentHost);

    /// Called before an output buffer enters the output queue.
    fn on_output_buffer_queued(&mut self, _buffer: &BufferHeader) {}

    /// Called before a flush or disable returns the port's buffers.
    fn on_port_flush_prepare(&mut self, _port: PortIndex, _host: &mut dyn ComponentHost) {}

    /// Called once every buffer of the port has been returned by a flush.
    fn on_port_flush_completed(&mut self, _port: PortIndex, _host: &mut dyn ComponentHost) {}

    fn on_port_enable_completed(
        &mut self,
        _port: PortIndex,
        _enabled: bool,
        _host: &mut dyn ComponentHost,
    ) {
    }
}

/// Progress of end-of-stream handling, shared by both adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EosStatus {
    InputDataAvailable,
    InputEosSeen,
    OutputFramesFlushed,
}

/// Owns the port queues and dispatches host operations to a [`Codec`].
pub struct Component<C: Codec, H: ComponentHost> {
    codec: C,
    host: H,
    ports: Ports,
}

impl<C: Codec, H: ComponentHost> Component<C, H> {
    pub fn new(codec: C, host: H) -> Self {
        Self {
            codec,
            host,
            ports: Ports::new(),
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn codec_mut(&mut self) -> &mut C {
        &mut self.codec
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    /// Queues a compressed buffer on the input port.
    pub fn empty_this_buffer(&mut self, buffer: BufferHeader) -> Result<(), CodecError> {
        if !self.ports.is_enabled(PortIndex::Input) {
            return Err(CodecError::PortDisabled(PortIndex::Input));
        }
        self.ports.input.push_back(buffer);
        self.codec.on_queue_filled(&mut self.ports, &mut self.host);
        Ok(())
    }

    /// Queues an empty buffer on the output port.
    pub fn fill_this_buffer(&mut self, buffer: BufferHeader) -> Result<(), CodecError> {
        if !self.ports.is_enabled(PortIndex::Output) {
            return Err(CodecError::PortDisabled(PortIndex::Output));
        }
        self.codec.on_output_buffer_queued(&buffer);
        self.ports.output.push_back(buffer);
        self.codec.on_queue_filled(&mut self.ports, &mut self.host);
        Ok(())
    }

    /// Returns every buffer queued on `port` to the host.
    pub fn flush(&mut self, port: PortIndex) {
        log::debug!("Flushing {} port", port);
        self.codec.on_port_flush_prepare(port, &mut self.host);
        self.return_buffers(port);
        self.codec.on_port_flush_completed(port, &mut self.host);
    }

    pub fn disable_port(&mut self, port: PortIndex) {
        log::debug!("Disabling {} port", port);
        self.codec.on_port_flush_prepare(port, &mut self.host);
        self.return_buffers(port);
        self.ports.enabled[port as usize] = false;
        self.codec.on_port_enable_completed(port, false, &mut self.host);
    }

    pub fn enable_port(&mut self, port: PortIndex) {
        log::debug!("Enabling {} port", port);
        self.ports.enabled[port as usize] = true;
        self.codec.on_port_enable_completed(port, true, &mut self.host);
        self.codec.on_queue_filled(&mut self.ports, &mut self.host);
    }

    fn return_buffers(&mut self, port: PortIndex) {
        let drained: Vec<BufferHeader> = self.ports.queue_mut(port).drain(..).collect();
        for mut buffer in drained {
            match port {
                PortIndex::Input => self.host.empty_buffer_done(buffer),
                PortIndex::Output => {
                    buffer.filled_len = 0;
                    self.host.fill_buffer_done(buffer);
                }
            }
        }
    }
}
