use codec_types::{
    AvcEngine, BufferFlags, BufferHeader, BufferTag, CodecError, ComponentEvent, ConfigIndex,
    CropRect, DecodeInput, EngineCallbacks, EngineError, Geometry, PhysAddr, PictureId,
    PictureInfo, PortDefinition, PortIndex, RecPicture, SessionState, VideoFormat,
};

use super::types::{self, AvcDecoderOptions, MAX_EXTRA_BUFFERS};
use crate::alloc::{PhysicalAllocator, PhysicalBuffer};
use crate::component::{Codec, ComponentHost, EosStatus, Ports};
use crate::correlation::PictureTable;
use crate::port_settings::PortSettingsChange;
use crate::refcount::RefTracker;

/// State the engine reaches through its callbacks.
pub(super) struct FrameStore {
    pub(super) refs: RefTracker,
    allocator: Box<dyn PhysicalAllocator>,
    extra_buffers: Vec<PhysicalBuffer>,
    pub(super) headers_decoded: bool,
}

impl FrameStore {
    fn alloc(&mut self, size: usize, what: &str) -> Result<PhysicalBuffer, CodecError> {
        self.allocator.alloc(size).map_err(|e| {
            CodecError::FatalConstruction(format!("Failed to allocate {}: {}", what, e))
        })
    }

    fn free_extra_buffers(&mut self) {
        for buffer in self.extra_buffers.drain(..) {
            self.allocator.free(buffer);
        }
    }
}

/// Engine callbacks for the duration of one engine call. Tags the tracker
/// does not know are collected and reported once the call returns.
pub(super) struct FrameCallbacks<'a> {
    store: &'a mut FrameStore,
    unknown_tags: Vec<BufferTag>,
}

impl<'a> FrameCallbacks<'a> {
    pub(super) fn new(store: &'a mut FrameStore) -> Self {
        Self {
            store,
            unknown_tags: Vec::new(),
        }
    }

    pub(super) fn finish(self) -> Result<(), CodecError> {
        if self.unknown_tags.is_empty() {
            return Ok(());
        }
        Err(CodecError::ProtocolViolation(format!(
            "Engine referenced unknown output buffers {:?}",
            self.unknown_tags
        )))
    }
}

impl EngineCallbacks for FrameCallbacks<'_> {
    fn bind_frame(&mut self, tag: BufferTag) {
        match self.store.refs.incref(tag) {
            Some(count) => log::trace!("Bind {:?}, ref count {}", tag, count),
            None => self.unknown_tags.push(tag),
        }
    }

    fn unbind_frame(&mut self, tag: BufferTag) {
        match self.store.refs.decref(tag) {
            Some(count) => log::trace!("Unbind {:?}, ref count {}", tag, count),
            None => self.unknown_tags.push(tag),
        }
    }

    fn alloc_extra_memory(
        &mut self,
        count: usize,
        size: usize,
    ) -> Result<Vec<PhysAddr>, EngineError> {
        if count > MAX_EXTRA_BUFFERS {
            return Err(EngineError::Unavailable(format!(
                "{} extra buffers requested, at most {} supported",
                count, MAX_EXTRA_BUFFERS
            )));
        }
        self.store.free_extra_buffers();

        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            let buffer = self
                .store
                .allocator
                .alloc(size)
                .map_err(|e| EngineError::Unavailable(e.to_string()))?;
            addresses.push(buffer.phys_addr());
            self.store.extra_buffers.push(buffer);
        }
        self.store.headers_decoded = true;
        log::info!("Allocated {} extra buffers of {} bytes", count, size);
        Ok(addresses)
    }
}

enum Step {
    Continue,
    Stop,
}

/// H.264 decoder adapter driving an [`AvcEngine`].
pub struct AvcDecoder<E: AvcEngine> {
    pub(super) engine: E,
    pub(super) frames: FrameStore,
    stream_buffer: Option<PhysicalBuffer>,
    internal_buffer: Option<PhysicalBuffer>,
    pub(super) pictures: PictureTable,
    last_picture_id: PictureId,
    pub(super) geometry: Geometry,
    engine_initialized: bool,
    pub(super) eos_status: EosStatus,
    pub(super) port_settings: PortSettingsChange,
    pub(super) signalled_error: bool,
    pub(super) use_native_buffers: bool,
    pub(super) input_port: PortDefinition,
    pub(super) output_port: PortDefinition,
}

impl<E: AvcEngine> AvcDecoder<E> {
    /// Allocates the stream and work buffers and initialises the engine.
    /// Any failure leaves nothing allocated.
    pub fn new(
        engine: E,
        allocator: Box<dyn PhysicalAllocator>,
        options: AvcDecoderOptions,
    ) -> Result<Self, CodecError> {
        let geometry = Geometry::new(options.initial_width, options.initial_height);
        let mut decoder = Self {
            engine,
            frames: FrameStore {
                refs: RefTracker::default(),
                allocator,
                extra_buffers: Vec::new(),
                headers_decoded: false,
            },
            stream_buffer: None,
            internal_buffer: None,
            pictures: PictureTable::default(),
            last_picture_id: PictureId::default(),
            geometry,
            engine_initialized: false,
            eos_status: EosStatus::InputDataAvailable,
            port_settings: PortSettingsChange::None,
            signalled_error: false,
            use_native_buffers: options.use_native_buffers,
            input_port: types::input_port_definition(),
            output_port: types::output_port_definition(
                geometry.width,
                geometry.height,
                types::color_format(options.use_native_buffers),
            ),
        };

        decoder.stream_buffer = Some(
            decoder
                .frames
                .alloc(options.stream_buffer_size, "stream buffer")?,
        );
        decoder.internal_buffer = Some(
            decoder
                .frames
                .alloc(options.internal_buffer_size, "internal buffer")?,
        );
        decoder.init_engine()?;
        Ok(decoder)
    }

    fn init_engine(&mut self) -> Result<(), CodecError> {
        let work = self
            .internal_buffer
            .as_ref()
            .map(PhysicalBuffer::work_buffer)
            .ok_or_else(|| CodecError::FatalConstruction("No internal buffer".to_string()))?;
        // The engine learns the real size from the stream headers.
        let format = VideoFormat {
            width: 0,
            height: 0,
        };
        self.engine
            .init(&work, &format)
            .map_err(|e| CodecError::FatalConstruction(format!("Engine init failed: {}", e)))?;
        self.engine_initialized = true;
        log::info!(
            "AVC engine initialised with a {} byte work buffer",
            work.size
        );
        Ok(())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn session_state(&self) -> SessionState {
        if self.signalled_error {
            return SessionState::Error;
        }
        if !self.engine_initialized {
            return SessionState::Uninitialized;
        }
        match self.port_settings {
            PortSettingsChange::AwaitingDisabled => SessionState::AwaitingPortDisable,
            PortSettingsChange::AwaitingEnabled => SessionState::AwaitingPortEnable,
            PortSettingsChange::None => match self.eos_status {
                EosStatus::InputEosSeen => SessionState::EosSeen,
                EosStatus::OutputFramesFlushed => SessionState::EosFlushed,
                EosStatus::InputDataAvailable if self.frames.headers_decoded => {
                    SessionState::Decoding
                }
                EosStatus::InputDataAvailable => SessionState::HeadersNotDecoded,
            },
        }
    }

    /// Pictures handed to the engine and not yet returned to the host.
    pub fn pending_pictures(&self) -> usize {
        self.pictures.len()
    }

    /// Current hold count of an output buffer.
    pub fn refcount(&self, tag: BufferTag) -> u32 {
        self.frames.refs.refcount(tag)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn extra_buffer_count(&self) -> usize {
        self.frames.extra_buffers.len()
    }

    pub fn signalled_error(&self) -> bool {
        self.signalled_error
    }

    pub(super) fn signal_error(&mut self, error: CodecError, host: &mut dyn ComponentHost) {
        log::error!("{}", error);
        self.signalled_error = true;
        host.notify(ComponentEvent::Error(error));
    }

    /// Index of the first queued output buffer nobody holds. The engine
    /// writes a whole picture into it, so it must fit one.
    fn find_free_output(&self, ports: &Ports) -> Result<Option<usize>, CodecError> {
        let picture_size = self.geometry.picture_size();
        for (index, buffer) in ports.output.iter().enumerate() {
            let ctrl = buffer.output_private.as_ref().ok_or_else(|| {
                CodecError::ProtocolViolation(format!(
                    "Output buffer {:?} has no control block",
                    buffer.tag
                ))
            })?;
            if ctrl.ref_count() != 0 {
                continue;
            }
            let room = buffer.capacity().saturating_sub(buffer.offset);
            if room < picture_size {
                return Err(CodecError::ProtocolViolation(format!(
                    "Output buffer {:?} holds {} bytes, a picture needs {}",
                    buffer.tag, room, picture_size
                )));
            }
            return Ok(Some(index));
        }
        Ok(None)
    }

    fn next_picture_id(&mut self) -> PictureId {
        self.last_picture_id = self.last_picture_id.next();
        self.last_picture_id
    }

    fn decode_one(
        &mut self,
        input: BufferHeader,
        target: usize,
        ports: &mut Ports,
        host: &mut dyn ComponentHost,
    ) -> Result<Step, CodecError> {
        let picture_id = self.next_picture_id();
        let end_of_stream = input.is_eos();
        self.pictures.put(
            picture_id,
            input.timestamp,
            input.flags.difference(BufferFlags::EOS),
        )?;

        let stream = self
            .stream_buffer
            .as_mut()
            .ok_or_else(|| CodecError::ProtocolViolation("No stream buffer".to_string()))?;
        let payload = input.payload();
        if payload.len() > stream.size() {
            log::warn!(
                "Dropping {} byte access unit, the stream buffer holds {}",
                payload.len(),
                stream.size()
            );
            self.pictures.take(picture_id)?;
            self.finish_input(input, end_of_stream, host);
            return Ok(Step::Continue);
        }
        let stream_len = payload.len();
        stream.as_mut_slice()[..stream_len].copy_from_slice(payload);

        let output = ports.output.get_mut(target).ok_or_else(|| {
            CodecError::ProtocolViolation(format!("Output buffer {} vanished", target))
        })?;
        let virt = output.data.as_mut_ptr().wrapping_add(output.offset);
        let picture = RecPicture {
            virt,
            phys: output.phys_addr.unwrap_or_else(|| PhysAddr::from_ptr(virt)),
            tag: output.tag,
            picture_id,
        };
        self.engine.set_current_rec_picture(&picture);

        let stream = self
            .stream_buffer
            .as_ref()
            .ok_or_else(|| CodecError::ProtocolViolation("No stream buffer".to_string()))?;
        let decode_input = DecodeInput::new(&stream.as_slice()[..stream_len], stream.phys_addr());
        let mut callbacks = FrameCallbacks::new(&mut self.frames);
        let decoded = self.engine.decode(&decode_input, &mut callbacks);
        callbacks.finish()?;

        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                let error = CodecError::DecodeFailure(format!("picture {}: {}", picture_id, e));
                log::warn!("{}, skipping the access unit", error);
                self.pictures.take(picture_id)?;
                self.finish_input(input, end_of_stream, host);
                return Ok(Step::Continue);
            }
        };
        if decoded.is_none() && input.flags.contains(BufferFlags::CODEC_CONFIG) {
            self.pictures.take(picture_id)?;
        }

        let geometry_changed = match self.engine.get_info() {
            Ok(info) => self.handle_picture_info(&info, host),
            Err(e) => {
                log::warn!("Could not query picture info: {}", e);
                false
            }
        };

        self.finish_input(input, end_of_stream, host);

        if geometry_changed {
            // The host reallocates every output buffer, so the picture is stale.
            if let Some(picture) = decoded {
                self.pictures.take(picture.picture_id)?;
            }
            return Ok(Step::Stop);
        }
        if let Some(picture) = decoded {
            self.drain_one_output_buffer(picture, ports, host)?;
        }
        Ok(Step::Continue)
    }

    fn finish_input(
        &mut self,
        input: BufferHeader,
        end_of_stream: bool,
        host: &mut dyn ComponentHost,
    ) {
        host.empty_buffer_done(input);
        if end_of_stream {
            log::debug!("Input EOS seen");
            self.eos_status = EosStatus::InputEosSeen;
        }
    }

    /// Returns true when the picture size changed and the output port must
    /// be renegotiated.
    fn handle_picture_info(&mut self, info: &PictureInfo, host: &mut dyn ComponentHost) -> bool {
        if info.width != self.geometry.width || info.height != self.geometry.height {
            log::info!(
                "Picture size changed from {}x{} to {}x{}",
                self.geometry.width,
                self.geometry.height,
                info.width,
                info.height
            );
            self.geometry = Geometry::new(info.width, info.height);
            self.update_port_definitions();
            host.notify(ComponentEvent::PortSettingsChanged {
                port: PortIndex::Output,
                config: None,
            });
            self.port_settings.begin();
            return true;
        }
        if let Some(crop) = info.crop {
            self.handle_crop(crop, host);
        }
        false
    }

    fn handle_crop(&mut self, crop: CropRect, host: &mut dyn ComponentHost) {
        if crop == self.geometry.crop {
            return;
        }
        log::debug!("Crop changed to {:?}", crop);
        self.geometry.crop = crop;
        host.notify(ComponentEvent::PortSettingsChanged {
            port: PortIndex::Output,
            config: Some(ConfigIndex::OutputCrop),
        });
    }

    fn drop_pending_pictures(&mut self, reason: &str) {
        let dropped = self.pictures.clear();
        if !dropped.is_empty() {
            log::debug!("Dropped {} pending pictures on {}", dropped.len(), reason);
        }
    }
}

impl<E: AvcEngine> Codec for AvcDecoder<E> {
    fn on_queue_filled(&mut self, ports: &mut Ports, host: &mut dyn ComponentHost) {
        if self.signalled_error || self.port_settings.is_pending() {
            return;
        }
        if self.eos_status == EosStatus::OutputFramesFlushed {
            return;
        }

        while (self.eos_status != EosStatus::InputDataAvailable || !ports.input.is_empty())
            && !ports.output.is_empty()
        {
            if self.eos_status == EosStatus::InputEosSeen {
                self.drain_all_output_buffers(ports, host);
                return;
            }

            let target = match self.find_free_output(ports) {
                Ok(Some(target)) => target,
                Ok(None) => {
                    log::trace!("Every queued output buffer is held, waiting");
                    return;
                }
                Err(e) => {
                    self.signal_error(e, host);
                    return;
                }
            };

            let Some(input) = ports.input.pop_front() else {
                return;
            };
            if input.is_eos() && input.filled_len == 0 {
                self.finish_input(input, true, host);
                continue;
            }

            match self.decode_one(input, target, ports, host) {
                Ok(Step::Continue) => {}
                Ok(Step::Stop) => return,
                Err(e) => {
                    self.signal_error(e, host);
                    return;
                }
            }
        }
    }

    fn on_output_buffer_queued(&mut self, buffer: &BufferHeader) {
        match &buffer.output_private {
            Some(ctrl) => self.frames.refs.on_queued(buffer.tag, ctrl),
            None => log::warn!("Output buffer {:?} queued without a control block", buffer.tag),
        }
    }

    fn on_port_flush_prepare(&mut self, port: PortIndex, host: &mut dyn ComponentHost) {
        if port != PortIndex::Output || !self.engine_initialized {
            return;
        }
        let mut callbacks = FrameCallbacks::new(&mut self.frames);
        self.engine.release_reference_buffers(&mut callbacks);
        if let Err(e) = callbacks.finish() {
            self.signal_error(e, host);
        }
    }

    fn on_port_flush_completed(&mut self, port: PortIndex, _host: &mut dyn ComponentHost) {
        match port {
            PortIndex::Input => self.eos_status = EosStatus::InputDataAvailable,
            PortIndex::Output => self.drop_pending_pictures("output flush"),
        }
    }

    fn on_port_enable_completed(
        &mut self,
        port: PortIndex,
        enabled: bool,
        host: &mut dyn ComponentHost,
    ) {
        if port != PortIndex::Output {
            return;
        }
        if !enabled {
            self.frames.refs.clear();
            self.drop_pending_pictures("output disable");
        }
        if let Err(e) = self.port_settings.on_enable_completed(enabled) {
            self.signal_error(e, host);
        }
    }
}

impl<E: AvcEngine> Drop for AvcDecoder<E> {
    fn drop(&mut self) {
        if self.engine_initialized {
            self.engine.release();
        }
        self.frames.free_extra_buffers();
        for buffer in [self.stream_buffer.take(), self.internal_buffer.take()]
            .into_iter()
            .flatten()
        {
            self.frames.allocator.free(buffer);
        }

        let leftovers = self.pictures.clear();
        if !leftovers.is_empty() {
            log::error!(
                "{} pictures were never returned to the host: {:?}",
                leftovers.len(),
                leftovers
            );
        }
        log::debug!("AVC decoder released");
    }
}
