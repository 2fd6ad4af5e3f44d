//! Scripted engines and a recording host for the adapter tests.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use codec_types::{
    AvcEngine, BufferHeader, BufferTag, CodecError, ComponentEvent, CropRect, DecodeInput,
    DecodedPicture, EngineCallbacks, EngineError, Mp3Engine, Mp3FrameInput, PictureInfo,
    RecPicture, VideoFormat, WorkBuffer,
};

use crate::alloc::{HeapAllocator, PhysicalAllocator, PhysicalBuffer};
use crate::component::ComponentHost;

#[derive(Debug, Default)]
pub struct RecordingHost {
    pub emptied: Vec<BufferTag>,
    pub filled: Vec<BufferHeader>,
    pub events: Vec<ComponentEvent>,
}

impl RecordingHost {
    pub fn filled_timestamps(&self) -> Vec<i64> {
        self.filled.iter().map(|b| b.timestamp).collect()
    }

    pub fn take_filled(&mut self) -> Vec<BufferHeader> {
        std::mem::take(&mut self.filled)
    }

    pub fn errors(&self) -> Vec<&CodecError> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ComponentEvent::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

impl ComponentHost for RecordingHost {
    fn empty_buffer_done(&mut self, buffer: BufferHeader) {
        self.emptied.push(buffer.tag);
    }

    fn fill_buffer_done(&mut self, buffer: BufferHeader) {
        self.filled.push(buffer);
    }

    fn notify(&mut self, event: ComponentEvent) {
        self.events.push(event);
    }
}

/// Heap allocator that counts live regions.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    pub live: Rc<Cell<usize>>,
    inner: HeapAllocator,
}

impl PhysicalAllocator for CountingAllocator {
    fn alloc(&mut self, size: usize) -> Result<PhysicalBuffer, CodecError> {
        let buffer = self.inner.alloc(size)?;
        self.live.set(self.live.get() + 1);
        Ok(buffer)
    }

    fn free(&mut self, buffer: PhysicalBuffer) {
        self.live.set(self.live.get() - 1);
        self.inner.free(buffer);
    }
}

/// AVC engine replaying a script.
///
/// Every decode writes into the current rec picture, binds it and queues it
/// for display. Pictures leave in ascending `display_order` once more than
/// `reorder_depth` are queued. Displayed pictures stay bound as references
/// until more than `hold_references` have been displayed.
#[derive(Debug)]
pub struct ScriptedAvcEngine {
    pub width: u32,
    pub height: u32,
    pub crop: Option<CropRect>,
    /// `(decode index, width, height)`: the decode switches to the new size and produces nothing.
    pub geometry_changes: Vec<(usize, u32, u32)>,
    /// Picture order count per decode index; defaults to the index.
    pub display_order: Vec<u32>,
    pub reorder_depth: usize,
    pub hold_references: usize,
    pub fail_decodes: Vec<usize>,
    /// Decode indices that consume the unit without producing a picture.
    pub no_picture: Vec<usize>,
    /// Requested from inside the first decode.
    pub extra_memory: Option<(usize, usize)>,
    pub bogus_unbind: bool,
    pub fail_init: bool,

    pub init_calls: usize,
    pub release_calls: usize,
    pub release_reference_calls: usize,
    pub stream_lengths: Vec<usize>,
    pub targets: Vec<BufferTag>,
    pub extra_addresses: Vec<codec_types::PhysAddr>,

    pub(crate) decode_calls: usize,
    pub(crate) current: Option<RecPicture>,
    pub(crate) pending: Vec<(u32, DecodedPicture)>,
    pub(crate) references: VecDeque<BufferTag>,
}

impl Default for ScriptedAvcEngine {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            crop: None,
            geometry_changes: Vec::new(),
            display_order: Vec::new(),
            reorder_depth: 0,
            hold_references: 0,
            fail_decodes: Vec::new(),
            no_picture: Vec::new(),
            extra_memory: Some((2, 4096)),
            bogus_unbind: false,
            fail_init: false,
            init_calls: 0,
            release_calls: 0,
            release_reference_calls: 0,
            stream_lengths: Vec::new(),
            targets: Vec::new(),
            extra_addresses: Vec::new(),
            decode_calls: 0,
            current: None,
            pending: Vec::new(),
            references: VecDeque::new(),
        }
    }
}

impl ScriptedAvcEngine {
    pub fn decode_calls(&self) -> usize {
        self.decode_calls
    }

    fn display_next(&mut self, callbacks: &mut dyn EngineCallbacks) -> Option<DecodedPicture> {
        let (position, _) = self
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, (poc, _))| *poc)?;
        let (_, picture) = self.pending.remove(position);
        self.references.push_back(picture.tag);
        while self.references.len() > self.hold_references {
            if let Some(tag) = self.references.pop_front() {
                callbacks.unbind_frame(tag);
            }
        }
        Some(picture)
    }
}

impl AvcEngine for ScriptedAvcEngine {
    fn init(&mut self, _work: &WorkBuffer, _format: &VideoFormat) -> Result<(), EngineError> {
        self.init_calls += 1;
        if self.fail_init {
            return Err(EngineError::Call {
                call: "init",
                code: -1,
            });
        }
        Ok(())
    }

    fn set_current_rec_picture(&mut self, picture: &RecPicture) {
        self.current = Some(*picture);
    }

    fn decode(
        &mut self,
        input: &DecodeInput<'_>,
        callbacks: &mut dyn EngineCallbacks,
    ) -> Result<Option<DecodedPicture>, EngineError> {
        let index = self.decode_calls;
        self.decode_calls += 1;
        self.stream_lengths.push(input.stream.len());

        if index == 0 {
            if let Some((count, size)) = self.extra_memory {
                self.extra_addresses = callbacks.alloc_extra_memory(count, size)?;
            }
        }
        if self.bogus_unbind {
            callbacks.unbind_frame(BufferTag::new(0xdead));
        }
        if self.fail_decodes.contains(&index) {
            return Err(EngineError::Call {
                call: "decode",
                code: -1,
            });
        }
        if let Some((_, width, height)) = self
            .geometry_changes
            .iter()
            .find(|(at, _, _)| *at == index)
        {
            self.width = *width;
            self.height = *height;
            return Ok(None);
        }
        if self.no_picture.contains(&index) {
            return Ok(None);
        }

        let target = self
            .current
            .take()
            .ok_or_else(|| EngineError::Unavailable("No rec picture set".to_string()))?;
        self.targets.push(target.tag);
        callbacks.bind_frame(target.tag);
        let poc = self
            .display_order
            .get(index)
            .copied()
            .unwrap_or(index as u32);
        self.pending.push((
            poc,
            DecodedPicture {
                picture_id: target.picture_id,
                tag: target.tag,
            },
        ));

        if self.pending.len() > self.reorder_depth {
            return Ok(self.display_next(callbacks));
        }
        Ok(None)
    }

    fn get_info(&mut self) -> Result<PictureInfo, EngineError> {
        Ok(PictureInfo {
            width: self.width,
            height: self.height,
            crop: self.crop,
        })
    }

    fn last_displayed_frame(
        &mut self,
        callbacks: &mut dyn EngineCallbacks,
    ) -> Option<DecodedPicture> {
        self.display_next(callbacks)
    }

    fn release_reference_buffers(&mut self, callbacks: &mut dyn EngineCallbacks) {
        self.release_reference_calls += 1;
        for (_, picture) in self.pending.drain(..) {
            callbacks.unbind_frame(picture.tag);
        }
        for tag in self.references.drain(..) {
            callbacks.unbind_frame(tag);
        }
    }

    fn release(&mut self) {
        self.release_calls += 1;
    }
}

/// A frame handed to [`ScriptedMp3Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFrame {
    pub frame: Vec<u8>,
    pub next_begin: u32,
    pub bitrate_kbps: u32,
}

/// MP3 engine producing `samples` per frame. Frame `n` fills the left channel
/// with `n + 1` and the right channel with `-(n + 1)`.
#[derive(Debug)]
pub struct ScriptedMp3Engine {
    pub samples: usize,
    pub fail_frames: Vec<usize>,
    pub frames: Vec<RecordedFrame>,
    pub init_calls: usize,
}

impl Default for ScriptedMp3Engine {
    fn default() -> Self {
        Self {
            samples: 1152,
            fail_frames: Vec::new(),
            frames: Vec::new(),
            init_calls: 0,
        }
    }
}

impl Mp3Engine for ScriptedMp3Engine {
    fn init(&mut self) -> Result<(), EngineError> {
        self.init_calls += 1;
        Ok(())
    }

    fn decode_frame(
        &mut self,
        input: &Mp3FrameInput<'_>,
        left: &mut [i16],
        right: &mut [i16],
    ) -> Result<usize, EngineError> {
        let index = self.frames.len();
        self.frames.push(RecordedFrame {
            frame: input.frame.to_vec(),
            next_begin: input.next_begin,
            bitrate_kbps: input.bitrate_kbps,
        });
        if self.fail_frames.contains(&index) {
            return Err(EngineError::Call {
                call: "decode_frame",
                code: 1,
            });
        }
        let value = index as i16 + 1;
        left[..self.samples].fill(value);
        right[..self.samples].fill(-value);
        Ok(self.samples)
    }
}
