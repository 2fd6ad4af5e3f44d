//! Capability traits the adapters drive. Implementations wrap a vendor engine
//! or, in tests, replay a script.

use crate::{BufferTag, CropRect, EngineError, PhysAddr, PictureId};

/// A decoder-visible memory region handed to the engine as its work area.
#[derive(Debug, Clone, Copy)]
pub struct WorkBuffer {
    pub virt: *mut u8,
    pub phys: PhysAddr,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
}

/// One access unit, already copied into decoder-visible memory.
#[derive(Debug, Clone, Copy)]
pub struct DecodeInput<'a> {
    pub stream: &'a [u8],
    pub stream_phys: PhysAddr,
    pub expected_idr: bool,
    pub displayed: bool,
    pub last_frame: bool,
}

impl<'a> DecodeInput<'a> {
    pub fn new(stream: &'a [u8], stream_phys: PhysAddr) -> Self {
        Self {
            stream,
            stream_phys,
            expected_idr: true,
            displayed: true,
            last_frame: false,
        }
    }
}

/// Target picture for the next decode.
#[derive(Debug, Clone, Copy)]
pub struct RecPicture {
    pub virt: *mut u8,
    pub phys: PhysAddr,
    pub tag: BufferTag,
    pub picture_id: PictureId,
}

/// A picture the engine has finished and releases for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPicture {
    pub picture_id: PictureId,
    pub tag: BufferTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureInfo {
    pub width: u32,
    pub height: u32,
    pub crop: Option<CropRect>,
}

/// Calls the engine makes back into the adapter from inside `decode` and
/// the drain calls. Always invoked on the calling thread.
pub trait EngineCallbacks {
    /// The engine keeps `tag` as a reference picture.
    fn bind_frame(&mut self, tag: BufferTag);
    /// The engine no longer references `tag`.
    fn unbind_frame(&mut self, tag: BufferTag);
    /// The engine asks for `count` regions of `size` bytes once the stream
    /// headers tell it how much reference memory it needs.
    fn alloc_extra_memory(
        &mut self,
        count: usize,
        size: usize,
    ) -> Result<Vec<PhysAddr>, EngineError>;
}

pub trait AvcEngine {
    fn init(&mut self, work: &WorkBuffer, format: &VideoFormat) -> Result<(), EngineError>;

    fn set_current_rec_picture(&mut self, picture: &RecPicture);

    /// Decodes one access unit. `Ok(None)` means the engine holds the picture
    /// back for reordering or the unit carried no picture.
    fn decode(
        &mut self,
        input: &DecodeInput<'_>,
        callbacks: &mut dyn EngineCallbacks,
    ) -> Result<Option<DecodedPicture>, EngineError>;

    fn get_info(&mut self) -> Result<PictureInfo, EngineError>;

    /// Pops the next picture still held for display, if any.
    fn last_displayed_frame(
        &mut self,
        callbacks: &mut dyn EngineCallbacks,
    ) -> Option<DecodedPicture>;

    /// Drops every reference picture, unbinding each through `callbacks`.
    fn release_reference_buffers(&mut self, callbacks: &mut dyn EngineCallbacks);

    fn release(&mut self);
}

/// One MP3 frame together with what the engine needs from the frame after it.
#[derive(Debug, Clone, Copy)]
pub struct Mp3FrameInput<'a> {
    pub frame: &'a [u8],
    pub next_begin: u32,
    pub bitrate_kbps: u32,
}

pub trait Mp3Engine {
    fn init(&mut self) -> Result<(), EngineError>;

    /// Decodes one frame into the per-channel buffers, returning the number of
    /// samples written per channel.
    fn decode_frame(
        &mut self,
        input: &Mp3FrameInput<'_>,
        left: &mut [i16],
        right: &mut [i16],
    ) -> Result<usize, EngineError>;
}
