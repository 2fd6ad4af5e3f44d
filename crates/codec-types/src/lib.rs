//! Vocabulary shared by the codec adapters, the vendor engine bindings and the host.

mod engine;

pub use engine::{
    AvcEngine, DecodeInput, DecodedPicture, EngineCallbacks, Mp3Engine, Mp3FrameInput,
    PictureInfo, RecPicture, VideoFormat, WorkBuffer,
};

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortIndex {
    Input = 0,
    Output = 1,
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortIndex::Input => write!(f, "input"),
            PortIndex::Output => write!(f, "output"),
        }
    }
}

bitflags::bitflags! {
    /// Buffer header flag bits, numerically compatible with the OpenMAX IL values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct BufferFlags: u32 {
        const EOS = 0x0000_0001;
        const START_TIME = 0x0000_0002;
        const DECODE_ONLY = 0x0000_0004;
        const DATA_CORRUPT = 0x0000_0008;
        const END_OF_FRAME = 0x0000_0010;
        const SYNC_FRAME = 0x0000_0020;
        const EXTRA_DATA = 0x0000_0040;
        const CODEC_CONFIG = 0x0000_0080;
    }
}

/// Identifier minted by the video adapter for every access unit it hands to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PictureId(u32);

impl PictureId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for PictureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque token naming one host buffer slot. Engines receive tags instead of
/// raw header pointers and hand them back in callbacks and decode results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferTag(u64);

impl BufferTag {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Device-visible address of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PhysAddr(u64);

impl PhysAddr {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Identity mapping, for memory that is directly addressable by the engine.
    pub fn from_ptr(ptr: *const u8) -> Self {
        Self(ptr as usize as u64)
    }
}

/// Port-private control block the host attaches to every output buffer.
///
/// Clones share the same counter, so the host-side header and the adapter's
/// tracker always observe the same number of holds.
#[derive(Debug, Clone, Default)]
pub struct BufferCtrl {
    ref_count: Arc<AtomicU32>,
}

impl BufferCtrl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn incref(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops one hold. Never goes below zero.
    pub fn decref(&self) -> u32 {
        match self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }
}

/// A host buffer as it travels between the host and an adapter.
pub struct BufferHeader {
    pub tag: BufferTag,
    pub data: Vec<u8>,
    pub offset: usize,
    pub filled_len: usize,
    /// Presentation time in microseconds.
    pub timestamp: i64,
    pub flags: BufferFlags,
    /// Device address of `data` when it lives in graphics or carveout memory.
    pub phys_addr: Option<PhysAddr>,
    /// Control block required on output buffers.
    pub output_private: Option<BufferCtrl>,
}

impl BufferHeader {
    /// An empty buffer of `capacity` bytes.
    pub fn new(tag: BufferTag, capacity: usize) -> Self {
        Self {
            tag,
            data: vec![0; capacity],
            offset: 0,
            filled_len: 0,
            timestamp: 0,
            flags: BufferFlags::empty(),
            phys_addr: None,
            output_private: None,
        }
    }

    /// An output buffer carrying a fresh control block.
    pub fn output(tag: BufferTag, capacity: usize) -> Self {
        Self {
            output_private: Some(BufferCtrl::new()),
            ..Self::new(tag, capacity)
        }
    }

    /// An input buffer filled with `payload`.
    pub fn with_payload(
        tag: BufferTag,
        payload: &[u8],
        timestamp: i64,
        flags: BufferFlags,
    ) -> Self {
        Self {
            data: payload.to_vec(),
            filled_len: payload.len(),
            timestamp,
            flags,
            ..Self::new(tag, 0)
        }
    }

    pub fn payload(&self) -> &[u8] {
        self.data
            .get(self.offset..self.offset.saturating_add(self.filled_len))
            .unwrap_or(&[])
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(BufferFlags::EOS)
    }
}

impl fmt::Debug for BufferHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHeader")
            .field("tag", &self.tag)
            .field("capacity", &self.data.len())
            .field("offset", &self.offset)
            .field("filled_len", &self.filled_len)
            .field("timestamp", &self.timestamp)
            .field("flags", &self.flags)
            .field("phys_addr", &self.phys_addr)
            .field("ref_count", &self.output_private.as_ref().map(|c| c.ref_count()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Frame size and crop of the decoded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub crop: CropRect,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            crop: CropRect {
                left: 0,
                top: 0,
                width,
                height,
            },
        }
    }

    /// Bytes in one YUV 4:2:0 picture.
    pub fn picture_size(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    Yuv420Planar,
    Yuv420SemiPlanar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFormat {
    Avc,
    Mp3,
    RawVideo {
        width: u32,
        height: u32,
        stride: u32,
        slice_height: u32,
        color_format: ColorFormat,
    },
    Pcm {
        channels: u32,
        sample_rate: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDefinition {
    pub port: PortIndex,
    pub buffer_count_min: u32,
    pub buffer_count_actual: u32,
    pub buffer_size: usize,
    pub format: PortFormat,
}

/// Configuration index carried by a settings-change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIndex {
    OutputCrop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentEvent {
    PortSettingsChanged {
        port: PortIndex,
        config: Option<ConfigIndex>,
    },
    Error(CodecError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    HeadersNotDecoded,
    Decoding,
    AwaitingPortDisable,
    AwaitingPortEnable,
    EosSeen,
    EosFlushed,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// The engine could not be resolved or initialised; the adapter is unusable.
    FatalConstruction(String),
    /// The host or engine broke the buffer contract; processing stops until teardown.
    ProtocolViolation(String),
    /// One input could not be decoded; the adapter skips it and carries on.
    DecodeFailure(String),
    InvalidParameter(String),
    PortDisabled(PortIndex),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::FatalConstruction(s) => write!(f, "Engine construction failed: {}", s),
            CodecError::ProtocolViolation(s) => write!(f, "Buffer protocol violation: {}", s),
            CodecError::DecodeFailure(s) => write!(f, "Decode failed: {}", s),
            CodecError::InvalidParameter(s) => write!(f, "Invalid parameter: {}", s),
            CodecError::PortDisabled(port) => write!(f, "The {} port is disabled", port),
        }
    }
}

impl std::error::Error for CodecError {}

/// Failure reported by an engine implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Call { call: &'static str, code: i32 },
    Unavailable(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Call { call, code } => write!(f, "{} returned {}", call, code),
            EngineError::Unavailable(s) => write!(f, "Engine unavailable: {}", s),
        }
    }
}

impl std::error::Error for EngineError {}
