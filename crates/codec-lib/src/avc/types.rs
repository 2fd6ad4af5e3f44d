use codec_types::{ColorFormat, PortDefinition, PortFormat, PortIndex};

pub(super) const INPUT_BUFFER_COUNT: u32 = 8;
pub(super) const INPUT_BUFFER_SIZE: usize = 8192;
pub(super) const OUTPUT_BUFFER_COUNT: u32 = 2;
/// Upper bound on reference memory regions the engine may request.
pub(super) const MAX_EXTRA_BUFFERS: usize = 17;

#[derive(Debug, Clone)]
pub struct AvcDecoderOptions {
    /// Picture size assumed until the engine reports the real one.
    pub initial_width: u32,
    pub initial_height: u32,
    /// Decoder-visible memory for one access unit.
    pub stream_buffer_size: usize,
    /// Engine work area.
    pub internal_buffer_size: usize,
    /// Output buffers are graphics buffers in the semi-planar native layout.
    pub use_native_buffers: bool,
}

impl Default for AvcDecoderOptions {
    fn default() -> Self {
        Self {
            initial_width: 320,
            initial_height: 240,
            stream_buffer_size: 3 * 1024 * 1024,
            internal_buffer_size: 0x20_0000,
            use_native_buffers: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcProfile {
    Baseline,
    Main,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AvcLevel {
    L1,
    L1b,
    L11,
    L12,
    L13,
    L2,
    L21,
    L22,
    L3,
    L31,
    L32,
    L4,
    L41,
    L42,
    L5,
    L51,
}

impl AvcLevel {
    pub const ALL: [AvcLevel; 16] = [
        AvcLevel::L1,
        AvcLevel::L1b,
        AvcLevel::L11,
        AvcLevel::L12,
        AvcLevel::L13,
        AvcLevel::L2,
        AvcLevel::L21,
        AvcLevel::L22,
        AvcLevel::L3,
        AvcLevel::L31,
        AvcLevel::L32,
        AvcLevel::L4,
        AvcLevel::L41,
        AvcLevel::L42,
        AvcLevel::L5,
        AvcLevel::L51,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileLevel {
    pub profile: AvcProfile,
    pub level: AvcLevel,
}

pub(super) fn input_port_definition() -> PortDefinition {
    PortDefinition {
        port: PortIndex::Input,
        buffer_count_min: 1,
        buffer_count_actual: INPUT_BUFFER_COUNT,
        buffer_size: INPUT_BUFFER_SIZE,
        format: PortFormat::Avc,
    }
}

pub(super) fn output_port_definition(
    width: u32,
    height: u32,
    color_format: ColorFormat,
) -> PortDefinition {
    PortDefinition {
        port: PortIndex::Output,
        buffer_count_min: 2,
        buffer_count_actual: OUTPUT_BUFFER_COUNT,
        buffer_size: width as usize * height as usize * 3 / 2,
        format: PortFormat::RawVideo {
            width,
            height,
            stride: width,
            slice_height: height,
            color_format,
        },
    }
}

pub(super) fn color_format(use_native_buffers: bool) -> ColorFormat {
    if use_native_buffers {
        ColorFormat::Yuv420SemiPlanar
    } else {
        ColorFormat::Yuv420Planar
    }
}
