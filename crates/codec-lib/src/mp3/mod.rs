//! MP3 decoding through a frame-synchronous engine.
//!
//! Decoding a frame needs the `main_data_begin` of the frame after it, so the
//! adapter always holds one frame back and decodes it once the next input
//! arrives (or the stream ends).

mod decoder;
pub mod header;

pub use decoder::Mp3Decoder;

/// Samples per channel in one layer III frame.
pub const MP3_DEC_FRAME_LEN: usize = 1152;
/// Samples per channel of decoder delay trimmed from the start of the stream.
pub const DECODER_DELAY: usize = 529;

#[derive(Debug, Clone)]
pub struct Mp3DecoderOptions {
    pub channels: u32,
    pub sample_rate: u32,
    /// End the stream with [`DECODER_DELAY`] samples of silence instead of an
    /// empty EOS buffer.
    pub pad_end_of_stream: bool,
}

impl Default for Mp3DecoderOptions {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            pad_end_of_stream: false,
        }
    }
}
