//! Hardware codec adapters for H.264/AVC video and MP3 audio.
//!
//! Each adapter sits behind a [`Component`], which owns the host's input and
//! output queues and calls back into the adapter whenever buffers arrive.

pub mod alloc;
pub mod avc;
pub mod component;
mod correlation;
pub mod mp3;
mod port_settings;
mod refcount;

#[cfg(test)]
mod testing;

pub use alloc::{HeapAllocator, PhysicalAllocator, PhysicalBuffer};
pub use avc::{AvcDecoder, AvcDecoderOptions, ProfileLevel};
pub use component::{Codec, Component, ComponentHost, Ports};
pub use mp3::{Mp3Decoder, Mp3DecoderOptions};

pub use codec_types;

/// Initialises `pretty_env_logger` from `RUST_LOG`. Safe to call more than once.
pub fn init_logging() {
    if pretty_env_logger::try_init().is_err() {
        log::debug!("Logger already initialised");
    }
}
