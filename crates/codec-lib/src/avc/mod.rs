//! H.264/AVC decoding through a hardware engine.
//!
//! The engine writes each picture straight into a host output buffer chosen
//! by the adapter. Pictures may come back out of decode order, so every
//! access unit gets a picture id that travels through the engine and is used
//! to recover the input's timestamp and flags.
//!
//! # Buffer ownership
//! An output buffer is only handed to the engine while its hold count is
//! zero. The engine adds a hold for every reference it keeps and the adapter
//! adds one while the host displays the picture.

mod decoder;
mod drain;
mod params;
#[cfg(test)]
mod tests;
mod types;

pub use decoder::AvcDecoder;
pub use types::{AvcDecoderOptions, AvcLevel, AvcProfile, ProfileLevel};
