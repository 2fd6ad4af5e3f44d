use std::ffi::c_void;
use std::ptr;

use codec_types::{EngineError, Mp3Engine, Mp3FrameInput};

use crate::ffi::{
    self, Mp3ConstructFn, Mp3DecodeFrameFn, Mp3DeconstructFn, Mp3InitDecoderFn, FRAME_DEC_T,
    OUTPUT_FRAME_T,
};
use crate::EngineLoadError;

/// Samples per channel the engine may write for one frame.
const FRAME_SAMPLES: usize = 1152;

#[derive(Clone, Copy)]
pub(crate) struct Mp3EntryPoints {
    pub construct: Mp3ConstructFn,
    pub init_decoder: Mp3InitDecoderFn,
    pub decode_frame: Mp3DecodeFrameFn,
    pub deconstruct: Mp3DeconstructFn,
}

/// [`Mp3Engine`] backed by the vendor MP3 library.
pub struct VendorMp3Engine {
    entry: Mp3EntryPoints,
    handle: *mut c_void,
    _library: Option<libloading::Library>,
}

impl VendorMp3Engine {
    pub(crate) fn new(
        entry: Mp3EntryPoints,
        library: Option<libloading::Library>,
    ) -> Result<Self, EngineLoadError> {
        let mut handle = ptr::null_mut();
        let ret = unsafe { (entry.construct)(&mut handle) };
        log::debug!("MP3_ARM_DEC_Construct returned {}", ret);
        if ret != 0 || handle.is_null() {
            return Err(EngineLoadError::Construct {
                symbol: "MP3_ARM_DEC_Construct",
                code: ret,
            });
        }
        Ok(Self {
            entry,
            handle,
            _library: library,
        })
    }
}

impl Mp3Engine for VendorMp3Engine {
    fn init(&mut self) -> Result<(), EngineError> {
        unsafe { (self.entry.init_decoder)(self.handle) };
        Ok(())
    }

    fn decode_frame(
        &mut self,
        input: &Mp3FrameInput<'_>,
        left: &mut [i16],
        right: &mut [i16],
    ) -> Result<usize, EngineError> {
        if left.len() < FRAME_SAMPLES || right.len() < FRAME_SAMPLES {
            return Err(EngineError::Unavailable(format!(
                "PCM buffers hold {} and {} samples, a frame needs {}",
                left.len(),
                right.len(),
                FRAME_SAMPLES
            )));
        }
        // The engine reads the frame but takes a mutable pointer.
        let mut frame = FRAME_DEC_T {
            frame_buf_ptr: input.frame.as_ptr() as *mut u8,
            frame_len: input.frame.len() as u32,
            next_begin: input.next_begin,
            bitrate: input.bitrate_kbps,
        };
        let mut output = OUTPUT_FRAME_T {
            pcm_data_l_ptr: left.as_mut_ptr(),
            pcm_data_r_ptr: right.as_mut_ptr(),
            pcm_bytes: 0,
            channel_num: 0,
        };
        let mut result = ffi::MP3_ARM_DEC_ERROR_NONE;
        unsafe { (self.entry.decode_frame)(self.handle, &mut frame, &mut output, &mut result) };
        if result != ffi::MP3_ARM_DEC_ERROR_NONE {
            return Err(EngineError::Call {
                call: "MP3_ARM_DEC_DecodeFrame",
                code: result as i32,
            });
        }
        // `pcm_bytes` counts samples per channel.
        Ok((output.pcm_bytes as usize).min(FRAME_SAMPLES))
    }
}

impl Drop for VendorMp3Engine {
    fn drop(&mut self) {
        let mut handle = self.handle as *const c_void;
        unsafe { (self.entry.deconstruct)(&mut handle) };
        self.handle = ptr::null_mut();
    }
}
