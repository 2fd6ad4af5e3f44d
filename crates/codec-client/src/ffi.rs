//! C layouts and entry points of the vendor AVC and MP3 engines.

#![allow(non_snake_case, non_camel_case_types)]

use std::ffi::c_void;
use std::ptr;

pub type MMDecRet = i32;

pub const MMDEC_OK: MMDecRet = 0;
pub const VIDEO_STD_H264: i32 = 4;
pub const MP3_ARM_DEC_ERROR_NONE: u32 = 0;

/// Returned from the extra-memory callback.
pub const EXT_MEM_OK: i32 = 1;
pub const EXT_MEM_FAILED: i32 = -1;

#[repr(C)]
pub struct MMCodecBuffer {
    pub common_buffer_ptr: *mut u8,
    pub common_buffer_ptr_phy: *mut u8,
    pub size: u32,
}

#[repr(C)]
pub struct MMDecVideoFormat {
    pub video_std: i32,
    pub frame_width: i32,
    pub frame_height: i32,
    pub i_extra: i32,
    pub p_extra: *mut c_void,
}

#[repr(C)]
pub struct MMDecInput {
    pub pStream: *mut u8,
    pub dataLen: u32,
    pub beLastFrm: i32,
    pub expected_IVOP: i32,
    pub beDisplayed: i32,
    pub err_pkt_num: i32,
}

#[repr(C)]
pub struct MMDecOutput {
    pub pOutFrameY: *mut u8,
    pub pOutFrameU: *mut u8,
    pub pOutFrameV: *mut u8,
    pub frame_width: u32,
    pub frame_height: u32,
    pub is_transposed: i32,
    pub frameEffective: i32,
    pub err_MB_num: i32,
    pub pBufferHeader: *mut c_void,
    pub mPicId: i32,
}

impl MMDecOutput {
    pub fn empty() -> Self {
        Self {
            pOutFrameY: ptr::null_mut(),
            pOutFrameU: ptr::null_mut(),
            pOutFrameV: ptr::null_mut(),
            frame_width: 0,
            frame_height: 0,
            is_transposed: 0,
            frameEffective: 0,
            err_MB_num: 0,
            pBufferHeader: ptr::null_mut(),
            mPicId: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CropParams {
    pub cropLeftOffset: u32,
    pub cropOutWidth: u32,
    pub cropTopOffset: u32,
    pub cropOutHeight: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct H264SwDecInfo {
    pub picWidth: u32,
    pub picHeight: u32,
    pub videoRange: u32,
    pub matrixCoefficients: u32,
    pub parWidth: u32,
    pub parHeight: u32,
    pub croppingFlag: u32,
    pub cropParams: CropParams,
}

pub type ExtMemCb = extern "C" fn(
    userdata: *mut c_void,
    buffer_array: *mut u32,
    buffer_num: u32,
    buffer_size: u32,
) -> i32;
pub type FrameCb = extern "C" fn(userdata: *mut c_void, header: *mut c_void) -> i32;

/// Engine session handle. The engine owns `videoDecoderData`; the callbacks
/// receive `userdata` back unchanged.
#[repr(C)]
pub struct AvcHandle {
    pub videoDecoderData: *mut c_void,
    pub userdata: *mut c_void,
    pub VSP_extMemCb: Option<ExtMemCb>,
    pub VSP_bindCb: Option<FrameCb>,
    pub VSP_unbindCb: Option<FrameCb>,
}

pub type H264DecInitFn =
    unsafe extern "C" fn(*mut AvcHandle, *mut MMCodecBuffer, *mut MMDecVideoFormat) -> MMDecRet;
pub type H264DecGetInfoFn = unsafe extern "C" fn(*mut AvcHandle, *mut H264SwDecInfo) -> MMDecRet;
pub type H264DecDecodeFn =
    unsafe extern "C" fn(*mut AvcHandle, *mut MMDecInput, *mut MMDecOutput) -> MMDecRet;
pub type H264DecReleaseFn = unsafe extern "C" fn(*mut AvcHandle) -> MMDecRet;
pub type H264DecSetCurRecPicFn =
    unsafe extern "C" fn(*mut AvcHandle, *mut u8, *mut u8, *mut c_void, i32);
pub type H264DecGetLastDspFrmFn =
    unsafe extern "C" fn(*mut AvcHandle, *mut *mut u8, *mut i32) -> MMDecRet;
pub type H264DecReleaseRefBuffersFn = unsafe extern "C" fn(*mut AvcHandle);

#[repr(C)]
pub struct FRAME_DEC_T {
    pub frame_buf_ptr: *mut u8,
    pub frame_len: u32,
    pub next_begin: u32,
    pub bitrate: u32,
}

#[repr(C)]
pub struct OUTPUT_FRAME_T {
    pub pcm_data_l_ptr: *mut i16,
    pub pcm_data_r_ptr: *mut i16,
    pub pcm_bytes: u32,
    pub channel_num: u32,
}

pub type Mp3ConstructFn = unsafe extern "C" fn(*mut *mut c_void) -> i32;
pub type Mp3InitDecoderFn = unsafe extern "C" fn(*mut c_void);
pub type Mp3DecodeFrameFn =
    unsafe extern "C" fn(*mut c_void, *mut FRAME_DEC_T, *mut OUTPUT_FRAME_T, *mut u32);
pub type Mp3DeconstructFn = unsafe extern "C" fn(*mut *const c_void);

#[cfg(feature = "static-engine")]
pub(crate) mod linked {
    use super::*;

    #[link(name = "omx_avcdec_hw_sprd")]
    extern "C" {
        pub fn H264DecInit(
            handle: *mut AvcHandle,
            buffer: *mut MMCodecBuffer,
            format: *mut MMDecVideoFormat,
        ) -> MMDecRet;
        pub fn H264DecGetInfo(handle: *mut AvcHandle, info: *mut H264SwDecInfo) -> MMDecRet;
        pub fn H264DecDecode(
            handle: *mut AvcHandle,
            input: *mut MMDecInput,
            output: *mut MMDecOutput,
        ) -> MMDecRet;
        pub fn H264DecRelease(handle: *mut AvcHandle) -> MMDecRet;
        pub fn H264Dec_SetCurRecPic(
            handle: *mut AvcHandle,
            frame: *mut u8,
            frame_phys: *mut u8,
            header: *mut c_void,
            picture_id: i32,
        );
        pub fn H264Dec_GetLastDspFrm(
            handle: *mut AvcHandle,
            output: *mut *mut u8,
            picture_id: *mut i32,
        ) -> MMDecRet;
        pub fn H264Dec_ReleaseRefBuffers(handle: *mut AvcHandle);
    }

    #[link(name = "omx_mp3dec_sprd")]
    extern "C" {
        pub fn MP3_ARM_DEC_Construct(handle: *mut *mut c_void) -> i32;
        pub fn MP3_ARM_DEC_InitDecoder(handle: *mut c_void);
        pub fn MP3_ARM_DEC_DecodeFrame(
            handle: *mut c_void,
            input: *mut FRAME_DEC_T,
            output: *mut OUTPUT_FRAME_T,
            result: *mut u32,
        );
        pub fn MP3_ARM_DEC_Deconstruct(handle: *mut *const c_void);
    }
}
