use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;

use codec_types::{
    AvcEngine, BufferTag, CropRect, DecodeInput, DecodedPicture, EngineCallbacks, EngineError,
    PictureId, PictureInfo, RecPicture, VideoFormat, WorkBuffer,
};

use crate::ffi::{
    self, AvcHandle, H264DecDecodeFn, H264DecGetInfoFn, H264DecGetLastDspFrmFn, H264DecInitFn,
    H264DecReleaseFn, H264DecReleaseRefBuffersFn, H264DecSetCurRecPicFn, H264SwDecInfo,
    MMCodecBuffer, MMDecInput, MMDecOutput, MMDecVideoFormat,
};

#[derive(Clone, Copy)]
pub(crate) struct AvcEntryPoints {
    pub init: H264DecInitFn,
    pub get_info: H264DecGetInfoFn,
    pub decode: H264DecDecodeFn,
    pub release: H264DecReleaseFn,
    pub set_cur_rec_pic: H264DecSetCurRecPicFn,
    pub get_last_dsp_frm: H264DecGetLastDspFrmFn,
    pub release_ref_buffers: H264DecReleaseRefBuffersFn,
}

/// What the trampolines reach through `AvcHandle::userdata` while an engine
/// call is in progress.
struct CallbackContext<'a, 'b> {
    callbacks: &'a mut (dyn EngineCallbacks + 'b),
    error: Option<EngineError>,
}

/// # Safety
/// `userdata` must be null or point to a live `CallbackContext`.
unsafe fn context_from<'a>(userdata: *mut c_void) -> Option<&'a mut CallbackContext<'a, 'a>> {
    (userdata as *mut CallbackContext).as_mut()
}

fn tag_from_header(header: *mut c_void) -> BufferTag {
    BufferTag::new(header as usize as u64)
}

extern "C" fn ext_mem_trampoline(
    userdata: *mut c_void,
    buffer_array: *mut u32,
    buffer_num: u32,
    buffer_size: u32,
) -> i32 {
    let Some(context) = (unsafe { context_from(userdata) }) else {
        log::error!("Extra memory requested outside of a decode call");
        return ffi::EXT_MEM_FAILED;
    };
    let addresses = match context
        .callbacks
        .alloc_extra_memory(buffer_num as usize, buffer_size as usize)
    {
        Ok(addresses) => addresses,
        Err(e) => {
            log::error!("Extra memory allocation failed: {}", e);
            context.error = Some(e);
            return ffi::EXT_MEM_FAILED;
        }
    };
    if buffer_array.is_null() {
        return ffi::EXT_MEM_FAILED;
    }
    let slots = unsafe { std::slice::from_raw_parts_mut(buffer_array, buffer_num as usize) };
    // The engine addresses memory with 32 bits.
    for (slot, address) in slots.iter_mut().zip(&addresses) {
        *slot = address.raw() as u32;
    }
    ffi::EXT_MEM_OK
}

extern "C" fn bind_trampoline(userdata: *mut c_void, header: *mut c_void) -> i32 {
    match unsafe { context_from(userdata) } {
        Some(context) => {
            context.callbacks.bind_frame(tag_from_header(header));
            0
        }
        None => {
            log::error!("Bind callback outside of an engine call");
            -1
        }
    }
}

extern "C" fn unbind_trampoline(userdata: *mut c_void, header: *mut c_void) -> i32 {
    match unsafe { context_from(userdata) } {
        Some(context) => {
            context.callbacks.unbind_frame(tag_from_header(header));
            0
        }
        None => {
            log::error!("Unbind callback outside of an engine call");
            -1
        }
    }
}

fn check(call: &'static str, ret: ffi::MMDecRet) -> Result<(), EngineError> {
    if ret == ffi::MMDEC_OK {
        Ok(())
    } else {
        Err(EngineError::Call { call, code: ret })
    }
}

/// [`AvcEngine`] backed by the vendor H.264 library.
///
/// Buffer tags travel through the engine in place of header pointers, so the
/// bind and unbind callbacks hand back exactly the tag given to
/// [`AvcEngine::set_current_rec_picture`].
pub struct VendorAvcEngine {
    entry: AvcEntryPoints,
    handle: Box<AvcHandle>,
    targets: HashMap<PictureId, BufferTag>,
    initialized: bool,
    _library: Option<libloading::Library>,
}

impl VendorAvcEngine {
    pub(crate) fn new(entry: AvcEntryPoints, library: Option<libloading::Library>) -> Self {
        let handle = Box::new(AvcHandle {
            videoDecoderData: ptr::null_mut(),
            userdata: ptr::null_mut(),
            VSP_extMemCb: Some(ext_mem_trampoline),
            VSP_bindCb: Some(bind_trampoline),
            VSP_unbindCb: Some(unbind_trampoline),
        });
        Self {
            entry,
            handle,
            targets: HashMap::new(),
            initialized: false,
            _library: library,
        }
    }

    /// Runs `call` with the callbacks reachable from the engine.
    fn with_callbacks<R>(
        &mut self,
        callbacks: &mut dyn EngineCallbacks,
        call: impl FnOnce(*mut AvcHandle) -> R,
    ) -> (R, Option<EngineError>) {
        let mut context = CallbackContext {
            callbacks,
            error: None,
        };
        self.handle.userdata = &mut context as *mut CallbackContext as *mut c_void;
        let result = call(&mut *self.handle);
        self.handle.userdata = ptr::null_mut();
        (result, context.error)
    }
}

impl AvcEngine for VendorAvcEngine {
    fn init(&mut self, work: &WorkBuffer, format: &VideoFormat) -> Result<(), EngineError> {
        let mut buffer = MMCodecBuffer {
            common_buffer_ptr: work.virt,
            common_buffer_ptr_phy: work.phys.raw() as usize as *mut u8,
            size: work.size as u32,
        };
        let mut video_format = MMDecVideoFormat {
            video_std: ffi::VIDEO_STD_H264,
            frame_width: format.width as i32,
            frame_height: format.height as i32,
            i_extra: 0,
            p_extra: ptr::null_mut(),
        };
        let ret = unsafe { (self.entry.init)(&mut *self.handle, &mut buffer, &mut video_format) };
        check("H264DecInit", ret)?;
        self.initialized = true;
        Ok(())
    }

    fn set_current_rec_picture(&mut self, picture: &RecPicture) {
        self.targets.insert(picture.picture_id, picture.tag);
        unsafe {
            (self.entry.set_cur_rec_pic)(
                &mut *self.handle,
                picture.virt,
                picture.phys.raw() as usize as *mut u8,
                picture.tag.raw() as usize as *mut c_void,
                picture.picture_id.raw() as i32,
            )
        };
    }

    fn decode(
        &mut self,
        input: &DecodeInput<'_>,
        callbacks: &mut dyn EngineCallbacks,
    ) -> Result<Option<DecodedPicture>, EngineError> {
        let mut dec_in = MMDecInput {
            pStream: input.stream_phys.raw() as usize as *mut u8,
            dataLen: input.stream.len() as u32,
            beLastFrm: input.last_frame as i32,
            expected_IVOP: input.expected_idr as i32,
            beDisplayed: input.displayed as i32,
            err_pkt_num: 0,
        };
        let mut dec_out = MMDecOutput::empty();
        let decode = self.entry.decode;
        let (ret, error) = self.with_callbacks(callbacks, |handle| unsafe {
            decode(handle, &mut dec_in, &mut dec_out)
        });
        if let Some(e) = error {
            return Err(e);
        }
        check("H264DecDecode", ret)?;

        if dec_out.frameEffective == 0 {
            return Ok(None);
        }
        let picture_id = PictureId::new(dec_out.mPicId as u32);
        self.targets.remove(&picture_id);
        Ok(Some(DecodedPicture {
            picture_id,
            tag: tag_from_header(dec_out.pBufferHeader),
        }))
    }

    fn get_info(&mut self) -> Result<PictureInfo, EngineError> {
        let mut info = H264SwDecInfo::default();
        let ret = unsafe { (self.entry.get_info)(&mut *self.handle, &mut info) };
        check("H264DecGetInfo", ret)?;
        let crop = (info.croppingFlag != 0).then(|| CropRect {
            left: info.cropParams.cropLeftOffset,
            top: info.cropParams.cropTopOffset,
            width: info.cropParams.cropOutWidth,
            height: info.cropParams.cropOutHeight,
        });
        Ok(PictureInfo {
            width: info.picWidth,
            height: info.picHeight,
            crop,
        })
    }

    fn last_displayed_frame(
        &mut self,
        callbacks: &mut dyn EngineCallbacks,
    ) -> Option<DecodedPicture> {
        let get_last_dsp_frm = self.entry.get_last_dsp_frm;
        let mut yuv: *mut u8 = ptr::null_mut();
        let mut pic_id: i32 = 0;
        let (ret, _) = self.with_callbacks(callbacks, |handle| unsafe {
            get_last_dsp_frm(handle, &mut yuv, &mut pic_id)
        });
        if ret != ffi::MMDEC_OK {
            return None;
        }
        let picture_id = PictureId::new(pic_id as u32);
        match self.targets.remove(&picture_id) {
            Some(tag) => Some(DecodedPicture { picture_id, tag }),
            None => {
                log::error!("Engine displayed unknown picture {}", picture_id);
                None
            }
        }
    }

    fn release_reference_buffers(&mut self, callbacks: &mut dyn EngineCallbacks) {
        let release_ref_buffers = self.entry.release_ref_buffers;
        self.with_callbacks(callbacks, |handle| unsafe { release_ref_buffers(handle) });
        self.targets.clear();
    }

    fn release(&mut self) {
        if !self.initialized {
            return;
        }
        let ret = unsafe { (self.entry.release)(&mut *self.handle) };
        if let Err(e) = check("H264DecRelease", ret) {
            log::warn!("{}", e);
        }
        self.initialized = false;
    }
}

impl Drop for VendorAvcEngine {
    fn drop(&mut self) {
        self.release();
    }
}
