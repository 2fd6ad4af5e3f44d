use std::path::{Path, PathBuf};

use codec_types::CodecError;
use libloading::Library;

mod avc;
pub mod ffi;
mod mp3;

pub use avc::VendorAvcEngine;
pub use codec_types;
pub use mp3::VendorMp3Engine;

use avc::AvcEntryPoints;
use mp3::Mp3EntryPoints;

#[derive(Debug)]
pub enum EngineLoadError {
    Library(String),
    MissingSymbol {
        library: PathBuf,
        symbol: &'static str,
    },
    Construct {
        symbol: &'static str,
        code: i32,
    },
}

impl std::fmt::Display for EngineLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineLoadError::Library(s) => write!(f, "Failed to load engine library: {}", s),
            EngineLoadError::MissingSymbol { library, symbol } => {
                write!(f, "{} has no symbol {}", library.display(), symbol)
            }
            EngineLoadError::Construct { symbol, code } => {
                write!(f, "{} returned {}", symbol, code)
            }
        }
    }
}

impl std::error::Error for EngineLoadError {}

impl From<EngineLoadError> for CodecError {
    fn from(error: EngineLoadError) -> Self {
        CodecError::FatalConstruction(error.to_string())
    }
}

fn open(path: &Path) -> Result<Library, EngineLoadError> {
    unsafe { Library::new(path) }.map_err(|e| EngineLoadError::Library(e.to_string()))
}

/// # Safety
/// `T` must be the function pointer type the library exports as `name`.
unsafe fn symbol<T: Copy>(
    library: &Library,
    path: &Path,
    name: &'static str,
) -> Result<T, EngineLoadError> {
    library
        .get::<T>(name.as_bytes())
        .map(|symbol| *symbol)
        .map_err(|_| EngineLoadError::MissingSymbol {
            library: path.to_path_buf(),
            symbol: name,
        })
}

/// Opens the vendor H.264 library at `path` and resolves its entry points.
pub fn load_avc_engine(path: &Path) -> Result<VendorAvcEngine, EngineLoadError> {
    let library = open(path)?;
    let entry = unsafe {
        AvcEntryPoints {
            init: symbol(&library, path, "H264DecInit")?,
            get_info: symbol(&library, path, "H264DecGetInfo")?,
            decode: symbol(&library, path, "H264DecDecode")?,
            release: symbol(&library, path, "H264DecRelease")?,
            set_cur_rec_pic: symbol(&library, path, "H264Dec_SetCurRecPic")?,
            get_last_dsp_frm: symbol(&library, path, "H264Dec_GetLastDspFrm")?,
            release_ref_buffers: symbol(&library, path, "H264Dec_ReleaseRefBuffers")?,
        }
    };
    log::info!("Loaded AVC engine from {}", path.display());
    Ok(VendorAvcEngine::new(entry, Some(library)))
}

/// Opens the vendor MP3 library at `path` and constructs a decoder instance.
pub fn load_mp3_engine(path: &Path) -> Result<VendorMp3Engine, EngineLoadError> {
    let library = open(path)?;
    let entry = unsafe {
        Mp3EntryPoints {
            construct: symbol(&library, path, "MP3_ARM_DEC_Construct")?,
            init_decoder: symbol(&library, path, "MP3_ARM_DEC_InitDecoder")?,
            decode_frame: symbol(&library, path, "MP3_ARM_DEC_DecodeFrame")?,
            deconstruct: symbol(&library, path, "MP3_ARM_DEC_Deconstruct")?,
        }
    };
    log::info!("Loaded MP3 engine from {}", path.display());
    VendorMp3Engine::new(entry, Some(library))
}

#[cfg(feature = "static-engine")]
pub fn linked_avc_engine() -> VendorAvcEngine {
    use ffi::linked::*;

    let entry = AvcEntryPoints {
        init: H264DecInit,
        get_info: H264DecGetInfo,
        decode: H264DecDecode,
        release: H264DecRelease,
        set_cur_rec_pic: H264Dec_SetCurRecPic,
        get_last_dsp_frm: H264Dec_GetLastDspFrm,
        release_ref_buffers: H264Dec_ReleaseRefBuffers,
    };
    VendorAvcEngine::new(entry, None)
}

#[cfg(feature = "static-engine")]
pub fn linked_mp3_engine() -> Result<VendorMp3Engine, EngineLoadError> {
    use ffi::linked::*;

    let entry = Mp3EntryPoints {
        construct: MP3_ARM_DEC_Construct,
        init_decoder: MP3_ARM_DEC_InitDecoder,
        decode_frame: MP3_ARM_DEC_DecodeFrame,
        deconstruct: MP3_ARM_DEC_Deconstruct,
    };
    VendorMp3Engine::new(entry, None)
}
