//! MPEG audio frame header fields the engine needs from outside the frame.

const BITRATE_V1_L1: [u32; 14] = [
    32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const BITRATE_V2_L1: [u32; 14] = [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const BITRATE_V1_L2: [u32; 14] = [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const BITRATE_V1_L3: [u32; 14] = [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATE_V2_L2_L3: [u32; 14] = [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];

const LAYER_III: u32 = 1;
const LAYER_II: u32 = 2;
const LAYER_I: u32 = 3;
const VERSION_1: u32 = 3;
const VERSION_2: u32 = 2;

fn header_word(frame: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = frame.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn fields(header: u32) -> (u32, u32, usize) {
    let version = (header >> 19) & 3;
    let layer = (header >> 17) & 3;
    let bitrate_index = ((header >> 12) & 0xf) as usize;
    (version, layer, bitrate_index)
}

fn has_sync(header: u32) -> bool {
    header & 0xFFE0_0000 == 0xFFE0_0000
}

/// Bitrate of the frame in kbps, or 0 for free-format, reserved or short input.
pub fn frame_bitrate(frame: &[u8]) -> u32 {
    let Some(header) = header_word(frame) else {
        return 0;
    };
    let (version, layer, index) = fields(header);
    if index == 0 || index == 15 {
        return 0;
    }
    let table = match (layer, version) {
        (LAYER_I, VERSION_1) => &BITRATE_V1_L1,
        (LAYER_I, _) => &BITRATE_V2_L1,
        (LAYER_II, VERSION_1) => &BITRATE_V1_L2,
        (LAYER_III, VERSION_1) => &BITRATE_V1_L3,
        (LAYER_II | LAYER_III, _) => &BITRATE_V2_L2_L3,
        _ => return 0,
    };
    table[index - 1]
}

/// `main_data_begin` from the side information of a layer III frame, i.e. how
/// many bytes of this frame's audio data live in the frames before it.
/// Other layers have no bit reservoir and yield 0.
pub fn next_main_data_begin(frame: &[u8]) -> u32 {
    let Some(header) = header_word(frame) else {
        return 0;
    };
    if (header >> 17) & 3 != LAYER_III || header & 0xFFE6_0000 != 0xFFE2_0000 {
        return 0;
    }
    // A CRC word sits between the header and the side information when the
    // protection bit is clear.
    let side_info = if header & 0x0001_0000 == 0 { 6 } else { 4 };
    let mpeg1 = header & 0x0008_0000 != 0;
    let byte = |i: usize| frame.get(i).copied().map(u32::from);
    let value = if mpeg1 {
        byte(side_info)
            .zip(byte(side_info + 1))
            .map(|(high, low)| (high << 1) | (low >> 7))
    } else {
        byte(side_info)
    };
    value.unwrap_or(0)
}

pub fn sample_rate(frame: &[u8]) -> Option<u32> {
    let header = header_word(frame).filter(|h| has_sync(*h))?;
    let (version, _, _) = fields(header);
    let index = ((header >> 10) & 3) as usize;
    let base = SAMPLE_RATES_V1.get(index)?;
    match version {
        VERSION_1 => Some(*base),
        VERSION_2 => Some(base / 2),
        0 => Some(base / 4),
        _ => None,
    }
}

pub fn channels(frame: &[u8]) -> Option<u32> {
    let header = header_word(frame).filter(|h| has_sync(*h))?;
    Some(if (header >> 6) & 3 == 3 { 1 } else { 2 })
}

/// Size in bytes of the whole frame, header included.
pub fn frame_length(frame: &[u8]) -> Option<usize> {
    let header = header_word(frame).filter(|h| has_sync(*h))?;
    let (version, layer, _) = fields(header);
    let bitrate = frame_bitrate(frame) as usize * 1000;
    let rate = sample_rate(frame)? as usize;
    if bitrate == 0 {
        return None;
    }
    let padding = ((header >> 9) & 1) as usize;
    let length = match (layer, version) {
        (LAYER_I, _) => (12 * bitrate / rate + padding) * 4,
        (LAYER_II, _) | (LAYER_III, VERSION_1) => 144 * bitrate / rate + padding,
        (LAYER_III, _) => 72 * bitrate / rate + padding,
        _ => return None,
    };
    Some(length)
}
