//! Cuts elementary streams into the units the adapters expect on their input port.

use std::ops::Range;

use codec_lib::codec_types::BufferFlags;
use codec_lib::mp3::header;

const NAL_SLICE: u8 = 1;
const NAL_IDR_SLICE: u8 = 5;
const NAL_SEI: u8 = 6;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_AUD: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit<'a> {
    pub data: &'a [u8],
    pub flags: BufferFlags,
}

struct Nal {
    range: Range<usize>,
    kind: u8,
    first_slice: bool,
}

/// NAL units of an Annex B stream, each range starting at its start code.
fn nal_units(data: &[u8]) -> Vec<Nal> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            starts.push((start, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nals = Vec::with_capacity(starts.len());
    for (n, &(start, payload)) in starts.iter().enumerate() {
        let end = starts.get(n + 1).map_or(data.len(), |&(next, _)| next);
        let Some(&header) = data.get(payload).filter(|_| payload < end) else {
            continue;
        };
        nals.push(Nal {
            range: start..end,
            kind: header & 0x1f,
            // first_mb_in_slice is ue(v); zero encodes as a single set bit.
            first_slice: data.get(payload + 1).map_or(true, |b| b & 0x80 != 0),
        });
    }
    nals
}

fn flush<'a>(data: &'a [u8], current: &mut Option<Range<usize>>, units: &mut Vec<Unit<'a>>) {
    if let Some(range) = current.take() {
        units.push(Unit {
            data: &data[range],
            flags: BufferFlags::empty(),
        });
    }
}

/// Splits an Annex B H.264 stream into access units. Parameter sets become
/// separate units flagged [`BufferFlags::CODEC_CONFIG`].
pub fn split_avc(data: &[u8]) -> Vec<Unit<'_>> {
    let mut units = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut has_picture = false;

    for nal in nal_units(data) {
        match nal.kind {
            NAL_SPS | NAL_PPS => {
                flush(data, &mut current, &mut units);
                has_picture = false;
                units.push(Unit {
                    data: &data[nal.range],
                    flags: BufferFlags::CODEC_CONFIG,
                });
                continue;
            }
            NAL_SLICE | NAL_IDR_SLICE => {
                if has_picture && nal.first_slice {
                    flush(data, &mut current, &mut units);
                }
                has_picture = true;
            }
            NAL_SEI | NAL_AUD if has_picture => {
                flush(data, &mut current, &mut units);
                has_picture = false;
            }
            _ => {}
        }
        current = Some(match current.take() {
            Some(range) => range.start..nal.range.end,
            None => nal.range,
        });
    }
    flush(data, &mut current, &mut units);
    units
}

/// Length of a leading ID3v2 tag, footer included.
fn id3v2_length(data: &[u8]) -> usize {
    if data.len() < 10 || &data[..3] != b"ID3" {
        return 0;
    }
    let size = data[6..10]
        .iter()
        .fold(0usize, |size, b| (size << 7) | (*b & 0x7f) as usize);
    let footer = if data[5] & 0x10 != 0 { 10 } else { 0 };
    10 + size + footer
}

/// Splits an MPEG audio stream into frames, skipping a leading ID3v2 tag and
/// any bytes that do not start a valid frame header. A truncated final frame
/// is dropped.
pub fn split_mp3(data: &[u8]) -> Vec<Unit<'_>> {
    let mut units = Vec::new();
    let mut pos = id3v2_length(data).min(data.len());
    let mut skipped = 0;
    while pos + 4 <= data.len() {
        match header::frame_length(&data[pos..]) {
            Some(length) if length >= 4 => {
                if pos + length > data.len() {
                    log::warn!("Dropping truncated frame at offset {}", pos);
                    break;
                }
                units.push(Unit {
                    data: &data[pos..pos + length],
                    flags: BufferFlags::empty(),
                });
                pos += length;
            }
            _ => {
                skipped += 1;
                pos += 1;
            }
        }
    }
    if skipped > 0 {
        log::debug!("Skipped {} bytes while syncing to frame headers", skipped);
    }
    units
}
