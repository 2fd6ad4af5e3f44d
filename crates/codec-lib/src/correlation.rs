use std::collections::HashMap;

use codec_types::{BufferFlags, CodecError, PictureId};

/// Timing metadata of the input that produced a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PictureMeta {
    pub timestamp: i64,
    pub flags: BufferFlags,
}

/// Maps picture ids handed to the engine back to their input metadata, so
/// reordered output still carries the right timestamp.
#[derive(Debug, Default)]
pub(crate) struct PictureTable {
    entries: HashMap<PictureId, PictureMeta>,
}

impl PictureTable {
    pub fn put(
        &mut self,
        id: PictureId,
        timestamp: i64,
        flags: BufferFlags,
    ) -> Result<(), CodecError> {
        if self.entries.contains_key(&id) {
            return Err(CodecError::ProtocolViolation(format!(
                "Picture {} is already in flight",
                id
            )));
        }
        self.entries.insert(id, PictureMeta { timestamp, flags });
        Ok(())
    }

    pub fn take(&mut self, id: PictureId) -> Result<PictureMeta, CodecError> {
        self.entries.remove(&id).ok_or_else(|| {
            CodecError::ProtocolViolation(format!("No input recorded for picture {}", id))
        })
    }

    /// Empties the table, returning the ids that were still pending.
    pub fn clear(&mut self) -> Vec<PictureId> {
        let mut ids: Vec<PictureId> = self.entries.drain().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
