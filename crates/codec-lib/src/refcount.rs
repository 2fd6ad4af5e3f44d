use std::collections::HashMap;

use codec_types::{BufferCtrl, BufferTag};

#[derive(Debug)]
struct OutputSlot {
    ctrl: BufferCtrl,
    display_hold: bool,
}

/// Hold counts of the output buffers, keyed by tag.
///
/// A slot counts one hold per engine reference (bind/unbind callbacks) plus
/// one display hold while the host has the filled buffer. Only slots with no
/// holds may receive a new picture.
#[derive(Debug, Default)]
pub(crate) struct RefTracker {
    slots: HashMap<BufferTag, OutputSlot>,
}

impl RefTracker {
    /// Registers an output buffer the host has just queued and drops the
    /// display hold taken when it was last returned.
    pub fn on_queued(&mut self, tag: BufferTag, ctrl: &BufferCtrl) {
        let slot = self.slots.entry(tag).or_insert_with(|| OutputSlot {
            ctrl: ctrl.clone(),
            display_hold: false,
        });
        slot.ctrl = ctrl.clone();
        if slot.display_hold {
            slot.display_hold = false;
            let remaining = slot.ctrl.decref();
            log::trace!("Display hold on {:?} released, {} left", tag, remaining);
        }
    }

    /// Returns the new count, or `None` for a tag that was never queued.
    pub fn incref(&self, tag: BufferTag) -> Option<u32> {
        self.slots.get(&tag).map(|slot| slot.ctrl.incref())
    }

    /// Returns the new count, or `None` for a tag that was never queued.
    pub fn decref(&self, tag: BufferTag) -> Option<u32> {
        self.slots.get(&tag).map(|slot| slot.ctrl.decref())
    }

    pub fn refcount(&self, tag: BufferTag) -> u32 {
        self.slots
            .get(&tag)
            .map(|slot| slot.ctrl.ref_count())
            .unwrap_or(0)
    }

    /// Marks a buffer as returned to the host, optionally taking a display hold.
    pub fn hand_to_host(&mut self, tag: BufferTag, display_hold: bool) {
        if let Some(slot) = self.slots.get_mut(&tag) {
            if display_hold && !slot.display_hold {
                slot.display_hold = true;
                slot.ctrl.incref();
            }
        }
    }

    /// Forgets all slots once the output port is disabled, dropping their
    /// display holds. The host may queue the same control blocks again.
    pub fn clear(&mut self) {
        for (tag, slot) in self.slots.drain() {
            if slot.display_hold {
                let remaining = slot.ctrl.decref();
                log::trace!("Display hold on {:?} dropped, {} left", tag, remaining);
            }
        }
    }
}
