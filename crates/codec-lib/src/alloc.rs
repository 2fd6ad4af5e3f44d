//! Device-visible memory for the engines.

use std::ptr::NonNull;

use codec_types::{CodecError, PhysAddr, WorkBuffer};

/// Handle carried by every region [`HeapAllocator`] hands out.
const HEAP_COOKIE: u64 = 0x4845_4150_434f_4445;

/// A region returned by a [`PhysicalAllocator`]. The region stays valid until
/// it is handed back to the allocator that produced it.
#[derive(Debug)]
pub struct PhysicalBuffer {
    virt: NonNull<u8>,
    phys: PhysAddr,
    size: usize,
    /// Allocator-private handle (an ion fd, a heap cookie).
    handle: u64,
}

impl PhysicalBuffer {
    /// # Safety
    /// `virt` must point to `size` writable bytes that stay valid until the
    /// buffer is freed. `handle` tells the owning allocator its regions apart
    /// and must not collide with the handles another allocator checks for.
    pub unsafe fn from_raw_parts(
        virt: NonNull<u8>,
        phys: PhysAddr,
        size: usize,
        handle: u64,
    ) -> Self {
        Self {
            virt,
            phys,
            size,
            handle,
        }
    }

    pub fn phys_addr(&self) -> PhysAddr {
        self.phys
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.virt.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.virt.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.virt.as_ptr(), self.size) }
    }

    pub fn work_buffer(&self) -> WorkBuffer {
        WorkBuffer {
            virt: self.virt.as_ptr(),
            phys: self.phys,
            size: self.size,
        }
    }
}

pub trait PhysicalAllocator {
    fn alloc(&mut self, size: usize) -> Result<PhysicalBuffer, CodecError>;
    fn free(&mut self, buffer: PhysicalBuffer);
}

/// Plain heap memory, for engines that address virtual memory directly.
/// The physical address reported is the virtual one.
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl PhysicalAllocator for HeapAllocator {
    fn alloc(&mut self, size: usize) -> Result<PhysicalBuffer, CodecError> {
        if size == 0 {
            return Err(CodecError::InvalidParameter(
                "Cannot allocate an empty region".to_string(),
            ));
        }
        let region = vec![0u8; size].into_boxed_slice();
        let raw = Box::into_raw(region) as *mut u8;
        let virt = NonNull::new(raw)
            .ok_or_else(|| CodecError::FatalConstruction("Heap allocation failed".to_string()))?;
        Ok(PhysicalBuffer {
            virt,
            phys: PhysAddr::from_ptr(raw),
            size,
            handle: HEAP_COOKIE,
        })
    }

    /// Regions from other allocators are leaked rather than released here.
    fn free(&mut self, buffer: PhysicalBuffer) {
        let identity = PhysAddr::from_ptr(buffer.virt.as_ptr());
        if buffer.handle != HEAP_COOKIE || buffer.phys != identity {
            log::error!(
                "Refusing to free a {} byte region with handle {:#x} not allocated on the heap",
                buffer.size,
                buffer.handle
            );
            return;
        }
        let slice = std::ptr::slice_from_raw_parts_mut(buffer.virt.as_ptr(), buffer.size);
        drop(unsafe { Box::from_raw(slice) });
    }
}
