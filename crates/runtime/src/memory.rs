//! Heap blocks for runtime-managed memory
//!
//! `rt_alloc` returns zero-initialised blocks with an 8-byte size header
//! hidden before the returned pointer so `rt_heap_release` can rebuild
//! the allocation layout. Blocks are distinct from frame allocas, whose
//! lifetime is bounded by the owning frame's arena.

use crate::trap::rt_trap;
use std::alloc::{Layout, alloc_zeroed, dealloc};

const HEADER: usize = 8;

fn layout_for(total: usize) -> Layout {
    Layout::from_size_align(total, HEADER).expect("runtime alloc layout")
}

/// Allocate `size` zeroed bytes. Zero or negative sizes yield null.
#[unsafe(no_mangle)]
pub extern "C" fn rt_alloc(size: i64) -> *mut u8 {
    if size <= 0 {
        return std::ptr::null_mut();
    }
    let total = size as usize + HEADER;
    unsafe {
        let base = alloc_zeroed(layout_for(total));
        if base.is_null() {
            rt_trap("out of memory");
            return std::ptr::null_mut();
        }
        (base as *mut u64).write(total as u64);
        base.add(HEADER)
    }
}

/// Release a block from `rt_alloc`. Null is a no-op.
///
/// # Safety
/// `ptr` must be null or a pointer previously returned by [`rt_alloc`]
/// that has not already been released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rt_heap_release(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let base = ptr.sub(HEADER);
        let total = (base as *mut u64).read() as usize;
        dealloc(base, layout_for(total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_zeroed_and_writable() {
        let ptr = rt_alloc(64);
        assert!(!ptr.is_null());
        unsafe {
            for i in 0..64 {
                assert_eq!(*ptr.add(i), 0);
            }
            *ptr = 0xAB;
            *ptr.add(63) = 0xCD;
            assert_eq!(*ptr, 0xAB);
            rt_heap_release(ptr);
        }
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(rt_alloc(0).is_null());
        assert!(rt_alloc(-5).is_null());
        unsafe { rt_heap_release(std::ptr::null_mut()) };
    }
}
