//! Activation frames
//!
//! One frame per call: a register file sized to the callee's highest
//! temp id, an ownership bitmap for string slots, a bump arena backing
//! `alloca`, the per-frame handler stack, and the caller's destination
//! temp for the return value.
//!
//! String discipline: a slot marked owned releases its previous handle
//! when overwritten, and every owned handle is released when the frame
//! is discarded. Copies into other slots retain first.

use crate::slot::Slot;
use bumpalo::Bump;
use std::collections::HashMap;
use viper_runtime::{string_release, string_retain};

pub struct Frame {
    /// Index of the executing function in the module.
    pub func: usize,
    /// Current block index.
    pub block: usize,
    /// Instruction pointer within the block.
    pub ip: usize,
    regs: Vec<Slot>,
    /// Slots currently owning a string-table reference.
    str_owned: Vec<bool>,
    /// Handler stack: block labels, innermost last. Labels (not indices)
    /// so the records survive tail-call frame reuse and re-resolve in
    /// the callee.
    pub eh_stack: Vec<String>,
    /// Alloca arena; chunk addresses stay stable while the frame lives.
    arena: Bump,
    /// Alloca result temp -> arena address, for `addrof`.
    pub allocas: HashMap<u32, u64>,
    /// Caller temp receiving the return value, when any.
    pub ret_dst: Option<u32>,
}

impl Frame {
    pub fn new(func: usize, reg_count: usize, ret_dst: Option<u32>) -> Frame {
        Frame {
            func,
            block: 0,
            ip: 0,
            regs: vec![Slot::default(); reg_count],
            str_owned: vec![false; reg_count],
            eh_stack: Vec::new(),
            arena: Bump::new(),
            allocas: HashMap::new(),
            ret_dst,
        }
    }

    pub fn reg_count(&self) -> usize {
        self.regs.len()
    }

    pub fn get(&self, id: u32) -> Slot {
        self.regs[id as usize]
    }

    /// Write a non-string value.
    pub fn set(&mut self, id: u32, value: Slot) {
        let idx = id as usize;
        if self.str_owned[idx] {
            string_release(self.regs[idx].raw());
            self.str_owned[idx] = false;
        }
        self.regs[idx] = value;
    }

    /// Write a string handle the slot takes ownership of.
    pub fn set_str(&mut self, id: u32, handle: u64) {
        let idx = id as usize;
        if self.str_owned[idx] {
            string_release(self.regs[idx].raw());
        }
        self.regs[idx] = Slot(handle);
        self.str_owned[idx] = true;
    }

    /// Copy a string handle into the slot, retaining it first.
    pub fn set_str_copy(&mut self, id: u32, handle: u64) {
        string_retain(handle);
        self.set_str(id, handle);
    }

    pub fn owns_str(&self, id: u32) -> bool {
        self.str_owned[id as usize]
    }

    /// Allocate `size` zeroed bytes in the frame arena and remember the
    /// address under the producing temp.
    pub fn alloca(&mut self, result: u32, size: usize) -> u64 {
        let storage = self.arena.alloc_slice_fill_copy(size.max(1), 0u8);
        let addr = storage.as_mut_ptr() as u64;
        self.allocas.insert(result, addr);
        addr
    }

    /// Release every owned string and reset for tail-call reuse: the
    /// register file is resized for the callee, the arena and alloca map
    /// are cleared, and the handler stack is deliberately preserved.
    pub fn reuse_for(&mut self, func: usize, reg_count: usize) {
        self.release_strings();
        self.func = func;
        self.block = 0;
        self.ip = 0;
        self.regs.clear();
        self.regs.resize(reg_count, Slot::default());
        self.str_owned.clear();
        self.str_owned.resize(reg_count, false);
        self.allocas.clear();
        self.arena.reset();
    }

    /// Release all owned string handles (frame teardown).
    pub fn release_strings(&mut self) {
        for (idx, owned) in self.str_owned.iter_mut().enumerate() {
            if *owned {
                string_release(self.regs[idx].raw());
                *owned = false;
            }
        }
    }

    /// Move ownership of a slot's string out of the frame (for returning
    /// string values to the caller without an extra retain/release pair).
    pub fn take_str(&mut self, id: u32) -> u64 {
        let idx = id as usize;
        let handle = self.regs[idx].raw();
        if self.str_owned[idx] {
            self.str_owned[idx] = false;
        } else {
            string_retain(handle);
        }
        handle
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.release_strings();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use viper_runtime::{string_intern, string_value};
    use viper_runtime::strings::string_refcount;

    #[test]
    #[serial]
    fn test_string_slot_overwrite_releases() {
        let mut frame = Frame::new(0, 4, None);
        let a = string_intern("first");
        let b = string_intern("second");
        frame.set_str(0, a);
        assert!(frame.owns_str(0));
        frame.set_str(0, b);
        // `a` was released by the overwrite.
        assert_eq!(string_refcount(a), None);
        assert_eq!(string_value(frame.get(0).raw()), "second");
        frame.release_strings();
    }

    #[test]
    #[serial]
    fn test_copy_retains() {
        let mut frame = Frame::new(0, 4, None);
        let h = string_intern("shared");
        frame.set_str(0, h);
        frame.set_str_copy(1, h);
        assert_eq!(string_refcount(h), Some(2));
        frame.release_strings();
        assert_eq!(string_refcount(h), None);
    }

    #[test]
    #[serial]
    fn test_drop_releases_owned() {
        let h = string_intern("leaky?");
        {
            let mut frame = Frame::new(0, 2, None);
            frame.set_str(1, h);
            assert_eq!(string_refcount(h), Some(1));
        }
        assert_eq!(string_refcount(h), None);
    }

    #[test]
    fn test_alloca_addresses_are_stable_and_writable() {
        let mut frame = Frame::new(0, 2, None);
        let addr = frame.alloca(0, 8);
        assert_ne!(addr, 0);
        unsafe {
            (addr as *mut i64).write_unaligned(42);
            assert_eq!((addr as *const i64).read_unaligned(), 42);
        }
        assert_eq!(frame.allocas.get(&0), Some(&addr));
        // A second alloca gets distinct storage.
        let addr2 = frame.alloca(1, 8);
        assert_ne!(addr, addr2);
    }

    #[test]
    #[serial]
    fn test_reuse_clears_state_but_keeps_eh() {
        let mut frame = Frame::new(0, 2, Some(7));
        frame.eh_stack.push("handler".to_string());
        let h = string_intern("temp");
        frame.set_str(0, h);
        frame.alloca(1, 16);
        frame.reuse_for(3, 5);
        assert_eq!(frame.func, 3);
        assert_eq!(frame.reg_count(), 5);
        assert!(frame.allocas.is_empty());
        assert_eq!(frame.eh_stack, vec!["handler".to_string()]);
        assert_eq!(frame.ret_dst, Some(7));
        assert_eq!(string_refcount(h), None);
    }
}
