//! The JNI macro-assembler facade.
//!
//! The stub generator speaks a fixed vocabulary of pseudo-ops and never
//! names a concrete instruction. Back-ends implement [`JniMacroAssembler`]
//! per ISA; the generator holds one as a trait object. Every pseudo-op is
//! infallible at emission time — branch-range and fixup problems only
//! surface from `finalize_instructions` as an [`EncodingError`].
//!
//! Labels are owned by the assembler: [`create_label`] mints an opaque id,
//! [`bind`] attaches it to the current position exactly once, and any
//! number of branch pseudo-ops may reference it before or after binding.
//!
//! [`create_label`]: JniMacroAssembler::create_label
//! [`bind`]: JniMacroAssembler::bind

use crate::conv::ArgumentLocation;
use crate::error::EncodingError;
use crate::offsets::{FrameOffset, MemberOffset, Offset, ThreadOffset};
use crate::registers::AsmReg;

/// Opaque branch target minted by [`JniMacroAssembler::create_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroLabel(u32);

impl MacroLabel {
    /// Construct from a raw id. Back-end use only; the generator never
    /// builds labels itself.
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Condition for the unary test pseudo-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JniUnaryCondition {
    Zero,
    NotZero,
}

/// Pseudo-op vocabulary the stub generator emits through.
///
/// Sizes are byte counts from {1, 2, 4, 8}; pointer-width operations pass
/// the target's pointer size explicitly.
pub trait JniMacroAssembler {
    /// Enable or disable CFI byte collection.
    fn set_cfi_enabled(&mut self, enabled: bool);

    /// Ask the back-end to plant extra self-checks in debug runtime
    /// builds.
    fn set_emit_debug_checks(&mut self, enabled: bool);

    // -- Frame lifecycle --

    /// Build the stub frame: push return address and callee saves, store
    /// the method register (when given) at frame offset zero, and adjust
    /// the stack pointer so the frame spans `frame_size` bytes.
    fn build_frame(
        &mut self,
        frame_size: usize,
        method_register: Option<AsmReg>,
        callee_saves: &[AsmReg],
    );

    /// Tear the frame down and return. `may_suspend` tells the back-end
    /// whether the method can have been suspended while the frame was
    /// live, which constrains how callee saves are restored.
    fn remove_frame(&mut self, frame_size: usize, callee_saves: &[AsmReg], may_suspend: bool);

    /// Grow the frame by `adjust` bytes, tracking CFA.
    fn increase_frame_size(&mut self, adjust: usize);

    /// Shrink the frame by `adjust` bytes, tracking CFA.
    fn decrease_frame_size(&mut self, adjust: usize);

    // -- Moves, loads, stores --

    /// Register to register move of `size` bytes.
    fn move_reg(&mut self, dest: AsmReg, src: AsmReg, size: usize);

    /// Load `size` bytes from a frame slot.
    fn load(&mut self, dest: AsmReg, src: FrameOffset, size: usize);

    /// Store `size` bytes to a frame slot.
    fn store(&mut self, dest: FrameOffset, src: AsmReg, size: usize);

    /// Load `size` bytes from `[base + offset]`.
    fn load_from(&mut self, dest: AsmReg, base: AsmReg, offset: MemberOffset, size: usize);

    /// Store `size` bytes to `[base + offset]`.
    fn store_to(&mut self, base: AsmReg, offset: MemberOffset, src: AsmReg, size: usize);

    /// Frame slot to frame slot copy of `size` bytes.
    fn copy(&mut self, dest: FrameOffset, src: FrameOffset, size: usize);

    // -- Thread state --

    /// Load a pointer-sized value from the thread structure.
    fn load_raw_ptr_from_thread(&mut self, dest: AsmReg, offset: ThreadOffset);

    /// Publish the current stack pointer to a thread slot, for the
    /// garbage collector to walk the managed stack.
    fn store_stack_pointer_to_thread(&mut self, offset: ThreadOffset);

    /// Materialise the current thread pointer into an argument location.
    fn get_current_thread(&mut self, dest: ArgumentLocation);

    // -- Calls and jumps --

    /// Indirect call through `[base + offset]`.
    fn call(&mut self, base: AsmReg, offset: Offset);

    /// Call through a thread-structure entrypoint slot.
    fn call_from_thread(&mut self, offset: ThreadOffset);

    /// Tail jump through `[base + offset]`.
    fn jump(&mut self, base: AsmReg, offset: Offset);

    /// Unconditional jump to a label.
    fn jump_to(&mut self, target: MacroLabel);

    // -- Reference handles --

    /// Turn the spilled raw reference at `spilled_reference` into a
    /// handle in `dest`: null when the slot holds null (and null is
    /// allowed), otherwise the address of the slot. `in_reg` supplies the
    /// reference value when it is still live in a register, sparing the
    /// reload for the null test.
    fn create_jobject_in_register(
        &mut self,
        dest: AsmReg,
        spilled_reference: FrameOffset,
        in_reg: Option<AsmReg>,
        null_allowed: bool,
    );

    /// As above, but write the handle to a stack slot.
    fn create_jobject_on_stack(
        &mut self,
        dest: FrameOffset,
        spilled_reference: FrameOffset,
        null_allowed: bool,
    );

    // -- Runtime checks --

    /// Branch to `on_exception` if the thread has a pending exception.
    fn exception_poll(&mut self, on_exception: MacroLabel);

    /// Branch to `on_suspend` if the thread has a suspend request.
    fn suspend_check(&mut self, on_suspend: MacroLabel);

    /// Hand control to the runtime's exception delivery. Does not return.
    fn deliver_pending_exception(&mut self);

    /// Branch on the thread's concurrent-marking flag.
    fn test_gc_marking(&mut self, target: MacroLabel, condition: JniUnaryCondition);

    /// Branch on the lock-word mark bit of the object in `reference`.
    fn test_mark_bit(&mut self, reference: AsmReg, target: MacroLabel, condition: JniUnaryCondition);

    // -- Result width --

    /// Sign-extend the low `size` bytes of `reg` to word width.
    fn sign_extend(&mut self, reg: AsmReg, size: usize);

    /// Zero-extend the low `size` bytes of `reg` to word width.
    fn zero_extend(&mut self, reg: AsmReg, size: usize);

    // -- Labels --

    fn create_label(&mut self) -> MacroLabel;

    /// Attach `label` to the current position. Each label must be bound
    /// exactly once before finalisation.
    fn bind(&mut self, label: MacroLabel);

    // -- CFI --

    /// Record a CFA delta that happens out of line (slow paths re-enter
    /// with a stack depth the main path has already unwound).
    fn adjust_cfa_offset(&mut self, delta: i32);

    /// The CFA offset the assembler believes is current.
    fn current_cfa_offset(&self) -> usize;

    // -- Finalisation --

    /// Stop accepting pseudo-ops and run fixups.
    fn finalize_code(&mut self);

    /// Final code size in bytes. Valid after `finalize_code`.
    fn code_size(&self) -> usize;

    /// Write the final machine code into `buffer` (of exactly
    /// `code_size` bytes), resolving all label references.
    fn finalize_instructions(&mut self, buffer: &mut [u8]) -> Result<(), EncodingError>;

    /// Collected CFI bytes. Empty when CFI is disabled.
    fn cfi_data(&self) -> &[u8];
}
