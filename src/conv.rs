//! Calling-convention iterator contracts.
//!
//! The generator walks a method's parameters twice per stub: once in the
//! managed runtime's convention (where the caller left the arguments) and
//! once in the native convention (where the callee expects them). Both
//! sides are behind cursor traits so the generator never names a concrete
//! register assignment; per-ISA descriptors live in the back-ends and are
//! created through [`TargetIsa`].
//!
//! A cursor is position-only state. It is legal to hold several independent
//! cursors over the same signature, and to `reset` one to a new base frame
//! offset at any time.

use crate::error::ConventionError;
use crate::masm::JniMacroAssembler;
use crate::offsets::FrameOffset;
use crate::registers::AsmReg;
use crate::shorty::Shorty;

/// Size in bytes of a managed heap reference as spilled in a frame.
pub const OBJECT_REFERENCE_SIZE: usize = 4;

/// Size in bytes of the saved local-reference cookie and of the segment
/// state it mirrors. Fixed by the runtime, identical on every target.
pub const SAVED_LOCAL_REFERENCE_COOKIE_SIZE: usize = 4;

/// Where one argument lives: a register or a stack slot, with its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentLocation {
    Register(AsmReg, usize),
    Stack(FrameOffset, usize),
}

impl ArgumentLocation {
    pub fn size_of(&self) -> usize {
        match *self {
            ArgumentLocation::Register(_, size) => size,
            ArgumentLocation::Stack(_, size) => size,
        }
    }

    pub fn register(&self) -> Option<AsmReg> {
        match *self {
            ArgumentLocation::Register(reg, _) => Some(reg),
            ArgumentLocation::Stack(..) => None,
        }
    }

    pub fn stack_offset(&self) -> Option<FrameOffset> {
        match *self {
            ArgumentLocation::Register(..) => None,
            ArgumentLocation::Stack(off, _) => Some(off),
        }
    }
}

/// Cursor over the parameters of one calling convention.
pub trait CallingConvention {
    /// Rewind to the first parameter and set the frame displacement all
    /// reported stack offsets are computed against.
    fn reset(&mut self, displacement: FrameOffset);

    fn has_next(&self) -> bool;

    /// Advance to the next parameter.
    fn next(&mut self);

    fn is_current_param_a_reference(&self) -> bool;

    fn is_current_param_long_or_double(&self) -> bool;

    fn is_current_param_in_register(&self) -> bool;

    fn is_current_param_on_stack(&self) -> bool {
        !self.is_current_param_in_register()
    }

    /// Register of the current parameter. Fails with
    /// [`ConventionError::InvalidParamKind`] when the parameter is on the
    /// stack.
    fn current_param_register(&self) -> Result<AsmReg, ConventionError>;

    /// Stack offset of the current parameter, relative to the stack
    /// pointer. For register parameters this is the reserved spill slot in
    /// the caller's frame area; for managed conventions it is always
    /// meaningful.
    fn current_param_stack_offset(&self) -> Result<FrameOffset, ConventionError>;

    /// Size of the current parameter in bytes.
    fn current_param_size(&self) -> usize;
}

/// The managed runtime's view of the method's arguments.
pub trait ManagedRuntimeConvention: CallingConvention {
    /// Register carrying the method pointer on entry.
    fn method_register(&self) -> AsmReg;

    /// Frame slot the method pointer is stored to by frame construction,
    /// relative to the managed frame base.
    fn method_stack_offset(&self) -> FrameOffset;

    /// Managed-ABI return register, if the return type has one.
    fn return_register(&self) -> Option<AsmReg>;

    fn size_of_return_value(&self) -> usize;
}

/// The native ABI's view of the call the stub makes.
///
/// For normal and fast-native stubs the parameter list starts with the two
/// pseudo-parameters `JNIEnv*` and `jclass`/`jobject`; critical-native
/// conventions iterate the declared parameters only.
pub trait JniConvention: CallingConvention {
    /// Size of the managed frame built by the stub (method pointer, return
    /// address, callee saves, spill area).
    fn frame_size(&self) -> usize;

    /// Size of the outgoing-argument area for the native call.
    fn out_frame_size(&self) -> usize;

    /// Callee-save registers the frame must preserve.
    fn callee_save_registers(&self) -> &[AsmReg];

    /// Callee-save registers free for the stub's own use once the frame is
    /// built. Every supported target provides at least three.
    fn callee_save_scratch_registers(&self) -> &[AsmReg];

    /// A caller-save register the argument marshaller may clobber freely.
    /// Never an argument register of this convention.
    fn scratch_register(&self) -> AsmReg;

    fn core_spill_mask(&self) -> u32;

    fn fp_spill_mask(&self) -> u32;

    fn is_return_a_reference(&self) -> bool;

    /// Native-ABI return register, if the return type has one.
    fn return_register(&self) -> Option<AsmReg>;

    fn size_of_return_value(&self) -> usize;

    /// Whether a sub-word return value must be widened by the stub.
    fn requires_small_result_type_extension(&self) -> bool;

    /// Whether the end-transition runtime call clobbers the return
    /// register, forcing a spill around it.
    fn spills_return_value(&self) -> bool;

    /// Frame slot the return value is saved to across the end-transition
    /// call.
    fn return_value_save_location(&self) -> FrameOffset;

    /// Register the critical-native hidden method argument travels in.
    fn hidden_argument_register(&self) -> AsmReg;

    /// Whether a critical-native stub may tail-jump to the native code
    /// instead of calling it.
    fn use_tail_call(&self) -> bool;
}

/// Factory for the per-ISA pieces of one stub compilation.
///
/// Dispatch is by ISA at generator entry; the generator itself holds only
/// trait objects created here.
pub trait TargetIsa {
    /// Managed-side convention for the method.
    fn managed_convention(
        &self,
        is_static: bool,
        is_synchronized: bool,
        shorty: Shorty<'_>,
    ) -> Box<dyn ManagedRuntimeConvention>;

    /// Native-side convention for the method (or for a derived signature
    /// such as the end-transition call).
    fn jni_convention(
        &self,
        is_static: bool,
        is_synchronized: bool,
        is_fast_native: bool,
        is_critical_native: bool,
        shorty: Shorty<'_>,
    ) -> Box<dyn JniConvention>;

    /// A fresh macro-assembler for one stub.
    fn assembler(&self) -> Box<dyn JniMacroAssembler>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_location_accessors() {
        let reg = ArgumentLocation::Register(AsmReg::gp(3), 8);
        let stack = ArgumentLocation::Stack(FrameOffset(16), 4);
        assert_eq!(reg.size_of(), 8);
        assert_eq!(reg.register(), Some(AsmReg::gp(3)));
        assert_eq!(reg.stack_offset(), None);
        assert_eq!(stack.size_of(), 4);
        assert_eq!(stack.register(), None);
        assert_eq!(stack.stack_offset(), Some(FrameOffset(16)));
    }
}
