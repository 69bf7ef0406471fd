//! Compiler options and target identity.
//!
//! Pointer width is a plain runtime value here. The generator branches on
//! it in a handful of places, which is cheap, and one set of code handles
//! both widths.

/// Width of a native pointer on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSize {
    Bits32,
    Bits64,
}

impl PointerSize {
    /// Size in bytes.
    pub const fn size(self) -> usize {
        match self {
            PointerSize::Bits32 => 4,
            PointerSize::Bits64 => 8,
        }
    }
}

/// Target instruction sets the generated stub descriptor can name.
///
/// The generator itself is ISA-agnostic; this tag travels into the output
/// so the embedding driver knows what it is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSet {
    Arm,
    Arm64,
    X86,
    X86_64,
    Riscv64,
    /// Synthetic target used by the in-tree test back-end.
    Test32,
    /// Synthetic target used by the in-tree test back-end.
    Test64,
}

impl InstructionSet {
    pub const fn pointer_size(self) -> PointerSize {
        match self {
            InstructionSet::Arm | InstructionSet::X86 | InstructionSet::Test32 => {
                PointerSize::Bits32
            }
            InstructionSet::Arm64
            | InstructionSet::X86_64
            | InstructionSet::Riscv64
            | InstructionSet::Test64 => PointerSize::Bits64,
        }
    }
}

/// Knobs the embedding compiler driver passes down for stub generation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Target instruction set; must agree with the supplied back-end.
    pub instruction_set: InstructionSet,
    /// Whether the runtime uses read barriers at all.
    pub emit_read_barriers: bool,
    /// Whether the read barrier is the baker variant (mark-bit fast path).
    pub use_baker_read_barrier: bool,
    /// Emit CFI unwind bytes alongside the code.
    pub generate_debug_info: bool,
    /// Ask the assembler back-end to plant extra self-checks in debug
    /// builds of the runtime.
    pub emit_run_time_checks_in_debug_mode: bool,
}

impl CompilerOptions {
    /// Options with everything optional switched off.
    pub fn new(instruction_set: InstructionSet) -> Self {
        Self {
            instruction_set,
            emit_read_barriers: false,
            use_baker_read_barrier: false,
            generate_debug_info: false,
            emit_run_time_checks_in_debug_mode: false,
        }
    }

    pub const fn pointer_size(&self) -> PointerSize {
        self.instruction_set.pointer_size()
    }
}
