//! jnistub - JNI bridge stub compilation.
//!
//! Every native method of the managed runtime executes behind a small
//! machine-code trampoline that adapts the managed calling convention to
//! the platform's native one: it builds a frame, publishes the stack
//! pointer for the garbage collector, transitions the thread state,
//! installs a local reference frame, marshals arguments (interning
//! references as handles), invokes the native code, normalises the result
//! and unwinds it all again, routing pending exceptions through slow
//! paths. This crate is the generator for those trampolines.
//!
//! # Primary Usage
//!
//! ```ignore
//! use jnistub::{compile_jni_stub, AccessFlags, CompilerOptions, InstructionSet,
//!               MethodDescriptor, Shorty};
//!
//! // `isa` is the back-end factory for the chosen target.
//! let options = CompilerOptions::new(InstructionSet::Arm64);
//! let method = MethodDescriptor {
//!     access_flags: AccessFlags::NATIVE | AccessFlags::STATIC,
//!     shorty: Shorty::new("II"),
//! };
//! let compiled = compile_jni_stub(&options, &isa, &runtime_offsets, &method)?;
//! ```
//!
//! # Architecture
//!
//! - [`compiler`] - The stub code generator (the heart of the crate)
//! - [`conv`] - Calling-convention cursor contracts and the target factory
//! - [`masm`] - The macro-assembler pseudo-op facade back-ends implement
//! - [`marshal`] - Overlap-safe argument move scheduling
//! - [`testing`] - Recording assembler and reference conventions for tests
//!
//! Per-ISA assembler back-ends and production calling-convention
//! descriptors live with the embedding compiler; this crate only consumes
//! their contracts.

pub mod compiler;
pub mod conv;
pub mod error;
pub mod flags;
pub mod marshal;
pub mod masm;
pub mod offsets;
pub mod options;
pub mod registers;
pub mod shorty;
pub mod testing;

pub use compiler::{compile_jni_stub, JniCompiledMethod, MethodDescriptor};
pub use conv::{
    ArgumentLocation, CallingConvention, JniConvention, ManagedRuntimeConvention, TargetIsa,
    OBJECT_REFERENCE_SIZE, SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
};
pub use error::{CompileError, CompileResult, ConventionError, EncodingError};
pub use flags::{AccessFlags, FastPathMode};
pub use masm::{JniMacroAssembler, JniUnaryCondition, MacroLabel};
pub use offsets::{FrameOffset, MemberOffset, Offset, RuntimeOffsets, ThreadOffset};
pub use options::{CompilerOptions, InstructionSet, PointerSize};
pub use registers::{AsmReg, RegBitSet};
pub use shorty::{JavaKind, Shorty};
