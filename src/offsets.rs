//! Byte-offset newtypes and the runtime offset table.
//!
//! Four offset flavors keep the generator honest about what a number is
//! relative to: the current stack pointer (`FrameOffset`), an object or
//! structure base (`MemberOffset`), the thread structure (`ThreadOffset`),
//! and a plain displacement for call operands (`Offset`). The runtime's
//! entrypoint and field offsets are consumed opaquely through
//! [`RuntimeOffsets`]; this crate never computes them.

/// Plain byte displacement used as a call/jump operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub u32);

/// Byte offset from the current stack pointer. Non-negative by
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameOffset(pub u32);

impl FrameOffset {
    /// Sentinel: "this argument is not a reference needing a handle".
    pub const INVALID_REFERENCE: FrameOffset = FrameOffset(u32::MAX);

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn is_valid_reference(self) -> bool {
        self.0 != Self::INVALID_REFERENCE.0
    }

    /// Offset shifted by `delta` bytes further from the stack pointer.
    pub const fn add(self, delta: u32) -> FrameOffset {
        FrameOffset(self.0 + delta)
    }
}

/// Byte offset from an object or structure base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberOffset(pub u32);

impl MemberOffset {
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// Byte offset into the per-thread runtime structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadOffset(pub u32);

impl ThreadOffset {
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<FrameOffset> for Offset {
    fn from(off: FrameOffset) -> Offset {
        Offset(off.0)
    }
}

impl From<MemberOffset> for Offset {
    fn from(off: MemberOffset) -> Offset {
        Offset(off.0)
    }
}

impl From<ThreadOffset> for Offset {
    fn from(off: ThreadOffset) -> Offset {
        Offset(off.0)
    }
}

/// Runtime entrypoint and field offsets for one pointer width.
///
/// The table is supplied by the embedding runtime; every value is opaque to
/// the generator except `method_declaring_class`, which must be zero (the
/// stub passes the method pointer where a class pointer is expected).
#[derive(Debug, Clone)]
pub struct RuntimeOffsets {
    pub jni_method_start: ThreadOffset,
    pub jni_method_start_synchronized: ThreadOffset,
    pub jni_method_end: ThreadOffset,
    pub jni_method_end_synchronized: ThreadOffset,
    pub jni_method_end_with_reference: ThreadOffset,
    pub jni_method_end_with_reference_synchronized: ThreadOffset,
    pub jni_decode_reference_result: ThreadOffset,
    pub read_barrier_jni: ThreadOffset,
    pub test_suspend: ThreadOffset,
    /// `Thread` slot the stub publishes its stack pointer to.
    pub top_of_managed_stack: ThreadOffset,
    /// `Thread` slot holding the `JNIEnv*`.
    pub jni_env: ThreadOffset,
    /// Local-reference cookie slot inside the JNI environment.
    pub jni_env_local_ref_cookie: MemberOffset,
    /// Segment-state slot inside the JNI environment.
    pub jni_env_segment_state: MemberOffset,
    /// Native entrypoint field inside the method object.
    pub method_entry_point_from_jni: MemberOffset,
    /// Declaring-class field inside the method object. Must be zero.
    pub method_declaring_class: MemberOffset,
}
