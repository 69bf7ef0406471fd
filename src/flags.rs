//! Method access flags and fast-path classification.
//!
//! The runtime hands us the raw access-flag word of the method being
//! compiled. Only five bits matter for stub generation: `native`, `static`,
//! `synchronized` and the two fast-path annotations.

use std::fmt;

/// Access-flag bit set for a native method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessFlags(u32);

impl AccessFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Method is static.
    pub const STATIC: Self = Self(0x0008);
    /// Method is synchronized (monitor enter/exit around the call).
    pub const SYNCHRONIZED: Self = Self(0x0020);
    /// Method body is native code.
    pub const NATIVE: Self = Self(0x0100);
    /// Method was annotated as fast-native.
    pub const FAST_NATIVE: Self = Self(0x0008_0000);
    /// Method was annotated as critical-native.
    pub const CRITICAL_NATIVE: Self = Self(0x0020_0000);

    /// Build from a raw access-flag word.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw flag word.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of two flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub const fn is_synchronized(self) -> bool {
        self.contains(Self::SYNCHRONIZED)
    }

    pub const fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    pub const fn is_fast_native(self) -> bool {
        self.contains(Self::FAST_NATIVE)
    }

    pub const fn is_critical_native(self) -> bool {
        self.contains(Self::CRITICAL_NATIVE)
    }
}

impl std::ops::BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Which of the three stub shapes a method compiles to.
///
/// `FastNative` skips the runnable-state transition; `CriticalNative`
/// additionally skips the local reference frame and stack-pointer
/// publication. The two annotations are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPathMode {
    Normal,
    FastNative,
    CriticalNative,
}

impl FastPathMode {
    /// Classify a validated flag set.
    pub fn from_flags(flags: AccessFlags) -> Self {
        debug_assert!(!(flags.is_fast_native() && flags.is_critical_native()));
        if flags.is_critical_native() {
            FastPathMode::CriticalNative
        } else if flags.is_fast_native() {
            FastPathMode::FastNative
        } else {
            FastPathMode::Normal
        }
    }
}
