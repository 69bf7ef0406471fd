//! In-tree test back-end.
//!
//! Real assembler back-ends and calling-convention descriptors live
//! outside this crate, so testing the stub generator needs a stand-in: a
//! macro-assembler that records the pseudo-op stream instead of encoding
//! instructions, and reference calling conventions for a small synthetic
//! target in 32-bit and 64-bit flavors. Tests assert on the recorded
//! stream: which ops were emitted, in which order, with which operands.
//!
//! The synthetic target:
//! - `gp0` carries the method pointer in the managed convention and is the
//!   native return register; `gp1` is the only managed argument register.
//! - Native GP argument registers are `gp1..gp4` (64-bit) or `gp1..gp2`
//!   (32-bit); FP argument registers are `fp0..fp1`. Longs and doubles go
//!   on the stack on the 32-bit target, and floating-point results come
//!   back in `gp0` there (soft-float), against `fp0` on the managed side.
//! - Callee-save scratch registers are `gp10..gp12`; the marshaller's
//!   scratch is `gp9`; the critical-native hidden argument is `gp5`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::conv::{
    ArgumentLocation, CallingConvention, JniConvention, ManagedRuntimeConvention, TargetIsa,
};
use crate::error::{ConventionError, EncodingError};
use crate::masm::{JniMacroAssembler, JniUnaryCondition, MacroLabel};
use crate::offsets::{FrameOffset, MemberOffset, Offset, RuntimeOffsets, ThreadOffset};
use crate::options::PointerSize;
use crate::registers::{AsmReg, RegBitSet};
use crate::shorty::{JavaKind, Shorty};

/// One recorded pseudo-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    BuildFrame {
        frame_size: usize,
        method_register: Option<AsmReg>,
        callee_saves: Vec<AsmReg>,
    },
    RemoveFrame {
        frame_size: usize,
        may_suspend: bool,
    },
    IncreaseFrameSize(usize),
    DecreaseFrameSize(usize),
    MoveReg {
        dest: AsmReg,
        src: AsmReg,
        size: usize,
    },
    Load {
        dest: AsmReg,
        src: FrameOffset,
        size: usize,
    },
    Store {
        dest: FrameOffset,
        src: AsmReg,
        size: usize,
    },
    LoadFrom {
        dest: AsmReg,
        base: AsmReg,
        offset: MemberOffset,
        size: usize,
    },
    StoreTo {
        base: AsmReg,
        offset: MemberOffset,
        src: AsmReg,
        size: usize,
    },
    Copy {
        dest: FrameOffset,
        src: FrameOffset,
        size: usize,
    },
    LoadRawPtrFromThread {
        dest: AsmReg,
        offset: ThreadOffset,
    },
    StoreStackPointerToThread(ThreadOffset),
    GetCurrentThread(ArgumentLocation),
    Call {
        base: AsmReg,
        offset: Offset,
    },
    CallFromThread(ThreadOffset),
    Jump {
        base: AsmReg,
        offset: Offset,
    },
    JumpTo(MacroLabel),
    CreateJObjectInRegister {
        dest: AsmReg,
        spilled_reference: FrameOffset,
        in_reg: Option<AsmReg>,
        null_allowed: bool,
    },
    CreateJObjectOnStack {
        dest: FrameOffset,
        spilled_reference: FrameOffset,
        null_allowed: bool,
    },
    ExceptionPoll(MacroLabel),
    SuspendCheck(MacroLabel),
    DeliverPendingException,
    TestGcMarking {
        target: MacroLabel,
        condition: JniUnaryCondition,
    },
    TestMarkBit {
        reference: AsmReg,
        target: MacroLabel,
        condition: JniUnaryCondition,
    },
    SignExtend {
        reg: AsmReg,
        size: usize,
    },
    ZeroExtend {
        reg: AsmReg,
        size: usize,
    },
    Bind(MacroLabel),
}

impl Insn {
    /// Label this op branches to, if any.
    fn branch_target(&self) -> Option<MacroLabel> {
        match *self {
            Insn::JumpTo(l)
            | Insn::ExceptionPoll(l)
            | Insn::SuspendCheck(l)
            | Insn::TestGcMarking { target: l, .. }
            | Insn::TestMarkBit { target: l, .. } => Some(l),
            _ => None,
        }
    }
}

/// Macro-assembler that records pseudo-ops and tracks the CFA offset.
///
/// Frame ops keep a running CFA the way a real back-end's CFI writer
/// would; `remove_frame` asserts the books balance. Labels must each be
/// bound exactly once before `finalize_instructions`, which otherwise
/// fails with an [`EncodingError`] like a real fixup pass would.
pub struct RecordingAssembler {
    insns: Rc<RefCell<Vec<Insn>>>,
    labels_created: u32,
    labels_bound: Vec<bool>,
    cfa_offset: i64,
    cfi: Vec<u8>,
    cfi_enabled: bool,
    debug_checks: bool,
    finalized: bool,
}

/// Bytes of recorded "machine code" per pseudo-op.
const BYTES_PER_INSN: usize = 4;

impl RecordingAssembler {
    pub fn new() -> Self {
        Self::with_trace(Rc::new(RefCell::new(Vec::new())))
    }

    /// Record into a shared buffer, letting the creator inspect the
    /// stream after the assembler is consumed.
    pub fn with_trace(trace: Rc<RefCell<Vec<Insn>>>) -> Self {
        Self {
            insns: trace,
            labels_created: 0,
            labels_bound: Vec::new(),
            cfa_offset: 0,
            cfi: Vec::new(),
            cfi_enabled: false,
            debug_checks: false,
            finalized: false,
        }
    }

    pub fn into_insns(self) -> Vec<Insn> {
        self.insns.borrow().clone()
    }

    /// Whether the generator asked for extra debug-build self-checks.
    pub fn emits_debug_checks(&self) -> bool {
        self.debug_checks
    }

    fn push(&mut self, insn: Insn) {
        debug_assert!(!self.finalized, "emission after finalize_code");
        self.insns.borrow_mut().push(insn);
    }

    fn set_cfa(&mut self, new_offset: i64) {
        assert!(new_offset >= 0, "negative CFA offset");
        self.cfa_offset = new_offset;
        if self.cfi_enabled {
            self.cfi.extend_from_slice(&(new_offset as u32).to_le_bytes());
        }
    }
}

impl Default for RecordingAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl JniMacroAssembler for RecordingAssembler {
    fn set_cfi_enabled(&mut self, enabled: bool) {
        self.cfi_enabled = enabled;
    }

    fn set_emit_debug_checks(&mut self, enabled: bool) {
        self.debug_checks = enabled;
    }

    fn build_frame(
        &mut self,
        frame_size: usize,
        method_register: Option<AsmReg>,
        callee_saves: &[AsmReg],
    ) {
        self.push(Insn::BuildFrame {
            frame_size,
            method_register,
            callee_saves: callee_saves.to_vec(),
        });
        self.set_cfa(frame_size as i64);
    }

    fn remove_frame(&mut self, frame_size: usize, _callee_saves: &[AsmReg], may_suspend: bool) {
        assert_eq!(
            self.cfa_offset, frame_size as i64,
            "frame imbalance at remove_frame"
        );
        self.push(Insn::RemoveFrame {
            frame_size,
            may_suspend,
        });
        // CFI state is restored for the slow paths that follow.
        self.set_cfa(frame_size as i64);
    }

    fn increase_frame_size(&mut self, adjust: usize) {
        if adjust == 0 {
            return;
        }
        self.push(Insn::IncreaseFrameSize(adjust));
        self.set_cfa(self.cfa_offset + adjust as i64);
    }

    fn decrease_frame_size(&mut self, adjust: usize) {
        if adjust == 0 {
            return;
        }
        self.push(Insn::DecreaseFrameSize(adjust));
        self.set_cfa(self.cfa_offset - adjust as i64);
    }

    fn move_reg(&mut self, dest: AsmReg, src: AsmReg, size: usize) {
        self.push(Insn::MoveReg { dest, src, size });
    }

    fn load(&mut self, dest: AsmReg, src: FrameOffset, size: usize) {
        self.push(Insn::Load { dest, src, size });
    }

    fn store(&mut self, dest: FrameOffset, src: AsmReg, size: usize) {
        self.push(Insn::Store { dest, src, size });
    }

    fn load_from(&mut self, dest: AsmReg, base: AsmReg, offset: MemberOffset, size: usize) {
        self.push(Insn::LoadFrom {
            dest,
            base,
            offset,
            size,
        });
    }

    fn store_to(&mut self, base: AsmReg, offset: MemberOffset, src: AsmReg, size: usize) {
        self.push(Insn::StoreTo {
            base,
            offset,
            src,
            size,
        });
    }

    fn copy(&mut self, dest: FrameOffset, src: FrameOffset, size: usize) {
        self.push(Insn::Copy { dest, src, size });
    }

    fn load_raw_ptr_from_thread(&mut self, dest: AsmReg, offset: ThreadOffset) {
        self.push(Insn::LoadRawPtrFromThread { dest, offset });
    }

    fn store_stack_pointer_to_thread(&mut self, offset: ThreadOffset) {
        self.push(Insn::StoreStackPointerToThread(offset));
    }

    fn get_current_thread(&mut self, dest: ArgumentLocation) {
        self.push(Insn::GetCurrentThread(dest));
    }

    fn call(&mut self, base: AsmReg, offset: Offset) {
        self.push(Insn::Call { base, offset });
    }

    fn call_from_thread(&mut self, offset: ThreadOffset) {
        self.push(Insn::CallFromThread(offset));
    }

    fn jump(&mut self, base: AsmReg, offset: Offset) {
        self.push(Insn::Jump { base, offset });
    }

    fn jump_to(&mut self, target: MacroLabel) {
        self.push(Insn::JumpTo(target));
    }

    fn create_jobject_in_register(
        &mut self,
        dest: AsmReg,
        spilled_reference: FrameOffset,
        in_reg: Option<AsmReg>,
        null_allowed: bool,
    ) {
        self.push(Insn::CreateJObjectInRegister {
            dest,
            spilled_reference,
            in_reg,
            null_allowed,
        });
    }

    fn create_jobject_on_stack(
        &mut self,
        dest: FrameOffset,
        spilled_reference: FrameOffset,
        null_allowed: bool,
    ) {
        self.push(Insn::CreateJObjectOnStack {
            dest,
            spilled_reference,
            null_allowed,
        });
    }

    fn exception_poll(&mut self, on_exception: MacroLabel) {
        self.push(Insn::ExceptionPoll(on_exception));
    }

    fn suspend_check(&mut self, on_suspend: MacroLabel) {
        self.push(Insn::SuspendCheck(on_suspend));
    }

    fn deliver_pending_exception(&mut self) {
        self.push(Insn::DeliverPendingException);
    }

    fn test_gc_marking(&mut self, target: MacroLabel, condition: JniUnaryCondition) {
        self.push(Insn::TestGcMarking { target, condition });
    }

    fn test_mark_bit(
        &mut self,
        reference: AsmReg,
        target: MacroLabel,
        condition: JniUnaryCondition,
    ) {
        self.push(Insn::TestMarkBit {
            reference,
            target,
            condition,
        });
    }

    fn sign_extend(&mut self, reg: AsmReg, size: usize) {
        self.push(Insn::SignExtend { reg, size });
    }

    fn zero_extend(&mut self, reg: AsmReg, size: usize) {
        self.push(Insn::ZeroExtend { reg, size });
    }

    fn create_label(&mut self) -> MacroLabel {
        let label = MacroLabel::from_raw(self.labels_created);
        self.labels_created += 1;
        self.labels_bound.push(false);
        label
    }

    fn bind(&mut self, label: MacroLabel) {
        let idx = label.raw() as usize;
        assert!(idx < self.labels_bound.len(), "binding a foreign label");
        assert!(!self.labels_bound[idx], "label bound twice");
        self.labels_bound[idx] = true;
        self.push(Insn::Bind(label));
    }

    fn adjust_cfa_offset(&mut self, delta: i32) {
        self.set_cfa(self.cfa_offset + delta as i64);
    }

    fn current_cfa_offset(&self) -> usize {
        self.cfa_offset as usize
    }

    fn finalize_code(&mut self) {
        debug_assert!(!self.finalized);
        self.finalized = true;
    }

    fn code_size(&self) -> usize {
        self.insns.borrow().len() * BYTES_PER_INSN
    }

    fn finalize_instructions(&mut self, buffer: &mut [u8]) -> Result<(), EncodingError> {
        if buffer.len() != self.code_size() {
            return Err(EncodingError::new(format!(
                "buffer size {} does not match code size {}",
                buffer.len(),
                self.code_size()
            )));
        }
        for (idx, bound) in self.labels_bound.iter().enumerate() {
            if !bound {
                return Err(EncodingError::new(format!("label {idx} never bound")));
            }
        }
        for insn in self.insns.borrow().iter() {
            if let Some(target) = insn.branch_target() {
                if target.raw() as usize >= self.labels_bound.len() {
                    return Err(EncodingError::new(format!(
                        "branch to unknown label {}",
                        target.raw()
                    )));
                }
            }
        }
        for (i, chunk) in buffer.chunks_mut(BYTES_PER_INSN).enumerate() {
            chunk.copy_from_slice(&[(i & 0xff) as u8, (i >> 8) as u8, 0xc0, 0xde]);
        }
        Ok(())
    }

    fn cfi_data(&self) -> &[u8] {
        &self.cfi
    }
}

/// Parameter classification shared by the reference conventions.
#[derive(Debug, Clone, Copy)]
struct ParamInfo {
    is_reference: bool,
    is_long_or_double: bool,
    size: usize,
    reg: Option<AsmReg>,
    /// Stack offset before the cursor displacement is applied.
    stack_rel: Option<u32>,
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Managed-side reference convention: method in `gp0`, first non-wide
/// parameter in `gp1`, everything else in 4-byte slots above the frame.
pub struct TestManagedConvention {
    params: Vec<ParamInfo>,
    pos: usize,
    displacement: u32,
    return_kind: JavaKind,
}

impl TestManagedConvention {
    fn new(is_static: bool, shorty: Shorty<'_>, pointer_size: PointerSize) -> Self {
        let ptr = pointer_size.size();
        let mut kinds: Vec<JavaKind> = Vec::new();
        if !is_static {
            kinds.push(JavaKind::Reference);
        }
        kinds.extend(shorty.param_kinds());

        let mut params = Vec::with_capacity(kinds.len());
        let mut slot = 0u32;
        for (index, kind) in kinds.iter().copied().enumerate() {
            let wide = kind.is_long_or_double();
            let in_register = index == 0 && !wide;
            params.push(ParamInfo {
                is_reference: kind.is_reference(),
                is_long_or_double: wide,
                size: if wide { 8 } else { 4 },
                reg: if in_register { Some(AsmReg::gp(1)) } else { None },
                // Reserved vreg slot above the method slot and return
                // address; register parameters keep theirs for spills.
                stack_rel: Some(ptr as u32 + 4 * slot),
            });
            slot += if wide { 2 } else { 1 };
        }
        Self {
            params,
            pos: 0,
            displacement: 0,
            return_kind: shorty.return_kind(),
        }
    }

    fn current(&self) -> &ParamInfo {
        &self.params[self.pos]
    }
}

impl CallingConvention for TestManagedConvention {
    fn reset(&mut self, displacement: FrameOffset) {
        self.pos = 0;
        self.displacement = displacement.value();
    }

    fn has_next(&self) -> bool {
        self.pos < self.params.len()
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn is_current_param_a_reference(&self) -> bool {
        self.current().is_reference
    }

    fn is_current_param_long_or_double(&self) -> bool {
        self.current().is_long_or_double
    }

    fn is_current_param_in_register(&self) -> bool {
        self.current().reg.is_some()
    }

    fn current_param_register(&self) -> Result<AsmReg, ConventionError> {
        self.current().reg.ok_or(ConventionError::InvalidParamKind)
    }

    fn current_param_stack_offset(&self) -> Result<FrameOffset, ConventionError> {
        match self.current().stack_rel {
            Some(rel) => Ok(FrameOffset(self.displacement + rel)),
            None => Err(ConventionError::InvalidParamKind),
        }
    }

    fn current_param_size(&self) -> usize {
        self.current().size
    }
}

impl ManagedRuntimeConvention for TestManagedConvention {
    fn method_register(&self) -> AsmReg {
        AsmReg::gp(0)
    }

    fn method_stack_offset(&self) -> FrameOffset {
        FrameOffset(0)
    }

    fn return_register(&self) -> Option<AsmReg> {
        match self.return_kind {
            JavaKind::Void => None,
            JavaKind::Float | JavaKind::Double => Some(AsmReg::fp(0)),
            _ => Some(AsmReg::gp(0)),
        }
    }

    fn size_of_return_value(&self) -> usize {
        match self.return_kind {
            JavaKind::Void => 0,
            JavaKind::Long | JavaKind::Double => 8,
            _ => 4,
        }
    }
}

/// Native-side reference convention for the synthetic target.
pub struct TestJniConvention {
    params: Vec<ParamInfo>,
    pos: usize,
    is_critical_native: bool,
    is_fast_native: bool,
    pointer_size: PointerSize,
    return_kind: JavaKind,
    managed_slots: u32,
    out_size: usize,
    callee_saves: Vec<AsmReg>,
    tail_call: bool,
}

impl TestJniConvention {
    const GP_ARGS_64: [AsmReg; 4] = [AsmReg::gp(1), AsmReg::gp(2), AsmReg::gp(3), AsmReg::gp(4)];
    const GP_ARGS_32: [AsmReg; 2] = [AsmReg::gp(1), AsmReg::gp(2)];
    const FP_ARGS: [AsmReg; 2] = [AsmReg::fp(0), AsmReg::fp(1)];

    fn new(
        is_static: bool,
        _is_synchronized: bool,
        is_fast_native: bool,
        is_critical_native: bool,
        shorty: Shorty<'_>,
        pointer_size: PointerSize,
        tail_call: bool,
    ) -> Self {
        let ptr = pointer_size.size();
        let is_64bit = pointer_size == PointerSize::Bits64;
        let gp_pool: &[AsmReg] = if is_64bit {
            &Self::GP_ARGS_64
        } else {
            &Self::GP_ARGS_32
        };

        // Pseudo-parameters first: JNIEnv*, then jclass or this. Critical
        // native passes the declared parameters only.
        let mut kinds: Vec<Option<JavaKind>> = Vec::new();
        if !is_critical_native {
            kinds.push(None); // JNIEnv*
            kinds.push(Some(JavaKind::Reference)); // jclass / this
        }
        kinds.extend(shorty.param_kinds().map(Some));

        let mut params = Vec::with_capacity(kinds.len());
        let mut gp_used = 0usize;
        let mut fp_used = 0usize;
        let mut stack_bytes = 0usize;
        for kind in kinds.iter().copied() {
            let (size, is_reference, wide, is_fp) = match kind {
                None => (ptr, false, false, false),
                Some(k) => (
                    match k {
                        JavaKind::Reference => ptr,
                        JavaKind::Long | JavaKind::Double => 8,
                        _ => 4,
                    },
                    k.is_reference(),
                    k.is_long_or_double(),
                    matches!(k, JavaKind::Float | JavaKind::Double),
                ),
            };
            // Wide values go on the stack on the 32-bit target.
            let stack_only = !is_64bit && wide;
            let reg = if is_fp && !stack_only {
                if fp_used < Self::FP_ARGS.len() {
                    fp_used += 1;
                    Some(Self::FP_ARGS[fp_used - 1])
                } else {
                    None
                }
            } else if !is_fp && !stack_only && gp_used < gp_pool.len() {
                gp_used += 1;
                Some(gp_pool[gp_used - 1])
            } else {
                None
            };
            let stack_rel = if reg.is_none() {
                let slot = if is_64bit { 8 } else { round_up(size, 4) };
                let rel = stack_bytes as u32;
                stack_bytes += slot;
                Some(rel)
            } else {
                None
            };
            params.push(ParamInfo {
                is_reference,
                is_long_or_double: wide,
                size,
                reg,
                stack_rel,
            });
        }

        let managed_slots: u32 = {
            let this_slot = u32::from(!is_static);
            this_slot
                + shorty
                    .param_kinds()
                    .map(|k| if k.is_long_or_double() { 2 } else { 1 })
                    .sum::<u32>()
        };
        let callee_saves = if is_critical_native {
            Vec::new()
        } else {
            vec![AsmReg::gp(10), AsmReg::gp(11), AsmReg::gp(12)]
        };

        Self {
            params,
            pos: 0,
            is_critical_native,
            is_fast_native,
            pointer_size,
            return_kind: shorty.return_kind(),
            managed_slots,
            out_size: round_up(stack_bytes, 16),
            callee_saves,
            tail_call,
        }
    }

    fn current(&self) -> &ParamInfo {
        &self.params[self.pos]
    }
}

impl CallingConvention for TestJniConvention {
    fn reset(&mut self, _displacement: FrameOffset) {
        // Native out-args start at the stack pointer; the displacement
        // does not shift them.
        self.pos = 0;
    }

    fn has_next(&self) -> bool {
        self.pos < self.params.len()
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn is_current_param_a_reference(&self) -> bool {
        self.current().is_reference
    }

    fn is_current_param_long_or_double(&self) -> bool {
        self.current().is_long_or_double
    }

    fn is_current_param_in_register(&self) -> bool {
        self.current().reg.is_some()
    }

    fn current_param_register(&self) -> Result<AsmReg, ConventionError> {
        self.current().reg.ok_or(ConventionError::InvalidParamKind)
    }

    fn current_param_stack_offset(&self) -> Result<FrameOffset, ConventionError> {
        match self.current().stack_rel {
            Some(rel) => Ok(FrameOffset(rel)),
            None => Err(ConventionError::InvalidParamKind),
        }
    }

    fn current_param_size(&self) -> usize {
        self.current().size
    }
}

impl JniConvention for TestJniConvention {
    fn frame_size(&self) -> usize {
        let ptr = self.pointer_size.size();
        if self.is_critical_native {
            return self.out_size;
        }
        // Method pointer, return address, callee saves, vreg spill area
        // and return-value spill spare.
        let raw = 2 * ptr + 3 * ptr + 4 * self.managed_slots.max(2) as usize + 2 * ptr;
        round_up(raw, 16)
    }

    fn out_frame_size(&self) -> usize {
        self.out_size
    }

    fn callee_save_registers(&self) -> &[AsmReg] {
        &self.callee_saves
    }

    fn callee_save_scratch_registers(&self) -> &[AsmReg] {
        &self.callee_saves
    }

    fn scratch_register(&self) -> AsmReg {
        AsmReg::gp(9)
    }

    fn core_spill_mask(&self) -> u32 {
        let mut set = RegBitSet::new();
        for &reg in &self.callee_saves {
            set.set(reg);
        }
        set.bank_mask(0) as u32
    }

    fn fp_spill_mask(&self) -> u32 {
        0
    }

    fn is_return_a_reference(&self) -> bool {
        self.return_kind.is_reference()
    }

    fn return_register(&self) -> Option<AsmReg> {
        match self.return_kind {
            JavaKind::Void => None,
            JavaKind::Float | JavaKind::Double => {
                if self.pointer_size == PointerSize::Bits64 {
                    Some(AsmReg::fp(0))
                } else {
                    // Soft-float result.
                    Some(AsmReg::gp(0))
                }
            }
            _ => Some(AsmReg::gp(0)),
        }
    }

    fn size_of_return_value(&self) -> usize {
        match self.return_kind {
            JavaKind::Void => 0,
            JavaKind::Reference => self.pointer_size.size(),
            JavaKind::Long | JavaKind::Double => 8,
            _ => 4,
        }
    }

    fn requires_small_result_type_extension(&self) -> bool {
        self.return_kind.is_small()
    }

    fn spills_return_value(&self) -> bool {
        !self.is_fast_native
            && !self.is_critical_native
            && !self.return_kind.is_reference()
            && self.size_of_return_value() != 0
    }

    fn return_value_save_location(&self) -> FrameOffset {
        FrameOffset((self.out_size + self.pointer_size.size()) as u32)
    }

    fn hidden_argument_register(&self) -> AsmReg {
        AsmReg::gp(5)
    }

    fn use_tail_call(&self) -> bool {
        self.is_critical_native && self.tail_call && !self.requires_small_result_type_extension()
    }
}

/// Reference [`TargetIsa`] built from the pieces above. Keeps a handle to
/// the recorded instruction stream so tests can inspect it after
/// compilation.
pub struct TestIsa {
    pointer_size: PointerSize,
    tail_call: bool,
    trace: Rc<RefCell<Vec<Insn>>>,
}

impl TestIsa {
    pub fn new(pointer_size: PointerSize) -> Self {
        Self {
            pointer_size,
            tail_call: false,
            trace: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Variant whose critical-native convention requests tail calls.
    pub fn with_tail_call(pointer_size: PointerSize) -> Self {
        Self {
            tail_call: true,
            ..Self::new(pointer_size)
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn recorded(&self) -> Vec<Insn> {
        self.trace.borrow().clone()
    }
}

impl TargetIsa for TestIsa {
    fn managed_convention(
        &self,
        is_static: bool,
        _is_synchronized: bool,
        shorty: Shorty<'_>,
    ) -> Box<dyn ManagedRuntimeConvention> {
        Box::new(TestManagedConvention::new(
            is_static,
            shorty,
            self.pointer_size,
        ))
    }

    fn jni_convention(
        &self,
        is_static: bool,
        is_synchronized: bool,
        is_fast_native: bool,
        is_critical_native: bool,
        shorty: Shorty<'_>,
    ) -> Box<dyn JniConvention> {
        Box::new(TestJniConvention::new(
            is_static,
            is_synchronized,
            is_fast_native,
            is_critical_native,
            shorty,
            self.pointer_size,
            self.tail_call,
        ))
    }

    fn assembler(&self) -> Box<dyn JniMacroAssembler> {
        Box::new(RecordingAssembler::with_trace(Rc::clone(&self.trace)))
    }
}

/// A runtime offset table with distinct, recognisable values.
pub fn test_runtime_offsets() -> RuntimeOffsets {
    RuntimeOffsets {
        jni_method_start: ThreadOffset(0x10),
        jni_method_start_synchronized: ThreadOffset(0x14),
        jni_method_end: ThreadOffset(0x18),
        jni_method_end_synchronized: ThreadOffset(0x1c),
        jni_method_end_with_reference: ThreadOffset(0x20),
        jni_method_end_with_reference_synchronized: ThreadOffset(0x24),
        jni_decode_reference_result: ThreadOffset(0x28),
        read_barrier_jni: ThreadOffset(0x2c),
        test_suspend: ThreadOffset(0x30),
        top_of_managed_stack: ThreadOffset(0x34),
        jni_env: ThreadOffset(0x38),
        jni_env_local_ref_cookie: MemberOffset(0x08),
        jni_env_segment_state: MemberOffset(0x0c),
        method_entry_point_from_jni: MemberOffset(0x48),
        method_declaring_class: MemberOffset(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_label_fails_finalisation() {
        let mut masm = RecordingAssembler::new();
        let label = masm.create_label();
        masm.exception_poll(label);
        masm.finalize_code();
        let mut buffer = vec![0u8; masm.code_size()];
        let err = masm.finalize_instructions(&mut buffer).unwrap_err();
        assert!(err.reason.contains("never bound"));
    }

    #[test]
    #[should_panic(expected = "label bound twice")]
    fn test_double_bind_panics() {
        let mut masm = RecordingAssembler::new();
        let label = masm.create_label();
        masm.bind(label);
        masm.bind(label);
    }

    #[test]
    #[should_panic(expected = "frame imbalance")]
    fn test_unbalanced_frame_panics() {
        let mut masm = RecordingAssembler::new();
        masm.build_frame(96, None, &[]);
        masm.increase_frame_size(16);
        masm.remove_frame(96, &[], true);
    }

    #[test]
    fn test_cfa_tracking() {
        let mut masm = RecordingAssembler::new();
        masm.build_frame(96, None, &[]);
        assert_eq!(masm.current_cfa_offset(), 96);
        masm.increase_frame_size(32);
        assert_eq!(masm.current_cfa_offset(), 128);
        masm.decrease_frame_size(32);
        masm.remove_frame(96, &[], true);
        assert_eq!(masm.current_cfa_offset(), 96);
    }

    #[test]
    fn test_jni_convention_pseudo_params() {
        let shorty = Shorty::new("VI");
        let mut conv = TestJniConvention::new(
            true,
            false,
            false,
            false,
            shorty,
            PointerSize::Bits64,
            false,
        );
        conv.reset(FrameOffset(0));
        // JNIEnv* in gp1.
        assert!(conv.is_current_param_in_register());
        assert_eq!(conv.current_param_register().unwrap(), AsmReg::gp(1));
        assert!(!conv.is_current_param_a_reference());
        conv.next();
        // jclass in gp2.
        assert!(conv.is_current_param_a_reference());
        assert_eq!(conv.current_param_register().unwrap(), AsmReg::gp(2));
        conv.next();
        // The int parameter in gp3.
        assert_eq!(conv.current_param_register().unwrap(), AsmReg::gp(3));
        assert_eq!(conv.current_param_size(), 4);
        conv.next();
        assert!(!conv.has_next());
    }

    #[test]
    fn test_jni_convention_stack_overflow_args() {
        // Five GP-class parameters against a four-register pool.
        let shorty = Shorty::new("VIIIII");
        let mut conv = TestJniConvention::new(
            true,
            false,
            false,
            true,
            shorty,
            PointerSize::Bits64,
            false,
        );
        conv.reset(FrameOffset(0));
        for _ in 0..4 {
            assert!(conv.is_current_param_in_register());
            conv.next();
        }
        assert!(conv.is_current_param_on_stack());
        assert_eq!(conv.current_param_stack_offset().unwrap(), FrameOffset(0));
        assert_eq!(
            conv.current_param_register().unwrap_err(),
            ConventionError::InvalidParamKind
        );
        conv.next();
        assert!(!conv.has_next());
        assert_eq!(conv.out_frame_size(), 16);
    }

    #[test]
    fn test_managed_convention_slots() {
        // Instance method (J, I): `this` in gp1, long in two slots, int
        // after it.
        let shorty = Shorty::new("VJI");
        let mut conv = TestManagedConvention::new(false, shorty, PointerSize::Bits64);
        conv.reset(FrameOffset(160));
        assert!(conv.is_current_param_in_register());
        assert!(conv.is_current_param_a_reference());
        assert_eq!(
            conv.current_param_stack_offset().unwrap(),
            FrameOffset(160 + 8)
        );
        conv.next();
        assert!(conv.is_current_param_long_or_double());
        assert_eq!(
            conv.current_param_stack_offset().unwrap(),
            FrameOffset(160 + 8 + 4)
        );
        assert_eq!(conv.current_param_size(), 8);
        conv.next();
        assert_eq!(
            conv.current_param_stack_offset().unwrap(),
            FrameOffset(160 + 8 + 12)
        );
        conv.next();
        assert!(!conv.has_next());
    }

    #[test]
    fn test_critical_convention_has_no_saves() {
        let conv = TestJniConvention::new(
            true,
            false,
            false,
            true,
            Shorty::new("II"),
            PointerSize::Bits32,
            false,
        );
        assert!(conv.callee_save_registers().is_empty());
        assert_eq!(conv.core_spill_mask(), 0);
        assert_eq!(conv.out_frame_size(), 0);
    }
}
