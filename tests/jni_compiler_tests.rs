//! End-to-end tests for the JNI stub generator against the in-tree
//! recording back-end.
//!
//! Each test compiles one method shape and asserts on the recorded
//! pseudo-op stream: which operations were emitted, with which operands,
//! and in which order.

use jnistub::testing::{test_runtime_offsets, Insn, TestIsa};
use jnistub::{
    compile_jni_stub, AccessFlags, AsmReg, CompileError, CompilerOptions, FrameOffset,
    InstructionSet, JniCompiledMethod, MethodDescriptor, Offset, PointerSize, Shorty, ThreadOffset,
};

fn instruction_set_for(pointer_size: PointerSize) -> InstructionSet {
    match pointer_size {
        PointerSize::Bits32 => InstructionSet::Test32,
        PointerSize::Bits64 => InstructionSet::Test64,
    }
}

fn compile_with(
    isa: &TestIsa,
    pointer_size: PointerSize,
    flags: AccessFlags,
    shorty: &str,
    configure: impl FnOnce(&mut CompilerOptions),
) -> (JniCompiledMethod, Vec<Insn>) {
    let mut options = CompilerOptions::new(instruction_set_for(pointer_size));
    configure(&mut options);
    let method = MethodDescriptor {
        access_flags: flags,
        shorty: Shorty::new(shorty),
    };
    let compiled = compile_jni_stub(&options, isa, &test_runtime_offsets(), &method)
        .expect("compilation should succeed");
    (compiled, isa.recorded())
}

fn compile(
    pointer_size: PointerSize,
    flags: AccessFlags,
    shorty: &str,
) -> (JniCompiledMethod, Vec<Insn>) {
    let isa = TestIsa::new(pointer_size);
    compile_with(&isa, pointer_size, flags, shorty, |_| {})
}

/// Thread offsets of every runtime call in emission order, whether made
/// through a register holding `Thread*` or directly through the thread.
fn runtime_calls(insns: &[Insn]) -> Vec<u32> {
    let entry_point_field = test_runtime_offsets().method_entry_point_from_jni.value();
    insns
        .iter()
        .filter_map(|insn| match *insn {
            Insn::Call {
                offset: Offset(off),
                ..
            } if off != entry_point_field => Some(off),
            Insn::CallFromThread(ThreadOffset(off)) => Some(off),
            _ => None,
        })
        .collect()
}

fn position(insns: &[Insn], pred: impl Fn(&Insn) -> bool) -> usize {
    insns
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("expected op not found in {insns:#?}"))
}

fn count(insns: &[Insn], pred: impl Fn(&Insn) -> bool) -> usize {
    insns.iter().filter(|insn| pred(insn)).count()
}

const NATIVE: AccessFlags = AccessFlags::NATIVE;

// S1: critical static int(int) on the 32-bit target.
#[test]
fn test_critical_static_int_int() {
    let flags = NATIVE | AccessFlags::STATIC | AccessFlags::CRITICAL_NATIVE;
    let (compiled, insns) = compile(PointerSize::Bits32, flags, "II");

    // No stack-pointer publication, no transition calls, no local
    // reference frame ops.
    assert_eq!(
        count(&insns, |i| matches!(i, Insn::StoreStackPointerToThread(_))),
        0
    );
    assert!(runtime_calls(&insns).is_empty());
    assert_eq!(count(&insns, |i| matches!(i, Insn::LoadFrom { .. })), 0);
    assert_eq!(count(&insns, |i| matches!(i, Insn::StoreTo { .. })), 0);

    // Hidden argument register receives the method pointer, and the stub
    // calls through the method's native entrypoint field.
    assert_eq!(
        insns,
        vec![
            Insn::BuildFrame {
                frame_size: 0,
                method_register: None,
                callee_saves: vec![],
            },
            Insn::MoveReg {
                dest: AsmReg::gp(5),
                src: AsmReg::gp(0),
                size: 4,
            },
            Insn::Call {
                base: AsmReg::gp(5),
                offset: Offset(0x48),
            },
            Insn::RemoveFrame {
                frame_size: 0,
                may_suspend: false,
            },
        ]
    );
    assert!(!compiled.code.is_empty());
    assert_eq!(compiled.core_spill_mask, 0);
}

#[test]
fn test_critical_tail_call_skips_frame_removal() {
    let flags = NATIVE | AccessFlags::STATIC | AccessFlags::CRITICAL_NATIVE;
    let isa = TestIsa::with_tail_call(PointerSize::Bits32);
    let (_, insns) = compile_with(&isa, PointerSize::Bits32, flags, "II", |_| {});
    assert_eq!(
        insns,
        vec![
            Insn::BuildFrame {
                frame_size: 0,
                method_register: None,
                callee_saves: vec![],
            },
            Insn::MoveReg {
                dest: AsmReg::gp(5),
                src: AsmReg::gp(0),
                size: 4,
            },
            Insn::Jump {
                base: AsmReg::gp(5),
                offset: Offset(0x48),
            },
        ]
    );
}

// S2: normal static Object() on the 64-bit target.
#[test]
fn test_normal_static_reference_return() {
    let flags = NATIVE | AccessFlags::STATIC;
    let (compiled, insns) = compile(PointerSize::Bits64, flags, "L");
    let offsets = test_runtime_offsets();

    // Start transition, then the native call, then the end-with-reference
    // transition.
    assert_eq!(
        runtime_calls(&insns),
        vec![
            offsets.jni_method_start.value(),
            offsets.jni_method_end_with_reference.value(),
        ]
    );

    // The native call goes through the method register loaded into the
    // jclass argument register.
    let native_call = position(
        &insns,
        |i| matches!(i, Insn::Call { offset: Offset(0x48), .. }),
    );
    assert_eq!(
        insns[native_call],
        Insn::Call {
            base: AsmReg::gp(2),
            offset: Offset(0x48),
        }
    );
    // The method pointer was loaded from its frame slot into that
    // register, and the JNIEnv* argument was filled from its callee-save
    // home.
    assert!(insns[..native_call].contains(&Insn::Load {
        dest: AsmReg::gp(2),
        src: FrameOffset(0),
        size: 8,
    }));
    assert!(insns[..native_call].contains(&Insn::MoveReg {
        dest: AsmReg::gp(1),
        src: AsmReg::gp(10),
        size: 8,
    }));

    // Local reference frame pushed before the native call and popped
    // after the end transition.
    let cookie = offsets.jni_env_local_ref_cookie;
    let push = position(
        &insns,
        |i| matches!(i, Insn::LoadFrom { dest, offset, .. } if *dest == AsmReg::gp(11) && *offset == cookie),
    );
    let pop = position(
        &insns,
        |i| matches!(i, Insn::StoreTo { src, offset, .. } if *src == AsmReg::gp(11) && *offset == cookie),
    );
    assert!(push < native_call && native_call < pop);

    // The native result is passed to the end transition.
    let end_call = position(&insns, |i| {
        matches!(i, Insn::Call { offset: Offset(off), .. } if *off == offsets.jni_method_end_with_reference.value())
    });
    assert!(insns[native_call..end_call].contains(&Insn::MoveReg {
        dest: AsmReg::gp(1),
        src: AsmReg::gp(0),
        size: 8,
    }));

    // Exception poll before the frame removal.
    let poll = position(&insns, |i| matches!(i, Insn::ExceptionPoll(_)));
    let remove = position(&insns, |i| matches!(i, Insn::RemoveFrame { .. }));
    assert!(pop < poll && poll < remove);
    assert_eq!(
        insns[remove],
        Insn::RemoveFrame {
            frame_size: compiled.frame_size,
            may_suspend: true,
        }
    );
    assert_eq!(compiled.core_spill_mask, (1 << 10) | (1 << 11) | (1 << 12));
}

// S3: normal synchronized instance void(int, Object).
#[test]
fn test_synchronized_instance_method() {
    let flags = NATIVE | AccessFlags::SYNCHRONIZED;
    let (_, insns) = compile(PointerSize::Bits64, flags, "VIL");
    let offsets = test_runtime_offsets();

    assert_eq!(
        runtime_calls(&insns),
        vec![
            offsets.jni_method_start_synchronized.value(),
            offsets.jni_method_end_synchronized.value(),
        ]
    );

    // `this` is spilled raw to its frame slot before the start call, with
    // no handle conversion.
    let start_call = position(&insns, |i| {
        matches!(i, Insn::Call { offset: Offset(off), .. } if *off == offsets.jni_method_start_synchronized.value())
    });
    let this_slot = FrameOffset(80 + 8);
    let raw_spill = position(
        &insns,
        |i| matches!(i, Insn::Store { dest, src, size: 4 } if *dest == this_slot && *src == AsmReg::gp(1)),
    );
    assert!(raw_spill < start_call);

    // Both transition calls receive a handle to `this` with the null
    // check elided.
    assert_eq!(
        count(&insns, |i| matches!(
            i,
            Insn::CreateJObjectInRegister {
                dest,
                spilled_reference,
                null_allowed: false,
                ..
            } if *dest == AsmReg::gp(1) && *spilled_reference == this_slot
        )),
        2
    );

    // The monitor-enter poll right after the start call, and a slow path
    // ending in exception delivery.
    assert_eq!(
        insns[start_call + 1..]
            .iter()
            .position(|i| matches!(i, Insn::ExceptionPoll(_))),
        Some(0)
    );
    assert_eq!(
        count(&insns, |i| matches!(i, Insn::DeliverPendingException)),
        1
    );

    // The reference parameter (not `this`) is converted with the null
    // check kept.
    assert_eq!(
        count(&insns, |i| matches!(
            i,
            Insn::CreateJObjectInRegister {
                dest,
                null_allowed: true,
                ..
            } if *dest == AsmReg::gp(4)
        )),
        1
    );
}

// S4: fast-native instance Object(Object).
#[test]
fn test_fast_native_reference_return() {
    let flags = NATIVE | AccessFlags::FAST_NATIVE;
    let (_, insns) = compile(PointerSize::Bits64, flags, "LL");
    let offsets = test_runtime_offsets();

    // No start transition; the only runtime calls are the reference
    // decode and, on the slow path, the suspend entrypoint.
    assert_eq!(
        runtime_calls(&insns),
        vec![
            offsets.jni_decode_reference_result.value(),
            offsets.test_suspend.value(),
        ]
    );

    // Local reference frame is still pushed.
    assert!(insns.iter().any(
        |i| matches!(i, Insn::LoadFrom { offset, .. } if *offset == offsets.jni_env_local_ref_cookie)
    ));

    // Exception poll, then suspend check, both before the decode call.
    let poll = position(&insns, |i| matches!(i, Insn::ExceptionPoll(_)));
    let suspend = position(&insns, |i| matches!(i, Insn::SuspendCheck(_)));
    let decode = position(&insns, |i| {
        matches!(i, Insn::Call { offset: Offset(off), .. } if *off == offsets.jni_decode_reference_result.value())
    });
    assert!(poll < suspend && suspend < decode);

    // The suspend slow path republishes the stack pointer for the decode
    // call it resumes into.
    let suspend_call = position(&insns, |i| {
        matches!(i, Insn::CallFromThread(off) if *off == offsets.test_suspend)
    });
    assert_eq!(
        insns[suspend_call + 1],
        Insn::StoreStackPointerToThread(offsets.top_of_managed_stack)
    );

    // The early-poll exception path pops the local reference frame before
    // delivering: two cookie restores in total (main path + slow path).
    assert_eq!(
        count(&insns, |i| matches!(
            i,
            Insn::StoreTo { src, offset, .. }
                if *src == AsmReg::gp(11) && *offset == offsets.jni_env_local_ref_cookie
        )),
        2
    );
}

// S5: normal static boolean(byte) zero-extends, never sign-extends.
#[test]
fn test_small_result_zero_extension() {
    let flags = NATIVE | AccessFlags::STATIC;
    let (_, insns) = compile(PointerSize::Bits64, flags, "ZB");

    let native_call = position(
        &insns,
        |i| matches!(i, Insn::Call { offset: Offset(0x48), .. }),
    );
    let extend = position(&insns, |i| matches!(i, Insn::ZeroExtend { .. }));
    assert!(native_call < extend);
    assert_eq!(
        insns[extend],
        Insn::ZeroExtend {
            reg: AsmReg::gp(0),
            size: 1,
        }
    );
    assert_eq!(count(&insns, |i| matches!(i, Insn::SignExtend { .. })), 0);

    // The return value is spilled around the end transition and reloaded.
    let end_call = position(&insns, |i| {
        matches!(i, Insn::Call { offset: Offset(off), .. } if *off == test_runtime_offsets().jni_method_end.value())
    });
    let spill = position(
        &insns,
        |i| matches!(i, Insn::Store { src, size: 4, .. } if *src == AsmReg::gp(0)),
    );
    let reload = position(
        &insns,
        |i| matches!(i, Insn::Load { dest, size: 4, .. } if *dest == AsmReg::gp(0)),
    );
    assert!(extend < spill && spill < end_call && end_call < reload);
}

#[test]
fn test_byte_result_sign_extension() {
    let flags = NATIVE | AccessFlags::STATIC;
    let (_, insns) = compile(PointerSize::Bits64, flags, "BI");
    assert_eq!(
        count(&insns, |i| matches!(
            i,
            Insn::SignExtend {
                reg,
                size: 1
            } if *reg == AsmReg::gp(0)
        )),
        1
    );
    assert_eq!(count(&insns, |i| matches!(i, Insn::ZeroExtend { .. })), 0);
}

// S6: static method under read barriers.
#[test]
fn test_static_read_barrier_baker() {
    let flags = NATIVE | AccessFlags::STATIC;
    let isa = TestIsa::new(PointerSize::Bits64);
    let (_, insns) = compile_with(&isa, PointerSize::Bits64, flags, "V", |options| {
        options.emit_read_barriers = true;
        options.use_baker_read_barrier = true;
    });
    let offsets = test_runtime_offsets();

    // The marking test comes right after frame construction, before the
    // stack-pointer publication.
    let build = position(&insns, |i| matches!(i, Insn::BuildFrame { .. }));
    let marking_test = position(&insns, |i| matches!(i, Insn::TestGcMarking { .. }));
    let publish = position(&insns, |i| matches!(i, Insn::StoreStackPointerToThread(_)));
    assert!(build < marking_test && marking_test < publish);

    // The slow path tests the mark bit of the declaring class before
    // falling back to the runtime call, then jumps back to the main path.
    let mark_bit = position(&insns, |i| matches!(i, Insn::TestMarkBit { .. }));
    let barrier_call = position(&insns, |i| {
        matches!(i, Insn::CallFromThread(off) if *off == offsets.read_barrier_jni)
    });
    assert!(mark_bit < barrier_call);
    assert!(insns[mark_bit - 1]
        == Insn::LoadFrom {
            dest: AsmReg::gp(10),
            base: AsmReg::gp(0),
            offset: offsets.method_declaring_class,
            size: 4,
        });
    assert!(matches!(insns[barrier_call + 1], Insn::JumpTo(_)));
}

#[test]
fn test_non_baker_read_barrier_always_calls() {
    let flags = NATIVE | AccessFlags::STATIC;
    let isa = TestIsa::new(PointerSize::Bits64);
    let (_, insns) = compile_with(&isa, PointerSize::Bits64, flags, "V", |options| {
        options.emit_read_barriers = true;
    });
    assert_eq!(count(&insns, |i| matches!(i, Insn::TestMarkBit { .. })), 0);
    assert_eq!(
        count(&insns, |i| matches!(
            i,
            Insn::CallFromThread(off) if *off == test_runtime_offsets().read_barrier_jni
        )),
        1
    );
}

#[test]
fn test_instance_method_skips_class_read_barrier() {
    let flags = NATIVE;
    let isa = TestIsa::new(PointerSize::Bits64);
    let (_, insns) = compile_with(&isa, PointerSize::Bits64, flags, "V", |options| {
        options.emit_read_barriers = true;
        options.use_baker_read_barrier = true;
    });
    assert_eq!(count(&insns, |i| matches!(i, Insn::TestGcMarking { .. })), 0);
}

// Stack-passed native arguments are filled during the register spill pass
// and skipped by the pre-call marshalling.
#[test]
fn test_stack_arguments_are_prefilled() {
    let flags = NATIVE | AccessFlags::STATIC;
    let (_, insns) = compile(PointerSize::Bits64, flags, "VIIIII");

    // Frame grows for the out-args area (three 8-byte slots, aligned).
    assert_eq!(
        count(&insns, |i| matches!(i, Insn::IncreaseFrameSize(32))),
        1
    );
    assert_eq!(
        count(&insns, |i| matches!(i, Insn::DecreaseFrameSize(32))),
        1
    );

    // managed frame size 80, so args live above 112 after the frame grew;
    // the fifth, sixth and seventh GP-class values land in out slots 0,
    // 8 and 16.
    for (out_slot, arg_slot) in [(0u32, 128u32), (8, 132), (16, 136)] {
        assert_eq!(
            count(&insns, |i| matches!(
                i,
                Insn::Copy { dest, src, size: 4 }
                    if *dest == FrameOffset(out_slot) && *src == FrameOffset(arg_slot)
            )),
            1,
            "missing copy into out slot {out_slot}"
        );
    }

    // Register-destined arguments are loaded after the start call.
    let start_call = position(&insns, |i| {
        matches!(i, Insn::Call { offset: Offset(off), .. } if *off == test_runtime_offsets().jni_method_start.value())
    });
    let load_gp3 = position(
        &insns,
        |i| matches!(i, Insn::Load { dest, .. } if *dest == AsmReg::gp(3)),
    );
    assert!(start_call < load_gp3);
}

// Soft-float mismatch: the 32-bit target returns floats in gp0 while the
// managed side expects fp0; fast-native moves between them.
#[test]
fn test_fast_native_soft_float_return_move() {
    let flags = NATIVE | AccessFlags::STATIC | AccessFlags::FAST_NATIVE;
    let (_, insns) = compile(PointerSize::Bits32, flags, "F");
    assert_eq!(
        count(&insns, |i| matches!(
            i,
            Insn::MoveReg {
                dest,
                src,
                size: 4
            } if *dest == AsmReg::fp(0) && *src == AsmReg::gp(0)
        )),
        1
    );

    // Fast-native without reference return polls and suspend-checks on
    // the way out, before removing the frame.
    let poll = position(&insns, |i| matches!(i, Insn::ExceptionPoll(_)));
    let suspend = position(&insns, |i| matches!(i, Insn::SuspendCheck(_)));
    let remove = position(&insns, |i| matches!(i, Insn::RemoveFrame { .. }));
    assert!(poll < suspend && suspend < remove);
}

// Invariant 3: the cookie push and pop are symmetric.
#[test]
fn test_cookie_round_trip() {
    let flags = NATIVE | AccessFlags::STATIC;
    let (_, insns) = compile(PointerSize::Bits64, flags, "V");
    let offsets = test_runtime_offsets();
    let cookie = offsets.jni_env_local_ref_cookie;
    let segment = offsets.jni_env_segment_state;
    let env = AsmReg::gp(10);
    let saved = AsmReg::gp(11);
    let temp = AsmReg::gp(12);

    let cookie_ops: Vec<&Insn> = insns
        .iter()
        .filter(|i| {
            matches!(i, Insn::LoadFrom { offset, .. } | Insn::StoreTo { offset, .. }
                if *offset == cookie || *offset == segment)
        })
        .collect();
    assert_eq!(
        cookie_ops,
        vec![
            // Push: save the old cookie, install the segment state.
            &Insn::LoadFrom {
                dest: saved,
                base: env,
                offset: cookie,
                size: 4
            },
            &Insn::LoadFrom {
                dest: temp,
                base: env,
                offset: segment,
                size: 4
            },
            &Insn::StoreTo {
                base: env,
                offset: cookie,
                src: temp,
                size: 4
            },
            // Pop: read the cookie before overwriting it, wind the
            // segment state back, restore the saved cookie.
            &Insn::LoadFrom {
                dest: temp,
                base: env,
                offset: cookie,
                size: 4
            },
            &Insn::StoreTo {
                base: env,
                offset: segment,
                src: temp,
                size: 4
            },
            &Insn::StoreTo {
                base: env,
                offset: cookie,
                src: saved,
                size: 4
            },
        ]
    );
}

// Invariant 4: the stack pointer is published before any runtime call,
// for every mode except critical-native.
#[test]
fn test_stack_pointer_published_before_runtime_calls() {
    let shapes = [
        (NATIVE | AccessFlags::STATIC, "V"),
        (NATIVE, "VIL"),
        (NATIVE | AccessFlags::FAST_NATIVE, "LL"),
        (NATIVE | AccessFlags::STATIC | AccessFlags::FAST_NATIVE, "I"),
    ];
    for (flags, shorty) in shapes {
        let (_, insns) = compile(PointerSize::Bits64, flags, shorty);
        let publish = position(&insns, |i| matches!(i, Insn::StoreStackPointerToThread(_)));
        let first_call = insns
            .iter()
            .position(|i| matches!(i, Insn::Call { .. } | Insn::CallFromThread(_)));
        if let Some(call) = first_call {
            assert!(
                publish < call,
                "stack pointer published after a call for {shorty:?}"
            );
        }
    }
}

// Invariant 6: the entrypoint selection matrix.
#[test]
fn test_entrypoint_selection_matrix() {
    let offsets = test_runtime_offsets();
    let cases = [
        ("I", AccessFlags::NONE, offsets.jni_method_start, offsets.jni_method_end),
        (
            "I",
            AccessFlags::SYNCHRONIZED,
            offsets.jni_method_start_synchronized,
            offsets.jni_method_end_synchronized,
        ),
        (
            "L",
            AccessFlags::NONE,
            offsets.jni_method_start,
            offsets.jni_method_end_with_reference,
        ),
        (
            "L",
            AccessFlags::SYNCHRONIZED,
            offsets.jni_method_start_synchronized,
            offsets.jni_method_end_with_reference_synchronized,
        ),
    ];
    for (shorty, extra, start, end) in cases {
        let flags = NATIVE | AccessFlags::STATIC | extra;
        let (_, insns) = compile(PointerSize::Bits64, flags, shorty);
        assert_eq!(
            runtime_calls(&insns),
            vec![start.value(), end.value()],
            "wrong entrypoints for shorty {shorty:?} flags {flags}"
        );
    }
}

// Invariant 7 and the critical-native signature rules.
#[test]
fn test_incompatible_annotations_rejected() {
    let flags = NATIVE | AccessFlags::STATIC | AccessFlags::FAST_NATIVE | AccessFlags::CRITICAL_NATIVE;
    let isa = TestIsa::new(PointerSize::Bits64);
    let options = CompilerOptions::new(InstructionSet::Test64);
    let method = MethodDescriptor {
        access_flags: flags,
        shorty: Shorty::new("I"),
    };
    let err = compile_jni_stub(&options, &isa, &test_runtime_offsets(), &method).unwrap_err();
    assert!(matches!(err, CompileError::IncompatibleAnnotations));
}

#[test]
fn test_illegal_critical_signatures_rejected() {
    let isa = TestIsa::new(PointerSize::Bits64);
    let options = CompilerOptions::new(InstructionSet::Test64);
    let offsets = test_runtime_offsets();
    let cases = [
        (NATIVE | AccessFlags::CRITICAL_NATIVE, "I"),
        (
            NATIVE | AccessFlags::STATIC | AccessFlags::SYNCHRONIZED | AccessFlags::CRITICAL_NATIVE,
            "I",
        ),
        (NATIVE | AccessFlags::STATIC | AccessFlags::CRITICAL_NATIVE, "L"),
        (NATIVE | AccessFlags::STATIC | AccessFlags::CRITICAL_NATIVE, "VL"),
    ];
    for (flags, shorty) in cases {
        let method = MethodDescriptor {
            access_flags: flags,
            shorty: Shorty::new(shorty),
        };
        let err = compile_jni_stub(&options, &isa, &offsets, &method).unwrap_err();
        assert!(
            matches!(err, CompileError::IllegalCriticalSignature { .. }),
            "expected rejection for flags {flags} shorty {shorty:?}"
        );
    }
}

// The output aggregate carries the metadata of the main convention.
#[test]
fn test_compiled_method_metadata() {
    let flags = NATIVE | AccessFlags::STATIC;
    let isa = TestIsa::new(PointerSize::Bits64);
    let (compiled, insns) = compile_with(&isa, PointerSize::Bits64, flags, "V", |options| {
        options.generate_debug_info = true;
    });
    assert_eq!(compiled.instruction_set, InstructionSet::Test64);
    assert_eq!(compiled.frame_size, 64);
    assert_eq!(compiled.core_spill_mask, (1 << 10) | (1 << 11) | (1 << 12));
    assert_eq!(compiled.fp_spill_mask, 0);
    assert_eq!(compiled.code.len(), insns.len() * 4);
    assert!(!compiled.cfi.is_empty());
}

#[test]
fn test_cfi_disabled_by_default() {
    let flags = NATIVE | AccessFlags::STATIC;
    let (compiled, _) = compile(PointerSize::Bits64, flags, "V");
    assert!(compiled.cfi.is_empty());
}
