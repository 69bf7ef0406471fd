//! The JNI stub code generator.
//!
//! For every native method the managed runtime needs a small machine-code
//! bridge between the managed calling convention and the native one. This
//! module drives a [`JniMacroAssembler`] through the canonical stub shape:
//! build the frame, transition the thread out of the runnable state, push a
//! local reference frame, marshal the arguments, call the native code,
//! normalise and publish the result, unwind everything and deliver any
//! pending exception through slow paths emitted after the main body.
//!
//! Fast-native methods skip the runnable-state transition; critical-native
//! methods additionally skip the local reference frame, the stack-pointer
//! publication and all polls. The stub layout is fully determined by the
//! method descriptor and the target conventions; there is nothing to
//! optimise here.
//!
//! All transient state lives in a scratch arena released when compilation
//! returns; the produced byte vector is the only surviving artifact.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use log::{debug, trace};

use crate::conv::{
    ArgumentLocation, JniConvention, TargetIsa, OBJECT_REFERENCE_SIZE,
    SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
};
use crate::error::{CompileError, CompileResult};
use crate::flags::{AccessFlags, FastPathMode};
use crate::marshal;
use crate::masm::{JniMacroAssembler, JniUnaryCondition};
use crate::offsets::{FrameOffset, RuntimeOffsets, ThreadOffset};
use crate::options::{CompilerOptions, InstructionSet};
use crate::registers::AsmReg;
use crate::shorty::{JavaKind, Shorty};

/// The method to build a stub for: its access flags and signature shorty.
/// Everything else (target, conventions, runtime offsets) arrives
/// separately.
#[derive(Debug, Clone, Copy)]
pub struct MethodDescriptor<'a> {
    pub access_flags: AccessFlags,
    pub shorty: Shorty<'a>,
}

/// A finished stub: machine code plus the frame metadata the runtime
/// needs to register it.
#[derive(Debug, Clone)]
pub struct JniCompiledMethod {
    pub instruction_set: InstructionSet,
    pub code: Vec<u8>,
    pub frame_size: usize,
    pub core_spill_mask: u32,
    pub fp_spill_mask: u32,
    pub cfi: Vec<u8>,
}

/// Which transition runtime call is being selected.
enum JniEntrypoint {
    Start,
    End,
}

/// Start/end entrypoint selection by return kind and synchronization.
fn jni_entrypoint_offset(
    offsets: &RuntimeOffsets,
    which: JniEntrypoint,
    reference_return: bool,
    is_synchronized: bool,
) -> ThreadOffset {
    match which {
        JniEntrypoint::Start => {
            if is_synchronized {
                offsets.jni_method_start_synchronized
            } else {
                offsets.jni_method_start
            }
        }
        JniEntrypoint::End => match (reference_return, is_synchronized) {
            (true, true) => offsets.jni_method_end_with_reference_synchronized,
            (true, false) => offsets.jni_method_end_with_reference,
            (false, true) => offsets.jni_method_end_synchronized,
            (false, false) => offsets.jni_method_end,
        },
    }
}

/// Callee-save registers the stub reserves for the local-reference-frame
/// bookkeeping across the native call.
#[derive(Debug, Clone, Copy)]
struct LocalRefFrameRegs {
    /// Holds the `JNIEnv*` for the whole stub body.
    jni_env: AsmReg,
    /// Holds the cookie saved on entry, restored on exit.
    saved_cookie: AsmReg,
    /// Third scratch, doubles as the method-pointer holder before the
    /// native call.
    temp: AsmReg,
}

/// Write `in_reg` into the convention's current parameter slot.
fn set_native_parameter(
    masm: &mut dyn JniMacroAssembler,
    conv: &dyn JniConvention,
    in_reg: AsmReg,
    raw_pointer_size: usize,
) -> CompileResult<()> {
    if conv.is_current_param_on_stack() {
        masm.store(conv.current_param_stack_offset()?, in_reg, raw_pointer_size);
    } else {
        let out_reg = conv.current_param_register()?;
        if out_reg != in_reg {
            masm.move_reg(out_reg, in_reg, conv.current_param_size());
        }
    }
    Ok(())
}

/// Save the current local-reference cookie and install a fresh one from
/// the segment state.
fn push_local_reference_frame(
    masm: &mut dyn JniMacroAssembler,
    offsets: &RuntimeOffsets,
    regs: LocalRefFrameRegs,
) {
    // Load the old cookie that we shall need to restore.
    masm.load_from(
        regs.saved_cookie,
        regs.jni_env,
        offsets.jni_env_local_ref_cookie,
        SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
    );
    // Set the cookie in the JNI environment to the current segment state.
    masm.load_from(
        regs.temp,
        regs.jni_env,
        offsets.jni_env_segment_state,
        SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
    );
    masm.store_to(
        regs.jni_env,
        offsets.jni_env_local_ref_cookie,
        regs.temp,
        SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
    );
}

/// Wind the segment state back to the cookie and restore the saved one.
/// The cookie must be read before it is overwritten.
fn pop_local_reference_frame(
    masm: &mut dyn JniMacroAssembler,
    offsets: &RuntimeOffsets,
    regs: LocalRefFrameRegs,
) {
    masm.load_from(
        regs.temp,
        regs.jni_env,
        offsets.jni_env_local_ref_cookie,
        SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
    );
    masm.store_to(
        regs.jni_env,
        offsets.jni_env_segment_state,
        regs.temp,
        SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
    );
    masm.store_to(
        regs.jni_env,
        offsets.jni_env_local_ref_cookie,
        regs.saved_cookie,
        SAVED_LOCAL_REFERENCE_COOKIE_SIZE,
    );
}

/// Compile the bridge stub for one native method.
///
/// Arguments arrive in the managed runtime format, on stack or in
/// registers, with the method pointer supplied by that convention. The
/// produced code marshals them into the native convention, performs the
/// thread-state and local-reference bookkeeping the method's fast-path
/// mode requires, and returns the native result in the managed return
/// location.
pub fn compile_jni_stub(
    options: &CompilerOptions,
    isa: &dyn TargetIsa,
    offsets: &RuntimeOffsets,
    method: &MethodDescriptor<'_>,
) -> CompileResult<JniCompiledMethod> {
    let flags = method.access_flags;
    let shorty = method.shorty;
    assert!(flags.is_native(), "only native methods get a JNI stub");
    let is_static = flags.is_static();
    let is_synchronized = flags.is_synchronized();
    let is_fast_native = flags.is_fast_native();
    let is_critical_native = flags.is_critical_native();

    debug!(
        "compiling JNI stub: shorty {:?}, access flags {}",
        shorty.as_str(),
        flags
    );

    // Fast-native and critical-native are mutually exclusive, and
    // critical-native constrains the whole signature.
    if is_fast_native && is_critical_native {
        return Err(CompileError::IncompatibleAnnotations);
    }
    if is_fast_native || is_critical_native {
        trace!("fast path mode: {:?}", FastPathMode::from_flags(flags));
    }
    if is_critical_native {
        if !is_static {
            return Err(CompileError::IllegalCriticalSignature {
                reason: "critical-native methods must be static",
            });
        }
        if is_synchronized {
            return Err(CompileError::IllegalCriticalSignature {
                reason: "critical-native methods cannot be synchronized",
            });
        }
        if shorty.return_kind().is_reference() || shorty.has_reference_param() {
            return Err(CompileError::IllegalCriticalSignature {
                reason: "critical-native signatures cannot mention references",
            });
        }
    }

    let raw_pointer_size = options.pointer_size().size();
    debug_assert_eq!(offsets.method_declaring_class.value(), 0);

    let arena = Bump::new();

    // Calling conventions used to iterate over the method's parameters.
    let mut main_jni_conv = isa.jni_convention(
        is_static,
        is_synchronized,
        is_fast_native,
        is_critical_native,
        shorty,
    );
    let reference_return = main_jni_conv.is_return_a_reference();

    let mut mr_conv = isa.managed_convention(is_static, is_synchronized, shorty);

    // Convention for the end-transition call, which may pass the returned
    // reference and the lock object on top of the thread.
    let end_shorty = if reference_return && is_synchronized {
        "IL"
    } else if reference_return {
        "I"
    } else {
        "V"
    };
    let mut end_jni_conv = isa.jni_convention(
        is_static,
        is_synchronized,
        is_fast_native,
        is_critical_native,
        Shorty::new(end_shorty),
    );

    let mut masm = isa.assembler();
    masm.set_cfi_enabled(options.generate_debug_info);
    masm.set_emit_debug_checks(options.emit_run_time_checks_in_debug_mode);

    // 1. Build and register the native method frame.

    // 1.1. Build the frame saving all callee saves, the method pointer and
    //      the return address. For critical-native the frame is only the
    //      out-args area and no method pointer is pushed.
    let managed_frame_size = main_jni_conv.frame_size();
    let main_out_arg_size = main_jni_conv.out_frame_size();
    let mut current_frame_size = if is_critical_native {
        main_out_arg_size
    } else {
        managed_frame_size
    };
    let mut method_register = if is_critical_native {
        None
    } else {
        Some(mr_conv.method_register())
    };
    let callee_saves: &[AsmReg] = arena.alloc_slice_copy(main_jni_conv.callee_save_registers());
    masm.build_frame(current_frame_size, method_register, callee_saves);
    debug_assert_eq!(masm.current_cfa_offset(), current_frame_size);

    // 1.2. For a static call under read barriers, the declaring class
    //      loaded from the method may be stale while the collector is
    //      marking; route through a slow path that fixes it up. Skipped
    //      for critical-native, which never passes a class.
    let mut jclass_read_barrier_labels = None;
    if options.emit_read_barriers && is_static && !is_critical_native {
        let slow_path = masm.create_label();
        let resume = masm.create_label();
        masm.test_gc_marking(slow_path, JniUnaryCondition::NotZero);
        masm.bind(resume);
        jclass_read_barrier_labels = Some((slow_path, resume));
    }

    // 1.3. Publish the stack pointer so the collector can walk this frame.
    //      Critical-native runs with collections effectively disabled and
    //      skips the publication.
    if !is_critical_native {
        masm.store_stack_pointer_to_thread(offsets.top_of_managed_stack);
    }

    // 2. Call into the start transition for normal native methods.

    // 2.1. Move the frame down for outgoing args, shared between the start
    //      transition call and the main native call.
    let mut current_out_arg_size = main_out_arg_size;
    if is_critical_native {
        debug_assert_eq!(main_out_arg_size, current_frame_size);
    } else {
        masm.increase_frame_size(main_out_arg_size);
        current_frame_size += main_out_arg_size;
    }

    // 2.2. Spill all register arguments to survive the start call. Args
    //      headed for the native stack go straight to their slots with
    //      references converted to handles; args headed for native
    //      registers are spilled raw to their reserved managed slots.
    let mut src_args: BumpVec<'_, ArgumentLocation> = BumpVec::new_in(&arena);
    let mut dest_args: BumpVec<'_, ArgumentLocation> = BumpVec::new_in(&arena);
    let mut refs: BumpVec<'_, FrameOffset> = BumpVec::new_in(&arena);
    if !is_critical_native && !is_fast_native {
        mr_conv.reset(FrameOffset(current_frame_size as u32));
        main_jni_conv.reset(FrameOffset(main_out_arg_size as u32));
        main_jni_conv.next(); // Skip JNIEnv*.
        if is_static {
            main_jni_conv.next(); // Skip `jclass`.
            // A no-op move for the `jclass` argument keeps the following
            // argument from being treated as the non-null one.
            let method_reg = mr_conv.method_register();
            src_args.push(ArgumentLocation::Register(method_reg, raw_pointer_size));
            dest_args.push(ArgumentLocation::Register(method_reg, raw_pointer_size));
            refs.push(FrameOffset::INVALID_REFERENCE);
        } else {
            // Spill `this` raw, without conversion to a handle, even when
            // the native ABI wants it on the stack. `this` cannot be null,
            // so the argument move before the native call must see it at
            // index 0, and the raw spill leaves the start call free to
            // build its own handle.
            debug_assert!(mr_conv.has_next());
            debug_assert!(main_jni_conv.has_next());
            debug_assert!(mr_conv.is_current_param_a_reference());
            let this_slot = mr_conv.current_param_stack_offset()?;
            let src = if mr_conv.is_current_param_in_register() {
                ArgumentLocation::Register(
                    mr_conv.current_param_register()?,
                    OBJECT_REFERENCE_SIZE,
                )
            } else {
                ArgumentLocation::Stack(this_slot, OBJECT_REFERENCE_SIZE)
            };
            src_args.push(src);
            dest_args.push(ArgumentLocation::Stack(this_slot, OBJECT_REFERENCE_SIZE));
            refs.push(FrameOffset::INVALID_REFERENCE);
            mr_conv.next();
            main_jni_conv.next();
        }
        while mr_conv.has_next() {
            debug_assert!(main_jni_conv.has_next());
            let is_reference = mr_conv.is_current_param_a_reference();
            let spill_jobject = is_reference && !main_jni_conv.is_current_param_in_register();
            let src_size = if !is_reference && mr_conv.is_current_param_long_or_double() {
                8
            } else {
                4
            };
            let dest_size = if spill_jobject {
                raw_pointer_size
            } else {
                src_size
            };
            src_args.push(if mr_conv.is_current_param_in_register() {
                ArgumentLocation::Register(mr_conv.current_param_register()?, src_size)
            } else {
                ArgumentLocation::Stack(mr_conv.current_param_stack_offset()?, src_size)
            });
            dest_args.push(if main_jni_conv.is_current_param_in_register() {
                ArgumentLocation::Stack(mr_conv.current_param_stack_offset()?, dest_size)
            } else {
                ArgumentLocation::Stack(main_jni_conv.current_param_stack_offset()?, dest_size)
            });
            refs.push(if spill_jobject {
                mr_conv.current_param_stack_offset()?
            } else {
                FrameOffset::INVALID_REFERENCE
            });
            mr_conv.next();
            main_jni_conv.next();
        }
        marshal::move_arguments(
            &mut *masm,
            main_jni_conv.scratch_register(),
            &dest_args,
            &src_args,
            &refs,
        );
    }

    // 2.3. Call the start transition, passing Thread* and, for
    //      synchronized methods, the object to lock. The native convention
    //      is guaranteed to support two leading pointer parameters.
    let monitor_enter_exception_slow_path = if is_synchronized {
        Some(masm.create_label())
    } else {
        None
    };
    if !is_critical_native && !is_fast_native {
        let jni_start = jni_entrypoint_offset(
            offsets,
            JniEntrypoint::Start,
            reference_return,
            is_synchronized,
        );
        main_jni_conv.reset(FrameOffset(main_out_arg_size as u32));
        if is_synchronized {
            if is_static {
                // The declaring class sits at offset zero of the method,
                // so the method pointer doubles as the class pointer.
                set_native_parameter(
                    &mut *masm,
                    &*main_jni_conv,
                    mr_conv.method_register(),
                    raw_pointer_size,
                )?;
            } else {
                mr_conv.reset(FrameOffset(current_frame_size as u32));
                let this_offset = mr_conv.current_param_stack_offset()?;
                if main_jni_conv.is_current_param_on_stack() {
                    let out_off = main_jni_conv.current_param_stack_offset()?;
                    masm.create_jobject_on_stack(out_off, this_offset, /*null_allowed=*/ false);
                } else {
                    let out_reg = main_jni_conv.current_param_register()?;
                    masm.create_jobject_in_register(
                        out_reg,
                        this_offset,
                        None,
                        /*null_allowed=*/ false,
                    );
                }
            }
            main_jni_conv.next();
        }
        if main_jni_conv.is_current_param_in_register() {
            let thread_reg = main_jni_conv.current_param_register()?;
            masm.get_current_thread(ArgumentLocation::Register(thread_reg, raw_pointer_size));
            masm.call(thread_reg, jni_start.into());
        } else {
            let thread_off = main_jni_conv.current_param_stack_offset()?;
            masm.get_current_thread(ArgumentLocation::Stack(thread_off, raw_pointer_size));
            masm.call_from_thread(jni_start);
        }
        method_register = None; // Clobbered by the call.
        if let Some(label) = monitor_enter_exception_slow_path {
            // Check for exceptions from monitor enter.
            masm.exception_poll(label);
        }
    }

    // 3. Push the local reference frame. Critical-native cannot use
    //    references and skips it. The environment pointer and the saved
    //    cookie stay in callee-save scratch registers across the native
    //    call; the managed callee saves were already spilled, so these
    //    registers are free.
    let lrf_regs = if !is_critical_native {
        let scratch_regs = main_jni_conv.callee_save_scratch_registers();
        assert!(
            scratch_regs.len() >= 3,
            "target must provide at least three callee-save scratch registers"
        );
        Some(LocalRefFrameRegs {
            jni_env: scratch_regs[0],
            saved_cookie: scratch_regs[1],
            temp: scratch_regs[2],
        })
    } else {
        None
    };
    if let Some(regs) = lrf_regs {
        masm.load_raw_ptr_from_thread(regs.jni_env, offsets.jni_env);
        push_local_reference_frame(&mut *masm, offsets, regs);
    }

    // 4. Make the main native call.

    // 4.1. Fill all arguments except the leading `JNIEnv*`.
    src_args.clear();
    dest_args.clear();
    refs.clear();
    mr_conv.reset(FrameOffset(current_frame_size as u32));
    main_jni_conv.reset(FrameOffset(main_out_arg_size as u32));
    if is_critical_native {
        // Move the method pointer to the hidden argument register.
        src_args.push(ArgumentLocation::Register(
            mr_conv.method_register(),
            raw_pointer_size,
        ));
        dest_args.push(ArgumentLocation::Register(
            main_jni_conv.hidden_argument_register(),
            raw_pointer_size,
        ));
        refs.push(FrameOffset::INVALID_REFERENCE);
    } else {
        main_jni_conv.next(); // Skip JNIEnv*.
        let method_offset = FrameOffset(
            (current_out_arg_size + mr_conv.method_stack_offset().value() as usize) as u32,
        );
        if !is_static || main_jni_conv.is_current_param_on_stack() {
            // The method shall not be available in the `jclass` argument
            // register; keep it callable through the reserved callee-save
            // temp. For fast-native it still lives in the old method
            // register; for normal native the start call clobbered it, so
            // reload from the frame slot.
            let lrf = lrf_regs.expect("local-reference registers are reserved for non-critical");
            if is_fast_native {
                let old_method_reg =
                    method_register.expect("fast-native keeps the method register live");
                masm.move_reg(lrf.temp, old_method_reg, raw_pointer_size);
            } else {
                debug_assert!(method_register.is_none());
                masm.load(lrf.temp, method_offset, raw_pointer_size);
            }
            method_register = Some(lrf.temp);
        }
        if is_static {
            // For static methods the method pointer becomes the `jclass`
            // argument; the declaring class lives at offset zero of the
            // method object.
            match method_register {
                Some(reg) => {
                    src_args.push(ArgumentLocation::Register(reg, raw_pointer_size));
                }
                None => {
                    debug_assert!(main_jni_conv.is_current_param_in_register());
                    src_args.push(ArgumentLocation::Stack(method_offset, raw_pointer_size));
                }
            }
            if main_jni_conv.is_current_param_in_register() {
                // The `jclass` argument register is the method register
                // needed for the call below.
                let jclass_reg = main_jni_conv.current_param_register()?;
                method_register = Some(jclass_reg);
                dest_args.push(ArgumentLocation::Register(jclass_reg, raw_pointer_size));
            } else {
                dest_args.push(ArgumentLocation::Stack(
                    main_jni_conv.current_param_stack_offset()?,
                    raw_pointer_size,
                ));
            }
            refs.push(FrameOffset::INVALID_REFERENCE);
            main_jni_conv.next();
        } else {
            // The `this` argument goes first so the marshaller treats it
            // as non-null. It is still a raw reference at this point.
            debug_assert!(mr_conv.has_next());
            debug_assert!(main_jni_conv.has_next());
            debug_assert!(mr_conv.is_current_param_a_reference());
            src_args.push(
                if is_fast_native && mr_conv.is_current_param_in_register() {
                    ArgumentLocation::Register(
                        mr_conv.current_param_register()?,
                        OBJECT_REFERENCE_SIZE,
                    )
                } else {
                    ArgumentLocation::Stack(
                        mr_conv.current_param_stack_offset()?,
                        OBJECT_REFERENCE_SIZE,
                    )
                },
            );
            dest_args.push(if main_jni_conv.is_current_param_in_register() {
                ArgumentLocation::Register(main_jni_conv.current_param_register()?, raw_pointer_size)
            } else {
                ArgumentLocation::Stack(
                    main_jni_conv.current_param_stack_offset()?,
                    raw_pointer_size,
                )
            });
            refs.push(mr_conv.current_param_stack_offset()?);
            mr_conv.next();
            main_jni_conv.next();
        }
    }
    // Move the remaining arguments into place. For normal native only the
    // register-destined ones are still outstanding; Phase 2 already filled
    // the native stack slots.
    while mr_conv.has_next() {
        debug_assert!(main_jni_conv.has_next());
        let dest_in_reg = main_jni_conv.is_current_param_in_register();
        if !is_critical_native && !is_fast_native && !dest_in_reg {
            mr_conv.next();
            main_jni_conv.next();
            continue;
        }
        let is_reference = mr_conv.is_current_param_a_reference();
        let src_size = if !is_reference && mr_conv.is_current_param_long_or_double() {
            8
        } else {
            4
        };
        let dest_size = if is_reference {
            raw_pointer_size
        } else {
            src_size
        };
        src_args.push(
            if (is_critical_native || is_fast_native) && mr_conv.is_current_param_in_register() {
                ArgumentLocation::Register(mr_conv.current_param_register()?, src_size)
            } else {
                ArgumentLocation::Stack(mr_conv.current_param_stack_offset()?, src_size)
            },
        );
        dest_args.push(if dest_in_reg {
            ArgumentLocation::Register(main_jni_conv.current_param_register()?, dest_size)
        } else {
            ArgumentLocation::Stack(main_jni_conv.current_param_stack_offset()?, dest_size)
        });
        refs.push(if is_reference {
            mr_conv.current_param_stack_offset()?
        } else {
            FrameOffset::INVALID_REFERENCE
        });
        mr_conv.next();
        main_jni_conv.next();
    }
    debug_assert!(!main_jni_conv.has_next());
    marshal::move_arguments(
        &mut *masm,
        main_jni_conv.scratch_register(),
        &dest_args,
        &src_args,
        &refs,
    );

    // 4.2. Create the first argument, the JNI environment pointer.
    if let Some(regs) = lrf_regs {
        main_jni_conv.reset(FrameOffset(main_out_arg_size as u32));
        if main_jni_conv.is_current_param_in_register() {
            let jni_env_arg = main_jni_conv.current_param_register()?;
            masm.move_reg(jni_env_arg, regs.jni_env, raw_pointer_size);
        } else {
            let jni_env_arg_offset = main_jni_conv.current_param_stack_offset()?;
            masm.store(jni_env_arg_offset, regs.jni_env, raw_pointer_size);
        }
    }

    // 4.3. Plant the call to the native code through the method object's
    //      entrypoint field.
    let jni_entrypoint_field = offsets.method_entry_point_from_jni;
    if is_critical_native {
        if main_jni_conv.use_tail_call() {
            masm.jump(
                main_jni_conv.hidden_argument_register(),
                jni_entrypoint_field.into(),
            );
        } else {
            masm.call(
                main_jni_conv.hidden_argument_register(),
                jni_entrypoint_field.into(),
            );
        }
    } else {
        // The method register may be the callee-save temp, which gets
        // clobbered below; take it so nothing uses it past the call.
        let method_reg = method_register
            .take()
            .expect("method register is live for the native call");
        masm.call(method_reg, jni_entrypoint_field.into());
    }

    // 4.4. Fix differences in result widths.
    let return_kind = shorty.return_kind();
    if main_jni_conv.requires_small_result_type_extension() {
        debug_assert!(return_kind.is_small());
        debug_assert!(!is_critical_native || !main_jni_conv.use_tail_call());
        if let Some(return_reg) = main_jni_conv.return_register() {
            match return_kind {
                JavaKind::Byte | JavaKind::Short => {
                    masm.sign_extend(return_reg, return_kind.component_size());
                }
                JavaKind::Boolean | JavaKind::Char => {
                    masm.zero_extend(return_reg, return_kind.component_size());
                }
                _ => {}
            }
        }
    }

    // 5. Return-value handling and the end transition.

    // 5.1. Spill or move the return value if needed.
    let spill_return_value = main_jni_conv.spills_return_value();
    let mut return_save_location = if spill_return_value {
        main_jni_conv.return_value_save_location()
    } else {
        FrameOffset(0)
    };
    if spill_return_value {
        debug_assert!(!is_critical_native);
        // The end-transition call clobbers the return register; park the
        // value in the frame and restore it in 5.6.
        debug_assert!((return_save_location.value() as usize) < current_frame_size);
        if let Some(return_reg) = main_jni_conv.return_register() {
            masm.store(
                return_save_location,
                return_reg,
                main_jni_conv.size_of_return_value(),
            );
        }
    } else if (is_fast_native || is_critical_native) && main_jni_conv.size_of_return_value() != 0 {
        // Move the native return register into the managed one when they
        // differ (soft-float native against hard-float managed, say).
        let jni_return_reg = main_jni_conv.return_register();
        let mr_return_reg = mr_conv.return_register();
        if jni_return_reg != mr_return_reg {
            debug_assert!(!is_critical_native || !main_jni_conv.use_tail_call());
            if let (Some(jni_reg), Some(mr_reg)) = (jni_return_reg, mr_return_reg) {
                masm.move_reg(mr_reg, jni_reg, main_jni_conv.size_of_return_value());
            }
        } else if jni_return_reg.is_none() {
            debug_assert_eq!(
                main_jni_conv.size_of_return_value(),
                mr_conv.size_of_return_value()
            );
        }
    }

    // 5.2. For fast-native with a reference result, poll for exceptions
    //      early so the reference decode on the main path need not.
    let exception_slow_path = if !is_critical_native {
        Some(masm.create_label())
    } else {
        None
    };
    if is_fast_native && reference_return {
        if let Some(label) = exception_slow_path {
            masm.exception_poll(label);
        }
    }

    // 5.3. Likewise an early suspend check, so the decoded reference never
    //      has to appear in a stack map.
    let suspend_check_labels = if is_fast_native {
        Some((masm.create_label(), masm.create_label()))
    } else {
        None
    };
    if reference_return {
        if let Some((slow_path, resume)) = suspend_check_labels {
            masm.suspend_check(slow_path);
            masm.bind(resume);
        }
    }

    if !is_critical_native {
        // 5.4. Grow the frame when the end call needs a larger out-args
        //      area than the main call did.
        let end_out_arg_size = end_jni_conv.out_frame_size();
        if end_out_arg_size > current_out_arg_size {
            debug_assert!(!is_fast_native);
            let out_arg_size_diff = end_out_arg_size - current_out_arg_size;
            current_out_arg_size = end_out_arg_size;
            masm.increase_frame_size(out_arg_size_diff);
            current_frame_size += out_arg_size_diff;
            return_save_location = return_save_location.add(out_arg_size_diff as u32);
        }
        end_jni_conv.reset(FrameOffset(end_out_arg_size as u32));

        // 5.5. Call the end transition; for fast-native this is only the
        //      reference decode.
        if !is_fast_native || reference_return {
            let jni_end = if is_fast_native {
                offsets.jni_decode_reference_result
            } else {
                jni_entrypoint_offset(
                    offsets,
                    JniEntrypoint::End,
                    reference_return,
                    is_synchronized,
                )
            };
            if reference_return {
                // Pass the native result.
                if let Some(return_reg) = main_jni_conv.return_register() {
                    set_native_parameter(&mut *masm, &*end_jni_conv, return_reg, raw_pointer_size)?;
                }
                end_jni_conv.next();
            }
            if is_synchronized {
                // Pass the object to unlock.
                if is_static {
                    // The method register was clobbered by the native
                    // call; reload the method from the frame to stand in
                    // for its declaring class.
                    let method_offset = FrameOffset(
                        (current_out_arg_size + mr_conv.method_stack_offset().value() as usize)
                            as u32,
                    );
                    if end_jni_conv.is_current_param_on_stack() {
                        let out_off = end_jni_conv.current_param_stack_offset()?;
                        masm.copy(out_off, method_offset, raw_pointer_size);
                    } else {
                        let out_reg = end_jni_conv.current_param_register()?;
                        masm.load(out_reg, method_offset, raw_pointer_size);
                    }
                } else {
                    mr_conv.reset(FrameOffset(current_frame_size as u32));
                    let this_offset = mr_conv.current_param_stack_offset()?;
                    if end_jni_conv.is_current_param_on_stack() {
                        let out_off = end_jni_conv.current_param_stack_offset()?;
                        masm.create_jobject_on_stack(out_off, this_offset, /*null_allowed=*/ false);
                    } else {
                        let out_reg = end_jni_conv.current_param_register()?;
                        masm.create_jobject_in_register(
                            out_reg,
                            this_offset,
                            None,
                            /*null_allowed=*/ false,
                        );
                    }
                }
                end_jni_conv.next();
            }
            if end_jni_conv.is_current_param_in_register() {
                let thread_reg = end_jni_conv.current_param_register()?;
                masm.get_current_thread(ArgumentLocation::Register(thread_reg, raw_pointer_size));
                masm.call(thread_reg, jni_end.into());
            } else {
                let thread_off = end_jni_conv.current_param_stack_offset()?;
                masm.get_current_thread(ArgumentLocation::Stack(thread_off, raw_pointer_size));
                masm.call_from_thread(jni_end);
            }
        }

        // 5.6. Reload the return value if it was spilled.
        if spill_return_value {
            if let Some(mr_return_reg) = mr_conv.return_register() {
                masm.load(
                    mr_return_reg,
                    return_save_location,
                    mr_conv.size_of_return_value(),
                );
            }
        }
    }

    // 6. Pop the local reference frame.
    if let Some(regs) = lrf_regs {
        pop_local_reference_frame(&mut *masm, offsets, regs);
    }

    // 7. Return from the stub.

    // 7.1. Move the frame up, the out-args space is done. Critical-native
    //      folds this into frame removal.
    if !is_critical_native {
        masm.decrease_frame_size(current_out_arg_size);
        current_frame_size -= current_out_arg_size;
    }

    // 7.2. Process pending exceptions from the call or monitor exit.
    //      Fast-native with a reference result polled early.
    if !is_critical_native && (!is_fast_native || !reference_return) {
        if let Some(label) = exception_slow_path {
            masm.exception_poll(label);
        }
    }

    // 7.3. Fast-native never left the runnable state, so check for a
    //      raised suspend flag here, unless done above.
    if !reference_return {
        if let Some((slow_path, resume)) = suspend_check_labels {
            masm.suspend_check(slow_path);
            masm.bind(resume);
        }
    }

    // 7.4. Remove the activation; callee saves must be restored since the
    //      collector may have updated references held in them.
    debug_assert_eq!(masm.current_cfa_offset(), current_frame_size);
    if !is_critical_native || !main_jni_conv.use_tail_call() {
        let may_suspend = !is_critical_native;
        masm.remove_frame(current_frame_size, callee_saves, may_suspend);
        debug_assert_eq!(masm.current_cfa_offset(), current_frame_size);
    }

    // 8. Slow paths.

    // 8.1. Read barrier for the declaring class of a static method. Under
    //      the baker collector, test the mark bit first and return fast
    //      when the class is already marked; the runtime call preserves
    //      the method and argument registers.
    if let Some((slow_path, resume)) = jclass_read_barrier_labels {
        masm.bind(slow_path);
        if options.use_baker_read_barrier {
            // The method register is unclobbered here and the callee
            // saves are already spilled, so scratch registers are free.
            let class_reg = main_jni_conv.callee_save_scratch_registers()[0];
            masm.load_from(
                class_reg,
                mr_conv.method_register(),
                offsets.method_declaring_class,
                OBJECT_REFERENCE_SIZE,
            );
            masm.test_mark_bit(class_reg, resume, JniUnaryCondition::NotZero);
        }
        masm.call_from_thread(offsets.read_barrier_jni);
        masm.jump_to(resume);
    }

    // 8.2. Suspend check slow path for fast-native. The suspend entrypoint
    //      clobbers the published stack pointer, so a reference-returning
    //      stub republishes it for the decode call it resumes into.
    if let Some((slow_path, resume)) = suspend_check_labels {
        masm.bind(slow_path);
        if reference_return && main_out_arg_size != 0 {
            masm.adjust_cfa_offset(main_out_arg_size as i32);
            masm.decrease_frame_size(main_out_arg_size);
        }
        masm.call_from_thread(offsets.test_suspend);
        if reference_return {
            masm.store_stack_pointer_to_thread(offsets.top_of_managed_stack);
        }
        if reference_return && main_out_arg_size != 0 {
            masm.increase_frame_size(main_out_arg_size);
            masm.adjust_cfa_offset(-(main_out_arg_size as i32));
        }
        masm.jump_to(resume);
    }

    // 8.3. Exception slow paths. The monitor-enter path unwinds the
    //      out-args area and falls through into the generic path; the
    //      early fast-native poll additionally owes a local-reference
    //      frame pop before delivery.
    if !is_critical_native {
        if is_synchronized {
            debug_assert!(!is_fast_native);
            if let Some(label) = monitor_enter_exception_slow_path {
                masm.bind(label);
            }
            if main_out_arg_size != 0 {
                masm.adjust_cfa_offset(main_out_arg_size as i32);
                masm.decrease_frame_size(main_out_arg_size);
            }
        }
        if let Some(label) = exception_slow_path {
            masm.bind(label);
        }
        if is_fast_native && reference_return {
            if main_out_arg_size != 0 {
                masm.adjust_cfa_offset(main_out_arg_size as i32);
                masm.decrease_frame_size(main_out_arg_size);
            }
            if let Some(regs) = lrf_regs {
                pop_local_reference_frame(&mut *masm, offsets, regs);
            }
        }
        debug_assert_eq!(masm.current_cfa_offset(), current_frame_size);
        masm.deliver_pending_exception();
    }

    // 9. Finalize code generation.
    masm.finalize_code();
    let code_size = masm.code_size();
    let mut code = vec![0u8; code_size];
    masm.finalize_instructions(&mut code)?;

    Ok(JniCompiledMethod {
        instruction_set: options.instruction_set,
        code,
        frame_size: managed_frame_size,
        core_spill_mask: main_jni_conv.core_spill_mask(),
        fp_spill_mask: main_jni_conv.fp_spill_mask(),
        cfi: masm.cfi_data().to_vec(),
    })
}
