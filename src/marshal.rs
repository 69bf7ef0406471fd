//! Argument marshalling for the native call.
//!
//! The generator hands over three parallel lists: where each argument
//! currently lives, where the native ABI wants it, and (for references)
//! the frame slot holding the raw reference. This module schedules the
//! moves so that no source is clobbered before its last read, breaking
//! register cycles through the convention's scratch register, and
//! materialises reference handles along the way.
//!
//! A handle is null iff the spilled reference slot holds null; otherwise
//! it is the address of that slot. The entry at index 0 is the
//! guaranteed-non-null argument (`this` or the class), so its handle
//! conversion skips the null check.

use smallvec::SmallVec;

use crate::conv::{ArgumentLocation, OBJECT_REFERENCE_SIZE};
use crate::masm::JniMacroAssembler;
use crate::offsets::FrameOffset;
use crate::registers::AsmReg;

/// One pending register-destination move.
struct PendingMove {
    index: usize,
    dest: AsmReg,
    src: ArgumentLocation,
    reference: FrameOffset,
}

impl PendingMove {
    /// Register this move still needs to read, if any.
    fn reads(&self) -> Option<AsmReg> {
        self.src.register()
    }
}

/// Move every argument from `srcs[i]` to `dests[i]`, converting entries
/// with a valid `refs[i]` slot into handles.
///
/// Stack-destination writes go first (no destination slot may alias a
/// source slot); register destinations are ordered so each register is
/// fully read before it is overwritten.
pub fn move_arguments(
    masm: &mut dyn JniMacroAssembler,
    scratch: AsmReg,
    dests: &[ArgumentLocation],
    srcs: &[ArgumentLocation],
    refs: &[FrameOffset],
) {
    assert_eq!(dests.len(), srcs.len());
    assert_eq!(dests.len(), refs.len());

    // Spill raw references that are still in registers to their frame
    // slots; handles are addresses of those slots.
    for i in 0..srcs.len() {
        if refs[i].is_valid_reference() {
            debug_assert_eq!(srcs[i].size_of(), OBJECT_REFERENCE_SIZE);
            match srcs[i] {
                ArgumentLocation::Register(reg, size) => masm.store(refs[i], reg, size),
                ArgumentLocation::Stack(off, _) => debug_assert_eq!(off, refs[i]),
            }
        } else {
            debug_assert_eq!(srcs[i].size_of(), dests[i].size_of());
        }
    }

    // Stack destinations. Register sources stay live, and destination
    // slots (the outgoing-argument area) never alias source slots.
    let mut pending: SmallVec<[PendingMove; 8]> = SmallVec::new();
    for i in 0..dests.len() {
        let null_allowed = i != 0;
        match dests[i] {
            ArgumentLocation::Stack(dest_off, dest_size) => {
                if refs[i].is_valid_reference() {
                    masm.create_jobject_on_stack(dest_off, refs[i], null_allowed);
                } else {
                    match srcs[i] {
                        ArgumentLocation::Register(src_reg, _) => {
                            masm.store(dest_off, src_reg, dest_size);
                        }
                        ArgumentLocation::Stack(src_off, _) => {
                            if src_off != dest_off {
                                masm.copy(dest_off, src_off, dest_size);
                            }
                        }
                    }
                }
            }
            ArgumentLocation::Register(dest_reg, _) => {
                pending.push(PendingMove {
                    index: i,
                    dest: dest_reg,
                    src: srcs[i],
                    reference: refs[i],
                });
            }
        }
    }

    // Register destinations, clobber-safe order.
    while !pending.is_empty() {
        // Emit every move whose destination no other pending move reads.
        let mut progressed = false;
        let mut i = 0;
        while i < pending.len() {
            let dest = pending[i].dest;
            let blocked = pending
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && other.reads() == Some(dest));
            if blocked {
                i += 1;
            } else {
                let mv = pending.remove(i);
                emit_register_move(masm, &mv);
                progressed = true;
            }
        }
        if pending.is_empty() {
            break;
        }
        if progressed {
            continue;
        }

        // Every remaining destination is still read by another move, so
        // the remainder is one or more cycles. Free the first destination
        // by parking its current value in the scratch register.
        let dest = pending[0].dest;
        debug_assert_eq!(dest.bank, scratch.bank);
        debug_assert!(pending.iter().all(|mv| mv.dest != scratch));
        let read_size = pending
            .iter()
            .filter(|mv| mv.reads() == Some(dest))
            .map(|mv| mv.src.size_of())
            .max()
            .unwrap_or(0);
        log::trace!("breaking move cycle at {dest:?} via scratch {scratch:?}");
        masm.move_reg(scratch, dest, read_size);
        for mv in pending.iter_mut() {
            if mv.reads() == Some(dest) {
                mv.src = ArgumentLocation::Register(scratch, mv.src.size_of());
            }
        }
    }
}

fn emit_register_move(masm: &mut dyn JniMacroAssembler, mv: &PendingMove) {
    let null_allowed = mv.index != 0;
    if mv.reference.is_valid_reference() {
        masm.create_jobject_in_register(mv.dest, mv.reference, mv.src.register(), null_allowed);
    } else {
        match mv.src {
            ArgumentLocation::Register(src_reg, size) => {
                if src_reg != mv.dest {
                    masm.move_reg(mv.dest, src_reg, size);
                }
            }
            ArgumentLocation::Stack(src_off, size) => {
                masm.load(mv.dest, src_off, size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Insn, RecordingAssembler};

    const PTR: usize = 8;

    fn run(
        dests: &[ArgumentLocation],
        srcs: &[ArgumentLocation],
        refs: &[FrameOffset],
    ) -> Vec<Insn> {
        let mut masm = RecordingAssembler::new();
        move_arguments(&mut masm, AsmReg::gp(15), dests, srcs, refs);
        masm.into_insns()
    }

    #[test]
    fn test_stack_destinations_before_register_destinations() {
        // gp1 -> stack slot, then stack slot -> gp1 must not reorder.
        let insns = run(
            &[
                ArgumentLocation::Stack(FrameOffset(0), 8),
                ArgumentLocation::Register(AsmReg::gp(1), 8),
            ],
            &[
                ArgumentLocation::Register(AsmReg::gp(1), 8),
                ArgumentLocation::Stack(FrameOffset(64), 8),
            ],
            &[FrameOffset::INVALID_REFERENCE; 2],
        );
        assert_eq!(
            insns,
            vec![
                Insn::Store {
                    dest: FrameOffset(0),
                    src: AsmReg::gp(1),
                    size: 8
                },
                Insn::Load {
                    dest: AsmReg::gp(1),
                    src: FrameOffset(64),
                    size: 8
                },
            ]
        );
    }

    #[test]
    fn test_dependent_register_moves_are_ordered() {
        // gp2 -> gp3 must run before gp1 -> gp2.
        let insns = run(
            &[
                ArgumentLocation::Register(AsmReg::gp(2), 8),
                ArgumentLocation::Register(AsmReg::gp(3), 8),
            ],
            &[
                ArgumentLocation::Register(AsmReg::gp(1), 8),
                ArgumentLocation::Register(AsmReg::gp(2), 8),
            ],
            &[FrameOffset::INVALID_REFERENCE; 2],
        );
        assert_eq!(
            insns,
            vec![
                Insn::MoveReg {
                    dest: AsmReg::gp(3),
                    src: AsmReg::gp(2),
                    size: 8
                },
                Insn::MoveReg {
                    dest: AsmReg::gp(2),
                    src: AsmReg::gp(1),
                    size: 8
                },
            ]
        );
    }

    #[test]
    fn test_swap_cycle_uses_scratch() {
        let insns = run(
            &[
                ArgumentLocation::Register(AsmReg::gp(1), 8),
                ArgumentLocation::Register(AsmReg::gp(2), 8),
            ],
            &[
                ArgumentLocation::Register(AsmReg::gp(2), 8),
                ArgumentLocation::Register(AsmReg::gp(1), 8),
            ],
            &[FrameOffset::INVALID_REFERENCE; 2],
        );
        assert_eq!(
            insns,
            vec![
                Insn::MoveReg {
                    dest: AsmReg::gp(15),
                    src: AsmReg::gp(1),
                    size: 8
                },
                Insn::MoveReg {
                    dest: AsmReg::gp(1),
                    src: AsmReg::gp(2),
                    size: 8
                },
                Insn::MoveReg {
                    dest: AsmReg::gp(2),
                    src: AsmReg::gp(15),
                    size: 8
                },
            ]
        );
    }

    #[test]
    fn test_register_reference_is_spilled_then_converted() {
        // Raw reference in gp1, destination native stack slot: the
        // reference is stored to its frame slot and the handle is built
        // from that slot.
        let insns = run(
            &[ArgumentLocation::Stack(FrameOffset(8), PTR)],
            &[ArgumentLocation::Register(AsmReg::gp(1), 4)],
            &[FrameOffset(96)],
        );
        assert_eq!(
            insns,
            vec![
                Insn::Store {
                    dest: FrameOffset(96),
                    src: AsmReg::gp(1),
                    size: 4
                },
                Insn::CreateJObjectOnStack {
                    dest: FrameOffset(8),
                    spilled_reference: FrameOffset(96),
                    null_allowed: false
                },
            ]
        );
    }

    #[test]
    fn test_reference_to_register_keeps_live_in_reg() {
        let insns = run(
            &[
                ArgumentLocation::Register(AsmReg::gp(2), PTR),
                ArgumentLocation::Register(AsmReg::gp(3), PTR),
            ],
            &[
                ArgumentLocation::Register(AsmReg::gp(4), 4),
                ArgumentLocation::Stack(FrameOffset(100), 4),
            ],
            &[FrameOffset(96), FrameOffset(100)],
        );
        assert_eq!(
            insns,
            vec![
                Insn::Store {
                    dest: FrameOffset(96),
                    src: AsmReg::gp(4),
                    size: 4
                },
                Insn::CreateJObjectInRegister {
                    dest: AsmReg::gp(2),
                    spilled_reference: FrameOffset(96),
                    in_reg: Some(AsmReg::gp(4)),
                    null_allowed: false
                },
                Insn::CreateJObjectInRegister {
                    dest: AsmReg::gp(3),
                    spilled_reference: FrameOffset(100),
                    in_reg: None,
                    null_allowed: true
                },
            ]
        );
    }

    #[test]
    fn test_identical_locations_are_noops() {
        let insns = run(
            &[
                ArgumentLocation::Register(AsmReg::gp(1), 8),
                ArgumentLocation::Stack(FrameOffset(32), 4),
            ],
            &[
                ArgumentLocation::Register(AsmReg::gp(1), 8),
                ArgumentLocation::Stack(FrameOffset(32), 4),
            ],
            &[FrameOffset::INVALID_REFERENCE; 2],
        );
        assert!(insns.is_empty());
    }
}
