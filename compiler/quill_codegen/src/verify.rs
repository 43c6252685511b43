//! Lowered-body verification.
//!
//! Re-simulates a [`MethodBody`]'s instruction stream independently of
//! the emitter that produced it and checks the structural rules every
//! body must satisfy:
//!
//! - every label is marked at most once, and every branch target is
//!   marked somewhere;
//! - the evaluation stack never underflows;
//! - the stack is empty at every label (holding just the exception at a
//!   handler label), at every branch, and at every return apart from the
//!   returned value;
//! - a generator's resume points are keyed exactly `1..=N` and all
//!   marked.
//!
//! Instructions after a flow-ending instruction and before the next
//! label are not simulated.

use rustc_hash::FxHashSet;

use crate::error::LowerError;
use crate::instr::{Instr, Label};
use crate::sink::MethodBody;

/// Per-label facts gathered during the walk.
#[derive(Clone, Copy, Debug, Default)]
struct LabelUse {
    marked: bool,
    referenced: bool,
}

pub fn verify_body(body: &MethodBody) -> Result<(), LowerError> {
    let mut uses = vec![LabelUse::default(); body.label_count as usize];
    let handlers: FxHashSet<Label> = body
        .instrs
        .iter()
        .filter_map(|instr| match instr {
            Instr::EnterTry { handler } => Some(*handler),
            _ => None,
        })
        .collect();

    let mut depth = 0usize;
    let mut reachable = true;

    for instr in &body.instrs {
        if let Instr::MarkLabel(label) = instr {
            let entry = uses
                .get_mut(label.index())
                .ok_or(LowerError::UnknownLabel(*label))?;
            if entry.marked {
                return Err(LowerError::LabelMarkedTwice(*label));
            }
            entry.marked = true;

            let is_handler = handlers.contains(label);
            if reachable && (is_handler || depth != 0) {
                return Err(LowerError::StackImbalance {
                    site: "label",
                    depth,
                    expected: usize::from(is_handler),
                });
            }
            depth = usize::from(is_handler);
            reachable = true;
            continue;
        }

        for target in instr.branch_targets() {
            uses.get_mut(target.index())
                .ok_or(LowerError::UnknownLabel(target))?
                .referenced = true;
        }

        if !reachable {
            continue;
        }

        let (pops, pushes) = instr.stack_effect();
        if pops > depth {
            return Err(LowerError::StackUnderflow {
                instr: instr.mnemonic(),
                depth,
            });
        }
        if let Instr::Return { with_value } = instr {
            let expected = usize::from(*with_value);
            if depth != expected {
                return Err(LowerError::StackImbalance {
                    site: "return",
                    depth,
                    expected,
                });
            }
        }
        depth = depth - pops + pushes;

        let is_jump = matches!(
            instr,
            Instr::Branch(_) | Instr::BranchIf { .. } | Instr::Switch { .. } | Instr::Leave(_)
        );
        if is_jump && depth != 0 {
            return Err(LowerError::StackImbalance {
                site: "branch",
                depth,
                expected: 0,
            });
        }

        if instr.ends_flow() {
            reachable = false;
            depth = 0;
        }
    }

    for (i, entry) in uses.iter().enumerate() {
        if entry.referenced && !entry.marked {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "label counts never exceed u32"
            )]
            let label = Label::new(i as u32);
            return Err(LowerError::UnmarkedLabel(label));
        }
    }

    verify_resume_points(body, &uses)
}

fn verify_resume_points(body: &MethodBody, uses: &[LabelUse]) -> Result<(), LowerError> {
    let mut expected = 1;
    for &(index, label) in &body.resume_points {
        if index < 1 {
            return Err(LowerError::NonPositiveYieldIndex { index });
        }
        if index == expected - 1 {
            return Err(LowerError::DuplicateYieldIndex { index });
        }
        if index != expected {
            return Err(LowerError::YieldIndexGap {
                expected,
                found: index,
            });
        }
        if !uses.get(label.index()).is_some_and(|entry| entry.marked) {
            return Err(LowerError::MissingResumeLabel { index });
        }
        expected += 1;
    }
    Ok(())
}
