// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of convparity (tensor-graph conversion parity harness).

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{instruction_dsts, instruction_operands, replace_operand, IRModule, Instr, ValueId};
use crate::shapes::{infer_module_shapes, ShapeError};

/// What a canonicalization run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalStats {
    pub resizes_removed: usize,
    pub instrs_pruned: usize,
}

/// Canonicalize a traced graph in place, the way a converter would before
/// lowering it.
///
/// The pass keeps the existing SSA IDs, forwards identity resizes to their
/// source and prunes instructions that no output depends on. Declared inputs
/// are never removed, so the input arity of the graph is preserved. Running
/// the pass repeatedly is idempotent.
pub fn canonicalize_module(module: &mut IRModule) -> Result<CanonicalStats, ShapeError> {
    let before = module.instrs.len();
    let resizes_removed = eliminate_noop_resize(module)?;
    module.instrs = prune_dead(&module.instrs);
    module.next_id = next_sequential_id(module);

    Ok(CanonicalStats {
        resizes_removed,
        instrs_pruned: before - module.instrs.len() - resizes_removed,
    })
}

/// Forward every resize whose output equals its input to the input.
///
/// A resize is an identity when the output extents match the input extents
/// and every explicit scale factor is exactly one. Returns the number of
/// resizes removed.
pub fn eliminate_noop_resize(module: &mut IRModule) -> Result<usize, ShapeError> {
    let shapes = infer_module_shapes(module)?;

    // dst -> surviving source; chained resizes resolve to the first source
    let mut forwarded: BTreeMap<ValueId, ValueId> = BTreeMap::new();
    for instr in &module.instrs {
        if let Instr::Resize { dst, src, scale, .. } = instr {
            let unit_scale = scale.as_ref().map_or(true, |s| s.iter().all(|f| *f == 1.0));
            if unit_scale && shapes.get(dst) == shapes.get(src) {
                let root = forwarded.get(src).copied().unwrap_or(*src);
                forwarded.insert(*dst, root);
            }
        }
    }
    if forwarded.is_empty() {
        return Ok(0);
    }

    let mut instrs = Vec::with_capacity(module.instrs.len());
    for mut instr in module.instrs.drain(..) {
        if let Instr::Resize { dst, .. } = &instr {
            if forwarded.contains_key(dst) {
                continue;
            }
        }
        for operand in instruction_operands(&instr) {
            if let Some(root) = forwarded.get(&operand) {
                replace_operand(&mut instr, operand, *root);
            }
        }
        instrs.push(instr);
    }
    module.instrs = instrs;
    Ok(forwarded.len())
}

/// Drop instructions none of whose values reach an output.
pub fn prune_dead(instrs: &[Instr]) -> Vec<Instr> {
    let mut used: BTreeSet<ValueId> = BTreeSet::new();
    for instr in instrs.iter().rev() {
        let dsts = instruction_dsts(instr);
        let live = dsts.is_empty() || dsts.iter().any(|id| used.contains(id));
        if live {
            used.extend(instruction_operands(instr));
        }
    }

    instrs
        .iter()
        .filter(|instr| {
            let dsts = instruction_dsts(instr);
            matches!(instr, Instr::Input { .. })
                || dsts.is_empty()
                || dsts.iter().any(|id| used.contains(id))
        })
        .cloned()
        .collect()
}

fn next_sequential_id(module: &IRModule) -> usize {
    module
        .instrs
        .iter()
        .flat_map(instruction_dsts)
        .map(|id| id.0 + 1)
        .max()
        .unwrap_or(0)
}
