//! Memory-to-register promotion.
//!
//! Sealed SSA construction (Braun et al.) with block parameters as the join
//! form: promotable allocas become SSA values, loads read the reaching
//! definition, stores become definitions, and join blocks gain parameters
//! fed through the predecessors' branch arguments. Trivial parameters whose
//! incoming values all agree are elided afterwards.
//!
//! A promotable alloca reserves exactly one primitive slot and is used only
//! as the direct address of loads and stores; anything else (gep, call
//! arguments, being stored itself) keeps it in memory.

use std::collections::{HashMap, HashSet};

use viper_il::{Function, Instr, Module, Opcode, Param, TempId, Type, Value};

use crate::Cfg;

/// Statistics collected during promotion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mem2RegStats {
    /// Allocas promoted to SSA form.
    pub promoted_vars: u32,
    /// Load instructions eliminated.
    pub removed_loads: u32,
    /// Store instructions eliminated.
    pub removed_stores: u32,
}

/// Promote simple allocas to SSA form across every function of `m`.
pub fn mem2reg(m: &mut Module, mut stats: Option<&mut Mem2RegStats>) {
    let mut total = Mem2RegStats::default();
    for f in &mut m.functions {
        let s = promote_function(f);
        total.promoted_vars += s.promoted_vars;
        total.removed_loads += s.removed_loads;
        total.removed_stores += s.removed_stores;
    }
    tracing::debug!(
        promoted = total.promoted_vars,
        loads = total.removed_loads,
        stores = total.removed_stores,
        "mem2reg complete"
    );
    if let Some(out) = stats.as_deref_mut() {
        *out = total;
    }
}

/// One load or store of a promotable variable, in block order.
enum Event {
    Load { var: usize, result: TempId },
    Store { var: usize, value: Value },
}

fn promote_function(f: &mut Function) -> Mem2RegStats {
    let cfg = Cfg::new(f);
    let (vars, var_of) = find_promotable(f);
    if vars.is_empty() {
        return Mem2RegStats::default();
    }

    // Collect the per-block event stream and the instructions to delete.
    let n = f.blocks.len();
    let mut events: Vec<Vec<Event>> = (0..n).map(|_| Vec::new()).collect();
    let mut doomed: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut stats = Mem2RegStats {
        promoted_vars: vars.len() as u32,
        ..Default::default()
    };
    for (bi, block) in f.blocks.iter().enumerate() {
        for (ii, instr) in block.instructions.iter().enumerate() {
            match instr.op {
                Opcode::Alloca => {
                    if instr.result.is_some_and(|r| var_of.contains_key(&r)) {
                        doomed[bi].insert(ii);
                    }
                }
                Opcode::Load => {
                    if let Some(var) = addressed_var(&var_of, instr) {
                        events[bi].push(Event::Load {
                            var,
                            result: instr.result.expect("load has a result"),
                        });
                        doomed[bi].insert(ii);
                        stats.removed_loads += 1;
                    }
                }
                Opcode::Store => {
                    if let Some(var) = addressed_var(&var_of, instr) {
                        events[bi].push(Event::Store {
                            var,
                            value: instr.operands[1].clone(),
                        });
                        doomed[bi].insert(ii);
                        stats.removed_stores += 1;
                    }
                }
                _ => {}
            }
        }
    }

    // Fill blocks in reverse post-order, sealing each block once all of its
    // predecessors are filled; unreachable blocks go last.
    let mut order = cfg.reverse_post_order();
    order.extend((0..n).filter(|&b| !cfg.is_reachable(b)));

    let mut ssa = SsaBuilder {
        f,
        preds: (0..n).map(|b| cfg.preds(b).to_vec()).collect(),
        sealed: vec![false; n],
        filled: vec![false; n],
        current: vec![HashMap::new(); vars.len()],
        incomplete: (0..n).map(|_| Vec::new()).collect(),
        var_types: vars,
        added_params: Vec::new(),
        replacements: HashMap::new(),
    };
    ssa.seal_ready();
    for &bi in &order {
        for event in &events[bi] {
            match event {
                Event::Load { var, result, .. } => {
                    let value = ssa.read(*var, bi);
                    ssa.replacements.insert(*result, value);
                }
                Event::Store { var, value, .. } => {
                    ssa.current[*var].insert(bi, value.clone());
                }
            }
        }
        ssa.filled[bi] = true;
        ssa.seal_ready();
    }

    ssa.remove_trivial_params();
    let replacements = ssa.replacements;

    // Physical rewrite: drop promoted memory traffic and substitute the
    // reaching values everywhere.
    for (bi, block) in f.blocks.iter_mut().enumerate() {
        let mut keep = Vec::with_capacity(block.instructions.len());
        for (ii, instr) in block.instructions.drain(..).enumerate() {
            if !doomed[bi].contains(&ii) {
                keep.push(instr);
            }
        }
        block.instructions = keep;
        for instr in &mut block.instructions {
            for v in instr
                .operands
                .iter_mut()
                .chain(instr.br_args.iter_mut().flatten())
            {
                resolve_into(&replacements, v);
            }
        }
    }

    stats
}

/// Promotable variable discovery: alloca of one primitive slot whose only
/// uses are direct load/store addresses with a consistent element type.
fn find_promotable(f: &Function) -> (Vec<Type>, HashMap<TempId, usize>) {
    #[derive(Default)]
    struct Candidate {
        size: u64,
        elem: Option<Type>,
        escaped: bool,
    }
    let mut candidates: HashMap<TempId, Candidate> = HashMap::new();
    for block in &f.blocks {
        for instr in &block.instructions {
            if instr.op == Opcode::Alloca {
                let size = instr.operands.first().and_then(|v| v.as_const_int());
                if let (Some(result), Some(size)) = (instr.result, size) {
                    if matches!(size, 1 | 2 | 4 | 8) {
                        candidates.insert(
                            result,
                            Candidate {
                                size: size as u64,
                                ..Default::default()
                            },
                        );
                    }
                }
            }
        }
    }
    if candidates.is_empty() {
        return (Vec::new(), HashMap::new());
    }

    for block in &f.blocks {
        for instr in &block.instructions {
            let direct_addr = matches!(instr.op, Opcode::Load | Opcode::Store);
            for (idx, v) in instr.all_operands().enumerate() {
                let Value::Temp(id) = v else { continue };
                let Some(c) = candidates.get_mut(id) else {
                    continue;
                };
                if direct_addr && idx == 0 {
                    let elem = instr.ty;
                    let promotable_elem = matches!(
                        elem,
                        Type::I1 | Type::I16 | Type::I32 | Type::I64 | Type::F64
                    );
                    if !promotable_elem
                        || elem.slot_size() != Some(c.size)
                        || c.elem.is_some_and(|prev| prev != elem)
                    {
                        c.escaped = true;
                    } else {
                        c.elem = Some(elem);
                    }
                } else {
                    c.escaped = true;
                }
            }
        }
    }

    let mut vars = Vec::new();
    let mut var_of = HashMap::new();
    // Deterministic var numbering: first-use order over the blocks.
    for block in &f.blocks {
        for instr in &block.instructions {
            if instr.op != Opcode::Alloca {
                continue;
            }
            let Some(result) = instr.result else { continue };
            let Some(c) = candidates.get(&result) else {
                continue;
            };
            if c.escaped {
                continue;
            }
            var_of.insert(result, vars.len());
            // A dead alloca has no loads or stores; its slot type is moot.
            vars.push(c.elem.unwrap_or(Type::I64));
        }
    }
    (vars, var_of)
}

fn addressed_var(var_of: &HashMap<TempId, usize>, instr: &Instr) -> Option<usize> {
    match instr.operands.first() {
        Some(Value::Temp(id)) => var_of.get(id).copied(),
        _ => None,
    }
}

struct SsaBuilder<'f> {
    f: &'f mut Function,
    preds: Vec<Vec<usize>>,
    sealed: Vec<bool>,
    filled: Vec<bool>,
    /// Reaching definition per variable per block.
    current: Vec<HashMap<usize, Value>>,
    /// Parameters created while the block was unsealed.
    incomplete: Vec<Vec<(usize, TempId)>>,
    var_types: Vec<Type>,
    added_params: Vec<(usize, TempId)>,
    replacements: HashMap<TempId, Value>,
}

impl SsaBuilder<'_> {
    fn read(&mut self, var: usize, block: usize) -> Value {
        if let Some(v) = self.current[var].get(&block) {
            return v.clone();
        }
        let value = if !self.sealed[block] {
            let id = self.new_param(block, var);
            self.incomplete[block].push((var, id));
            Value::Temp(id)
        } else if self.preds[block].is_empty() {
            // Reading before any store: a deterministic zero value.
            default_value(self.var_types[var])
        } else if self.preds[block].len() == 1 {
            let p = self.preds[block][0];
            self.read(var, p)
        } else {
            let id = self.new_param(block, var);
            self.current[var].insert(block, Value::Temp(id));
            self.add_param_args(block, id, var);
            Value::Temp(id)
        };
        self.current[var].insert(block, value.clone());
        value
    }

    fn new_param(&mut self, block: usize, var: usize) -> TempId {
        let id = self.f.reserve_temp();
        let ty = self.var_types[var];
        self.f.blocks[block].params.push(Param {
            name: format!("t{id}"),
            ty,
            id,
        });
        self.added_params.push((block, id));
        id
    }

    /// Feed a freshly created parameter from every predecessor edge.
    fn add_param_args(&mut self, block: usize, _id: TempId, var: usize) {
        let label = self.f.blocks[block].label.clone();
        for p in self.preds[block].clone() {
            let arg = self.read(var, p);
            let term = self.f.blocks[p]
                .instructions
                .last_mut()
                .expect("predecessor has a terminator");
            let edges: Vec<usize> = term
                .labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == label)
                .map(|(i, _)| i)
                .collect();
            for i in edges {
                term.br_args[i].push(arg.clone());
            }
        }
    }

    /// Seal every block whose predecessors are all filled, completing its
    /// pending parameters.
    fn seal_ready(&mut self) {
        loop {
            let mut progressed = false;
            for b in 0..self.sealed.len() {
                if self.sealed[b] || !self.preds[b].iter().all(|&p| self.filled[p]) {
                    continue;
                }
                self.sealed[b] = true;
                for (var, id) in std::mem::take(&mut self.incomplete[b]) {
                    self.add_param_args(b, id, var);
                }
                progressed = true;
            }
            if !progressed {
                return;
            }
        }
    }

    /// Elide parameters whose incoming values all agree, iterating to a
    /// fixed point so chains of trivial parameters collapse.
    fn remove_trivial_params(&mut self) {
        loop {
            let mut changed = false;
            for (block, id) in self.added_params.clone() {
                if self.replacements.contains_key(&id) {
                    continue;
                }
                let Some(pos) = self.f.blocks[block].params.iter().position(|p| p.id == id)
                else {
                    continue;
                };
                let label = self.f.blocks[block].label.clone();
                let mut unique: Option<Value> = None;
                let mut trivial = true;
                for &p in &self.preds[block] {
                    let term = self.f.blocks[p]
                        .instructions
                        .last()
                        .expect("predecessor has a terminator");
                    for (i, l) in term.labels.iter().enumerate() {
                        if *l != label {
                            continue;
                        }
                        let mut arg = term.br_args[i][pos].clone();
                        resolve_into(&self.replacements, &mut arg);
                        if arg == Value::Temp(id) {
                            continue;
                        }
                        match &unique {
                            None => unique = Some(arg),
                            Some(v) if *v == arg => {}
                            Some(_) => {
                                trivial = false;
                            }
                        }
                    }
                }
                let Some(value) = unique else { continue };
                if !trivial {
                    continue;
                }
                self.replacements.insert(id, value);
                self.f.blocks[block].params.remove(pos);
                for p in self.preds[block].clone() {
                    let term = self.f.blocks[p]
                        .instructions
                        .last_mut()
                        .expect("predecessor has a terminator");
                    let edges: Vec<usize> = term
                        .labels
                        .iter()
                        .enumerate()
                        .filter(|(_, l)| **l == label)
                        .map(|(i, _)| i)
                        .collect();
                    for i in edges {
                        term.br_args[i].remove(pos);
                    }
                }
                changed = true;
            }
            if !changed {
                return;
            }
        }
    }
}

fn default_value(ty: Type) -> Value {
    match ty {
        Type::F64 => Value::ConstFloat(0.0),
        _ => Value::ConstInt(0),
    }
}

/// Chase a temp through the replacement map to its final value.
fn resolve_into(replacements: &HashMap<TempId, Value>, v: &mut Value) {
    let mut hops = 0;
    while let Value::Temp(id) = v {
        match replacements.get(id) {
            Some(next) => {
                *v = next.clone();
                hops += 1;
                debug_assert!(hops <= replacements.len() + 1, "replacement cycle");
            }
            None => return,
        }
    }
}
