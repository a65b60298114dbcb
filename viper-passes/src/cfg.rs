//! Control-flow graph over the blocks of one function.

use std::collections::HashMap;

use viper_il::Function;

/// Predecessor/successor lists and DFS post-order for one function.
///
/// Blocks are addressed by their index within the function so the graph
/// stays valid while a pass rewrites instructions in place. Terminator
/// labels that do not name a block are skipped here; resolving them is the
/// verifier's job.
#[derive(Debug)]
pub struct Cfg {
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    post_order: Vec<usize>,
    post_index: Vec<Option<usize>>,
}

impl Cfg {
    /// Build the CFG of `f`.
    pub fn new(f: &Function) -> Self {
        let n = f.blocks.len();
        let label_to_index: HashMap<&str, usize> = f
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.label.as_str(), i))
            .collect();

        let mut preds = vec![Vec::new(); n];
        let mut succs = vec![Vec::new(); n];
        for (i, block) in f.blocks.iter().enumerate() {
            let Some(term) = block.terminator() else {
                continue;
            };
            for label in &term.labels {
                if let Some(&j) = label_to_index.get(label.as_str()) {
                    succs[i].push(j);
                    preds[j].push(i);
                }
            }
        }

        // Iterative DFS from the entry, emitting post-order.
        let mut post_order = Vec::with_capacity(n);
        let mut post_index = vec![None; n];
        if n > 0 {
            let mut visited = vec![false; n];
            let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
            visited[0] = true;
            while let Some((block, child)) = stack.pop() {
                if child < succs[block].len() {
                    stack.push((block, child + 1));
                    let next = succs[block][child];
                    if !visited[next] {
                        visited[next] = true;
                        stack.push((next, 0));
                    }
                } else {
                    post_index[block] = Some(post_order.len());
                    post_order.push(block);
                }
            }
        }

        Cfg {
            preds,
            succs,
            post_order,
            post_index,
        }
    }

    /// Predecessors of a block, in discovery order.
    pub fn preds(&self, block: usize) -> &[usize] {
        &self.preds[block]
    }

    /// Successors of a block, in terminator label order.
    pub fn succs(&self, block: usize) -> &[usize] {
        &self.succs[block]
    }

    /// Blocks in DFS post-order; the entry is last.
    pub fn post_order(&self) -> &[usize] {
        &self.post_order
    }

    /// Reverse post-order, entry first.
    pub fn reverse_post_order(&self) -> Vec<usize> {
        self.post_order.iter().rev().copied().collect()
    }

    /// 0-based post-order position; `None` for blocks unreachable from the
    /// entry.
    pub fn post_index(&self, block: usize) -> Option<usize> {
        self.post_index[block]
    }

    /// True when the block is reachable from the entry.
    pub fn is_reachable(&self, block: usize) -> bool {
        self.post_index[block].is_some()
    }

    /// Number of blocks the graph was built over.
    pub fn len(&self) -> usize {
        self.preds.len()
    }

    /// True for a function with no blocks.
    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::text::parse_module;

    fn diamond() -> viper_il::Module {
        parse_module(
            "il 0.1\n\
             func @f(%c: i1) -> i64 {\n\
             entry:\n\
               cbr %c, left, right\n\
             left:\n\
               br join(1)\n\
             right:\n\
               br join(2)\n\
             join(%v: i64):\n\
               ret %v\n\
             }\n",
        )
        .unwrap()
    }

    #[test]
    fn preds_and_succs() {
        let m = diamond();
        let cfg = Cfg::new(&m.functions[0]);
        assert_eq!(cfg.succs(0), &[1, 2]);
        assert_eq!(cfg.preds(3), &[1, 2]);
        assert_eq!(cfg.preds(0), &[] as &[usize]);
    }

    #[test]
    fn entry_has_highest_post_index() {
        let m = diamond();
        let cfg = Cfg::new(&m.functions[0]);
        assert_eq!(cfg.post_index(0), Some(cfg.post_order().len() - 1));
        assert_eq!(cfg.reverse_post_order()[0], 0);
    }

    #[test]
    fn unreachable_blocks_have_no_post_index() {
        let m = parse_module(
            "il 0.1\n\
             func @f() -> void {\n\
             entry:\n\
               ret\n\
             island:\n\
               ret\n\
             }\n",
        )
        .unwrap();
        let cfg = Cfg::new(&m.functions[0]);
        assert!(!cfg.is_reachable(1));
        assert_eq!(cfg.post_index(1), None);
    }
}
