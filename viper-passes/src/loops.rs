//! Natural loop discovery.

use crate::{Cfg, DominatorTree};

/// One natural loop: header, the latches that branch back to it, the body
/// and the blocks the loop can exit to.
#[derive(Debug, PartialEq, Eq)]
pub struct Loop {
    /// Loop header; dominates every block in the loop.
    pub header: usize,
    /// Blocks with a back-edge to the header.
    pub latches: Vec<usize>,
    /// All blocks in the loop, header included, in ascending index order.
    pub blocks: Vec<usize>,
    /// Blocks inside the loop that branch outside it.
    pub exits: Vec<usize>,
    /// Index into [`LoopInfo::loops`] of the innermost enclosing loop.
    pub parent: Option<usize>,
}

/// Loop forest of one function.
#[derive(Debug, Default)]
pub struct LoopInfo {
    /// Discovered loops, ordered by header index.
    pub loops: Vec<Loop>,
}

impl LoopInfo {
    /// Find the natural loops of `cfg`: one loop per header with a
    /// back-edge `u -> h` where `h` dominates `u`; the body is every block
    /// that reaches a latch without leaving `h`-dominated territory.
    pub fn new(cfg: &Cfg, dom: &DominatorTree) -> Self {
        let mut headers: Vec<usize> = Vec::new();
        let mut latches_of = vec![Vec::new(); cfg.len()];
        for u in 0..cfg.len() {
            for &h in cfg.succs(u) {
                if dom.dominates(h, u) {
                    if !headers.contains(&h) {
                        headers.push(h);
                    }
                    latches_of[h].push(u);
                }
            }
        }
        headers.sort_unstable();

        let mut loops = Vec::with_capacity(headers.len());
        for &header in &headers {
            let latches = latches_of[header].clone();
            let mut in_loop = vec![false; cfg.len()];
            in_loop[header] = true;
            let mut stack = latches.clone();
            while let Some(b) = stack.pop() {
                if in_loop[b] || !dom.dominates(header, b) {
                    continue;
                }
                in_loop[b] = true;
                stack.extend(cfg.preds(b).iter().copied());
            }
            let blocks: Vec<usize> = (0..cfg.len()).filter(|&b| in_loop[b]).collect();
            let exits: Vec<usize> = blocks
                .iter()
                .copied()
                .filter(|&b| cfg.succs(b).iter().any(|&s| !in_loop[s]))
                .collect();
            loops.push(Loop {
                header,
                latches,
                blocks,
                exits,
                parent: None,
            });
        }

        // Nesting: the innermost enclosing loop is the smallest other loop
        // whose body contains this header.
        for i in 0..loops.len() {
            let mut parent: Option<usize> = None;
            for j in 0..loops.len() {
                if i == j || !loops[j].blocks.contains(&loops[i].header) {
                    continue;
                }
                parent = match parent {
                    Some(p) if loops[p].blocks.len() <= loops[j].blocks.len() => Some(p),
                    _ => Some(j),
                };
            }
            loops[i].parent = parent;
        }

        LoopInfo { loops }
    }

    /// The innermost loop containing `block`, if any.
    pub fn innermost(&self, block: usize) -> Option<&Loop> {
        self.loops
            .iter()
            .filter(|l| l.blocks.contains(&block))
            .min_by_key(|l| l.blocks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::text::parse_module;

    #[test]
    fn simple_counted_loop() {
        let m = parse_module(
            "il 0.1\n\
             func @f(%n: i64) -> void {\n\
             entry:\n\
               br head(0)\n\
             head(%i: i64):\n\
               %c = scmp_lt %i, %n\n\
               cbr %c, body, exit\n\
             body:\n\
               %j = add %i, 1\n\
               br head(%j)\n\
             exit:\n\
               ret\n\
             }\n",
        )
        .unwrap();
        let cfg = Cfg::new(&m.functions[0]);
        let dom = DominatorTree::new(&cfg);
        let li = LoopInfo::new(&cfg, &dom);
        assert_eq!(li.loops.len(), 1);
        let l = &li.loops[0];
        assert_eq!(l.header, 1);
        assert_eq!(l.latches, vec![2]);
        assert_eq!(l.blocks, vec![1, 2]);
        assert_eq!(l.exits, vec![1]);
        assert_eq!(l.parent, None);
    }

    #[test]
    fn nested_loops() {
        let m = parse_module(
            "il 0.1\n\
             func @f(%n: i64) -> void {\n\
             entry:\n\
               br outer(0)\n\
             outer(%i: i64):\n\
               %c0 = scmp_lt %i, %n\n\
               cbr %c0, inner_head(0), exit\n\
             inner_head(%j: i64):\n\
               %c1 = scmp_lt %j, %n\n\
               cbr %c1, inner_body, outer_latch\n\
             inner_body:\n\
               %j2 = add %j, 1\n\
               br inner_head(%j2)\n\
             outer_latch:\n\
               %i2 = add %i, 1\n\
               br outer(%i2)\n\
             exit:\n\
               ret\n\
             }\n",
        )
        .unwrap();
        let cfg = Cfg::new(&m.functions[0]);
        let dom = DominatorTree::new(&cfg);
        let li = LoopInfo::new(&cfg, &dom);
        assert_eq!(li.loops.len(), 2);
        let outer = &li.loops[0];
        let inner = &li.loops[1];
        assert_eq!(outer.header, 1);
        assert_eq!(inner.header, 2);
        assert_eq!(inner.parent, Some(0));
        assert_eq!(outer.parent, None);
        assert!(outer.blocks.contains(&inner.header));
        assert_eq!(li.innermost(3).unwrap().header, 2);
    }

    #[test]
    fn straight_line_code_has_no_loops() {
        let m = parse_module(
            "il 0.1\n\
             func @f() -> void {\n\
             entry:\n\
               ret\n\
             }\n",
        )
        .unwrap();
        let cfg = Cfg::new(&m.functions[0]);
        let dom = DominatorTree::new(&cfg);
        assert!(LoopInfo::new(&cfg, &dom).loops.is_empty());
    }
}
