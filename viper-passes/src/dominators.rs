//! Dominator tree construction.
//!
//! Cooper–Harvey–Kennedy iterative dominators over reverse post-order,
//! using the post-index `intersect` walk. Unreachable blocks have no
//! immediate dominator.

use crate::Cfg;

/// Immediate-dominator tree for one function's CFG.
#[derive(Debug)]
pub struct DominatorTree {
    idom: Vec<Option<usize>>,
}

impl DominatorTree {
    /// Compute dominators for `cfg`.
    pub fn new(cfg: &Cfg) -> Self {
        let n = cfg.len();
        let mut idom: Vec<Option<usize>> = vec![None; n];
        if n == 0 {
            return DominatorTree { idom };
        }
        idom[0] = Some(0);

        let rpo = cfg.reverse_post_order();
        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom = None;
                for &p in cfg.preds(b) {
                    if idom[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, cfg, p, cur),
                    });
                }
                if new_idom.is_some() && idom[b] != new_idom {
                    idom[b] = new_idom;
                    changed = true;
                }
            }
        }

        DominatorTree { idom }
    }

    /// Immediate dominator of `block`; `None` for the entry and for
    /// unreachable blocks.
    pub fn idom(&self, block: usize) -> Option<usize> {
        if block == 0 {
            return None;
        }
        self.idom[block]
    }

    /// Does `a` dominate `b`? Every reachable block dominates itself.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if self.idom[b].is_none() {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom[cur] {
                Some(next) if next != cur => cur = next,
                _ => return false,
            }
        }
    }
}

fn intersect(idom: &[Option<usize>], cfg: &Cfg, a: usize, b: usize) -> usize {
    let mut a = a;
    let mut b = b;
    while a != b {
        let pa = cfg.post_index(a).expect("processed block is reachable");
        let pb = cfg.post_index(b).expect("processed block is reachable");
        if pa < pb {
            a = idom[a].expect("walked block has idom");
        } else {
            b = idom[b].expect("walked block has idom");
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::text::parse_module;

    #[test]
    fn diamond_dominance() {
        let m = parse_module(
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
        .unwrap();
        let cfg = Cfg::new(&m.functions[0]);
        let dom = DominatorTree::new(&cfg);
        assert_eq!(dom.idom(0), None);
        assert_eq!(dom.idom(1), Some(0));
        assert_eq!(dom.idom(2), Some(0));
        // The join is dominated by the entry, not by either arm.
        assert_eq!(dom.idom(3), Some(0));
        assert!(dom.dominates(0, 3));
        assert!(!dom.dominates(1, 3));
        assert!(dom.dominates(3, 3));
    }

    #[test]
    fn loop_header_dominates_latch() {
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
        assert!(dom.dominates(1, 2));
        assert!(dom.dominates(1, 3));
        assert_eq!(dom.idom(2), Some(1));
    }

    #[test]
    fn unreachable_block_has_no_idom() {
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
        let dom = DominatorTree::new(&cfg);
        assert_eq!(dom.idom(1), None);
        assert!(!dom.dominates(0, 1));
    }
}
