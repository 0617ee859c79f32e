//! Dominator tree
//!
//! Iterative Cooper–Harvey–Kennedy over reverse post-order: initialise
//! `idom(entry) = entry`, then re-intersect predecessors until a fixed
//! point. `intersect` walks two fingers up the idom chain using RPO
//! indices as the tie-break.

use crate::analysis::cfg::FuncCfg;

#[derive(Debug, Clone)]
pub struct DomTree {
    /// Immediate dominator per block index. `None` for the entry and for
    /// unreachable blocks.
    idom: Vec<Option<usize>>,
    /// Blocks each block immediately dominates.
    pub children: Vec<Vec<usize>>,
    entry: usize,
}

impl DomTree {
    pub fn compute(cfg: &FuncCfg) -> DomTree {
        let n = cfg.block_count();
        let mut idom: Vec<Option<usize>> = vec![None; n];
        let mut children = vec![Vec::new(); n];
        if n == 0 {
            return DomTree {
                idom,
                children,
                entry: 0,
            };
        }

        let rpo = cfg.reverse_post_order();
        let mut rpo_index = vec![usize::MAX; n];
        for (i, &block) in rpo.iter().enumerate() {
            rpo_index[block] = i;
        }

        let entry = 0usize;
        idom[entry] = Some(entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                // First processed predecessor seeds the intersection.
                let mut new_idom: Option<usize> = None;
                for &pred in &cfg.predecessors[block] {
                    if idom[pred].is_some() {
                        new_idom = Some(pred);
                        break;
                    }
                }
                let Some(mut candidate) = new_idom else {
                    continue;
                };
                for &pred in &cfg.predecessors[block] {
                    if pred != candidate && idom[pred].is_some() {
                        candidate = intersect(pred, candidate, &idom, &rpo_index);
                    }
                }
                if idom[block] != Some(candidate) {
                    idom[block] = Some(candidate);
                    changed = true;
                }
            }
        }

        for (block, &dom) in idom.iter().enumerate() {
            if block != entry
                && let Some(d) = dom
            {
                children[d].push(block);
            }
        }

        DomTree {
            idom,
            children,
            entry,
        }
    }

    /// Immediate dominator, or `None` for the entry and unreachable blocks.
    pub fn immediate_dominator(&self, block: usize) -> Option<usize> {
        match self.idom.get(block).copied().flatten() {
            Some(d) if block != self.entry => Some(d),
            _ => None,
        }
    }

    /// True when the block is reachable from the entry.
    pub fn is_reachable(&self, block: usize) -> bool {
        self.idom.get(block).is_some_and(Option::is_some)
    }

    /// Does `a` dominate `b`? Every block dominates itself.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom[cur] {
                Some(d) if d != cur => cur = d,
                _ => return false,
            }
        }
    }
}

fn intersect(
    mut b1: usize,
    mut b2: usize,
    idom: &[Option<usize>],
    rpo_index: &[usize],
) -> usize {
    while b1 != b2 {
        while rpo_index[b1] > rpo_index[b2] {
            b1 = idom[b1].expect("intersect: finger left the processed set");
        }
        while rpo_index[b2] > rpo_index[b1] {
            b2 = idom[b2].expect("intersect: finger left the processed set");
        }
    }
    b1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_module;

    fn dom_of(text: &str) -> (DomTree, FuncCfg) {
        let module = parse_module(text).unwrap();
        let cfg = FuncCfg::build(&module.functions[0]);
        (DomTree::compute(&cfg), cfg)
    }

    const DIAMOND: &str = "il 0.2.0\n\
        func @f(%x: i64) -> i64 {\n\
        entry(%x: i64):\n\
        \x20 %c = scmp.lt %x, 0\n\
        \x20 cbr %c, neg, pos\n\
        neg:\n\
        \x20 br join(0)\n\
        pos:\n\
        \x20 br join(1)\n\
        join(%r: i64):\n\
        \x20 ret %r\n\
        }\n";

    #[test]
    fn test_diamond_idoms() {
        let (dom, cfg) = dom_of(DIAMOND);
        let entry = cfg.index_of("entry").unwrap();
        let neg = cfg.index_of("neg").unwrap();
        let pos = cfg.index_of("pos").unwrap();
        let join = cfg.index_of("join").unwrap();

        assert_eq!(dom.immediate_dominator(entry), None);
        assert_eq!(dom.immediate_dominator(neg), Some(entry));
        assert_eq!(dom.immediate_dominator(pos), Some(entry));
        // Neither branch dominates the join point; the entry does.
        assert_eq!(dom.immediate_dominator(join), Some(entry));
    }

    #[test]
    fn test_dominates_reflexive_and_entry() {
        let (dom, cfg) = dom_of(DIAMOND);
        for block in 0..cfg.block_count() {
            assert!(dom.dominates(block, block));
            assert!(dom.dominates(0, block));
        }
        let neg = cfg.index_of("neg").unwrap();
        let join = cfg.index_of("join").unwrap();
        assert!(!dom.dominates(neg, join));
        assert!(!dom.dominates(join, neg));
    }

    #[test]
    fn test_loop_header_dominates_body() {
        let (dom, cfg) = dom_of(
            "il 0.2.0\n\
             func @f() -> i64 {\n\
             entry:\n\
             \x20 br head(0)\n\
             head(%i: i64):\n\
             \x20 %c = scmp.lt %i, 10\n\
             \x20 cbr %c, body, done\n\
             body:\n\
             \x20 %n = add %i, 1\n\
             \x20 br head(%n)\n\
             done:\n\
             \x20 ret %i\n\
             }\n",
        );
        let head = cfg.index_of("head").unwrap();
        let body = cfg.index_of("body").unwrap();
        let done = cfg.index_of("done").unwrap();
        assert!(dom.dominates(head, body));
        assert!(dom.dominates(head, done));
        assert!(!dom.dominates(body, head));
    }

    #[test]
    fn test_unreachable_block_has_no_idom() {
        let (dom, cfg) = dom_of(
            "il 0.2.0\n\
             func @f() -> i64 {\n\
             entry:\n\
             \x20 ret 0\n\
             island:\n\
             \x20 ret 1\n\
             }\n",
        );
        let island = cfg.index_of("island").unwrap();
        assert!(!dom.is_reachable(island));
        assert_eq!(dom.immediate_dominator(island), None);
    }
}
