//! Natural loop discovery
//!
//! For every CFG edge `tail -> head` where `head` dominates `tail`, the
//! head is a loop header. The loop body is every block that reaches a
//! latch without passing through the header. Loops with the same header
//! are merged; nesting forms a forest by body containment.

use crate::analysis::cfg::FuncCfg;
use crate::analysis::dominators::DomTree;
use std::collections::HashSet;

/// One natural loop. Block references are indices into the function's
/// block list; lifetimes are bounded by the analysed function.
#[derive(Debug, Clone)]
pub struct Loop {
    pub header: usize,
    /// Blocks in the loop, header included.
    pub blocks: Vec<usize>,
    /// Sources of back-edges into the header.
    pub latches: Vec<usize>,
    /// Edges `(from, to)` leaving the loop body.
    pub exits: Vec<(usize, usize)>,
    /// Index of the immediately enclosing loop, when nested.
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Loop {
    pub fn contains(&self, block: usize) -> bool {
        self.blocks.contains(&block)
    }
}

/// The loop forest of one function.
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    pub loops: Vec<Loop>,
    /// Innermost loop per block, when any.
    innermost: Vec<Option<usize>>,
}

impl LoopInfo {
    pub fn compute(cfg: &FuncCfg, dom: &DomTree) -> LoopInfo {
        let n = cfg.block_count();

        // Collect back-edges grouped by header.
        let mut headers: Vec<usize> = Vec::new();
        let mut latches_by_header: Vec<Vec<usize>> = Vec::new();
        for tail in 0..n {
            for &head in &cfg.successors[tail] {
                if dom.dominates(head, tail) {
                    match headers.iter().position(|&h| h == head) {
                        Some(i) => latches_by_header[i].push(tail),
                        None => {
                            headers.push(head);
                            latches_by_header.push(vec![tail]);
                        }
                    }
                }
            }
        }

        let mut loops: Vec<Loop> = Vec::new();
        for (header, latches) in headers.into_iter().zip(latches_by_header) {
            let mut body: HashSet<usize> = HashSet::new();
            body.insert(header);
            let mut stack: Vec<usize> = Vec::new();
            for &latch in &latches {
                if body.insert(latch) {
                    stack.push(latch);
                }
            }
            // Walk predecessors backwards from the latches, never crossing
            // the header.
            while let Some(block) = stack.pop() {
                for &pred in &cfg.predecessors[block] {
                    if body.insert(pred) {
                        stack.push(pred);
                    }
                }
            }
            let mut blocks: Vec<usize> = body.iter().copied().collect();
            blocks.sort_unstable();
            let mut exits = Vec::new();
            for &block in &blocks {
                for &succ in &cfg.successors[block] {
                    if !body.contains(&succ) {
                        exits.push((block, succ));
                    }
                }
            }
            loops.push(Loop {
                header,
                blocks,
                latches,
                exits,
                parent: None,
                children: Vec::new(),
            });
        }

        // Nesting: the parent of a loop is the smallest other loop that
        // contains its header and is strictly larger.
        for i in 0..loops.len() {
            let mut best: Option<usize> = None;
            for j in 0..loops.len() {
                if i == j {
                    continue;
                }
                if loops[j].contains(loops[i].header) && loops[j].blocks.len() > loops[i].blocks.len()
                {
                    let better = match best {
                        Some(b) => loops[j].blocks.len() < loops[b].blocks.len(),
                        None => true,
                    };
                    if better {
                        best = Some(j);
                    }
                }
            }
            loops[i].parent = best;
            if let Some(parent) = best {
                loops[parent].children.push(i);
            }
        }

        // Innermost loop per block: the smallest loop containing it.
        let mut innermost: Vec<Option<usize>> = vec![None; n];
        for (i, lp) in loops.iter().enumerate() {
            for &block in &lp.blocks {
                let better = match innermost[block] {
                    Some(cur) => lp.blocks.len() < loops[cur].blocks.len(),
                    None => true,
                };
                if better {
                    innermost[block] = Some(i);
                }
            }
        }

        LoopInfo { loops, innermost }
    }

    /// Innermost loop containing a block, when any.
    pub fn loop_for(&self, block: usize) -> Option<&Loop> {
        self.innermost
            .get(block)
            .copied()
            .flatten()
            .map(|i| &self.loops[i])
    }

    /// Loops with no enclosing parent.
    pub fn top_level(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter().filter(|l| l.parent.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_module;

    fn analyse(text: &str) -> (LoopInfo, FuncCfg) {
        let module = parse_module(text).unwrap();
        let cfg = FuncCfg::build(&module.functions[0]);
        let dom = DomTree::compute(&cfg);
        (LoopInfo::compute(&cfg, &dom), cfg)
    }

    #[test]
    fn test_single_loop() {
        let (info, cfg) = analyse(
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
        assert_eq!(info.loops.len(), 1);
        let lp = &info.loops[0];
        let head = cfg.index_of("head").unwrap();
        let body = cfg.index_of("body").unwrap();
        let done = cfg.index_of("done").unwrap();
        assert_eq!(lp.header, head);
        assert!(lp.contains(head) && lp.contains(body));
        assert!(!lp.contains(done));
        assert_eq!(lp.latches, vec![body]);
        assert_eq!(lp.exits, vec![(head, done)]);
        assert!(info.loop_for(done).is_none());
        assert_eq!(info.loop_for(body).unwrap().header, head);
    }

    #[test]
    fn test_nested_loops() {
        let (info, cfg) = analyse(
            "il 0.2.0\n\
             func @f() -> i64 {\n\
             entry:\n\
             \x20 br outer(0)\n\
             outer(%i: i64):\n\
             \x20 %oc = scmp.lt %i, 3\n\
             \x20 cbr %oc, inner_pre, done\n\
             inner_pre:\n\
             \x20 br inner(0)\n\
             inner(%j: i64):\n\
             \x20 %ic = scmp.lt %j, 3\n\
             \x20 cbr %ic, inner_body, outer_latch\n\
             inner_body:\n\
             \x20 %nj = add %j, 1\n\
             \x20 br inner(%nj)\n\
             outer_latch:\n\
             \x20 %ni = add %i, 1\n\
             \x20 br outer(%ni)\n\
             done:\n\
             \x20 ret %i\n\
             }\n",
        );
        assert_eq!(info.loops.len(), 2);
        let outer_hdr = cfg.index_of("outer").unwrap();
        let inner_hdr = cfg.index_of("inner").unwrap();
        let inner = info.loop_for(cfg.index_of("inner_body").unwrap()).unwrap();
        assert_eq!(inner.header, inner_hdr);
        let outer_idx = inner.parent.expect("inner loop must be nested");
        assert_eq!(info.loops[outer_idx].header, outer_hdr);
        assert_eq!(info.top_level().count(), 1);
    }

    #[test]
    fn test_header_dominates_body_blocks() {
        let (info, cfg) = analyse(
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
        let dom = DomTree::compute(&cfg);
        for lp in &info.loops {
            for &block in &lp.blocks {
                assert!(dom.dominates(lp.header, block));
            }
        }
    }
}
