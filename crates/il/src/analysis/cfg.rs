//! Control-flow graph construction and traversal orders
//!
//! Blocks are addressed by their index in `Function::blocks`; index 0 is
//! the entry. Successor lists come from block terminators; predecessor
//! lists are the cached inverse.

use crate::func::Function;
use crate::module::Module;
use std::collections::HashMap;

/// Per-function CFG with eagerly computed edge caches.
#[derive(Debug, Clone)]
pub struct FuncCfg {
    /// Block index -> label.
    pub labels: Vec<String>,
    label_to_index: HashMap<String, usize>,
    pub successors: Vec<Vec<usize>>,
    pub predecessors: Vec<Vec<usize>>,
}

impl FuncCfg {
    pub fn build(function: &Function) -> FuncCfg {
        let n = function.blocks.len();
        let mut label_to_index = HashMap::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for (i, block) in function.blocks.iter().enumerate() {
            label_to_index.insert(block.label.clone(), i);
            labels.push(block.label.clone());
        }
        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        for (i, block) in function.blocks.iter().enumerate() {
            for label in block.successor_labels() {
                if let Some(&j) = label_to_index.get(label) {
                    successors[i].push(j);
                }
            }
        }
        for (i, succs) in successors.iter().enumerate() {
            for &j in succs {
                if !predecessors[j].contains(&i) {
                    predecessors[j].push(i);
                }
            }
        }
        FuncCfg {
            labels,
            label_to_index,
            successors,
            predecessors,
        }
    }

    pub fn block_count(&self) -> usize {
        self.labels.len()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.label_to_index.get(label).copied()
    }

    /// DFS post-order from the entry; the entry block comes last.
    /// Unreachable blocks do not appear.
    pub fn post_order(&self) -> Vec<usize> {
        let n = self.block_count();
        let mut order = Vec::with_capacity(n);
        if n == 0 {
            return order;
        }
        let mut visited = vec![false; n];
        // Iterative DFS: (block, next successor position).
        let mut stack = vec![(0usize, 0usize)];
        visited[0] = true;
        while let Some(&mut (block, ref mut next)) = stack.last_mut() {
            if *next < self.successors[block].len() {
                let succ = self.successors[block][*next];
                *next += 1;
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                order.push(block);
                stack.pop();
            }
        }
        order
    }

    /// Reverse post-order; the entry block comes first.
    pub fn reverse_post_order(&self) -> Vec<usize> {
        let mut order = self.post_order();
        order.reverse();
        order
    }

    /// Blocks reachable from the entry.
    pub fn reachable(&self) -> Vec<bool> {
        let n = self.block_count();
        let mut seen = vec![false; n];
        if n == 0 {
            return seen;
        }
        let mut stack = vec![0usize];
        seen[0] = true;
        while let Some(block) = stack.pop() {
            for &succ in &self.successors[block] {
                if !seen[succ] {
                    seen[succ] = true;
                    stack.push(succ);
                }
            }
        }
        seen
    }

    /// True when the reachable part of the CFG contains no cycle.
    pub fn is_acyclic(&self) -> bool {
        // Colors: 0 unvisited, 1 on stack, 2 done.
        let n = self.block_count();
        if n == 0 {
            return true;
        }
        let mut color = vec![0u8; n];
        let mut stack = vec![(0usize, 0usize)];
        color[0] = 1;
        while let Some(&mut (block, ref mut next)) = stack.last_mut() {
            if *next < self.successors[block].len() {
                let succ = self.successors[block][*next];
                *next += 1;
                match color[succ] {
                    0 => {
                        color[succ] = 1;
                        stack.push((succ, 0));
                    }
                    1 => return false,
                    _ => {}
                }
            } else {
                color[block] = 2;
                stack.pop();
            }
        }
        true
    }

    /// Kahn topological order over the reachable blocks; empty when the
    /// reachable CFG has a cycle.
    pub fn topo_order(&self) -> Vec<usize> {
        if !self.is_acyclic() {
            return Vec::new();
        }
        let reachable = self.reachable();
        let n = self.block_count();
        let mut indegree = vec![0usize; n];
        for (i, succs) in self.successors.iter().enumerate() {
            if !reachable[i] {
                continue;
            }
            for &j in succs {
                indegree[j] += 1;
            }
        }
        let mut queue: Vec<usize> = (0..n).filter(|&i| reachable[i] && indegree[i] == 0).collect();
        let mut order = Vec::new();
        while let Some(block) = queue.pop() {
            order.push(block);
            for &succ in &self.successors[block] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    queue.push(succ);
                }
            }
        }
        order
    }
}

/// Module-wide cache of per-function CFGs.
///
/// Rebuild after any structural mutation of the module.
pub struct CfgContext<'m> {
    pub module: &'m Module,
    funcs: HashMap<String, FuncCfg>,
}

impl<'m> CfgContext<'m> {
    pub fn new(module: &'m Module) -> CfgContext<'m> {
        let mut funcs = HashMap::with_capacity(module.functions.len());
        for function in &module.functions {
            funcs.insert(function.name.clone(), FuncCfg::build(function));
        }
        CfgContext { module, funcs }
    }

    pub fn function(&self, name: &str) -> Option<&FuncCfg> {
        self.funcs.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_module;

    fn diamond() -> Module {
        parse_module(
            "il 0.2.0\n\
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
             }\n",
        )
        .unwrap()
    }

    fn looped() -> Module {
        parse_module(
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
        )
        .unwrap()
    }

    #[test]
    fn test_edges() {
        let module = diamond();
        let cfg = FuncCfg::build(&module.functions[0]);
        assert_eq!(cfg.successors[0], vec![1, 2]);
        assert_eq!(cfg.predecessors[3], vec![1, 2]);
        assert!(cfg.predecessors[0].is_empty());
    }

    #[test]
    fn test_post_order_entry_last() {
        let module = diamond();
        let cfg = FuncCfg::build(&module.functions[0]);
        let po = cfg.post_order();
        assert_eq!(po.len(), 4);
        assert_eq!(*po.last().unwrap(), 0);
        let rpo = cfg.reverse_post_order();
        assert_eq!(rpo[0], 0);
    }

    #[test]
    fn test_post_order_skips_unreachable() {
        let module = parse_module(
            "il 0.2.0\n\
             func @f() -> i64 {\n\
             entry:\n\
             \x20 ret 0\n\
             island:\n\
             \x20 ret 1\n\
             }\n",
        )
        .unwrap();
        let cfg = FuncCfg::build(&module.functions[0]);
        assert_eq!(cfg.post_order(), vec![0]);
        let reachable = cfg.reachable();
        assert!(reachable[0]);
        assert!(!reachable[1]);
    }

    #[test]
    fn test_acyclic_and_topo() {
        let diamond = diamond();
        let cfg = FuncCfg::build(&diamond.functions[0]);
        assert!(cfg.is_acyclic());
        let topo = cfg.topo_order();
        assert_eq!(topo.len(), 4);
        // Every edge goes forward in the order.
        let pos: HashMap<usize, usize> = topo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        for (from, succs) in cfg.successors.iter().enumerate() {
            for &to in succs {
                assert!(pos[&from] < pos[&to]);
            }
        }

        let looped = looped();
        let cfg = FuncCfg::build(&looped.functions[0]);
        assert!(!cfg.is_acyclic());
        assert!(cfg.topo_order().is_empty());
    }

    #[test]
    fn test_context_lookup() {
        let module = diamond();
        let ctx = CfgContext::new(&module);
        assert!(ctx.function("f").is_some());
        assert!(ctx.function("missing").is_none());
    }
}
