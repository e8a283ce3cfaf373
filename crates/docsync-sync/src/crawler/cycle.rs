//! Execution order for the moves found by one crawl.
//!
//! A move `i` depends on move `j` when `i` targets the path `j` currently
//! occupies: `j` has to get out of the way first. Strongly connected
//! components of that graph are emitted in reverse topological order, so
//! every dependency is scheduled before its dependents. Components with
//! more than one member are cycles (`a -> b, b -> a`) and need a staging
//! name to break.

use std::collections::HashMap;
use std::path::PathBuf;

/// One move: the object at `current` goes to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveNode<K> {
    pub key: K,
    pub current: PathBuf,
    pub target: PathBuf,
}

/// Order in which moves can be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan<K> {
    /// Every key, dependencies first.
    pub order: Vec<K>,
    /// Groups of keys that move into each other's place.
    pub cycles: Vec<Vec<K>>,
}

struct Tarjan<'a> {
    edges: &'a [Vec<usize>],
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn new(edges: &'a [Vec<usize>]) -> Self {
        let n = edges.len();
        Self {
            edges,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            components: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<usize>> {
        for v in 0..self.edges.len() {
            if self.index[v].is_none() {
                self.connect(v);
            }
        }
        self.components
    }

    fn connect(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.lowlink[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        for &w in &self.edges[v] {
            match self.index[w] {
                None => {
                    self.connect(w);
                    self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                }
                Some(index) if self.on_stack[w] => {
                    self.lowlink[v] = self.lowlink[v].min(index);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlink[v]) == self.index[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            component.reverse();
            self.components.push(component);
        }
    }
}

/// Order `moves` so that no move lands on a path still occupied by a
/// pending one, except inside the reported cycles.
pub fn plan_moves<K: Clone>(moves: &[MoveNode<K>]) -> MovePlan<K> {
    let mut occupants: HashMap<&PathBuf, Vec<usize>> = HashMap::new();
    for (i, node) in moves.iter().enumerate() {
        occupants.entry(&node.current).or_default().push(i);
    }
    let edges: Vec<Vec<usize>> = moves
        .iter()
        .enumerate()
        .map(|(i, node)| {
            occupants
                .get(&node.target)
                .map(|js| js.iter().copied().filter(|&j| j != i).collect())
                .unwrap_or_default()
        })
        .collect();

    let components = Tarjan::new(&edges).run();
    let order = components
        .iter()
        .flatten()
        .map(|&i| moves[i].key.clone())
        .collect();
    let cycles = components
        .iter()
        .filter(|c| c.len() > 1)
        .map(|c| c.iter().map(|&i| moves[i].key.clone()).collect())
        .collect();
    MovePlan { order, cycles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mv(key: u32, current: &str, target: &str) -> MoveNode<u32> {
        MoveNode {
            key,
            current: PathBuf::from(current),
            target: PathBuf::from(target),
        }
    }

    fn position(plan: &MovePlan<u32>, key: u32) -> usize {
        plan.order.iter().position(|k| *k == key).unwrap()
    }

    #[test]
    fn test_chain_runs_tail_first() {
        // 1 takes b's place, 2 takes c's place, 3 goes somewhere free.
        let plan = plan_moves(&[mv(1, "a", "b"), mv(2, "b", "c"), mv(3, "c", "d")]);
        assert_eq!(plan.order, vec![3, 2, 1]);
        assert!(plan.cycles.is_empty());
    }

    #[test]
    fn test_swap_is_a_cycle() {
        let plan = plan_moves(&[mv(1, "a", "b"), mv(2, "b", "a"), mv(3, "x", "y")]);
        assert_eq!(plan.order.len(), 3);
        assert_eq!(plan.cycles.len(), 1);
        let mut cycle = plan.cycles[0].clone();
        cycle.sort();
        assert_eq!(cycle, vec![1, 2]);
    }

    #[test]
    fn test_rotation_with_tail() {
        // 4 waits on the rotation a -> b -> c -> a.
        let plan = plan_moves(&[
            mv(4, "z", "a"),
            mv(1, "a", "b"),
            mv(2, "b", "c"),
            mv(3, "c", "a"),
        ]);
        assert_eq!(plan.cycles.len(), 1);
        assert_eq!(plan.cycles[0].len(), 3);
        assert!(position(&plan, 4) > position(&plan, 1));
    }

    #[test]
    fn test_empty() {
        let plan = plan_moves::<u32>(&[]);
        assert!(plan.order.is_empty());
        assert!(plan.cycles.is_empty());
    }

    proptest! {
        #[test]
        fn prop_dependencies_come_first(targets in proptest::collection::vec(0u8..12, 0..12)) {
            // Move i sits at "p{i}" and goes to "p{target}".
            let moves: Vec<MoveNode<usize>> = targets
                .iter()
                .enumerate()
                .map(|(i, t)| MoveNode {
                    key: i,
                    current: PathBuf::from(format!("p{}", i)),
                    target: PathBuf::from(format!("p{}", t)),
                })
                .collect();
            let plan = plan_moves(&moves);

            let mut seen = plan.order.clone();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..moves.len()).collect::<Vec<_>>());

            let cyclic: std::collections::HashSet<usize> = plan.cycles.iter().flatten().copied().collect();
            let at = |k: usize| plan.order.iter().position(|x| *x == k).unwrap();
            for (i, node) in moves.iter().enumerate() {
                let j = targets[i] as usize;
                if j < moves.len() && j != i && !(cyclic.contains(&i) && cyclic.contains(&j)) {
                    prop_assert!(at(j) < at(i), "move {} must wait for {}", i, node.target.display());
                }
            }
        }
    }
}
