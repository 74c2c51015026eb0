//! Graph traversal over instruction ids.
//!
//! - [`dfs`] - Iterative depth-first search (pre-order)
//! - [`postorder`] - Depth-first search with post-order visitation
//! - [`reverse_postorder`] - Reverse post-order, the worklist priority of forward analyses

use crate::model::InsnId;

/// A graph whose nodes are the instructions `0..node_count()`.
pub trait Successors {
    /// Number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns every node reachable from `node` by a single edge.
    fn successors(&self, node: InsnId) -> impl Iterator<Item = InsnId>;
}

/// Depth-first search iterator over graph nodes.
///
/// Visits each node reachable from the start exactly once, before its descendants.
pub struct DfsIterator<'g, G: Successors> {
    graph: &'g G,
    stack: Vec<InsnId>,
    visited: Vec<bool>,
}

impl<'g, G: Successors> DfsIterator<'g, G> {
    fn new(graph: &'g G, start: InsnId) -> Self {
        let node_count = graph.node_count();
        if start.index() >= node_count {
            return DfsIterator {
                graph,
                stack: Vec::new(),
                visited: Vec::new(),
            };
        }

        let mut visited = vec![false; node_count];
        visited[start.index()] = true;

        DfsIterator {
            graph,
            stack: vec![start],
            visited,
        }
    }
}

impl<G: Successors> Iterator for DfsIterator<'_, G> {
    type Item = InsnId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // Reverse push keeps successors in their original order
        let successors: Vec<InsnId> = self.graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.stack.push(succ);
            }
        }

        Some(node)
    }
}

/// Returns a depth-first search iterator starting from `start`.
///
/// An out-of-range start yields nothing.
pub fn dfs<G: Successors>(graph: &G, start: InsnId) -> DfsIterator<'_, G> {
    DfsIterator::new(graph, start)
}

/// Computes the postorder of the nodes reachable from `start`.
///
/// A node appears after all of its descendants that were first reached through it.
#[allow(clippy::items_after_statements)]
pub fn postorder<G: Successors>(graph: &G, start: InsnId) -> Vec<InsnId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];

    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;
                stack.push((node, State::Exit));

                let successors: Vec<InsnId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited[succ.index()] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => result.push(node),
        }
    }

    result
}

/// Computes the reverse postorder of the nodes reachable from `start`.
///
/// In an acyclic region every node comes before its successors.
pub fn reverse_postorder<G: Successors>(graph: &G, start: InsnId) -> Vec<InsnId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AdjacencyList(Vec<Vec<usize>>);

    impl Successors for AdjacencyList {
        fn node_count(&self) -> usize {
            self.0.len()
        }

        fn successors(&self, node: InsnId) -> impl Iterator<Item = InsnId> {
            self.0[node.index()].iter().map(|&n| InsnId::new(n))
        }
    }

    fn ids(raw: &[usize]) -> Vec<InsnId> {
        raw.iter().map(|&n| InsnId::new(n)).collect()
    }

    #[test]
    fn test_diamond() {
        let graph = AdjacencyList(vec![vec![1, 2], vec![3], vec![3], vec![]]);
        assert_eq!(dfs(&graph, InsnId::new(0)).collect::<Vec<_>>(), ids(&[0, 1, 3, 2]));
        assert_eq!(postorder(&graph, InsnId::new(0)), ids(&[3, 1, 2, 0]));
        assert_eq!(reverse_postorder(&graph, InsnId::new(0)), ids(&[0, 2, 1, 3]));
    }

    #[test]
    fn test_cycle_visits_each_node_once() {
        let graph = AdjacencyList(vec![vec![1], vec![2], vec![0, 3], vec![]]);
        assert_eq!(reverse_postorder(&graph, InsnId::new(0)), ids(&[0, 1, 2, 3]));
        assert_eq!(dfs(&graph, InsnId::new(0)).count(), 4);
    }

    #[test]
    fn test_unreachable_nodes_skipped() {
        let graph = AdjacencyList(vec![vec![], vec![0]]);
        assert_eq!(postorder(&graph, InsnId::new(0)), ids(&[0]));
        assert!(postorder(&graph, InsnId::new(5)).is_empty());
        assert_eq!(dfs(&graph, InsnId::new(5)).count(), 0);
    }
}
