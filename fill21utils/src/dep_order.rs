//!
//! # Dependency-Ordering Trait and Helpers
//!

// Std-lib
use std::collections::HashMap;
use std::hash::Hash;

///
/// # Dependency-Ordering Trait
///
/// Layout libraries, in which cells instantiate other cells, form graphs of dependencies.
/// Their nodes are stored un-ordered, but must occasionally be processed dependencies-first,
/// and their acyclicity must be checked.
///
/// Implementers provide `dependencies`, listing the direct dependencies of a single `Item`,
/// and `cycle`, which creates the error returned on detecting a cycle.
///
/// [DepOrder::order] performs a depth-first traversal with an explicit work-stack,
/// so arbitrarily deep hierarchies never recurse on the call-stack.
/// Each item is marked `Visiting` while its dependencies are open and `Visited` once complete;
/// reaching a `Visiting` item again indicates a cycle.
///
/// ```
/// use fill21utils::DepOrder;
///
/// struct Chain;
/// impl DepOrder for Chain {
///     type Item = u32;
///     type Error = String;
///     fn dependencies(&self, item: &u32) -> Result<Vec<u32>, String> {
///         Ok(if *item > 0 { vec![item - 1] } else { vec![] })
///     }
///     fn cycle(&self, item: &u32) -> String {
///         format!("cycle through {}", item)
///     }
/// }
/// assert_eq!(Chain.order(&[2]).unwrap(), vec![0, 1, 2]);
/// ```
///
pub trait DepOrder {
    /// Item Type. Typically pointers or keys to the nodes in the dependency graph.
    type Item: Clone + Eq + Hash;
    /// Error Type
    type Error;

    /// List the direct dependencies of `item`
    fn dependencies(&self, item: &Self::Item) -> Result<Vec<Self::Item>, Self::Error>;
    /// Create the error reported for a cycle through `item`
    fn cycle(&self, item: &Self::Item) -> Self::Error;

    /// Dependency-order all entries reachable from `roots`.
    /// Dependencies precede their dependents in the returned vector.
    fn order(&self, roots: &[Self::Item]) -> Result<Vec<Self::Item>, Self::Error>
    where
        Self: Sized,
    {
        DepOrderer::new(self).order(roots)
    }
}

/// Traversal state per item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// # Dependency Order Helper
/// Holds the traversal state for [DepOrder::order].
struct DepOrderer<'p, P: DepOrder> {
    /// Item-processor
    p: &'p P,
    /// Marks for all items reached so far
    marks: HashMap<P::Item, Mark>,
    /// Ordered, completed items
    done: Vec<P::Item>,
}
impl<'p, P: DepOrder> DepOrderer<'p, P> {
    fn new(p: &'p P) -> Self {
        Self {
            p,
            marks: HashMap::new(),
            done: Vec::new(),
        }
    }
    fn order(mut self, roots: &[P::Item]) -> Result<Vec<P::Item>, P::Error> {
        for root in roots {
            self.visit(root)?;
        }
        Ok(self.done)
    }
    /// Depth-first visit of `root` and everything it depends upon
    fn visit(&mut self, root: &P::Item) -> Result<(), P::Error> {
        if self.marks.contains_key(root) {
            return Ok(());
        }
        // Each frame holds an item and its not-yet-visited dependencies
        let mut stack: Vec<(P::Item, std::vec::IntoIter<P::Item>)> = Vec::new();
        self.marks.insert(root.clone(), Mark::Visiting);
        stack.push((root.clone(), self.p.dependencies(root)?.into_iter()));

        while let Some((item, deps)) = stack.last_mut() {
            match deps.next() {
                Some(dep) => match self.marks.get(&dep) {
                    Some(Mark::Visited) => continue,
                    Some(Mark::Visiting) => return Err(self.p.cycle(&dep)),
                    None => {
                        self.marks.insert(dep.clone(), Mark::Visiting);
                        let next = self.p.dependencies(&dep)?.into_iter();
                        stack.push((dep, next));
                    }
                },
                None => {
                    let item = item.clone();
                    self.marks.insert(item.clone(), Mark::Visited);
                    self.done.push(item);
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Graph over integer nodes, stored as adjacency lists
    struct Graph(HashMap<u32, Vec<u32>>);
    impl DepOrder for Graph {
        type Item = u32;
        type Error = u32;
        fn dependencies(&self, item: &u32) -> Result<Vec<u32>, u32> {
            Ok(self.0.get(item).cloned().unwrap_or_default())
        }
        fn cycle(&self, item: &u32) -> u32 {
            *item
        }
    }

    #[test]
    fn orders_diamond() {
        let g = Graph(HashMap::from([(0, vec![1, 2]), (1, vec![3]), (2, vec![3])]));
        assert_eq!(g.order(&[0]).unwrap(), vec![3, 1, 2, 0]);
    }

    #[test]
    fn detects_self_reference() {
        let g = Graph(HashMap::from([(0, vec![0])]));
        assert_eq!(g.order(&[0]).unwrap_err(), 0);
    }

    #[test]
    fn detects_longer_cycles() {
        let g = Graph(HashMap::from([(0, vec![1]), (1, vec![2]), (2, vec![0])]));
        assert!(g.order(&[0]).is_err());
        assert!(g.order(&[2]).is_err());
    }

    #[test]
    fn handles_deep_chains() {
        // Deep enough to overflow a recursive traversal
        let n = 200_000u32;
        let g = Graph((1..n).map(|k| (k, vec![k - 1])).collect());
        let order = g.order(&[n - 1]).unwrap();
        assert_eq!(order.len(), n as usize);
        assert_eq!(order[0], 0);
        assert_eq!(order[order.len() - 1], n - 1);
    }
}
