//! Dependency graph over field keys.
//!
//! Tracks which fields filter which option lists. An edge `A → B` means
//! "B's option list is filtered by A's value" (A is a parent of B), so a
//! change to A must reload B.
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** if A ∈ parents[B] then B ∈ children[A],
//!    and vice versa.
//! 2. **No dangling entries:** empty sets are removed, not stored.
//! 3. **No cycles:** `add_edges` refuses an edge set that would close a loop.
//! 4. **Atomic updates:** `replace_edges` is the only mutator that touches
//!    both maps.

use rustc_hash::{FxHashMap, FxHashSet};

use planbook_core::FieldKey;

/// Error raised when an edge set would make the graph cyclic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Fields participating in (or closing) the cycle.
    pub fields: Vec<FieldKey>,
    /// Human-readable description.
    pub message: String,
}

impl CycleError {
    /// A field that would filter itself.
    pub fn self_reference(field: FieldKey) -> Self {
        Self {
            message: format!("field {} depends on itself", field),
            fields: vec![field],
        }
    }

    /// A multi-field loop.
    pub fn cycle(fields: Vec<FieldKey>) -> Self {
        let names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
        Self {
            message: format!("dependency cycle: {}", names.join(" -> ")),
            fields,
        }
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleError {}

/// Static dependency graph for a field schema.
///
/// Maintains bidirectional adjacency for O(1) lookups:
/// - `parents[B]` = fields whose values filter B's option list
/// - `children[A]` = fields whose option lists A's value filters
#[derive(Default, Debug, Clone)]
pub struct DependencyGraph {
    parents: FxHashMap<FieldKey, FxHashSet<FieldKey>>,
    children: FxHashMap<FieldKey, FxHashSet<FieldKey>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields whose values filter `field`'s option list (direct parents).
    pub fn parents<'a>(&'a self, field: &FieldKey) -> impl Iterator<Item = &'a FieldKey> + 'a {
        self.parents.get(field).into_iter().flat_map(|s| s.iter())
    }

    /// Fields directly filtered by `field` (direct children).
    pub fn children<'a>(&'a self, field: &FieldKey) -> impl Iterator<Item = &'a FieldKey> + 'a {
        self.children.get(field).into_iter().flat_map(|s| s.iter())
    }

    /// True if the field has at least one parent.
    pub fn has_parents(&self, field: &FieldKey) -> bool {
        self.parents.contains_key(field)
    }

    /// Number of fields with at least one parent.
    pub fn dependent_field_count(&self) -> usize {
        self.parents.len()
    }

    /// Add edges from each of `new_parents` to `field`, checking for cycles.
    ///
    /// Parents accumulate across calls; pass every parent in one call or
    /// several, the graph ends up the same.
    pub fn add_edges(&mut self, field: &FieldKey, new_parents: &[FieldKey]) -> Result<(), CycleError> {
        if let Some(err) = self.would_create_cycle(field, new_parents) {
            return Err(err);
        }

        let mut merged: FxHashSet<FieldKey> = self
            .parents
            .get(field)
            .cloned()
            .unwrap_or_default();
        merged.extend(new_parents.iter().cloned());
        self.replace_edges(field.clone(), merged);
        Ok(())
    }

    /// Replace all parent edges for a field atomically.
    ///
    /// 1. Removes the field from all its old parents' child sets
    /// 2. Clears the field's parent set
    /// 3. Adds the field to all new parents' child sets
    /// 4. Stores the new parent set
    ///
    /// Pass an empty set to detach the field entirely.
    pub fn replace_edges(&mut self, field: FieldKey, new_parents: FxHashSet<FieldKey>) {
        if let Some(old_parents) = self.parents.remove(&field) {
            for parent in old_parents {
                if let Some(kids) = self.children.get_mut(&parent) {
                    kids.remove(&field);
                    if kids.is_empty() {
                        self.children.remove(&parent);
                    }
                }
            }
        }

        if new_parents.is_empty() {
            return;
        }

        for parent in &new_parents {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(field.clone());
        }

        self.parents.insert(field, new_parents);
    }

    /// Check whether edges `new_parents → field` would close a cycle.
    ///
    /// Does not modify the graph. A cycle appears iff `field` can already
    /// reach one of `new_parents` by following child edges.
    pub fn would_create_cycle(&self, field: &FieldKey, new_parents: &[FieldKey]) -> Option<CycleError> {
        if new_parents.contains(field) {
            return Some(CycleError::self_reference(field.clone()));
        }

        let targets: FxHashSet<&FieldKey> = new_parents.iter().collect();
        let mut visited: FxHashSet<&FieldKey> = FxHashSet::default();
        let mut stack: Vec<&FieldKey> = vec![field];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(kids) = self.children.get(current) {
                for kid in kids {
                    if targets.contains(kid) {
                        return Some(CycleError::cycle(vec![kid.clone(), field.clone()]));
                    }
                    stack.push(kid);
                }
            }
        }

        None
    }

    /// Every field reachable downstream of `field`, in topological order
    /// (parents always before children, ties broken by key name).
    ///
    /// The changed field itself is not included.
    pub fn descendants_of(&self, field: &FieldKey) -> Vec<FieldKey> {
        let mut reachable: FxHashSet<FieldKey> = FxHashSet::default();
        let mut stack: Vec<&FieldKey> = vec![field];

        while let Some(current) = stack.pop() {
            if let Some(kids) = self.children.get(current) {
                for kid in kids {
                    if reachable.insert(kid.clone()) {
                        stack.push(kid);
                    }
                }
            }
        }

        self.order_topologically(reachable)
    }

    /// Every field upstream of `field` (the fields whose values go into its
    /// option filter), in topological order.
    pub fn ancestors_of(&self, field: &FieldKey) -> Vec<FieldKey> {
        let mut reachable: FxHashSet<FieldKey> = FxHashSet::default();
        let mut stack: Vec<&FieldKey> = vec![field];

        while let Some(current) = stack.pop() {
            if let Some(ps) = self.parents.get(current) {
                for p in ps {
                    if reachable.insert(p.clone()) {
                        stack.push(p);
                    }
                }
            }
        }

        self.order_topologically(reachable)
    }

    /// True if `field` is `ancestor` itself or transitively depends on it.
    pub fn depends_on(&self, field: &FieldKey, ancestor: &FieldKey) -> bool {
        if field == ancestor {
            return true;
        }
        let mut stack: Vec<&FieldKey> = vec![field];
        let mut visited: FxHashSet<&FieldKey> = FxHashSet::default();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(ps) = self.parents.get(current) {
                if ps.contains(ancestor) {
                    return true;
                }
                stack.extend(ps.iter());
            }
        }
        false
    }

    /// Topological order over every field in the graph.
    ///
    /// Kahn's algorithm with ties broken by key name for deterministic
    /// output. The graph is kept acyclic by construction, so this cannot
    /// fail; it is used to assign stable topo positions to the schema.
    pub fn topo_order(&self) -> Vec<FieldKey> {
        let mut all: FxHashSet<FieldKey> = FxHashSet::default();
        all.extend(self.parents.keys().cloned());
        all.extend(self.children.keys().cloned());
        self.order_topologically(all)
    }

    /// Order a subset of fields so parents come before children.
    fn order_topologically(&self, subset: FxHashSet<FieldKey>) -> Vec<FieldKey> {
        if subset.is_empty() {
            return Vec::new();
        }

        // In-degree within the subset only.
        let mut in_degree: FxHashMap<&FieldKey, usize> = FxHashMap::default();
        for field in &subset {
            let count = self
                .parents
                .get(field)
                .map(|ps| ps.iter().filter(|p| subset.contains(*p)).count())
                .unwrap_or(0);
            in_degree.insert(field, count);
        }

        // Sorted descending so the smallest key pops first.
        let mut queue: Vec<&FieldKey> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(f, _)| *f)
            .collect();
        queue.sort_by(|a, b| b.cmp(a));

        let mut result: Vec<FieldKey> = Vec::with_capacity(subset.len());

        while let Some(field) = queue.pop() {
            result.push(field.clone());

            if let Some(kids) = self.children.get(field) {
                let mut newly_free: Vec<&FieldKey> = Vec::new();
                for kid in kids {
                    if let Some(key) = subset.get(kid) {
                        if let Some(deg) = in_degree.get_mut(key) {
                            *deg = deg.saturating_sub(1);
                            if *deg == 0 {
                                newly_free.push(key);
                            }
                        }
                    }
                }
                newly_free.sort();
                for f in newly_free.into_iter().rev() {
                    queue.push(f);
                }
            }
        }

        result
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (field, parents) in &self.parents {
            for parent in parents {
                assert!(
                    self.children
                        .get(parent)
                        .map_or(false, |s| s.contains(field)),
                    "missing child edge: {} should list {} as child",
                    parent,
                    field
                );
            }
        }

        for (field, children) in &self.children {
            for child in children {
                assert!(
                    self.parents.get(child).map_or(false, |s| s.contains(field)),
                    "missing parent edge: {} should list {} as parent",
                    child,
                    field
                );
            }
        }

        for (field, parents) in &self.parents {
            assert!(!parents.is_empty(), "empty parent set stored for {}", field);
        }
        for (field, children) in &self.children {
            assert!(!children.is_empty(), "empty child set stored for {}", field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> FieldKey {
        FieldKey::from(name)
    }

    fn chain(graph: &mut DependencyGraph, names: &[&str]) {
        for pair in names.windows(2) {
            graph.add_edges(&key(pair[1]), &[key(pair[0])]).unwrap();
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();

        assert_eq!(graph.dependent_field_count(), 0);
        assert!(!graph.has_parents(&key("company")));
        assert_eq!(graph.descendants_of(&key("company")).len(), 0);

        graph.assert_consistent();
    }

    #[test]
    fn test_single_edge() {
        let mut graph = DependencyGraph::new();
        graph.add_edges(&key("format"), &[key("company")]).unwrap();
        graph.assert_consistent();

        assert!(graph.has_parents(&key("format")));
        assert!(!graph.has_parents(&key("company")));

        let parents: Vec<_> = graph.parents(&key("format")).collect();
        assert_eq!(parents, vec![&key("company")]);

        let children: Vec<_> = graph.children(&key("company")).collect();
        assert_eq!(children, vec![&key("format")]);
    }

    #[test]
    fn test_descendants_in_topo_order() {
        let mut graph = DependencyGraph::new();
        chain(&mut graph, &["company", "format", "year", "cost_center"]);
        graph.assert_consistent();

        let descendants = graph.descendants_of(&key("company"));
        assert_eq!(
            descendants,
            vec![key("format"), key("year"), key("cost_center")]
        );
    }

    #[test]
    fn test_descendants_diamond() {
        //      cost_center
        //       /      \
        //  division   store
        //       \      /
        //      position
        let mut graph = DependencyGraph::new();
        graph.add_edges(&key("division"), &[key("cost_center")]).unwrap();
        graph.add_edges(&key("store"), &[key("cost_center")]).unwrap();
        graph
            .add_edges(&key("position"), &[key("division"), key("store")])
            .unwrap();
        graph.assert_consistent();

        let descendants = graph.descendants_of(&key("cost_center"));
        assert_eq!(descendants.len(), 3);
        let pos_of = |k: &FieldKey| descendants.iter().position(|d| d == k).unwrap();
        assert!(pos_of(&key("division")) < pos_of(&key("position")));
        assert!(pos_of(&key("store")) < pos_of(&key("position")));
    }

    #[test]
    fn test_ancestors_of() {
        let mut graph = DependencyGraph::new();
        chain(&mut graph, &["company", "format", "year"]);

        let ancestors = graph.ancestors_of(&key("year"));
        assert_eq!(ancestors, vec![key("company"), key("format")]);
        assert!(graph.ancestors_of(&key("company")).is_empty());
    }

    #[test]
    fn test_depends_on() {
        let mut graph = DependencyGraph::new();
        chain(&mut graph, &["company", "cost_center", "division"]);

        assert!(graph.depends_on(&key("division"), &key("company")));
        assert!(graph.depends_on(&key("division"), &key("cost_center")));
        assert!(graph.depends_on(&key("cost_center"), &key("cost_center")));
        assert!(!graph.depends_on(&key("company"), &key("division")));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut graph = DependencyGraph::new();
        let err = graph.add_edges(&key("year"), &[key("year")]).unwrap_err();
        assert!(err.message.contains("depends on itself"));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = DependencyGraph::new();
        chain(&mut graph, &["company", "format", "year"]);

        // year is downstream of company; company depending on year closes a loop
        let err = graph.add_edges(&key("company"), &[key("year")]).unwrap_err();
        assert!(!err.fields.is_empty());
        graph.assert_consistent();
    }

    #[test]
    fn test_replace_edges_rewires() {
        let mut graph = DependencyGraph::new();
        graph.add_edges(&key("division"), &[key("cost_center")]).unwrap();

        let mut new_parents = FxHashSet::default();
        new_parents.insert(key("plan_cost_center"));
        graph.replace_edges(key("division"), new_parents);
        graph.assert_consistent();

        let parents: Vec<_> = graph.parents(&key("division")).collect();
        assert_eq!(parents, vec![&key("plan_cost_center")]);
        assert_eq!(graph.children(&key("cost_center")).count(), 0);
    }

    #[test]
    fn test_detach_with_empty_set() {
        let mut graph = DependencyGraph::new();
        graph.add_edges(&key("format"), &[key("company")]).unwrap();

        graph.replace_edges(key("format"), FxHashSet::default());
        graph.assert_consistent();

        assert!(!graph.has_parents(&key("format")));
        assert_eq!(graph.children(&key("company")).count(), 0);
    }

    #[test]
    fn test_topo_order_stable() {
        let mut graph = DependencyGraph::new();
        chain(&mut graph, &["company", "format", "year"]);
        graph.add_edges(&key("run_rate_group"), &[key("plan_cost_center")]).unwrap();

        let order1 = graph.topo_order();
        let order2 = graph.topo_order();
        assert_eq!(order1, order2);

        let pos_of = |k: &FieldKey| order1.iter().position(|d| d == k).unwrap();
        assert!(pos_of(&key("company")) < pos_of(&key("format")));
        assert!(pos_of(&key("format")) < pos_of(&key("year")));
        assert!(pos_of(&key("plan_cost_center")) < pos_of(&key("run_rate_group")));
    }
}
