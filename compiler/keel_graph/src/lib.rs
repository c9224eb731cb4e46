//! Dependency scheduling for mutually-recursive definition groups.
//!
//! Declarations in one compilation unit may reference each other freely,
//! including cyclically; sizes and layouts can only be computed for a
//! whole cycle at once. [`schedule`] partitions the definition graph
//! into strongly connected groups and orders them so that every group
//! comes after the groups it depends on — the order in which size
//! equations must be solved.
//!
//! # Algorithm
//!
//! Two depth-first traversals. The first walks the forward graph over
//! all nodes and lists them in reverse order of finishing time. The
//! second walks the *transposed* graph in that order: each still
//! unassigned node seeds a new group; reaching a node already in the
//! group under construction marks the group recursive; reaching a node
//! of an earlier, closed group records a group-level dependency edge
//! (self and duplicate edges suppressed). This yields the same grouping
//! as any SCC decomposition without low-link bookkeeping, at the cost
//! of a second traversal.
//!
//! The scheduler is a pure function of the edge lists: all traversal
//! state lives in arrays indexed by node, nothing is stored on the
//! caller's nodes, and it never fails. Whether a `recursive` group is
//! acceptable is the consumer's decision (mutually recursive bitdata
//! types are; recursive value bindings elsewhere may not be).

use rustc_hash::FxHashSet;

/// Index of a group within a [`Schedule`].
pub type GroupId = usize;

/// One strongly connected group of definitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    /// Node indices in this group.
    pub members: Vec<usize>,
    /// True if the group has more than one member or a self-edge.
    pub recursive: bool,
    /// Groups this one depends on; always earlier in the schedule.
    pub depends_on: Vec<GroupId>,
}

/// The scheduling result: groups in dependency order (dependencies
/// first) plus the group assignment of every node.
#[derive(Clone, Debug)]
pub struct Schedule {
    pub groups: Vec<Group>,
    pub group_of: Vec<GroupId>,
}

impl Schedule {
    /// Iterate over groups in dependency order.
    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups.iter().enumerate()
    }
}

/// Partition `0..edges.len()` into strongly connected groups, ordered
/// with dependencies first.
///
/// `edges[n]` lists the definitions that `n` references (its callees).
/// Out-of-range or duplicate entries are tolerated: the former are
/// ignored, the latter are harmless.
pub fn schedule(edges: &[Vec<usize>]) -> Schedule {
    let n = edges.len();

    // Phase 1: forward DFS, listing nodes in reverse finishing order.
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    for root in 0..n {
        forward_visit(root, edges, &mut visited, &mut order);
    }
    order.reverse();

    // The reverse traversal needs the transpose (callers) of the graph.
    let mut callers: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (from, outs) in edges.iter().enumerate() {
        for &to in outs {
            if to < n {
                callers[to].push(from);
            }
        }
    }

    // Phase 2: reverse DFS in phase-1 order, carving out one group per
    // unassigned root. Groups are created consumers-first, so the final
    // schedule is the creation order reversed.
    let mut group_of: Vec<Option<GroupId>> = vec![None; n];
    let mut groups: Vec<Group> = Vec::new();
    for &root in &order {
        if group_of[root].is_none() {
            let id = groups.len();
            groups.push(Group {
                members: Vec::new(),
                recursive: false,
                depends_on: Vec::new(),
            });
            reverse_visit(root, id, &callers, &mut group_of, &mut groups);
        }
    }

    // Reverse into dependencies-first order and remap ids accordingly.
    let count = groups.len();
    groups.reverse();
    let flip = |id: GroupId| count - 1 - id;
    let mut seen = FxHashSet::default();
    for group in &mut groups {
        seen.clear();
        for dep in &mut group.depends_on {
            *dep = flip(*dep);
        }
        group.depends_on.retain(|d| seen.insert(*d));
    }
    let group_of = group_of
        .into_iter()
        .map(|g| flip(g.unwrap_or(0)))
        .collect();

    Schedule { groups, group_of }
}

/// Push `node` onto `order` after all of its descendants.
fn forward_visit(node: usize, edges: &[Vec<usize>], visited: &mut [bool], order: &mut Vec<usize>) {
    if visited[node] {
        return;
    }
    visited[node] = true;
    for &next in &edges[node] {
        if next < edges.len() {
            forward_visit(next, edges, visited, order);
        }
    }
    order.push(node);
}

/// Place every unassigned node reachable through `callers` into the
/// group `id`; record recursion and inter-group dependencies.
fn reverse_visit(
    node: usize,
    id: GroupId,
    callers: &[Vec<usize>],
    group_of: &mut [Option<GroupId>],
    groups: &mut [Group],
) {
    match group_of[node] {
        None => {
            group_of[node] = Some(id);
            groups[id].members.push(node);
            for i in 0..callers[node].len() {
                reverse_visit(callers[node][i], id, callers, group_of, groups);
            }
        }
        Some(existing) if existing == id => {
            // Reached a node already placed in the group under
            // construction: the group is recursive.
            groups[id].recursive = true;
        }
        Some(existing) => {
            // Strayed into an earlier, closed group: that group depends
            // on the one being built.
            groups[existing].depends_on.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// The group containing `node`, as a sorted member list.
    fn members_of(s: &Schedule, node: usize) -> Vec<usize> {
        let mut m = s.groups[s.group_of[node]].members.clone();
        m.sort_unstable();
        m
    }

    /// Check that the schedule orders every dependency before its
    /// dependents and that no group depends on itself.
    fn assert_valid_order(s: &Schedule) {
        for (id, group) in s.iter() {
            for &dep in &group.depends_on {
                assert!(dep < id, "group {id} depends on later group {dep}");
            }
        }
    }

    #[test]
    fn straight_line_dependencies_come_first() {
        // 0 -> 1 -> 2: group(2), group(1), group(0) in that order.
        let s = schedule(&[vec![1], vec![2], vec![]]);
        assert_eq!(s.groups.len(), 3);
        assert_valid_order(&s);
        assert!(s.group_of[2] < s.group_of[1]);
        assert!(s.group_of[1] < s.group_of[0]);
        assert!(s.groups.iter().all(|g| !g.recursive));
    }

    #[test]
    fn three_cycle_forms_one_recursive_group() {
        // A -> B -> C -> A, plus a non-recursive dependent D -> A.
        let s = schedule(&[vec![1], vec![2], vec![0], vec![0]]);
        assert_eq!(members_of(&s, 0), vec![0, 1, 2]);
        assert!(s.groups[s.group_of[0]].recursive);
        assert_eq!(members_of(&s, 3), vec![3]);
        assert!(!s.groups[s.group_of[3]].recursive);
        assert!(s.group_of[0] < s.group_of[3]);
        assert_valid_order(&s);
    }

    #[test]
    fn self_edge_marks_group_recursive() {
        let s = schedule(&[vec![0], vec![]]);
        assert_eq!(members_of(&s, 0), vec![0]);
        assert!(s.groups[s.group_of[0]].recursive);
        assert!(!s.groups[s.group_of[1]].recursive);
    }

    #[test]
    fn same_group_iff_mutually_reachable() {
        // Two 2-cycles bridged by a one-way edge.
        let s = schedule(&[vec![1], vec![0, 2], vec![3], vec![2]]);
        assert_eq!(members_of(&s, 0), vec![0, 1]);
        assert_eq!(members_of(&s, 2), vec![2, 3]);
        assert_ne!(s.group_of[0], s.group_of[2]);
        assert!(s.group_of[2] < s.group_of[0]);
        assert_valid_order(&s);
    }

    #[test]
    fn dependency_edges_are_deduplicated() {
        // Both members of the {0, 1} cycle reference 2, which would
        // record the same group edge twice.
        let s = schedule(&[vec![1, 2], vec![0, 2], vec![]]);
        let cycle_group = &s.groups[s.group_of[0]];
        assert_eq!(cycle_group.depends_on, vec![s.group_of[2]]);
        for (_, group) in s.iter() {
            let mut deps = group.depends_on.clone();
            deps.sort_unstable();
            deps.dedup();
            assert_eq!(deps.len(), group.depends_on.len());
        }
        assert_valid_order(&s);
    }

    #[test]
    fn grouping_is_invariant_under_input_order() {
        // The same graph with edge lists permuted: 0<->1 cycle,
        // 2 -> {0, 3}, 3 independent.
        let a = schedule(&[vec![1], vec![0], vec![0, 3], vec![]]);
        let b = schedule(&[vec![1], vec![0], vec![3, 0], vec![]]);
        for node in 0..4 {
            assert_eq!(members_of(&a, node), members_of(&b, node));
            assert_eq!(
                a.groups[a.group_of[node]].recursive,
                b.groups[b.group_of[node]].recursive
            );
        }
        assert_valid_order(&a);
        assert_valid_order(&b);
    }

    #[test]
    fn empty_graph_schedules_nothing() {
        let s = schedule(&[]);
        assert!(s.groups.is_empty());
        assert!(s.group_of.is_empty());
    }

    #[test]
    fn diamond_is_four_singleton_groups() {
        // 0 -> {1, 2} -> 3
        let s = schedule(&[vec![1, 2], vec![3], vec![3], vec![]]);
        assert_eq!(s.groups.len(), 4);
        assert!(s.group_of[3] < s.group_of[1]);
        assert!(s.group_of[3] < s.group_of[2]);
        assert!(s.group_of[1] < s.group_of[0]);
        assert!(s.group_of[2] < s.group_of[0]);
        assert_valid_order(&s);
    }
}
