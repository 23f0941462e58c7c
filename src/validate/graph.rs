// ABOUTME: Plain adjacency-map graph algorithms for FK-based table ordering
// ABOUTME: Kahn's algorithm for topological sort plus DFS cycle detection, no per-node types

use std::collections::{HashMap, HashSet, VecDeque};

/// Adjacency map `table -> set of tables it depends on` (i.e. an edge
/// `A -> B` means "A has a foreign key referencing B", so B must be
/// written before A).
pub type DependencyGraph = HashMap<String, HashSet<String>>;

/// Build a dependency graph from `(table, referenced_table)` foreign-key
/// edges, restricted to the given table set (edges to tables outside the
/// set are dropped — they don't constrain this job's ordering).
pub fn build_graph(tables: &[String], edges: &[(String, String)]) -> DependencyGraph {
    let table_set: HashSet<&String> = tables.iter().collect();
    let mut graph: DependencyGraph = tables
        .iter()
        .map(|t| (t.clone(), HashSet::new()))
        .collect();

    for (from, to) in edges {
        if from == to {
            continue;
        }
        if table_set.contains(from) && table_set.contains(to) {
            graph.entry(from.clone()).or_default().insert(to.clone());
        }
    }
    graph
}

/// Kahn's algorithm: returns tables ordered so that every dependency
/// (referenced table) precedes its dependents, with any tables
/// participating in a cycle appended last in stable input order (spec
/// §4.9.2 step 7, §5 "cycle-members run last").
pub fn topological_order(tables: &[String], graph: &DependencyGraph) -> Vec<String> {
    // in_degree[t] = number of not-yet-emitted dependencies t still has.
    let mut in_degree: HashMap<String, usize> = tables
        .iter()
        .map(|t| (t.clone(), graph.get(t).map(|d| d.len()).unwrap_or(0)))
        .collect();

    // dependents[d] = tables that depend on d, i.e. edges d -> t reversed.
    let mut dependents: HashMap<String, Vec<String>> =
        tables.iter().map(|t| (t.clone(), Vec::new())).collect();
    for (table, deps) in graph {
        for dep in deps {
            dependents.entry(dep.clone()).or_default().push(table.clone());
        }
    }

    let mut queue: VecDeque<String> = tables
        .iter()
        .filter(|t| in_degree.get(*t).copied().unwrap_or(0) == 0)
        .cloned()
        .collect();

    let mut ordered = Vec::with_capacity(tables.len());
    let mut emitted: HashSet<String> = HashSet::new();

    while let Some(table) = queue.pop_front() {
        if emitted.contains(&table) {
            continue;
        }
        ordered.push(table.clone());
        emitted.insert(table.clone());

        if let Some(deps) = dependents.get(&table) {
            for dependent in deps {
                if emitted.contains(dependent) {
                    continue;
                }
                if let Some(count) = in_degree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
    }

    // Anything left is part of a cycle; append in original input order.
    for table in tables {
        if !emitted.contains(table) {
            ordered.push(table.clone());
            emitted.insert(table.clone());
        }
    }

    ordered
}

/// Tables that participate in at least one dependency cycle, via DFS
/// three-coloring.
pub fn find_cycle_members(tables: &[String], graph: &DependencyGraph) -> HashSet<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<String, Color> =
        tables.iter().map(|t| (t.clone(), Color::White)).collect();
    let mut cycle_members = HashSet::new();
    let empty = HashSet::new();

    fn visit(
        node: &str,
        graph: &DependencyGraph,
        color: &mut HashMap<String, Color>,
        stack: &mut Vec<String>,
        cycle_members: &mut HashSet<String>,
        empty: &HashSet<String>,
    ) {
        color.insert(node.to_string(), Color::Gray);
        stack.push(node.to_string());

        for dep in graph.get(node).unwrap_or(empty) {
            match color.get(dep).copied().unwrap_or(Color::White) {
                Color::White => visit(dep, graph, color, stack, cycle_members, empty),
                Color::Gray => {
                    // Found a back edge: everything on the stack from dep onward is in a cycle.
                    if let Some(pos) = stack.iter().position(|n| n == dep) {
                        for n in &stack[pos..] {
                            cycle_members.insert(n.clone());
                        }
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color.insert(node.to_string(), Color::Black);
    }

    for table in tables {
        if color.get(table).copied() == Some(Color::White) {
            let mut stack = Vec::new();
            visit(table, graph, &mut color, &mut stack, &mut cycle_members, &empty);
        }
    }

    cycle_members
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn topological_order_places_dependency_before_dependent() {
        let tables = s(&["orders", "users"]);
        // orders -> users (orders has FK to users)
        let graph = build_graph(
            &tables,
            &[("orders".to_string(), "users".to_string())],
        );
        let order = topological_order(&tables, &graph);
        let users_pos = order.iter().position(|t| t == "users").unwrap();
        let orders_pos = order.iter().position(|t| t == "orders").unwrap();
        assert!(users_pos < orders_pos);
    }

    #[test]
    fn topological_order_handles_no_dependencies() {
        let tables = s(&["a", "b", "c"]);
        let graph = build_graph(&tables, &[]);
        let order = topological_order(&tables, &graph);
        assert_eq!(order.len(), 3);
        assert_eq!(order, tables);
    }

    #[test]
    fn topological_order_handles_chain() {
        let tables = s(&["grandchild", "child", "parent"]);
        let graph = build_graph(
            &tables,
            &[
                ("child".to_string(), "parent".to_string()),
                ("grandchild".to_string(), "child".to_string()),
            ],
        );
        let order = topological_order(&tables, &graph);
        let parent_pos = order.iter().position(|t| t == "parent").unwrap();
        let child_pos = order.iter().position(|t| t == "child").unwrap();
        let grandchild_pos = order.iter().position(|t| t == "grandchild").unwrap();
        assert!(parent_pos < child_pos);
        assert!(child_pos < grandchild_pos);
    }

    #[test]
    fn finds_cycle_members() {
        let tables = s(&["a", "b", "c"]);
        let graph = build_graph(
            &tables,
            &[
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "a".to_string()),
            ],
        );
        let cycle = find_cycle_members(&tables, &graph);
        assert!(cycle.contains("a"));
        assert!(cycle.contains("b"));
        assert!(!cycle.contains("c"));
    }

    #[test]
    fn no_cycle_members_in_acyclic_graph() {
        let tables = s(&["a", "b"]);
        let graph = build_graph(&tables, &[("a".to_string(), "b".to_string())]);
        let cycle = find_cycle_members(&tables, &graph);
        assert!(cycle.is_empty());
    }
}
