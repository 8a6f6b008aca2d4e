//! Dependency resolution between fields.
//!
//! A field depends on every field read by a relationship somewhere in its domain. The
//! evaluation order lists each field after all of its dependencies; specialization
//! generates fields in that order and abstraction uses the same edges to know which bound
//! fields a relationship check needs.

use crate::codec::CodecError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Open,
    Done,
}

/// Topological order of `edges` (`edges[i]` = fields that field `i` depends on).
///
/// Ties are broken by declaration order so the result is stable. A cycle, including a field
/// depending on itself, fails with [`CodecError::CyclicDependency`] naming the fields
/// along the cycle.
pub fn evaluation_order(names: &[&str], edges: &[Vec<usize>]) -> Result<Vec<usize>, CodecError> {
    let mut marks = vec![Mark::New; edges.len()];
    let mut order = Vec::with_capacity(edges.len());
    let mut path = Vec::new();
    for start in 0..edges.len() {
        if marks[start] == Mark::New {
            visit(start, edges, &mut marks, &mut path, &mut order, names)?;
        }
    }
    Ok(order)
}

fn visit(
    node: usize,
    edges: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
    names: &[&str],
) -> Result<(), CodecError> {
    marks[node] = Mark::Open;
    path.push(node);
    let mut deps = edges[node].clone();
    deps.sort_unstable();
    for dep in deps {
        match marks[dep] {
            Mark::Done => {}
            Mark::Open => {
                let from = path.iter().position(|&n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[from..].iter().map(|&n| names[n].to_string()).collect();
                cycle.push(names[dep].to_string());
                return Err(CodecError::CyclicDependency(cycle));
            }
            Mark::New => visit(dep, edges, marks, path, order, names)?,
        }
    }
    path.pop();
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_come_first() {
        // 0 = size over 1 and 2, 2 = checksum over 1
        let edges = vec![vec![1, 2], vec![], vec![1]];
        let order = evaluation_order(&["len", "payload", "crc"], &edges).expect("order");
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn independent_fields_keep_declaration_order() {
        let edges = vec![vec![], vec![], vec![]];
        assert_eq!(evaluation_order(&["a", "b", "c"], &edges).expect("order"), vec![0, 1, 2]);
    }

    #[test]
    fn transitive_cycle_is_reported_with_its_path() {
        let edges = vec![vec![1], vec![2], vec![0]];
        match evaluation_order(&["a", "b", "c"], &edges) {
            Err(CodecError::CyclicDependency(cycle)) => assert_eq!(cycle, vec!["a", "b", "c", "a"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let edges = vec![vec![], vec![1]];
        assert!(matches!(
            evaluation_order(&["a", "crc"], &edges),
            Err(CodecError::CyclicDependency(c)) if c == vec!["crc", "crc"]
        ));
    }
}
