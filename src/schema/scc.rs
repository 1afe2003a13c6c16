//! Tarjan's strongly connected components over the table arena.
//!
//! Iterative so that long FK chains cannot overflow the stack.

use super::TableId;

const UNVISITED: usize = usize::MAX;

/// Find the strongly connected components of the subgraph induced by `in_scope`.
///
/// Each component is returned sorted by `TableId`. Components of size one are
/// included; callers decide whether a lone table is cyclic (self-reference).
pub(crate) fn strongly_connected(adjacency: &[Vec<TableId>], in_scope: &[bool]) -> Vec<Vec<TableId>> {
    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0usize;

    // (node, position of next successor to visit)
    let mut call: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if !in_scope[root] || index[root] != UNVISITED {
            continue;
        }

        index[root] = counter;
        lowlink[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;
        call.push((root, 0));

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if let Some(&next) = adjacency[v].get(frame.1) {
                frame.1 += 1;
                let w = next.index();
                if !in_scope[w] {
                    continue;
                }
                if index[w] == UNVISITED {
                    index[w] = counter;
                    lowlink[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            // All successors of v visited
            call.pop();
            if let Some(&(parent, _)) = call.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }

            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(TableId(w as u32));
                    if w == v {
                        break;
                    }
                }
                component.sort();
                components.push(component);
            }
        }
    }

    components
}
