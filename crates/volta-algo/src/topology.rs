//! Island detection over the sparse bus-bus adjacency.
//!
//! ```text
//! C   = Cf + Ct                                  (branches x buses)
//! Adj = diag(bus_active) · Cᵀ · diag(br_active) · C
//! ```
//!
//! The traversal walks the column structure of `Adj` with an explicit stack,
//! so deep radial feeders cannot overflow the call stack.

use sprs::{CsMat, TriMat};
use tracing::debug;
use volta_core::{Connectivity, Island, NumericalCircuit, VoltaError, VoltaResult};

/// Recover per-branch terminal indices from a column-compressed incidence matrix.
fn terminals(c: &CsMat<f64>) -> Vec<usize> {
    let mut bus_of = vec![usize::MAX; c.rows()];
    let converted;
    let csc = if c.is_csc() {
        c
    } else {
        converted = c.to_csc();
        &converted
    };
    for (j, col) in csc.outer_iterator().enumerate() {
        for (k, _) in col.iter() {
            bus_of[k] = j;
        }
    }
    bus_of
}

/// Build the bus-bus adjacency used by [`find_islands`].
pub fn build_adjacency(
    conn: &Connectivity,
    branch_active: &[bool],
    bus_active: &[bool],
) -> VoltaResult<CsMat<f64>> {
    let (nbr, nbus) = (conn.cf.rows(), conn.cf.cols());
    if conn.ct.rows() != nbr || conn.ct.cols() != nbus {
        return Err(VoltaError::shape("Ct shape", nbr * nbus, conn.ct.rows() * conn.ct.cols()));
    }
    if branch_active.len() != nbr {
        return Err(VoltaError::shape("branch active flags", nbr, branch_active.len()));
    }
    if bus_active.len() != nbus {
        return Err(VoltaError::shape("bus active flags", nbus, bus_active.len()));
    }

    let from = terminals(&conn.cf);
    let to = terminals(&conn.ct);

    let mut adj = TriMat::new((nbus, nbus));
    for k in 0..nbr {
        let (f, t) = (from[k], to[k]);
        if !branch_active[k] || f == usize::MAX || t == usize::MAX {
            continue;
        }
        for (row, col) in [(f, f), (t, t), (f, t), (t, f)] {
            if bus_active[row] {
                adj.add_triplet(row, col, 1.0);
            }
        }
    }
    Ok(adj.to_csc())
}

/// Connected components of the adjacency, each sorted ascending.
///
/// Inactive buses never belong to an island. Islands come out in the order
/// of their lowest bus index.
pub fn find_islands(adjacency: &CsMat<f64>, bus_active: &[bool]) -> VoltaResult<Vec<Vec<usize>>> {
    let n = adjacency.cols();
    if adjacency.rows() != n {
        return Err(VoltaError::shape("adjacency rows", n, adjacency.rows()));
    }
    if bus_active.len() != n {
        return Err(VoltaError::shape("bus active flags", n, bus_active.len()));
    }

    let mut visited = vec![false; n];
    let mut stack: Vec<usize> = Vec::with_capacity(n);
    let mut islands = Vec::new();

    for start in 0..n {
        if visited[start] || !bus_active[start] {
            continue;
        }

        let mut island = Vec::new();
        stack.push(start);
        while let Some(v) = stack.pop() {
            if visited[v] {
                continue;
            }
            visited[v] = true;
            island.push(v);

            // the adjacency is symmetric, so the outer view is the column for
            // either storage order
            if let Some(col) = adjacency.outer_view(v) {
                for (i, _) in col.iter() {
                    if !visited[i] && bus_active[i] {
                        stack.push(i);
                    }
                }
            }
        }

        island.sort_unstable();
        islands.push(island);
    }

    Ok(islands)
}

/// Elements (rows of `c_element_bus`) touching the island's buses.
///
/// `c_element_bus` is an element x bus incidence matrix. Each element is
/// visited at most once; inactive elements are skipped.
pub fn get_elements_of_island(
    c_element_bus: &CsMat<f64>,
    island: &[usize],
    element_active: &[bool],
) -> VoltaResult<Vec<usize>> {
    let (n_elm, n_bus) = (c_element_bus.rows(), c_element_bus.cols());
    if element_active.len() != n_elm {
        return Err(VoltaError::shape("element active flags", n_elm, element_active.len()));
    }
    if let Some(&bad) = island.iter().find(|&&j| j >= n_bus) {
        return Err(VoltaError::shape("island bus index", n_bus, bad + 1));
    }

    let csc;
    let c = if c_element_bus.is_csc() {
        c_element_bus
    } else {
        csc = c_element_bus.to_csc();
        &csc
    };

    let mut visited = vec![false; n_elm];
    let mut elements = Vec::new();
    for &j in island {
        if let Some(col) = c.outer_view(j) {
            for (k, _) in col.iter() {
                if !visited[k] && element_active[k] {
                    visited[k] = true;
                    elements.push(k);
                }
            }
        }
    }
    elements.sort_unstable();
    Ok(elements)
}

/// Split a circuit into island views.
pub fn split_into_islands(circuit: &NumericalCircuit) -> VoltaResult<Vec<Island<'_>>> {
    let conn = circuit.connectivity()?;
    let bus_active = circuit.bus_active();
    let branch_active = circuit.branch_active();

    // a branch counts only when both of its terminals are energized
    let branch_usable: Vec<bool> = circuit
        .branches
        .iter()
        .map(|br| br.active && bus_active[br.from] && bus_active[br.to])
        .collect();

    let adjacency = build_adjacency(&conn, &branch_active, &bus_active)?;
    let islands = find_islands(&adjacency, &bus_active)?;

    let mut views = Vec::with_capacity(islands.len());
    for (idx, buses) in islands.into_iter().enumerate() {
        let branches = get_elements_of_island(&conn.cf, &buses, &branch_usable)?;
        views.push(Island::new(circuit, idx, buses, branches)?);
    }

    debug!(
        "split {} buses into {} islands",
        circuit.nbus(),
        views.len()
    );
    Ok(views)
}
