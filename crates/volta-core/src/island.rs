//! Island views over a [`NumericalCircuit`].
//!
//! An island never owns or mutates circuit data. It is a sorted subset of bus
//! and branch indices borrowed against the snapshot; solvers that need a
//! compact problem call [`Island::to_circuit`] and scatter results back with
//! [`Island::buses`] / [`Island::branches`].

use crate::circuit::NumericalCircuit;
use crate::error::{VoltaError, VoltaResult};

/// Immutable index-subset view of one connected component.
#[derive(Debug, Clone)]
pub struct Island<'a> {
    circuit: &'a NumericalCircuit,
    index: usize,
    buses: Vec<usize>,
    branches: Vec<usize>,
}

impl<'a> Island<'a> {
    /// Build a view. Both index lists must be sorted, unique and in range.
    pub fn new(
        circuit: &'a NumericalCircuit,
        index: usize,
        buses: Vec<usize>,
        branches: Vec<usize>,
    ) -> VoltaResult<Self> {
        check_sorted_subset("island buses", &buses, circuit.nbus())?;
        check_sorted_subset("island branches", &branches, circuit.nbr())?;
        Ok(Self {
            circuit,
            index,
            buses,
            branches,
        })
    }

    /// Position of this island in the split order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn circuit(&self) -> &'a NumericalCircuit {
        self.circuit
    }

    /// Original bus indices, ascending.
    pub fn buses(&self) -> &[usize] {
        &self.buses
    }

    /// Original branch indices, ascending.
    pub fn branches(&self) -> &[usize] {
        &self.branches
    }

    pub fn nbus(&self) -> usize {
        self.buses.len()
    }

    pub fn nbr(&self) -> usize {
        self.branches.len()
    }

    pub fn is_single_node(&self) -> bool {
        self.buses.len() == 1
    }

    /// Compile the island into a compact circuit with renumbered indices.
    ///
    /// Branches with a terminal outside the island are rejected; a regulated
    /// bus outside the island is dropped.
    pub fn to_circuit(&self) -> VoltaResult<NumericalCircuit> {
        let mut local = vec![usize::MAX; self.circuit.nbus()];
        for (new, &old) in self.buses.iter().enumerate() {
            local[old] = new;
        }

        let mut compact = NumericalCircuit::new(self.circuit.sbase);
        for &i in &self.buses {
            let mut bus = self.circuit.buses[i].clone();
            bus.regulated_bus = bus
                .regulated_bus
                .map(|j| local[j])
                .filter(|&l| l != usize::MAX);
            compact.add_bus(bus);
        }

        for &k in &self.branches {
            let mut br = self.circuit.branches[k].clone();
            let (f, t) = (local[br.from], local[br.to]);
            if f == usize::MAX || t == usize::MAX {
                return Err(VoltaError::Validation(format!(
                    "branch {} ({}) leaves island {}",
                    k, br.name, self.index
                )));
            }
            br.from = f;
            br.to = t;
            compact.add_branch(br);
        }

        Ok(compact)
    }
}

fn check_sorted_subset(context: &str, idx: &[usize], len: usize) -> VoltaResult<()> {
    if let Some(&last) = idx.last() {
        if last >= len {
            return Err(VoltaError::shape(context, len, last + 1));
        }
    }
    if idx.windows(2).any(|w| w[0] >= w[1]) {
        return Err(VoltaError::Validation(format!(
            "{} must be strictly ascending",
            context
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Branch, Bus, BusType};

    fn two_triangles() -> NumericalCircuit {
        let mut c = NumericalCircuit::new(100.0);
        for i in 0..6 {
            c.add_bus(Bus::new(format!("b{i}"), BusType::PQ));
        }
        for (f, t) in [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)] {
            c.add_branch(Branch::line(format!("l{f}{t}"), f, t, 0.0, 0.1, 0.0));
        }
        c
    }

    #[test]
    fn test_island_compiles_with_local_indices() {
        let c = two_triangles();
        let island = Island::new(&c, 1, vec![3, 4, 5], vec![3, 4, 5]).unwrap();
        let compact = island.to_circuit().unwrap();
        assert_eq!(compact.nbus(), 3);
        assert_eq!(compact.nbr(), 3);
        assert_eq!(compact.branches[0].from, 0);
        assert_eq!(compact.branches[0].to, 1);
        assert_eq!(compact.branches[2].from, 2);
        assert_eq!(compact.buses[0].name, "b3");
    }

    #[test]
    fn test_island_rejects_unsorted() {
        let c = two_triangles();
        assert!(Island::new(&c, 0, vec![2, 1], vec![]).is_err());
    }

    #[test]
    fn test_island_rejects_out_of_range() {
        let c = two_triangles();
        let err = Island::new(&c, 0, vec![0, 9], vec![]).unwrap_err();
        assert!(matches!(err, VoltaError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_branch_leaving_island_is_rejected() {
        let c = two_triangles();
        let island = Island::new(&c, 0, vec![0, 1], vec![1]).unwrap();
        assert!(island.to_circuit().is_err());
    }
}
