//! Bus classification and branch-control index sets.
//!
//! The five bus sets fix the Newton state layout:
//!
//! ```text
//! angles     unknown at  pq ∪ pv ∪ pqv ∪ p
//! magnitudes unknown at  pq ∪ p
//! P equations        at  pq ∪ pv ∪ pqv ∪ p
//! Q equations        at  pq ∪ pqv
//! ```
//!
//! A P bus regulates the voltage of one PQV bus (the pair keeps the system
//! square). Indices are values: a reclassification builds a new
//! [`SimulationIndices`] instead of editing the old one.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use volta_core::{Branch, BusType, NumericalCircuit};

/// Branches grouped by the quantity their taps control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchControlIndices {
    /// Voltage controlled by tap module
    pub k_v_m: Vec<usize>,
    /// Buses whose voltage `k_v_m` controls (same order)
    pub i_v_m: Vec<usize>,
    /// Reactive flow controlled by tap module
    pub k_qf_m: Vec<usize>,
    /// Real flow controlled by tap angle
    pub k_pf_tau: Vec<usize>,
    pub k_vsc: Vec<usize>,
    /// In both a module-control and an angle-control set
    pub k_dual: Vec<usize>,
}

impl BranchControlIndices {
    pub fn from_branches(branches: &[Branch]) -> Self {
        use volta_core::TapControl::*;

        let mut idx = Self::default();
        for (k, br) in branches.iter().enumerate() {
            if !br.active {
                continue;
            }
            match br.control {
                Vf => {
                    idx.k_v_m.push(k);
                    idx.i_v_m.push(br.from);
                }
                Vt | PfVt => {
                    idx.k_v_m.push(k);
                    idx.i_v_m.push(br.to);
                }
                Qf | Qt | PfQt => idx.k_qf_m.push(k),
                Fixed | Pf => {}
            }
            if br.control.controls_angle() {
                idx.k_pf_tau.push(k);
            }
            if br.control.controls_module() && br.control.controls_angle() {
                idx.k_dual.push(k);
            }
            if br.is_converter() {
                idx.k_vsc.push(k);
            }
        }
        if !idx.k_dual.is_empty() {
            debug!("{} dual-controlled branches", idx.k_dual.len());
        }
        idx
    }

    pub fn any_control(&self) -> bool {
        !(self.k_v_m.is_empty() && self.k_qf_m.is_empty() && self.k_pf_tau.is_empty())
    }
}

/// Disjoint, sorted bus sets whose union is every bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationIndices {
    pub reference: Vec<usize>,
    pub pq: Vec<usize>,
    pub pv: Vec<usize>,
    pub pqv: Vec<usize>,
    pub p: Vec<usize>,
    /// (P bus, regulated PQV bus)
    pub pairs: Vec<(usize, usize)>,
    /// No slack and no PV candidate to promote
    pub unsolvable: bool,
    pub control: BranchControlIndices,
}

/// Resolve the effective bus types.
///
/// - an unpaired P bus falls back to PQ, an unpaired PQV bus to PV;
/// - without a slack, the PV bus with the largest injection is promoted
///   (lowest index on ties). Without a PV bus the set is unsolvable.
pub fn classify(
    bus_types: &[BusType],
    p_injection: &[f64],
    regulated_bus: &[Option<usize>],
) -> (Vec<BusType>, Vec<(usize, usize)>, bool) {
    let n = bus_types.len();
    let mut types = bus_types.to_vec();
    let mut pairs = Vec::new();
    let mut paired_pqv = vec![false; n];

    for i in 0..n {
        if types[i] != BusType::P {
            continue;
        }
        match regulated_bus.get(i).copied().flatten() {
            Some(j) if j < n && j != i && types[j] == BusType::PQV && !paired_pqv[j] => {
                paired_pqv[j] = true;
                pairs.push((i, j));
            }
            target => {
                warn!("P bus {i} has no valid PQV target ({target:?}); treating it as PQ");
                types[i] = BusType::PQ;
            }
        }
    }
    for j in 0..n {
        if types[j] == BusType::PQV && !paired_pqv[j] {
            warn!("PQV bus {j} has no regulating P bus; treating it as PV");
            types[j] = BusType::PV;
        }
    }

    let mut unsolvable = false;
    if !types.contains(&BusType::Slack) {
        let mut best: Option<usize> = None;
        for (i, t) in types.iter().enumerate() {
            if *t != BusType::PV {
                continue;
            }
            let p = p_injection.get(i).copied().unwrap_or(0.0);
            match best {
                Some(b) if p_injection.get(b).copied().unwrap_or(0.0) >= p => {}
                _ => best = Some(i),
            }
        }
        match best {
            Some(b) => {
                debug!("no slack declared; promoting PV bus {b}");
                types[b] = BusType::Slack;
            }
            None => {
                if n > 0 {
                    warn!("no slack or PV bus among {n} buses; island is unsolvable");
                }
                unsolvable = true;
            }
        }
    }

    (types, pairs, unsolvable)
}

impl SimulationIndices {
    pub fn from_circuit(circuit: &NumericalCircuit) -> Self {
        let regulated: Vec<Option<usize>> =
            circuit.buses.iter().map(|b| b.regulated_bus).collect();
        let (types, pairs, unsolvable) =
            classify(&circuit.bus_types(), &circuit.p_injection(), &regulated);
        let mut idx = Self::from_types(&types, pairs);
        idx.unsolvable = unsolvable;
        idx.control = BranchControlIndices::from_branches(&circuit.branches);
        idx
    }

    /// Partition already-resolved types.
    pub fn from_types(types: &[BusType], pairs: Vec<(usize, usize)>) -> Self {
        let mut idx = Self {
            pairs,
            ..Self::default()
        };
        for (i, t) in types.iter().enumerate() {
            match t {
                BusType::Slack => idx.reference.push(i),
                BusType::PQ => idx.pq.push(i),
                BusType::PV => idx.pv.push(i),
                BusType::PQV => idx.pqv.push(i),
                BusType::P => idx.p.push(i),
            }
        }
        idx
    }

    pub fn nbus(&self) -> usize {
        self.reference.len() + self.pq.len() + self.pv.len() + self.pqv.len() + self.p.len()
    }

    /// Effective type of every bus.
    pub fn bus_types(&self) -> Vec<BusType> {
        let mut types = vec![BusType::PQ; self.nbus()];
        for (set, t) in [
            (&self.reference, BusType::Slack),
            (&self.pv, BusType::PV),
            (&self.pqv, BusType::PQV),
            (&self.p, BusType::P),
        ] {
            for &i in set {
                types[i] = t;
            }
        }
        types
    }

    /// Buses subject to reactive-limit checks.
    pub fn voltage_controlled(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .pv
            .iter()
            .chain(&self.pqv)
            .chain(&self.p)
            .copied()
            .collect();
        out.sort_unstable();
        out
    }

    pub fn has_voltage_controlled(&self) -> bool {
        !(self.pv.is_empty() && self.pqv.is_empty() && self.p.is_empty())
    }

    /// Non-slack buses (angle unknowns, P equations), sorted.
    pub fn no_slack(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .pq
            .iter()
            .chain(&self.pv)
            .chain(&self.pqv)
            .chain(&self.p)
            .copied()
            .collect();
        out.sort_unstable();
        out
    }

    /// Magnitude unknowns, sorted.
    pub fn pq_p(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self.pq.iter().chain(&self.p).copied().collect();
        out.sort_unstable();
        out
    }

    /// Q equations, sorted.
    pub fn pq_pqv(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self.pq.iter().chain(&self.pqv).copied().collect();
        out.sort_unstable();
        out
    }

    /// Move `buses` to PQ. A member of a P/PQV pair drags its partner along.
    ///
    /// Returns the new indices plus every bus that actually changed type, in
    /// ascending order. Slack and PQ buses in `buses` are ignored.
    pub fn with_buses_as_pq(&self, buses: &[usize]) -> (Self, Vec<usize>) {
        let mut types = self.bus_types();
        let mut changed = Vec::new();
        let mut pairs = self.pairs.clone();

        let demote = |i: usize, types: &mut Vec<BusType>, changed: &mut Vec<usize>| {
            if i < types.len() && types[i].is_voltage_controlled() {
                types[i] = BusType::PQ;
                changed.push(i);
            }
        };

        for &i in buses {
            if let Some(pos) = pairs.iter().position(|&(p, q)| p == i || q == i) {
                let (p, q) = pairs.remove(pos);
                demote(p, &mut types, &mut changed);
                demote(q, &mut types, &mut changed);
            } else {
                demote(i, &mut types, &mut changed);
            }
        }
        changed.sort_unstable();
        changed.dedup();

        let mut next = Self::from_types(&types, pairs);
        next.unsolvable = self.unsolvable;
        next.control = self.control.clone();
        (next, changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volta_core::{Bus, TapControl};

    fn assert_partition(idx: &SimulationIndices, n: usize) {
        let mut seen = vec![0usize; n];
        for set in [&idx.reference, &idx.pq, &idx.pv, &idx.pqv, &idx.p] {
            assert!(set.windows(2).all(|w| w[0] < w[1]), "set not sorted: {set:?}");
            for &i in set {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1), "not a partition: {seen:?}");
        assert_eq!(idx.nbus(), n);
    }

    #[test]
    fn test_partition_covers_all_buses() {
        let types = [
            BusType::Slack,
            BusType::PV,
            BusType::PQ,
            BusType::PQV,
            BusType::P,
            BusType::PQ,
        ];
        let regulated = [None, None, None, None, Some(3), None];
        let (t, pairs, unsolvable) = classify(&types, &[0.0; 6], &regulated);
        let idx = SimulationIndices::from_types(&t, pairs);
        assert!(!unsolvable);
        assert_partition(&idx, 6);
        assert_eq!(idx.pairs, vec![(4, 3)]);
        assert_eq!(idx.pqv, vec![3]);
        assert_eq!(idx.p, vec![4]);
    }

    #[test]
    fn test_slack_promotion_picks_largest_injection() {
        let types = [BusType::PQ, BusType::PV, BusType::PV, BusType::PV];
        let (t, _, unsolvable) = classify(&types, &[0.0, 30.0, 80.0, 80.0], &[None; 4]);
        assert!(!unsolvable);
        assert_eq!(t[2], BusType::Slack);
        assert_eq!(t[3], BusType::PV);
    }

    #[test]
    fn test_no_candidate_is_unsolvable() {
        let types = [BusType::PQ, BusType::PQ];
        let (t, _, unsolvable) = classify(&types, &[0.0, 0.0], &[None; 2]);
        assert!(unsolvable);
        assert_eq!(t, types.to_vec());
        let idx = SimulationIndices::from_types(&t, Vec::new());
        assert!(idx.reference.is_empty());
        assert_partition(&idx, 2);
    }

    #[test]
    fn test_unpaired_remote_control_falls_back() {
        let types = [BusType::Slack, BusType::P, BusType::PQV];
        // P bus points at the slack, not at a PQV bus
        let (t, pairs, _) = classify(&types, &[0.0; 3], &[None, Some(0), None]);
        assert!(pairs.is_empty());
        assert_eq!(t[1], BusType::PQ);
        assert_eq!(t[2], BusType::PV);
    }

    #[test]
    fn test_demotion_drags_pair_partner() {
        let types = [BusType::Slack, BusType::PV, BusType::PQV, BusType::P];
        let (t, pairs, _) = classify(&types, &[0.0; 4], &[None, None, None, Some(2)]);
        let idx = SimulationIndices::from_types(&t, pairs);

        let (next, changed) = idx.with_buses_as_pq(&[2]);
        assert_eq!(changed, vec![2, 3]);
        assert_eq!(next.pq, vec![2, 3]);
        assert_eq!(next.pv, vec![1]);
        assert!(next.pairs.is_empty());
        assert_partition(&next, 4);

        // the original value is untouched
        assert_eq!(idx.pqv, vec![2]);
    }

    #[test]
    fn test_demotion_ignores_slack_and_pq() {
        let idx = SimulationIndices::from_types(
            &[BusType::Slack, BusType::PQ, BusType::PV],
            Vec::new(),
        );
        let (next, changed) = idx.with_buses_as_pq(&[0, 1, 2]);
        assert_eq!(changed, vec![2]);
        assert_eq!(next.reference, vec![0]);
        assert_eq!(next.pq, vec![1, 2]);
    }

    #[test]
    fn test_state_layout_sets() {
        let idx = SimulationIndices::from_types(
            &[BusType::Slack, BusType::PQ, BusType::PQV, BusType::P, BusType::PV],
            vec![(3, 2)],
        );
        assert_eq!(idx.no_slack(), vec![1, 2, 3, 4]);
        assert_eq!(idx.pq_p(), vec![1, 3]);
        assert_eq!(idx.pq_pqv(), vec![1, 2]);
        // square: unknowns == equations
        assert_eq!(
            idx.no_slack().len() + idx.pq_p().len(),
            idx.no_slack().len() + idx.pq_pqv().len()
        );
    }

    #[test]
    fn test_branch_control_sets() {
        let mut c = NumericalCircuit::new(100.0);
        for i in 0..4 {
            c.add_bus(Bus::new(format!("b{i}"), BusType::PQ));
        }
        c.add_branch(Branch::transformer("vt", 0, 1, 0.0, 0.1, 1.0, 0.0).with_control(TapControl::Vt));
        c.add_branch(Branch::transformer("pf", 1, 2, 0.0, 0.1, 1.0, 0.0).with_control(TapControl::Pf));
        c.add_branch(
            Branch::transformer("dual", 2, 3, 0.0, 0.1, 1.0, 0.0).with_control(TapControl::PfQt),
        );
        c.add_branch(
            Branch::transformer("off", 0, 3, 0.0, 0.1, 1.0, 0.0)
                .with_control(TapControl::Vf)
                .with_active(false),
        );
        c.add_branch(Branch::converter("vsc", 0, 2, 0.0, 0.1, Default::default()));

        let idx = BranchControlIndices::from_branches(&c.branches);
        assert_eq!(idx.k_v_m, vec![0]);
        assert_eq!(idx.i_v_m, vec![1]);
        assert_eq!(idx.k_qf_m, vec![2]);
        assert_eq!(idx.k_pf_tau, vec![1, 2]);
        assert_eq!(idx.k_dual, vec![2]);
        assert_eq!(idx.k_vsc, vec![4]);
        assert!(idx.any_control());
    }

    #[test]
    fn test_from_circuit_promotes_and_partitions() {
        let mut c = NumericalCircuit::new(100.0);
        c.add_bus(Bus::pv("g1", 50.0, 1.0));
        c.add_bus(Bus::pv("g2", 120.0, 1.0));
        c.add_bus(Bus::pq_load("l", 100.0, 10.0));
        let idx = SimulationIndices::from_circuit(&c);
        assert_eq!(idx.reference, vec![1]);
        assert_eq!(idx.pv, vec![0]);
        assert_eq!(idx.pq, vec![2]);
        assert_partition(&idx, 3);
    }
}
