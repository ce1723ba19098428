//! Linear (DC) sensitivity factors: PTDF, LODF and what derives from them.
//!
//! ```text
//! dθ[no_slack, :] = Bbus[no_slack, no_slack]⁻¹ · dP[no_slack, :]
//! PTDF            = Bf · dθ                               (branches x buses)
//! H[l, k]         = PTDF[l, f(k)] - PTDF[l, t(k)]
//! LODF[l, k]      = H[l, k] / (1 - H[k, k]),   LODF[k, k] = -1
//! ```
//!
//! With a single slack, `dP = I` and the slack column of the PTDF is zero.
//! With a distributed slack every injection is balanced uniformly by the
//! other buses of its island: `dP[i, j] = 1` if `i == j`, else `-1/(n-1)`.
//!
//! Factors are computed per island and scattered into full-size dense
//! matrices (`Vec<Vec<f64>>`, row = branch).

use crate::admittance::LinearAdmittances;
use crate::indices::SimulationIndices;
use crate::linalg::{submatrix_dense, DenseLu};
use crate::topology::split_into_islands;
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;
use sprs::CsMat;
use tracing::{debug, warn};
use volta_core::{LinearAnalysisOptions, NumericalCircuit, VoltaError, VoltaResult};

/// Value given to LODF entries of branches whose outage splits the island.
pub const LODF_RADIAL_SENTINEL: f64 = 1e6;

fn singular(context: &str, err: anyhow::Error) -> VoltaError {
    VoltaError::SingularMatrix(format!("{context}: {err}"))
}

/// PTDF of one connected network.
///
/// `no_slack` lists the sorted non-slack buses; `bbus` and `bf` come from
/// [`LinearAdmittances`].
pub fn make_ptdf(
    bbus: &CsMat<f64>,
    bf: &CsMat<f64>,
    no_slack: &[usize],
    distributed_slack: bool,
) -> VoltaResult<Vec<Vec<f64>>> {
    let n = bbus.rows();
    if bbus.cols() != n {
        return Err(VoltaError::shape("Bbus columns", n, bbus.cols()));
    }
    if bf.cols() != n {
        return Err(VoltaError::shape("Bf columns", n, bf.cols()));
    }
    if let Some(&bad) = no_slack.iter().find(|&&i| i >= n) {
        return Err(VoltaError::shape("non-slack bus index", n, bad + 1));
    }
    let nbr = bf.rows();
    let mut ptdf = vec![vec![0.0; n]; nbr];
    if no_slack.is_empty() {
        return Ok(ptdf);
    }

    let bred = submatrix_dense(bbus, no_slack, no_slack);
    let lu = DenseLu::factor(&bred).map_err(|e| singular("reduced Bbus", e))?;

    // injection columns to solve for
    let columns: Vec<usize> = if distributed_slack {
        (0..n).collect()
    } else {
        no_slack.to_vec()
    };
    let share = if n > 1 { -1.0 / (n as f64 - 1.0) } else { 0.0 };
    let rhs: Vec<Vec<f64>> = columns
        .iter()
        .map(|&j| {
            no_slack
                .iter()
                .map(|&i| {
                    if i == j {
                        1.0
                    } else if distributed_slack {
                        share
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();
    let dtheta = lu.solve_many(&rhs).map_err(|e| singular("PTDF solve", e))?;

    let bf = if bf.is_csr() { bf.clone() } else { bf.to_csr() };
    let mut theta = vec![0.0; n];
    for (&j, dt) in columns.iter().zip(&dtheta) {
        for (p, &i) in no_slack.iter().enumerate() {
            theta[i] = dt[p];
        }
        for (k, row) in bf.outer_iterator().enumerate() {
            ptdf[k][j] = row.iter().map(|(i, &b)| b * theta[i]).sum();
        }
    }
    Ok(ptdf)
}

/// LODF from a PTDF and the branch terminals.
///
/// Branches whose `1 - H[k, k]` is numerically zero split the network; their
/// column holds ±[`LODF_RADIAL_SENTINEL`] (0 where `H[l, k]` is also zero).
pub fn make_lodf(
    ptdf: &[Vec<f64>],
    from: &[usize],
    to: &[usize],
    correct_values: bool,
    numerical_zero: f64,
) -> VoltaResult<Vec<Vec<f64>>> {
    let nbr = ptdf.len();
    if from.len() != nbr || to.len() != nbr {
        return Err(VoltaError::shape("branch terminals", nbr, from.len().min(to.len())));
    }
    let h = |l: usize, k: usize| ptdf[l][from[k]] - ptdf[l][to[k]];

    let mut lodf = vec![vec![0.0; nbr]; nbr];
    for k in 0..nbr {
        let den = 1.0 - h(k, k);
        let radial = den.abs() <= numerical_zero;
        for (l, row) in lodf.iter_mut().enumerate() {
            let num = h(l, k);
            row[k] = if !radial {
                num / den
            } else if num.abs() <= numerical_zero {
                0.0
            } else {
                LODF_RADIAL_SENTINEL.copysign(num)
            };
        }
    }

    for (k, row) in lodf.iter_mut().enumerate() {
        if correct_values {
            for v in row.iter_mut() {
                if !(-1.2..=1.2).contains(v) {
                    *v = 0.0;
                }
            }
        }
        row[k] = -1.0;
    }
    Ok(lodf)
}

/// Outage transfer distribution factors for an injection at bus `j`:
/// `OTDF[k, l] = PTDF[k, j] + LODF[k, l]·PTDF[l, j]`.
pub fn make_otdf(ptdf: &[Vec<f64>], lodf: &[Vec<f64>], j: usize) -> Vec<Vec<f64>> {
    let nbr = ptdf.len();
    (0..nbr)
        .map(|k| {
            (0..nbr)
                .map(|l| ptdf[k][j] + lodf[k][l] * ptdf[l][j])
                .collect()
        })
        .collect()
}

/// Largest signed transfer each branch admits before reaching its rate.
pub fn make_transfer_limits(ptdf: &[Vec<f64>], flows: &[f64], rates: &[f64]) -> Vec<f64> {
    ptdf.iter()
        .enumerate()
        .map(|(m, row)| {
            let mut tmc: f64 = 0.0;
            for &p in row {
                if p != 0.0 {
                    let val = (rates[m] - flows[m]) / p;
                    if val.abs() > tmc.abs() {
                        tmc = val;
                    }
                }
            }
            tmc
        })
        .collect()
}

/// Full-size PTDF and LODF.
#[derive(Debug, Clone)]
pub struct LinearAnalysisResult {
    /// nbr x nbus
    pub ptdf: Vec<Vec<f64>>,
    /// nbr x nbr
    pub lodf: Vec<Vec<f64>>,
    pub from: Vec<usize>,
    pub to: Vec<usize>,
    /// Branch in service
    pub active: Vec<bool>,
    /// Islands left at zero (no single slack or nothing to solve)
    pub skipped_islands: Vec<usize>,
}

impl LinearAnalysisResult {
    pub fn nbr(&self) -> usize {
        self.ptdf.len()
    }

    /// DC branch flows `PTDF·P` for bus injections in MW.
    pub fn get_flows(&self, p_bus: &[f64]) -> Vec<f64> {
        self.ptdf
            .iter()
            .map(|row| row.iter().zip(p_bus).map(|(a, b)| a * b).sum())
            .collect()
    }

    pub fn get_transfer_limits(&self, flows: &[f64], rates: &[f64]) -> Vec<f64> {
        make_transfer_limits(&self.ptdf, flows, rates)
    }

    pub fn otdf(&self, bus: usize) -> Vec<Vec<f64>> {
        make_otdf(&self.ptdf, &self.lodf, bus)
    }

    /// True when switching off `outaged` disconnects two buses that the
    /// in-service branches connect today.
    pub fn splits_network(&self, outaged: &[usize]) -> bool {
        let nbus = self.ptdf.first().map_or(0, Vec::len);
        let mut components = UnionFind::<usize>::new(nbus);
        for (k, (&f, &t)) in self.from.iter().zip(&self.to).enumerate() {
            if self.active[k] && !outaged.contains(&k) {
                components.union(f, t);
            }
        }
        outaged
            .iter()
            .any(|&k| self.active[k] && !components.equiv(self.from[k], self.to[k]))
    }
}

/// Computes PTDF/LODF island by island.
#[derive(Debug, Clone, Default)]
pub struct LinearAnalysis {
    options: LinearAnalysisOptions,
}

struct IslandFactors {
    buses: Vec<usize>,
    branches: Vec<usize>,
    ptdf: Vec<Vec<f64>>,
    lodf: Vec<Vec<f64>>,
}

impl LinearAnalysis {
    pub fn new(options: LinearAnalysisOptions) -> Self {
        Self { options }
    }

    pub fn run(&self, circuit: &NumericalCircuit) -> VoltaResult<LinearAnalysisResult> {
        let islands = split_into_islands(circuit)?;
        let opts = &self.options;

        let factors: Vec<VoltaResult<Option<IslandFactors>>> = islands
            .par_iter()
            .map(|island| {
                let compact = island.to_circuit()?;
                let indices = SimulationIndices::from_circuit(&compact);
                if indices.reference.len() != 1 {
                    warn!(
                        "island {}: {} slack buses, linear factors skipped",
                        island.index(),
                        indices.reference.len()
                    );
                    return Ok(None);
                }
                let no_slack = indices.no_slack();
                if no_slack.is_empty() {
                    warn!("island {}: no non-slack buses, linear factors skipped", island.index());
                    return Ok(None);
                }

                let lin = LinearAdmittances::from_circuit(&compact)?;
                let ptdf = match make_ptdf(&lin.bbus, &lin.bf, &no_slack, opts.distributed_slack) {
                    Ok(ptdf) => ptdf,
                    Err(VoltaError::SingularMatrix(msg)) => {
                        warn!("island {}: {msg}, linear factors skipped", island.index());
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                };
                let lodf = make_lodf(
                    &ptdf,
                    &lin.from,
                    &lin.to,
                    opts.correct_values,
                    opts.numerical_zero,
                )?;
                Ok(Some(IslandFactors {
                    buses: island.buses().to_vec(),
                    branches: island.branches().to_vec(),
                    ptdf,
                    lodf,
                }))
            })
            .collect();

        let (nbr, nbus) = (circuit.nbr(), circuit.nbus());
        let mut result = LinearAnalysisResult {
            ptdf: vec![vec![0.0; nbus]; nbr],
            lodf: vec![vec![0.0; nbr]; nbr],
            from: circuit.branches.iter().map(|b| b.from).collect(),
            to: circuit.branches.iter().map(|b| b.to).collect(),
            active: circuit.branch_active(),
            skipped_islands: Vec::new(),
        };

        for (island, outcome) in islands.iter().zip(factors) {
            let Some(f) = outcome? else {
                result.skipped_islands.push(island.index());
                continue;
            };
            for (lk, &k) in f.branches.iter().enumerate() {
                for (li, &i) in f.buses.iter().enumerate() {
                    result.ptdf[k][i] = f.ptdf[lk][li];
                }
                for (lm, &m) in f.branches.iter().enumerate() {
                    result.lodf[k][m] = f.lodf[lk][lm];
                }
            }
        }

        // outaging a branch always removes its own flow
        for (k, row) in result.lodf.iter_mut().enumerate() {
            row[k] = -1.0;
        }

        debug!(
            "linear analysis: {} branches, {} buses, {} islands skipped",
            nbr,
            nbus,
            result.skipped_islands.len()
        );
        Ok(result)
    }
}

/// Factors for one group of simultaneous outages.
///
/// ```text
/// M[i, i] = 1,  M[i, j] = -LODF[c_i, c_j]
/// MLODF   = LODF[:, c] · M⁻¹
/// CPTDF   = MLODF · PTDF[c, b] + PTDF[:, b]
/// flow    = base + MLODF·base[c] + CPTDF·ΔP[b]
/// ```
#[derive(Debug, Clone)]
pub struct LinearMultiContingency {
    pub branch_indices: Vec<usize>,
    pub bus_indices: Vec<usize>,
    /// Fraction of each bus injection that changes (-1 removes it)
    pub injection_factors: Vec<f64>,
    /// nbr x |branch_indices|
    pub mlodf: Vec<Vec<f64>>,
    /// nbr x |bus_indices|
    pub compensated_ptdf: Vec<Vec<f64>>,
    /// The branch outages split the network; `mlodf` holds the single-outage
    /// factors (radial sentinels included) and the flows are a plain
    /// superposition.
    pub splits_network: bool,
}

impl LinearMultiContingency {
    pub fn new(
        lin: &LinearAnalysisResult,
        branch_indices: Vec<usize>,
        bus_indices: Vec<usize>,
        injection_factors: Vec<f64>,
    ) -> VoltaResult<Self> {
        let nbr = lin.nbr();
        if bus_indices.len() != injection_factors.len() {
            return Err(VoltaError::shape(
                "injection factors",
                bus_indices.len(),
                injection_factors.len(),
            ));
        }
        if let Some(&bad) = branch_indices.iter().find(|&&k| k >= nbr) {
            return Err(VoltaError::shape("contingency branch", nbr, bad + 1));
        }
        let nbus = lin.ptdf.first().map_or(0, Vec::len);
        if let Some(&bad) = bus_indices.iter().find(|&&i| i >= nbus) {
            return Err(VoltaError::shape("contingency bus", nbus, bad + 1));
        }

        let nc = branch_indices.len();
        let mut mlodf: Vec<Vec<f64>> = (0..nbr)
            .map(|m| branch_indices.iter().map(|&c| lin.lodf[m][c]).collect())
            .collect();

        // M is singular exactly when the group islands part of the network
        let mut splits_network = lin.splits_network(&branch_indices);
        if splits_network {
            warn!("outage group {branch_indices:?} splits the network; using single-outage factors");
        } else if nc > 1 {
            // MLODF = L·M⁻¹  <=>  Mᵀ·MLODF[m, :]ᵀ = L[m, :]ᵀ
            let mt: Vec<Vec<f64>> = (0..nc)
                .map(|i| {
                    (0..nc)
                        .map(|j| {
                            if i == j {
                                1.0
                            } else {
                                -lin.lodf[branch_indices[j]][branch_indices[i]]
                            }
                        })
                        .collect()
                })
                .collect();
            match DenseLu::factor(&mt).and_then(|lu| lu.solve_many(&mlodf)) {
                Ok(solved) => mlodf = solved,
                Err(e) => {
                    warn!(
                        "outage group {branch_indices:?}: singular outage system ({e}); using single-outage factors"
                    );
                    splits_network = true;
                }
            }
        }

        let compensated_ptdf = (0..nbr)
            .map(|m| {
                bus_indices
                    .iter()
                    .map(|&i| {
                        let via_outages: f64 = branch_indices
                            .iter()
                            .enumerate()
                            .map(|(c, &k)| mlodf[m][c] * lin.ptdf[k][i])
                            .sum();
                        lin.ptdf[m][i] + via_outages
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            branch_indices,
            bus_indices,
            injection_factors,
            mlodf,
            compensated_ptdf,
            splits_network,
        })
    }

    pub fn has_injection_contingencies(&self) -> bool {
        !self.bus_indices.is_empty()
    }

    /// Post-contingency flows. `injections` are bus injections in MW; factors
    /// with magnitude at or below `threshold` are skipped.
    pub fn contingency_flows(&self, base_flow: &[f64], injections: &[f64], threshold: f64) -> Vec<f64> {
        let delta: Vec<f64> = self
            .bus_indices
            .iter()
            .zip(&self.injection_factors)
            .map(|(&i, &factor)| factor * injections[i])
            .collect();

        base_flow
            .iter()
            .enumerate()
            .map(|(m, &base)| {
                let mut flow = base;
                for (c, &k) in self.branch_indices.iter().enumerate() {
                    let factor = self.mlodf[m][c];
                    if factor.abs() > threshold {
                        flow += factor * base_flow[k];
                    }
                }
                for (b, &dp) in delta.iter().enumerate() {
                    let factor = self.compensated_ptdf[m][b];
                    if factor.abs() > threshold {
                        flow += factor * dp;
                    }
                }
                flow
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volta_core::{Branch, Bus};

    /// Slack at 0, loads at 1 and 2, triangle of equal lines plus a radial spur 2-3.
    fn triangle_with_spur() -> NumericalCircuit {
        let mut c = NumericalCircuit::new(100.0);
        c.add_bus(Bus::slack("s", 1.0));
        c.add_bus(Bus::pq_load("a", 60.0, 0.0));
        c.add_bus(Bus::pq_load("b", 30.0, 0.0));
        c.add_bus(Bus::pq_load("c", 10.0, 0.0));
        c.add_branch(Branch::line("01", 0, 1, 0.0, 0.1, 0.0).with_rate(100.0));
        c.add_branch(Branch::line("12", 1, 2, 0.0, 0.1, 0.0).with_rate(100.0));
        c.add_branch(Branch::line("02", 0, 2, 0.0, 0.1, 0.0).with_rate(100.0));
        c.add_branch(Branch::line("23", 2, 3, 0.0, 0.1, 0.0).with_rate(100.0));
        c
    }

    #[test]
    fn test_reference_column_is_zero() {
        let res = LinearAnalysis::default().run(&triangle_with_spur()).unwrap();
        for row in &res.ptdf {
            assert_eq!(row[0], 0.0);
        }
    }

    #[test]
    fn test_triangle_ptdf_values() {
        let res = LinearAnalysis::default().run(&triangle_with_spur()).unwrap();
        // injecting at bus 1 returns 2/3 over 1-0 and 1/3 over 1-2-0
        assert!((res.ptdf[0][1] + 2.0 / 3.0).abs() < 1e-9);
        assert!((res.ptdf[1][1] - 1.0 / 3.0).abs() < 1e-9);
        assert!((res.ptdf[2][1] + 1.0 / 3.0).abs() < 1e-9);
        // the spur carries all of bus 3's injection
        assert!((res.ptdf[3][3] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_lodf_diagonal_and_radial_sentinel() {
        let res = LinearAnalysis::default().run(&triangle_with_spur()).unwrap();
        for (k, row) in res.lodf.iter().enumerate() {
            assert_eq!(row[k], -1.0);
            assert!(row.iter().all(|v| v.is_finite()));
        }
        // losing 0-1 pushes all its flow around 0-2-1 (1-2 is oriented against it)
        assert!((res.lodf[1][0] + 1.0).abs() < 1e-9);
        assert!((res.lodf[2][0] - 1.0).abs() < 1e-9);
        // the spur is radial: no other branch carries its flow
        for l in 0..3 {
            assert_eq!(res.lodf[l][3], 0.0);
        }
    }

    #[test]
    fn test_radial_branch_gets_sentinel_when_flow_has_nowhere_to_go() {
        // a single line: H = 1 on itself, every other entry zero
        let ptdf = vec![vec![0.0, -1.0], vec![0.0, -1.0]];
        let lodf = make_lodf(&ptdf, &[0, 0], &[1, 1], false, 1e-10).unwrap();
        assert_eq!(lodf[0][0], -1.0);
        assert_eq!(lodf[1][0], LODF_RADIAL_SENTINEL);
    }

    #[test]
    fn test_correct_values_zeroes_outliers() {
        let ptdf = vec![vec![0.0, -1.0], vec![0.0, -1.0]];
        let lodf = make_lodf(&ptdf, &[0, 0], &[1, 1], true, 1e-10).unwrap();
        assert_eq!(lodf[1][0], 0.0);
        assert_eq!(lodf[0][0], -1.0);
    }

    #[test]
    fn test_dc_flows_balance_at_slack() {
        let c = triangle_with_spur();
        let res = LinearAnalysis::default().run(&c).unwrap();
        let flows = res.get_flows(&c.p_injection());
        // everything leaving the slack equals the total load
        assert!((flows[0] + flows[2] - 100.0).abs() < 1e-6);
        assert!((flows[3] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_distributed_slack_columns_sum_to_zero_flow() {
        let opts = LinearAnalysisOptions {
            distributed_slack: true,
            ..LinearAnalysisOptions::default()
        };
        let res = LinearAnalysis::new(opts).run(&triangle_with_spur()).unwrap();
        // a uniform injection everywhere is fully balanced: no flow
        for row in &res.ptdf {
            let s: f64 = row.iter().sum();
            assert!(s.abs() < 1e-9, "row sum {s}");
        }
    }

    #[test]
    fn test_otdf_matches_definition() {
        let res = LinearAnalysis::default().run(&triangle_with_spur()).unwrap();
        let otdf = res.otdf(2);
        assert!((otdf[1][0] - (res.ptdf[1][2] + res.lodf[1][0] * res.ptdf[0][2])).abs() < 1e-12);
    }

    #[test]
    fn test_transfer_limits_keep_sign() {
        let ptdf = vec![vec![0.0, 0.5, -0.25]];
        let tmc = make_transfer_limits(&ptdf, &[20.0], &[100.0]);
        assert!((tmc[0] + 320.0).abs() < 1e-9);
    }

    #[test]
    fn test_multi_contingency_matches_resolved_network() {
        // two parallel paths between a meshed pair: ring 0-1-2-3-0 plus chord 0-2
        let mut c = NumericalCircuit::new(100.0);
        c.add_bus(Bus::slack("s", 1.0));
        c.add_bus(Bus::pq_load("a", 40.0, 0.0));
        c.add_bus(Bus::pq_load("b", 50.0, 0.0));
        c.add_bus(Bus::pq_load("c", 20.0, 0.0));
        c.add_branch(Branch::line("01", 0, 1, 0.0, 0.1, 0.0));
        c.add_branch(Branch::line("12", 1, 2, 0.0, 0.2, 0.0));
        c.add_branch(Branch::line("23", 2, 3, 0.0, 0.1, 0.0));
        c.add_branch(Branch::line("30", 3, 0, 0.0, 0.3, 0.0));
        c.add_branch(Branch::line("02", 0, 2, 0.0, 0.15, 0.0));

        let base = LinearAnalysis::default().run(&c).unwrap();
        let p = c.p_injection();
        let flows = base.get_flows(&p);

        let mc = LinearMultiContingency::new(&base, vec![1, 3], vec![], vec![]).unwrap();
        assert!(!mc.splits_network);
        let predicted = mc.contingency_flows(&flows, &p, 0.0);

        let outaged = c.with_branches_out(&[1, 3]);
        let direct = LinearAnalysis::default().run(&outaged).unwrap().get_flows(&p);
        for k in 0..c.nbr() {
            assert!(
                (predicted[k] - direct[k]).abs() < 1e-6,
                "branch {k}: {} vs {}",
                predicted[k],
                direct[k]
            );
        }
    }

    #[test]
    fn test_meshed_switch_skips_only_its_island() {
        let mut c = NumericalCircuit::new(100.0);
        c.add_bus(Bus::slack("s", 1.0));
        c.add_bus(Bus::pq_load("a", 20.0, 0.0));
        c.add_bus(Bus::pq_load("b", 30.0, 0.0));
        c.add_branch(Branch::line("01", 0, 1, 0.0, 0.1, 0.0));
        c.add_branch(Branch::line("02", 0, 2, 0.0, 0.1, 0.0));
        c.add_branch(Branch::switch("sw12", 1, 2));
        // a second, healthy island
        c.add_bus(Bus::slack("s2", 1.0));
        c.add_bus(Bus::pq_load("d", 10.0, 0.0));
        c.add_branch(Branch::line("34", 3, 4, 0.0, 0.1, 0.0));

        let res = LinearAnalysis::default().run(&c).unwrap();
        assert_eq!(res.skipped_islands, vec![0]);
        assert!(res.ptdf[0].iter().all(|&v| v == 0.0));
        assert!((res.ptdf[3][4] + 1.0).abs() < 1e-9);
        assert!(res.lodf.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_outage_group_splitting_network_is_flagged() {
        let c = triangle_with_spur();
        let base = LinearAnalysis::default().run(&c).unwrap();
        // 0-1 and 1-2 out isolate bus 1
        let mc = LinearMultiContingency::new(&base, vec![0, 1], vec![], vec![]).unwrap();
        assert!(mc.splits_network);
        assert_eq!(mc.mlodf[2][0], base.lodf[2][0]);

        let mc = LinearMultiContingency::new(&base, vec![0], vec![], vec![]).unwrap();
        assert!(!mc.splits_network);

        // the spur is radial on its own
        assert!(base.splits_network(&[3]));
        assert!(!base.splits_network(&[1]));
        assert!(base.splits_network(&[0, 2]));
    }

    #[test]
    fn test_injection_contingency_shifts_to_slack() {
        let c = triangle_with_spur();
        let base = LinearAnalysis::default().run(&c).unwrap();
        let p = c.p_injection();
        let flows = base.get_flows(&p);
        // the load at bus 3 disappears
        let mc = LinearMultiContingency::new(&base, vec![], vec![3], vec![-1.0]).unwrap();
        assert!(mc.has_injection_contingencies());
        let post = mc.contingency_flows(&flows, &p, 1e-5);
        assert!(post[3].abs() < 1e-9);
    }
}
