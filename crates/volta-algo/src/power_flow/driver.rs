//! Multi-island power flow driver.

use super::{NewtonRaphson, PowerFlowProblem, PowerFlowResult, Reclassification, SolverStatus};
use crate::topology::split_into_islands;
use num_complex::Complex64;
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};
use volta_core::{BusType, NumericalCircuit, PowerFlowOptions, VoltaError, VoltaResult};

/// What happened to one island.
#[derive(Debug, Clone)]
pub struct IslandSummary {
    pub index: usize,
    /// Original bus indices
    pub buses: Vec<usize>,
    /// Original branch indices
    pub branches: Vec<usize>,
    /// `None` when the island was skipped or unsolvable
    pub status: Option<SolverStatus>,
    pub iterations: usize,
    pub norm_f: f64,
    pub unsolvable: bool,
}

/// Full-size power flow results. Powers are in MVA.
#[derive(Debug, Clone)]
pub struct MultiIslandResult {
    pub v: Vec<Complex64>,
    pub scalc: Vec<Complex64>,
    pub sf: Vec<Complex64>,
    pub st: Vec<Complex64>,
    pub losses: Vec<Complex64>,
    /// |Sf| / rate
    pub loading: Vec<f64>,
    pub bus_types: Vec<BusType>,
    /// Every solved island converged
    pub converged: bool,
    pub islands: Vec<IslandSummary>,
    /// Reclassification events with original bus indices
    pub reclassifications: Vec<Reclassification>,
}

impl MultiIslandResult {
    pub fn unsolvable_islands(&self) -> Vec<usize> {
        self.islands
            .iter()
            .filter(|s| s.unsolvable)
            .map(|s| s.index)
            .collect()
    }
}

/// Splits a circuit into islands and solves each with [`NewtonRaphson`].
#[derive(Debug, Clone, Default)]
pub struct PowerFlowDriver {
    solver: NewtonRaphson,
}

impl PowerFlowDriver {
    pub fn new(options: PowerFlowOptions) -> Self {
        Self {
            solver: NewtonRaphson::new(options),
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.solver = self.solver.with_cancel_flag(flag);
        self
    }

    pub fn run(&self, circuit: &NumericalCircuit) -> VoltaResult<MultiIslandResult> {
        self.solver.options().validate()?;
        let islands = split_into_islands(circuit)?;
        let ignore_single = self.solver.options().ignore_single_node_islands;

        let outcomes: Vec<VoltaResult<Option<PowerFlowResult>>> = islands
            .par_iter()
            .map(|island| {
                if ignore_single && island.is_single_node() {
                    debug!("skipping single-bus island {}", island.index());
                    return Ok(None);
                }
                let compact = island.to_circuit()?;
                let problem = PowerFlowProblem::from_circuit(&compact)?.with_island(island.index());
                match self.solver.solve(&problem) {
                    Ok(res) => Ok(Some(res)),
                    Err(VoltaError::UnsolvableIsland(i)) => {
                        warn!("island {i} has no slack candidate; excluded");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .collect();

        let nbus = circuit.nbus();
        let nbr = circuit.nbr();
        let zero = Complex64::new(0.0, 0.0);
        let sbase = circuit.sbase;
        let mut out = MultiIslandResult {
            v: vec![zero; nbus],
            scalc: vec![zero; nbus],
            sf: vec![zero; nbr],
            st: vec![zero; nbr],
            losses: vec![zero; nbr],
            loading: vec![0.0; nbr],
            bus_types: circuit.bus_types(),
            converged: true,
            islands: Vec::with_capacity(islands.len()),
            reclassifications: Vec::new(),
        };

        for (island, outcome) in islands.iter().zip(outcomes) {
            let result = outcome?;
            let skipped = ignore_single && island.is_single_node();
            let mut summary = IslandSummary {
                index: island.index(),
                buses: island.buses().to_vec(),
                branches: island.branches().to_vec(),
                status: None,
                iterations: 0,
                norm_f: 0.0,
                unsolvable: result.is_none() && !skipped,
            };

            if let Some(res) = result {
                for (local, &bus) in island.buses().iter().enumerate() {
                    out.v[bus] = res.v[local];
                    out.scalc[bus] = res.scalc[local] * sbase;
                    out.bus_types[bus] = res.bus_types[local];
                }
                for (local, &k) in island.branches().iter().enumerate() {
                    let sf = res.sf[local] * sbase;
                    let st = res.st[local] * sbase;
                    out.sf[k] = sf;
                    out.st[k] = st;
                    out.losses[k] = sf + st;
                    let rate = circuit.branches[k].rate;
                    out.loading[k] = if rate > 0.0 { sf.norm() / rate } else { 0.0 };
                }
                out.reclassifications
                    .extend(res.reclassifications.iter().map(|ev| Reclassification {
                        bus: island.buses()[ev.bus],
                        ..ev.clone()
                    }));
                out.converged &= res.converged;
                summary.status = Some(res.status);
                summary.iterations = res.iterations;
                summary.norm_f = res.norm_f;
            }
            out.islands.push(summary);
        }

        info!(
            "power flow over {} islands: converged = {}, {} unsolvable",
            out.islands.len(),
            out.converged,
            out.unsolvable_islands().len()
        );
        Ok(out)
    }
}
