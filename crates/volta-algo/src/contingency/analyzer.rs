//! Contingency sweep over groups, in parallel.

use super::{
    ContingencyGroup, ContingencyReport, ContingencyReportEntry, OverloadStatus, RATE_TOLERANCE,
};
use crate::linear::{LinearAnalysis, LinearAnalysisResult, LinearMultiContingency};
use crate::power_flow::{MultiIslandResult, PowerFlowDriver};
use crate::srap::{evaluate_srap, SrapOutcome, SrapQuery};
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use volta_core::{
    AnalysisConfig, ContingencyEngine, NumericalCircuit, VoltaError, VoltaResult,
};
use web_time::Instant;

/// Progress callback: `(groups done, groups total)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Flows and overloads for every contingency group.
#[derive(Debug, Clone)]
pub struct ContingencyAnalysisResult {
    pub engine: ContingencyEngine,
    /// Pre-contingency branch flows (MW)
    pub base_flow: Vec<f64>,
    /// ngroups x nbr post-contingency flows (MW, signed by active power)
    pub sf: Vec<Vec<f64>>,
    /// ngroups x nbr, flow / rate
    pub loading: Vec<Vec<f64>>,
    /// Per group; false for groups skipped by cancellation, for Newton solves
    /// that did not converge, and for linear groups that split the network
    pub converged: Vec<bool>,
    pub report: ContingencyReport,
    pub cancelled: bool,
}

impl ContingencyAnalysisResult {
    pub fn ngroups(&self) -> usize {
        self.sf.len()
    }

    /// Worst |loading| per branch over all groups.
    pub fn max_loading(&self) -> Vec<f64> {
        let nbr = self.base_flow.len();
        let mut out = vec![0.0_f64; nbr];
        for row in &self.loading {
            for (m, l) in row.iter().enumerate() {
                out[m] = out[m].max(l.abs());
            }
        }
        out
    }
}

struct GroupOutcome {
    flows: Vec<f64>,
    converged: bool,
    entries: Vec<ContingencyReportEntry>,
}

/// Evaluates contingency groups with the engine selected in the config.
#[derive(Clone, Default)]
pub struct ContingencyAnalyzer {
    config: AnalysisConfig,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for ContingencyAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContingencyAnalyzer")
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ContingencyAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel: None,
            progress: None,
        }
    }

    /// Checked before each group and inside every Newton solve.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Called once per finished group, possibly from several threads.
    pub fn with_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn driver(&self) -> PowerFlowDriver {
        let driver = PowerFlowDriver::new(self.config.power_flow.clone());
        match &self.cancel {
            Some(flag) => driver.with_cancel_flag(flag.clone()),
            None => driver,
        }
    }

    pub fn run(
        &self,
        circuit: &NumericalCircuit,
        groups: &[ContingencyGroup],
    ) -> VoltaResult<ContingencyAnalysisResult> {
        self.run_with_base_flows(circuit, groups, None)
    }

    /// Like [`run`](Self::run), with caller-provided pre-contingency flows (MW)
    /// instead of the engine's own base case.
    pub fn run_with_base_flows(
        &self,
        circuit: &NumericalCircuit,
        groups: &[ContingencyGroup],
        base_flows: Option<&[f64]>,
    ) -> VoltaResult<ContingencyAnalysisResult> {
        self.config.validate()?;
        circuit.validate()?;
        let (nbus, nbr) = (circuit.nbus(), circuit.nbr());
        for group in groups {
            group.check(nbus, nbr)?;
        }
        if let Some(flows) = base_flows {
            if flows.len() != nbr {
                return Err(VoltaError::shape("base flows", nbr, flows.len()));
            }
        }

        let start = Instant::now();
        let engine = self.config.contingency.engine;
        let lin = LinearAnalysis::new(self.config.linear.clone()).run(circuit)?;
        let p_bus = circuit.p_injection();

        let base_flow = match (base_flows, engine) {
            (Some(flows), _) => flows.to_vec(),
            (None, ContingencyEngine::Linear) => lin.get_flows(&p_bus),
            (None, ContingencyEngine::PowerFlow) => signed_flows(&self.driver().run(circuit)?),
        };

        let available: Vec<f64> = circuit
            .buses
            .iter()
            .map(|b| if b.active { b.srap_available_power.max(0.0) } else { 0.0 })
            .collect();

        let total = groups.len();
        let done = AtomicUsize::new(0);
        let outcomes: Vec<VoltaResult<Option<GroupOutcome>>> = groups
            .par_iter()
            .enumerate()
            .map(|(g, group)| {
                if self.cancelled() {
                    return Ok(None);
                }
                let (buses, factors): (Vec<usize>, Vec<f64>) =
                    group.injections().into_iter().unzip();
                let mc = LinearMultiContingency::new(&lin, group.branches(), buses, factors)?;

                let (mut flows, converged) = match engine {
                    ContingencyEngine::Linear => {
                        if mc.splits_network {
                            warn!(
                                "contingency {g} '{}' splits the network; flows are single-outage superposition",
                                group.name
                            );
                        }
                        (
                            mc.contingency_flows(
                                &base_flow,
                                &p_bus,
                                self.config.contingency.contribution_threshold,
                            ),
                            !mc.splits_network,
                        )
                    }
                    ContingencyEngine::PowerFlow => {
                        let res = self.driver().run(&outaged_circuit(circuit, group))?;
                        (signed_flows(&res), res.converged)
                    }
                };
                for &k in &mc.branch_indices {
                    flows[k] = 0.0;
                }

                let entries = self.classify(circuit, g, group, &base_flow, &flows, &lin, &mc, &available);
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(progress) = &self.progress {
                    progress(n, total);
                }
                debug!(
                    "contingency {g} '{}': {} overloads ({n}/{total})",
                    group.name,
                    entries.len()
                );
                Ok(Some(GroupOutcome {
                    flows,
                    converged,
                    entries,
                }))
            })
            .collect();

        let mut result = ContingencyAnalysisResult {
            engine,
            base_flow,
            sf: Vec::with_capacity(total),
            loading: Vec::with_capacity(total),
            converged: Vec::with_capacity(total),
            report: ContingencyReport::default(),
            cancelled: false,
        };
        for outcome in outcomes {
            match outcome? {
                Some(o) => {
                    result.loading.push(loading_row(circuit, &o.flows));
                    result.sf.push(o.flows);
                    result.converged.push(o.converged);
                    result.report.entries.extend(o.entries);
                }
                None => {
                    result.cancelled = true;
                    result.sf.push(vec![0.0; nbr]);
                    result.loading.push(vec![0.0; nbr]);
                    result.converged.push(false);
                }
            }
        }
        result.report.sort();

        info!(
            "contingency analysis ({engine:?}): {total} groups, {} overloads in {:?}{}",
            result.report.len(),
            start.elapsed(),
            if result.cancelled { " (cancelled)" } else { "" }
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        circuit: &NumericalCircuit,
        g: usize,
        group: &ContingencyGroup,
        base_flow: &[f64],
        flows: &[f64],
        lin: &LinearAnalysisResult,
        mc: &LinearMultiContingency,
        available: &[f64],
    ) -> Vec<ContingencyReportEntry> {
        let srap = &self.config.contingency.srap;
        let mut entries = Vec::new();

        for (m, br) in circuit.branches.iter().enumerate() {
            if !br.monitor || !br.active || mc.branch_indices.contains(&m) || br.rate <= 0.0 {
                continue;
            }
            let flow = flows[m];
            let magnitude = flow.abs();
            let exceeds = |limit: f64| magnitude > limit * (1.0 + RATE_TOLERANCE);
            if !exceeds(br.rate) {
                continue;
            }

            let (status, srap_outcome) = if exceeds(br.contingency_rate) {
                (OverloadStatus::ExceedsProtectionRate, None)
            } else if srap.enabled && !exceeds(br.rate * srap.max_loading) {
                let sensitivity = post_outage_sensitivity(lin, mc, m);
                let outcome: SrapOutcome = evaluate_srap(&SrapQuery {
                    branch: m,
                    flow,
                    rate: br.rate,
                    sensitivity: &sensitivity,
                    available_power: available,
                    budget_mw: srap.budget_mw,
                    top_n: srap.top_n,
                });
                let status = if outcome.solvable {
                    OverloadStatus::SrapSolvable
                } else {
                    OverloadStatus::SrapNotSolvable
                };
                (status, Some(outcome))
            } else {
                (OverloadStatus::ExceedsRate, None)
            };

            entries.push(ContingencyReportEntry {
                group: g,
                group_name: group.name.clone(),
                branch: m,
                branch_name: br.name.clone(),
                base_flow: base_flow[m],
                flow,
                rate: br.rate,
                contingency_rate: br.contingency_rate,
                loading: magnitude / br.rate,
                status,
                srap: srap_outcome,
            });
        }
        entries
    }
}

/// PTDF row of branch `m` with the group's branches out.
fn post_outage_sensitivity(
    lin: &LinearAnalysisResult,
    mc: &LinearMultiContingency,
    m: usize,
) -> Vec<f64> {
    let mut row = lin.ptdf[m].clone();
    for (c, &k) in mc.branch_indices.iter().enumerate() {
        let factor = mc.mlodf[m][c];
        for (s, p) in row.iter_mut().zip(&lin.ptdf[k]) {
            *s += factor * p;
        }
    }
    row
}

/// The circuit with the group applied: branches off, injections scaled.
fn outaged_circuit(circuit: &NumericalCircuit, group: &ContingencyGroup) -> NumericalCircuit {
    let mut out = circuit.with_branches_out(&group.branches());
    for (bus, factor) in group.injections() {
        let b = &mut out.buses[bus];
        b.s0 *= 1.0 + factor;
    }
    out
}

/// |Sf| carrying the sign of the active power.
fn signed_flows(res: &MultiIslandResult) -> Vec<f64> {
    res.sf.iter().map(|s| s.norm().copysign(s.re)).collect()
}

fn loading_row(circuit: &NumericalCircuit, flows: &[f64]) -> Vec<f64> {
    circuit
        .branches
        .iter()
        .zip(flows)
        .map(|(br, f)| if br.rate > 0.0 { f / br.rate } else { 0.0 })
        .collect()
}
