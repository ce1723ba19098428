//! # volta-algo: Steady-State Network Analysis
//!
//! Turns a [`volta_core::NumericalCircuit`] into sparse models and solves them.
//!
//! ## Pipeline
//!
//! ```text
//! topology ─► admittance ─► indices ─┬─► power_flow ──┐
//!                                    └─► linear ──────┴─► contingency ─► srap
//! ```
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`topology`] | Bus adjacency, island discovery, island element sets |
//! | [`admittance`] | Ybus/Yf/Yt, split series/shunt model, DC Bbus/Bf |
//! | [`indices`] | Bus classification (slack, PV, PQ, PQV, P), branch control sets |
//! | [`power_flow`] | Newton-Raphson with backtracking and Q-limit switching, multi-island driver |
//! | [`linear`] | PTDF, LODF, OTDF, transfer limits, multi-outage factors |
//! | [`contingency`] | Linear and AC contingency sweeps with overload classification |
//! | [`srap`] | Remedial redispatch feasibility for an overloaded branch |
//!
//! Islands and contingency groups run in parallel on the rayon pool; a single
//! Newton solve is sequential.
//!
//! ## Example
//!
//! ```ignore
//! use volta_algo::{ContingencyAnalyzer, ContingencyGroup, PowerFlowDriver};
//! use volta_core::{AnalysisConfig, Branch, Bus, NumericalCircuit};
//!
//! let mut circuit = NumericalCircuit::new(100.0);
//! circuit.add_bus(Bus::slack("North", 1.0));
//! circuit.add_bus(Bus::pq_load("South", 50.0, 10.0));
//! circuit.add_branch(Branch::line("N-S 1", 0, 1, 0.01, 0.1, 0.0).with_rate(60.0));
//! circuit.add_branch(Branch::line("N-S 2", 0, 1, 0.01, 0.1, 0.0).with_rate(60.0));
//!
//! let pf = PowerFlowDriver::default().run(&circuit)?;
//! assert!(pf.converged);
//!
//! let groups = [ContingencyGroup::branch_outage(0)];
//! let ca = ContingencyAnalyzer::new(AnalysisConfig::default()).run(&circuit, &groups)?;
//! println!("{} overloads", ca.report.len());
//! ```

pub mod admittance;
pub mod contingency;
pub mod indices;
pub mod linalg;
pub mod linear;
pub mod power_flow;
pub mod srap;
pub mod topology;

pub use admittance::{AdmittanceMatrices, BranchArrays, LinearAdmittances, SplitAdmittances};
pub use contingency::{
    ContingencyAnalysisResult, ContingencyAnalyzer, ContingencyElement, ContingencyGroup,
    ContingencyReport, ContingencyReportEntry, OverloadStatus,
};
pub use indices::{BranchControlIndices, SimulationIndices};
pub use linear::{LinearAnalysis, LinearAnalysisResult, LinearMultiContingency};
pub use power_flow::{
    MultiIslandResult, NewtonRaphson, PowerFlowDriver, PowerFlowProblem, PowerFlowResult,
    Reclassification, SolverStatus,
};
pub use srap::{aggregate_available_power, evaluate_srap, SrapOutcome, SrapQuery, SrapUnit};
pub use topology::split_into_islands;
