//! # AC Power Flow
//!
//! Newton-Raphson over the bus sets of [`SimulationIndices`]:
//!
//! ```text
//! ┌────────────┬──────────────────┬──────────────────┐
//! │  BUS TYPE  │  SPECIFIED       │  SOLVED FOR      │
//! │────────────│──────────────────│──────────────────│
//! │  Slack     │  |V|, θ          │  P, Q            │
//! │  PV        │  P, |V|          │  Q, θ            │
//! │  PQ        │  P, Q            │  |V|, θ          │
//! │  PQV       │  P, Q, |V|       │  θ               │
//! │  P         │  P               │  Q, |V|, θ       │
//! └────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! A P bus and the PQV bus it regulates trade one magnitude unknown for one
//! Q equation, so the reduced system stays square.
//!
//! [`NewtonRaphson`] solves one compact island; [`PowerFlowDriver`] splits a
//! circuit into islands, solves them in parallel and scatters the results
//! back into full-size arrays.

mod driver;
mod jacobian;
mod newton;

pub use driver::{IslandSummary, MultiIslandResult, PowerFlowDriver};
pub use newton::NewtonRaphson;

use crate::admittance::{bus_shunts_pu, BranchArrays};
use crate::indices::SimulationIndices;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use volta_core::{BusType, NumericalCircuit, VoltaError, VoltaResult};

/// Terminal state of a Newton run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Converged,
    SingularJacobian,
    MaxIterationsExceeded,
    BacktrackExhausted,
    Cancelled,
}

/// One PV-type to PQ transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reclassification {
    /// Outer iteration at which the limit was found
    pub iteration: usize,
    pub bus: usize,
    pub from: BusType,
    /// Reactive injection when the violation was detected (p.u.)
    pub q_calc: f64,
    /// Reactive injection held from then on (p.u.)
    pub q_pinned: f64,
}

/// Per-unit inputs of one Newton run.
#[derive(Debug, Clone)]
pub struct PowerFlowProblem {
    /// Island number, used in logs and errors
    pub island: usize,
    pub branches: BranchArrays,
    pub yshunt_bus: Vec<Complex64>,
    pub s0: Vec<Complex64>,
    pub i0: Vec<Complex64>,
    pub y0: Vec<Complex64>,
    pub v0: Vec<Complex64>,
    pub indices: SimulationIndices,
    pub qmin: Vec<f64>,
    pub qmax: Vec<f64>,
}

impl PowerFlowProblem {
    pub fn from_circuit(circuit: &NumericalCircuit) -> VoltaResult<Self> {
        circuit.validate()?;
        let (s0, i0, y0) = circuit.zip_injections_pu();
        Ok(Self {
            island: 0,
            branches: BranchArrays::from_circuit(circuit),
            yshunt_bus: bus_shunts_pu(circuit),
            s0,
            i0,
            y0,
            v0: circuit.initial_voltage(),
            indices: SimulationIndices::from_circuit(circuit),
            qmin: circuit.buses.iter().map(|b| b.qmin / circuit.sbase).collect(),
            qmax: circuit.buses.iter().map(|b| b.qmax / circuit.sbase).collect(),
        })
    }

    pub fn with_island(mut self, island: usize) -> Self {
        self.island = island;
        self
    }

    /// Replace the starting voltage.
    pub fn with_initial_voltage(mut self, v0: Vec<Complex64>) -> Self {
        self.v0 = v0;
        self
    }

    pub fn nbus(&self) -> usize {
        self.yshunt_bus.len()
    }

    pub(crate) fn check(&self) -> VoltaResult<()> {
        let n = self.nbus();
        for (name, len) in [
            ("s0", self.s0.len()),
            ("i0", self.i0.len()),
            ("y0", self.y0.len()),
            ("v0", self.v0.len()),
            ("qmin", self.qmin.len()),
            ("qmax", self.qmax.len()),
            ("bus types", self.indices.nbus()),
        ] {
            if len != n {
                return Err(VoltaError::shape(name, n, len));
            }
        }
        Ok(())
    }
}

/// Outcome of one Newton run. Powers are per unit.
#[derive(Debug, Clone)]
pub struct PowerFlowResult {
    pub v: Vec<Complex64>,
    pub converged: bool,
    /// Infinity norm of the final mismatch
    pub norm_f: f64,
    /// Computed bus injections `V·conj(Ybus·V)`
    pub scalc: Vec<Complex64>,
    /// Branch power at the "from" end
    pub sf: Vec<Complex64>,
    /// Branch power at the "to" end
    pub st: Vec<Complex64>,
    pub iterations: usize,
    pub elapsed: Duration,
    pub status: SolverStatus,
    /// Bus types after reactive-limit switching
    pub bus_types: Vec<BusType>,
    pub reclassifications: Vec<Reclassification>,
}

impl PowerFlowResult {
    pub fn vm(&self) -> Vec<f64> {
        self.v.iter().map(|v| v.norm()).collect()
    }

    pub fn va(&self) -> Vec<f64> {
        self.v.iter().map(|v| v.arg()).collect()
    }
}
