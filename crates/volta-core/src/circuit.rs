//! Snapshot circuit model.
//!
//! A [`NumericalCircuit`] is the arena every algorithm works on: one owned
//! array of [`Bus`] records and one of [`Branch`] records, addressed by dense
//! indices `0..nbus` and `0..nbr`. Powers are stored in MW/MVAr/MVA and are
//! normalized by [`NumericalCircuit::sbase`] at the point of use; impedances
//! are already in per unit.
//!
//! Branch kinds are a tagged variant ([`BranchKind`]) sharing the physical
//! fields of [`Branch`]. The admittance assembly resolves them once into
//! uniform per-branch arrays.

use crate::error::{VoltaError, VoltaResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

/// Bus type code driving the Newton state layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    /// P and Q specified; |V| and angle unknown
    PQ,
    /// P and |V| specified; Q and angle unknown
    PV,
    /// |V| and angle fixed; absorbs the island balance
    Slack,
    /// P, Q and |V| specified; voltage held by a remote P bus
    PQV,
    /// P specified; |V| and Q free while regulating a remote PQV bus
    P,
}

impl BusType {
    /// PV-type buses are the ones subject to reactive-limit checks.
    pub fn is_voltage_controlled(&self) -> bool {
        matches!(self, BusType::PV | BusType::PQV | BusType::P)
    }
}

/// Bus record.
#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    pub name: String,
    pub bus_type: BusType,
    pub active: bool,
    /// Voltage magnitude set point (p.u.) for slack/PV/PQV buses
    pub vm_set: f64,
    pub vmin: f64,
    pub vmax: f64,
    /// Constant-power part of the net injection (generation minus load, MVA)
    pub s0: Complex64,
    /// Constant-current part of the net injection (MVA at 1 p.u.)
    pub i0: Complex64,
    /// Constant-admittance part of the net injection (MVA at 1 p.u.)
    pub y0: Complex64,
    /// Shunt admittance G + jB (MVA at 1 p.u.)
    pub shunt: Complex64,
    /// Net reactive injection limits (MVAr)
    pub qmin: f64,
    pub qmax: f64,
    /// Generation available for SRAP redispatch (MW)
    pub srap_available_power: f64,
    /// For P buses: the PQV bus whose voltage this bus regulates
    pub regulated_bus: Option<usize>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus_type: BusType::PQ,
            active: true,
            vm_set: 1.0,
            vmin: 0.9,
            vmax: 1.1,
            s0: Complex64::new(0.0, 0.0),
            i0: Complex64::new(0.0, 0.0),
            y0: Complex64::new(0.0, 0.0),
            shunt: Complex64::new(0.0, 0.0),
            qmin: f64::NEG_INFINITY,
            qmax: f64::INFINITY,
            srap_available_power: 0.0,
            regulated_bus: None,
        }
    }
}

impl Bus {
    pub fn new(name: impl Into<String>, bus_type: BusType) -> Self {
        Self {
            name: name.into(),
            bus_type,
            ..Self::default()
        }
    }

    pub fn slack(name: impl Into<String>, vm_set: f64) -> Self {
        Self::new(name, BusType::Slack).with_voltage_set_point(vm_set)
    }

    pub fn pv(name: impl Into<String>, p_mw: f64, vm_set: f64) -> Self {
        Self::new(name, BusType::PV)
            .with_injection(p_mw, 0.0)
            .with_voltage_set_point(vm_set)
    }

    /// A load bus consuming `p_mw + j q_mvar`.
    pub fn pq_load(name: impl Into<String>, p_mw: f64, q_mvar: f64) -> Self {
        Self::new(name, BusType::PQ).with_injection(-p_mw, -q_mvar)
    }

    /// Set the constant-power net injection (positive = generation).
    pub fn with_injection(mut self, p_mw: f64, q_mvar: f64) -> Self {
        self.s0 = Complex64::new(p_mw, q_mvar);
        self
    }

    /// Set the voltage-dependent ZIP components.
    pub fn with_zip(mut self, i0: Complex64, y0: Complex64) -> Self {
        self.i0 = i0;
        self.y0 = y0;
        self
    }

    pub fn with_voltage_set_point(mut self, vm_set: f64) -> Self {
        self.vm_set = vm_set;
        self
    }

    pub fn with_q_limits(mut self, qmin: f64, qmax: f64) -> Self {
        self.qmin = qmin;
        self.qmax = qmax;
        self
    }

    pub fn with_shunt(mut self, g_mw: f64, b_mvar: f64) -> Self {
        self.shunt = Complex64::new(g_mw, b_mvar);
        self
    }

    pub fn with_srap_available_power(mut self, p_mw: f64) -> Self {
        self.srap_available_power = p_mw;
        self
    }

    pub fn regulating(mut self, pqv_bus: usize) -> Self {
        self.regulated_bus = Some(pqv_bus);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Converter (VSC) specific parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConverterParams {
    /// AC/DC voltage ratio
    pub k: f64,
    /// Equivalent susceptance of the converter filter (p.u.)
    pub beq: f64,
    /// Constant switching conductance (p.u.)
    pub g0: f64,
    /// Loss polynomial coefficients: G = g0 + a If² + b If + c
    pub loss_a: f64,
    pub loss_b: f64,
    pub loss_c: f64,
    /// Last known "from" current magnitude (p.u.)
    pub i_from: f64,
}

impl Default for ConverterParams {
    fn default() -> Self {
        Self {
            k: 1.0,
            beq: 0.0,
            g0: 0.0,
            loss_a: 0.0,
            loss_b: 0.0,
            loss_c: 0.0,
            i_from: 0.0,
        }
    }
}

impl ConverterParams {
    /// Switching/conduction conductance for a "from" current magnitude.
    pub fn switching_conductance(&self, i_from: f64) -> f64 {
        self.g0 + self.loss_a * i_from * i_from + self.loss_b * i_from + self.loss_c
    }
}

/// Branch kind. Shared physical data lives on [`Branch`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BranchKind {
    #[default]
    Line,
    Transformer,
    Converter(ConverterParams),
    Switch,
}

/// Tap control mode of a transformer or converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TapControl {
    #[default]
    Fixed,
    /// Module controls the "from" voltage
    Vf,
    /// Module controls the "to" voltage
    Vt,
    /// Module controls the "from" reactive flow
    Qf,
    /// Module controls the "to" reactive flow
    Qt,
    /// Angle controls the "from" real flow
    Pf,
    /// Angle controls Pf and module controls the "to" voltage
    PfVt,
    /// Angle controls Pf and module controls Qt
    PfQt,
}

impl TapControl {
    pub fn controls_module(&self) -> bool {
        matches!(
            self,
            TapControl::Vf
                | TapControl::Vt
                | TapControl::Qf
                | TapControl::Qt
                | TapControl::PfVt
                | TapControl::PfQt
        )
    }

    pub fn controls_angle(&self) -> bool {
        matches!(self, TapControl::Pf | TapControl::PfVt | TapControl::PfQt)
    }
}

/// Branch record.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub name: String,
    pub from: usize,
    pub to: usize,
    pub kind: BranchKind,
    pub r: f64,
    pub x: f64,
    /// Total shunt conductance (p.u.)
    pub g: f64,
    /// Total line charging susceptance (p.u.)
    pub b: f64,
    pub tap_module: f64,
    /// Phase shift (radians)
    pub tap_angle: f64,
    /// Virtual taps from nominal voltage mismatch
    pub vtap_f: f64,
    pub vtap_t: f64,
    /// Branch-side shunts at each terminal (p.u.)
    pub yshunt_f: Complex64,
    pub yshunt_t: Complex64,
    pub control: TapControl,
    /// Normal rating (MVA)
    pub rate: f64,
    /// Protection / contingency rating (MVA)
    pub contingency_rate: f64,
    pub active: bool,
    pub monitor: bool,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            name: String::new(),
            from: 0,
            to: 0,
            kind: BranchKind::Line,
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            tap_module: 1.0,
            tap_angle: 0.0,
            vtap_f: 1.0,
            vtap_t: 1.0,
            yshunt_f: Complex64::new(0.0, 0.0),
            yshunt_t: Complex64::new(0.0, 0.0),
            control: TapControl::Fixed,
            rate: 9999.0,
            contingency_rate: 9999.0,
            active: true,
            monitor: true,
        }
    }
}

impl Branch {
    pub fn line(name: impl Into<String>, from: usize, to: usize, r: f64, x: f64, b: f64) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            r,
            x,
            b,
            ..Self::default()
        }
    }

    pub fn transformer(
        name: impl Into<String>,
        from: usize,
        to: usize,
        r: f64,
        x: f64,
        tap_module: f64,
        tap_angle: f64,
    ) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            kind: BranchKind::Transformer,
            r,
            x,
            tap_module,
            tap_angle,
            ..Self::default()
        }
    }

    pub fn converter(
        name: impl Into<String>,
        from: usize,
        to: usize,
        r: f64,
        x: f64,
        params: ConverterParams,
    ) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            kind: BranchKind::Converter(params),
            r,
            x,
            ..Self::default()
        }
    }

    /// Zero-impedance switch.
    pub fn switch(name: impl Into<String>, from: usize, to: usize) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            kind: BranchKind::Switch,
            ..Self::default()
        }
    }

    /// Set both ratings; the contingency rating defaults to the normal one.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self.contingency_rate = rate;
        self
    }

    pub fn with_contingency_rate(mut self, rate: f64) -> Self {
        self.contingency_rate = rate;
        self
    }

    pub fn with_control(mut self, control: TapControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_virtual_taps(mut self, vtap_f: f64, vtap_t: f64) -> Self {
        self.vtap_f = vtap_f;
        self.vtap_t = vtap_t;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_monitor(mut self, monitor: bool) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn is_converter(&self) -> bool {
        matches!(self.kind, BranchKind::Converter(_))
    }
}

/// Branch-bus incidence matrices, column-compressed (rows = branches, cols = buses).
#[derive(Debug, Clone)]
pub struct Connectivity {
    pub cf: CsMat<f64>,
    pub ct: CsMat<f64>,
}

/// One snapshot of the network: dense bus/branch arrays plus base power.
#[derive(Debug, Clone)]
pub struct NumericalCircuit {
    /// System base power (MVA)
    pub sbase: f64,
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
}

impl Default for NumericalCircuit {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl NumericalCircuit {
    pub fn new(sbase: f64) -> Self {
        Self {
            sbase,
            buses: Vec::new(),
            branches: Vec::new(),
        }
    }

    /// Append a bus and return its index.
    pub fn add_bus(&mut self, bus: Bus) -> usize {
        self.buses.push(bus);
        self.buses.len() - 1
    }

    /// Append a branch and return its index.
    pub fn add_branch(&mut self, branch: Branch) -> usize {
        self.branches.push(branch);
        self.branches.len() - 1
    }

    pub fn nbus(&self) -> usize {
        self.buses.len()
    }

    pub fn nbr(&self) -> usize {
        self.branches.len()
    }

    /// Check the structural invariants: positive base, every branch on valid
    /// and distinct buses, regulated buses in range.
    pub fn validate(&self) -> VoltaResult<()> {
        if self.sbase.is_nan() || self.sbase <= 0.0 {
            return Err(VoltaError::Validation(format!(
                "base power must be positive, got {}",
                self.sbase
            )));
        }
        let nbus = self.nbus();
        for (k, br) in self.branches.iter().enumerate() {
            if br.from >= nbus || br.to >= nbus {
                return Err(VoltaError::Validation(format!(
                    "branch {} ({}) references bus {}->{} but there are {} buses",
                    k, br.name, br.from, br.to, nbus
                )));
            }
            if br.from == br.to {
                return Err(VoltaError::Validation(format!(
                    "branch {} ({}) connects bus {} to itself",
                    k, br.name, br.from
                )));
            }
        }
        for (i, bus) in self.buses.iter().enumerate() {
            if let Some(j) = bus.regulated_bus {
                if j >= nbus {
                    return Err(VoltaError::Validation(format!(
                        "bus {} ({}) regulates unknown bus {}",
                        i, bus.name, j
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn bus_active(&self) -> Vec<bool> {
        self.buses.iter().map(|b| b.active).collect()
    }

    pub fn branch_active(&self) -> Vec<bool> {
        self.branches.iter().map(|b| b.active).collect()
    }

    pub fn bus_types(&self) -> Vec<BusType> {
        self.buses.iter().map(|b| b.bus_type).collect()
    }

    /// Branch-bus incidence matrices Cf and Ct.
    ///
    /// Every branch gets its entry regardless of its active flag; activity is
    /// applied by the consumers.
    pub fn connectivity(&self) -> VoltaResult<Connectivity> {
        self.validate()?;
        let shape = (self.nbr(), self.nbus());
        let mut cf = TriMat::new(shape);
        let mut ct = TriMat::new(shape);
        for (k, br) in self.branches.iter().enumerate() {
            cf.add_triplet(k, br.from, 1.0);
            ct.add_triplet(k, br.to, 1.0);
        }
        Ok(Connectivity {
            cf: cf.to_csc(),
            ct: ct.to_csc(),
        })
    }

    /// Per-unit ZIP components (S0, I0, Y0).
    pub fn zip_injections_pu(&self) -> (Vec<Complex64>, Vec<Complex64>, Vec<Complex64>) {
        let s = self.sbase;
        let s0 = self.buses.iter().map(|b| b.s0 / s).collect();
        let i0 = self.buses.iter().map(|b| b.i0 / s).collect();
        let y0 = self.buses.iter().map(|b| b.y0 / s).collect();
        (s0, i0, y0)
    }

    /// Net real injection per bus (MW), used for slack selection.
    pub fn p_injection(&self) -> Vec<f64> {
        self.buses.iter().map(|b| b.s0.re).collect()
    }

    /// Flat start honoring voltage set points of voltage-controlled buses.
    pub fn initial_voltage(&self) -> Vec<Complex64> {
        self.buses
            .iter()
            .map(|b| match b.bus_type {
                BusType::Slack | BusType::PV | BusType::PQV => Complex64::new(b.vm_set, 0.0),
                BusType::PQ | BusType::P => Complex64::new(1.0, 0.0),
            })
            .collect()
    }

    /// Copy of this circuit with the given branches switched off.
    pub fn with_branches_out(&self, outaged: &[usize]) -> Self {
        let mut out = self.clone();
        for &k in outaged {
            if let Some(br) = out.branches.get_mut(k) {
                br.active = false;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_bus() -> NumericalCircuit {
        let mut c = NumericalCircuit::new(100.0);
        c.add_bus(Bus::slack("b0", 1.02));
        c.add_bus(Bus::pv("b1", 40.0, 1.01));
        c.add_bus(Bus::pq_load("b2", 60.0, 20.0));
        c.add_branch(Branch::line("l01", 0, 1, 0.01, 0.1, 0.02));
        c.add_branch(Branch::line("l12", 1, 2, 0.01, 0.1, 0.02));
        c.add_branch(Branch::line("l02", 0, 2, 0.01, 0.1, 0.02));
        c
    }

    #[test]
    fn test_validate_ok() {
        assert!(three_bus().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_branch() {
        let mut c = three_bus();
        c.add_branch(Branch::line("bad", 0, 7, 0.0, 0.1, 0.0));
        let err = c.validate().unwrap_err();
        assert!(matches!(err, VoltaError::Validation(_)));
    }

    #[test]
    fn test_connectivity_shape() {
        let c = three_bus();
        let conn = c.connectivity().unwrap();
        assert_eq!(conn.cf.rows(), 3);
        assert_eq!(conn.cf.cols(), 3);
        assert_eq!(conn.cf.nnz(), 3);
        assert_eq!(conn.ct.get(1, 2), Some(&1.0));
        assert_eq!(conn.cf.get(2, 0), Some(&1.0));
    }

    #[test]
    fn test_initial_voltage_uses_set_points() {
        let v0 = three_bus().initial_voltage();
        assert_eq!(v0[0], Complex64::new(1.02, 0.0));
        assert_eq!(v0[1], Complex64::new(1.01, 0.0));
        assert_eq!(v0[2], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_zip_per_unit() {
        let (s0, _, _) = three_bus().zip_injections_pu();
        assert!((s0[2].re + 0.6).abs() < 1e-12);
        assert!((s0[2].im + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_switching_conductance_polynomial() {
        let p = ConverterParams {
            g0: 0.01,
            loss_a: 2.0,
            loss_b: 0.5,
            loss_c: 0.1,
            ..ConverterParams::default()
        };
        // 0.01 + 2*4 + 0.5*2 + 0.1
        assert!((p.switching_conductance(2.0) - 9.11).abs() < 1e-12);
    }

    #[test]
    fn test_tap_control_flags() {
        assert!(TapControl::PfVt.controls_module());
        assert!(TapControl::PfVt.controls_angle());
        assert!(!TapControl::Fixed.controls_module());
        assert!(!TapControl::Vt.controls_angle());
    }
}
