//! Admittance models: nonlinear (Ybus/Yf/Yt), split (Yseries/Yshunt) and
//! linear (Bbus/Bf).
//!
//! All three views come from the same [`BranchArrays`], the uniform
//! per-branch representation of every [`BranchKind`]:
//!
//! ```text
//! ys   = 1 / (R + jX)            bc = G + jB          tap = k·m·e^{jθ}
//!
//! Yff  = Gsw + (ys + bc/2 + jBeq + ysh_f) / (tap·conj(tap)·mf²)
//! Yft  = -ys / (conj(tap)·mf·mt)
//! Ytf  = -ys / (tap·mt·mf)
//! Ytt  = (ys + bc/2 + ysh_t) / mt²
//!
//! Yf   = diag(Yff)·Cf + diag(Yft)·Ct
//! Yt   = diag(Ytf)·Cf + diag(Ytt)·Ct
//! Ybus = Cfᵀ·Yf + Ctᵀ·Yt + diag(Ysh_bus)
//! ```
//!
//! Gsw is the converter switching conductance `G0 + a·If² + b·If + c`; it
//! depends on the "from" current, so a solver modeling converter losses
//! calls [`BranchArrays::update_converter_losses`] and rebuilds.

use crate::linalg::mat_vec;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use volta_core::{BranchKind, ConverterParams, NumericalCircuit, VoltaError, VoltaResult};

/// Added to impedances and reactances so zero-impedance switches stay finite.
pub const IMPEDANCE_EPS: f64 = 1e-20;

/// Per-branch parameters with every branch kind resolved.
#[derive(Debug, Clone)]
pub struct BranchArrays {
    pub from: Vec<usize>,
    pub to: Vec<usize>,
    pub active: Vec<bool>,
    pub r: Vec<f64>,
    pub x: Vec<f64>,
    pub g: Vec<f64>,
    pub b: Vec<f64>,
    /// Converter ratio (1 for non-converters)
    pub k: Vec<f64>,
    pub m: Vec<f64>,
    pub tau: Vec<f64>,
    pub vtap_f: Vec<f64>,
    pub vtap_t: Vec<f64>,
    pub beq: Vec<f64>,
    pub gsw: Vec<f64>,
    pub yshunt_f: Vec<Complex64>,
    pub yshunt_t: Vec<Complex64>,
    /// Loss model of converter branches
    pub converter: Vec<Option<ConverterParams>>,
}

impl BranchArrays {
    pub fn from_circuit(circuit: &NumericalCircuit) -> Self {
        let n = circuit.nbr();
        let mut arrays = Self {
            from: Vec::with_capacity(n),
            to: Vec::with_capacity(n),
            active: Vec::with_capacity(n),
            r: Vec::with_capacity(n),
            x: Vec::with_capacity(n),
            g: Vec::with_capacity(n),
            b: Vec::with_capacity(n),
            k: Vec::with_capacity(n),
            m: Vec::with_capacity(n),
            tau: Vec::with_capacity(n),
            vtap_f: Vec::with_capacity(n),
            vtap_t: Vec::with_capacity(n),
            beq: Vec::with_capacity(n),
            gsw: Vec::with_capacity(n),
            yshunt_f: Vec::with_capacity(n),
            yshunt_t: Vec::with_capacity(n),
            converter: Vec::with_capacity(n),
        };

        for br in &circuit.branches {
            let (k, beq, gsw, conv) = match br.kind {
                BranchKind::Converter(p) => {
                    (p.k, p.beq, p.switching_conductance(p.i_from), Some(p))
                }
                BranchKind::Line | BranchKind::Transformer | BranchKind::Switch => {
                    (1.0, 0.0, 0.0, None)
                }
            };
            arrays.from.push(br.from);
            arrays.to.push(br.to);
            arrays.active.push(br.active);
            arrays.r.push(br.r);
            arrays.x.push(br.x);
            arrays.g.push(br.g);
            arrays.b.push(br.b);
            arrays.k.push(k);
            arrays.m.push(br.tap_module);
            arrays.tau.push(br.tap_angle);
            arrays.vtap_f.push(br.vtap_f);
            arrays.vtap_t.push(br.vtap_t);
            arrays.beq.push(beq);
            arrays.gsw.push(gsw);
            arrays.yshunt_f.push(br.yshunt_f);
            arrays.yshunt_t.push(br.yshunt_t);
            arrays.converter.push(conv);
        }
        arrays
    }

    pub fn len(&self) -> usize {
        self.from.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }

    pub fn has_converters(&self) -> bool {
        self.converter.iter().any(Option::is_some)
    }

    /// Recompute Gsw of every converter from the "from" currents `i_from`.
    pub fn update_converter_losses(&mut self, i_from: &[Complex64]) {
        for (idx, conv) in self.converter.iter().enumerate() {
            if let Some(p) = conv {
                self.gsw[idx] = p.switching_conductance(i_from[idx].norm());
            }
        }
    }

    fn check(&self, nbus: usize) -> VoltaResult<()> {
        let n = self.len();
        for (name, len) in [
            ("to", self.to.len()),
            ("active", self.active.len()),
            ("r", self.r.len()),
            ("x", self.x.len()),
            ("g", self.g.len()),
            ("b", self.b.len()),
            ("k", self.k.len()),
            ("m", self.m.len()),
            ("tau", self.tau.len()),
            ("vtap_f", self.vtap_f.len()),
            ("vtap_t", self.vtap_t.len()),
            ("beq", self.beq.len()),
            ("gsw", self.gsw.len()),
            ("yshunt_f", self.yshunt_f.len()),
            ("yshunt_t", self.yshunt_t.len()),
            ("converter", self.converter.len()),
        ] {
            if len != n {
                return Err(VoltaError::shape(format!("branch array {name}"), n, len));
            }
        }
        if let Some(&bad) = self.from.iter().chain(&self.to).find(|&&i| i >= nbus) {
            return Err(VoltaError::shape("branch terminal", nbus, bad + 1));
        }
        Ok(())
    }

    /// Primitive admittances (Yff, Yft, Ytf, Ytt) of branch `k`.
    fn primitives(&self, idx: usize) -> [Complex64; 4] {
        let zero = Complex64::new(0.0, 0.0);
        if !self.active[idx] {
            return [zero; 4];
        }
        let ys = Complex64::new(self.r[idx] + IMPEDANCE_EPS, self.x[idx]).inv();
        let bc2 = Complex64::new(self.g[idx], self.b[idx]) / 2.0;
        let tap = Complex64::from_polar(self.k[idx] * self.m[idx], self.tau[idx]);
        let (mf, mt) = (self.vtap_f[idx], self.vtap_t[idx]);
        let jbeq = Complex64::new(0.0, self.beq[idx]);
        let gsw = Complex64::new(self.gsw[idx], 0.0);

        let yff = gsw + (ys + bc2 + jbeq + self.yshunt_f[idx]) / (tap * tap.conj() * mf * mf);
        let yft = -ys / (tap.conj() * mf * mt);
        let ytf = -ys / (tap * mt * mf);
        let ytt = (ys + bc2 + self.yshunt_t[idx]) / (mt * mt);
        [yff, yft, ytf, ytt]
    }
}

/// Bus shunt admittances in per unit.
pub fn bus_shunts_pu(circuit: &NumericalCircuit) -> Vec<Complex64> {
    circuit
        .buses
        .iter()
        .map(|b| if b.active { b.shunt / circuit.sbase } else { Complex64::new(0.0, 0.0) })
        .collect()
}

/// Nonlinear admittance model.
#[derive(Debug, Clone)]
pub struct AdmittanceMatrices {
    pub ybus: CsMat<Complex64>,
    pub yf: CsMat<Complex64>,
    pub yt: CsMat<Complex64>,
    pub yff: Vec<Complex64>,
    pub yft: Vec<Complex64>,
    pub ytf: Vec<Complex64>,
    pub ytt: Vec<Complex64>,
    pub yshunt_bus: Vec<Complex64>,
}

impl AdmittanceMatrices {
    pub fn from_circuit(circuit: &NumericalCircuit) -> VoltaResult<Self> {
        let arrays = BranchArrays::from_circuit(circuit);
        Self::build(&arrays, &bus_shunts_pu(circuit))
    }

    pub fn build(arrays: &BranchArrays, yshunt_bus: &[Complex64]) -> VoltaResult<Self> {
        let nbus = yshunt_bus.len();
        let nbr = arrays.len();
        arrays.check(nbus)?;

        let mut yff = Vec::with_capacity(nbr);
        let mut yft = Vec::with_capacity(nbr);
        let mut ytf = Vec::with_capacity(nbr);
        let mut ytt = Vec::with_capacity(nbr);

        let mut yf = TriMat::new((nbr, nbus));
        let mut yt = TriMat::new((nbr, nbus));
        let mut ybus = TriMat::new((nbus, nbus));

        for idx in 0..nbr {
            let [ff, ft, tf, tt] = arrays.primitives(idx);
            let (f, t) = (arrays.from[idx], arrays.to[idx]);
            yff.push(ff);
            yft.push(ft);
            ytf.push(tf);
            ytt.push(tt);
            if !arrays.active[idx] {
                continue;
            }

            yf.add_triplet(idx, f, ff);
            yf.add_triplet(idx, t, ft);
            yt.add_triplet(idx, f, tf);
            yt.add_triplet(idx, t, tt);

            ybus.add_triplet(f, f, ff);
            ybus.add_triplet(f, t, ft);
            ybus.add_triplet(t, f, tf);
            ybus.add_triplet(t, t, tt);
        }

        for (i, &ysh) in yshunt_bus.iter().enumerate() {
            if ysh.norm() > 0.0 {
                ybus.add_triplet(i, i, ysh);
            }
        }

        Ok(Self {
            ybus: ybus.to_csr(),
            yf: yf.to_csr(),
            yt: yt.to_csr(),
            yff,
            yft,
            ytf,
            ytt,
            yshunt_bus: yshunt_bus.to_vec(),
        })
    }

    pub fn nbus(&self) -> usize {
        self.ybus.rows()
    }

    /// Bus injections `V·conj(Ybus·V)` in per unit.
    pub fn compute_power(&self, v: &[Complex64]) -> Vec<Complex64> {
        let ibus = mat_vec(&self.ybus, v);
        v.iter().zip(&ibus).map(|(vi, ii)| vi * ii.conj()).collect()
    }

    /// Branch currents at the "from" and "to" ends.
    pub fn branch_currents(&self, v: &[Complex64]) -> (Vec<Complex64>, Vec<Complex64>) {
        (mat_vec(&self.yf, v), mat_vec(&self.yt, v))
    }
}

/// Split model satisfying `Ybus = Yseries + diag(Yshunt)`.
#[derive(Debug, Clone)]
pub struct SplitAdmittances {
    pub yseries: CsMat<Complex64>,
    pub yshunt: Vec<Complex64>,
}

impl SplitAdmittances {
    pub fn from_circuit(circuit: &NumericalCircuit) -> VoltaResult<Self> {
        let arrays = BranchArrays::from_circuit(circuit);
        Self::build(&arrays, &bus_shunts_pu(circuit))
    }

    pub fn build(arrays: &BranchArrays, yshunt_bus: &[Complex64]) -> VoltaResult<Self> {
        let nbus = yshunt_bus.len();
        arrays.check(nbus)?;

        let mut yseries = TriMat::new((nbus, nbus));
        let mut yshunt = yshunt_bus.to_vec();

        for idx in 0..arrays.len() {
            if !arrays.active[idx] {
                continue;
            }
            let (f, t) = (arrays.from[idx], arrays.to[idx]);
            let ys = Complex64::new(arrays.r[idx] + IMPEDANCE_EPS, arrays.x[idx]).inv();
            let bc2 = Complex64::new(arrays.g[idx], arrays.b[idx]) / 2.0;
            let tap = Complex64::from_polar(arrays.k[idx] * arrays.m[idx], arrays.tau[idx]);
            let (mf, mt) = (arrays.vtap_f[idx], arrays.vtap_t[idx]);
            let jbeq = Complex64::new(0.0, arrays.beq[idx]);
            let gsw = Complex64::new(arrays.gsw[idx], 0.0);
            let den_f = tap * tap.conj() * mf * mf;

            yseries.add_triplet(f, f, gsw + ys / den_f);
            yseries.add_triplet(f, t, -ys / (tap.conj() * mf * mt));
            yseries.add_triplet(t, f, -ys / (tap * mt * mf));
            yseries.add_triplet(t, t, ys / (mt * mt));

            yshunt[f] += (bc2 + jbeq + arrays.yshunt_f[idx]) / den_f;
            yshunt[t] += (bc2 + arrays.yshunt_t[idx]) / (mt * mt);
        }

        Ok(Self {
            yseries: yseries.to_csr(),
            yshunt,
        })
    }
}

/// Linear (DC) model: `b = 1/(|m|·X + ε)`.
#[derive(Debug, Clone)]
pub struct LinearAdmittances {
    pub bbus: CsMat<f64>,
    pub bf: CsMat<f64>,
    pub b: Vec<f64>,
    pub from: Vec<usize>,
    pub to: Vec<usize>,
}

impl LinearAdmittances {
    pub fn from_circuit(circuit: &NumericalCircuit) -> VoltaResult<Self> {
        let arrays = BranchArrays::from_circuit(circuit);
        Self::build(&arrays, circuit.nbus())
    }

    pub fn build(arrays: &BranchArrays, nbus: usize) -> VoltaResult<Self> {
        arrays.check(nbus)?;
        let nbr = arrays.len();

        let mut bf = TriMat::new((nbr, nbus));
        let mut bbus = TriMat::new((nbus, nbus));
        let mut b = vec![0.0; nbr];

        for idx in 0..nbr {
            if !arrays.active[idx] {
                continue;
            }
            let (f, t) = (arrays.from[idx], arrays.to[idx]);
            let bk = 1.0 / (arrays.m[idx].abs() * arrays.x[idx] + IMPEDANCE_EPS);
            b[idx] = bk;

            bf.add_triplet(idx, f, bk);
            bf.add_triplet(idx, t, -bk);

            bbus.add_triplet(f, f, bk);
            bbus.add_triplet(f, t, -bk);
            bbus.add_triplet(t, f, -bk);
            bbus.add_triplet(t, t, bk);
        }

        Ok(Self {
            bbus: bbus.to_csr(),
            bf: bf.to_csr(),
            b,
            from: arrays.from.clone(),
            to: arrays.to.clone(),
        })
    }

    pub fn nbus(&self) -> usize {
        self.bbus.rows()
    }

    pub fn nbr(&self) -> usize {
        self.bf.rows()
    }
}
