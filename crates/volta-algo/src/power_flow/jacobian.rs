//! Mismatch function and reduced Jacobian.
//!
//! With `Vn = V/|V|` and `I = Ybus·V`:
//!
//! ```text
//! dS/dθ   = j·diag(V)·conj(diag(I) - Ybus·diag(V))
//! dS/d|V| = diag(V)·conj(Ybus·diag(Vn)) + conj(diag(I))·diag(Vn) - diag(I0 + 2·Y0·|V|)
//! ```
//!
//! The last term is the ZIP voltage dependence of the specified injection.

use crate::indices::SimulationIndices;
use crate::linalg::mat_vec;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

/// Row/column positions of every bus in the reduced system.
#[derive(Debug, Clone)]
pub(crate) struct StateLayout {
    /// Angle unknowns and P equations
    pub no_slack: Vec<usize>,
    /// Magnitude unknowns
    pub pq_p: Vec<usize>,
    /// Q equations
    pub pq_pqv: Vec<usize>,
    pos_va: Vec<Option<usize>>,
    pos_vm: Vec<Option<usize>>,
    pos_q: Vec<Option<usize>>,
}

impl StateLayout {
    pub fn new(idx: &SimulationIndices, nbus: usize) -> Self {
        let no_slack = idx.no_slack();
        let pq_p = idx.pq_p();
        let pq_pqv = idx.pq_pqv();

        let positions = |set: &[usize], offset: usize| {
            let mut pos = vec![None; nbus];
            for (k, &i) in set.iter().enumerate() {
                pos[i] = Some(offset + k);
            }
            pos
        };
        let n_va = no_slack.len();
        Self {
            pos_va: positions(&no_slack, 0),
            pos_vm: positions(&pq_p, n_va),
            pos_q: positions(&pq_pqv, n_va),
            no_slack,
            pq_p,
            pq_pqv,
        }
    }

    pub fn n_unknowns(&self) -> usize {
        self.no_slack.len() + self.pq_p.len()
    }

    pub fn n_equations(&self) -> usize {
        self.no_slack.len() + self.pq_pqv.len()
    }
}

/// Specified injection `S0 + I0·|V| + Y0·|V|²`.
pub(crate) fn zip_injection(
    s0: &[Complex64],
    i0: &[Complex64],
    y0: &[Complex64],
    vm: &[f64],
) -> Vec<Complex64> {
    (0..s0.len())
        .map(|i| s0[i] + i0[i] * vm[i] + y0[i] * vm[i] * vm[i])
        .collect()
}

/// Stacked mismatch `[ΔP(no_slack); ΔQ(pq ∪ pqv)]` with `ΔS = Scalc - Szip`.
pub(crate) fn mismatch(
    ybus: &CsMat<Complex64>,
    v: &[Complex64],
    vm: &[f64],
    s0: &[Complex64],
    i0: &[Complex64],
    y0: &[Complex64],
    layout: &StateLayout,
) -> Vec<f64> {
    let ibus = mat_vec(ybus, v);
    let sspec = zip_injection(s0, i0, y0, vm);
    let ds = |i: usize| v[i] * ibus[i].conj() - sspec[i];

    let mut f = Vec::with_capacity(layout.n_equations());
    f.extend(layout.no_slack.iter().map(|&i| ds(i).re));
    f.extend(layout.pq_pqv.iter().map(|&i| ds(i).im));
    f
}

pub(crate) fn inf_norm(f: &[f64]) -> f64 {
    f.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Reduced Jacobian of [`mismatch`] with respect to `[θ(no_slack); |V|(pq ∪ p)]`.
pub(crate) fn jacobian(
    ybus: &CsMat<Complex64>,
    v: &[Complex64],
    vm: &[f64],
    i0: &[Complex64],
    y0: &[Complex64],
    layout: &StateLayout,
) -> CsMat<f64> {
    let n = v.len();
    let ibus = mat_vec(ybus, v);
    let vn: Vec<Complex64> = v
        .iter()
        .zip(vm)
        .map(|(vi, &m)| if m > 0.0 { vi / m } else { Complex64::new(1.0, 0.0) })
        .collect();
    let j = Complex64::new(0.0, 1.0);

    let mut jac = TriMat::new((layout.n_equations(), layout.n_unknowns()));
    let mut push = |bus_i: usize, bus_j: usize, ds_dva: Complex64, ds_dvm: Complex64| {
        let p_row = layout.pos_va[bus_i];
        let q_row = layout.pos_q[bus_i];
        if let Some(col) = layout.pos_va[bus_j] {
            if let Some(row) = p_row {
                jac.add_triplet(row, col, ds_dva.re);
            }
            if let Some(row) = q_row {
                jac.add_triplet(row, col, ds_dva.im);
            }
        }
        if let Some(col) = layout.pos_vm[bus_j] {
            if let Some(row) = p_row {
                jac.add_triplet(row, col, ds_dvm.re);
            }
            if let Some(row) = q_row {
                jac.add_triplet(row, col, ds_dvm.im);
            }
        }
    };

    // off-diagonal structure of Ybus (and its diagonal's Ybus part)
    for (i, row) in ybus.outer_iterator().enumerate() {
        for (k, &yik) in row.iter() {
            let dva = -j * v[i] * (yik * v[k]).conj();
            let dvm = v[i] * (yik * vn[k]).conj();
            push(i, k, dva, dvm);
        }
    }

    // diagonal terms from the bus current and the ZIP dependence
    for i in 0..n {
        let dva = j * v[i] * ibus[i].conj();
        let dvm = ibus[i].conj() * vn[i] - (i0[i] + 2.0 * y0[i] * vm[i]);
        push(i, i, dva, dvm);
    }

    jac.to_csr()
}
