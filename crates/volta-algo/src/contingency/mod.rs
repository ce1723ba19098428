//! Contingency analysis with overload classification and SRAP.
//!
//! A [`ContingencyGroup`] is a set of simultaneous outages: branches switched
//! off and bus injections scaled. Two engines evaluate the same groups and
//! fill the same [`ContingencyReport`]:
//!
//! - **Linear:** `flow = base + MLODF·base[c] + CPTDF·ΔP` from one PTDF/LODF
//!   computation (see [`crate::linear::LinearMultiContingency`]).
//! - **Power flow:** the outaged circuit is re-solved with Newton-Raphson.
//!
//! Each monitored branch is then classified against its rates:
//!
//! ```text
//! |flow| > contingency_rate                      -> ExceedsProtectionRate
//! |flow| > rate, SRAP on, |flow| <= rate·max     -> SrapSolvable / SrapNotSolvable
//! |flow| > rate                                  -> ExceedsRate
//! ```

mod analyzer;

pub use analyzer::{ContingencyAnalysisResult, ContingencyAnalyzer, ProgressFn};

use crate::srap::SrapOutcome;
use serde::{Deserialize, Serialize};
use volta_core::{VoltaError, VoltaResult};

/// One element of a contingency group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ContingencyElement {
    /// Branch switched off
    Branch(usize),
    /// Injection at `bus` changes by `factor · P` (-1 removes it)
    Injection { bus: usize, factor: f64 },
}

/// Simultaneous outages evaluated together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyGroup {
    pub name: String,
    pub elements: Vec<ContingencyElement>,
}

impl ContingencyGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
        }
    }

    /// N-1 branch outage named after the branch index.
    pub fn branch_outage(k: usize) -> Self {
        Self::new(format!("branch {k}")).with_branch(k)
    }

    pub fn with_branch(mut self, k: usize) -> Self {
        self.elements.push(ContingencyElement::Branch(k));
        self
    }

    pub fn with_injection(mut self, bus: usize, factor: f64) -> Self {
        self.elements
            .push(ContingencyElement::Injection { bus, factor });
        self
    }

    pub fn branches(&self) -> Vec<usize> {
        self.elements
            .iter()
            .filter_map(|e| match *e {
                ContingencyElement::Branch(k) => Some(k),
                ContingencyElement::Injection { .. } => None,
            })
            .collect()
    }

    /// (bus, factor) pairs.
    pub fn injections(&self) -> Vec<(usize, f64)> {
        self.elements
            .iter()
            .filter_map(|e| match *e {
                ContingencyElement::Injection { bus, factor } => Some((bus, factor)),
                ContingencyElement::Branch(_) => None,
            })
            .collect()
    }

    pub fn order(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn check(&self, nbus: usize, nbr: usize) -> VoltaResult<()> {
        for (i, e) in self.elements.iter().enumerate() {
            if self.elements[..i].iter().any(|prev| same_target(prev, e)) {
                return Err(VoltaError::Validation(format!(
                    "contingency '{}' lists {e:?} twice",
                    self.name
                )));
            }
            match *e {
                ContingencyElement::Branch(k) if k >= nbr => {
                    return Err(VoltaError::shape(
                        format!("contingency '{}' branch", self.name),
                        nbr,
                        k + 1,
                    ));
                }
                ContingencyElement::Injection { bus, .. } if bus >= nbus => {
                    return Err(VoltaError::shape(
                        format!("contingency '{}' bus", self.name),
                        nbus,
                        bus + 1,
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn same_target(a: &ContingencyElement, b: &ContingencyElement) -> bool {
    match (*a, *b) {
        (ContingencyElement::Branch(x), ContingencyElement::Branch(y)) => x == y,
        (
            ContingencyElement::Injection { bus: x, .. },
            ContingencyElement::Injection { bus: y, .. },
        ) => x == y,
        _ => false,
    }
}

/// Relative margin over a rating before a flow counts as an overload.
pub const RATE_TOLERANCE: f64 = 1e-9;

/// How a post-contingency flow breaks its rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverloadStatus {
    ExceedsRate,
    /// Within the SRAP-adjusted rate and redispatch can clear it
    SrapSolvable,
    /// Within the SRAP-adjusted rate but the candidates fall short
    SrapNotSolvable,
    ExceedsProtectionRate,
}

/// One overloaded branch under one contingency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyReportEntry {
    pub group: usize,
    pub group_name: String,
    pub branch: usize,
    pub branch_name: String,
    /// Pre-contingency flow (MW)
    pub base_flow: f64,
    /// Post-contingency flow (MW)
    pub flow: f64,
    pub rate: f64,
    pub contingency_rate: f64,
    /// |flow| / rate
    pub loading: f64,
    pub status: OverloadStatus,
    pub srap: Option<SrapOutcome>,
}

/// Overloads of a contingency run, sorted by group then branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContingencyReport {
    pub entries: Vec<ContingencyReportEntry>,
}

impl ContingencyReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_group(&self, group: usize) -> impl Iterator<Item = &ContingencyReportEntry> {
        self.entries.iter().filter(move |e| e.group == group)
    }

    pub fn with_status(&self, status: OverloadStatus) -> impl Iterator<Item = &ContingencyReportEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }

    /// Entry with the highest loading.
    pub fn worst(&self) -> Option<&ContingencyReportEntry> {
        self.entries
            .iter()
            .max_by(|a, b| a.loading.total_cmp(&b.loading))
    }

    pub(crate) fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| a.group.cmp(&b.group).then(a.branch.cmp(&b.branch)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_builders() {
        let g = ContingencyGroup::new("double")
            .with_branch(3)
            .with_injection(2, -1.0)
            .with_branch(5);
        assert_eq!(g.branches(), vec![3, 5]);
        assert_eq!(g.injections(), vec![(2, -1.0)]);
        assert_eq!(g.order(), 3);
        assert_eq!(ContingencyGroup::branch_outage(4).name, "branch 4");
    }

    #[test]
    fn test_group_check_rejects_out_of_range() {
        assert!(ContingencyGroup::branch_outage(2).check(3, 3).is_ok());
        assert!(matches!(
            ContingencyGroup::branch_outage(3).check(3, 3),
            Err(VoltaError::ShapeMismatch { .. })
        ));
        assert!(ContingencyGroup::new("g")
            .with_injection(7, -1.0)
            .check(3, 3)
            .is_err());
    }

    #[test]
    fn test_group_check_rejects_repeated_elements() {
        let twice = ContingencyGroup::new("twice").with_branch(0).with_branch(0);
        assert!(matches!(twice.check(3, 3), Err(VoltaError::Validation(_))));

        let bus_twice = ContingencyGroup::new("bus")
            .with_injection(1, -0.5)
            .with_injection(1, -0.5);
        assert!(matches!(bus_twice.check(3, 3), Err(VoltaError::Validation(_))));

        // same index as branch and as bus is fine
        let mixed = ContingencyGroup::new("mixed").with_branch(1).with_injection(1, -1.0);
        assert!(mixed.check(3, 3).is_ok());
    }

    fn entry(group: usize, branch: usize, loading: f64, status: OverloadStatus) -> ContingencyReportEntry {
        ContingencyReportEntry {
            group,
            group_name: format!("g{group}"),
            branch,
            branch_name: format!("b{branch}"),
            base_flow: 0.0,
            flow: loading * 100.0,
            rate: 100.0,
            contingency_rate: 150.0,
            loading,
            status,
            srap: None,
        }
    }

    #[test]
    fn test_report_sorting_and_queries() {
        let mut report = ContingencyReport {
            entries: vec![
                entry(1, 0, 1.1, OverloadStatus::ExceedsRate),
                entry(0, 4, 1.6, OverloadStatus::ExceedsProtectionRate),
                entry(0, 2, 1.2, OverloadStatus::ExceedsRate),
            ],
        };
        report.sort();
        let order: Vec<(usize, usize)> = report.entries.iter().map(|e| (e.group, e.branch)).collect();
        assert_eq!(order, vec![(0, 2), (0, 4), (1, 0)]);
        assert_eq!(report.for_group(0).count(), 2);
        assert_eq!(report.with_status(OverloadStatus::ExceedsRate).count(), 2);
        assert_eq!(report.worst().map(|e| e.branch), Some(4));
    }
}
