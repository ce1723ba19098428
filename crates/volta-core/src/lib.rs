//! # volta-core: Snapshot Model for Steady-State Network Analysis
//!
//! Provides the data structures every volta algorithm consumes.
//!
//! ## Design
//!
//! A [`NumericalCircuit`] is an arena: dense, index-addressed arrays of
//! [`Bus`] and [`Branch`] records for one snapshot, created fresh by an
//! external compiler for every time step. Nothing downstream mutates it in
//! place:
//!
//! - islands are [`Island`] views (sorted index subsets) that compile into
//!   compact circuits when a solver needs one;
//! - contingencies clone the snapshot and switch branches off;
//! - solvers return new index sets and voltages rather than editing bus types.
//!
//! Branch kinds (line, transformer, converter, switch) are a tagged variant,
//! [`BranchKind`], resolved once into uniform arrays by the admittance builder.
//!
//! ## Quick Start
//!
//! ```rust
//! use volta_core::*;
//!
//! let mut circuit = NumericalCircuit::new(100.0);
//! let slack = circuit.add_bus(Bus::slack("North", 1.0));
//! let load = circuit.add_bus(Bus::pq_load("South", 50.0, 10.0));
//! circuit.add_branch(Branch::line("N-S", slack, load, 0.01, 0.1, 0.0).with_rate(100.0));
//!
//! assert!(circuit.validate().is_ok());
//! assert_eq!(circuit.nbus(), 2);
//! ```
//!
//! ## Units
//!
//! Impedances are per unit. Powers, ratings and SRAP headroom are MW/MVAr/MVA
//! and are divided by [`NumericalCircuit::sbase`] where the math needs per unit.

pub mod circuit;
pub mod config;
pub mod error;
pub mod island;

pub use circuit::{
    Branch, BranchKind, Bus, BusType, Connectivity, ConverterParams, NumericalCircuit, TapControl,
};
pub use config::{
    AnalysisConfig, ContingencyEngine, ContingencyOptions, LinearAnalysisOptions,
    PowerFlowOptions, ReactivePowerControl, SrapOptions,
};
pub use error::{VoltaError, VoltaResult};
pub use island::Island;
