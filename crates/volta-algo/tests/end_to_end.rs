//! End-to-end runs: topology, AC power flow, linear factors and contingencies
//! on small meshed networks.

use petgraph::algo::connected_components;
use petgraph::graph::UnGraph;
use tracing_subscriber::EnvFilter;
use volta_algo::{
    split_into_islands, ContingencyAnalyzer, ContingencyGroup, LinearAnalysis, OverloadStatus,
    PowerFlowDriver, SolverStatus,
};
use volta_core::{
    AnalysisConfig, Branch, Bus, ContingencyEngine, LinearAnalysisOptions, NumericalCircuit,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Five buses, seven lines, one generator besides the slack.
fn five_bus() -> NumericalCircuit {
    let mut c = NumericalCircuit::new(100.0);
    c.add_bus(Bus::slack("Alder", 1.02));
    c.add_bus(Bus::pv("Birch", 40.0, 1.01).with_q_limits(-100.0, 100.0));
    c.add_bus(Bus::pq_load("Cedar", 60.0, 20.0));
    c.add_bus(Bus::pq_load("Dogwood", 50.0, 15.0));
    c.add_bus(Bus::pq_load("Elm", 40.0, 10.0));
    for (f, t) in [(0, 1), (0, 2), (1, 2), (1, 3), (2, 3), (3, 4), (2, 4)] {
        c.add_branch(
            Branch::line(format!("{f}-{t}"), f, t, 0.01, 0.1, 0.02)
                .with_rate(100.0)
                .with_contingency_rate(130.0),
        );
    }
    c
}

#[test]
fn test_island_count_matches_petgraph() {
    init_tracing();
    let mut c = NumericalCircuit::new(100.0);
    for i in 0..12 {
        c.add_bus(Bus::pq_load(format!("b{i}"), 1.0, 0.0));
    }
    let edges = [(0, 1), (1, 2), (3, 4), (5, 6), (6, 7), (7, 5), (9, 10), (2, 0)];
    for (f, t) in edges {
        c.add_branch(Branch::line(format!("{f}-{t}"), f, t, 0.0, 0.1, 0.0));
    }
    // an open breaker splits 9 from 10
    c.branches[6].active = false;

    let mut g = UnGraph::<(), ()>::new_undirected();
    let nodes: Vec<_> = (0..c.nbus()).map(|_| g.add_node(())).collect();
    for br in c.branches.iter().filter(|b| b.active) {
        g.add_edge(nodes[br.from], nodes[br.to], ());
    }

    let islands = split_into_islands(&c).unwrap();
    assert_eq!(islands.len(), connected_components(&g));
    let covered: usize = islands.iter().map(|i| i.nbus()).sum();
    assert_eq!(covered, c.nbus());
}

#[test]
fn test_ac_flows_close_to_dc_flows() {
    init_tracing();
    let c = five_bus();
    let pf = PowerFlowDriver::default().run(&c).unwrap();
    assert!(pf.converged);
    assert_eq!(pf.islands[0].status, Some(SolverStatus::Converged));

    let lin = LinearAnalysis::new(LinearAnalysisOptions::default())
        .run(&c)
        .unwrap();
    let dc = lin.get_flows(&c.p_injection());
    for (k, (ac, dc)) in pf.sf.iter().zip(&dc).enumerate() {
        assert!(
            (ac.re - dc).abs() < 8.0,
            "branch {k}: AC {:.2} MW vs DC {dc:.2} MW",
            ac.re
        );
    }

    // losses are the only imbalance between generation and load
    let total_losses: f64 = pf.losses.iter().map(|s| s.re).sum();
    let generation: f64 = pf.scalc[0].re + 40.0;
    assert!((generation - 150.0 - total_losses).abs() < 1e-2);
    assert!(total_losses > 0.0);
}

#[test]
fn test_linear_and_ac_contingency_agree() {
    init_tracing();
    let c = five_bus();
    let groups: Vec<ContingencyGroup> = (0..c.nbr()).map(ContingencyGroup::branch_outage).collect();

    let linear = ContingencyAnalyzer::default().run(&c, &groups).unwrap();
    let mut config = AnalysisConfig::default();
    config.contingency.engine = ContingencyEngine::PowerFlow;
    let ac = ContingencyAnalyzer::new(config).run(&c, &groups).unwrap();

    assert_eq!(linear.ngroups(), ac.ngroups());
    assert!(ac.converged.iter().all(|&ok| ok));
    for g in 0..groups.len() {
        for m in 0..c.nbr() {
            let (l, a) = (linear.sf[g][m], ac.sf[g][m]);
            if l.abs() > 25.0 {
                assert!(
                    (l - a).abs() < 0.3 * l.abs(),
                    "group {g} branch {m}: linear {l:.2} vs AC {a:.2}"
                );
            }
        }
    }
}

#[test]
fn test_contingency_report_serializes() {
    init_tracing();
    let mut c = five_bus();
    for br in &mut c.branches {
        br.rate = 30.0;
        br.contingency_rate = 200.0;
    }
    let groups = [ContingencyGroup::branch_outage(1)];
    let res = ContingencyAnalyzer::default().run(&c, &groups).unwrap();
    assert!(!res.report.is_empty());
    assert!(res
        .report
        .entries
        .iter()
        .all(|e| e.status == OverloadStatus::ExceedsRate && e.branch != 1));

    let json = serde_json::to_value(&res.report).unwrap();
    assert_eq!(json["entries"][0]["status"], "exceeds_rate");
    assert_eq!(json["entries"][0]["group_name"], "branch 1");
}

#[test]
fn test_config_from_toml_drives_analysis() {
    init_tracing();
    let config = AnalysisConfig::from_toml_str(
        r#"
        [contingency]
        engine = "linear"
        contribution_threshold = 1e-6

        [contingency.srap]
        enabled = true
        max_loading = 2.0
        budget_mw = 500.0
        "#,
    )
    .unwrap();
    assert!(config.contingency.srap.enabled);

    let mut c = five_bus();
    c.buses[1].srap_available_power = 40.0;
    for br in &mut c.branches {
        br.rate = 40.0;
        br.contingency_rate = 500.0;
    }
    let groups = [ContingencyGroup::branch_outage(0)];
    let res = ContingencyAnalyzer::new(config).run(&c, &groups).unwrap();
    for e in &res.report.entries {
        assert!(matches!(
            e.status,
            OverloadStatus::SrapSolvable | OverloadStatus::SrapNotSolvable | OverloadStatus::ExceedsRate
        ));
        if e.loading <= 2.0 {
            assert!(e.srap.is_some());
        }
    }
}

#[test]
fn test_meshed_switch_does_not_abort_contingency_run() {
    init_tracing();
    let mut c = NumericalCircuit::new(100.0);
    c.add_bus(Bus::slack("Fir", 1.0));
    c.add_bus(Bus::pq_load("Gum", 20.0, 5.0));
    c.add_bus(Bus::pq_load("Hazel", 30.0, 5.0));
    c.add_branch(Branch::line("0-1", 0, 1, 0.01, 0.1, 0.0).with_rate(100.0));
    c.add_branch(Branch::line("0-2", 0, 2, 0.01, 0.1, 0.0).with_rate(100.0));
    c.add_branch(Branch::switch("1-2 breaker", 1, 2));

    let lin = LinearAnalysis::new(LinearAnalysisOptions::default())
        .run(&c)
        .unwrap();
    assert_eq!(lin.skipped_islands, vec![0]);

    let groups: Vec<ContingencyGroup> = (0..2).map(ContingencyGroup::branch_outage).collect();
    let res = ContingencyAnalyzer::default().run(&c, &groups).unwrap();
    assert_eq!(res.ngroups(), 2);
    assert!(res.sf.iter().flatten().all(|f| f.is_finite()));
}
