//! End-to-end behaviour of the proposals against a shared model graph.

use std::collections::BTreeMap;

use phylomc_core::random::{seeded_rng, ChainRng};
use phylomc_dag::distributions::{Dirichlet, Exponential, Normal, UniformTimeTree};
use phylomc_dag::functions::TreeHeight;
use phylomc_dag::{ModelGraph, NodeId, Value};
use phylomc_moves::{
    BetaSimplexProposal, DirichletSimplexProposal, FixedNodeheightPruneRegraftProposal,
    GibbsPruneRegraftProposal, MetropolisHastingsMove, MoveConfig, NarrowExchangeProposal,
    NodeTimeSlideUniformProposal, Proposal, ScaleProposal, SlideProposal,
    SpeciesNarrowExchangeProposal, SpeciesSubtreeScaleProposal, SubtreeScaleProposal,
    TuningConfig, UpDownScaleProposal,
};
use phylomc_tree::TimeTree;

struct Model {
    graph: ModelGraph,
    rate: NodeId,
    pi: NodeId,
    tree: NodeId,
    height: NodeId,
    species: NodeId,
    gene: NodeId,
}

fn gene_tree(newick: &str) -> TimeTree {
    let mut gene = TimeTree::from_newick(newick).unwrap();
    let map: BTreeMap<String, String> = gene
        .tip_names()
        .into_iter()
        .map(|name| {
            let species = name[..1].to_uppercase();
            (name, species)
        })
        .collect();
    gene.assign_species(&map).unwrap();
    gene
}

/// rate ~ Exp(1), x ~ Normal(0, rate) observed, pi ~ Dir(1, 1, 1), a free
/// six-tip tree whose height is observed through Normal(height, 1), and a
/// species tree with one gene tree nested inside it.
fn model() -> Model {
    let mut g = ModelGraph::new();
    let one = g.add_constant("one", 1.0);
    let zero = g.add_constant("zero", 0.0);
    let rate = g.add_stochastic("rate", Exponential::new(), &[one], 0.8).unwrap();
    let x = g.add_stochastic("x", Normal, &[zero, rate], 0.3).unwrap();
    g.clamp(x, 0.3).unwrap();

    let alpha = g.add_constant("alpha", Value::Vector(vec![1.0; 3]));
    let pi = g
        .add_stochastic("pi", Dirichlet, &[alpha], Value::Simplex(vec![0.2, 0.3, 0.5]))
        .unwrap();

    let tree = TimeTree::from_newick("((((A:1,B:1):1,C:2):1.5,(D:0.5,E:0.5):3):1,F:4.5);").unwrap();
    let tree = g
        .add_stochastic("tree", UniformTimeTree::new(tree.clone()), &[], tree)
        .unwrap();
    let height = g.add_deterministic("height", TreeHeight, &[tree]).unwrap();
    let dated = g.add_stochastic("dated", Normal, &[height, one], 4.0).unwrap();
    g.clamp(dated, 4.0).unwrap();

    let species = TimeTree::from_newick("(((A:1,B:1):1,C:2):1,D:3);").unwrap();
    let species = g
        .add_stochastic("species", UniformTimeTree::new(species.clone()), &[], species)
        .unwrap();
    let gene = gene_tree("((((a1:0.5,a2:0.5):1,b1:1.5):1,c1:2.5):1,d1:3.5);");
    let gene = g
        .add_stochastic("gene", UniformTimeTree::new(gene.clone()), &[], gene)
        .unwrap();

    Model {
        graph: g,
        rate,
        pi,
        tree,
        height,
        species,
        gene,
    }
}

fn proposals(m: &Model) -> Vec<Box<dyn Proposal>> {
    vec![
        Box::new(ScaleProposal::new(m.rate, 1.0)),
        Box::new(SlideProposal::new(m.rate, 0.5).with_bounds(0.0, 10.0).unwrap()),
        Box::new(DirichletSimplexProposal::new(m.pi, 20.0, 2).unwrap()),
        Box::new(BetaSimplexProposal::new(m.pi, 20.0).unwrap()),
        Box::new(UpDownScaleProposal::new(vec![m.rate], vec![m.tree], 0.5).unwrap()),
        Box::new(FixedNodeheightPruneRegraftProposal::new(m.tree)),
        Box::new(GibbsPruneRegraftProposal::new(m.tree)),
        Box::new(NarrowExchangeProposal::new(m.tree)),
        Box::new(NodeTimeSlideUniformProposal::new(m.tree)),
        Box::new(SubtreeScaleProposal::new(m.tree)),
        Box::new(SpeciesSubtreeScaleProposal::new(m.species, vec![m.gene]).unwrap()),
        Box::new(SpeciesNarrowExchangeProposal::new(m.species, vec![m.gene]).unwrap()),
    ]
}

/// Current value, stored value and log probability of every node.
fn snapshot(g: &mut ModelGraph) -> Vec<(Value, Value, Option<f64>)> {
    g.node_ids()
        .into_iter()
        .map(|id| {
            let node = g.node(id).unwrap();
            let current = node.current_value().clone();
            let stored = node.stored_value().clone();
            let ln_p = if node.is_stochastic() {
                Some(g.ln_probability(id).unwrap())
            } else {
                None
            };
            (current, stored, ln_p)
        })
        .collect()
}

fn tree_of(g: &ModelGraph, id: NodeId) -> &TimeTree {
    g.node(id).unwrap().current_value().as_tree().unwrap()
}

#[test]
fn undo_and_restore_are_exact() {
    let mut m = model();
    let mut rng: ChainRng = seeded_rng(2024);
    for mut p in proposals(&m) {
        for i in 0..40 {
            let before = snapshot(&mut m.graph);
            let ln_h = p.propose(&mut m.graph, &mut rng).unwrap();
            assert!(!ln_h.is_nan(), "{} returned NaN", p.name());
            if i % 2 == 0 || p.failed() {
                if !p.failed() {
                    p.undo(&mut m.graph).unwrap();
                }
                m.graph.restore_touched().unwrap();
                p.clean();
                assert_eq!(snapshot(&mut m.graph), before, "{} did not restore", p.name());
            } else {
                m.graph.keep_touched().unwrap();
                p.keep(&mut m.graph).unwrap();
                p.clean();
            }
            assert!(m.graph.touched_nodes().is_empty());
        }
    }
}

#[test]
fn tree_moves_preserve_invariants() {
    let mut m = model();
    let tips: Vec<_> = [m.tree, m.species, m.gene]
        .iter()
        .map(|&id| tree_of(&m.graph, id).tip_names())
        .collect();
    let mut rng = seeded_rng(7);
    let mut moves: Vec<_> = proposals(&m)
        .into_iter()
        .skip(4)
        .map(|p| MetropolisHastingsMove::boxed(p, MoveConfig::default()).unwrap())
        .collect();
    for _ in 0..100 {
        for mv in &mut moves {
            mv.perform(&mut m.graph, &mut rng).unwrap();
            for (k, &id) in [m.tree, m.species, m.gene].iter().enumerate() {
                let tree = tree_of(&m.graph, id);
                tree.validate().unwrap();
                assert_eq!(tree.tip_names(), tips[k], "{} changed the tips", mv.name());
                for t in tree.tips() {
                    assert!(tree.age(t).abs() < 1e-12);
                }
            }
        }
    }
    assert!(moves.iter().any(|mv| mv.accepted() > 0));
}

#[test]
fn gibbs_with_one_alternative_is_deterministic() {
    // tips at 0, internal ages 1, 2, 3
    let tree = TimeTree::from_newick("(((A:1,B:1):1,C:2):1,D:3);").unwrap();
    let mut g = ModelGraph::new();
    let t = g
        .add_stochastic("tree", UniformTimeTree::new(tree.clone()), &[], tree.clone())
        .unwrap();
    let ab = tree.parent(tree.taxon_index("A").unwrap()).unwrap();
    let mut p = GibbsPruneRegraftProposal::new(t);
    let mut rng = seeded_rng(11);
    for _ in 0..100 {
        let ln_h = p.propose_for(&mut g, ab, &mut rng).unwrap();
        assert!(ln_h.abs() < 1e-12);
        let moved = tree_of(&g, t);
        assert_eq!(moved.sibling(ab), moved.taxon_index("D"));
        p.undo(&mut g).unwrap();
        g.restore_touched().unwrap();
        p.clean();
        assert_eq!(tree_of(&g, t), &tree);
    }
}

#[test]
fn gibbs_restores_tree_dependents() {
    let mut m = model();
    let mut p = GibbsPruneRegraftProposal::new(m.tree);
    let mut rng = seeded_rng(13);
    let mut moved = 0;
    for i in 0..60 {
        let before = snapshot(&mut m.graph);
        let ln_posterior = m.graph.ln_posterior().unwrap();
        let ln_h = p.propose(&mut m.graph, &mut rng).unwrap();
        if p.failed() {
            m.graph.restore_touched().unwrap();
            p.clean();
            continue;
        }
        assert!(ln_h.is_finite());
        moved += 1;
        // ages are fixed, so the observed height sees the same tree height
        let height = m.graph.value(m.height).unwrap().as_real().unwrap();
        assert!((height - 4.5).abs() < 1e-12);
        if i % 2 == 0 {
            p.undo(&mut m.graph).unwrap();
            m.graph.restore_touched().unwrap();
            p.clean();
            assert_eq!(snapshot(&mut m.graph), before);
            assert_eq!(m.graph.ln_posterior().unwrap(), ln_posterior);
        } else {
            m.graph.keep_touched().unwrap();
            p.keep(&mut m.graph).unwrap();
            p.clean();
        }
        assert!(m.graph.touched_nodes().is_empty());
    }
    assert!(moved > 0);
}

#[test]
fn concentrated_simplex_proposals_stay_close() {
    let x0 = [0.2, 0.3, 0.5];
    let mut g = ModelGraph::new();
    let alpha = g.add_constant("alpha", Value::Vector(vec![1.0; 3]));
    let pi = g
        .add_stochastic("pi", Dirichlet, &[alpha], Value::Simplex(x0.to_vec()))
        .unwrap();
    let mut rng = seeded_rng(12);
    let n = 10_000;

    let mut partial = DirichletSimplexProposal::new(pi, 100.0, 2).unwrap();
    let mut sum = [0.0; 3];
    let mut sum_sq = [0.0; 3];
    for _ in 0..n {
        partial.propose(&mut g, &mut rng).unwrap();
        let x = g.node(pi).unwrap().current_value().as_simplex().unwrap().to_vec();
        for i in 0..3 {
            sum[i] += x[i];
            sum_sq[i] += x[i] * x[i];
        }
        partial.undo(&mut g).unwrap();
        g.restore_touched().unwrap();
        partial.clean();
    }
    for i in 0..3 {
        let mean = sum[i] / n as f64;
        let var = sum_sq[i] / n as f64 - mean * mean;
        assert!((mean - x0[i]).abs() < 0.01, "component {} drifted to {}", i, mean);
        assert!(var < 0.005, "component {} variance {}", i, var);
    }

    let mut full = DirichletSimplexProposal::new(pi, 100.0, 3).unwrap();
    let mut total = 0.0;
    for _ in 0..n {
        total += full.propose(&mut g, &mut rng).unwrap();
        full.undo(&mut g).unwrap();
        g.restore_touched().unwrap();
        full.clean();
    }
    assert!((total / n as f64).abs() < 0.1);
}

#[test]
fn tuning_follows_acceptance() {
    let m = model();
    let config = TuningConfig::default();
    let lambda = |p: &ScaleProposal| -> f64 {
        p.parameter_summary()
            .trim_start_matches("lambda=")
            .parse()
            .unwrap()
    };

    let mut p = ScaleProposal::new(m.rate, 1.0);
    p.tune(0.9, &config);
    assert!(lambda(&p) > 1.0);

    let mut p = ScaleProposal::new(m.rate, 1.0);
    p.tune(0.1, &config);
    assert!(lambda(&p) < 1.0);
}
