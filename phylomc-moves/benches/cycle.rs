use criterion::{black_box, criterion_group, criterion_main, Criterion};
use phylomc_core::random::seeded_rng;
use phylomc_dag::distributions::{ConstantCoalescent, Exponential};
use phylomc_dag::{ModelGraph, NodeId};
use phylomc_moves::{
    FixedNodeheightPruneRegraftProposal, GibbsPruneRegraftProposal, MetropolisHastingsMove,
    MoveConfig, NarrowExchangeProposal, Proposal, ScaleProposal, SubtreeScaleProposal,
};
use phylomc_tree::TimeTree;

/// Balanced newick with `2^depth` tips and unit branch lengths.
fn balanced_newick(depth: usize, next: &mut usize) -> String {
    if depth == 0 {
        *next += 1;
        return format!("t{}:1", next);
    }
    let left = balanced_newick(depth - 1, next);
    let right = balanced_newick(depth - 1, next);
    format!("({},{}):1", left, right)
}

/// theta ~ Exp(1); a 64-tip tree drawn from the constant coalescent.
fn coalescent_model() -> (ModelGraph, NodeId, NodeId) {
    let mut next = 0;
    let newick = format!("{};", balanced_newick(6, &mut next).trim_end_matches(":1"));
    let template = TimeTree::from_newick(&newick).unwrap();
    let mut rng = seeded_rng(42);
    let mut g = ModelGraph::new();
    let one = g.add_constant("one", 1.0);
    let theta = g.add_stochastic("theta", Exponential::new(), &[one], 1.0).unwrap();
    let tree = g
        .add_stochastic_drawn("tree", ConstantCoalescent::new(template), &[theta], &mut rng)
        .unwrap();
    (g, theta, tree)
}

fn bench_move(c: &mut Criterion, name: &str, build: impl Fn(NodeId, NodeId) -> Box<dyn Proposal>) {
    let (mut g, theta, tree) = coalescent_model();
    let mut mv = MetropolisHastingsMove::boxed(build(theta, tree), MoveConfig::default()).unwrap();
    let mut rng = seeded_rng(7);
    c.bench_function(name, |b| {
        b.iter(|| black_box(mv.perform(&mut g, &mut rng).unwrap()))
    });
}

fn bench_cycles(c: &mut Criterion) {
    bench_move(c, "scale_theta_64", |theta, _| Box::new(ScaleProposal::new(theta, 1.0)));
    bench_move(c, "fnpr_64", |_, tree| Box::new(FixedNodeheightPruneRegraftProposal::new(tree)));
    bench_move(c, "gibbs_prune_regraft_64", |_, tree| {
        Box::new(GibbsPruneRegraftProposal::new(tree))
    });
    bench_move(c, "narrow_exchange_64", |_, tree| Box::new(NarrowExchangeProposal::new(tree)));
    bench_move(c, "subtree_scale_64", |_, tree| Box::new(SubtreeScaleProposal::new(tree)));
}

criterion_group!(benches, bench_cycles);
criterion_main!(benches);
