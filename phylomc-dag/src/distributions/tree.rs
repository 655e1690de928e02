//! Priors over time trees.

use phylomc_core::{random, PhyloMcError, Result};
use phylomc_tree::{NodeId, TimeTree, TreeNode};
use rand::RngCore;

use crate::distribution::{expect_params, Distribution};
use crate::value::Value;

fn check_tip_count(name: &str, template: &TimeTree, tree: &TimeTree) -> Result<()> {
    if tree.tip_count() != template.tip_count() {
        return Err(PhyloMcError::Config(format!(
            "{}: tree has {} tips, expected {}",
            name,
            tree.tip_count(),
            template.tip_count()
        )));
    }
    Ok(())
}

/// Node ages uniform between the oldest tip and the root, on any topology.
///
/// The density is `(root_age - oldest_tip_age)^-(n_internal - 1)`, the
/// uniform density of the non-root internal ages without the ordering
/// constant. Takes no parameters; redraws keep the template's topology and
/// root age.
#[derive(Debug, Clone)]
pub struct UniformTimeTree {
    template: TimeTree,
}

impl UniformTimeTree {
    pub fn new(template: TimeTree) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &TimeTree {
        &self.template
    }
}

impl Distribution for UniformTimeTree {
    fn name(&self) -> &str {
        "UniformTimeTree"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 0)?;
        let tree = value.as_tree()?;
        check_tip_count(self.name(), &self.template, tree)?;
        if tree.validate().is_err() {
            return Ok(f64::NEG_INFINITY);
        }
        let span = tree.height() - tree.oldest_tip_age(tree.root());
        let free_ages = tree.internal_nodes().len().saturating_sub(1);
        if free_ages == 0 {
            return Ok(0.0);
        }
        Ok(-(free_ages as f64) * span.ln())
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 0)?;
        let mut tree = self.template.clone();
        let root = tree.root();
        let lo = tree.oldest_tip_age(root);
        let hi = tree.height();
        let mut draws: Vec<f64> = (0..tree.internal_nodes().len().saturating_sub(1))
            .map(|_| random::uniform(&mut *rng, lo, hi))
            .collect();
        draws.sort_by(f64::total_cmp);
        // postorder puts every node after its descendants
        let order: Vec<NodeId> = tree
            .iter_postorder()
            .filter(|&id| !tree.is_tip(id) && id != root)
            .collect();
        for (id, age) in order.into_iter().zip(draws) {
            tree.set_age(id, age)?;
        }
        tree.validate()?;
        Ok(Value::Tree(tree))
    }
}

/// Kingman coalescent with constant population size `N` (the single
/// parameter), allowing tips sampled at different times.
///
/// With `k` lineages alive over an interval of length `dt` the interval
/// contributes `-C(k,2) dt / N`, and every coalescence contributes `-ln N`.
#[derive(Debug, Clone)]
pub struct ConstantCoalescent {
    template: TimeTree,
}

impl ConstantCoalescent {
    /// `template` supplies tip names, species and sampling times for redraws.
    pub fn new(template: TimeTree) -> Self {
        Self { template }
    }
}

/// Ln density of `tree` under a constant-size coalescent.
pub fn coalescent_ln_pdf(tree: &TimeTree, pop_size: f64) -> f64 {
    if !(pop_size > 0.0) {
        return f64::NEG_INFINITY;
    }
    // (age, is_coalescence): samplings sort before coalescences at equal age
    let mut events: Vec<(f64, bool)> = tree
        .iter_preorder()
        .map(|id| (tree.age(id), !tree.is_tip(id)))
        .collect();
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut ln_p = 0.0;
    let mut lineages = 0usize;
    let mut last = events.first().map_or(0.0, |e| e.0);
    for (age, coalescence) in events {
        let pairs = (lineages * lineages.saturating_sub(1)) as f64 / 2.0;
        ln_p -= pairs * (age - last) / pop_size;
        last = age;
        if coalescence {
            ln_p -= pop_size.ln();
            lineages = lineages.saturating_sub(1);
        } else {
            lineages += 1;
        }
    }
    ln_p
}

impl Distribution for ConstantCoalescent {
    fn name(&self) -> &str {
        "ConstantCoalescent"
    }

    fn ln_probability(&self, value: &Value, params: &[&Value]) -> Result<f64> {
        expect_params(self.name(), params, 1)?;
        let pop_size = params[0].as_real()?;
        let tree = value.as_tree()?;
        check_tip_count(self.name(), &self.template, tree)?;
        Ok(coalescent_ln_pdf(tree, pop_size))
    }

    fn redraw(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value> {
        expect_params(self.name(), params, 1)?;
        let pop_size = params[0].as_real()?;
        if !(pop_size > 0.0) {
            return Err(PhyloMcError::InvalidInput(format!(
                "{}: population size must be positive",
                self.name()
            )));
        }
        let template = &self.template;
        let mut nodes: Vec<TreeNode> = template
            .tips()
            .map(|t| {
                let src = &template.nodes()[t];
                let mut tip = TreeNode::new(t, src.age, src.name.clone());
                tip.species = src.species.clone();
                tip
            })
            .collect();
        let mut samples: Vec<NodeId> = template.tips().collect();
        samples.sort_by(|&a, &b| template.age(a).total_cmp(&template.age(b)));

        let mut active: Vec<NodeId> = Vec::new();
        let mut next = 0;
        let mut t = samples.first().map_or(0.0, |&s| template.age(s));
        loop {
            let next_sample = samples.get(next).map(|&s| template.age(s));
            let k = active.len();
            if k < 2 {
                match next_sample {
                    Some(age) => {
                        t = t.max(age);
                        active.push(samples[next]);
                        next += 1;
                        continue;
                    }
                    None => break,
                }
            }
            let rate = (k * (k - 1)) as f64 / 2.0 / pop_size;
            let wait = -(1.0 - random::uniform01(&mut *rng)).ln() / rate;
            if let Some(age) = next_sample {
                if t + wait > age {
                    t = age;
                    active.push(samples[next]);
                    next += 1;
                    continue;
                }
            }
            t += wait;
            let a = active.swap_remove(random::uniform_index(&mut *rng, k)?);
            let b = active.swap_remove(random::uniform_index(&mut *rng, k - 1)?);
            let mut node = TreeNode::new(nodes.len(), t, None);
            node.children = vec![a, b];
            active.push(node.id);
            nodes.push(node);
        }
        let root = active
            .pop()
            .ok_or_else(|| PhyloMcError::InvalidInput("coalescent template has no tips".into()))?;
        Ok(Value::Tree(TimeTree::from_parts(nodes, root)?))
    }
}
