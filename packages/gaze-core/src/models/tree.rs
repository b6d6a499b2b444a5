//! Regression tree (CART, squared-error criterion) shared by the forest and
//! the boosted ensemble. On 0/1 targets the criterion ranks splits exactly
//! like Gini impurity.

use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per node; `None` examines all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 15,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

const MIN_GAIN: f64 = 1e-12;

impl DecisionTree {
    /// Grow a tree on `indices` (repeats allowed, as in a bootstrap sample).
    /// `leaf_value` turns the sample indices reaching a leaf into its output.
    pub fn fit<R, F>(
        x: &[Vec<f64>],
        target: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
        leaf_value: &F,
    ) -> Self
    where
        R: Rng + ?Sized,
        F: Fn(&[usize]) -> f64,
    {
        let mut tree = Self { nodes: Vec::new() };
        if indices.is_empty() {
            tree.nodes.push(Node::Leaf { value: 0.0 });
            return tree;
        }
        tree.grow(x, target, indices, 0, params, rng, leaf_value);
        tree
    }

    #[allow(clippy::too_many_arguments)]
    fn grow<R, F>(
        &mut self,
        x: &[Vec<f64>],
        target: &[f64],
        indices: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut R,
        leaf_value: &F,
    ) -> usize
    where
        R: Rng + ?Sized,
        F: Fn(&[usize]) -> f64,
    {
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let splittable = depth < params.max_depth
            && indices.len() >= params.min_samples_split.max(2)
            && indices.len() >= 2 * params.min_samples_leaf.max(1);

        let best = if splittable {
            best_split(x, target, &indices, params, rng)
        } else {
            None
        };

        match best {
            Some(split) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| x[i][split.feature] <= split.threshold);
                let left = self.grow(x, target, left_idx, depth + 1, params, rng, leaf_value);
                let right = self.grow(x, target, right_idx, depth + 1, params, rng, leaf_value);
                self.nodes[node_id] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
            }
            None => {
                self.nodes[node_id] = Node::Leaf {
                    value: leaf_value(&indices),
                };
            }
        }
        node_id
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    id = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes.get(id) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

fn best_split<R: Rng + ?Sized>(
    x: &[Vec<f64>],
    target: &[f64],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut R,
) -> Option<BestSplit> {
    let dim = x[indices[0]].len();
    let features: Vec<usize> = match params.max_features {
        Some(k) if k > 0 && k < dim => sample(rng, dim, k).into_vec(),
        _ => (0..dim).collect(),
    };

    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| target[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| target[i] * target[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;
    let min_leaf = params.min_samples_leaf.max(1);

    let mut best: Option<BestSplit> = None;
    let mut order: Vec<usize> = indices.to_vec();

    for feature in features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..n - 1 {
            let t = target[order[k]];
            left_sum += t;
            left_sq += t * t;

            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let v = x[order[k]][feature];
            let next = x[order[k + 1]][feature];
            if next <= v {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n as f64)
                + (right_sq - right_sum * right_sum / right_n as f64);
            let gain = parent_sse - sse;

            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: v + (next - v) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mean_leaf(target: &[f64]) -> impl Fn(&[usize]) -> f64 + '_ {
        move |idx: &[usize]| idx.iter().map(|&i| target[i]).sum::<f64>() / idx.len() as f64
    }

    #[test]
    fn test_single_threshold_is_learned() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let leaf = mean_leaf(&y);
        let tree = DecisionTree::fit(&x, &y, (0..20).collect(), &TreeParams::default(), &mut rng, &leaf);
        assert_eq!(tree.predict(&[3.0]), 0.0);
        assert_eq!(tree.predict(&[15.0]), 1.0);
        assert_eq!(tree.depth(), 1);
        // threshold sits between 9 and 10
        assert_eq!(tree.predict(&[9.4]), 0.0);
        assert_eq!(tree.predict(&[9.6]), 1.0);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 1.0]).collect();
        let y = vec![1.0; 10];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let leaf = mean_leaf(&y);
        let tree = DecisionTree::fit(&x, &y, (0..10).collect(), &TreeParams::default(), &mut rng, &leaf);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[100.0, 0.0]), 1.0);
    }

    #[test]
    fn test_depth_and_leaf_size_limits() {
        let x: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..64).map(|i| (i % 2) as f64).collect();
        let params = TreeParams {
            max_depth: 3,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let leaf = mean_leaf(&y);
        let tree = DecisionTree::fit(&x, &y, (0..64).collect(), &params, &mut rng, &leaf);
        assert!(tree.depth() <= 3);

        let params = TreeParams {
            min_samples_leaf: 40,
            ..Default::default()
        };
        let tree = DecisionTree::fit(&x, &y, (0..64).collect(), &params, &mut rng, &leaf);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_empty_indices_yield_zero_leaf() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let leaf = |_: &[usize]| 1.0;
        let tree = DecisionTree::fit(&[], &[], Vec::new(), &TreeParams::default(), &mut rng, &leaf);
        assert_eq!(tree.predict(&[1.0]), 0.0);
    }
}
