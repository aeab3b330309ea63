use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

pub const CLASS_COUNT: usize = 2;

/// Anything that maps a feature vector to a distribution over {0, 1}.
pub trait Classifier {
    fn feature_count(&self) -> usize;

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>>;

    fn predict(&self, features: &[f64]) -> Result<ClassPrediction> {
        let probabilities = self.predict_proba(features)?;
        Ok(ClassPrediction {
            label: argmax(&probabilities),
            probabilities,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub label: usize,
    pub probabilities: Vec<f64>,
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 10,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        distribution: [f64; CLASS_COUNT],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    pub fn fit<R: Rng + ?Sized>(
        rows: &[Vec<f64>],
        labels: &[u8],
        samples: Vec<usize>,
        params: &ForestParams,
        max_features: usize,
        rng: &mut R,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(rows, labels, samples, 0, params, max_features, rng);
        tree
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Checks a deserialized tree before it is used for prediction. Child
    /// indices must point forward, which rules out cycles.
    pub fn validate(&self, feature_count: usize) -> Result<()> {
        self.check(feature_count).map_err(PipelineError::schema)
    }

    fn check(&self, feature_count: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { distribution } => {
                    if distribution.iter().any(|p| !p.is_finite()) {
                        return Err(format!("node {index}: leaf distribution is not finite"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= feature_count {
                        return Err(format!(
                            "node {index}: feature {feature} is out of range for {feature_count} features"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {index}: threshold is not finite"));
                    }
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(format!("node {index}: child index {child} is invalid"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn predict_proba(&self, features: &[f64]) -> [f64; CLASS_COUNT] {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(Node::Leaf { distribution }) => return *distribution,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return [0.0; CLASS_COUNT],
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn grow<R: Rng + ?Sized>(
        &mut self,
        rows: &[Vec<f64>],
        labels: &[u8],
        samples: Vec<usize>,
        depth: usize,
        params: &ForestParams,
        max_features: usize,
        rng: &mut R,
    ) -> usize {
        let counts = class_counts(labels, &samples);
        let pure = counts.iter().filter(|count| **count > 0).count() <= 1;

        if pure || depth >= params.max_depth || samples.len() < params.min_samples_split {
            return self.push_leaf(counts);
        }

        let Some(split) = best_split(rows, labels, &samples, max_features, rng) else {
            return self.push_leaf(counts);
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&sample| rows[sample][split.feature] <= split.threshold);

        let index = self.push_leaf(counts);
        let left = self.grow(rows, labels, left_samples, depth + 1, params, max_features, rng);
        let right = self.grow(rows, labels, right_samples, depth + 1, params, max_features, rng);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn push_leaf(&mut self, counts: [usize; CLASS_COUNT]) -> usize {
        let total = counts.iter().sum::<usize>().max(1) as f64;
        let distribution = [counts[0] as f64 / total, counts[1] as f64 / total];
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }
}

fn class_counts(labels: &[u8], samples: &[usize]) -> [usize; CLASS_COUNT] {
    let mut counts = [0; CLASS_COUNT];
    for &sample in samples {
        counts[usize::from(labels[sample])] += 1;
    }
    counts
}

fn gini(counts: &[usize; CLASS_COUNT], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|count| {
            let p = *count as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Best split over `max_features` randomly ordered features. Features that
/// are constant over `samples` do not count towards the limit, so `None`
/// means no feature can separate the samples at all.
fn best_split<R: Rng + ?Sized>(
    rows: &[Vec<f64>],
    labels: &[u8],
    samples: &[usize],
    max_features: usize,
    rng: &mut R,
) -> Option<SplitCandidate> {
    let feature_count = rows.first().map(Vec::len).unwrap_or(0);
    let total = samples.len();
    if feature_count == 0 || total < 2 {
        return None;
    }
    let parent = class_counts(labels, samples);

    let mut best: Option<SplitCandidate> = None;
    let mut visited = 0;

    for feature in index::sample(rng, feature_count, feature_count).into_iter() {
        if visited >= max_features.max(1) {
            break;
        }

        let mut ordered: Vec<(f64, u8)> = samples
            .iter()
            .map(|&sample| (rows[sample][feature], labels[sample]))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        if ordered[0].0 >= ordered[total - 1].0 {
            continue;
        }
        visited += 1;

        let mut left = [0usize; CLASS_COUNT];
        for position in 0..total - 1 {
            left[usize::from(ordered[position].1)] += 1;

            let (current, next) = (ordered[position].0, ordered[position + 1].0);
            if current >= next {
                continue;
            }

            let left_total = position + 1;
            let right_total = total - left_total;
            let right = [parent[0] - left[0], parent[1] - left[1]];
            let impurity = (left_total as f64 * gini(&left, left_total)
                + right_total as f64 * gini(&right, right_total))
                / total as f64;

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = current + (next - current) / 2.0;
                if threshold >= next {
                    threshold = current;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    feature_count: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits `params.n_estimators` trees, each on a bootstrap sample of the
    /// rows and considering `sqrt(feature_count)` features per split.
    pub fn fit<R: Rng + ?Sized>(
        rows: &[Vec<f64>],
        labels: &[u8],
        params: ForestParams,
        rng: &mut R,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::training("cannot fit a forest on zero rows"));
        }
        if rows.len() != labels.len() {
            return Err(PipelineError::training(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(PipelineError::training("n_estimators must be at least 1"));
        }
        let feature_count = rows[0].len();
        if feature_count == 0 || rows.iter().any(|row| row.len() != feature_count) {
            return Err(PipelineError::training(
                "every row needs the same, non-zero number of features",
            ));
        }
        if let Some(label) = labels.iter().find(|label| usize::from(**label) >= CLASS_COUNT) {
            return Err(PipelineError::training(format!("label {label} is not 0 or 1")));
        }

        let max_features = ((feature_count as f64).sqrt().floor() as usize).max(1);
        let n = rows.len();

        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(rows, labels, bootstrap, &params, max_features, &mut *rng)
            })
            .collect();

        debug!(
            trees = trees.len(),
            max_features,
            nodes = trees.iter().map(DecisionTree::node_count).sum::<usize>(),
            "fitted random forest"
        );

        Ok(Self {
            params,
            feature_count,
            trees,
        })
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(PipelineError::schema("forest has no trees"));
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.check(self.feature_count)
                .map_err(|e| PipelineError::schema(format!("tree {index}, {e}")))?;
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.feature_count {
            return Err(PipelineError::invalid_input(format!(
                "expected {} features, got {}",
                self.feature_count,
                features.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(PipelineError::schema("forest has no trees"));
        }

        let mut sum = [0.0; CLASS_COUNT];
        for tree in &self.trees {
            let distribution = tree.predict_proba(features);
            for (total, p) in sum.iter_mut().zip(distribution) {
                *total += p;
            }
        }

        let count = self.trees.len() as f64;
        Ok(sum.iter().map(|total| total / count).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn separable() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let score = 30.0 + i as f64 * 1.5;
            rows.push(vec![score, 50.0, (i % 3) as f64, 10.0]);
            labels.push(u8::from(score > 60.0));
        }
        (rows, labels)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 25,
            ..ForestParams::default()
        }
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.2, 0.8]), 1);
        assert_eq!(argmax(&[0.9, 0.1]), 0);
    }

    #[test]
    fn gini_of_pure_and_even_nodes() {
        assert_eq!(gini(&[4, 0], 4), 0.0);
        assert!((gini(&[2, 2], 4) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_tree_learns_a_threshold() {
        let (rows, labels) = separable();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let samples: Vec<usize> = (0..rows.len()).collect();
        // max_features = 4 makes the informative column always available.
        let tree = DecisionTree::fit(&rows, &labels, samples, &ForestParams::default(), 4, &mut rng);

        assert_eq!(tree.predict_proba(&[35.0, 50.0, 0.0, 10.0]), [1.0, 0.0]);
        assert_eq!(tree.predict_proba(&[85.0, 50.0, 1.0, 10.0]), [0.0, 1.0]);
    }

    #[test]
    fn depth_limit_is_respected() {
        let (rows, labels) = separable();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let params = ForestParams {
            max_depth: 1,
            ..small_params()
        };
        let forest = RandomForest::fit(&rows, &labels, params, &mut rng).unwrap();
        assert!(forest.trees().iter().all(|tree| tree.depth() <= 1));
    }

    #[test]
    fn forest_separates_clear_classes() {
        let (rows, labels) = separable();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let forest = RandomForest::fit(&rows, &labels, small_params(), &mut rng).unwrap();

        let low = forest.predict(&[31.0, 50.0, 0.0, 10.0]).unwrap();
        let high = forest.predict(&[88.0, 50.0, 2.0, 10.0]).unwrap();
        assert_eq!(low.label, 0);
        assert_eq!(high.label, 1);
        assert!((high.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn seeded_fits_are_reproducible() {
        let (rows, labels) = separable();
        let a = RandomForest::fit(&rows, &labels, small_params(), &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        let b = RandomForest::fit(&rows, &labels, small_params(), &mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_class_data_yields_certain_leaves() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let labels = vec![1, 1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let forest = RandomForest::fit(&rows, &labels, small_params(), &mut rng).unwrap();
        let prediction = forest.predict(&[2.0, 3.0]).unwrap();
        assert_eq!(prediction.label, 1);
        assert_eq!(prediction.probabilities, vec![0.0, 1.0]);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let (rows, labels) = separable();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let forest = RandomForest::fit(&rows, &labels, small_params(), &mut rng).unwrap();
        assert!(matches!(
            forest.predict_proba(&[1.0, 2.0]),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn fit_rejects_bad_inputs() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(RandomForest::fit(&[], &[], small_params(), &mut rng).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[2], small_params(), &mut rng).is_err());
        assert!(RandomForest::fit(&[vec![1.0], vec![1.0, 2.0]], &[0, 1], small_params(), &mut rng)
            .is_err());
    }

    #[test]
    fn fitted_trees_pass_validation() {
        let (rows, labels) = separable();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let forest = RandomForest::fit(&rows, &labels, small_params(), &mut rng).unwrap();
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn malformed_trees_fail_validation() {
        let leaf = Node::Leaf {
            distribution: [0.5, 0.5],
        };
        let split = |feature, left, right| Node::Split {
            feature,
            threshold: 1.0,
            left,
            right,
        };

        let cases = [
            DecisionTree { nodes: Vec::new() },
            DecisionTree {
                nodes: vec![split(4, 1, 2), leaf.clone(), leaf.clone()],
            },
            DecisionTree {
                nodes: vec![split(0, 0, 1), leaf.clone()],
            },
            DecisionTree {
                nodes: vec![split(0, 1, 5), leaf.clone()],
            },
            DecisionTree {
                nodes: vec![Node::Leaf {
                    distribution: [f64::NAN, 0.5],
                }],
            },
        ];
        for tree in cases {
            assert!(
                matches!(tree.validate(4), Err(PipelineError::Schema(_))),
                "{tree:?}"
            );
        }

        let good = DecisionTree {
            nodes: vec![split(3, 1, 2), leaf.clone(), leaf],
        };
        assert!(good.validate(4).is_ok());
    }

    #[test]
    fn forest_survives_json_round_trip() {
        let (rows, labels) = separable();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let forest = RandomForest::fit(&rows, &labels, small_params(), &mut rng).unwrap();

        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        let input = [47.0, 50.0, 1.0, 10.0];
        let before = forest.predict_proba(&input).unwrap();
        let after = restored.predict_proba(&input).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
