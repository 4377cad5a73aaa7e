//! Random-forest regressors stored as flat node arrays.

use serde::Deserialize;

use super::Regressor;

/// A tree node. Children are indices into the tree's node array; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForestParams {
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree>,
}

impl Tree {
    /// Checks that every reachable node exists, splits use known features and no path loops.
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let mut stack = vec![(0usize, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            if depth > self.nodes.len() {
                return Err("tree contains a cycle".to_string());
            }
            match self.nodes.get(index) {
                None => return Err(format!("node index {} out of bounds", index)),
                Some(Node::Leaf { .. }) => {}
                Some(Node::Split {
                    feature,
                    left,
                    right,
                    ..
                }) => {
                    if *feature >= n_features {
                        return Err(format!(
                            "split on feature {} but the model has {} predictors",
                            feature, n_features
                        ));
                    }
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        Ok(())
    }

    /// Values at or below the threshold go left. Only called on validated trees.
    fn predict(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl RandomForest {
    pub fn from_params(params: ForestParams, n_features: usize) -> Result<Self, String> {
        if params.trees.is_empty() {
            return Err("random forest has no trees".to_string());
        }
        for (i, tree) in params.trees.iter().enumerate() {
            tree.validate(n_features)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(Self {
            trees: params.trees,
        })
    }
}

impl Regressor for RandomForest {
    fn predict_row(&self, features: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        total / self.trees.len() as f64
    }
}
