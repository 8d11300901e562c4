//! Query parameters, validation, and staged invalidation.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::store::Catalog;

/// Number of pipeline stages; `first_changed_stage` returns this value
/// when nothing differs.
pub const NUM_STAGES: usize = 8;

/// Sentinel target expanding to the full user list.
pub const ALL_USERS: &str = "0.0.0.0";

/// Sum tolerance for weight vectors that must add up to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-10;

/// A full analysis query.
///
/// `prune_threshold` and `max_cluster_size` are raw values, or z-scores
/// when the matching `*_z` flag is set; they are resolved against the
/// current similarity and cluster-size statistics inside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    /// Target user (dotted quad), subnet (`a.b.c.d/p`), or the `0.0.0.0`
    /// sentinel selecting every known user.
    pub user: String,
    /// Per-feature fusion weights, non-negative, summing to one.
    pub feature_weights: Vec<f64>,
    // TODO: feature_ordered_weights are validated and recorded but nothing
    // reads them downstream yet; pin down their semantics before wiring
    // them into the fusion.
    pub feature_ordered_weights: Vec<f64>,
    pub prune_threshold: f64,
    pub max_cluster_size: f64,
    /// Interpret `prune_threshold` as a z-score.
    pub prune_z: bool,
    /// Interpret `max_cluster_size` as a z-score.
    pub cluster_z: bool,
    /// Enable whitelist suppression.
    pub whitelist: bool,
    /// On-the-go whitelist, one domain per line.
    pub white_ongo: String,
    /// Minimum number of requests a user must have sent to a domain for
    /// the domain to escape suppression.
    pub min_requests: f64,
    /// Weights over the parent, child and request indices. The request
    /// weight (position 2) may be negative to penalize chatty domains.
    pub ranking_weights: [f64; 3],
    /// Report `.apt`-labeled domains and their ranking positions.
    pub apt_search: bool,
}

impl QueryParams {
    /// Refuse malformed queries before any stage runs.
    pub fn validate(&self, catalog: &Catalog) -> EngineResult<()> {
        if self.user != ALL_USERS
            && !catalog.users.contains(&self.user)
            && !catalog.subnets.contains(&self.user)
        {
            return Err(EngineError::Validation(format!(
                "unknown user or subnet: {}",
                self.user
            )));
        }

        check_weight_vector("feature weights", &self.feature_weights)?;
        check_weight_vector("feature ordered weights", &self.feature_ordered_weights)?;

        if !self.prune_z && self.prune_threshold < 0.0 {
            return Err(EngineError::Validation(
                "prune threshold must be non-negative in raw mode".into(),
            ));
        }
        if !self.cluster_z && self.max_cluster_size < 0.0 {
            return Err(EngineError::Validation(
                "max cluster size must be non-negative in raw mode".into(),
            ));
        }
        if self.min_requests < 0.0 {
            return Err(EngineError::Validation(
                "minimum request count must be non-negative".into(),
            ));
        }

        // The request-count weight may penalize; the graph weights may not.
        if self.ranking_weights[0] < 0.0 || self.ranking_weights[1] < 0.0 {
            return Err(EngineError::Validation(
                "ranking weights 0 and 1 must be non-negative".into(),
            ));
        }
        let sum: f64 = self.ranking_weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::Validation(format!(
                "ranking weights must sum to 1, got {sum}"
            )));
        }

        Ok(())
    }

    /// Index of the first pipeline stage whose inputs differ from the
    /// previous query, in dependency order. Stages before it can be
    /// reused; it and everything after must be recomputed. Returns
    /// [`NUM_STAGES`] when the parameter vectors are identical.
    ///
    /// Floating-point fields compare by bit pattern: callers are expected
    /// to pass canonical values, and bitwise comparison avoids NaN traps.
    pub fn first_changed_stage(&self, prev: &QueryParams) -> usize {
        if self.user != prev.user {
            return 0;
        }
        if !bits_eq_slice(&self.feature_weights, &prev.feature_weights)
            || !bits_eq_slice(&self.feature_ordered_weights, &prev.feature_ordered_weights)
        {
            return 1;
        }
        if self.prune_z != prev.prune_z {
            return 2;
        }
        if !bits_eq(self.prune_threshold, prev.prune_threshold) {
            return 3;
        }
        if self.cluster_z != prev.cluster_z {
            return 4;
        }
        if !bits_eq(self.max_cluster_size, prev.max_cluster_size) {
            return 5;
        }
        if self.whitelist != prev.whitelist
            || self.white_ongo != prev.white_ongo
            || !bits_eq(self.min_requests, prev.min_requests)
        {
            return 6;
        }
        if !bits_eq_slice(&self.ranking_weights, &prev.ranking_weights)
            || self.apt_search != prev.apt_search
        {
            return 7;
        }
        NUM_STAGES
    }
}

fn check_weight_vector(what: &str, weights: &[f64]) -> EngineResult<()> {
    if weights.iter().any(|&w| w < 0.0) {
        return Err(EngineError::Validation(format!(
            "{what} must be non-negative"
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EngineError::Validation(format!(
            "{what} must sum to 1, got {sum}"
        )));
    }
    Ok(())
}

fn bits_eq(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}

fn bits_eq_slice(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| bits_eq(*x, *y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog {
            users: vec!["10.0.0.1".into(), "10.0.0.2".into()],
            subnets: vec!["10.0.0.0/24".into()],
        }
    }

    fn params() -> QueryParams {
        QueryParams {
            user: "10.0.0.1".into(),
            feature_weights: vec![0.5, 0.5],
            feature_ordered_weights: vec![1.0, 0.0],
            prune_threshold: 0.35,
            max_cluster_size: 2.0,
            prune_z: false,
            cluster_z: false,
            whitelist: false,
            white_ongo: String::new(),
            min_requests: 0.0,
            ranking_weights: [0.0, 1.0, 0.0],
            apt_search: false,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_query() {
        assert!(params().validate(&catalog()).is_ok());
    }

    #[test]
    fn test_validate_accepts_subnet_target() {
        let mut p = params();
        p.user = "10.0.0.0/24".into();
        assert!(p.validate(&catalog()).is_ok());
    }

    #[test]
    fn test_validate_refuses_unknown_user() {
        let mut p = params();
        p.user = "172.16.0.9".into();
        assert!(p.validate(&catalog()).is_err());
    }

    #[test]
    fn test_validate_refuses_negative_feature_weight() {
        let mut p = params();
        p.feature_weights = vec![1.5, -0.5];
        assert!(p.validate(&catalog()).is_err());
    }

    #[test]
    fn test_validate_refuses_bad_weight_sum() {
        let mut p = params();
        p.feature_weights = vec![0.5, 0.4];
        assert!(p.validate(&catalog()).is_err());
    }

    #[test]
    fn test_validate_allows_negative_request_weight() {
        let mut p = params();
        p.ranking_weights = [0.6, 0.6, -0.2];
        assert!(p.validate(&catalog()).is_ok());
        p.ranking_weights = [-0.2, 0.6, 0.6];
        assert!(p.validate(&catalog()).is_err());
    }

    #[test]
    fn test_validate_refuses_negative_raw_thresholds() {
        let mut p = params();
        p.prune_threshold = -0.1;
        assert!(p.validate(&catalog()).is_err());
        // The same value is legal as a z-score.
        p.prune_z = true;
        assert!(p.validate(&catalog()).is_ok());
    }

    #[test]
    fn test_first_changed_stage_dependency_order() {
        let base = params();

        assert_eq!(base.first_changed_stage(&base), NUM_STAGES);

        let mut q = base.clone();
        q.user = "10.0.0.2".into();
        assert_eq!(q.first_changed_stage(&base), 0);

        let mut q = base.clone();
        q.feature_weights = vec![1.0, 0.0];
        assert_eq!(q.first_changed_stage(&base), 1);

        let mut q = base.clone();
        q.prune_z = true;
        assert_eq!(q.first_changed_stage(&base), 2);

        let mut q = base.clone();
        q.prune_threshold = 0.4;
        assert_eq!(q.first_changed_stage(&base), 3);

        let mut q = base.clone();
        q.cluster_z = true;
        assert_eq!(q.first_changed_stage(&base), 4);

        let mut q = base.clone();
        q.max_cluster_size = 10.0;
        assert_eq!(q.first_changed_stage(&base), 5);

        let mut q = base.clone();
        q.white_ongo = "ads.example.com".into();
        assert_eq!(q.first_changed_stage(&base), 6);

        let mut q = base.clone();
        q.apt_search = true;
        assert_eq!(q.first_changed_stage(&base), 7);
    }

    #[test]
    fn test_user_change_dominates_later_changes() {
        let base = params();
        let mut q = base.clone();
        q.user = "10.0.0.2".into();
        q.ranking_weights = [1.0, 0.0, 0.0];
        assert_eq!(q.first_changed_stage(&base), 0);
    }
}
