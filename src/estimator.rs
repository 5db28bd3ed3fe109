//! Logistic strength model fitted by maximum a posteriori estimation.
//!
//! P(win) = σ(w_r · rating + w_s · strength + b), with independent Normal
//! priors on w_r, w_s and b. Only the MAP point estimate is computed.

use crate::error::FitError;
use crate::types::*;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn logistic(logit: f64) -> f64 {
    1.0 / (1.0 + (-logit).exp())
}

/// Fitted model parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub rating_weight: f64,
    pub strength_weight: f64,
    pub intercept: f64,
}

impl Coefficients {
    /// Prior means, used when fitting is impossible or fails
    pub fn from_priors(config: &EngineConfig) -> Self {
        Self {
            rating_weight: config.prior_rating_weight.mean,
            strength_weight: config.prior_strength_weight.mean,
            intercept: config.prior_intercept.mean,
        }
    }

    /// Win probability for already-normalised inputs
    pub fn win_probability(&self, rating: f64, strength: f64) -> f64 {
        logistic(self.rating_weight * rating + self.strength_weight * strength + self.intercept)
    }

    fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.rating_weight, self.strength_weight, self.intercept)
    }

    fn from_vector(v: &Vector3<f64>) -> Self {
        Self {
            rating_weight: v[0],
            strength_weight: v[1],
            intercept: v[2],
        }
    }
}

/// One normalised training row
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    pub rating: f64,
    pub strength: f64,
    pub won: bool,
}

/// Turn game records into normalised observations.
///
/// The rating used is the player's rating for the team they ended up on.
/// Records referring to unknown players or characters are skipped.
pub fn observations(
    records: &[GameRecord],
    players: &[Player],
    characters: &[Character],
    config: &EngineConfig,
) -> Vec<Observation> {
    let players_by_id: HashMap<u64, &Player> = players.iter().map(|p| (p.id, p)).collect();
    let strength_by_id: HashMap<u64, f64> = characters.iter().map(|c| (c.id, c.base_strength)).collect();

    records
        .iter()
        .filter_map(|record| {
            let player = players_by_id.get(&record.player_id)?;
            let strength = strength_by_id.get(&record.character_id)?;
            Some(Observation {
                rating: config.normalise_rating(player.rating_for(record.team)),
                strength: config.normalise_strength(*strength),
                won: record.won,
            })
        })
        .collect()
}

/// Newton–Raphson ascent on the log posterior
pub fn fit_map(observations: &[Observation], config: &EngineConfig) -> Result<Coefficients, FitError> {
    if observations.is_empty() {
        return Err(FitError::NoData);
    }

    let priors = [
        config.prior_rating_weight,
        config.prior_strength_weight,
        config.prior_intercept,
    ];
    let prior_mean = Vector3::new(priors[0].mean, priors[1].mean, priors[2].mean);
    let prior_precision = Vector3::new(
        1.0 / priors[0].std_dev.powi(2),
        1.0 / priors[1].std_dev.powi(2),
        1.0 / priors[2].std_dev.powi(2),
    );

    let mut theta = Coefficients::from_priors(config).as_vector();

    for iteration in 0..config.fit_max_iterations {
        let mut gradient = -(theta - prior_mean).component_mul(&prior_precision);
        // Negative Hessian: prior precision plus the Fisher information
        let mut curvature = Matrix3::from_diagonal(&prior_precision);

        for obs in observations {
            let x = Vector3::new(obs.rating, obs.strength, 1.0);
            let p = logistic(theta.dot(&x));
            let y = if obs.won { 1.0 } else { 0.0 };
            gradient += x * (y - p);
            curvature += x * x.transpose() * (p * (1.0 - p));
        }

        let step = curvature
            .cholesky()
            .ok_or(FitError::Singular)?
            .solve(&gradient);
        if step.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Singular);
        }

        theta += step;

        if step.norm() < config.fit_tolerance {
            log::debug!("MAP fit converged after {} iterations", iteration + 1);
            return Ok(Coefficients::from_vector(&theta));
        }
    }

    Err(FitError::NonConvergence {
        iterations: config.fit_max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(rating: f64, strength: f64, won: bool) -> Observation {
        Observation { rating, strength, won }
    }

    #[test]
    fn test_empty_history_is_reported() {
        let config = EngineConfig::default();
        assert_eq!(fit_map(&[], &config), Err(FitError::NoData));
    }

    #[test]
    fn test_prior_means_give_even_odds_at_baseline() {
        let mut config = EngineConfig::default();
        config.prior_intercept.mean = 0.0;
        let coefficients = Coefficients::from_priors(&config);
        assert!((coefficients.win_probability(0.0, 0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rating_weight_follows_data() {
        let config = EngineConfig::default();
        let mut data = Vec::new();
        for _ in 0..40 {
            data.push(obs(1.0, 0.0, true));
            data.push(obs(-1.0, 0.0, false));
        }
        data.push(obs(1.0, 0.0, false));
        data.push(obs(-1.0, 0.0, true));

        let fitted = fit_map(&data, &config).unwrap();
        assert!(fitted.rating_weight > 1.0, "got {:?}", fitted);
        assert!(fitted.win_probability(1.0, 0.0) > 0.8);
        assert!(fitted.win_probability(-1.0, 0.0) < 0.2);
    }

    #[test]
    fn test_priors_keep_separable_data_finite() {
        let config = EngineConfig::default();
        let data = vec![obs(0.5, 1.0, true), obs(-0.5, -1.0, false)];
        let fitted = fit_map(&data, &config).unwrap();
        assert!(fitted.rating_weight.is_finite());
        assert!(fitted.strength_weight > 0.0);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let mut config = EngineConfig::default();
        config.fit_max_iterations = 1;
        config.fit_tolerance = 0.0;
        let data = vec![obs(1.0, 0.0, true), obs(-1.0, 0.0, false)];
        assert_eq!(
            fit_map(&data, &config),
            Err(FitError::NonConvergence { iterations: 1 })
        );
    }

    #[test]
    fn test_observations_use_team_rating() {
        let config = EngineConfig::default();
        let players = vec![Player::new(1, "Rita", 1900.0, 1100.0)];
        let characters = vec![Character::new(7, "Imp", Alignment::Evil, RoleType::Demon, 75.0)];
        let records = vec![
            GameRecord { player_id: 1, character_id: 7, team: Alignment::Evil, won: true },
            GameRecord { player_id: 2, character_id: 7, team: Alignment::Evil, won: true },
        ];

        let rows = observations(&records, &players, &characters, &config);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rating, -1.0);
        assert_eq!(rows[0].strength, 1.0);
        assert!(rows[0].won);
    }
}
