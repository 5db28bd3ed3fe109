use crate::estimator::Coefficients;
use crate::types::*;
use rand::Rng;

/// Jittered win probabilities S and alignment bias B, indexed [player][character]
#[derive(Clone, Debug)]
pub struct ScoreMatrices {
    pub win: Vec<Vec<f64>>,
    pub bias: Vec<Vec<f64>>,
}

impl ScoreMatrices {
    pub fn build(
        players: &[Player],
        characters: &[Character],
        coefficients: &Coefficients,
        config: &EngineConfig,
        extra_randomness: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let scale = config.randomness_scale(extra_randomness);
        let mut win = vec![vec![0.0; characters.len()]; players.len()];
        let mut bias = vec![vec![0.0; characters.len()]; players.len()];

        for (i, player) in players.iter().enumerate() {
            for (j, character) in characters.iter().enumerate() {
                let p = win_probability(player, character, character.base_strength, coefficients, config);

                let mut jitter = rng.gen_range(-config.jitter..=config.jitter);
                if character.role_type == RoleType::Minion {
                    // Wider spread so Minion picks vary between attempts
                    jitter += rng.gen_range(-config.minion_jitter..=config.minion_jitter);
                }
                win[i][j] = (p + jitter * scale).clamp(0.0, 1.0);
                bias[i][j] = alignment_bias(&player.history, character.alignment, scale, rng);
            }
        }

        Self { win, bias }
    }
}

/// Unjittered model probability for a player in a character of the given strength
pub fn win_probability(
    player: &Player,
    character: &Character,
    strength: f64,
    coefficients: &Coefficients,
    config: &EngineConfig,
) -> f64 {
    let rating = config.normalise_rating(player.rating_for(character.alignment));
    coefficients.win_probability(rating, config.normalise_strength(strength))
}

/// Preference for putting a player on `target` given their recent teams.
///
/// Recent Evil games raise the pull towards Good. The pull towards Evil
/// decays logistically with the length of the current Good streak. Both
/// carry noise so the outcome stays hard to predict.
pub fn alignment_bias(history: &[Alignment], target: Alignment, scale: f64, rng: &mut impl Rng) -> f64 {
    if target.is_good() {
        let recent_evil = history.iter().take(2).filter(|a| !a.is_good()).count() as f64;
        let evil_streak = history.iter().take_while(|a| !a.is_good()).count() as f64;
        let base = 0.5 + 0.3 * recent_evil + 0.2 * evil_streak;
        let spread = 1.5 * scale;
        base + rng.gen_range(-spread..=spread)
    } else {
        let good_streak = history.iter().take_while(|a| a.is_good()).count() as f64;
        let decay = 1.0 / (1.0 + (1.2 * (good_streak - 3.0)).exp());
        let base = 0.3 + decay * rng.gen_range(0.3..=1.0);
        base + rng.gen_range(0.05..=0.2) * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn average_bias(history: &[Alignment], target: Alignment) -> f64 {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 4000;
        (0..n).map(|_| alignment_bias(history, target, 1.0, &mut rng)).sum::<f64>() / n as f64
    }

    #[test]
    fn test_evil_history_pulls_towards_good() {
        let evil_run = vec![Alignment::Evil; 4];
        let good_run = vec![Alignment::Good; 4];
        assert!(average_bias(&evil_run, Alignment::Good) > average_bias(&good_run, Alignment::Good) + 1.0);
    }

    #[test]
    fn test_good_streak_weakens_evil_pull() {
        // A long Good streak means the decay term is small
        let long_streak = vec![Alignment::Good; 10];
        let broken = vec![Alignment::Evil, Alignment::Good, Alignment::Good];
        let long = average_bias(&long_streak, Alignment::Evil);
        let short = average_bias(&broken, Alignment::Evil);
        assert!(short > long);
        assert!(long > 0.3);
    }

    #[test]
    fn test_minion_columns_get_wider_jitter() {
        let config = EngineConfig::default();
        let coefficients = Coefficients::from_priors(&config);
        let players = vec![Player::new(1, "Jed", 1500.0, 1500.0)];
        let characters = vec![
            Character::new(1, "Chef", Alignment::Good, RoleType::Townsfolk, 50.0),
            Character::new(2, "Poisoner", Alignment::Evil, RoleType::Minion, 50.0),
        ];
        let base = coefficients.win_probability(0.0, 0.0);
        let mut rng = StdRng::seed_from_u64(3);

        let mut townsfolk_spread: f64 = 0.0;
        let mut minion_spread: f64 = 0.0;
        for _ in 0..500 {
            let s = ScoreMatrices::build(&players, &characters, &coefficients, &config, 0.0, &mut rng);
            townsfolk_spread = townsfolk_spread.max((s.win[0][0] - base).abs());
            minion_spread = minion_spread.max((s.win[0][1] - base).abs());
            assert!((0.0..=1.0).contains(&s.win[0][1]));
        }
        assert!(townsfolk_spread <= config.jitter + 1e-12);
        assert!(minion_spread > config.jitter);
    }

    #[test]
    fn test_same_seed_same_matrices() {
        let config = EngineConfig::default();
        let coefficients = Coefficients::from_priors(&config);
        let players = vec![Player::new(1, "Oli", 1700.0, 1300.0)];
        let characters = vec![Character::new(1, "Imp", Alignment::Evil, RoleType::Demon, 70.0)];

        let a = ScoreMatrices::build(&players, &characters, &coefficients, &config, 0.5, &mut StdRng::seed_from_u64(9));
        let b = ScoreMatrices::build(&players, &characters, &coefficients, &config, 0.5, &mut StdRng::seed_from_u64(9));
        assert_eq!(a.win, b.win);
        assert_eq!(a.bias, b.bias);
    }
}
