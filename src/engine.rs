//! One setup attempt: build the program, solve it, run post-solve hooks.

use crate::error::{EngineError, Result};
use crate::estimator::Coefficients;
use crate::hooks::{Hook, Overlay, SolvedView};
use crate::program::{Program, Solved, VarId};
use crate::rules::{QuotaOverride, QuotaShift, Rule, RuleContext, RuleKind, VILLAGE_IDIOT};
use crate::scoring::{self, ScoreMatrices};
use crate::seating;
use crate::types::*;
use good_lp::Expression;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Everything an attempt reads; nothing here is modified
pub struct AttemptInput<'a> {
    pub players: &'a [Player],
    pub characters: &'a [Character],
    pub base: RoleCounts,
    pub coefficients: &'a Coefficients,
    pub config: &'a EngineConfig,
    pub options: &'a RunOptions,
}

/// A solved, post-processed setup waiting to be accepted or rejected
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    /// Seat order
    pub assignments: Vec<Assignment>,
    pub log: RunLog,
    pub base: RoleCounts,
    /// Counts actually enforced after rule deltas and quota overrides
    pub adjusted: RoleCounts,
    pub balance: Balance,
}

impl Proposal {
    pub fn count(&self, role: RoleType) -> usize {
        self.assignments.iter().filter(|a| a.role_type == role).count()
    }

    pub fn assignment_for(&self, player: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.player == player)
    }

    pub fn assignment_for_character(&self, character: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.character == character)
    }

    /// Assignment table followed by the base vs enforced role summary
    pub fn to_table(&self) -> String {
        let player_width = self.assignments.iter().map(|a| a.player.len()).max().unwrap_or(0).max(6);
        let character_width = self.assignments.iter().map(|a| a.character.len()).max().unwrap_or(0).max(9);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<pw$}  {:<cw$}  {:<9}  {:>6}  {:<7}  {}",
            "Player",
            "Character",
            "Role",
            "Win %",
            "Team",
            "Drunk",
            pw = player_width,
            cw = character_width
        );
        for a in &self.assignments {
            let _ = writeln!(
                out,
                "{:<pw$}  {:<cw$}  {:<9}  {:>6.1}  {:<7}  {}",
                a.player,
                a.character,
                a.role_type.to_string(),
                a.win_probability * 100.0,
                a.team.to_string(),
                if a.drunk { "Drunk" } else { "_" },
                pw = player_width,
                cw = character_width
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Role requirements:");
        for role in RoleType::ALL {
            let _ = writeln!(
                out,
                "  {}: base={}, enforced={}",
                role,
                self.base.get(role),
                self.adjusted.get(role)
            );
        }
        let _ = writeln!(
            out,
            "Balance: good {:.3}, evil {:.3}, tolerance {:.3}, slack {:.3}",
            self.balance.good_average, self.balance.evil_average, self.balance.tolerance, self.balance.slack
        );
        out
    }
}

/// Quota machinery collected from the rules, kept for reading back after the solve
#[derive(Default)]
struct Quotas {
    shifts: Vec<QuotaShift>,
    quota_override: Option<QuotaOverride>,
}

impl Quotas {
    /// base + Σ amount · in_play for one role type
    fn required(&self, role: RoleType, base: &RoleCounts, program: &Program) -> Expression {
        let mut expr = Expression::from(base.get(role) as f64);
        for shift in self.shifts.iter().filter(|s| s.role == role) {
            expr += program.var(shift.in_play) * shift.amount as f64;
        }
        expr
    }

    fn resolved(&self, base: &RoleCounts, solved: &Solved) -> RoleCounts {
        let mut counts = [0i64; 4];
        for (k, role) in RoleType::ALL.into_iter().enumerate() {
            counts[k] = base.get(role) as i64;
            for shift in self.shifts.iter().filter(|s| s.role == role) {
                if solved.is_set(shift.in_play) {
                    counts[k] += shift.amount as i64;
                }
            }
        }
        if let Some(quota) = self.quota_override {
            if solved.is_set(quota.in_play) {
                let good = counts[0] + counts[1];
                counts[1] = quota.outsiders as i64;
                counts[0] = good - quota.outsiders as i64;
            }
        }
        let clamp = |v: i64| v.max(0) as u32;
        RoleCounts::new(clamp(counts[0]), clamp(counts[1]), clamp(counts[2]), clamp(counts[3]))
    }
}

fn find_column(characters: &[Character], name: &str) -> Option<usize> {
    characters.iter().position(|c| c.name == name)
}

/// Columns covered by an exclusion: the named character plus its expanded copies
fn excluded_columns(characters: &[Character], name: &str) -> Vec<usize> {
    characters
        .iter()
        .enumerate()
        .filter(|(_, c)| c.name == name || (name == VILLAGE_IDIOT && c.name.starts_with(VILLAGE_IDIOT)))
        .map(|(j, _)| j)
        .collect()
}

/// Record one warning per option listing every name that could not be honoured
fn check_option_names(input: &AttemptInput<'_>, log: &mut RunLog) {
    let known_player = |name: &str| input.players.iter().any(|p| p.name == name);
    let known_character = |name: &str| input.characters.iter().any(|c| c.name == name);

    let mut report = |option: &str, what: &str, names: Vec<&String>| {
        if !names.is_empty() {
            let names: Vec<&str> = names.into_iter().map(|n| n.as_str()).collect();
            log.warning(format!("{}: ignoring unknown {}: {}", option, what, names.join(", ")));
        }
    };

    let options = input.options;
    report("fixed_team", "players", options.fixed_team.keys().filter(|n| !known_player(n.as_str())).collect());
    report(
        "fixed_character",
        "players",
        options.fixed_character.keys().filter(|n| !known_player(n.as_str())).collect(),
    );
    report(
        "fixed_character",
        "characters",
        options
            .fixed_character
            .iter()
            .filter(|(p, c)| known_player(p.as_str()) && !known_character(c.as_str()))
            .map(|(_, c)| c)
            .collect(),
    );
    report("fixed_role", "players", options.fixed_role.keys().filter(|n| !known_player(n.as_str())).collect());
    report("include", "characters", options.include.iter().filter(|n| !known_character(n.as_str())).collect());
    report("exclude", "characters", options.exclude.iter().filter(|n| !known_character(n.as_str())).collect());
}

/// Run BUILD → SOLVE → POST_SOLVE once and return the proposal
pub fn run_attempt(input: &AttemptInput<'_>, rng: &mut impl Rng) -> Result<Proposal> {
    let config = input.config;
    let options = input.options;
    if !options.extra_randomness.is_finite() || options.extra_randomness < 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "extra_randomness must be a non-negative number, got {}",
            options.extra_randomness
        )));
    }
    if input.players.is_empty() {
        return Err(EngineError::InvalidInput("no players".to_string()));
    }

    let mut log = RunLog::default();
    check_option_names(input, &mut log);

    // Shuffled per attempt so solver tie-breaks do not follow load order
    let mut characters = input.characters.to_vec();
    characters.shuffle(rng);
    let players = input.players;

    let scores = ScoreMatrices::build(players, &characters, input.coefficients, config, options.extra_randomness, rng);

    let mut program = Program::new(players.len(), characters.len());
    let one = || Expression::from(1.0);
    let zero = || Expression::from(0.0);

    for i in 0..players.len() {
        let row = program.row_sum(i);
        program.require_eq(row, one());
    }
    for j in 0..characters.len() {
        let column = program.column_sum(j);
        program.require_leq(column, one());
    }

    let mut pinned_roles = BTreeSet::new();
    let mut fixed_good = BTreeSet::new();
    // Rows that must not end up as a Lord of Typhon neighbour
    let mut no_flank = BTreeSet::new();
    for (i, player) in players.iter().enumerate() {
        if let Some(team) = options.fixed_team.get(&player.name) {
            if team.is_good() {
                fixed_good.insert(i);
                no_flank.insert(i);
            }
            for (j, character) in characters.iter().enumerate() {
                if character.alignment.is_good() != team.is_good() {
                    let var = program.var(program.assign(i, j));
                    program.require_eq(var, zero());
                }
            }
        }
        if let Some(name) = options.fixed_character.get(&player.name) {
            if let Some(j) = find_column(&characters, name) {
                let var = program.var(program.assign(i, j));
                program.require_eq(var, one());
                pinned_roles.insert(characters[j].role_type);
            }
        }
        if let Some(role) = options.fixed_role.get(&player.name) {
            let row = program.row_sum_where(i, |j| characters[j].role_type == *role);
            program.require_eq(row, one());
            pinned_roles.insert(*role);
            if *role != RoleType::Minion {
                no_flank.insert(i);
            }
        }
    }

    for name in &options.include {
        if let Some(j) = find_column(&characters, name) {
            let column = program.column_sum(j);
            program.require_eq(column, one());
            pinned_roles.insert(characters[j].role_type);
        }
    }
    let mut excluded = BTreeSet::new();
    for name in &options.exclude {
        for j in excluded_columns(&characters, name) {
            let column = program.column_sum(j);
            program.require_eq(column, zero());
            excluded.insert(j);
        }
    }

    let mut registered: Vec<(Rule, usize)> = characters
        .iter()
        .enumerate()
        .filter(|(j, _)| !excluded.contains(j))
        .filter_map(|(j, c)| Rule::from_name(&c.name).map(|rule| (rule, j)))
        .collect();
    registered.sort();

    let mut quotas = Quotas::default();
    let mut hooks: Vec<Hook> = Vec::new();
    for (rule, column) in registered {
        let mut ctx = RuleContext {
            program: &mut program,
            characters: &characters,
            base: input.base,
            config,
            pinned_roles: &pinned_roles,
            fixed_good: &fixed_good,
        };
        let effect = rule.apply(column, &mut ctx, rng);
        for note in effect.notes {
            log.rule(note);
        }
        for warning in effect.warnings {
            log.warning(warning);
        }
        quotas.shifts.extend(effect.shifts);
        match rule.kind() {
            RuleKind::QuotaOverride => quotas.quota_override = effect.quota_override,
            RuleKind::SeatingEffect => keep_off_flanks(&mut program, column, &no_flank),
            _ => {}
        }
        hooks.extend(effect.hook);
    }

    let quota_roles: Vec<RoleType> = characters
        .iter()
        .map(|c| Rule::from_name(&c.name).and_then(|rule| rule.quota_role()).unwrap_or(c.role_type))
        .collect();
    enforce_role_counts(&mut program, &quota_roles, &input.base, &quotas, players.len());
    let slack = enforce_balance(&mut program, &characters, &input.base, &quotas, &scores, config);

    let scale = config.randomness_scale(options.extra_randomness);
    let weights: Vec<Vec<f64>> = scores
        .bias
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| -b + rng.gen_range(-config.objective_noise..=config.objective_noise) * scale)
                .collect()
        })
        .collect();
    let objective = program.weighted_sum(&weights, |_| true);
    let slack_term = program.var(slack);
    program.minimise(slack_term);
    program.minimise(objective);

    let solved = program.solve()?;

    let mut overlay = Overlay::default();
    let view = SolvedView {
        solved: &solved,
        players,
        characters: &characters,
        config,
    };
    for hook in &hooks {
        let message = hook.run(&view, &mut overlay, rng);
        log.adjustment(message);
    }

    let assignment = solved.assignment();
    let mut rows = Vec::with_capacity(players.len());
    for (i, player) in players.iter().enumerate() {
        let j = assignment[i].ok_or_else(|| {
            EngineError::InvariantViolation(format!("player '{}' left without a character", player.name))
        })?;
        let character = overlay.effective(j, &characters[j]);
        let win_probability = match overlay.strength(j) {
            Some(strength) => scoring::win_probability(player, &character, strength, input.coefficients, config),
            None => scores.win[i][j],
        };
        rows.push(Assignment {
            player: player.name.clone(),
            character: character.name.clone(),
            role_type: character.role_type,
            win_probability,
            team: character.alignment,
            drunk: overlay.drunk.contains(&i),
        });
    }

    if let Some(anchor) = &overlay.seating {
        rows = seating::reseat(rows, anchor, rng)?;
    }

    let balance = balance_report(&solved, &characters, &scores, config, slack);
    Ok(Proposal {
        assignments: rows,
        log,
        base: input.base,
        adjusted: quotas.resolved(&input.base, &solved),
        balance,
    })
}

/// Neighbours of the anchoring seat turn into Evil Minions, so the protected
/// rows may not sit beside whoever holds `column`
fn keep_off_flanks(program: &mut Program, column: usize, protected: &BTreeSet<usize>) {
    let n = program.num_players();
    for &i in protected {
        for seat in [(i + n - 1) % n, (i + 1) % n] {
            let var = program.var(program.assign(seat, column));
            program.require_eq(var, Expression::from(0.0));
        }
    }
}

/// Role-count equalities, with the Outsider count switched to the override value
/// while its character is in play
fn enforce_role_counts(
    program: &mut Program,
    roles: &[RoleType],
    base: &RoleCounts,
    quotas: &Quotas,
    num_players: usize,
) {
    for role in [RoleType::Minion, RoleType::Demon] {
        let count = program.count_where(of_role(roles, role));
        let required = quotas.required(role, base, program);
        program.require_eq(count, required);
    }

    let required_townsfolk = quotas.required(RoleType::Townsfolk, base, program);
    let required_outsider = quotas.required(RoleType::Outsider, base, program);

    match quotas.quota_override {
        None => {
            let count = program.count_where(of_role(roles, RoleType::Townsfolk));
            program.require_eq(count, required_townsfolk);
            let count = program.count_where(of_role(roles, RoleType::Outsider));
            program.require_eq(count, required_outsider);
        }
        Some(quota) => {
            // Good slots are fixed either way; only the split moves
            let good = program.count_where(|j| matches!(roles[j], RoleType::Townsfolk | RoleType::Outsider));
            program.require_eq(good, required_townsfolk + required_outsider.clone());

            let big_m = num_players as f64;
            let active = program.var(quota.in_play);
            let outsiders = program.count_where(of_role(roles, RoleType::Outsider));
            program.require_leq(outsiders.clone() - required_outsider.clone(), active.clone() * big_m);
            program.require_leq(required_outsider - outsiders.clone(), active.clone() * big_m);

            let inactive = Expression::from(big_m) - active * big_m;
            let target = quota.outsiders as f64;
            program.require_leq(outsiders.clone() - target, inactive.clone());
            program.require_leq(Expression::from(target) - outsiders, inactive);
        }
    }
}

fn of_role(roles: &[RoleType], role: RoleType) -> impl Fn(usize) -> bool + '_ {
    move |j| roles[j] == role
}

/// In-play indicators that move slots between the teams, and every Good team
/// size they can produce
fn team_sizes(base: &RoleCounts, quotas: &Quotas) -> (Vec<(VarId, i64)>, BTreeSet<i64>) {
    let mut moves: BTreeMap<VarId, i64> = BTreeMap::new();
    for shift in &quotas.shifts {
        if matches!(shift.role, RoleType::Townsfolk | RoleType::Outsider) {
            *moves.entry(shift.in_play).or_default() += shift.amount as i64;
        }
    }
    moves.retain(|_, amount| *amount != 0);
    let moves: Vec<(VarId, i64)> = moves.into_iter().collect();

    let mut sizes = BTreeSet::new();
    for mask in 0..(1usize << moves.len()) {
        let moved: i64 = moves
            .iter()
            .enumerate()
            .filter(|(k, _)| mask & (1 << k) != 0)
            .map(|(_, (_, amount))| amount)
            .sum();
        sizes.insert(base.good_slots() as i64 + moved);
    }
    (moves, sizes)
}

/// |good average - evil average| ≤ tolerance + slack; returns the slack variable.
///
/// Averages divide by the team sizes the quotas actually enforce. When rules
/// can move slots between teams, one binary selects the size in force and the
/// constraints for the other sizes are relaxed by a big-M term.
fn enforce_balance(
    program: &mut Program,
    characters: &[Character],
    base: &RoleCounts,
    quotas: &Quotas,
    scores: &ScoreMatrices,
    config: &EngineConfig,
) -> VarId {
    let total = base.total() as i64;
    let good_sum = program.weighted_sum(&scores.win, |j| characters[j].alignment.is_good());
    let evil_sum = program.weighted_sum(&scores.win, |j| !characters[j].alignment.is_good());
    let slack = program.add_non_negative();

    let (moves, sizes) = team_sizes(base, quotas);
    let big_m = total.max(1) as f64;
    let mut selectors = Vec::new();
    for &good in &sizes {
        let evil = total - good;
        let relax = if sizes.len() == 1 {
            Expression::from(0.0)
        } else {
            let selector = program.add_binary();
            selectors.push((good, selector));
            (Expression::from(1.0) - program.var(selector)) * big_m
        };
        let good_average = good_sum.clone() * (1.0 / good.max(1) as f64);
        let evil_average = evil_sum.clone() * (1.0 / evil.max(1) as f64);
        let allowance = program.var(slack) + config.balance_tolerance + relax;
        program.require_leq(good_average.clone() - evil_average.clone(), allowance.clone());
        program.require_leq(evil_average - good_average, allowance);
    }

    if !selectors.is_empty() {
        let mut chosen = Expression::from(0.0);
        let mut size = Expression::from(0.0);
        for (good, selector) in &selectors {
            chosen += program.var(*selector);
            size += program.var(*selector) * (*good as f64);
        }
        let mut enforced = Expression::from(base.good_slots() as f64);
        for (in_play, amount) in &moves {
            enforced += program.var(*in_play) * (*amount as f64);
        }
        program.require_eq(chosen, Expression::from(1.0));
        program.require_eq(size, enforced);
    }
    slack
}

/// True per-team averages over the characters actually assigned
fn balance_report(
    solved: &Solved,
    characters: &[Character],
    scores: &ScoreMatrices,
    config: &EngineConfig,
    slack: VarId,
) -> Balance {
    let (mut good, mut evil) = (0.0, 0.0);
    let (mut good_count, mut evil_count) = (0usize, 0usize);
    for (i, j) in solved.assignment().into_iter().enumerate() {
        let Some(j) = j else { continue };
        if characters[j].alignment.is_good() {
            good += scores.win[i][j];
            good_count += 1;
        } else {
            evil += scores.win[i][j];
            evil_count += 1;
        }
    }
    Balance {
        good_average: good / good_count.max(1) as f64,
        evil_average: evil / evil_count.max(1) as f64,
        tolerance: config.balance_tolerance,
        slack: solved.value(slack).max(0.0),
    }
}
