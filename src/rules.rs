//! Character-specific setup rules.
//!
//! Each registered character maps to a `Rule`. When that character is on the
//! loaded script, its rule adds quota shifts scaled by the character's in-play
//! indicator, optional extra constraints, and optionally a post-solve hook.

use crate::hooks::Hook;
use crate::program::{Program, VarId};
use crate::types::*;
use good_lp::Expression;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

pub const VILLAGE_IDIOT: &str = "Village Idiot";

/// Registered characters, in the order their rules are applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rule {
    Balloonist,
    BountyHunter,
    Choirboy,
    Huntsman,
    VillageIdiot,
    Hermit,
    Baron,
    Godfather,
    Summoner,
    Xaan,
    FangGu,
    Kazali,
    LilMonsta,
    LordOfTyphon,
    Vigormortis,
}

/// Shape of what a rule contributes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    /// Quota shifts only
    Delta,
    /// Quota shifts plus a post-solve hook
    DeltaWithHook,
    /// A companion character must also be in play
    Dependency,
    /// Several copies allowed, with a post-solve side effect
    Cardinality,
    /// A hidden target is chosen inside the program and resolved afterwards
    HiddenTarget,
    /// Replaces the general equality for one role type
    QuotaOverride,
    /// Post-solve effect that depends on seat positions
    SeatingEffect,
}

impl Rule {
    pub const ALL: [Rule; 15] = [
        Rule::Balloonist,
        Rule::BountyHunter,
        Rule::Choirboy,
        Rule::Huntsman,
        Rule::VillageIdiot,
        Rule::Hermit,
        Rule::Baron,
        Rule::Godfather,
        Rule::Summoner,
        Rule::Xaan,
        Rule::FangGu,
        Rule::Kazali,
        Rule::LilMonsta,
        Rule::LordOfTyphon,
        Rule::Vigormortis,
    ];

    pub fn character_name(&self) -> &'static str {
        match self {
            Rule::Balloonist => "Balloonist",
            Rule::BountyHunter => "Bounty Hunter",
            Rule::Choirboy => "Choirboy",
            Rule::Huntsman => "Huntsman",
            Rule::VillageIdiot => VILLAGE_IDIOT,
            Rule::Hermit => "Hermit",
            Rule::Baron => "Baron",
            Rule::Godfather => "Godfather",
            Rule::Summoner => "Summoner",
            Rule::Xaan => "Xaan",
            Rule::FangGu => "Fang Gu",
            Rule::Kazali => "Kazali",
            Rule::LilMonsta => "Lil' Monsta",
            Rule::LordOfTyphon => "Lord of Typhon",
            Rule::Vigormortis => "Vigormortis",
        }
    }

    pub fn from_name(name: &str) -> Option<Rule> {
        Rule::ALL.into_iter().find(|rule| rule.character_name() == name)
    }

    /// Quota a character's column counts toward when it differs from its role type.
    /// Lil' Monsta is held by a Minion, so it fills a Minion slot.
    pub fn quota_role(&self) -> Option<RoleType> {
        match self {
            Rule::LilMonsta => Some(RoleType::Minion),
            _ => None,
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Balloonist
            | Rule::Hermit
            | Rule::Baron
            | Rule::Godfather
            | Rule::Summoner
            | Rule::FangGu
            | Rule::Kazali
            | Rule::Vigormortis => RuleKind::Delta,
            Rule::LilMonsta => RuleKind::DeltaWithHook,
            Rule::Choirboy | Rule::Huntsman => RuleKind::Dependency,
            Rule::VillageIdiot => RuleKind::Cardinality,
            Rule::BountyHunter => RuleKind::HiddenTarget,
            Rule::Xaan => RuleKind::QuotaOverride,
            Rule::LordOfTyphon => RuleKind::SeatingEffect,
        }
    }

    /// Register this rule's constraints for the character in `column`
    pub fn apply(&self, column: usize, ctx: &mut RuleContext<'_>, rng: &mut impl Rng) -> RuleEffect {
        log::debug!("applying {:?} rule for {}", self.kind(), self.character_name());
        let mut effect = RuleEffect::default();

        match self {
            Rule::Balloonist => {
                let shift = rng.gen_range(0..=1);
                effect.shift_good_slots(ctx.program.in_play(column), shift);
                effect.note(format!("Balloonist → Outsiders +{}, Townsfolk -{}", shift, shift));
            }
            Rule::Hermit => {
                let shift = rng.gen_range(0..=1);
                effect.shift_good_slots(ctx.program.in_play(column), -shift);
                effect.note(format!("Hermit → Outsiders -{}, Townsfolk +{}", shift, shift));
            }
            Rule::Baron => {
                effect.shift_good_slots(ctx.program.in_play(column), 2);
                effect.note("Baron → Outsiders +2, Townsfolk -2");
            }
            Rule::Godfather => {
                let shift = *[-1, 1].choose(rng).unwrap_or(&1);
                effect.shift_good_slots(ctx.program.in_play(column), shift);
                effect.note(format!("Godfather → Outsiders {:+}, Townsfolk {:+}", shift, -shift));
            }
            Rule::FangGu => {
                effect.shift_good_slots(ctx.program.in_play(column), 1);
                effect.note("Fang Gu → Outsiders +1, Townsfolk -1");
            }
            Rule::Vigormortis => {
                effect.shift_good_slots(ctx.program.in_play(column), -1);
                effect.note("Vigormortis → Outsiders -1, Townsfolk +1");
            }
            Rule::Summoner => self.summoner(column, ctx, rng, &mut effect),
            Rule::Kazali => {
                let (townsfolk, outsiders) = replace_minions(column, ctx, rng, &mut effect);
                effect.note(format!(
                    "Kazali → Minions replaced with {} Townsfolk + {} Outsiders",
                    townsfolk, outsiders
                ));
            }
            Rule::LordOfTyphon => {
                let (townsfolk, outsiders) = replace_minions(column, ctx, rng, &mut effect);
                effect.hook = Some(Hook::TyphonNeighbours { column });
                effect.note(format!(
                    "Lord of Typhon → Minions replaced with {} Townsfolk + {} Outsiders, neighbours become Minions",
                    townsfolk, outsiders
                ));
            }
            Rule::LilMonsta => {
                let in_play = ctx.program.in_play(column);
                effect.shift(RoleType::Demon, -1, in_play);
                effect.shift(RoleType::Minion, 1, in_play);
                effect.hook = Some(Hook::Babysitter { in_play });
                effect.note("Lil' Monsta → Demons -1, Minions +1");
            }
            Rule::Choirboy => self.require_companion(column, "King", ctx, &mut effect),
            Rule::Huntsman => self.require_companion(column, "Damsel", ctx, &mut effect),
            Rule::VillageIdiot => {
                let columns: Vec<usize> = ctx
                    .characters
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.name.starts_with(VILLAGE_IDIOT))
                    .map(|(j, _)| j)
                    .collect();
                let mut count = Expression::from(0.0);
                for &j in &columns {
                    count += ctx.program.column_sum(j);
                }
                let cap = ctx.config.village_idiot_copies as f64;
                ctx.program.require_leq(count, Expression::from(cap));
                effect.hook = Some(Hook::VillageIdiotDrunk { columns });
                effect.note(format!(
                    "Village Idiot → 0–{} allowed, if ≥2 then one player is drunk",
                    ctx.config.village_idiot_copies
                ));
            }
            Rule::BountyHunter => self.bounty_hunter(column, ctx, &mut effect),
            Rule::Xaan => {
                let in_play = ctx.program.in_play(column);
                let outsiders = rng.gen_range(ctx.config.xaan_outsiders_min..=ctx.config.xaan_outsiders_max);
                effect.quota_override = Some(QuotaOverride { outsiders, in_play });
                effect.note(format!("Xaan → Outsiders set to {}", outsiders));
            }
        }

        effect
    }

    fn summoner(&self, column: usize, ctx: &mut RuleContext<'_>, rng: &mut impl Rng, effect: &mut RuleEffect) {
        let in_play = ctx.program.in_play(column);
        effect.shift(RoleType::Demon, -1, in_play);
        effect.shift(RoleType::Townsfolk, 1, in_play);
        effect.note("Summoner → Demons -1, Townsfolk +1");

        let num_demons = ctx
            .characters
            .iter()
            .filter(|c| c.role_type == RoleType::Demon)
            .count()
            .max(1);

        // Picked as often as a single Demon option would be; otherwise discouraged
        let hard_include = !ctx.pinned_roles.contains(&RoleType::Demon)
            && rng.gen_bool(1.0 / num_demons as f64);
        if hard_include {
            let indicator = ctx.program.var(in_play);
            ctx.program.require_eq(indicator, Expression::from(1.0));
            effect.note("Summoner → forced into play this attempt");
        } else {
            let buffer = (num_demons as f64 + 1.0) / (num_demons as f64 * 2.0);
            let weighted = ctx.program.var(in_play) * buffer;
            ctx.program.minimise(weighted);
            effect.note(format!("Summoner → in-play weight {:.3}", buffer));
        }
    }

    fn require_companion(&self, column: usize, companion: &str, ctx: &mut RuleContext<'_>, effect: &mut RuleEffect) {
        let in_play = ctx.program.in_play(column);
        match ctx.column_named(companion) {
            Some(companion_column) => {
                let companion_sum = ctx.program.column_sum(companion_column);
                let indicator = ctx.program.var(in_play);
                ctx.program.require_geq(companion_sum, indicator);
                effect.note(format!(
                    "{} → {} must also be in play",
                    self.character_name(),
                    companion
                ));
            }
            None => {
                let indicator = ctx.program.var(in_play);
                ctx.program.require_eq(indicator, Expression::from(0.0));
                effect.warnings.push(format!(
                    "{} needs {} but the script has no {}; {} kept out of play",
                    self.character_name(),
                    companion,
                    companion,
                    self.character_name()
                ));
            }
        }
    }

    fn bounty_hunter(&self, column: usize, ctx: &mut RuleContext<'_>, effect: &mut RuleEffect) {
        let candidates: Vec<usize> = ctx
            .characters
            .iter()
            .enumerate()
            .filter(|(j, c)| {
                *j != column && c.alignment == Alignment::Good && c.role_type == RoleType::Townsfolk
            })
            .map(|(j, _)| j)
            .collect();

        if candidates.is_empty() {
            effect.note("Bounty Hunter present but no valid targets in script");
            return;
        }

        let trigger = ctx.program.in_play(column);
        let mut chosen = Expression::from(0.0);
        let mut targets = Vec::with_capacity(candidates.len());
        for j in candidates {
            let target = ctx.program.add_binary();
            let indicator = ctx.program.var(target);
            chosen += indicator.clone();
            let assigned = ctx.program.column_sum(j);
            ctx.program.require_geq(assigned, indicator.clone());
            // The target turns Evil, so nobody fixed to Good may hold it
            for &i in ctx.fixed_good {
                let held = ctx.program.var(ctx.program.assign(i, j));
                ctx.program.require_leq(indicator.clone() + held, Expression::from(1.0));
            }
            targets.push((j, target));
        }
        let trigger_indicator = ctx.program.var(trigger);
        ctx.program.require_eq(chosen, trigger_indicator);

        effect.hook = Some(Hook::BountyHunterTarget { trigger, targets });
        effect.note("Bounty Hunter → target chosen iff Bounty Hunter in play; target must be assigned");
    }
}

/// Move the whole Minion quota into Townsfolk and Outsiders at random
fn replace_minions(column: usize, ctx: &mut RuleContext<'_>, rng: &mut impl Rng, effect: &mut RuleEffect) -> (u32, u32) {
    let in_play = ctx.program.in_play(column);
    let minions = ctx.base.minion;
    let townsfolk = rng.gen_range(0..=minions);
    let outsiders = minions - townsfolk;
    effect.shift(RoleType::Minion, -(minions as i32), in_play);
    effect.shift(RoleType::Townsfolk, townsfolk as i32, in_play);
    effect.shift(RoleType::Outsider, outsiders as i32, in_play);
    (townsfolk, outsiders)
}

/// What a rule needs while building the program
pub struct RuleContext<'a> {
    pub program: &'a mut Program,
    pub characters: &'a [Character],
    pub base: RoleCounts,
    pub config: &'a EngineConfig,
    /// Role types the caller pinned through fixed characters, fixed roles or includes
    pub pinned_roles: &'a BTreeSet<RoleType>,
    /// Player rows the caller fixed to the Good team
    pub fixed_good: &'a BTreeSet<usize>,
}

impl RuleContext<'_> {
    pub fn column_named(&self, name: &str) -> Option<usize> {
        self.characters.iter().position(|c| c.name == name)
    }
}

/// `amount` units of `role`, counted only while `in_play` is 1
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuotaShift {
    pub role: RoleType,
    pub amount: i32,
    pub in_play: VarId,
}

/// Outsider count fixed to `outsiders` while `in_play` is 1; Townsfolk absorb the difference
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuotaOverride {
    pub outsiders: u32,
    pub in_play: VarId,
}

#[derive(Debug, Default)]
pub struct RuleEffect {
    pub shifts: Vec<QuotaShift>,
    pub quota_override: Option<QuotaOverride>,
    pub hook: Option<Hook>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

impl RuleEffect {
    fn shift(&mut self, role: RoleType, amount: i32, in_play: VarId) {
        if amount != 0 {
            self.shifts.push(QuotaShift { role, amount, in_play });
        }
    }

    /// Outsiders +amount, Townsfolk -amount
    fn shift_good_slots(&mut self, in_play: VarId, amount: i32) {
        self.shift(RoleType::Outsider, amount, in_play);
        self.shift(RoleType::Townsfolk, -amount, in_play);
    }

    fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn characters() -> Vec<Character> {
        vec![
            Character::new(1, "Baron", Alignment::Evil, RoleType::Minion, 50.0),
            Character::new(2, "Chef", Alignment::Good, RoleType::Townsfolk, 50.0),
            Character::new(3, "Bounty Hunter", Alignment::Good, RoleType::Townsfolk, 55.0),
            Character::new(4, "Choirboy", Alignment::Good, RoleType::Townsfolk, 40.0),
            Character::new(5, "Kazali", Alignment::Evil, RoleType::Demon, 60.0),
        ]
    }

    fn apply(rule: Rule, column: usize, characters: &[Character], base: RoleCounts) -> RuleEffect {
        let mut program = Program::new(4, characters.len());
        let config = EngineConfig::default();
        let pinned = BTreeSet::new();
        let fixed_good = BTreeSet::new();
        let mut ctx = RuleContext {
            program: &mut program,
            characters,
            base,
            config: &config,
            pinned_roles: &pinned,
            fixed_good: &fixed_good,
        };
        rule.apply(column, &mut ctx, &mut StdRng::seed_from_u64(5))
    }

    #[test]
    fn test_names_round_trip() {
        for rule in Rule::ALL {
            assert_eq!(Rule::from_name(rule.character_name()), Some(rule));
        }
        assert_eq!(Rule::from_name("Imp"), None);
    }

    #[test]
    fn test_baron_moves_two_townsfolk_to_outsiders() {
        let effect = apply(Rule::Baron, 0, &characters(), RoleCounts::new(5, 0, 1, 1));
        let total: i32 = effect.shifts.iter().map(|s| s.amount).sum();
        assert_eq!(total, 0);
        assert!(effect
            .shifts
            .iter()
            .any(|s| s.role == RoleType::Outsider && s.amount == 2));
        assert!(effect.hook.is_none());
    }

    #[test]
    fn test_kazali_redistributes_entire_minion_quota() {
        let effect = apply(Rule::Kazali, 4, &characters(), RoleCounts::new(7, 0, 2, 1));
        let minion: i32 = effect
            .shifts
            .iter()
            .filter(|s| s.role == RoleType::Minion)
            .map(|s| s.amount)
            .sum();
        let good: i32 = effect
            .shifts
            .iter()
            .filter(|s| matches!(s.role, RoleType::Townsfolk | RoleType::Outsider))
            .map(|s| s.amount)
            .sum();
        assert_eq!(minion, -2);
        assert_eq!(good, 2);
    }

    #[test]
    fn test_bounty_hunter_targets_exclude_itself() {
        let effect = apply(Rule::BountyHunter, 2, &characters(), RoleCounts::new(2, 0, 1, 1));
        match effect.hook {
            Some(Hook::BountyHunterTarget { targets, .. }) => {
                let columns: Vec<usize> = targets.iter().map(|(j, _)| *j).collect();
                assert_eq!(columns, vec![1, 3]);
            }
            other => panic!("unexpected hook {:?}", other),
        }
    }

    #[test]
    fn test_missing_companion_warns() {
        let effect = apply(Rule::Choirboy, 3, &characters(), RoleCounts::new(2, 0, 1, 1));
        assert_eq!(effect.warnings.len(), 1);
        assert!(effect.warnings[0].contains("King"));
    }

    #[test]
    fn test_xaan_override_within_range() {
        let chars = vec![Character::new(9, "Xaan", Alignment::Evil, RoleType::Minion, 50.0)];
        let effect = apply(Rule::Xaan, 0, &chars, RoleCounts::new(5, 2, 1, 1));
        let quota = effect.quota_override.unwrap();
        assert!((1..=4).contains(&quota.outsiders));
        assert!(effect.shifts.is_empty());
    }

    #[test]
    fn test_summoner_buffer_when_demon_pinned() {
        let chars = vec![
            Character::new(1, "Summoner", Alignment::Evil, RoleType::Minion, 50.0),
            Character::new(2, "Imp", Alignment::Evil, RoleType::Demon, 70.0),
        ];
        let mut program = Program::new(2, chars.len());
        let config = EngineConfig::default();
        let pinned: BTreeSet<RoleType> = [RoleType::Demon].into_iter().collect();
        let fixed_good = BTreeSet::new();
        let mut ctx = RuleContext {
            program: &mut program,
            characters: &chars,
            base: RoleCounts::new(0, 0, 1, 1),
            config: &config,
            pinned_roles: &pinned,
            fixed_good: &fixed_good,
        };
        // A single Demon option would otherwise always force the Summoner in
        let effect = Rule::Summoner.apply(0, &mut ctx, &mut StdRng::seed_from_u64(5));
        assert!(effect.notes.iter().any(|n| n.contains("in-play weight 1.000")));
        assert!(!effect.notes.iter().any(|n| n.contains("forced")));
    }

    #[test]
    fn test_lil_monsta_fills_a_minion_slot() {
        assert_eq!(Rule::LilMonsta.quota_role(), Some(RoleType::Minion));
        assert_eq!(Rule::Kazali.quota_role(), None);
    }

    #[test]
    fn test_every_rule_has_a_kind() {
        let seating: Vec<Rule> = Rule::ALL
            .into_iter()
            .filter(|r| r.kind() == RuleKind::SeatingEffect)
            .collect();
        assert_eq!(seating, vec![Rule::LordOfTyphon]);
    }
}
