//! Post-solve hooks and the per-attempt override overlay.
//!
//! Hooks read solved values and write only to the `Overlay`. Loaded player
//! and character rows are never mutated; overrides are merged in when the
//! final assignment list is built.

use crate::program::{Solved, VarId};
use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// A deferred post-solve action, registered by a rule
#[derive(Clone, Debug, PartialEq)]
pub enum Hook {
    /// Resolve which candidate the Bounty Hunter's hidden target variables picked
    BountyHunterTarget {
        trigger: VarId,
        targets: Vec<(usize, VarId)>,
    },
    /// Make one Village Idiot drunk when two or more are in play
    VillageIdiotDrunk { columns: Vec<usize> },
    /// Pick the Minion babysitting Lil' Monsta
    Babysitter { in_play: VarId },
    /// Turn the Lord of Typhon's seat neighbours into Minions
    TyphonNeighbours { column: usize },
}

/// Transient changes to one character row for this attempt
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CharacterOverride {
    pub alignment: Option<Alignment>,
    pub role_type: Option<RoleType>,
    pub strength: Option<f64>,
}

/// Character whose Evil block must be seated around it
#[derive(Clone, Debug, PartialEq)]
pub struct SeatingAnchor {
    /// Player row holding the anchoring character
    pub player: usize,
    /// Player rows that should sit directly beside it
    pub flanks: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct Overlay {
    pub characters: BTreeMap<usize, CharacterOverride>,
    /// Player rows marked drunk
    pub drunk: BTreeSet<usize>,
    pub seating: Option<SeatingAnchor>,
}

impl Overlay {
    fn entry(&mut self, column: usize) -> &mut CharacterOverride {
        self.characters.entry(column).or_default()
    }

    pub fn alignment(&self, column: usize, base: &Character) -> Alignment {
        self.characters
            .get(&column)
            .and_then(|o| o.alignment)
            .unwrap_or(base.alignment)
    }

    pub fn role_type(&self, column: usize, base: &Character) -> RoleType {
        self.characters
            .get(&column)
            .and_then(|o| o.role_type)
            .unwrap_or(base.role_type)
    }

    pub fn strength(&self, column: usize) -> Option<f64> {
        self.characters.get(&column).and_then(|o| o.strength)
    }

    /// Base row with every override applied
    pub fn effective(&self, column: usize, base: &Character) -> Character {
        let mut character = base.clone();
        character.alignment = self.alignment(column, base);
        character.role_type = self.role_type(column, base);
        if let Some(strength) = self.strength(column) {
            character.base_strength = strength;
        }
        character
    }
}

/// Read access to one solved attempt
pub struct SolvedView<'a> {
    pub solved: &'a Solved,
    pub players: &'a [Player],
    pub characters: &'a [Character],
    pub config: &'a EngineConfig,
}

impl Hook {
    /// Apply this hook and describe what it did
    pub fn run(&self, view: &SolvedView<'_>, overlay: &mut Overlay, rng: &mut impl Rng) -> String {
        match self {
            Hook::BountyHunterTarget { trigger, targets } => {
                let chosen = targets.iter().find(|(_, var)| view.solved.is_set(*var));
                match chosen {
                    Some((column, _)) => {
                        overlay.entry(*column).alignment = Some(Alignment::Evil);
                        format!(
                            "Bounty Hunter target: {} (forced Evil)",
                            view.characters[*column].name
                        )
                    }
                    None if !view.solved.is_set(*trigger) => "Bounty Hunter not in play (no target)".to_string(),
                    None => "Bounty Hunter target not resolved".to_string(),
                }
            }
            Hook::VillageIdiotDrunk { columns } => {
                let assigned: Vec<(usize, usize)> = columns
                    .iter()
                    .filter_map(|&j| view.solved.holder(j).map(|i| (i, j)))
                    .collect();
                match assigned.len() {
                    0 => "Village Idiot not in play".to_string(),
                    1 => "Village Idiot → in play (no drunk applied)".to_string(),
                    _ => {
                        let (player, column) = *assigned.choose(rng).unwrap_or(&assigned[0]);
                        overlay.drunk.insert(player);
                        overlay.entry(column).strength = Some(view.config.drunk_strength);
                        format!(
                            "Village Idiot → {} is drunk (strength reduced)",
                            view.players[player].name
                        )
                    }
                }
            }
            Hook::Babysitter { in_play } => {
                if !view.solved.is_set(*in_play) {
                    return "Lil' Monsta not in play".to_string();
                }
                let minions: Vec<usize> = view
                    .characters
                    .iter()
                    .enumerate()
                    .filter(|(j, c)| c.role_type == RoleType::Minion && view.solved.holder(*j).is_some())
                    .map(|(j, _)| j)
                    .collect();
                let Some(&babysitter) = minions.choose(rng) else {
                    return "Lil' Monsta in play but no Minion available".to_string();
                };
                for &j in &minions {
                    let boosted = view.characters[j].base_strength + view.config.babysitter_boost;
                    overlay.entry(j).strength = Some(boosted);
                }
                format!(
                    "Lil' Monsta → Minion '{}' babysits (Minion strength boosted)",
                    view.characters[babysitter].name
                )
            }
            Hook::TyphonNeighbours { column } => {
                let Some(seat) = view.solved.holder(*column) else {
                    return "Lord of Typhon not in play".to_string();
                };
                let n = view.players.len();
                let left = (seat + n - 1) % n;
                let right = (seat + 1) % n;

                let mut flanks = Vec::new();
                for neighbour in [left, right] {
                    if neighbour == seat || flanks.contains(&neighbour) {
                        continue;
                    }
                    if let Some(j) = view.solved.assignment()[neighbour] {
                        let entry = overlay.entry(j);
                        entry.role_type = Some(RoleType::Minion);
                        entry.alignment = Some(Alignment::Evil);
                    }
                    flanks.push(neighbour);
                }
                let names: Vec<&str> = flanks.iter().map(|&i| view.players[i].name.as_str()).collect();
                overlay.seating = Some(SeatingAnchor { player: seat, flanks });
                format!(
                    "Lord of Typhon → Neighbours '{}' set as Minions",
                    names.join("' and '")
                )
            }
        }
    }
}
