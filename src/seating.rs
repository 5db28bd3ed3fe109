//! Seat order for setups containing a seating-sensitive character.

use crate::error::{EngineError, Result};
use crate::hooks::SeatingAnchor;
use crate::types::Assignment;
use rand::Rng;

/// Smallest Evil block that has a middle seat with a neighbour on each side
pub const MIN_EVIL_BLOCK: usize = 3;

/// Reorder `rows` (indexed by player row) so the Evil block sits together
/// with the anchor in its middle and the flanking players directly beside it.
/// The block is then spliced into the Good rows at a random position.
pub fn reseat(rows: Vec<Assignment>, anchor: &SeatingAnchor, rng: &mut impl Rng) -> Result<Vec<Assignment>> {
    let mut good = Vec::new();
    let mut evil = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        if row.team.is_good() {
            good.push(row);
        } else {
            evil.push((i, row));
        }
    }

    let k = evil.len();
    if k < MIN_EVIL_BLOCK {
        return Err(EngineError::InvariantViolation(format!(
            "Evil block has {} members; at least {} are needed to seat the anchor in the middle",
            k, MIN_EVIL_BLOCK
        )));
    }

    let middle = if k % 2 == 1 {
        k / 2
    } else if rng.gen_bool(0.5) {
        k / 2 - 1
    } else {
        k / 2
    };

    let Some(anchor_pos) = evil.iter().position(|(i, _)| *i == anchor.player) else {
        return Err(EngineError::InvariantViolation(format!(
            "anchor player row {} is not on the Evil team",
            anchor.player
        )));
    };
    let anchor_row = evil.remove(anchor_pos);

    let mut flanks = Vec::new();
    for &player in &anchor.flanks {
        if let Some(pos) = evil.iter().position(|(i, _)| *i == player) {
            flanks.push(evil.remove(pos));
        }
    }

    let mut block: Vec<Option<Assignment>> = vec![None; k];
    block[middle] = Some(anchor_row.1);
    let mut beside = [middle.checked_sub(1), Some(middle + 1).filter(|&p| p < k)]
        .into_iter()
        .flatten();
    let mut spare = evil.into_iter().map(|(_, row)| row);
    for (_, row) in flanks {
        match beside.next() {
            Some(pos) => block[pos] = Some(row),
            None => return Err(EngineError::InvariantViolation("no free seat beside the anchor".to_string())),
        }
    }
    for slot in block.iter_mut().filter(|slot| slot.is_none()) {
        *slot = spare.next();
    }

    let block: Vec<Assignment> = block.into_iter().flatten().collect();
    let at = rng.gen_range(0..=good.len());
    let mut seated = good;
    seated.splice(at..at, block);
    Ok(seated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Alignment, RoleType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn row(name: &str, team: Alignment) -> Assignment {
        let role_type = if team.is_good() { RoleType::Townsfolk } else { RoleType::Minion };
        Assignment {
            player: name.to_string(),
            character: format!("{}'s character", name),
            role_type,
            win_probability: 0.5,
            team,
            drunk: false,
        }
    }

    fn table(teams: &[Alignment]) -> Vec<Assignment> {
        teams
            .iter()
            .enumerate()
            .map(|(i, &team)| row(&format!("P{}", i), team))
            .collect()
    }

    fn names(rows: &[Assignment]) -> Vec<&str> {
        rows.iter().map(|r| r.player.as_str()).collect()
    }

    #[test]
    fn test_anchor_sits_in_middle_of_odd_block() {
        use Alignment::*;
        let rows = table(&[Good, Evil, Good, Evil, Evil, Good]);
        let anchor = SeatingAnchor { player: 3, flanks: vec![1, 4] };

        for seed in 0..20 {
            let seated = reseat(rows.clone(), &anchor, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!(seated.len(), 6);
            let pos = seated.iter().position(|r| r.player == "P3").unwrap();
            assert_eq!(seated[pos - 1].player, "P1");
            assert_eq!(seated[pos + 1].player, "P4");
            // Good rows keep their relative order
            let good: Vec<&str> = seated.iter().filter(|r| r.team == Good).map(|r| r.player.as_str()).collect();
            assert_eq!(good, vec!["P0", "P2", "P5"]);
        }
    }

    #[test]
    fn test_even_block_uses_both_middle_seats() {
        use Alignment::*;
        let rows = table(&[Evil, Evil, Evil, Evil, Good]);
        let anchor = SeatingAnchor { player: 0, flanks: vec![] };

        let mut offsets = std::collections::BTreeSet::new();
        for seed in 0..50 {
            let seated = reseat(rows.clone(), &anchor, &mut StdRng::seed_from_u64(seed)).unwrap();
            let block_start = seated.iter().position(|r| r.team != Good).unwrap();
            let pos = seated.iter().position(|r| r.player == "P0").unwrap();
            offsets.insert(pos - block_start);
        }
        assert_eq!(offsets.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_block_of_two_is_rejected() {
        use Alignment::*;
        let rows = table(&[Good, Evil, Evil, Good, Good]);
        let anchor = SeatingAnchor { player: 1, flanks: vec![2] };
        let result = reseat(rows, &anchor, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
    }

    #[test]
    fn test_block_stays_contiguous() {
        use Alignment::*;
        let rows = table(&[Evil, Good, Good, Evil, Good, Evil, Good]);
        let anchor = SeatingAnchor { player: 5, flanks: vec![0, 3] };
        let seated = reseat(rows, &anchor, &mut StdRng::seed_from_u64(4)).unwrap();
        let evil: Vec<usize> = seated
            .iter()
            .enumerate()
            .filter(|(_, r)| r.team == Evil)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(evil[2] - evil[0], 2);
        assert_eq!(names(&seated[evil[1]..=evil[1]]), vec!["P5"]);
    }
}
