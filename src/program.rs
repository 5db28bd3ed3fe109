//! Binary integer program over the player × character assignment matrix.
//!
//! Variables are addressed by `VarId`, a plain index, so rule descriptors and
//! hooks can refer to them without holding solver handles.

use crate::error::{EngineError, Result};
use good_lp::constraint::{eq, geq, leq};
use good_lp::{microlp, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

pub struct Program {
    problem: ProblemVariables,
    variables: Vec<Variable>,
    /// Decision matrix, [player][character]
    assign: Vec<Vec<VarId>>,
    in_play: BTreeMap<usize, VarId>,
    constraints: Vec<Constraint>,
    objective: Expression,
}

impl Program {
    pub fn new(num_players: usize, num_characters: usize) -> Self {
        let mut program = Self {
            problem: ProblemVariables::new(),
            variables: Vec::new(),
            assign: Vec::with_capacity(num_players),
            in_play: BTreeMap::new(),
            constraints: Vec::new(),
            objective: Expression::from(0.0),
        };
        for _ in 0..num_players {
            let row = (0..num_characters).map(|_| program.add_binary()).collect();
            program.assign.push(row);
        }
        program
    }

    pub fn add_binary(&mut self) -> VarId {
        let var = self.problem.add(variable().binary());
        self.track(var)
    }

    pub fn add_non_negative(&mut self) -> VarId {
        let var = self.problem.add(variable().min(0.0));
        self.track(var)
    }

    fn track(&mut self, var: Variable) -> VarId {
        self.variables.push(var);
        VarId(self.variables.len() - 1)
    }

    pub fn num_players(&self) -> usize {
        self.assign.len()
    }

    pub fn assign(&self, player: usize, character: usize) -> VarId {
        self.assign[player][character]
    }

    pub fn var(&self, id: VarId) -> Expression {
        Expression::from(self.variables[id.0])
    }

    /// Number of players holding `character` (0 or 1 once the at-most-one row is in)
    pub fn column_sum(&self, character: usize) -> Expression {
        let mut sum = Expression::from(0.0);
        for row in &self.assign {
            sum += self.variables[row[character].0];
        }
        sum
    }

    pub fn row_sum(&self, player: usize) -> Expression {
        let mut sum = Expression::from(0.0);
        for id in &self.assign[player] {
            sum += self.variables[id.0];
        }
        sum
    }

    /// Sum of the columns of one row that pass `filter`
    pub fn row_sum_where(&self, player: usize, filter: impl Fn(usize) -> bool) -> Expression {
        let mut sum = Expression::from(0.0);
        for (j, id) in self.assign[player].iter().enumerate() {
            if filter(j) {
                sum += self.variables[id.0];
            }
        }
        sum
    }

    /// Number of assigned characters whose column passes `filter`
    pub fn count_where(&self, filter: impl Fn(usize) -> bool) -> Expression {
        let mut sum = Expression::from(0.0);
        for row in &self.assign {
            for (j, id) in row.iter().enumerate() {
                if filter(j) {
                    sum += self.variables[id.0];
                }
            }
        }
        sum
    }

    /// Weighted sum of every x[i][j] whose column passes `filter`
    pub fn weighted_sum(&self, weights: &[Vec<f64>], filter: impl Fn(usize) -> bool) -> Expression {
        let mut sum = Expression::from(0.0);
        for (i, row) in self.assign.iter().enumerate() {
            for (j, id) in row.iter().enumerate() {
                if filter(j) {
                    sum += weights[i][j] * self.variables[id.0];
                }
            }
        }
        sum
    }

    /// Binary indicator equal to the column sum of `character`, created once per column
    pub fn in_play(&mut self, character: usize) -> VarId {
        if let Some(id) = self.in_play.get(&character) {
            return *id;
        }
        let id = self.add_binary();
        let column = self.column_sum(character);
        let indicator = self.var(id);
        self.require_eq(column, indicator);
        self.in_play.insert(character, id);
        id
    }

    pub fn require_eq(&mut self, lhs: Expression, rhs: Expression) {
        self.constraints.push(eq(lhs, rhs));
    }

    pub fn require_leq(&mut self, lhs: Expression, rhs: Expression) {
        self.constraints.push(leq(lhs, rhs));
    }

    pub fn require_geq(&mut self, lhs: Expression, rhs: Expression) {
        self.constraints.push(geq(lhs, rhs));
    }

    pub fn minimise(&mut self, term: Expression) {
        self.objective += term;
    }

    pub fn solve(self) -> Result<Solved> {
        log::debug!(
            "solving program: {} variables, {} constraints",
            self.variables.len(),
            self.constraints.len()
        );
        let mut model = self.problem.minimise(self.objective).using(microlp);
        for constraint in self.constraints {
            model.add_constraint(constraint);
        }

        match model.solve() {
            Ok(solution) => {
                let values = self.variables.iter().map(|v| solution.value(*v)).collect();
                Ok(Solved {
                    values,
                    assign: self.assign,
                })
            }
            Err(ResolutionError::Infeasible) => Err(EngineError::InfeasibleProgram(
                "role quotas, overrides and rule constraints cannot all hold".to_string(),
            )),
            Err(e) => Err(EngineError::Solver(e.to_string())),
        }
    }
}

/// Variable values of a solved program
#[derive(Clone, Debug)]
pub struct Solved {
    values: Vec<f64>,
    assign: Vec<Vec<VarId>>,
}

impl Solved {
    pub fn value(&self, id: VarId) -> f64 {
        self.values[id.0]
    }

    pub fn is_set(&self, id: VarId) -> bool {
        self.value(id) > 0.5
    }

    /// Character column held by each player
    pub fn assignment(&self) -> Vec<Option<usize>> {
        self.assign
            .iter()
            .map(|row| row.iter().position(|id| self.is_set(*id)))
            .collect()
    }

    /// Player row holding `character`, if any
    pub fn holder(&self, character: usize) -> Option<usize> {
        self.assign.iter().position(|row| self.is_set(row[character]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_assignment_is_a_permutation() {
        let mut program = Program::new(3, 3);
        for i in 0..3 {
            let row = program.row_sum(i);
            program.require_eq(row, Expression::from(1.0));
        }
        for j in 0..3 {
            let column = program.column_sum(j);
            program.require_leq(column, Expression::from(1.0));
        }
        // Cheapest on the anti-diagonal
        let costs: Vec<Vec<f64>> = (0..3)
            .map(|i| (0..3).map(|j| if i + j == 2 { 0.0 } else { 1.0 }).collect())
            .collect();
        let objective = program.weighted_sum(&costs, |_| true);
        program.minimise(objective);

        let solved = program.solve().unwrap();
        assert_eq!(solved.assignment(), vec![Some(2), Some(1), Some(0)]);
        assert_eq!(solved.holder(0), Some(2));
    }

    #[test]
    fn test_in_play_tracks_column() {
        let mut program = Program::new(2, 3);
        for i in 0..2 {
            let row = program.row_sum(i);
            program.require_eq(row, Expression::from(1.0));
        }
        for j in 0..3 {
            let column = program.column_sum(j);
            program.require_leq(column, Expression::from(1.0));
        }
        let first = program.in_play(1);
        let again = program.in_play(1);
        assert_eq!(first, again);
        let indicator = program.var(first);
        program.require_eq(indicator, Expression::from(0.0));

        let solved = program.solve().unwrap();
        assert_eq!(solved.holder(1), None);
        assert!(!solved.is_set(first));
    }

    #[test]
    fn test_infeasible_is_reported() {
        let mut program = Program::new(2, 1);
        for i in 0..2 {
            let row = program.row_sum(i);
            program.require_eq(row, Expression::from(1.0));
        }
        let column = program.column_sum(0);
        program.require_leq(column, Expression::from(1.0));

        assert!(matches!(program.solve(), Err(EngineError::InfeasibleProgram(_))));
    }
}
