// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Rule engine - two relational clauses over class counts joined by a combinator
//!
//! Relation and combinator codes come from persisted config as integers. Codes
//! outside the known tables decode to `None`, and a clause or rule holding
//! `None` evaluates to `false`. That is a safety default: an unreadable rule
//! never fires a command. [`RuleSpec::warnings`] reports such codes so the
//! corruption is visible.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{field, ConfigRecord};

/// Relational operator, persisted as codes 0-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
}

impl Relation {
    /// Every relation, indexed by code
    pub const ALL: [Relation; 6] = [
        Relation::Greater,
        Relation::GreaterOrEqual,
        Relation::Equal,
        Relation::NotEqual,
        Relation::Less,
        Relation::LessOrEqual,
    ];

    /// Relation for a persisted code, `None` when out of range
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Persisted code
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Whether `lhs <relation> rhs`
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Relation::Greater => lhs > rhs,
            Relation::GreaterOrEqual => lhs >= rhs,
            Relation::Equal => lhs == rhs,
            Relation::NotEqual => lhs != rhs,
            Relation::Less => lhs < rhs,
            Relation::LessOrEqual => lhs <= rhs,
        }
    }

    /// Operator text for display
    pub fn symbol(self) -> &'static str {
        match self {
            Relation::Greater => ">",
            Relation::GreaterOrEqual => ">=",
            Relation::Equal => "==",
            Relation::NotEqual => "!=",
            Relation::Less => "<",
            Relation::LessOrEqual => "<=",
        }
    }
}

/// How the two clauses combine, persisted as 0 (A only), 1 (OR), 2 (AND)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combinator {
    /// Clause A alone
    AOnly,
    /// Either clause
    AOrB,
    /// Both clauses
    AAndB,
}

impl Combinator {
    /// Combinator for a persisted code, `None` when out of range
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Combinator::AOnly),
            1 => Some(Combinator::AOrB),
            2 => Some(Combinator::AAndB),
            _ => None,
        }
    }

    /// Persisted code
    pub fn code(self) -> i64 {
        match self {
            Combinator::AOnly => 0,
            Combinator::AOrB => 1,
            Combinator::AAndB => 2,
        }
    }
}

/// `count(class) <relation> threshold`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Class whose count is compared
    pub class: String,
    /// `None` when the persisted code is unknown
    pub relation: Option<Relation>,
    /// Right-hand side of the comparison
    pub threshold: i64,
}

impl Clause {
    /// Clause with a known relation
    pub fn new(class: &str, relation: Relation, threshold: i64) -> Self {
        Self {
            class: class.to_string(),
            relation: Some(relation),
            threshold,
        }
    }

    /// Whether `count` satisfies the clause. Unknown relations never hold.
    pub fn holds(&self, count: u32) -> bool {
        self.relation
            .map(|r| r.holds(i64::from(count), self.threshold))
            .unwrap_or(false)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.relation.map(Relation::symbol).unwrap_or("?");
        write!(f, "count({}) {} {}", self.class, op, self.threshold)
    }
}

/// A code in persisted config that does not name a known operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleWarning {
    /// A clause carries a relation code outside 0-5
    UnknownRelation { field: &'static str, code: i64 },
    /// `logic` is outside 0-2
    UnknownCombinator { code: i64 },
}

impl fmt::Display for RuleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleWarning::UnknownRelation { field, code } => {
                write!(f, "`{}` has unknown relation code {}; clause evaluates to false", field, code)
            }
            RuleWarning::UnknownCombinator { code } => {
                write!(f, "`logic` has unknown combinator code {}; rule evaluates to false", code)
            }
        }
    }
}

/// Full rule plus the commands it triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// First clause
    pub clause_a: Clause,
    /// Second clause
    pub clause_b: Clause,
    /// `None` when the persisted code is unknown
    pub combinator: Option<Combinator>,
    /// Sent when the rule holds; `%1`/`%2` expand to the counts
    pub command: String,
    /// Sent when it does not, if enabled
    pub negated_command: String,
    /// Whether the negated command is sent
    pub negation_enabled: bool,
    #[serde(skip)]
    raw_codes: RawCodes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RawCodes {
    relation_a: i64,
    relation_b: i64,
    combinator: i64,
}

impl RuleSpec {
    /// Rule with empty commands
    pub fn new(clause_a: Clause, clause_b: Clause, combinator: Combinator) -> Self {
        let raw_codes = RawCodes {
            relation_a: clause_a.relation.map(Relation::code).unwrap_or(-1),
            relation_b: clause_b.relation.map(Relation::code).unwrap_or(-1),
            combinator: combinator.code(),
        };
        Self {
            clause_a,
            clause_b,
            combinator: Some(combinator),
            command: String::new(),
            negated_command: String::new(),
            negation_enabled: false,
            raw_codes,
        }
    }

    /// Set the primary command
    pub fn with_command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    /// Set the negated command and enable it
    pub fn with_negated_command(mut self, command: &str) -> Self {
        self.negated_command = command.to_string();
        self.negation_enabled = true;
        self
    }

    /// Build the rule from a config snapshot
    pub fn from_record(record: &ConfigRecord) -> Self {
        let raw_codes = RawCodes {
            relation_a: record.get_int(field::RELATION_1),
            relation_b: record.get_int(field::RELATION_2),
            combinator: record.get_int(field::LOGIC),
        };
        Self {
            clause_a: Clause {
                class: record.get_str(field::TYPE_1).to_string(),
                relation: Relation::from_code(raw_codes.relation_a),
                threshold: record.get_int(field::NUMBER_1),
            },
            clause_b: Clause {
                class: record.get_str(field::TYPE_2).to_string(),
                relation: Relation::from_code(raw_codes.relation_b),
                threshold: record.get_int(field::NUMBER_2),
            },
            combinator: Combinator::from_code(raw_codes.combinator),
            command: record.get_str(field::COMMAND).to_string(),
            negated_command: record.get_str(field::NEGATE_COMMAND).to_string(),
            negation_enabled: record.get_bool(field::HAS_NEGATE),
            raw_codes,
        }
    }

    /// Unknown codes that will make this rule evaluate to false
    pub fn warnings(&self) -> Vec<RuleWarning> {
        let mut warnings = Vec::new();
        if self.clause_a.relation.is_none() {
            warnings.push(RuleWarning::UnknownRelation {
                field: field::RELATION_1,
                code: self.raw_codes.relation_a,
            });
        }
        // Clause B only matters when a combinator uses it
        if self.clause_b.relation.is_none() && self.combinator != Some(Combinator::AOnly) {
            warnings.push(RuleWarning::UnknownRelation {
                field: field::RELATION_2,
                code: self.raw_codes.relation_b,
            });
        }
        if self.combinator.is_none() {
            warnings.push(RuleWarning::UnknownCombinator {
                code: self.raw_codes.combinator,
            });
        }
        warnings
    }

    /// Evaluate against the two counts
    pub fn evaluate(&self, count_a: u32, count_b: u32) -> bool {
        evaluate(count_a, count_b, self)
    }
}

/// Evaluate the rule against the two counts. Pure.
pub fn evaluate(count_a: u32, count_b: u32, spec: &RuleSpec) -> bool {
    let result_a = spec.clause_a.holds(count_a);
    match spec.combinator {
        Some(Combinator::AOnly) => result_a,
        Some(Combinator::AOrB) => result_a || spec.clause_b.holds(count_b),
        Some(Combinator::AAndB) => result_a && spec.clause_b.holds(count_b),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValue;

    fn rule(ra: Relation, ta: i64, rb: Relation, tb: i64, comb: Combinator) -> RuleSpec {
        RuleSpec::new(Clause::new("person", ra, ta), Clause::new("dog", rb, tb), comb)
    }

    #[test]
    fn test_relations_match_math() {
        let pairs = [(0, 0), (1, 2), (2, 1), (5, 5), (0, 3), (7, -1)];
        for (count, threshold) in pairs {
            let c = i64::from(count as u32);
            let expected = [
                c > threshold,
                c >= threshold,
                c == threshold,
                c != threshold,
                c < threshold,
                c <= threshold,
            ];
            for (relation, want) in Relation::ALL.iter().zip(expected) {
                let spec = rule(*relation, threshold, Relation::Equal, 0, Combinator::AOnly);
                assert_eq!(
                    spec.evaluate(count as u32, 0),
                    want,
                    "{} {} {}",
                    count,
                    relation.symbol(),
                    threshold
                );
            }
        }
    }

    #[test]
    fn test_relation_codes() {
        for (idx, relation) in Relation::ALL.iter().enumerate() {
            assert_eq!(Relation::from_code(idx as i64), Some(*relation));
            assert_eq!(relation.code(), idx as i64);
        }
        assert_eq!(Relation::from_code(6), None);
        assert_eq!(Relation::from_code(-1), None);
        assert_eq!(Combinator::from_code(3), None);
    }

    #[test]
    fn test_combinator_truth_tables() {
        // clause A: count_a > 0, clause B: count_b > 0
        for (a, b) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let or = rule(Relation::Greater, 0, Relation::Greater, 0, Combinator::AOrB);
            let and = rule(Relation::Greater, 0, Relation::Greater, 0, Combinator::AAndB);
            assert_eq!(or.evaluate(a, b), a > 0 || b > 0);
            assert_eq!(and.evaluate(a, b), a > 0 && b > 0);
        }
    }

    #[test]
    fn test_a_only_ignores_clause_b() {
        for tb in [-5, 0, 3, 100] {
            for rb in Relation::ALL {
                let spec = rule(Relation::GreaterOrEqual, 2, rb, tb, Combinator::AOnly);
                assert!(spec.evaluate(2, 9));
                assert!(!spec.evaluate(1, 9));
            }
        }
    }

    #[test]
    fn test_unknown_codes_are_false_and_warned() {
        let mut record = ConfigRecord::default();
        record.set(field::RELATION_1, ConfigValue::Int(9)).unwrap();
        let spec = RuleSpec::from_record(&record);
        assert!(!spec.evaluate(0, 0));
        assert!(!spec.evaluate(100, 100));
        assert_eq!(
            spec.warnings(),
            vec![RuleWarning::UnknownRelation { field: field::RELATION_1, code: 9 }]
        );

        let mut record = ConfigRecord::default();
        record.set(field::LOGIC, ConfigValue::Int(7)).unwrap();
        let spec = RuleSpec::from_record(&record);
        assert!(!spec.evaluate(5, 5));
        assert_eq!(spec.warnings(), vec![RuleWarning::UnknownCombinator { code: 7 }]);
    }

    #[test]
    fn test_from_record() {
        let mut record = ConfigRecord::default();
        record.set_raw(field::TYPE_1, "person").unwrap();
        record.set_raw(field::TYPE_2, "dog").unwrap();
        record.set_raw(field::RELATION_1, "1").unwrap();
        record.set_raw(field::NUMBER_1, "2").unwrap();
        record.set_raw(field::RELATION_2, "4").unwrap();
        record.set_raw(field::NUMBER_2, "1").unwrap();
        record.set_raw(field::LOGIC, "2").unwrap();
        record.set_raw(field::COMMAND, "go %1").unwrap();
        record.set_raw(field::HAS_NEGATE, "True").unwrap();

        let spec = RuleSpec::from_record(&record);
        assert_eq!(spec.clause_a, Clause::new("person", Relation::GreaterOrEqual, 2));
        assert_eq!(spec.clause_b, Clause::new("dog", Relation::Less, 1));
        assert_eq!(spec.combinator, Some(Combinator::AAndB));
        assert_eq!(spec.command, "go %1");
        assert!(spec.negation_enabled);
        assert!(spec.warnings().is_empty());
        assert!(spec.evaluate(2, 0));
        assert!(!spec.evaluate(2, 1));
    }
}
