use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;
use serde_json::Value;

use crate::error::{ErrorKind, GenerationError, Result};

/// The six orderable comparison operators used in value co-constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    /// The operator constraining the other side of a co-constraint.  Eq and
    /// Ne are symmetric and reverse to themselves.
    pub fn reverse(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CmpOp {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(CmpOp::Eq),
            "!=" => Ok(CmpOp::Ne),
            ">" => Ok(CmpOp::Gt),
            ">=" => Ok(CmpOp::Ge),
            "<" => Ok(CmpOp::Lt),
            "<=" => Ok(CmpOp::Le),
            other => Err(GenerationError::invalid_spec(format!(
                "unrecognized comparison operator: {other}"
            ))),
        }
    }
}

/// A constraint on a single property: an operator and a value, derived from
/// a co-constraint once the other side's value is known.  Which property it
/// applies to is maintained by the caller.
#[derive(Debug, Clone)]
pub struct ValueConstraint {
    pub op: CmpOp,
    pub value: Value,
}

impl fmt::Display for ValueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.value)
    }
}

/// A co-constraint between two properties.  When the value of one becomes
/// known, a [`ValueConstraint`] can be derived for the other.
#[derive(Debug, Clone)]
pub struct ValueCoconstraint {
    pub left: String,
    pub op: CmpOp,
    pub right: String,
}

// Splits "<left> <op> <right>" without a real parser.  The operands are one
// or more non-operator characters so that "a!=b" can't be misread as
// "a!" = "b"; the alternation lists two-character operators first.
static COCONSTRAINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([^=!<>]+)(!=|>=|<=|=|>|<)([^=!<>]+)$").expect("co-constraint regex")
});

impl ValueCoconstraint {
    /// Parse a co-constraint expression such as `"a < b"`.
    pub fn parse(expr: &str) -> Result<Self> {
        let captures = COCONSTRAINT_RE.captures(expr).ok_or_else(|| {
            GenerationError::new(ErrorKind::ValueCoconstraint {
                expr: expr.to_string(),
                reason: "Invalid expression syntax".to_string(),
            })
        })?;

        let left = captures[1].trim().to_string();
        let op: CmpOp = captures[2].parse()?;
        let right = captures[3].trim().to_string();

        if left == right {
            return Err(ErrorKind::ValueCoconstraint {
                expr: expr.to_string(),
                reason: "Can't relate a property to itself".to_string(),
            }
            .into());
        }

        Ok(Self { left, op, right })
    }

    pub fn involves(&self, prop_name: &str) -> bool {
        prop_name == self.left || prop_name == self.right
    }

    pub fn other(&self, prop_name: &str) -> &str {
        if prop_name == self.right {
            &self.left
        } else {
            &self.right
        }
    }

    /// Given the known value of one side, derive the constraint on the other
    /// side.  The operator is reversed when the known side is the left
    /// operand.
    pub fn constraint_given(&self, prop_name: &str, prop_value: &Value) -> ValueConstraint {
        let op = if prop_name == self.left {
            self.op.reverse()
        } else {
            self.op
        };
        ValueConstraint {
            op,
            value: prop_value.clone(),
        }
    }
}

impl fmt::Display for ValueCoconstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

/// Determine whether a name names a reference property.
pub fn is_ref_prop(name: &str) -> bool {
    name.ends_with("_ref") || name.ends_with("_refs")
}

/// Satisfaction mode for a presence co-constraint property group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceMode {
    One,
    All,
    AtLeastOne,
}

impl PresenceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceMode::One => "one",
            PresenceMode::All => "all",
            PresenceMode::AtLeastOne => "at-least-one",
        }
    }
}

impl fmt::Display for PresenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named group of properties with a satisfaction mode, governing which
/// members appear together in a generated object.
#[derive(Debug, Clone)]
pub struct PresenceCoconstraint {
    pub property_names: BTreeSet<String>,
    pub mode: PresenceMode,
}

impl PresenceCoconstraint {
    pub fn new(property_names: impl IntoIterator<Item = String>, mode: PresenceMode) -> Self {
        Self {
            property_names: property_names.into_iter().collect(),
            mode,
        }
    }

    /// Choose members of the group per its mode.  `probability` applies only
    /// to the optional members of an at-least-one group.  With
    /// `minimize_refs`, non-reference members are preferred wherever a
    /// choice exists; reference members are still chosen when the group
    /// can't be satisfied any other way.
    pub fn choose_properties(
        &self,
        probability: f64,
        minimize_refs: bool,
        rng: &mut (impl Rng + ?Sized),
    ) -> Vec<String> {
        let all: Vec<&String> = self.property_names.iter().collect();
        let non_ref: Vec<&String> = all
            .iter()
            .copied()
            .filter(|name| !is_ref_prop(name))
            .collect();

        match self.mode {
            PresenceMode::One => {
                let pool = if minimize_refs && !non_ref.is_empty() {
                    &non_ref
                } else {
                    &all
                };
                pool.choose(rng)
                    .map(|name| vec![(*name).clone()])
                    .unwrap_or_default()
            }
            PresenceMode::AtLeastOne => {
                // One mandatory member; the rest optional.  When minimizing
                // and every member is a reference, behave like "one":
                // choosing more would not be minimal.
                let pool = if minimize_refs && !non_ref.is_empty() {
                    &non_ref
                } else {
                    &all
                };
                let Some(required) = pool.choose(rng).copied() else {
                    return Vec::new();
                };

                let candidates = if minimize_refs { &non_ref } else { &all };
                let mut chosen = vec![required.clone()];
                for name in candidates {
                    if *name != required && rng.random::<f64>() < probability {
                        chosen.push((*name).clone());
                    }
                }
                chosen
            }
            PresenceMode::All => all.into_iter().cloned().collect(),
        }
    }

    /// Whether the group can be satisfied using only non-reference members.
    pub fn can_satisfy_without_refs(&self) -> bool {
        match self.mode {
            PresenceMode::One | PresenceMode::AtLeastOne => {
                self.property_names.iter().any(|name| !is_ref_prop(name))
            }
            PresenceMode::All => self.property_names.iter().all(|name| !is_ref_prop(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    #[test]
    fn parses_expression_with_and_without_whitespace() {
        let coco = ValueCoconstraint::parse("created <= modified").unwrap();
        assert_eq!(coco.left, "created");
        assert_eq!(coco.op, CmpOp::Le);
        assert_eq!(coco.right, "modified");

        let coco = ValueCoconstraint::parse("a!=b").unwrap();
        assert_eq!(coco.op, CmpOp::Ne);
    }

    #[test]
    fn rejects_self_relation_and_garbage() {
        assert!(matches!(
            ValueCoconstraint::parse("a = a").unwrap_err().kind(),
            ErrorKind::ValueCoconstraint { .. }
        ));
        assert!(ValueCoconstraint::parse("no operator here").is_err());
        assert!(ValueCoconstraint::parse("a << b").is_err());
    }

    #[test]
    fn derives_reversed_constraint_for_left_operand() {
        let coco = ValueCoconstraint::parse("a < b").unwrap();
        // a's value is known: b must be > a.
        let constraint = coco.constraint_given("a", &json!(5));
        assert_eq!(constraint.op, CmpOp::Gt);
        // b's value is known: a must be < b.
        let constraint = coco.constraint_given("b", &json!(5));
        assert_eq!(constraint.op, CmpOp::Lt);
    }

    #[test]
    fn one_mode_prefers_non_ref_members() {
        let group = PresenceCoconstraint::new(
            ["a_ref".to_string(), "b".to_string()],
            PresenceMode::One,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..32 {
            let chosen = group.choose_properties(0.5, true, &mut rng);
            assert_eq!(chosen, vec!["b".to_string()]);
        }
    }

    #[test]
    fn at_least_one_all_refs_behaves_like_one_when_minimizing() {
        let group = PresenceCoconstraint::new(
            ["a_ref".to_string(), "b_refs".to_string()],
            PresenceMode::AtLeastOne,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..32 {
            let chosen = group.choose_properties(1.0, true, &mut rng);
            assert_eq!(chosen.len(), 1);
        }
    }

    #[test]
    fn satisfiability_without_refs() {
        let one = PresenceCoconstraint::new(
            ["a_ref".to_string(), "b".to_string()],
            PresenceMode::One,
        );
        assert!(one.can_satisfy_without_refs());

        let all = PresenceCoconstraint::new(
            ["a_ref".to_string(), "b".to_string()],
            PresenceMode::All,
        );
        assert!(!all.can_satisfy_without_refs());
    }
}
