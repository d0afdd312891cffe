//! Ordered literal substitutions that collapse known spelling variants.
//!
//! Rules are applied in sequence, each to the output of the previous one.
//! An expansion rule (one whose replacement contains its own find text, like
//! `Gymnix` -> `International Gymnix`) leaves occurrences that already sit
//! inside the replacement untouched. A later rule can still rewrite the text
//! around an earlier expansion, so whole passes repeat until the name stops
//! changing.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bound on full passes, for rule sets that rewrite each other's output in a cycle.
const MAX_PASSES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub find: String,
    pub replace: String,
}

impl Rule {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
        }
    }

    pub fn apply(&self, input: &str) -> String {
        if self.find.is_empty() || self.find == self.replace {
            return input.to_string();
        }
        // Offset of `find` inside `replace`, when the rule is an expansion.
        let anchor = self.replace.find(&self.find);

        let mut out = String::with_capacity(input.len());
        let mut cursor = 0;
        for (pos, _) in input.match_indices(&self.find) {
            let already_expanded = anchor.is_some_and(|k| {
                pos >= k
                    && input
                        .get(pos - k..)
                        .is_some_and(|rest| rest.starts_with(&self.replace))
            });
            out.push_str(&input[cursor..pos]);
            if already_expanded {
                out.push_str(&self.find);
            } else {
                out.push_str(&self.replace);
            }
            cursor = pos + self.find.len();
        }
        out.push_str(&input[cursor..]);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(pairs.iter().map(|(f, r)| Rule::new(*f, *r)).collect())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    fn pass(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |acc, rule| rule.apply(&acc))
    }

    /// Apply the rules until a fixed point, giving up after `MAX_PASSES`.
    pub fn normalize(&self, input: &str) -> String {
        let mut current = input.to_string();
        for _ in 0..MAX_PASSES {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
        warn!(input, output = %current, "name rules did not settle");
        current
    }
}
