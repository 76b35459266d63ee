use std::collections::HashMap;

/// Condition context an applicability predicate is evaluated against.
/// Numbers and flags are filled in by the rule that owns the lookup
/// (duration, month, long_distance and friends); unknown keys read as
/// zero / false so a sparse context never panics.
#[derive(Debug, Clone, Default)]
pub struct ConditionContext {
    numbers: HashMap<String, i64>,
    flags: HashMap<String, bool>,
}

impl ConditionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_number(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.numbers.insert(key.into(), value);
        self
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.flags.insert(key.into(), value);
        self
    }

    pub fn number(&self, key: &str) -> i64 {
        self.numbers.get(key).copied().unwrap_or(0)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }
}

/// Evaluates a predicate string from the rule data. Two forms exist:
/// a numeric comparison (`duration >= 2`, `duration <= 1`) and a bare
/// flag name (`long_distance`). Anything unparsable is false rather
/// than an error; a rule that cannot determine applicability applies
/// nothing.
pub fn evaluate(condition: &str, ctx: &ConditionContext) -> bool {
    let condition = condition.trim();

    for op in ["<=", ">="] {
        if let Some((lhs, rhs)) = condition.split_once(op) {
            let key = lhs.trim();
            let Ok(value) = rhs.trim().parse::<i64>() else {
                return false;
            };
            return match op {
                ">=" => ctx.number(key) >= value,
                _ => ctx.number(key) <= value,
            };
        }
    }

    ctx.flag(condition)
}
