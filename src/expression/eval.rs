use regex::Regex;

use super::ast::{BinaryOp, Expr, Field, Function, Pattern};
use super::types::Value;
use crate::core::error::EvalError;
use crate::models::Torrent;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Run-wide state visible to rules besides the torrent itself
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalEnv {
    /// Free space on the client's disk in bytes, once it has been retrieved
    pub free_space: Option<i64>,
}

impl EvalEnv {
    pub fn with_free_space(bytes: i64) -> Self {
        Self {
            free_space: Some(bytes),
        }
    }

    fn free_space_gb(&self) -> f64 {
        self.free_space.map_or(0.0, |bytes| bytes as f64 / BYTES_PER_GB)
    }
}

struct Context<'a> {
    torrent: &'a Torrent,
    env: &'a EvalEnv,
}

pub fn evaluate(expr: &Expr, torrent: &Torrent, env: &EvalEnv) -> Result<Value, EvalError> {
    Context { torrent, env }.eval(expr)
}

impl Context<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(field) => Ok(self.field(*field)),
            Expr::Call(function, args) => self.call(*function, args),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner, "!")?)),
            Expr::Negate(inner) => Ok(Value::Number(-self.eval_number(inner, "-")?)),
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Matches { subject, pattern } => {
                let subject = self.eval_string(subject, "matches")?;
                let matched = match pattern {
                    Pattern::Static(regex) => regex.is_match(&subject),
                    Pattern::Dynamic(pattern) => {
                        let pattern = self.eval_string(pattern, "matches")?;
                        let regex = Regex::new(&pattern).map_err(|e| EvalError::InvalidRegex {
                            pattern: pattern.clone(),
                            reason: e.to_string(),
                        })?;
                        regex.is_match(&subject)
                    }
                };
                Ok(Value::Bool(matched))
            }
        }
    }

    fn field(&self, field: Field) -> Value {
        let t = self.torrent;
        match field {
            Field::Hash => Value::String(t.hash.clone()),
            Field::Name => Value::String(t.name.clone()),
            Field::Path => Value::String(t.path.clone()),
            Field::TotalBytes => t.total_bytes.into(),
            Field::DownloadedBytes => t.downloaded_bytes.into(),
            Field::State => Value::String(t.state.clone()),
            Field::Files => Value::strings(&t.files),
            Field::Downloaded => t.downloaded.into(),
            Field::Seeding => t.seeding.into(),
            Field::Ratio => t.ratio.into(),
            Field::AddedSeconds => t.added_seconds.into(),
            Field::AddedHours => t.added_hours().into(),
            Field::AddedDays => t.added_days().into(),
            Field::SeedingSeconds => t.seeding_seconds.into(),
            Field::SeedingHours => t.seeding_hours().into(),
            Field::SeedingDays => t.seeding_days().into(),
            Field::Label => Value::String(t.label.clone()),
            Field::Tags => Value::strings(&t.tags),
            Field::Seeds => t.seeds.into(),
            Field::Peers => t.peers.into(),
            Field::TrackerName => Value::String(t.tracker_name.clone()),
            Field::TrackerStatus => Value::String(t.tracker_status.clone()),
            Field::FreeSpaceSet => self.env.free_space.is_some().into(),
        }
    }

    fn call(&self, function: Function, args: &[Expr]) -> Result<Value, EvalError> {
        let name = function.name();
        match function {
            Function::IsUnregistered => Ok(self.torrent.is_unregistered().into()),
            Function::FreeSpaceGb => Ok(self.env.free_space_gb().into()),
            Function::HasTag => {
                let tag = self.eval_string(first(args, name)?, name)?;
                Ok(self.torrent.has_tag(&tag).into())
            }
            Function::HasAllTags => {
                for arg in args {
                    if !self.torrent.has_tag(&self.eval_string(arg, name)?) {
                        return Ok(false.into());
                    }
                }
                Ok(true.into())
            }
            Function::HasAnyTag => {
                for arg in args {
                    if self.torrent.has_tag(&self.eval_string(arg, name)?) {
                        return Ok(true.into());
                    }
                }
                Ok(false.into())
            }
            Function::Len => match self.eval(first(args, name)?)? {
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::List(items) => Ok(Value::Number(items.len() as f64)),
                _ => Err(EvalError::TypeMismatch { op: name }),
            },
            Function::Lower => {
                let s = self.eval_string(first(args, name)?, name)?;
                Ok(Value::String(s.to_lowercase()))
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, EvalError> {
        let symbol = op.symbol();

        // short circuit before touching the right operand
        match op {
            BinaryOp::Or => {
                let result = self.eval_bool(left, symbol)? || self.eval_bool(right, symbol)?;
                return Ok(Value::Bool(result));
            }
            BinaryOp::And => {
                let result = self.eval_bool(left, symbol)? && self.eval_bool(right, symbol)?;
                return Ok(Value::Bool(result));
            }
            _ => {}
        }

        let left = self.eval(left)?;
        let right = self.eval(right)?;
        let mismatch = || EvalError::TypeMismatch { op: symbol };

        let value = match (op, left, right) {
            (BinaryOp::Eq, l, r) => Value::Bool(l == r),
            (BinaryOp::Ne, l, r) => Value::Bool(l != r),
            (BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge, l, r) => {
                let ordering = match (&l, &r) {
                    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => return Err(mismatch()),
                };
                // NaN compares false on every side
                let result = ordering.is_some_and(|ordering| match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                });
                Value::Bool(result)
            }
            (BinaryOp::In, item, Value::List(items)) => Value::Bool(items.contains(&item)),
            (BinaryOp::NotIn, item, Value::List(items)) => Value::Bool(!items.contains(&item)),
            (BinaryOp::Contains, Value::String(haystack), Value::String(needle)) => {
                Value::Bool(haystack.contains(&needle))
            }
            (BinaryOp::Contains, Value::List(items), item) => Value::Bool(items.contains(&item)),
            (BinaryOp::StartsWith, Value::String(s), Value::String(prefix)) => {
                Value::Bool(s.starts_with(&prefix))
            }
            (BinaryOp::EndsWith, Value::String(s), Value::String(suffix)) => {
                Value::Bool(s.ends_with(&suffix))
            }
            (BinaryOp::Add, Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (BinaryOp::Add, Value::String(a), Value::String(b)) => Value::String(a + &b),
            (BinaryOp::Sub, Value::Number(a), Value::Number(b)) => Value::Number(a - b),
            (BinaryOp::Mul, Value::Number(a), Value::Number(b)) => Value::Number(a * b),
            (BinaryOp::Div, Value::Number(_), Value::Number(b)) if b == 0.0 => {
                return Err(EvalError::DivisionByZero)
            }
            (BinaryOp::Div, Value::Number(a), Value::Number(b)) => Value::Number(a / b),
            _ => return Err(mismatch()),
        };

        Ok(value)
    }

    fn eval_bool(&self, expr: &Expr, op: &'static str) -> Result<bool, EvalError> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            _ => Err(EvalError::TypeMismatch { op }),
        }
    }

    fn eval_number(&self, expr: &Expr, op: &'static str) -> Result<f64, EvalError> {
        match self.eval(expr)? {
            Value::Number(n) => Ok(n),
            _ => Err(EvalError::TypeMismatch { op }),
        }
    }

    fn eval_string(&self, expr: &Expr, op: &'static str) -> Result<String, EvalError> {
        match self.eval(expr)? {
            Value::String(s) => Ok(s),
            _ => Err(EvalError::TypeMismatch { op }),
        }
    }
}

fn first<'a>(args: &'a [Expr], op: &'static str) -> Result<&'a Expr, EvalError> {
    args.first().ok_or(EvalError::TypeMismatch { op })
}
