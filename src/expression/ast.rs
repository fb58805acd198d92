use regex::Regex;

use super::types::{Type, Value};

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Field(Field),
    Call(Function, Vec<Expr>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Matches {
        subject: Box<Expr>,
        pattern: Pattern,
    },
}

/// Right hand side of a `matches` operator
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Literal pattern compiled together with the rule
    Static(Regex),
    /// Pattern computed from the torrent, compiled on every evaluation
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Contains => "contains",
            BinaryOp::StartsWith => "startsWith",
            BinaryOp::EndsWith => "endsWith",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Result type of the operator, or `None` when the operands are not accepted
    pub fn result_type(&self, left: Type, right: Type) -> Option<Type> {
        use Type::*;

        match self {
            BinaryOp::Or | BinaryOp::And => (left == Bool && right == Bool).then_some(Bool),
            BinaryOp::Eq | BinaryOp::Ne => (left == right).then_some(Bool),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                (left == right && matches!(left, Number | String)).then_some(Bool)
            }
            BinaryOp::In | BinaryOp::NotIn => (left != List && right == List).then_some(Bool),
            BinaryOp::Contains => match (left, right) {
                (String, String) => Some(Bool),
                (List, r) if r != List => Some(Bool),
                _ => None,
            },
            BinaryOp::StartsWith | BinaryOp::EndsWith => {
                (left == String && right == String).then_some(Bool)
            }
            BinaryOp::Add => (left == right && matches!(left, Number | String)).then_some(left),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                (left == Number && right == Number).then_some(Number)
            }
        }
    }
}

/// Torrent attributes addressable from a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Hash,
    Name,
    Path,
    TotalBytes,
    DownloadedBytes,
    State,
    Files,
    Downloaded,
    Seeding,
    Ratio,
    AddedSeconds,
    AddedHours,
    AddedDays,
    SeedingSeconds,
    SeedingHours,
    SeedingDays,
    Label,
    Tags,
    Seeds,
    Peers,
    TrackerName,
    TrackerStatus,
    FreeSpaceSet,
}

impl Field {
    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "Hash" => Field::Hash,
            "Name" => Field::Name,
            "Path" => Field::Path,
            "TotalBytes" => Field::TotalBytes,
            "DownloadedBytes" => Field::DownloadedBytes,
            "State" => Field::State,
            "Files" => Field::Files,
            "Downloaded" => Field::Downloaded,
            "Seeding" => Field::Seeding,
            "Ratio" => Field::Ratio,
            "AddedSeconds" => Field::AddedSeconds,
            "AddedHours" => Field::AddedHours,
            "AddedDays" => Field::AddedDays,
            "SeedingSeconds" => Field::SeedingSeconds,
            "SeedingHours" => Field::SeedingHours,
            "SeedingDays" => Field::SeedingDays,
            "Label" => Field::Label,
            "Tags" => Field::Tags,
            "Seeds" => Field::Seeds,
            "Peers" => Field::Peers,
            "TrackerName" => Field::TrackerName,
            "TrackerStatus" => Field::TrackerStatus,
            "FreeSpaceSet" => Field::FreeSpaceSet,
            _ => return None,
        };
        Some(field)
    }

    pub fn ty(&self) -> Type {
        match self {
            Field::Hash
            | Field::Name
            | Field::Path
            | Field::State
            | Field::Label
            | Field::TrackerName
            | Field::TrackerStatus => Type::String,
            Field::Files | Field::Tags => Type::List,
            Field::Downloaded | Field::Seeding | Field::FreeSpaceSet => Type::Bool,
            Field::TotalBytes
            | Field::DownloadedBytes
            | Field::Ratio
            | Field::AddedSeconds
            | Field::AddedHours
            | Field::AddedDays
            | Field::SeedingSeconds
            | Field::SeedingHours
            | Field::SeedingDays
            | Field::Seeds
            | Field::Peers => Type::Number,
        }
    }
}

/// Helper functions callable from a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    IsUnregistered,
    FreeSpaceGb,
    HasTag,
    HasAllTags,
    HasAnyTag,
    Len,
    Lower,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "IsUnregistered" => Function::IsUnregistered,
            "FreeSpaceGB" => Function::FreeSpaceGb,
            "HasTag" => Function::HasTag,
            "HasAllTags" => Function::HasAllTags,
            "HasAnyTag" => Function::HasAnyTag,
            "len" => Function::Len,
            "lower" => Function::Lower,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::IsUnregistered => "IsUnregistered",
            Function::FreeSpaceGb => "FreeSpaceGB",
            Function::HasTag => "HasTag",
            Function::HasAllTags => "HasAllTags",
            Function::HasAnyTag => "HasAnyTag",
            Function::Len => "len",
            Function::Lower => "lower",
        }
    }

    pub fn return_type(&self) -> Type {
        match self {
            Function::IsUnregistered
            | Function::HasTag
            | Function::HasAllTags
            | Function::HasAnyTag => Type::Bool,
            Function::FreeSpaceGb | Function::Len => Type::Number,
            Function::Lower => Type::String,
        }
    }
}

impl Expr {
    /// Whether any node of the expression calls `function`
    pub fn calls(&self, function: Function) -> bool {
        match self {
            Expr::Literal(_) | Expr::Field(_) => false,
            Expr::Call(f, args) => *f == function || args.iter().any(|arg| arg.calls(function)),
            Expr::List(items) => items.iter().any(|item| item.calls(function)),
            Expr::Not(inner) | Expr::Negate(inner) => inner.calls(function),
            Expr::Binary { left, right, .. } => left.calls(function) || right.calls(function),
            Expr::Matches { subject, pattern } => {
                subject.calls(function)
                    || matches!(pattern, Pattern::Dynamic(inner) if inner.calls(function))
            }
        }
    }
}
