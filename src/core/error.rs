// Centralized error handling for tqm

use thiserror::Error;

use crate::expression::types::Type;

/// Errors raised while resolving settings out of the loaded configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No client configuration found for: {0:?}")]
    UnknownClient(String),

    #[error("Client {0:?} is not enabled")]
    ClientDisabled(String),

    #[error("Failed finding configuration of filter: {0:?}")]
    UnknownFilter(String),

    #[error("Client {0:?} has no download_path set")]
    MissingDownloadPath(String),

    #[error("Invalid setting {setting}: {reason}")]
    Invalid { setting: String, reason: String },
}

/// Errors detected while parsing or type-checking a rule
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("unexpected character {ch:?} at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("unterminated string starting at position {pos}")]
    UnterminatedString { pos: usize },

    #[error("invalid number {text:?} at position {pos}")]
    InvalidNumber { pos: usize, text: String },

    #[error("unexpected {found} at position {pos}, expected {expected}")]
    UnexpectedToken {
        pos: usize,
        found: String,
        expected: &'static str,
    },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown identifier {0:?}")]
    UnknownIdentifier(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("operator {op} cannot be applied to {left} and {right}")]
    OperandMismatch {
        op: &'static str,
        left: Type,
        right: Type,
    },

    #[error("operator {op} cannot be applied to {operand}")]
    UnaryMismatch { op: &'static str, operand: Type },

    #[error("{function} expects {expected} argument(s), got {found}")]
    ArgumentType {
        function: &'static str,
        expected: Type,
        found: Type,
    },

    #[error("expression must evaluate to bool, got {0}")]
    NotBoolean(Type),

    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("empty expression")]
    Empty,
}

/// A rule from a filter failed to compile
#[derive(Error, Debug)]
#[error("compile {section} expression: {rule:?}: {reason}")]
pub struct CompileError {
    pub section: String,
    pub rule: String,
    #[source]
    pub reason: SyntaxError,
}

/// Errors raised while evaluating a compiled rule against a torrent
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("expression returned {0}, expected bool")]
    NotBoolean(Type),

    #[error("operator {op} received unexpected operand types")]
    TypeMismatch { op: &'static str },
}

/// Errors returned by torrent client adapters
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("login: {0}")]
    Login(String),

    #[error("unsupported webapi version: {0}")]
    UnsupportedVersion(String),

    #[error("{op}: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{op}: unexpected response status {status}")]
    Status {
        op: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{method}: {message}")]
    Rpc { method: String, message: String },

    #[error("{op}: {reason}")]
    Decode { op: &'static str, reason: String },

    #[error("client is not connected")]
    NotConnected,
}

/// Errors returned by private tracker lookups
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("{tracker}: build http client: {source}")]
    Build {
        tracker: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{tracker}: request search: {source}")]
    Request {
        tracker: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{tracker}: validate search response: {status}")]
    Status {
        tracker: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{tracker}: decode search response: {source}")]
    Decode {
        tracker: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{tracker}: url parse: {reason}")]
    Url { tracker: &'static str, reason: String },
}

impl TrackerError {
    /// Whether the failed request is worth sending again
    pub fn is_retryable(&self) -> bool {
        match self {
            TrackerError::Request { source, .. } => source.is_timeout() || source.is_connect(),
            TrackerError::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            TrackerError::Build { .. } | TrackerError::Decode { .. } | TrackerError::Url { .. } => {
                false
            }
        }
    }
}
