use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Marker carried by every forced-termination error.
pub const HALT_MARKER: &str = "halt at";

/// An engine-agnostic representation of JavaScript values.
/// Objects and functions cross the boundary in their string form.
#[derive(Clone, Debug, PartialEq)]
pub enum JSValue {
    /// The `undefined` value.
    Undefined,
    /// The `null` value.
    Null,
    /// A boolean primitive.
    Boolean(bool),
    /// A number (IEEE 754 double precision).
    Number(f64),
    /// A string value (UTF-8).
    String(String),
}

impl JSValue {
    /// The value as the script language would convert it with `String(value)`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Undefined => String::from("undefined"),
            Self::Null => String::from("null"),
            Self::Boolean(value) => value.to_string(),
            Self::Number(value) => number_to_text(*value),
            Self::String(value) => value.clone(),
        }
    }

    /// Whether the value is the boolean `true` (or its string form).
    pub fn is_true(&self) -> bool {
        match self {
            Self::Boolean(value) => *value,
            Self::String(value) => value == "true",
            _ => false,
        }
    }
}

fn number_to_text(value: f64) -> String {
    if value.is_nan() {
        return String::from("NaN");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if value == value.trunc() && value.abs() < 1e21 {
        // -0 prints as "0" in JS
        return format!("{}", value as i128);
    }
    value.to_string()
}

/// Error type used by host callbacks.
#[derive(Debug)]
pub enum JSError {
    /// A type error (for example, wrong argument types).
    TypeError(String),
    /// An internal error not exposed to user code in detail.
    InternalError(String),
}

impl Display for JSError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::TypeError(message) => write!(f, "TypeError: {message}"),
            Self::InternalError(message) => write!(f, "InternalError: {message}"),
        }
    }
}

impl Error for JSError {}

/// 1-based source position reported by an engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl Display for SourcePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Line {}:{}", self.line, self.column)
    }
}

/// Failure of a guest evaluation.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptError {
    /// The script raised an exception.
    Exception {
        message: String,
        location: Option<SourcePosition>,
    },
    /// The evaluation was terminated through an [`crate::InterruptHandle`].
    Halted { location: Option<SourcePosition> },
    /// The engine failed outside of guest code (allocation, compilation plumbing).
    Internal(String),
}

impl ScriptError {
    /// Whether this error is a forced termination.
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Exception {
                message,
                location: Some(location),
            } => write!(f, "{message} at {location}"),
            Self::Exception {
                message,
                location: None,
            } => f.write_str(message),
            Self::Halted {
                location: Some(location),
            } => write!(f, "{HALT_MARKER} {location}"),
            Self::Halted { location: None } => write!(f, "{HALT_MARKER} <unknown>"),
            Self::Internal(message) => write!(f, "engine: {message}"),
        }
    }
}

impl Error for ScriptError {}

/// Log severity levels understood by the host logger.
#[derive(Copy, Clone, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}
