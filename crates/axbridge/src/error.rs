//! Failure taxonomy of the bridge

use std::fmt;

use axcom::HRESULT;

/// Structured exception raised by an automation server (`DISP_E_EXCEPTION`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExceptionInfo {
    /// `wCode`, or the `scode` when the server left `wCode` at zero
    pub code: i32,
    pub source: String,
    pub description: String,
    /// Help file followed by ` [context]`, empty when the server named no file
    pub help: String,
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}", self.code)?;
        if !self.source.is_empty() {
            write!(f, " from {}", self.source)?;
        }
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        if !self.help.is_empty() {
            write!(f, " (help: {})", self.help)?;
        }
        Ok(())
    }
}

/// Everything that can go wrong between a caller and an automation object.
///
/// COM call failures carry the member they were raised for.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AxError {
    #[error("object is not initialized, or initialization failed")]
    NotInitialized,
    #[error("object does not support automation")]
    NoAutomation,

    #[error("{member}: member not found")]
    MemberNotFound { member: String },
    #[error("{member}: bad parameter count")]
    BadParamCount { member: String },
    #[error("{member}: bad variant type")]
    BadVarType { member: String },
    #[error("{member}: type mismatch in parameter {arg}")]
    TypeMismatch { member: String, arg: u32 },
    #[error("{member}: parameter {arg} not found")]
    ParamNotFound { member: String, arg: u32 },
    #[error("{member}: parameter not optional")]
    ParamNotOptional { member: String },
    #[error("{member}: named arguments not supported")]
    NoNamedArgs { member: String },
    #[error("{member}: overflow")]
    Overflow { member: String },
    #[error("{member}: unknown interface")]
    UnknownInterface { member: String },
    #[error("{member}: unknown locale")]
    UnknownLcid { member: String },
    #[error("{member}: exception thrown by server, {info}")]
    Exception { member: String, info: ExceptionInfo },
    #[error("{member}: call failed with {hr:#010x}")]
    Com { member: String, hr: HRESULT },

    #[error("type '{type_name}' cannot be marshalled")]
    UnsupportedType { type_name: String },
    #[error("no signal '{signature}'")]
    NoSuchSignal { signature: String },
    #[error("'{signature}' carries undecoded arguments; listen with connect_generic")]
    RawSignal { signature: String },
    #[error("no property '{name}'")]
    NoSuchProperty { name: String },
    #[error("property '{name}' is not writable")]
    PropertyNotWritable { name: String },
    #[error("'{control}' does not name a class or interface")]
    InvalidControl { control: String },
    #[error("could not create '{control}': {hr:#010x}")]
    CreateFailed { control: String, hr: HRESULT },
    #[error("{member}: invalid arguments")]
    InvalidArguments { member: String },
}

impl AxError {
    /// The member a COM call failure was raised for.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        match self {
            AxError::MemberNotFound { member }
            | AxError::BadParamCount { member }
            | AxError::BadVarType { member }
            | AxError::TypeMismatch { member, .. }
            | AxError::ParamNotFound { member, .. }
            | AxError::ParamNotOptional { member }
            | AxError::NoNamedArgs { member }
            | AxError::Overflow { member }
            | AxError::UnknownInterface { member }
            | AxError::UnknownLcid { member }
            | AxError::Exception { member, .. }
            | AxError::Com { member, .. }
            | AxError::InvalidArguments { member } => Some(member),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AxError>;
