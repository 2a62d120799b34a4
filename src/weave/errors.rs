use super::ElementKind;
use crate::cil;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Editing a method body failed
    Editing(cil::Error),

    /// Marker asked for the body of a method that has none (or that was never loaded)
    MissingBody(String),

    /// Marker was attached to a kind of element it doesn't handle
    NotApplicable { marker: String, kind: ElementKind },

    /// Marker-specific failure
    MarkerFailed(String),

    /// Failure while weaving one member, with the member and marker it happened in
    WhileProcessing {
        member: String,
        marker: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Innermost error, underneath any "while processing" context
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::WhileProcessing { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Editing(err) => write!(f, "{}", err),
            Error::MissingBody(method) => write!(f, "{} has no method body", method),
            Error::NotApplicable { marker, kind } => {
                write!(f, "marker `{}` cannot be applied to a {}", marker, kind)
            }
            Error::MarkerFailed(what) => f.write_str(what),
            Error::WhileProcessing {
                member,
                marker,
                source,
            } => write!(
                f,
                "while processing {} (marker `{}`): {}",
                member, marker, source
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Editing(err) => Some(err),
            Error::WhileProcessing { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<cil::Error> for Error {
    fn from(err: cil::Error) -> Error {
        Error::Editing(err)
    }
}
