use std::{error, fmt};

use bstr::ByteSlice;

pub type TableFieldResult<T> = Result<T, ParseFieldError>;
pub type TableResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy)]
pub enum ParserTolerance {
    IgnoreAll,
    Safe,
    Pedantic,
}

impl Default for ParserTolerance {
    fn default() -> Self {
        Self::Safe
    }
}

#[derive(Debug, Clone)]
pub enum ParseFieldError {
    /// A bytestring couldn't be parsed as a bytestring, can happen
    /// when the contents aren't UTF8.
    Utf8Error,
    /// A numeric field couldn't be parsed into the correct type
    ParseFromStringError,
    /// A numeric field parsed, but is negative or not finite.
    OutOfRange(&'static str),
    /// A required field was incorrectly formatted. Includes the
    /// column name.
    InvalidField(&'static str),
    MissingFields,
}

macro_rules! impl_many_from {
    ($to:ty $(,)?) => ();
    ($to:ty, ($from:ty, $out:expr) $(, ($f:ty, $o:expr))* $(,)?) => (
        impl From<$from> for $to {
            fn from(_: $from) -> Self {
                $out
            }
        }
        impl_many_from!($to $(, ($f, $o))*);
    );
}

impl_many_from!(
    ParseFieldError,
    (std::str::Utf8Error, ParseFieldError::Utf8Error),
    (bstr::Utf8Error, ParseFieldError::Utf8Error),
    (
        std::num::ParseIntError,
        ParseFieldError::ParseFromStringError
    ),
    (
        std::num::ParseFloatError,
        ParseFieldError::ParseFromStringError
    )
);

impl fmt::Display for ParseFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ParseFieldError as PFE;
        match self {
            PFE::Utf8Error => {
                write!(f, "Failed to parse a bytestring as a UTF-8 string")
            }
            PFE::ParseFromStringError => {
                write!(f, "Failed to parse a field from a string")
            }
            PFE::OutOfRange(field) => {
                write!(f, "Field `{}` is negative or not finite", field)
            }
            PFE::InvalidField(field) => {
                write!(f, "Failed to parse field `{}`", field)
            }
            PFE::MissingFields => write!(f, "Line is missing required fields"),
        }
    }
}

impl error::Error for ParseFieldError {}

/// Type encapsulating the ways reading an input table can fail
#[derive(Debug)]
pub enum ParseError {
    /// The line is a `#` comment. Ignored by the table readers
    /// rather than a fail condition.
    Comment,
    /// Tried to parse an empty line. Can be ignored.
    EmptyLine,
    /// A line couldn't be parsed. Includes the line number, the
    /// problem line and a variant describing the error.
    InvalidLine(ParseFieldError, usize, String),
    /// A field couldn't be parsed
    InvalidField(ParseFieldError),
    /// A contig label occurs on more than one row of a table
    DuplicateLabel(String),
    /// A label that is not present in the contig table
    UnknownLabel(String),
    /// A composition row whose dimension differs from the first row
    DimensionMismatch {
        label: String,
        expected: usize,
        found: usize,
    },
    /// A contig without a composition row
    MissingProfile(String),
    /// Wrapper for an IO error.
    IOError(std::io::Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ParseError as PE;
        match self {
            PE::Comment => write!(f, "Line is a comment"),
            PE::EmptyLine => write!(f, "Line was empty"),
            PE::InvalidLine(field_err, line_no, line) => write!(
                f,
                "Failed to parse line {} `{}`, error: {}",
                line_no, line, field_err
            ),
            PE::InvalidField(field_err) => {
                write!(f, "Failed to parse field: {}", field_err)
            }
            PE::DuplicateLabel(label) => {
                write!(f, "Contig label `{}` appears more than once", label)
            }
            PE::UnknownLabel(label) => {
                write!(f, "Contig label `{}` is not in the contig table", label)
            }
            PE::DimensionMismatch {
                label,
                expected,
                found,
            } => write!(
                f,
                "Composition profile of `{}` has {} values, expected {}",
                label, found, expected
            ),
            PE::MissingProfile(label) => {
                write!(f, "No composition profile for contig `{}`", label)
            }
            PE::IOError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl From<std::io::Error> for ParseError {
    #[inline]
    fn from(err: std::io::Error) -> Self {
        Self::IOError(err)
    }
}

impl From<ParseFieldError> for ParseError {
    #[inline]
    fn from(err: ParseFieldError) -> Self {
        Self::InvalidField(err)
    }
}

impl error::Error for ParseError {}

impl ParseError {
    #[inline]
    pub(crate) fn invalid_line(
        error: ParseFieldError,
        line_no: usize,
        line: &[u8],
    ) -> Self {
        let mut dest = String::new();
        line.to_str_lossy_into(&mut dest);
        Self::InvalidLine(error, line_no, dest)
    }

    #[inline]
    pub fn can_safely_continue(&self, tol: &ParserTolerance) -> bool {
        use ParserTolerance as Tol;
        match tol {
            Tol::IgnoreAll => match self {
                ParseError::IOError(_) => false,
                _ => true,
            },
            Tol::Safe => match self {
                ParseError::EmptyLine => true,
                ParseError::Comment => true,
                _ => false,
            },
            Tol::Pedantic => false,
        }
    }
}
