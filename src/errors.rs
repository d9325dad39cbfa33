use thiserror::Error;

/// Error codes returned by every fallible operation in the crate.
///
/// Human-readable detail about source errors is delivered through the
/// `OutputLog`; the code itself stays a plain value so hosts can match on it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    #[error("Out of memory")]
    NoMemory,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Invalid state")]
    InvalidState,
    #[error("Too many function arguments")]
    TooManyArguments,
    #[error("Too many members in a layout")]
    TooManyMembers,
    #[error("Already exists")]
    AlreadyExists,
    #[error("Already configured")]
    AlreadyConfigured,
    #[error("Built-in symbol collision")]
    SymbolCollision,
    #[error("Symbol not defined")]
    SymbolNotDefined,
    #[error("Invalid cast")]
    InvalidCast,
    #[error("Invalid assignment")]
    InvalidAssignment,
    #[error("Recursion not allowed")]
    RecursionNotAllowed,
    #[error("JIT compilation failed")]
    JITFailed,
}

pub type Result<T> = std::result::Result<T, Error>;
