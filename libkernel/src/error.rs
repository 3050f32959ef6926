use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("virtual range is already mapped")]
    AlreadyMapped,

    #[error("address is not mapped by a section")]
    NotSectionMapped,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    #[error("out of memory")]
    NoMemory,

    #[error("resource already in use")]
    InUse,

    #[error("invalid value")]
    InvalidValue,

    #[error("mapping error: {0}")]
    MappingError(#[from] MapError),

    #[error("{0}")]
    Other(&'static str),
}

pub type Result<T> = core::result::Result<T, KernelError>;
