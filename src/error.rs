use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("VMStructs unavailable. Unsupported JVM?")]
    IntrospectionUnavailable,
    #[error("No AllocTracer symbols found. Are JDK debug symbols installed?")]
    SymbolsNotFound,
    #[error("alloc tracer already started")]
    AlreadyStarted,
    #[error("another alloc tracer is active in this process")]
    AlreadyActive,
    #[error("{0} is not resolved")]
    Unresolved(&'static str),
    #[error("invalid proc maps")]
    InvalidProcMaps,
}
