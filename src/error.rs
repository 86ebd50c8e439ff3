use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced through `Result`. Invariant violations inside the store
/// (duplicate keys, exhausted arenas, runaway bucket chains) are programming
/// or sizing bugs and panic instead; see the `# Panics` sections on the
/// operations that can hit them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("corruption detected: {0}")]
    Corruption(String),
}
