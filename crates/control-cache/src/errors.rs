use thiserror::Error;

/// The in-process map can't itself go down, but the type exists so a
/// networked backend (e.g. Redis) can implement the same trait surface
/// later without changing callers — see DESIGN.md. §5 requires rate
/// limiting to fail closed whenever the FCS is unreachable; callers
/// should treat any `FcsError` as "reject the request".
#[derive(Debug, Error)]
pub enum FcsError {
    #[error("fast counter store unreachable: {0}")]
    Unreachable(String),
}
