#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("item body is empty: at least one of title, text, or code must be non-empty")]
    EmptyBody,
}
