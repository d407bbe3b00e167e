use thiserror::Error;

/// Failure to turn an encoded policy payload into a [`crate::policy::Policy`].
///
/// Missing tags inside a well-formed payload are never an error; only the
/// transport encoding itself can fail.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed base64 policy payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
