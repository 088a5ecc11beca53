use thiserror::Error;

use crate::model::{ParseIdError, SessionError};
use crate::state::TransitionError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
