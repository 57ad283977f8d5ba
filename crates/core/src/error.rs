use thiserror::Error;

use crate::config::ConfigError;
use crate::model::{CatalogError, ParseIdError, RecordError};

/// Any error raised by the domain crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
