//! Domain-specific errors.

use thiserror::Error;

use crate::domain::model::TabId;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("no open tab with id {0}")]
    UnknownTab(TabId),
    #[error("tab name must not be empty")]
    EmptyTabName,
    #[error("no option row at index {0}")]
    UnknownOption(usize),
    #[error("option row {option} has no value slot at index {value}")]
    UnknownOptionValue { option: usize, value: usize },
    #[error("option row {0} does not take word arguments")]
    NoWordArgument(usize),
    #[error("malformed project document: {0}")]
    MalformedProject(#[source] serde_json::Error),
    #[error("malformed language catalog: {0}")]
    MalformedCatalog(#[source] serde_json::Error),
}
