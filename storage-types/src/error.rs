// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Errors raised while interpreting domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid value {value:?} for tri-state column {column}")]
    InvalidTriState { column: String, value: String },

    #[error("invalid quantity: {0:?}")]
    InvalidQuantity(String),

    #[error("invalid node selector: {0}")]
    InvalidSelector(String),
}
