//! Bridge between terminal input and the workflow session.

pub mod commands;
pub mod runtime;
