use std::fmt::Display;

use bh_core::BehaviorError;

/// Failure surfaced to the caller as a code plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub code: String,
    pub message: String,
}

impl CliError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<BehaviorError> for CliError {
    fn from(error: BehaviorError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

fn map_error(code: &'static str, error: impl Display) -> CliError {
    CliError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: CliError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn map_cli_world_read(error: std::io::Error) -> CliError {
    map_error("CLI_WORLD_READ", error)
}

pub(crate) fn map_cli_world_invalid(error: serde_json::Error) -> CliError {
    map_error("CLI_WORLD_INVALID", error)
}

pub(crate) fn cli_object_not_found(stack: &str, id: Option<u32>) -> CliError {
    let message = match id {
        Some(id) => format!("no control id {} on stack \"{}\"", id, stack),
        None => format!("no stack named \"{}\"", stack),
    };
    CliError::new("CLI_OBJECT_NOT_FOUND", message)
}
