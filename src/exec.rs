//! Helpers for the external CLI tools we shell out to.

use std::process::Output;

use crate::prelude::*;

/// Report any command failures, and include any error output.
///
/// Standard output and standard error are logged at appropriate levels even
/// on success, because tools like `pdftocairo` print warnings about damaged
/// inputs there.
pub fn check_for_command_failure(command_name: &str, output: &Output) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.is_empty() {
        debug!(command_name, output = %stdout, "Standard output from command");
    }
    if !stderr.is_empty() {
        warn!(command_name, output = %stderr, "Standard error from command");
    }

    if output.status.success() {
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}
