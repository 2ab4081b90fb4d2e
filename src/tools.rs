//! External tool checks run before the diagnostics

use std::process::Command;

use tracing::info;

use crate::errors::{ReplotsError, Result};

/// Tools the ocean diagnostics package expects, with their version flag.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("ncl", "-V"), ("ncks", "--version")];

/// Run `program arg` and return the first line it printed.
pub fn check_tool(program: &str, arg: &str) -> Result<String> {
    let output = Command::new(program)
        .arg(arg)
        .output()
        .map_err(|e| ReplotsError::ToolMissing {
            tool: program.to_string(),
            reason: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(ReplotsError::ToolMissing {
            tool: program.to_string(),
            reason: format!("`{program} {arg}` exited with {}", output.status),
        });
    }
    // ncks reports its version on stderr
    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Ok(String::from_utf8_lossy(&text)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

/// Check that NCL and NCO are installed.
pub fn check_ncl_nco() -> Result<()> {
    for (program, arg) in REQUIRED_TOOLS {
        let version = check_tool(program, arg)?;
        info!(tool = *program, version = %version, "found");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_tool_missing() {
        let err = check_tool("replots-no-such-tool", "-V").unwrap_err();
        assert!(matches!(err, ReplotsError::ToolMissing { ref tool, .. } if tool == "replots-no-such-tool"));
        assert!(!err.is_recoverable());
    }
}
