// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PowerShell script generation for Windows actions.

/// Escape an argument for embedding in a single-quoted PowerShell string.
///
/// Backslashes and double quotes follow the `CommandLineToArgvW`
/// conventions; single quotes are doubled per PowerShell's quoting
/// rules.
pub fn replace_escapes(arg: &str) -> String {
    let mut result = String::with_capacity(arg.len());
    for c in arg.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\'' => result.push_str("''"),
            _ => result.push(c),
        }
    }
    result
}

/// Wrap a command line so the script exits with the command's exit code.
///
/// A command that is not recognized exits 1 (PowerShell would otherwise
/// leave `$LASTEXITCODE` null), and a null exit code after an unexpected
/// error is coerced to 1.
pub fn generate_exit_code_wrapper(args: &[String]) -> String {
    let cmd_line = args
        .iter()
        .map(|arg| format!("'{}'", replace_escapes(arg)))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        r#"
try {{
    # Attempt to run the command. This will fail if the command is not recognized.
    & {cmd_line}
}}
catch [System.Management.Automation.CommandNotFoundException] {{
    Write-Host "Command not found: $_, exiting with code 1."
    exit 1
}}
catch {{
    Write-Host "An unexpected error occurred: $_"
    if ($LASTEXITCODE -eq $null) {{
        Write-Host "The original exit code is null. Exit with code = 1"
        exit 1
    }}
    exit $LASTEXITCODE
}}

exit $LASTEXITCODE
"#
    )
}

#[cfg(test)]
#[path = "pwsh_tests.rs"]
mod tests;
