//! Shell completions generation.
//!
//! Generates shell completion scripts for bash, zsh, fish, PowerShell and elvish.

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::Cli;
use crate::error::SyncError;

/// Binary name completions are generated for.
const BIN_NAME: &str = "imarisha-sync";

/// Generate shell completions for the specified shell.
///
/// # Errors
///
/// Returns an error if the generated script is not valid UTF-8.
pub fn generate_completions(shell: Shell) -> Result<String, SyncError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut buf);
    String::from_utf8(buf).map_err(|e| SyncError::Parse(format!("UTF-8 error: {e}")))
}

/// Installation instructions for a shell.
#[must_use]
pub fn completion_install_instructions(shell: Shell) -> String {
    match shell {
        Shell::Bash => r"# Add to ~/.bashrc:
source <(imarisha-sync completions bash)
"
        .to_string(),
        Shell::Zsh => r"# Save to your fpath:
imarisha-sync completions zsh > ~/.zsh/completions/_imarisha-sync
"
        .to_string(),
        Shell::Fish => r"# Save to fish completions directory:
imarisha-sync completions fish > ~/.config/fish/completions/imarisha-sync.fish
"
        .to_string(),
        Shell::PowerShell => r"# Add to your PowerShell profile ($PROFILE):
imarisha-sync completions powershell | Out-String | Invoke-Expression
"
        .to_string(),
        _ => format!(
            "# Save the output of 'imarisha-sync completions {shell}' \
             where your shell loads completions\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_bash_completions() {
        let script = generate_completions(Shell::Bash).unwrap();
        assert!(script.contains("imarisha-sync"));
        assert!(script.contains("complete"));
    }

    #[test]
    fn test_generate_zsh_completions() {
        let script = generate_completions(Shell::Zsh).unwrap();
        assert!(script.contains("enqueue"));
    }

    #[test]
    fn test_completion_instructions_not_empty() {
        assert!(!completion_install_instructions(Shell::Bash).is_empty());
        assert!(!completion_install_instructions(Shell::Elvish).is_empty());
    }
}
