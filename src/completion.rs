//! # Shell Completion Module
//!
//! Generates completion scripts through clap's completion system.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! resonance completion bash > ~/.local/share/bash-completion/completions/resonance
//!
//! # Generate zsh completions
//! resonance completion zsh > ~/.config/zsh/completions/_resonance
//! ```

use crate::cli::Shell;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};

/// Writes the completion script for `cmd` to `out`.
pub fn write_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Generate shell completions for the given shell on stdout
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    write_completions(gen, cmd, &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
#[must_use]
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::CommandFactory;

    #[test]
    fn test_bash_script_mentions_subcommands() {
        let mut cmd = Args::command();
        let mut out = Vec::new();
        write_completions(shell_to_completion_shell(Shell::Bash), &mut cmd, &mut out);

        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("resonance"));
        assert!(script.contains("recommend"));
        assert!(script.contains("init-db"));
    }

    #[test]
    fn test_every_shell_generates_something() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell, Shell::Elvish] {
            let mut cmd = Args::command();
            let mut out = Vec::new();
            write_completions(shell_to_completion_shell(shell), &mut cmd, &mut out);
            assert!(!out.is_empty(), "{shell:?} produced an empty script");
        }
    }
}
