//! Yes/no confirmations the pipeline and key resolution ask for.

use std::io::{self, BufRead, Write};
use std::path::Path;

/// Answers the questions an interactive run would put to the user.
///
/// The library only talks to this trait; tests pass fixed-answer stubs.
pub trait Confirm {
    /// `path` already exists; may it be replaced?
    fn confirm_overwrite(&self, path: &Path) -> bool;

    /// No key is available; may a new one be generated?
    fn confirm_create_key(&self) -> bool;

    /// `found` keys were discovered; may the first one, `first`, be used?
    fn confirm_use_key(&self, found: usize, first: &Path) -> bool;
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ask(&self, msg: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let mut stderr = io::stderr().lock();
        if write!(stderr, "{msg} {hint} ").and_then(|_| stderr.flush()).is_err() {
            return false;
        }

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            // EOF: nobody is there to answer
            Ok(0) | Err(_) => false,
            Ok(_) => parse_answer(&line, default),
        }
    }
}

impl Confirm for TerminalPrompt {
    fn confirm_overwrite(&self, path: &Path) -> bool {
        let noun = if path.is_dir() { "Directory" } else { "File" };
        let name = path.file_name().unwrap_or(path.as_os_str());
        self.ask(
            &format!("{noun} {} exists. Overwrite?", name.to_string_lossy()),
            false,
        )
    }

    fn confirm_create_key(&self) -> bool {
        self.ask("Encryption key not provided. Create?", true)
    }

    fn confirm_use_key(&self, found: usize, first: &Path) -> bool {
        self.ask(
            &format!(
                "No key supplied and {found} found. Use '{}'?",
                first.display()
            ),
            true,
        )
    }
}

fn parse_answer(line: &str, default: bool) -> bool {
    let answer = line.trim().to_lowercase();
    if answer.is_empty() {
        default
    } else {
        answer.starts_with('y')
    }
}

#[cfg(test)]
mod tests {
    use super::parse_answer;

    #[test]
    fn empty_answer_takes_default() {
        assert!(parse_answer("\n", true));
        assert!(!parse_answer("\n", false));
        assert!(parse_answer("Yes\n", false));
        assert!(!parse_answer("nope\n", true));
    }
}
