//! Operator confirmation for destructive steps.

use std::io::{self, BufRead, Write};

pub trait Confirm {
    /// Ask a yes/no question; only an explicit "yes" counts.
    fn confirm(&self, question: &str) -> bool;
}

/// Prompts on stdout and reads the answer from stdin.
pub struct StdinPrompt;

impl Confirm for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        print!("{} (yes/no) ", question);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

/// Answers yes to everything (`force=yes`).
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}
