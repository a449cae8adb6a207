//! Blocking terminal prompt for steps a human has to finish.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

const CONFIRMATION: &str = "yes";

/// Ask `task?` until the operator types exactly `yes`.
///
/// Any other answer repeats the question. End of input is an error so a
/// closed stdin does not spin forever.
pub fn confirm_manual_step<R, W>(reader: &mut R, writer: &mut W, task: &str) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::new();
    loop {
        write!(writer, "\n{task}? ").context("Failed to write prompt")?;
        writer.flush().context("Failed to flush prompt")?;

        line.clear();
        let read = reader
            .read_line(&mut line)
            .context("Failed to read confirmation")?;
        if read == 0 {
            anyhow::bail!("Input closed before '{task}' was confirmed");
        }

        if line.trim_end_matches(['\r', '\n']) == CONFIRMATION {
            return Ok(());
        }
    }
}

/// Source of manual confirmations during login.
pub trait ManualStep: Send + Sync {
    fn confirm(&self, task: &str) -> Result<()>;
}

/// Confirms through the process's stdin/stdout.
pub struct TerminalPrompt;

impl ManualStep for TerminalPrompt {
    fn confirm(&self, task: &str) -> Result<()> {
        let stdin = std::io::stdin();
        let mut reader = stdin.lock();
        let mut stdout = std::io::stdout();
        confirm_manual_step(&mut reader, &mut stdout, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_accepts_yes() {
        let mut input = Cursor::new("yes\n");
        let mut output = Vec::new();
        confirm_manual_step(&mut input, &mut output, "Phone call received").unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "\nPhone call received? ");
    }

    #[test]
    fn test_repeats_until_yes() {
        let mut input = Cursor::new("no\nYes\n yes\nyes\r\n");
        let mut output = Vec::new();
        confirm_manual_step(&mut input, &mut output, "Done").unwrap();
        let prompts = String::from_utf8(output).unwrap();
        assert_eq!(prompts.matches("Done? ").count(), 4);
    }

    #[test]
    fn test_eof_is_error() {
        let mut input = Cursor::new("maybe\n");
        let mut output = Vec::new();
        let err = confirm_manual_step(&mut input, &mut output, "Done").unwrap_err();
        assert!(err.to_string().contains("Input closed"));
    }

    #[test]
    fn test_yes_without_newline_at_eof() {
        let mut input = Cursor::new("yes");
        let mut output = Vec::new();
        assert!(confirm_manual_step(&mut input, &mut output, "Done").is_ok());
    }
}
