use crate::ast::Word;
use crate::error::ShellError;

/// What a file descriptor should be connected to.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirectTarget {
    /// Write to file (truncate)
    File(String),
    /// Write to file (append)
    FileAppend(String),
    /// Read from file
    FileRead(String),
    /// Duplicate another fd (e.g., 2>&1)
    Fd(i32),
}

/// A single I/O redirection instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirection {
    pub fd: i32,
    pub target: RedirectTarget,
}

/// Separate redirect operators from regular arguments.
///
/// Handles: `<`, `>`, `>>`, `2>`, `2>>`, `2>&1`. Quoted words are always
/// arguments.
pub fn extract_redirections(words: &[Word]) -> Result<(Vec<String>, Vec<Redirection>), ShellError> {
    let mut args = Vec::new();
    let mut redirections = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let word = &words[i];
        let (fd, target): (i32, fn(String) -> RedirectTarget) = if word.is_operator("<") {
            (0, RedirectTarget::FileRead)
        } else if word.is_operator(">") {
            (1, RedirectTarget::File)
        } else if word.is_operator(">>") {
            (1, RedirectTarget::FileAppend)
        } else if word.is_operator("2>") {
            (2, RedirectTarget::File)
        } else if word.is_operator("2>>") {
            (2, RedirectTarget::FileAppend)
        } else if word.is_operator("2>&1") {
            redirections.push(Redirection { fd: 2, target: RedirectTarget::Fd(1) });
            i += 1;
            continue;
        } else {
            args.push(word.text.clone());
            i += 1;
            continue;
        };

        i += 1;
        let path = expect_filename(i, words, &word.text)?;
        redirections.push(Redirection { fd, target: target(path) });
        i += 1;
    }

    Ok((args, redirections))
}

fn expect_filename(i: usize, words: &[Word], operator: &str) -> Result<String, ShellError> {
    match words.get(i) {
        Some(word) if word.quoted || !is_operator_text(&word.text) => Ok(word.text.clone()),
        _ => Err(ShellError::Syntax(format!(
            "expected filename after '{operator}'"
        ))),
    }
}

fn is_operator_text(text: &str) -> bool {
    matches!(text, "<" | ">" | ">>" | "2>" | "2>>" | "2>&1" | "|" | "&")
}
