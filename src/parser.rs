use crate::ast::{Pipeline, Stage, Word};
use crate::error::ShellError;
use crate::redirect;

/// States for the tokenizer state machine.
enum State {
    /// Between tokens; whitespace is skipped
    Normal,
    /// Building an unquoted word; whitespace ends it
    InWord,
    /// Inside double quotes; whitespace is preserved
    InDoubleQuote,
    /// Inside single quotes; whitespace is preserved
    InSingleQuote,
}

/// Split a command line into words. Quoted spans are kept verbatim and mark
/// the word as quoted.
pub fn tokenize(input: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut state = State::Normal;

    for ch in input.chars() {
        match (&state, ch) {
            // ── Normal state: between tokens ──
            (State::Normal, ' ' | '\t' | '\n' | '\r') => {}
            (State::Normal, '"') => {
                quoted = true;
                state = State::InDoubleQuote;
            }
            (State::Normal, '\'') => {
                quoted = true;
                state = State::InSingleQuote;
            }
            (State::Normal, c) => {
                current.push(c);
                state = State::InWord;
            }

            // ── InWord state: building an unquoted token ──
            (State::InWord, ' ' | '\t' | '\n' | '\r') => {
                words.push(finish_word(&mut current, &mut quoted));
                state = State::Normal;
            }
            (State::InWord, '"') => {
                quoted = true;
                state = State::InDoubleQuote;
            }
            (State::InWord, '\'') => {
                quoted = true;
                state = State::InSingleQuote;
            }
            (State::InWord, c) => current.push(c),

            // ── Quoted states ──
            (State::InDoubleQuote, '"') | (State::InSingleQuote, '\'') => {
                state = State::InWord;
            }
            (State::InDoubleQuote | State::InSingleQuote, c) => current.push(c),
        }
    }

    // An unterminated quote runs to the end of the line.
    if !matches!(state, State::Normal) {
        words.push(finish_word(&mut current, &mut quoted));
    }

    words
}

fn finish_word(current: &mut String, quoted: &mut bool) -> Word {
    let word = Word {
        text: std::mem::take(current),
        quoted: *quoted,
    };
    *quoted = false;
    word
}

/// Parse one input line. Returns `Ok(None)` when the line holds no command.
pub fn parse(line: &str) -> Result<Option<Pipeline>, ShellError> {
    let text = line.trim_end_matches(['\n', '\r']).trim();
    let mut words = tokenize(text);
    if words.is_empty() {
        return Ok(None);
    }

    let background = words.last().is_some_and(|w| w.is_operator("&"));
    if background {
        words.pop();
        if words.is_empty() {
            return Err(ShellError::Syntax("near unexpected token '&'".to_string()));
        }
    }

    let mut stages = Vec::new();
    for segment in words.split(|w| w.is_operator("|")) {
        let (argv, redirections) = redirect::extract_redirections(segment)?;
        if argv.is_empty() {
            return Err(ShellError::Syntax("near unexpected token '|'".to_string()));
        }
        stages.push(Stage { argv, redirections });
    }

    Ok(Some(Pipeline {
        stages,
        background,
        text: text.to_string(),
    }))
}
