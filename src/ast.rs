use crate::redirect::Redirection;

/// One word produced by the tokenizer.
///
/// Quoted words are never treated as operators, so `'|'` stays a literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub quoted: bool,
}

impl Word {
    pub fn is_operator(&self, op: &str) -> bool {
        !self.quoted && self.text == op
    }
}

/// One program invocation inside a pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
    pub argv: Vec<String>,
    pub redirections: Vec<Redirection>,
}

/// A parsed command line: one or more stages joined by `|`.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    /// A trailing `&` was present (and stripped from the last stage).
    pub background: bool,
    /// The command text as typed, kept for job reports.
    pub text: String,
}

impl Pipeline {
    /// The argument vector of a single-stage pipeline, used for builtin
    /// dispatch. Builtins ignore redirections.
    pub fn simple_command(&self) -> Option<&[String]> {
        match self.stages.as_slice() {
            [stage] => Some(&stage.argv),
            _ => None,
        }
    }
}
