/// Command-line prompt.
pub const PROMPT: &str = "tsh> ";

/// Start-up options, parsed getopt-style from the shell's own arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// `-v`: emit additional diagnostic information.
    pub verbose: bool,
    /// Cleared by `-p`, which automated drivers use.
    pub emit_prompt: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verbose: false,
            emit_prompt: true,
        }
    }
}

/// Why option parsing stopped: either `-h` was given or the arguments were
/// bad. Both end with the usage text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageRequest {
    Help,
    Invalid(String),
}

impl Options {
    pub fn from_args<I>(args: I) -> Result<Self, UsageRequest>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        for arg in args {
            let Some(flags) = arg.strip_prefix('-').filter(|f| !f.is_empty()) else {
                return Err(UsageRequest::Invalid(arg));
            };
            for flag in flags.chars() {
                match flag {
                    'h' => return Err(UsageRequest::Help),
                    'v' => options.verbose = true,
                    'p' => options.emit_prompt = false,
                    other => return Err(UsageRequest::Invalid(format!("-{other}"))),
                }
            }
        }
        Ok(options)
    }
}

pub fn usage() -> &'static str {
    "Usage: shell [-hvp]\n   -h   print this message\n   -v   print additional diagnostic information\n   -p   do not emit a command prompt"
}
