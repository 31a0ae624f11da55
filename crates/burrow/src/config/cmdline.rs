//! A configuration source made from `-o key=value` arguments.

use config::{ConfigError, Source, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::iter::FromIterator;

/// Configuration options given on the command line.
///
/// Each option is a line of TOML, like `proxy.max_idle_time = 5000`.
/// The lines are joined into one TOML document.  As a convenience, an
/// unquoted single-word value (`trace=true`, `upstream.method=aes_key`)
/// is treated as a string; `config` converts it to whatever type the
/// field wants.
#[derive(Debug, Clone, Default)]
pub struct CmdLine {
    /// The options, in the order given.
    lines: Vec<String>,
}

impl CmdLine {
    /// Make a new CmdLine with no options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one option.
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Return the options as a single TOML document.
    fn to_toml(&self) -> String {
        let mut doc = String::new();
        for line in &self.lines {
            match quote_bareword(line) {
                Some(quoted) => doc.push_str(&quoted),
                None => doc.push_str(line),
            }
            doc.push('\n');
        }
        doc
    }

    /// Rewrite a TOML parse error so that it names the offending option,
    /// rather than a line of a document the user never saw.
    fn describe_error(&self, msg: &str, line_col: Option<(usize, usize)>) -> String {
        /// Matches the position suffix that the toml crate appends.
        static POSITION: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(.*?) at line [0-9]+ column [0-9]+$")
                .expect("Built-in regex compilation failed")
        });
        let msg = POSITION
            .captures(msg)
            .and_then(|c| c.get(1))
            .map_or(msg, |m| m.as_str());

        match line_col.and_then(|(line, _)| self.lines.get(line)) {
            Some(option) => format!("{} in option {:?}", msg, option),
            None => format!("{} in command-line options", msg),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for CmdLine {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        CmdLine {
            lines: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl Source for CmdLine {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<HashMap<String, Value>, ConfigError> {
        let doc: toml::Value = toml::from_str(&self.to_toml())
            .map_err(|e| ConfigError::Message(self.describe_error(&e.to_string(), e.line_col())))?;
        doc.try_into()
            .map_err(|e| ConfigError::Foreign(Box::new(e)))
    }
}

/// If `line` looks like `dotted.key = word`, return it with `word`
/// quoted.  Otherwise return None.
fn quote_bareword(line: &str) -> Option<String> {
    /// Matches a key and a single unquoted word.
    static BAREWORD: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?x:
               ^ [\ \t]*
               # the key, possibly dotted
               ( (?:[A-Za-z0-9_\-]+\.)* [A-Za-z0-9_\-]+ )
               [\ \t]* = [\ \t]*
               # the value: letters, digits, and underscores only
               ( [A-Za-z0-9_]+ )
               [\ \t]* $)"#,
        )
        .expect("Built-in regex compilation failed")
    });

    BAREWORD
        .captures(line)
        .map(|c| format!("{}=\"{}\"", &c[1], &c[2]))
}
