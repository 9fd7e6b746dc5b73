//! Common types used across CLI modules

use std::str::FromStr;

/// `KEY=VALUE` pair given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl FromStr for EnvVar {
    type Err = String;

    /// Splits on the first `=`; the value may itself contain `=`
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (key, value) = input
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", input))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("missing variable name in '{}'", input));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
