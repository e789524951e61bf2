use std::str::FromStr;

use anyhow::{anyhow, bail};

/// Local controls, one per line on stdin: `toggle`, `stop`, `seek [0-1]`,
/// `status`.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Toggle,
    /// Ask every display to stop.
    Stop,
    /// Ask every display to jump; a random fraction when none is given.
    Seek(Option<f64>),
    Status,
}

impl FromStr for Control {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let control = match words.next() {
            Some("toggle") | Some("t") => Control::Toggle,
            Some("stop") | Some("s") => Control::Stop,
            Some("seek") => {
                let fraction = words
                    .next()
                    .map(|word| {
                        word.parse::<f64>()
                            .map_err(|_| anyhow!("seek expects a number, got `{}`", word))
                    })
                    .transpose()?;
                Control::Seek(fraction)
            }
            Some("status") => Control::Status,
            Some(other) => bail!("unknown control `{}`", other),
            None => bail!("empty control"),
        };
        Ok(control)
    }
}
