pub mod checkout;
pub mod commit;
pub mod diff;
pub mod init;
pub mod item;
pub mod log;
pub mod reset;
pub mod serve;
pub mod stash;
pub mod status;
pub mod sync;
pub mod watch;

use anyhow::{bail, Result};
use dialoguer::Confirm;
use serde_json::Value;

/// Parses `key=value`. The value is read as JSON when it parses, otherwise it
/// is kept as a plain string.
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Expected key=value, got '{}'", raw);
    };

    let key = key.trim();
    if key.is_empty() {
        bail!("Empty field name in '{}'", raw);
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("volume=0.5").unwrap(),
            ("volume".to_string(), json!(0.5))
        );
        assert_eq!(
            parse_assignment("muted=true").unwrap(),
            ("muted".to_string(), json!(true))
        );
        assert_eq!(
            parse_assignment("label=lead synth").unwrap(),
            ("label".to_string(), json!("lead synth"))
        );
        assert_eq!(
            parse_assignment("notes=[1,2]").unwrap(),
            ("notes".to_string(), json!([1, 2]))
        );
        assert!(parse_assignment("volume").is_err());
        assert!(parse_assignment("=1").is_err());
    }
}
