//! Line-based prompts on stdin

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

/// Ask for a line; `None` on end of input
pub fn line(label: &str) -> Result<Option<String>> {
    print!("{}: ", label);
    io::stdout().flush().context("flushing stdout")?;
    let mut buf = String::new();
    let read = io::stdin().lock().read_line(&mut buf).context("reading stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
}

pub fn required(label: &str) -> Result<String> {
    match line(label)? {
        Some(value) => Ok(value),
        None => bail!("input ended while asking for {}", label),
    }
}

/// Empty answer becomes `None`
pub fn optional(label: &str) -> Result<Option<String>> {
    Ok(line(&format!("{} (optional)", label))?.filter(|v| !v.trim().is_empty()))
}

pub fn date(label: &str) -> Result<Option<NaiveDate>> {
    loop {
        let Some(value) = line(&format!("{} (YYYY-MM-DD)", label))? else {
            return Ok(None);
        };
        if value.trim().is_empty() {
            return Ok(None);
        }
        match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
            Ok(date) => return Ok(Some(date)),
            Err(_) => eprintln!("  Please enter a date like 1990-01-31"),
        }
    }
}

pub fn confirm(label: &str) -> Result<bool> {
    let answer = line(&format!("{} [y/N]", label))?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
