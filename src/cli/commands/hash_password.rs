use std::io::{BufRead, Write};

use anyhow::Context;

use crate::config::Config;
use crate::db::repositories::credentials::hash_password;

/// Reads the password and its confirmation, one per line.
pub fn read_new_password(
    config: &Config,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> anyhow::Result<String> {
    let mut read_line = |label: &str| -> anyhow::Result<String> {
        write!(prompt, "{label}: ")?;
        prompt.flush()?;
        let mut line = String::new();
        input
            .read_line(&mut line)
            .context("Failed to read password")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    };

    let password = read_line("New admin password")?;
    let confirm = read_line("Confirm password")?;

    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    if password.chars().count() < config.security.min_password_length {
        anyhow::bail!(
            "Password must be at least {} characters",
            config.security.min_password_length
        );
    }

    Ok(password)
}

/// Prints an Argon2id hash for `ADMIN_PASSWORD_HASH`.
pub fn cmd_hash_password(
    config: &Config,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> anyhow::Result<String> {
    let password = read_new_password(config, input, prompt)?;
    let hash = hash_password(&password, &config.security)?;

    writeln!(prompt)?;
    writeln!(prompt, "Set this in your environment:")?;
    writeln!(prompt, "ADMIN_PASSWORD_HASH='{hash}'")?;
    Ok(hash)
}
