use crate::config::Config;
use crate::constants::{env, limits};

pub fn cmd_init() -> anyhow::Result<()> {
    if Config::create_default_if_missing()? {
        println!("✓ Config file created. Edit config.toml and run again.");
    } else {
        println!("config.toml already exists, leaving it untouched.");
    }

    let secret = hex::encode(rand::random::<[u8; limits::MIN_SECRET_KEY_BYTES]>());
    println!();
    println!("Secrets are read from the environment. A fresh signing key:");
    println!("{}={}", env::SECRET_KEY, secret);
    println!(
        "Then run `clinic-portal hash-password` and set {} and {}.",
        env::ADMIN_EMAIL,
        env::ADMIN_PASSWORD_HASH
    );
    Ok(())
}
