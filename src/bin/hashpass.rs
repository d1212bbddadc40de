//! Prints an Argon2 PHC string for seeding account.password_hash.

use anyhow::Context;
use counsel_server::auth::hash_password;

fn main() -> anyhow::Result<()> {
    let password = std::env::args()
        .nth(1)
        .context("Usage: hashpass <password>")?;
    let phc = hash_password(&password).map_err(anyhow::Error::msg)?;
    println!("{phc}");
    Ok(())
}
