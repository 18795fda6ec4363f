//! `mergeflow whoami`: check the configured session against the service.

use anyhow::{Context, Result};
use chrono::Utc;

use mergeflow_core::config::AppConfig;

use super::style;

pub async fn run_whoami(config: &AppConfig) -> Result<()> {
    if config.server.session.is_none() {
        println!(
            "{}",
            style::warn("No session token configured; the service will treat you as anonymous.")
        );
    }

    let api = super::client(config)?;
    let envelope = api
        .validate_auth()
        .await
        .context("failed to validate session")?;

    let auth = match envelope.payload() {
        Some(auth) => auth,
        None => {
            println!(
                "{}",
                style::error(&format!("Not signed in: {}", envelope.message))
            );
            return Ok(());
        }
    };

    println!("{}", style::success("Signed in"));
    println!();
    println!("  User ID        : {}", auth.user.id);
    println!("  Google ID      : {}", auth.user.google_id);
    println!(
        "  Admin          : {}",
        if auth.user.is_admin { "yes" } else { "no" }
    );
    println!("  Member since   : {}", auth.user.created_at.format("%Y-%m-%d"));
    println!("  Session        : {}", auth.session.id);
    let expires = auth.session.expires_at.format("%Y-%m-%d %H:%M UTC");
    if auth.session.is_expired_at(Utc::now()) {
        println!("  Expires        : {} {}", expires, style::warn("(expired)"));
    } else {
        println!("  Expires        : {}", expires);
    }

    Ok(())
}
