use std::time::Duration;
use tracing::info;

use crate::error::{Result, WalletError};
use crate::wallet::WalletManager;

use super::{password_or_prompt, print_json};

pub async fn handle_init(mut manager: WalletManager, password: Option<String>, skip_password: bool) -> Result<()> {
    if skip_password {
        manager.skip_password().await?;
        println!("Wallet initialised without a password (device key).");
        return Ok(());
    }
    let password = password_or_prompt(password, "New password")?;
    let confirm = password_or_prompt(None, "Confirm password")?;
    if password.as_str() != confirm.as_str() {
        return Err(WalletError::BadInputFormat("passwords do not match".to_string()));
    }
    manager.setup_password(&password).await?;
    println!("Password set. Wallet unlocked.");
    Ok(())
}

pub async fn handle_unlock(
    mut manager: WalletManager,
    password: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    if manager.is_unlocked() {
        println!("Already unlocked.");
        return Ok(());
    }
    let password = password_or_prompt(password, "Password")?;
    let report = match timeout_secs {
        Some(secs) => manager.unlock_within(&password, Duration::from_secs(secs)).await?,
        None => manager.unlock(&password).await?,
    };
    println!("Unlocked: {} wallet(s).", report.wallet_count);
    if report.recovered {
        println!("Warning: {} unreadable wallet(s) were removed:", report.corrupted.len());
        for entry in &report.corrupted {
            println!(
                "  - {} ({}): {}",
                entry.name.as_deref().unwrap_or("?"),
                entry.id.as_deref().unwrap_or("?"),
                entry.reason
            );
        }
    }
    Ok(())
}

pub async fn handle_lock(mut manager: WalletManager) -> Result<()> {
    manager.lock().await?;
    println!("Locked.");
    Ok(())
}

pub async fn handle_status(manager: WalletManager) -> Result<()> {
    print_json(&manager.status().await?)
}

pub async fn handle_auto_lock(mut manager: WalletManager, secs: u64) -> Result<()> {
    manager.set_auto_lock_duration(secs).await?;
    if secs == 0 {
        println!("Auto-lock disabled.");
    } else {
        println!("Auto-lock after {}s of inactivity.", secs);
    }
    Ok(())
}

pub async fn handle_change_password(
    mut manager: WalletManager,
    old: Option<String>,
    new: Option<String>,
) -> Result<()> {
    let old = password_or_prompt(old, "Current password")?;
    if !manager.is_unlocked() {
        manager.unlock(&old).await?;
    }
    let new = password_or_prompt(new, "New password")?;
    manager.change_password(&old, &new).await?;
    info!("password rotated from cli");
    println!("Password changed.");
    Ok(())
}
