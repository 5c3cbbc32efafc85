use {
    anyhow::Result,
    clap::Subcommand,
    lockbox_vault::{ChangeReason, PasswordHistoryEntry},
};

use crate::vault_commands::{self, Context};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Record a replaced password. Requires the passphrase.
    Record {
        credential: String,
        old_password: String,
        /// manual, generated, breach, expired or import.
        #[arg(long, default_value = "manual")]
        reason: ChangeReason,
    },
    /// Check whether a password was used before. Works without the passphrase.
    Check {
        password: String,
        /// Ignore this credential's own history.
        #[arg(long)]
        exclude: Option<String>,
    },
    /// List a credential's history, newest first.
    List {
        credential: String,
        /// Decrypt old passwords. Requires the passphrase.
        #[arg(long)]
        reveal: bool,
    },
}

pub async fn handle_history(ctx: &Context, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::Record {
            credential,
            old_password,
            reason,
        } => {
            let entry = record(ctx, &credential, &old_password, reason).await?;
            println!("Recorded {} ({}).", entry.id, entry.change_reason);
        },
        HistoryAction::Check { password, exclude } => {
            if check(ctx, &password, exclude.as_deref()).await? {
                println!("reused");
            } else {
                println!("unique");
            }
        },
        HistoryAction::List { credential, reveal } => {
            for (entry, plaintext) in list(ctx, &credential, reveal).await? {
                let shown = plaintext.as_deref().unwrap_or("********");
                println!(
                    "{}  {:<9}  {}",
                    entry.changed_at.to_rfc3339(),
                    entry.change_reason.as_str(),
                    shown
                );
            }
        },
    }
    Ok(())
}

pub async fn record(
    ctx: &Context,
    credential: &str,
    old_password: &str,
    reason: ChangeReason,
) -> Result<PasswordHistoryEntry> {
    let vault = vault_commands::open_unlocked(ctx).await?;
    let entry = vault
        .history()
        .add_to_history(&ctx.user, credential, old_password, reason)
        .await?;
    vault.lock().await;
    Ok(entry)
}

pub async fn check(ctx: &Context, password: &str, exclude: Option<&str>) -> Result<bool> {
    let vault = vault_commands::open_vault(ctx).await?;
    Ok(vault
        .history()
        .is_password_reused(&ctx.user, password, exclude)
        .await?)
}

pub async fn list(
    ctx: &Context,
    credential: &str,
    reveal: bool,
) -> Result<Vec<(PasswordHistoryEntry, Option<String>)>> {
    let vault = if reveal {
        vault_commands::open_unlocked(ctx).await?
    } else {
        vault_commands::open_vault(ctx).await?
    };

    let entries = vault.history().list_history(&ctx.user, credential).await?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let plaintext = if reveal {
            Some(vault.history().reveal(&entry).await?)
        } else {
            None
        };
        out.push((entry, plaintext));
    }
    vault.lock().await;
    Ok(out)
}
