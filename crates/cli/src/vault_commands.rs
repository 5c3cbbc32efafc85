use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context as _, Result},
    lockbox_config::LockboxConfig,
    lockbox_vault::{EncryptedRecord, KdfParams, SessionConfig, SqliteStore, Vault, VaultStatus},
    secrecy::{ExposeSecret, SecretString},
    serde::Serialize,
};

const DATABASE_FILENAME: &str = "lockbox.db";

/// Everything a command needs, resolved once in `main`.
pub struct Context {
    pub config: LockboxConfig,
    pub user: String,
    pub passphrase: Option<SecretString>,
}

impl Context {
    fn passphrase(&self) -> Result<&str> {
        self.passphrase
            .as_ref()
            .map(|p| p.expose_secret().as_str())
            .context("a passphrase is required: pass --passphrase or set LOCKBOX_PASSPHRASE")
    }
}

/// `storage.database`, else `<data_dir>/lockbox.db`.
pub fn database_path(config: &LockboxConfig) -> Result<PathBuf> {
    if let Some(ref path) = config.storage.database {
        return Ok(path.clone());
    }
    let dir = lockbox_config::data_dir().context("no data directory available")?;
    Ok(dir.join(DATABASE_FILENAME))
}

pub async fn open_vault(ctx: &Context) -> Result<Vault> {
    let path = database_path(&ctx.config)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let kdf = &ctx.config.kdf;
    Ok(Vault::with_kdf_params(
        Arc::new(store),
        SessionConfig {
            timeout: ctx.config.session.timeout(),
        },
        KdfParams {
            m_cost: kdf.m_cost,
            t_cost: kdf.t_cost,
            p_cost: kdf.p_cost,
        },
    ))
}

/// Open the vault and unlock it with the context passphrase.
pub async fn open_unlocked(ctx: &Context) -> Result<Vault> {
    let passphrase = ctx.passphrase()?;
    let vault = open_vault(ctx).await?;
    vault.unlock(&ctx.user, passphrase).await?;
    Ok(vault)
}

pub async fn setup(ctx: &Context) -> Result<Vault> {
    let passphrase = ctx.passphrase()?;
    let vault = open_vault(ctx).await?;
    vault.setup(&ctx.user, passphrase).await?;
    Ok(vault)
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub user: String,
    pub status: VaultStatus,
    pub database: PathBuf,
    pub session_timeout_secs: u64,
}

pub async fn status_report(ctx: &Context) -> Result<StatusReport> {
    let vault = open_vault(ctx).await?;
    Ok(StatusReport {
        user: ctx.user.clone(),
        status: vault.status(&ctx.user).await?,
        database: database_path(&ctx.config)?,
        session_timeout_secs: ctx.config.session.timeout_secs,
    })
}

pub async fn encrypt_value(
    ctx: &Context,
    text: &str,
    aad: Option<&str>,
) -> Result<EncryptedRecord> {
    let vault = open_unlocked(ctx).await?;
    let session = vault.session();
    let record = match aad {
        Some(aad) => session.encrypt_with_aad(text, aad).await?,
        None => session.encrypt(text).await?,
    };
    vault.lock().await;
    Ok(record)
}

pub async fn decrypt_value(ctx: &Context, record: &str, aad: Option<&str>) -> Result<String> {
    let record: EncryptedRecord =
        serde_json::from_str(record).context("record must be JSON with ciphertext and iv")?;
    let vault = open_unlocked(ctx).await?;
    let session = vault.session();
    let plaintext = match aad {
        Some(aad) => session.decrypt_with_aad(&record, aad).await?,
        None => session.decrypt(&record).await?,
    };
    vault.lock().await;
    Ok(plaintext)
}

pub async fn init(ctx: &Context) -> Result<()> {
    let vault = setup(ctx).await?;
    vault.lock().await;
    println!("Vault created for user '{}'.", ctx.user);
    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    let report = status_report(ctx).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn encrypt(ctx: &Context, text: &str, aad: Option<&str>) -> Result<()> {
    let record = encrypt_value(ctx, text, aad).await?;
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

pub async fn decrypt(ctx: &Context, record: &str, aad: Option<&str>) -> Result<()> {
    println!("{}", decrypt_value(ctx, record, aad).await?);
    Ok(())
}
