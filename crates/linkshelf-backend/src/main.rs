//! linkshelf admin CLI
//!
//! Drives the backend services against a local database: manage users,
//! issue and revoke sessions, share links and purge stale blacklist rows.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use linkshelf_backend::Backend;
use linkshelf_backend::auth::{RevocationStore, SqliteRevocationStore, TokenService};
use linkshelf_backend::storage::{CredentialStore, LinkDatabase, NewLink, User};
use linkshelf_core::config;
use linkshelf_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "linkshelf")]
#[command(version, about = "linkshelf admin - accounts, sessions and link sharing")]
struct Cli {
    /// Path to SQLite database file.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Secret used to sign session tokens.
    #[arg(long, env = "LINKSHELF_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Directory holding `.linkshelf/settings.json`.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a user and print their first access token.
    AddUser { username: String, password: String },
    /// Log in and print an access token.
    Login {
        username: String,
        password: String,
        /// Also print a refresh token.
        #[arg(long)]
        refresh: bool,
    },
    /// Show the user behind a token.
    Whoami { token: String },
    /// Revoke a token.
    Logout { token: String },
    /// Add a link owned by the token's user.
    AddLink {
        token: String,
        name: String,
        url: String,
        #[arg(long, default_value = "general")]
        category: String,
    },
    /// Grant another user access to a link.
    Share {
        token: String,
        link_id: i64,
        grantee: String,
        #[arg(long, default_value = "read")]
        level: String,
    },
    /// Remove a grant. Without `--user`, drops the caller's own grant.
    Unshare {
        token: String,
        link_id: i64,
        #[arg(long)]
        user: Option<String>,
    },
    /// List links visible to the token's user, one JSON object per line.
    Links {
        token: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete blacklist entries whose tokens have expired anyway.
    PurgeRevocations,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("linkshelf=info,linkshelf_backend=info", cli.log_json);

    let config = config::load_config(cli.project_dir.as_deref())?;

    let db_path = match cli.db_path.or_else(|| config.storage.database_path.clone()) {
        Some(path) => path,
        None => config::database_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine default database path"))?,
    };
    info!(path = %db_path.display(), "Opening link database");
    let db = LinkDatabase::open(&db_path).await?;

    let tokens = Arc::new(TokenService::from_config(
        cli.jwt_secret.as_bytes(),
        &config.auth,
    )?);
    let revocations = SqliteRevocationStore::new(db.clone());
    let backend = Backend::new(
        Arc::new(db.clone()) as Arc<dyn CredentialStore>,
        tokens,
        Arc::new(revocations.clone()) as Arc<dyn RevocationStore>,
        &config,
    );

    let result = run(cli.command, &backend, &revocations).await;
    db.close().await;
    result
}

async fn run(
    command: Command,
    backend: &Backend,
    revocations: &SqliteRevocationStore,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();

    match command {
        Command::AddUser { username, password } => {
            let (user, issued) = backend.accounts.register(&username, &password).await?;
            writeln!(out, "created user {} (id {})", user.username, user.id)?;
            writeln!(out, "{}", issued.token)?;
        }
        Command::Login {
            username,
            password,
            refresh,
        } => {
            let issued = backend.accounts.login(&username, &password).await?;
            writeln!(out, "{}", issued.token)?;
            if refresh {
                let user = backend.accounts.me(Some(&issued.token)).await?;
                let refresh = backend.accounts.issue_refresh(&user)?;
                writeln!(out, "{}", refresh.token)?;
            }
        }
        Command::Whoami { token } => {
            let user = backend.accounts.me(Some(&token)).await?;
            writeln!(out, "{} (id {})", user.username, user.id)?;
        }
        Command::Logout { token } => {
            backend.accounts.logout(Some(&token)).await?;
            writeln!(out, "token revoked")?;
        }
        Command::AddLink {
            token,
            name,
            url,
            category,
        } => {
            let user = session(backend, &token).await?;
            let link = backend
                .links
                .create_link(&user, NewLink { name, url, category })
                .await?;
            writeln!(out, "{}", serde_json::to_string(&link)?)?;
        }
        Command::Share {
            token,
            link_id,
            grantee,
            level,
        } => {
            let user = session(backend, &token).await?;
            let grant = backend
                .links
                .share_link(&user, link_id, &grantee, &level)
                .await?;
            writeln!(out, "{grantee} now has {} access to link {link_id}", grant.permission)?;
        }
        Command::Unshare {
            token,
            link_id,
            user: target,
        } => {
            let user = session(backend, &token).await?;
            backend
                .links
                .unshare_link(&user, link_id, target.as_deref())
                .await?;
            writeln!(out, "grant removed")?;
        }
        Command::Links { token, category } => {
            let user = session(backend, &token).await?;
            for link in backend.links.list_links(&user, category.as_deref()).await? {
                writeln!(out, "{}", serde_json::to_string(&link)?)?;
            }
        }
        Command::PurgeRevocations => {
            let removed = revocations.purge_expired().await?;
            info!(removed, "Purged expired revocations");
            writeln!(out, "removed {removed} expired revocation(s)")?;
        }
    }

    Ok(())
}

async fn session(backend: &Backend, token: &str) -> anyhow::Result<User> {
    Ok(backend.accounts.me(Some(token)).await?)
}
