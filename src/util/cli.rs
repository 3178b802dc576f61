use clap::Parser;

use crate::db::DbStore;
use crate::error::Error;
use crate::revocation::RevocationLedger;
use crate::sweep::Sweep;
use crate::token::{TokenConfig, TokenService};

#[derive(Debug, Parser)]
#[clap(
    name = "shinrai-util",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Options {
    #[clap(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[clap(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
    #[clap(long, env = "JWT_ISSUER", default_value = "shinrai")]
    jwt_issuer: String,
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Debug, Parser)]
enum SubCommand {
    Migrate(Migrate),
    Sweep(SweepNow),
    RevokeUser(RevokeUser),
    MintServiceToken(MintServiceToken),
    MintAnonymousToken(MintAnonymousToken),
}

/// Applies pending database migrations.
#[derive(Debug, Parser)]
struct Migrate;

/// Deletes expired revocations, replay records and CSRF states once.
#[derive(Debug, Parser)]
struct SweepNow;

/// Revokes every token issued to a user so far.
#[derive(Debug, Parser)]
struct RevokeUser {
    #[clap(short, long)]
    user_id: String,
    #[clap(short, long, default_value = "revoked by operator")]
    reason: String,
}

#[derive(Debug, Parser)]
struct MintServiceToken;

#[derive(Debug, Parser)]
struct MintAnonymousToken;

fn get_database(opts: &Options) -> Result<DbStore, Error> {
    let url = opts
        .database_url
        .as_deref()
        .ok_or_else(|| Error::Config("DATABASE_URL is required".to_string()))?;
    DbStore::acquire(url)
}

fn get_tokens(opts: &Options) -> Result<TokenService, Error> {
    let secret = opts
        .jwt_secret
        .as_deref()
        .ok_or_else(|| Error::Config("JWT_SECRET is required".to_string()))?;
    Ok(TokenService::new(
        secret.as_bytes(),
        TokenConfig::with_issuer(opts.jwt_issuer.clone()),
    ))
}

fn migrate(_c: &Migrate, opts: &Options) -> Result<(), Error> {
    get_database(opts)?.migrate()
}

fn sweep(_c: &SweepNow, opts: &Options) -> Result<(), Error> {
    let removed = get_database(opts)?.sweep()?;
    println!("removed {} expired rows", removed);
    Ok(())
}

fn revoke_user(c: &RevokeUser, opts: &Options) -> Result<(), Error> {
    get_database(opts)?.revoke_all_for_user(&c.user_id, &c.reason)
}

fn mint_service_token(_c: &MintServiceToken, opts: &Options) -> Result<(), Error> {
    println!("{}", get_tokens(opts)?.mint_service()?);
    Ok(())
}

fn mint_anonymous_token(_c: &MintAnonymousToken, opts: &Options) -> Result<(), Error> {
    println!("{}", get_tokens(opts)?.mint_anonymous()?);
    Ok(())
}

pub fn run_cli_action(opts: Options) -> Result<(), Error> {
    use SubCommand::*;

    match &opts.command {
        Migrate(c) => migrate(c, &opts),
        Sweep(c) => sweep(c, &opts),
        RevokeUser(c) => revoke_user(c, &opts),
        MintServiceToken(c) => mint_service_token(c, &opts),
        MintAnonymousToken(c) => mint_anonymous_token(c, &opts),
    }
}
