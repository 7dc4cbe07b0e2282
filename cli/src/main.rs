//! Terminal front end for the accounts endpoints.
//!
//! SYSTEM CONTEXT
//! ==============
//! Runs the same flows as the browser client. The session (token plus cached
//! user) lives in a JSON file instead of `localStorage`, and redirects that
//! the browser would follow are printed as hints.

mod file_storage;
mod http;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use accounts::config::{
    ADMIN_URL_VAR, AUTH_URL_VAR, CHAT_URL_VAR, EMAIL_URL_VAR, OAUTH_URL_VAR, REVEAL_TEST_SECRETS_VAR,
    TWO_FACTOR_URL_VAR,
};
use accounts::flows::{self, admin, home, login, oauth, profile, register, reset_password, settings, two_factor};
use accounts::types::{OAuthProvider, ProfileUpdate, Role};
use accounts::{Api, ConfigError, EndpointConfig, Failure, Redirect, Route, SessionStore};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::file_storage::FileStorage;
use crate::http::ReqwestTransport;

type CliApi = Api<ReqwestTransport>;
type CliSession = SessionStore<FileStorage>;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("http client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{}", describe_failure(.0))]
    Flow(#[from] Failure),
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "accounts", about = "Accounts, admin and two-factor endpoints from the terminal")]
struct Cli {
    #[arg(long, env = "ACCOUNTS_SESSION_FILE", default_value = ".accounts-session.json")]
    session_file: PathBuf,

    /// App origin used for callback, reset and welcome links.
    #[arg(long, env = "ACCOUNTS_APP_ORIGIN", default_value = "http://localhost:5173")]
    origin: String,

    #[command(flatten)]
    endpoints: EndpointArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct EndpointArgs {
    #[arg(long, env = "ACCOUNTS_AUTH_URL")]
    auth_url: Option<String>,
    #[arg(long, env = "ACCOUNTS_ADMIN_URL")]
    admin_url: Option<String>,
    #[arg(long, env = "ACCOUNTS_OAUTH_URL")]
    oauth_url: Option<String>,
    #[arg(long, env = "ACCOUNTS_TWO_FACTOR_URL")]
    two_factor_url: Option<String>,
    #[arg(long, env = "ACCOUNTS_EMAIL_URL")]
    email_url: Option<String>,
    #[arg(long, env = "ACCOUNTS_CHAT_URL")]
    chat_url: Option<String>,
    #[arg(long, env = "ACCOUNTS_REVEAL_TEST_SECRETS")]
    reveal_test_secrets: Option<String>,
}

impl EndpointArgs {
    fn lookup(&self, key: &str) -> Option<String> {
        let value = match key {
            AUTH_URL_VAR => &self.auth_url,
            ADMIN_URL_VAR => &self.admin_url,
            OAUTH_URL_VAR => &self.oauth_url,
            TWO_FACTOR_URL_VAR => &self.two_factor_url,
            EMAIL_URL_VAR => &self.email_url,
            CHAT_URL_VAR => &self.chat_url,
            REVEAL_TEST_SECRETS_VAR => &self.reveal_test_secrets,
            _ => return None,
        };
        value.clone()
    }

    fn config(&self) -> Result<EndpointConfig, ConfigError> {
        EndpointConfig::from_lookup(|key| self.lookup(key))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether a session is stored and for whom.
    Status,
    Login {
        email: String,
        #[arg(long, env = "ACCOUNTS_PASSWORD")]
        password: String,
    },
    Register(RegisterArgs),
    Logout,
    Profile(ProfileCommand),
    Reset(ResetCommand),
    #[command(name = "oauth")]
    OAuth(OAuthCommand),
    #[command(name = "2fa")]
    TwoFactor(TwoFactorCommand),
    Admin(AdminCommand),
    Settings(SettingsCommand),
    Email(EmailCommand),
    /// Talk to the assistant; reads one message per line from stdin when none is given.
    Chat { message: Vec<String> },
}

#[derive(Args, Debug)]
struct RegisterArgs {
    email: String,
    #[arg(long, env = "ACCOUNTS_PASSWORD")]
    password: String,
    /// Defaults to `--password`.
    #[arg(long)]
    confirm_password: Option<String>,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Show,
    /// Change the given fields; the others keep their current values.
    Update {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ResetCommand {
    #[command(subcommand)]
    command: ResetSubcommand,
}

#[derive(Subcommand, Debug)]
enum ResetSubcommand {
    Request {
        email: String,
    },
    /// Set a new password with a reset token or the full reset link.
    Complete {
        token_or_link: String,
        #[arg(long, env = "ACCOUNTS_PASSWORD")]
        password: String,
        #[arg(long)]
        confirm_password: Option<String>,
        /// Address for the password-changed notice.
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Args, Debug)]
struct OAuthCommand {
    #[command(subcommand)]
    command: OAuthSubcommand,
}

#[derive(Subcommand, Debug)]
enum OAuthSubcommand {
    /// Print the provider authorization URL.
    Begin { provider: OAuthProvider },
    /// Finish sign-in with the callback URL (or its query string).
    Complete { callback: String },
}

#[derive(Args, Debug)]
struct TwoFactorCommand {
    #[command(subcommand)]
    command: TwoFactorSubcommand,
}

#[derive(Subcommand, Debug)]
enum TwoFactorSubcommand {
    Status,
    Enable,
    Confirm {
        code: String,
    },
    Verify {
        code: String,
    },
    Disable {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    Dashboard {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Role {
        user_id: i64,
        role: Role,
    },
    Status {
        user_id: i64,
        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },
    Activity {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[derive(Args, Debug)]
struct SettingsCommand {
    #[command(subcommand)]
    command: SettingsSubcommand,
}

#[derive(Subcommand, Debug)]
enum SettingsSubcommand {
    Show,
    /// Forget the local session.
    DeleteAccount {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct EmailCommand {
    #[command(subcommand)]
    command: EmailSubcommand,
}

#[derive(Subcommand, Debug)]
enum EmailSubcommand {
    Welcome {
        to: String,
        #[arg(long)]
        name: Option<String>,
    },
    PasswordChanged {
        to: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let api = Api::new(ReqwestTransport::new()?, cli.endpoints.config()?);
    let session = SessionStore::new(FileStorage::new(&cli.session_file));
    tracing::debug!(session_file = %cli.session_file.display(), "session storage");

    let ctx = CliContext { api, session, origin: cli.origin };
    match cli.command {
        Command::Status => run_status(&ctx),
        Command::Login { email, password } => run_login(&ctx, &email, &password).await,
        Command::Register(args) => run_register(&ctx, args).await,
        Command::Logout => {
            print_redirect(profile::logout(&ctx.session));
            Ok(())
        }
        Command::Profile(cmd) => run_profile(&ctx, cmd.command).await,
        Command::Reset(cmd) => run_reset(&ctx, cmd.command).await,
        Command::OAuth(cmd) => run_oauth(&ctx, cmd.command).await,
        Command::TwoFactor(cmd) => run_two_factor(&ctx, cmd.command).await,
        Command::Admin(cmd) => run_admin(&ctx, cmd.command).await,
        Command::Settings(cmd) => run_settings(&ctx, cmd.command),
        Command::Email(cmd) => run_email(&ctx, cmd.command).await,
        Command::Chat { message } => run_chat(&ctx, &message.join(" ")).await,
    }
}

struct CliContext {
    api: CliApi,
    session: CliSession,
    origin: String,
}

// =============================================================================
// ACCOUNT
// =============================================================================

fn run_status(ctx: &CliContext) -> Result<(), CliError> {
    let landing = home::landing(&ctx.session);
    match landing.greeting {
        Some(name) => println!("signed in as {name}"),
        None if landing.authenticated => println!("signed in"),
        None => println!("not signed in"),
    }
    Ok(())
}

async fn run_login(ctx: &CliContext, email: &str, password: &str) -> Result<(), CliError> {
    let redirect = login::login(&ctx.api, &ctx.session, email, password).await?;
    print_signed_in(ctx);
    print_redirect(redirect);
    Ok(())
}

async fn run_register(ctx: &CliContext, args: RegisterArgs) -> Result<(), CliError> {
    let form = register::Registration {
        first_name: args.first_name,
        last_name: args.last_name,
        email: args.email,
        confirm_password: args.confirm_password.unwrap_or_else(|| args.password.clone()),
        password: args.password,
    };
    let redirect = register::register(&ctx.api, &ctx.session, &form, &ctx.origin).await?;
    print_signed_in(ctx);
    print_redirect(redirect);
    Ok(())
}

async fn run_profile(ctx: &CliContext, cmd: ProfileSubcommand) -> Result<(), CliError> {
    match cmd {
        ProfileSubcommand::Show => {
            let user = profile::load(&ctx.api, &ctx.session).await?;
            print_json(&user)
        }
        ProfileSubcommand::Update { first_name, last_name, avatar_url } => {
            let current = profile::load(&ctx.api, &ctx.session).await?;
            let update = merge_profile(profile::form_for(&current), first_name, last_name, avatar_url);
            let user = profile::save(&ctx.api, &ctx.session, &update).await?;
            println!("{}", profile::UPDATED);
            print_json(&user)
        }
    }
}

fn merge_profile(
    current: ProfileUpdate,
    first_name: Option<String>,
    last_name: Option<String>,
    avatar_url: Option<String>,
) -> ProfileUpdate {
    ProfileUpdate {
        first_name: first_name.unwrap_or(current.first_name),
        last_name: last_name.unwrap_or(current.last_name),
        avatar_url: avatar_url.unwrap_or(current.avatar_url),
    }
}

async fn run_reset(ctx: &CliContext, cmd: ResetSubcommand) -> Result<(), CliError> {
    match cmd {
        ResetSubcommand::Request { email } => {
            let requested = reset_password::request_reset(&ctx.api, &email, &ctx.origin).await?;
            println!("{}", requested.message);
            if let Some(token) = requested.revealed_token {
                println!("reset token: {token}");
            }
            Ok(())
        }
        ResetSubcommand::Complete { token_or_link, password, confirm_password, email } => {
            let token = reset_token_arg(&token_or_link);
            let confirmation = confirm_password.unwrap_or_else(|| password.clone());
            let known_email = email.or_else(|| ctx.session.user().map(|user| user.email));
            let done = reset_password::reset_password(
                &ctx.api,
                token.as_deref(),
                &password,
                &confirmation,
                known_email.as_deref(),
            )
            .await?;
            println!("{}", done.message);
            print_redirect(done.redirect);
            Ok(())
        }
    }
}

/// A bare token, or the `token` parameter of a pasted reset link.
fn reset_token_arg(arg: &str) -> Option<String> {
    let arg = arg.trim();
    match arg.split_once('?') {
        Some((_, query)) => reset_password::token_from_query(query),
        None => Some(arg.to_owned()).filter(|token| !token.is_empty()),
    }
}

async fn run_oauth(ctx: &CliContext, cmd: OAuthSubcommand) -> Result<(), CliError> {
    match cmd {
        OAuthSubcommand::Begin { provider } => {
            let auth_url = oauth::begin(&ctx.api, provider, &ctx.origin).await?;
            println!("open in a browser: {auth_url}");
            println!("then run `accounts oauth complete '<callback URL>'`");
            Ok(())
        }
        OAuthSubcommand::Complete { callback } => {
            let query = callback.split_once('?').map_or(callback.as_str(), |(_, query)| query);
            let redirect = oauth::complete(&ctx.api, &ctx.session, query, &ctx.origin).await?;
            print_signed_in(ctx);
            print_redirect(redirect);
            Ok(())
        }
    }
}

// =============================================================================
// TWO-FACTOR
// =============================================================================

async fn run_two_factor(ctx: &CliContext, cmd: TwoFactorSubcommand) -> Result<(), CliError> {
    match cmd {
        TwoFactorSubcommand::Status => {
            let enabled = two_factor::status(&ctx.api, &ctx.session).await?;
            println!("two-factor: {}", if enabled { "enabled" } else { "disabled" });
            Ok(())
        }
        TwoFactorSubcommand::Enable => {
            let enrollment = two_factor::enable(&ctx.api, &ctx.session).await?;
            println!("{}", two_factor::CODE_SENT);
            println!("secret: {}", enrollment.secret);
            if let Some(code) = enrollment.code {
                println!("code: {code} (valid {} min)", enrollment.expires_in_minutes);
            }
            Ok(())
        }
        TwoFactorSubcommand::Confirm { code } => {
            let redirect = two_factor::confirm(&ctx.api, &ctx.session, &code).await?;
            println!("{}", two_factor::ACTIVATED);
            print_redirect(redirect);
            Ok(())
        }
        TwoFactorSubcommand::Verify { code } => {
            let token = flows::require_token(&ctx.session)?;
            let verification = ctx
                .api
                .two_factor()
                .verify(&token, code.trim())
                .await
                .map_err(Failure::from)?;
            println!("verified: {}", verification.verified);
            Ok(())
        }
        TwoFactorSubcommand::Disable { yes } => {
            match two_factor::disable(&ctx.api, &ctx.session, yes).await? {
                Some(redirect) => {
                    println!("{}", two_factor::DEACTIVATED);
                    print_redirect(redirect);
                }
                None => println!("cancelled; pass --yes to disable two-factor"),
            }
            Ok(())
        }
    }
}

// =============================================================================
// ADMIN
// =============================================================================

async fn run_admin(ctx: &CliContext, cmd: AdminSubcommand) -> Result<(), CliError> {
    let dashboard = match cmd {
        AdminSubcommand::Dashboard { page } => admin::load_dashboard(&ctx.api, &ctx.session, page).await?,
        AdminSubcommand::Role { user_id, role } => {
            admin::change_role(&ctx.api, &ctx.session, user_id, role).await?
        }
        AdminSubcommand::Status { user_id, active } => {
            admin::change_status(&ctx.api, &ctx.session, user_id, active).await?
        }
        AdminSubcommand::Activity { page } => {
            let activity = admin::load_activity(&ctx.api, &ctx.session, page).await?;
            return print_json(&activity);
        }
    };
    print_json(&DashboardView::from(&dashboard))
}

#[derive(Serialize)]
struct DashboardView<'a> {
    stats: &'a accounts::types::AdminStats,
    users: &'a [accounts::types::AdminUser],
    page: u32,
    pages: u32,
    total: u64,
}

impl<'a> From<&'a admin::Dashboard> for DashboardView<'a> {
    fn from(dashboard: &'a admin::Dashboard) -> Self {
        Self {
            stats: &dashboard.stats,
            users: &dashboard.users,
            page: dashboard.page,
            pages: dashboard.pages,
            total: dashboard.total,
        }
    }
}

// =============================================================================
// SETTINGS, EMAIL, CHAT
// =============================================================================

fn run_settings(ctx: &CliContext, cmd: SettingsSubcommand) -> Result<(), CliError> {
    match cmd {
        SettingsSubcommand::Show => match settings::load(&ctx.session)? {
            Some(user) => print_json(&user),
            None => {
                println!("signed in; no cached profile");
                Ok(())
            }
        },
        SettingsSubcommand::DeleteAccount { yes } => {
            match settings::delete_account(&ctx.session, yes) {
                Some(redirect) => {
                    println!("local session removed");
                    print_redirect(redirect);
                }
                None => println!("cancelled; pass --yes to delete the account"),
            }
            Ok(())
        }
    }
}

async fn run_email(ctx: &CliContext, cmd: EmailSubcommand) -> Result<(), CliError> {
    let email = ctx.api.email();
    let sent = match &cmd {
        EmailSubcommand::Welcome { to, name } => {
            let name = register::welcome_name(name.as_deref());
            email.welcome(to, name, &ctx.origin).await
        }
        EmailSubcommand::PasswordChanged { to } => email.password_changed(to).await,
    };
    sent.map_err(Failure::from)?;
    println!("sent");
    Ok(())
}

async fn run_chat(ctx: &CliContext, message: &str) -> Result<(), CliError> {
    let mut conversation = home::Conversation::new();
    if !message.trim().is_empty() {
        if let Some(reply) = conversation.send(&ctx.api, message).await? {
            println!("{}", reply.reply);
        }
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        match conversation.send(&ctx.api, &line).await {
            Ok(Some(reply)) => println!("{}", reply.reply),
            Ok(None) => {}
            Err(failure) => eprintln!("{}", describe_failure(&failure)),
        }
    }
    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_signed_in(ctx: &CliContext) {
    if let Some(user) = ctx.session.user() {
        println!("signed in as {} <{}>", user.display_name(), user.email);
    }
}

fn print_redirect(redirect: Redirect) {
    println!("{}", describe_redirect(redirect));
}

fn describe_redirect(redirect: Redirect) -> String {
    match redirect.delay {
        Some(delay) => format!("next: {} (after {} ms)", redirect.route, delay.as_millis()),
        None => format!("next: {}", redirect.route),
    }
}

/// The failure's message, or what to do instead for a bare redirect.
fn describe_failure(failure: &Failure) -> String {
    match (&failure.message, failure.redirect) {
        (Some(message), Some(redirect)) => format!("{message} ({})", describe_redirect(redirect)),
        (Some(message), None) => message.clone(),
        (None, Some(redirect)) if redirect.route == Route::Login => {
            "not signed in; run `accounts login` first".to_owned()
        }
        (None, _) => failure.to_string(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
