use std::time::Duration;

use accounts::config::DEFAULT_AUTH_URL;

use super::*;

#[test]
fn parses_nested_subcommands() {
    let cli = Cli::try_parse_from(["accounts", "admin", "role", "42", "moderator"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::Admin(AdminCommand { command: AdminSubcommand::Role { user_id: 42, role: Role::Moderator } })
    ));

    let cli = Cli::try_parse_from(["accounts", "admin", "status", "42", "--active", "false"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::Admin(AdminCommand { command: AdminSubcommand::Status { user_id: 42, active: false } })
    ));

    let cli = Cli::try_parse_from(["accounts", "oauth", "begin", "github"]).unwrap();
    assert!(matches!(
        cli.command,
        Command::OAuth(OAuthCommand { command: OAuthSubcommand::Begin { provider: OAuthProvider::Github } })
    ));
}

#[test]
fn rejects_unknown_role_and_provider() {
    assert!(Cli::try_parse_from(["accounts", "admin", "role", "1", "root"]).is_err());
    assert!(Cli::try_parse_from(["accounts", "oauth", "begin", "gitlab"]).is_err());
}

#[test]
fn endpoint_flags_override_defaults() {
    let cli = Cli::try_parse_from([
        "accounts",
        "--admin-url",
        "https://admin.local/fn/",
        "--chat-url",
        "https://chat.local/fn",
        "--reveal-test-secrets",
        "false",
        "status",
    ])
    .unwrap();

    let config = cli.endpoints.config().unwrap();
    assert_eq!(config.admin_url, "https://admin.local/fn");
    assert_eq!(config.chat_url.as_deref(), Some("https://chat.local/fn"));
    assert!(!config.reveal_test_secrets);
    assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
}

#[test]
fn malformed_endpoint_is_a_config_error() {
    let args = EndpointArgs { auth_url: Some("not a url".to_owned()), ..EndpointArgs::default() };
    assert!(args.config().is_err());
}

#[test]
fn lookup_ignores_unknown_keys() {
    let args = EndpointArgs { email_url: Some("https://mail.local".to_owned()), ..EndpointArgs::default() };
    assert_eq!(args.lookup(EMAIL_URL_VAR).as_deref(), Some("https://mail.local"));
    assert_eq!(args.lookup("HOME"), None);
}

#[test]
fn reset_token_from_token_or_link() {
    assert_eq!(reset_token_arg(" abc123 ").as_deref(), Some("abc123"));
    assert_eq!(
        reset_token_arg("http://localhost:5173/reset-password?token=abc123").as_deref(),
        Some("abc123")
    );
    assert_eq!(reset_token_arg("http://localhost:5173/reset-password?x=1"), None);
    assert_eq!(reset_token_arg("  "), None);
}

#[test]
fn profile_update_keeps_unspecified_fields() {
    let current = ProfileUpdate {
        first_name: "Анна".to_owned(),
        last_name: "Петрова".to_owned(),
        avatar_url: "https://example.com/a.jpg".to_owned(),
    };
    let merged = merge_profile(current, None, Some("Иванова".to_owned()), Some(String::new()));
    assert_eq!(merged.first_name, "Анна");
    assert_eq!(merged.last_name, "Иванова");
    assert_eq!(merged.avatar_url, "");
}

#[test]
fn failures_read_as_instructions() {
    let signed_out = Failure::redirect(Redirect::now(Route::Login));
    assert_eq!(describe_failure(&signed_out), "not signed in; run `accounts login` first");

    let refused = Failure::message("Admin access required")
        .with_redirect(Redirect::after(Route::Profile, Duration::from_secs(2)));
    assert_eq!(describe_failure(&refused), "Admin access required (next: /profile (after 2000 ms))");

    assert_eq!(CliError::from(Failure::message("Invalid credentials")).to_string(), "Invalid credentials");
}

#[test]
fn storage_failures_surface_through_flow_errors() {
    let failure = Failure::from(accounts::StorageError::Access(".accounts-session.json: read-only".to_owned()));
    let err = CliError::from(failure);
    assert!(matches!(err, CliError::Flow(_)));
    assert_eq!(err.to_string(), accounts::flows::STORAGE_FAILED);
}
