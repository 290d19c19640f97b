//! Google Calendar connect flow.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use url::Url;
use voxcal_providers::ConnectionStatus;
use voxcal_providers::google::PkceFlow;

use super::Context;
use crate::error::{ClientError, ClientResult};

/// Runs the OAuth consent flow and stores the resulting tokens.
///
/// The consent page redirects to the configured redirect URI; the user
/// pastes either the full redirect URL or just the `code` value back into
/// the terminal.
pub async fn connect(ctx: &Context, force: bool, no_browser: bool) -> ClientResult<()> {
    if !force
        && let ConnectionStatus::Connected { .. } =
            ctx.credentials.connection_status(&ctx.user_id).await?
    {
        println!("Google Calendar is already connected for {}.", ctx.user_id);
        println!("Use --force to reconnect.");
        return Ok(());
    }

    let pkce = PkceFlow::new();
    let redirect_uri = ctx.google.redirect_uri.as_str();
    let auth_url = ctx
        .oauth
        .authorization_url(&pkce, redirect_uri, &ctx.google.scopes);

    println!("Authorize voxcal to access your calendar:");
    println!();
    println!("  {auth_url}");
    println!();
    if !no_browser && let Err(e) = open::that(&auth_url) {
        warn!(error = %e, "could not open browser");
    }

    println!("After approving, paste the URL you were redirected to (or the code):");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    let code = parse_authorization_response(&line, &pkce.state)?;

    let grant = ctx
        .oauth
        .exchange_code(&code, &pkce.verifier, redirect_uri)
        .await?;
    let credential = ctx.credentials.store_initial(&ctx.user_id, grant).await?;

    info!(user_id = %ctx.user_id, "calendar connected");
    println!();
    println!(
        "Connected. Access token valid until {}.",
        credential.expires_at.to_rfc3339()
    );
    Ok(())
}

/// Extracts the authorization code from a pasted redirect URL or bare code.
///
/// A pasted URL must carry the flow's `state`; an `error` parameter means
/// the user declined consent.
fn parse_authorization_response(input: &str, expected_state: &str) -> ClientResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ClientError::config("no authorization code entered"));
    }

    let Ok(url) = Url::parse(input) else {
        return Ok(input.to_string());
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(ClientError::AuthRequired(format!(
                    "authorization denied: {value}"
                )));
            }
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(ClientError::config(
            "state mismatch in redirect URL; start the flow again",
        ));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| ClientError::config("redirect URL has no authorization code"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_code_is_accepted() {
        let code = parse_authorization_response("  4/0AbCdEf\n", "st").unwrap();
        assert_eq!(code, "4/0AbCdEf");
    }

    #[test]
    fn code_from_redirect_url() {
        let code = parse_authorization_response(
            "http://127.0.0.1:8085/callback?state=st&code=4%2F0AbC&scope=calendar",
            "st",
        )
        .unwrap();
        assert_eq!(code, "4/0AbC");
    }

    #[test]
    fn state_must_match() {
        let err = parse_authorization_response(
            "http://127.0.0.1:8085/callback?state=other&code=abc",
            "st",
        )
        .unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
    }

    #[test]
    fn denied_consent_is_reported() {
        let err = parse_authorization_response(
            "http://127.0.0.1:8085/callback?error=access_denied&state=st",
            "st",
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::AuthRequired(_)));
    }

    #[test]
    fn empty_input_errors() {
        assert!(parse_authorization_response("\n", "st").is_err());
    }
}
