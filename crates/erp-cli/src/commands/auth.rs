//! Authentication commands.

use super::prompt;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use client_config_and_utils::{Config, Paths};
use serde_json::json;
use session_engine::{AuthFacade, SessionError, SessionState, SessionUser};
use std::time::Duration;

/// Wrong codes accepted before giving up.
const MAX_CODE_ATTEMPTS: usize = 3;

/// Login with an emailed one-time code.
pub async fn login(facade: &AuthFacade, email: Option<String>, format: &OutputFormat) -> Result<()> {
    if let SessionState::Authenticated { user } = facade.state() {
        output::print_success(&format!("Already logged in as {}", user.email), format);
        return Ok(());
    }

    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let challenge = facade.request_otp(&email).await?;
    println!(
        "Code sent to {} (valid until {})",
        challenge.email,
        expiry_label(challenge.valid_for)
    );

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = rpassword::prompt_password("Code: ")?;
        match facade.verify_otp(&challenge.email, &code).await {
            Ok(user) => {
                output::print_success(&format!("Logged in as {}", describe(&user)), format);
                return Ok(());
            }
            Err(e @ SessionError::Validation { .. }) if attempt < MAX_CODE_ATTEMPTS => {
                output::print_error(&e.user_message(), format);
            }
            Err(e) => return Err(e.into()),
        }
    }

    bail!("Too many failed attempts")
}

/// Logout and clear the stored session.
pub async fn logout(facade: &AuthFacade, format: &OutputFormat) -> Result<()> {
    facade.logout().await?;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Show the session state, optionally confirming it with the server.
pub async fn status(
    facade: &AuthFacade,
    config: &Config,
    paths: &Paths,
    verify: bool,
    format: &OutputFormat,
) -> Result<()> {
    let state = if verify {
        match facade.validate_session().await {
            Ok(state) => state,
            Err(e) if e.is_transient() => {
                output::print_error(&e.user_message(), format);
                facade.state()
            }
            Err(_) => facade.state(),
        }
    } else {
        facade.state()
    };

    match format {
        OutputFormat::Text => {
            output::print_row("Server", &config.api_base_url);
            output::print_row("Auth", state.name());
            if let Some(user) = state.user() {
                output::print_row("User", &describe(user));
                output::print_row("Role", &format!("{:?}", user.role));
            }
            output::print_row("Store", &paths.credentials_file().display().to_string());
        }
        OutputFormat::Json => {
            output::print_json(&json!({
                "server": config.api_base_url,
                "logged_in": state.is_authenticated(),
                "session": state,
                "store": paths.credentials_file(),
            }))?;
        }
    }

    Ok(())
}

/// Fetch and print the current user's profile.
pub async fn whoami(facade: &AuthFacade, format: &OutputFormat) -> Result<()> {
    if !facade.is_authenticated() {
        bail!("Not logged in. Run 'erp login' first");
    }

    let user = facade.get_current_user().await?;
    match format {
        OutputFormat::Text => {
            output::print_heading(&user.display_name());
            output::print_row("ID", &user.id.to_string());
            output::print_row("Email", &user.email);
            output::print_row("Role", &format!("{:?}", user.role));
            for (key, value) in &user.profile {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                output::print_row(key, &rendered);
            }
        }
        OutputFormat::Json => output::print_json(&user)?,
    }
    Ok(())
}

fn describe(user: &SessionUser) -> String {
    let name = user.display_name();
    if name == user.email {
        name
    } else {
        format!("{} <{}>", name, user.email)
    }
}

fn expiry_label(valid_for: Duration) -> String {
    match chrono::Duration::from_std(valid_for) {
        Ok(delta) => (chrono::Local::now() + delta).format("%H:%M").to_string(),
        Err(_) => "unknown".to_string(),
    }
}
