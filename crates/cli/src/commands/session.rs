//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! izaj whoami
//! IZAJ_PASSWORD=... izaj login -i maria@izaj.ph --remember
//! IZAJ_PASSWORD=... izaj register -e maria@izaj.ph --first-name Maria --last-name Santos
//! izaj logout
//! ```

use std::sync::Arc;

use izaj_core::Identity;
use izaj_storefront::StorefrontClient;
use izaj_storefront::config::ClientConfig;
use izaj_storefront::gateway::{OAuthProvider, RegisterRequest};
use izaj_storefront::services::NoopObserver;
use secrecy::SecretString;

use super::{CommandError, connect};

/// Account details collected by `izaj register`.
pub struct Registration {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub password: SecretString,
}

/// Print the current identity.
pub async fn whoami(config: &ClientConfig) -> Result<(), CommandError> {
    let client = connect(config).await?;
    match client.auth().identity() {
        Some(identity) => {
            let tier = client.sessions().active_tier();
            print_identity(&identity, &tier.to_string());
        }
        None => print_line("Not logged in"),
    }
    Ok(())
}

/// Log in and persist the session.
pub async fn login(
    config: &ClientConfig,
    identifier: &str,
    password: SecretString,
    remember: bool,
) -> Result<(), CommandError> {
    let client = connect(config).await?;
    let identity = client.auth().login(identifier, password, remember).await?;
    let tier = client.sessions().active_tier();
    print_identity(&identity, &tier.to_string());
    Ok(())
}

/// Print the third-party sign-in URL.
pub fn oauth_url(config: &ClientConfig) -> Result<(), CommandError> {
    let client = StorefrontClient::from_config(config, Arc::new(NoopObserver))?;
    let url = client.auth().login_with_provider(OAuthProvider::Google)?;
    print_line(url.as_str());
    Ok(())
}

/// Log out everywhere locally.
pub async fn logout(config: &ClientConfig) -> Result<(), CommandError> {
    let client = connect(config).await?;
    client.auth().logout().await;
    print_line("Logged out");
    Ok(())
}

/// Create an account.
pub async fn register(config: &ClientConfig, registration: Registration) -> Result<(), CommandError> {
    let client = connect(config).await?;
    let request = RegisterRequest {
        email: registration.email,
        password: registration.password,
        first_name: registration.first_name,
        last_name: registration.last_name,
        phone: registration.phone,
        address: None,
    };
    client.auth().register(&request).await?;
    print_line(&format!(
        "Account created for {}. Log in with `izaj login`",
        request.email
    ));
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_identity(identity: &Identity, tier: &str) {
    match identity.email_str() {
        Some(email) => println!("{} <{email}>", identity.full_name()),
        None => println!("{}", identity.full_name()),
    }
    println!("  id:        {}", identity.id);
    if !identity.phone.is_empty() {
        println!("  phone:     {}", identity.phone);
    }
    println!(
        "  verified:  {}",
        if identity.email_verified { "yes" } else { "no" }
    );
    if let Some(picture) = &identity.profile_picture {
        println!("  picture:   {picture}");
    }
    println!("  session:   {tier}");
}

#[allow(clippy::print_stdout)]
pub fn print_line(line: &str) {
    println!("{line}");
}
