//! Account creation and sign-in.

use std::fmt;

use chrono::NaiveDate;
use shared::{
    domain::Gender,
    protocol::{Credentials, NewAccount, TokenPair},
};
use tracing::{info, warn};

use crate::{
    error::{ClientError, Result, ValidationError},
    intake::AssetIntakeController,
    remote::RemoteData,
};

const PASSWORD_SPECIALS: &str = "!@#$%^&*";
const PASSWORD_MIN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordIssue {
    InvalidCharacters,
    TooShort,
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
}

impl fmt::Display for PasswordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PasswordIssue::InvalidCharacters => "Contains invalid characters",
            PasswordIssue::TooShort => "Minimum length 8",
            PasswordIssue::MissingUppercase => "At least one uppercase letter",
            PasswordIssue::MissingLowercase => "At least one lowercase letter",
            PasswordIssue::MissingDigit => "At least one number",
            PasswordIssue::MissingSpecial => "At least one special character (!@#$%^&*)",
        };
        f.write_str(text)
    }
}

pub fn password_issues(password: &str) -> Vec<PasswordIssue> {
    let mut issues = Vec::new();
    if !password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c))
    {
        issues.push(PasswordIssue::InvalidCharacters);
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        issues.push(PasswordIssue::TooShort);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        issues.push(PasswordIssue::MissingUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        issues.push(PasswordIssue::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push(PasswordIssue::MissingDigit);
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        issues.push(PasswordIssue::MissingSpecial);
    }
    issues
}

pub fn validate_birth_date(date: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if date > today {
        return Err(ValidationError::BirthDateInFuture);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupForm {
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub gender: Option<Gender>,
}

impl SignupForm {
    pub fn validate(&self, today: NaiveDate) -> Result<NewAccount, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if let Some(birth_date) = self.birth_date {
            validate_birth_date(birth_date, today)?;
        }
        let issues = password_issues(&self.password);
        if !issues.is_empty() {
            return Err(ValidationError::WeakPassword(issues));
        }
        if self.password != self.password_confirmation {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(NewAccount {
            name: self.name.trim().to_string(),
            birth_date: self.birth_date,
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            gender: self.gender,
        })
    }
}

/// Creates the account (multipart, with the avatar if one passed intake)
/// and then signs in with the same credentials.
pub async fn register(
    remote: &dyn RemoteData,
    form: &SignupForm,
    avatar: &mut AssetIntakeController,
) -> Result<TokenPair> {
    if avatar.has_draft() && avatar.pending_asset().is_none() {
        return Err(ValidationError::AssetNotReady.into());
    }
    let account = form.validate(chrono::Local::now().date_naive())?;
    let credentials = Credentials {
        email: account.email.clone(),
        password: account.password.clone(),
    };

    let created = remote
        .create_account(account, avatar.pending_asset())
        .await
        .map_err(|err| {
            warn!(error = %err, "account creation failed");
            ClientError::from(err)
        })?;
    info!(user_id = %created.id, "account created");
    avatar.discard();

    login(remote, credentials).await
}

pub async fn login(remote: &dyn RemoteData, credentials: Credentials) -> Result<TokenPair> {
    let tokens = remote.authenticate(credentials).await.map_err(|err| {
        warn!(error = %err, "authentication failed");
        ClientError::from(err)
    })?;
    info!("authenticated");
    Ok(tokens)
}

#[cfg(test)]
#[path = "tests/account_tests.rs"]
mod tests;
