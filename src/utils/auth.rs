use anyhow::{Result, anyhow};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Lifetime of a file download link
pub const DOWNLOAD_TOKEN_MINUTES: i64 = 60;

pub const DOWNLOAD_TOKEN_TYPE: &str = "download";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: usize,
    pub jti: String,
}

/// Claims of a signed download link scoped to one file record
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DownloadClaims {
    pub sub: String, // file_records.id
    #[serde(rename = "type")]
    pub token_type: String,
    pub exp: usize,
}

fn expiry_after(lifetime_minutes: i64) -> Result<usize> {
    let expiration = TimeDelta::try_minutes(lifetime_minutes)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| anyhow!("token expiration out of range"))?
        .timestamp();
    Ok(expiration.max(0) as usize)
}

pub fn create_jwt(user_id: &str, secret: &str, lifetime_minutes: i64) -> Result<String> {
    let claims = Claims {
        sub: user_id.to_owned(),
        exp: expiry_after(lifetime_minutes)?,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn create_download_token(file_id: i32, secret: &str) -> Result<String> {
    sign_download_claims(
        file_id,
        secret,
        expiry_after(DOWNLOAD_TOKEN_MINUTES)?,
    )
}

fn sign_download_claims(file_id: i32, secret: &str, exp: usize) -> Result<String> {
    let claims = DownloadClaims {
        sub: file_id.to_string(),
        token_type: DOWNLOAD_TOKEN_TYPE.to_string(),
        exp,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

/// Verify signature, expiry and token type; returns the file record id.
pub fn validate_download_token(token: &str, secret: &str) -> Result<i32> {
    let token_data = decode::<DownloadClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    let claims = token_data.claims;
    if claims.token_type != DOWNLOAD_TOKEN_TYPE {
        return Err(anyhow!("Invalid token type: {}", claims.token_type));
    }

    claims
        .sub
        .parse::<i32>()
        .map_err(|_| anyhow!("Invalid file id in download token"))
}
