//! Parsing of `otpauth://` URIs stored in 1Password one-time password fields.
//!
//! The label of these URIs is `Issuer:account@<account id>`, but the account
//! part may itself contain an `@` (an email address), in which case the
//! account id follows the second `@`:
//!
//! ```text
//! otpauth://totp/AWS:admin@123456789012?secret=ABC&issuer=Amazon
//! otpauth://totp/AWS:jane@example.com@123456789012?secret=ABC&issuer=Amazon
//! ```

use thiserror::Error;

/// Account id and shared secret pulled out of an OTP URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpAccount {
    pub account_id: String,
    pub secret: String,
}

impl OtpAccount {
    /// True when the account id is purely numeric (an AWS-style account number).
    pub fn is_numeric(&self) -> bool {
        is_numeric(&self.account_id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpUriError {
    #[error("OTP URI has no '@' separated account id")]
    MissingAccount,
    #[error("OTP URI has no query string after the account id")]
    MissingQuery,
    #[error("OTP URI query has no secret value")]
    MissingSecret,
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Extract the account id and secret from an OTP URI.
pub fn parse_otp_uri(uri: &str) -> Result<OtpAccount, OtpUriError> {
    let uri = uri.trim();
    let mut segments = uri.split('@').skip(1);
    let first = segments.next().ok_or(OtpUriError::MissingAccount)?;

    let segment = if is_numeric(account_part(first)) {
        first
    } else {
        segments.next().unwrap_or(first)
    };

    let account_id = account_part(segment);
    if account_id.is_empty() {
        return Err(OtpUriError::MissingAccount);
    }

    let (_, query) = segment.split_once('?').ok_or(OtpUriError::MissingQuery)?;
    let secret = secret_from_query(query).ok_or(OtpUriError::MissingSecret)?;

    Ok(OtpAccount {
        account_id: account_id.to_string(),
        secret: secret.to_string(),
    })
}

fn account_part(segment: &str) -> &str {
    segment.split('?').next().unwrap_or_default()
}

/// The `secret` parameter, or the first parameter's value when no key matches.
fn secret_from_query(query: &str) -> Option<&str> {
    let params: Vec<(&str, &str)> = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect();

    params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("secret"))
        .or_else(|| params.first())
        .map(|(_, value)| *value)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_account_id() {
        let account = parse_otp_uri(
            "otpauth://totp/Amazon%20Web%20Services:admin@123456789012?secret=JBSWY3DPEHPK3PXP&issuer=Amazon%20Web%20Services\n",
        )
        .unwrap();
        assert_eq!(account.account_id, "123456789012");
        assert_eq!(account.secret, "JBSWY3DPEHPK3PXP");
        assert!(account.is_numeric());
    }

    #[test]
    fn test_email_in_label_uses_second_segment() {
        let account = parse_otp_uri(
            "otpauth://totp/Amazon%20Web%20Services:jane@example.com@210987654321?secret=KRSXG5CTMVRXEZLU&issuer=Amazon",
        )
        .unwrap();
        assert_eq!(account.account_id, "210987654321");
        assert_eq!(account.secret, "KRSXG5CTMVRXEZLU");
    }

    #[test]
    fn test_named_account_id() {
        let account =
            parse_otp_uri("otpauth://totp/Label:user@domain?secret=X&issuer=Y").unwrap();
        assert_eq!(account.account_id, "domain");
        assert_eq!(account.secret, "X");
        assert!(!account.is_numeric());
    }

    #[test]
    fn test_named_account_id_after_email() {
        let account =
            parse_otp_uri("otpauth://totp/Label:user@example.com@my-alias?secret=S3CR3T").unwrap();
        assert_eq!(account.account_id, "my-alias");
        assert_eq!(account.secret, "S3CR3T");
    }

    #[test]
    fn test_secret_not_first_parameter() {
        let account =
            parse_otp_uri("otpauth://totp/AWS:root@111122223333?issuer=Amazon&secret=ABC").unwrap();
        assert_eq!(account.secret, "ABC");
    }

    #[test]
    fn test_missing_pieces() {
        assert_eq!(
            parse_otp_uri("otpauth://totp/NoAccount?secret=X"),
            Err(OtpUriError::MissingAccount)
        );
        assert_eq!(
            parse_otp_uri("otpauth://totp/AWS:root@123456"),
            Err(OtpUriError::MissingQuery)
        );
        assert_eq!(
            parse_otp_uri("otpauth://totp/AWS:root@123456?secret="),
            Err(OtpUriError::MissingSecret)
        );
        assert_eq!(
            parse_otp_uri("otpauth://totp/AWS:root@?secret=X"),
            Err(OtpUriError::MissingAccount)
        );
    }
}
