//! Bearer-token identity.
//!
//! Every incident operation requires a verified [`Subject`]. Tokens are HS256
//! JWTs carrying `sub`, `iat` and `exp`; they are issued when a user records
//! consent.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// An authenticated identity extracted from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    /// Wrap a subject identifier.
    ///
    /// The request surface only obtains subjects from an [`IdentityVerifier`];
    /// callers driving [`IncidentEngine`](crate::engine::IncidentEngine)
    /// directly are trusted to name the caller themselves.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The subject identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides whether a bearer token is valid and who it belongs to.
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token`, yielding its subject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for any invalid, expired or malformed token.
    fn verify(&self, token: &str) -> Result<Subject>;
}

/// Mints bearer tokens for a subject.
pub trait TokenIssuer: Send + Sync {
    /// Issue a token for `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenIssue`] if signing fails.
    fn issue(&self, subject: &str) -> Result<String>;
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// HS256 token verifier and issuer.
#[derive(Clone)]
pub struct JwtIdentity {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for JwtIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIdentity")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtIdentity {
    /// Create an identity service signing with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the secret is empty or the ttl
    /// is not positive.
    pub fn new(secret: &str, ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::ConfigValidation {
                message: "jwt_secret must not be empty".to_string(),
            });
        }
        if ttl <= Duration::zero() {
            return Err(Error::ConfigValidation {
                message: "token lifetime must be positive".to_string(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    /// Create an identity service from the `[auth]` configuration section.
    ///
    /// # Errors
    ///
    /// See [`JwtIdentity::new`].
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(
            &config.jwt_secret,
            Duration::hours(i64::from(config.token_ttl_hours)),
        )
    }

    /// Sign arbitrary claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenIssue`] if signing fails.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| Error::TokenIssue(e.to_string()))
    }
}

impl TokenIssuer for JwtIdentity {
    fn issue(&self, subject: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }
}

impl IdentityVerifier for JwtIdentity {
    fn verify(&self, token: &str) -> Result<Subject> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            Error::Unauthorized
        })?;

        if data.claims.sub.is_empty() {
            return Err(Error::Unauthorized);
        }
        Ok(Subject(data.claims.sub))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Verify an `Authorization` header value end to end.
///
/// # Errors
///
/// Returns [`Error::Unauthorized`] when the header is missing, not a bearer
/// credential, or carries an invalid token.
pub fn authenticate(verifier: &dyn IdentityVerifier, header: Option<&str>) -> Result<Subject> {
    let token = bearer_token(header).ok_or(Error::Unauthorized)?;
    verifier.verify(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> JwtIdentity {
        JwtIdentity::new("test-secret", Duration::hours(24)).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let identity = identity();
        let token = identity.issue("alice").unwrap();

        let subject = identity.verify(&token).unwrap();
        assert_eq!(subject.as_str(), "alice");
        assert_eq!(subject.to_string(), "alice");
    }

    #[test]
    fn test_constructed_subject_matches_verified() {
        let identity = identity();
        let token = identity.issue("alice").unwrap();

        assert_eq!(identity.verify(&token).unwrap(), Subject::new("alice"));
        assert_ne!(Subject::new("alice"), Subject::new("mallory"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = identity().issue("alice").unwrap();
        let other = JwtIdentity::new("other-secret", Duration::hours(1)).unwrap();

        assert!(other.verify(&token).unwrap_err().is_unauthorized());
    }

    #[test]
    fn test_expired_token_rejected() {
        let identity = identity();
        let past = Utc::now() - Duration::hours(2);
        let token = identity
            .sign(&Claims {
                sub: "alice".to_string(),
                iat: past.timestamp(),
                exp: (past + Duration::minutes(5)).timestamp(),
            })
            .unwrap();

        assert!(identity.verify(&token).unwrap_err().is_unauthorized());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let identity = identity();
        let now = Utc::now();
        let token = identity
            .sign(&Claims {
                sub: String::new(),
                iat: now.timestamp(),
                exp: (now + Duration::hours(1)).timestamp(),
            })
            .unwrap();

        assert!(identity.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(identity().verify("not-a-jwt").unwrap_err().is_unauthorized());
    }

    #[test]
    fn test_new_rejects_empty_secret() {
        assert!(JwtIdentity::new("", Duration::hours(1)).is_err());
        assert!(JwtIdentity::new("s", Duration::zero()).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = AuthConfig::default();
        let identity = JwtIdentity::from_config(&config).unwrap();
        let token = identity.issue("bob").unwrap();
        assert_eq!(identity.verify(&token).unwrap().as_str(), "bob");
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn test_authenticate() {
        let identity = identity();
        let header = format!("Bearer {}", identity.issue("alice").unwrap());

        let subject = authenticate(&identity, Some(&header)).unwrap();
        assert_eq!(subject.as_str(), "alice");

        assert!(authenticate(&identity, None).unwrap_err().is_unauthorized());
        assert!(authenticate(&identity, Some("Bearer nope"))
            .unwrap_err()
            .is_unauthorized());
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug_str = format!("{:?}", identity());
        assert!(debug_str.contains("JwtIdentity"));
        assert!(!debug_str.contains("test-secret"));
    }
}
