use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::core::shared::enums::Role;
use crate::core::shared::error::CrmError;
use crate::core::shared::state::AppState;
use crate::security::jwt::{extract_bearer_token, Claims, TokenService};

// ============================================================================
// Principal
// ============================================================================

/// Authenticated caller attached to the request by
/// [`authentication_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: String,
    pub role: Role,
    pub user_id: i64,
}

impl Principal {
    pub fn new(identity: impl Into<String>, role: Role, user_id: i64) -> Self {
        Self {
            identity: identity.into(),
            role,
            user_id,
        }
    }

    pub fn from_claims(claims: Claims) -> Self {
        Self::new(claims.sub, claims.role, claims.user_id)
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The single authority string carried by this principal.
    pub fn authority(&self) -> String {
        format!("ROLE_{}", self.role.as_str())
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), CrmError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(CrmError::Forbidden(format!(
                "Role {} is not allowed to perform this action",
                self.role
            )))
        }
    }

    pub fn require_staff(&self) -> Result<(), CrmError> {
        self.require_any(&[Role::Employee, Role::Admin])
    }

    pub fn require_admin(&self) -> Result<(), CrmError> {
        self.require_any(&[Role::Admin])
    }

    /// Staff may act on any customer; a customer only on themself.
    pub fn require_customer_access(&self, customer_id: i64) -> Result<(), CrmError> {
        if self.is_staff() || (self.role == Role::Customer && self.user_id == customer_id) {
            Ok(())
        } else {
            Err(CrmError::Forbidden(
                "Customers may only access their own records".to_string(),
            ))
        }
    }
}

// ============================================================================
// Auth gate
// ============================================================================

const PUBLIC_PATH_PREFIXES: &[&str] = &["/api/auth/"];
const PUBLIC_PATHS: &[&str] = &["/api/health"];

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PATH_PREFIXES.iter().any(|p| path.starts_with(p))
}

pub fn principal_from_headers(headers: &HeaderMap, tokens: &TokenService) -> Option<Principal> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = extract_bearer_token(header)?;
    tokens.verify(token).map(Principal::from_claims)
}

/// Populates the request with a [`Principal`] when a valid bearer token is
/// present.
///
/// Never rejects: a missing or invalid token simply leaves the request
/// unauthenticated and each handler decides whether that is acceptable.
/// Allow-listed paths are passed through untouched, and a principal that is
/// already attached is kept.
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    if request.extensions().get::<Principal>().is_none() {
        match principal_from_headers(request.headers(), &state.tokens) {
            Some(principal) => {
                debug!(
                    "Authenticated {} as {}",
                    principal.identity,
                    principal.authority()
                );
                request.extensions_mut().insert(principal);
            }
            None if request.headers().contains_key(AUTHORIZATION) => {
                debug!("Ignoring unusable Authorization header on {}", request.uri().path());
            }
            None => {}
        }
    }

    next.run(request).await
}

// ============================================================================
// Axum Extractors
// ============================================================================

/// Rejects with 401 when the gate attached no principal. Use
/// `Option<Principal>` for endpoints that also serve anonymous callers.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = CrmError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| CrmError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration;

    fn tokens() -> TokenService {
        TokenService::new(
            b"this-is-a-very-long-secret-key-for-testing-purposes-only",
            "crmserver",
            Duration::minutes(5),
            0,
        )
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/api/health"));
        assert!(is_public_path("/api/auth/login/customer"));
        assert!(is_public_path("/api/auth/register/customer"));
        assert!(!is_public_path("/api/healthz"));
        assert!(!is_public_path("/api/authx"));
        assert!(!is_public_path("/api/resolved-tickets"));
    }

    #[test]
    fn test_principal_from_valid_header() {
        let tokens = tokens();
        let token = tokens.issue("e@x.io", Role::Employee, 5).expect("issue");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );

        let principal = principal_from_headers(&headers, &tokens).expect("principal");
        assert_eq!(principal, Principal::new("e@x.io", Role::Employee, 5));
        assert_eq!(principal.authority(), "ROLE_EMPLOYEE");
    }

    #[test]
    fn test_principal_absent_for_bad_headers() {
        let tokens = tokens();
        let mut headers = HeaderMap::new();
        assert!(principal_from_headers(&headers, &tokens).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer garbage"));
        assert!(principal_from_headers(&headers, &tokens).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert!(principal_from_headers(&headers, &tokens).is_none());
    }

    #[test]
    fn test_require_any() {
        let customer = Principal::new("c@x.io", Role::Customer, 9);
        assert!(customer.require_any(&[Role::Customer]).is_ok());
        assert!(matches!(customer.require_staff(), Err(CrmError::Forbidden(_))));

        let admin = Principal::new("a@x.io", Role::Admin, 1);
        assert!(admin.require_staff().is_ok());
        assert!(admin.require_admin().is_ok());
        assert!(Principal::new("e@x.io", Role::Employee, 2)
            .require_admin()
            .is_err());
    }

    #[test]
    fn test_customer_access() {
        let customer = Principal::new("c@x.io", Role::Customer, 9);
        assert!(customer.require_customer_access(9).is_ok());
        assert!(customer.require_customer_access(10).is_err());
        assert!(Principal::new("e@x.io", Role::Employee, 9)
            .require_customer_access(10)
            .is_ok());
    }
}
