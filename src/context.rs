use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{
    perm::{self, Action, Role},
    token::{Claims, TokenError},
    AppState, Response,
};

/// Who is calling and from which login session. Every protected handler
/// takes this explicitly; nothing about the caller is kept anywhere else.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub employee_code: String,
    pub name: String,
    pub role: Role,
    pub center: Option<String>,
    pub sid: String,
}

impl RequestContext {
    pub fn require(&self, action: Action) -> Result<(), Response> {
        perm::require(self.role, action)
    }

    /// The caller's center, which team-lead pages cannot work without.
    pub fn center(&self) -> Result<&str, Response> {
        self.center
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Response::not_exist("No center is assigned to your account."))
    }
}

impl From<Claims> for RequestContext {
    fn from(claims: Claims) -> Self {
        Self {
            employee_code: claims.sub,
            name: claims.name,
            role: claims.role,
            center: claims.center,
            sid: claims.sid,
        }
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(TokenError::Missing)?;
        let claims = state.key.verify(token)?;
        if !state.sessions.is_live(&claims.sid, &claims.sub) {
            return Err(TokenError::Revoked.into());
        }
        Ok(claims.into())
    }
}
