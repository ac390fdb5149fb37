use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::exam::Actor;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id.
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64> {
        self.sub
            .parse()
            .map_err(|_| Error::Unauthorized("token subject is not a user id".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .map_or(false, |r| r.eq_ignore_ascii_case(ADMIN_ROLE))
    }

    pub fn actor(&self) -> Result<Actor> {
        if self.is_admin() {
            Ok(Actor::Admin)
        } else {
            Ok(Actor::User(self.user_id()?))
        }
    }

    /// The user an operation targets: the subject itself, or any user when
    /// the caller is an admin.
    pub fn target_user(&self, requested: Option<i64>) -> Result<i64> {
        match requested {
            None => self.user_id(),
            Some(id) if self.is_admin() => Ok(id),
            Some(id) if self.user_id()? == id => Ok(id),
            Some(_) => Err(Error::Forbidden(
                "user_id differs from the authenticated user".to_string(),
            )),
        }
    }
}

fn reject(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error, "family": "access" }))).into_response()
}

fn bearer_claims(req: &Request) -> std::result::Result<Claims, Response> {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Err(reject(StatusCode::UNAUTHORIZED, "missing_authorization"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(reject(StatusCode::UNAUTHORIZED, "bad_authorization"));
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(reject(StatusCode::UNAUTHORIZED, "unsupported_scheme"));
    };

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| reject(StatusCode::UNAUTHORIZED, "invalid_token"))
}

pub async fn require_bearer_auth(mut req: Request, next: Next) -> Response {
    match bearer_claims(&req) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(resp) => resp,
    }
}

pub async fn require_admin(mut req: Request, next: Next) -> Response {
    match bearer_claims(&req) {
        Ok(claims) if claims.is_admin() => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Ok(claims) => {
            tracing::warn!(sub = %claims.sub, "non-admin token on admin route");
            reject(StatusCode::FORBIDDEN, "forbidden")
        }
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: Option<&str>) -> Claims {
        Claims {
            sub: sub.into(),
            exp: usize::MAX,
            role: role.map(String::from),
        }
    }

    #[test]
    fn users_may_only_target_themselves() {
        let c = claims("7", None);
        assert_eq!(c.target_user(None).unwrap(), 7);
        assert_eq!(c.target_user(Some(7)).unwrap(), 7);
        assert!(matches!(c.target_user(Some(8)), Err(Error::Forbidden(_))));
        assert_eq!(c.actor().unwrap(), Actor::User(7));
    }

    #[test]
    fn admins_may_target_anyone() {
        let c = claims("1", Some("Admin"));
        assert_eq!(c.target_user(Some(99)).unwrap(), 99);
        assert_eq!(c.actor().unwrap(), Actor::Admin);
    }

    #[test]
    fn non_numeric_subject_is_unauthorized() {
        assert!(matches!(
            claims("alice", None).user_id(),
            Err(Error::Unauthorized(_))
        ));
    }
}
