use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

/// Claims of access tokens minted by the external identity service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // user_id
    pub role: String,
    pub exp: i64,   // expiration timestamp
    pub iat: i64,   // issued at timestamp
}

// Verifies bearer tokens for the admin surface; issuing them is not our job
pub struct AdminAuth {
    jwt_secret: String,
}

impl AdminAuth {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = jsonwebtoken::Validation::default();

        validation.leeway = 10;
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::error!("Error decoding token: {:?}", err);
            err
        })?;

        Ok(token_data.claims)
    }

    /// Returns the admin's user id when the token is valid and carries the admin role.
    pub fn verify_admin(&self, token: &str) -> Option<Uuid> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        match self.verify_token(token) {
            Ok(claims) if claims.role == ADMIN_ROLE => Some(claims.sub),
            Ok(claims) => {
                tracing::warn!("Non-admin token presented by user: {}", claims.sub);
                None
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn token(secret: &str, role: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: role.to_string(),
            exp: now + 600,
            iat: now,
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token should encode")
    }

    #[test]
    fn accepts_admin_bearer_token() {
        let auth = AdminAuth::new("secret".to_string());
        let header = format!("Bearer {}", token("secret", ADMIN_ROLE));
        assert!(auth.verify_admin(&header).is_some());
    }

    #[test]
    fn rejects_wrong_role_and_wrong_secret() {
        let auth = AdminAuth::new("secret".to_string());
        assert!(auth.verify_admin(&token("secret", "customer")).is_none());
        assert!(auth.verify_admin(&token("other", ADMIN_ROLE)).is_none());
    }
}
