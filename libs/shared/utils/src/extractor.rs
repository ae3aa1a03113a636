use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::{Actor, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the caller's `User` in the request
/// extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Resolves the authenticated user into the actor scheduling operations run as.
pub fn actor_from_user(user: &User) -> Result<Actor, AppError> {
    Actor::try_from(user).map_err(AppError::Auth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::auth::ActorRole;

    use crate::test_utils::TestUser;

    #[test]
    fn test_actor_from_partner_user() {
        let user = TestUser::partner("p@example.com").to_user();
        let actor = actor_from_user(&user).unwrap();
        assert_eq!(actor.role, ActorRole::Partner);
        assert_eq!(actor.id.to_string(), user.id);
    }

    #[test]
    fn test_actor_from_user_with_bad_subject() {
        let mut user = TestUser::client("c@example.com").to_user();
        user.id = "service-account".to_string();
        assert!(matches!(actor_from_user(&user), Err(AppError::Auth(_))));
    }
}
