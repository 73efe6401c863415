use crate::database::DatabaseService;
use crate::error::ApiError;
use crate::models::{LoginRequest, NewUser, NewUserToken, RegisterRequest, ROLE_ADMIN, User, UserToken};
use crate::schema::{user_tokens, users};
use diesel::prelude::*;
use log::{debug, info};

/// Token issuance and lookup for the npm login surface.
pub struct AuthService;

impl AuthService {
    pub fn register_user(
        db: &DatabaseService,
        request: RegisterRequest,
        role: &str,
    ) -> Result<User, ApiError> {
        let mut conn = db.get_connection().map_err(|e| {
            ApiError::InternalServerError(format!("Database connection error: {e}"))
        })?;

        let taken = users::table
            .filter(
                users::username
                    .eq(&request.name)
                    .or(users::email.eq(&request.email)),
            )
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;

        if let Some(existing) = taken {
            let field = if existing.username == request.name { "Username" } else { "Email" };
            return Err(ApiError::Conflict(format!("{field} already exists")));
        }

        let new_user = NewUser::new(request.name, request.email, request.password, role)
            .map_err(|e| ApiError::InternalServerError(format!("Password hashing error: {e}")))?;

        let user = diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut conn)?;

        debug!("User registered successfully: {} ({})", user.username, user.role);
        Ok(user)
    }

    /// Verifies the password and issues a fresh bearer token.
    pub fn authenticate_user(
        db: &DatabaseService,
        request: LoginRequest,
    ) -> Result<(User, String), ApiError> {
        let mut conn = db.get_connection().map_err(|e| {
            ApiError::InternalServerError(format!("Database connection error: {e}"))
        })?;

        let user = users::table
            .filter(users::username.eq(&request.name))
            .filter(users::is_active.eq(true))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

        let password_valid = user.verify_password(&request.password).map_err(|e| {
            ApiError::InternalServerError(format!("Password verification error: {e}"))
        })?;

        if !password_valid {
            return Err(ApiError::Unauthorized(
                "Invalid username or password".to_string(),
            ));
        }

        let new_token = NewUserToken::new_auth_token(user.id);
        let token_value = new_token.token.clone();

        diesel::insert_into(user_tokens::table)
            .values(&new_token)
            .execute(&mut conn)?;

        debug!("User authenticated successfully: {}", user.username);
        Ok((user, token_value))
    }

    pub fn validate_token(db: &DatabaseService, token: &str) -> Result<User, ApiError> {
        let mut conn = db.get_connection().map_err(|e| {
            ApiError::InternalServerError(format!("Database connection error: {e}"))
        })?;

        let user_token = user_tokens::table
            .filter(user_tokens::token.eq(token))
            .filter(user_tokens::is_active.eq(true))
            .select(UserToken::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        if let Some(expires_at) = user_token.expires_at {
            if chrono::Utc::now().naive_utc() > expires_at {
                return Err(ApiError::Unauthorized("Token expired".to_string()));
            }
        }

        users::table
            .filter(users::id.eq(user_token.user_id))
            .filter(users::is_active.eq(true))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| ApiError::Unauthorized("User is no longer active".to_string()))
    }

    pub fn revoke_token(db: &DatabaseService, token: &str) -> Result<bool, ApiError> {
        let mut conn = db.get_connection().map_err(|e| {
            ApiError::InternalServerError(format!("Database connection error: {e}"))
        })?;

        let revoked = diesel::update(user_tokens::table.filter(user_tokens::token.eq(token)))
            .set(user_tokens::is_active.eq(false))
            .execute(&mut conn)?;

        debug!("Revoked {revoked} token(s)");
        Ok(revoked > 0)
    }

    pub fn get_user_by_username(
        db: &DatabaseService,
        username: &str,
    ) -> Result<Option<User>, ApiError> {
        let mut conn = db.get_connection().map_err(|e| {
            ApiError::InternalServerError(format!("Database connection error: {e}"))
        })?;

        let user = users::table
            .filter(users::username.eq(username))
            .filter(users::is_active.eq(true))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(user)
    }

    /// Deletes the account; its tokens and ownership rows go with it.
    pub fn delete_user(db: &DatabaseService, username: &str) -> Result<bool, ApiError> {
        let mut conn = db.get_connection().map_err(|e| {
            ApiError::InternalServerError(format!("Database connection error: {e}"))
        })?;

        let deleted = diesel::delete(users::table.filter(users::username.eq(username)))
            .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    /// Creates the bootstrap administrator unless an account with that name exists.
    pub fn ensure_admin(
        db: &DatabaseService,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, ApiError> {
        if Self::get_user_by_username(db, username)?.is_some() {
            debug!("Admin account {username} already present");
            return Ok(None);
        }

        let user = Self::register_user(
            db,
            RegisterRequest {
                name: username.to_string(),
                email: format!("{username}@localhost"),
                password: password.to_string(),
                role: None,
            },
            ROLE_ADMIN,
        )?;
        info!("Created admin account: {username}");
        Ok(Some(user))
    }
}
