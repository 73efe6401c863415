use crate::schema::{user_tokens, users};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rocket::serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_DEVELOPER: &str = "developer";

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub is_active: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub is_active: bool,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = user_tokens)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserToken {
    pub id: i32,
    pub user_id: i32,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
    pub is_active: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = user_tokens)]
pub struct NewUserToken {
    pub user_id: i32,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
    pub is_active: bool,
}

impl NewUser {
    pub fn new(
        username: String,
        email: String,
        password: String,
        role: &str,
    ) -> Result<Self, bcrypt::BcryptError> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        let now = chrono::Utc::now().naive_utc();

        Ok(Self {
            username,
            email,
            password_hash,
            role: role.to_string(),
            created_at: now,
            updated_at: now,
            is_active: true,
        })
    }
}

impl User {
    pub fn verify_password(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(password, &self.password_hash)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

impl NewUserToken {
    pub fn new_auth_token(user_id: i32) -> Self {
        let now = chrono::Utc::now().naive_utc();

        Self {
            user_id,
            token: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: Some(now + chrono::Duration::days(30)),
            is_active: true,
        }
    }
}
