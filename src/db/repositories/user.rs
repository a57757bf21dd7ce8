use anyhow::{Context, Result};
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    Set, SqlErr,
};
use serde::Serialize;

use crate::entities::users;

/// Full user row including credentials. Never serialized.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for UserRecord {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            full_name: model.full_name,
            avatar: model.avatar,
            cover_image: model.cover_image,
            password_hash: model.password_hash,
            refresh_token: model.refresh_token,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// User data returned to callers (without password hash or refresh token)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            full_name: record.full_name,
            avatar: record.avatar,
            cover_image: record.cover_image,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Fields required to insert a user. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub password_hash: String,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<UserRecord>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(UserRecord::from))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(UserRecord::from))
    }

    /// Matches on either column; `None` identifiers are ignored.
    pub async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>> {
        let Some(condition) = identifier_condition(username, email) else {
            return Ok(None);
        };

        let user = users::Entity::find()
            .filter(condition)
            .one(&self.conn)
            .await
            .context("Failed to query user by username or email")?;

        Ok(user.map(UserRecord::from))
    }

    /// Returns `None` when the username or email is already taken.
    pub async fn create(&self, new_user: NewUser) -> Result<Option<UserRecord>> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            id: NotSet,
            username: Set(new_user.username),
            email: Set(new_user.email),
            full_name: Set(new_user.full_name),
            avatar: Set(new_user.avatar),
            cover_image: Set(new_user.cover_image),
            password_hash: Set(new_user.password_hash),
            refresh_token: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        match active.insert(&self.conn).await {
            Ok(model) => Ok(Some(UserRecord::from(model))),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err).context("Failed to insert user"),
        }
    }

    /// Sets or clears the stored refresh token.
    pub async fn update_refresh_token(&self, id: i32, token: Option<&str>) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::RefreshToken,
                Expr::value(token.map(ToString::to_string)),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update refresh token")?;

        Ok(result.rows_affected > 0)
    }

    /// Replaces `expected` with `replacement` only if `expected` is still the
    /// stored value. Returns whether the swap happened.
    pub async fn rotate_refresh_token(
        &self,
        id: i32,
        expected: &str,
        replacement: &str,
    ) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::RefreshToken,
                Expr::value(Some(replacement.to_string())),
            )
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::RefreshToken.eq(expected))
            .exec(&self.conn)
            .await
            .context("Failed to rotate refresh token")?;

        Ok(result.rows_affected == 1)
    }

    /// Writes an already-hashed password.
    pub async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = users::Entity::update_many()
            .col_expr(
                users::Column::PasswordHash,
                Expr::value(password_hash.to_string()),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update password hash")?;

        Ok(result.rows_affected > 0)
    }

    /// Updates profile fields; `None` leaves a field untouched.
    /// Returns `Ok(None)` if the user does not exist.
    pub async fn update_profile(
        &self,
        id: i32,
        changes: ProfileChanges,
    ) -> Result<Option<UserRecord>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for profile update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        if let Some(full_name) = changes.full_name {
            active.full_name = Set(full_name);
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(avatar) = changes.avatar {
            active.avatar = Set(avatar);
        }
        if let Some(cover_image) = changes.cover_image {
            active.cover_image = Set(cover_image);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update user profile")?;

        Ok(Some(UserRecord::from(model)))
    }

    pub async fn email_taken_by_other(&self, email: &str, id: i32) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .filter(users::Column::Id.ne(id))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.is_some())
    }
}

/// Profile columns that may change outside the auth flow.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
}

fn identifier_condition(username: Option<&str>, email: Option<&str>) -> Option<Condition> {
    let mut condition = Condition::any();
    let mut any = false;

    if let Some(username) = username {
        condition = condition.add(users::Column::Username.eq(username));
        any = true;
    }
    if let Some(email) = email {
        condition = condition.add(users::Column::Email.eq(email));
        any = true;
    }

    any.then_some(condition)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
