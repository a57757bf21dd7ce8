use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Stored trimmed and lowercased
    #[sea_orm(unique)]
    pub username: String,

    /// Stored trimmed and lowercased
    #[sea_orm(unique)]
    pub email: String,

    pub full_name: String,

    pub avatar: String,

    pub cover_image: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// The single refresh token currently accepted for this user
    pub refresh_token: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
