pub mod media;
pub use media::{LocalMediaStore, MediaStore};

pub mod password;
pub use password::PasswordHasher;

pub mod token;
pub use token::{Claims, TokenError, TokenKind, TokenService};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, LoginInput, LoginResult, RegisterInput, TokenPair};
pub use auth_service_impl::JwtAuthService;

pub mod account_service;
pub mod account_service_impl;
pub use account_service::{
    AccountError, AccountService, AccountUpdate, ChannelProfile, SubscriptionState,
};
pub use account_service_impl::SeaOrmAccountService;
