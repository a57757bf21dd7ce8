pub mod subscription;
pub mod user;
