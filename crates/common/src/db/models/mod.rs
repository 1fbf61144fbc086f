//! SeaORM entity models
//!
//! Database entities for LinguaChat usage persistence

mod usage;
mod user;

pub use user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as UserEntity, Model as User,
};

pub use usage::{
    ActiveModel as UsageActiveModel, Column as UsageColumn, Entity as UsageEntity, Model as Usage,
};
