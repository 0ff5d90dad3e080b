//! Shared type definitions.

mod email;
mod id;
mod money;
mod role;

pub use email::{Email, EmailError};
pub use id::{CartLineId, OrderId, ProductId, UserId, VariantId};
pub use money::{CurrencyCode, Price};
pub use role::Role;
