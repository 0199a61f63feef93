//! Core types for Dongne.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod account;
pub mod email;
pub mod id;
pub mod slot;

pub use account::{AccountType, AccountTypeError, Role};
pub use email::{Email, EmailError};
pub use id::*;
pub use slot::{ImageSlot, ImageSlotError};
