//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts where inserts happen
//! - An update DTO (all `Option` fields) for patches where patches happen
//!
//! Status, channel, and priority columns are stored as TEXT; the owning
//! enums live in `portaria_core` and rows expose typed accessors.

pub mod delivery;
pub mod notification;
pub mod preference;
pub mod queue;
pub mod quota;
pub mod tenant_config;
pub mod user;
