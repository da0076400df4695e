//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. Transitions that must keep
//! the denormalized notification counters in sync with delivery rows run
//! inside a single transaction here, so callers never see a half-applied
//! state.

pub mod delivery_repo;
pub mod notification_repo;
pub mod preference_repo;
pub mod queue_repo;
pub mod quota_repo;
pub mod tenant_config_repo;

pub use delivery_repo::DeliveryRepo;
pub use notification_repo::NotificationRepo;
pub use preference_repo::PreferenceRepo;
pub use queue_repo::QueueRepo;
pub use quota_repo::QuotaRepo;
pub use tenant_config_repo::TenantConfigRepo;
