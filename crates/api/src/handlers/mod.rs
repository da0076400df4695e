pub mod notification;
pub mod tenant;
