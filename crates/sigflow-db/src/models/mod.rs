//! Database entity models for sigflow-db.

pub mod deployment_log;
pub mod deployment_record;
pub mod tenant_connector_settings;
