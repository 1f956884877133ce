//! Configure command - Store or update a tenant's connector settings

use anyhow::{bail, Context};
use clap::Args;
use sigflow_connector_exchange::TenantCredential;
use sigflow_db::{TenantConnectorSettings, UpsertConnectorSettings};
use std::process::ExitCode;

use crate::config::GlobalArgs;
use crate::context::AppContext;
use crate::output::{print_failure, print_key_value, print_success};

/// Arguments for the configure command
#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Disable deployments for this tenant
    #[arg(long, conflicts_with = "enable")]
    pub disable: bool,

    /// Re-enable deployments for this tenant
    #[arg(long)]
    pub enable: bool,

    /// Test the connection with the saved settings
    #[arg(long)]
    pub test: bool,
}

/// Merges explicit options over the stored settings. The secret is only
/// sent when given, so an update without one keeps the stored secret.
fn settings_update(
    args: &ConfigureArgs,
    global: &GlobalArgs,
    stored: Option<&TenantConnectorSettings>,
) -> anyhow::Result<UpsertConnectorSettings> {
    let directory_tenant_id = global
        .directory_tenant_id
        .clone()
        .or_else(|| stored.map(|s| s.directory_tenant_id.clone()));
    let client_id = global
        .client_id
        .clone()
        .or_else(|| stored.map(|s| s.client_id.clone()));

    let (Some(directory_tenant_id), Some(client_id)) = (directory_tenant_id, client_id) else {
        bail!("--directory-tenant-id and --client-id are required for a new tenant");
    };
    if stored.is_none() && global.client_secret.is_none() {
        bail!("--client-secret is required for a new tenant");
    }

    let connection_enabled = if args.disable {
        false
    } else if args.enable {
        true
    } else {
        stored.map_or(true, |s| s.connection_enabled)
    };

    Ok(UpsertConnectorSettings {
        directory_tenant_id,
        client_id,
        client_secret: global.client_secret.clone(),
        connection_enabled,
    })
}

/// Execute the configure command
pub async fn execute(args: ConfigureArgs, global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::open(global).await?;
    let pool = ctx.pool()?;

    let stored = ctx.stored_settings().await?;
    let update = settings_update(&args, global, stored.as_ref())?;
    let saved = TenantConnectorSettings::upsert(pool, *ctx.tenant_id.as_uuid(), update)
        .await
        .context("failed to save connector settings")?;
    let connector = ctx
        .factory
        .reconfigure_tenant(TenantCredential::from_settings(&saved))
        .await?;
    let credential = connector.credential();

    tracing::info!(tenant_id = %ctx.tenant_id, "Connector settings saved");
    print_success("Connector settings saved");
    print_key_value("Tenant", &ctx.tenant_id.to_string());
    print_key_value("Directory tenant", &credential.directory_tenant_id);
    print_key_value("Client id", &credential.client_id);
    print_key_value("Client secret", &credential.masked_client_secret());
    print_key_value(
        "Connection",
        if credential.connection_enabled {
            "enabled"
        } else {
            "disabled"
        },
    );

    if !args.test {
        return Ok(ExitCode::SUCCESS);
    }
    let result = connector.test_connection().await;
    if result.success {
        print_success(&result.message);
        Ok(ExitCode::SUCCESS)
    } else {
        print_failure(&result.message);
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn global() -> GlobalArgs {
        GlobalArgs {
            tenant: Some(Uuid::new_v4()),
            cloud: "commercial".to_string(),
            login_endpoint: None,
            directory_base_url: None,
            management_base_url: None,
            mutation_mode: "detect".to_string(),
            timeout_secs: 30,
            database_url: Some("postgres://localhost/sigflow".to_string()),
            directory_tenant_id: None,
            client_id: None,
            client_secret: None,
        }
    }

    fn stored() -> TenantConnectorSettings {
        TenantConnectorSettings {
            tenant_id: Uuid::new_v4(),
            directory_tenant_id: "contoso.onmicrosoft.com".to_string(),
            client_id: "client-1".to_string(),
            client_secret: "stored".to_string(),
            connection_enabled: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_tenant_needs_every_field() {
        let args = ConfigureArgs {
            disable: false,
            enable: false,
            test: false,
        };
        let mut global = global();
        global.directory_tenant_id = Some("contoso.onmicrosoft.com".to_string());
        global.client_id = Some("client-1".to_string());

        assert!(settings_update(&args, &global, None).is_err());

        global.client_secret = Some("s3cr3t".to_string());
        let update = settings_update(&args, &global, None).unwrap();
        assert!(update.connection_enabled);
        assert_eq!(update.client_secret.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_disable_keeps_stored_secret() {
        let args = ConfigureArgs {
            disable: true,
            enable: false,
            test: false,
        };

        let update = settings_update(&args, &global(), Some(&stored())).unwrap();

        assert!(!update.connection_enabled);
        assert!(update.client_secret.is_none());
        assert_eq!(update.client_id, "client-1");
    }
}
