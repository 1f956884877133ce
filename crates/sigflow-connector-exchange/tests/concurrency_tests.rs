//! Concurrent deployments across tenants.

mod common;

use common::{FakeTransportRules, TestContext};
use sigflow_connector_exchange::{DeploymentOperation, RuleSpec};
use sigflow_core::TenantAware;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

const TENANTS: usize = 10;
const DEPLOYS_PER_TENANT: usize = 10;

fn directory_tenant(i: usize) -> String {
    format!("tenant-{i}.onmicrosoft.com")
}

fn token(i: usize) -> String {
    format!("token-for-tenant-{i}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_concurrent_deploy_is_audited_once_for_its_tenant() {
    let ctx = TestContext::new().await;
    let mut fakes = Vec::new();
    let mut connectors = Vec::new();

    for i in 0..TENANTS {
        let dir = directory_tenant(i);
        common::mount_token(&ctx.server, &dir, &token(i)).await;
        let fake = FakeTransportRules::new();
        fake.mount(&ctx.server, &dir, &token(i)).await;
        fakes.push(fake);
        connectors.push(Arc::new(ctx.connector(&dir)));
    }

    let mut tasks = JoinSet::new();
    for connector in &connectors {
        for n in 0..DEPLOYS_PER_TENANT {
            let connector = connector.clone();
            tasks.spawn(async move {
                let spec = RuleSpec::new("Signature", format!("<p>revision {n}</p>"));
                connector.deploy(&spec).await
            });
        }
    }

    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap();
        assert!(result.success, "{}", result.message);
    }

    assert_eq!(ctx.store.log_count().await, TENANTS * DEPLOYS_PER_TENANT);

    for (connector, fake) in connectors.iter().zip(&fakes) {
        let logs = connector.recent_logs(100).await.unwrap();
        assert_eq!(logs.len(), DEPLOYS_PER_TENANT);
        assert!(logs
            .iter()
            .all(|e| e.tenant_id == *connector.tenant_id().as_uuid()
                && e.operation == DeploymentOperation::Deploy));

        // Same-name deploys through one connector never duplicate the rule.
        assert_eq!(fake.rule_count(), 1);
        assert_eq!(fake.creates(), 1);

        let records = connector.deployments().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, DEPLOYS_PER_TENANT as i64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tokens_never_cross_tenants() {
    let ctx = TestContext::new().await;
    let mut connectors = Vec::new();

    for i in 0..2 {
        let dir = directory_tenant(i);
        common::mount_token(&ctx.server, &dir, &token(i)).await;
        FakeTransportRules::new()
            .mount(&ctx.server, &dir, &token(i))
            .await;
        connectors.push(Arc::new(ctx.connector(&dir)));
    }

    let mut tasks = JoinSet::new();
    for connector in &connectors {
        for n in 0..5 {
            let connector = connector.clone();
            tasks.spawn(async move {
                connector
                    .deploy(&RuleSpec::new(format!("rule-{n}"), "<p>x</p>"))
                    .await
            });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        assert!(joined.unwrap().success);
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    for i in 0..2 {
        let prefix = format!("/adminapi/beta/{}/", directory_tenant(i));
        let expected = format!("Bearer {}", token(i));
        for request in ctx.requests_to(&prefix).await {
            let authorization = request
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            assert_eq!(authorization, expected);
            *seen.entry(directory_tenant(i)).or_default() += 1;
        }
    }

    assert_eq!(seen.len(), 2);
}
