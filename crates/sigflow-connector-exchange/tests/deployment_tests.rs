//! Rule reconciliation against a fake transport-rule surface.

mod common;

use common::{config_for, FakeTransportRules, TestContext};
use serde_json::json;
use sigflow_connector_exchange::{
    extract_disclaimer, DeploymentLogStatus, DeploymentOperation, DeploymentStatus,
    RuleMutationMode, RuleSpec, ScriptOperation,
};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIR: &str = "contoso.onmicrosoft.com";
const TOKEN: &str = "mgmt-token-contoso";

async fn live_surface() -> (TestContext, FakeTransportRules) {
    let ctx = TestContext::new().await;
    common::mount_token(&ctx.server, DIR, TOKEN).await;
    let fake = FakeTransportRules::new();
    fake.mount(&ctx.server, DIR, TOKEN).await;
    (ctx, fake)
}

#[tokio::test]
async fn test_deploying_twice_updates_instead_of_creating() {
    let (ctx, fake) = live_surface().await;
    let connector = ctx.connector(DIR);
    let spec = RuleSpec::new("S", "A");

    let first = connector.deploy(&spec).await;
    let second = connector.deploy(&spec).await;

    assert!(first.success, "{}", first.message);
    assert!(second.success, "{}", second.message);
    assert!(first.message.contains("created"));
    assert!(second.message.contains("updated"));
    assert_eq!(first.rule_id, second.rule_id);

    assert_eq!(fake.rule_count(), 1);
    assert_eq!(fake.creates(), 1);
    assert_eq!(fake.updates(), 1);

    let records = connector.deployments().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeploymentStatus::Deployed);
    assert_eq!(records[0].remote_rule_id, first.rule_id);
    assert_eq!(records[0].version, 2);
}

#[tokio::test]
async fn test_redeploy_replaces_remote_content() {
    let (ctx, fake) = live_surface().await;
    let connector = ctx.connector(DIR);

    assert!(connector.deploy(&RuleSpec::new("S", "A")).await.success);
    let spec_b = RuleSpec::new("S", "B");
    assert!(connector.deploy(&spec_b).await.success);

    let rules = fake.rules_named("S");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["ApplyHtmlDisclaimerText"], "B");
    assert_eq!(rules[0]["ApplyHtmlDisclaimerLocation"], "Append");

    let record = connector.deployment("S").await.unwrap().unwrap();
    assert_eq!(record.content_hash, spec_b.content_hash());
}

#[tokio::test]
async fn test_existing_rule_created_by_an_administrator_is_adopted() {
    let (ctx, fake) = live_surface().await;
    let seeded_id = fake.seed("S", "old");
    let connector = ctx.connector(DIR);

    let result = connector.deploy(&RuleSpec::new("S", "new")).await;

    assert!(result.success);
    assert_eq!(result.rule_id.as_deref(), Some(seeded_id.as_str()));
    assert_eq!(fake.creates(), 0);
    assert_eq!(fake.rules_named("S")[0]["ApplyHtmlDisclaimerText"], "new");
}

#[tokio::test]
async fn test_name_match_is_case_sensitive() {
    let (ctx, fake) = live_surface().await;
    fake.seed("signature", "lower");
    let connector = ctx.connector(DIR);

    assert!(connector.deploy(&RuleSpec::new("Signature", "upper")).await.success);
    assert_eq!(fake.rule_count(), 2);
    assert_eq!(fake.creates(), 1);
}

#[tokio::test]
async fn test_validation_happens_before_any_network_call() {
    let (ctx, _fake) = live_surface().await;
    let connector = ctx.connector(DIR);

    let result = connector.deploy(&RuleSpec::new("n".repeat(65), "<p>x</p>")).await;

    assert!(!result.success);
    assert_eq!(result.errors.as_ref().map(Vec::len), Some(1));
    assert!(ctx.server.received_requests().await.unwrap().is_empty());

    let accepted = connector.deploy(&RuleSpec::new("n".repeat(64), "<p>x</p>")).await;
    assert!(accepted.success, "{}", accepted.message);

    let logs = connector.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[1].status, DeploymentLogStatus::Error);
    assert_eq!(logs[1].details.as_ref().unwrap()["errorCode"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unsupported_surface_falls_back_to_script() {
    let ctx = TestContext::new().await;
    common::mount_token(&ctx.server, DIR, TOKEN).await;
    let fake = FakeTransportRules::unsupported();
    fake.mount(&ctx.server, DIR, TOKEN).await;
    let connector = ctx.connector(DIR);

    let html = "<p style=\"color:#333\">O'Brien &amp; Co.\nCall us: \u{2018}any time\u{2019}</p>";
    let result = connector.deploy(&RuleSpec::new("S", html)).await;

    assert!(result.success, "{}", result.message);
    assert!(result.message.contains("manual execution"));
    assert!(result.rule_id.is_none());
    assert_eq!(fake.rule_count(), 0);

    let record = connector.deployment("S").await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::PendingManualExecution);
    assert!(record.remote_rule_id.is_none());
    let script = record.script_text.unwrap();
    assert_eq!(extract_disclaimer(&script).as_deref(), Some(html));

    let logs = connector.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].operation, DeploymentOperation::Deploy);
    assert_eq!(logs[0].status, DeploymentLogStatus::Warning);
}

#[tokio::test]
async fn test_unsupported_update_of_existing_rule_generates_update_script() {
    let ctx = TestContext::new().await;
    common::mount_token(&ctx.server, DIR, TOKEN).await;
    let fake = FakeTransportRules::unsupported();
    fake.seed("S", "old");
    fake.mount(&ctx.server, DIR, TOKEN).await;
    let connector = ctx.connector(DIR);

    let result = connector.deploy(&RuleSpec::new("S", "new")).await;

    assert!(result.success);
    assert!(result.message.contains("(update)"));
    assert_eq!(fake.rules_named("S")[0]["ApplyHtmlDisclaimerText"], "old");
}

#[tokio::test]
async fn test_script_only_mode_never_mutates_remotely() {
    let server = MockServer::start().await;
    let config = config_for(&server)
        .mutation_mode(RuleMutationMode::ScriptOnly)
        .build()
        .unwrap();
    let ctx = TestContext::with_config(server, config);
    let connector = ctx.connector(DIR);

    let result = connector.deploy(&RuleSpec::new("S", "A")).await;

    assert!(result.success);
    assert!(result.message.contains("manual execution"));
    assert!(ctx.server.received_requests().await.unwrap().is_empty());
    let record = connector.deployment("S").await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::PendingManualExecution);
}

#[tokio::test]
async fn test_duplicate_remote_names_are_a_remote_state_error() {
    let (ctx, fake) = live_surface().await;
    let first = fake.seed("S", "one");
    let second = fake.seed("S", "two");
    let connector = ctx.connector(DIR);

    let result = connector.deploy(&RuleSpec::new("S", "three")).await;

    assert!(!result.success);
    assert!(result.message.contains("Remote state error"));
    assert!(result.message.contains(&first));
    assert!(result.message.contains(&second));
    assert_eq!(fake.creates() + fake.updates(), 0);
    assert!(connector.deployment("S").await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_fails_without_local_state() {
    let ctx = TestContext::new().await;
    common::mount_token(&ctx.server, DIR, TOKEN).await;
    Mock::given(method("GET"))
        .and(path_regex(r"/TransportRule$"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": "ServiceUnavailable", "message": "try later" }
        })))
        .mount(&ctx.server)
        .await;
    let connector = ctx.connector(DIR);

    let result = connector.deploy(&RuleSpec::new("S", "A")).await;

    assert!(!result.success);
    assert!(result.message.starts_with("Network error"));
    assert_eq!(ctx.store.record_count().await, 0);

    let logs = connector.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, DeploymentLogStatus::Error);
    assert_eq!(logs[0].details.as_ref().unwrap()["errorCode"], "NETWORK_ERROR");
}

#[tokio::test]
async fn test_disabled_connection_is_refused_and_audited() {
    let (ctx, _fake) = live_surface().await;
    let mut credential = common::credential(DIR, "good-secret");
    credential.connection_enabled = false;
    let connector = ctx.factory.for_tenant(credential).unwrap();

    let result = connector.deploy(&RuleSpec::new("S", "A")).await;

    assert!(!result.success);
    assert!(result.message.contains("disabled"));
    assert!(ctx.server.received_requests().await.unwrap().is_empty());
    assert_eq!(connector.recent_logs(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_deletes_rule_then_reports_nothing_to_remove() {
    let (ctx, fake) = live_surface().await;
    let connector = ctx.connector(DIR);
    assert!(connector.deploy(&RuleSpec::new("S", "A")).await.success);

    let removed = connector.remove("S").await;
    assert!(removed.success, "{}", removed.message);
    assert_eq!(fake.rule_count(), 0);
    assert_eq!(
        connector.deployment("S").await.unwrap().unwrap().status,
        DeploymentStatus::Deleted
    );

    let again = connector.remove("S").await;
    assert!(again.success);
    assert!(again.message.contains("nothing to remove"));
    assert_eq!(fake.deletes(), 1);

    let operations: Vec<_> = connector
        .recent_logs(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.operation)
        .collect();
    assert_eq!(
        operations,
        vec![
            DeploymentOperation::Remove,
            DeploymentOperation::Remove,
            DeploymentOperation::Deploy
        ]
    );
}

#[tokio::test]
async fn test_remove_on_unsupported_surface_leaves_pending_deletion() {
    let ctx = TestContext::new().await;
    common::mount_token(&ctx.server, DIR, TOKEN).await;
    let fake = FakeTransportRules::unsupported();
    fake.seed("S", "A");
    fake.mount(&ctx.server, DIR, TOKEN).await;
    let connector = ctx.connector(DIR);

    let result = connector.remove("S").await;

    assert!(result.success);
    assert!(result.message.contains("manual execution"));
    let record = connector.deployment("S").await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::PendingDeletion);
    assert!(record
        .script_text
        .unwrap()
        .contains("Remove-TransportRule"));
}

#[tokio::test]
async fn test_generate_script_is_stored_for_later_retrieval() {
    let ctx = TestContext::new().await;
    let connector = ctx.connector(DIR);

    let generated = connector
        .generate_script(&RuleSpec::new("S", "<p>A</p>"), ScriptOperation::Create)
        .await
        .unwrap();

    assert!(ctx.server.received_requests().await.unwrap().is_empty());
    let record = connector.deployment("S").await.unwrap().unwrap();
    assert_eq!(record.script_text, Some(generated.script_text));
    let logs = connector.recent_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].operation, DeploymentOperation::GenerateScript);
}
