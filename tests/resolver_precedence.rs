//! Provider Resolver precedence, consent gating and failure handling

mod common;

use common::{owner, trusted, Harness};
use credvault::audit::AuditOutcome;
use credvault::domain::{Capability, ConsentActor, ServiceName};
use credvault::gate::{CredentialGate, ExecutionContext};
use credvault::resolver::{
    CredentialSource, DenialReason, Resolution, ResolutionTier, ResolvedCredential,
};
use credvault::secrets::SecretVault;

fn chat() -> Capability {
    Capability::new(ServiceName::Anthropic)
}

fn resolved(resolution: Resolution) -> ResolvedCredential {
    match resolution {
        Resolution::Resolved(credential) => credential,
        Resolution::Denied(reason) => panic!("expected a credential, got denial {}", reason),
    }
}

#[tokio::test]
async fn test_owner_walkthrough_across_all_tiers() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let gate = harness.gate.as_ref();
    let u1 = owner("u1");

    // Fresh owner, default consent
    let credential = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());
    assert_eq!(credential.tier, ResolutionTier::TeamFallback);
    assert_eq!(credential.source, CredentialSource::TeamFallback);
    assert_eq!(credential.endpoint, "https://api.anthropic.com/v1");

    // Own key takes over
    gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::Anthropic, "sk-abc".into())
        .await
        .unwrap();
    let credential = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());
    assert_eq!(credential.tier, ResolutionTier::Direct);
    let CredentialSource::Vault(vault_ref) = &credential.source else {
        panic!("direct tier must point at a vault entry");
    };
    assert_eq!(harness.vault.retrieve(vault_ref).await.unwrap().expose_secret(), "sk-abc");

    // Gateway beats the direct key
    gate.upsert_gateway_config(
        &trusted(),
        &u1,
        Some("https://gw.example/v1".into()),
        Some("gw-key".into()),
    )
    .await
    .unwrap();
    let credential = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());
    assert_eq!(credential.tier, ResolutionTier::Gateway);
    assert_eq!(credential.service, ServiceName::Gateway);
    assert_eq!(credential.endpoint, "https://gw.example/v1");

    // Revoke consent and remove everything owner-scoped
    gate.set_consent(&trusted(), &u1, false, ConsentActor::Owner).await.unwrap();
    gate.delete_credential(&trusted(), &u1, ServiceName::Anthropic).await.unwrap();
    gate.delete_gateway_config(&trusted(), &u1).await.unwrap();
    let resolution = resolver.resolve(&trusted(), &u1, &chat()).await.unwrap();
    assert_eq!(resolution, Resolution::Denied(DenialReason::NoConsent));
}

#[tokio::test]
async fn test_removing_gateway_secret_falls_back_to_direct() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let gate = harness.gate.as_ref();
    let u1 = owner("u1");

    gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::Anthropic, "sk-abc".into())
        .await
        .unwrap();
    gate.upsert_gateway_config(
        &trusted(),
        &u1,
        Some("https://gw.example/v1".into()),
        Some("gw-key".into()),
    )
    .await
    .unwrap();
    assert_eq!(
        resolver.resolve(&trusted(), &u1, &chat()).await.unwrap().tier(),
        Some(ResolutionTier::Gateway)
    );

    // Keep the endpoint, drop the secret
    gate.upsert_gateway_config(&trusted(), &u1, Some("https://gw.example/v1".into()), None)
        .await
        .unwrap();
    assert_eq!(
        resolver.resolve(&trusted(), &u1, &chat()).await.unwrap().tier(),
        Some(ResolutionTier::Direct)
    );
}

#[tokio::test]
async fn test_consent_flip_takes_effect_on_next_resolution() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let u1 = owner("u1");

    harness.gate.set_consent(&trusted(), &u1, false, ConsentActor::Owner).await.unwrap();
    assert_eq!(
        resolver.resolve(&trusted(), &u1, &chat()).await.unwrap(),
        Resolution::Denied(DenialReason::NoConsent)
    );

    harness.gate.set_consent(&trusted(), &u1, true, ConsentActor::Owner).await.unwrap();
    assert_eq!(
        resolver.resolve(&trusted(), &u1, &chat()).await.unwrap().tier(),
        Some(ResolutionTier::TeamFallback)
    );
}

#[tokio::test]
async fn test_revoked_consent_does_not_block_owner_credentials() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let u1 = owner("u1");

    harness.gate.set_consent(&trusted(), &u1, false, ConsentActor::Owner).await.unwrap();
    harness
        .gate
        .insert_or_replace_credential(&trusted(), &u1, ServiceName::Anthropic, "sk-own".into())
        .await
        .unwrap();

    assert_eq!(
        resolver.resolve(&trusted(), &u1, &chat()).await.unwrap().tier(),
        Some(ResolutionTier::Direct)
    );
}

#[tokio::test]
async fn test_no_credential_when_team_fallback_does_not_cover_service() {
    let harness = Harness::new().await;
    let u1 = owner("u1");

    let with_team = harness.resolver_with_team();
    let resolution = with_team
        .resolve(&trusted(), &u1, &Capability::new(ServiceName::Mistral))
        .await
        .unwrap();
    assert_eq!(resolution, Resolution::Denied(DenialReason::NoCredential));

    let without_team = harness.resolver();
    let resolution = without_team.resolve(&trusted(), &u1, &chat()).await.unwrap();
    assert_eq!(resolution, Resolution::Denied(DenialReason::NoCredential));
}

#[tokio::test]
async fn test_gateway_secret_uses_deployment_default_endpoint() {
    let harness = Harness::new().await;
    let u1 = owner("u1");
    harness.gate.upsert_gateway_config(&trusted(), &u1, None, Some("gw-key".into())).await.unwrap();

    // Without an endpoint anywhere the gateway tier cannot resolve
    let resolution = harness.resolver().resolve(&trusted(), &u1, &chat()).await.unwrap();
    assert_eq!(resolution, Resolution::Denied(DenialReason::NoCredential));

    let resolver = harness
        .resolver()
        .with_default_gateway_endpoint(Some("https://gw.default/v1".to_string()));
    let credential = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());
    assert_eq!(credential.tier, ResolutionTier::Gateway);
    assert_eq!(credential.endpoint, "https://gw.default/v1");
}

#[tokio::test]
async fn test_endpoint_only_gateway_is_skipped() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let u1 = owner("u1");
    harness
        .gate
        .upsert_gateway_config(&trusted(), &u1, Some("https://gw.example/v1".into()), None)
        .await
        .unwrap();

    assert_eq!(
        resolver.resolve(&trusted(), &u1, &chat()).await.unwrap().tier(),
        Some(ResolutionTier::TeamFallback)
    );
}

#[tokio::test]
async fn test_store_outage_is_not_masked_by_team_fallback() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let u1 = owner("u1");

    harness.pool.close().await;

    let resolution = resolver.resolve(&trusted(), &u1, &chat()).await.unwrap();
    assert_eq!(resolution, Resolution::Denied(DenialReason::Unavailable));

    let events = harness.audit.events();
    let resolve_event = events.iter().rev().find(|e| e.operation == "resolve").unwrap();
    assert_eq!(resolve_event.outcome, AuditOutcome::Unavailable);
    assert_eq!(resolve_event.reason, Some(DenialReason::Unavailable));
    // One lookup per attempt, and no later tier was consulted
    let lookups = events.iter().filter(|e| e.operation == "lookup_gateway").count();
    assert_eq!(lookups, 3);
    assert!(events.iter().all(|e| e.operation != "get_consent"));
}

#[tokio::test]
async fn test_forbidden_aborts_resolution() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let u1 = owner("u1");

    for ctx in [ExecutionContext::anonymous(), ExecutionContext::user(u1.clone())] {
        let err = resolver.resolve(&ctx, &u1, &chat()).await.unwrap_err();
        assert!(err.is_forbidden());
    }

    let events = harness.audit.events();
    assert!(events.iter().all(|e| e.operation != "lookup_credential"));
    let resolve_events: Vec<_> = events.iter().filter(|e| e.operation == "resolve").collect();
    assert_eq!(resolve_events.len(), 2);
    assert!(resolve_events.iter().all(|e| e.outcome == AuditOutcome::Forbidden));
}

#[tokio::test]
async fn test_fetch_secret_per_tier() {
    let harness = Harness::new().await;
    let resolver = harness.resolver_with_team();
    let gate = harness.gate.as_ref();
    let u1 = owner("u1");

    let team = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());
    assert_eq!(resolver.fetch_secret(&trusted(), &team).await.unwrap().expose_secret(), "sk-ant-team");

    gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::Anthropic, "sk-abc".into())
        .await
        .unwrap();
    let direct = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());
    assert_eq!(resolver.fetch_secret(&trusted(), &direct).await.unwrap().expose_secret(), "sk-abc");
    let record = gate.lookup_credential(&trusted(), &u1, ServiceName::Anthropic).await.unwrap();
    assert!(record.last_used_at.is_some());

    gate.upsert_gateway_config(
        &trusted(),
        &u1,
        Some("https://gw.example/v1".into()),
        Some("gw-key".into()),
    )
    .await
    .unwrap();
    let gateway = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());
    assert_eq!(resolver.fetch_secret(&trusted(), &gateway).await.unwrap().expose_secret(), "gw-key");
}

#[tokio::test]
async fn test_fetch_secret_retries_transient_vault_failures() {
    let harness = Harness::new().await;
    let resolver = harness.resolver();
    let u1 = owner("u1");
    harness
        .gate
        .insert_or_replace_credential(&trusted(), &u1, ServiceName::Anthropic, "sk-abc".into())
        .await
        .unwrap();
    let direct = resolved(resolver.resolve(&trusted(), &u1, &chat()).await.unwrap());

    harness.vault.fail_next_reads(2);
    assert_eq!(resolver.fetch_secret(&trusted(), &direct).await.unwrap().expose_secret(), "sk-abc");

    harness.vault.fail_next_reads(10);
    let err = resolver.fetch_secret(&trusted(), &direct).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_concurrent_owners_resolve_their_own_keys() {
    let harness = Harness::new().await;
    let resolver = std::sync::Arc::new(harness.resolver_with_team());
    let owners: Vec<_> = (0..10).map(|i| owner(&format!("owner-{}", i))).collect();

    for (i, owner_id) in owners.iter().enumerate() {
        harness
            .gate
            .insert_or_replace_credential(
                &trusted(),
                owner_id,
                ServiceName::Anthropic,
                format!("sk-{}", i).into(),
            )
            .await
            .unwrap();
    }

    let lookups = owners.iter().cloned().enumerate().map(|(i, owner_id)| {
        let resolver = resolver.clone();
        async move {
            let credential = resolved(resolver.resolve(&trusted(), &owner_id, &chat()).await.unwrap());
            let secret = resolver.fetch_secret(&trusted(), &credential).await.unwrap();
            assert_eq!(secret.expose_secret(), format!("sk-{}", i));
        }
    });
    futures::future::join_all(lookups).await;
}
