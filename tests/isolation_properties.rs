//! Property tests for owner isolation and replacement

mod common;

use common::{trusted, Harness};
use credvault::domain::{OwnerId, ServiceName};
use credvault::gate::CredentialGate;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("tokio runtime")
}

fn service() -> impl Strategy<Value = ServiceName> {
    prop::sample::select(vec![
        ServiceName::OpenAi,
        ServiceName::Anthropic,
        ServiceName::Google,
        ServiceName::Mistral,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_other_owners_never_see_a_secret(
        a in "[a-z0-9_-]{1,16}",
        b in "[a-z0-9_-]{1,16}",
        service in service(),
        secret in "[A-Za-z0-9]{8,40}",
    ) {
        prop_assume!(a != b);
        let (owner_a, owner_b) = (OwnerId::parse(&a).unwrap(), OwnerId::parse(&b).unwrap());

        runtime().block_on(async {
            let harness = Harness::new().await;
            let gate = harness.gate.as_ref();

            gate.insert_or_replace_credential(&trusted(), &owner_b, service, secret.clone().into())
                .await
                .unwrap();

            let err = gate.get_credential(&trusted(), &owner_a, service).await.unwrap_err();
            assert!(err.is_not_found());
            assert!(gate.list_credentials(&trusted(), &owner_a).await.unwrap().is_empty());

            let own = gate.get_credential(&trusted(), &owner_b, service).await.unwrap();
            assert_eq!(own.expose_secret(), secret);
        });
    }

    #[test]
    fn prop_last_write_wins_with_one_record(
        secrets in prop::collection::vec("[A-Za-z0-9]{8,24}", 1..6),
        service in service(),
    ) {
        let owner_id = OwnerId::parse("prop-owner").unwrap();

        runtime().block_on(async {
            let harness = Harness::new().await;
            let gate = harness.gate.as_ref();

            for secret in &secrets {
                gate.insert_or_replace_credential(&trusted(), &owner_id, service, secret.clone().into())
                    .await
                    .unwrap();
            }

            let listed = gate.list_credentials(&trusted(), &owner_id).await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(harness.vault.entries().len(), 1);
            let current = gate.get_credential(&trusted(), &owner_id, service).await.unwrap();
            assert_eq!(current.expose_secret(), secrets.last().unwrap().as_str());
        });
    }
}
