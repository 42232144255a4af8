use std::sync::Arc;

use celastrina_core::configuration::{BootstrapConfig, Configuration};
use celastrina_core::context::Context;
use celastrina_core::envelope::LocalEnvelope;
use celastrina_core::permission::{Permission, ValueMatch};
use celastrina_core::sentry::OpenAuthenticator;

async fn authorized_context(
    value_match: ValueMatch,
    permission_roles: &[&str],
    subject_roles: &[&str],
    optimistic: bool,
    declare_permission: bool,
) -> (Arc<Configuration>, Context) {
    let mut config = Configuration::new("permissions-test").unwrap();
    config.set_bootstrap(BootstrapConfig::default());
    config.set_optimistic(optimistic);
    if declare_permission {
        config.add_permission(
            Permission::new("process", permission_roles.to_vec(), value_match).unwrap(),
        );
    }
    config.add_authenticator(Box::new(
        OpenAuthenticator::new().with_assignments(subject_roles.to_vec()),
    ));

    let config = Arc::new(config);
    let envelope = Arc::new(LocalEnvelope::new());
    config.initialize(envelope.as_ref()).await.unwrap();

    let mut context = Context::new(config.clone(), envelope);
    let sentry = config.sentry().unwrap();
    let subject = sentry.authenticate(&context).await.unwrap();
    context.set_subject(subject);
    (config, context)
}

#[tokio::test]
async fn match_none_denies_overlapping_roles() {
    // Pessimistic deny: the subject holds one of the excluded roles.
    let (config, context) = authorized_context(
        ValueMatch::None,
        &["role1", "role2"],
        &["role1", "role3"],
        false,
        true,
    )
    .await;
    let err = config
        .sentry()
        .unwrap()
        .authorize(&context)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 403);
}

#[tokio::test]
async fn match_all_permits_superset_roles() {
    let (config, context) = authorized_context(
        ValueMatch::All,
        &["role1", "role2"],
        &["role1", "role2", "role3"],
        false,
        true,
    )
    .await;
    config.sentry().unwrap().authorize(&context).await.unwrap();
}

#[tokio::test]
async fn match_any_permits_single_overlap() {
    let (config, context) =
        authorized_context(ValueMatch::Any, &["role1", "role2"], &["role2"], false, true).await;
    config.sentry().unwrap().authorize(&context).await.unwrap();
}

#[tokio::test]
async fn missing_permission_denies_pessimistically() {
    let (config, context) =
        authorized_context(ValueMatch::Any, &[], &["role1"], false, false).await;
    let err = config
        .sentry()
        .unwrap()
        .authorize(&context)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 403);
}

#[tokio::test]
async fn missing_permission_permits_optimistically() {
    let (config, context) =
        authorized_context(ValueMatch::Any, &[], &["role1"], true, false).await;
    config.sentry().unwrap().authorize(&context).await.unwrap();
}

#[tokio::test]
async fn subject_carries_request_id_and_assigned_roles() {
    let (_config, context) =
        authorized_context(ValueMatch::Any, &["role1"], &["role1", "role2"], false, true)
            .await;
    let subject = context.subject().unwrap();
    assert_eq!(subject.id(), context.request_id());
    assert!(subject.has_role("role1"));
    assert!(subject.has_role("role2"));
}

#[tokio::test]
async fn required_authenticator_must_affirm() {
    use celastrina_core::asserter::Asserter;
    use celastrina_core::context::Context;
    use celastrina_core::error::CelastrinaError;
    use celastrina_core::sentry::Authenticator;
    use std::future::Future;
    use std::pin::Pin;

    struct Refusing;

    impl Authenticator for Refusing {
        fn name(&self) -> &str {
            "Refusing"
        }

        fn required(&self) -> bool {
            true
        }

        fn authenticate<'a>(
            &'a self,
            _context: &'a Context,
            asserter: &'a mut Asserter,
        ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
            let result = asserter.assert_with("Refusing", false, Vec::<String>::new(), None);
            Box::pin(std::future::ready(result))
        }
    }

    let mut config = Configuration::new("auth-test").unwrap();
    config.set_bootstrap(BootstrapConfig::default());
    config.add_authenticator(Box::new(Refusing));
    let config = Arc::new(config);
    let envelope = Arc::new(LocalEnvelope::new());
    config.initialize(envelope.as_ref()).await.unwrap();

    let context = Context::new(config.clone(), envelope);
    let err = config
        .sentry()
        .unwrap()
        .authenticate(&context)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 401);
}
