use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use celastrina_core::identity::{AppRegistrationResolver, ManagedIdentityResolver};
use celastrina_core::resources::{ResourceAuthorization, TokenResolver};

fn unix_in(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}

#[tokio::test]
async fn managed_identity_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("api-version", "2019-08-01"))
        .and(query_param("resource", "https://r.example"))
        .and(header("x-identity-header", "h-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T1",
            "expires_on": unix_in(1800),
            "resource": "https://r.example",
            "token_type": "Bearer",
            "client_id": "c-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = ManagedIdentityResolver::new(server.uri(), "h-secret").unwrap();
    let token = resolver.resolve("https://r.example").await.unwrap();
    assert_eq!(token.token(), "T1");
    assert_eq!(token.resource(), "https://r.example");
}

#[tokio::test]
async fn default_suffix_is_stripped_before_the_call() {
    let server = MockServer::start().await;
    // The mock only matches the bare resource; a request carrying the
    // /.default suffix would fall through and fail.
    Mock::given(method("GET"))
        .and(query_param("resource", "https://r.example"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T1",
            "expires_on": unix_in(1800)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = ManagedIdentityResolver::new(server.uri(), "h").unwrap();
    let token = resolver.resolve("https://r.example/.default").await.unwrap();
    // The token is stored under the resource as requested.
    assert_eq!(token.resource(), "https://r.example/.default");
}

#[tokio::test]
async fn concurrent_callers_cause_one_upstream_get() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "access_token": "T1",
                    "expires_on": unix_in(1800)
                }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let resolver = ManagedIdentityResolver::with_timeout(
        server.uri(),
        "h",
        Duration::from_secs(5),
    )
    .unwrap();
    let authorization = Arc::new(ResourceAuthorization::new("mi", Box::new(resolver)));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let authorization = authorization.clone();
        handles.push(tokio::spawn(async move {
            authorization.get_token("R").await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "T1");
    }
}

#[tokio::test]
async fn principal_id_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("principal_id", "p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T1",
            "expires_on": unix_in(1800)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = ManagedIdentityResolver::new(server.uri(), "h")
        .unwrap()
        .with_principal_id("p-1");
    resolver.resolve("https://r.example").await.unwrap();
}

#[tokio::test]
async fn identity_endpoint_rejection_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let resolver = ManagedIdentityResolver::new(server.uri(), "h").unwrap();
    let err = resolver.resolve("https://r.example").await.unwrap_err();
    assert_eq!(err.code(), 401);
}

#[tokio::test]
async fn iso_expiry_strings_are_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T1",
            "expires_on": "2031-01-01T00:00:00+00:00"
        })))
        .mount(&server)
        .await;

    let resolver = ManagedIdentityResolver::new(server.uri(), "h").unwrap();
    let token = resolver.resolve("https://r.example").await.unwrap();
    assert_eq!(token.expires().timestamp(), 1_924_992_000);
}

#[tokio::test]
async fn app_registration_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "APP-T1",
            "expires_on": unix_in(3600)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AppRegistrationResolver::new(
        server.uri(),
        "tenant-1",
        "client-1",
        "s3cret",
    )
    .unwrap();
    let token = resolver.resolve("https://graph.example").await.unwrap();
    assert_eq!(token.token(), "APP-T1");
}

#[tokio::test]
async fn app_registration_relative_expiry_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "APP-T1",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let resolver =
        AppRegistrationResolver::new(server.uri(), "t", "c", "s").unwrap();
    let token = resolver.resolve("https://graph.example").await.unwrap();
    let remaining = token.expires().timestamp() - chrono::Utc::now().timestamp();
    assert!(remaining > 3500 && remaining <= 3600);
}

#[tokio::test]
async fn app_registration_rejection_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_client"
        })))
        .mount(&server)
        .await;

    let resolver =
        AppRegistrationResolver::new(server.uri(), "t", "c", "bad").unwrap();
    let err = resolver.resolve("https://graph.example").await.unwrap_err();
    assert_eq!(err.code(), 401);
}
