//! Resource lifecycle tests against a mocked Azure DevOps API
//!
//! Each test mounts the endpoints it expects to be hit, with call counts
//! verified when the mock server drops.

use adokit::ado::auth::Credentials;
use adokit::ado::client::AdoClient;
use adokit::ado::http::AdoHttpClient;
use adokit::cache::CacheKey;
use adokit::{AdoError, Identity, Session};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use wiremock::matchers::{any, body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPOS: &str = "/contoso/Fabrikam/_apis/git/repositories";
const ENVIRONMENTS: &str = "/contoso/Fabrikam/_apis/distributedtask/environments";

fn session(server: &MockServer) -> Arc<Session> {
    let http = AdoHttpClient::new(Credentials::new("me@example.com", "pat")).unwrap();
    let client = AdoClient::new(Arc::new(http), "contoso", "Fabrikam").with_base_url(&server.uri());
    Arc::new(Session::new(client))
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("params must be an object"),
    }
}

/// Repository create plus the push that seeds its README
async fn mount_repo_create(server: &MockServer, id: &str, name: &str) {
    Mock::given(method("POST"))
        .and(path(REPOS))
        .and(body_json(json!({"name": name})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": id, "name": name})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/{}/pushes", REPOS, id)))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"pushId": 1})))
        .expect(1)
        .mount(server)
        .await;
}

mod crud {
    use super::*;

    #[tokio::test]
    async fn test_create_then_delete_leaves_no_trace() {
        let server = MockServer::start().await;
        mount_repo_create(&server, "r1", "app").await;
        Mock::given(method("GET"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1", "name": "app"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();

        let repo = repos.create(params(json!({"name": "app"}))).await.unwrap();
        assert_eq!(repo.identity, Identity::from("r1"));
        assert!(session.ledger().contains("repositories", &repo.identity));

        repos.get_by_id(&repo.identity).await.unwrap();
        let key = CacheKey::new("repositories", "get_by_id", vec!["r1".to_string()]);
        assert!(session.cache().contains(&key));

        repos.delete(&repo.identity).await.unwrap();
        assert!(!session.ledger().contains("repositories", &repo.identity));
        assert!(session.ledger().is_empty());
        assert!(!session
            .cache()
            .keys()
            .iter()
            .any(|k| k.kind == "repositories" && k.references("r1")));
    }

    #[tokio::test]
    async fn test_two_reads_make_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1", "name": "app"})))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();
        let first = repos.get_by_id(&Identity::from("r1")).await.unwrap();
        let second = repos.get_by_id(&Identity::from("r1")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(session.cache().stats().misses, 1);
        assert_eq!(session.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_update_then_get_sees_new_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1", "name": "old"})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();
        let id = Identity::from("r1");
        assert_eq!(repos.get_by_id(&id).await.unwrap().get_str("name"), Some("old"));

        Mock::given(method("PATCH"))
            .and(path(format!("{}/r1", REPOS)))
            .and(body_json(json!({"name": "new"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1", "name": "new"})))
            .expect(1)
            .mount(&server)
            .await;

        let updated = repos.update(&id, "name", json!("new")).await.unwrap();
        assert_eq!(updated.get_str("name"), Some("new"));
        assert_eq!(repos.get_by_id(&id).await.unwrap().get_str("name"), Some("new"));
    }

    #[tokio::test]
    async fn test_update_applies_prefix_rule() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/r1", REPOS)))
            .and(body_json(json!({"defaultBranch": "refs/heads/main"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r1",
                "name": "app",
                "defaultBranch": "refs/heads/main"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();
        let updated = repos
            .update(&Identity::from("r1"), "default_branch", json!("main"))
            .await
            .unwrap();
        assert_eq!(updated.get_str("defaultBranch"), Some("refs/heads/main"));
    }

    #[tokio::test]
    async fn test_update_rejects_fields_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();
        let id = Identity::from("r1");

        let err = repos.update(&id, "project", json!("other")).await.unwrap_err();
        assert!(matches!(err, AdoError::Update { .. }));
        assert!(err.to_string().contains("default_branch"));

        let err = repos.update(&id, "is_disabled", json!("yes")).await.unwrap_err();
        assert!(matches!(err, AdoError::Update { .. }));
    }

    #[tokio::test]
    async fn test_delete_of_untracked_identity_keeps_ledger() {
        let server = MockServer::start().await;
        mount_repo_create(&server, "r1", "app").await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/elsewhere", REPOS)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/gone", REPOS)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "typeKey": "GitRepositoryNotFoundException"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();
        repos.create(params(json!({"name": "app"}))).await.unwrap();
        let before = session.ledger().entries();

        repos.delete(&Identity::from("elsewhere")).await.unwrap();
        // Already deleted on the backend
        repos.delete(&Identity::from("gone")).await.unwrap();

        assert_eq!(session.ledger().entries(), before);
    }

    #[tokio::test]
    async fn test_delete_refused_is_a_deletion_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "repository is disabled"})))
            .mount(&server)
            .await;

        let session = session(&server);
        let err = session
            .manager("repositories")
            .unwrap()
            .delete(&Identity::from("r1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AdoError::Deletion { .. }));
        assert!(err.to_string().contains("disabled"));
    }
}

mod create_errors {
    use super::*;

    #[tokio::test]
    async fn test_conflict_and_permission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REPOS))
            .and(body_json(json!({"name": "taken"})))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "TF400948: A Git repository with the name taken already exists"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(ENVIRONMENTS))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let session = session(&server);

        let err = session
            .manager("repositories")
            .unwrap()
            .create(params(json!({"name": "taken"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AdoError::Creation { .. }));
        assert!(err.to_string().contains("already exists"));

        let err = session
            .manager("environments")
            .unwrap()
            .create(params(json!({"name": "dev"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AdoError::Permission { status: 403, .. }));

        assert!(session.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();

        let err = repos.create(params(json!({}))).await.unwrap_err();
        assert!(matches!(err, AdoError::Creation { .. }));

        let err = repos
            .create(params(json!({"name": "app", "colour": "blue"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("colour"));

        let err = session.manager("projects").unwrap().create(Map::new()).await.unwrap_err();
        assert!(matches!(err, AdoError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let server = MockServer::start().await;
        let session = session(&server);
        assert!(matches!(
            session.manager("spaceships"),
            Err(AdoError::UnknownKind(_))
        ));
    }
}

mod reads {
    use super::*;

    #[tokio::test]
    async fn test_get_by_name_ambiguity_and_absence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ENVIRONMENTS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "value": [
                    {"id": 1, "name": "dev"},
                    {"id": 2, "name": "dev"},
                    {"id": 3, "name": "prod"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let environments = session.manager("environments").unwrap();

        let err = environments.get_by_name("dev").await.unwrap_err();
        assert!(matches!(err, AdoError::Ambiguous { count: 2, .. }));

        let prod = environments.get_by_name("prod").await.unwrap();
        assert_eq!(prod.identity, Identity::Int(3));

        let err = environments.get_by_name("Prod").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unique_names_return_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(REPOS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "r1", "name": "app"}, {"id": "r2", "name": "app"}]
            })))
            .mount(&server)
            .await;

        let session = session(&server);
        let repo = session
            .manager("repositories")
            .unwrap()
            .get_by_name("app")
            .await
            .unwrap();
        assert_eq!(repo.identity, Identity::from("r1"));
    }

    #[tokio::test]
    async fn test_get_all_follows_continuation_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(REPOS))
            .and(query_param_is_missing("continuationToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "r1", "name": "a"}, {"id": "r2", "name": "b"}],
                "continuationToken": "page2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(REPOS))
            .and(query_param("continuationToken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "r3", "name": "c"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();
        let names: Vec<String> = repos
            .get_all()
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.get_str("name").map(String::from))
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let found = repos.find(|r| r.get_str("name") == Some("c")).await.unwrap();
        assert_eq!(found.map(|r| r.identity), Some(Identity::from("r3")));
        assert_eq!(repos.filter(|r| r.get_str("name") != Some("b")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_all_follows_continuation_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contoso/Fabrikam/_apis/build/builds"))
            .and(query_param_is_missing("continuationToken"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-continuationtoken", "2024-01-01T00:00:00Z")
                    .set_body_json(json!({"count": 2, "value": [{"id": 1}, {"id": 2}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/contoso/Fabrikam/_apis/build/builds"))
            .and(query_param("continuationToken", "2024-01-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 1, "value": [{"id": 3}]})))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let ids: Vec<Identity> = session
            .manager("builds")
            .unwrap()
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.identity)
            .collect();
        assert_eq!(ids, vec![Identity::Int(1), Identity::Int(2), Identity::Int(3)]);
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contoso/Fabrikam/_apis/build/builds/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let session = session(&server);
        let err = session
            .manager("builds")
            .unwrap()
            .get_by_id(&Identity::Int(404))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_kinds_without_item_endpoint_resolve_through_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/r1/refs", REPOS)))
            .and(query_param("filter", "heads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"name": "refs/heads/main", "objectId": "aaa"},
                    {"name": "refs/heads/dev", "objectId": "bbb"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let branches = session
            .manager("branches")
            .unwrap()
            .scoped("repository_id", "r1");

        let dev = branches
            .get_by_id(&Identity::from("refs/heads/dev"))
            .await
            .unwrap();
        assert_eq!(dev.get_str("objectId"), Some("bbb"));

        let err = branches
            .get_by_id(&Identity::from("refs/heads/nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

mod teardown {
    use super::*;

    #[tokio::test]
    async fn test_revert_all_deletes_newest_first_and_reports_failures() {
        let server = MockServer::start().await;
        mount_repo_create(&server, "r1", "app").await;
        Mock::given(method("POST"))
            .and(path(ENVIRONMENTS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "name": "dev"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/7", ENVIRONMENTS)))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "try later"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        session
            .manager("repositories")
            .unwrap()
            .create(params(json!({"name": "app"})))
            .await
            .unwrap();
        session
            .manager("environments")
            .unwrap()
            .create(params(json!({"name": "dev"})))
            .await
            .unwrap();

        let report = session.revert_all().await;

        assert!(!report.is_clean());
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.deleted[0].kind, "repositories");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0.kind, "environments");
        assert!(matches!(report.failures[0].1, AdoError::Deletion { .. }));

        // The failed entry stays for a later retry
        let remaining = session.ledger().entries();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].identity, Identity::Int(7));

        let deletes: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.as_str() == "DELETE")
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(
            deletes,
            vec![format!("{}/7", ENVIRONMENTS), format!("{}/r1", REPOS)]
        );
    }

    #[tokio::test]
    async fn test_deleting_owner_forgets_owned_resources() {
        let server = MockServer::start().await;
        mount_repo_create(&server, "r1", "app").await;
        Mock::given(method("POST"))
            .and(path(format!("{}/r1/pullrequests", REPOS)))
            .and(body_json(json!({
                "sourceRefName": "refs/heads/feature",
                "targetRefName": "refs/heads/main",
                "title": "Add feature"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "pullRequestId": 11,
                "title": "Add feature"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/r1/pullrequests", REPOS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"pullRequestId": 11, "title": "Add feature"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/r1", REPOS)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repos = session.manager("repositories").unwrap();
        let repo = repos.create(params(json!({"name": "app"}))).await.unwrap();

        let pull_requests = session
            .manager("pull-requests")
            .unwrap()
            .scoped("repository_id", &repo.identity);
        let pr = pull_requests
            .create(params(json!({
                "source_branch": "feature",
                "target_branch": "main",
                "title": "Add feature"
            })))
            .await
            .unwrap();
        assert_eq!(pr.identity, Identity::Int(11));
        assert_eq!(pull_requests.get_all().await.unwrap().len(), 1);
        assert_eq!(session.ledger().len(), 2);

        repos.delete(&repo.identity).await.unwrap();

        assert!(session.ledger().is_empty());
        assert!(!session
            .cache()
            .keys()
            .iter()
            .any(|k| k.kind == "pull-requests"));
    }

    #[tokio::test]
    async fn test_pull_requests_are_abandoned_not_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/r1/pullrequests/11", REPOS)))
            .and(body_json(json!({"status": "abandoned"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pullRequestId": 11,
                "status": "abandoned"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        session
            .manager("pull-requests")
            .unwrap()
            .scoped("repository_id", "r1")
            .delete(&Identity::Int(11))
            .await
            .unwrap();
    }
}

mod follow_ups {
    use super::*;

    fn readme_push() -> Value {
        json!({
            "refUpdates": [
                {"name": "refs/heads/main", "oldObjectId": "0000000000000000000000000000000000000000"}
            ],
            "commits": [{
                "comment": "Add README.md",
                "changes": [{
                    "changeType": "add",
                    "item": {"path": "/README.md"},
                    "newContent": {"content": "# README\n", "contentType": "rawtext"}
                }]
            }]
        })
    }

    #[tokio::test]
    async fn test_new_repository_gets_a_readme_commit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REPOS))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "r1", "name": "app"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/r1/pushes", REPOS)))
            .and(body_json(readme_push()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"pushId": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let repo = session
            .manager("repositories")
            .unwrap()
            .create(params(json!({"name": "app", "include_readme": true})))
            .await
            .unwrap();
        assert_eq!(repo.identity, Identity::from("r1"));
    }

    #[tokio::test]
    async fn test_readme_can_be_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REPOS))
            .and(body_json(json!({"name": "bare"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "r2", "name": "bare"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/r2/pushes", REPOS)))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let session = session(&server);
        session
            .manager("repositories")
            .unwrap()
            .create(params(json!({"name": "bare", "include_readme": false})))
            .await
            .unwrap();
        assert!(session.ledger().contains("repositories", &Identity::from("r2")));
    }

    #[tokio::test]
    async fn test_failed_readme_push_still_tracks_the_repository() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REPOS))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "r3", "name": "app"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/r3/pushes", REPOS)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "TF401028: The reference has already been updated"})))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let err = session
            .manager("repositories")
            .unwrap()
            .create(params(json!({"name": "app"})))
            .await
            .unwrap_err();

        assert!(matches!(err, AdoError::Creation { .. }));
        assert!(err.to_string().contains("TF401028"));
        assert!(session.ledger().contains("repositories", &Identity::from("r3")));
    }

    #[tokio::test]
    async fn test_readme_toggle_must_be_a_boolean() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = session(&server);
        let err = session
            .manager("repositories")
            .unwrap()
            .create(params(json!({"name": "app", "include_readme": "yes"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("include_readme"));
    }
}

mod branches {
    use super::*;

    const REFS: &str = "/contoso/Fabrikam/_apis/git/repositories/r1/refs";

    async fn mount_ref_update(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(REFS))
            .and(body_json(json!([{
                "oldObjectId": "0000000000000000000000000000000000000000",
                "name": "refs/heads/feature",
                "newObjectId": "abc123"
            }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "value": [{
                    "name": "refs/heads/feature",
                    "oldObjectId": "0000000000000000000000000000000000000000",
                    "newObjectId": "abc123",
                    "success": true
                }]
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn feature() -> Map<String, Value> {
        params(json!({"name": "feature", "object_id": "abc123"}))
    }

    #[tokio::test]
    async fn test_create_reads_the_branch_back() {
        let server = MockServer::start().await;
        mount_ref_update(&server).await;
        Mock::given(method("GET"))
            .and(path(REFS))
            .and(query_param("filter", "heads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"name": "refs/heads/main", "objectId": "fff000"},
                    {"name": "refs/heads/feature", "objectId": "abc123", "creator": {"displayName": "Jamie"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        let branches = session.manager("branches").unwrap().scoped("repository_id", "r1");
        let branch = branches.create(feature()).await.unwrap();

        assert_eq!(branch.identity, Identity::from("refs/heads/feature"));
        assert_eq!(branch.get_str("objectId"), Some("abc123"));
        assert!(branch.get("creator").is_some());

        let entry = &session.ledger().entries()[0];
        assert_eq!(entry.kind, "branches");
        assert_eq!(entry.scope.get("repository_id").map(String::as_str), Some("r1"));
    }

    #[tokio::test]
    async fn test_failed_read_back_keeps_the_created_branch() {
        let server = MockServer::start().await;
        mount_ref_update(&server).await;
        Mock::given(method("GET"))
            .and(path(REFS))
            .respond_with(ResponseTemplate::new(500))
            .expect(1..)
            .mount(&server)
            .await;

        let session = session(&server);
        let branches = session.manager("branches").unwrap().scoped("repository_id", "r1");
        let branch = branches.create(feature()).await.unwrap();

        assert_eq!(branch.identity, Identity::from("refs/heads/feature"));
        assert_eq!(branch.get_str("newObjectId"), Some("abc123"));
        assert!(session
            .ledger()
            .contains("branches", &Identity::from("refs/heads/feature")));
    }

    #[tokio::test]
    async fn test_delete_addresses_the_encoded_ref() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/refs%2Fheads%2Ffeature", REFS)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        session
            .manager("branches")
            .unwrap()
            .scoped("repository_id", "r1")
            .delete(&Identity::from("refs/heads/feature"))
            .await
            .unwrap();
    }
}

mod plan {
    use super::*;
    use adokit::PlannedAction;

    fn planning_session(server: &MockServer) -> Arc<Session> {
        let http = AdoHttpClient::new(Credentials::new("me@example.com", "pat")).unwrap();
        let client = AdoClient::new(Arc::new(http), "contoso", "Fabrikam").with_base_url(&server.uri());
        Arc::new(Session::new(client).with_plan_mode())
    }

    #[tokio::test]
    async fn test_mutations_are_recorded_not_sent() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = planning_session(&server);
        let environments = session.manager("environments").unwrap();

        let created = environments
            .create(params(json!({"name": "staging"})))
            .await
            .unwrap();
        assert_eq!(created.get_str("name"), Some("staging"));

        let renamed = environments
            .update(&Identity::Int(7), "name", json!("production"))
            .await
            .unwrap();
        assert_eq!(renamed.identity, Identity::Int(7));

        environments.delete(&Identity::Int(7)).await.unwrap();

        let changes = session.plan().unwrap().changes();
        let actions: Vec<PlannedAction> = changes.iter().map(|c| c.action).collect();
        assert_eq!(
            actions,
            vec![PlannedAction::Create, PlannedAction::Update, PlannedAction::Delete]
        );
        assert_eq!(changes[0].identity, created.identity);
        assert_eq!(changes[0].body, Some(json!({"name": "staging"})));
        assert!(changes[2].url.contains("/_apis/distributedtask/environments/7"));
        assert!(session.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_planned_repository_includes_its_readme_push() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = planning_session(&server);
        session
            .manager("repositories")
            .unwrap()
            .create(params(json!({"name": "app"})))
            .await
            .unwrap();

        let changes = session.plan().unwrap().changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].body, Some(json!({"name": "app"})));
        assert!(changes[1].url.contains("/pushes"));
        assert_eq!(changes[1].identity, changes[0].identity);
    }
}
