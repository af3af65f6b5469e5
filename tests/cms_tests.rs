use base64::Engine;
use chrono::Utc;
use galley::cms::{CmsClient, NewPost, PostStatus};
use galley::config::CmsConfig;
use galley::error::CmsError;
use galley::models::SiteConnection;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn site(server: &MockServer) -> SiteConnection {
    SiteConnection {
        id: "site-1".to_string(),
        name: "Test Blog".to_string(),
        base_url: server.uri(),
        username: "editor".to_string(),
        app_password: "abcd efgh".to_string(),
        created_at: Utc::now(),
    }
}

fn direct_client() -> CmsClient {
    let config = CmsConfig {
        relay: String::new(),
        ..CmsConfig::default()
    };
    CmsClient::new(&config).expect("client")
}

fn relayed_client(server: &MockServer) -> CmsClient {
    let config = CmsConfig {
        relay: format!("{}/relay?url=", server.uri()),
        ..CmsConfig::default()
    };
    CmsClient::new(&config).expect("client")
}

fn basic_auth() -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode("editor:abcd efgh");
    format!("Basic {encoded}")
}

#[tokio::test]
async fn categories_come_from_the_rest_route_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .and(query_param("per_page", "100"))
        .and(query_param("hide_empty", "false"))
        .and(header("authorization", basic_auth().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 4, "name": "News", "count": 2 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let categories = direct_client()
        .list_categories(&site(&server))
        .await
        .expect("categories");

    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].id, 4);
    assert_eq!(categories[0].name, "News");
}

#[tokio::test]
async fn category_listing_pages_until_a_short_page() {
    let server = MockServer::start().await;
    let full_page: Vec<_> = (1..=100)
        .map(|i| json!({ "id": i, "name": format!("c{i}"), "count": 0 }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(full_page)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 101, "name": "last", "count": 1 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let categories = direct_client()
        .list_categories(&site(&server))
        .await
        .expect("categories");
    assert_eq!(categories.len(), 101);
}

#[tokio::test]
async fn not_found_falls_through_to_the_query_string_route() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("rest_route", "/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 9, "name": "Fallback", "count": 0 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let categories = direct_client()
        .list_categories(&site(&server))
        .await
        .expect("categories");
    assert_eq!(categories[0].name, "Fallback");
}

#[tokio::test]
async fn rejected_credentials_stop_the_tier_walk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    // The query-string route must never be tried after an auth rejection.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = direct_client()
        .list_categories(&site(&server))
        .await
        .expect_err("should fail");

    match err {
        CmsError::Auth { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_tiers_report_the_last_failure_with_remediation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let err = direct_client()
        .list_categories(&site(&server))
        .await
        .expect_err("should fail");

    let message = err.to_string();
    assert!(message.contains("HTTP 502"), "missing last status: {message}");
    assert!(message.contains("rest_route"), "missing last URL: {message}");
    assert!(message.contains("security plugin"), "missing remediation: {message}");
}

#[tokio::test]
async fn relayed_tier_carries_the_encoded_direct_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("rest_route", "/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let direct_url = format!(
        "{}/wp-json/wp/v2/categories?per_page=100&page=1&hide_empty=false",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/relay"))
        .and(query_param("url", direct_url.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 77, "name": "Relayed", "count": 5 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let categories = relayed_client(&server)
        .list_categories(&site(&server))
        .await
        .expect("categories");
    assert_eq!(categories[0].id, 77);
}

#[tokio::test]
async fn garbled_success_body_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = direct_client()
        .list_categories(&site(&server))
        .await
        .expect_err("should fail");
    assert!(matches!(err, CmsError::InvalidResponse(_)));
}

#[tokio::test]
async fn media_upload_sends_raw_bytes_with_file_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/media"))
        .and(header("content-type", "image/png"))
        .and(header(
            "content-disposition",
            "attachment; filename=\"cover.png\"",
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 31,
            "source_url": "https://blog.example/wp-content/uploads/cover.png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let media = direct_client()
        .upload_media(&site(&server), "cover.png", "image/png", b"PNGDATA")
        .await
        .expect("upload");

    assert_eq!(media.id, 31);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body, b"PNGDATA");
}

#[tokio::test]
async fn create_post_omits_unset_optional_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(body_partial_json(json!({
            "title": "Hello",
            "status": "publish"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 7,
            "link": "https://blog.example/hello"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let post = NewPost {
        title: "Hello".to_string(),
        content: "<p>Body</p>".to_string(),
        status: PostStatus::Publish,
        slug: None,
        excerpt: None,
        categories: Vec::new(),
        featured_media: None,
    };
    let created = direct_client()
        .create_post(&site(&server), &post)
        .await
        .expect("post");
    assert_eq!(created.id, 7);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let object = body.as_object().unwrap();
    assert!(!object.contains_key("slug"));
    assert!(!object.contains_key("excerpt"));
    assert!(!object.contains_key("categories"));
    assert!(!object.contains_key("featured_media"));
}

#[tokio::test]
async fn create_post_carries_optional_fields_when_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(body_partial_json(json!({
            "title": "Hello",
            "status": "draft",
            "slug": "hello-world",
            "categories": [4],
            "featured_media": 31
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 8,
            "link": "https://blog.example/?p=8"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let post = NewPost {
        title: "Hello".to_string(),
        content: "<p>Body</p>".to_string(),
        status: PostStatus::Draft,
        slug: Some("hello-world".to_string()),
        excerpt: Some("A short summary".to_string()),
        categories: vec![4],
        featured_media: Some(31),
    };
    let created = direct_client()
        .create_post(&site(&server), &post)
        .await
        .expect("post");
    assert_eq!(created.link, "https://blog.example/?p=8");
}
