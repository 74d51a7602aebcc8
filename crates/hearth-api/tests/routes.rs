use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::{AUTHORIZATION, CONTENT_TYPE}},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use hearth_api::{AppState, AppStateInner, Storage, router};
use hearth_db::Database;
use hearth_ledger::SplitPolicy;

struct TestContext {
    _temp_dir: TempDir,
    state: AppState,
    app: Router,
}

impl TestContext {
    async fn new() -> Self {
        Self::with_policy(SplitPolicy::Remainder).await
    }

    async fn with_policy(split_policy: SplitPolicy) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("storage"), "http://localhost:3000")
            .await
            .unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            storage,
            jwt_secret: "test-secret-for-routes".into(),
            token_ttl_days: 1,
            split_policy,
            invite_attempts: 5,
        });
        Self {
            _temp_dir: temp_dir,
            app: router(state.clone()),
            state,
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        // /health answers in plain text.
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn get_raw(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    /// Register a user and return (user_id, token).
    async fn register(&self, name: &str) -> (String, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": format!("{}@example.com", name),
                    "password": "correct horse",
                    "username": name,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Create a house as `token` and return its JSON.
    async fn create_house(&self, token: &str) -> Value {
        let (status, body) = self
            .request(
                Method::POST,
                "/houses",
                Some(token),
                Some(json!({ "name": "X", "address": "Y" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    async fn join(&self, token: &str, code: &str) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            "/houses/join",
            Some(token),
            Some(json!({ "invite_code": code })),
        )
        .await
    }
}

#[tokio::test]
async fn test_register_and_login() {
    let ctx = TestContext::new().await;
    let (user_id, _) = ctx.register("ana").await;

    let (status, body) = ctx
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ANA@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id);
    assert_eq!(body["username"], "ana");

    let (status, body) = ctx
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, _) = ctx
        .request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "ana@example.com", "password": "another one", "username": "ana2" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_protected_routes_need_a_token() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.request(Method::GET, "/houses", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = ctx.request(Method::GET, "/houses", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_fields_are_rejected() {
    let ctx = TestContext::new().await;
    let (_, token) = ctx.register("ana").await;

    let (status, body) = ctx
        .request(
            Method::POST,
            "/houses",
            Some(&token),
            Some(json!({ "name": "X", "address": "Y", "owner": "someone-else" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown field `owner`"), "{}", body);

    let (status, body) = ctx
        .request(
            Method::POST,
            "/houses",
            Some(&token),
            Some(json!({ "name": "X" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{}", body);
}

#[tokio::test]
async fn test_malformed_ids_answer_with_json_errors() {
    let ctx = TestContext::new().await;
    let (_, token) = ctx.register("ana").await;

    let (status, body) = ctx
        .request(Method::GET, "/houses/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{}", body);

    let (status, body) = ctx
        .request(
            Method::PATCH,
            "/payments/42",
            Some(&token),
            Some(json!({ "paid": true })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{}", body);
}

#[tokio::test]
async fn test_create_house_makes_creator_admin() {
    let ctx = TestContext::new().await;
    let (user_id, token) = ctx.register("ana").await;

    let house = ctx.create_house(&token).await;
    assert_eq!(house["name"], "X");
    assert_eq!(house["address"], "Y");
    assert_eq!(house["currency"], "USD");
    let code = house["invite_code"].as_str().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));

    let uri = format!("/houses/{}/members", house["id"].as_str().unwrap());
    let (status, members) = ctx.request(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let members = members.as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["user_id"], user_id);
    assert_eq!(members[0]["is_admin"], true);
    assert_eq!(members[0]["is_home"], false);

    let (_, houses) = ctx.request(Method::GET, "/houses", Some(&token), None).await;
    assert_eq!(houses.as_array().unwrap().len(), 1);
    assert_eq!(houses[0]["is_admin"], true);
}

#[tokio::test]
async fn test_join_house() {
    let ctx = TestContext::new().await;
    let (_, ana) = ctx.register("ana").await;
    let (bo_id, bo) = ctx.register("bob").await;
    let house = ctx.create_house(&ana).await;
    let code = house["invite_code"].as_str().unwrap();

    let (status, body) = ctx.join(&bo, "ZZZZZZ").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid invite code");
    let (_, houses) = ctx.request(Method::GET, "/houses", Some(&bo), None).await;
    assert!(houses.as_array().unwrap().is_empty());

    let (status, _) = ctx.join(&bo, "short").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, joined) = ctx.join(&bo, &format!("  {} ", code.to_lowercase())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["id"], house["id"]);

    let (status, _) = ctx.join(&bo, code).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/houses/{}/members", house["id"].as_str().unwrap());
    let (_, members) = ctx.request(Method::GET, &uri, Some(&bo), None).await;
    let members = members.as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[1]["user_id"], bo_id);
    assert_eq!(members[1]["is_admin"], false);
}

#[tokio::test]
async fn test_outsiders_cannot_see_a_house() {
    let ctx = TestContext::new().await;
    let (_, ana) = ctx.register("ana").await;
    let (_, eve) = ctx.register("eve").await;
    let house = ctx.create_house(&ana).await;
    let house_id = house["id"].as_str().unwrap();

    for uri in [
        format!("/houses/{}", house_id),
        format!("/houses/{}/members", house_id),
        format!("/houses/{}/expenses", house_id),
        format!("/houses/{}/notes", house_id),
    ] {
        let (status, _) = ctx.request(Method::GET, &uri, Some(&eve), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_expense_split_with_remainder() {
    let ctx = TestContext::new().await;
    let (ana_id, ana) = ctx.register("ana").await;
    let (bo_id, bo) = ctx.register("bob").await;
    let (cy_id, cy) = ctx.register("cyd").await;
    let house = ctx.create_house(&ana).await;
    let code = house["invite_code"].as_str().unwrap();
    ctx.join(&bo, code).await;
    ctx.join(&cy, code).await;

    let uri = format!("/houses/{}/expenses", house["id"].as_str().unwrap());
    let (status, expense) = ctx
        .request(
            Method::POST,
            &uri,
            Some(&ana),
            Some(json!({
                "title": "Internet",
                "amount": 10.00,
                "is_recurring": true,
                "recurrence_period": "monthly",
                "split_with": [ana_id, bo_id, cy_id],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", expense);
    assert_eq!(expense["amount_cents"], 1000);
    assert_eq!(expense["amount"], "$10.00");
    assert_eq!(expense["recurrence_period"], "monthly");

    let payments = expense["payments"].as_array().unwrap();
    assert_eq!(payments.len(), 3);
    let cents: Vec<i64> = payments.iter().map(|p| p["amount_cents"].as_i64().unwrap()).collect();
    assert_eq!(cents.iter().sum::<i64>(), 1000);
    assert_eq!(cents.iter().filter(|c| **c == 334).count(), 1);
    assert!(payments.iter().all(|p| p["paid"] == false));

    let (_, list) = ctx.request(Method::GET, &uri, Some(&bo), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["payments"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_expense_split_equal_truncates() {
    let ctx = TestContext::with_policy(SplitPolicy::Equal).await;
    let (ana_id, ana) = ctx.register("ana").await;
    let (bo_id, bo) = ctx.register("bob").await;
    let (cy_id, cy) = ctx.register("cyd").await;
    let house = ctx.create_house(&ana).await;
    let code = house["invite_code"].as_str().unwrap();
    ctx.join(&bo, code).await;
    ctx.join(&cy, code).await;

    let uri = format!("/houses/{}/expenses", house["id"].as_str().unwrap());
    let (status, expense) = ctx
        .request(
            Method::POST,
            &uri,
            Some(&ana),
            Some(json!({ "title": "Pizza", "amount": 10.00, "split_with": [ana_id, bo_id, cy_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let payments = expense["payments"].as_array().unwrap();
    assert!(payments.iter().all(|p| p["amount"] == "$3.33"));
    let sum: i64 = payments.iter().map(|p| p["amount_cents"].as_i64().unwrap()).sum();
    assert_eq!(sum, 999);
}

#[tokio::test]
async fn test_expense_validation() {
    let ctx = TestContext::new().await;
    let (ana_id, ana) = ctx.register("ana").await;
    let (eve_id, _) = ctx.register("eve").await;
    let house = ctx.create_house(&ana).await;
    let uri = format!("/houses/{}/expenses", house["id"].as_str().unwrap());

    let (status, body) = ctx
        .request(
            Method::POST,
            &uri,
            Some(&ana),
            Some(json!({ "title": "Rent", "amount": 900.0, "split_with": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please select at least one member");

    let (status, _) = ctx
        .request(
            Method::POST,
            &uri,
            Some(&ana),
            Some(json!({ "title": "Rent", "amount": -5.0, "split_with": [ana_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .request(
            Method::POST,
            &uri,
            Some(&ana),
            Some(json!({ "title": "Rent", "amount": 900.0, "split_with": [ana_id, eve_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .request(
            Method::POST,
            &uri,
            Some(&ana),
            Some(json!({ "title": "Rent", "amount": 900.0, "is_recurring": true, "split_with": [ana_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = ctx.request(Method::GET, &uri, Some(&ana), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_payment_permissions() {
    let ctx = TestContext::new().await;
    let (ana_id, ana) = ctx.register("ana").await;
    let (bo_id, bo) = ctx.register("bob").await;
    let (_, cy) = ctx.register("cyd").await;
    let house = ctx.create_house(&ana).await;
    let code = house["invite_code"].as_str().unwrap();
    ctx.join(&bo, code).await;
    ctx.join(&cy, code).await;

    let uri = format!("/houses/{}/expenses", house["id"].as_str().unwrap());
    let (_, expense) = ctx
        .request(
            Method::POST,
            &uri,
            Some(&ana),
            Some(json!({ "title": "Milk", "amount": 4.0, "split_with": [ana_id, bo_id] })),
        )
        .await;
    let bo_payment = expense["payments"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["user_id"] == bo_id)
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let payment_uri = format!("/payments/{}", bo_payment);

    let (status, _) = ctx
        .request(Method::PATCH, &payment_uri, Some(&cy), Some(json!({ "paid": true })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, payment) = ctx
        .request(Method::PATCH, &payment_uri, Some(&bo), Some(json!({ "paid": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["paid"], true);
    assert!(payment["paid_at"].is_string());

    let (status, payment) = ctx
        .request(Method::PATCH, &payment_uri, Some(&ana), Some(json!({ "paid": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["paid"], false);
    assert!(payment["paid_at"].is_null());
}

#[tokio::test]
async fn test_presence_toggle() {
    let ctx = TestContext::new().await;
    let (_, ana) = ctx.register("ana").await;
    let house = ctx.create_house(&ana).await;
    let house_id = house["id"].as_str().unwrap();

    let presence_uri = format!("/houses/{}/presence", house_id);
    let (_, initial) = ctx.request(Method::GET, &presence_uri, Some(&ana), None).await;
    assert_eq!(initial["is_home"], false);
    assert!(initial["last_updated"].is_null());

    let toggle_uri = format!("/houses/{}/presence/toggle", house_id);
    let (status, first) = ctx.request(Method::POST, &toggle_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["is_home"], true);
    assert!(first["last_updated"].is_string());

    let (_, second) = ctx.request(Method::POST, &toggle_uri, Some(&ana), None).await;
    assert_eq!(second["is_home"], false);
    assert!(second["last_updated"].as_str() >= first["last_updated"].as_str());

    let (_, members) = ctx
        .request(Method::GET, &format!("/houses/{}/members", house_id), Some(&ana), None)
        .await;
    assert_eq!(members[0]["is_home"], false);
    assert!(members[0]["presence_updated_at"].is_string());
}

#[tokio::test]
async fn test_note_with_images_and_delete() {
    let ctx = TestContext::new().await;
    let (_, ana) = ctx.register("ana").await;
    let (_, bo) = ctx.register("bob").await;
    let house = ctx.create_house(&ana).await;
    ctx.join(&bo, house["invite_code"].as_str().unwrap()).await;
    let notes_uri = format!("/houses/{}/notes", house["id"].as_str().unwrap());

    let png = b"\x89PNG\r\n\x1a\nfake image bytes";
    let (status, note) = ctx
        .request(
            Method::POST,
            &notes_uri,
            Some(&ana),
            Some(json!({
                "title": "Bins",
                "content": "Bins go out Tuesday",
                "category": "reminder",
                "images": [
                    { "content_type": "image/png", "data": B64.encode(png) },
                    { "content_type": "image/jpeg", "data": B64.encode(b"jpeg bytes") },
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", note);
    assert_eq!(note["category"], "reminder");
    let images = note["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["content_type"], "image/png");
    assert_eq!(images[0]["size"], png.len());

    let url = images[0]["url"].as_str().unwrap();
    let path = url.strip_prefix("http://localhost:3000").unwrap();
    let (status, bytes) = ctx.get_raw(path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, png);

    let note_uri = format!("{}/{}", notes_uri, note["id"].as_str().unwrap());
    let (status, _) = ctx.request(Method::DELETE, &note_uri, Some(&bo), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, notes) = ctx.request(Method::GET, &notes_uri, Some(&bo), None).await;
    assert_eq!(notes.as_array().unwrap().len(), 1);

    let (status, _) = ctx.request(Method::DELETE, &note_uri, Some(&ana), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, notes) = ctx.request(Method::GET, &notes_uri, Some(&ana), None).await;
    assert!(notes.as_array().unwrap().is_empty());

    let (status, _) = ctx.get_raw(path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_note_images_removed_when_rows_fail() {
    let ctx = TestContext::new().await;
    let (_, ana) = ctx.register("ana").await;
    let house = ctx.create_house(&ana).await;
    let notes_uri = format!("/houses/{}/notes", house["id"].as_str().unwrap());

    ctx.state
        .db
        .with_conn(|conn| {
            conn.execute_batch("DROP TABLE note_images")?;
            Ok(())
        })
        .unwrap();

    let png = b"\x89PNG\r\n\x1a\nfake image bytes";
    let (status, body) = ctx
        .request(
            Method::POST,
            &notes_uri,
            Some(&ana),
            Some(json!({
                "title": "Bins",
                "content": "",
                "images": [
                    { "content_type": "image/png", "data": B64.encode(png) },
                    { "content_type": "image/png", "data": B64.encode(png) },
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", body);
    assert!(ctx.state.storage.list().await.unwrap().is_empty());


    let notes: i64 = ctx
        .state
        .db
        .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?))
        .unwrap();
    assert_eq!(notes, 0);
}

#[tokio::test]
async fn test_note_rejects_bad_images() {
    let ctx = TestContext::new().await;
    let (_, ana) = ctx.register("ana").await;
    let house = ctx.create_house(&ana).await;
    let notes_uri = format!("/houses/{}/notes", house["id"].as_str().unwrap());

    let (status, body) = ctx
        .request(
            Method::POST,
            &notes_uri,
            Some(&ana),
            Some(json!({
                "title": "Doc",
                "content": "",
                "images": [{ "content_type": "application/pdf", "data": B64.encode(b"%PDF") }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Images"));

    let (status, _) = ctx
        .request(
            Method::POST,
            &notes_uri,
            Some(&ana),
            Some(json!({
                "title": "Doc",
                "content": "",
                "images": [{ "content_type": "image/png", "data": "!!not base64!!" }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, notes) = ctx.request(Method::GET, &notes_uri, Some(&ana), None).await;
    assert!(notes.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_profile_update_and_avatar() {
    let ctx = TestContext::new().await;
    let (_, ana) = ctx.register("ana").await;

    let (status, profile) = ctx
        .request(Method::PATCH, "/profile", Some(&ana), Some(json!({ "username": "Ana B" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "Ana B");
    assert_eq!(profile["email"], "ana@example.com");

    let put_avatar = |content_type: &str, body: Vec<u8>| {
        Request::builder()
            .method(Method::PUT)
            .uri("/profile/avatar")
            .header(AUTHORIZATION, format!("Bearer {}", ana))
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    };

    let response = ctx.app.clone().oneshot(put_avatar("image/gif", b"GIF89a".to_vec())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut png = Vec::new();
    image::DynamicImage::new_rgb8(1000, 500)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let response = ctx.app.clone().oneshot(put_avatar("image/png", png)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, profile) = ctx.request(Method::GET, "/profile", Some(&ana), None).await;
    let url = profile["avatar_url"].as_str().unwrap();
    assert!(url.ends_with(".jpg"));
    let (status, bytes) = ctx.get_raw(url.strip_prefix("http://localhost:3000").unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let stored = image::load_from_memory(&bytes).unwrap();
    assert_eq!((stored.width(), stored.height()), (400, 200));
}
