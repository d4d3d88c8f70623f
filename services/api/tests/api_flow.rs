//! End-to-end tests that drive the full router against the in-memory store.

use api_lib::{
    adapters::{InMemoryDb, LocalFileStorage},
    config::Config,
    web::{build_router, state::AppState},
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    uploads: TempDir,
}

async fn test_app() -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let upload_dir = uploads.path().to_string_lossy().to_string();
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("memory://".to_string()),
        "JWT_SECRET" => Some(SECRET.to_string()),
        "UPLOAD_DIR" => Some(upload_dir.clone()),
        "EXPOSE_TOKEN_IN_BODY" => Some("true".to_string()),
        _ => None,
    })
    .unwrap();

    let storage = LocalFileStorage::new(config.upload_dir.clone()).await.unwrap();
    let state = Arc::new(AppState::new(
        Arc::new(InMemoryDb::new()),
        Arc::new(storage),
        Arc::new(config),
    ));
    TestApp {
        router: build_router(state.clone()),
        state,
        uploads,
    }
}

struct Reply {
    status: StatusCode,
    set_cookie: Option<String>,
    body: Value,
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply {
            status,
            set_cookie,
            body,
        }
    }

    async fn json(&self, method: &str, uri: &str, body: Value) -> Reply {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, uri: &str) -> Reply {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn register(&self, email: &str, password: &str) -> Reply {
        self.json(
            "POST",
            "/auth/register",
            json!({"fullName": "Ada Reader", "email": email, "password": password}),
        )
        .await
    }

    async fn create_book(&self, body: Value) -> Value {
        let reply = self.json("POST", "/books", body).await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body
    }
}

fn assert_error(reply: &Reply, status: StatusCode, code: &str) {
    assert_eq!(reply.status, status, "{}", reply.body);
    assert_eq!(reply.body["code"], code);
    assert!(reply.body["message"].is_string());
}

//=========================================================================================
// Auth
//=========================================================================================

#[tokio::test]
async fn register_rejects_duplicates_and_hides_the_hash() {
    let app = test_app().await;

    let first = app.register("ada@example.com", "hunter22").await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["message"], "User registered successfully");
    assert_eq!(first.body["user"]["email"], "ada@example.com");
    assert!(first.body["user"].get("password").is_none());
    assert!(first.body["user"].get("passwordHash").is_none());

    let second = app.register("ada@example.com", "other-pass").await;
    assert_error(&second, StatusCode::CONFLICT, "conflict");

    let missing = app
        .json("POST", "/auth/register", json!({"email": "x@example.com"}))
        .await;
    assert_error(&missing, StatusCode::BAD_REQUEST, "bad_request");
}

#[tokio::test]
async fn login_sets_a_verifiable_session_cookie() {
    let app = test_app().await;
    let registered = app.register("ada@example.com", "hunter22").await;
    let user_id = registered.body["user"]["id"].as_i64().unwrap();

    let reply = app
        .json(
            "POST",
            "/auth/login",
            json!({"email": "ada@example.com", "password": "hunter22"}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Login successful");

    let cookie = reply.set_cookie.expect("session cookie");
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=3600"));

    let token = reply.body["token"].as_str().unwrap();
    let claims = app.state.tokens.verify(token).unwrap();
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.email, "ada@example.com");
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_identical() {
    let app = test_app().await;
    app.register("ada@example.com", "hunter22").await;

    let wrong = app
        .json(
            "POST",
            "/auth/login",
            json!({"email": "ada@example.com", "password": "nope"}),
        )
        .await;
    let unknown = app
        .json(
            "POST",
            "/auth/login",
            json!({"email": "ghost@example.com", "password": "nope"}),
        )
        .await;

    assert_error(&wrong, StatusCode::UNAUTHORIZED, "invalid_credentials");
    assert_eq!(wrong.body, unknown.body);
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert!(wrong.set_cookie.is_none());
}

#[tokio::test]
async fn malformed_login_body_is_a_bad_request() {
    let app = test_app().await;
    let request = Request::post("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = app.send(request).await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "bad_request");
}

#[tokio::test]
async fn logout_expires_the_cookie() {
    let app = test_app().await;
    let reply = app.send(Request::post("/auth/logout").body(Body::empty()).unwrap()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "Logout successful");
    let cookie = reply.set_cookie.unwrap();
    assert!(cookie.starts_with("token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn profile_update_requires_a_session() {
    let app = test_app().await;
    app.register("ada@example.com", "hunter22").await;
    let login = app
        .json(
            "POST",
            "/auth/login",
            json!({"email": "ada@example.com", "password": "hunter22"}),
        )
        .await;
    let token = login.body["token"].as_str().unwrap().to_string();

    let anonymous = app.json("PATCH", "/user", json!({"fullName": "Ada L."})).await;
    assert_error(&anonymous, StatusCode::UNAUTHORIZED, "unauthenticated");

    let forged = Request::patch("/user")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"fullName": "Ada L."}).to_string()))
        .unwrap();
    assert_error(&app.send(forged).await, StatusCode::UNAUTHORIZED, "unauthenticated");

    let with_bearer = Request::patch("/user")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"fullName": "Ada L.", "mobile": "555"}).to_string()))
        .unwrap();
    let reply = app.send(with_bearer).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["user"]["fullName"], "Ada L.");
    assert_eq!(reply.body["user"]["mobile"], "555");

    let empty = Request::patch("/user")
        .header(header::COOKIE, format!("token={}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    assert_error(&app.send(empty).await, StatusCode::BAD_REQUEST, "bad_request");

    let me = Request::get("/auth/me")
        .header(header::COOKIE, format!("token={}", token))
        .body(Body::empty())
        .unwrap();
    let reply = app.send(me).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["email"], "ada@example.com");
}

//=========================================================================================
// Books
//=========================================================================================

#[tokio::test]
async fn book_lifecycle() {
    let app = test_app().await;

    let created = app
        .create_book(json!({"title": "T", "author": "A", "language": "en"}))
        .await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["layout"], "MIXED");

    let fetched = app.get(&format!("/books/{}", id)).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["title"], "T");
    assert_eq!(fetched.body["contentBlocks"], json!([]));
    assert_eq!(fetched.body["categories"], json!([]));

    let deleted = app
        .send(Request::delete(format!("/books/{}", id)).body(Body::empty()).unwrap())
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["message"], "Book deleted successfully");

    assert_error(&app.get(&format!("/books/{}", id)).await, StatusCode::NOT_FOUND, "not_found");
    assert_error(&app.get("/books/abc").await, StatusCode::BAD_REQUEST, "bad_request");
}

#[tokio::test]
async fn create_rejects_missing_fields_and_unknown_layouts() {
    let app = test_app().await;
    let missing = app.json("POST", "/books", json!({"title": "T"})).await;
    assert_error(&missing, StatusCode::BAD_REQUEST, "bad_request");

    let layout = app
        .json(
            "POST",
            "/books",
            json!({"title": "T", "author": "A", "language": "en", "layout": "SIDEWAYS"}),
        )
        .await;
    assert_error(&layout, StatusCode::BAD_REQUEST, "bad_request");
}

#[tokio::test]
async fn update_replaces_categories_and_blocks() {
    let app = test_app().await;
    let created = app
        .create_book(json!({
            "title": "Dune",
            "author": "Herbert",
            "language": "en",
            "categoryNames": ["Science Fiction", "Classics"],
            "contentBlocks": [
                {"type": "text", "content": "second", "order": 2},
                {"type": "text", "content": "first", "order": 1}
            ]
        }))
        .await;
    let id = created["id"].as_i64().unwrap();
    let blocks = created["contentBlocks"].as_array().unwrap();
    assert_eq!(blocks[0]["content"], "first");
    assert_eq!(blocks[1]["content"], "second");
    assert_eq!(created["categories"].as_array().unwrap().len(), 2);

    let updated = app
        .json(
            "PUT",
            &format!("/books/{}", id),
            json!({"pageCount": "412", "categoryNames": ["Classics"]}),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{}", updated.body);
    assert_eq!(updated.body["title"], "Dune");
    assert_eq!(updated.body["pageCount"], 412);
    assert_eq!(updated.body["categories"][0]["name"], "Classics");
    assert_eq!(updated.body["categories"].as_array().unwrap().len(), 1);
    assert_eq!(updated.body["contentBlocks"], json!([]));

    let missing = app
        .json("PUT", "/books/9999", json!({"title": "Nope"}))
        .await;
    assert_error(&missing, StatusCode::NOT_FOUND, "not_found");

    let categories = app.get("/categories").await;
    let names: Vec<&str> = categories
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Classics"));
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test]
async fn multipart_create_stores_the_cover_image() {
    let app = test_app().await;
    let request = multipart_request(
        "POST",
        "/books",
        &[
            ("title", None, "Illustrated"),
            ("author", None, "Painter"),
            ("language", None, "en"),
            ("categoryNames", None, "Art, Fiction"),
            ("coverImage", Some("cover.png"), "PNGDATA"),
        ],
    );
    let reply = app.send(request).await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);

    let cover = reply.body["coverImage"].as_str().unwrap();
    assert!(cover.starts_with("/uploads/"));
    assert!(cover.ends_with(".png"));
    assert_eq!(reply.body["categories"].as_array().unwrap().len(), 2);

    let stored = app.uploads.path().join(cover.trim_start_matches("/uploads/"));
    assert_eq!(std::fs::read(stored).unwrap(), b"PNGDATA");

    let served = app.get_raw(cover).await;
    assert_eq!(served, b"PNGDATA");
}

impl TestApp {
    async fn get_raw(&self, uri: &str) -> Vec<u8> {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }
}

const BOUNDARY: &str = "bookshelf-boundary";

/// `(field, file name, content)` parts; a file name makes the part a file.
fn multipart_request(method: &str, uri: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match file_name {
            Some(file_name) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                name, file_name
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn stored_file_count(app: &TestApp) -> usize {
    std::fs::read_dir(app.uploads.path()).unwrap().count()
}

#[tokio::test]
async fn multipart_skips_empty_file_parts() {
    let app = test_app().await;
    let request = multipart_request(
        "POST",
        "/books",
        &[
            ("title", None, "No Cover"),
            ("author", None, "A"),
            ("language", None, "en"),
            ("coverImage", Some("empty.png"), ""),
            ("images", Some("empty.jpg"), ""),
        ],
    );
    let reply = app.send(request).await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert!(reply.body["coverImage"].is_null());
    assert_eq!(reply.body["images"], json!([]));
    assert_eq!(stored_file_count(&app), 0);
}

#[tokio::test]
async fn multipart_rejects_malformed_content_blocks() {
    let app = test_app().await;
    let request = multipart_request(
        "POST",
        "/books",
        &[
            ("title", None, "T"),
            ("author", None, "A"),
            ("language", None, "en"),
            ("contentBlocks", None, "[{oops"),
        ],
    );
    let reply = app.send(request).await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "bad_request");
    assert!(reply.body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid contentBlocks JSON"));
    assert_eq!(app.get("/books").await.body, json!([]));
}

#[tokio::test]
async fn multipart_update_replaces_gallery_images() {
    let app = test_app().await;
    let created = app
        .create_book(json!({
            "title": "Gallery", "author": "A", "language": "en",
            "images": ["/uploads/old.png"]
        }))
        .await;
    let id = created["id"].as_i64().unwrap();

    let request = multipart_request(
        "PUT",
        &format!("/books/{}", id),
        &[
            ("images", Some("one.png"), "ONE"),
            ("images", Some("two.jpg"), "TWO"),
        ],
    );
    let reply = app.send(request).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let images: Vec<&str> = reply.body["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(images.len(), 2);
    assert!(!images.contains(&"/uploads/old.png"));
    assert!(images[0].ends_with(".png"));
    assert!(images[1].ends_with(".jpg"));
    assert_eq!(app.get_raw(images[0]).await, b"ONE");
    assert_eq!(app.get_raw(images[1]).await, b"TWO");
    assert_eq!(reply.body["title"], "Gallery");
}

#[tokio::test]
async fn multipart_update_of_missing_book_stores_nothing() {
    let app = test_app().await;
    let request = multipart_request(
        "PUT",
        "/books/9999",
        &[
            ("title", None, "Ghost"),
            ("coverImage", Some("cover.png"), "PNGDATA"),
        ],
    );
    let reply = app.send(request).await;
    assert_error(&reply, StatusCode::NOT_FOUND, "not_found");
    assert_eq!(stored_file_count(&app), 0);
}

//=========================================================================================
// Search & Featured
//=========================================================================================

#[tokio::test]
async fn search_matches_title_author_and_category() {
    let app = test_app().await;
    app.create_book(json!({
        "title": "The Hobbit", "author": "Tolkien", "language": "en",
        "categoryNames": ["Fantasy"]
    }))
    .await;
    app.create_book(json!({"title": "Gone Girl", "author": "Flynn", "language": "en"}))
        .await;

    let by_category = app.get("/search?q=fanta").await;
    assert_eq!(by_category.status, StatusCode::OK);
    assert_eq!(by_category.body.as_array().unwrap().len(), 1);
    assert_eq!(by_category.body[0]["title"], "The Hobbit");

    let by_author = app.get("/search?q=FLYNN").await;
    assert_eq!(by_author.body[0]["title"], "Gone Girl");

    assert_error(&app.get("/search?q=%20%20").await, StatusCode::BAD_REQUEST, "bad_request");
    assert_error(&app.get("/search").await, StatusCode::BAD_REQUEST, "bad_request");
}

#[tokio::test]
async fn featured_ranks_bookmarked_books() {
    let app = test_app().await;
    let user = app.register("ada@example.com", "hunter22").await;
    let user_id = user.body["user"]["id"].as_i64().unwrap();
    let quiet = app
        .create_book(json!({"title": "Quiet", "author": "A", "language": "en"}))
        .await;
    let popular = app
        .create_book(json!({"title": "Popular", "author": "B", "language": "en"}))
        .await;
    app.json(
        "POST",
        "/bookmarks",
        json!({"bookId": popular["id"], "userId": user_id, "progress": 0.1}),
    )
    .await;

    let reply = app.get("/categories/featured").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["trending"][0]["title"], "Popular");
    assert_eq!(reply.body["recommended"][0]["title"], "Popular");
    assert!(reply.body["trending"]
        .as_array()
        .unwrap()
        .iter()
        .all(|b| b["id"] != quiet["id"]));
}

//=========================================================================================
// Bookmarks
//=========================================================================================

#[tokio::test]
async fn bookmark_upsert_keeps_one_row_per_user_and_book() {
    let app = test_app().await;
    let user = app.register("ada@example.com", "hunter22").await;
    let user_id = user.body["user"]["id"].as_i64().unwrap();
    let book = app
        .create_book(json!({"title": "T", "author": "A", "language": "en"}))
        .await;

    let first = app
        .json(
            "POST",
            "/bookmarks",
            json!({"bookId": book["id"], "userId": user_id, "progress": 0.25}),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    let second = app
        .json(
            "POST",
            "/bookmarks",
            json!({"bookId": book["id"].to_string(), "userId": user_id, "progress": "0.5"}),
        )
        .await;
    assert_eq!(second.status, StatusCode::OK, "{}", second.body);
    assert_eq!(first.body["id"], second.body["id"]);
    assert_eq!(second.body["progress"], 0.5);

    let listed = app.get(&format!("/bookmarks?userId={}", user_id)).await;
    let entries = listed.body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["book"]["title"], "T");
    assert_eq!(entries[0]["progress"], 0.5);

    let bookmark_id = second.body["id"].as_i64().unwrap();
    let updated = app
        .json("PUT", &format!("/bookmarks/{}", bookmark_id), json!({"progress": 1.0}))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["progress"], 1.0);
}

#[tokio::test]
async fn bookmark_validation_and_missing_targets() {
    let app = test_app().await;
    let user = app.register("ada@example.com", "hunter22").await;
    let user_id = user.body["user"]["id"].as_i64().unwrap();
    let book = app
        .create_book(json!({"title": "T", "author": "A", "language": "en"}))
        .await;

    let missing_fields = app.json("POST", "/bookmarks", json!({"bookId": 1})).await;
    assert_error(&missing_fields, StatusCode::BAD_REQUEST, "bad_request");

    let out_of_range = app
        .json(
            "POST",
            "/bookmarks",
            json!({"bookId": book["id"], "userId": user_id, "progress": 2}),
        )
        .await;
    assert_error(&out_of_range, StatusCode::BAD_REQUEST, "bad_request");

    let no_book = app
        .json(
            "POST",
            "/bookmarks",
            json!({"bookId": 9999, "userId": user_id, "progress": 0.1}),
        )
        .await;
    assert_error(&no_book, StatusCode::NOT_FOUND, "not_found");
    assert_eq!(no_book.body["message"], "Book not found");

    let no_user = app
        .json(
            "POST",
            "/bookmarks",
            json!({"bookId": book["id"], "userId": 9999, "progress": 0.1}),
        )
        .await;
    assert_error(&no_user, StatusCode::NOT_FOUND, "not_found");
    assert_eq!(no_user.body["message"], "User not found");

    assert_error(&app.get("/bookmarks").await, StatusCode::BAD_REQUEST, "bad_request");
    assert_error(
        &app.get("/bookmarks?userId=abc").await,
        StatusCode::BAD_REQUEST,
        "bad_request",
    );

    let bad_id = app.json("PUT", "/bookmarks/xyz", json!({"progress": 0.3})).await;
    assert_error(&bad_id, StatusCode::BAD_REQUEST, "bad_request");
    let no_progress = app.json("PUT", "/bookmarks/1", json!({})).await;
    assert_error(&no_progress, StatusCode::BAD_REQUEST, "bad_request");
    let unknown = app.json("PUT", "/bookmarks/9999", json!({"progress": 0.3})).await;
    assert_error(&unknown, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn deleting_a_book_removes_its_bookmarks() {
    let app = test_app().await;
    let user = app.register("ada@example.com", "hunter22").await;
    let user_id = user.body["user"]["id"].as_i64().unwrap();
    let book = app
        .create_book(json!({"title": "T", "author": "A", "language": "en"}))
        .await;
    app.json(
        "POST",
        "/bookmarks",
        json!({"bookId": book["id"], "userId": user_id, "progress": 0.3}),
    )
    .await;

    app.send(
        Request::delete(format!("/books/{}", book["id"]))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let listed = app.get(&format!("/bookmarks?userId={}", user_id)).await;
    assert_eq!(listed.body, json!([]));
}
