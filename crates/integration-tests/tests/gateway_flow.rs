//! Gateway routes, alone and in front of an in-process recognition service.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, request::Builder},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use bestby_gateway::db::{AccountStore, MemoryAccounts};
use bestby_integration_tests::{
    GatewayHarness, ImageScript, ScriptedDurations, ScriptedRecognizer, UnreachableCore,
    body_json, send,
};

const CLIENT_IP: &str = "203.0.113.10";
const BOUNDARY: &str = "bestby-test-boundary";

fn post(uri: &str) -> Builder {
    Request::post(uri).header("x-forwarded-for", CLIENT_IP)
}

fn form(uri: &str, body: &str) -> Request<Body> {
    post(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

struct Device {
    username: String,
    token: String,
    device_uid: String,
}

impl Device {
    fn authed(&self, uri: &str) -> Builder {
        post(uri)
            .header("username", self.username.as_str())
            .header("bearer-token", self.token.as_str())
    }

    fn multipart_image(&self, bytes: &[u8]) -> Request<Body> {
        self.authed("/imgrecv")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("IMG_DATA", bytes)))
            .unwrap()
    }
}

async fn register(router: &Router, username: &str) -> Device {
    let response = send(
        router,
        form(
            "/register",
            &format!("username={username}&password=correct-horse&name=Test+User"),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["STATUS_DESC"], "CORRECT");
    Device {
        username: username.to_string(),
        token: json["DATA"]["DEVICE-TOKEN"].as_str().unwrap().to_string(),
        device_uid: json["DATA"]["DEVICE-UID"].as_str().unwrap().to_string(),
    }
}

#[tokio::test]
async fn test_scan_through_gateway_records_purchase_for_user() {
    let (gateway, core) = GatewayHarness::with_core(
        ScriptedRecognizer::items(["Milk", "Bread"]),
        ScriptedDurations::table([("Milk", "1 W"), ("Bread", "4 D")]),
    );
    let device = register(&gateway.router, "alice").await;
    assert_eq!(device.device_uid.len(), 50);

    let response = send(&gateway.router, device.multipart_image(b"\xff\xd8jpeg")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["STATUS_CODE"], 200);
    assert_eq!(json["STATUS_DESC"], "CORRECT");
    assert_eq!(json["DATA"]["items"].as_object().unwrap().len(), 2);

    let user = gateway.accounts.find_user("alice").await.unwrap().unwrap();
    let purchases = core.store.purchases();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].owner, user.user_uid);
    assert_eq!(
        json["DATA"]["purchaseUID"],
        purchases[0].purchase_uid.as_str()
    );
}

#[tokio::test]
async fn test_base64_json_image_is_accepted() {
    let (gateway, core) = GatewayHarness::with_core(
        ScriptedRecognizer::items(["Apple"]),
        ScriptedDurations::table([("Apple", "1 W")]),
    );
    let device = register(&gateway.router, "bob").await;

    let body = serde_json::json!({ "IMG_DATA": STANDARD.encode(b"png-bytes") }).to_string();
    let request = device
        .authed("/imgrecv")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = send(&gateway.router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let item = json["DATA"]["items"].as_object().unwrap().values().next().unwrap();
    assert_eq!(item["expiresOn"], "2024-01-08");
    assert_eq!(core.store.purchase_count(), 1);
}

#[tokio::test]
async fn test_missing_image_is_img_not_found() {
    let (gateway, core) =
        GatewayHarness::with_core(ScriptedRecognizer::items(["Apple"]), ScriptedDurations::default());
    let device = register(&gateway.router, "carol").await;

    let wrong_field = device
        .authed("/imgrecv")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body("PHOTO", b"jpeg")))
        .unwrap();
    let response = send(&gateway.router, wrong_field).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["STATUS_DESC"], "IMG_NOT_FOUND");

    let not_base64 = device
        .authed("/imgrecv")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"IMG_DATA": "***"}"#))
        .unwrap();
    let response = send(&gateway.router, not_base64).await;
    assert_eq!(body_json(response).await["STATUS_DESC"], "IMG_NOT_FOUND");

    assert_eq!(core.store.purchase_count(), 0);
}

#[tokio::test]
async fn test_protected_routes_require_device_token() {
    let (gateway, core) =
        GatewayHarness::with_core(ScriptedRecognizer::items(["Apple"]), ScriptedDurations::default());
    let device = register(&gateway.router, "dave").await;

    let anonymous = post("/imgrecv").body(Body::from("jpeg")).unwrap();
    let response = send(&gateway.router, anonymous).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["STATUS_DESC"], "LOGIN_REQUIRED");

    let forged = post("/renewauth")
        .header("username", "dave")
        .header("bearer-token", "not-the-token")
        .body(Body::empty())
        .unwrap();
    let response = send(&gateway.router, forged).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["STATUS_DESC"], "LOGIN_REQUIRED");

    let renew = device.authed("/renewauth").body(Body::empty()).unwrap();
    let response = send(&gateway.router, renew).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["STATUS_DESC"], "CORRECT");

    assert_eq!(core.store.purchase_count(), 0);
}

#[tokio::test]
async fn test_registration_failures() {
    let gateway = GatewayHarness::new(Arc::new(MemoryAccounts::new()), Arc::new(UnreachableCore));
    register(&gateway.router, "erin").await;

    let duplicate = send(
        &gateway.router,
        form("/register", "username=erin&password=another-password&name=Erin"),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(duplicate).await["STATUS_DESC"], "USERNAME_EXISTS");

    let weak = send(
        &gateway.router,
        form("/register", "username=frank&password=short&name=Frank"),
    )
    .await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(weak).await["STATUS_DESC"], "WEAK_PASSWORD");

    let incomplete = send(&gateway.router, form("/register", "username=grace")).await;
    assert_eq!(incomplete.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(incomplete).await["STATUS_DESC"], "FORM_INCOMPLETE");
}

#[tokio::test]
async fn test_login_issues_new_device() {
    let accounts = Arc::new(MemoryAccounts::new());
    let gateway = GatewayHarness::new(accounts.clone(), Arc::new(UnreachableCore));
    let first = register(&gateway.router, "heidi").await;

    let unknown = send(
        &gateway.router,
        form("/authraw", "username=mallory&password=correct-horse"),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(unknown).await["STATUS_DESC"], "INVALID_USERNAME");

    let wrong = send(
        &gateway.router,
        form("/authraw", "username=heidi&password=wrong-horse"),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(wrong).await["STATUS_DESC"], "INCORRECT_AUTH");

    let response = send(
        &gateway.router,
        form("/authraw", "username=heidi&password=correct-horse"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_ne!(json["DATA"]["DEVICE-UID"], first.device_uid.as_str());
    assert_eq!(accounts.device_count(), 2);
}

#[tokio::test]
async fn test_core_down_is_reported() {
    let gateway = GatewayHarness::new(Arc::new(MemoryAccounts::new()), Arc::new(UnreachableCore));
    let device = register(&gateway.router, "ivan").await;

    let response = send(&gateway.router, device.multipart_image(b"jpeg")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["STATUS_CODE"], 500);
    assert_eq!(json["STATUS_DESC"], "CORE_DOWN");
}

#[tokio::test]
async fn test_core_failures_are_relayed_with_status() {
    let (gateway, _core) = GatewayHarness::with_core(
        ScriptedRecognizer(ImageScript::Unparseable),
        ScriptedDurations::default(),
    );
    let device = register(&gateway.router, "judy").await;

    let response = send(&gateway.router, device.multipart_image(b"jpeg")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["STATUS_CODE"], 422);
    assert_eq!(json["STATUS_DESC"], "PARSE_FAIL");
}

#[tokio::test]
async fn test_itemuid_is_forwarded() {
    let (gateway, core) =
        GatewayHarness::with_core(ScriptedRecognizer::items(["Kale"]), ScriptedDurations::default());
    let device = register(&gateway.router, "ken").await;

    let request = device
        .authed("/itemuid")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("itemname=Curly+Kale"))
        .unwrap();
    let response = send(&gateway.router, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["STATUS_DESC"], "CORRECT");
    assert_eq!(json["DATA"]["name"], "Curly Kale");
    assert_eq!(json["DATA"]["itemUID"].as_str().unwrap().len(), 50);
    assert_eq!(core.store.item_count(), 1);

    let blank = device
        .authed("/itemuid")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"ITEMNAME": ""}"#))
        .unwrap();
    let response = send(&gateway.router, blank).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["STATUS_DESC"], "ITEM_NAME_MISSING");
}

#[tokio::test]
async fn test_auth_routes_are_rate_limited() {
    let gateway = GatewayHarness::new(Arc::new(MemoryAccounts::new()), Arc::new(UnreachableCore));

    let mut statuses = Vec::new();
    for _ in 0..6 {
        let response = send(
            &gateway.router,
            form("/authraw", "username=nobody&password=whatever1"),
        )
        .await;
        statuses.push(response.status());
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            assert_eq!(body_json(response).await["STATUS_DESC"], "RATE_LIMITED");
        }
    }

    assert!(statuses[..5].iter().all(|s| *s == StatusCode::FORBIDDEN));
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);

    // Another client is unaffected.
    let other = Request::post("/authraw")
        .header("x-forwarded-for", "198.51.100.20")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("username=nobody&password=whatever1"))
        .unwrap();
    assert_eq!(send(&gateway.router, other).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_remote_peer_cannot_dodge_auth_limit_with_forwarded_for() {
    let gateway = GatewayHarness::new(Arc::new(MemoryAccounts::new()), Arc::new(UnreachableCore));
    let router = gateway.router_from(SocketAddr::from(([198, 51, 100, 7], 52000)));

    let mut limited = 0;
    for i in 0..20 {
        let guess = Request::post("/authraw")
            .header("x-forwarded-for", format!("10.0.0.{i}"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("username=nobody&password=guess{i:04}")))
            .unwrap();
        if send(&router, guess).await.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }

    assert_eq!(limited, 15);
}
