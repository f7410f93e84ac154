use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use opnlaas::config::Config;
use opnlaas::db::models::{
    CpuSpecs, DbHost, HardwareSpecs, Health, Management, MemorySpecs, Networking, RedfishVersion,
};
use opnlaas::service::Mailer;
use opnlaas::{LaasError, LaasState, laas_router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn code_for(&self, to: &str) -> String {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(t, _)| t == to)
            .map(|(_, c)| c.clone())
            .expect("no verification code sent")
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_code(&self, to: &str, code: &str) -> Result<(), LaasError> {
        self.sent.lock().push((to.to_string(), code.to_string()));
        Ok(())
    }
}

struct TestApp<M = RecordingMailer> {
    router: Router,
    state: LaasState,
    mailer: Arc<M>,
    _dir: tempfile::TempDir,
}

async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(RecordingMailer::default())).await
}

async fn spawn_app_with<M: Mailer + 'static>(mailer: Arc<M>) -> TestApp<M> {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let cfg = Config {
        db_file: dir.path().join("opnlaas.sqlite").display().to_string(),
        db_salt: "pepper".to_string(),
        insecure_cookie: true,
        ..Config::default()
    };
    let state = LaasState::from_config(&cfg, mailer.clone())
        .await
        .expect("failed to build state");
    TestApp {
        router: laas_router(state.clone()),
        state,
        mailer,
        _dir: dir,
    }
}

impl<M> TestApp<M> {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        cookies: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(c) = cookies {
            req = req.header(header::COOKIE, c);
        }
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(req.body(body).expect("failed to build request"))
            .await
            .expect("request failed")
    }
}

/// `name=value` pairs from every non-empty Set-Cookie header, ready for a Cookie header.
fn session_cookies(resp: &Response<Body>) -> String {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter(|pair| pair.split_once('=').is_some_and(|(_, value)| !value.is_empty()))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn json_body(resp: Response<Body>) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body was not json")
}

fn registration(email: &str) -> Value {
    json!({
        "email": email,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "password": "analytical-engine",
    })
}

#[tokio::test]
async fn registration_verification_and_session_flow() {
    let app = spawn_app().await;

    let resp = app
        .send("POST", "/api/user/create", None, Some(registration("Ada@Example.com")))
        .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let code = app.mailer.code_for("ada@example.com");

    let resp = app
        .send(
            "POST",
            "/api/user/verify",
            None,
            Some(json!({ "email": "ada@example.com", "code": "zzzz-zzzz-zzzz-zzzz" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let verify = json!({ "email": "ADA@example.com", "code": code });
    let resp = app.send("POST", "/api/user/verify", None, Some(verify.clone())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let cookies = session_cookies(&resp);
    let user = json_body(resp).await;
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["privilege"], 0);
    assert!(user.get("password_hash").is_none());

    // The code is spent.
    let resp = app.send("POST", "/api/user/verify", None, Some(verify)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err = json_body(resp).await;
    assert_eq!(err["error"]["code"], "VERIFICATION_FAILED");

    let resp = app.send("GET", "/api/user/me", Some(&cookies), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["first_name"], "Ada");

    let resp = app.send("GET", "/api/user/me", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .send("POST", "/api/user/create", None, Some(registration("ada@example.com")))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["error"]["code"], "ALREADY_EXISTS");
}

#[tokio::test]
async fn login_and_self_delete() {
    let app = spawn_app().await;
    app.send("POST", "/api/user/create", None, Some(registration("grace@placebo.org")))
        .await;
    let code = app.mailer.code_for("grace@placebo.org");
    let resp = app
        .send(
            "POST",
            "/api/user/verify",
            None,
            Some(json!({ "email": "grace@placebo.org", "code": code })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .send(
            "POST",
            "/api/user/login",
            None,
            Some(json!({ "email": "grace@placebo.org", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .send(
            "POST",
            "/api/user/login",
            None,
            Some(json!({ "email": "Grace@Placebo.org", "password": "analytical-engine" })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies = session_cookies(&resp);

    let resp = app.send("DELETE", "/api/user/delete", Some(&cookies), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(app.state.users.get("grace@placebo.org").await.unwrap().is_none());

    // Deleting the account ends its session.
    let resp = app.send("GET", "/api/user/me", Some(&cookies), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = app.send("GET", "/api/host/anything", Some(&cookies), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.send("POST", "/api/user/logout", Some(&cookies), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn registration_input_is_validated_before_staging() {
    let app = spawn_app().await;

    let resp = app
        .send("POST", "/api/user/create", None, Some(registration("ada@not-allowed.com")))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let mut short_password = registration("ada@example.com");
    short_password["password"] = json!("short");
    let resp = app
        .send("POST", "/api/user/create", None, Some(short_password))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.state.pending.len().await.unwrap(), 0);
    assert!(app.mailer.sent.lock().is_empty());
}

#[tokio::test]
async fn host_view_hides_management_credentials() {
    let app = spawn_app().await;
    app.state
        .hosts
        .create(DbHost {
            name: "r740-07".to_string(),
            health: Health::Good,
            hardware: HardwareSpecs {
                cpu: CpuSpecs {
                    count: 2,
                    speed_mhz: 3000,
                    cores: 24,
                },
                memory: MemorySpecs {
                    total_mib: 262144,
                    speed_mhz: 2933,
                },
                virtual_storage_size_mib: 1024000,
            },
            networking: Networking {
                provider: "mellanox".to_string(),
                speed_mbps: 100000,
            },
            management: Management {
                address: "10.1.1.7".to_string(),
                username: "root".to_string(),
                password: "calvin".to_string(),
                redfish_version: RedfishVersion::IDrac9,
            },
        })
        .await
        .unwrap();

    let resp = app.send("GET", "/api/host/r740-07", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Session cookies are encrypted with the state's key, so sign in through the route.
    app.state
        .users
        .create(
            "ops@example.com",
            "Ops",
            "Team",
            &opnlaas::service::password::hash_password("pepper", "hunter2hunter2"),
        )
        .await
        .unwrap();
    let resp = app
        .send(
            "POST",
            "/api/user/login",
            None,
            Some(json!({ "email": "ops@example.com", "password": "hunter2hunter2" })),
        )
        .await;
    let cookies = session_cookies(&resp);

    let resp = app.send("GET", "/api/host/r740-07", Some(&cookies), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let host = json_body(resp).await;
    assert_eq!(host["health"], 0);
    assert_eq!(host["networking"]["provider"], "mellanox");
    assert!(host.get("management").is_none());
    assert!(!host.to_string().contains("calvin"));

    let resp = app.send("GET", "/api/host/missing", Some(&cookies), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metadata_is_public_and_uncached() {
    let app = spawn_app().await;
    let resp = app.send("GET", "/metadata.json", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate"
    );
    let meta = json_body(resp).await;
    assert_eq!(meta["name"], "Sample Laboratory");
    assert_eq!(meta["emailDomainWhiteList"], json!(["example.com", "placebo.org"]));
}

struct DownMailer;

#[async_trait]
impl Mailer for DownMailer {
    async fn send_code(&self, _to: &str, _code: &str) -> Result<(), LaasError> {
        Err(LaasError::Mail("relay refused connection".to_string()))
    }
}

#[tokio::test]
async fn unreachable_mail_relay_is_a_bad_gateway() {
    let app = spawn_app_with(Arc::new(DownMailer)).await;
    let resp = app
        .send("POST", "/api/user/create", None, Some(registration("ada@example.com")))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(resp).await["error"]["code"], "MAIL_UNAVAILABLE");
    assert_eq!(app.state.pending.len().await.unwrap(), 0);
}
