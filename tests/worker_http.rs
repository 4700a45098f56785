use std::{fs, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Method, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH},
    },
    response::Response,
};
use serde_json::{Map, json};
use swbundle::{
    application::{
        context::Registries,
        contributor::{Contributor, ContributorSet},
        contributors,
        delivery::WorkerService,
        modules::ContentSource,
    },
    config::{
        CachingRouteDeclaration, Declarations, ModuleBody, ModuleDeclaration, MountSettings,
        PrecacheDeclaration, WorkerSettings,
    },
    domain::scope::ScopeFilter,
    infra::{
        files::AllowListedFiles,
        http::{HttpState, build_router},
    },
};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

struct Fixture {
    _dir: TempDir,
    worker: Arc<WorkerSettings>,
    files: Arc<AllowListedFiles>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("static");
    fs::create_dir_all(root.join("js")).expect("create mount");
    fs::write(root.join("js/offline.js"), "self.offline = true;").expect("write script");

    let mut worker = WorkerSettings::for_site(Url::parse("https://example.org/").unwrap());
    worker.cache_name_prefix = "blog".to_string();
    worker.mounts = vec![MountSettings {
        prefix: "/static/".to_string(),
        directory: root,
    }];
    let files = AllowListedFiles::from_settings(&worker).expect("files");

    Fixture {
        _dir: dir,
        worker: Arc::new(worker),
        files: Arc::new(files),
    }
}

fn declarations() -> Declarations {
    let mut args = Map::new();
    args.insert("cache_name".to_string(), json!("static"));
    Declarations {
        caching_routes: vec![
            CachingRouteDeclaration {
                route: "\\.(js|css)$".to_string(),
                strategy: json!("staleWhileRevalidate"),
                args,
                scope: ScopeFilter::All,
            },
            CachingRouteDeclaration {
                route: "^/admin/api/".to_string(),
                strategy: json!("NetworkOnly"),
                args: Map::new(),
                scope: ScopeFilter::Admin,
            },
        ],
        precache: vec![PrecacheDeclaration {
            url: "/offline.html".to_string(),
            revision: Some(json!("4")),
            cache_target: None,
            scope: ScopeFilter::Front,
        }],
        modules: vec![
            ModuleDeclaration {
                handle: "offline".to_string(),
                body: ModuleBody::File("/static/js/offline.js".to_string()),
                deps: vec!["runtime-config".to_string()],
                scope: ScopeFilter::All,
            },
            ModuleDeclaration {
                handle: "escape".to_string(),
                body: ModuleBody::File("/static/../Cargo.toml".to_string()),
                deps: Vec::new(),
                scope: ScopeFilter::Admin,
            },
        ],
    }
}

fn router_with(fixture: &Fixture, contributors: ContributorSet) -> Router {
    let service = WorkerService::new(
        Arc::new(contributors),
        fixture.files.clone(),
        Arc::clone(&fixture.worker),
    );
    build_router(HttpState::new(service))
}

fn router(fixture: &Fixture) -> Router {
    let contributors =
        contributors::builtin(Arc::clone(&fixture.worker), Arc::new(declarations()));
    router_with(fixture, contributors)
}

async fn get(app: &Router, uri: &str, if_none_match: Option<&str>) -> Response {
    let mut request = Request::builder().method(Method::GET).uri(uri);
    if let Some(etag) = if_none_match {
        request = request.header(IF_NONE_MATCH, etag);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn front_worker_is_served_with_script_headers() {
    let fixture = fixture();
    let app = router(&fixture);

    let response = get(&app, "/service-worker.js", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[CONTENT_TYPE], "text/javascript; charset=utf-8");
    assert_eq!(headers[CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-robots-tag"], "noindex, follow");
    let etag = headers[ETAG].to_str().expect("ascii etag").to_string();
    assert_eq!(etag.len(), 34);
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let body = body_text(response).await;
    assert!(body.starts_with("/* Service worker for the front scope. */"));
    assert!(body.contains(&format!(
        "importScripts(\"{}\");",
        fixture.worker.runtime_url
    )));
    assert!(body.contains("/* Source offline </static/js/offline.js>: */\nself.offline = true;"));
    assert!(body.contains(
        "workbox.precaching.precacheAndRoute([{\"revision\":\"4\",\"url\":\"/offline.html\"}]);"
    ));
    assert!(body.contains(
        "workbox.routing.registerRoute(new RegExp(\"\\\\.(js|css)$\"), \
         new workbox.strategies.StaleWhileRevalidate({\"cacheName\":\"blog-static\"}));"
    ));
    assert!(!body.contains("^/admin/api/"));

    let runtime = body.find("/* Source runtime-config: */").expect("runtime");
    let offline = body.find("/* Source offline").expect("offline");
    let precache = body.find("/* Source precaching-routes: */").expect("precache");
    let routes = body.find("/* Source caching-routes: */").expect("routes");
    assert!(runtime < offline && offline < precache && precache < routes);
}

#[tokio::test]
async fn matching_if_none_match_yields_not_modified() {
    let fixture = fixture();
    let app = router(&fixture);

    let first = get(&app, "/service-worker.js", None).await;
    let etag = first.headers()[ETAG].to_str().unwrap().to_string();

    let response = get(&app, "/service-worker.js", Some(&etag)).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(response.headers().get(ETAG).is_none());
    assert!(response.headers().get(CONTENT_TYPE).is_none());
    assert!(body_text(response).await.is_empty());

    let weak = format!("\"other\", W/{etag}");
    let response = get(&app, "/service-worker.js", Some(&weak)).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = get(&app, "/service-worker.js", Some("\"stale\"")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[ETAG].to_str().unwrap(), etag);
    assert!(!body_text(response).await.is_empty());
}

#[tokio::test]
async fn admin_worker_is_compiled_independently() {
    let fixture = fixture();
    let app = router(&fixture);

    let front = get(&app, "/service-worker.js", None).await;
    let admin = get(&app, "/admin/service-worker.js", None).await;
    assert_eq!(admin.status(), StatusCode::OK);
    assert_ne!(front.headers()[ETAG], admin.headers()[ETAG]);

    let body = body_text(admin).await;
    assert!(body.starts_with("/* Service worker for the admin scope. */"));
    assert!(body.contains("new RegExp(\"^/admin/api/\")"));
    assert!(body.contains("/* No precached routes. */"));
    // The traversal attempt degrades to a warning; the rest of the bundle survives.
    assert!(body.contains("/* Source escape: unavailable ("));
    assert!(body.contains("console.warn("));
    assert!(!body.contains("[package]"));
    assert!(body.contains("self.offline = true;"));
}

struct Broken;

impl Contributor for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn serve(&self, registries: &mut Registries) {
        registries.register_module("needs-ghost", ContentSource::text("x();"), &["ghost"]);
    }
}

#[tokio::test]
async fn unknown_dependency_is_a_server_error() {
    let fixture = fixture();
    let app = router_with(&fixture, ContributorSet::new().with(Broken));

    let response = get(&app, "/service-worker.js", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(ETAG).is_none());
    assert_eq!(
        body_text(response).await,
        "Worker script could not be compiled"
    );
}

struct Slow;

impl Contributor for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn serve(&self, _registries: &mut Registries) {
        std::thread::sleep(Duration::from_millis(300));
    }
}

#[tokio::test]
async fn compilation_is_bounded_in_time() {
    let fixture = fixture();
    let service = WorkerService::new(
        Arc::new(ContributorSet::new().with(Slow)),
        fixture.files.clone(),
        Arc::clone(&fixture.worker),
    );
    let mut state = HttpState::new(service);
    state.compile_timeout = Duration::from_millis(20);
    let app = build_router(state);

    let response = get(&app, "/service-worker.js", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_endpoint_returns_no_content() {
    let fixture = fixture();
    let app = router(&fixture);

    let response = get(&app, "/_health", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
