use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH},
    },
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::{
    application::{delivery::Delivery, error::HttpError},
    domain::scope::Scope,
};

use super::HttpState;

const SOURCE: &str = "infra::http::worker::serve_worker";
const PUBLIC_FAILURE: &str = "Worker script could not be compiled";
const SCRIPT_CONTENT_TYPE: &str = "text/javascript; charset=utf-8";
const X_ROBOTS_TAG: &str = "x-robots-tag";

pub(super) async fn front_worker(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    serve_worker(state, Scope::Front, &headers).await
}

pub(super) async fn admin_worker(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    serve_worker(state, Scope::Admin, &headers).await
}

async fn serve_worker(state: HttpState, scope: Scope, headers: &HeaderMap) -> Response {
    let if_none_match = headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let service = state.worker.clone();
    let task = tokio::task::spawn_blocking(move || {
        service.compile_and_deliver(scope, if_none_match.as_deref())
    });

    let delivery = match tokio::time::timeout(state.compile_timeout, task).await {
        Ok(Ok(Ok(delivery))) => delivery,
        Ok(Ok(Err(err))) => return HttpError::from(err).into_response(),
        Ok(Err(err)) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                PUBLIC_FAILURE,
                &err,
            )
            .into_response();
        }
        Err(_) => {
            let limit_ms = state.compile_timeout.as_millis();
            error!(
                target = "swbundle::http::worker",
                scope = scope.as_str(),
                limit_ms = limit_ms,
                "worker script compilation timed out",
            );
            return HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                PUBLIC_FAILURE,
                format!("compilation of the {scope} script exceeded {limit_ms} ms"),
            )
            .into_response();
        }
    };

    match delivery {
        Delivery::NotModified { .. } => StatusCode::NOT_MODIFIED.into_response(),
        Delivery::Full { etag, body } => script_response(&etag, body),
    }
}

fn script_response(etag: &str, body: String) -> Response {
    let Ok(etag) = HeaderValue::from_str(etag) else {
        return HttpError::new(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            PUBLIC_FAILURE,
            format!("entity tag `{etag}` is not a valid header value"),
        )
        .into_response();
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, SCRIPT_CONTENT_TYPE)
        .header(CACHE_CONTROL, "no-cache")
        .header(X_ROBOTS_TAG, "noindex, follow")
        .header(ETAG, etag)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
