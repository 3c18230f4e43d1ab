use std::net::SocketAddr;

use authd_core::{AuthState, api_router, browser_router};
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub struct AuthServer {
    addr: SocketAddr,
    app: Router,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Protocol endpoints get permissive CORS so browser clients can call them
/// cross-origin; `/authorize`, `/login` and `/logout` are top-level
/// navigations and get none.
pub fn build_app(state: AuthState) -> Router {
    let api = api_router(state.clone()).layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .merge(browser_router(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    if req.uri().path() == "/favicon.ico" {
                        return tracing::span!(tracing::Level::TRACE, "noop");
                    }
                    // The query of /authorize carries state and PKCE values; log the path only.
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        if span.metadata().is_some_and(|meta| meta.name() != "noop") {
                            tracing::info!(
                                http.status = %res.status().as_u16(),
                                elapsed_ms = %latency.as_millis(),
                                "request handled"
                            );
                        }
                    },
                ),
        )
}

pub struct ServerBuilder {
    addr: SocketAddr,
    state: AuthState,
}

impl ServerBuilder {
    pub fn new(addr: SocketAddr, state: AuthState) -> Self {
        Self { addr, state }
    }

    pub fn build(self) -> AuthServer {
        AuthServer {
            addr: self.addr,
            app: build_app(self.state),
        }
    }
}

impl AuthServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
