//! HTTP server wiring

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::info;

use mygate_common::config::HttpConfig;

use crate::handlers::{self, AppState};

/// The PostgREST-compatible gateway server
pub struct GatewayServer {
    config: HttpConfig,
    state: web::Data<AppState>,
}

impl GatewayServer {
    pub fn new(config: HttpConfig, state: AppState) -> Self {
        Self {
            config,
            state: web::Data::new(state),
        }
    }

    /// Shared state handle, mainly for tests
    pub fn state(&self) -> web::Data<AppState> {
        self.state.clone()
    }

    /// Bind and serve until shutdown
    pub async fn run(self) -> std::io::Result<()> {
        let state = self.state.clone();
        let bind = self.config.bind.clone();
        let port = self.config.port;

        info!("serving REST gateway on {bind}:{port}");

        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(Cors::permissive())
                .wrap(middleware::Logger::default())
                .service(api_scope())
        })
        .bind((bind, port))?
        .run()
        .await
    }
}

/// The `/api` scope with routes in match order: literal segments first, then
/// the table-parameterized routes from most to least specific.
pub fn api_scope() -> actix_web::Scope {
    web::scope("/api")
        .route("/health", web::get().to(handlers::health))
        .route("/openapi.json", web::get().to(handlers::openapi_doc))
        .route("/tables", web::get().to(handlers::tables))
        .route("/rpc/{name}", web::post().to(handlers::rpc))
        .route("/_policies/reload", web::post().to(handlers::reload_policies))
        .route("/_catalog/reload", web::post().to(handlers::reload_catalog))
        .route("/{table}/describe", web::get().to(handlers::describe))
        .route("/{table}/count", web::get().to(handlers::count))
        .route("/{table}/groupby", web::get().to(handlers::groupby))
        .route("/{table}/aggregate", web::get().to(handlers::aggregate))
        .route("/{table}", web::get().to(handlers::list))
        .route("/{table}", web::post().to(handlers::create))
        .route("/{table}", web::patch().to(handlers::patch))
        .route("/{table}", web::delete().to(handlers::delete_bulk))
        .route("/{table}/{id}/exists", web::get().to(handlers::exists))
        .route("/{parent}/{id}/{child}", web::get().to(handlers::relational))
        .route("/{table}/{id}", web::get().to(handlers::read))
        .route("/{table}/{id}", web::put().to(handlers::update))
        .route("/{table}/{id}", web::delete().to(handlers::delete_by_id))
}
