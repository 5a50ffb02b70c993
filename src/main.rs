mod config;
mod domain;
mod infrastructure;
mod presentation;
mod shared;

use anyhow::Context;
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::infrastructure::{SeedOptions, Seeder};
use crate::presentation::handlers::{
    admin_handlers, auth_handlers, bill_handlers, catalog_handlers, chat_handlers,
    invoice_handlers, report_handlers, role_handlers, system_handlers, tenant_handlers,
    time_entry_handlers, user_handlers,
};
use crate::presentation::middleware::auth_middleware;
use crate::shared::AppState;

#[derive(Parser, Debug)]
#[command(name = "timechat-backend", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API (default)
    Serve,
    /// Populate the main and tenant databases with deterministic demo data
    Seed(SeedArgs),
}

#[derive(Args, Debug)]
struct SeedArgs {
    /// PRNG seed; defaults to SEED from the environment
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated tenant slugs
    #[arg(long, value_delimiter = ',', default_value = "acme,globex")]
    tenants: Vec<String>,

    /// Demo users per tenant, including the tenant admin and a manager
    #[arg(long, default_value_t = 6)]
    users: usize,

    /// Weeks of time entries; defaults to SEED_WEEKS from the environment
    #[arg(long)]
    weeks: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Seed(args) => seed(config, args).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let bind_addr = config.bind_address();

    tracing::info!("Starting TimeChat Backend");
    tracing::info!("Environment: {:?}", config.server.environment);

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let app_state = Arc::new(AppState::new(config, Some(metrics)).await?);
    let app = build_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn seed(config: AppConfig, args: SeedArgs) -> anyhow::Result<()> {
    let options = SeedOptions {
        seed: args.seed.unwrap_or(config.seed.seed),
        tenants: args.tenants,
        users_per_tenant: args.users,
        weeks_of_entries: args.weeks.unwrap_or(config.seed.weeks_of_entries),
        admin_email: config.seed.admin_email.clone(),
        password: config.seed.admin_password.clone(),
    };

    let state = AppState::new(config, None).await?;
    let summary = Seeder::new(&state, options).run().await.context("Seeding failed")?;

    tracing::info!(
        roles = summary.roles_created,
        users = summary.users_created,
        tenants = summary.tenants_created,
        populated = summary.tenants_populated,
        entries = summary.time_entries,
        "Seed complete"
    );
    Ok(())
}

fn build_app(app_state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let public_auth_routes = Router::new()
        .route("/register", post(auth_handlers::register))
        .route("/login", post(auth_handlers::login))
        .route("/2fa/verify", post(auth_handlers::verify_two_factor))
        .route("/refresh", post(auth_handlers::refresh_token))
        .route("/logout", post(auth_handlers::logout));

    // Protected API routes (require authentication)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth_handlers::me))
        .route("/auth/2fa/setup", post(auth_handlers::setup_two_factor))
        .route("/auth/2fa/enable", post(auth_handlers::enable_two_factor))
        .route("/auth/2fa/disable", post(auth_handlers::disable_two_factor))
        // Main database
        .route(
            "/users",
            get(user_handlers::list_users).post(user_handlers::create_user),
        )
        .route(
            "/users/:id",
            get(user_handlers::get_user)
                .patch(user_handlers::update_user)
                .delete(user_handlers::deactivate_user),
        )
        .route(
            "/users/:id/roles",
            get(user_handlers::list_user_roles).put(user_handlers::assign_roles),
        )
        .route(
            "/roles",
            get(role_handlers::list_roles).post(role_handlers::create_role),
        )
        .route("/roles/capabilities", get(role_handlers::list_capabilities))
        .route(
            "/roles/:id",
            get(role_handlers::get_role)
                .patch(role_handlers::update_role)
                .delete(role_handlers::delete_role),
        )
        .route(
            "/tenants",
            get(tenant_handlers::list_tenants).post(tenant_handlers::create_tenant),
        )
        .route(
            "/tenants/:id",
            get(tenant_handlers::get_tenant)
                .patch(tenant_handlers::update_tenant)
                .delete(tenant_handlers::deactivate_tenant),
        )
        .route(
            "/admin/impersonation",
            get(admin_handlers::list_impersonations).post(admin_handlers::start_impersonation),
        )
        .route("/admin/impersonation/stop", post(admin_handlers::stop_impersonation))
        .route("/admin/audit", get(admin_handlers::list_audit))
        // Tenant database
        .route(
            "/clients",
            get(catalog_handlers::list_clients).post(catalog_handlers::create_client),
        )
        .route(
            "/clients/:id",
            get(catalog_handlers::get_client)
                .patch(catalog_handlers::update_client)
                .delete(catalog_handlers::deactivate_client),
        )
        .route(
            "/projects",
            get(catalog_handlers::list_projects).post(catalog_handlers::create_project),
        )
        .route(
            "/projects/:id",
            get(catalog_handlers::get_project)
                .patch(catalog_handlers::update_project)
                .delete(catalog_handlers::deactivate_project),
        )
        .route(
            "/time-entries",
            get(time_entry_handlers::list_time_entries).post(time_entry_handlers::create_time_entry),
        )
        .route("/time-entries/timer/start", post(time_entry_handlers::start_timer))
        .route("/time-entries/timer/stop", post(time_entry_handlers::stop_timer))
        .route(
            "/time-entries/:id",
            get(time_entry_handlers::get_time_entry)
                .patch(time_entry_handlers::update_time_entry)
                .delete(time_entry_handlers::delete_time_entry),
        )
        .route("/invoices", get(invoice_handlers::list_invoices))
        .route("/invoices/generate", post(invoice_handlers::generate_invoice))
        .route("/invoices/:id", get(invoice_handlers::get_invoice))
        .route("/invoices/:id/status", post(invoice_handlers::update_invoice_status))
        .route(
            "/bills",
            get(bill_handlers::list_bills).post(bill_handlers::create_bill),
        )
        .route(
            "/bills/:id",
            get(bill_handlers::get_bill)
                .patch(bill_handlers::update_bill)
                .delete(bill_handlers::delete_bill),
        )
        .route("/bills/:id/pay", post(bill_handlers::mark_bill_paid))
        .route("/bills/:id/void", post(bill_handlers::void_bill))
        .route("/reports/time-summary", get(report_handlers::time_summary))
        .route(
            "/chat/conversations",
            get(chat_handlers::list_conversations).post(chat_handlers::create_conversation),
        )
        .route("/chat/conversations/:id", get(chat_handlers::get_conversation))
        .route(
            "/chat/conversations/:id/messages",
            get(chat_handlers::list_messages).post(chat_handlers::post_message),
        )
        .layer(middleware::from_fn_with_state(
            app_state.auth_service.clone(),
            auth_middleware,
        ));

    // API v1 routes
    let api_v1 = Router::new()
        .nest("/auth", public_auth_routes)
        .merge(protected_routes);

    let cors = cors_layer(&app_state);

    Router::new()
        .route("/health", get(system_handlers::health_check))
        .route("/ready", get(system_handlers::readiness_check))
        .route("/metrics", get(system_handlers::metrics))
        .route("/", get(system_handlers::root_handler))
        .nest("/api/v1", api_v1)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}

/// Configured origins when given; permissive only in development
fn cors_layer(app_state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = app_state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() && app_state.config.is_development() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log level based on environment
        if cfg!(debug_assertions) {
            "debug,hyper=info,tower=info".into()
        } else {
            "info".into()
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_serve_and_parses_seed_flags() {
        let cli = Cli::try_parse_from(["timechat-backend"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from([
            "timechat-backend",
            "seed",
            "--seed",
            "7",
            "--tenants",
            "acme,initech",
            "--users",
            "4",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Seed(args)) => {
                assert_eq!(args.seed, Some(7));
                assert_eq!(args.tenants, vec!["acme".to_string(), "initech".to_string()]);
                assert_eq!(args.users, 4);
                assert_eq!(args.weeks, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
