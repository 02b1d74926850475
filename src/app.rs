/*
 * Responsibility
 * - Load Config -> build dependencies -> assemble Router
 * - Apply HTTP middleware (tracing, request id, limits, timeout)
 * - Start the background store sweeper and axum::serve()
 */
use std::{panic, process, sync::Arc};

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware;
use crate::services::{
    dpop::{DpopPolicy, ProofVerifier},
    nonce::{InMemoryNonceStore, NonceStore},
    replay::{InMemoryReplayStore, ReplayStore},
    sweeper,
    token::{JwtIssuer, TokenIssuer},
};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,dpop_handshake=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get "lost".
        tracing::error!(?info, "panic");

        // Development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting DPoP token server in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config)?;

    sweeper::spawn(
        state.nonces.clone(),
        state.replay.clone(),
        config.sweep_interval,
    );

    let app = build_router(state, &config);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build process-level services and inject them into the shared state.
pub fn build_state(config: &Config) -> Result<AppState, AppError> {
    let jwt = match config.access_jwt_private_key_pem.as_deref() {
        Some(pem) => JwtIssuer::new(pem, config.issuer.clone(), config.access_token_ttl_seconds)?,
        None => {
            tracing::warn!(
                "ACCESS_JWT_PRIVATE_KEY_PEM not set; signing access tokens with an ephemeral key"
            );
            JwtIssuer::ephemeral(config.issuer.clone(), config.access_token_ttl_seconds)?
        }
    };
    let issuer = Arc::new(TokenIssuer::new(jwt, config.issue_refresh_token));

    let nonces: Arc<dyn NonceStore> =
        Arc::new(InMemoryNonceStore::new(config.nonce_bytes, config.nonce_ttl));
    let replay: Arc<dyn ReplayStore> = Arc::new(InMemoryReplayStore::new());

    let policy = DpopPolicy {
        iat_leeway_seconds: config.dpop_iat_leeway_seconds,
        max_age_seconds: config.dpop_max_age_seconds,
    };
    let verifier = Arc::new(ProofVerifier::new(policy, nonces.clone(), replay.clone()));

    Ok(AppState::new(
        nonces,
        replay,
        verifier,
        issuer,
        config.public_base_url.clone(),
    ))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = api::routes().with_state(state);
    middleware::http::apply(router, config)
}
