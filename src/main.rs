//! Entry point: loads configuration, builds the one backend this process
//! fronts, probes it for liveness, then serves the single `POST *` JSON-RPC
//! route until SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;

use alloy_provider::{Provider, ProviderBuilder};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router as AxumRouter;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use ethrpc_gateway::backend::celo::CeloBackend;
use ethrpc_gateway::backend::conflux::ConfluxBackend;
use ethrpc_gateway::backend::evm::EvmBackend;
use ethrpc_gateway::backend::reef::ReefBackend;
use ethrpc_gateway::backend::BackendWrapper;
use ethrpc_gateway::config::{BackendKind, Config, GasPolicy};
use ethrpc_gateway::envelope::{RequestEnvelope, ResponseEnvelope};
use ethrpc_gateway::error::GatewayError;
use ethrpc_gateway::router::GatewayContext;
use ethrpc_gateway::sig_down::SigDown;
use ethrpc_gateway::telemetry;
use ethrpc_gateway::translators::conflux::ConfluxTranslator;
use ethrpc_gateway::translators::reef::{ReefGraphQlClient, ReefSigner, UnimplementedReefSigner};
use ethrpc_gateway::translators::{IdentityTranslator, Translator};
use ethrpc_gateway::wallet::WalletSet;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    telemetry::init(&config.log_level);
    tracing::info!(backend = ?config.backend, port = config.port, "starting ethrpc-gateway");

    let (wrapper, translator) = build_backend(&config).await?;
    log_wallet_summary(wrapper.wallets());

    if let Err(error) = wrapper.raw_gas_price().await {
        tracing::error!(%error, "startup liveness probe against the backend failed");
        std::process::exit(1);
    }
    tracing::info!("backend liveness probe succeeded");

    let ctx = Arc::new(GatewayContext::new(wrapper, translator, config.interleave_blocks));

    let app = AxumRouter::new()
        .route("/", post(handle_request))
        .route("/{*path}", post(handle_request))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let sig_down = SigDown::try_new()?;
    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            sig_down.cancellation_token().cancelled().await;
            tracing::info!("shutdown signal received, draining in-flight requests");
        })
        .await?;

    Ok(())
}

/// The gateway's sole HTTP endpoint: a single `POST *` route.
/// Malformed JSON or a malformed envelope is reported as a JSON-RPC
/// `-32700` error rather than an HTTP-level failure, since JSON-RPC over
/// HTTP conventionally reports transport-successful-but-protocol-failed
/// requests with a `200` carrying an `error` body.
async fn handle_request(
    State(ctx): State<Arc<GatewayContext>>,
    body: Bytes,
) -> impl IntoResponse {
    let envelope: RequestEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            let error = GatewayError::MalformedRequest(error.to_string());
            return (StatusCode::OK, Json(ResponseEnvelope::err(Value::Null, &error)));
        }
    };
    let response = ctx.handle(envelope).await;
    (StatusCode::OK, Json(response))
}

/// Builds the one [`BackendWrapper`] and [`Translator`] this process
/// fronts, per `ETHRPC_NETWORK`. Every branch follows the same shape:
/// resolve a chain id (when the backend has one), build the wallet set
/// bound to it, then construct the wrapper.
async fn build_backend(
    config: &Config,
) -> Result<(Box<dyn BackendWrapper>, Box<dyn Translator>), Box<dyn std::error::Error>> {
    let gas_policy = GasPolicy::from_env(config.gas_policy_prefix());
    let identity = &config.identity;

    match config.backend {
        BackendKind::Ethers | BackendKind::Infura | BackendKind::ZkSync => {
            let chain_id = fetch_chain_id(&config.provider_url).await;
            let wallets = WalletSet::build(
                identity.seed_phrase.clone(),
                identity.seed_phrase_wallets,
                identity.private_keys.clone(),
                chain_id,
                &[],
            )?;
            let backend = EvmBackend::new(config.provider_url.clone(), wallets, gas_policy, chain_id);
            Ok((Box::new(backend), Box::new(IdentityTranslator)))
        }
        BackendKind::Conflux => {
            let extra = config
                .conflux
                .clone()
                .expect("ETHRPC_NETWORK=conflux requires Config::load to have populated `conflux`");
            let wallets = WalletSet::build(
                identity.seed_phrase.clone(),
                identity.seed_phrase_wallets,
                identity.private_keys.clone(),
                None,
                &[],
            )?;
            let translator = ConfluxTranslator {
                network_id: extra.network_id,
                epoch_label: extra.epoch_label.as_str(),
            };
            let backend = ConfluxBackend::new(config.provider_url.clone(), wallets, gas_policy, extra);
            Ok((Box::new(backend), Box::new(translator)))
        }
        BackendKind::Celo => {
            let extra = config
                .celo
                .clone()
                .expect("ETHRPC_NETWORK=celo requires Config::load to have populated `celo`");
            let chain_id = fetch_chain_id(&config.provider_url).await;
            let wallets = WalletSet::build(
                identity.seed_phrase.clone(),
                identity.seed_phrase_wallets,
                identity.private_keys.clone(),
                chain_id,
                &[],
            )?;
            let inner = EvmBackend::new(config.provider_url.clone(), wallets, gas_policy, chain_id);
            let fee_currency: Option<alloy_primitives::Address> = extra
                .fee_currency
                .as_deref()
                .map(|s| s.parse())
                .transpose()
                .map_err(|_| "invalid CELO_FEE_CURRENCY address")?;
            let backend = CeloBackend::new(inner, fee_currency, extra.gas_price_max);
            Ok((Box::new(backend), Box::new(IdentityTranslator)))
        }
        BackendKind::Reef => {
            let extra = config
                .reef
                .clone()
                .expect("ETHRPC_NETWORK=reef requires Config::load to have populated `reef`");
            let wallets = WalletSet::build(
                identity.seed_phrase.clone(),
                identity.seed_phrase_wallets,
                identity.private_keys.clone(),
                None,
                &extra.substrate_addresses,
            )?;
            let graphql = ReefGraphQlClient::new(extra.graph_url);
            let signer: Arc<dyn ReefSigner> = Arc::new(UnimplementedReefSigner);
            let backend = ReefBackend::new(graphql, signer, wallets, gas_policy);
            if let Err(error) = backend.claim_default_account().await {
                tracing::warn!(%error, "could not claim the default account on startup");
            }
            Ok((Box::new(backend), Box::new(IdentityTranslator)))
        }
    }
}

/// Logs a redacted summary of the wallet set at startup: count plus each
/// address's last 4 hex characters, so an operator can confirm the right
/// seed phrase/key set loaded without the full address list (and
/// certainly not the seed phrase or keys themselves) hitting the log.
fn log_wallet_summary(wallets: &WalletSet) {
    let redacted: Vec<String> = wallets
        .addresses()
        .iter()
        .map(|a| {
            let hex = format!("{a:x}");
            format!("…{}", &hex[hex.len() - 4..])
        })
        .collect();
    tracing::info!(count = wallets.len(), addresses = ?redacted, "wallet set loaded");
}

/// Queries the provider's chain id once at startup, for wallets to bind
/// EIP-155 replay protection to. `None` when the probe fails — a backend
/// with `forceEip155` unset tolerates this; one with it set will surface
/// an `InvalidParameter` later instead of silently signing without replay
/// protection.
async fn fetch_chain_id(url: &Url) -> Option<u64> {
    let provider = ProviderBuilder::new().connect_http(url.clone());
    provider.get_chain_id().await.ok()
}
