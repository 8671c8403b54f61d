use crate::call::{SessionHandle, SessionLoop};
use crate::callrecord::{CallRecordStore, MemoryCallRecordStore};
use crate::config::Config;
use crate::media::{SimulatedVoice, VoiceAdapter};
use crate::provider::{CallInitiator, HttpCallInitiator, TelephonyService};
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub token: CancellationToken,
    pub telephony: Arc<TelephonyService>,
    pub records: Arc<dyn CallRecordStore>,
    pub session: SessionHandle,
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateBuilder {
    pub config: Option<Config>,
    pub voice: Option<Arc<dyn VoiceAdapter>>,
    pub initiator: Option<Arc<dyn CallInitiator>>,
    pub records: Option<Arc<dyn CallRecordStore>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            voice: None,
            initiator: None,
            records: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn voice(mut self, voice: Arc<dyn VoiceAdapter>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn initiator(mut self, initiator: Arc<dyn CallInitiator>) -> Self {
        self.initiator = Some(initiator);
        self
    }

    pub fn records(mut self, records: Arc<dyn CallRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Build the state and start the call session loop.
    pub async fn build(self) -> Result<AppState> {
        let config = Arc::new(self.config.unwrap_or_default());
        let token = CancellationToken::new();

        let records = self
            .records
            .unwrap_or_else(|| Arc::new(MemoryCallRecordStore::new()));
        let telephony = Arc::new(TelephonyService::new(
            config.plivo_with_env(),
            records.clone(),
        ));
        if telephony.is_simulation() {
            info!("plivo credentials not configured, running in simulation mode");
        }

        let initiator: Arc<dyn CallInitiator> = match (self.initiator, &config.provider.initiate_url) {
            (Some(initiator), _) => initiator,
            (None, Some(url)) => {
                info!(%url, "session initiates calls over http");
                Arc::new(HttpCallInitiator::new(url.clone()))
            }
            (None, None) => telephony.clone(),
        };
        let voice = self
            .voice
            .unwrap_or_else(|| Arc::new(SimulatedVoice::from_config(&config.audio)));

        let (event_loop, session) = SessionLoop::new(
            voice,
            initiator,
            config.audio.clone(),
            token.child_token(),
        );
        let event_loop = event_loop.with_initiate_timeout(config.provider.initiate_timeout());
        tokio::spawn(async move {
            if let Err(e) = event_loop.run().await {
                error!("call session loop failed: {}", e);
            }
        });

        Ok(Arc::new(AppStateInner {
            config,
            token,
            telephony,
            records,
            session,
        }))
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run(state: AppState) -> Result<()> {
    let token = state.token.clone();
    let addr: SocketAddr = state.config.http_addr.parse()?;
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return Err(anyhow::anyhow!("Failed to bind to {}: {}", addr, e));
        }
    };
    serve(listener, state).await?;
    token.cancel();
    Ok(())
}

/// Serve on an already bound listener until the state's token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let token = state.token.clone();
    let app = create_router(state);
    let http_task = axum::serve(listener, app);

    select! {
        http_result = http_task => {
            match http_result {
                Ok(_) => info!("Server shut down gracefully"),
                Err(e) => {
                    error!("Server error: {}", e);
                    return Err(anyhow::anyhow!("Server error: {}", e));
                }
            }
        }
        _ = token.cancelled() => {
            info!("Application shutting down due to cancellation");
        }
    }
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::ORIGIN,
        ]);

    crate::handler::router().with_state(state).layer(cors)
}
