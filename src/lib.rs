pub mod config;
pub mod context;
pub mod database;
pub mod libs;
pub mod pages;
pub mod perm;
pub mod response;
pub mod token;

use std::sync::Arc;

pub use config::Config;
pub use context::RequestContext;
use database::Gateway;
use libs::{cache::SessionCache, scratch::ScratchDir, time::TimeResolver};
pub use response::Response;
use token::TokenKey;

pub type ResponseResult = Result<Response, Response>;

/// 请求日志，记录谁做了什么
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        tracing::info!(target: "workshop", $($arg)*)
    };
}

/// Shared handles given to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub clock: Arc<TimeResolver>,
    pub sessions: Arc<SessionCache>,
    pub scratch: Arc<ScratchDir>,
    pub key: Arc<TokenKey>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let gateway = Gateway::connect(config.mysql_addr())?;
        let clock = TimeResolver::from_config(&config)?;
        let scratch = ScratchDir::new(config.scratch_dir(), config.scratch_retention())?;
        let key = TokenKey::new(config.jwt_secret(), config.token_hours())?;
        Ok(Self {
            gateway,
            clock: Arc::new(clock),
            sessions: Arc::new(SessionCache::new()),
            scratch: Arc::new(scratch),
            key: Arc::new(key),
            config: Arc::new(config),
        })
    }
}
