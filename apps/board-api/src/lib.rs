pub mod auth;
pub mod booking;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use auth::tokens::TokenVerifier;
use booking::BookingService;
use config::Config;
use db::loads::LoadStore;
use db::users::UserDirectory;
use gateway::Gateway;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenVerifier,
    pub users: Arc<dyn UserDirectory>,
    pub loads: Arc<dyn LoadStore>,
    pub gateway: Arc<Gateway>,
    pub booking: Arc<BookingService>,
}

impl AppState {
    /// Wire the gateway and the booking service around the given stores.
    pub fn new(config: Config, users: Arc<dyn UserDirectory>, loads: Arc<dyn LoadStore>) -> Self {
        let tokens = TokenVerifier::new(&config.jwt_secret);
        let gateway = Arc::new(Gateway::new(users.clone(), tokens.clone()));
        let booking = Arc::new(BookingService::new(
            loads.clone(),
            users.clone(),
            gateway.dispatcher().clone(),
        ));
        Self {
            config: Arc::new(config),
            tokens,
            users,
            loads,
            gateway,
            booking,
        }
    }
}
