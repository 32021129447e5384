use std::sync::Arc;

use common_auth::JwtVerifier;

use crate::store::DrinkStore;

/// Shared application state used by handlers.
#[derive(Clone)]
pub struct AppState {
    pub drinks: Arc<dyn DrinkStore>,
    pub jwt_verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(drinks: Arc<dyn DrinkStore>, jwt_verifier: Arc<JwtVerifier>) -> Self {
        Self {
            drinks,
            jwt_verifier,
        }
    }
}
