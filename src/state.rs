use std::sync::Arc;

use crate::database::store::AuthStore;
use crate::services::clock::{Clock, SystemClock};
use crate::services::login_flow::LoginFlow;
use crate::services::signup_flow::SignupFlow;
use crate::services::token_service::TokenService;
use crate::services::AuthContext;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuthStore>,
    pub tokens: TokenService,
    pub signup: Arc<SignupFlow>,
    pub login: Arc<LoginFlow>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(ctx: AuthContext) -> Self {
        AppState {
            store: ctx.store.clone(),
            tokens: ctx.tokens.clone(),
            signup: Arc::new(SignupFlow::new(ctx.clone())),
            login: Arc::new(LoginFlow::new(ctx)),
            clock: Arc::new(SystemClock),
        }
    }
}
