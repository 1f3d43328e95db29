use std::sync::Arc;

use scamtrap_core::engine::AnalysisEngine;

use crate::auth::ApiKeyAuth;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalysisEngine>,
    pub auth: Arc<ApiKeyAuth>,
}
