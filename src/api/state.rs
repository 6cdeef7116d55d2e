use crate::analysis::PatternEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PatternEngine>,
}
