//! Shared handler state.

use std::sync::Arc;

use crate::db::Database;
use crate::embed::EmbedResolver;
use crate::feedback::FeedbackService;
use crate::history::HistoryService;
use crate::stream::ChatPipeline;

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub embeds: Arc<dyn EmbedResolver>,
    pub history: HistoryService,
    pub feedback: FeedbackService,
    pub pipeline: ChatPipeline,
}

impl AppState {
    pub fn new(
        database: Database,
        embeds: Arc<dyn EmbedResolver>,
        history: HistoryService,
        feedback: FeedbackService,
        pipeline: ChatPipeline,
    ) -> Self {
        Self {
            database,
            embeds,
            history,
            feedback,
            pipeline,
        }
    }
}
