//! Shared daemon state handed to every tool handler.

use std::time::Instant;

use spindle_skein::SkeinClient;
use spindle_store::SpoolStore;

use crate::settings::Settings;

pub struct Daemon {
    pub store: SpoolStore,
    pub skein: SkeinClient,
    pub settings: Settings,
    pub started_at: Instant,
}

impl Daemon {
    pub fn new(settings: Settings) -> Self {
        Self {
            store: SpoolStore::new(settings.spool_dir()),
            skein: SkeinClient::from_env(),
            settings,
            started_at: Instant::now(),
        }
    }
}
