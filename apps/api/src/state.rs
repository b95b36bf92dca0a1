use std::sync::Arc;

use sqlx::PgPool;

use crate::campaigns::dispatch::DispatchStore;
use crate::discovery::places::PlacesClient;
use crate::messaging::whatsapp::WhatsAppClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub places: PlacesClient,
    pub whatsapp: WhatsAppClient,
    /// Read side of the dispatch engine. Default: `PgDispatchStore` over `db`.
    pub dispatch: Arc<dyn DispatchStore>,
}
