pub mod router;
pub mod types;
pub mod handlers {
    pub mod channels;
    pub mod collections;
    pub mod common;
    pub mod health;
    pub mod methods;
}

pub use router::{create_router, ApiDoc};
pub use types::AppState;
