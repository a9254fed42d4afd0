pub mod auth;
pub mod rfq;

use storage::Storage;

pub use auth::{auth_status, current_user, login, logout, register, AuthConfig};
pub use rfq::{
    create_rfq, delete_rfq, get_rfq, list_rfqs, mark_step_complete, rfq_analytics, update_rfq,
};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
}
