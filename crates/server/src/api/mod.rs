pub mod audit;
pub mod engine;
pub mod exposures;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
