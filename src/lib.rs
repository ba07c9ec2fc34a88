pub mod backend;
pub mod cart;
pub mod checkout;
pub mod currency;
pub mod feed;
pub mod infra;
pub mod models;
pub mod routes;
pub mod schema;
pub mod status;
