pub mod repo;
pub mod routes;
