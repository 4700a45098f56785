pub mod compiler;
pub mod context;
pub mod contributor;
pub mod contributors;
pub mod delivery;
pub mod error;
pub mod modules;
pub mod normalizer;
pub mod precaching;
pub mod routes;
