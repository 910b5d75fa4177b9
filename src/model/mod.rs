pub mod constants;
pub mod rating_model;
pub mod rating_store;
pub mod replay;
pub mod structures;
