pub mod chat;
pub mod errors;
pub mod imaging;
pub mod models;
pub mod providers;
pub mod systems;
