pub mod chrome;

pub use chrome::{ChromeSession, ChromeSessionFactory};
